//! Turns requested (GTIN, quantity) pairs into a priced order draft.

use super::pricing::PricingSource;
use crate::domain::money::{fits_amount_column, is_positive, is_whole_cents};
use crate::domain::{Gtin, GtinQuantity, NewOrderItem, OrderDraft, ValidationError};
use bigdecimal::BigDecimal;

pub fn assemble_order(
    user_id: i64,
    lines: &[GtinQuantity],
    pricing: &dyn PricingSource,
) -> Result<OrderDraft, ValidationError> {
    if lines.is_empty() {
        return Err(ValidationError::new("gtin_data must contain at least one item"));
    }

    let mut items = Vec::with_capacity(lines.len());
    for (index, line) in lines.iter().enumerate() {
        if line.count <= 0 {
            return Err(ValidationError::new(format!(
                "gtin_data[{}].count must be positive",
                index
            )));
        }
        let gtin = Gtin::parse(&line.gtin)
            .map_err(|e| ValidationError::new(format!("gtin_data[{}]: {}", index, e)))?;
        let unit_price = pricing.unit_price(&gtin).ok_or_else(|| {
            ValidationError::new(format!("no price configured for gtin {}", gtin))
        })?;
        if unit_price < BigDecimal::from(0) {
            return Err(ValidationError::new(format!(
                "negative price configured for gtin {}",
                gtin
            )));
        }
        if !is_whole_cents(&unit_price) {
            return Err(ValidationError::new(format!(
                "price for gtin {} has fractions of a cent",
                gtin
            )));
        }

        items.push(NewOrderItem {
            gtin,
            quantity: line.count,
            unit_price,
        });
    }

    let total_amount = items
        .iter()
        .fold(BigDecimal::from(0), |acc, item| acc + item.line_total())
        .with_scale(2);

    if !is_positive(&total_amount) {
        return Err(ValidationError::new("order total must be positive"));
    }
    if !fits_amount_column(&total_amount) {
        return Err(ValidationError::new(
            "order total exceeds 9999999999.99, split the order",
        ));
    }

    Ok(OrderDraft {
        user_id,
        items,
        total_amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OrderStatus;
    use crate::services::pricing::FixedPricing;
    use proptest::prelude::*;

    fn line(gtin: &str, count: i32) -> GtinQuantity {
        GtinQuantity {
            gtin: gtin.to_string(),
            count,
        }
    }

    #[test]
    fn test_single_line_total() {
        let pricing = FixedPricing::new("100.0".parse().unwrap());
        let draft = assemble_order(7, &[line("04602380040001", 2)], &pricing).unwrap();

        assert_eq!(draft.user_id, 7);
        assert_eq!(draft.total_amount, "200.00".parse::<BigDecimal>().unwrap());
        assert_eq!(draft.total_amount.to_string(), "200.00");
        assert_eq!(draft.status(), OrderStatus::Created);
        assert_eq!(draft.items.len(), 1);
    }

    #[test]
    fn test_rejects_empty_list() {
        let pricing = FixedPricing::new(BigDecimal::from(100));
        assert!(assemble_order(1, &[], &pricing).is_err());
    }

    #[test]
    fn test_rejects_non_positive_quantity() {
        let pricing = FixedPricing::new(BigDecimal::from(100));
        let err = assemble_order(1, &[line("04602380040001", 0)], &pricing).unwrap_err();
        assert!(err.0.contains("count"));
        assert!(assemble_order(1, &[line("04602380040001", -3)], &pricing).is_err());
    }

    #[test]
    fn test_rejects_malformed_gtin() {
        let pricing = FixedPricing::new(BigDecimal::from(100));
        assert!(assemble_order(1, &[line("123", 1)], &pricing).is_err());
    }

    #[test]
    fn test_rejects_zero_total() {
        let pricing = FixedPricing::new(BigDecimal::from(0));
        let err = assemble_order(1, &[line("04602380040001", 5)], &pricing).unwrap_err();
        assert_eq!(err.0, "order total must be positive");
    }

    #[test]
    fn test_rejects_fractional_cent_price() {
        let pricing = FixedPricing::new("1.005".parse().unwrap());
        let err = assemble_order(1, &[line("04602380040001", 1)], &pricing).unwrap_err();
        assert!(err.0.contains("fractions of a cent"));

        let pricing = FixedPricing::new("1.500".parse().unwrap());
        let draft = assemble_order(1, &[line("04602380040001", 3)], &pricing).unwrap();
        assert_eq!(draft.total_amount.to_string(), "4.50");
    }

    #[test]
    fn test_rejects_total_beyond_amount_column() {
        let pricing = FixedPricing::new("100.00".parse().unwrap());
        let err = assemble_order(1, &[line("04602380040001", 2_000_000_000)], &pricing).unwrap_err();
        assert!(err.0.contains("exceeds"));

        let pricing = FixedPricing::new("0.01".parse().unwrap());
        let draft = assemble_order(
            1,
            &[line("04602380040001", i32::MAX), line("04602380040002", i32::MAX)],
            &pricing,
        )
        .unwrap();
        assert_eq!(draft.total_amount.to_string(), "42949672.94");
    }

    struct NoPrices;

    impl PricingSource for NoPrices {
        fn unit_price(&self, _gtin: &Gtin) -> Option<BigDecimal> {
            None
        }
    }

    #[test]
    fn test_unpriced_gtin_is_rejected() {
        assert!(assemble_order(1, &[line("04602380040001", 1)], &NoPrices).is_err());
    }

    proptest! {
        #[test]
        fn prop_total_is_sum_of_lines(
            lines in prop::collection::vec((1i32..1000, 0u32..1_000_000), 1..20)
        ) {
            let mut pricing = FixedPricing::new(BigDecimal::from(1));
            let mut requested = Vec::new();
            let mut expected = BigDecimal::from(0);
            let mut sub_cent = false;

            for (i, (count, mills)) in lines.iter().enumerate() {
                let gtin = format!("{:014}", i);
                let price = BigDecimal::new((*mills).into(), 3);
                sub_cent |= mills % 10 != 0;
                expected += BigDecimal::from(*count) * &price;
                pricing = pricing.with_override(gtin.clone(), price);
                requested.push(line(&gtin, *count));
            }

            match assemble_order(1, &requested, &pricing) {
                Ok(draft) => {
                    prop_assert!(!sub_cent);
                    let lines_sum = draft
                        .items
                        .iter()
                        .fold(BigDecimal::from(0), |acc, item| acc + item.line_total());
                    prop_assert_eq!(&draft.total_amount, &lines_sum);
                    prop_assert_eq!(&draft.total_amount, &expected);
                    prop_assert_eq!(draft.items.len(), requested.len());
                }
                Err(_) => prop_assert!(sub_cent || expected == BigDecimal::from(0)),
            }
        }
    }
}
