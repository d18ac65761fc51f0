use bigdecimal::BigDecimal;
use std::str::FromStr;

/// Amounts are stored as NUMERIC(12, 2) and always rendered with two decimals,
/// so `200`, `200.0` and `200.00` produce the same string.
pub fn format_amount(amount: &BigDecimal) -> String {
    amount.with_scale(2).to_string()
}

pub fn parse_amount(raw: &str) -> Option<BigDecimal> {
    BigDecimal::from_str(raw.trim()).ok()
}

pub fn is_positive(amount: &BigDecimal) -> bool {
    *amount > BigDecimal::from(0)
}

/// Largest value a NUMERIC(12, 2) column holds, in cents.
const MAX_AMOUNT_CENTS: i64 = 999_999_999_999;

/// No fractional cents: the value survives NUMERIC(12, 2) unchanged.
pub fn is_whole_cents(amount: &BigDecimal) -> bool {
    amount.with_scale(2) == *amount
}

/// At most 9999999999.99.
pub fn fits_amount_column(amount: &BigDecimal) -> bool {
    amount * &BigDecimal::from(100) <= BigDecimal::from(MAX_AMOUNT_CENTS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_amount_pads_to_two_decimals() {
        assert_eq!(format_amount(&BigDecimal::from(200)), "200.00");
        assert_eq!(format_amount(&BigDecimal::from_str("200.5").unwrap()), "200.50");
        assert_eq!(format_amount(&BigDecimal::from_str("0.10").unwrap()), "0.10");
    }

    #[test]
    fn test_format_amount_is_stable_for_equal_values() {
        let a = BigDecimal::from_str("150").unwrap();
        let b = BigDecimal::from_str("150.000").unwrap();
        assert_eq!(format_amount(&a), format_amount(&b));
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount(" 99.90 "), Some(BigDecimal::from_str("99.90").unwrap()));
        assert_eq!(parse_amount("abc"), None);
    }

    #[test]
    fn test_is_whole_cents() {
        assert!(is_whole_cents(&BigDecimal::from_str("1.01").unwrap()));
        assert!(is_whole_cents(&BigDecimal::from_str("1.500").unwrap()));
        assert!(is_whole_cents(&BigDecimal::from(7)));
        assert!(!is_whole_cents(&BigDecimal::from_str("1.005").unwrap()));
    }

    #[test]
    fn test_fits_amount_column() {
        assert!(fits_amount_column(&BigDecimal::from_str("9999999999.99").unwrap()));
        assert!(!fits_amount_column(&BigDecimal::from_str("10000000000.00").unwrap()));
        assert!(!fits_amount_column(&BigDecimal::from_str("200000000000.00").unwrap()));
    }

    #[test]
    fn test_is_positive() {
        assert!(is_positive(&BigDecimal::from(1)));
        assert!(!is_positive(&BigDecimal::from(0)));
        assert!(!is_positive(&BigDecimal::from(-5)));
    }
}
