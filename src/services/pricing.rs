use crate::config::PricingConfig;
use crate::domain::Gtin;
use bigdecimal::BigDecimal;
use std::collections::HashMap;

/// Unit price lookup for order assembly.
pub trait PricingSource: Send + Sync {
    fn unit_price(&self, gtin: &Gtin) -> Option<BigDecimal>;
}

/// One price for every product, with optional per-GTIN overrides.
#[derive(Debug, Clone)]
pub struct FixedPricing {
    default_price: BigDecimal,
    overrides: HashMap<String, BigDecimal>,
}

impl FixedPricing {
    pub fn new(default_price: BigDecimal) -> Self {
        Self {
            default_price,
            overrides: HashMap::new(),
        }
    }

    pub fn with_override(mut self, gtin: impl Into<String>, price: BigDecimal) -> Self {
        self.overrides.insert(gtin.into(), price);
        self
    }

    pub fn from_config(config: &PricingConfig) -> Self {
        Self {
            default_price: config.unit_price.clone(),
            overrides: config.overrides.clone(),
        }
    }
}

impl PricingSource for FixedPricing {
    fn unit_price(&self, gtin: &Gtin) -> Option<BigDecimal> {
        Some(
            self.overrides
                .get(gtin.as_str())
                .unwrap_or(&self.default_price)
                .clone(),
        )
    }
}
