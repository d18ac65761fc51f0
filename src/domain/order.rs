use super::ValidationError;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Created,
    Pending,
    Paid,
    Processed,
    Completed,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Processed => "processed",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }

    /// A payment can only be opened while the order is still waiting for one.
    pub fn is_payable(&self) -> bool {
        matches!(self, Self::Created | Self::Pending)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub total_amount: BigDecimal,
    pub status: OrderStatus,
    pub payment_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub gtin: String,
    pub quantity: i32,
    pub unit_price: BigDecimal,
}

/// 14-digit GTIN as used by the marking registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Gtin(String);

impl Gtin {
    pub const LENGTH: usize = 14;

    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let raw = raw.trim();
        if raw.len() != Self::LENGTH || !raw.chars().all(|c| c.is_ascii_digit()) {
            return Err(ValidationError::new(format!(
                "gtin '{}' must be exactly {} digits",
                raw,
                Self::LENGTH
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Gtin {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Gtin::parse(&value)
    }
}

impl From<Gtin> for String {
    fn from(gtin: Gtin) -> Self {
        gtin.0
    }
}

impl fmt::Display for Gtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One requested line: product code and how many marking codes to issue.
/// Also the wire shape sent to the marking API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GtinQuantity {
    pub gtin: String,
    pub count: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewOrderItem {
    pub gtin: Gtin,
    pub quantity: i32,
    pub unit_price: BigDecimal,
}

impl NewOrderItem {
    pub fn line_total(&self) -> BigDecimal {
        BigDecimal::from(self.quantity) * &self.unit_price
    }
}

/// Order header and lines ready to be persisted in one transaction.
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub user_id: i64,
    pub items: Vec<NewOrderItem>,
    pub total_amount: BigDecimal,
}

impl OrderDraft {
    pub fn status(&self) -> OrderStatus {
        OrderStatus::Created
    }
}
