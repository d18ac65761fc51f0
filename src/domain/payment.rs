use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Payment {
    pub id: i64,
    pub order_id: i64,
    pub amount: BigDecimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub transaction_id: Uuid,
    pub gateway_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Payment about to be opened for an order.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub order_id: i64,
    pub amount: BigDecimal,
    pub currency: String,
    pub transaction_id: Uuid,
}

impl NewPayment {
    pub fn new(order_id: i64, amount: BigDecimal, currency: impl Into<String>) -> Self {
        Self {
            order_id,
            amount,
            currency: currency.into(),
            transaction_id: Uuid::new_v4(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_payment_gets_unique_transaction_id() {
        let a = NewPayment::new(1, BigDecimal::from(100), "RUB");
        let b = NewPayment::new(1, BigDecimal::from(100), "RUB");
        assert_ne!(a.transaction_id, b.transaction_id);
        assert_eq!(a.currency, "RUB");
    }
}
