//! Domain entities.
//! Framework-agnostic representation of users, orders, payments and code requests.

pub mod code_request;
pub mod money;
pub mod order;
pub mod payment;
pub mod user;

pub use code_request::{CodeRequest, CodeRequestPayload, CodeRequestStatus, NewCodeRequest};
pub use order::{Gtin, GtinQuantity, NewOrderItem, Order, OrderDraft, OrderItem, OrderStatus};
pub use payment::{NewPayment, Payment, PaymentStatus};
pub use user::{Registration, User};

/// Input rejected before it reaches persistence.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
