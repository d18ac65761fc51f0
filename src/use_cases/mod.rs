//! Orchestration of repositories and external integrations.

pub mod create_payment;
pub mod fulfil_codes;
pub mod payment_callback;
pub mod register_user;
pub mod request_codes;

pub use create_payment::{CreatePayment, CreatePaymentInput, CreatePaymentOutput};
pub use fulfil_codes::{CodeFulfilment, FulfilmentOutcome, RetryPolicy};
pub use payment_callback::{CallbackOutcome, HandlePaymentCallback};
pub use register_user::{RegisterUser, RegistrationOutput};
pub use request_codes::{RequestCodes, RequestCodesInput, RequestCodesOutput};
