//! Repository ports.
//! Use cases depend on these traits; `db::PgStore` implements them on Postgres.

use crate::domain::{
    CodeRequest, NewCodeRequest, NewPayment, Order, OrderDraft, OrderItem, Payment, Registration,
    User,
};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepositoryError {
    /// A schema constraint rejected the write.
    #[error("constraint violated: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    /// The database could not be reached; safe to retry with backoff.
    #[error("database unavailable: {0}")]
    Unavailable(String),
    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("row not found".to_string()),
            sqlx::Error::Database(db_err) => {
                let message = db_err.message().to_string();
                match db_err.code().as_deref() {
                    Some("23505") => RepositoryError::Conflict(message),
                    // check, not-null and foreign-key violations, bad enum text, numeric overflow
                    Some("23514") | Some("23502") | Some("23503") | Some("22P02") | Some("22003") => {
                        RepositoryError::Validation(message)
                    }
                    _ => RepositoryError::Database(message),
                }
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                RepositoryError::Unavailable(err.to_string())
            }
            sqlx::Error::Io(e) => RepositoryError::Unavailable(e.to_string()),
            sqlx::Error::Tls(e) => RepositoryError::Unavailable(e.to_string()),
            other => RepositoryError::Database(other.to_string()),
        }
    }
}

/// Result of an upsert by Telegram id.
#[derive(Debug, Clone)]
pub struct UpsertedUser {
    pub user: User,
    pub created: bool,
}

/// Order persisted together with its lines and pending code request.
#[derive(Debug, Clone)]
pub struct CreatedOrder {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub code_request: CodeRequest,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Inserts a new user or updates the mutable fields of an existing one,
    /// always storing `api_key` as the current access token.
    async fn upsert(
        &self,
        registration: &Registration,
        api_key: &str,
    ) -> Result<UpsertedUser, RepositoryError>;

    async fn find_by_telegram_id(&self, telegram_id: i64) -> Result<Option<User>, RepositoryError>;

    async fn find_by_api_key(&self, api_key: &str) -> Result<Option<User>, RepositoryError>;

    async fn touch(&self, user_id: i64) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Writes the order header, every item and the pending code request in a
    /// single transaction. Nothing is visible unless all rows are written.
    async fn create_with_code_request(
        &self,
        draft: &OrderDraft,
        request: &NewCodeRequest,
        first_retry_in: Duration,
    ) -> Result<CreatedOrder, RepositoryError>;

    async fn find(&self, order_id: i64) -> Result<Option<Order>, RepositoryError>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Inserts a pending payment and moves its order from `created` to
    /// `pending`, atomically. Fails with `Conflict` if the order is no longer
    /// payable.
    async fn create_for_order(&self, payment: &NewPayment) -> Result<Payment, RepositoryError>;

    async fn find(&self, payment_id: i64) -> Result<Option<Payment>, RepositoryError>;

    /// Payment lookup scoped to the owner of its order.
    async fn find_for_telegram_user(
        &self,
        payment_id: i64,
        telegram_id: i64,
    ) -> Result<Option<Payment>, RepositoryError>;

    /// Compare-and-set `pending -> completed`. Returns `false` when the row was
    /// not pending (already completed by a racing callback, or terminal).
    async fn complete_if_pending(
        &self,
        payment_id: i64,
        gateway_reference: Option<&str>,
    ) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait CodeRequestRepository: Send + Sync {
    async fn find(&self, id: i64) -> Result<Option<CodeRequest>, RepositoryError>;

    async fn list_for_telegram_id(
        &self,
        telegram_id: i64,
        limit: i64,
    ) -> Result<Vec<CodeRequest>, RepositoryError>;

    async fn mark_completed(
        &self,
        id: i64,
        codes: &[String],
        artifact_path: Option<&str>,
    ) -> Result<(), RepositoryError>;

    async fn mark_failed(
        &self,
        id: i64,
        error: &str,
        partial_codes: &[String],
    ) -> Result<(), RepositoryError>;

    /// Leaves the request pending and schedules the next attempt.
    async fn reschedule(
        &self,
        id: i64,
        error: &str,
        retry_in: Duration,
    ) -> Result<(), RepositoryError>;

    /// Claims up to `limit` due pending requests, counting an attempt and
    /// pushing `next_attempt_at` forward by `lease` so no other worker takes
    /// them while the call is in flight.
    async fn claim_due(
        &self,
        limit: i64,
        lease: Duration,
    ) -> Result<Vec<CodeRequest>, RepositoryError>;
}
