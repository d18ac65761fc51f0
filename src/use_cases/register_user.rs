//! Register user use case.
//! Upserts by Telegram id and always hands out a fresh API key.

use crate::domain::user::generate_api_key;
use crate::domain::Registration;
use crate::error::AppError;
use crate::metrics::Metrics;
use crate::ports::UserRepository;
use std::sync::Arc;

#[derive(Debug)]
pub struct RegistrationOutput {
    pub user_id: i64,
    pub api_key: String,
    pub created: bool,
}

pub struct RegisterUser {
    users: Arc<dyn UserRepository>,
    metrics: Metrics,
}

impl RegisterUser {
    pub fn new(users: Arc<dyn UserRepository>, metrics: Metrics) -> Self {
        Self { users, metrics }
    }

    pub async fn execute(&self, registration: Registration) -> Result<RegistrationOutput, AppError> {
        let registration = registration.normalized();
        registration.validate()?;

        let api_key = generate_api_key();
        let upserted = self.users.upsert(&registration, &api_key).await?;

        let result = if upserted.created { "created" } else { "updated" };
        self.metrics.registrations.with_label_values(&[result]).inc();
        tracing::info!(
            user_id = upserted.user.id,
            telegram_id = registration.telegram_id,
            created = upserted.created,
            "User registered"
        );

        Ok(RegistrationOutput {
            user_id: upserted.user.id,
            api_key: upserted.user.api_key,
            created: upserted.created,
        })
    }
}
