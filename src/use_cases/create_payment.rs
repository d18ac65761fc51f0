//! Create payment use case.
//! Opens a pending payment for a payable order and builds the gateway link.

use crate::domain::money::{format_amount, is_positive};
use crate::domain::user::validate_telegram_id;
use crate::domain::NewPayment;
use crate::error::AppError;
use crate::metrics::Metrics;
use crate::ports::{OrderRepository, PaymentRepository, UserRepository};
use crate::robokassa::RobokassaGateway;
use bigdecimal::BigDecimal;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct CreatePaymentInput {
    pub telegram_id: i64,
    pub order_id: i64,
    /// When given, must equal the order total.
    pub amount: Option<BigDecimal>,
}

#[derive(Debug)]
pub struct CreatePaymentOutput {
    pub payment_id: i64,
    pub order_id: i64,
    pub amount: BigDecimal,
    pub currency: String,
    pub transaction_id: Uuid,
    pub redirect_url: String,
}

pub struct CreatePayment {
    users: Arc<dyn UserRepository>,
    orders: Arc<dyn OrderRepository>,
    payments: Arc<dyn PaymentRepository>,
    gateway: RobokassaGateway,
    currency: String,
    metrics: Metrics,
}

impl CreatePayment {
    pub fn new(
        users: Arc<dyn UserRepository>,
        orders: Arc<dyn OrderRepository>,
        payments: Arc<dyn PaymentRepository>,
        gateway: RobokassaGateway,
        currency: String,
        metrics: Metrics,
    ) -> Self {
        Self {
            users,
            orders,
            payments,
            gateway,
            currency,
            metrics,
        }
    }

    pub async fn execute(&self, input: CreatePaymentInput) -> Result<CreatePaymentOutput, AppError> {
        validate_telegram_id(input.telegram_id)?;
        if input.order_id <= 0 {
            return Err(AppError::Validation("order_id must be a positive number".to_string()));
        }
        if let Some(amount) = &input.amount {
            if !is_positive(amount) {
                return Err(AppError::Validation("amount must be positive".to_string()));
            }
        }

        let user = self
            .users
            .find_by_telegram_id(input.telegram_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("user {} is not registered", input.telegram_id))
            })?;

        // someone else's order is reported exactly like a missing one
        let order = self
            .orders
            .find(input.order_id)
            .await?
            .filter(|order| order.user_id == user.id)
            .ok_or_else(|| AppError::NotFound(format!("order {} not found", input.order_id)))?;

        if !order.status.is_payable() {
            return Err(AppError::Conflict(format!(
                "order {} is {} and cannot be paid",
                order.id, order.status
            )));
        }

        if let Some(amount) = &input.amount {
            if *amount != order.total_amount {
                return Err(AppError::Validation(format!(
                    "amount {} does not match order total {}",
                    format_amount(amount),
                    format_amount(&order.total_amount)
                )));
            }
        }

        let payment = self
            .payments
            .create_for_order(&NewPayment::new(
                order.id,
                order.total_amount.clone(),
                self.currency.clone(),
            ))
            .await?;
        self.metrics.payments_created.inc();

        let redirect_url = self.gateway.payment_url(
            payment.id,
            &payment.amount,
            &format!("Order #{}", order.id),
        );

        tracing::info!(
            payment_id = payment.id,
            order_id = order.id,
            amount = %format_amount(&payment.amount),
            "Payment created"
        );

        Ok(CreatePaymentOutput {
            payment_id: payment.id,
            order_id: order.id,
            amount: payment.amount,
            currency: payment.currency,
            transaction_id: payment.transaction_id,
            redirect_url: redirect_url.to_string(),
        })
    }
}
