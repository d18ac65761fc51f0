//! Payment callback use case.
//! Verifies the gateway signature and completes the payment at most once;
//! the database trigger then moves the order to `paid`.

use crate::domain::money::format_amount;
use crate::domain::PaymentStatus;
use crate::error::AppError;
use crate::metrics::Metrics;
use crate::ports::PaymentRepository;
use crate::robokassa::{CallbackParams, GatewayError, RobokassaGateway};
use std::sync::Arc;

#[derive(Debug, PartialEq, Eq)]
pub struct CallbackOutcome {
    pub payment_id: i64,
    /// `false` when the payment had already been completed.
    pub newly_completed: bool,
    pub acknowledgement: String,
}

pub struct HandlePaymentCallback {
    payments: Arc<dyn PaymentRepository>,
    gateway: RobokassaGateway,
    metrics: Metrics,
}

impl HandlePaymentCallback {
    pub fn new(payments: Arc<dyn PaymentRepository>, gateway: RobokassaGateway, metrics: Metrics) -> Self {
        Self {
            payments,
            gateway,
            metrics,
        }
    }

    pub async fn execute(&self, params: CallbackParams) -> Result<CallbackOutcome, AppError> {
        let result = self.process(&params).await;
        let outcome = match &result {
            Ok(o) if o.newly_completed => "completed",
            Ok(_) => "duplicate",
            Err(AppError::InvalidSignature) => "invalid_signature",
            Err(_) => "rejected",
        };
        self.metrics.callback_outcome(outcome);
        result
    }

    async fn process(&self, params: &CallbackParams) -> Result<CallbackOutcome, AppError> {
        let verified = self.gateway.verify_callback(params).map_err(|e| {
            if e == GatewayError::InvalidSignature {
                tracing::warn!(inv_id = %params.inv_id, out_sum = %params.out_sum, "Callback signature mismatch");
            }
            AppError::from(e)
        })?;

        let payment = self
            .payments
            .find(verified.payment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("payment {} not found", verified.payment_id)))?;

        if let Some(transaction_id) = verified.transaction_id {
            if transaction_id != payment.transaction_id {
                return Err(AppError::Validation(format!(
                    "transaction id does not match payment {}",
                    payment.id
                )));
            }
        }

        if verified.amount != payment.amount {
            return Err(AppError::Validation(format!(
                "amount {} does not match payment amount {}",
                params.out_sum,
                format_amount(&payment.amount)
            )));
        }

        let acknowledgement = RobokassaGateway::acknowledgement(payment.id);
        let already_done = CallbackOutcome {
            payment_id: payment.id,
            newly_completed: false,
            acknowledgement: acknowledgement.clone(),
        };

        match payment.status {
            PaymentStatus::Completed => {
                tracing::info!(payment_id = payment.id, "Duplicate callback for completed payment");
                return Ok(already_done);
            }
            PaymentStatus::Pending => {}
            other => {
                return Err(AppError::Conflict(format!(
                    "payment {} is {} and cannot be completed",
                    payment.id, other
                )));
            }
        }

        let updated = self
            .payments
            .complete_if_pending(payment.id, verified.gateway_reference.as_deref())
            .await?;

        if !updated {
            // lost a race against another delivery of the same callback
            let current = self.payments.find(payment.id).await?;
            return match current.map(|p| p.status) {
                Some(PaymentStatus::Completed) => Ok(already_done),
                Some(status) => Err(AppError::Conflict(format!(
                    "payment {} is {} and cannot be completed",
                    payment.id, status
                ))),
                None => Err(AppError::NotFound(format!("payment {} not found", payment.id))),
            };
        }

        tracing::info!(
            payment_id = payment.id,
            order_id = payment.order_id,
            "Payment completed"
        );

        Ok(CallbackOutcome {
            payment_id: payment.id,
            newly_completed: true,
            acknowledgement,
        })
    }
}
