//! Create order use case.
//! Persists the order with its pending code request, then tries to retrieve
//! the codes once outside the transaction.

use super::fulfil_codes::{CodeFulfilment, FulfilmentOutcome, RetryPolicy};
use crate::domain::user::{validate_inn, validate_telegram_id};
use crate::domain::{
    CodeRequestPayload, CodeRequestStatus, GtinQuantity, NewCodeRequest, OrderStatus,
};
use crate::error::AppError;
use crate::metrics::Metrics;
use crate::ports::{OrderRepository, UserRepository};
use crate::services::order_assembly::assemble_order;
use crate::services::pricing::PricingSource;
use bigdecimal::BigDecimal;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct RequestCodesInput {
    pub telegram_id: i64,
    pub inn: String,
    pub gtin_data: Vec<GtinQuantity>,
}

#[derive(Debug)]
pub struct RequestCodesOutput {
    pub order_id: i64,
    pub order_status: OrderStatus,
    pub total_amount: BigDecimal,
    pub code_request_id: i64,
    pub code_status: CodeRequestStatus,
    pub codes: Vec<String>,
    pub artifact: Option<String>,
    pub message: Option<String>,
}

pub struct RequestCodes {
    users: Arc<dyn UserRepository>,
    orders: Arc<dyn OrderRepository>,
    pricing: Arc<dyn PricingSource>,
    fulfilment: CodeFulfilment,
    policy: RetryPolicy,
    metrics: Metrics,
}

impl RequestCodes {
    pub fn new(
        users: Arc<dyn UserRepository>,
        orders: Arc<dyn OrderRepository>,
        pricing: Arc<dyn PricingSource>,
        fulfilment: CodeFulfilment,
        policy: RetryPolicy,
        metrics: Metrics,
    ) -> Self {
        Self {
            users,
            orders,
            pricing,
            fulfilment,
            policy,
            metrics,
        }
    }

    pub async fn execute(&self, input: RequestCodesInput) -> Result<RequestCodesOutput, AppError> {
        validate_telegram_id(input.telegram_id)?;
        validate_inn(&input.inn)?;
        let inn = input.inn.trim().to_string();

        let user = self
            .users
            .find_by_telegram_id(input.telegram_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("user {} is not registered", input.telegram_id))
            })?;

        let draft = assemble_order(user.id, &input.gtin_data, self.pricing.as_ref())?;

        // the marking API gets the same normalized lines the order stores
        let payload = CodeRequestPayload {
            gtin_data: draft
                .items
                .iter()
                .map(|item| GtinQuantity {
                    gtin: item.gtin.to_string(),
                    count: item.quantity,
                })
                .collect(),
            inn,
        };
        let request = NewCodeRequest {
            telegram_id: input.telegram_id,
            payload,
        };

        let created = self
            .orders
            .create_with_code_request(&draft, &request, self.policy.lease)
            .await?;
        self.metrics.orders_created.inc();

        // Committed from here on: failures below only degrade the response.
        let outcome = match self.fulfilment.execute(&created.code_request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(
                    order_id = created.order.id,
                    code_request_id = created.code_request.id,
                    "Code request bookkeeping failed, left for the retry job: {}",
                    e
                );
                FulfilmentOutcome::Pending {
                    error: e.to_string(),
                }
            }
        };

        let message = match &outcome {
            FulfilmentOutcome::Completed { .. } => None,
            FulfilmentOutcome::Pending { .. } => {
                Some("codes are being retrieved, check the request status later".to_string())
            }
            FulfilmentOutcome::Failed { error, .. } => Some(error.clone()),
        };

        Ok(RequestCodesOutput {
            order_id: created.order.id,
            order_status: created.order.status,
            total_amount: created.order.total_amount,
            code_request_id: created.code_request.id,
            code_status: outcome.status(),
            codes: outcome.codes().to_vec(),
            artifact: outcome.artifact().map(str::to_string),
            message,
        })
    }
}
