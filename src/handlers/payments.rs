use super::extract::{ApiJson, ApiQuery};
use crate::domain::user::validate_telegram_id;
use crate::error::AppError;
use crate::middleware::AuthenticatedUser;
use crate::robokassa::CallbackParams;
use crate::schemas::{
    CreatePaymentRequest, CreatePaymentResponse, PaymentStatusQuery, PaymentStatusResponse, Success,
};
use crate::use_cases::CreatePaymentInput;
use crate::AppState;
use axum::{
    extract::{rejection::FormRejection, State},
    Extension, Form,
};

pub async fn create_payment(
    State(state): State<AppState>,
    caller: Option<Extension<AuthenticatedUser>>,
    ApiJson(payload): ApiJson<CreatePaymentRequest>,
) -> Result<Success<CreatePaymentResponse>, AppError> {
    AuthenticatedUser::ensure_owner(caller.as_deref(), payload.telegram_id)?;

    let output = state
        .create_payment
        .execute(CreatePaymentInput {
            telegram_id: payload.telegram_id,
            order_id: payload.order_id,
            amount: payload.amount,
        })
        .await?;

    Ok(Success::new(output.into()))
}

/// ResultURL delivered as a GET query string.
pub async fn callback_query(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<CallbackParams>,
) -> Result<String, AppError> {
    handle_callback(&state, params).await
}

/// ResultURL delivered as a POST form.
pub async fn callback_form(
    State(state): State<AppState>,
    form: Result<Form<CallbackParams>, FormRejection>,
) -> Result<String, AppError> {
    let Form(params) = form.map_err(|e| AppError::Validation(e.body_text()))?;
    handle_callback(&state, params).await
}

async fn handle_callback(state: &AppState, params: CallbackParams) -> Result<String, AppError> {
    tracing::info!(inv_id = %params.inv_id, out_sum = %params.out_sum, "Payment callback received");
    let outcome = state.payment_callback.execute(params).await?;
    Ok(outcome.acknowledgement)
}

pub async fn payment_status(
    State(state): State<AppState>,
    caller: Option<Extension<AuthenticatedUser>>,
    ApiQuery(query): ApiQuery<PaymentStatusQuery>,
) -> Result<Success<PaymentStatusResponse>, AppError> {
    validate_telegram_id(query.telegram_id)?;
    AuthenticatedUser::ensure_owner(caller.as_deref(), query.telegram_id)?;

    let payment = state
        .payments
        .find_for_telegram_user(query.id, query.telegram_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("payment {} not found", query.id)))?;

    Ok(Success::new(PaymentStatusResponse {
        payment: payment.into(),
    }))
}
