use super::extract::ApiJson;
use crate::error::AppError;
use crate::middleware::AuthenticatedUser;
use crate::schemas::{CodesRequest, CodesResponse, Success};
use crate::use_cases::RequestCodesInput;
use crate::AppState;
use axum::{extract::State, Extension};

/// Creates an order for the requested GTINs and retrieves its marking codes.
/// A retrieval that cannot finish now still answers 200 with
/// `code_status: "pending"`; the order itself is already committed.
pub async fn request_codes(
    State(state): State<AppState>,
    caller: Option<Extension<AuthenticatedUser>>,
    ApiJson(payload): ApiJson<CodesRequest>,
) -> Result<Success<CodesResponse>, AppError> {
    AuthenticatedUser::ensure_owner(caller.as_deref(), payload.telegram_id)?;

    tracing::info!(
        telegram_id = payload.telegram_id,
        lines = payload.gtin_data.len(),
        "Processing code request"
    );

    let output = state
        .request_codes
        .execute(RequestCodesInput {
            telegram_id: payload.telegram_id,
            inn: payload.inn,
            gtin_data: payload.gtin_data,
        })
        .await?;

    Ok(Success::new(output.into()))
}
