use super::extract::ApiQuery;
use crate::domain::user::validate_telegram_id;
use crate::error::AppError;
use crate::middleware::AuthenticatedUser;
use crate::schemas::{IdQuery, RequestHistoryQuery, RequestListResponse, RequestStatusResponse, Success};
use crate::AppState;
use axum::{extract::State, Extension};

const DEFAULT_LIMIT: i64 = 10;
const MAX_LIMIT: i64 = 100;

pub async fn list_requests(
    State(state): State<AppState>,
    caller: Option<Extension<AuthenticatedUser>>,
    ApiQuery(query): ApiQuery<RequestHistoryQuery>,
) -> Result<Success<RequestListResponse>, AppError> {
    validate_telegram_id(query.telegram_id)?;
    AuthenticatedUser::ensure_owner(caller.as_deref(), query.telegram_id)?;

    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let requests = state
        .code_requests
        .list_for_telegram_id(query.telegram_id, limit)
        .await?;

    Ok(Success::new(RequestListResponse {
        requests: requests.into_iter().map(Into::into).collect(),
    }))
}

pub async fn request_status(
    State(state): State<AppState>,
    caller: Option<Extension<AuthenticatedUser>>,
    ApiQuery(query): ApiQuery<IdQuery>,
) -> Result<Success<RequestStatusResponse>, AppError> {
    let request = state
        .code_requests
        .find(query.id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("request {} not found", query.id)))?;

    AuthenticatedUser::ensure_owner(caller.as_deref(), request.telegram_id)?;

    Ok(Success::new(RequestStatusResponse {
        request: request.into(),
    }))
}
