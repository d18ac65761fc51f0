use super::extract::{ApiJson, ApiQuery};
use crate::domain::user::validate_telegram_id;
use crate::domain::Registration;
use crate::error::AppError;
use crate::middleware::AuthenticatedUser;
use crate::schemas::{RegisterRequest, RegisterResponse, Success, TelegramQuery, UserResponse};
use crate::AppState;
use axum::{extract::State, Extension};

pub async fn register(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> Result<Success<RegisterResponse>, AppError> {
    let registration = Registration {
        telegram_id: payload.telegram_id,
        inn: payload.inn,
        email: payload.email,
        first_name: payload.first_name,
        last_name: payload.last_name,
        middle_name: payload.middle_name,
        username: payload.username,
    };

    let output = state.register_user.execute(registration).await?;

    Ok(Success::new(RegisterResponse {
        user_id: output.user_id,
        api_key: output.api_key,
        created: output.created,
    }))
}

pub async fn get_user(
    State(state): State<AppState>,
    caller: Option<Extension<AuthenticatedUser>>,
    ApiQuery(query): ApiQuery<TelegramQuery>,
) -> Result<Success<UserResponse>, AppError> {
    validate_telegram_id(query.telegram_id)?;
    AuthenticatedUser::ensure_owner(caller.as_deref(), query.telegram_id)?;

    let user = state
        .users
        .find_by_telegram_id(query.telegram_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {} is not registered", query.telegram_id)))?;

    Ok(Success::new(UserResponse { user: user.into() }))
}
