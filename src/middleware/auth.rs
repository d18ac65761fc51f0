use crate::error::AppError;
use crate::AppState;
use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

pub const API_KEY_HEADER: &str = "x-api-key";

const PUBLIC_PATHS: [&str; 4] = [
    "/health",
    "/metrics",
    "/api/users/register",
    "/api/payments/callback",
];

/// Caller resolved from `X-API-Key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: i64,
    pub telegram_id: i64,
}

impl AuthenticatedUser {
    /// Authenticated callers may only act on their own Telegram id.
    pub fn ensure_owner(caller: Option<&Self>, telegram_id: i64) -> Result<(), AppError> {
        match caller {
            Some(user) if user.telegram_id != telegram_id => Err(AppError::Forbidden(
                "api key does not belong to this telegram_id".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

pub fn is_public_path(path: &str) -> bool {
    PUBLIC_PATHS.contains(&path) || path.starts_with("/api/artifacts/")
}

/// A provided API key must resolve to a user; the request then carries an
/// [`AuthenticatedUser`] extension and refreshes the user's `last_active`.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next<Body>,
) -> Response {
    if is_public_path(req.uri().path()) {
        return next.run(req).await;
    }

    let api_key = match req.headers().get(API_KEY_HEADER) {
        None => return next.run(req).await,
        Some(value) => match value.to_str() {
            Ok(key) if !key.trim().is_empty() => key.trim().to_string(),
            _ => return AppError::Unauthorized("malformed api key".to_string()).into_response(),
        },
    };

    let user = match state.users.find_by_api_key(&api_key).await {
        Ok(Some(user)) => user,
        Ok(None) => return AppError::Unauthorized("unknown api key".to_string()).into_response(),
        Err(e) => return AppError::from(e).into_response(),
    };

    if let Err(e) = state.users.touch(user.id).await {
        tracing::warn!(user_id = user.id, "Failed to refresh last_active: {}", e);
    }

    req.extensions_mut().insert(AuthenticatedUser {
        user_id: user.id,
        telegram_id: user.telegram_id,
    });
    next.run(req).await
}
