//! Request and response bodies of the HTTP API.

use crate::domain::money::format_amount;
use crate::domain::{CodeRequest, CodeRequestStatus, GtinQuantity, OrderStatus, Payment, PaymentStatus, User};
use crate::services::Artifact;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Success envelope: the payload's fields next to `"status": "success"`.
#[derive(Debug, Serialize)]
pub struct Success<T: Serialize> {
    pub status: &'static str,
    #[serde(flatten)]
    pub data: T,
}

impl<T: Serialize> Success<T> {
    pub fn new(data: T) -> Self {
        Self {
            status: "success",
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for Success<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Amounts always leave the API as two-decimal strings.
fn amount_string(amount: &bigdecimal::BigDecimal) -> String {
    format_amount(amount)
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub telegram_id: i64,
    #[serde(default)]
    pub inn: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub middle_name: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: i64,
    pub api_key: String,
    pub created: bool,
}

#[derive(Debug, Deserialize)]
pub struct TelegramQuery {
    pub telegram_id: i64,
}

#[derive(Debug, Serialize)]
pub struct UserSchema {
    pub id: i64,
    pub telegram_id: i64,
    pub inn: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub middle_name: Option<String>,
    pub username: Option<String>,
    pub full_name: String,
    pub registered_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl From<User> for UserSchema {
    fn from(user: User) -> Self {
        Self {
            full_name: user.full_name(),
            id: user.id,
            telegram_id: user.telegram_id,
            inn: user.inn,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            middle_name: user.middle_name,
            username: user.username,
            registered_at: user.registered_at,
            last_active: user.last_active,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: UserSchema,
}

#[derive(Debug, Deserialize)]
pub struct CodesRequest {
    pub telegram_id: i64,
    #[serde(default)]
    pub inn: String,
    #[serde(default)]
    pub gtin_data: Vec<GtinQuantity>,
}

#[derive(Debug, Serialize)]
pub struct CodesResponse {
    pub order_id: i64,
    pub order_status: OrderStatus,
    pub total_amount: String,
    pub request_id: i64,
    pub code_status: CodeRequestStatus,
    pub kizs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<crate::use_cases::RequestCodesOutput> for CodesResponse {
    fn from(out: crate::use_cases::RequestCodesOutput) -> Self {
        Self {
            order_id: out.order_id,
            order_status: out.order_status,
            total_amount: amount_string(&out.total_amount),
            request_id: out.code_request_id,
            code_status: out.code_status,
            kizs: out.codes,
            artifact: out.artifact.as_deref().map(Artifact::public_path),
            message: out.message,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RequestHistoryQuery {
    pub telegram_id: i64,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct IdQuery {
    pub id: i64,
}

#[derive(Debug, Serialize)]
pub struct CodeRequestSchema {
    pub id: i64,
    pub order_id: i64,
    pub telegram_id: i64,
    pub inn: String,
    pub gtin_data: Vec<GtinQuantity>,
    pub status: CodeRequestStatus,
    pub kizs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
    pub attempts: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CodeRequest> for CodeRequestSchema {
    fn from(request: CodeRequest) -> Self {
        Self {
            id: request.id,
            order_id: request.order_id,
            telegram_id: request.telegram_id,
            inn: request.inn,
            gtin_data: request.request_data.0.gtin_data,
            status: request.status,
            kizs: request.codes.0,
            artifact: request.artifact_path.as_deref().map(Artifact::public_path),
            attempts: request.attempts,
            last_error: request.last_error,
            created_at: request.created_at,
            updated_at: request.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RequestListResponse {
    pub requests: Vec<CodeRequestSchema>,
}

#[derive(Debug, Serialize)]
pub struct RequestStatusResponse {
    pub request: CodeRequestSchema,
}

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub telegram_id: i64,
    pub order_id: i64,
    /// Accepts a JSON number or string; compared against the order total.
    #[serde(default, with = "optional_amount")]
    pub amount: Option<bigdecimal::BigDecimal>,
}

#[derive(Debug, Serialize)]
pub struct CreatePaymentResponse {
    pub payment_id: i64,
    pub order_id: i64,
    pub amount: String,
    pub currency: String,
    pub transaction_id: Uuid,
    pub redirect_url: String,
}

impl From<crate::use_cases::CreatePaymentOutput> for CreatePaymentResponse {
    fn from(out: crate::use_cases::CreatePaymentOutput) -> Self {
        Self {
            payment_id: out.payment_id,
            order_id: out.order_id,
            amount: amount_string(&out.amount),
            currency: out.currency,
            transaction_id: out.transaction_id,
            redirect_url: out.redirect_url,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PaymentStatusQuery {
    pub id: i64,
    pub telegram_id: i64,
}

#[derive(Debug, Serialize)]
pub struct PaymentSchema {
    pub id: i64,
    pub order_id: i64,
    pub amount: String,
    pub currency: String,
    pub status: PaymentStatus,
    pub transaction_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<Payment> for PaymentSchema {
    fn from(payment: Payment) -> Self {
        Self {
            id: payment.id,
            order_id: payment.order_id,
            amount: amount_string(&payment.amount),
            currency: payment.currency,
            status: payment.status,
            transaction_id: payment.transaction_id,
            gateway_reference: payment.gateway_reference,
            created_at: payment.created_at,
            completed_at: payment.completed_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaymentStatusResponse {
    pub payment: PaymentSchema,
}

mod optional_amount {
    use bigdecimal::BigDecimal;
    use serde::{Deserialize, Deserializer};
    use std::str::FromStr;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<BigDecimal>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<Raw> = Option::deserialize(deserializer)?;
        let text = match raw {
            None => return Ok(None),
            Some(Raw::Text(s)) => s,
            Some(Raw::Number(n)) => n.to_string(),
        };
        BigDecimal::from_str(text.trim())
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid amount '{}'", text)))
    }
}
