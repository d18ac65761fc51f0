use super::order::GtinQuantity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "code_request_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CodeRequestStatus {
    /// Retrieval not finished yet; the retry job will pick it up.
    Pending,
    Completed,
    Failed,
}

impl CodeRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for CodeRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body sent to the marking API. Field order is part of the signed bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeRequestPayload {
    pub gtin_data: Vec<GtinQuantity>,
    pub inn: String,
}

impl CodeRequestPayload {
    pub fn to_canonical_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Record of a code retrieval for one order.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CodeRequest {
    pub id: i64,
    pub order_id: i64,
    pub user_id: i64,
    pub telegram_id: i64,
    pub inn: String,
    pub request_data: Json<CodeRequestPayload>,
    pub status: CodeRequestStatus,
    pub codes: Json<Vec<String>>,
    pub artifact_path: Option<String>,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub next_attempt_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CodeRequest {
    pub fn payload(&self) -> &CodeRequestPayload {
        &self.request_data.0
    }
}

/// Pending code request written in the same transaction as its order.
#[derive(Debug, Clone)]
pub struct NewCodeRequest {
    pub telegram_id: i64,
    pub payload: CodeRequestPayload,
}
