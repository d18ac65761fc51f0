//! Robokassa payment gateway: redirect links and ResultURL callback checks.

use crate::config::{RobokassaConfig, Secret};
use crate::domain::money::{format_amount, parse_amount};
use bigdecimal::BigDecimal;
use serde::Deserialize;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum GatewayError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid callback: {0}")]
    InvalidCallback(String),
    #[error("invalid gateway url: {0}")]
    InvalidUrl(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
    Sha1,
}

impl FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "").as_str() {
            "sha256" => Ok(Self::Sha256),
            "sha1" => Ok(Self::Sha1),
            other => Err(format!("unsupported hash algorithm '{}'", other)),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sha256 => f.write_str("sha256"),
            Self::Sha1 => f.write_str("sha1"),
        }
    }
}

/// Lowercase hex digest of the parts joined with `:`.
pub fn compute_signature(parts: &[&str], algorithm: HashAlgorithm) -> String {
    let joined = parts.join(":");
    match algorithm {
        HashAlgorithm::Sha256 => hex::encode(Sha256::digest(joined.as_bytes())),
        HashAlgorithm::Sha1 => hex::encode(Sha1::digest(joined.as_bytes())),
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// ResultURL parameters, as sent by the gateway in the query string or form.
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackParams {
    #[serde(rename = "InvId")]
    pub inv_id: String,
    #[serde(rename = "OutSum")]
    pub out_sum: String,
    #[serde(rename = "SignatureValue")]
    pub signature_value: String,
    #[serde(rename = "Shp_TransactionId", default)]
    pub transaction_id: Option<String>,
    #[serde(rename = "PaymentMethod", default)]
    pub payment_method: Option<String>,
}

/// Callback whose signature checked out.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedCallback {
    pub payment_id: i64,
    pub amount: BigDecimal,
    pub transaction_id: Option<Uuid>,
    /// Payment method reported by the gateway, kept as the gateway reference.
    pub gateway_reference: Option<String>,
}

#[derive(Clone)]
pub struct RobokassaGateway {
    merchant_login: String,
    password: Secret,
    result_password: Secret,
    base_url: Url,
    hash: HashAlgorithm,
    test_mode: bool,
}

impl RobokassaGateway {
    pub fn new(config: &RobokassaConfig) -> Result<Self, GatewayError> {
        let base_url =
            Url::parse(&config.base_url).map_err(|e| GatewayError::InvalidUrl(e.to_string()))?;

        Ok(Self {
            merchant_login: config.merchant_login.clone(),
            password: config.password.clone(),
            result_password: config
                .result_password
                .clone()
                .unwrap_or_else(|| config.password.clone()),
            base_url,
            hash: config.hash,
            test_mode: config.test_mode,
        })
    }

    /// `hex(hash(login:OutSum:InvId:password))` with OutSum at two decimals.
    pub fn payment_signature(&self, payment_id: i64, amount: &BigDecimal) -> String {
        compute_signature(
            &[
                &self.merchant_login,
                &format_amount(amount),
                &payment_id.to_string(),
                self.password.expose(),
            ],
            self.hash,
        )
    }

    /// Redirect link the customer follows to pay.
    pub fn payment_url(&self, payment_id: i64, amount: &BigDecimal, description: &str) -> Url {
        let out_sum = format_amount(amount);
        let inv_id = payment_id.to_string();
        let signature = self.payment_signature(payment_id, amount);

        let mut url = self.base_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("MerchantLogin", &self.merchant_login)
                .append_pair("OutSum", &out_sum)
                .append_pair("InvId", &inv_id)
                .append_pair("SignatureValue", &signature)
                .append_pair("Description", description)
                .append_pair("Culture", "ru");
            if self.test_mode {
                query.append_pair("IsTest", "1");
            }
        }
        url
    }

    /// Recomputes `hex(hash(OutSum:InvId:result_password))` over the strings
    /// exactly as received. Nothing is parsed before the signature matches.
    pub fn verify_callback(&self, params: &CallbackParams) -> Result<VerifiedCallback, GatewayError> {
        let expected = compute_signature(
            &[&params.out_sum, &params.inv_id, self.result_password.expose()],
            self.hash,
        );
        let received = params.signature_value.trim().to_ascii_lowercase();
        if !constant_time_eq(expected.as_bytes(), received.as_bytes()) {
            return Err(GatewayError::InvalidSignature);
        }

        let payment_id = params
            .inv_id
            .trim()
            .parse::<i64>()
            .map_err(|_| GatewayError::InvalidCallback(format!("InvId '{}' is not a number", params.inv_id)))?;
        let amount = parse_amount(&params.out_sum).ok_or_else(|| {
            GatewayError::InvalidCallback(format!("OutSum '{}' is not an amount", params.out_sum))
        })?;
        let transaction_id = match params.transaction_id.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(Uuid::parse_str(raw).map_err(|_| {
                GatewayError::InvalidCallback(format!("Shp_TransactionId '{}' is not a uuid", raw))
            })?),
        };

        Ok(VerifiedCallback {
            payment_id,
            amount,
            transaction_id,
            gateway_reference: params
                .payment_method
                .as_deref()
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string),
        })
    }

    /// Body the gateway expects from ResultURL on success.
    pub fn acknowledgement(payment_id: i64) -> String {
        format!("OK{}", payment_id)
    }
}

impl fmt::Debug for RobokassaGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RobokassaGateway")
            .field("merchant_login", &self.merchant_login)
            .field("base_url", &self.base_url.as_str())
            .field("hash", &self.hash)
            .field("test_mode", &self.test_mode)
            .finish()
    }
}
