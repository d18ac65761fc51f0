pub mod profiles;

use crate::domain::money::is_whole_cents;
use crate::robokassa::HashAlgorithm;
use crate::telemetry::LogFormat;
use anyhow::Context;
use bigdecimal::BigDecimal;
use dotenvy::dotenv;
use profiles::{Profile, ProfileDefaults};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// String that never shows up in logs or `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

#[derive(Debug, Clone)]
pub struct MarkingConfig {
    pub base_url: String,
    pub private_key_path: Option<PathBuf>,
    pub certificate_path: Option<PathBuf>,
    pub timeout: Duration,
}

impl MarkingConfig {
    /// Both the signing key and the certificate are required to call the API.
    pub fn is_configured(&self) -> bool {
        self.private_key_path.is_some() && self.certificate_path.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct RobokassaConfig {
    pub merchant_login: String,
    pub password: Secret,
    /// Password #2, used for ResultURL callbacks. Falls back to `password`.
    pub result_password: Option<Secret>,
    pub base_url: String,
    pub hash: HashAlgorithm,
    pub test_mode: bool,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct PricingConfig {
    pub unit_price: BigDecimal,
    pub overrides: HashMap<String, BigDecimal>,
}

#[derive(Debug, Clone)]
pub struct ArtifactConfig {
    pub dir: PathBuf,
    pub ttl: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub requests_per_second: u32,
    pub burst: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct CodeRetryConfig {
    pub interval: Duration,
    pub max_attempts: i32,
    pub batch_size: i64,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub db_max_connections: u32,
    pub marking: MarkingConfig,
    pub robokassa: RobokassaConfig,
    pub pricing: PricingConfig,
    pub artifacts: ArtifactConfig,
    pub rate_limit: RateLimitConfig,
    pub code_retry: CodeRetryConfig,
    pub cors_allowed_origins: Option<String>,
    pub log_format: LogFormat,
}

pub struct ConfigInfo {
    pub config: Config,
    pub profile: Profile,
    pub overrides: Vec<String>,
    pub warnings: Vec<String>,
}

/// Reads keys through a lookup function and records which ones were set.
struct Source<F> {
    lookup: F,
    overrides: Vec<String>,
}

impl<F> Source<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&mut self, key: &str) -> Option<String> {
        let value = (self.lookup)(key).filter(|v| !v.trim().is_empty());
        if value.is_some() {
            self.overrides.push(key.to_string());
        }
        value
    }

    fn parse_or<T>(&mut self, key: &str, default: T) -> anyhow::Result<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.get(key) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("{} has an invalid value '{}': {}", key, raw, e)),
            None => Ok(default),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<ConfigInfo> {
        dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<ConfigInfo>
    where
        F: Fn(&str) -> Option<String>,
    {
        let profile = Profile::parse(lookup("APP_PROFILE").as_deref());
        let defaults = ProfileDefaults::for_profile(profile);
        let mut src = Source {
            lookup,
            overrides: Vec::new(),
        };
        let mut warnings = Vec::new();

        let server_port = src.parse_or("SERVER_PORT", defaults.server_port)?;

        let database_url = match src.get("DATABASE_URL").or(defaults.database_url) {
            Some(url) => url,
            None => database_url_from_parts(&mut src)?,
        };
        let db_max_connections = src.parse_or("DB_MAX_CONNECTIONS", defaults.db_max_connections)?;

        let marking = MarkingConfig {
            base_url: src
                .get("CHESTNY_ZNAK_URL")
                .unwrap_or(defaults.marking_api_url)
                .trim_end_matches('/')
                .to_string(),
            private_key_path: src.get("PRIVATE_KEY_PATH").map(PathBuf::from),
            certificate_path: src.get("CERTIFICATE_PATH").map(PathBuf::from),
            timeout: Duration::from_secs(src.parse_or("CODES_API_TIMEOUT_SECS", 30u64)?),
        };
        if !marking.is_configured() {
            warnings.push(
                "PRIVATE_KEY_PATH or CERTIFICATE_PATH not set: code retrieval is disabled and requests stay pending"
                    .to_string(),
            );
        }

        let merchant_login = src
            .get("ROBOKASSA_LOGIN")
            .context("ROBOKASSA_LOGIN must be set")?;
        let password = src
            .get("ROBOKASSA_PASSWORD")
            .map(Secret::new)
            .context("ROBOKASSA_PASSWORD must be set")?;
        let robokassa = RobokassaConfig {
            merchant_login,
            password,
            result_password: src.get("ROBOKASSA_RESULT_PASSWORD").map(Secret::new),
            base_url: src.get("ROBOKASSA_URL").unwrap_or(defaults.robokassa_url),
            hash: src.parse_or("ROBOKASSA_HASH", HashAlgorithm::Sha256)?,
            test_mode: src.parse_or("ROBOKASSA_TEST_MODE", defaults.robokassa_test_mode)?,
            currency: src
                .get("PAYMENT_CURRENCY")
                .unwrap_or_else(|| "RUB".to_string()),
        };

        let unit_price: BigDecimal =
            src.parse_or("PRICING_UNIT_PRICE", BigDecimal::from(100))?;
        if unit_price < BigDecimal::from(0) {
            anyhow::bail!("PRICING_UNIT_PRICE must not be negative");
        }
        if !is_whole_cents(&unit_price) {
            anyhow::bail!("PRICING_UNIT_PRICE must have at most two decimals");
        }
        let pricing = PricingConfig {
            unit_price,
            overrides: match src.get("PRICING_OVERRIDES") {
                Some(raw) => parse_price_overrides(&raw)?,
                None => HashMap::new(),
            },
        };

        let artifacts = ArtifactConfig {
            dir: src
                .get("ARTIFACT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| std::env::temp_dir().join("kiz-artifacts")),
            ttl: Duration::from_secs(src.parse_or("ARTIFACT_TTL_SECS", 24 * 60 * 60u64)?),
        };

        let rate_limit = RateLimitConfig {
            requests_per_second: src.parse_or("RATE_LIMIT_RPS", defaults.rate_limit_rps)?,
            burst: src.parse_or("RATE_LIMIT_BURST", defaults.rate_limit_burst)?,
        };
        if rate_limit.requests_per_second == 0 || rate_limit.burst == 0 {
            anyhow::bail!("RATE_LIMIT_RPS and RATE_LIMIT_BURST must be positive");
        }

        let code_retry = CodeRetryConfig {
            interval: Duration::from_secs(src.parse_or("CODE_RETRY_INTERVAL_SECS", 60u64)?),
            max_attempts: src.parse_or("CODE_RETRY_MAX_ATTEMPTS", 5i32)?,
            batch_size: src.parse_or("CODE_RETRY_BATCH_SIZE", 20i64)?,
        };

        let cors_allowed_origins = src
            .get("CORS_ALLOWED_ORIGINS")
            .or(defaults.cors_allowed_origins);
        let log_format = src.parse_or("LOG_FORMAT", defaults.log_format)?;

        Ok(ConfigInfo {
            config: Config {
                server_port,
                database_url,
                db_max_connections,
                marking,
                robokassa,
                pricing,
                artifacts,
                rate_limit,
                code_retry,
                cors_allowed_origins,
                log_format,
            },
            profile,
            overrides: src.overrides,
            warnings,
        })
    }

    /// Key/value view of the effective configuration with credentials masked.
    pub fn masked_summary(&self) -> Vec<(&'static str, String)> {
        let opt_path = |p: &Option<PathBuf>| {
            p.as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<unset>".to_string())
        };

        vec![
            ("SERVER_PORT", self.server_port.to_string()),
            ("DATABASE_URL", mask_url_password(&self.database_url)),
            ("DB_MAX_CONNECTIONS", self.db_max_connections.to_string()),
            ("CHESTNY_ZNAK_URL", self.marking.base_url.clone()),
            ("PRIVATE_KEY_PATH", opt_path(&self.marking.private_key_path)),
            ("CERTIFICATE_PATH", opt_path(&self.marking.certificate_path)),
            ("CODES_API_TIMEOUT_SECS", self.marking.timeout.as_secs().to_string()),
            ("ROBOKASSA_LOGIN", self.robokassa.merchant_login.clone()),
            ("ROBOKASSA_PASSWORD", "***".to_string()),
            (
                "ROBOKASSA_RESULT_PASSWORD",
                if self.robokassa.result_password.is_some() {
                    "***".to_string()
                } else {
                    "<same as ROBOKASSA_PASSWORD>".to_string()
                },
            ),
            ("ROBOKASSA_URL", self.robokassa.base_url.clone()),
            ("ROBOKASSA_HASH", self.robokassa.hash.to_string()),
            ("ROBOKASSA_TEST_MODE", self.robokassa.test_mode.to_string()),
            ("PAYMENT_CURRENCY", self.robokassa.currency.clone()),
            ("PRICING_UNIT_PRICE", self.pricing.unit_price.to_string()),
            ("PRICING_OVERRIDES", self.pricing.overrides.len().to_string()),
            ("ARTIFACT_DIR", self.artifacts.dir.display().to_string()),
            ("ARTIFACT_TTL_SECS", self.artifacts.ttl.as_secs().to_string()),
            ("RATE_LIMIT_RPS", self.rate_limit.requests_per_second.to_string()),
            ("RATE_LIMIT_BURST", self.rate_limit.burst.to_string()),
            ("CODE_RETRY_INTERVAL_SECS", self.code_retry.interval.as_secs().to_string()),
            ("CODE_RETRY_MAX_ATTEMPTS", self.code_retry.max_attempts.to_string()),
            ("CODE_RETRY_BATCH_SIZE", self.code_retry.batch_size.to_string()),
            (
                "CORS_ALLOWED_ORIGINS",
                self.cors_allowed_origins
                    .clone()
                    .unwrap_or_else(|| "*".to_string()),
            ),
            ("LOG_FORMAT", self.log_format.to_string()),
        ]
    }
}

fn database_url_from_parts<F>(src: &mut Source<F>) -> anyhow::Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let password = src
        .get("DB_PASSWORD")
        .context("DATABASE_URL or DB_PASSWORD must be set")?;
    let host = src.get("DB_HOST").unwrap_or_else(|| "localhost".to_string());
    let port: u16 = src.parse_or("DB_PORT", 5432)?;
    let user = src.get("DB_USER").unwrap_or_else(|| "postgres".to_string());
    let name = src.get("DB_NAME").unwrap_or_else(|| "znak_db".to_string());
    let ssl_mode = src.get("DB_SSL_MODE").unwrap_or_else(|| "disable".to_string());

    let mut url = url::Url::parse(&format!("postgres://{}:{}/{}", host, port, name))
        .context("DB_HOST/DB_PORT/DB_NAME do not form a valid URL")?;
    url.set_username(&user)
        .map_err(|_| anyhow::anyhow!("DB_USER cannot be used in a URL"))?;
    url.set_password(Some(&password))
        .map_err(|_| anyhow::anyhow!("DB_PASSWORD cannot be used in a URL"))?;
    url.query_pairs_mut().append_pair("sslmode", &ssl_mode);
    Ok(url.to_string())
}

/// `gtin=price` pairs separated by commas.
fn parse_price_overrides(raw: &str) -> anyhow::Result<HashMap<String, BigDecimal>> {
    let mut overrides = HashMap::new();
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (gtin, price) = pair
            .split_once('=')
            .with_context(|| format!("PRICING_OVERRIDES entry '{}' is not gtin=price", pair))?;
        let price: BigDecimal = price
            .trim()
            .parse()
            .with_context(|| format!("PRICING_OVERRIDES price for '{}' is invalid", gtin))?;
        if price < BigDecimal::from(0) || !is_whole_cents(&price) {
            anyhow::bail!(
                "PRICING_OVERRIDES price for '{}' must be non-negative with at most two decimals",
                gtin
            );
        }
        overrides.insert(gtin.trim().to_string(), price);
    }
    Ok(overrides)
}

fn mask_url_password(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("***"));
            }
            url.to_string()
        }
        Err(_) => "<invalid url>".to_string(),
    }
}
