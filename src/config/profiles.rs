use crate::telemetry::LogFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Development,
    Staging,
    Production,
}

impl Profile {
    pub fn parse(raw: Option<&str>) -> Self {
        raw.and_then(|s| match s.to_lowercase().as_str() {
            "development" | "dev" => Some(Self::Development),
            "staging" | "stage" => Some(Self::Staging),
            "production" | "prod" => Some(Self::Production),
            _ => None,
        })
        .unwrap_or(Self::Development)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProfileDefaults {
    pub server_port: u16,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub marking_api_url: String,
    pub robokassa_url: String,
    pub robokassa_test_mode: bool,
    pub cors_allowed_origins: Option<String>,
    pub log_format: LogFormat,
    pub rate_limit_rps: u32,
    pub rate_limit_burst: u32,
}

impl ProfileDefaults {
    pub fn for_profile(profile: Profile) -> Self {
        match profile {
            Profile::Development => Self {
                server_port: 8080,
                database_url: None,
                db_max_connections: 5,
                marking_api_url: "https://api.stage.mdlp.crpt.ru".to_string(),
                robokassa_url: "https://auth.robokassa.ru/Merchant/Index.aspx".to_string(),
                robokassa_test_mode: true,
                cors_allowed_origins: None,
                log_format: LogFormat::Pretty,
                rate_limit_rps: 10,
                rate_limit_burst: 20,
            },
            Profile::Staging => Self {
                server_port: 8080,
                database_url: None,
                db_max_connections: 10,
                marking_api_url: "https://api.stage.mdlp.crpt.ru".to_string(),
                robokassa_url: "https://auth.robokassa.ru/Merchant/Index.aspx".to_string(),
                robokassa_test_mode: true,
                cors_allowed_origins: Some("https://staging.example.com".to_string()),
                log_format: LogFormat::Json,
                rate_limit_rps: 10,
                rate_limit_burst: 20,
            },
            Profile::Production => Self {
                server_port: 8080,
                database_url: None,
                db_max_connections: 20,
                marking_api_url: "https://api.mdlp.crpt.ru".to_string(),
                robokassa_url: "https://auth.robokassa.ru/Merchant/Index.aspx".to_string(),
                robokassa_test_mode: false,
                cors_allowed_origins: Some("https://app.example.com".to_string()),
                log_format: LogFormat::Json,
                rate_limit_rps: 10,
                rate_limit_burst: 20,
            },
        }
    }
}
