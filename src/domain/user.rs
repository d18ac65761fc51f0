use super::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Registered account, keyed by its Telegram id.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub telegram_id: i64,
    pub inn: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub middle_name: Option<String>,
    pub username: Option<String>,
    #[serde(skip_serializing, default)]
    pub api_key: String,
    pub registered_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl User {
    /// "Last First Middle", skipping missing parts.
    pub fn full_name(&self) -> String {
        [&self.last_name, &self.first_name, &self.middle_name]
            .into_iter()
            .filter_map(|part| part.as_deref())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Registration or re-registration request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Registration {
    pub telegram_id: i64,
    pub inn: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub middle_name: Option<String>,
    pub username: Option<String>,
}

impl Registration {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_telegram_id(self.telegram_id)?;
        validate_inn(&self.inn)?;

        if let Some(email) = self.email.as_deref().map(str::trim) {
            // same rule as the users.email CHECK: an '@' after the first character
            if !email.is_empty() && !matches!(email.find('@'), Some(at) if at > 0) {
                return Err(ValidationError::new(
                    "email must contain '@' after the local part",
                ));
            }
        }

        Ok(())
    }

    /// Blank optional strings are stored as NULL.
    pub fn normalized(mut self) -> Self {
        fn blank_to_none(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }

        self.inn = self.inn.trim().to_string();
        self.email = blank_to_none(self.email);
        self.first_name = blank_to_none(self.first_name);
        self.last_name = blank_to_none(self.last_name);
        self.middle_name = blank_to_none(self.middle_name);
        self.username = blank_to_none(self.username);
        self
    }
}

pub fn validate_telegram_id(telegram_id: i64) -> Result<(), ValidationError> {
    if telegram_id <= 0 {
        return Err(ValidationError::new("telegram_id must be a positive number"));
    }
    Ok(())
}

/// INN is 10 digits for organisations and 12 for individuals.
pub fn validate_inn(inn: &str) -> Result<(), ValidationError> {
    let inn = inn.trim();
    if inn.is_empty() {
        return Err(ValidationError::new("inn is required"));
    }
    if !(inn.len() == 10 || inn.len() == 12) || !inn.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::new("inn must be 10 or 12 digits"));
    }
    Ok(())
}

/// Fresh opaque access token for the API key header.
pub fn generate_api_key() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration() -> Registration {
        Registration {
            telegram_id: 123456789,
            inn: "7707083893".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_registration() {
        assert!(registration().validate().is_ok());
    }

    #[test]
    fn test_rejects_non_positive_telegram_id() {
        let mut reg = registration();
        reg.telegram_id = 0;
        assert!(reg.validate().is_err());
        reg.telegram_id = -4;
        assert!(reg.validate().is_err());
    }

    #[test]
    fn test_rejects_missing_or_malformed_inn() {
        let mut reg = registration();
        reg.inn = "".to_string();
        assert_eq!(reg.validate().unwrap_err().0, "inn is required");

        reg.inn = "77070838".to_string();
        assert!(reg.validate().is_err());

        reg.inn = "77070838AB".to_string();
        assert!(reg.validate().is_err());

        reg.inn = "500100732259".to_string();
        assert!(reg.validate().is_ok());
    }

    #[test]
    fn test_rejects_email_without_at() {
        let mut reg = registration();
        reg.email = Some("user.example.com".to_string());
        assert!(reg.validate().is_err());

        reg.email = Some("user@example.com".to_string());
        assert!(reg.validate().is_ok());
    }

    #[test]
    fn test_rejects_email_with_empty_local_part() {
        let mut reg = registration();
        for email in ["@x", "  @example.com"] {
            reg.email = Some(email.to_string());
            let err = reg.validate().unwrap_err();
            assert!(err.0.contains("local part"), "{}", email);
        }

        reg.email = Some("a@x".to_string());
        assert!(reg.validate().is_ok());
    }

    #[test]
    fn test_normalized_drops_blank_fields() {
        let reg = Registration {
            email: Some("   ".to_string()),
            first_name: Some(" Ivan ".to_string()),
            ..registration()
        }
        .normalized();

        assert_eq!(reg.email, None);
        assert_eq!(reg.first_name.as_deref(), Some("Ivan"));
    }

    #[test]
    fn test_full_name_skips_missing_parts() {
        let now = Utc::now();
        let user = User {
            id: 1,
            telegram_id: 1,
            inn: "7707083893".to_string(),
            email: None,
            first_name: Some("Ivan".to_string()),
            last_name: Some("Petrov".to_string()),
            middle_name: None,
            username: None,
            api_key: "k".to_string(),
            registered_at: now,
            last_active: now,
        };
        assert_eq!(user.full_name(), "Petrov Ivan");
    }

    #[test]
    fn test_generated_api_keys_differ() {
        let a = generate_api_key();
        let b = generate_api_key();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }
}
