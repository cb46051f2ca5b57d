use crate::{Result, ShoppingError};
use chrono::{DateTime, Duration, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

pub const AGENT_ID_PREFIX: &str = "BuyWhenReady-gemini-";
pub const ANONYMOUS_USERNAME: &str = "anonymous";
pub const MAX_BUDGET_LIMIT: f64 = 10_000.0;
pub const MAX_DURATION_HOURS: i64 = 168;

pub fn agent_id_for(username: &str) -> String {
    format!("{}{}", AGENT_ID_PREFIX, username)
}

pub fn anonymous_agent_id() -> String {
    agent_id_for(ANONYMOUS_USERNAME)
}

// Demo verification: any six ASCII digits pass.
pub fn is_six_digit_code(code: &str) -> bool {
    code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserRecord {
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub login_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    pub agent_id: String,
    pub username: String,
    pub session_name: String,
    pub max_budget: f64,
    pub expiration_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub status: AgentStatus,
}

impl AgentConfig {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expiration_time
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExpirationType {
    Duration,
    Datetime,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConfigureRequest {
    pub username: Option<String>,
    pub session_name: Option<String>,
    pub max_budget: Option<f64>,
    pub expiration_type: Option<ExpirationType>,
    pub duration: Option<i64>,
    pub expiration_date: Option<String>,
}

impl ConfigureRequest {
    pub fn validate(&self) -> Result<()> {
        match self.max_budget {
            Some(budget) if (1.0..=MAX_BUDGET_LIMIT).contains(&budget) => {}
            Some(_) => {
                return Err(ShoppingError::Validation(format!(
                    "Budget must be between $1 and ${:.0}",
                    MAX_BUDGET_LIMIT
                )))
            }
            None => return Err(ShoppingError::Validation("Budget is required".to_string())),
        }

        if self.expiration_type.unwrap_or(ExpirationType::Duration) == ExpirationType::Duration {
            match self.duration {
                Some(hours) if (1..=MAX_DURATION_HOURS).contains(&hours) => {}
                _ => {
                    return Err(ShoppingError::Validation(format!(
                        "Duration must be between 1 and {} hours",
                        MAX_DURATION_HOURS
                    )))
                }
            }
        }

        Ok(())
    }

    // Duration expirations count from `now`; datetime expirations accept a
    // browser `datetime-local` value (server local time) or RFC 3339.
    pub fn resolve_expiration(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        match self.expiration_type.unwrap_or(ExpirationType::Duration) {
            ExpirationType::Duration => {
                let hours = self
                    .duration
                    .ok_or_else(|| ShoppingError::Validation("Duration is required".to_string()))?;
                Ok(now + Duration::hours(hours))
            }
            ExpirationType::Datetime => {
                let raw = self
                    .expiration_date
                    .as_deref()
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| ShoppingError::Validation("Expiration date is required".to_string()))?;
                parse_expiration_date(raw)
            }
        }
    }
}

pub fn parse_expiration_date(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }

    let naive = ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .ok_or_else(|| ShoppingError::Validation(format!("Invalid expiration date: {}", raw)))?;

    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| ShoppingError::Validation(format!("Invalid local time: {}", raw)))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
}

impl ActionResponse {
    pub fn ok(message: impl Into<String>, redirect_url: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            redirect_url: Some(redirect_url.into()),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            redirect_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AuthStatus {
    pub authenticated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_config: Option<AgentConfig>,
}

impl AuthStatus {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user_info(&self) -> Option<UserInfo> {
        if !self.authenticated {
            return None;
        }
        Some(UserInfo {
            username: self.username.clone().unwrap_or_default(),
            agent_id: self.agent_id.clone().unwrap_or_default(),
            email: self.email.clone(),
            agent_config: self.agent_config.clone(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserInfo {
    pub username: String,
    pub agent_id: String,
    pub email: Option<String>,
    pub agent_config: Option<AgentConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpendingLimits {
    pub max_budget: f64,
    pub remaining_budget: f64,
    pub currency: String,
}

impl SpendingLimits {
    pub fn none() -> Self {
        Self {
            max_budget: 0.0,
            remaining_budget: 0.0,
            currency: "USD".to_string(),
        }
    }

    // Spending is not tracked, so the whole budget remains available.
    pub fn from_config(config: Option<&AgentConfig>) -> Self {
        match config {
            Some(config) => Self {
                max_budget: config.max_budget,
                remaining_budget: config.max_budget,
                currency: "USD".to_string(),
            },
            None => Self::none(),
        }
    }
}

fn default_user_id() -> String {
    "default_user".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default = "default_user_id")]
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    pub response: String,
    pub agent_id: String,
    pub authenticated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(budget: f64, duration: i64) -> ConfigureRequest {
        ConfigureRequest {
            username: Some("shopper".to_string()),
            max_budget: Some(budget),
            expiration_type: Some(ExpirationType::Duration),
            duration: Some(duration),
            ..Default::default()
        }
    }

    #[test]
    fn test_agent_id_format() {
        assert_eq!(agent_id_for("shopper"), "BuyWhenReady-gemini-shopper");
        assert_eq!(anonymous_agent_id(), "BuyWhenReady-gemini-anonymous");
    }

    #[test]
    fn test_six_digit_code() {
        assert!(is_six_digit_code("123456"));
        assert!(is_six_digit_code("000000"));
        assert!(!is_six_digit_code("12345"));
        assert!(!is_six_digit_code("12345a"));
        assert!(!is_six_digit_code("١٢٣٤٥٦"));
    }

    #[test]
    fn test_configure_validation() {
        assert!(request(1000.0, 24).validate().is_ok());
        assert!(request(0.0, 24).validate().is_err());
        assert!(request(20_000.0, 24).validate().is_err());
        assert!(request(1.0, 24).validate().is_ok());
        assert!(request(MAX_BUDGET_LIMIT, 24).validate().is_ok());
        // the message promises $1 as the floor
        match request(0.5, 24).validate() {
            Err(ShoppingError::Validation(msg)) => assert_eq!(msg, "Budget must be between $1 and $10000"),
            other => panic!("expected a validation error, got {:?}", other),
        }
        assert!(request(500.0, 0).validate().is_err());
        assert!(request(500.0, 169).validate().is_err());
    }

    #[test]
    fn test_duration_expiration() {
        let now = Utc::now();
        let expiration = request(100.0, 24).resolve_expiration(now).unwrap();
        assert_eq!(expiration - now, Duration::hours(24));
    }

    #[test]
    fn test_datetime_expiration_formats() {
        let rfc = parse_expiration_date("2030-01-02T03:04:05Z").unwrap();
        assert_eq!(rfc.to_rfc3339(), "2030-01-02T03:04:05+00:00");

        assert!(parse_expiration_date("2030-01-02T03:04").is_ok());
        assert!(parse_expiration_date("tomorrow").is_err());
    }

    #[test]
    fn test_agent_config_expiry() {
        let now = Utc::now();
        let config = AgentConfig {
            agent_id: agent_id_for("shopper"),
            username: "shopper".to_string(),
            session_name: "s".to_string(),
            max_budget: 50.0,
            expiration_time: now - Duration::minutes(1),
            created_at: now - Duration::hours(1),
            status: AgentStatus::Active,
        };
        assert!(config.is_expired(now));
        assert_eq!(SpendingLimits::from_config(Some(&config)).remaining_budget, 50.0);
        assert_eq!(SpendingLimits::from_config(None).max_budget, 0.0);
    }
}
