use std::env;

use chrono::FixedOffset;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub email: EmailConfig,
    pub sms: SmsConfig,
    pub reminders: ReminderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Base URL of the review front-end; review links are built from it.
    pub frontend_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    /// SendGrid API key. Only required when the email channel is selected.
    pub api_key: Option<String>,
    pub from_address: Option<String>,
    /// SendGrid dynamic template id used for both reminder kinds.
    pub template_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmsConfig {
    /// Twilio credentials. Only required when the SMS channel is selected.
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub from_number: Option<String>,
}

/// Delivery channel for a deployment. One channel per process; the other
/// provider's credentials may be left unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ReminderChannel {
    Email,
    Sms,
}

impl ReminderChannel {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "email" => Some(ReminderChannel::Email),
            "sms" => Some(ReminderChannel::Sms),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderChannel::Email => "email",
            ReminderChannel::Sms => "sms",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReminderConfig {
    pub channel: ReminderChannel,
    /// Hours after the appointment before the initial reminder is due.
    pub initial_offset_hours: i64,
    /// Hours after the appointment before the follow-up reminder is due.
    pub follow_up_offset_hours: i64,
    /// How often (seconds) the initial cycle polls for due rows.
    pub initial_poll_seconds: u64,
    /// How often (seconds) the follow-up cycle polls for due rows.
    pub follow_up_poll_seconds: u64,
    /// Civil-timezone offset used when rendering timestamps in logs,
    /// e.g. "+05:00". Comparisons are done in UTC regardless.
    #[serde(with = "fixed_offset_serde")]
    pub utc_offset: FixedOffset,
}

mod fixed_offset_serde {
    use chrono::FixedOffset;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<FixedOffset, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
                frontend_url: env::var("FRONTEND_URL")
                    .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://data/reminders.db".to_string()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            },
            email: EmailConfig {
                api_key: env::var("SENDGRID_API_KEY").ok(),
                from_address: env::var("EMAIL_FROM_ADDRESS").ok(),
                template_id: env::var("EMAIL_TEMPLATE_ID").ok(),
            },
            sms: SmsConfig {
                account_sid: env::var("TWILIO_ACCOUNT_SID").ok(),
                auth_token: env::var("TWILIO_AUTH_TOKEN").ok(),
                from_number: env::var("TWILIO_FROM_NUMBER").ok(),
            },
            reminders: ReminderConfig {
                channel: match env::var("REMINDER_CHANNEL") {
                    Ok(v) => ReminderChannel::parse(&v)
                        .ok_or_else(|| ConfigError::InvalidValue("REMINDER_CHANNEL".to_string()))?,
                    Err(_) => ReminderChannel::Email,
                },
                initial_offset_hours: env::var("REMINDER_INITIAL_OFFSET_HOURS")
                    .unwrap_or_else(|_| "2".to_string())
                    .parse()
                    .unwrap_or(2),
                follow_up_offset_hours: env::var("REMINDER_FOLLOW_UP_OFFSET_HOURS")
                    .unwrap_or_else(|_| "24".to_string())
                    .parse()
                    .unwrap_or(24),
                initial_poll_seconds: env::var("REMINDER_INITIAL_POLL_SECONDS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .unwrap_or(60),
                follow_up_poll_seconds: env::var("REMINDER_FOLLOW_UP_POLL_SECONDS")
                    .unwrap_or_else(|_| "120".to_string())
                    .parse()
                    .unwrap_or(120),
                utc_offset: env::var("REMINDER_UTC_OFFSET")
                    .unwrap_or_else(|_| "+00:00".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("REMINDER_UTC_OFFSET".to_string()))?,
            },
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                frontend_url: "http://localhost:3000".to_string(),
            },
            database: DatabaseConfig {
                url: "sqlite://data/reminders.db".to_string(),
                max_connections: 5,
            },
            email: EmailConfig {
                api_key: None,
                from_address: None,
                template_id: None,
            },
            sms: SmsConfig {
                account_sid: None,
                auth_token: None,
                from_number: None,
            },
            reminders: ReminderConfig {
                channel: ReminderChannel::Email,
                initial_offset_hours: 2,
                follow_up_offset_hours: 24,
                initial_poll_seconds: 60,
                follow_up_poll_seconds: 120,
                utc_offset: FixedOffset::east_opt(0).unwrap(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_parse_accepts_known_values() {
        assert_eq!(ReminderChannel::parse("email"), Some(ReminderChannel::Email));
        assert_eq!(ReminderChannel::parse("SMS"), Some(ReminderChannel::Sms));
        assert_eq!(ReminderChannel::parse("carrier-pigeon"), None);
    }

    #[test]
    fn default_offsets_match_deployment_defaults() {
        let config = Config::default();
        assert_eq!(config.reminders.initial_offset_hours, 2);
        assert_eq!(config.reminders.follow_up_offset_hours, 24);
    }
}
