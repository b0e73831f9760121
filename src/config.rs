//! Application configuration loaded and validated once at startup.

use std::env;

use chrono::{Duration, FixedOffset, NaiveTime};
use thiserror::Error;

use crate::clock::Calendar;

/// Number of questions every daily quiz carries.
pub const QUESTIONS_PER_QUIZ: usize = 50;
/// Number of options every question carries.
pub const OPTIONS_PER_QUESTION: usize = 4;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: &'static str, message: String },
}

/// Immutable runtime configuration shared across the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// `production` tightens secret requirements.
    pub app_env: String,
    pub server_port: u16,

    /// MongoDB connection string for the state store.
    pub store_uri: String,
    pub store_db: String,
    /// Coordinator connection string; absent selects the in-process backend.
    pub coordinator_uri: Option<String>,

    pub jwt_secret: String,
    pub jwt_refresh_secret: String,
    pub jwt_ttl_seconds: i64,
    pub otp_hash_secret: String,
    pub otp_ttl_seconds: i64,
    pub webhook_secret: String,

    /// Fixed offset of the quiz zone, minutes east of UTC.
    pub zone_offset_minutes: i32,
    pub zone_label: String,
    pub live_hour: u32,
    pub live_minute: u32,
    pub lock_lead: Duration,
    pub payment_cutoff_lead: Duration,
    pub quiz_duration: Duration,
    pub question_seconds: i64,

    pub winners_count: usize,
    pub free_credit_enabled: bool,
    pub join_soft_cap: u32,
    pub rapid_answer_floor_ms: i64,
    /// Retention for per-slot progress audit records.
    pub progress_retention: Duration,
}

impl AppConfig {
    /// Load configuration from the environment. Missing required secrets in
    /// production abort startup through the returned error.
    pub fn from_env() -> Result<Self, ConfigError> {
        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "development".into());
        let production = app_env == "production";

        let config = Self {
            server_port: parse_var("SERVER_PORT", 8080)?,
            store_uri: var_or("STORE_URI", "mongodb://localhost:27017", production)?,
            store_db: env::var("STORE_DB").unwrap_or_else(|_| "brainrush".into()),
            coordinator_uri: env::var("COORDINATOR_URI").ok().filter(|v| !v.is_empty()),
            jwt_secret: var_or("JWT_SECRET", "dev-jwt-secret", production)?,
            jwt_refresh_secret: var_or("JWT_REFRESH_SECRET", "dev-jwt-refresh", production)?,
            jwt_ttl_seconds: parse_var("JWT_TTL_SECONDS", 3600)?,
            otp_hash_secret: var_or("OTP_HASH_SECRET", "dev-otp-secret", production)?,
            otp_ttl_seconds: parse_var("OTP_TTL_SECONDS", 300)?,
            webhook_secret: var_or("WEBHOOK_SECRET", "dev-webhook-secret", production)?,
            zone_offset_minutes: parse_var("ZONE_OFFSET_MINUTES", 330)?,
            zone_label: env::var("ZONE_LABEL").unwrap_or_else(|_| "Asia/Kolkata".into()),
            live_hour: parse_var("LIVE_HOUR", 20)?,
            live_minute: parse_var("LIVE_MINUTE", 0)?,
            lock_lead: Duration::minutes(parse_var("LOCK_LEAD_MINUTES", 10)?),
            payment_cutoff_lead: Duration::minutes(parse_var("PAYMENT_CUTOFF_LEAD_MINUTES", 5)?),
            quiz_duration: Duration::minutes(parse_var("QUIZ_DURATION_MINUTES", 30)?),
            question_seconds: parse_var("QUESTION_SECONDS", 15)?,
            winners_count: parse_var("WINNERS_COUNT", 20)?,
            free_credit_enabled: parse_var("FREE_CREDIT_ENABLED", false)?,
            join_soft_cap: parse_var("JOIN_SOFT_CAP", 500)?,
            rapid_answer_floor_ms: parse_var("RAPID_ANSWER_FLOOR_MS", 2_000)?,
            progress_retention: Duration::days(parse_var("PROGRESS_RETENTION_DAYS", 7)?),
            app_env,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.winners_count == 0 || self.winners_count > 20 {
            return Err(ConfigError::InvalidValue {
                name: "WINNERS_COUNT",
                message: format!("must be between 1 and 20, got {}", self.winners_count),
            });
        }
        if self.question_seconds <= 0 {
            return Err(ConfigError::InvalidValue {
                name: "QUESTION_SECONDS",
                message: "must be positive".into(),
            });
        }
        if self.quiz_duration <= Duration::zero() {
            return Err(ConfigError::InvalidValue {
                name: "QUIZ_DURATION_MINUTES",
                message: "must be positive".into(),
            });
        }
        if self.live_hour > 23 || self.live_minute > 59 {
            return Err(ConfigError::InvalidValue {
                name: "LIVE_HOUR",
                message: format!("{}:{:02} is not a valid time", self.live_hour, self.live_minute),
            });
        }
        if FixedOffset::east_opt(self.zone_offset_minutes * 60).is_none() {
            return Err(ConfigError::InvalidValue {
                name: "ZONE_OFFSET_MINUTES",
                message: format!("{} is out of range", self.zone_offset_minutes),
            });
        }
        Ok(())
    }

    /// Build the calendar resolving civil dates and daily deadlines.
    pub fn calendar(&self) -> Calendar {
        Calendar::new(
            FixedOffset::east_opt(self.zone_offset_minutes * 60)
                .expect("offset validated at startup"),
            self.zone_label.clone(),
            NaiveTime::from_hms_opt(self.live_hour, self.live_minute, 0)
                .expect("live time validated at startup"),
            self.lock_lead,
            self.payment_cutoff_lead,
            self.quiz_duration,
        )
    }

    /// Configuration for local runs and tests, no environment required.
    pub fn for_tests() -> Self {
        Self {
            app_env: "test".into(),
            server_port: 0,
            store_uri: "mongodb://localhost:27017".into(),
            store_db: "brainrush-test".into(),
            coordinator_uri: None,
            jwt_secret: "test-jwt".into(),
            jwt_refresh_secret: "test-refresh".into(),
            jwt_ttl_seconds: 3600,
            otp_hash_secret: "test-otp".into(),
            otp_ttl_seconds: 300,
            webhook_secret: "test-webhook".into(),
            zone_offset_minutes: 330,
            zone_label: "Asia/Kolkata".into(),
            live_hour: 20,
            live_minute: 0,
            lock_lead: Duration::minutes(10),
            payment_cutoff_lead: Duration::minutes(5),
            quiz_duration: Duration::minutes(30),
            question_seconds: 15,
            winners_count: 20,
            free_credit_enabled: false,
            join_soft_cap: 500,
            rapid_answer_floor_ms: 2_000,
            progress_retention: Duration::days(7),
        }
    }
}

/// Read a required-in-production variable, falling back to a dev default.
fn var_or(
    name: &'static str,
    dev_default: &str,
    production: bool,
) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ if production => Err(ConfigError::MissingVar(name)),
        _ => Ok(dev_default.to_owned()),
    }
}

/// Parse an optional variable with a typed default.
fn parse_var<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.is_empty() => raw.parse().map_err(|err: T::Err| ConfigError::InvalidValue {
            name,
            message: err.to_string(),
        }),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validates() {
        let config = AppConfig::for_tests();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn winners_count_is_bounded() {
        let mut config = AppConfig::for_tests();
        config.winners_count = 21;
        assert!(config.validate().is_err());
        config.winners_count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn calendar_uses_configured_zone() {
        let calendar = AppConfig::for_tests().calendar();
        assert_eq!(calendar.zone_label(), "Asia/Kolkata");
    }
}
