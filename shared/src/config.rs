//! Configuration management for Lambda functions.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;

use crate::{Error, Result};

/// Which storage driver backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// PostgreSQL through sqlx
    Postgres,
    /// In-process reference store, for local runs
    Reference,
}

impl FromStr for StoreKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" => Ok(StoreKind::Postgres),
            "reference" => Ok(StoreKind::Reference),
            other => Err(Error::Config(format!("Unknown RSVP_STORE: {}", other))),
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Storage driver
    pub store: StoreKind,
    /// Database host
    pub db_host: String,
    /// Database name
    pub db_name: String,
    /// ARN of the secret containing database credentials
    pub db_secret_arn: String,
    /// AWS region
    pub aws_region: String,
    /// Zone whose calendar decides what "today" is
    pub time_zone: Tz,
    /// Attempts at the partition step before reporting a conflict
    pub max_attempts: u32,
    /// Upper bound on one request's storage work
    pub request_timeout: Duration,
    /// Cognito group whose members are administrators
    pub admin_group: String,
    /// ARN of the secret holding the CSRF signing key
    pub csrf_secret_arn: Option<String>,
    /// Lifetime of issued CSRF tokens
    pub csrf_ttl: Duration,
    /// How many days ahead the reminder job looks
    pub reminder_window_days: u64,
    /// SNS topic that receives reminder messages
    pub reminder_topic_arn: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let store: StoreKind = lookup("RSVP_STORE")
            .as_deref()
            .unwrap_or("postgres")
            .parse()?;

        let required = |key: &str| -> Result<String> {
            match (lookup(key), store) {
                (Some(value), _) => Ok(value),
                (None, StoreKind::Reference) => Ok(String::new()),
                (None, StoreKind::Postgres) => Err(Error::Config(format!("{} not set", key))),
            }
        };

        let time_zone_name =
            lookup("RSVP_TIME_ZONE").unwrap_or_else(|| "America/Los_Angeles".to_string());
        let time_zone: Tz = time_zone_name
            .parse()
            .map_err(|e| Error::Config(format!("Invalid RSVP_TIME_ZONE {}: {}", time_zone_name, e)))?;

        let max_attempts: u32 = parse_or(&lookup, "RSVP_MAX_ATTEMPTS", 3)?;
        if max_attempts == 0 {
            return Err(Error::Config("RSVP_MAX_ATTEMPTS must be at least 1".to_string()));
        }

        Ok(Self {
            store,
            db_host: required("DATABASE_HOST")?,
            db_name: lookup("DATABASE_NAME").unwrap_or_else(|| "rsvp".to_string()),
            db_secret_arn: required("DATABASE_URL_SECRET_ARN")?,
            aws_region: lookup("AWS_REGION").unwrap_or_else(|| "us-east-1".to_string()),
            time_zone,
            max_attempts,
            request_timeout: Duration::from_millis(parse_or(&lookup, "RSVP_REQUEST_TIMEOUT_MS", 5000)?),
            admin_group: lookup("RSVP_ADMIN_GROUP").unwrap_or_else(|| "rsvp-admins".to_string()),
            csrf_secret_arn: lookup("CSRF_SECRET_ARN"),
            csrf_ttl: Duration::from_secs(parse_or(&lookup, "CSRF_TTL_SECS", 3600)?),
            reminder_window_days: parse_or(&lookup, "REMINDER_WINDOW_DAYS", 3)?,
            reminder_topic_arn: lookup("REMINDER_TOPIC_ARN"),
        })
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{} is not a valid number: {}", key, raw))),
        None => Ok(default),
    }
}
