use crate::constants::{
    FACEBOOK_API_VERSION, FACEBOOK_BASE_URL, GRAPH_REQUEST_TIMEOUT_SECS, PROVISIONING_LEASE_SECS,
};
use dotenv::dotenv;
use std::env;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub facebook_base_url: Url,
    pub facebook_api_version: String,
    /// Base for resolving relative post image references.
    pub media_base_url: Option<Url>,
    pub request_timeout: Duration,
    pub provisioning_lease: chrono::Duration,
    pub use_segment_locations: bool,
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Environment variable not found: {0}")]
    MissingEnv(String),
    #[error("Invalid database URL: {0}")]
    InvalidDatabaseUrl(String),
    #[error("Invalid URL in {0}: {1}")]
    InvalidUrl(String, String),
    #[error("Invalid number in {0}: {1}")]
    InvalidNumber(String, String),
    #[error("Invalid boolean in {0}: {1}")]
    InvalidBool(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_URL".to_string()))?;

        // Validate the URL format
        Url::parse(&database_url).map_err(|e| ConfigError::InvalidDatabaseUrl(e.to_string()))?;

        let facebook_base_url = parse_url(
            "FACEBOOK_BASE_URL",
            &lookup("FACEBOOK_BASE_URL").unwrap_or_else(|| FACEBOOK_BASE_URL.to_string()),
        )?;

        let media_base_url = lookup("MEDIA_BASE_URL")
            .map(|raw| parse_url("MEDIA_BASE_URL", &raw))
            .transpose()?;

        let timeout_secs = parse_number(
            "GRAPH_REQUEST_TIMEOUT_SECS",
            lookup("GRAPH_REQUEST_TIMEOUT_SECS"),
            GRAPH_REQUEST_TIMEOUT_SECS as i64,
        )?;
        let lease_secs = parse_number(
            "PROVISIONING_LEASE_SECS",
            lookup("PROVISIONING_LEASE_SECS"),
            PROVISIONING_LEASE_SECS,
        )?;

        Ok(Self {
            database_url,
            facebook_base_url,
            facebook_api_version: lookup("FACEBOOK_API_VERSION")
                .unwrap_or_else(|| FACEBOOK_API_VERSION.to_string()),
            media_base_url,
            request_timeout: Duration::from_secs(timeout_secs as u64),
            provisioning_lease: chrono::Duration::seconds(lease_secs),
            use_segment_locations: parse_bool(
                "TARGETING_USE_SEGMENT_LOCATIONS",
                lookup("TARGETING_USE_SEGMENT_LOCATIONS"),
            )?,
        })
    }
}

fn parse_url(key: &str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::InvalidUrl(key.to_string(), e.to_string()))
}

fn parse_number(key: &str, raw: Option<String>, default: i64) -> Result<i64, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => match value.trim().parse::<i64>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(ConfigError::InvalidNumber(key.to_string(), value)),
        },
    }
}

fn parse_bool(key: &str, raw: Option<String>) -> Result<bool, ConfigError> {
    match raw.as_deref().map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(false),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            _ => Err(ConfigError::InvalidBool(key.to_string(), v)),
        },
    }
}
