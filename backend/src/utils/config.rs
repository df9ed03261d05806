use anyhow::Result;
use std::env;
use std::time::Duration;
use crate::constants::{
    DEFAULT_INVITATION_EXPIRY_HOURS, DEFAULT_RATE_LIMIT_PER_MINUTE, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_SERVER_PORT,
};

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub request_timeout: Duration,
    /// Requests allowed per client address per minute.
    pub rate_limit_per_minute: u32,
    pub invitation_expiry: chrono::Duration,
    /// Comma separated ALLOWED_ORIGINS; `None` means permissive CORS.
    pub allowed_origins: Option<Vec<String>>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| DEFAULT_SERVER_PORT.to_string())
                .parse()
                .unwrap_or(DEFAULT_SERVER_PORT),
            request_timeout: Duration::from_secs(
                env::var("REQUEST_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
            rate_limit_per_minute: env::var("RATE_LIMIT_PER_MINUTE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_RATE_LIMIT_PER_MINUTE),
            invitation_expiry: chrono::Duration::hours(
                env::var("INVITATION_EXPIRY_HOURS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_INVITATION_EXPIRY_HOURS),
            ),
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|origins| parse_origins(&origins))
                .filter(|origins| !origins.is_empty()),
        })
    }

}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_SERVER_PORT,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            rate_limit_per_minute: DEFAULT_RATE_LIMIT_PER_MINUTE,
            invitation_expiry: chrono::Duration::hours(DEFAULT_INVITATION_EXPIRY_HOURS),
            allowed_origins: None,
        }
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}
