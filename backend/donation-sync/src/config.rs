//! Application configuration loaded from environment variables.

use crate::errors::{Result, SyncError};
use crate::nocodb::SchemaVariant;

#[derive(Debug, Clone)]
pub struct Config {
    /// NocoDB base URL (e.g. https://nocodb.example.org)
    pub gateway_url: String,
    /// API token sent with every gateway request
    pub gateway_token: String,
    /// Which remote schema the NocoDB instance speaks
    pub schema: SchemaVariant,
    /// Table holding the active campaign row
    pub settings_table: String,
    /// Table holding one row per donation
    pub donations_table: String,
    /// NocoDB project name, only used by the v1 data paths
    pub nocodb_project: String,
    /// Path to the SQLite database backing the offline queue
    pub database_url: String,
    /// Port for the local kiosk API
    pub api_port: u16,
    /// Timeout applied to every gateway request
    pub request_timeout_secs: u64,
    /// How often (in seconds) to probe the gateway for connectivity
    pub connectivity_probe_secs: u64,
    /// Channel tag written with every kiosk donation
    pub channel: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            gateway_url: env_var("GATEWAY_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            gateway_token: env_var("GATEWAY_TOKEN").map_err(|_| {
                SyncError::Config("GATEWAY_TOKEN environment variable is required".to_string())
            })?,
            schema: env_var("GATEWAY_SCHEMA")
                .unwrap_or_else(|_| "v2".to_string())
                .parse()?,
            settings_table: env_var("SETTINGS_TABLE")?,
            donations_table: env_var("DONATIONS_TABLE")?,
            nocodb_project: env_var("NOCODB_PROJECT").unwrap_or_else(|_| "donations".to_string()),
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./donation_queue.db".to_string()),
            api_port: env_var("API_PORT")
                .unwrap_or_else(|_| "3002".to_string())
                .parse()
                .map_err(|_| SyncError::Config("Invalid API_PORT".to_string()))?,
            request_timeout_secs: positive_secs(
                "REQUEST_TIMEOUT_SECS",
                &env_var("REQUEST_TIMEOUT_SECS").unwrap_or_else(|_| "10".to_string()),
            )?,
            connectivity_probe_secs: positive_secs(
                "CONNECTIVITY_PROBE_SECS",
                &env_var("CONNECTIVITY_PROBE_SECS").unwrap_or_else(|_| "15".to_string()),
            )?,
            channel: env_var("KIOSK_CHANNEL").unwrap_or_else(|_| "kiosk".to_string()),
        })
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| SyncError::Config(format!("Missing env var: {key}")))
}

/// Parse a whole number of seconds; zero is rejected.
fn positive_secs(key: &str, raw: &str) -> Result<u64> {
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(SyncError::Config(format!("{key} must be greater than zero"))),
        Ok(secs) => Ok(secs),
        Err(_) => Err(SyncError::Config(format!("Invalid {key}"))),
    }
}
