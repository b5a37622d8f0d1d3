//! Application-wide error types.

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Invalid donation amount: {0} (must be greater than zero)")]
    InvalidAmount(Decimal),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Malformed settings: {0}")]
    MalformedSettings(String),

    #[error("Statistics unavailable: {0}")]
    StatsUnavailable(String),

    #[error("Storage fault: {0}")]
    Storage(#[from] StorageFault),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Failure of any call against the remote donation service.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("No active campaign found")]
    NotFound,

    #[error("Request failed (status {status:?}): {message}")]
    Request {
        status: Option<u16>,
        message: String,
    },

    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl GatewayError {
    pub fn request(message: impl Into<String>) -> Self {
        Self::Request {
            status: None,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            return Self::Malformed(e.to_string());
        }
        Self::Request {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        Self::Malformed(e.to_string())
    }
}

/// Read/write failure of the durable queue slot.
#[derive(Debug, Error)]
pub enum StorageFault {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt queue payload: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Slot unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;
