//! Top-level error types for Overmind.

use std::time::Duration;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error enum wrapping domain-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration loading errors. Always fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required config key: {0}")]
    MissingKey(String),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

/// Thread store persistence errors. Logged, never fatal.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to write thread store to {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to serialize thread store: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failures from the completion and image providers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("rate limited by provider{}", format_retry_after(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    #[error("provider returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("request timed out")]
    Timeout,

    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("provider request failed: {0}")]
    Transport(String),
}

impl ApiError {
    /// Whether another attempt may succeed without changing the request.
    pub fn is_retriable(&self) -> bool {
        matches!(self, ApiError::RateLimited { .. } | ApiError::Timeout)
    }
}

fn format_retry_after(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(delay) => format!(" (retry after {:.1}s)", delay.as_secs_f64()),
        None => String::new(),
    }
}
