//! Error types for Geyser Sentinel

use thiserror::Error;

/// Application-level errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Streaming transport error
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    /// Fallback price service error
    #[error("Price API error: {0}")]
    PriceApi(#[from] PriceApiError),

    /// Address derivation error
    #[error("Derivation error: {0}")]
    Derivation(#[from] DerivationError),
}

/// Errors raised by a streaming session or its transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// Could not open the channel or the duplex stream
    #[error("connect failed: {0}")]
    Connect(String),

    /// Server sent an error status on the stream
    #[error("stream status: {0}")]
    Status(String),

    /// Writing a subscription request failed
    #[error("send failed: {0}")]
    Send(String),

    /// Server closed the stream
    #[error("stream ended")]
    Ended,
}

impl StreamError {
    /// Whether the error text carries a rate-limit signature
    pub fn is_rate_limited(&self) -> bool {
        is_rate_limit_message(&self.to_string())
    }
}

/// Rate-limit signature check on a raw error message
pub fn is_rate_limit_message(message: &str) -> bool {
    message.contains("429") || message.contains("Too Many Requests")
}

/// Errors from the fallback REST price lookup
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PriceApiError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("request timed out")]
    Timeout,

    #[error("token not found or migrated")]
    NotFound,

    #[error("rate limited")]
    RateLimited,

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("parse error: {0}")]
    Parse(String),

    /// Derived price missing, non-finite or outside the accepted band
    #[error("price out of range: {0}")]
    OutOfRange(f64),
}

/// Errors raised while deriving pool addresses
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DerivationError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;
