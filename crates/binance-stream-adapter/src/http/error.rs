/*
[INPUT]:  Error sources (HTTP, API, serialization, validation, WebSocket)
[OUTPUT]: Structured error types with context and retry hints
[POS]:    Error handling layer - unified error types for entire crate
[UPDATE]: When adding new error sources or improving error messages
*/

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// Main error type for the Binance stream adapter
#[derive(Error, Debug)]
pub enum BinanceError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response
    #[error("API error (code {code}): {message}")]
    Api { code: i64, message: String },

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// URL parsing failed
    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Invalid response from server
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Subscription parameters rejected before any connection was opened
    #[error("Invalid stream parameters: {0}")]
    Validation(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded, retry after {retry_after}s")]
    RateLimit { retry_after: u64 },

    /// The user stream was stopped before it could be established
    #[error("User stream was stopped")]
    SessionClosed,
}

/// Binance error body: `{"code": -1121, "msg": "Invalid symbol."}`
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i64,
    msg: String,
}

impl BinanceError {
    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BinanceError::Http(_)
                | BinanceError::RateLimit { .. }
                | BinanceError::WebSocket(_)
                | BinanceError::InvalidResponse(_)
        )
    }

    /// Get retry delay in seconds (if retryable)
    pub fn retry_delay(&self) -> Option<u64> {
        match self {
            BinanceError::RateLimit { retry_after } => Some(*retry_after),
            _ => None,
        }
    }

    /// Check if error was raised by local parameter validation
    pub fn is_validation(&self) -> bool {
        matches!(self, BinanceError::Validation(_))
    }

    /// Create an API error from status code and message
    pub fn api_error(status: StatusCode, message: impl Into<String>) -> Self {
        BinanceError::Api {
            code: status.as_u16() as i64,
            message: message.into(),
        }
    }

    /// Build an error from a non-success response body.
    ///
    /// Uses the exchange's own `code`/`msg` pair when the body carries one,
    /// otherwise falls back to the HTTP status.
    pub fn from_response(status: StatusCode, retry_after: Option<u64>, body: &str) -> Self {
        if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
            return BinanceError::RateLimit {
                retry_after: retry_after.unwrap_or(60),
            };
        }

        match serde_json::from_str::<ApiErrorBody>(body) {
            Ok(parsed) => BinanceError::Api {
                code: parsed.code,
                message: parsed.msg,
            },
            Err(_) => {
                let message = if body.trim().is_empty() {
                    status
                        .canonical_reason()
                        .unwrap_or("unknown error")
                        .to_string()
                } else {
                    body.trim().to_string()
                };
                BinanceError::api_error(status, message)
            }
        }
    }
}

/// Result type alias for adapter operations
pub type Result<T> = std::result::Result<T, BinanceError>;
