/*
[INPUT]:  HTTP client configuration and API endpoints
[OUTPUT]: HTTP responses and typed API results
[POS]:    HTTP layer - REST API communication
[UPDATE]: When adding new endpoints or changing client behavior
*/

pub mod client;
pub mod error;
pub mod rate_limit;
pub mod user_stream;

pub use error::{BinanceError, Result};
pub use rate_limit::{RateLimitState, UsageSnapshot};
pub use user_stream::{SessionApi, UserDataStreamApi};

pub use client::{BinanceClient, ClientConfig, StreamEndpoints};
