/*
[INPUT]:  Crate modules and public type definitions
[OUTPUT]: Public Binance stream adapter crate surface
[POS]:    Crate root - module wiring
[UPDATE]: When public modules or exports change
*/

pub mod http;
pub mod types;
pub mod ws;

// Re-export commonly used types from http
pub use http::{
    BinanceClient,
    BinanceError,
    ClientConfig,
    RateLimitState,
    Result,
    SessionApi,
    StreamEndpoints,
    UserDataStreamApi,
};

// Re-export all types
pub use types::*;

// Re-export commonly used types from ws
pub use ws::{
    CloseOptions,
    MarketEvent,
    MarketStream,
    Multiplexer,
    PendingUserStream,
    SessionState,
    SocketConfig,
    SocketEvent,
    SocketHandle,
    StopOptions,
    StreamTarget,
    Subscription,
    Transport,
    UserEvent,
    UserStream,
    UserStreamEvent,
    UserStreamHandle,
    UserStreamOptions,
    WebSocketTransport,
};
