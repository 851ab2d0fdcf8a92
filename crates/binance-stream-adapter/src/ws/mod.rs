/*
[INPUT]:  Transport, stream targets, listen key sessions
[OUTPUT]: Market data subscriptions and user data sessions
[POS]:    WebSocket layer - real-time data streams
[UPDATE]: When adding stream kinds or changing connection logic
*/

pub mod client;
pub mod multiplexer;
pub mod normalize;
pub mod target;
pub mod transport;
pub mod user_stream;

pub use client::{SocketConfig, WebSocketHandle, WebSocketTransport};
pub use multiplexer::{EventHandler, Multiplexer, Subscription};
pub use normalize::{MarketEvent, UserEvent, normalize_market, normalize_user};
pub use target::{MarketStream, PARTIAL_DEPTH_LEVELS, StreamTarget, validate_targets};
pub use transport::{
    CloseOptions, DEFAULT_CLOSE_REASON, NORMAL_CLOSE_CODE, SocketEvent, SocketHandle, StopOptions,
    Transport,
};
pub use user_stream::{
    PendingUserStream, SessionState, UserStream, UserStreamEvent, UserStreamHandle,
    UserStreamOptions,
};
