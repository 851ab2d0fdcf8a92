/*
[INPUT]:  Stream URL and an event sender
[OUTPUT]: Handle to one persistent duplex connection
[POS]:    WebSocket layer - transport seam shared by subscriptions and user streams
[UPDATE]: When the connection contract (events, close options) changes
*/

use std::fmt;

use tokio::sync::mpsc;

use crate::http::Result;

/// Close code used when the caller does not override it
pub const NORMAL_CLOSE_CODE: u16 = 1000;
pub const DEFAULT_CLOSE_REASON: &str = "Close handle";

/// Event raised by an open connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// Connection (re)established
    Open,
    /// Text payload as received
    Message(String),
    /// Transport-level failure; the transport decides whether to reconnect
    Error(String),
}

/// Options for [`SocketHandle::close`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseOptions {
    pub code: u16,
    pub reason: String,
    /// Retire the connection for good instead of letting it reconnect
    pub keep_closed: bool,
}

impl CloseOptions {
    /// Permanent close with the caller's overrides applied
    pub fn keep_closed(options: &StopOptions) -> Self {
        Self {
            code: options.code.unwrap_or(NORMAL_CLOSE_CODE),
            reason: options
                .reason
                .clone()
                .unwrap_or_else(|| DEFAULT_CLOSE_REASON.to_string()),
            keep_closed: true,
        }
    }
}

impl Default for CloseOptions {
    fn default() -> Self {
        Self::keep_closed(&StopOptions::default())
    }
}

/// Pass-through overrides a caller may hand to a stop operation.
///
/// Only the close code and reason are carried: they are all a WebSocket
/// close frame can hold. `keep_closed` is always set by the stop path itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopOptions {
    pub code: Option<u16>,
    pub reason: Option<String>,
}

impl StopOptions {
    pub fn with_code(code: u16) -> Self {
        Self {
            code: Some(code),
            reason: None,
        }
    }
}

/// Opens persistent connections.
///
/// Contract: a connection lost without `keep_closed` reconnects to the same
/// URL on its own; closing with `keep_closed: true` retires it permanently.
pub trait Transport: Send + Sync + fmt::Debug {
    fn open(
        &self,
        url: &str,
        events: mpsc::UnboundedSender<SocketEvent>,
    ) -> Result<Box<dyn SocketHandle>>;
}

/// Handle to one connection opened by a [`Transport`]
pub trait SocketHandle: Send + Sync + fmt::Debug {
    fn url(&self) -> &str;

    /// Close the connection; closing twice is a no-op
    fn close(&self, options: CloseOptions);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_options_default_to_normal_permanent_close() {
        let options = CloseOptions::default();
        assert_eq!(options.code, NORMAL_CLOSE_CODE);
        assert_eq!(options.reason, DEFAULT_CLOSE_REASON);
        assert!(options.keep_closed);
    }

    #[test]
    fn stop_options_override_code_but_never_keep_closed() {
        let options = CloseOptions::keep_closed(&StopOptions::with_code(4000));
        assert_eq!(options.code, 4000);
        assert!(options.keep_closed);
    }

    #[test]
    fn stop_options_forward_code_and_reason_verbatim() {
        let stop = StopOptions {
            code: Some(4001),
            reason: Some("rotating keys".to_string()),
        };
        let options = CloseOptions::keep_closed(&stop);
        assert_eq!(options.code, 4001);
        assert_eq!(options.reason, "rotating keys");
        assert!(options.keep_closed);
    }
}
