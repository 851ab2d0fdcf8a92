/*
[INPUT]:  Stream URL, reconnect delays, close requests from the handle
[OUTPUT]: Socket events (open, text payloads, errors) on an mpsc channel
[POS]:    WebSocket layer - tokio-tungstenite implementation of the transport contract
[UPDATE]: When changing connection, reconnection or close logic
*/

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use crate::http::{BinanceError, Result};
use crate::ws::transport::{CloseOptions, SocketEvent, SocketHandle, Transport};

const MESSAGE_SAMPLE_LIMIT: usize = 3;
const UNRECOGNIZED_LOG_LIMIT: usize = 3;
const PARSE_FAIL_LOG_LIMIT: usize = 3;
const RAW_LOG_MAX_BYTES: usize = 1024;

static MESSAGE_SAMPLE_COUNT: AtomicUsize = AtomicUsize::new(0);
static UNRECOGNIZED_LOG_COUNT: AtomicUsize = AtomicUsize::new(0);
static PARSE_FAIL_LOG_COUNT: AtomicUsize = AtomicUsize::new(0);

type SocketStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Silent-reconnect delays of the websocket transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketConfig {
    pub reconnect_min_delay: Duration,
    pub reconnect_max_delay: Duration,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            reconnect_min_delay: Duration::from_secs(1),
            reconnect_max_delay: Duration::from_secs(30),
        }
    }
}

/// Transport backed by tokio-tungstenite; one background task per connection
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport {
    config: SocketConfig,
}

impl WebSocketTransport {
    pub fn new(config: SocketConfig) -> Self {
        Self { config }
    }
}

impl Transport for WebSocketTransport {
    fn open(
        &self,
        url: &str,
        events: mpsc::UnboundedSender<SocketEvent>,
    ) -> Result<Box<dyn SocketHandle>> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            BinanceError::WebSocket("websocket opened outside a Tokio runtime".to_string())
        })?;

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let worker = SocketWorker {
            url: url.to_string(),
            events,
            control_rx,
            config: self.config.clone(),
        };
        runtime.spawn(worker.run());

        Ok(Box::new(WebSocketHandle {
            url: url.to_string(),
            control_tx,
        }))
    }
}

/// Handle to a connection owned by a [`SocketWorker`] task
#[derive(Debug)]
pub struct WebSocketHandle {
    url: String,
    control_tx: mpsc::UnboundedSender<CloseOptions>,
}

impl SocketHandle for WebSocketHandle {
    fn url(&self) -> &str {
        &self.url
    }

    fn close(&self, options: CloseOptions) {
        // Worker already retired: nothing left to close.
        let _ = self.control_tx.send(options);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PumpExit {
    Lost,
    Retired,
}

struct SocketWorker {
    url: String,
    events: mpsc::UnboundedSender<SocketEvent>,
    control_rx: mpsc::UnboundedReceiver<CloseOptions>,
    config: SocketConfig,
}

impl SocketWorker {
    async fn run(mut self) {
        let mut retry_count: u32 = 0;

        'run: loop {
            let connected = tokio::select! {
                result = connect_async(self.url.as_str()) => result,
                control = self.control_rx.recv() => {
                    match control {
                        Some(options) if !options.keep_closed => continue 'run,
                        _ => break 'run,
                    }
                }
            };

            match connected {
                Ok((stream, _response)) => {
                    retry_count = 0;
                    info!(url = %self.url, "websocket connected");
                    if self.events.send(SocketEvent::Open).is_err() {
                        break 'run;
                    }
                    if self.pump(stream).await == PumpExit::Retired {
                        break 'run;
                    }
                }
                Err(err) => {
                    warn!(url = %self.url, error = %err, "websocket connect failed");
                    if self.events.send(SocketEvent::Error(err.to_string())).is_err() {
                        break 'run;
                    }
                }
            }

            retry_count = retry_count.saturating_add(1);
            let backoff = backoff_duration(retry_count, &self.config);
            debug!(url = %self.url, retry_count, ?backoff, "websocket reconnecting");

            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                control = self.control_rx.recv() => {
                    match control {
                        Some(options) if !options.keep_closed => {}
                        _ => break 'run,
                    }
                }
            }
        }

        debug!(url = %self.url, "websocket retired");
    }

    async fn pump(&mut self, stream: SocketStream) -> PumpExit {
        let (mut write, mut read) = stream.split();

        loop {
            tokio::select! {
                control = self.control_rx.recv() => {
                    // A dropped handle closes for good.
                    let options = control.unwrap_or_default();
                    let frame = CloseFrame {
                        code: CloseCode::from(options.code),
                        reason: options.reason.clone().into(),
                    };
                    let _ = write.send(WsMessage::Close(Some(frame))).await;
                    debug!(url = %self.url, code = options.code, keep_closed = options.keep_closed, "websocket closed by handle");
                    return if options.keep_closed {
                        PumpExit::Retired
                    } else {
                        PumpExit::Lost
                    };
                }
                incoming = read.next() => {
                    match incoming {
                        Some(Ok(WsMessage::Text(text))) => {
                            if self.events.send(SocketEvent::Message(text.to_string())).is_err() {
                                let _ = write.send(WsMessage::Close(None)).await;
                                return PumpExit::Retired;
                            }
                        }
                        Some(Ok(WsMessage::Binary(bytes))) => {
                            match String::from_utf8(bytes.to_vec()) {
                                Ok(text) => {
                                    if self.events.send(SocketEvent::Message(text)).is_err() {
                                        let _ = write.send(WsMessage::Close(None)).await;
                                        return PumpExit::Retired;
                                    }
                                }
                                Err(_) => debug!(url = %self.url, "dropping non-utf8 binary frame"),
                            }
                        }
                        Some(Ok(WsMessage::Close(frame))) => {
                            debug!(url = %self.url, ?frame, "websocket closed by server");
                            return PumpExit::Lost;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            warn!(url = %self.url, error = %err, "websocket read failed");
                            let _ = self.events.send(SocketEvent::Error(err.to_string()));
                            return PumpExit::Lost;
                        }
                        None => {
                            debug!(url = %self.url, "websocket stream ended");
                            return PumpExit::Lost;
                        }
                    }
                }
            }
        }
    }
}

fn backoff_duration(retry_count: u32, config: &SocketConfig) -> Duration {
    let exp = retry_count.saturating_sub(1).min(31);
    let factor = 1u32 << exp;
    config
        .reconnect_min_delay
        .saturating_mul(factor)
        .min(config.reconnect_max_delay)
}

pub(crate) fn log_message_sample_once(stream: &str, bytes: usize) {
    let count = MESSAGE_SAMPLE_COUNT.fetch_add(1, Ordering::Relaxed);
    if count >= MESSAGE_SAMPLE_LIMIT {
        return;
    }

    info!(
        sample_index = count + 1,
        sample_limit = MESSAGE_SAMPLE_LIMIT,
        stream,
        bytes,
        "ws message sample"
    );
}

pub(crate) fn log_unrecognized_once(event_type: &str, raw: &str) {
    let count = UNRECOGNIZED_LOG_COUNT.fetch_add(1, Ordering::Relaxed);
    if count < UNRECOGNIZED_LOG_LIMIT {
        info!(
            sample_index = count + 1,
            sample_limit = UNRECOGNIZED_LOG_LIMIT,
            event_type,
            bytes = raw.len(),
            "ws event type unrecognized"
        );
        let preview = truncate_for_log(raw, RAW_LOG_MAX_BYTES);
        debug!(
            sample_index = count + 1,
            sample_limit = UNRECOGNIZED_LOG_LIMIT,
            event_type,
            message = %preview,
            "ws event type unrecognized"
        );
    }
}

pub(crate) fn log_parse_fail_once(err: &serde_json::Error, raw: &str) {
    let count = PARSE_FAIL_LOG_COUNT.fetch_add(1, Ordering::Relaxed);
    if count < PARSE_FAIL_LOG_LIMIT {
        info!(
            sample_index = count + 1,
            sample_limit = PARSE_FAIL_LOG_LIMIT,
            error = %err,
            bytes = raw.len(),
            "ws message parse failed"
        );
        let preview = truncate_for_log(raw, RAW_LOG_MAX_BYTES);
        debug!(
            sample_index = count + 1,
            sample_limit = PARSE_FAIL_LOG_LIMIT,
            error = %err,
            bytes = raw.len(),
            message = %preview,
            "ws message parse failed"
        );
    }
}

pub(crate) fn truncate_for_log(value: &str, max_len: usize) -> String {
    if value.len() <= max_len {
        return value.to_string();
    }
    let mut cut = max_len;
    while !value.is_char_boundary(cut) {
        cut -= 1;
    }
    let mut out = String::with_capacity(cut + 3);
    out.push_str(&value[..cut]);
    out.push_str("...");
    out
}
