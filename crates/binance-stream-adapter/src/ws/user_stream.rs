/*
[INPUT]:  SessionApi (listen key calls), Transport, event handler, emit options
[OUTPUT]: One self-healing user data session behind a stop handle
[POS]:    WebSocket layer - user stream session manager (actor)
[UPDATE]: When changing keepalive, reconnect or termination semantics
*/

use std::fmt;
use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Serialize, Serializer};
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep};
use tracing::{debug, error, info, warn};

use crate::http::user_stream::key_prefix;
use crate::http::{BinanceClient, BinanceError, Result, SessionApi, UserDataStreamApi};
use crate::types::Market;
use crate::ws::client::{log_message_sample_once, log_parse_fail_once};
use crate::ws::multiplexer::EventHandler;
use crate::ws::normalize::{UserEvent, normalize_user};
use crate::ws::transport::{CloseOptions, SocketEvent, SocketHandle, StopOptions, Transport};

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(50);
const RECONNECT_DELAY: Duration = Duration::from_secs(30);

/// User stream behaviour switches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserStreamOptions {
    /// Deliver [`UserStreamEvent::SocketOpen`]
    pub emit_socket_opens: bool,
    /// Deliver [`UserStreamEvent::SocketError`]
    pub emit_socket_errors: bool,
    /// Deliver [`UserStreamEvent::StreamError`] for failed keepalives and re-establishments
    pub emit_stream_errors: bool,
    pub keepalive_interval: Duration,
    pub reconnect_delay: Duration,
}

impl Default for UserStreamOptions {
    fn default() -> Self {
        Self {
            emit_socket_opens: false,
            emit_socket_errors: false,
            emit_stream_errors: false,
            keepalive_interval: KEEPALIVE_INTERVAL,
            reconnect_delay: RECONNECT_DELAY,
        }
    }
}

/// Event delivered to a user stream handler
#[derive(Debug, Clone)]
pub enum UserStreamEvent {
    Data(UserEvent),
    /// Payload as received (normalization disabled)
    Raw(Value),
    SocketOpen,
    SocketError(String),
    StreamError(Arc<BinanceError>),
}

impl Serialize for UserStreamEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            UserStreamEvent::Data(event) => event.serialize(serializer),
            UserStreamEvent::Raw(raw) => raw.serialize(serializer),
            UserStreamEvent::SocketOpen => json!({ "eventType": "open" }).serialize(serializer),
            UserStreamEvent::SocketError(err) => {
                json!({ "eventType": "error", "error": err }).serialize(serializer)
            }
            UserStreamEvent::StreamError(err) => {
                json!({ "eventType": "error", "error": err.to_string() }).serialize(serializer)
            }
        }
    }
}

/// Session lifecycle as seen from outside the actor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Establishing,
    Connected,
    Reconnecting,
    Terminated,
}

/// Factory for user data sessions on one market
#[derive(Clone)]
pub struct UserStream {
    api: Arc<dyn SessionApi>,
    transport: Arc<dyn Transport>,
    ws_base: String,
    options: UserStreamOptions,
}

impl UserStream {
    pub fn new(
        api: Arc<dyn SessionApi>,
        transport: Arc<dyn Transport>,
        ws_base: impl Into<String>,
        options: UserStreamOptions,
    ) -> Self {
        Self {
            api,
            transport,
            ws_base: ws_base.into(),
            options,
        }
    }

    pub fn options(&self) -> &UserStreamOptions {
        &self.options
    }

    /// Start the session actor without waiting for the first establishment.
    ///
    /// The returned handle can stop the session at any point, including
    /// while the first listen key request is still outstanding.
    pub fn spawn<F>(&self, on_event: F, normalize: bool) -> Result<PendingUserStream>
    where
        F: Fn(UserStreamEvent) + Send + Sync + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            BinanceError::WebSocket("user stream started outside a Tokio runtime".to_string())
        })?;

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let (startup_tx, startup_rx) = oneshot::channel();

        let actor = SessionActor {
            api: self.api.clone(),
            transport: self.transport.clone(),
            ws_base: self.ws_base.clone(),
            options: self.options.clone(),
            on_event: Arc::new(on_event),
            normalize,
            control_rx,
            control_open: true,
            internal_tx,
            internal_rx,
            state_tx,
            startup: Some(startup_tx),
            listen_key: None,
            socket: None,
            socket_rx: None,
            keepalive: None,
            keepalive_in_flight: false,
            generation: 0,
            reconnect: None,
            pending_attempt: Attempt::Retry,
            current_attempt: Attempt::Initial,
            establishing: false,
            terminated: false,
        };
        runtime.spawn(actor.run());

        Ok(PendingUserStream {
            handle: UserStreamHandle {
                control_tx,
                state_rx,
            },
            startup: startup_rx,
        })
    }

    /// Start the session and wait for the first establishment.
    ///
    /// A failure of that first attempt is returned here and ends the session.
    pub async fn start<F>(&self, on_event: F, normalize: bool) -> Result<UserStreamHandle>
    where
        F: Fn(UserStreamEvent) + Send + Sync + 'static,
    {
        self.spawn(on_event, normalize)?.established().await
    }
}

impl fmt::Debug for UserStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserStream")
            .field("ws_base", &self.ws_base)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Session whose first establishment may still be in flight
#[derive(Debug)]
pub struct PendingUserStream {
    handle: UserStreamHandle,
    startup: oneshot::Receiver<Result<()>>,
}

impl PendingUserStream {
    pub fn handle(&self) -> UserStreamHandle {
        self.handle.clone()
    }

    /// Wait for the first establishment to finish
    pub async fn established(self) -> Result<UserStreamHandle> {
        match self.startup.await {
            Ok(Ok(())) => Ok(self.handle),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(BinanceError::SessionClosed),
        }
    }
}

/// Stop handle of a running session; the session stops when every clone is dropped
#[derive(Debug, Clone)]
pub struct UserStreamHandle {
    control_tx: mpsc::UnboundedSender<Control>,
    state_rx: watch::Receiver<SessionState>,
}

impl UserStreamHandle {
    /// Terminate the session and return the outcome of closing the listen key.
    ///
    /// Stopping an already stopped session is a no-op returning `Ok(())`.
    pub async fn stop(&self, options: StopOptions) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .control_tx
            .send(Control::Stop {
                options,
                reply: Some(reply_tx),
            })
            .is_err()
        {
            return Ok(());
        }
        reply_rx.await.unwrap_or(Ok(()))
    }

    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }
}

enum Control {
    Stop {
        options: StopOptions,
        reply: Option<oneshot::Sender<Result<()>>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    /// First establishment; failure is fatal
    Initial,
    /// Scheduled after the reconnect delay
    Retry,
    /// Right after a freshly connected session failed its bootstrap keepalive.
    ///
    /// Granted once in a row: if this attempt's own bootstrap keepalive also
    /// fails, the next attempt waits the regular reconnect delay, so a server
    /// that keeps rejecting fresh keys is not hit in a tight loop.
    Immediate,
}

enum Internal {
    SessionCreated {
        attempt: Attempt,
        result: Result<String>,
    },
    KeepaliveDone {
        generation: u64,
        bootstrap: bool,
        result: Result<()>,
    },
}

struct SessionActor {
    api: Arc<dyn SessionApi>,
    transport: Arc<dyn Transport>,
    ws_base: String,
    options: UserStreamOptions,
    on_event: EventHandler<UserStreamEvent>,
    normalize: bool,

    control_rx: mpsc::UnboundedReceiver<Control>,
    control_open: bool,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    state_tx: watch::Sender<SessionState>,
    startup: Option<oneshot::Sender<Result<()>>>,

    // Connected state: key, socket and keepalive are set and cleared together.
    listen_key: Option<String>,
    socket: Option<Box<dyn SocketHandle>>,
    socket_rx: Option<mpsc::UnboundedReceiver<SocketEvent>>,
    keepalive: Option<Interval>,
    keepalive_in_flight: bool,
    /// Bumped on every connect and teardown; stale keepalive results are ignored
    generation: u64,

    reconnect: Option<Pin<Box<Sleep>>>,
    pending_attempt: Attempt,
    current_attempt: Attempt,
    establishing: bool,
    terminated: bool,
}

impl SessionActor {
    async fn run(mut self) {
        self.begin_establish(Attempt::Initial);

        // A create call outstanding at stop time still has to release its key.
        while !self.terminated || self.establishing {
            tokio::select! {
                control = self.control_rx.recv(), if self.control_open => {
                    match control {
                        Some(Control::Stop { options, reply }) => self.stop(options, reply),
                        None => {
                            self.control_open = false;
                            debug!("all user stream handles dropped");
                            self.stop(StopOptions::default(), None);
                        }
                    }
                }
                Some(message) = self.internal_rx.recv() => self.on_internal(message),
                event = next_socket_event(&mut self.socket_rx) => {
                    match event {
                        Some(event) => self.on_socket_event(event),
                        None => self.socket_rx = None,
                    }
                }
                _ = next_tick(&mut self.keepalive) => self.on_keepalive_tick(),
                _ = reconnect_due(&mut self.reconnect) => {
                    self.reconnect = None;
                    self.begin_establish(self.pending_attempt);
                }
            }
        }

        debug!("user stream actor finished");
    }

    fn on_internal(&mut self, message: Internal) {
        match message {
            Internal::SessionCreated { attempt, result } => self.on_session_created(attempt, result),
            Internal::KeepaliveDone {
                generation,
                bootstrap,
                result,
            } => self.on_keepalive_done(generation, bootstrap, result),
        }
    }

    fn begin_establish(&mut self, attempt: Attempt) {
        if self.terminated {
            return;
        }
        self.establishing = true;
        self.set_state(SessionState::Establishing);
        debug!(?attempt, "requesting listen key");

        let api = self.api.clone();
        let internal_tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = api.create_session().await;
            let _ = internal_tx.send(Internal::SessionCreated { attempt, result });
        });
    }

    fn on_session_created(&mut self, attempt: Attempt, result: Result<String>) {
        self.establishing = false;

        if self.terminated {
            if let Ok(listen_key) = result {
                info!(listen_key = %key_prefix(&listen_key), "listen key arrived after stop, releasing");
                self.release_key(listen_key);
            }
            return;
        }

        match result {
            Ok(listen_key) => self.connect(listen_key, attempt),
            Err(err) => self.on_establish_failed(attempt, err),
        }
    }

    fn connect(&mut self, listen_key: String, attempt: Attempt) {
        let url = format!("{}/{}", self.ws_base.trim_end_matches('/'), listen_key);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let socket = match self.transport.open(&url, events_tx) {
            Ok(socket) => socket,
            Err(err) => {
                self.release_key(listen_key);
                self.on_establish_failed(attempt, err);
                return;
            }
        };

        let period = self.options.keepalive_interval;
        let mut keepalive = tokio::time::interval_at(Instant::now() + period, period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(listen_key = %key_prefix(&listen_key), ?attempt, "user stream connected");
        self.generation += 1;
        self.listen_key = Some(listen_key);
        self.socket = Some(socket);
        self.socket_rx = Some(events_rx);
        self.keepalive = Some(keepalive);
        self.keepalive_in_flight = false;
        self.current_attempt = attempt;
        self.set_state(SessionState::Connected);

        if let Some(startup) = self.startup.take() {
            let _ = startup.send(Ok(()));
        }

        // Verify the fresh session end-to-end before the first tick.
        self.send_keepalive(true);
    }

    fn on_establish_failed(&mut self, attempt: Attempt, err: BinanceError) {
        if attempt == Attempt::Initial {
            error!(error = %err, "user stream could not be established");
            self.terminated = true;
            self.set_state(SessionState::Terminated);
            if let Some(startup) = self.startup.take() {
                let _ = startup.send(Err(err));
            }
            return;
        }

        warn!(error = %err, delay = ?self.options.reconnect_delay, "user stream re-establishment failed, retrying");
        self.emit_stream_error(err);
        self.schedule_reconnect();
    }

    fn on_keepalive_tick(&mut self) {
        if self.keepalive_in_flight {
            debug!("keepalive still in flight, skipping tick");
            return;
        }
        self.send_keepalive(false);
    }

    fn send_keepalive(&mut self, bootstrap: bool) {
        let Some(listen_key) = self.listen_key.clone() else {
            return;
        };
        self.keepalive_in_flight = true;

        let api = self.api.clone();
        let internal_tx = self.internal_tx.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            let result = api.keep_alive(&listen_key).await;
            let _ = internal_tx.send(Internal::KeepaliveDone {
                generation,
                bootstrap,
                result,
            });
        });
    }

    fn on_keepalive_done(&mut self, generation: u64, bootstrap: bool, result: Result<()>) {
        if self.terminated || generation != self.generation {
            debug!(generation, current = self.generation, "discarding stale keepalive result");
            return;
        }
        self.keepalive_in_flight = false;

        let err = match result {
            Ok(()) => {
                debug!(bootstrap, "keepalive ok");
                return;
            }
            Err(err) => err,
        };

        self.teardown();
        if bootstrap && self.current_attempt != Attempt::Immediate {
            warn!(error = %err, "bootstrap keepalive failed, re-establishing now");
            self.emit_stream_error(err);
            self.begin_establish(Attempt::Immediate);
        } else {
            warn!(error = %err, delay = ?self.options.reconnect_delay, "keepalive failed, reconnecting");
            self.emit_stream_error(err);
            self.schedule_reconnect();
        }
    }

    fn on_socket_event(&mut self, event: SocketEvent) {
        match event {
            SocketEvent::Open => {
                debug!("user stream socket open");
                if self.options.emit_socket_opens {
                    self.emit(UserStreamEvent::SocketOpen);
                }
            }
            SocketEvent::Error(err) => {
                warn!(error = %err, "user stream socket error");
                if self.options.emit_socket_errors {
                    self.emit(UserStreamEvent::SocketError(err));
                }
            }
            SocketEvent::Message(text) => {
                log_message_sample_once("userData", text.len());
                let raw: Value = match serde_json::from_str(&text) {
                    Ok(raw) => raw,
                    Err(err) => {
                        log_parse_fail_once(&err, &text);
                        return;
                    }
                };
                let event = if self.normalize {
                    UserStreamEvent::Data(normalize_user(raw))
                } else {
                    UserStreamEvent::Raw(raw)
                };
                self.emit(event);
            }
        }
    }

    /// Drop the connected state after a failure; the key is released best-effort.
    fn teardown(&mut self) {
        self.generation += 1;
        self.keepalive = None;
        self.keepalive_in_flight = false;
        self.socket_rx = None;
        if let Some(socket) = self.socket.take() {
            socket.close(CloseOptions::default());
        }
        if let Some(listen_key) = self.listen_key.take() {
            self.release_key(listen_key);
        }
    }

    fn schedule_reconnect(&mut self) {
        self.pending_attempt = Attempt::Retry;
        self.reconnect = Some(Box::pin(tokio::time::sleep(self.options.reconnect_delay)));
        self.set_state(SessionState::Reconnecting);
    }

    fn stop(&mut self, options: StopOptions, reply: Option<oneshot::Sender<Result<()>>>) {
        if self.terminated {
            if let Some(reply) = reply {
                let _ = reply.send(Ok(()));
            }
            return;
        }

        self.terminated = true;
        self.reconnect = None;
        self.generation += 1;
        self.keepalive = None;
        self.keepalive_in_flight = false;
        self.socket_rx = None;
        if let Some(socket) = self.socket.take() {
            socket.close(CloseOptions::keep_closed(&options));
        }
        self.set_state(SessionState::Terminated);
        if let Some(startup) = self.startup.take() {
            let _ = startup.send(Err(BinanceError::SessionClosed));
        }

        let Some(listen_key) = self.listen_key.take() else {
            info!(establishing = self.establishing, "user stream stopped before connecting");
            if let Some(reply) = reply {
                let _ = reply.send(Ok(()));
            }
            return;
        };

        info!(listen_key = %key_prefix(&listen_key), "user stream stopped");
        let api = self.api.clone();
        tokio::spawn(async move {
            let result = api.close_session(&listen_key).await;
            if let Err(err) = &result {
                warn!(error = %err, "closing listen key on stop failed");
            }
            if let Some(reply) = reply {
                let _ = reply.send(result);
            }
        });
    }

    fn release_key(&self, listen_key: String) {
        let api = self.api.clone();
        tokio::spawn(async move {
            if let Err(err) = api.close_session(&listen_key).await {
                debug!(listen_key = %key_prefix(&listen_key), error = %err, "best-effort listen key close failed");
            }
        });
    }

    fn emit_stream_error(&self, err: BinanceError) {
        if self.options.emit_stream_errors {
            self.emit(UserStreamEvent::StreamError(Arc::new(err)));
        }
    }

    fn emit(&self, event: UserStreamEvent) {
        if self.terminated {
            return;
        }
        (self.on_event)(event);
    }

    fn set_state(&self, state: SessionState) {
        self.state_tx.send_replace(state);
    }
}

async fn next_socket_event(
    events: &mut Option<mpsc::UnboundedReceiver<SocketEvent>>,
) -> Option<SocketEvent> {
    match events {
        Some(events) => events.recv().await,
        None => pending().await,
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending().await,
    }
}

async fn reconnect_due(sleep: &mut Option<Pin<Box<Sleep>>>) {
    match sleep {
        Some(sleep) => sleep.as_mut().await,
        None => pending().await,
    }
}

// ### User Stream Entry Point

impl BinanceClient {
    /// User data session for `market`, using this client's key, transport and endpoints
    pub fn user_stream(&self, market: Market, options: UserStreamOptions) -> UserStream {
        UserStream::new(
            Arc::new(UserDataStreamApi::new(self.clone(), market)),
            self.transport(),
            self.stream_endpoints().for_market(market),
            options,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_use_exchange_timings() {
        let options = UserStreamOptions::default();
        assert_eq!(options.keepalive_interval, Duration::from_secs(50));
        assert_eq!(options.reconnect_delay, Duration::from_secs(30));
        assert!(!options.emit_socket_opens);
        assert!(!options.emit_socket_errors);
        assert!(!options.emit_stream_errors);
    }

    #[test]
    fn error_events_serialize_uniformly() {
        let socket = serde_json::to_value(UserStreamEvent::SocketError("reset".to_string()))
            .expect("serialize");
        assert_eq!(socket, json!({ "eventType": "error", "error": "reset" }));

        let stream = serde_json::to_value(UserStreamEvent::StreamError(Arc::new(
            BinanceError::SessionClosed,
        )))
        .expect("serialize");
        assert_eq!(stream["eventType"], json!("error"));
        assert_eq!(stream["error"], json!("User stream was stopped"));
    }

    #[test]
    fn spawn_outside_runtime_fails() {
        let client = BinanceClient::new().expect("client");
        let stream = client.user_stream(Market::Spot, UserStreamOptions::default());
        let err = stream.spawn(|_| {}, true).expect_err("no runtime");
        assert!(matches!(err, BinanceError::WebSocket(_)));
    }
}
