/*
[INPUT]:  Scripted listen key results and injected socket events
[OUTPUT]: Mock transport / session API that record every call
[POS]:    Test infrastructure - shared across all test modules
[UPDATE]: When adding new test patterns or fixtures
*/

//! Common test utilities for binance-stream-adapter tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use binance_stream_adapter::{
    BinanceError, CloseOptions, Result, SessionApi, SocketEvent, SocketHandle, Transport,
};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use wiremock::MockServer;

pub const TEST_WS_BASE: &str = "wss://stream.test/ws";

/// Setup a mock HTTP server for testing
pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

/// Let spawned tasks run until the runtime is idle
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

pub fn expired_key_error() -> BinanceError {
    BinanceError::Api {
        code: -1125,
        message: "This listenKey does not exist.".to_string(),
    }
}

// ### Transport

#[derive(Debug, Default)]
struct TransportLog {
    opened: Vec<String>,
    senders: Vec<mpsc::UnboundedSender<SocketEvent>>,
    closes: Vec<(String, CloseOptions)>,
}

/// Transport that records opens/closes and lets tests inject socket events
#[derive(Debug, Default)]
pub struct MockTransport {
    log: Arc<Mutex<TransportLog>>,
    fail_opens: AtomicUsize,
    refused: Mutex<Option<String>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn opened(&self) -> Vec<String> {
        self.log.lock().unwrap().opened.clone()
    }

    pub fn closes(&self) -> Vec<(String, CloseOptions)> {
        self.log.lock().unwrap().closes.clone()
    }

    /// Make the next `count` opens fail
    pub fn fail_next_opens(&self, count: usize) {
        self.fail_opens.store(count, Ordering::SeqCst);
    }

    /// Refuse every open whose URL contains `fragment`
    pub fn refuse(&self, fragment: &str) {
        *self.refused.lock().unwrap() = Some(fragment.to_string());
    }

    /// Push an event into the connection opened `index`-th; false once its reader is gone
    pub fn inject(&self, index: usize, event: SocketEvent) -> bool {
        let log = self.log.lock().unwrap();
        log.senders
            .get(index)
            .map(|sender| sender.send(event).is_ok())
            .unwrap_or(false)
    }

    pub fn inject_text(&self, index: usize, text: &str) -> bool {
        self.inject(index, SocketEvent::Message(text.to_string()))
    }
}

impl Transport for MockTransport {
    fn open(
        &self,
        url: &str,
        events: mpsc::UnboundedSender<SocketEvent>,
    ) -> Result<Box<dyn SocketHandle>> {
        let remaining = self.fail_opens.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_opens.store(remaining - 1, Ordering::SeqCst);
            return Err(BinanceError::WebSocket("mock open refused".to_string()));
        }
        let refused = self.refused.lock().unwrap().clone();
        if refused.is_some_and(|fragment| url.contains(&fragment)) {
            return Err(BinanceError::WebSocket(format!("mock refused {url}")));
        }

        let mut log = self.log.lock().unwrap();
        log.opened.push(url.to_string());
        log.senders.push(events);
        Ok(Box::new(MockSocket {
            url: url.to_string(),
            log: self.log.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

#[derive(Debug)]
struct MockSocket {
    url: String,
    log: Arc<Mutex<TransportLog>>,
    closed: AtomicBool,
}

impl SocketHandle for MockSocket {
    fn url(&self) -> &str {
        &self.url
    }

    fn close(&self, options: CloseOptions) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.log
            .lock()
            .unwrap()
            .closes
            .push((self.url.clone(), options));
    }
}

// ### Session API

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCall {
    Create,
    KeepAlive(String),
    Close(String),
}

/// Session API with scripted results; unscripted calls succeed
#[derive(Default)]
pub struct MockSessionApi {
    keys: Mutex<VecDeque<String>>,
    create_results: Mutex<VecDeque<Result<()>>>,
    keepalive_results: Mutex<VecDeque<Result<()>>>,
    create_gate: Mutex<Option<oneshot::Receiver<()>>>,
    issued: AtomicUsize,
    calls: Mutex<Vec<(SessionCall, Instant)>>,
}

impl MockSessionApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Keys handed out in order; later creates get `key-N`
    pub fn with_keys(keys: &[&str]) -> Arc<Self> {
        let api = Self::default();
        api.keys
            .lock()
            .unwrap()
            .extend(keys.iter().map(|key| key.to_string()));
        Arc::new(api)
    }

    pub fn script_creates(&self, results: Vec<Result<()>>) {
        self.create_results.lock().unwrap().extend(results);
    }

    pub fn script_keepalives(&self, results: Vec<Result<()>>) {
        self.keepalive_results.lock().unwrap().extend(results);
    }

    /// Hold the next create until the returned sender fires
    pub fn gate_next_create(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.create_gate.lock().unwrap() = Some(rx);
        tx
    }

    pub fn calls(&self) -> Vec<SessionCall> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(call, _)| call.clone())
            .collect()
    }

    pub fn timed_calls(&self) -> Vec<(SessionCall, Instant)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, matches: impl Fn(&SessionCall) -> bool) -> usize {
        self.calls().iter().filter(|call| matches(call)).count()
    }

    pub fn creates(&self) -> usize {
        self.count(|call| *call == SessionCall::Create)
    }

    pub fn keepalives(&self) -> usize {
        self.count(|call| matches!(call, SessionCall::KeepAlive(_)))
    }

    pub fn closes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SessionCall::Close(key) => Some(key),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: SessionCall) {
        self.calls.lock().unwrap().push((call, Instant::now()));
    }
}

#[async_trait]
impl SessionApi for MockSessionApi {
    async fn create_session(&self) -> Result<String> {
        self.record(SessionCall::Create);
        let gate = self.create_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }

        let scripted = self.create_results.lock().unwrap().pop_front();
        if let Some(Err(err)) = scripted {
            return Err(err);
        }
        let issued = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let key = self
            .keys
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| format!("key-{issued}"));
        Ok(key)
    }

    async fn keep_alive(&self, listen_key: &str) -> Result<()> {
        self.record(SessionCall::KeepAlive(listen_key.to_string()));
        let scripted = self.keepalive_results.lock().unwrap().pop_front();
        scripted.unwrap_or(Ok(()))
    }

    async fn close_session(&self, listen_key: &str) -> Result<()> {
        self.record(SessionCall::Close(listen_key.to_string()));
        Ok(())
    }
}

/// Handler that stores every event it receives
pub fn collector<T: Send + 'static>() -> (Arc<Mutex<Vec<T>>>, impl Fn(T) + Send + Sync + 'static) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    (events, move |event: T| sink.lock().unwrap().push(event))
}
