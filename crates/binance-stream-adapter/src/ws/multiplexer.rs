/*
[INPUT]:  Market, subscription targets, event handler, normalize flag
[OUTPUT]: One aggregate Subscription over N transport connections
[POS]:    WebSocket layer - market data subscription lifecycle
[UPDATE]: When changing per-target pipelines or the stop contract
*/

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::http::{BinanceClient, BinanceError, Result, StreamEndpoints};
use crate::types::{KlineInterval, Market, UpdateSpeed};
use crate::ws::client::{log_message_sample_once, log_parse_fail_once};
use crate::ws::normalize::{MarketEvent, normalize_market};
use crate::ws::target::{MarketStream, StreamTarget, validate_targets};
use crate::ws::transport::{CloseOptions, SocketEvent, SocketHandle, StopOptions, Transport};

/// Caller callback receiving stream events
pub type EventHandler<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Opens market data subscriptions over a [`Transport`]
#[derive(Debug, Clone)]
pub struct Multiplexer {
    transport: Arc<dyn Transport>,
    endpoints: StreamEndpoints,
}

impl Multiplexer {
    pub fn new(transport: Arc<dyn Transport>, endpoints: StreamEndpoints) -> Self {
        Self {
            transport,
            endpoints,
        }
    }

    /// Open one connection per target and route its payloads to `on_event`.
    ///
    /// Targets are validated before anything is opened. With `normalize`
    /// disabled every payload is forwarded as [`MarketEvent::Raw`].
    pub fn subscribe(
        &self,
        market: Market,
        targets: &[StreamTarget],
        on_event: EventHandler<MarketEvent>,
        normalize: bool,
    ) -> Result<Subscription> {
        validate_targets(market, targets)?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            BinanceError::WebSocket("subscription started outside a Tokio runtime".to_string())
        })?;

        let base = self.endpoints.for_market(market);
        let mut subscription = Subscription {
            sockets: Vec::with_capacity(targets.len()),
            cancel: CancellationToken::new(),
        };

        for target in targets {
            let url = target.url(base);
            let (events_tx, events_rx) = mpsc::unbounded_channel();
            // Dropping `subscription` on error closes what was already opened.
            let socket = self.transport.open(&url, events_tx)?;
            subscription.sockets.push(socket);

            runtime.spawn(pump(
                target.clone(),
                events_rx,
                on_event.clone(),
                normalize,
                subscription.cancel.clone(),
            ));
        }

        info!(%market, targets = targets.len(), normalize, "subscription opened");
        Ok(subscription)
    }
}

async fn pump(
    target: StreamTarget,
    mut events: mpsc::UnboundedReceiver<SocketEvent>,
    on_event: EventHandler<MarketEvent>,
    normalize: bool,
    cancel: CancellationToken,
) {
    let stream = target.stream_name();

    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        match event {
            SocketEvent::Open => debug!(stream = %stream, "subscription socket open"),
            SocketEvent::Error(err) => warn!(stream = %stream, error = %err, "subscription socket error"),
            SocketEvent::Message(text) => {
                log_message_sample_once(&stream, text.len());
                let Some(event) = decode_market(&target, &text, normalize) else {
                    continue;
                };
                if cancel.is_cancelled() {
                    break;
                }
                on_event(event);
            }
        }
    }

    debug!(stream = %stream, "subscription pump finished");
}

fn decode_market(target: &StreamTarget, text: &str, normalize: bool) -> Option<MarketEvent> {
    let raw: serde_json::Value = match serde_json::from_str(text) {
        Ok(raw) => raw,
        Err(err) => {
            log_parse_fail_once(&err, text);
            return None;
        }
    };
    if !normalize {
        return Some(MarketEvent::Raw(raw));
    }

    match normalize_market(target, &raw) {
        Ok(event) => Some(event),
        Err(err) => {
            log_parse_fail_once(&err, text);
            Some(MarketEvent::Raw(raw))
        }
    }
}

/// Aggregate handle over the connections opened by one subscribe call.
///
/// Dropping it stops every connection.
#[derive(Debug)]
pub struct Subscription {
    sockets: Vec<Box<dyn SocketHandle>>,
    cancel: CancellationToken,
}

impl Subscription {
    /// Stop delivery and close every connection with `keep_closed`
    pub fn stop(&self, options: StopOptions) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();

        let close = CloseOptions::keep_closed(&options);
        for socket in &self.sockets {
            socket.close(close.clone());
        }
        info!(sockets = self.sockets.len(), code = close.code, "subscription stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn len(&self) -> usize {
        self.sockets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sockets.is_empty()
    }

    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.sockets.iter().map(|socket| socket.url())
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop(StopOptions::default());
    }
}

// ### Market Stream Shortcuts

impl BinanceClient {
    pub fn multiplexer(&self) -> Multiplexer {
        Multiplexer::new(self.transport(), self.stream_endpoints().clone())
    }

    pub fn subscribe<F>(
        &self,
        market: Market,
        targets: &[StreamTarget],
        on_event: F,
        normalize: bool,
    ) -> Result<Subscription>
    where
        F: Fn(MarketEvent) + Send + Sync + 'static,
    {
        self.multiplexer()
            .subscribe(market, targets, Arc::new(on_event), normalize)
    }

    pub fn agg_trades<S, F>(&self, market: Market, symbols: &[S], on_event: F) -> Result<Subscription>
    where
        S: AsRef<str>,
        F: Fn(MarketEvent) + Send + Sync + 'static,
    {
        let targets = StreamTarget::for_symbols(symbols, MarketStream::AggTrades);
        self.subscribe(market, &targets, on_event, true)
    }

    pub fn trades<S, F>(&self, market: Market, symbols: &[S], on_event: F) -> Result<Subscription>
    where
        S: AsRef<str>,
        F: Fn(MarketEvent) + Send + Sync + 'static,
    {
        let targets = StreamTarget::for_symbols(symbols, MarketStream::Trades);
        self.subscribe(market, &targets, on_event, true)
    }

    pub fn candles<S, F>(
        &self,
        market: Market,
        symbols: &[S],
        interval: KlineInterval,
        on_event: F,
    ) -> Result<Subscription>
    where
        S: AsRef<str>,
        F: Fn(MarketEvent) + Send + Sync + 'static,
    {
        let targets = StreamTarget::for_symbols(symbols, MarketStream::Candles(interval));
        self.subscribe(market, &targets, on_event, true)
    }

    pub fn ticker<S, F>(&self, market: Market, symbols: &[S], on_event: F) -> Result<Subscription>
    where
        S: AsRef<str>,
        F: Fn(MarketEvent) + Send + Sync + 'static,
    {
        let targets = StreamTarget::for_symbols(symbols, MarketStream::Ticker);
        self.subscribe(market, &targets, on_event, true)
    }

    pub fn all_tickers<F>(&self, market: Market, on_event: F) -> Result<Subscription>
    where
        F: Fn(MarketEvent) + Send + Sync + 'static,
    {
        let targets = [StreamTarget::all(MarketStream::AllTickers)];
        self.subscribe(market, &targets, on_event, true)
    }

    pub fn book_ticker<S, F>(&self, market: Market, symbols: &[S], on_event: F) -> Result<Subscription>
    where
        S: AsRef<str>,
        F: Fn(MarketEvent) + Send + Sync + 'static,
    {
        let targets = StreamTarget::for_symbols(symbols, MarketStream::BookTicker);
        self.subscribe(market, &targets, on_event, true)
    }

    /// Diff depth updates
    pub fn depth<S, F>(
        &self,
        market: Market,
        symbols: &[S],
        speed: Option<UpdateSpeed>,
        on_event: F,
    ) -> Result<Subscription>
    where
        S: AsRef<str>,
        F: Fn(MarketEvent) + Send + Sync + 'static,
    {
        let targets = StreamTarget::for_symbols(symbols, MarketStream::Depth { speed });
        self.subscribe(market, &targets, on_event, true)
    }

    /// Top-N book snapshots (`level` in 5, 10, 20)
    pub fn partial_depth<S, F>(
        &self,
        market: Market,
        symbols: &[S],
        level: u8,
        speed: Option<UpdateSpeed>,
        on_event: F,
    ) -> Result<Subscription>
    where
        S: AsRef<str>,
        F: Fn(MarketEvent) + Send + Sync + 'static,
    {
        let targets = StreamTarget::for_symbols(symbols, MarketStream::PartialDepth { level, speed });
        self.subscribe(market, &targets, on_event, true)
    }
}
