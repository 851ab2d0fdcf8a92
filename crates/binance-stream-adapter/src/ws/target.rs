/*
[INPUT]:  Symbol + stream kind (+ interval / depth level / update speed)
[OUTPUT]: Validated subscription targets and their stream URLs
[POS]:    WebSocket layer - subscription descriptors
[UPDATE]: When adding stream kinds or changing parameter constraints
*/

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::http::{BinanceError, Result};
use crate::types::{KlineInterval, Market, UpdateSpeed};

/// Levels published by the partial book depth streams
pub const PARTIAL_DEPTH_LEVELS: [u8; 3] = [5, 10, 20];

/// Market data stream kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketStream {
    AggTrades,
    Trades,
    Candles(KlineInterval),
    Ticker,
    MiniTicker,
    BookTicker,
    Depth { speed: Option<UpdateSpeed> },
    PartialDepth { level: u8, speed: Option<UpdateSpeed> },
    AllTickers,
    AllMiniTickers,
}

impl MarketStream {
    /// Streams that cover every symbol and take none
    pub fn is_all_market(&self) -> bool {
        matches!(self, MarketStream::AllTickers | MarketStream::AllMiniTickers)
    }

    /// Stream name suffix after `{symbol}@`, or the whole name for all-market streams
    pub fn suffix(&self) -> String {
        match self {
            MarketStream::AggTrades => "aggTrade".to_string(),
            MarketStream::Trades => "trade".to_string(),
            MarketStream::Candles(interval) => format!("kline_{interval}"),
            MarketStream::Ticker => "ticker".to_string(),
            MarketStream::MiniTicker => "miniTicker".to_string(),
            MarketStream::BookTicker => "bookTicker".to_string(),
            MarketStream::Depth { speed } => with_speed("depth".to_string(), *speed),
            MarketStream::PartialDepth { level, speed } => {
                with_speed(format!("depth{level}"), *speed)
            }
            MarketStream::AllTickers => "!ticker@arr".to_string(),
            MarketStream::AllMiniTickers => "!miniTicker@arr".to_string(),
        }
    }
}

fn with_speed(base: String, speed: Option<UpdateSpeed>) -> String {
    match speed {
        Some(speed) => format!("{base}@{speed}"),
        None => base,
    }
}

/// One subscription target: a stream kind, bound to a symbol unless it is all-market
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamTarget {
    pub symbol: Option<String>,
    pub stream: MarketStream,
}

impl StreamTarget {
    pub fn new(symbol: impl Into<String>, stream: MarketStream) -> Self {
        Self {
            symbol: Some(symbol.into()),
            stream,
        }
    }

    /// Target for an all-market stream
    pub fn all(stream: MarketStream) -> Self {
        Self {
            symbol: None,
            stream,
        }
    }

    /// Same stream for each symbol, in order
    pub fn for_symbols<S: AsRef<str>>(symbols: &[S], stream: MarketStream) -> Vec<Self> {
        symbols
            .iter()
            .map(|symbol| Self::new(symbol.as_ref(), stream))
            .collect()
    }

    /// Check the target's shape against the market's constraints
    pub fn validate(&self, market: Market) -> Result<()> {
        if market == Market::Margin {
            return Err(BinanceError::Validation(
                "margin has no market data streams; subscribe on spot".to_string(),
            ));
        }

        match (&self.symbol, self.stream.is_all_market()) {
            (Some(_), true) => {
                return Err(BinanceError::Validation(format!(
                    "{} takes no symbol",
                    self.stream.suffix()
                )));
            }
            (None, false) => {
                return Err(BinanceError::Validation(format!(
                    "{} requires a symbol",
                    self.stream.suffix()
                )));
            }
            (Some(symbol), false) => validate_symbol(symbol)?,
            (None, true) => {}
        }

        match self.stream {
            MarketStream::PartialDepth { level, speed } => {
                if !PARTIAL_DEPTH_LEVELS.contains(&level) {
                    return Err(BinanceError::Validation(format!(
                        "depth level {level} not in {PARTIAL_DEPTH_LEVELS:?}"
                    )));
                }
                validate_speed(market, speed)
            }
            MarketStream::Depth { speed } => validate_speed(market, speed),
            _ => Ok(()),
        }
    }

    /// Stream URL under the market's websocket base
    pub fn url(&self, base: &str) -> String {
        format!("{}/{}", base.trim_end_matches('/'), self.stream_name())
    }

    /// Raw stream name, e.g. `btcusdt@depth10@100ms`
    pub fn stream_name(&self) -> String {
        match &self.symbol {
            Some(symbol) => format!("{}@{}", symbol.to_lowercase(), self.stream.suffix()),
            None => self.stream.suffix(),
        }
    }
}

impl fmt::Display for StreamTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.stream_name())
    }
}

fn validate_symbol(symbol: &str) -> Result<()> {
    if symbol.is_empty() {
        return Err(BinanceError::Validation("symbol must not be empty".to_string()));
    }
    if !symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(BinanceError::Validation(format!(
            "symbol '{symbol}' must be alphanumeric"
        )));
    }
    Ok(())
}

fn validate_speed(market: Market, speed: Option<UpdateSpeed>) -> Result<()> {
    match speed {
        Some(speed) if !speed.is_supported_on(market) => Err(BinanceError::Validation(format!(
            "update speed {speed} not available on {market}"
        ))),
        _ => Ok(()),
    }
}

/// Validate a whole target list before anything is opened
pub fn validate_targets(market: Market, targets: &[StreamTarget]) -> Result<()> {
    if targets.is_empty() {
        return Err(BinanceError::Validation(
            "at least one stream target is required".to_string(),
        ));
    }
    targets.iter().try_for_each(|target| target.validate(market))
}
