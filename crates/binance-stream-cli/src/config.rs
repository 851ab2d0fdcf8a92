/*
[INPUT]:  YAML configuration file
[OUTPUT]: Parsed runner configuration and the stream targets it names
[POS]:    Configuration layer - stream setup
[UPDATE]: When adding new configuration options
*/

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

use binance_stream_adapter::{
    KlineInterval, Market, MarketStream, StreamTarget, UpdateSpeed, UserStreamOptions,
    ws::validate_targets,
};

/// Top-level configuration for the stream runner
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunnerConfig {
    /// Environment variable holding the API key for user streams
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Market data subscriptions, one subscribe call each
    #[serde(default)]
    pub market_streams: Vec<MarketStreamConfig>,
    /// User data sessions, one per entry
    #[serde(default)]
    pub user_streams: Vec<UserStreamConfig>,
}

/// Stream families accepted in the configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    AggTrades,
    Trades,
    Candles,
    Ticker,
    MiniTicker,
    BookTicker,
    Depth,
    PartialDepth,
    AllTickers,
    AllMiniTickers,
}

/// One market data subscription
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MarketStreamConfig {
    pub market: Market,
    pub stream: StreamKind,
    /// Symbols (e.g., "BTCUSDT"); empty for all-market streams
    #[serde(default)]
    pub symbols: Vec<String>,
    /// Kline interval, required for candles
    #[serde(default)]
    pub interval: Option<KlineInterval>,
    /// Book levels for partial depth: 5, 10 or 20
    #[serde(default)]
    pub level: Option<u8>,
    #[serde(default)]
    pub speed: Option<UpdateSpeed>,
    /// Forward payloads untouched instead of normalizing them
    #[serde(default)]
    pub raw: bool,
}

/// One user data session
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserStreamConfig {
    pub market: Market,
    #[serde(default)]
    pub emit_socket_opens: bool,
    #[serde(default)]
    pub emit_socket_errors: bool,
    #[serde(default = "default_true")]
    pub emit_stream_errors: bool,
    #[serde(default)]
    pub raw: bool,
}

fn default_api_key_env() -> String {
    "BINANCE_API_KEY".to_string()
}

fn default_true() -> bool {
    true
}

impl RunnerConfig {
    /// Load configuration from YAML file
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every stream entry without opening anything
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.market_streams.is_empty() && self.user_streams.is_empty() {
            bail!("configuration names no market_streams and no user_streams");
        }
        for (index, stream) in self.market_streams.iter().enumerate() {
            let targets = stream
                .targets()
                .with_context(|| format!("market_streams[{index}]"))?;
            validate_targets(stream.market, &targets)
                .with_context(|| format!("market_streams[{index}]"))?;
        }
        Ok(())
    }
}

impl MarketStreamConfig {
    /// Expand the entry into one target per symbol
    pub fn targets(&self) -> anyhow::Result<Vec<StreamTarget>> {
        let stream = match self.stream {
            StreamKind::AggTrades => MarketStream::AggTrades,
            StreamKind::Trades => MarketStream::Trades,
            StreamKind::Candles => {
                let interval = self.interval.context("candles require an interval")?;
                MarketStream::Candles(interval)
            }
            StreamKind::Ticker => MarketStream::Ticker,
            StreamKind::MiniTicker => MarketStream::MiniTicker,
            StreamKind::BookTicker => MarketStream::BookTicker,
            StreamKind::Depth => MarketStream::Depth { speed: self.speed },
            StreamKind::PartialDepth => MarketStream::PartialDepth {
                level: self.level.context("partial_depth requires a level")?,
                speed: self.speed,
            },
            StreamKind::AllTickers => MarketStream::AllTickers,
            StreamKind::AllMiniTickers => MarketStream::AllMiniTickers,
        };

        if stream.is_all_market() {
            if !self.symbols.is_empty() {
                bail!("{:?} takes no symbols", self.stream);
            }
            return Ok(vec![StreamTarget::all(stream)]);
        }
        Ok(StreamTarget::for_symbols(&self.symbols, stream))
    }
}

impl UserStreamConfig {
    pub fn options(&self) -> UserStreamOptions {
        UserStreamOptions {
            emit_socket_opens: self.emit_socket_opens,
            emit_socket_errors: self.emit_socket_errors,
            emit_stream_errors: self.emit_stream_errors,
            ..UserStreamOptions::default()
        }
    }
}
