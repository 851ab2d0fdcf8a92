/*
[INPUT]:  HTTP configuration (base URLs, timeouts, API key), transport choice
[OUTPUT]: Configured client handle for REST calls and stream sessions
[POS]:    HTTP layer - core client implementation
[UPDATE]: When adding connection options or changing client behavior
*/

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::http::{BinanceError, RateLimitState, Result};
use crate::types::Market;
use crate::ws::{SocketConfig, Transport, WebSocketTransport};

/// Base URLs for Binance REST APIs
const SPOT_BASE_URL: &str = "https://api.binance.com";
const FUTURES_BASE_URL: &str = "https://fapi.binance.com";

/// Base URLs for Binance raw websocket streams
const SPOT_STREAM_URL: &str = "wss://stream.binance.com:9443/ws";
const FUTURES_STREAM_URL: &str = "wss://fstream.binance.com/ws";

const API_KEY_HEADER: &str = "X-MBX-APIKEY";

/// Websocket base URLs per market
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEndpoints {
    pub spot: String,
    pub futures: String,
}

impl StreamEndpoints {
    /// Base URL for the market; margin accounts stream from the spot host
    pub fn for_market(&self, market: Market) -> &str {
        match market {
            Market::Spot | Market::Margin => &self.spot,
            Market::Futures => &self.futures,
        }
    }
}

impl Default for StreamEndpoints {
    fn default() -> Self {
        Self {
            spot: SPOT_STREAM_URL.to_string(),
            futures: FUTURES_STREAM_URL.to_string(),
        }
    }
}

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    /// API key sent as `X-MBX-APIKEY`; required for user data streams
    pub api_key: Option<String>,
    pub stream_endpoints: StreamEndpoints,
    pub socket: SocketConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            api_key: None,
            stream_endpoints: StreamEndpoints::default(),
            socket: SocketConfig::default(),
        }
    }
}

/// Main client handle for Binance REST and streaming APIs.
///
/// Cheap to clone: clones share the connection pool, the transport and the
/// rate-limit counters.
#[derive(Clone)]
pub struct BinanceClient {
    http_client: Client,
    spot_base_url: Url,
    futures_base_url: Url,
    api_key: Option<String>,
    rate_limits: Arc<RateLimitState>,
    transport: Arc<dyn Transport>,
    stream_endpoints: StreamEndpoints,
}

impl BinanceClient {
    /// Create a new client with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(ClientConfig::default())
    }

    /// Create a new client with custom configuration
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        Self::with_config_and_base_urls(config, SPOT_BASE_URL, FUTURES_BASE_URL)
    }

    /// Create a client pointed at explicit REST hosts (mock servers, testnet)
    pub fn with_config_and_base_urls(
        config: ClientConfig,
        spot_base_url: &str,
        futures_base_url: &str,
    ) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            http_client,
            spot_base_url: Url::parse(spot_base_url)?,
            futures_base_url: Url::parse(futures_base_url)?,
            api_key: config.api_key,
            rate_limits: Arc::new(RateLimitState::new()),
            transport: Arc::new(WebSocketTransport::new(config.socket)),
            stream_endpoints: config.stream_endpoints,
        })
    }

    /// Replace the websocket transport used by subscriptions and user streams
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    /// Set the API key for user data stream endpoints
    pub fn set_api_key(&mut self, api_key: impl Into<String>) {
        self.api_key = Some(api_key.into());
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    /// Usage counters reported by the exchange for this client's calls
    pub fn rate_limits(&self) -> &RateLimitState {
        &self.rate_limits
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    pub fn stream_endpoints(&self) -> &StreamEndpoints {
        &self.stream_endpoints
    }

    fn base_url(&self, market: Market) -> &Url {
        match market {
            Market::Spot | Market::Margin => &self.spot_base_url,
            Market::Futures => &self.futures_base_url,
        }
    }

    /// Build request builder for a market endpoint
    pub(crate) fn market_request(
        &self,
        market: Market,
        method: Method,
        endpoint: &str,
    ) -> Result<RequestBuilder> {
        let url = self.base_url(market).join(endpoint)?;
        Ok(self.http_client.request(method, url))
    }

    /// Build request builder carrying the API key header
    pub(crate) fn market_request_with_key(
        &self,
        market: Market,
        method: Method,
        endpoint: &str,
    ) -> Result<RequestBuilder> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            BinanceError::Config(format!("API key required for {market} user data stream"))
        })?;
        let builder = self.market_request(market, method, endpoint)?;
        Ok(builder.header(API_KEY_HEADER, api_key))
    }

    /// Send a request, record usage headers, and decode the JSON body
    pub(crate) async fn send_json<T: DeserializeOwned>(
        &self,
        market: Market,
        builder: RequestBuilder,
    ) -> Result<T> {
        let response = builder.send().await?;
        self.rate_limits.record(market, response.headers());

        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());
        let body = response.text().await?;

        if !status.is_success() {
            debug!(%market, status = status.as_u16(), "request rejected");
            return Err(BinanceError::from_response(status, retry_after, &body));
        }

        serde_json::from_str(&body).map_err(|err| {
            BinanceError::InvalidResponse(format!("failed to decode response body: {err}"))
        })
    }
}

impl fmt::Debug for BinanceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinanceClient")
            .field("spot_base_url", &self.spot_base_url.as_str())
            .field("futures_base_url", &self.futures_base_url.as_str())
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("transport", &self.transport)
            .field("stream_endpoints", &self.stream_endpoints)
            .finish()
    }
}
