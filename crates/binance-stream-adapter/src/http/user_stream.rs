/*
[INPUT]:  Market selector and API key
[OUTPUT]: Listen key lifecycle calls (create, keepalive, close)
[POS]:    HTTP layer - user data stream endpoints consumed by the session manager
[UPDATE]: When listen key endpoints or their parameters change
*/

// ### User Data Stream Endpoints

use async_trait::async_trait;
use reqwest::Method;
use serde::de::IgnoredAny;
use tracing::debug;

use crate::http::{BinanceClient, Result};
use crate::types::{ListenKeyResponse, Market};

/// Server-side session operations a user stream depends on.
///
/// The session manager only talks to this trait, so tests can script
/// failures and delays without a network.
#[async_trait]
pub trait SessionApi: Send + Sync {
    /// Acquire a new session token (listen key)
    async fn create_session(&self) -> Result<String>;

    /// Refresh the token's server-side expiry
    async fn keep_alive(&self, listen_key: &str) -> Result<()>;

    /// Release the token server-side
    async fn close_session(&self, listen_key: &str) -> Result<()>;
}

impl BinanceClient {
    /// Create a listen key
    ///
    /// POST /api/v3/userDataStream | /sapi/v1/userDataStream | /fapi/v1/listenKey
    pub async fn create_listen_key(&self, market: Market) -> Result<String> {
        let builder =
            self.market_request_with_key(market, Method::POST, market.user_stream_path())?;
        let response: ListenKeyResponse = self.send_json(market, builder).await?;
        debug!(%market, listen_key = %key_prefix(&response.listen_key), "listen key created");
        Ok(response.listen_key)
    }

    /// Extend a listen key's validity
    ///
    /// PUT {user stream path}?listenKey={listen_key}
    pub async fn keep_alive_listen_key(&self, market: Market, listen_key: &str) -> Result<()> {
        let builder = self
            .market_request_with_key(market, Method::PUT, market.user_stream_path())?
            .query(&[("listenKey", listen_key)]);
        let _: IgnoredAny = self.send_json(market, builder).await?;
        Ok(())
    }

    /// Close a listen key
    ///
    /// DELETE {user stream path}?listenKey={listen_key}
    pub async fn close_listen_key(&self, market: Market, listen_key: &str) -> Result<()> {
        let builder = self
            .market_request_with_key(market, Method::DELETE, market.user_stream_path())?
            .query(&[("listenKey", listen_key)]);
        let _: IgnoredAny = self.send_json(market, builder).await?;
        Ok(())
    }
}

/// Listen key endpoints of one market bound to a client
#[derive(Debug, Clone)]
pub struct UserDataStreamApi {
    client: BinanceClient,
    market: Market,
}

impl UserDataStreamApi {
    pub fn new(client: BinanceClient, market: Market) -> Self {
        Self { client, market }
    }

    pub fn market(&self) -> Market {
        self.market
    }
}

#[async_trait]
impl SessionApi for UserDataStreamApi {
    async fn create_session(&self) -> Result<String> {
        self.client.create_listen_key(self.market).await
    }

    async fn keep_alive(&self, listen_key: &str) -> Result<()> {
        self.client.keep_alive_listen_key(self.market, listen_key).await
    }

    async fn close_session(&self, listen_key: &str) -> Result<()> {
        self.client.close_listen_key(self.market, listen_key).await
    }
}

/// Short, log-safe prefix of a listen key
pub(crate) fn key_prefix(listen_key: &str) -> String {
    let prefix: String = listen_key.chars().take(8).collect();
    format!("{prefix}...")
}
