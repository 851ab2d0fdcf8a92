/*
[INPUT]:  Raw market stream payloads (single-letter wire fields) + their subscription target
[OUTPUT]: Fixed-shape market events with descriptive camelCase fields
[POS]:    WebSocket layer - market data normalization (stateless)
[UPDATE]: When the exchange adds fields or a new market stream family
*/

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ws::target::{MarketStream, StreamTarget};

/// One `[price, quantity]` book level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(Decimal, Decimal)")]
pub struct PriceLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

impl From<(Decimal, Decimal)> for PriceLevel {
    fn from((price, quantity): (Decimal, Decimal)) -> Self {
        Self { price, quantity }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct AggTrade {
    #[serde(rename(deserialize = "e"))]
    pub event_type: String,
    #[serde(rename(deserialize = "E"))]
    pub event_time: u64,
    #[serde(rename(deserialize = "T"))]
    pub timestamp: u64,
    #[serde(rename(deserialize = "s"))]
    pub symbol: String,
    #[serde(rename(deserialize = "p"))]
    pub price: Decimal,
    #[serde(rename(deserialize = "q"))]
    pub quantity: Decimal,
    #[serde(rename(deserialize = "m"))]
    pub is_buyer_maker: bool,
    /// Spot only
    #[serde(rename(deserialize = "M"), default, skip_serializing_if = "Option::is_none")]
    pub was_best_price: Option<bool>,
    #[serde(rename(deserialize = "a"))]
    pub agg_id: u64,
    #[serde(rename(deserialize = "f"))]
    pub first_id: u64,
    #[serde(rename(deserialize = "l"))]
    pub last_id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct Trade {
    #[serde(rename(deserialize = "e"))]
    pub event_type: String,
    #[serde(rename(deserialize = "E"))]
    pub event_time: u64,
    #[serde(rename(deserialize = "T"))]
    pub trade_time: u64,
    #[serde(rename(deserialize = "s"))]
    pub symbol: String,
    #[serde(rename(deserialize = "p"))]
    pub price: Decimal,
    #[serde(rename(deserialize = "q"))]
    pub quantity: Decimal,
    #[serde(rename(deserialize = "m"))]
    pub is_buyer_maker: bool,
    #[serde(rename(deserialize = "M"), default, skip_serializing_if = "Option::is_none")]
    pub maker: Option<bool>,
    #[serde(rename(deserialize = "t"))]
    pub trade_id: u64,
    #[serde(rename(deserialize = "b"), default, skip_serializing_if = "Option::is_none")]
    pub buyer_order_id: Option<u64>,
    #[serde(rename(deserialize = "a"), default, skip_serializing_if = "Option::is_none")]
    pub seller_order_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(from = "KlineWire")]
pub struct Kline {
    pub event_type: String,
    pub event_time: u64,
    pub symbol: String,
    pub start_time: u64,
    pub close_time: u64,
    pub first_trade_id: i64,
    pub last_trade_id: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub trades: u64,
    pub interval: String,
    pub is_final: bool,
    pub quote_volume: Decimal,
    pub buy_volume: Decimal,
    pub quote_buy_volume: Decimal,
}

#[derive(Deserialize)]
struct KlineWire {
    #[serde(rename = "e")]
    event_type: String,
    #[serde(rename = "E")]
    event_time: u64,
    #[serde(rename = "s")]
    symbol: String,
    k: KlineBody,
}

#[derive(Deserialize)]
struct KlineBody {
    t: u64,
    #[serde(rename = "T")]
    close_time: u64,
    i: String,
    f: i64,
    #[serde(rename = "L")]
    last_trade_id: i64,
    o: Decimal,
    c: Decimal,
    h: Decimal,
    l: Decimal,
    v: Decimal,
    n: u64,
    x: bool,
    q: Decimal,
    #[serde(rename = "V")]
    buy_volume: Decimal,
    #[serde(rename = "Q")]
    quote_buy_volume: Decimal,
}

impl From<KlineWire> for Kline {
    fn from(wire: KlineWire) -> Self {
        let k = wire.k;
        Self {
            event_type: wire.event_type,
            event_time: wire.event_time,
            symbol: wire.symbol,
            start_time: k.t,
            close_time: k.close_time,
            first_trade_id: k.f,
            last_trade_id: k.last_trade_id,
            open: k.o,
            high: k.h,
            low: k.l,
            close: k.c,
            volume: k.v,
            trades: k.n,
            interval: k.i,
            is_final: k.x,
            quote_volume: k.q,
            buy_volume: k.buy_volume,
            quote_buy_volume: k.quote_buy_volume,
        }
    }
}

/// 24h rolling ticker; best bid/ask and previous close are spot only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct Ticker {
    #[serde(rename(deserialize = "e"))]
    pub event_type: String,
    #[serde(rename(deserialize = "E"))]
    pub event_time: u64,
    #[serde(rename(deserialize = "s"))]
    pub symbol: String,
    #[serde(rename(deserialize = "p"))]
    pub price_change: Decimal,
    #[serde(rename(deserialize = "P"))]
    pub price_change_percent: Decimal,
    #[serde(rename(deserialize = "w"))]
    pub weighted_avg: Decimal,
    #[serde(rename(deserialize = "x"), default, skip_serializing_if = "Option::is_none")]
    pub prev_day_close: Option<Decimal>,
    #[serde(rename(deserialize = "c"))]
    pub cur_day_close: Decimal,
    #[serde(rename(deserialize = "Q"))]
    pub close_trade_quantity: Decimal,
    #[serde(rename(deserialize = "b"), default, skip_serializing_if = "Option::is_none")]
    pub best_bid: Option<Decimal>,
    #[serde(rename(deserialize = "B"), default, skip_serializing_if = "Option::is_none")]
    pub best_bid_qnt: Option<Decimal>,
    #[serde(rename(deserialize = "a"), default, skip_serializing_if = "Option::is_none")]
    pub best_ask: Option<Decimal>,
    #[serde(rename(deserialize = "A"), default, skip_serializing_if = "Option::is_none")]
    pub best_ask_qnt: Option<Decimal>,
    #[serde(rename(deserialize = "o"))]
    pub open: Decimal,
    #[serde(rename(deserialize = "h"))]
    pub high: Decimal,
    #[serde(rename(deserialize = "l"))]
    pub low: Decimal,
    #[serde(rename(deserialize = "v"))]
    pub volume: Decimal,
    #[serde(rename(deserialize = "q"))]
    pub volume_quote: Decimal,
    #[serde(rename(deserialize = "O"))]
    pub open_time: u64,
    #[serde(rename(deserialize = "C"))]
    pub close_time: u64,
    #[serde(rename(deserialize = "F"))]
    pub first_trade_id: i64,
    #[serde(rename(deserialize = "L"))]
    pub last_trade_id: i64,
    #[serde(rename(deserialize = "n"))]
    pub total_trades: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct MiniTicker {
    #[serde(rename(deserialize = "e"))]
    pub event_type: String,
    #[serde(rename(deserialize = "E"))]
    pub event_time: u64,
    #[serde(rename(deserialize = "s"))]
    pub symbol: String,
    #[serde(rename(deserialize = "c"))]
    pub cur_day_close: Decimal,
    #[serde(rename(deserialize = "o"))]
    pub open: Decimal,
    #[serde(rename(deserialize = "h"))]
    pub high: Decimal,
    #[serde(rename(deserialize = "l"))]
    pub low: Decimal,
    #[serde(rename(deserialize = "v"))]
    pub volume: Decimal,
    #[serde(rename(deserialize = "q"))]
    pub volume_quote: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct BookTicker {
    #[serde(rename(deserialize = "u"))]
    pub update_id: u64,
    #[serde(rename(deserialize = "s"))]
    pub symbol: String,
    #[serde(rename(deserialize = "b"))]
    pub best_bid: Decimal,
    #[serde(rename(deserialize = "B"))]
    pub best_bid_qnt: Decimal,
    #[serde(rename(deserialize = "a"))]
    pub best_ask: Decimal,
    #[serde(rename(deserialize = "A"))]
    pub best_ask_qnt: Decimal,
    /// Futures only
    #[serde(rename(deserialize = "E"), default, skip_serializing_if = "Option::is_none")]
    pub event_time: Option<u64>,
    #[serde(rename(deserialize = "T"), default, skip_serializing_if = "Option::is_none")]
    pub transaction_time: Option<u64>,
}

/// Diff depth update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct DepthUpdate {
    #[serde(rename(deserialize = "e"))]
    pub event_type: String,
    #[serde(rename(deserialize = "E"))]
    pub event_time: u64,
    #[serde(rename(deserialize = "s"))]
    pub symbol: String,
    #[serde(rename(deserialize = "U"))]
    pub first_update_id: u64,
    #[serde(rename(deserialize = "u"))]
    pub final_update_id: u64,
    /// Futures only
    #[serde(rename(deserialize = "pu"), default, skip_serializing_if = "Option::is_none")]
    pub prev_final_update_id: Option<u64>,
    #[serde(rename(deserialize = "T"), default, skip_serializing_if = "Option::is_none")]
    pub transaction_time: Option<u64>,
    #[serde(rename(deserialize = "b"))]
    pub bid_depth: Vec<PriceLevel>,
    #[serde(rename(deserialize = "a"))]
    pub ask_depth: Vec<PriceLevel>,
}

/// Top-N book snapshot; symbol and level come from the subscription target
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialDepth {
    pub symbol: String,
    pub level: u8,
    pub last_update_id: u64,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

// Spot sends `lastUpdateId/bids/asks`; futures reuses the diff layout `u/b/a`.
#[derive(Deserialize)]
struct PartialDepthWire {
    #[serde(rename = "lastUpdateId", alias = "u")]
    last_update_id: u64,
    #[serde(alias = "b")]
    bids: Vec<PriceLevel>,
    #[serde(alias = "a")]
    asks: Vec<PriceLevel>,
}

/// Normalized market data event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MarketEvent {
    AggTrade(AggTrade),
    Trade(Trade),
    Kline(Kline),
    Ticker(Ticker),
    Tickers(Vec<Ticker>),
    MiniTicker(MiniTicker),
    MiniTickers(Vec<MiniTicker>),
    BookTicker(BookTicker),
    Depth(DepthUpdate),
    PartialDepth(PartialDepth),
    /// Payload forwarded untouched (normalization disabled or undecodable)
    Raw(Value),
}

/// Map a raw payload to the fixed shape of the target's stream family
pub fn normalize_market(
    target: &StreamTarget,
    raw: &Value,
) -> Result<MarketEvent, serde_json::Error> {
    let event = match target.stream {
        MarketStream::AggTrades => MarketEvent::AggTrade(AggTrade::deserialize(raw)?),
        MarketStream::Trades => MarketEvent::Trade(Trade::deserialize(raw)?),
        MarketStream::Candles(_) => MarketEvent::Kline(Kline::deserialize(raw)?),
        MarketStream::Ticker => MarketEvent::Ticker(Ticker::deserialize(raw)?),
        MarketStream::AllTickers => MarketEvent::Tickers(Vec::<Ticker>::deserialize(raw)?),
        MarketStream::MiniTicker => MarketEvent::MiniTicker(MiniTicker::deserialize(raw)?),
        MarketStream::AllMiniTickers => {
            MarketEvent::MiniTickers(Vec::<MiniTicker>::deserialize(raw)?)
        }
        MarketStream::BookTicker => MarketEvent::BookTicker(BookTicker::deserialize(raw)?),
        MarketStream::Depth { .. } => MarketEvent::Depth(DepthUpdate::deserialize(raw)?),
        MarketStream::PartialDepth { level, .. } => {
            let wire = PartialDepthWire::deserialize(raw)?;
            MarketEvent::PartialDepth(PartialDepth {
                symbol: target.symbol.clone().unwrap_or_default(),
                level,
                last_update_id: wire.last_update_id,
                bids: wire.bids,
                asks: wire.asks,
            })
        }
    };
    Ok(event)
}
