/*
[INPUT]:  Raw stream payloads (serde_json::Value)
[OUTPUT]: MarketEvent / UserEvent with descriptive field names
[POS]:    WebSocket layer - event normalization
[UPDATE]: When adding stream families or user event types
*/

pub mod market;
pub mod user;

pub use market::{
    AggTrade, BookTicker, DepthUpdate, Kline, MarketEvent, MiniTicker, PartialDepth, PriceLevel,
    Ticker, Trade, normalize_market,
};
pub use user::{
    AccountConfigUpdate, AccountPosition, AccountUpdate, AssetBalance, BalanceUpdate,
    ExecutionReport, FuturesBalance, FuturesOrder, FuturesPosition, ListOrder, ListStatus,
    ListenKeyExpired, MarginCall, MarginCallPosition, OrderTradeUpdate, UnknownEvent, UserEvent,
    normalize_user,
};
