/*
[INPUT]:  Raw user-data payloads tagged by their `e` field
[OUTPUT]: Typed account/order events, or an Unknown passthrough
[POS]:    WebSocket layer - user data normalization (stateless)
[UPDATE]: When the exchange adds user event types or fields
*/

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::ws::client::log_unrecognized_once;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct AssetBalance {
    #[serde(rename(deserialize = "a"))]
    pub asset: String,
    #[serde(rename(deserialize = "f"))]
    pub free: Decimal,
    #[serde(rename(deserialize = "l"))]
    pub locked: Decimal,
}

/// Spot/margin balances after an account change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct AccountPosition {
    #[serde(rename(deserialize = "e"))]
    pub event_type: String,
    #[serde(rename(deserialize = "E"))]
    pub event_time: u64,
    #[serde(rename(deserialize = "u"))]
    pub last_account_update: u64,
    #[serde(rename(deserialize = "B"))]
    pub balances: Vec<AssetBalance>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct BalanceUpdate {
    #[serde(rename(deserialize = "e"))]
    pub event_type: String,
    #[serde(rename(deserialize = "E"))]
    pub event_time: u64,
    #[serde(rename(deserialize = "a"))]
    pub asset: String,
    #[serde(rename(deserialize = "d"))]
    pub balance_delta: Decimal,
    #[serde(rename(deserialize = "T"))]
    pub clear_time: u64,
}

/// Spot/margin order lifecycle event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct ExecutionReport {
    #[serde(rename(deserialize = "e"))]
    pub event_type: String,
    #[serde(rename(deserialize = "E"))]
    pub event_time: u64,
    #[serde(rename(deserialize = "s"))]
    pub symbol: String,
    #[serde(rename(deserialize = "c"))]
    pub new_client_order_id: String,
    #[serde(rename(deserialize = "C"), default)]
    pub original_client_order_id: String,
    #[serde(rename(deserialize = "S"))]
    pub side: String,
    #[serde(rename(deserialize = "o"))]
    pub order_type: String,
    #[serde(rename(deserialize = "f"))]
    pub time_in_force: String,
    #[serde(rename(deserialize = "q"))]
    pub quantity: Decimal,
    #[serde(rename(deserialize = "p"))]
    pub price: Decimal,
    #[serde(rename(deserialize = "x"))]
    pub execution_type: String,
    #[serde(rename(deserialize = "P"))]
    pub stop_price: Decimal,
    #[serde(rename(deserialize = "F"))]
    pub iceberg_quantity: Decimal,
    #[serde(rename(deserialize = "X"))]
    pub order_status: String,
    #[serde(rename(deserialize = "r"))]
    pub order_reject_reason: String,
    #[serde(rename(deserialize = "i"))]
    pub order_id: u64,
    #[serde(rename(deserialize = "T"))]
    pub order_time: u64,
    #[serde(rename(deserialize = "l"))]
    pub last_trade_quantity: Decimal,
    #[serde(rename(deserialize = "z"))]
    pub total_trade_quantity: Decimal,
    #[serde(rename(deserialize = "L"))]
    pub price_last_trade: Decimal,
    #[serde(rename(deserialize = "n"))]
    pub commission: Decimal,
    #[serde(rename(deserialize = "N"), default)]
    pub commission_asset: Option<String>,
    #[serde(rename(deserialize = "t"))]
    pub trade_id: i64,
    #[serde(rename(deserialize = "w"))]
    pub is_order_working: bool,
    #[serde(rename(deserialize = "m"))]
    pub is_buyer_maker: bool,
    #[serde(rename(deserialize = "O"))]
    pub creation_time: u64,
    #[serde(rename(deserialize = "Z"))]
    pub total_quote_trade_quantity: Decimal,
    #[serde(rename(deserialize = "g"), default = "no_order_list")]
    pub order_list_id: i64,
    #[serde(rename(deserialize = "Q"), default, skip_serializing_if = "Option::is_none")]
    pub quote_order_quantity: Option<Decimal>,
    #[serde(rename(deserialize = "Y"), default, skip_serializing_if = "Option::is_none")]
    pub last_quote_transacted: Option<Decimal>,
}

fn no_order_list() -> i64 {
    -1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct ListOrder {
    #[serde(rename(deserialize = "s"))]
    pub symbol: String,
    #[serde(rename(deserialize = "i"))]
    pub order_id: u64,
    #[serde(rename(deserialize = "c"))]
    pub client_order_id: String,
}

/// OCO / order list status change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct ListStatus {
    #[serde(rename(deserialize = "e"))]
    pub event_type: String,
    #[serde(rename(deserialize = "E"))]
    pub event_time: u64,
    #[serde(rename(deserialize = "s"))]
    pub symbol: String,
    #[serde(rename(deserialize = "g"))]
    pub order_list_id: i64,
    #[serde(rename(deserialize = "c"))]
    pub contingency_type: String,
    #[serde(rename(deserialize = "l"))]
    pub list_status_type: String,
    #[serde(rename(deserialize = "L"))]
    pub list_order_status: String,
    #[serde(rename(deserialize = "r"))]
    pub list_reject_reason: String,
    #[serde(rename(deserialize = "C"))]
    pub list_client_order_id: String,
    #[serde(rename(deserialize = "T"))]
    pub transaction_time: u64,
    #[serde(rename(deserialize = "O"))]
    pub orders: Vec<ListOrder>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct FuturesBalance {
    #[serde(rename(deserialize = "a"))]
    pub asset: String,
    #[serde(rename(deserialize = "wb"))]
    pub wallet_balance: Decimal,
    #[serde(rename(deserialize = "cw"))]
    pub cross_wallet_balance: Decimal,
    #[serde(rename(deserialize = "bc"), default, skip_serializing_if = "Option::is_none")]
    pub balance_change: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct FuturesPosition {
    #[serde(rename(deserialize = "s"))]
    pub symbol: String,
    #[serde(rename(deserialize = "pa"))]
    pub position_amount: Decimal,
    #[serde(rename(deserialize = "ep"))]
    pub entry_price: Decimal,
    #[serde(rename(deserialize = "bep"), default, skip_serializing_if = "Option::is_none")]
    pub breakeven_price: Option<Decimal>,
    #[serde(rename(deserialize = "cr"))]
    pub accumulated_realized: Decimal,
    #[serde(rename(serialize = "unrealizedPnL", deserialize = "up"))]
    pub unrealized_pnl: Decimal,
    #[serde(rename(deserialize = "mt"))]
    pub margin_type: String,
    #[serde(rename(deserialize = "iw"))]
    pub isolated_wallet: Decimal,
    #[serde(rename(deserialize = "ps"))]
    pub position_side: String,
}

/// Futures balance/position change; the nested `a` object is flattened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(from = "AccountUpdateWire")]
pub struct AccountUpdate {
    pub event_type: String,
    pub event_time: u64,
    pub transaction_time: u64,
    pub event_reason_type: String,
    pub balances: Vec<FuturesBalance>,
    pub positions: Vec<FuturesPosition>,
}

#[derive(Deserialize)]
struct AccountUpdateWire {
    e: String,
    #[serde(rename = "E")]
    event_time: u64,
    #[serde(rename = "T")]
    transaction_time: u64,
    a: AccountUpdateBody,
}

#[derive(Deserialize)]
struct AccountUpdateBody {
    m: String,
    #[serde(rename = "B", default)]
    balances: Vec<FuturesBalance>,
    #[serde(rename = "P", default)]
    positions: Vec<FuturesPosition>,
}

impl From<AccountUpdateWire> for AccountUpdate {
    fn from(wire: AccountUpdateWire) -> Self {
        Self {
            event_type: wire.e,
            event_time: wire.event_time,
            transaction_time: wire.transaction_time,
            event_reason_type: wire.a.m,
            balances: wire.a.balances,
            positions: wire.a.positions,
        }
    }
}

/// Order fields of a futures ORDER_TRADE_UPDATE (`o` object)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct FuturesOrder {
    #[serde(rename(deserialize = "s"))]
    pub symbol: String,
    #[serde(rename(deserialize = "c"))]
    pub client_order_id: String,
    #[serde(rename(deserialize = "S"))]
    pub side: String,
    #[serde(rename(deserialize = "o"))]
    pub order_type: String,
    #[serde(rename(deserialize = "f"))]
    pub time_in_force: String,
    #[serde(rename(deserialize = "q"))]
    pub quantity: Decimal,
    #[serde(rename(deserialize = "p"))]
    pub price: Decimal,
    #[serde(rename(deserialize = "ap"))]
    pub average_price: Decimal,
    #[serde(rename(deserialize = "sp"))]
    pub stop_price: Decimal,
    #[serde(rename(deserialize = "x"))]
    pub execution_type: String,
    #[serde(rename(deserialize = "X"))]
    pub order_status: String,
    #[serde(rename(deserialize = "i"))]
    pub order_id: u64,
    #[serde(rename(deserialize = "l"))]
    pub last_trade_quantity: Decimal,
    #[serde(rename(deserialize = "z"))]
    pub total_trade_quantity: Decimal,
    #[serde(rename(deserialize = "L"))]
    pub price_last_trade: Decimal,
    #[serde(rename(deserialize = "N"), default)]
    pub commission_asset: Option<String>,
    #[serde(rename(deserialize = "n"), default)]
    pub commission: Option<Decimal>,
    #[serde(rename(deserialize = "T"))]
    pub order_time: u64,
    #[serde(rename(deserialize = "t"))]
    pub trade_id: i64,
    #[serde(rename(deserialize = "b"))]
    pub bids_notional: Decimal,
    #[serde(rename(deserialize = "a"))]
    pub asks_notional: Decimal,
    #[serde(rename(deserialize = "m"))]
    pub is_maker: bool,
    #[serde(rename(deserialize = "R"))]
    pub is_reduce_only: bool,
    #[serde(rename(deserialize = "wt"))]
    pub working_type: String,
    #[serde(rename(deserialize = "ot"))]
    pub original_order_type: String,
    #[serde(rename(deserialize = "ps"))]
    pub position_side: String,
    #[serde(rename(deserialize = "cp"), default)]
    pub close_position: bool,
    #[serde(rename(deserialize = "AP"), default, skip_serializing_if = "Option::is_none")]
    pub activation_price: Option<Decimal>,
    #[serde(rename(deserialize = "cr"), default, skip_serializing_if = "Option::is_none")]
    pub callback_rate: Option<Decimal>,
    #[serde(rename(deserialize = "rp"))]
    pub realized_profit: Decimal,
}

/// Futures order lifecycle event; order fields are flattened into the event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(from = "OrderTradeUpdateWire")]
pub struct OrderTradeUpdate {
    pub event_type: String,
    pub event_time: u64,
    pub transaction_time: u64,
    #[serde(flatten)]
    pub order: FuturesOrder,
}

#[derive(Deserialize)]
struct OrderTradeUpdateWire {
    e: String,
    #[serde(rename = "E")]
    event_time: u64,
    #[serde(rename = "T")]
    transaction_time: u64,
    o: FuturesOrder,
}

impl From<OrderTradeUpdateWire> for OrderTradeUpdate {
    fn from(wire: OrderTradeUpdateWire) -> Self {
        Self {
            event_type: wire.e,
            event_time: wire.event_time,
            transaction_time: wire.transaction_time,
            order: wire.o,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct MarginCallPosition {
    #[serde(rename(deserialize = "s"))]
    pub symbol: String,
    #[serde(rename(deserialize = "ps"))]
    pub position_side: String,
    #[serde(rename(deserialize = "pa"))]
    pub position_amount: Decimal,
    #[serde(rename(deserialize = "mt"))]
    pub margin_type: String,
    #[serde(rename(deserialize = "iw"))]
    pub isolated_wallet: Decimal,
    #[serde(rename(deserialize = "mp"))]
    pub mark_price: Decimal,
    #[serde(rename(serialize = "unrealizedPnL", deserialize = "up"))]
    pub unrealized_pnl: Decimal,
    #[serde(rename(deserialize = "mm"))]
    pub maintenance_margin_required: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct MarginCall {
    #[serde(rename(deserialize = "e"))]
    pub event_type: String,
    #[serde(rename(deserialize = "E"))]
    pub event_time: u64,
    #[serde(rename(deserialize = "cw"), default, skip_serializing_if = "Option::is_none")]
    pub cross_wallet_balance: Option<Decimal>,
    #[serde(rename(deserialize = "p"))]
    pub positions: Vec<MarginCallPosition>,
}

/// Leverage (`ac`) or multi-assets mode (`ai`) change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(from = "AccountConfigWire")]
pub struct AccountConfigUpdate {
    pub event_type: String,
    pub event_time: u64,
    pub transaction_time: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leverage: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multi_assets_mode: Option<bool>,
}

#[derive(Deserialize)]
struct AccountConfigWire {
    e: String,
    #[serde(rename = "E")]
    event_time: u64,
    #[serde(rename = "T")]
    transaction_time: u64,
    #[serde(default)]
    ac: Option<LeverageConfig>,
    #[serde(default)]
    ai: Option<AssetsModeConfig>,
}

#[derive(Deserialize)]
struct LeverageConfig {
    s: String,
    l: u32,
}

#[derive(Deserialize)]
struct AssetsModeConfig {
    j: bool,
}

impl From<AccountConfigWire> for AccountConfigUpdate {
    fn from(wire: AccountConfigWire) -> Self {
        let (symbol, leverage) = match wire.ac {
            Some(config) => (Some(config.s), Some(config.l)),
            None => (None, None),
        };
        Self {
            event_type: wire.e,
            event_time: wire.event_time,
            transaction_time: wire.transaction_time,
            symbol,
            leverage,
            multi_assets_mode: wire.ai.map(|config| config.j),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct ListenKeyExpired {
    #[serde(rename(deserialize = "e"))]
    pub event_type: String,
    /// Futures send this as a decimal string, spot as a number
    #[serde(rename(deserialize = "E"), deserialize_with = "deserialize_millis")]
    pub event_time: u64,
    #[serde(rename(deserialize = "listenKey"), default, skip_serializing_if = "Option::is_none")]
    pub listen_key: Option<String>,
}

fn deserialize_millis<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Millis {
        Number(u64),
        Text(String),
    }

    match Millis::deserialize(deserializer)? {
        Millis::Number(value) => Ok(value),
        Millis::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Event whose tag has no typed shape: the tag plus the untouched payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnknownEvent {
    #[serde(rename = "eventType")]
    pub event_type: String,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

/// Normalized user data event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum UserEvent {
    AccountPosition(AccountPosition),
    BalanceUpdate(BalanceUpdate),
    ExecutionReport(ExecutionReport),
    ListStatus(ListStatus),
    AccountUpdate(AccountUpdate),
    OrderTradeUpdate(OrderTradeUpdate),
    MarginCall(MarginCall),
    AccountConfigUpdate(AccountConfigUpdate),
    ListenKeyExpired(ListenKeyExpired),
    Unknown(UnknownEvent),
}

impl UserEvent {
    /// Wire tag (`e`) of the event
    pub fn event_type(&self) -> &str {
        match self {
            UserEvent::AccountPosition(event) => &event.event_type,
            UserEvent::BalanceUpdate(event) => &event.event_type,
            UserEvent::ExecutionReport(event) => &event.event_type,
            UserEvent::ListStatus(event) => &event.event_type,
            UserEvent::AccountUpdate(event) => &event.event_type,
            UserEvent::OrderTradeUpdate(event) => &event.event_type,
            UserEvent::MarginCall(event) => &event.event_type,
            UserEvent::AccountConfigUpdate(event) => &event.event_type,
            UserEvent::ListenKeyExpired(event) => &event.event_type,
            UserEvent::Unknown(event) => &event.event_type,
        }
    }
}

/// Dispatch on the `e` tag; never fails
pub fn normalize_user(raw: Value) -> UserEvent {
    let event_type = raw
        .get("e")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let decoded = match event_type.as_str() {
        "outboundAccountPosition" => {
            AccountPosition::deserialize(&raw).map(UserEvent::AccountPosition)
        }
        "balanceUpdate" => BalanceUpdate::deserialize(&raw).map(UserEvent::BalanceUpdate),
        "executionReport" => ExecutionReport::deserialize(&raw).map(UserEvent::ExecutionReport),
        "listStatus" => ListStatus::deserialize(&raw).map(UserEvent::ListStatus),
        "ACCOUNT_UPDATE" => AccountUpdate::deserialize(&raw).map(UserEvent::AccountUpdate),
        "ORDER_TRADE_UPDATE" => {
            OrderTradeUpdate::deserialize(&raw).map(UserEvent::OrderTradeUpdate)
        }
        "MARGIN_CALL" => MarginCall::deserialize(&raw).map(UserEvent::MarginCall),
        "ACCOUNT_CONFIG_UPDATE" => {
            AccountConfigUpdate::deserialize(&raw).map(UserEvent::AccountConfigUpdate)
        }
        "listenKeyExpired" => ListenKeyExpired::deserialize(&raw).map(UserEvent::ListenKeyExpired),
        _ => {
            log_unrecognized_once(&event_type, &raw.to_string());
            return unknown(event_type, raw);
        }
    };

    match decoded {
        Ok(event) => event,
        Err(err) => {
            debug!(event_type = %event_type, error = %err, "user event shape mismatch, passing through");
            unknown(event_type, raw)
        }
    }
}

fn unknown(event_type: String, raw: Value) -> UserEvent {
    let payload = match raw {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("data".to_string(), other);
            map
        }
    };
    UserEvent::Unknown(UnknownEvent {
        event_type,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;

    fn dec(value: &str) -> Decimal {
        Decimal::from_str(value).expect("decimal literal")
    }

    fn execution_report() -> Value {
        json!({
            "e": "executionReport", "E": 1499405658658u64, "s": "ETHBTC",
            "c": "mUvoqJxFIILMdfAW5iGSOW", "S": "BUY", "o": "LIMIT", "f": "GTC",
            "q": "1.00000000", "p": "0.10264410", "P": "0.00000000", "F": "0.00000000",
            "g": -1, "C": "", "x": "NEW", "X": "NEW", "r": "NONE", "i": 4293153,
            "l": "0.00000000", "z": "0.00000000", "L": "0.00000000", "n": "0", "N": null,
            "T": 1499405658657u64, "t": -1, "I": 8641984, "w": true, "m": false, "M": false,
            "O": 1499405658657u64, "Z": "0.00000000", "Y": "0.00000000", "Q": "0.00000000"
        })
    }

    #[test]
    fn execution_report_is_typed() {
        let UserEvent::ExecutionReport(report) = normalize_user(execution_report()) else {
            panic!("expected execution report");
        };
        assert_eq!(report.symbol, "ETHBTC");
        assert_eq!(report.order_id, 4293153);
        assert_eq!(report.price, dec("0.10264410"));
        assert_eq!(report.commission_asset, None);
        assert_eq!(report.trade_id, -1);
        assert_eq!(report.order_list_id, -1);
        assert!(report.is_order_working);
    }

    #[test]
    fn execution_report_serializes_descriptive_names() {
        let rendered = serde_json::to_value(normalize_user(execution_report())).expect("serialize");
        assert_eq!(rendered["eventType"], json!("executionReport"));
        assert_eq!(rendered["newClientOrderId"], json!("mUvoqJxFIILMdfAW5iGSOW"));
        assert_eq!(rendered["orderStatus"], json!("NEW"));
        assert!(rendered.get("X").is_none());
    }

    #[test]
    fn outbound_account_position_lists_balances() {
        let raw = json!({
            "e": "outboundAccountPosition", "E": 1564034571105u64, "u": 1564034571073u64,
            "B": [{"a": "ETH", "f": "10000.000000", "l": "0.000000"}]
        });
        let UserEvent::AccountPosition(position) = normalize_user(raw) else {
            panic!("expected account position");
        };
        assert_eq!(position.last_account_update, 1564034571073);
        assert_eq!(position.balances[0].asset, "ETH");
        assert_eq!(position.balances[0].free, dec("10000"));
    }

    #[test]
    fn futures_account_update_is_flattened() {
        let raw = json!({
            "e": "ACCOUNT_UPDATE", "E": 1564745798939u64, "T": 1564745798938u64,
            "a": {
                "m": "ORDER",
                "B": [{"a": "USDT", "wb": "122624.12345678", "cw": "100.12345678", "bc": "50.12345678"}],
                "P": [{"s": "BTCUSDT", "pa": "0", "ep": "0.00000", "bep": "0", "cr": "200",
                       "up": "0", "mt": "isolated", "iw": "0.00000000", "ps": "BOTH"}]
            }
        });
        let event = normalize_user(raw);
        let UserEvent::AccountUpdate(update) = &event else {
            panic!("expected account update");
        };
        assert_eq!(update.event_reason_type, "ORDER");
        assert_eq!(update.balances[0].balance_change, Some(dec("50.12345678")));
        assert_eq!(update.positions[0].accumulated_realized, dec("200"));

        let rendered = serde_json::to_value(&event).expect("serialize");
        assert_eq!(rendered["positions"][0]["unrealizedPnL"], json!("0"));
        assert_eq!(rendered["transactionTime"], json!(1564745798938u64));
    }

    #[test]
    fn futures_order_update_flattens_order() {
        let raw = json!({
            "e": "ORDER_TRADE_UPDATE", "E": 1568879465651u64, "T": 1568879465650u64,
            "o": {
                "s": "BTCUSDT", "c": "TEST", "S": "SELL", "o": "TRAILING_STOP_MARKET",
                "f": "GTC", "q": "0.001", "p": "0", "ap": "0", "sp": "7103.04", "x": "NEW",
                "X": "NEW", "i": 8886774, "l": "0", "z": "0", "L": "0", "N": "USDT", "n": "0",
                "T": 1568879465650u64, "t": 0, "b": "0", "a": "9.91", "m": false, "R": false,
                "wt": "CONTRACT_PRICE", "ot": "TRAILING_STOP_MARKET", "ps": "LONG",
                "cp": false, "AP": "7476.89", "cr": "5.0", "rp": "0"
            }
        });
        let event = normalize_user(raw);
        let UserEvent::OrderTradeUpdate(update) = &event else {
            panic!("expected order trade update");
        };
        assert_eq!(update.order.order_id, 8886774);
        assert_eq!(update.order.callback_rate, Some(dec("5.0")));

        let rendered = serde_json::to_value(&event).expect("serialize");
        assert_eq!(rendered["symbol"], json!("BTCUSDT"));
        assert_eq!(rendered["eventType"], json!("ORDER_TRADE_UPDATE"));
        assert_eq!(rendered["asksNotional"], json!("9.91"));
    }

    #[test]
    fn account_config_leverage_and_mode() {
        let leverage = json!({
            "e": "ACCOUNT_CONFIG_UPDATE", "E": 1611646737479u64, "T": 1611646737476u64,
            "ac": {"s": "BTCUSDT", "l": 25}
        });
        let UserEvent::AccountConfigUpdate(update) = normalize_user(leverage) else {
            panic!("expected config update");
        };
        assert_eq!(update.symbol.as_deref(), Some("BTCUSDT"));
        assert_eq!(update.leverage, Some(25));
        assert_eq!(update.multi_assets_mode, None);

        let mode = json!({
            "e": "ACCOUNT_CONFIG_UPDATE", "E": 1611646737479u64, "T": 1611646737476u64,
            "ai": {"j": true}
        });
        let UserEvent::AccountConfigUpdate(update) = normalize_user(mode) else {
            panic!("expected config update");
        };
        assert_eq!(update.multi_assets_mode, Some(true));
    }

    #[test]
    fn balance_update_is_typed() {
        let raw = json!({
            "e": "balanceUpdate", "E": 1573200697110u64, "a": "BTC",
            "d": "100.00000000", "T": 1573200697068u64
        });
        let event = normalize_user(raw);
        let UserEvent::BalanceUpdate(update) = &event else {
            panic!("expected balance update");
        };
        assert_eq!(update.balance_delta, dec("100"));

        let rendered = serde_json::to_value(&event).expect("serialize");
        assert_eq!(rendered["eventType"], json!("balanceUpdate"));
        assert_eq!(rendered["asset"], json!("BTC"));
        assert_eq!(rendered["balanceDelta"], json!("100.00000000"));
        assert_eq!(rendered["clearTime"], json!(1573200697068u64));
        assert!(rendered.get("d").is_none());
    }

    #[test]
    fn list_status_carries_orders() {
        let raw = json!({
            "e": "listStatus", "E": 1564035303637u64, "s": "ETHBTC", "g": 2,
            "c": "OCO", "l": "EXEC_STARTED", "L": "EXECUTING", "r": "NONE",
            "C": "F4QN4G8DlFATFlIUQ0cjdD", "T": 1564035303625u64,
            "O": [
                {"s": "ETHBTC", "i": 17, "c": "AJYsMjErWJesZvqlJCTUgL"},
                {"s": "ETHBTC", "i": 18, "c": "bfYPSQdLoqAJeNrOr9adzq"}
            ]
        });
        let event = normalize_user(raw);
        let UserEvent::ListStatus(status) = &event else {
            panic!("expected list status");
        };
        assert_eq!(status.order_list_id, 2);
        assert_eq!(status.orders.len(), 2);

        let rendered = serde_json::to_value(&event).expect("serialize");
        assert_eq!(rendered["contingencyType"], json!("OCO"));
        assert_eq!(rendered["listStatusType"], json!("EXEC_STARTED"));
        assert_eq!(rendered["listOrderStatus"], json!("EXECUTING"));
        assert_eq!(rendered["listClientOrderId"], json!("F4QN4G8DlFATFlIUQ0cjdD"));
        assert_eq!(rendered["transactionTime"], json!(1564035303625u64));
        assert_eq!(rendered["orders"][1]["orderId"], json!(18));
        assert_eq!(rendered["orders"][1]["clientOrderId"], json!("bfYPSQdLoqAJeNrOr9adzq"));
    }

    #[test]
    fn margin_call_lists_positions() {
        let raw = json!({
            "e": "MARGIN_CALL", "E": 1587727187525u64, "cw": "3.16812045",
            "p": [{
                "s": "ETHUSDT", "ps": "LONG", "pa": "1.327", "mt": "CROSSED",
                "iw": "0", "mp": "187.17127", "up": "-1.166074", "mm": "1.614445"
            }]
        });
        let event = normalize_user(raw);
        let UserEvent::MarginCall(call) = &event else {
            panic!("expected margin call");
        };
        assert_eq!(call.cross_wallet_balance, Some(dec("3.16812045")));
        assert_eq!(call.positions[0].mark_price, dec("187.17127"));

        let rendered = serde_json::to_value(&event).expect("serialize");
        assert_eq!(rendered["eventType"], json!("MARGIN_CALL"));
        assert_eq!(rendered["crossWalletBalance"], json!("3.16812045"));
        let position = &rendered["positions"][0];
        assert_eq!(position["positionSide"], json!("LONG"));
        assert_eq!(position["positionAmount"], json!("1.327"));
        assert_eq!(position["unrealizedPnL"], json!("-1.166074"));
        assert_eq!(position["maintenanceMarginRequired"], json!("1.614445"));
    }

    #[test]
    fn listen_key_expired_accepts_numeric_and_string_time() {
        let spot = json!({"e": "listenKeyExpired", "E": 1576653824250u64, "listenKey": "OfYGbUzi3PraNagEkdKuFwUHn48brFsItTdsuiIXrucEvD0rhRXZ7I6URWfE8YE8"});
        let futures = json!({"e": "listenKeyExpired", "E": "1736996475556", "listenKey": "WsCMN0a4KHUPTQuX6IUnqEZfB1inxmv1qR4kbf1LuEjur5VdbzqvyxqG9TSjVVxv"});

        let UserEvent::ListenKeyExpired(expired) = normalize_user(spot) else {
            panic!("expected typed spot expiry");
        };
        assert_eq!(expired.event_time, 1576653824250);

        let event = normalize_user(futures);
        let UserEvent::ListenKeyExpired(expired) = &event else {
            panic!("expected typed futures expiry");
        };
        assert_eq!(expired.event_time, 1736996475556);

        let rendered = serde_json::to_value(&event).expect("serialize");
        assert_eq!(rendered["eventType"], json!("listenKeyExpired"));
        assert_eq!(rendered["eventTime"], json!(1736996475556u64));
        assert!(rendered["listenKey"].as_str().is_some_and(|key| key.starts_with("WsCMN0")));
    }

    #[test]
    fn unknown_tag_passes_payload_through() {
        let raw = json!({"e": "externalLockUpdate", "E": 1u64, "a": "BTC", "d": "1"});
        let event = normalize_user(raw);
        assert_eq!(event.event_type(), "externalLockUpdate");

        let rendered = serde_json::to_value(&event).expect("serialize");
        assert_eq!(rendered["eventType"], json!("externalLockUpdate"));
        assert_eq!(rendered["a"], json!("BTC"));
        assert_eq!(rendered["d"], json!("1"));
    }

    #[test]
    fn known_tag_with_wrong_shape_falls_back_to_unknown() {
        let raw = json!({"e": "balanceUpdate", "E": 1u64});
        let UserEvent::Unknown(event) = normalize_user(raw) else {
            panic!("expected unknown passthrough");
        };
        assert_eq!(event.event_type, "balanceUpdate");
        assert!(event.payload.contains_key("E"));
    }

    #[test]
    fn untagged_payload_has_empty_event_type() {
        let UserEvent::Unknown(event) = normalize_user(json!({"result": null, "id": 7})) else {
            panic!("expected unknown passthrough");
        };
        assert_eq!(event.event_type, "");
        assert_eq!(event.payload["id"], json!(7));
    }
}
