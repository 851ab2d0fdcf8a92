/*
[INPUT]:  Stream targets, mock transport, injected payloads
[OUTPUT]: Test results for subscription open/stop and event routing
[POS]:    Integration tests - subscription multiplexer
[UPDATE]: When subscription lifecycle or routing changes
*/

mod common;

use std::sync::Arc;

use binance_stream_adapter::{
    BinanceError, KlineInterval, Market, MarketEvent, MarketStream, Multiplexer, StopOptions,
    StreamEndpoints, StreamTarget, UpdateSpeed,
};
use common::{MockTransport, collector, settle};

fn endpoints() -> StreamEndpoints {
    StreamEndpoints {
        spot: "wss://spot.test/ws".to_string(),
        futures: "wss://futures.test/ws".to_string(),
    }
}

fn multiplexer(transport: &Arc<MockTransport>) -> Multiplexer {
    Multiplexer::new(transport.clone(), endpoints())
}

fn agg_trade(symbol: &str, id: u64) -> String {
    format!(
        r#"{{"e":"aggTrade","E":1,"s":"{symbol}","a":{id},"p":"1.0","q":"2.0","f":1,"l":2,"T":1,"m":false,"M":true}}"#
    )
}

#[tokio::test]
async fn test_subscribe_opens_and_stop_closes_every_target() {
    let transport = MockTransport::new();
    let (_events, on_event) = collector::<MarketEvent>();
    let targets = vec![
        StreamTarget::new("BTCUSDT", MarketStream::Candles(KlineInterval::OneMinute)),
        StreamTarget::new("ETHUSDT", MarketStream::Depth { speed: Some(UpdateSpeed::Ms500) }),
        StreamTarget::all(MarketStream::AllMiniTickers),
    ];

    let subscription = multiplexer(&transport)
        .subscribe(Market::Futures, &targets, Arc::new(on_event), true)
        .expect("subscribe");

    assert_eq!(subscription.len(), 3);
    assert_eq!(
        transport.opened(),
        vec![
            "wss://futures.test/ws/btcusdt@kline_1m".to_string(),
            "wss://futures.test/ws/ethusdt@depth@500ms".to_string(),
            "wss://futures.test/ws/!miniTicker@arr".to_string(),
        ]
    );

    subscription.stop(StopOptions::with_code(4001));
    let closes = transport.closes();
    assert_eq!(closes.len(), 3);
    assert!(closes.iter().all(|(_, options)| options.keep_closed && options.code == 4001));
}

#[tokio::test]
async fn test_stop_before_any_message_delivers_nothing() {
    let transport = MockTransport::new();
    let (events, on_event) = collector::<MarketEvent>();
    let targets = StreamTarget::for_symbols(&["BTCUSDT", "ETHUSDT"], MarketStream::AggTrades);

    let subscription = multiplexer(&transport)
        .subscribe(Market::Spot, &targets, Arc::new(on_event), true)
        .expect("subscribe");
    subscription.stop(StopOptions::default());

    transport.inject_text(0, &agg_trade("BTCUSDT", 1));
    transport.inject_text(1, &agg_trade("ETHUSDT", 2));
    settle().await;

    assert!(events.lock().unwrap().is_empty());
    assert_eq!(transport.closes().len(), 2);
}

#[tokio::test]
async fn test_invalid_target_fails_before_any_connection() {
    let transport = MockTransport::new();
    let (_events, on_event) = collector::<MarketEvent>();
    let targets = vec![
        StreamTarget::new("BTCUSDT", MarketStream::Trades),
        StreamTarget::new("ETHUSDT", MarketStream::PartialDepth { level: 7, speed: None }),
    ];

    let err = multiplexer(&transport)
        .subscribe(Market::Spot, &targets, Arc::new(on_event), true)
        .expect_err("level 7 is not published");

    assert!(err.is_validation());
    assert!(transport.opened().is_empty());
}

#[tokio::test]
async fn test_events_keep_per_connection_order() {
    let transport = MockTransport::new();
    let (events, on_event) = collector::<MarketEvent>();
    let targets = [StreamTarget::new("BTCUSDT", MarketStream::AggTrades)];

    let _subscription = multiplexer(&transport)
        .subscribe(Market::Spot, &targets, Arc::new(on_event), true)
        .expect("subscribe");
    for id in 1..=5 {
        assert!(transport.inject_text(0, &agg_trade("BTCUSDT", id)));
    }
    settle().await;

    let ids: Vec<u64> = events
        .lock()
        .unwrap()
        .iter()
        .map(|event| match event {
            MarketEvent::AggTrade(trade) => trade.agg_id,
            other => panic!("unexpected event {other:?}"),
        })
        .collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn test_raw_passthrough_when_normalization_disabled() {
    let transport = MockTransport::new();
    let (events, on_event) = collector::<MarketEvent>();
    let targets = [StreamTarget::new("BTCUSDT", MarketStream::AggTrades)];

    let _subscription = multiplexer(&transport)
        .subscribe(Market::Spot, &targets, Arc::new(on_event), false)
        .expect("subscribe");
    transport.inject_text(0, &agg_trade("BTCUSDT", 9));
    settle().await;

    let events = events.lock().unwrap();
    let MarketEvent::Raw(raw) = &events[0] else {
        panic!("expected raw payload");
    };
    assert_eq!(raw["a"], 9);
    assert_eq!(raw["s"], "BTCUSDT");
}

#[tokio::test]
async fn test_partial_depth_carries_target_symbol() {
    let transport = MockTransport::new();
    let (events, on_event) = collector::<MarketEvent>();
    let targets = [StreamTarget::new(
        "BNBBTC",
        MarketStream::PartialDepth {
            level: 10,
            speed: Some(UpdateSpeed::Ms100),
        },
    )];

    let _subscription = multiplexer(&transport)
        .subscribe(Market::Spot, &targets, Arc::new(on_event), true)
        .expect("subscribe");
    assert_eq!(
        transport.opened(),
        vec!["wss://spot.test/ws/bnbbtc@depth10@100ms".to_string()]
    );
    transport.inject_text(0, r#"{"lastUpdateId":160,"bids":[["0.0024","10"]],"asks":[]}"#);
    settle().await;

    let events = events.lock().unwrap();
    let MarketEvent::PartialDepth(depth) = &events[0] else {
        panic!("expected partial depth");
    };
    assert_eq!(depth.symbol, "BNBBTC");
    assert_eq!(depth.level, 10);
    assert_eq!(depth.bids.len(), 1);
}

#[tokio::test]
async fn test_dropping_subscription_closes_connections() {
    let transport = MockTransport::new();
    let (_events, on_event) = collector::<MarketEvent>();
    let targets = StreamTarget::for_symbols(&["BTCUSDT", "ETHUSDT"], MarketStream::BookTicker);

    let subscription = multiplexer(&transport)
        .subscribe(Market::Spot, &targets, Arc::new(on_event), true)
        .expect("subscribe");
    subscription.stop(StopOptions::default());
    drop(subscription);

    // Drop after an explicit stop does not close again.
    assert_eq!(transport.closes().len(), 2);

    let (_events, on_event) = collector::<MarketEvent>();
    let dropped = multiplexer(&transport)
        .subscribe(Market::Spot, &targets, Arc::new(on_event), true)
        .expect("subscribe");
    drop(dropped);
    assert_eq!(transport.closes().len(), 4);
}

#[tokio::test]
async fn test_failed_open_closes_already_opened_connections() {
    let transport = MockTransport::new();
    transport.refuse("ethusdt");
    let (events, on_event) = collector::<MarketEvent>();
    let targets = StreamTarget::for_symbols(&["BTCUSDT", "ETHUSDT"], MarketStream::Trades);

    let err = multiplexer(&transport)
        .subscribe(Market::Spot, &targets, Arc::new(on_event), true)
        .expect_err("open refused");

    assert!(matches!(err, BinanceError::WebSocket(_)));
    assert_eq!(transport.opened(), vec!["wss://spot.test/ws/btcusdt@trade".to_string()]);
    let closes = transport.closes();
    assert_eq!(closes.len(), 1);
    assert!(closes[0].1.keep_closed);

    transport.inject_text(0, r#"{"e":"trade","E":1,"s":"BTCUSDT","t":1,"p":"1","q":"1","T":1,"m":true}"#);
    settle().await;
    assert!(events.lock().unwrap().is_empty());
}
