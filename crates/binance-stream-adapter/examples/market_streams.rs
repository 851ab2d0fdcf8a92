/*
[INPUT]:  Symbols on the public spot streams
[OUTPUT]: Normalized trades and book snapshots printed for ten seconds
[POS]:    Examples - market data subscriptions
[UPDATE]: When the subscription API changes
*/

use binance_stream_adapter::*;
use tokio::time::{Duration, sleep};

#[tokio::main]
async fn main() -> Result<()> {
    println!("=== Binance Market Streams Example ===\n");

    let client = BinanceClient::new()?;

    let trades = client.agg_trades(Market::Spot, &["BTCUSDT", "ETHUSDT"], |event| {
        if let MarketEvent::AggTrade(trade) = event {
            println!("{} {} @ {}", trade.symbol, trade.quantity, trade.price);
        }
    })?;
    println!("✓ aggTrade streams open: {}", trades.len());

    let book = client.partial_depth(
        Market::Spot,
        &["BTCUSDT"],
        5,
        Some(UpdateSpeed::Ms1000),
        |event| {
            if let MarketEvent::PartialDepth(depth) = event {
                let best_bid = depth.bids.first().map(|level| level.price);
                let best_ask = depth.asks.first().map(|level| level.price);
                println!("{} bid {:?} ask {:?}", depth.symbol, best_bid, best_ask);
            }
        },
    )?;
    println!("✓ depth5 stream open\n");

    sleep(Duration::from_secs(10)).await;

    trades.stop(StopOptions::default());
    book.stop(StopOptions::default());
    println!("\n✓ Subscriptions stopped");
    Ok(())
}
