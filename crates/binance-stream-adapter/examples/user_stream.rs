/*
[INPUT]:  BINANCE_API_KEY environment variable
[OUTPUT]: Futures account/order events printed until Ctrl-C
[POS]:    Examples - user data session lifecycle
[UPDATE]: When the user stream API changes
*/

use binance_stream_adapter::*;

#[tokio::main]
async fn main() -> Result<()> {
    println!("=== Binance User Stream Example ===\n");

    let api_key = std::env::var("BINANCE_API_KEY")
        .map_err(|_| BinanceError::Config("BINANCE_API_KEY is not set".to_string()))?;
    let mut client = BinanceClient::new()?;
    client.set_api_key(api_key);

    let options = UserStreamOptions {
        emit_stream_errors: true,
        ..UserStreamOptions::default()
    };
    let handle = client
        .user_stream(Market::Futures, options)
        .start(
            |event| match event {
                UserStreamEvent::Data(event) => println!("{}: {event:?}", event.event_type()),
                UserStreamEvent::StreamError(err) => println!("session error: {err}"),
                other => println!("{other:?}"),
            },
            true,
        )
        .await?;
    println!("✓ Session established, state {:?}", handle.state());

    let _ = tokio::signal::ctrl_c().await;

    handle.stop(StopOptions::default()).await?;
    println!("\n✓ Session closed");
    Ok(())
}
