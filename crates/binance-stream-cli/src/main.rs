/*
[INPUT]:  CLI arguments, YAML configuration file, OS shutdown signals
[OUTPUT]: Normalized stream events on stdout with graceful shutdown
[POS]:    Binary entry point
[UPDATE]: When changing CLI flags, startup flow, or shutdown handling
*/

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use binance_stream_adapter::{BinanceClient, StopOptions, Subscription, UserStreamHandle};
use binance_stream_cli::{RunnerConfig, event_line};

#[derive(Parser, Debug)]
#[command(name = "binance-stream", version, about = "Binance market and user data stream runner")]
struct Cli {
    #[arg(long = "config", value_name = "PATH")]
    config_path: PathBuf,
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    log_level: String,
    #[arg(long = "dry-run")]
    dry_run: bool,
    /// Print payloads as received, skipping normalization
    #[arg(long = "raw")]
    raw: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(&args.log_level)?;

    info!(
        config_path = %args.config_path.display(),
        dry_run = args.dry_run,
        raw = args.raw,
        "starting binance-stream"
    );

    let config = load_config(&args.config_path)?;
    info!(
        market_streams = config.market_streams.len(),
        user_streams = config.user_streams.len(),
        "configuration loaded"
    );

    if args.dry_run {
        info!("dry-run requested; configuration validated");
        return Ok(());
    }

    let mut client = BinanceClient::new().context("build client")?;
    if !config.user_streams.is_empty() {
        let api_key = std::env::var(&config.api_key_env)
            .with_context(|| format!("{} must be set for user streams", config.api_key_env))?;
        client.set_api_key(api_key);
    }

    let shutdown = CancellationToken::new();
    setup_signal_handlers(shutdown.clone());

    let mut subscriptions: Vec<Subscription> = Vec::new();
    for stream in &config.market_streams {
        let targets = stream.targets()?;
        let source = format!("{}:{:?}", stream.market, stream.stream);
        let normalize = !(args.raw || stream.raw);
        let subscription = client
            .subscribe(stream.market, &targets, move |event| print_event(&source, &event), normalize)
            .with_context(|| format!("subscribe {} {:?}", stream.market, stream.stream))?;
        subscriptions.push(subscription);
    }
    info!(subscriptions = subscriptions.len(), "market streams started");

    let mut sessions: Vec<UserStreamHandle> = Vec::new();
    for user in &config.user_streams {
        let source = format!("{}:user", user.market);
        let normalize = !(args.raw || user.raw);
        let handle = client
            .user_stream(user.market, user.options())
            .start(move |event| print_event(&source, &event), normalize)
            .await
            .with_context(|| format!("start {} user stream", user.market))?;
        sessions.push(handle);
    }
    info!(sessions = sessions.len(), "user streams started");

    shutdown.cancelled().await;
    info!("shutdown signal received");

    for subscription in &subscriptions {
        subscription.stop(StopOptions::default());
    }
    for session in &sessions {
        if let Err(err) = session.stop(StopOptions::default()).await {
            warn!(error = %err, "user stream stop reported an error");
        }
    }
    info!("streams shutdown complete");

    Ok(())
}

fn print_event<E: Serialize>(source: &str, event: &E) {
    match event_line(source, event) {
        Ok(line) => println!("{line}"),
        Err(err) => error!(source, error = %err, "failed to render event"),
    }
}

fn init_tracing(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(log_level).context("invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow!(err))
        .context("initialize tracing subscriber")?;
    Ok(())
}

fn load_config(path: &PathBuf) -> Result<RunnerConfig> {
    let path_str = path
        .to_str()
        .context("config path must be valid utf-8")?;
    RunnerConfig::from_file(path_str).context("load config")
}

fn setup_signal_handlers(shutdown: CancellationToken) {
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to install SIGINT handler");
            return;
        }
        info!("received SIGINT");
        shutdown_clone.cancel();
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let shutdown_clone = shutdown.clone();
        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                    info!("received SIGTERM");
                    shutdown_clone.cancel();
                }
                Err(err) => {
                    warn!(error = %err, "failed to install SIGTERM handler");
                }
            }
        });
    }
}
