use anyhow::Context;
use bitmex_bridge::backfill::{
    DEFAULT_CHUNK_COUNT, DEFAULT_CHUNK_SIZE, MAX_CHUNK_COUNT, MAX_CHUNK_SIZE,
};
use bitmex_bridge::config::DEFAULT_CONFIG_PATH;
use bitmex_bridge::engine::read_connection_port;
use bitmex_bridge::execution::PollingCandleFeed;
use bitmex_bridge::{BitMexClient, Bridge, BridgeSettings, ConfigReconciler, ExchangeGateway};
use clap::Parser;
use std::convert::Infallible;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

/// Bridges a BitMEX account to a local decision engine
#[derive(Parser, Debug)]
#[command(name = "bitmex-bridge", version)]
struct Args {
    /// Bridge configuration file (JSON)
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Instrument symbol on BitMEX
    #[arg(long, default_value = "XBTUSD")]
    symbol: String,

    /// Instrument symbol on the decision engine side
    #[arg(long, default_value = "XBT/USD")]
    engine_symbol: String,

    /// 1-minute candles per history chunk (at most 1000)
    #[arg(
        long,
        default_value_t = DEFAULT_CHUNK_SIZE,
        value_parser = clap::value_parser!(u32).range(1..=MAX_CHUNK_SIZE as i64)
    )]
    history_chunk: u32,

    /// Number of history chunks replayed before going live
    #[arg(
        long,
        default_value_t = DEFAULT_CHUNK_COUNT,
        value_parser = clap::value_parser!(u32).range(0..=MAX_CHUNK_COUNT as i64)
    )]
    history_chunks: u32,

    /// Turn the engine's HCI filter off while replaying history
    #[arg(long)]
    hci_toggle: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    setup_logging();

    let args = Args::parse();
    tracing::info!("Started bitmex-bridge process (pid {})", std::process::id());

    match run(args).await {
        Ok(never) => match never {},
        Err(e) => {
            tracing::error!("[*** FATAL ERROR ***] {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("bitmex_bridge=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(args: Args) -> anyhow::Result<Infallible> {
    let reconciler = ConfigReconciler::load(&args.config).await?;

    let port = read_connection_port(&mut BufReader::new(tokio::io::stdin())).await?;
    tracing::info!("Obtained connection port {} to local decision engine", port);

    let config = reconciler.active();
    let gateway: Arc<dyn ExchangeGateway> = Arc::new(
        BitMexClient::new(config.api.clone(), config.trade_mode, &args.symbol)
            .context("creating BitMEX gateway")?,
    );
    tracing::info!(mode = %config.trade_mode, symbol = %args.symbol, "BitMEX gateway ready");

    let settings = BridgeSettings {
        engine_symbol: args.engine_symbol,
        history_chunk_size: args.history_chunk,
        history_chunk_count: args.history_chunks,
        hci_toggle: args.hci_toggle,
        ..BridgeSettings::default()
    };
    let feed = Box::new(PollingCandleFeed::new(Arc::clone(&gateway)));

    let bridge = Bridge::connect(settings, reconciler, gateway, feed, port).await?;
    Ok(bridge.run().await?)
}
