use bitmex_bridge::config::{BridgeConfig, ContractsPerTrade, DEFAULT_CONFIG_PATH};
use bitmex_bridge::execution::sizing::scaled_quantity;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

/// Validate a bridge configuration file without touching the exchange
#[derive(Parser, Debug)]
#[command(name = "check_config")]
struct Args {
    /// Configuration file to check
    #[arg(default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Show the scaled order size for this balance (mXBT)
    #[arg(long)]
    balance: Option<f64>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter("bitmex_bridge=info")
        .init();

    let args = Args::parse();

    let config = match BridgeConfig::load(&args.config).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {}", e);
            return ExitCode::FAILURE;
        }
    };

    println!("✓ {} is valid", args.config.display());
    println!("  leverage ............. {}", config.leverage);
    println!("  trade mode ........... {}", config.trade_mode);
    println!("  contracts per trade .. {}", config.contracts_per_trade);
    println!("  API key .............. {}", config.api.masked_key());

    if let Some(balance) = args.balance {
        let quantity = match config.contracts_per_trade {
            ContractsPerTrade::Fixed(n) => n,
            ContractsPerTrade::Scaled { k0, u, k } => scaled_quantity(k0, u, k, balance),
        };
        println!("  order size at {:.2} .. {} contracts", balance, quantity);
    }

    ExitCode::SUCCESS
}
