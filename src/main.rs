#![allow(warnings)]

use clap::Parser;

/// Real-time Solana wallet activity pipeline
#[derive(Parser, Debug)]
#[command(name = "walletpulse", version, about)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, default_value = walletpulse::config::CONFIG_FILE_PATH)]
    config: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = walletpulse::run::run_pipeline(&args.config).await {
        eprintln!("walletpulse failed: {}", e);
        std::process::exit(1);
    }
}
