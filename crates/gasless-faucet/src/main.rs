//! Gasless faucet server.
//!
//! Tops up token holders with enough ETH for their first transactions.

use anyhow::{Context, Result};
use clap::Parser;
use gasless_faucet::{config::FaucetConfig, http::start_server};
use std::path::{Path, PathBuf};
use tracing::info;

/// Command-line arguments for the faucet server
#[derive(Parser, Debug)]
#[command(author, version, about = "Funds gating-token holders with gas money")]
struct Args {
    /// TOML configuration file; `FAUCET_*` variables override its values
    #[arg(short = 'c', long, default_value = "faucet-config.toml", env = "FAUCET_CONFIG")]
    config: PathBuf,

    /// Write a template configuration to `--config` and exit
    #[arg(long)]
    generate_config: bool,

    /// Enable debug logging
    #[arg(short = 'd', long, env = "FAUCET_DEBUG")]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(log_level.parse()?)
                .add_directive("hyper=info".parse()?),
        )
        .init();

    if args.generate_config {
        write_template(&args.config)?;
        println!("Wrote {}", args.config.display());
        println!("Set ethereum.private_key and ethereum.gating_token_address before starting.");
        return Ok(());
    }

    let config = load_validated(&args.config)?;
    log_summary(&config);

    start_server(&config).await?;
    Ok(())
}

/// Read the configuration and reject anything the server cannot run with
fn load_validated(path: &Path) -> Result<FaucetConfig> {
    if !path.exists() {
        anyhow::bail!(
            "{} not found; run with --generate-config to create a template",
            path.display()
        );
    }

    let config = FaucetConfig::from_file(path)
        .with_context(|| format!("reading {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("invalid configuration in {}", path.display()))?;

    Ok(config)
}

fn write_template(path: &Path) -> Result<()> {
    if path.exists() {
        anyhow::bail!("{} already exists; refusing to overwrite", path.display());
    }
    FaucetConfig::default().save_to_file(path)
}

fn log_summary(config: &FaucetConfig) {
    info!("gasless-faucet v{}", env!("CARGO_PKG_VERSION"));
    info!("RPC endpoint: {}", config.ethereum.rpc_url);
    info!("Gating token: {}", config.ethereum.gating_token_address);
    info!(
        "Disbursement {} ETH to addresses below {} ETH",
        config.ethereum.disbursement_amount_eth, config.ethereum.min_sufficient_balance_eth
    );
    info!(
        "Timestamps valid for {}s, one disbursement per address every {}h",
        config.eligibility.freshness_window_secs, config.eligibility.cooldown_hours
    );
    info!(
        "Rate limit: {} requests/minute per client",
        config.rate_limit.requests_per_minute
    );
}
