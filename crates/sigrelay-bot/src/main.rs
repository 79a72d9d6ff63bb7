//! sigrelay - Entry Point

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Trading signal relay for Bitget futures
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via SIGRELAY_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    sigrelay_telemetry::init_logging()?;

    info!("Starting sigrelay v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > SIGRELAY_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("SIGRELAY_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");
    let config = sigrelay_bot::AppConfig::from_file(&config_path)?;
    info!(
        base_url = %config.exchange.base_url,
        data_dir = %config.persistence.data_dir,
        "Configuration loaded"
    );

    let app = sigrelay_bot::Application::new(config)?;
    app.run().await?;

    Ok(())
}
