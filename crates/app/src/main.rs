//! Pokerroom - planning-poker room server
//!
//! Usage: `pokerroom [CONFIG_PATH]`

use std::path::PathBuf;

use pokerroom_net::Server;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod error;

use config::AppConfig;
use error::Result;

fn main() {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);

    let config = match AppConfig::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("pokerroom: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();

    tracing::info!("Starting pokerroom");

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to create tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(config)) {
        tracing::error!("Server failed: {}", e);
        std::process::exit(1);
    }
}

async fn run(config: AppConfig) -> Result<()> {
    let server = Server::start(config.server_config()).await?;
    tracing::info!(addr = %server.addr(), "Listening");

    tokio::signal::ctrl_c().await?;
    tracing::info!(rooms = server.registry().len(), "Interrupt received");
    server.shutdown();

    // Give connection tasks a moment to flush the shutdown notice
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    Ok(())
}
