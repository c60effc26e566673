//! Horizon Relay daemon.
//!
//! Usage: `horizon-relayd [config.toml]`
//!
//! Without a configuration file the defaults are used. Log output is
//! controlled with `RUST_LOG` and defaults to `info`.

use std::error::Error;

use horizon_relay_api::{JsonLineServer, Managers, ServerConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    let config = match std::env::args_os().nth(1) {
        Some(path) => {
            tracing::info!(path = %path.to_string_lossy(), "loading configuration");
            ServerConfig::load_toml(path)?
        }
        None => ServerConfig::default(),
    };

    let managers = Managers::new();
    let server = JsonLineServer::bind(config, managers).await?;
    tracing::info!(address = %server.local_addr()?, "horizon-relayd started");

    server
        .serve_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    tracing::info!("horizon-relayd stopped");
    Ok(())
}
