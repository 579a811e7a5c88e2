//! Sitewatch server binary

use common::logging::{self, LogFormat};
use sitewatch_server::{Config, ServerConfig, SitewatchServer};

#[tokio::main]
async fn main() -> common::Result<()> {
    // Load configuration first (needed for logging settings)
    let yaml_config = match Config::load() {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            // Can't use tracing yet - not initialized
            eprintln!("Configuration error: {}", e);
            eprintln!("Using default configuration");
            None
        }
    };

    let (log_level, log_format) = match yaml_config {
        Some(ref cfg) => (
            cfg.logging.level.clone().unwrap_or_else(|| "info".into()),
            LogFormat::from_name(cfg.logging.format.as_deref()),
        ),
        None => ("info".into(), LogFormat::Text),
    };
    logging::init_with(&log_level, log_format);

    tracing::info!("Sitewatch server starting");

    let server_config = yaml_config
        .map(|cfg| {
            tracing::info!("Configuration loaded successfully");
            cfg.to_server_config()
        })
        .unwrap_or_else(|| {
            tracing::warn!("Using default configuration");
            ServerConfig::default()
        });

    SitewatchServer::new(server_config).run().await
}
