mod agent;
mod config;
mod conversation;
mod providers;
mod relay;
mod server;
mod tools;
mod utils;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::providers::UpstreamClient;
use crate::server::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment file.
    // - Default: .env discovered from current working directory and parents.
    // - Override: TOOLGATE_ENV_FILE=/absolute/path/to/envfile
    if let Ok(path) = std::env::var("TOOLGATE_ENV_FILE") {
        if !path.trim().is_empty() {
            if let Err(e) = dotenvy::from_path(&path) {
                eprintln!("Warning: failed to load TOOLGATE_ENV_FILE '{}': {}", path, e);
            }
        } else {
            let _ = dotenvy::dotenv();
        }
    } else {
        let _ = dotenvy::dotenv();
    }

    // Tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env()?;
    let backend = UpstreamClient::new(&config.upstream_base_url, &config.upstream_api_key)
        .map_err(|e| anyhow::anyhow!(e))?;

    let state = AppState {
        backend: Arc::new(backend),
        allowed_models: config.allowed_models.clone(),
    };

    server::serve(state, config.listen_port).await
}
