//! HTTP server command

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use crate::registry::{ModelRegistry, YamlRegistry};
use crate::server::{self, AppState};

/// Start the inference server
pub async fn serve(config: Option<PathBuf>, port: Option<u16>, host: Option<String>) -> Result<()> {
    let mut config = super::load_config(config.as_deref())?;
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(host) = host {
        config.server.host = host;
    }

    let registry = YamlRegistry::from_yaml(&config.paths.model_registry)?;
    tracing::info!(
        models = registry.models.len(),
        base_model = %registry.base_model().display(),
        "Loaded model registry"
    );

    let engine = super::start_engine(&config, registry.base_model()).await?;
    let state = Arc::new(AppState::new(engine, Arc::new(registry)));

    tracing::info!("Starting server at http://{}", config.server.addr());
    server::start(state, config.server).await?;

    Ok(())
}
