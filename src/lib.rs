pub mod api;
pub mod chat; // Read-only conversation log
pub mod config;
pub mod models;
pub mod pipeline;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::pipeline::structuring::{ExtractionPipeline, OllamaClient, StructuringError};

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Generation backend error: {0}")]
    Backend(#[from] StructuringError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("Server error: {0}")]
    Server(String),
}

pub fn run() -> Result<(), StartupError> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = AppConfig::from_env()?;

    // The blocking client is built and probed before the async runtime exists.
    let client = OllamaClient::new(&config.ollama_url, config.timeout_secs)?;
    let model = select_model(&client, config.model.as_deref());
    tracing::info!(ollama_url = %config.ollama_url, %model, "Generation backend configured");

    let pipeline = ExtractionPipeline::new(Box::new(client), &model);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let mut server = api::start_api_server(pipeline, config.bind_addr)
            .await
            .map_err(StartupError::Server)?;
        tracing::info!(addr = %server.session.server_addr, "Listening");

        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {e}");
        }
        server.shutdown();
        server.stopped().await;
        Ok(())
    })
}

/// Configured model, else the best installed one, else the fallback.
fn select_model(client: &OllamaClient, configured: Option<&str>) -> String {
    if let Some(model) = configured {
        return model.to_string();
    }
    match client.find_best_model() {
        Ok(model) => model,
        Err(e) => {
            tracing::warn!(
                error = %e,
                fallback = config::FALLBACK_MODEL,
                "No preferred model detected, using fallback"
            );
            config::FALLBACK_MODEL.to_string()
        }
    }
}
