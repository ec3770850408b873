use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::routes::create_api_router;
use tutor_core::AnswerPipeline;
use tutor_core::bootstrap::build_pipeline;
use tutor_core::config::{SecretConfig, TutorConfig};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Pipeline configuration
    pub tutor_config: TutorConfig,

    /// Provider API keys
    pub secret_config: SecretConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            tutor_config: TutorConfig::default(),
            secret_config: SecretConfig::default(),
        }
    }
}

/// Shared state of all handlers
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<AnswerPipeline>,
}

impl AppState {
    pub fn new(pipeline: AnswerPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }
}

/// Router with state, CORS and request tracing
pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    create_api_router()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Start the HTTP server
pub async fn start_server(config: ServerConfig) -> anyhow::Result<()> {
    let pipeline = build_pipeline(&config.tutor_config, &config.secret_config).await?;
    info!(
        "Initialized answer pipeline ({} corpus segments)",
        pipeline.index().len()
    );

    let app = build_app(AppState::new(pipeline));

    let addr = format!("{}:{}", config.host, config.port).parse::<SocketAddr>()?;
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
