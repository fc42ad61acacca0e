//! Questionnaire API server implementation
//!
//! HTTP REST API server using Axum over a shared [`Questionnaire`].

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::handlers;
use crate::service::Questionnaire;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;

/// API Server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub version: String,
    pub questionnaire: Arc<Questionnaire>,
}

impl AppState {
    pub fn new(questionnaire: Arc<Questionnaire>) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            questionnaire,
        }
    }
}

/// Build the router with every route and middleware layer
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health and info endpoints
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/version", get(handlers::version))
        // Questionnaire endpoints
        .route("/api/v1/sheets", get(handlers::list_sheets))
        .route("/api/v1/sheets/:id/questions", get(handlers::list_questions))
        .route("/api/v1/questions/:id", get(handlers::get_question))
        .route(
            "/api/v1/questions/:id/response",
            post(handlers::save_response),
        )
        .route("/api/v1/import", post(handlers::import_questionnaire))
        .route("/api/v1/export", get(handlers::export_questionnaire))
        .route("/api/v1/templates", get(handlers::list_templates))
        .with_state(Arc::new(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Run the API server until Ctrl+C or SIGTERM
pub async fn run_api_server(config: ApiConfig, questionnaire: Arc<Questionnaire>) -> anyhow::Result<()> {
    let app = build_router(AppState::new(questionnaire));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Questionnaire API server starting on http://{}", addr);
    info!("   Endpoints: /api/v1/sheets, /api/v1/questions, /api/v1/import, /api/v1/export, /api/v1/templates");
    info!("   Health: /health, Version: /version");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Questionnaire API server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping server...");
}
