//! HTTP server for the parsing service

pub mod routes;
pub mod state;

use axum::{extract::DefaultBodyLimit, http::Method, routing::get, Router};
use std::net::SocketAddr;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::ServiceConfig;
use crate::error::{Error, Result};
use state::AppState;

/// Parsing HTTP server
pub struct ParseServer {
    config: ServiceConfig,
    state: AppState,
}

impl ParseServer {
    /// Create a new server with process-backed workers
    pub async fn new(config: ServiceConfig) -> Result<Self> {
        config.validate()?;
        let state = AppState::new(config.clone()).await?;
        Ok(Self { config, state })
    }

    /// Create a server around existing state
    pub fn with_state(state: AppState) -> Self {
        Self {
            config: state.config().clone(),
            state,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        router(self.state.clone())
    }

    /// Serve until Ctrl-C, then shut every job down
    pub async fn start(self) -> Result<()> {
        let addr: SocketAddr = self
            .address()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid address: {}", e)))?;

        let router = self.build_router();

        tracing::info!("Starting parsing server on http://{}", addr);
        if !self.config.server.prefix.is_empty() {
            tracing::info!("Routes are served under {}", self.config.server.prefix);
        }

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Config(format!("Failed to bind: {}", e)))?;

        let served = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        self.state.registry().shutdown_all();
        served.map_err(|e| Error::Internal(format!("Server error: {}", e)))
    }

    /// Get the server address
    pub fn address(&self) -> String {
        format!("{}:{}", self.config.server.host, self.config.server.port)
    }
}

/// Router for `state`, including middleware
pub fn router(state: AppState) -> Router {
    let config = state.config().server.clone();

    let api = routes::job_routes();
    let app = if config.prefix.is_empty() {
        Router::new().merge(api)
    } else {
        Router::new().nest(&config.prefix, api)
    };

    let app = app
        // Health check
        .route("/health", get(health_check))
        .with_state(state)
        .layer(DefaultBodyLimit::max(config.max_upload_size))
        .layer(TraceLayer::new_for_http());

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::PUT, Method::POST, Method::DELETE])
            .allow_headers(Any)
            .expose_headers([axum::http::header::LOCATION]);
        app.layer(cors)
    } else {
        app
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Unable to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
