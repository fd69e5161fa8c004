//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the intent and transfer handlers
//! - Wire up middleware (panic capture, timeout, request ID, tracing)
//! - Serve until shutdown is triggered, then drain

use std::any::Any;
use std::time::Duration;

use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::approval::ApprovalService;
use crate::config::ServerConfig;
use crate::http::handlers;
use crate::http::request::request_id;
use crate::http::response::ApiError;
use crate::lifecycle::Shutdown;
use crate::store::LedgerStore;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub approvals: ApprovalService,
    pub store: LedgerStore,
}

/// HTTP server for the disbursement API.
pub struct HttpServer {
    router: Router,
    config: ServerConfig,
}

impl HttpServer {
    pub fn new(state: AppState, config: ServerConfig) -> Self {
        let router = Self::build_router(&config, state);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ServerConfig, state: AppState) -> Router {
        Router::new()
            .route("/intent/create", post(handlers::create_intent))
            .route("/intent/vote", post(handlers::cast_vote))
            .route("/intent/page", get(handlers::page_intents))
            .route("/intent/{id}", get(handlers::get_intent))
            .route("/transfer/page", get(handlers::page_transfers))
            .route("/health", get(handlers::health))
            .with_state(state)
            .layer(CatchPanicLayer::custom(handle_panic))
            .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
            .layer(middleware::from_fn(request_id))
            .layer(TraceLayer::new_for_http())
    }

    /// The fully layered router, for serving or in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server on `listener` until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            request_timeout_secs = self.config.request_timeout_secs,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!(panic = %detail, "Handler panicked");
    ApiError::internal().into_response()
}
