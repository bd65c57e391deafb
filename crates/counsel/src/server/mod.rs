//! HTTP API server
//!
//! Wires the account, consultation, conversation, and forum handlers onto an
//! axum router over a shared [`AppState`].

pub mod chat;
pub mod forum;
pub mod users;

use axum::body::Body;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::{CounselError, Result};
use crate::relay::RelayClient;
use crate::storage::Store;

/// Shared application state for all handlers
pub struct AppState {
    /// Full configuration, read-only after startup
    pub config: Config,
    /// SQLite store
    pub store: Store,
    /// Upstream AI relay client
    pub relay: RelayClient,
}

/// The API server
pub struct ApiServer {
    state: Arc<AppState>,
}

impl ApiServer {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Bind and serve until Ctrl+C or SIGTERM
    pub async fn serve(&self) -> Result<()> {
        let addr: SocketAddr = self
            .state
            .config
            .server
            .listen_addr
            .parse()
            .map_err(|e| CounselError::Config(format!("Invalid listen address: {e}")))?;

        let app = create_router(self.state.clone());

        tracing::info!("Starting API server on {addr}");

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| CounselError::Server(format!("Failed to bind to {addr}: {e}")))?;

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| CounselError::Server(format!("Server error: {e}")))?;

        tracing::info!("API server shut down gracefully");
        Ok(())
    }
}

/// Create the router with all routes configured
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/register", post(users::register))
        .route("/login", post(users::login))
        .route("/users/me", get(users::me))
        .route("/ai/chat", post(chat::chat))
        .route("/ai/mock-chat", post(chat::mock_chat))
        .route(
            "/api/conversations",
            post(chat::create_conversation).get(chat::list_conversations),
        )
        .route(
            "/api/conversations/{id}",
            get(chat::get_conversation).delete(chat::delete_conversation),
        )
        .route(
            "/api/legal-articles",
            post(forum::create_article).get(forum::list_articles),
        )
        .route("/api/legal-articles/{id}", get(forum::get_article))
        .route(
            "/api/discussions",
            post(forum::create_discussion).get(forum::list_discussions),
        )
        .route("/api/discussions/{id}", get(forum::get_discussion))
        .route("/api/discussions/{id}/comments", get(forum::list_comments))
        .route("/api/comments", post(forum::create_comment))
        .route(
            "/api/users/profile",
            get(users::get_profile).put(users::update_profile),
        )
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn root_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({"message": "Welcome to the Counsel legal consultation API"}))
}

/// Health check endpoint - returns JSON status
async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Create a JSON error response
pub fn error_response(status: StatusCode, error_type: &str, message: &str) -> Response {
    let body = serde_json::json!({
        "error": {
            "type": error_type,
            "message": message,
        }
    });

    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap_or_else(|_| {
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Body::empty())
                .unwrap()
        })
}

/// Map a store failure onto a 500 with a log line
pub(crate) fn internal_error(e: CounselError) -> Response {
    tracing::error!(error = %e, "Request failed");
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "Internal server error",
    )
}

impl IntoResponse for CounselError {
    fn into_response(self) -> Response {
        internal_error(self)
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}
