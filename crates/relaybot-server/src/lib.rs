//! HTTP relay for the relaybot conversation core
//!
//! Any chat transport can drive the bot through `POST /ask`, which runs the
//! same command handling and memory-backed turns as an in-process dispatcher.
//! The remaining routes expose per-conversation memory (stats, context,
//! summarization, clearing) and store-wide statistics for operators.

pub mod error;

pub use error::{Result, ServerError};

use axum::extract::{DefaultBodyLimit, Json as AxumJson, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::{middleware, Router};
use relaybot_core::core_types::Message;
use relaybot_core::Dispatcher;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
}

/// Chat identifiers arrive as strings from most transports and as integers
/// from Telegram.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ChatId {
    Text(String),
    Number(i64),
}

impl ChatId {
    pub fn into_key(self) -> String {
        match self {
            ChatId::Text(id) => id.trim().to_string(),
            ChatId::Number(id) => id.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub chat_id: ChatId,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub answer: String,
    pub format: relaybot_core::ResponseFormat,
}

#[derive(Debug, Serialize)]
pub struct ContextResponse {
    pub conversation_id: String,
    pub messages: Vec<Message>,
}

/// Configuration for the relay server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub enable_cors: bool,
    /// CORS allowed origins (if None, allows any origin)
    pub cors_origins: Option<Vec<String>>,
    /// Maximum request body size in bytes
    pub max_body_size: usize,
    pub enable_logging: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            enable_cors: true,
            cors_origins: None,
            max_body_size: 256 * 1024,
            enable_logging: true,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and set the bind address from a string.
    pub fn with_bind_addr_str(mut self, addr: &str) -> Result<Self> {
        self.bind_addr = addr
            .parse()
            .map_err(|e| ServerError::config_error(format!("Invalid bind address '{}': {}", addr, e)))?;
        Ok(self)
    }

    pub fn with_cors(mut self, enable: bool) -> Self {
        self.enable_cors = enable;
        self
    }

    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    pub fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    pub fn with_logging(mut self, enable: bool) -> Self {
        self.enable_logging = enable;
        self
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(json!({
            "error": self.to_string(),
            "error_type": self.error_type(),
            "timestamp": chrono::Utc::now()
        }));
        (status, body).into_response()
    }
}

fn not_found(conversation_id: &str) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Conversation not found",
            "conversation_id": conversation_id,
            "timestamp": chrono::Utc::now()
        })),
    )
}

/// Handler for the /ask POST endpoint.
async fn ask_handler(
    State(app_state): State<AppState>,
    AxumJson(request): AxumJson<AskRequest>,
) -> Result<Response> {
    let chat_id = request.chat_id.into_key();
    if chat_id.is_empty() {
        return Err(ServerError::invalid_request("chat_id must not be empty"));
    }
    log::debug!("Ask from chat {}: {} chars", chat_id, request.text.len());

    match app_state
        .dispatcher
        .handle_message(&chat_id, &request.text)
        .await
    {
        Some(reply) => Ok(Json(AskResponse {
            answer: reply.text,
            format: reply.format,
        })
        .into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

/// Handler for the /conversations/{id}/stats GET endpoint.
async fn conversation_stats_handler(
    State(app_state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> std::result::Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    match app_state.dispatcher.memory().get_stats(&conversation_id) {
        Some(stats) => Ok(Json(json!({
            "conversation_id": conversation_id,
            "stats": stats,
            "provider": app_state.dispatcher.provider_for(&conversation_id),
            "format": app_state.dispatcher.format_for(&conversation_id),
            "timestamp": chrono::Utc::now()
        }))),
        None => Err(not_found(&conversation_id)),
    }
}

/// Handler for the /conversations/{id}/context GET endpoint.
async fn conversation_context_handler(
    State(app_state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Json<ContextResponse> {
    let messages = app_state
        .dispatcher
        .memory()
        .get_context_for_provider(&conversation_id);
    Json(ContextResponse {
        conversation_id,
        messages,
    })
}

/// Handler for the /conversations/{id}/summary POST endpoint.
async fn conversation_summary_handler(
    State(app_state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> std::result::Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    log::info!("Received summary request for conversation {}", conversation_id);

    let dispatcher = &app_state.dispatcher;
    let _guard = dispatcher.locks().lock(&conversation_id).await;
    if dispatcher.memory().get_stats(&conversation_id).is_none() {
        return Err(not_found(&conversation_id));
    }

    match dispatcher.memory().create_summary(&conversation_id).await {
        Some(summary) => Ok(Json(json!({
            "conversation_id": conversation_id,
            "summary": summary,
            "timestamp": chrono::Utc::now()
        }))),
        None => Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({
                "error": "Summarization failed",
                "conversation_id": conversation_id,
                "timestamp": chrono::Utc::now()
            })),
        )),
    }
}

/// Handler for the /conversations/{id} DELETE endpoint.
async fn conversation_clear_handler(
    State(app_state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Json<serde_json::Value> {
    log::info!("Received clear request for conversation {}", conversation_id);

    let dispatcher = &app_state.dispatcher;
    let _guard = dispatcher.locks().lock(&conversation_id).await;
    dispatcher.memory().clear_conversation(&conversation_id).await;

    Json(json!({
        "status": "success",
        "message": "Conversation cleared",
        "conversation_id": conversation_id,
        "timestamp": chrono::Utc::now()
    }))
}

/// Handler for the /memory/stats GET endpoint.
async fn memory_stats_handler(State(app_state): State<AppState>) -> Json<serde_json::Value> {
    let stats = app_state.dispatcher.memory().store().get_memory_stats();
    Json(json!({
        "status": "success",
        "memory_stats": stats,
        "timestamp": chrono::Utc::now()
    }))
}

/// The relay HTTP server.
pub struct RelayServer {
    dispatcher: Arc<Dispatcher>,
    config: ServerConfig,
}

impl RelayServer {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            config: ServerConfig::default(),
        }
    }

    pub fn with_config(dispatcher: Arc<Dispatcher>, config: ServerConfig) -> Self {
        Self { dispatcher, config }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the Axum router with all routes and middleware.
    pub fn build_router(&self) -> Router {
        let state = AppState {
            dispatcher: self.dispatcher.clone(),
        };

        let mut router = Router::new()
            .route("/health", get(|| async {
                Json(HealthResponse {
                    status: "healthy".to_string(),
                    timestamp: chrono::Utc::now(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                })
            }))
            .route("/ask", post(ask_handler))
            .route("/conversations/{id}", axum::routing::delete(conversation_clear_handler))
            .route("/conversations/{id}/stats", get(conversation_stats_handler))
            .route("/conversations/{id}/context", get(conversation_context_handler))
            .route("/conversations/{id}/summary", post(conversation_summary_handler))
            .route("/memory/stats", get(memory_stats_handler))
            .layer(DefaultBodyLimit::max(self.config.max_body_size))
            .with_state(state);

        if self.config.enable_logging {
            router = router.layer(middleware::from_fn(
                |request: axum::http::Request<axum::body::Body>, next: axum::middleware::Next| async {
                    let request_id = uuid::Uuid::new_v4().to_string();
                    let method = request.method().clone();
                    let uri = request.uri().clone();

                    // health checks are frequent and uninteresting
                    let quiet = uri.path() == "/health";
                    if quiet {
                        log::debug!("Request {} {} {}", request_id, method, uri);
                    } else {
                        log::info!("Request {} {} {}", request_id, method, uri);
                    }

                    let start = std::time::Instant::now();
                    let response = next.run(request).await;
                    let duration = start.elapsed();

                    if quiet {
                        log::debug!("Response {} {} in {:?}", request_id, response.status(), duration);
                    } else {
                        log::info!("Response {} {} in {:?}", request_id, response.status(), duration);
                    }

                    response
                },
            ));
        }

        router = router.layer(TraceLayer::new_for_http());

        if self.config.enable_cors {
            let cors_layer = match self.config.cors_origins {
                Some(ref origins) => {
                    let origins: std::result::Result<Vec<_>, _> =
                        origins.iter().map(|s| s.parse()).collect();
                    match origins {
                        Ok(origins) => CorsLayer::new()
                            .allow_origin(origins)
                            .allow_methods(Any)
                            .allow_headers(Any),
                        Err(_) => {
                            log::warn!("Invalid CORS origin configured; falling back to permissive CORS");
                            CorsLayer::permissive()
                        }
                    }
                }
                None => CorsLayer::permissive(),
            };
            router = router.layer(cors_layer);
        }

        router
    }

    /// Serve until `shutdown_signal` resolves. Does not flush the store; the
    /// caller owns it and decides when to save.
    pub async fn serve_with_shutdown<F>(self, shutdown_signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let router = self.build_router();
        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|e| {
                ServerError::config_error(format!(
                    "Failed to bind to {}: {}",
                    self.config.bind_addr, e
                ))
            })?;

        log::info!("relay server listening on {}", self.config.bind_addr);
        log::info!("Health check: http://{}/health", self.config.bind_addr);
        log::info!("Ask endpoint: http://{}/ask", self.config.bind_addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ServerError::internal(format!("Server error: {}", e)))?;

        log::info!("relay server shut down gracefully");
        Ok(())
    }
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
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
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            log::info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            log::info!("Received SIGTERM, shutting down...");
        },
    }
}
