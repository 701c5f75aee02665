//! `WsubusServer`: axum HTTP + WebSocket front end.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use wsubus_core::ConnectionId;

use crate::config::ServerConfig;
use crate::context::ServerContext;
use crate::health::{self, HealthResponse};
use crate::metrics::WS_CONNECTIONS_REJECTED_TOTAL;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::session::run_ws_session;

/// WebSocket subprotocol offered on `/ws`.
pub const WS_SUBPROTOCOL: &str = "ubus-json";

/// State shared by the axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Dispatcher dependencies.
    pub ctx: Arc<ServerContext>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Prometheus handle (None = `/metrics` returns 404).
    pub metrics: Option<PrometheusHandle>,
}

/// The bridge server.
pub struct WsubusServer {
    ctx: Arc<ServerContext>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: Option<PrometheusHandle>,
}

impl WsubusServer {
    /// Create a server around `ctx`.
    pub fn new(ctx: ServerContext) -> Self {
        Self {
            ctx: Arc::new(ctx),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            metrics: None,
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the router.
    pub fn router(&self) -> Router {
        let state = AppState {
            ctx: Arc::clone(&self.ctx),
            shutdown: Arc::clone(&self.shutdown),
            metrics: self.metrics.clone(),
        };
        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(CorsLayer::permissive()),
            )
            .with_state(state)
    }

    /// Bind and serve in the background until shutdown fires.
    ///
    /// Returns the bound address (useful with port 0) and the server task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(self.ctx.config.bind_address()).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();
        info!(%addr, "listening");
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                warn!(error = %e, "server exited with error");
            }
        });
        Ok((addr, handle))
    }

    /// Dispatcher dependencies.
    pub fn context(&self) -> &Arc<ServerContext> {
        &self.ctx
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.ctx.config
    }
}

/// GET /ws
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let config = &state.ctx.config;
    if state.ctx.connections.count() >= config.max_connections {
        warn!(limit = config.max_connections, "connection limit reached");
        counter!(WS_CONNECTIONS_REJECTED_TOTAL).increment(1);
        return (StatusCode::SERVICE_UNAVAILABLE, "too many connections").into_response();
    }
    let conn_id = ConnectionId::new();
    let ctx = Arc::clone(&state.ctx);
    let token = state.shutdown.token();
    ws.protocols([WS_SUBPROTOCOL])
        .max_message_size(config.max_message_size)
        .on_upgrade(move |socket| run_ws_session(socket, conn_id, ctx, token))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.ctx.start_time,
        state.ctx.connections.count(),
        state.ctx.subscriptions.count(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
