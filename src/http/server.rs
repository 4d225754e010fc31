//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (request ID, tracing, timeout)
//! - Route each request by Host into the template registry
//! - Serve raw files from a host's `static/` directory through the sandbox

use std::collections::BTreeMap;
use std::io;
use std::time::Duration;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ListenerConfig;
use crate::http::request::{request_host, request_id, MakeRequestUuid, PageData};
use crate::http::response::{content_type_for, error_response};
use crate::registry::Registry;

/// Template rendered for `/`.
pub const INDEX_TEMPLATE: &str = "index.html";

/// Directory inside a host folder served under `/static/`.
pub const STATIC_DIR: &str = "static";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Registry,
}

/// HTTP front end for the template registry.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(registry: Registry, config: &ListenerConfig) -> Self {
        let state = AppState { registry };
        Self {
            router: Self::build_router(config, state),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ListenerConfig, state: AppState) -> Router {
        Router::new()
            .route("/", get(index_handler))
            .route("/static/{*path}", get(static_handler))
            .route("/{page}", get(page_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
                    .layer(PropagateRequestIdLayer::x_request_id()),
            )
    }

    /// Serve on `listener` until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn index_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<BTreeMap<String, String>>,
) -> Response {
    render_page(state, &headers, INDEX_TEMPLATE.to_string(), "/".to_string(), query).await
}

async fn page_handler(
    State(state): State<AppState>,
    Path(page): Path<String>,
    headers: HeaderMap,
    Query(query): Query<BTreeMap<String, String>>,
) -> Response {
    let path = format!("/{page}");
    render_page(state, &headers, page, path, query).await
}

async fn render_page(
    state: AppState,
    headers: &HeaderMap,
    template: String,
    path: String,
    query: BTreeMap<String, String>,
) -> Response {
    let request_id = request_id(headers);
    let host = request_host(headers);
    tracing::debug!(request_id = %request_id, host = %host, template = %template, "Rendering page");

    let content_type = content_type_for(&template, "text/html; charset=utf-8");
    let data = PageData { host: host.clone(), path, query };
    let registry = state.registry.clone();

    // template functions read files synchronously
    let rendered = tokio::task::spawn_blocking(move || {
        registry.render_to_string(&host, &template, &data)
    })
    .await;

    match rendered {
        Ok(Ok(body)) => ([(header::CONTENT_TYPE, content_type)], body).into_response(),
        Ok(Err(err)) => error_response(&err, &request_id),
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Render task failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn static_handler(
    State(state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> Response {
    let request_id = request_id(&headers);
    let host = request_host(&headers);
    let name = format!("{STATIC_DIR}/{path}");

    let file = match state.registry.resolve_path(&host, &name) {
        Ok(file) => file,
        Err(err) => return error_response(&err, &request_id),
    };

    match tokio::fs::read(&file).await {
        Ok(bytes) => {
            let content_type = content_type_for(&name, "application/octet-stream");
            ([(header::CONTENT_TYPE, content_type)], bytes).into_response()
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            tracing::error!(request_id = %request_id, file = %file.display(), error = %e, "Static read failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
