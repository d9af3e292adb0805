//! HTTP handlers and routers for the service.

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tower_http::trace::{DefaultOnFailure, DefaultOnResponse};
use tower_http::LatencyUnit;

pub mod bounce;
pub mod create;
pub mod decode;
pub mod handlers;

pub use handlers::not_found_handler;

use crate::ServiceState;

/// Access nodes hand out the first hop URL here
pub const CREATE_PATH: &str = "/swift/api/v1/create";
/// Access nodes turn sealed results into JSON here
pub const DECODE_PATH: &str = "/swift/api/v1/decode-as-json";

pub fn router(state: ServiceState) -> Router {
    let bounce_path = state.config().bounce_path.clone();
    Router::new()
        .route(CREATE_PATH, get(create::handler).post(create::handler))
        .route(DECODE_PATH, get(decode::handler).post(decode::handler))
        .route(&bounce_path, get(bounce::handler))
        .fallback(handlers::not_found_handler)
        .with_state(state)
}

pub async fn run(
    state: ServiceState,
    mut shutdown_rx: watch::Receiver<()>,
) -> Result<(), HttpServerError> {
    let listen_addr = state.config().listen_addr;
    let trace_layer = TraceLayer::new_for_http()
        .on_response(
            DefaultOnResponse::new()
                .include_headers(false)
                .level(tracing::Level::INFO)
                .latency_unit(LatencyUnit::Micros),
        )
        .on_failure(DefaultOnFailure::new().latency_unit(LatencyUnit::Micros));

    let app = router(state).layer(trace_layer);

    tracing::info!(addr = ?listen_addr, "HTTP server listening");
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = shutdown_rx.changed().await;
    })
    .await?;

    Ok(())
}

/// JSON error body shared by the API handlers
pub(crate) fn error_response(status: StatusCode, msg: impl std::fmt::Display) -> Response {
    let err_msg = serde_json::json!({ "msg": msg.to_string() });
    (status, Json(err_msg)).into_response()
}

/// The domain a request was addressed to, without any port
pub(crate) fn request_host(headers: &HeaderMap) -> String {
    let host = headers
        .get(axum::http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    match host.rsplit_once(':') {
        Some((name, port)) if !name.ends_with(']') && port.chars().all(|c| c.is_ascii_digit()) => {
            name.to_string()
        }
        _ => host.to_string(),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    #[error("an error occurred running the HTTP server: {0}")]
    ServingFailed(#[from] std::io::Error),
}
