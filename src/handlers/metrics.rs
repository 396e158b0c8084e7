//! Metrics endpoint handler for Prometheus scraping.
//!
//! The metrics endpoint is reachable through several URL shapes (query markers,
//! clean paths, a REST route), so the handler is installed as the router
//! fallback and leaves the decision to the dispatcher.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use tracing::{debug, error, instrument};

use crate::request::RequestView;
use crate::state::SharedState;

/// Handler for every URL; non-metrics requests get 404.
#[instrument(skip_all, fields(method = %request.method(), uri = %request.uri()))]
pub async fn metrics_handler(State(state): State<SharedState>, request: Request) -> Response {
    let (parts, _body) = request.into_parts();
    let remote = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let mut view = RequestView::new(parts.method, &parts.uri, parts.headers);
    if let Some(addr) = remote {
        view = view.with_remote_addr(addr);
    }

    // Collectors call into the host synchronously.
    let dispatcher = state.dispatcher.clone();
    let result = tokio::task::spawn_blocking(move || dispatcher.dispatch(&view)).await;

    match result {
        Ok(Some(response)) => {
            debug!("Answered metrics request with {}", response.status);
            response.into_response()
        }
        Ok(None) => (StatusCode::NOT_FOUND, "Not Found").into_response(),
        Err(e) => {
            error!("Metrics dispatch task failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to render metrics").into_response()
        }
    }
}
