//! HTTP endpoint handlers for the exporter.
//!
//! Every request goes through [`metrics_handler`]: the dispatcher decides from
//! the URL whether it targets the metrics endpoint, and anything else is a 404.

pub mod metrics;

use axum::Router;

use crate::state::SharedState;

pub use metrics::metrics_handler;

/// Builds the application router.
pub fn router(state: SharedState) -> Router {
    Router::new().fallback(metrics_handler).with_state(state)
}
