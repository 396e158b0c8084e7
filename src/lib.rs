//! slymetrics: Prometheus exporter for WordPress site statistics.
//!
//! The exporter answers scrapes with Prometheus text exposition assembled from
//! three cache tiers, guarded by a per-client rate limiter and an authentication
//! gate. Site data comes from a host adapter; the bundled one reads a site
//! snapshot file.
//!
//! # Usage
//!
//! ```rust
//! use slymetrics::host::{SiteSnapshot, SnapshotHost};
//! use slymetrics::request::RequestView;
//! use slymetrics::secrets::{SecretEnv, SecretKind};
//! use slymetrics::state::AppState;
//! use slymetrics::store::MemoryOptionStore;
//! use slymetrics::clock::SystemClock;
//! use slymetrics::config::Config;
//! use std::sync::Arc;
//!
//! let host = Arc::new(SnapshotHost::from_snapshot(SiteSnapshot::sample()));
//! let state = AppState::new(
//!     Config::default(),
//!     host,
//!     Arc::new(MemoryOptionStore::new()),
//!     SecretEnv::default(),
//!     Arc::new(SystemClock),
//! )
//! .unwrap();
//! let token = state.secrets.regenerate(SecretKind::BearerToken).unwrap();
//!
//! let request = RequestView::get("/metrics")
//!     .with_header("authorization", &format!("Bearer {}", token));
//! let response = state.dispatcher.dispatch(&request).unwrap();
//! assert!(response.body.starts_with("# HELP"));
//! ```

pub mod auth;
pub mod cache;
pub mod clock;
pub mod collectors;
pub mod config;
pub mod crypto;
pub mod dispatch;
pub mod error;
pub mod format;
pub mod handlers;
pub mod host;
pub mod rate_limit;
pub mod request;
pub mod routes;
pub mod secrets;
pub mod state;
pub mod store;
pub mod telemetry;

// Re-export main types for convenience
pub use cache::{TierTtls, TieredCache};
pub use config::Config;
pub use dispatch::{Dispatcher, MetricsResponse};
pub use state::{AppState, SharedState};
