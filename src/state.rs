//! Application state management for the exporter.
//!
//! This module defines the shared application state handed to HTTP handlers and
//! the wiring that turns a [`Config`] into a ready dispatcher.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::auth::AuthGate;
use crate::cache::TieredCache;
use crate::clock::{Clock, SystemClock};
use crate::collectors::CollectorSettings;
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::host::{Host, SnapshotHost};
use crate::rate_limit::RateLimiter;
use crate::secrets::{SecretEnv, SecretStore};
use crate::store::{FileOptionStore, MemoryTransientStore, OptionStore, TransientStore};
use crate::telemetry::Telemetry;

/// Type alias for shared application state.
pub type SharedState = Arc<AppState>;

/// Global application state shared across requests.
pub struct AppState {
    pub config: Arc<Config>,
    pub dispatcher: Arc<Dispatcher>,
    pub secrets: Arc<SecretStore>,
    pub transient: Arc<dyn TransientStore>,
    pub telemetry: Option<Arc<Telemetry>>,
    /// Server start time, reported as exporter uptime.
    pub start_time: Instant,
}

impl AppState {
    /// Wires every component from explicit parts.
    pub fn new(
        config: Config,
        provider: Arc<SnapshotHost>,
        options: Arc<dyn OptionStore>,
        env: SecretEnv,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let start_time = Instant::now();
        let secrets = Arc::new(SecretStore::new(options, env)?);

        let transient: Arc<dyn TransientStore> = Arc::new(MemoryTransientStore::new(clock));
        let telemetry = if config.enable_telemetry.unwrap_or(true) {
            Some(Arc::new(Telemetry::new()?.since(start_time)))
        } else {
            None
        };

        let host = Host::from_provider(provider.clone());
        let mut cache = TieredCache::new(
            host,
            transient.clone(),
            CollectorSettings::from_config(&config),
            config.tier_ttls(),
        )
        .with_site_name(config.site_name.clone());

        let limiter = RateLimiter::new(
            transient.clone(),
            config.namespace(),
            config.rate_limit_settings(),
        );
        let gate = AuthGate::new(secrets.clone(), provider);

        if let Some(t) = &telemetry {
            cache = cache.with_telemetry(t.clone());
        }
        let mut dispatcher = Dispatcher::new(limiter, gate, cache).with_charset(config.charset());
        if let Some(t) = &telemetry {
            dispatcher = dispatcher.with_telemetry(t.clone());
        }
        debug!("Dispatcher ready (telemetry: {})", telemetry.is_some());

        Ok(Self {
            config: Arc::new(config),
            dispatcher: Arc::new(dispatcher),
            secrets,
            transient,
            telemetry,
            start_time,
        })
    }

    /// Opens the configured snapshot and options file and wires the exporter.
    pub fn from_config(config: Config, env: SecretEnv) -> Result<Self, Box<dyn std::error::Error>> {
        let provider = match &config.host_snapshot {
            Some(path) => Arc::new(SnapshotHost::open(path)?),
            None => {
                warn!("No host_snapshot configured; serving an empty site");
                Arc::new(SnapshotHost::empty())
            }
        };

        let options_path = config.options_path();
        let options = Arc::new(FileOptionStore::open(&options_path)?);
        info!("Using options file {}", options_path.display());

        Self::new(config, provider, options, env, Arc::new(SystemClock))
    }
}
