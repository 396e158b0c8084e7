//! Exporter self-telemetry.
//!
//! A small prometheus registry describing the exporter itself: how long a
//! scrape took, how requests were answered and how the cache tiers behaved.
//! It is appended after the site metrics when enabled.

use prometheus::{Encoder, Gauge, IntCounterVec, Opts, Registry, TextEncoder};
use std::time::Instant;
use tracing::error;

use crate::collectors::Tier;

/// How a metrics request was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Served,
    Unauthorized,
    RateLimited,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Served => "served",
            Outcome::Unauthorized => "unauthorized",
            Outcome::RateLimited => "rate_limited",
        }
    }
}

pub struct Telemetry {
    registry: Registry,
    scrape_duration: Gauge,
    requests_total: IntCounterVec,
    cache_lookups_total: IntCounterVec,
    uptime: Gauge,
    started: Instant,
}

impl Telemetry {
    /// Creates and registers all exporter metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let scrape_duration = Gauge::new(
            "slymetrics_exporter_scrape_duration_seconds",
            "Time spent building the last metrics response",
        )?;
        let requests_total = IntCounterVec::new(
            Opts::new(
                "slymetrics_exporter_requests_total",
                "Metrics requests by outcome",
            ),
            &["outcome"],
        )?;
        let cache_lookups_total = IntCounterVec::new(
            Opts::new(
                "slymetrics_exporter_cache_lookups_total",
                "Cache tier lookups by tier and result",
            ),
            &["tier", "result"],
        )?;

        let uptime = Gauge::new(
            "slymetrics_exporter_uptime_seconds",
            "Seconds since the exporter started",
        )?;

        registry.register(Box::new(scrape_duration.clone()))?;
        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(cache_lookups_total.clone()))?;
        registry.register(Box::new(uptime.clone()))?;

        Ok(Self {
            registry,
            scrape_duration,
            requests_total,
            cache_lookups_total,
            uptime,
            started: Instant::now(),
        })
    }

    /// Measures uptime from `started` instead of construction time.
    pub fn since(mut self, started: Instant) -> Self {
        self.started = started;
        self
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    pub fn observe_scrape(&self, seconds: f64) {
        self.scrape_duration.set(seconds);
    }

    pub fn record_request(&self, outcome: Outcome) {
        self.requests_total
            .with_label_values(&[outcome.as_str()])
            .inc();
    }

    pub fn record_cache_lookup(&self, tier: Tier, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        self.cache_lookups_total
            .with_label_values(&[tier.as_str(), result])
            .inc();
    }

    /// Current hit/miss count for a tier.
    pub fn cache_lookups(&self, tier: Tier, hit: bool) -> u64 {
        let result = if hit { "hit" } else { "miss" };
        self.cache_lookups_total
            .with_label_values(&[tier.as_str(), result])
            .get()
    }

    pub fn requests(&self, outcome: Outcome) -> u64 {
        self.requests_total
            .with_label_values(&[outcome.as_str()])
            .get()
    }

    /// Text exposition of every exporter metric.
    pub fn render(&self) -> String {
        self.uptime.set(self.uptime_seconds() as f64);
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&families, &mut buffer) {
            error!("Failed to encode exporter telemetry: {}", e);
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl std::fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telemetry").finish_non_exhaustive()
    }
}
