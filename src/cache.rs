//! Tiered metrics cache.
//!
//! Collectors are grouped by volatility. Each tier's rendered text lives in the
//! transient store under `<namespace>_<tier>_cache` with its own TTL, and a
//! response is the concatenation fast ‖ heavy ‖ static. A miss rebuilds only
//! that tier. There is no lock around a rebuild: concurrent misses may each
//! rebuild and the last write wins.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument};

use crate::collectors::{
    collectors_for, run_collectors, CollectContext, Collector, CollectorSettings, Tier,
};
use crate::host::Host;
use crate::store::TransientStore;
use crate::telemetry::Telemetry;

/// TTL in seconds per tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierTtls {
    pub fast: u64,
    pub heavy: u64,
    pub static_: u64,
}

impl Default for TierTtls {
    fn default() -> Self {
        Self {
            fast: 10,
            heavy: 300,
            static_: 3600,
        }
    }
}

impl TierTtls {
    pub fn ttl(&self, tier: Tier) -> u64 {
        match tier {
            Tier::Fast => self.fast,
            Tier::Heavy => self.heavy,
            Tier::Static => self.static_,
        }
    }
}

pub struct TieredCache {
    host: Host,
    transient: Arc<dyn TransientStore>,
    settings: CollectorSettings,
    ttls: TierTtls,
    site_name: Option<String>,
    tiers: Vec<(Tier, Vec<Box<dyn Collector>>)>,
    telemetry: Option<Arc<Telemetry>>,
}

impl TieredCache {
    pub fn new(
        host: Host,
        transient: Arc<dyn TransientStore>,
        settings: CollectorSettings,
        ttls: TierTtls,
    ) -> Self {
        Self {
            host,
            transient,
            settings,
            ttls,
            site_name: None,
            tiers: Tier::ALL.iter().map(|t| (*t, collectors_for(*t))).collect(),
            telemetry: None,
        }
    }

    /// Uses `name` as the site label instead of asking the host.
    pub fn with_site_name(mut self, name: Option<String>) -> Self {
        self.site_name = name.filter(|n| !n.is_empty());
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<Telemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Replaces the collectors of one tier.
    pub fn with_collectors(mut self, tier: Tier, collectors: Vec<Box<dyn Collector>>) -> Self {
        if let Some(slot) = self.tiers.iter_mut().find(|(t, _)| *t == tier) {
            slot.1 = collectors;
        }
        self
    }

    pub fn cache_key(&self, tier: Tier) -> String {
        format!("{}_{}_cache", self.settings.namespace, tier)
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn settings(&self) -> &CollectorSettings {
        &self.settings
    }

    fn site_name(&self) -> String {
        self.site_name
            .clone()
            .unwrap_or_else(|| self.host.site_name())
    }

    /// Full exposition text, rebuilding only expired tiers.
    #[instrument(skip(self))]
    pub fn get_metrics(&self) -> String {
        let mut out = String::new();
        for (tier, collectors) in &self.tiers {
            out.push_str(&self.tier_text(*tier, collectors));
        }
        out
    }

    fn tier_text(&self, tier: Tier, collectors: &[Box<dyn Collector>]) -> String {
        let key = self.cache_key(tier);
        if let Some(cached) = self.transient.get(&key) {
            self.record(tier, true);
            return cached;
        }
        self.record(tier, false);

        let started = Instant::now();
        let ctx = CollectContext {
            host: &self.host,
            transient: self.transient.as_ref(),
            settings: &self.settings,
        };
        let text = run_collectors(collectors, &ctx).render(&self.site_name());
        debug!(
            "Rebuilt {} tier in {:.3}s ({} bytes)",
            tier,
            started.elapsed().as_secs_f64(),
            text.len()
        );

        self.transient.set(&key, text.clone(), self.ttls.ttl(tier));
        text
    }

    fn record(&self, tier: Tier, hit: bool) {
        if let Some(telemetry) = &self.telemetry {
            telemetry.record_cache_lookup(tier, hit);
        }
    }

    /// Drops every cached tier so the next request rebuilds all of them.
    pub fn invalidate(&self) {
        for tier in Tier::ALL {
            self.transient.delete(&self.cache_key(tier));
        }
    }
}

impl std::fmt::Debug for TieredCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredCache")
            .field("namespace", &self.settings.namespace)
            .field("ttls", &self.ttls)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::CollectionError;
    use crate::format::{MetricBlock, MetricKind};
    use crate::host::{SiteSnapshot, SnapshotHost};
    use crate::store::MemoryTransientStore;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Emits how many times it has been called.
    struct Counting {
        metric: &'static str,
        calls: Arc<AtomicU64>,
    }

    impl Collector for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn collect(&self, _ctx: &CollectContext<'_>) -> Result<MetricBlock, CollectionError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let mut block = MetricBlock::new();
            block.family(self.metric, "Calls.", MetricKind::Counter).sample(&[], n);
            Ok(block)
        }
    }

    fn counting(metric: &'static str, calls: &Arc<AtomicU64>) -> Vec<Box<dyn Collector>> {
        vec![Box::new(Counting {
            metric,
            calls: calls.clone(),
        })]
    }

    fn setup() -> (TieredCache, Arc<ManualClock>, [Arc<AtomicU64>; 3]) {
        let clock = Arc::new(ManualClock::new(10_000));
        let transient = Arc::new(MemoryTransientStore::new(clock.clone()));
        let host = Host::from_provider(Arc::new(SnapshotHost::from_snapshot(SiteSnapshot::default())));
        let calls = [
            Arc::new(AtomicU64::new(0)),
            Arc::new(AtomicU64::new(0)),
            Arc::new(AtomicU64::new(0)),
        ];
        let cache = TieredCache::new(host, transient, CollectorSettings::default(), TierTtls::default())
            .with_site_name(Some("test".into()))
            .with_collectors(Tier::Fast, counting("fast_calls", &calls[0]))
            .with_collectors(Tier::Heavy, counting("heavy_calls", &calls[1]))
            .with_collectors(Tier::Static, counting("static_calls", &calls[2]));
        (cache, clock, calls)
    }

    #[test]
    fn test_fast_tier_is_idempotent_within_ttl() {
        let (cache, clock, calls) = setup();
        let first = cache.get_metrics();
        clock.advance(9);
        let second = cache.get_metrics();
        assert_eq!(first, second);
        assert_eq!(calls[0].load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_each_tier_expires_independently() {
        let (cache, clock, calls) = setup();
        cache.get_metrics();

        clock.advance(10);
        let text = cache.get_metrics();
        assert!(text.contains("fast_calls{wordpress_site=\"test\"} 2\n"));
        assert!(text.contains("heavy_calls{wordpress_site=\"test\"} 1\n"));

        clock.advance(290);
        cache.get_metrics();
        assert_eq!(calls[1].load(Ordering::SeqCst), 2);
        assert_eq!(calls[2].load(Ordering::SeqCst), 1);

        clock.advance(3300);
        cache.get_metrics();
        assert_eq!(calls[2].load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_tiers_concatenate_in_order() {
        let (cache, _clock, _calls) = setup();
        let text = cache.get_metrics();
        let fast = text.find("fast_calls").unwrap();
        let heavy = text.find("heavy_calls").unwrap();
        let static_ = text.find("static_calls").unwrap();
        assert!(fast < heavy && heavy < static_);
    }

    #[test]
    fn test_invalidate_forces_rebuild() {
        let (cache, _clock, calls) = setup();
        cache.get_metrics();
        cache.invalidate();
        cache.get_metrics();
        for c in &calls {
            assert_eq!(c.load(Ordering::SeqCst), 2);
        }
    }

    #[test]
    fn test_cache_keys_use_namespace() {
        let (cache, _clock, _calls) = setup();
        assert_eq!(cache.cache_key(Tier::Fast), "slymetrics_fast_cache");
        assert_eq!(cache.cache_key(Tier::Static), "slymetrics_static_cache");
    }

    #[test]
    fn test_telemetry_counts_hits_and_misses() {
        let (cache, _clock, _calls) = setup();
        let telemetry = Arc::new(Telemetry::new().unwrap());
        let cache = cache.with_telemetry(telemetry.clone());
        cache.get_metrics();
        cache.get_metrics();
        assert_eq!(telemetry.cache_lookups(Tier::Heavy, false), 1);
        assert_eq!(telemetry.cache_lookups(Tier::Heavy, true), 1);
    }
}
