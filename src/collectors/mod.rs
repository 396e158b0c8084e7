//! Site data collectors.
//!
//! Every collector reads from the host interfaces and produces one
//! [`MetricBlock`]. Collectors are grouped into three tiers by how often their
//! data changes; the cache manager rebuilds each tier independently.

pub mod autoload;
pub mod comments;
pub mod content;
pub mod database;
pub mod directories;
pub mod health;
pub mod media;
pub mod plugins;
pub mod runtime;
pub mod taxonomy;
pub mod users;

use std::path::PathBuf;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::CollectionError;
use crate::format::MetricBlock;
use crate::host::Host;
use crate::store::TransientStore;

/// Volatility class of a group of collectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Fast,
    Heavy,
    Static,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Fast, Tier::Heavy, Tier::Static];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Fast => "fast",
            Tier::Heavy => "heavy",
            Tier::Static => "static",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tunables shared by all collectors.
#[derive(Debug, Clone)]
pub struct CollectorSettings {
    /// Prefix of every transient store key.
    pub namespace: String,
    pub media_count_ttl_secs: u64,
    pub php_version_critical: String,
    pub php_version_recommended: String,
    pub memory_limit_critical_bytes: f64,
    pub memory_limit_recommended_bytes: f64,
    /// Overrides for the directory layout reported by the host.
    pub uploads_dir: Option<PathBuf>,
    pub themes_dir: Option<PathBuf>,
    pub plugins_dir: Option<PathBuf>,
    pub verbose_errors: bool,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            namespace: "slymetrics".to_string(),
            media_count_ttl_secs: 300,
            php_version_critical: "7.4".to_string(),
            php_version_recommended: "8.0".to_string(),
            memory_limit_critical_bytes: 128.0 * 1024.0 * 1024.0,
            memory_limit_recommended_bytes: 256.0 * 1024.0 * 1024.0,
            uploads_dir: None,
            themes_dir: None,
            plugins_dir: None,
            verbose_errors: false,
        }
    }
}

impl CollectorSettings {
    pub fn from_config(cfg: &Config) -> Self {
        let defaults = Self::default();
        Self {
            namespace: cfg.cache_namespace.clone().unwrap_or(defaults.namespace),
            media_count_ttl_secs: cfg
                .media_count_ttl_secs
                .unwrap_or(defaults.media_count_ttl_secs),
            php_version_critical: cfg
                .php_version_critical
                .clone()
                .unwrap_or(defaults.php_version_critical),
            php_version_recommended: cfg
                .php_version_recommended
                .clone()
                .unwrap_or(defaults.php_version_recommended),
            memory_limit_critical_bytes: cfg
                .memory_limit_critical_bytes
                .map(|b| b as f64)
                .unwrap_or(defaults.memory_limit_critical_bytes),
            memory_limit_recommended_bytes: cfg
                .memory_limit_recommended_bytes
                .map(|b| b as f64)
                .unwrap_or(defaults.memory_limit_recommended_bytes),
            uploads_dir: cfg.uploads_dir.clone(),
            themes_dir: cfg.themes_dir.clone(),
            plugins_dir: cfg.plugins_dir.clone(),
            verbose_errors: cfg.verbose_errors.unwrap_or(false),
        }
    }
}

/// What a collector gets to work with during one rebuild.
pub struct CollectContext<'a> {
    pub host: &'a Host,
    pub transient: &'a dyn TransientStore,
    pub settings: &'a CollectorSettings,
}

pub trait Collector: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;
    fn collect(&self, ctx: &CollectContext<'_>) -> Result<MetricBlock, CollectionError>;
}

/// Collectors of one tier, in output order.
pub fn collectors_for(tier: Tier) -> Vec<Box<dyn Collector>> {
    match tier {
        Tier::Fast => vec![
            Box::new(users::UsersCollector),
            Box::new(content::ContentCollector),
            Box::new(plugins::PluginsCollector),
            Box::new(comments::CommentsCollector),
            Box::new(taxonomy::TaxonomyCollector),
            Box::new(media::MediaCollector),
        ],
        Tier::Heavy => vec![
            Box::new(autoload::AutoloadCollector),
            Box::new(database::DatabaseSizeCollector),
            Box::new(directories::DirectoriesCollector),
            Box::new(health::HealthCollector),
        ],
        Tier::Static => vec![Box::new(runtime::RuntimeCollector)],
    }
}

/// Runs every collector and merges their output. A failing collector is logged
/// and contributes nothing.
pub fn run_collectors(collectors: &[Box<dyn Collector>], ctx: &CollectContext<'_>) -> MetricBlock {
    let mut block = MetricBlock::new();
    for collector in collectors {
        match collector.collect(ctx) {
            Ok(part) => {
                debug!(
                    "Collector {} produced {} samples",
                    collector.name(),
                    part.sample_count()
                );
                block.extend(part);
            }
            Err(e) => report_failure(ctx.settings, collector.name(), &e),
        }
    }
    block
}

fn report_failure(settings: &CollectorSettings, name: &str, error: &CollectionError) {
    if settings.verbose_errors {
        warn!("Collector {} failed: {}", name, error);
    } else {
        debug!("Collector {} failed: {}", name, error);
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use super::*;
    use crate::clock::ManualClock;
    use crate::host::{SiteSnapshot, SnapshotHost};
    use crate::store::MemoryTransientStore;

    pub struct Fixture {
        pub host: Host,
        pub transient: MemoryTransientStore,
        pub settings: CollectorSettings,
    }

    impl Fixture {
        pub fn new(snapshot: SiteSnapshot) -> Self {
            Self {
                host: Host::from_provider(Arc::new(SnapshotHost::from_snapshot(snapshot))),
                transient: MemoryTransientStore::new(Arc::new(ManualClock::new(1_000))),
                settings: CollectorSettings::default(),
            }
        }

        pub fn ctx(&self) -> CollectContext<'_> {
            CollectContext {
                host: &self.host,
                transient: &self.transient,
                settings: &self.settings,
            }
        }

        pub fn render(&self, collector: &dyn Collector) -> String {
            collector
                .collect(&self.ctx())
                .expect("collector should succeed")
                .render("site")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::Fixture;
    use super::*;
    use crate::error::HostError;
    use crate::format::MetricKind;

    struct Failing;

    impl Collector for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn collect(&self, _ctx: &CollectContext<'_>) -> Result<MetricBlock, CollectionError> {
            Err(CollectionError::host("failing", HostError::Query("boom".into())))
        }
    }

    struct Fixed;

    impl Collector for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn collect(&self, _ctx: &CollectContext<'_>) -> Result<MetricBlock, CollectionError> {
            let mut block = MetricBlock::new();
            block.family("fixed_total", "Fixed.", MetricKind::Gauge).sample(&[], 7);
            Ok(block)
        }
    }

    #[test]
    fn test_failing_collector_is_omitted() {
        let fixture = Fixture::new(Default::default());
        let collectors: Vec<Box<dyn Collector>> = vec![Box::new(Failing), Box::new(Fixed)];
        let block = run_collectors(&collectors, &fixture.ctx());
        assert_eq!(block.families().len(), 1);
        assert_eq!(block.families()[0].name(), "fixed_total");
    }

    #[test]
    fn test_every_tier_has_collectors() {
        for tier in Tier::ALL {
            assert!(!collectors_for(tier).is_empty(), "tier {} is empty", tier);
        }
    }
}
