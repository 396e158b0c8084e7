//! Plugin inventory, plugin update status and theme counts.

use std::collections::HashSet;

use super::{CollectContext, Collector};
use crate::error::CollectionError;
use crate::format::{MetricBlock, MetricKind};

pub struct PluginsCollector;

/// Plugin counts derived from the installed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PluginCounts {
    pub active: usize,
    pub inactive: usize,
    pub all: usize,
    pub updates_available: usize,
    pub up_to_date: usize,
}

impl PluginCounts {
    /// Active and update lists only count entries that are also installed.
    pub fn from_lists(installed: &[String], active: &[String], updates: &[String]) -> Self {
        let installed: HashSet<&str> = installed.iter().map(String::as_str).collect();
        let active: HashSet<&str> = active.iter().map(String::as_str).collect();
        let updates: HashSet<&str> = updates.iter().map(String::as_str).collect();

        let active_installed = installed.intersection(&active).count();
        let needing_update = installed.intersection(&updates).count();

        Self {
            active: active_installed,
            inactive: installed.len() - active_installed,
            all: installed.len(),
            updates_available: needing_update,
            up_to_date: installed.len() - needing_update,
        }
    }
}

impl Collector for PluginsCollector {
    fn name(&self) -> &'static str {
        "plugins"
    }

    fn collect(&self, ctx: &CollectContext<'_>) -> Result<MetricBlock, CollectionError> {
        let registry = &ctx.host.plugins;
        let host_err = |e| CollectionError::host(self.name(), e);

        let installed = registry.installed_plugins().map_err(host_err)?;
        let active = registry.active_plugins().unwrap_or_default();
        let updates = registry.plugins_with_updates().unwrap_or_default();
        let counts = PluginCounts::from_lists(&installed, &active, &updates);

        let mut block = MetricBlock::new();
        block
            .family(
                "wordpress_plugins_total",
                "Number of active and inactive plugins.",
                MetricKind::Counter,
            )
            .sample(&[("status", "active")], counts.active)
            .sample(&[("status", "inactive")], counts.inactive)
            .sample(&[("status", "all")], counts.all);

        block
            .family(
                "wordpress_plugins_update_total",
                "Plugin update status.",
                MetricKind::Counter,
            )
            .sample(&[("status", "available")], counts.updates_available)
            .sample(&[("status", "uptodate")], counts.up_to_date);

        let themes = registry.themes().unwrap_or_default();
        let child = themes.iter().filter(|t| t.is_child).count();
        block
            .family(
                "wordpress_themes_total",
                "Number of installed themes.",
                MetricKind::Counter,
            )
            .sample(&[("type", "child")], child)
            .sample(&[("type", "parent")], themes.len() - child);

        Ok(block)
    }
}
