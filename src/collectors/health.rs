//! Site health checks.
//!
//! When the host runs its own health test suite and it yields results, those
//! are reported. Otherwise a fixed battery of checks is evaluated against the
//! host's configuration. Either way every test ends up as one
//! [`HealthCheck`] with a normalized status and category, and the rollup
//! counters are derived from that same list.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::runtime::convert_to_bytes;
use super::{CollectContext, Collector};
use crate::error::CollectionError;
use crate::format::{MetricBlock, MetricKind};
use crate::host::{NativeTestResult, RuntimeVersion};

const SECURITY_KEYWORDS: [&str; 7] = [
    "https",
    "ssl",
    "security",
    "file_edit",
    "debug",
    "update",
    "version",
];
const PERFORMANCE_KEYWORDS: [&str; 5] = ["php", "memory", "database", "performance", "cache"];
const MAX_DESCRIPTION_CHARS: usize = 120;

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("static regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Good,
    Recommended,
    Critical,
}

impl HealthStatus {
    /// Unknown statuses count as `Recommended`.
    pub fn normalize(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "good" => HealthStatus::Good,
            "critical" => HealthStatus::Critical,
            _ => HealthStatus::Recommended,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Good => "good",
            HealthStatus::Recommended => "recommended",
            HealthStatus::Critical => "critical",
        }
    }

    /// Sample value of the detail metric.
    pub fn value(&self) -> i64 {
        match self {
            HealthStatus::Good => 1,
            HealthStatus::Recommended => 0,
            HealthStatus::Critical => -1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheck {
    pub test: String,
    pub status: HealthStatus,
    pub category: &'static str,
    pub description: String,
}

/// Security keywords win over performance keywords.
pub fn categorize(test: &str, badge: Option<&str>) -> &'static str {
    let haystack = format!("{} {}", test, badge.unwrap_or_default()).to_ascii_lowercase();
    if SECURITY_KEYWORDS.iter().any(|k| haystack.contains(k)) {
        "security"
    } else if PERFORMANCE_KEYWORDS.iter().any(|k| haystack.contains(k)) {
        "performance"
    } else {
        "general"
    }
}

/// Strips markup, collapses whitespace and caps the length.
pub fn clean_description(raw: &str) -> String {
    let text = HTML_TAG.replace_all(raw, " ");
    let text = WHITESPACE.replace_all(text.trim(), " ");
    text.chars().take(MAX_DESCRIPTION_CHARS).collect()
}

fn from_native(result: &NativeTestResult) -> HealthCheck {
    let description = if result.description.trim().is_empty() {
        &result.label
    } else {
        &result.description
    };
    HealthCheck {
        test: result.test.clone(),
        status: HealthStatus::normalize(&result.status),
        category: categorize(&result.test, result.badge.as_deref()),
        description: clean_description(description),
    }
}

fn check(
    test: &str,
    status: HealthStatus,
    category: &'static str,
    description: String,
) -> HealthCheck {
    HealthCheck {
        test: test.to_string(),
        status,
        category,
        description,
    }
}

/// Fixed battery evaluated against host configuration.
pub fn builtin_checks(ctx: &CollectContext<'_>) -> Vec<HealthCheck> {
    use HealthStatus::*;

    let host = ctx.host;
    let settings = ctx.settings;
    let mut checks = Vec::with_capacity(7);

    checks.push(if host.site.file_edit_disallowed().unwrap_or(false) {
        check("file_editing", Good, "security", "File editing is properly disabled".into())
    } else {
        check(
            "file_editing",
            Recommended,
            "security",
            "File editing (DISALLOW_FILE_EDIT) should be disabled in production environments"
                .into(),
        )
    });

    checks.push(if host.site.debug_enabled().unwrap_or(false) {
        check(
            "debug_mode",
            Recommended,
            "security",
            "Debug mode (WP_DEBUG) should be disabled in production".into(),
        )
    } else {
        check("debug_mode", Good, "security", "Debug mode is properly disabled".into())
    });

    let updates = host.plugins.plugins_with_updates().unwrap_or_default().len();
    checks.push(if updates > 0 {
        check(
            "plugin_updates",
            Recommended,
            "security",
            format!("{} plugin updates available", updates),
        )
    } else {
        check("plugin_updates", Good, "security", "All plugins are up to date".into())
    });

    let version = RuntimeVersion::parse(&host.runtime.runtime_version().unwrap_or_default());
    checks.push(if version.is_older_than(&settings.php_version_critical) {
        check(
            "php_version",
            Critical,
            "performance",
            format!("PHP version {} is outdated and unsupported", version.version),
        )
    } else if version.is_older_than(&settings.php_version_recommended) {
        check(
            "php_version",
            Recommended,
            "performance",
            format!(
                "PHP version {} should be updated to {}+",
                version.version, settings.php_version_recommended
            ),
        )
    } else {
        check(
            "php_version",
            Good,
            "performance",
            format!("PHP version {} is current", version.version),
        )
    });

    let memory_limit = host.runtime.ini_get("memory_limit").unwrap_or_default();
    let memory_bytes = convert_to_bytes(&memory_limit);
    // A negative limit means unlimited.
    checks.push(if memory_bytes >= 0.0 && memory_bytes < settings.memory_limit_critical_bytes {
        check(
            "php_memory_limit",
            Critical,
            "performance",
            format!("Memory limit {} is too low", memory_limit),
        )
    } else if memory_bytes >= 0.0 && memory_bytes < settings.memory_limit_recommended_bytes {
        check(
            "php_memory_limit",
            Recommended,
            "performance",
            format!("Memory limit {} could be increased", memory_limit),
        )
    } else {
        check(
            "php_memory_limit",
            Good,
            "performance",
            format!("Memory limit {} is adequate", memory_limit),
        )
    });

    checks.push(match host.database.last_error() {
        Some(_) => check(
            "database_connection",
            Critical,
            "general",
            "Database connection has errors".into(),
        ),
        None => check(
            "database_connection",
            Good,
            "general",
            "Database connection is working properly".into(),
        ),
    });

    checks.push(if host.site.is_ssl().unwrap_or(false) {
        check("https_status", Good, "security", "Site is using HTTPS".into())
    } else {
        check(
            "https_status",
            Recommended,
            "security",
            "Site should use HTTPS for better security".into(),
        )
    });

    checks
}

/// Rollup counters over a list of checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthSummary {
    pub good: u64,
    pub recommended: u64,
    pub critical: u64,
    /// Non-good checks in the security category.
    pub security: u64,
    /// Non-good checks in the performance category.
    pub performance: u64,
}

impl HealthSummary {
    pub fn from_checks(checks: &[HealthCheck]) -> Self {
        let mut summary = Self::default();
        for c in checks {
            match c.status {
                HealthStatus::Good => summary.good += 1,
                HealthStatus::Recommended => summary.recommended += 1,
                HealthStatus::Critical => summary.critical += 1,
            }
            if c.status != HealthStatus::Good {
                match c.category {
                    "security" => summary.security += 1,
                    "performance" => summary.performance += 1,
                    _ => {}
                }
            }
        }
        summary
    }

    pub fn total_failed(&self) -> u64 {
        self.critical + self.recommended
    }
}

pub struct HealthCollector;

impl HealthCollector {
    fn checks(&self, ctx: &CollectContext<'_>) -> Vec<HealthCheck> {
        match ctx.host.health.run_native_tests() {
            Ok(results) if !results.is_empty() => {
                debug!("Using {} native health test results", results.len());
                results.iter().map(from_native).collect()
            }
            Ok(_) => builtin_checks(ctx),
            Err(e) => {
                debug!("Native health tests unavailable ({}), using built-in checks", e);
                builtin_checks(ctx)
            }
        }
    }
}

impl Collector for HealthCollector {
    fn name(&self) -> &'static str {
        "health"
    }

    fn collect(&self, ctx: &CollectContext<'_>) -> Result<MetricBlock, CollectionError> {
        let checks = self.checks(ctx);
        let summary = HealthSummary::from_checks(&checks);

        let mut block = MetricBlock::new();
        block
            .family(
                "wordpress_health_check_total",
                "Site health check results.",
                MetricKind::Gauge,
            )
            .sample(&[("category", "good")], summary.good)
            .sample(&[("category", "recommended")], summary.recommended)
            .sample(&[("category", "critical")], summary.critical)
            .sample(&[("category", "security")], summary.security)
            .sample(&[("category", "performance")], summary.performance)
            .sample(&[("category", "total_failed")], summary.total_failed());

        let details = block.family(
            "wordpress_health_check_detail_info",
            "Individual health check test results.",
            MetricKind::Gauge,
        );
        for c in &checks {
            details.sample(
                &[
                    ("test_name", c.test.as_str()),
                    ("status", c.status.as_str()),
                    ("category", c.category),
                    ("description", c.description.as_str()),
                ],
                c.status.value(),
            );
        }
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::test_support::Fixture;
    use crate::host::SiteSnapshot;

    fn status_of<'a>(checks: &'a [HealthCheck], test: &str) -> &'a HealthCheck {
        checks.iter().find(|c| c.test == test).unwrap()
    }

    #[test]
    fn test_categorize_precedence() {
        assert_eq!(categorize("https_status", None), "security");
        // "php_version" matches both lists; security wins.
        assert_eq!(categorize("php_version", None), "security");
        assert_eq!(categorize("php_extensions", None), "performance");
        assert_eq!(categorize("persistent_object_cache", None), "performance");
        assert_eq!(categorize("timezone_not_utc", None), "general");
        assert_eq!(categorize("loopback_requests", Some("Security")), "security");
    }

    #[test]
    fn test_normalize_status() {
        assert_eq!(HealthStatus::normalize("good"), HealthStatus::Good);
        assert_eq!(HealthStatus::normalize(" Critical "), HealthStatus::Critical);
        assert_eq!(HealthStatus::normalize("bogus"), HealthStatus::Recommended);
    }

    #[test]
    fn test_clean_description() {
        assert_eq!(
            clean_description("<p>Your site is <strong>fine</strong>.</p>"),
            "Your site is fine ."
        );
        assert_eq!(clean_description(&"a".repeat(300)).len(), 120);
    }

    #[test]
    fn test_builtin_battery_on_sample_site() {
        let fixture = Fixture::new(SiteSnapshot::sample());
        let checks = builtin_checks(&fixture.ctx());
        assert_eq!(checks.len(), 7);
        assert_eq!(status_of(&checks, "file_editing").status, HealthStatus::Good);
        assert_eq!(status_of(&checks, "plugin_updates").status, HealthStatus::Recommended);
        assert_eq!(status_of(&checks, "php_version").status, HealthStatus::Good);
        assert_eq!(status_of(&checks, "php_memory_limit").status, HealthStatus::Good);
        assert_eq!(status_of(&checks, "database_connection").category, "general");
    }

    #[test]
    fn test_builtin_thresholds() {
        let mut snapshot = SiteSnapshot::default();
        snapshot.runtime.version = "7.3.33".into();
        snapshot.runtime.ini.insert("memory_limit".into(), "192M".into());
        snapshot.database.last_error = Some("Lost connection".into());
        let fixture = Fixture::new(snapshot);
        let checks = builtin_checks(&fixture.ctx());

        assert_eq!(status_of(&checks, "php_version").status, HealthStatus::Critical);
        assert_eq!(status_of(&checks, "php_memory_limit").status, HealthStatus::Recommended);
        assert_eq!(status_of(&checks, "database_connection").status, HealthStatus::Critical);
        assert_eq!(status_of(&checks, "https_status").status, HealthStatus::Recommended);
    }

    #[test]
    fn test_summary_counts_only_failed_by_category() {
        let checks = vec![
            check("a", HealthStatus::Good, "security", String::new()),
            check("b", HealthStatus::Recommended, "security", String::new()),
            check("c", HealthStatus::Critical, "performance", String::new()),
            check("d", HealthStatus::Critical, "general", String::new()),
        ];
        let summary = HealthSummary::from_checks(&checks);
        assert_eq!(summary.good, 1);
        assert_eq!(summary.recommended, 1);
        assert_eq!(summary.critical, 2);
        assert_eq!(summary.security, 1);
        assert_eq!(summary.performance, 1);
        assert_eq!(summary.total_failed(), 3);
    }

    #[test]
    fn test_native_results_preferred() {
        let mut snapshot = SiteSnapshot::sample();
        snapshot.health_tests = Some(vec![
            NativeTestResult {
                test: "https_status".into(),
                label: "HTTPS".into(),
                status: "good".into(),
                badge: None,
                description: "<p>Using HTTPS</p>".into(),
            },
            NativeTestResult {
                test: "rest_availability".into(),
                label: "The REST API is not available".into(),
                status: "critical".into(),
                badge: None,
                description: String::new(),
            },
        ]);

        let text = Fixture::new(snapshot).render(&HealthCollector);
        assert!(text.contains("category=\"good\"} 1\n"));
        assert!(text.contains("category=\"critical\"} 1\n"));
        assert!(text.contains("category=\"total_failed\"} 1\n"));
        assert!(text.contains(
            "test_name=\"rest_availability\",status=\"critical\",category=\"general\",description=\"The REST API is not available\"} -1\n"
        ));
        assert!(!text.contains("file_editing"));
    }

    #[test]
    fn test_empty_native_results_fall_back() {
        let mut snapshot = SiteSnapshot::sample();
        snapshot.health_tests = Some(Vec::new());
        let text = Fixture::new(snapshot).render(&HealthCollector);
        assert!(text.contains("test_name=\"file_editing\""));
    }
}
