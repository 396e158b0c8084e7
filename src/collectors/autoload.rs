//! Autoloaded option statistics from the options table.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use super::{CollectContext, Collector};
use crate::error::CollectionError;
use crate::format::{MetricBlock, MetricKind};
use crate::host::{QueryKind, Row, Statement};

static TABLE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_]+$").expect("static regex"));

pub struct AutoloadCollector;

/// Builds the summary statement, or fails if the table name is unsafe to embed.
pub fn autoload_statement(options_table: &str, prefix: &str) -> Result<Statement, CollectionError> {
    let unprefixed = options_table.replace(prefix, "");
    if !TABLE_NAME.is_match(&unprefixed) || !TABLE_NAME.is_match(options_table) {
        return Err(CollectionError::InvalidInput {
            source_name: "autoload",
            value: options_table.to_string(),
            reason: "options table name contains invalid characters",
        });
    }

    Ok(Statement {
        kind: QueryKind::AutoloadSummary,
        sql: format!(
            "SELECT COUNT(*) AS total_count, \
             ROUND(SUM(LENGTH(option_value)) / 1024) AS size_kb, \
             SUM(CASE WHEN option_name LIKE ? THEN 1 ELSE 0 END) AS transient_count \
             FROM {} WHERE autoload = ?",
            options_table
        ),
        params: vec!["%transient%".to_string(), "yes".to_string()],
    })
}

/// Non-negative integer column, 0 when absent or not numeric.
pub(crate) fn column(row: &Row, name: &str) -> f64 {
    let value = match row.get(name) {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    value.filter(|v| v.is_finite()).unwrap_or(0.0).max(0.0)
}

impl Collector for AutoloadCollector {
    fn name(&self) -> &'static str {
        "autoload"
    }

    fn collect(&self, ctx: &CollectContext<'_>) -> Result<MetricBlock, CollectionError> {
        let db = &ctx.host.database;
        let mut block = MetricBlock::new();

        let Some(table) = db.options_table().filter(|t| !t.is_empty()) else {
            warn!("Options table not available for autoload calculation");
            return Ok(block);
        };
        let statement = autoload_statement(&table, &db.table_prefix())?;

        let Some(row) = db
            .query_row(&statement)
            .map_err(|e| CollectionError::host(self.name(), e))?
        else {
            return Ok(block);
        };

        let size_kb = column(&row, "size_kb").trunc();
        block
            .family(
                "wordpress_autoload_options_total",
                "Number of autoloaded options.",
                MetricKind::Gauge,
            )
            .sample(&[], column(&row, "total_count").trunc());
        block
            .family(
                "wordpress_autoload_size_bytes",
                "Size of autoloaded options in bytes.",
                MetricKind::Gauge,
            )
            .sample(&[], size_kb * 1024.0);
        block
            .family(
                "wordpress_autoload_transients_total",
                "Number of autoloaded transients.",
                MetricKind::Gauge,
            )
            .sample(&[], column(&row, "transient_count").trunc());
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::test_support::Fixture;
    use crate::host::SiteSnapshot;

    #[test]
    fn test_autoload_metrics() {
        let text = Fixture::new(SiteSnapshot::sample()).render(&AutoloadCollector);
        assert!(text.contains("wordpress_autoload_options_total{wordpress_site=\"site\"} 310\n"));
        assert!(text.contains("wordpress_autoload_size_bytes{wordpress_site=\"site\"} 870400\n"));
        assert!(text.contains("wordpress_autoload_transients_total{wordpress_site=\"site\"} 12\n"));
    }

    #[test]
    fn test_statement_is_parameterized() {
        let statement = autoload_statement("wp_options", "wp_").unwrap();
        assert!(statement.sql.contains("FROM wp_options"));
        assert_eq!(statement.params, vec!["%transient%", "yes"]);
    }

    #[test]
    fn test_rejects_suspicious_table_name() {
        assert!(autoload_statement("wp_options; DROP TABLE x", "wp_").is_err());

        let mut snapshot = SiteSnapshot::sample();
        snapshot.database.options_table = Some("wp_opt-ions".into());
        let fixture = Fixture::new(snapshot);
        assert!(matches!(
            AutoloadCollector.collect(&fixture.ctx()),
            Err(CollectionError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_rejects_unsafe_prefix_in_table_name() {
        // The unprefixed part alone is clean, the full name is not.
        assert!(autoload_statement("wp;x_options", "wp;x_").is_err());
        assert!(autoload_statement("my-site_options", "my-site_").is_err());
        assert!(autoload_statement("site1_options", "site1_").is_ok());
    }

    #[test]
    fn test_missing_options_table_emits_nothing() {
        let text = Fixture::new(SiteSnapshot::default()).render(&AutoloadCollector);
        assert!(text.is_empty());
    }
}
