//! Total database size.

use tracing::warn;

use super::autoload::column;
use super::{CollectContext, Collector};
use crate::error::CollectionError;
use crate::format::{MetricBlock, MetricKind};
use crate::host::{QueryKind, Statement};

pub struct DatabaseSizeCollector;

/// Database names must be non-empty and match `[a-zA-Z0-9_]`.
pub fn valid_database_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub fn size_statement(database: &str) -> Statement {
    Statement {
        kind: QueryKind::DatabaseSize,
        sql: "SELECT SUM(data_length + index_length) AS value \
              FROM information_schema.TABLES \
              WHERE table_schema = ? AND table_type = 'BASE TABLE'"
            .to_string(),
        params: vec![database.to_string()],
    }
}

impl Collector for DatabaseSizeCollector {
    fn name(&self) -> &'static str {
        "database_size"
    }

    fn collect(&self, ctx: &CollectContext<'_>) -> Result<MetricBlock, CollectionError> {
        let db = &ctx.host.database;
        let mut block = MetricBlock::new();

        let Some(name) = db.database_name().filter(|n| !n.is_empty()) else {
            warn!("Database name not available for size calculation");
            return Ok(block);
        };
        if !valid_database_name(&name) {
            return Err(CollectionError::InvalidInput {
                source_name: "database_size",
                value: name,
                reason: "database name contains invalid characters",
            });
        }

        let size = db
            .query_row(&size_statement(&name))
            .map_err(|e| CollectionError::host(self.name(), e))?
            .map(|row| column(&row, "value"))
            .unwrap_or(0.0);

        if size > 0.0 {
            block
                .family(
                    "wordpress_database_size_bytes",
                    "Database size in bytes.",
                    MetricKind::Gauge,
                )
                .sample(&[], size);
        }
        Ok(block)
    }
}
