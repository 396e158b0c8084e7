//! User counts per role.

use super::{CollectContext, Collector};
use crate::error::CollectionError;
use crate::format::{MetricBlock, MetricKind};

pub struct UsersCollector;

impl Collector for UsersCollector {
    fn name(&self) -> &'static str {
        "users"
    }

    fn collect(&self, ctx: &CollectContext<'_>) -> Result<MetricBlock, CollectionError> {
        let counts = ctx
            .host
            .users
            .count_users()
            .map_err(|e| CollectionError::host(self.name(), e))?;

        let mut block = MetricBlock::new();
        let family = block.family(
            "wordpress_users_total",
            "Number of users per role.",
            MetricKind::Counter,
        );
        for (role, count) in &counts.roles {
            family.sample(&[("role", role.as_str())], *count);
        }
        family.sample(&[("role", "total")], counts.total);
        Ok(block)
    }
}
