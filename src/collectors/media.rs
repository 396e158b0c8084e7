//! Media library size, memoized in the transient store.

use tracing::debug;

use super::{CollectContext, Collector};
use crate::error::CollectionError;
use crate::format::{MetricBlock, MetricKind};

pub struct MediaCollector;

impl MediaCollector {
    fn memo_key(ctx: &CollectContext<'_>) -> String {
        format!("{}_media_count", ctx.settings.namespace)
    }

    fn count(&self, ctx: &CollectContext<'_>) -> Result<u64, CollectionError> {
        let key = Self::memo_key(ctx);
        if let Some(cached) = ctx.transient.get(&key).and_then(|v| v.parse::<u64>().ok()) {
            return Ok(cached);
        }

        let statuses = ctx
            .host
            .content
            .count_posts("attachment")
            .map_err(|e| CollectionError::host(self.name(), e))?;
        let mut count: u64 = statuses.iter().map(|(_, c)| *c).sum();
        if count == 0 {
            count = ctx.host.content.list_attachments().unwrap_or(0);
            debug!("Attachment status counts empty, listing gave {}", count);
        }

        ctx.transient
            .set(&key, count.to_string(), ctx.settings.media_count_ttl_secs);
        Ok(count)
    }
}

impl Collector for MediaCollector {
    fn name(&self) -> &'static str {
        "media"
    }

    fn collect(&self, ctx: &CollectContext<'_>) -> Result<MetricBlock, CollectionError> {
        let count = self.count(ctx)?;
        let mut block = MetricBlock::new();
        block
            .family(
                "wordpress_media_total",
                "Total number of media items.",
                MetricKind::Counter,
            )
            .sample(&[], count);
        Ok(block)
    }
}
