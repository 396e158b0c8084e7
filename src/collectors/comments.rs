//! Comment counts per moderation status.

use super::{CollectContext, Collector};
use crate::error::CollectionError;
use crate::format::{MetricBlock, MetricKind};

pub struct CommentsCollector;

/// Maps host status names to label values.
fn status_label(status: &str) -> &str {
    match status {
        "awaiting_moderation" => "moderated",
        "post-trashed" => "post_trashed",
        other => other,
    }
}

fn numeric(value: &serde_json::Value) -> Option<f64> {
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|n| n.is_finite())
}

impl Collector for CommentsCollector {
    fn name(&self) -> &'static str {
        "comments"
    }

    fn collect(&self, ctx: &CollectContext<'_>) -> Result<MetricBlock, CollectionError> {
        let counts = ctx
            .host
            .content
            .count_comments()
            .map_err(|e| CollectionError::host(self.name(), e))?;

        let mut block = MetricBlock::new();
        let family = block.family(
            "wordpress_comments_total",
            "Total number of comments by status.",
            MetricKind::Counter,
        );
        for (status, value) in &counts {
            if status == "total_comments" {
                continue;
            }
            let Some(count) = numeric(value) else {
                continue;
            };
            family.sample(&[("status", status_label(status))], count.trunc());
        }
        Ok(block)
    }
}
