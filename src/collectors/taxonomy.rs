//! Category and tag counts.

use super::{CollectContext, Collector};
use crate::error::CollectionError;
use crate::format::{MetricBlock, MetricKind};

pub struct TaxonomyCollector;

impl Collector for TaxonomyCollector {
    fn name(&self) -> &'static str {
        "taxonomy"
    }

    fn collect(&self, ctx: &CollectContext<'_>) -> Result<MetricBlock, CollectionError> {
        let mut block = MetricBlock::new();
        for (taxonomy, metric, help) in [
            ("category", "wordpress_categories_total", "Total number of categories."),
            ("post_tag", "wordpress_tags_total", "Total number of tags."),
        ] {
            let count = ctx
                .host
                .content
                .count_terms(taxonomy)
                .map_err(|e| CollectionError::host(self.name(), e))?;
            block.family(metric, help, MetricKind::Counter).sample(&[], count);
        }
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::test_support::Fixture;
    use crate::host::SiteSnapshot;

    #[test]
    fn test_category_and_tag_counts() {
        let mut snapshot = SiteSnapshot::default();
        snapshot.terms.insert("category".into(), 4);
        snapshot.terms.insert("post_tag".into(), 19);

        let text = Fixture::new(snapshot).render(&TaxonomyCollector);
        assert!(text.contains("wordpress_categories_total{wordpress_site=\"site\"} 4\n"));
        assert!(text.contains("wordpress_tags_total{wordpress_site=\"site\"} 19\n"));
    }
}
