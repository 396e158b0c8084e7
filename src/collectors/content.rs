//! Post and page counts.

use super::{CollectContext, Collector};
use crate::error::CollectionError;
use crate::format::{MetricBlock, MetricKind};

pub struct ContentCollector;

/// `(published, draft, all)`. Posts count every status the host returned in
/// `all`; pages only poll published and draft.
fn summarize(statuses: &[(String, u64)], every_status: bool) -> (u64, u64, u64) {
    let lookup = |name: &str| {
        statuses
            .iter()
            .find(|(s, _)| s == name)
            .map(|(_, c)| *c)
            .unwrap_or(0)
    };
    let (published, draft) = (lookup("publish"), lookup("draft"));
    let all = if every_status {
        statuses.iter().map(|(_, c)| *c).sum()
    } else {
        published.saturating_add(draft)
    };
    (published, draft, all)
}

impl Collector for ContentCollector {
    fn name(&self) -> &'static str {
        "content"
    }

    fn collect(&self, ctx: &CollectContext<'_>) -> Result<MetricBlock, CollectionError> {
        let mut block = MetricBlock::new();

        for (post_type, metric, help, every_status) in [
            ("post", "wordpress_posts_total", "Number of posts.", true),
            ("page", "wordpress_pages_total", "Number of pages.", false),
        ] {
            let statuses = ctx
                .host
                .content
                .count_posts(post_type)
                .map_err(|e| CollectionError::host(self.name(), e))?;
            let (published, draft, all) = summarize(&statuses, every_status);

            block
                .family(metric, help, MetricKind::Counter)
                .sample(&[("status", "published")], published)
                .sample(&[("status", "draft")], draft)
                .sample(&[("status", "all")], all);
        }

        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::test_support::Fixture;
    use crate::host::SiteSnapshot;
    use std::collections::BTreeMap;

    #[test]
    fn test_post_all_sums_every_status_page_all_sums_polled() {
        let mut snapshot = SiteSnapshot::default();
        let mut posts = BTreeMap::new();
        posts.insert("publish".to_string(), 10);
        posts.insert("draft".to_string(), 2);
        posts.insert("private".to_string(), 1);
        posts.insert("trash".to_string(), 3);
        snapshot.posts.insert("post".into(), posts);
        let mut pages = BTreeMap::new();
        pages.insert("publish".to_string(), 4);
        pages.insert("future".to_string(), 1);
        snapshot.posts.insert("page".into(), pages);

        let text = Fixture::new(snapshot).render(&ContentCollector);
        assert!(text.contains("wordpress_posts_total{wordpress_site=\"site\",status=\"published\"} 10\n"));
        assert!(text.contains("wordpress_posts_total{wordpress_site=\"site\",status=\"draft\"} 2\n"));
        assert!(text.contains("wordpress_posts_total{wordpress_site=\"site\",status=\"all\"} 16\n"));
        assert!(text.contains("wordpress_pages_total{wordpress_site=\"site\",status=\"draft\"} 0\n"));
        assert!(text.contains("wordpress_pages_total{wordpress_site=\"site\",status=\"all\"} 4\n"));
    }

    #[test]
    fn test_page_all_is_published_plus_draft() {
        let mut snapshot = SiteSnapshot::default();
        let mut pages = BTreeMap::new();
        pages.insert("publish".to_string(), 7);
        pages.insert("draft".to_string(), 3);
        pages.insert("private".to_string(), 2);
        pages.insert("trash".to_string(), 5);
        snapshot.posts.insert("page".into(), pages);

        let text = Fixture::new(snapshot).render(&ContentCollector);
        assert!(text.contains("wordpress_pages_total{wordpress_site=\"site\",status=\"all\"} 10\n"));
        assert!(text.contains("wordpress_posts_total{wordpress_site=\"site\",status=\"all\"} 0\n"));
    }
}
