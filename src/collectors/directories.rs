//! On-disk size of the uploads, themes and plugins directories.

use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use super::{CollectContext, Collector};
use crate::error::CollectionError;
use crate::format::{MetricBlock, MetricKind};

pub struct DirectoriesCollector;

/// Sum of regular file sizes below `dir`. Unreadable entries are skipped.
pub fn directory_size(dir: &Path) -> u64 {
    let mut total = 0u64;
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping unreadable entry under {}: {}", dir.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(meta) = entry.metadata() {
            total = total.saturating_add(meta.len());
        }
    }
    total
}

impl DirectoriesCollector {
    fn targets(ctx: &CollectContext<'_>) -> [(&'static str, Option<PathBuf>); 3] {
        let layout = &ctx.host.layout;
        let settings = ctx.settings;
        [
            ("uploads", settings.uploads_dir.clone().or_else(|| layout.uploads_dir())),
            ("themes", settings.themes_dir.clone().or_else(|| layout.themes_dir())),
            ("plugins", settings.plugins_dir.clone().or_else(|| layout.plugins_dir())),
        ]
    }
}

impl Collector for DirectoriesCollector {
    fn name(&self) -> &'static str {
        "directories"
    }

    fn collect(&self, ctx: &CollectContext<'_>) -> Result<MetricBlock, CollectionError> {
        let mut sizes = Vec::new();
        for (label, path) in Self::targets(ctx) {
            match path {
                Some(path) if path.is_dir() => sizes.push((label, directory_size(&path))),
                Some(path) => debug!("Directory {} ({}) does not exist", label, path.display()),
                None => {}
            }
        }

        let mut block = MetricBlock::new();
        if sizes.is_empty() {
            return Ok(block);
        }

        let total: u64 = sizes.iter().map(|(_, s)| *s).sum();
        let family = block.family(
            "wordpress_directory_size_bytes",
            "Directory sizes in bytes.",
            MetricKind::Gauge,
        );
        for (label, size) in &sizes {
            family.sample(&[("directory", *label)], *size);
        }
        family.sample(&[("directory", "total")], total);
        Ok(block)
    }
}
