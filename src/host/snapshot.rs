//! File-backed host adapter.
//!
//! A snapshot describes one site (users, content, plugins, runtime settings,
//! database figures) as JSON or YAML. The file is re-read whenever its
//! modification time changes, so an external job can refresh it while the
//! exporter keeps running.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

use super::{
    CapabilityCheck, ContentCounter, Database, DirectoryLayout, HealthDiagnostics,
    NativeTestResult, PluginRegistry, QueryKind, RuntimeInfo, Row, SiteInfo, Statement, ThemeInfo,
    UserCounts, UserDirectory,
};
use crate::error::HostError;
use crate::request::RequestView;

/// Cookie carrying an operator session id.
pub const OPERATOR_COOKIE: &str = "operator_session";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteSection {
    pub name: String,
    pub version: String,
    pub core_update_available: bool,
    pub is_ssl: bool,
    pub debug: bool,
    pub disallow_file_edit: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSection {
    pub total: u64,
    pub roles: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginSection {
    pub installed: Vec<String>,
    pub active: Vec<String>,
    pub updates: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSection {
    pub version: String,
    pub ini: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoloadSection {
    pub total_count: u64,
    pub size_kb: u64,
    pub transient_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub name: Option<String>,
    pub table_prefix: String,
    pub options_table: Option<String>,
    pub size_bytes: f64,
    pub autoload: AutoloadSection,
    pub last_error: Option<String>,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            name: None,
            table_prefix: "wp_".to_string(),
            options_table: None,
            size_bytes: 0.0,
            autoload: AutoloadSection::default(),
            last_error: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectorySection {
    pub uploads: Option<PathBuf>,
    pub themes: Option<PathBuf>,
    pub plugins: Option<PathBuf>,
}

/// Complete site description as stored on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteSnapshot {
    pub site: SiteSection,
    pub users: UserSection,
    /// Post type → status → count.
    pub posts: BTreeMap<String, BTreeMap<String, u64>>,
    pub comments: BTreeMap<String, serde_json::Value>,
    /// Taxonomy → number of terms.
    pub terms: BTreeMap<String, u64>,
    pub attachments_listed: u64,
    pub plugins: PluginSection,
    pub themes: Vec<ThemeInfo>,
    /// Results of the host's own health tests. `None` when the host has no
    /// such suite.
    pub health_tests: Option<Vec<NativeTestResult>>,
    pub runtime: RuntimeSection,
    pub database: DatabaseSection,
    pub directories: DirectorySection,
    pub operator_sessions: Vec<String>,
}

impl SiteSnapshot {
    /// Parses a snapshot, choosing the format by file extension.
    pub fn parse(path: &Path, content: &str) -> Result<Self, HostError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(content).map_err(|e| HostError::Snapshot(e.to_string()))
            }
            Some("toml") => toml::from_str(content).map_err(|e| HostError::Snapshot(e.to_string())),
            _ => serde_json::from_str(content).map_err(|e| HostError::Snapshot(e.to_string())),
        }
    }

    /// A plausible small site, used by `generate-snapshot`.
    pub fn sample() -> Self {
        let statuses = |pairs: &[(&str, u64)]| {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect::<BTreeMap<_, _>>()
        };

        let mut posts = BTreeMap::new();
        posts.insert(
            "post".to_string(),
            statuses(&[("publish", 42), ("draft", 3), ("trash", 1)]),
        );
        posts.insert("page".to_string(), statuses(&[("publish", 8), ("draft", 1)]));
        posts.insert("attachment".to_string(), statuses(&[("inherit", 120)]));

        let mut comments = BTreeMap::new();
        comments.insert("approved".to_string(), serde_json::json!(230));
        comments.insert("awaiting_moderation".to_string(), serde_json::json!(4));
        comments.insert("spam".to_string(), serde_json::json!(17));
        comments.insert("trash".to_string(), serde_json::json!(2));
        comments.insert("post-trashed".to_string(), serde_json::json!(0));
        comments.insert("total_comments".to_string(), serde_json::json!(236));

        let mut ini = BTreeMap::new();
        for (k, v) in [
            ("max_input_vars", "1000"),
            ("max_execution_time", "30"),
            ("memory_limit", "256M"),
            ("max_input_time", "60"),
            ("upload_max_filesize", "64M"),
            ("post_max_size", "64M"),
        ] {
            ini.insert(k.to_string(), v.to_string());
        }

        Self {
            site: SiteSection {
                name: "Example Blog".to_string(),
                version: "6.6.2".to_string(),
                core_update_available: false,
                is_ssl: true,
                debug: false,
                disallow_file_edit: true,
            },
            users: UserSection {
                total: 12,
                roles: statuses(&[("administrator", 2), ("editor", 3), ("subscriber", 7)]),
            },
            posts,
            comments,
            terms: statuses(&[("category", 9), ("post_tag", 31)]),
            attachments_listed: 120,
            plugins: PluginSection {
                installed: vec![
                    "akismet/akismet.php".to_string(),
                    "hello.php".to_string(),
                    "slymetrics/slymetrics.php".to_string(),
                ],
                active: vec![
                    "akismet/akismet.php".to_string(),
                    "slymetrics/slymetrics.php".to_string(),
                ],
                updates: vec!["akismet/akismet.php".to_string()],
            },
            themes: vec![
                ThemeInfo {
                    slug: "twentytwentyfour".to_string(),
                    is_child: false,
                },
                ThemeInfo {
                    slug: "twentytwentyfour-child".to_string(),
                    is_child: true,
                },
            ],
            health_tests: None,
            runtime: RuntimeSection {
                version: "8.2.12".to_string(),
                ini,
            },
            database: DatabaseSection {
                name: Some("wordpress".to_string()),
                table_prefix: "wp_".to_string(),
                options_table: Some("wp_options".to_string()),
                size_bytes: 52_428_800.0,
                autoload: AutoloadSection {
                    total_count: 310,
                    size_kb: 850,
                    transient_count: 12,
                },
                last_error: None,
            },
            directories: DirectorySection {
                uploads: Some(PathBuf::from("/var/www/html/wp-content/uploads")),
                themes: Some(PathBuf::from("/var/www/html/wp-content/themes")),
                plugins: Some(PathBuf::from("/var/www/html/wp-content/plugins")),
            },
            operator_sessions: Vec::new(),
        }
    }
}

struct Loaded {
    modified: Option<SystemTime>,
    snapshot: Arc<SiteSnapshot>,
}

/// Host adapter backed by a [`SiteSnapshot`], optionally reloaded from a file.
pub struct SnapshotHost {
    path: Option<PathBuf>,
    state: RwLock<Loaded>,
}

impl SnapshotHost {
    /// Serves a fixed in-memory snapshot.
    pub fn from_snapshot(snapshot: SiteSnapshot) -> Self {
        Self {
            path: None,
            state: RwLock::new(Loaded {
                modified: None,
                snapshot: Arc::new(snapshot),
            }),
        }
    }

    /// A host that knows nothing: every count is zero.
    pub fn empty() -> Self {
        Self::from_snapshot(SiteSnapshot::default())
    }

    /// Loads the snapshot at `path`. Fails if the first load fails; later reload
    /// failures keep the previous snapshot.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, HostError> {
        let path = path.as_ref().to_path_buf();
        let (snapshot, modified) = read_snapshot(&path)?;
        info!("Loaded site snapshot from {}", path.display());
        Ok(Self {
            path: Some(path),
            state: RwLock::new(Loaded {
                modified,
                snapshot: Arc::new(snapshot),
            }),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Current snapshot, reloading the file first if it changed on disk.
    pub fn snapshot(&self) -> Arc<SiteSnapshot> {
        if let Some(path) = &self.path {
            let current = fs::metadata(path).and_then(|m| m.modified()).ok();
            let stale = {
                let state = self.state.read().unwrap_or_else(|e| e.into_inner());
                current.is_some() && current != state.modified
            };
            if stale {
                match read_snapshot(path) {
                    Ok((snapshot, modified)) => {
                        debug!("Site snapshot {} changed, reloaded", path.display());
                        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
                        state.snapshot = Arc::new(snapshot);
                        state.modified = modified;
                    }
                    Err(e) => warn!("Keeping previous site snapshot: {}", e),
                }
            }
        }

        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.snapshot.clone()
    }
}

fn read_snapshot(path: &Path) -> Result<(SiteSnapshot, Option<SystemTime>), HostError> {
    let content = fs::read_to_string(path)
        .map_err(|e| HostError::Snapshot(format!("{}: {}", path.display(), e)))?;
    let modified = fs::metadata(path).and_then(|m| m.modified()).ok();
    Ok((SiteSnapshot::parse(path, &content)?, modified))
}

impl SiteInfo for SnapshotHost {
    fn site_name(&self) -> Result<String, HostError> {
        Ok(self.snapshot().site.name.clone())
    }

    fn version(&self) -> Result<String, HostError> {
        Ok(self.snapshot().site.version.clone())
    }

    fn core_update_available(&self) -> Result<bool, HostError> {
        Ok(self.snapshot().site.core_update_available)
    }

    fn is_ssl(&self) -> Result<bool, HostError> {
        Ok(self.snapshot().site.is_ssl)
    }

    fn debug_enabled(&self) -> Result<bool, HostError> {
        Ok(self.snapshot().site.debug)
    }

    fn file_edit_disallowed(&self) -> Result<bool, HostError> {
        Ok(self.snapshot().site.disallow_file_edit)
    }
}

impl UserDirectory for SnapshotHost {
    fn count_users(&self) -> Result<UserCounts, HostError> {
        let snapshot = self.snapshot();
        Ok(UserCounts {
            total: snapshot.users.total,
            roles: snapshot
                .users
                .roles
                .iter()
                .map(|(role, count)| (role.clone(), *count))
                .collect(),
        })
    }
}

impl ContentCounter for SnapshotHost {
    fn count_posts(&self, post_type: &str) -> Result<Vec<(String, u64)>, HostError> {
        Ok(self
            .snapshot()
            .posts
            .get(post_type)
            .map(|statuses| statuses.iter().map(|(s, c)| (s.clone(), *c)).collect())
            .unwrap_or_default())
    }

    fn count_comments(&self) -> Result<Vec<(String, serde_json::Value)>, HostError> {
        Ok(self
            .snapshot()
            .comments
            .iter()
            .map(|(s, c)| (s.clone(), c.clone()))
            .collect())
    }

    fn count_terms(&self, taxonomy: &str) -> Result<u64, HostError> {
        Ok(self.snapshot().terms.get(taxonomy).copied().unwrap_or(0))
    }

    fn list_attachments(&self) -> Result<u64, HostError> {
        Ok(self.snapshot().attachments_listed)
    }
}

impl PluginRegistry for SnapshotHost {
    fn installed_plugins(&self) -> Result<Vec<String>, HostError> {
        Ok(self.snapshot().plugins.installed.clone())
    }

    fn active_plugins(&self) -> Result<Vec<String>, HostError> {
        Ok(self.snapshot().plugins.active.clone())
    }

    fn plugins_with_updates(&self) -> Result<Vec<String>, HostError> {
        Ok(self.snapshot().plugins.updates.clone())
    }

    fn themes(&self) -> Result<Vec<ThemeInfo>, HostError> {
        Ok(self.snapshot().themes.clone())
    }
}

impl HealthDiagnostics for SnapshotHost {
    fn run_native_tests(&self) -> Result<Vec<NativeTestResult>, HostError> {
        self.snapshot()
            .health_tests
            .clone()
            .ok_or(HostError::Unavailable("native health tests"))
    }
}

impl RuntimeInfo for SnapshotHost {
    fn runtime_version(&self) -> Result<String, HostError> {
        let version = self.snapshot().runtime.version.clone();
        if version.is_empty() {
            return Err(HostError::Unavailable("runtime version"));
        }
        Ok(version)
    }

    fn ini_get(&self, key: &str) -> Option<String> {
        self.snapshot().runtime.ini.get(key).cloned()
    }
}

impl Database for SnapshotHost {
    fn database_name(&self) -> Option<String> {
        self.snapshot().database.name.clone()
    }

    fn table_prefix(&self) -> String {
        self.snapshot().database.table_prefix.clone()
    }

    fn options_table(&self) -> Option<String> {
        self.snapshot().database.options_table.clone()
    }

    fn query_row(&self, statement: &Statement) -> Result<Option<Row>, HostError> {
        let snapshot = self.snapshot();
        let db = &snapshot.database;
        let mut row = Row::new();
        match statement.kind {
            QueryKind::AutoloadSummary => {
                row.insert("total_count".into(), db.autoload.total_count.into());
                row.insert("size_kb".into(), db.autoload.size_kb.into());
                row.insert("transient_count".into(), db.autoload.transient_count.into());
            }
            QueryKind::DatabaseSize => {
                // The schema parameter must name this snapshot's database.
                if statement.params.first() != db.name.as_ref() {
                    return Ok(None);
                }
                row.insert("value".into(), serde_json::json!(db.size_bytes));
            }
        }
        Ok(Some(row))
    }

    fn last_error(&self) -> Option<String> {
        self.snapshot()
            .database
            .last_error
            .clone()
            .filter(|e| !e.is_empty())
    }
}

impl CapabilityCheck for SnapshotHost {
    fn is_operator(&self, request: &RequestView) -> bool {
        let Some(session) = request.cookie(OPERATOR_COOKIE) else {
            return false;
        };
        if session.is_empty() {
            return false;
        }
        self.snapshot()
            .operator_sessions
            .iter()
            .filter(|known| !known.is_empty())
            .any(|known| bool::from(known.as_bytes().ct_eq(session.as_bytes())))
    }
}

impl DirectoryLayout for SnapshotHost {
    fn uploads_dir(&self) -> Option<PathBuf> {
        self.snapshot().directories.uploads.clone()
    }

    fn themes_dir(&self) -> Option<PathBuf> {
        self.snapshot().directories.themes.clone()
    }

    fn plugins_dir(&self) -> Option<PathBuf> {
        self.snapshot().directories.plugins.clone()
    }
}
