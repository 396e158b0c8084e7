//! Read-only interfaces to the host site.
//!
//! Collectors never talk to the site directly. Each concern is a narrow trait so
//! that a snapshot file, a live database adapter or a test double can stand in.

pub mod snapshot;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::HostError;
use crate::request::RequestView;

pub use snapshot::{SiteSnapshot, SnapshotHost};

/// General site facts.
pub trait SiteInfo: Send + Sync {
    fn site_name(&self) -> Result<String, HostError>;
    fn version(&self) -> Result<String, HostError>;
    fn core_update_available(&self) -> Result<bool, HostError>;
    fn is_ssl(&self) -> Result<bool, HostError>;
    fn debug_enabled(&self) -> Result<bool, HostError>;
    fn file_edit_disallowed(&self) -> Result<bool, HostError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCounts {
    pub total: u64,
    /// Users per role, in host order.
    pub roles: Vec<(String, u64)>,
}

pub trait UserDirectory: Send + Sync {
    fn count_users(&self) -> Result<UserCounts, HostError>;
}

pub trait ContentCounter: Send + Sync {
    /// Count per status for one post type (`post`, `page`, `attachment`, ...).
    fn count_posts(&self, post_type: &str) -> Result<Vec<(String, u64)>, HostError>;
    /// Comment counts per status. Values are whatever the host reports and may
    /// not be numeric.
    fn count_comments(&self) -> Result<Vec<(String, serde_json::Value)>, HostError>;
    /// Number of terms in a taxonomy, empty terms included.
    fn count_terms(&self, taxonomy: &str) -> Result<u64, HostError>;
    /// Number of attachments found by listing them directly.
    fn list_attachments(&self) -> Result<u64, HostError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeInfo {
    pub slug: String,
    #[serde(default)]
    pub is_child: bool,
}

pub trait PluginRegistry: Send + Sync {
    fn installed_plugins(&self) -> Result<Vec<String>, HostError>;
    fn active_plugins(&self) -> Result<Vec<String>, HostError>;
    /// Plugins with a pending update.
    fn plugins_with_updates(&self) -> Result<Vec<String>, HostError>;
    fn themes(&self) -> Result<Vec<ThemeInfo>, HostError>;
}

/// One result of the host's own health test suite.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeTestResult {
    pub test: String,
    #[serde(default)]
    pub label: String,
    pub status: String,
    #[serde(default)]
    pub badge: Option<String>,
    #[serde(default)]
    pub description: String,
}

pub trait HealthDiagnostics: Send + Sync {
    /// Runs the host's direct health tests. `HostError::Unavailable` when the host
    /// has no such suite.
    fn run_native_tests(&self) -> Result<Vec<NativeTestResult>, HostError>;
}

/// Interpreter version split into its components.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeVersion {
    pub version: String,
    pub major: u32,
    pub minor: u32,
    pub release: u32,
}

impl RuntimeVersion {
    /// Parses `"8.2.12"`, `"8.1"` or `"7.4.33-1+ubuntu"`. Missing or garbled parts
    /// become 0.
    pub fn parse(version: &str) -> Self {
        let mut parts = version.trim().split('.').map(|p| {
            p.chars()
                .take_while(|c| c.is_ascii_digit())
                .collect::<String>()
                .parse::<u32>()
                .unwrap_or(0)
        });
        Self {
            version: version.trim().to_string(),
            major: parts.next().unwrap_or(0),
            minor: parts.next().unwrap_or(0),
            release: parts.next().unwrap_or(0),
        }
    }

    /// `major * 10000 + minor * 100 + release`.
    pub fn version_id(&self) -> u64 {
        self.major as u64 * 10_000 + self.minor as u64 * 100 + self.release as u64
    }

    /// Compares by numeric components with another dotted version string.
    pub fn is_older_than(&self, other: &str) -> bool {
        let other = RuntimeVersion::parse(other);
        (self.major, self.minor, self.release) < (other.major, other.minor, other.release)
    }
}

pub trait RuntimeInfo: Send + Sync {
    fn runtime_version(&self) -> Result<String, HostError>;
    /// Raw value of an interpreter setting, e.g. `memory_limit` → `"256M"`.
    fn ini_get(&self, key: &str) -> Option<String>;
}

/// Which canned row a statement asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    AutoloadSummary,
    DatabaseSize,
}

/// A parameterized statement. Identifiers are validated before they are placed
/// into `sql`; values only ever travel in `params`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub kind: QueryKind,
    pub sql: String,
    pub params: Vec<String>,
}

pub type Row = BTreeMap<String, serde_json::Value>;

pub trait Database: Send + Sync {
    fn database_name(&self) -> Option<String>;
    fn table_prefix(&self) -> String;
    fn options_table(&self) -> Option<String>;
    fn query_row(&self, statement: &Statement) -> Result<Option<Row>, HostError>;
    fn last_error(&self) -> Option<String>;
}

pub trait CapabilityCheck: Send + Sync {
    /// Whether the caller holds the administrative capability.
    fn is_operator(&self, request: &RequestView) -> bool;
}

pub trait DirectoryLayout: Send + Sync {
    fn uploads_dir(&self) -> Option<PathBuf>;
    fn themes_dir(&self) -> Option<PathBuf>;
    fn plugins_dir(&self) -> Option<PathBuf>;
}

/// Everything a full host adapter implements.
pub trait HostProvider:
    SiteInfo
    + UserDirectory
    + ContentCounter
    + PluginRegistry
    + HealthDiagnostics
    + RuntimeInfo
    + Database
    + CapabilityCheck
    + DirectoryLayout
{
}

impl<T> HostProvider for T where
    T: SiteInfo
        + UserDirectory
        + ContentCounter
        + PluginRegistry
        + HealthDiagnostics
        + RuntimeInfo
        + Database
        + CapabilityCheck
        + DirectoryLayout
{
}

/// Bundle of host interfaces handed to collectors and the auth gate.
#[derive(Clone)]
pub struct Host {
    pub site: Arc<dyn SiteInfo>,
    pub users: Arc<dyn UserDirectory>,
    pub content: Arc<dyn ContentCounter>,
    pub plugins: Arc<dyn PluginRegistry>,
    pub health: Arc<dyn HealthDiagnostics>,
    pub runtime: Arc<dyn RuntimeInfo>,
    pub database: Arc<dyn Database>,
    pub capability: Arc<dyn CapabilityCheck>,
    pub layout: Arc<dyn DirectoryLayout>,
}

impl Host {
    /// Uses one adapter for every interface.
    pub fn from_provider<P: HostProvider + 'static>(provider: Arc<P>) -> Self {
        Self {
            site: provider.clone(),
            users: provider.clone(),
            content: provider.clone(),
            plugins: provider.clone(),
            health: provider.clone(),
            runtime: provider.clone(),
            database: provider.clone(),
            capability: provider.clone(),
            layout: provider,
        }
    }

    /// Site name used for the site label; empty when the host cannot tell.
    pub fn site_name(&self) -> String {
        self.site.site_name().unwrap_or_default()
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_version_parse() {
        let v = RuntimeVersion::parse("8.2.12");
        assert_eq!((v.major, v.minor, v.release), (8, 2, 12));
        assert_eq!(v.version_id(), 80212);

        let v = RuntimeVersion::parse("7.4.33-1+ubuntu22.04");
        assert_eq!(v.version_id(), 70433);

        let v = RuntimeVersion::parse("garbage");
        assert_eq!(v.version_id(), 0);
    }

    #[test]
    fn test_runtime_version_compare() {
        let v = RuntimeVersion::parse("7.3.9");
        assert!(v.is_older_than("7.4"));
        assert!(v.is_older_than("8.0"));
        assert!(!RuntimeVersion::parse("8.0.0").is_older_than("8.0"));
        assert!(!RuntimeVersion::parse("8.1.2").is_older_than("8.0"));
    }
}
