//! Configuration management for slymetrics.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI overrides. It supports YAML, JSON, and TOML formats.

use clap::ValueEnum;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::cache::TierTtls;
use crate::dispatch::DEFAULT_CHARSET;
use crate::host::RuntimeVersion;
use crate::rate_limit::RateLimitSettings;

// Default configuration constants
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9936;
pub const DEFAULT_NAMESPACE: &str = "slymetrics";
pub const DEFAULT_STATE_DIR: &str = "/var/lib/slymetrics";
pub const OPTIONS_FILE: &str = "options.json";

static NAMESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9_]+$").expect("static regex"));

/// Configuration format options for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Exporter configuration. Every field is optional; `None` means "use the default".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    // Server configuration
    pub port: Option<u16>,
    pub bind: Option<String>,

    // Logging
    pub log_level: Option<String>,
    /// Log collector failures at warn instead of debug
    #[serde(alias = "verbose-errors")]
    pub verbose_errors: Option<bool>,

    // Site
    /// Overrides the site name reported by the host for the `wordpress_site` label
    #[serde(alias = "site-name")]
    pub site_name: Option<String>,
    pub charset: Option<String>,
    /// Path to the site snapshot file (YAML/JSON/TOML)
    #[serde(alias = "host-snapshot")]
    pub host_snapshot: Option<PathBuf>,
    /// Directory holding the persisted options file
    #[serde(alias = "state-dir")]
    pub state_dir: Option<PathBuf>,

    // Cache tiers
    #[serde(alias = "cache-namespace")]
    pub cache_namespace: Option<String>,
    #[serde(alias = "cache-ttl-fast")]
    pub cache_ttl_fast: Option<u64>,
    #[serde(alias = "cache-ttl-heavy")]
    pub cache_ttl_heavy: Option<u64>,
    #[serde(alias = "cache-ttl-static")]
    pub cache_ttl_static: Option<u64>,
    #[serde(alias = "media-count-ttl-secs")]
    pub media_count_ttl_secs: Option<u64>,

    // Rate limiting
    #[serde(alias = "rate-limit-max-requests")]
    pub rate_limit_max_requests: Option<u64>,
    #[serde(alias = "rate-limit-window-secs")]
    pub rate_limit_window_secs: Option<u64>,

    // Feature flags
    #[serde(alias = "enable-telemetry")]
    pub enable_telemetry: Option<bool>,

    // Directory size overrides
    #[serde(alias = "uploads-dir")]
    pub uploads_dir: Option<PathBuf>,
    #[serde(alias = "themes-dir")]
    pub themes_dir: Option<PathBuf>,
    #[serde(alias = "plugins-dir")]
    pub plugins_dir: Option<PathBuf>,

    // Built-in health check thresholds
    #[serde(alias = "php-version-critical")]
    pub php_version_critical: Option<String>,
    #[serde(alias = "php-version-recommended")]
    pub php_version_recommended: Option<String>,
    #[serde(alias = "memory-limit-critical-bytes")]
    pub memory_limit_critical_bytes: Option<u64>,
    #[serde(alias = "memory-limit-recommended-bytes")]
    pub memory_limit_recommended_bytes: Option<u64>,

    // TLS/SSL Configuration
    #[serde(alias = "enable-tls")]
    pub enable_tls: Option<bool>,
    #[serde(alias = "tls-cert-path")]
    pub tls_cert_path: Option<String>,
    #[serde(alias = "tls-key-path")]
    pub tls_key_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        let ttls = TierTtls::default();
        let limits = RateLimitSettings::default();
        Self {
            bind: Some(DEFAULT_BIND_ADDR.to_string()),
            port: Some(DEFAULT_PORT),
            log_level: Some("info".into()),
            verbose_errors: Some(false),
            site_name: None,
            charset: Some(DEFAULT_CHARSET.to_string()),
            host_snapshot: None,
            state_dir: Some(PathBuf::from(DEFAULT_STATE_DIR)),
            cache_namespace: Some(DEFAULT_NAMESPACE.to_string()),
            cache_ttl_fast: Some(ttls.fast),
            cache_ttl_heavy: Some(ttls.heavy),
            cache_ttl_static: Some(ttls.static_),
            media_count_ttl_secs: Some(300),
            rate_limit_max_requests: Some(limits.max_requests),
            rate_limit_window_secs: Some(limits.window_secs),
            enable_telemetry: Some(true),
            uploads_dir: None,
            themes_dir: None,
            plugins_dir: None,
            php_version_critical: Some("7.4".into()),
            php_version_recommended: Some("8.0".into()),
            memory_limit_critical_bytes: Some(128 * 1024 * 1024),
            memory_limit_recommended_bytes: Some(256 * 1024 * 1024),
            enable_tls: Some(false),
            tls_cert_path: None,
            tls_key_path: None,
        }
    }
}

impl Config {
    pub fn tier_ttls(&self) -> TierTtls {
        let defaults = TierTtls::default();
        TierTtls {
            fast: self.cache_ttl_fast.unwrap_or(defaults.fast),
            heavy: self.cache_ttl_heavy.unwrap_or(defaults.heavy),
            static_: self.cache_ttl_static.unwrap_or(defaults.static_),
        }
    }

    pub fn rate_limit_settings(&self) -> RateLimitSettings {
        let defaults = RateLimitSettings::default();
        RateLimitSettings {
            max_requests: self.rate_limit_max_requests.unwrap_or(defaults.max_requests),
            window_secs: self.rate_limit_window_secs.unwrap_or(defaults.window_secs),
        }
    }

    pub fn namespace(&self) -> &str {
        self.cache_namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE)
    }

    pub fn charset(&self) -> &str {
        self.charset.as_deref().unwrap_or(DEFAULT_CHARSET)
    }

    /// Location of the persisted options file.
    pub fn options_path(&self) -> PathBuf {
        self.state_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR))
            .join(OPTIONS_FILE)
    }
}

/// Values supplied on the command line. Set fields win over the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub port: Option<u16>,
    pub bind: Option<String>,
    pub site_name: Option<String>,
    pub host_snapshot: Option<PathBuf>,
    pub state_dir: Option<PathBuf>,
    pub cache_namespace: Option<String>,
    pub verbose_errors: bool,
    pub disable_telemetry: bool,
    pub enable_tls: bool,
    pub tls_cert_path: Option<PathBuf>,
    pub tls_key_path: Option<PathBuf>,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.port = Some(port);
        }
        if let Some(bind) = &self.bind {
            config.bind = Some(bind.clone());
        }
        if let Some(name) = &self.site_name {
            config.site_name = Some(name.clone());
        }
        if let Some(path) = &self.host_snapshot {
            config.host_snapshot = Some(path.clone());
        }
        if let Some(dir) = &self.state_dir {
            config.state_dir = Some(dir.clone());
        }
        if let Some(ns) = &self.cache_namespace {
            config.cache_namespace = Some(ns.clone());
        }
        if self.verbose_errors {
            config.verbose_errors = Some(true);
        }
        if self.disable_telemetry {
            config.enable_telemetry = Some(false);
        }

        // TLS configuration: CLI wins if provided
        if self.enable_tls {
            config.enable_tls = Some(true);
        }
        if let Some(cert_path) = &self.tls_cert_path {
            config.tls_cert_path = Some(cert_path.to_string_lossy().to_string());
        }
        if let Some(key_path) = &self.tls_key_path {
            config.tls_key_path = Some(key_path.to_string_lossy().to_string());
        }
    }
}

fn check_tls_file(kind: &str, path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let meta = fs::metadata(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            format!("TLS {} file not found: {}", kind, path)
        } else {
            format!("TLS {} file is not readable: {} ({})", kind, path, e)
        }
    })?;
    if meta.len() == 0 {
        return Err(format!("TLS {} file is empty: {}", kind, path).into());
    }
    Ok(())
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let ttls = cfg.tier_ttls();
    for (name, ttl) in [
        ("cache_ttl_fast", ttls.fast),
        ("cache_ttl_heavy", ttls.heavy),
        ("cache_ttl_static", ttls.static_),
    ] {
        if ttl == 0 {
            return Err(format!("{} must be greater than 0", name).into());
        }
    }

    let limits = cfg.rate_limit_settings();
    if limits.max_requests == 0 {
        return Err("rate_limit_max_requests must be greater than 0".into());
    }
    if limits.window_secs == 0 {
        return Err("rate_limit_window_secs must be greater than 0".into());
    }

    if !NAMESPACE.is_match(cfg.namespace()) {
        return Err(format!(
            "Invalid cache_namespace '{}', expected lowercase letters, digits or '_'",
            cfg.namespace()
        )
        .into());
    }

    if cfg.charset().trim().is_empty() {
        return Err("charset must not be empty".into());
    }

    // Threshold ordering
    if let (Some(critical), Some(recommended)) = (
        cfg.php_version_critical.as_deref(),
        cfg.php_version_recommended.as_deref(),
    ) {
        if RuntimeVersion::parse(recommended).is_older_than(critical) {
            return Err(format!(
                "php_version_recommended ({}) is older than php_version_critical ({})",
                recommended, critical
            )
            .into());
        }
    }
    if let (Some(critical), Some(recommended)) = (
        cfg.memory_limit_critical_bytes,
        cfg.memory_limit_recommended_bytes,
    ) {
        if recommended < critical {
            return Err(
                "memory_limit_recommended_bytes must not be below memory_limit_critical_bytes"
                    .into(),
            );
        }
    }

    if let Some(snapshot) = &cfg.host_snapshot {
        if !snapshot.exists() {
            return Err(format!("Host snapshot file not found: {}", snapshot.display()).into());
        }
    }

    // TLS validation
    if cfg.enable_tls.unwrap_or(false) {
        match (cfg.tls_cert_path.as_deref(), cfg.tls_key_path.as_deref()) {
            (None, None) => {
                return Err(
                    "TLS is enabled but neither tls_cert_path nor tls_key_path are set".into(),
                );
            }
            (Some(_), None) => {
                return Err("TLS is enabled but tls_key_path is not set".into());
            }
            (None, Some(_)) => {
                return Err("TLS is enabled but tls_cert_path is not set".into());
            }
            (Some(cert), Some(key)) => {
                check_tls_file("certificate", cert)?;
                check_tls_file("private key", key)?;
            }
        }
    }

    Ok(())
}

/// Resolves configuration from CLI overrides, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(
    path: Option<&Path>,
    no_config: bool,
    overrides: &ConfigOverrides,
) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if no_config {
        Config::default()
    } else {
        load_config(path)?
    };
    overrides.apply(&mut config);
    Ok(config)
}

/// Loads the configuration file, searching default locations when no path is given.
/// Keys missing from the file keep their default values.
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let defaults = [
                "/etc/slymetrics/slymetrics.yaml",
                "/etc/slymetrics/slymetrics.yml",
                "/etc/slymetrics/slymetrics.json",
                "/etc/slymetrics/slymetrics.toml",
                "./slymetrics.yaml",
                "./slymetrics.yml",
                "./slymetrics.json",
                "./slymetrics.toml",
            ];

            match defaults.iter().find(|p| Path::new(p).exists()) {
                Some(found) => PathBuf::from(found),
                None => return Ok(Config::default()),
            }
        }
    };

    if !path.exists() {
        return Err(format!("Config file not found: {}", path.display()).into());
    }

    let content = fs::read_to_string(&path)?;

    // Parse into a generic value first so absent keys fall back to defaults.
    let loaded: serde_json::Value = match path.extension().and_then(|s| s.to_str()) {
        Some("json") => serde_json::from_str(&content)?,
        Some("toml") => {
            let value: toml::Value = toml::from_str(&content)?;
            serde_json::to_value(value)?
        }
        // Default to YAML
        _ => serde_yaml::from_str(&content)?,
    };

    let mut merged = serde_json::to_value(Config::default())?;
    if let (Some(base), Some(file)) = (merged.as_object_mut(), loaded.as_object()) {
        for (key, value) in file {
            let key = key.replace('-', "_");
            if !value.is_null() {
                base.insert(key, value.clone());
            }
        }
    }

    let config: Config = serde_json::from_value(merged)?;
    info!("Loaded configuration from: {}", path.display());
    Ok(config)
}

/// Serializes the configuration in the requested format.
pub fn render_config(config: &Config, format: ConfigFormat) -> Result<String, Box<dyn std::error::Error>> {
    Ok(match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    })
}

/// Shows configuration in requested format
pub fn show_config(
    config: &Config,
    format: ConfigFormat,
    user_config: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let output = render_config(config, format)?;
    if user_config {
        println!("User configuration (effective values):");
    }
    println!("{output}");
    Ok(())
}
