//! Config command implementation.
//!
//! Generates configuration files in various formats.

use std::fs;
use std::path::PathBuf;

use slymetrics::config::{render_config, Config, ConfigFormat};

/// Generates configuration files.
pub fn command_config(
    output: Option<PathBuf>,
    format: ConfigFormat,
    commented: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    let output = match output {
        Some(path) => path,
        None => PathBuf::from(match format {
            ConfigFormat::Yaml => "slymetrics.yaml",
            ConfigFormat::Json => "slymetrics.json",
            ConfigFormat::Toml => "slymetrics.toml",
        }),
    };

    let mut content = render_config(&config, format)?;
    if commented && format == ConfigFormat::Yaml {
        content = add_config_comments(content);
    }

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else {
        fs::write(&output, content)?;
        println!("✅ Configuration written to: {}", output.display());
    }

    Ok(())
}

/// Adds comments to YAML configuration.
fn add_config_comments(yaml: String) -> String {
    let comments = r#"# slymetrics Configuration
# ========================
#
# Server Configuration
# --------------------
# bind: "0.0.0.0"              # Bind IP (0.0.0.0 = all interfaces)
# port: 9936                   # HTTP port
# charset: "UTF-8"             # Charset announced in Content-Type
#
# Site
# ----
# host_snapshot: null          # Site snapshot file (YAML/JSON/TOML)
# site_name: null              # Override for the wordpress_site label
# state_dir: /var/lib/slymetrics # Holds options.json with the encrypted secrets
#
# Cache Tiers (seconds)
# ---------------------
# cache_namespace: slymetrics  # Prefix of transient store keys
# cache_ttl_fast: 10           # users, content, plugins, comments, terms, media
# cache_ttl_heavy: 300         # autoload, database size, directories, health
# cache_ttl_static: 3600       # runtime configuration
# media_count_ttl_secs: 300    # Memo for the attachment listing fallback
#
# Rate Limiting
# -------------
# rate_limit_max_requests: 60  # Requests allowed per client and window
# rate_limit_window_secs: 60   # Window length
#
# Health Check Thresholds
# -----------------------
# php_version_critical: "7.4"
# php_version_recommended: "8.0"
# memory_limit_critical_bytes: 134217728
# memory_limit_recommended_bytes: 268435456
#
# Directory Size Overrides
# ------------------------
# uploads_dir: null
# themes_dir: null
# plugins_dir: null
#
# Logging / Telemetry
# -------------------
# log_level: "info"            # off, error, warn, info, debug, trace
# verbose_errors: false        # Log collector failures at warn
# enable_telemetry: true       # Append slymetrics_exporter_* metrics
#
# TLS/SSL Configuration
# ---------------------
# enable_tls: false            # Enable HTTPS (default: false)
# tls_cert_path: null          # Path to TLS certificate (PEM format)
# tls_key_path: null           # Path to TLS private key (PEM format)
"#;

    format!("{comments}\n{yaml}")
}
