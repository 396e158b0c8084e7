//! CLI arguments and subcommands for slymetrics.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;

use slymetrics::config::ConfigOverrides;
pub use slymetrics::config::ConfigFormat;

/// Log level options for CLI parsing
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Which stored secret a token command acts on
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum TokenKind {
    Bearer,
    ApiKey,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "slymetrics",
    about = "Prometheus exporter for WordPress site statistics",
    long_about = "Prometheus exporter for WordPress site statistics.\n\n\
                  Exposes user, content, plugin, theme, health check, storage and runtime \
                  metrics of a single site in Prometheus text format, behind bearer token or \
                  API key authentication and per-client rate limiting.",
    version,
    propagate_version = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// HTTP listen port
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Bind to specific interface/IP
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Log level (overrides log_level from the config file)
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Print only the loaded user config file + full path and exit
    #[arg(long)]
    pub show_user_config: bool,

    /// Output format for --show-config*
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Site snapshot file describing the monitored site
    #[arg(short = 's', long)]
    pub snapshot: Option<PathBuf>,

    /// Directory holding the persisted options file
    #[arg(long)]
    pub state_dir: Option<PathBuf>,

    /// Override the site name used in the wordpress_site label
    #[arg(long)]
    pub site_name: Option<String>,

    /// Prefix for transient store keys
    #[arg(long)]
    pub namespace: Option<String>,

    /// Log collector failures at warn level
    #[arg(long)]
    pub verbose_errors: bool,

    /// Disable internal slymetrics_exporter_* metrics
    #[arg(long)]
    pub disable_telemetry: bool,

    /// Enable TLS/SSL for HTTPS
    #[arg(long)]
    pub enable_tls: bool,

    /// Path to TLS certificate file (PEM format)
    #[arg(long)]
    pub tls_cert: Option<PathBuf>,

    /// Path to TLS private key file (PEM format)
    #[arg(long)]
    pub tls_key: Option<PathBuf>,
}

impl Args {
    /// CLI values that override the config file.
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            port: self.port,
            bind: self.bind.map(|ip| ip.to_string()),
            site_name: self.site_name.clone(),
            host_snapshot: self.snapshot.clone(),
            state_dir: self.state_dir.clone(),
            cache_namespace: self.namespace.clone(),
            verbose_errors: self.verbose_errors,
            disable_telemetry: self.disable_telemetry,
            enable_tls: self.enable_tls,
            tls_cert_path: self.tls_cert.clone(),
            tls_key_path: self.tls_key.clone(),
        }
    }
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate configuration, snapshot and options file
    Check {
        /// Also render every tier once and report collector failures
        #[arg(long)]
        collectors: bool,
    },

    /// Generate configuration files
    Config {
        /// Output file path ("-" for stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Include comments and examples
        #[arg(long)]
        commented: bool,
    },

    /// Render the metrics page once and print it
    Test {
        /// Number of renders (later ones exercise the cache)
        #[arg(short = 'n', long, default_value_t = 1)]
        iterations: usize,

        /// Print the rendered exposition text
        #[arg(long)]
        verbose: bool,
    },

    /// Show or regenerate the bearer token and API key
    Tokens {
        /// Regenerate the given secret instead of showing it
        #[arg(long, value_enum)]
        regenerate: Option<TokenKind>,
    },

    /// Generate a new encryption key and re-encrypt stored secrets
    RotateKey,

    /// Write a sample site snapshot file
    GenerateSnapshot {
        /// Output file path (format by extension)
        #[arg(short = 'o', long, default_value = "snapshot.yaml")]
        output: PathBuf,
    },
}
