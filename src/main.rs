//! slymetrics - Prometheus exporter for WordPress site statistics.
//!
//! This is the main entry point that initializes the server and handles subcommands.

mod cli;
mod commands;

use axum_server::tls_rustls::RustlsConfig;
use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::{net::TcpListener, signal};
use tracing::{debug, error, info, level_filters::LevelFilter, warn};

use cli::{Args, Commands, LogLevel};
use commands::{
    command_check, command_config, command_generate_snapshot, command_rotate_key, command_test,
    command_tokens,
};
use slymetrics::config::{
    resolve_config, show_config, validate_effective_config, Config, DEFAULT_BIND_ADDR,
    DEFAULT_PORT,
};
use slymetrics::handlers::router;
use slymetrics::secrets::SecretEnv;
use slymetrics::state::{AppState, SharedState};

/// Initializes tracing logging subsystem with configured log level.
/// The CLI flag wins over the config file.
fn setup_logging(config: &Config, args: &Args) {
    let level = args
        .log_level
        .clone()
        .or_else(|| {
            config
                .log_level
                .as_deref()
                .and_then(|l| LogLevel::from_str(l, true).ok())
        })
        .unwrap_or(LogLevel::Info);

    let filter = match level {
        LogLevel::Off => LevelFilter::OFF,
        LogLevel::Error => LevelFilter::ERROR,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Trace => LevelFilter::TRACE,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    info!("Logging initialized with level: {:?}", level);
}

/// Helper function to load and validate configuration.
/// Exits the process with error code 1 if validation fails.
fn load_validated_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let config = resolve_config(args.config.as_deref(), args.no_config, &args.overrides())?;
    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }
    Ok(config)
}

/// Generates missing secrets and renders every tier once.
async fn prepare(state: &SharedState) -> Result<(), Box<dyn std::error::Error>> {
    let generated = state.secrets.ensure_tokens()?;
    if !generated.is_empty() {
        info!(
            "Generated {} new access secret(s); run `slymetrics tokens` to read them",
            generated.len()
        );
    }
    if state.secrets.bearer_from_env() {
        info!("Bearer token supplied by environment");
    }

    let warm = state.clone();
    let body = tokio::task::spawn_blocking(move || warm.dispatcher.cache().get_metrics()).await?;
    info!("Initial cache fill rendered {} bytes", body.len());
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}

/// Main application entry point.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.show_user_config || args.check_config {
        let config = resolve_config(args.config.as_deref(), args.no_config, &args.overrides())?;

        if args.check_config {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }

        if args.show_config {
            return show_config(&config, args.config_format, false);
        }

        if args.show_user_config {
            return show_config(&config, args.config_format, true);
        }
    }

    // Handle subcommands
    if let Some(command) = &args.command {
        match command {
            Commands::Config {
                output,
                format,
                commented,
            } => return command_config(output.clone(), *format, *commented),
            Commands::GenerateSnapshot { output } => return command_generate_snapshot(output),
            _ => {
                // Other commands need config validation
            }
        }

        let config = load_validated_config(&args)?;
        setup_logging(&config, &args);

        return match command {
            Commands::Check { collectors } => command_check(*collectors, &config),
            Commands::Test {
                iterations,
                verbose,
            } => command_test(*iterations, *verbose, &config),
            Commands::Tokens { regenerate } => command_tokens(*regenerate, &config),
            Commands::RotateKey => command_rotate_key(&config),
            Commands::Config { .. } => unreachable!("Config handled above"),
            Commands::GenerateSnapshot { .. } => unreachable!("GenerateSnapshot handled above"),
        };
    }

    // Load configuration for main server mode
    let config = load_validated_config(&args)?;
    setup_logging(&config, &args);

    info!("Starting slymetrics {}", env!("CARGO_PKG_VERSION"));

    let bind_ip_str = config
        .bind
        .clone()
        .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
    let port = config.port.unwrap_or(DEFAULT_PORT);
    let addr: SocketAddr = format!("{}:{}", bind_ip_str, port).parse()?;

    let state: SharedState = Arc::new(AppState::from_config(config.clone(), SecretEnv::from_process())?);
    debug!("Application state initialized");

    if let Err(e) = prepare(&state).await {
        warn!("Startup preparation incomplete: {}", e);
    }

    let app = router(state.clone());

    if config.enable_tls.unwrap_or(false) {
        // Validated at startup
        let (Some(cert_path), Some(key_path)) =
            (config.tls_cert_path.as_ref(), config.tls_key_path.as_ref())
        else {
            return Err("TLS enabled without certificate and key paths".into());
        };

        info!("Loading TLS certificate from: {}", cert_path);
        info!("Loading TLS private key from: {}", key_path);

        let tls_config = RustlsConfig::from_pem_file(cert_path, key_path)
            .await
            .map_err(|e| {
                error!("Failed to load TLS configuration: {}", e);
                e
            })?;

        info!("slymetrics listening on https://{}:{}", bind_ip_str, port);

        let server = axum_server::bind_rustls(addr, tls_config)
            .serve(app.into_make_service_with_connect_info::<SocketAddr>());

        tokio::select! {
            result = server => {
                if let Err(e) = result {
                    error!("Server error: {}", e);
                    return Err(e.into());
                }
            }
            _ = shutdown_signal() => {
                info!("Shutdown signal received, exiting...");
            }
        }
    } else {
        let listener = TcpListener::bind(addr).await?;
        info!("slymetrics listening on http://{}:{}", bind_ip_str, port);

        let server = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        );

        tokio::select! {
            result = server => {
                if let Err(e) = result {
                    error!("Server error: {}", e);
                    return Err(e.into());
                }
            }
            _ = shutdown_signal() => {
                info!("Shutdown signal received, exiting...");
            }
        }
    }

    info!("slymetrics stopped gracefully");
    Ok(())
}
