//! Firebolt OpenTelemetry exporter binary.
//!
//! Core functionality is provided by the `firebolt_otel_exporter` library crate.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use firebolt_otel_exporter::{
    collector::{CollectOptions, Collector},
    config::{AppConfig, GrpcExporterConfig, HttpExporterConfig, parse_duration},
    exporter,
    fetcher::FireboltFetcher,
    firebolt::FireboltClient,
    logging::{self, LogFormat, LogLevel},
};
use tokio_util::sync::CancellationToken;

/// Firebolt OpenTelemetry exporter
#[derive(Parser, Debug)]
#[command(name = "firebolt-otel-exporter", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "configs/config.yaml",
        env = "FIREBOLT_OTEL_EXPORTER_CONFIG"
    )]
    config: String,

    /// Comma separated accounts to observe (overrides config file)
    #[arg(long, env = "FIREBOLT_OTEL_EXPORTER_ACCOUNTS", value_delimiter = ',')]
    accounts: Option<Vec<String>>,

    /// Service account client id (overrides config file)
    #[arg(long, env = "FIREBOLT_OTEL_EXPORTER_CLIENT_ID")]
    client_id: Option<String>,

    /// Service account client secret (overrides config file)
    #[arg(long, env = "FIREBOLT_OTEL_EXPORTER_CLIENT_SECRET", hide_env_values = true)]
    client_secret: Option<String>,

    /// Collection interval, e.g. `30s` (overrides config file)
    #[arg(long, env = "FIREBOLT_OTEL_EXPORTER_COLLECT_INTERVAL", value_parser = parse_duration)]
    collect_interval: Option<Duration>,

    /// OTLP/gRPC collector address (overrides config file)
    #[arg(long, env = "FIREBOLT_OTEL_EXPORTER_GRPC_ADDRESS")]
    grpc_address: Option<String>,

    /// OTLP/HTTP collector address (overrides config file)
    #[arg(long, env = "FIREBOLT_OTEL_EXPORTER_HTTP_ADDRESS")]
    http_address: Option<String>,

    /// Log level (overrides config file)
    #[arg(long, env = "FIREBOLT_OTEL_EXPORTER_LOG_LEVEL")]
    log_level: Option<LogLevel>,

    /// Log format (overrides config file)
    #[arg(long, env = "FIREBOLT_OTEL_EXPORTER_LOG_FORMAT")]
    log_format: Option<LogFormat>,
}

impl Cli {
    /// Apply CLI/env overrides (CLI > ENV > config file).
    fn apply(self, config: &mut AppConfig) {
        if let Some(accounts) = self.accounts {
            config.accounts = accounts
                .into_iter()
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty())
                .collect();
        }
        if let Some(client_id) = self.client_id {
            config.credentials.client_id = client_id;
        }
        if let Some(client_secret) = self.client_secret {
            config.credentials.client_secret = client_secret;
        }
        if let Some(interval) = self.collect_interval {
            config.collect_interval = interval;
        }
        if let Some(address) = self.grpc_address {
            match config.exporter.grpc.as_mut() {
                Some(grpc) => grpc.address = address,
                None => {
                    config.exporter.grpc = Some(GrpcExporterConfig {
                        address,
                        oauth2: None,
                        system_cert_pool: false,
                    })
                }
            }
        }
        if let Some(address) = self.http_address {
            match config.exporter.http.as_mut() {
                Some(http) => http.address = address,
                None => config.exporter.http = Some(HttpExporterConfig { address, tls: None }),
            }
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Without a config file, everything comes from CLI/env.
    let config_path = cli.config.clone();
    let config_found = Path::new(&config_path).exists();
    let mut config = if config_found {
        AppConfig::load(&config_path)?
    } else {
        AppConfig::from_yaml("{}")?
    };
    cli.apply(&mut config);
    config.validate()?;

    logging::init(&config.logging)?;

    tracing::info!(version = firebolt_otel_exporter::VERSION, "Firebolt OpenTelemetry exporter");
    if config_found {
        tracing::info!(path = %config_path, "Configuration loaded");
    } else {
        tracing::info!(path = %config_path, "Configuration file not found, using environment only");
    }
    tracing::info!(
        accounts = ?config.accounts,
        collect_interval = %humantime::format_duration(config.collect_interval),
        export_interval = %humantime::format_duration(config.export_interval),
        table_history = config.table_history_database().unwrap_or("disabled"),
        "Collector settings"
    );

    let client = FireboltClient::new(&config.firebolt, &config.credentials)?;
    let fetcher = Arc::new(FireboltFetcher::new(
        client,
        config.firebolt.max_engine_concurrency,
    ));
    tracing::debug!("Fetcher initialized");

    let exporter = exporter::build(&config.exporter).await.inspect_err(|e| {
        tracing::error!(error = %e, "Failed to initialize metrics exporter");
    })?;
    tracing::debug!("Exporter initialized");

    let collector = Collector::builder(fetcher, config.accounts.clone())
        .export_interval(config.export_interval)
        .build(exporter)
        .inspect_err(|e| {
            tracing::error!(error = %e, "Failed to initialize metrics collector");
        })?;
    tracing::info!("Metrics collector and exporter initialized");

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let options = CollectOptions {
        table_history_database: config.table_history_database().map(str::to_string),
    };
    let result = collector
        .start(shutdown, config.collect_interval, options)
        .await;

    if let Err(e) = collector.close().await {
        tracing::error!(error = %e, "Failed to close collector");
    }

    result?;
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Cancel `shutdown` on Ctrl+C or SIGTERM.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }

    tracing::info!("Stopping after the current collection cycle...");
    shutdown.cancel();
}
