//! Firebolt OpenTelemetry exporter.
//!
//! Periodically reads engine runtime, query history and table storage
//! telemetry from Firebolt accounts and pushes it to an OpenTelemetry
//! collector over OTLP.
//!
//! # Architecture
//!
//! - **Fetcher**: queries Firebolt, one connection per engine, streaming points
//! - **Collector**: interval scheduler, window tracking, metric recording
//! - **Exporter**: OTLP transport (gRPC or HTTP)
//! - **Config**: YAML configuration with environment expansion
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use firebolt_otel_exporter::{
//!     collector::{CollectOptions, Collector},
//!     config::AppConfig,
//!     exporter,
//!     fetcher::FireboltFetcher,
//!     firebolt::FireboltClient,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! let config = AppConfig::load("configs/config.yaml")?;
//! let client = FireboltClient::new(&config.firebolt, &config.credentials)?;
//! let fetcher = Arc::new(FireboltFetcher::new(client, 16));
//! let collector = Collector::builder(fetcher, config.accounts.clone())
//!     .build(exporter::build(&config.exporter).await?)?;
//!
//! collector
//!     .start(CancellationToken::new(), config.collect_interval, CollectOptions::default())
//!     .await?;
//! collector.close().await?;
//! ```

pub mod auth;
pub mod collector;
pub mod config;
pub mod exporter;
pub mod fetcher;
pub mod firebolt;
pub mod logging;

pub use collector::{CollectOptions, Collector, CollectorBuilder, CollectorError};
pub use config::{AppConfig, ConfigError};
pub use fetcher::{Fetcher, FireboltFetcher};
pub use firebolt::FireboltClient;

/// Crate version, reported as `service.version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
