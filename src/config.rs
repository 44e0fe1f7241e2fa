//! Configuration module.
//!
//! YAML configuration covering:
//! - Observed accounts and service account credentials
//! - Collection and export intervals
//! - Firebolt API connection settings
//! - Metrics exporter transport (gRPC or HTTP)
//! - Logging

mod app;
mod exporter;
mod validation;

pub use app::{AppConfig, Credentials, FireboltConfig, TableHistoryConfig};
pub use exporter::{
    ExporterConfig, GrpcExporterConfig, HttpExporterConfig, OAuth2Config, TlsKeyPair,
};
pub use validation::{ConfigError, expand_env_vars, parse_duration};

// Defaults and lower bounds
pub use app::{
    DEFAULT_COLLECT_INTERVAL, DEFAULT_EXPORT_INTERVAL, DEFAULT_MAX_ENGINE_CONCURRENCY,
    DEFAULT_QUERY_TIMEOUT, MIN_COLLECT_INTERVAL, MIN_EXPORT_INTERVAL,
};
