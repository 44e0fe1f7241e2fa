//! OTLP metric exporters.
//!
//! - [`grpc`]: OTLP over gRPC, optional OAuth2 bearer token and system roots
//! - [`http`]: OTLP over HTTP (protobuf), optional mTLS client identity

pub mod grpc;
pub mod http;

use std::time::Duration;

use opentelemetry_otlp::MetricExporter;
use thiserror::Error;

use crate::auth::AuthError;
use crate::config::ExporterConfig;

/// Timeout of a single export request.
pub const EXPORT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors raised while building an exporter.
#[derive(Debug, Error)]
pub enum ExporterError {
    /// Neither transport is configured.
    #[error("must provide either a grpc exporter or a http exporter")]
    Missing,

    /// Both transports are configured.
    #[error("only one of grpc or http exporter may be configured")]
    Ambiguous,

    /// The OTLP exporter rejected its configuration.
    #[error("failed to build OTLP exporter: {0}")]
    Build(#[from] opentelemetry_otlp::ExporterBuildError),

    /// Client certificate or key could not be loaded.
    #[error("invalid TLS key pair: {0}")]
    Tls(String),

    /// Initial OAuth2 token could not be obtained.
    #[error("failed to obtain exporter token: {0}")]
    Auth(#[from] AuthError),

    /// HTTP client construction failed.
    #[error("failed to build http client: {0}")]
    HttpClient(String),
}

/// Build the exporter selected by `config`.
///
/// # Errors
/// Returns `ExporterError::Missing` when no transport is configured.
pub async fn build(config: &ExporterConfig) -> Result<MetricExporter, ExporterError> {
    match (&config.grpc, &config.http) {
        (Some(grpc), None) => grpc::build(grpc).await,
        (None, Some(http)) => http::build(http),
        (Some(_), Some(_)) => Err(ExporterError::Ambiguous),
        (None, None) => Err(ExporterError::Missing),
    }
}

/// `address` with `default_scheme://` prepended if it has no scheme.
fn with_scheme(address: &str, default_scheme: &str) -> String {
    let address = address.trim().trim_end_matches('/');
    if address.contains("://") {
        address.to_string()
    } else {
        format!("{default_scheme}://{address}")
    }
}
