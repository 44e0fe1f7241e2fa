//! OTLP/HTTP exporter.

use opentelemetry_otlp::{MetricExporter, Protocol, WithExportConfig, WithHttpConfig};

use super::{EXPORT_TIMEOUT, ExporterError, with_scheme};
use crate::config::{HttpExporterConfig, TlsKeyPair};

/// Path of the OTLP metrics endpoint.
pub const METRICS_PATH: &str = "/v1/metrics";

/// Full metrics URL for `config`.
pub fn endpoint(config: &HttpExporterConfig) -> String {
    let scheme = if config.tls.is_some() { "https" } else { "http" };
    format!("{}{METRICS_PATH}", with_scheme(&config.address, scheme))
}

/// Build the HTTP exporter.
///
/// Plain HTTP is used unless a client key pair is configured.
pub fn build(config: &HttpExporterConfig) -> Result<MetricExporter, ExporterError> {
    let identity = config.tls.as_ref().map(identity).transpose()?;
    let client = blocking_client(identity)?;
    let endpoint = endpoint(config);

    let exporter = MetricExporter::builder()
        .with_http()
        .with_endpoint(endpoint.clone())
        .with_protocol(Protocol::HttpBinary)
        .with_timeout(EXPORT_TIMEOUT)
        .with_http_client(client)
        .build()?;

    tracing::info!(
        endpoint = %endpoint,
        mtls = config.tls.is_some(),
        "HTTP metrics exporter configured"
    );
    Ok(exporter)
}

fn identity(tls: &TlsKeyPair) -> Result<reqwest::Identity, ExporterError> {
    let mut pem = Vec::with_capacity(tls.cert_pem.len() + tls.key_pem.len() + 1);
    pem.extend_from_slice(tls.key_pem.trim().as_bytes());
    pem.push(b'\n');
    pem.extend_from_slice(tls.cert_pem.trim().as_bytes());
    reqwest::Identity::from_pem(&pem).map_err(|e| ExporterError::Tls(e.to_string()))
}

/// The blocking client owns an internal runtime, so it is built off the
/// async runtime's threads.
fn blocking_client(
    identity: Option<reqwest::Identity>,
) -> Result<reqwest::blocking::Client, ExporterError> {
    std::thread::spawn(move || {
        let mut builder = reqwest::blocking::Client::builder().timeout(EXPORT_TIMEOUT);
        if let Some(identity) = identity {
            builder = builder.identity(identity);
        }
        builder.build()
    })
    .join()
    .map_err(|_| ExporterError::HttpClient("client builder thread panicked".to_string()))?
    .map_err(|e| ExporterError::HttpClient(e.to_string()))
}
