//! Metrics exporter transport configuration.
//!
//! Exactly one of [`GrpcExporterConfig`] or [`HttpExporterConfig`] must be set.

use serde::{Deserialize, Serialize};

use super::validation::{ConfigError, require_non_blank};

/// Exporter transport selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// OTLP over gRPC.
    #[serde(default)]
    pub grpc: Option<GrpcExporterConfig>,

    /// OTLP over HTTP (protobuf).
    #[serde(default)]
    pub http: Option<HttpExporterConfig>,
}

impl ExporterConfig {
    /// Validate that exactly one transport is configured and that it is complete.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match (&self.grpc, &self.http) {
            (Some(grpc), None) => grpc.validate(),
            (None, Some(http)) => http.validate(),
            (Some(_), Some(_)) => Err(ConfigError::invalid(
                "exporter: only one of grpc or http may be configured",
            )),
            (None, None) => Err(ConfigError::invalid(
                "exporter: must provide either a grpc exporter or a http exporter",
            )),
        }
    }
}

/// OTLP/gRPC exporter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrpcExporterConfig {
    /// Collector address, e.g. `otel-collector:4317` or `https://collector:4317`.
    pub address: String,

    /// OAuth2 client credentials attached to every export request.
    #[serde(default)]
    pub oauth2: Option<OAuth2Config>,

    /// Verify the collector with the operating system certificate pool (TLS).
    #[serde(default)]
    pub system_cert_pool: bool,
}

impl GrpcExporterConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        require_non_blank("exporter.grpc.address", &self.address)?;
        if let Some(oauth2) = &self.oauth2 {
            oauth2.validate()?;
        }
        Ok(())
    }
}

/// OAuth2 client-credentials grant settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct OAuth2Config {
    pub client_id: String,
    pub client_secret: String,
    /// Token endpoint of the authorization server.
    pub token_url: String,
}

impl std::fmt::Debug for OAuth2Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth2Config")
            .field("client_id", &self.client_id)
            .field("token_url", &self.token_url)
            .finish_non_exhaustive()
    }
}

impl OAuth2Config {
    fn validate(&self) -> Result<(), ConfigError> {
        require_non_blank("exporter.grpc.oauth2.client_id", &self.client_id)?;
        require_non_blank("exporter.grpc.oauth2.client_secret", &self.client_secret)?;
        require_non_blank("exporter.grpc.oauth2.token_url", &self.token_url)
    }
}

/// OTLP/HTTP exporter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpExporterConfig {
    /// Collector address, e.g. `127.0.0.1:4318`.
    pub address: String,

    /// Client certificate for mTLS. Plain HTTP is used when absent.
    #[serde(default)]
    pub tls: Option<TlsKeyPair>,
}

impl HttpExporterConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        require_non_blank("exporter.http.address", &self.address)?;
        if let Some(tls) = &self.tls {
            require_non_blank("exporter.http.tls.cert_pem", &tls.cert_pem)?;
            require_non_blank("exporter.http.tls.key_pem", &tls.key_pem)?;
        }
        Ok(())
    }
}

/// X509 key pair in PEM form.
#[derive(Clone, Serialize, Deserialize)]
pub struct TlsKeyPair {
    pub cert_pem: String,
    pub key_pem: String,
}

impl std::fmt::Debug for TlsKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsKeyPair")
            .field("cert_pem", &self.cert_pem)
            .finish_non_exhaustive()
    }
}
