//! OTLP/gRPC exporter.

use std::sync::{Arc, Weak};
use std::time::Duration;

use opentelemetry_otlp::{MetricExporter, WithExportConfig, WithTonicConfig};
use tonic::metadata::{Ascii, MetadataValue};
use tonic::service::Interceptor;
use tonic::transport::ClientTlsConfig;

use super::{EXPORT_TIMEOUT, ExporterError, with_scheme};
use crate::auth::TokenSource;
use crate::config::{GrpcExporterConfig, OAuth2Config};

/// Lower bound between token refresh attempts.
const MIN_REFRESH_DELAY: Duration = Duration::from_secs(5);

/// Attaches the current OAuth2 access token to every export call.
#[derive(Clone)]
pub struct BearerInterceptor {
    source: Arc<TokenSource>,
}

impl BearerInterceptor {
    pub fn new(source: Arc<TokenSource>) -> Self {
        Self { source }
    }
}

impl Interceptor for BearerInterceptor {
    fn call(&mut self, mut request: tonic::Request<()>) -> Result<tonic::Request<()>, tonic::Status> {
        let token = self
            .source
            .cached()
            .ok_or_else(|| tonic::Status::unauthenticated("no valid OAuth2 token available"))?;
        let value: MetadataValue<Ascii> = format!("Bearer {token}")
            .parse()
            .map_err(|_| tonic::Status::unauthenticated("OAuth2 token is not valid ASCII"))?;
        request.metadata_mut().insert("authorization", value);
        Ok(request)
    }
}

/// Build the gRPC exporter.
///
/// With OAuth2 configured, the first token is fetched before returning and a
/// background task keeps it fresh for as long as the exporter lives.
pub async fn build(config: &GrpcExporterConfig) -> Result<MetricExporter, ExporterError> {
    let default_scheme = if config.system_cert_pool { "https" } else { "http" };
    let endpoint = with_scheme(&config.address, default_scheme);

    let mut builder = MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint.clone())
        .with_timeout(EXPORT_TIMEOUT);

    if config.system_cert_pool || endpoint.starts_with("https://") {
        builder = builder.with_tls_config(ClientTlsConfig::new().with_native_roots());
    }

    if let Some(oauth2) = &config.oauth2 {
        let source = token_source(oauth2)?;
        source.token().await?;
        spawn_refresher(Arc::downgrade(&source));
        builder = builder.with_interceptor(BearerInterceptor::new(source));
    }

    let exporter = builder.build()?;
    tracing::info!(
        endpoint = %endpoint,
        oauth2 = config.oauth2.is_some(),
        "gRPC metrics exporter configured"
    );
    Ok(exporter)
}

fn token_source(oauth2: &OAuth2Config) -> Result<Arc<TokenSource>, ExporterError> {
    let http = reqwest::Client::builder()
        .timeout(EXPORT_TIMEOUT)
        .build()
        .map_err(|e| ExporterError::HttpClient(e.to_string()))?;
    Ok(Arc::new(TokenSource::new(
        http,
        &oauth2.token_url,
        &oauth2.client_id,
        &oauth2.client_secret,
    )))
}

/// Refresh the token ahead of expiry until the source is dropped.
fn spawn_refresher(source: Weak<TokenSource>) {
    tokio::spawn(async move {
        loop {
            let Some(wait) = source.upgrade().map(|s| s.refresh_in().unwrap_or_default()) else {
                return;
            };
            tokio::time::sleep(wait.max(MIN_REFRESH_DELAY)).await;

            let Some(strong) = source.upgrade() else {
                return;
            };
            if let Err(e) = strong.token().await {
                tracing::warn!(error = %e, "Failed to refresh exporter OAuth2 token");
            }
        }
    });
}
