//! Meter provider construction.

use std::time::Duration;

use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::metrics::exporter::PushMetricExporter;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_semantic_conventions::SCHEMA_URL;
use opentelemetry_semantic_conventions::resource::SERVICE_VERSION;

/// `service.name` reported with every export.
pub const SERVICE_NAME: &str = "firebolt-otel-exporter";

/// Resource describing this process.
pub fn resource() -> Resource {
    Resource::builder()
        .with_service_name(SERVICE_NAME)
        .with_schema_url(
            [KeyValue::new(SERVICE_VERSION, crate::VERSION)],
            SCHEMA_URL,
        )
        .build()
}

/// Provider pushing to `exporter` every `interval`.
pub fn new_meter_provider<E>(exporter: E, interval: Duration) -> SdkMeterProvider
where
    E: PushMetricExporter,
{
    let reader = PeriodicReader::builder(exporter)
        .with_interval(interval)
        .build();

    SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(resource())
        .build()
}
