//! Metric instruments, grouped by meter.
//!
//! Instrument names, units and meter names are what backends see; treat them
//! as a stable contract.

use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter, MeterProvider, UpDownCounter};

/// Meter of engine runtime metrics.
pub const RUNTIME_METER: &str = "firebolt.engine.runtime";
/// Meter of query history metrics.
pub const QUERY_HISTORY_METER: &str = "firebolt.engine.query_history";
/// Meter of table storage metrics.
pub const TABLE_HISTORY_METER: &str = "firebolt.table_history";
/// Meter of the exporter's own metrics.
pub const EXPORTER_METER: &str = "firebolt.exporter";

/// Histogram boundaries for durations in seconds.
const DURATION_BOUNDARIES: [f64; 16] = [
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0,
    900.0,
];

/// Engine runtime instruments.
#[derive(Debug, Clone)]
pub struct RuntimeMetrics {
    pub(super) cpu_utilization: Gauge<f64>,
    pub(super) memory_utilization: Gauge<f64>,
    pub(super) disk_utilization: Gauge<f64>,
    pub(super) cache_hit_ratio: Gauge<f64>,
    pub(super) disk_spilled: UpDownCounter<i64>,
    pub(super) running_queries: Gauge<i64>,
    pub(super) suspended_queries: Gauge<i64>,
}

impl RuntimeMetrics {
    pub fn new(meter: &Meter) -> Self {
        Self {
            cpu_utilization: meter
                .f64_gauge("firebolt.engine.cpu.utilization")
                .with_description("Current CPU utilization (percentage)")
                .with_unit("percent")
                .build(),
            memory_utilization: meter
                .f64_gauge("firebolt.engine.memory.utilization")
                .with_description("Current memory used (percentage)")
                .with_unit("percent")
                .build(),
            disk_utilization: meter
                .f64_gauge("firebolt.engine.disk.utilization")
                .with_description(
                    "Currently used disk space, including cache and spilling (percentage)",
                )
                .with_unit("percent")
                .build(),
            cache_hit_ratio: meter
                .f64_gauge("firebolt.engine.cache.hit_ratio")
                .with_description("Current SSD cache hit ratio (percentage)")
                .with_unit("percent")
                .build(),
            disk_spilled: meter
                .i64_up_down_counter("firebolt.engine.disk.spilled")
                .with_description("Amount of data spilled to disk")
                .with_unit("byte")
                .build(),
            running_queries: meter
                .i64_gauge("firebolt.engine.running.queries")
                .with_description("Number of running queries")
                .with_unit("{count}")
                .build(),
            suspended_queries: meter
                .i64_gauge("firebolt.engine.suspended.queries")
                .with_description("Number of suspended queries")
                .with_unit("{count}")
                .build(),
        }
    }
}

/// Query history instruments.
#[derive(Debug, Clone)]
pub struct QueryHistoryMetrics {
    pub(super) query_duration: Histogram<f64>,
    pub(super) scanned_rows: Counter<u64>,
    pub(super) scanned_bytes: Counter<u64>,
    pub(super) inserted_rows: Counter<u64>,
    pub(super) inserted_bytes: Counter<u64>,
    pub(super) returned_rows: Counter<u64>,
    pub(super) returned_bytes: Counter<u64>,
    pub(super) spilled_bytes: Counter<u64>,
    pub(super) queue_time: Counter<f64>,
    pub(super) gateway_duration: Histogram<f64>,
}

impl QueryHistoryMetrics {
    pub fn new(meter: &Meter) -> Self {
        let rows = |name: &'static str, description: &'static str| {
            meter
                .u64_counter(name)
                .with_description(description)
                .with_unit("{row}")
                .build()
        };
        let bytes = |name: &'static str, description: &'static str| {
            meter
                .u64_counter(name)
                .with_description(description)
                .with_unit("bytes")
                .build()
        };

        Self {
            query_duration: meter
                .f64_histogram("firebolt.query.duration")
                .with_description("Duration of query execution")
                .with_unit("second")
                .with_boundaries(DURATION_BOUNDARIES.to_vec())
                .build(),
            scanned_rows: rows("firebolt.query.scanned.rows", "Total number of rows scanned"),
            scanned_bytes: bytes(
                "firebolt.query.scanned.bytes",
                "Total number of bytes scanned (both from cache and storage)",
            ),
            inserted_rows: rows("firebolt.query.insert.rows", "Total number of rows written"),
            inserted_bytes: bytes(
                "firebolt.query.insert.bytes",
                "Total number of bytes written (both to cache and storage)",
            ),
            returned_rows: rows(
                "firebolt.query.returned.rows",
                "Total number of rows returned from the query",
            ),
            returned_bytes: bytes(
                "firebolt.query.returned.bytes",
                "Total number of bytes returned from the query",
            ),
            spilled_bytes: bytes(
                "firebolt.query.spilled.bytes",
                "Total number of bytes spilled (uncompressed)",
            ),
            queue_time: meter
                .f64_counter("firebolt.query.queue.time")
                .with_description("Time the query spent in queue")
                .with_unit("second")
                .build(),
            gateway_duration: meter
                .f64_histogram("firebolt.query.gateway.duration")
                .with_description("End to end time the query spent in the gateway")
                .with_unit("second")
                .with_boundaries(DURATION_BOUNDARIES.to_vec())
                .build(),
        }
    }
}

/// Table storage instruments.
#[derive(Debug, Clone)]
pub struct TableHistoryMetrics {
    pub(super) rows: Gauge<i64>,
    pub(super) compressed_bytes: Gauge<i64>,
    pub(super) uncompressed_bytes: Gauge<i64>,
    pub(super) compression_ratio: Gauge<f64>,
    pub(super) tablets: Gauge<i64>,
    pub(super) fragmentation: Gauge<f64>,
}

impl TableHistoryMetrics {
    pub fn new(meter: &Meter) -> Self {
        Self {
            rows: meter
                .i64_gauge("firebolt.table.rows")
                .with_description("Number of rows in the table")
                .with_unit("{row}")
                .build(),
            compressed_bytes: meter
                .i64_gauge("firebolt.table.compressed.bytes")
                .with_description("Compressed size of the table")
                .with_unit("bytes")
                .build(),
            uncompressed_bytes: meter
                .i64_gauge("firebolt.table.uncompressed.bytes")
                .with_description("Uncompressed size of the table")
                .with_unit("bytes")
                .build(),
            compression_ratio: meter
                .f64_gauge("firebolt.table.compression.ratio")
                .with_description("Ratio of uncompressed to compressed size")
                .build(),
            tablets: meter
                .i64_gauge("firebolt.table.tablets")
                .with_description("Number of tablets of the table")
                .with_unit("{tablet}")
                .build(),
            fragmentation: meter
                .f64_gauge("firebolt.table.fragmentation")
                .with_description("Table fragmentation (percentage)")
                .with_unit("percent")
                .build(),
        }
    }
}

/// The exporter's own instruments.
#[derive(Debug, Clone)]
pub struct ExporterMetrics {
    pub(super) duration: Counter<f64>,
    pub(super) cycles: Counter<u64>,
}

impl ExporterMetrics {
    pub fn new(meter: &Meter) -> Self {
        Self {
            duration: meter
                .f64_counter("firebolt.exporter.duration")
                .with_description("Duration of collection routine of the exporter")
                .with_unit("second")
                .build(),
            cycles: meter
                .u64_counter("firebolt.exporter.cycles")
                .with_description("Number of completed collection cycles")
                .with_unit("{cycle}")
                .build(),
        }
    }
}

/// All instruments, registered against one provider.
#[derive(Debug, Clone)]
pub struct Instruments {
    pub runtime: RuntimeMetrics,
    pub query_history: QueryHistoryMetrics,
    pub table_history: TableHistoryMetrics,
    pub exporter: ExporterMetrics,
}

impl Instruments {
    pub fn new(provider: &impl MeterProvider) -> Self {
        Self {
            runtime: RuntimeMetrics::new(&provider.meter(RUNTIME_METER)),
            query_history: QueryHistoryMetrics::new(&provider.meter(QUERY_HISTORY_METER)),
            table_history: TableHistoryMetrics::new(&provider.meter(TABLE_HISTORY_METER)),
            exporter: ExporterMetrics::new(&provider.meter(EXPORTER_METER)),
        }
    }
}
