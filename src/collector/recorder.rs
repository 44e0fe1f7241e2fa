//! Point recording and per-category collectors.
//!
//! Only present fields are recorded. An absent field produces no call on its
//! instrument: no zero, no default.

use std::sync::Arc;

use opentelemetry::KeyValue;

use super::instruments::{ExporterMetrics, QueryHistoryMetrics, RuntimeMetrics, TableHistoryMetrics};
use super::traits::{Category, CategoryCollector};
use crate::fetcher::{
    CollectionWindow, Engine, EngineRuntimePoint, Fetcher, QueryHistoryPoint, TableHistoryPoint,
};

// =============================================================================
// Attribute Keys
// =============================================================================

pub const ACCOUNT_NAME: &str = "firebolt.account.name";
pub const ENGINE_NAME: &str = "firebolt.engine.name";
pub const ENGINE_STATUS: &str = "firebolt.engine.status";
pub const USER_NAME: &str = "firebolt.user.name";
pub const QUERY_STATUS: &str = "firebolt.query.status";
pub const DATABASE_NAME: &str = "firebolt.database.name";
pub const TABLE_NAME: &str = "firebolt.table.name";

fn micros_to_secs(us: i64) -> f64 {
    us as f64 / 1_000_000.0
}

/// Monotonic counters cannot take negative increments.
fn non_negative(value: Option<i64>) -> Option<u64> {
    value.and_then(|v| u64::try_from(v).ok())
}

// =============================================================================
// Recording
// =============================================================================

impl RuntimeMetrics {
    pub fn record(&self, account: &str, point: &EngineRuntimePoint) {
        let attrs = [
            KeyValue::new(ACCOUNT_NAME, account.to_string()),
            KeyValue::new(ENGINE_NAME, point.engine_name.clone()),
            KeyValue::new(ENGINE_STATUS, point.engine_status.clone()),
        ];

        if let Some(v) = point.cpu_used {
            self.cpu_utilization.record(v, &attrs);
        }
        if let Some(v) = point.memory_used {
            self.memory_utilization.record(v, &attrs);
        }
        if let Some(v) = point.disk_used {
            self.disk_utilization.record(v, &attrs);
        }
        if let Some(v) = point.cache_hit_ratio {
            self.cache_hit_ratio.record(v, &attrs);
        }
        if let Some(v) = point.spilled_bytes {
            self.disk_spilled.add(v, &attrs);
        }
        if let Some(v) = point.running_queries {
            self.running_queries.record(v, &attrs);
        }
        if let Some(v) = point.suspended_queries {
            self.suspended_queries.record(v, &attrs);
        }
    }
}

impl QueryHistoryMetrics {
    pub fn record(&self, account: &str, point: &QueryHistoryPoint) {
        let mut attrs = vec![
            KeyValue::new(ACCOUNT_NAME, account.to_string()),
            KeyValue::new(ENGINE_NAME, point.engine_name.clone()),
            KeyValue::new(ENGINE_STATUS, point.engine_status.clone()),
        ];
        if let Some(user) = &point.user_name {
            attrs.push(KeyValue::new(USER_NAME, user.clone()));
        }
        if let Some(status) = &point.status {
            attrs.push(KeyValue::new(QUERY_STATUS, status.clone()));
        }

        if let Some(us) = point.duration_us {
            self.query_duration.record(micros_to_secs(us), &attrs);
        }

        let counters = [
            (&self.scanned_rows, point.scanned_rows),
            (&self.scanned_bytes, point.scanned_bytes),
            (&self.inserted_rows, point.inserted_rows),
            (&self.inserted_bytes, point.inserted_bytes),
            (&self.returned_rows, point.returned_rows),
            (&self.returned_bytes, point.returned_bytes),
            (&self.spilled_bytes, point.spilled_bytes),
        ];
        for (counter, value) in counters {
            if let Some(v) = non_negative(value) {
                counter.add(v, &attrs);
            }
        }

        if let Some(us) = point.time_in_queue_us.filter(|us| *us >= 0) {
            self.queue_time.add(micros_to_secs(us), &attrs);
        }
        if let Some(us) = point.gateway_duration_us {
            self.gateway_duration.record(micros_to_secs(us), &attrs);
        }
    }
}

impl TableHistoryMetrics {
    pub fn record(&self, account: &str, point: &TableHistoryPoint) {
        let attrs = [
            KeyValue::new(ACCOUNT_NAME, account.to_string()),
            KeyValue::new(DATABASE_NAME, point.database_name.clone()),
            KeyValue::new(TABLE_NAME, point.table_name.clone()),
        ];

        if let Some(v) = point.number_of_rows {
            self.rows.record(v, &attrs);
        }
        if let Some(v) = point.compressed_bytes {
            self.compressed_bytes.record(v, &attrs);
        }
        if let Some(v) = point.uncompressed_bytes {
            self.uncompressed_bytes.record(v, &attrs);
        }
        if let Some(v) = point.compression_ratio {
            self.compression_ratio.record(v, &attrs);
        }
        if let Some(v) = point.number_of_tablets {
            self.tablets.record(v, &attrs);
        }
        if let Some(v) = point.fragmentation {
            self.fragmentation.record(v, &attrs);
        }
    }
}

impl ExporterMetrics {
    /// Record one finished collection cycle.
    pub fn record_cycle(&self, elapsed: std::time::Duration) {
        self.duration.add(elapsed.as_secs_f64(), &[]);
        self.cycles.add(1, &[]);
    }
}

// =============================================================================
// Category Collectors
// =============================================================================

/// Engine runtime snapshots.
pub struct RuntimeCollector {
    fetcher: Arc<dyn Fetcher>,
    metrics: RuntimeMetrics,
}

impl RuntimeCollector {
    pub fn new(fetcher: Arc<dyn Fetcher>, metrics: RuntimeMetrics) -> Self {
        Self { fetcher, metrics }
    }
}

#[async_trait::async_trait]
impl CategoryCollector for RuntimeCollector {
    fn category(&self) -> Category {
        Category::Runtime
    }

    async fn collect(&self, account: &str, engines: &[Engine], window: CollectionWindow) -> usize {
        let mut points = self.fetcher.fetch_runtime_points(account, engines, window);
        let mut recorded = 0;
        while let Some(point) = points.recv().await {
            self.metrics.record(account, &point);
            recorded += 1;
        }
        recorded
    }
}

/// Finished queries.
pub struct QueryHistoryCollector {
    fetcher: Arc<dyn Fetcher>,
    metrics: QueryHistoryMetrics,
}

impl QueryHistoryCollector {
    pub fn new(fetcher: Arc<dyn Fetcher>, metrics: QueryHistoryMetrics) -> Self {
        Self { fetcher, metrics }
    }
}

#[async_trait::async_trait]
impl CategoryCollector for QueryHistoryCollector {
    fn category(&self) -> Category {
        Category::QueryHistory
    }

    async fn collect(&self, account: &str, engines: &[Engine], window: CollectionWindow) -> usize {
        let mut points = self.fetcher.fetch_query_history_points(account, engines, window);
        let mut recorded = 0;
        while let Some(point) = points.recv().await {
            self.metrics.record(account, &point);
            recorded += 1;
        }
        recorded
    }
}

/// Table storage snapshots of one database.
pub struct TableHistoryCollector {
    fetcher: Arc<dyn Fetcher>,
    metrics: TableHistoryMetrics,
    database: String,
}

impl TableHistoryCollector {
    pub fn new(fetcher: Arc<dyn Fetcher>, metrics: TableHistoryMetrics, database: String) -> Self {
        Self {
            fetcher,
            metrics,
            database,
        }
    }
}

#[async_trait::async_trait]
impl CategoryCollector for TableHistoryCollector {
    fn category(&self) -> Category {
        Category::TableHistory
    }

    async fn collect(&self, account: &str, engines: &[Engine], _window: CollectionWindow) -> usize {
        if engines.is_empty() {
            return 0;
        }
        let mut points = self
            .fetcher
            .fetch_table_history_points(account, engines, &self.database);
        let mut recorded = 0;
        while let Some(point) = points.recv().await {
            self.metrics.record(account, &point);
            recorded += 1;
        }
        recorded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::Instruments;
    use crate::collector::testing::{MockFetcher, named, observe, provider_with_exporter};
    use chrono::{TimeZone, Utc};

    fn window() -> CollectionWindow {
        CollectionWindow::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 30).unwrap(),
        )
    }

    fn engine() -> Engine {
        Engine::new("eng1", "RUNNING")
    }

    #[tokio::test]
    async fn test_runtime_records_only_present_fields() {
        let (provider, exporter) = provider_with_exporter();
        let instruments = Instruments::new(&provider);
        let fetcher = Arc::new(MockFetcher {
            runtime: vec![EngineRuntimePoint {
                engine_name: "eng1".to_string(),
                engine_status: "RUNNING".to_string(),
                cpu_used: Some(42.5),
                running_queries: Some(3),
                ..Default::default()
            }],
            ..Default::default()
        });

        let collector = RuntimeCollector::new(fetcher, instruments.runtime.clone());
        let recorded = collector.collect("acct", &[engine()], window()).await;
        assert_eq!(recorded, 1);

        let obs = observe(&provider, &exporter);
        let cpu = named(&obs, "firebolt.engine.cpu.utilization");
        assert_eq!(cpu.len(), 1);
        assert_eq!(cpu[0].value, 42.5);
        assert_eq!(cpu[0].attributes[ACCOUNT_NAME], "acct");
        assert_eq!(cpu[0].attributes[ENGINE_NAME], "eng1");
        assert_eq!(cpu[0].attributes[ENGINE_STATUS], "RUNNING");

        assert_eq!(named(&obs, "firebolt.engine.running.queries")[0].value, 3.0);
        for absent in [
            "firebolt.engine.memory.utilization",
            "firebolt.engine.disk.utilization",
            "firebolt.engine.cache.hit_ratio",
            "firebolt.engine.disk.spilled",
            "firebolt.engine.suspended.queries",
        ] {
            assert!(named(&obs, absent).is_empty(), "{absent} must not be recorded");
        }
    }

    #[tokio::test]
    async fn test_query_history_attributes_and_units() {
        let (provider, exporter) = provider_with_exporter();
        let instruments = Instruments::new(&provider);
        let fetcher = Arc::new(MockFetcher {
            query_history: vec![
                QueryHistoryPoint {
                    engine_name: "eng1".to_string(),
                    engine_status: "RUNNING".to_string(),
                    user_name: Some("alice".to_string()),
                    status: Some("ENDED_SUCCESSFULLY".to_string()),
                    duration_us: Some(2_500_000),
                    scanned_rows: Some(100),
                    time_in_queue_us: Some(500_000),
                    ..Default::default()
                },
                QueryHistoryPoint {
                    engine_name: "eng1".to_string(),
                    engine_status: "RUNNING".to_string(),
                    user_name: Some("alice".to_string()),
                    status: Some("ENDED_SUCCESSFULLY".to_string()),
                    scanned_rows: Some(50),
                    returned_rows: Some(-1),
                    ..Default::default()
                },
            ],
            ..Default::default()
        });

        let collector = QueryHistoryCollector::new(fetcher, instruments.query_history.clone());
        assert_eq!(collector.collect("acct", &[engine()], window()).await, 2);

        let obs = observe(&provider, &exporter);
        let duration = named(&obs, "firebolt.query.duration");
        assert_eq!(duration.len(), 1);
        assert_eq!(duration[0].count, Some(1));
        assert_eq!(duration[0].value, 2.5);
        assert_eq!(duration[0].attributes[USER_NAME], "alice");
        assert_eq!(duration[0].attributes[QUERY_STATUS], "ENDED_SUCCESSFULLY");

        assert_eq!(named(&obs, "firebolt.query.scanned.rows")[0].value, 150.0);
        assert_eq!(named(&obs, "firebolt.query.queue.time")[0].value, 0.5);
        assert!(named(&obs, "firebolt.query.returned.rows").is_empty());
        assert!(named(&obs, "firebolt.query.gateway.duration").is_empty());
    }

    #[tokio::test]
    async fn test_query_history_omits_absent_dimensions() {
        let (provider, exporter) = provider_with_exporter();
        let instruments = Instruments::new(&provider);

        instruments.query_history.record(
            "acct",
            &QueryHistoryPoint {
                engine_name: "eng1".to_string(),
                engine_status: "RUNNING".to_string(),
                scanned_bytes: Some(10),
                ..Default::default()
            },
        );

        let obs = observe(&provider, &exporter);
        let scanned = named(&obs, "firebolt.query.scanned.bytes");
        assert_eq!(scanned.len(), 1);
        assert!(!scanned[0].attributes.contains_key(USER_NAME));
        assert!(!scanned[0].attributes.contains_key(QUERY_STATUS));
    }

    #[tokio::test]
    async fn test_table_history_records_per_table() {
        let (provider, exporter) = provider_with_exporter();
        let instruments = Instruments::new(&provider);
        let fetcher = Arc::new(MockFetcher {
            table_history: vec![TableHistoryPoint {
                database_name: "analytics".to_string(),
                table_name: "events".to_string(),
                number_of_rows: Some(1000),
                compression_ratio: Some(3.5),
                ..Default::default()
            }],
            ..Default::default()
        });

        let collector = TableHistoryCollector::new(
            fetcher.clone(),
            instruments.table_history.clone(),
            "analytics".to_string(),
        );
        assert_eq!(collector.collect("acct", &[], window()).await, 0);
        assert_eq!(collector.collect("acct", &[engine()], window()).await, 1);

        let obs = observe(&provider, &exporter);
        let rows = named(&obs, "firebolt.table.rows");
        assert_eq!(rows[0].value, 1000.0);
        assert_eq!(rows[0].attributes[DATABASE_NAME], "analytics");
        assert_eq!(rows[0].attributes[TABLE_NAME], "events");
        assert_eq!(named(&obs, "firebolt.table.compression.ratio")[0].value, 3.5);
        assert!(named(&obs, "firebolt.table.tablets").is_empty());
    }

    #[tokio::test]
    async fn test_empty_stream_finishes() {
        let (provider, _exporter) = provider_with_exporter();
        let instruments = Instruments::new(&provider);
        let collector =
            RuntimeCollector::new(Arc::new(MockFetcher::default()), instruments.runtime.clone());

        assert_eq!(collector.collect("acct", &[engine()], window()).await, 0);
    }
}
