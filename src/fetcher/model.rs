//! Point types produced by fetchers.
//!
//! Every measurement field is optional. `None` means the source had no value
//! and the field must not be recorded.

use chrono::{DateTime, Utc};

/// A compute engine within an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Engine {
    pub name: String,
    pub status: String,
}

impl Engine {
    pub fn new(name: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: status.into(),
        }
    }
}

/// Half-open collection interval `[since, till)` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionWindow {
    pub since: DateTime<Utc>,
    pub till: DateTime<Utc>,
}

impl CollectionWindow {
    pub fn new(since: DateTime<Utc>, till: DateTime<Utc>) -> Self {
        Self { since, till }
    }
}

/// Most recent runtime snapshot of one engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineRuntimePoint {
    pub engine_name: String,
    pub engine_status: String,

    pub cpu_used: Option<f64>,
    pub memory_used: Option<f64>,
    pub disk_used: Option<f64>,
    pub cache_hit_ratio: Option<f64>,
    pub spilled_bytes: Option<i64>,
    pub running_queries: Option<i64>,
    pub suspended_queries: Option<i64>,
}

/// One finished (or failed) query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryHistoryPoint {
    pub engine_name: String,
    pub engine_status: String,

    pub user_name: Option<String>,
    pub status: Option<String>,

    pub duration_us: Option<i64>,
    pub scanned_rows: Option<i64>,
    pub scanned_bytes: Option<i64>,
    pub inserted_rows: Option<i64>,
    pub inserted_bytes: Option<i64>,
    pub spilled_bytes: Option<i64>,
    pub returned_rows: Option<i64>,
    pub returned_bytes: Option<i64>,
    pub time_in_queue_us: Option<i64>,
    pub gateway_duration_us: Option<i64>,
}

/// Storage snapshot of one table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableHistoryPoint {
    pub database_name: String,
    pub table_name: String,

    pub number_of_rows: Option<i64>,
    pub compressed_bytes: Option<i64>,
    pub uncompressed_bytes: Option<i64>,
    pub compression_ratio: Option<f64>,
    pub number_of_tablets: Option<i64>,
    pub fragmentation: Option<f64>,
}
