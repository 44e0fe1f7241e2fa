//! SQL statements and row decoders.

use chrono::{DateTime, Utc};

use super::model::{
    CollectionWindow, Engine, EngineRuntimePoint, QueryHistoryPoint, TableHistoryPoint,
};
use crate::firebolt::{FireboltError, Row};

/// Engines that are up and can be queried. Resizing and draining engines
/// still serve queries and report metrics, so they are polled too.
pub const ENGINES_SQL: &str = "SELECT engine_name, status \
     FROM information_schema.engines \
     WHERE status IN ('RUNNING', 'RESIZING', 'DRAINING') \
     ORDER BY engine_name";

/// Literal form accepted by `TIMESTAMPTZ '...'`.
fn timestamp_literal(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d %H:%M:%S%.6f+00").to_string()
}

fn string_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Latest runtime snapshot in the window.
pub fn runtime_sql(window: &CollectionWindow) -> String {
    format!(
        "SELECT cpu_used, memory_used, disk_used, cache_hit_ratio, spilled_bytes, \
                running_queries, suspended_queries \
         FROM information_schema.engine_metrics_history \
         WHERE event_time >= TIMESTAMPTZ '{}' AND event_time < TIMESTAMPTZ '{}' \
         ORDER BY event_time DESC \
         LIMIT 1",
        timestamp_literal(window.since),
        timestamp_literal(window.till),
    )
}

/// Queries submitted in the window. `STARTED_EXECUTION` rows carry no
/// measurements and are skipped.
pub fn query_history_sql(window: &CollectionWindow) -> String {
    format!(
        "SELECT user_name, duration_us, status, scanned_rows, scanned_bytes, \
                inserted_rows, inserted_bytes, spilled_bytes, returned_rows, returned_bytes, \
                time_in_queue_us, e2e_duration_us \
         FROM information_schema.engine_query_history \
         WHERE status <> 'STARTED_EXECUTION' \
           AND submitted_time >= TIMESTAMPTZ '{}' AND submitted_time < TIMESTAMPTZ '{}' \
         ORDER BY submitted_time",
        timestamp_literal(window.since),
        timestamp_literal(window.till),
    )
}

/// Base tables of a database.
pub fn table_history_sql(database: &str) -> String {
    format!(
        "SELECT table_name, number_of_rows, compressed_bytes, uncompressed_bytes, \
                compression_ratio, number_of_tablets, fragmentation \
         FROM information_schema.tables \
         WHERE table_catalog = {} AND table_type = 'BASE TABLE' \
         ORDER BY table_name",
        string_literal(database),
    )
}

pub fn decode_engine(row: &Row<'_>) -> Result<Option<Engine>, FireboltError> {
    let Some(name) = row.get_str("engine_name")? else {
        return Ok(None);
    };
    let status = row.get_str("status")?.unwrap_or_default();
    Ok(Some(Engine { name, status }))
}

pub fn decode_runtime(row: &Row<'_>, engine: &Engine) -> Result<EngineRuntimePoint, FireboltError> {
    Ok(EngineRuntimePoint {
        engine_name: engine.name.clone(),
        engine_status: engine.status.clone(),
        cpu_used: row.get_f64("cpu_used")?,
        memory_used: row.get_f64("memory_used")?,
        disk_used: row.get_f64("disk_used")?,
        cache_hit_ratio: row.get_f64("cache_hit_ratio")?,
        spilled_bytes: row.get_i64("spilled_bytes")?,
        running_queries: row.get_i64("running_queries")?,
        suspended_queries: row.get_i64("suspended_queries")?,
    })
}

pub fn decode_query_history(
    row: &Row<'_>,
    engine: &Engine,
) -> Result<QueryHistoryPoint, FireboltError> {
    Ok(QueryHistoryPoint {
        engine_name: engine.name.clone(),
        engine_status: engine.status.clone(),
        user_name: row.get_str("user_name")?,
        status: row.get_str("status")?,
        duration_us: row.get_i64("duration_us")?,
        scanned_rows: row.get_i64("scanned_rows")?,
        scanned_bytes: row.get_i64("scanned_bytes")?,
        inserted_rows: row.get_i64("inserted_rows")?,
        inserted_bytes: row.get_i64("inserted_bytes")?,
        spilled_bytes: row.get_i64("spilled_bytes")?,
        returned_rows: row.get_i64("returned_rows")?,
        returned_bytes: row.get_i64("returned_bytes")?,
        time_in_queue_us: row.get_i64("time_in_queue_us")?,
        gateway_duration_us: row.get_i64("e2e_duration_us")?,
    })
}

pub fn decode_table_history(
    row: &Row<'_>,
    database: &str,
) -> Result<Option<TableHistoryPoint>, FireboltError> {
    let Some(table_name) = row.get_str("table_name")? else {
        return Ok(None);
    };
    Ok(Some(TableHistoryPoint {
        database_name: database.to_string(),
        table_name,
        number_of_rows: row.get_i64("number_of_rows")?,
        compressed_bytes: row.get_i64("compressed_bytes")?,
        uncompressed_bytes: row.get_i64("uncompressed_bytes")?,
        compression_ratio: row.get_f64("compression_ratio")?,
        number_of_tablets: row.get_i64("number_of_tablets")?,
        fragmentation: row.get_f64("fragmentation")?,
    }))
}
