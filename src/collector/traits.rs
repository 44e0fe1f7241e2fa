//! Category collector seam and collector errors.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

use crate::fetcher::{CollectionWindow, Engine};

/// Errors that can occur while setting up or running the collector.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// Invalid collector setup.
    #[error("config error: {0}")]
    Config(String),

    /// Meter provider shutdown failed.
    #[error("meter provider shutdown failed: {0}")]
    Shutdown(#[from] opentelemetry_sdk::error::OTelSdkError),

    /// Background task failed to complete.
    #[error("task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Kind of telemetry collected per cycle.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Category {
    Runtime,
    QueryHistory,
    TableHistory,
}

/// Collects one category of metrics for one account.
///
/// Implementations pull points from a fetcher and record them. Fetch failures
/// are handled below this layer, so `collect` has no error path; it returns
/// the number of points recorded.
#[async_trait::async_trait]
pub trait CategoryCollector: Send + Sync + 'static {
    /// Category collected by this collector.
    fn category(&self) -> Category;

    /// Collect and record all points of `account` for `engines` in `window`.
    async fn collect(&self, account: &str, engines: &[Engine], window: CollectionWindow) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_category_names() {
        assert_eq!(Category::QueryHistory.to_string(), "query_history");
        assert_eq!(Category::from_str("TABLE_HISTORY").unwrap(), Category::TableHistory);
        assert_eq!(Category::Runtime.as_ref(), "runtime");
    }
}
