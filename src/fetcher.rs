//! Point fetchers.
//!
//! A [`Fetcher`] lists the engines of an account and streams per-category
//! points for a set of engines over a collection window. Each category is
//! produced by querying every engine concurrently; the returned channel closes
//! once all engines are done.

mod firebolt;
mod model;
pub mod queries;

pub use firebolt::{FireboltFetcher, POINT_CHANNEL_CAPACITY};
pub use model::{
    CollectionWindow, Engine, EngineRuntimePoint, QueryHistoryPoint, TableHistoryPoint,
};

use thiserror::Error;
use tokio::sync::mpsc;

use crate::firebolt::FireboltError;

/// Errors surfaced by [`Fetcher::fetch_engines`].
#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Firebolt(#[from] FireboltError),

    #[error("{0}")]
    Other(String),
}

/// Source of engine lists and metric points.
///
/// The `fetch_*_points` methods return immediately; points are pushed as they
/// arrive. A failure on one engine is logged and that engine contributes no
/// points. It never affects other engines.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync + 'static {
    /// Engines of `account` that are up.
    async fn fetch_engines(&self, account: &str) -> Result<Vec<Engine>, FetchError>;

    /// Most recent runtime snapshot per engine within `window`.
    fn fetch_runtime_points(
        &self,
        account: &str,
        engines: &[Engine],
        window: CollectionWindow,
    ) -> mpsc::Receiver<EngineRuntimePoint>;

    /// Queries finished on each engine within `window`.
    fn fetch_query_history_points(
        &self,
        account: &str,
        engines: &[Engine],
        window: CollectionWindow,
    ) -> mpsc::Receiver<QueryHistoryPoint>;

    /// Table storage snapshots of `database`.
    fn fetch_table_history_points(
        &self,
        account: &str,
        engines: &[Engine],
        database: &str,
    ) -> mpsc::Receiver<TableHistoryPoint>;
}
