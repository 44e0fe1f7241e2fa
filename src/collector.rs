//! Collection orchestration and metric recording.
//!
//! - [`Collector`]: interval scheduler over accounts and metric categories
//! - [`CategoryCollector`]: one metric category for one account
//! - [`Instruments`]: the registered metric instruments

mod instruments;
mod meter_provider;
mod recorder;
mod scheduler;
mod traits;
mod window;

#[cfg(test)]
pub(crate) mod testing;

pub use instruments::{
    EXPORTER_METER, ExporterMetrics, Instruments, QUERY_HISTORY_METER, QueryHistoryMetrics,
    RUNTIME_METER, RuntimeMetrics, TABLE_HISTORY_METER, TableHistoryMetrics,
};
pub use meter_provider::{SERVICE_NAME, new_meter_provider, resource};
pub use recorder::{
    ACCOUNT_NAME, DATABASE_NAME, ENGINE_NAME, ENGINE_STATUS, QUERY_STATUS, QueryHistoryCollector,
    RuntimeCollector, TABLE_NAME, TableHistoryCollector, USER_NAME,
};
pub use scheduler::{CollectOptions, Collector, CollectorBuilder};
pub use traits::{Category, CategoryCollector, CollectorError};
pub use window::WindowTracker;
