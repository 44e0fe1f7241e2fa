//! Test doubles shared by collector tests.

use std::collections::HashMap;
use std::sync::Mutex;

use opentelemetry_sdk::metrics::data::{AggregatedMetrics, MetricData};
use opentelemetry_sdk::metrics::{InMemoryMetricExporter, SdkMeterProvider};
use tokio::sync::mpsc;

use crate::fetcher::{
    CollectionWindow, Engine, EngineRuntimePoint, FetchError, Fetcher, QueryHistoryPoint,
    TableHistoryPoint,
};

/// Scripted fetcher that records how it was called.
#[derive(Default)]
pub(crate) struct MockFetcher {
    pub engines: HashMap<String, Vec<Engine>>,
    pub failing_accounts: Vec<String>,
    pub runtime: Vec<EngineRuntimePoint>,
    pub query_history: Vec<QueryHistoryPoint>,
    pub table_history: Vec<TableHistoryPoint>,
    pub calls: Mutex<Vec<Call>>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Engines(String),
    Runtime(String, CollectionWindow),
    QueryHistory(String, CollectionWindow),
    TableHistory(String, String),
}

impl MockFetcher {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn log(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn stream<T: Clone + Send + 'static>(
        points: &[T],
        engines: &[Engine],
        pick: fn(&T) -> &str,
    ) -> mpsc::Receiver<T> {
        let (tx, rx) = mpsc::channel(points.len().max(1));
        for p in points {
            if engines.iter().any(|e| e.name == pick(p)) {
                tx.try_send(p.clone()).unwrap();
            }
        }
        rx
    }
}

#[async_trait::async_trait]
impl Fetcher for MockFetcher {
    async fn fetch_engines(&self, account: &str) -> Result<Vec<Engine>, FetchError> {
        self.log(Call::Engines(account.to_string()));
        if self.failing_accounts.iter().any(|a| a == account) {
            return Err(FetchError::Other(format!("account {account} unavailable")));
        }
        Ok(self.engines.get(account).cloned().unwrap_or_default())
    }

    fn fetch_runtime_points(
        &self,
        account: &str,
        engines: &[Engine],
        window: CollectionWindow,
    ) -> mpsc::Receiver<EngineRuntimePoint> {
        self.log(Call::Runtime(account.to_string(), window));
        Self::stream(&self.runtime, engines, |p| p.engine_name.as_str())
    }

    fn fetch_query_history_points(
        &self,
        account: &str,
        engines: &[Engine],
        window: CollectionWindow,
    ) -> mpsc::Receiver<QueryHistoryPoint> {
        self.log(Call::QueryHistory(account.to_string(), window));
        Self::stream(&self.query_history, engines, |p| p.engine_name.as_str())
    }

    fn fetch_table_history_points(
        &self,
        account: &str,
        _engines: &[Engine],
        database: &str,
    ) -> mpsc::Receiver<TableHistoryPoint> {
        self.log(Call::TableHistory(account.to_string(), database.to_string()));
        let (tx, rx) = mpsc::channel(self.table_history.len().max(1));
        for p in &self.table_history {
            tx.try_send(p.clone()).unwrap();
        }
        rx
    }
}

/// One exported data point, flattened.
#[derive(Debug, Clone)]
pub(crate) struct Observation {
    pub name: String,
    pub value: f64,
    pub count: Option<u64>,
    pub attributes: HashMap<String, String>,
}

pub(crate) fn provider_with_exporter() -> (SdkMeterProvider, InMemoryMetricExporter) {
    let exporter = InMemoryMetricExporter::default();
    let provider = crate::collector::new_meter_provider(
        exporter.clone(),
        std::time::Duration::from_secs(3600),
    );
    (provider, exporter)
}

/// Flush and return the data points of the latest export.
pub(crate) fn observe(
    provider: &SdkMeterProvider,
    exporter: &InMemoryMetricExporter,
) -> Vec<Observation> {
    provider.force_flush().unwrap();
    let batches = exporter.get_finished_metrics().unwrap();
    let Some(latest) = batches.last() else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for scope in latest.scope_metrics() {
        for metric in scope.metrics() {
            let name = metric.name().to_string();
            let mut push = |value: f64, count: Option<u64>, attrs: HashMap<String, String>| {
                out.push(Observation {
                    name: name.clone(),
                    value,
                    count,
                    attributes: attrs,
                })
            };
            let attrs = |kvs: &mut dyn Iterator<Item = &opentelemetry::KeyValue>| {
                kvs.map(|kv| (kv.key.as_str().to_string(), kv.value.as_str().into_owned()))
                    .collect::<HashMap<_, _>>()
            };

            match metric.data() {
                AggregatedMetrics::F64(MetricData::Gauge(g)) => {
                    for dp in g.data_points() {
                        push(dp.value(), None, attrs(&mut dp.attributes()));
                    }
                }
                AggregatedMetrics::I64(MetricData::Gauge(g)) => {
                    for dp in g.data_points() {
                        push(dp.value() as f64, None, attrs(&mut dp.attributes()));
                    }
                }
                AggregatedMetrics::F64(MetricData::Sum(s)) => {
                    for dp in s.data_points() {
                        push(dp.value(), None, attrs(&mut dp.attributes()));
                    }
                }
                AggregatedMetrics::I64(MetricData::Sum(s)) => {
                    for dp in s.data_points() {
                        push(dp.value() as f64, None, attrs(&mut dp.attributes()));
                    }
                }
                AggregatedMetrics::U64(MetricData::Sum(s)) => {
                    for dp in s.data_points() {
                        push(dp.value() as f64, None, attrs(&mut dp.attributes()));
                    }
                }
                AggregatedMetrics::F64(MetricData::Histogram(h)) => {
                    for dp in h.data_points() {
                        push(dp.sum(), Some(dp.count()), attrs(&mut dp.attributes()));
                    }
                }
                _ => {}
            }
        }
    }
    out
}

pub(crate) fn named<'a>(observations: &'a [Observation], name: &str) -> Vec<&'a Observation> {
    observations.iter().filter(|o| o.name == name).collect()
}
