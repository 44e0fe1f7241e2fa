//! Collection scheduler.
//!
//! One cycle per tick. Each cycle closes the current window, walks the
//! accounts in order, and for every account runs all category collectors in
//! parallel, waiting for them before moving on. Cancellation is observed
//! between cycles only; a started cycle always runs to completion.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::metrics::exporter::PushMetricExporter;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::instruments::Instruments;
use super::meter_provider::new_meter_provider;
use super::recorder::{QueryHistoryCollector, RuntimeCollector, TableHistoryCollector};
use super::traits::{CategoryCollector, CollectorError};
use super::window::WindowTracker;
use crate::config::DEFAULT_EXPORT_INTERVAL;
use crate::fetcher::{Engine, Fetcher};

/// Per-run options.
#[derive(Debug, Clone, Default)]
pub struct CollectOptions {
    /// Database whose tables are observed. Table history is skipped when unset.
    pub table_history_database: Option<String>,
}

/// Builder for [`Collector`].
pub struct CollectorBuilder {
    fetcher: Arc<dyn Fetcher>,
    accounts: Vec<String>,
    export_interval: Duration,
    start_time: Option<DateTime<Utc>>,
}

impl CollectorBuilder {
    pub fn new(fetcher: Arc<dyn Fetcher>, accounts: Vec<String>) -> Self {
        Self {
            fetcher,
            accounts,
            export_interval: DEFAULT_EXPORT_INTERVAL,
            start_time: None,
        }
    }

    /// How often the periodic reader pushes to the exporter (default: 15s).
    pub fn export_interval(mut self, interval: Duration) -> Self {
        self.export_interval = interval;
        self
    }

    /// Start of the first window (default: time of `build`).
    pub fn start_time(mut self, start: DateTime<Utc>) -> Self {
        self.start_time = Some(start);
        self
    }

    /// Build a collector exporting through `exporter`.
    ///
    /// # Errors
    /// Returns `CollectorError::Config` for an empty account list or a zero
    /// export interval.
    pub fn build<E>(self, exporter: E) -> Result<Collector, CollectorError>
    where
        E: PushMetricExporter,
    {
        if self.export_interval.is_zero() {
            return Err(CollectorError::Config(
                "export interval must be non-zero".to_string(),
            ));
        }
        let provider = new_meter_provider(exporter, self.export_interval);
        self.build_with_provider(provider)
    }

    /// Build a collector recording into an existing provider.
    pub fn build_with_provider(
        self,
        provider: SdkMeterProvider,
    ) -> Result<Collector, CollectorError> {
        if self.accounts.is_empty() {
            return Err(CollectorError::Config(
                "at least one account must be provided".to_string(),
            ));
        }

        let instruments = Instruments::new(&provider);
        Ok(Collector {
            fetcher: self.fetcher,
            accounts: self.accounts,
            windows: Mutex::new(WindowTracker::new(self.start_time.unwrap_or_else(Utc::now))),
            provider,
            instruments,
        })
    }
}

/// Drives periodic collection for a fixed list of accounts.
pub struct Collector {
    fetcher: Arc<dyn Fetcher>,
    accounts: Vec<String>,
    /// Survives restarts so a second `start` continues where the first stopped.
    windows: Mutex<WindowTracker>,
    provider: SdkMeterProvider,
    instruments: Instruments,
}

impl std::fmt::Debug for Collector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collector")
            .field("accounts", &self.accounts)
            .field("windows", &self.windows)
            .finish_non_exhaustive()
    }
}

impl Collector {
    pub fn builder(fetcher: Arc<dyn Fetcher>, accounts: Vec<String>) -> CollectorBuilder {
        CollectorBuilder::new(fetcher, accounts)
    }

    pub fn accounts(&self) -> &[String] {
        &self.accounts
    }

    pub fn meter_provider(&self) -> &SdkMeterProvider {
        &self.provider
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// The first cycle starts immediately. Returns `Ok(())` on cancellation.
    /// A later call resumes from the end of the last collected window; calls
    /// on the same collector never run concurrently.
    ///
    /// # Errors
    /// Returns `CollectorError::Config` if `interval` is zero.
    pub async fn start(
        &self,
        shutdown: CancellationToken,
        interval: Duration,
        options: CollectOptions,
    ) -> Result<(), CollectorError> {
        if interval.is_zero() {
            return Err(CollectorError::Config(
                "collect interval must be non-zero".to_string(),
            ));
        }

        let collectors = self.category_collectors(&options);
        let mut tracker = self.windows.lock().await;
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        tracing::info!(
            accounts = self.accounts.len(),
            interval = %humantime::format_duration(interval),
            categories = collectors.len(),
            since = %tracker.last_end(),
            "Collector started"
        );

        loop {
            self.run_cycle(&mut tracker, &collectors).await;

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    tracing::info!("Collector stopped");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }
        }
    }

    fn category_collectors(&self, options: &CollectOptions) -> Vec<Arc<dyn CategoryCollector>> {
        let mut collectors: Vec<Arc<dyn CategoryCollector>> = vec![
            Arc::new(RuntimeCollector::new(
                Arc::clone(&self.fetcher),
                self.instruments.runtime.clone(),
            )),
            Arc::new(QueryHistoryCollector::new(
                Arc::clone(&self.fetcher),
                self.instruments.query_history.clone(),
            )),
        ];

        if let Some(database) = &options.table_history_database {
            collectors.push(Arc::new(TableHistoryCollector::new(
                Arc::clone(&self.fetcher),
                self.instruments.table_history.clone(),
                database.clone(),
            )));
        }

        collectors
    }

    async fn run_cycle(
        &self,
        tracker: &mut WindowTracker,
        collectors: &[Arc<dyn CategoryCollector>],
    ) {
        let started = Instant::now();
        // Advance before any I/O: a slow cycle shortens the next window
        // instead of re-reading this one.
        let window = tracker.advance(Utc::now());

        tracing::debug!(since = %window.since, till = %window.till, "Collection cycle started");

        for account in &self.accounts {
            let engines = match self.fetcher.fetch_engines(account).await {
                Ok(engines) => engines,
                Err(e) => {
                    tracing::error!(account = %account, error = %e, "Failed to fetch engines");
                    continue;
                }
            };
            let engines: Arc<[Engine]> = engines.into();

            let mut tasks = JoinSet::new();
            for collector in collectors {
                let collector = Arc::clone(collector);
                let account = account.clone();
                let engines = Arc::clone(&engines);
                tasks.spawn(async move {
                    let recorded = collector.collect(&account, &engines, window).await;
                    (collector.category(), recorded)
                });
            }

            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((category, recorded)) => {
                        tracing::debug!(
                            account = %account,
                            category = %category,
                            engines = engines.len(),
                            points = recorded,
                            "Category collected"
                        );
                    }
                    Err(e) => {
                        tracing::error!(account = %account, error = %e, "Category collector task failed");
                    }
                }
            }
        }

        let elapsed = started.elapsed();
        self.instruments.exporter.record_cycle(elapsed);
        tracing::debug!(seconds = elapsed.as_secs_f64(), "Collection cycle finished");
    }

    /// Flush outstanding metrics and shut the provider down.
    pub async fn close(&self) -> Result<(), CollectorError> {
        let provider = self.provider.clone();
        tokio::task::spawn_blocking(move || provider.shutdown()).await??;
        tracing::info!("Meter provider shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::testing::{
        Call, MockFetcher, named, observe, provider_with_exporter,
    };
    use crate::fetcher::{CollectionWindow, EngineRuntimePoint};
    use std::collections::HashMap;

    fn engines(names: &[&str]) -> Vec<Engine> {
        names.iter().map(|n| Engine::new(*n, "RUNNING")).collect()
    }

    fn runtime_windows(calls: &[Call]) -> Vec<CollectionWindow> {
        calls
            .iter()
            .filter_map(|c| match c {
                Call::Runtime(_, w) => Some(*w),
                _ => None,
            })
            .collect()
    }

    async fn run_for(collector: &Collector, interval: Duration, ticks: u32, options: CollectOptions) {
        let shutdown = CancellationToken::new();
        let cancel = shutdown.clone();
        let stop_after = interval * ticks + interval / 2;
        tokio::spawn(async move {
            tokio::time::sleep(stop_after).await;
            cancel.cancel();
        });
        collector.start(shutdown, interval, options).await.unwrap();
    }

    #[tokio::test]
    async fn test_windows_are_contiguous() {
        let fetcher = Arc::new(MockFetcher {
            engines: HashMap::from([("acct".to_string(), engines(&["e1"]))]),
            ..Default::default()
        });
        let (provider, _exporter) = provider_with_exporter();
        let start = Utc::now();
        let collector = Collector::builder(fetcher.clone(), vec!["acct".to_string()])
            .start_time(start)
            .build_with_provider(provider)
            .unwrap();

        run_for(&collector, Duration::from_millis(40), 3, CollectOptions::default()).await;

        let windows = runtime_windows(&fetcher.calls());
        assert!(windows.len() >= 3, "expected at least 3 cycles, got {}", windows.len());
        assert_eq!(windows[0].since, start);
        for pair in windows.windows(2) {
            assert_eq!(pair[0].till, pair[1].since);
        }
        for w in &windows {
            assert!(w.since <= w.till);
        }
    }

    #[tokio::test]
    async fn test_failed_account_is_skipped() {
        let fetcher = Arc::new(MockFetcher {
            engines: HashMap::from([
                ("good1".to_string(), engines(&["e1"])),
                ("good2".to_string(), engines(&["e2"])),
            ]),
            failing_accounts: vec!["bad".to_string()],
            ..Default::default()
        });
        let (provider, _exporter) = provider_with_exporter();
        let accounts = vec!["good1".to_string(), "bad".to_string(), "good2".to_string()];
        let collector = Collector::builder(fetcher.clone(), accounts)
            .build_with_provider(provider)
            .unwrap();

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        collector
            .start(shutdown, Duration::from_secs(60), CollectOptions::default())
            .await
            .unwrap();

        let calls = fetcher.calls();
        let engine_calls: Vec<_> = calls
            .iter()
            .filter_map(|c| match c {
                Call::Engines(a) => Some(a.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(engine_calls, vec!["good1", "bad", "good2"]);

        let touched = |account: &str| {
            calls.iter().any(|c| {
                matches!(c, Call::Runtime(a, _) | Call::QueryHistory(a, _) if a == account)
            })
        };
        assert!(touched("good1"));
        assert!(!touched("bad"));
        assert!(touched("good2"));
    }

    #[tokio::test]
    async fn test_cycle_recorded_once_per_tick() {
        let fetcher = Arc::new(MockFetcher {
            failing_accounts: vec!["acct".to_string()],
            ..Default::default()
        });
        let (provider, exporter) = provider_with_exporter();
        let collector = Collector::builder(fetcher.clone(), vec!["acct".to_string()])
            .build_with_provider(provider.clone())
            .unwrap();

        run_for(&collector, Duration::from_millis(40), 2, CollectOptions::default()).await;

        let cycles_run = fetcher
            .calls()
            .iter()
            .filter(|c| matches!(c, Call::Engines(_)))
            .count();
        let obs = observe(&provider, &exporter);
        let cycles = named(&obs, "firebolt.exporter.cycles");
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].value as usize, cycles_run);
        assert_eq!(named(&obs, "firebolt.exporter.duration").len(), 1);
    }

    #[tokio::test]
    async fn test_table_history_runs_only_when_enabled() {
        let fetcher = Arc::new(MockFetcher {
            engines: HashMap::from([("acct".to_string(), engines(&["e1"]))]),
            runtime: vec![EngineRuntimePoint {
                engine_name: "e1".to_string(),
                cpu_used: Some(1.0),
                ..Default::default()
            }],
            ..Default::default()
        });
        let (provider, _exporter) = provider_with_exporter();
        let collector = Collector::builder(fetcher.clone(), vec!["acct".to_string()])
            .build_with_provider(provider)
            .unwrap();

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        collector
            .start(shutdown.clone(), Duration::from_secs(60), CollectOptions::default())
            .await
            .unwrap();
        assert!(!fetcher.calls().iter().any(|c| matches!(c, Call::TableHistory(..))));

        let options = CollectOptions {
            table_history_database: Some("analytics".to_string()),
        };
        collector
            .start(shutdown, Duration::from_secs(60), options)
            .await
            .unwrap();
        assert!(fetcher
            .calls()
            .contains(&Call::TableHistory("acct".to_string(), "analytics".to_string())));
    }

    #[tokio::test]
    async fn test_restart_resumes_from_last_window() {
        let fetcher = Arc::new(MockFetcher {
            engines: HashMap::from([("acct".to_string(), engines(&["e1"]))]),
            ..Default::default()
        });
        let (provider, _exporter) = provider_with_exporter();
        let start = Utc::now();
        let collector = Collector::builder(fetcher.clone(), vec!["acct".to_string()])
            .start_time(start)
            .build_with_provider(provider)
            .unwrap();

        for _ in 0..2 {
            let shutdown = CancellationToken::new();
            shutdown.cancel();
            collector
                .start(shutdown, Duration::from_secs(60), CollectOptions::default())
                .await
                .unwrap();
        }

        let windows = runtime_windows(&fetcher.calls());
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].since, start);
        assert_eq!(windows[0].till, windows[1].since);
        assert!(windows[1].since <= windows[1].till);
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let (provider, _exporter) = provider_with_exporter();
        let collector = Collector::builder(Arc::new(MockFetcher::default()), vec!["a".to_string()])
            .build_with_provider(provider)
            .unwrap();

        let result = collector
            .start(CancellationToken::new(), Duration::ZERO, CollectOptions::default())
            .await;
        assert!(matches!(result, Err(CollectorError::Config(_))));
    }

    #[test]
    fn test_builder_requires_accounts() {
        let (provider, _exporter) = provider_with_exporter();
        let result = Collector::builder(Arc::new(MockFetcher::default()), vec![])
            .build_with_provider(provider);
        assert!(matches!(result, Err(CollectorError::Config(_))));
    }
}
