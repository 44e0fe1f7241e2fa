//! Fetcher backed by the Firebolt REST API.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;

use super::model::{
    CollectionWindow, Engine, EngineRuntimePoint, QueryHistoryPoint, TableHistoryPoint,
};
use super::{FetchError, Fetcher, queries};
use crate::firebolt::{FireboltClient, FireboltError};

/// Buffer size of per-category point channels.
pub const POINT_CHANNEL_CAPACITY: usize = 256;

/// Queries Firebolt with one connection per engine.
#[derive(Debug, Clone)]
pub struct FireboltFetcher {
    client: FireboltClient,
    max_concurrency: usize,
}

impl FireboltFetcher {
    /// `max_concurrency` bounds the engines queried at once per category.
    pub fn new(client: FireboltClient, max_concurrency: usize) -> Self {
        Self {
            client,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Run `job` once per engine and stream what the jobs send.
    ///
    /// The receiver closes after every job has finished.
    fn fan_out<T, F, Fut>(
        &self,
        kind: &'static str,
        account: &str,
        engines: &[Engine],
        job: F,
    ) -> mpsc::Receiver<T>
    where
        T: Send + 'static,
        F: Fn(FireboltClient, String, Engine, mpsc::Sender<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), FireboltError>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(POINT_CHANNEL_CAPACITY);
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let client = self.client.clone();
        let account = account.to_string();
        let engines = engines.to_vec();
        let job = Arc::new(job);

        tokio::spawn(async move {
            let mut tasks = JoinSet::new();

            for engine in engines {
                let client = client.clone();
                let account = account.clone();
                let tx = tx.clone();
                let semaphore = Arc::clone(&semaphore);
                let job = Arc::clone(&job);

                tasks.spawn(async move {
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return;
                    };
                    let engine_name = engine.name.clone();
                    if let Err(e) = job(client, account.clone(), engine, tx).await {
                        tracing::error!(
                            kind,
                            account = %account,
                            engine = %engine_name,
                            error = %e,
                            "Failed to fetch engine points"
                        );
                    }
                });
            }

            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    tracing::error!(kind, account = %account, error = %e, "Engine fetch task aborted");
                }
            }
            // `tx` drops here; the channel closes once the last job's clone is gone.
        });

        rx
    }
}

#[async_trait::async_trait]
impl Fetcher for FireboltFetcher {
    async fn fetch_engines(&self, account: &str) -> Result<Vec<Engine>, FetchError> {
        let conn = self.client.connect(account, None).await?;
        let result = conn.query(queries::ENGINES_SQL).await?;

        let mut engines = Vec::with_capacity(result.len());
        for row in result.rows() {
            if let Some(engine) = queries::decode_engine(&row)? {
                engines.push(engine);
            }
        }

        tracing::debug!(account = %account, engines = engines.len(), "Fetched engines");
        Ok(engines)
    }

    fn fetch_runtime_points(
        &self,
        account: &str,
        engines: &[Engine],
        window: CollectionWindow,
    ) -> mpsc::Receiver<EngineRuntimePoint> {
        self.fan_out("runtime", account, engines, move |client, account, engine, tx| {
            fetch_runtime(client, account, engine, window, tx)
        })
    }

    fn fetch_query_history_points(
        &self,
        account: &str,
        engines: &[Engine],
        window: CollectionWindow,
    ) -> mpsc::Receiver<QueryHistoryPoint> {
        self.fan_out(
            "query_history",
            account,
            engines,
            move |client, account, engine, tx| {
                fetch_query_history(client, account, engine, window, tx)
            },
        )
    }

    fn fetch_table_history_points(
        &self,
        account: &str,
        engines: &[Engine],
        database: &str,
    ) -> mpsc::Receiver<TableHistoryPoint> {
        // Table metadata is the same from every engine; ask the first one.
        let first = engines.first().cloned().into_iter().collect::<Vec<_>>();
        let database = database.to_string();
        self.fan_out(
            "table_history",
            account,
            &first,
            move |client, account, engine, tx| {
                fetch_table_history(client, account, engine, database.clone(), tx)
            },
        )
    }
}

async fn fetch_runtime(
    client: FireboltClient,
    account: String,
    engine: Engine,
    window: CollectionWindow,
    tx: mpsc::Sender<EngineRuntimePoint>,
) -> Result<(), FireboltError> {
    let conn = client.connect(&account, Some(&engine.name)).await?;
    let result = conn.query(&queries::runtime_sql(&window)).await?;

    // No snapshot in the window is not an error.
    if let Some(row) = result.first() {
        let point = queries::decode_runtime(&row, &engine)?;
        let _ = tx.send(point).await;
    }
    Ok(())
}

async fn fetch_query_history(
    client: FireboltClient,
    account: String,
    engine: Engine,
    window: CollectionWindow,
    tx: mpsc::Sender<QueryHistoryPoint>,
) -> Result<(), FireboltError> {
    let conn = client.connect(&account, Some(&engine.name)).await?;
    let result = conn.query(&queries::query_history_sql(&window)).await?;

    for row in result.rows() {
        let point = queries::decode_query_history(&row, &engine)?;
        if tx.send(point).await.is_err() {
            break;
        }
    }
    Ok(())
}

async fn fetch_table_history(
    client: FireboltClient,
    account: String,
    engine: Engine,
    database: String,
    tx: mpsc::Sender<TableHistoryPoint>,
) -> Result<(), FireboltError> {
    let conn = client
        .connect(&account, Some(&engine.name))
        .await?
        .with_database(&database);
    let result = conn.query(&queries::table_history_sql(&database)).await?;

    for row in result.rows() {
        if let Some(point) = queries::decode_table_history(&row, &database)?
            && tx.send(point).await.is_err()
        {
            break;
        }
    }
    Ok(())
}
