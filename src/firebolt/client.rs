//! Firebolt client and connections.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::RwLock;

use super::{FireboltError, QueryResult};
use crate::auth::TokenSource;
use crate::config::{Credentials, FireboltConfig};

/// Audience of Firebolt service account tokens.
pub const FIREBOLT_AUDIENCE: &str = "https://api.firebolt.io";

/// Response header carrying the endpoint to use after `USE ENGINE`.
pub const UPDATE_ENDPOINT_HEADER: &str = "Firebolt-Update-Endpoint";

/// Response header carrying `key=value` pairs to add to later requests.
const UPDATE_PARAMETERS_HEADER: &str = "Firebolt-Update-Parameters";

const OUTPUT_FORMAT: &str = "JSON_Compact";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EngineUrlResponse {
    engine_url: String,
}

/// Shared Firebolt client. Cheap to clone.
#[derive(Debug, Clone)]
pub struct FireboltClient {
    http: reqwest::Client,
    api_endpoint: String,
    auth: Arc<TokenSource>,
    query_label: String,
    engine_urls: Arc<RwLock<HashMap<String, String>>>,
}

impl FireboltClient {
    /// Build a client that logs in with the given service account.
    ///
    /// # Errors
    /// Returns `FireboltError::Http` if the HTTP client cannot be built.
    pub fn new(config: &FireboltConfig, credentials: &Credentials) -> Result<Self, FireboltError> {
        let http = reqwest::Client::builder()
            .timeout(config.query_timeout)
            .user_agent(concat!("firebolt-otel-exporter/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let token_url = format!("{}/oauth/token", config.auth_endpoint.trim_end_matches('/'));
        let auth = TokenSource::new(
            http.clone(),
            token_url,
            &credentials.client_id,
            &credentials.client_secret,
        )
        .with_audience(FIREBOLT_AUDIENCE);

        Ok(Self::with_token_source(
            http,
            &config.api_endpoint,
            Arc::new(auth),
            &config.query_label,
        ))
    }

    /// Build a client around an existing token source.
    pub fn with_token_source(
        http: reqwest::Client,
        api_endpoint: &str,
        auth: Arc<TokenSource>,
        query_label: &str,
    ) -> Self {
        Self {
            http,
            api_endpoint: api_endpoint.trim_end_matches('/').to_string(),
            auth,
            query_label: query_label.to_string(),
            engine_urls: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Resolve the system engine URL of an account. Results are cached.
    pub async fn system_engine_url(&self, account: &str) -> Result<String, FireboltError> {
        if let Some(url) = self.engine_urls.read().await.get(account) {
            return Ok(url.clone());
        }

        let lookup = engine_url_lookup(&self.api_endpoint, account)?;
        let token = self.auth.token().await?;
        let response = self.http.get(lookup).bearer_auth(token).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FireboltError::EngineUrl {
                account: account.to_string(),
                reason: format!("{status}: {}", body.trim()),
            });
        }

        let body: EngineUrlResponse = response.json().await?;
        let url = normalize_endpoint(&body.engine_url);

        tracing::debug!(account = %account, url = %url, "Resolved system engine URL");
        self.engine_urls
            .write()
            .await
            .insert(account.to_string(), url.clone());
        Ok(url)
    }

    /// Open a connection to an account.
    ///
    /// Without an engine the connection targets the system engine. With an
    /// engine, the connection switches to it and tags every statement so that
    /// exporter queries neither wake nor keep the engine alive and are
    /// identifiable in query history.
    pub async fn connect(
        &self,
        account: &str,
        engine: Option<&str>,
    ) -> Result<Connection, FireboltError> {
        let endpoint = self.system_engine_url(account).await?;
        let mut conn = Connection {
            client: self.clone(),
            account: account.to_string(),
            endpoint,
            params: BTreeMap::new(),
        };

        if let Some(engine) = engine {
            conn.set_param("auto_start_stop_control", "ignore");
            conn.use_engine(engine).await?;
            conn.set_param("query_label", &self.query_label);
        }

        Ok(conn)
    }
}

/// `{api}/web/v3/account/{account}/engineUrl`, with the account name encoded
/// as a single path segment.
fn engine_url_lookup(api_endpoint: &str, account: &str) -> Result<reqwest::Url, FireboltError> {
    let invalid = |reason: String| FireboltError::EngineUrl {
        account: account.to_string(),
        reason,
    };
    let mut url = reqwest::Url::parse(api_endpoint).map_err(|e| invalid(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| invalid(format!("{api_endpoint} cannot carry a path")))?
        .pop_if_empty()
        .extend(["web", "v3", "account", account, "engineUrl"]);
    Ok(url)
}

/// Prefix scheme-less hosts with `https://`.
fn normalize_endpoint(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    if url.contains("://") {
        url.to_string()
    } else {
        format!("https://{url}")
    }
}

/// Statement execution context for one account and optional engine.
#[derive(Debug)]
pub struct Connection {
    client: FireboltClient,
    account: String,
    endpoint: String,
    params: BTreeMap<String, String>,
}

impl Connection {
    /// Run subsequent statements in the context of `database`.
    pub fn with_database(mut self, database: &str) -> Self {
        self.set_param("database", database);
        self
    }

    /// Request parameter sent with every statement.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    fn set_param(&mut self, key: &str, value: &str) {
        self.params.insert(key.to_string(), value.to_string());
    }

    /// Execute a statement and decode its result.
    pub async fn query(&self, sql: &str) -> Result<QueryResult, FireboltError> {
        let response = self.send(sql).await?;
        let body = response.text().await?;
        QueryResult::from_body(&body)
    }

    async fn send(&self, sql: &str) -> Result<reqwest::Response, FireboltError> {
        let mut retried = false;
        loop {
            let token = self.client.auth.token().await?;
            let response = self
                .client
                .http
                .post(&self.endpoint)
                .query(&[("output_format", OUTPUT_FORMAT)])
                .query(&self.params)
                .bearer_auth(token)
                .body(sql.to_string())
                .send()
                .await?;

            let status = response.status();
            if status == reqwest::StatusCode::UNAUTHORIZED && !retried {
                // Token revoked or expired server side; retry once with a new one.
                self.client.auth.invalidate();
                retried = true;
                continue;
            }
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(FireboltError::Query {
                    status,
                    message: message.trim().to_string(),
                });
            }
            return Ok(response);
        }
    }

    async fn use_engine(&mut self, engine: &str) -> Result<(), FireboltError> {
        let sql = format!("USE ENGINE \"{}\"", engine.replace('"', "\"\""));
        let response = self.send(&sql).await?;
        let headers = response.headers();

        if let Some(update) = headers
            .get(UPDATE_PARAMETERS_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            for pair in update.split(',') {
                if let Some((key, value)) = pair.split_once('=') {
                    self.set_param(key.trim(), value.trim());
                }
            }
        }

        let Some(endpoint) = headers
            .get(UPDATE_ENDPOINT_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
        else {
            return Err(FireboltError::UseEngine {
                engine: engine.to_string(),
                reason: format!("response has no {UPDATE_ENDPOINT_HEADER} header"),
            });
        };

        self.apply_endpoint(&endpoint)
            .map_err(|reason| FireboltError::UseEngine {
                engine: engine.to_string(),
                reason,
            })?;

        tracing::debug!(
            account = %self.account,
            engine = %engine,
            endpoint = %self.endpoint,
            "Switched to engine"
        );
        Ok(())
    }

    /// Point the connection at `value`; its query string becomes request params.
    fn apply_endpoint(&mut self, value: &str) -> Result<(), String> {
        let mut url = reqwest::Url::parse(&normalize_endpoint(value)).map_err(|e| e.to_string())?;
        for (key, value) in url.query_pairs() {
            self.params.insert(key.into_owned(), value.into_owned());
        }
        url.set_query(None);
        url.set_fragment(None);
        self.endpoint = url.as_str().trim_end_matches('/').to_string();
        Ok(())
    }
}
