//! Top-level exporter settings: accounts, credentials, intervals and Firebolt access.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::exporter::ExporterConfig;
use super::validation::{
    ConfigError, expand_env_vars, require_min_duration, require_non_blank,
};
use crate::logging::LoggingConfig;

// =============================================================================
// Constants
// =============================================================================

/// Default collection interval (30 seconds).
pub const DEFAULT_COLLECT_INTERVAL: Duration = Duration::from_secs(30);

/// Minimum allowed collection interval (15 seconds).
pub const MIN_COLLECT_INTERVAL: Duration = Duration::from_secs(15);

/// Default metrics export interval (15 seconds).
pub const DEFAULT_EXPORT_INTERVAL: Duration = Duration::from_secs(15);

/// Minimum allowed export interval (1 second).
pub const MIN_EXPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Default Firebolt API endpoint.
pub const DEFAULT_API_ENDPOINT: &str = "https://api.app.firebolt.io";

/// Default Firebolt identity endpoint.
pub const DEFAULT_AUTH_ENDPOINT: &str = "https://id.app.firebolt.io";

/// Default per-request query timeout (60 seconds).
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(60);

/// Default number of engines queried concurrently per metric category.
pub const DEFAULT_MAX_ENGINE_CONCURRENCY: usize = 16;

/// Default query label attached to exporter queries.
pub const DEFAULT_QUERY_LABEL: &str = "otel-exporter";

fn default_collect_interval() -> Duration {
    DEFAULT_COLLECT_INTERVAL
}

fn default_export_interval() -> Duration {
    DEFAULT_EXPORT_INTERVAL
}

fn default_query_timeout() -> Duration {
    DEFAULT_QUERY_TIMEOUT
}

// =============================================================================
// Credentials
// =============================================================================

/// Firebolt service account credentials used to run queries.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Firebolt Connection
// =============================================================================

/// Firebolt API connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FireboltConfig {
    /// REST API endpoint used for system engine discovery.
    pub api_endpoint: String,

    /// Identity endpoint issuing service account tokens.
    pub auth_endpoint: String,

    /// Timeout of a single HTTP request (default: 60s).
    #[serde(with = "humantime_serde")]
    pub query_timeout: Duration,

    /// Maximum number of engines queried at once per metric category (default: 16).
    pub max_engine_concurrency: usize,

    /// Label attached to every exporter query in the engine query history.
    pub query_label: String,
}

impl Default for FireboltConfig {
    fn default() -> Self {
        Self {
            api_endpoint: DEFAULT_API_ENDPOINT.to_string(),
            auth_endpoint: DEFAULT_AUTH_ENDPOINT.to_string(),
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            max_engine_concurrency: DEFAULT_MAX_ENGINE_CONCURRENCY,
            query_label: DEFAULT_QUERY_LABEL.to_string(),
        }
    }
}

/// Table storage metrics settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableHistoryConfig {
    /// Database whose tables are observed.
    pub database: String,
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Accounts observed by the collector, processed in this order.
    #[serde(default)]
    pub accounts: Vec<String>,

    /// Service account credentials.
    #[serde(default)]
    pub credentials: Credentials,

    /// How often metrics are collected from Firebolt (default: 30s, minimum: 15s).
    #[serde(default = "default_collect_interval", with = "humantime_serde")]
    pub collect_interval: Duration,

    /// How often recorded metrics are pushed to the backend (default: 15s).
    #[serde(default = "default_export_interval", with = "humantime_serde")]
    pub export_interval: Duration,

    /// Optional table storage metrics.
    #[serde(default)]
    pub table_history: Option<TableHistoryConfig>,

    /// Firebolt API settings.
    #[serde(default)]
    pub firebolt: FireboltConfig,

    /// Metrics exporter transport.
    #[serde(default)]
    pub exporter: ExporterConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// `${VAR}` and `${VAR:-default}` references are expanded from the
    /// environment before parsing. The result is not validated, so that CLI
    /// overrides can be applied first.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text, expanding environment references.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(content);
        Ok(serde_yaml::from_str(&expanded)?)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.accounts.is_empty() {
            return Err(ConfigError::invalid("at least one account must be provided"));
        }

        let mut seen = HashSet::new();
        for account in &self.accounts {
            require_non_blank("accounts[]", account)?;
            if !seen.insert(account.as_str()) {
                return Err(ConfigError::invalid(format!(
                    "duplicate account name: '{account}'"
                )));
            }
        }

        require_non_blank("credentials.client_id", &self.credentials.client_id)?;
        require_non_blank("credentials.client_secret", &self.credentials.client_secret)?;

        require_min_duration("collect_interval", self.collect_interval, MIN_COLLECT_INTERVAL)?;
        require_min_duration("export_interval", self.export_interval, MIN_EXPORT_INTERVAL)?;

        if let Some(table_history) = &self.table_history {
            require_non_blank("table_history.database", &table_history.database)?;
        }

        require_non_blank("firebolt.api_endpoint", &self.firebolt.api_endpoint)?;
        require_non_blank("firebolt.auth_endpoint", &self.firebolt.auth_endpoint)?;
        if self.firebolt.max_engine_concurrency == 0 {
            return Err(ConfigError::invalid(
                "firebolt.max_engine_concurrency must be positive",
            ));
        }
        if self.firebolt.query_timeout.is_zero() {
            return Err(ConfigError::invalid(
                "firebolt.query_timeout must be non-zero",
            ));
        }

        self.exporter.validate()?;

        Ok(())
    }

    /// Database observed by the table-history category, if enabled.
    pub fn table_history_database(&self) -> Option<&str> {
        self.table_history.as_ref().map(|t| t.database.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GrpcExporterConfig;
    use crate::logging::{LogFormat, LogLevel};

    fn valid_config() -> AppConfig {
        AppConfig {
            accounts: vec!["acct1".to_string(), "acct2".to_string()],
            credentials: Credentials {
                client_id: "client".to_string(),
                client_secret: "secret".to_string(),
            },
            collect_interval: DEFAULT_COLLECT_INTERVAL,
            export_interval: DEFAULT_EXPORT_INTERVAL,
            table_history: None,
            firebolt: FireboltConfig::default(),
            exporter: ExporterConfig {
                grpc: Some(GrpcExporterConfig {
                    address: "127.0.0.1:4317".to_string(),
                    oauth2: None,
                    system_cert_pool: false,
                }),
                http: None,
            },
            logging: LoggingConfig::default(),
        }
    }

    #[test]
    fn test_firebolt_config_default() {
        let config = FireboltConfig::default();
        assert_eq!(config.api_endpoint, DEFAULT_API_ENDPOINT);
        assert_eq!(config.auth_endpoint, DEFAULT_AUTH_ENDPOINT);
        assert_eq!(config.query_timeout, DEFAULT_QUERY_TIMEOUT);
        assert_eq!(config.max_engine_concurrency, DEFAULT_MAX_ENGINE_CONCURRENCY);
        assert_eq!(config.query_label, "otel-exporter");
    }

    #[test]
    fn test_config_validation_valid() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_config_validation_missing_accounts() {
        let config = AppConfig {
            accounts: vec![],
            ..valid_config()
        };
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("at least one account"));
    }

    #[test]
    fn test_config_validation_duplicate_accounts() {
        let config = AppConfig {
            accounts: vec!["acct".to_string(), "acct".to_string()],
            ..valid_config()
        };
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("duplicate account name: 'acct'"));
    }

    #[test]
    fn test_config_validation_missing_credentials() {
        let config = AppConfig {
            credentials: Credentials::default(),
            ..valid_config()
        };
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("credentials.client_id"));
    }

    #[test]
    fn test_config_validation_collect_interval_floor() {
        let config = AppConfig {
            collect_interval: Duration::from_secs(10),
            ..valid_config()
        };
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("collect_interval must be at least 15s"));
    }

    #[test]
    fn test_config_validation_missing_exporter() {
        let config = AppConfig {
            exporter: ExporterConfig::default(),
            ..valid_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_concurrency() {
        let mut config = valid_config();
        config.firebolt.max_engine_concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_yaml_defaults() {
        let yaml = r#"
accounts: [acct]
credentials:
  client_id: id
  client_secret: secret
exporter:
  http:
    address: 127.0.0.1:4318
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        config.validate().unwrap();

        assert_eq!(config.collect_interval, DEFAULT_COLLECT_INTERVAL);
        assert_eq!(config.export_interval, DEFAULT_EXPORT_INTERVAL);
        assert!(config.table_history_database().is_none());
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, LogLevel::Info);
        assert!(config.exporter.grpc.is_none());
        assert_eq!(config.exporter.http.unwrap().address, "127.0.0.1:4318");
    }

    #[test]
    fn test_config_from_yaml_overrides() {
        let yaml = r#"
accounts: [acct1, acct2]
credentials:
  client_id: id
  client_secret: ${FIREBOLT_TEST_MISSING_SECRET:-from-default}
collect_interval: 1m
export_interval: 20s
table_history:
  database: analytics
firebolt:
  max_engine_concurrency: 4
  query_timeout: 5s
exporter:
  grpc:
    address: collector:4317
    system_cert_pool: true
logging:
  format: text
  level: debug
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        config.validate().unwrap();

        assert_eq!(config.accounts, vec!["acct1", "acct2"]);
        assert_eq!(config.credentials.client_secret, "from-default");
        assert_eq!(config.collect_interval, Duration::from_secs(60));
        assert_eq!(config.export_interval, Duration::from_secs(20));
        assert_eq!(config.table_history_database(), Some("analytics"));
        assert_eq!(config.firebolt.max_engine_concurrency, 4);
        assert_eq!(config.firebolt.query_timeout, Duration::from_secs(5));
        assert_eq!(config.firebolt.api_endpoint, DEFAULT_API_ENDPOINT);
        assert!(config.exporter.grpc.unwrap().system_cert_pool);
        assert_eq!(config.logging.level, LogLevel::Debug);
    }

    #[test]
    fn test_config_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "accounts: [acct]\ncredentials: {client_id: a, client_secret: b}\nexporter: {http: {address: 'localhost:4318'}}\n",
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_load_missing_file() {
        let result = AppConfig::load("/nonexistent/firebolt-otel-exporter.yaml");
        assert!(matches!(result, Err(ConfigError::Read(_))));
    }
}
