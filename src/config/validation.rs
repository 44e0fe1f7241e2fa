//! Config errors, field checks and value parsers.

use std::sync::OnceLock;
use std::time::Duration;

use regex::{Captures, Regex};
use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("malformed config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A field holds a value the exporter cannot run with.
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

/// Parse a human-readable duration such as `15s`, `1m` or `1m30s`.
///
/// Used for CLI flags; YAML fields go through `humantime_serde`.
///
/// ```
/// use firebolt_otel_exporter::config::parse_duration;
///
/// assert_eq!(parse_duration("45s").unwrap().as_secs(), 45);
/// assert_eq!(parse_duration("1m30s").unwrap().as_secs(), 90);
/// ```
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    match s.trim() {
        "" => Err("empty duration".to_string()),
        s => humantime::parse_duration(s).map_err(|e| format!("{s:?}: {e}")),
    }
}

fn placeholder() -> Option<&'static Regex> {
    static PLACEHOLDER: OnceLock<Option<Regex>> = OnceLock::new();
    PLACEHOLDER
        .get_or_init(|| Regex::new(r"\$\{(\w+)(?::-([^}]*))?\}").ok())
        .as_ref()
}

/// Substitute `${NAME}` and `${NAME:-fallback}` with environment values.
///
/// Unset variables without a fallback become empty strings, which field
/// validation then reports by name.
pub fn expand_env_vars(input: &str) -> String {
    let Some(re) = placeholder() else {
        return input.to_string();
    };
    re.replace_all(input, |caps: &Captures| {
        std::env::var(&caps[1])
            .ok()
            .or_else(|| caps.get(2).map(|m| m.as_str().to_string()))
            .unwrap_or_default()
    })
    .into_owned()
}

pub(crate) fn require_non_blank(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::invalid(format!("{field} must not be empty")));
    }
    Ok(())
}

pub(crate) fn require_min_duration(
    field: &str,
    value: Duration,
    min: Duration,
) -> Result<(), ConfigError> {
    if value >= min {
        return Ok(());
    }
    Err(ConfigError::invalid(format!(
        "{field} must be at least {} (got {})",
        humantime::format_duration(min),
        humantime::format_duration(value)
    )))
}
