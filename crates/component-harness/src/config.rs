//! Harness configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::result::{HarnessError, HarnessResult};

/// Environment variable overriding [`HarnessConfig::max_stabilize_cycles`]
pub const ENV_MAX_STABILIZE_CYCLES: &str = "HARNESS_MAX_STABILIZE_CYCLES";
/// Environment variable overriding [`HarnessConfig::stabilize_timeout_ms`]
pub const ENV_STABILIZE_TIMEOUT_MS: &str = "HARNESS_STABILIZE_TIMEOUT_MS";
/// Environment variable overriding [`HarnessConfig::stabilize_after_actions`]
pub const ENV_STABILIZE_AFTER_ACTIONS: &str = "HARNESS_STABILIZE_AFTER_ACTIONS";
/// Environment variable overriding [`HarnessConfig::log_queries`]
pub const ENV_LOG_QUERIES: &str = "HARNESS_LOG_QUERIES";

/// Settings shared by an environment and its backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    /// Pump cycles the test bed runs before reporting a stability timeout
    pub max_stabilize_cycles: u64,
    /// Milliseconds a browser waits for the page to settle
    pub stabilize_timeout_ms: u64,
    /// Wait for stability again after every mutating element action
    pub stabilize_after_actions: bool,
    /// Emit a debug event per query
    pub log_queries: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            max_stabilize_cycles: 1000,
            stabilize_timeout_ms: 5000,
            stabilize_after_actions: true,
            log_queries: true,
        }
    }
}

impl HarnessConfig {
    /// Create config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the test bed pump bound
    #[must_use]
    pub const fn with_max_stabilize_cycles(mut self, cycles: u64) -> Self {
        self.max_stabilize_cycles = cycles;
        self
    }

    /// Set the browser settle timeout
    #[must_use]
    pub const fn with_stabilize_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.stabilize_timeout_ms = timeout_ms;
        self
    }

    /// Enable or disable the post-action stability wait
    #[must_use]
    pub const fn with_stabilize_after_actions(mut self, enabled: bool) -> Self {
        self.stabilize_after_actions = enabled;
        self
    }

    /// Enable or disable per-query debug events
    #[must_use]
    pub const fn with_log_queries(mut self, enabled: bool) -> Self {
        self.log_queries = enabled;
        self
    }

    /// Browser settle timeout as a `Duration`
    #[must_use]
    pub const fn stabilize_timeout(&self) -> Duration {
        Duration::from_millis(self.stabilize_timeout_ms)
    }

    /// Check that every bound is usable
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] for a zero cycle bound or timeout
    pub fn validate(&self) -> HarnessResult<()> {
        if self.max_stabilize_cycles == 0 {
            return Err(HarnessError::config("max_stabilize_cycles must be at least 1"));
        }
        if self.stabilize_timeout_ms == 0 {
            return Err(HarnessError::config("stabilize_timeout_ms must be at least 1"));
        }
        Ok(())
    }

    /// Parse and validate a YAML document
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] on malformed YAML, unknown keys or
    /// invalid values
    pub fn from_yaml_str(yaml: &str) -> HarnessResult<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)
            .map_err(|e| HarnessError::config(format!("invalid YAML config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON document
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] on malformed JSON, unknown keys or
    /// invalid values
    pub fn from_json_str(json: &str) -> HarnessResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| HarnessError::config(format!("invalid JSON config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file; `.json` files are parsed as JSON, anything else as YAML
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Io`] if the file cannot be read, otherwise as
    /// the matching `from_*_str`
    pub fn from_file(path: impl AsRef<Path>) -> HarnessResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_yaml_str(&content)
        }
    }

    /// Defaults overridden by `HARNESS_*` environment variables
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] if a variable holds an unparsable value
    pub fn from_env() -> HarnessResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each `HARNESS_*` key
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] if a value is unparsable
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> HarnessResult<Self> {
        let mut config = Self::default();
        if let Some(value) = lookup(ENV_MAX_STABILIZE_CYCLES) {
            config.max_stabilize_cycles = parse_var(ENV_MAX_STABILIZE_CYCLES, &value)?;
        }
        if let Some(value) = lookup(ENV_STABILIZE_TIMEOUT_MS) {
            config.stabilize_timeout_ms = parse_var(ENV_STABILIZE_TIMEOUT_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_STABILIZE_AFTER_ACTIONS) {
            config.stabilize_after_actions = parse_flag(ENV_STABILIZE_AFTER_ACTIONS, &value)?;
        }
        if let Some(value) = lookup(ENV_LOG_QUERIES) {
            config.log_queries = parse_flag(ENV_LOG_QUERIES, &value)?;
        }
        config.validate()?;
        Ok(config)
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> HarnessResult<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| HarnessError::config(format!("{key}={value:?}: {e}")))
}

fn parse_flag(key: &str, value: &str) -> HarnessResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(HarnessError::config(format!(
            "{key}={value:?}: expected a boolean"
        ))),
    }
}
