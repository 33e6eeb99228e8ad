//! # Server Configuration
//!
//! One YAML file, every section optional:
//!
//! ```yaml
//! port: 8080
//! retention:
//!   US: { max_retention_days: 18250 }
//!   EU: { max_retention_days: 3650 }
//! extractor: { global_acceptance_threshold: 0.85, escalation_timeout_ms: 2000 }
//! emergency: { latency_budget_ms: 250 }
//! execution: { top_n: 3, retry: { max_attempts: 3, base_delay_ms: 200 } }
//! sweep_interval_secs: 3600
//! notifier: logging
//! ```
//!
//! Environment overrides, applied after the file:
//! - `PORT`
//! - `MEDX_AUTH_TOKEN`
//! - `MEDX_SIGNING_SEED` (64 hex chars)
//! - `MEDX_NLP_ENDPOINT`
//! - `MEDX_LOG_FORMAT` (`text` or `json`)
//!
//! Secrets never appear in `Debug` output.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use medx_core::{RetentionPolicyTable, ValidationError};
use medx_emergency::EmergencyConfig;
use medx_executor::ExecutionConfig;
use medx_extract::ExtractorConfig;
use serde::Deserialize;
use thiserror::Error;

/// Errors while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid YAML for [`AppConfig`].
    #[error("invalid config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// An environment override could not be interpreted.
    #[error("invalid value for {var}: {reason}")]
    InvalidEnv { var: &'static str, reason: String },

    /// The retention table is invalid (bad code or zero bound).
    #[error("invalid retention table: {0}")]
    Retention(#[from] ValidationError),

    /// A collaborator could not be constructed from its settings.
    #[error("invalid {component} settings: {reason}")]
    Component {
        component: &'static str,
        reason: String,
    },
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Which outbound notification channel the execution engine uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifierMode {
    /// Acknowledge locally and log. No network traffic.
    #[default]
    Logging,
    /// POST JSON to each target's configured endpoint.
    Http,
}

/// One row of the `retention` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RetentionEntry {
    pub max_retention_days: u64,
}

/// Full server configuration.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub port: u16,
    /// Bearer token for `/v1`. `None` disables authentication.
    pub auth_token: Option<String>,
    /// Hex master seed for the in-process signing service.
    pub signing_seed: Option<String>,
    /// Base URL of the Tier 2 language model. `None` disables escalation.
    pub nlp_endpoint: Option<String>,
    pub log_format: LogFormat,
    /// Jurisdiction code to bound. Empty means the built-in table.
    pub retention: BTreeMap<String, RetentionEntry>,
    pub extractor: ExtractorConfig,
    pub emergency: EmergencyConfig,
    pub execution: ExecutionConfig,
    pub sweep_interval_secs: u64,
    pub notifier: NotifierMode,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            auth_token: None,
            signing_seed: None,
            nlp_endpoint: None,
            log_format: LogFormat::Text,
            retention: BTreeMap::new(),
            extractor: ExtractorConfig::default(),
            emergency: EmergencyConfig::default(),
            execution: ExecutionConfig::default(),
            sweep_interval_secs: 3_600,
            notifier: NotifierMode::Logging,
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("signing_seed", &self.signing_seed.as_ref().map(|_| "[REDACTED]"))
            .field("nlp_endpoint", &self.nlp_endpoint)
            .field("log_format", &self.log_format)
            .field("retention", &self.retention)
            .field("sweep_interval_secs", &self.sweep_interval_secs)
            .field("notifier", &self.notifier)
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    /// Parse a YAML document. An empty document yields the defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Read the file at `path`, if any, then apply process environment
    /// overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_yaml_str(&text)?
            }
            None => Self::default(),
        };
        config.apply_overrides(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    /// Apply overrides from `lookup` (the process environment in production).
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(port) = lookup("PORT") {
            self.port = port.parse().map_err(|e| ConfigError::InvalidEnv {
                var: "PORT",
                reason: format!("{e}"),
            })?;
        }
        if let Some(token) = lookup("MEDX_AUTH_TOKEN").filter(|t| !t.is_empty()) {
            self.auth_token = Some(token);
        }
        if let Some(seed) = lookup("MEDX_SIGNING_SEED").filter(|s| !s.is_empty()) {
            self.signing_seed = Some(seed);
        }
        if let Some(endpoint) = lookup("MEDX_NLP_ENDPOINT").filter(|e| !e.is_empty()) {
            self.nlp_endpoint = Some(endpoint);
        }
        if let Some(format) = lookup("MEDX_LOG_FORMAT") {
            self.log_format = match format.to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                "text" | "" => LogFormat::Text,
                other => {
                    return Err(ConfigError::InvalidEnv {
                        var: "MEDX_LOG_FORMAT",
                        reason: format!("expected text or json, got {other}"),
                    })
                }
            };
        }
        Ok(())
    }

    /// The jurisdiction table. An empty `retention` section means
    /// [`RetentionPolicyTable::standard`].
    pub fn retention_table(&self) -> Result<RetentionPolicyTable, ConfigError> {
        if self.retention.is_empty() {
            return Ok(RetentionPolicyTable::standard());
        }
        Ok(RetentionPolicyTable::from_days(
            self.retention
                .iter()
                .map(|(code, entry)| (code.clone(), entry.max_retention_days)),
        )?)
    }

    /// Configured sweep interval. The sweeper clamps it to the smallest
    /// retention bound.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}
