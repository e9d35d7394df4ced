//! Pipeline configuration.
//!
//! Serde-deserializable so deployments can load it from a config file or
//! environment layer; every field has a default suitable for local runs.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LINTER_BINARY: &str = "spectral";
const DEFAULT_LINTER_RULESET: &str = ".spectral.yaml";
const DEFAULT_LINTER_TIMEOUT_SECS: u64 = 60;
const DEFAULT_PASS_TIMEOUT_SECS: u64 = 30 * 60;

fn default_http_timeout_secs() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

fn default_linter_binary() -> String {
    DEFAULT_LINTER_BINARY.to_string()
}

fn default_linter_ruleset() -> String {
    DEFAULT_LINTER_RULESET.to_string()
}

fn default_linter_timeout_secs() -> u64 {
    DEFAULT_LINTER_TIMEOUT_SECS
}

fn default_trigger() -> NaiveTime {
    NaiveTime::from_hms_opt(7, 0, 0).unwrap_or(NaiveTime::MIN)
}

fn default_pass_timeout_secs() -> u64 {
    DEFAULT_PASS_TIMEOUT_SECS
}

/// Configuration for the whole ingestion pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IngestConfig {
    /// Timeout for outbound spec fetches (seconds).
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Optional Origin header sent with outbound spec fetches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,

    /// External linter invocation settings.
    pub linter: LinterConfig,

    /// Daily refresh scheduler settings.
    pub scheduler: SchedulerConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            http_timeout_secs: default_http_timeout_secs(),
            origin: None,
            linter: LinterConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

/// Settings for the external rule checker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LinterConfig {
    /// Checker binary name or path.
    #[serde(default = "default_linter_binary")]
    pub binary: String,

    /// Ruleset reference passed to every invocation.
    #[serde(default = "default_linter_ruleset")]
    pub ruleset: String,

    /// Hard cap on one checker invocation (seconds).
    #[serde(default = "default_linter_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LinterConfig {
    fn default() -> Self {
        Self {
            binary: default_linter_binary(),
            ruleset: default_linter_ruleset(),
            timeout_secs: default_linter_timeout_secs(),
        }
    }
}

/// Settings for the daily refresh scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchedulerConfig {
    /// Local wall-clock time the daily pass starts.
    #[serde(default = "default_trigger")]
    pub trigger: NaiveTime,

    /// Hard cap on one pass (seconds).
    #[serde(default = "default_pass_timeout_secs")]
    pub pass_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            trigger: default_trigger(),
            pass_timeout_secs: default_pass_timeout_secs(),
        }
    }
}
