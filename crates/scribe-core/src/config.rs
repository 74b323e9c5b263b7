//! Configuration management for Scribe
//!
//! Repository-level settings for the circuit breaker, retry policy, per-call
//! timeout, batch context manager and model selection.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::{ErrorKind, Result, ScribeError};

/// Repository-level Scribe configuration
///
/// Loaded from `.scribe/config.toml` in the repo root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScribeConfig {
    /// Circuit breaker settings
    #[serde(default)]
    pub circuit: CircuitConfig,

    /// Retry/backoff settings
    #[serde(default)]
    pub retry: RetryConfig,

    /// Per-operation settings
    #[serde(default)]
    pub operation: OperationConfig,

    /// Batch context manager settings
    #[serde(default)]
    pub context: ContextConfig,

    /// Model selection
    #[serde(default)]
    pub models: ModelConfig,
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitConfig {
    /// Consecutive failures before the circuit opens
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Seconds an open circuit waits before admitting a trial call
    #[serde(default = "default_recovery_timeout_secs")]
    pub recovery_timeout_secs: u64,
}

/// Retry/backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry (milliseconds)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Cap on the un-jittered delay (milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Randomize delays by a factor in [0.5, 1.5]
    #[serde(default = "default_jitter")]
    pub jitter: bool,

    /// Error kinds worth retrying
    #[serde(default = "default_retriable")]
    pub retriable: Vec<ErrorKind>,
}

/// Per-operation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationConfig {
    /// Upper bound on a single remote call (seconds)
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

/// Batch context manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Entries accumulated before they are folded into the summary
    #[serde(default = "default_compaction_threshold")]
    pub compaction_threshold: usize,

    /// Raw scores kept for the stats snapshot
    #[serde(default = "default_recent_scores")]
    pub recent_scores: usize,

    /// Lowest target score ever suggested
    #[serde(default = "default_target_score_floor")]
    pub target_score_floor: u32,

    /// Highlights retained in the compacted summary
    #[serde(default = "default_max_highlights")]
    pub max_highlights: usize,
}

/// Model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Default model to use
    #[serde(default = "default_model")]
    pub default: String,

    /// Environment variable containing API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Maximum tokens per response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

// Default value providers
fn default_failure_threshold() -> u32 {
    3
}

fn default_recovery_timeout_secs() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_jitter() -> bool {
    true
}

fn default_retriable() -> Vec<ErrorKind> {
    ErrorKind::TRANSIENT.to_vec()
}

fn default_call_timeout_secs() -> u64 {
    120
}

fn default_compaction_threshold() -> usize {
    10
}

fn default_recent_scores() -> usize {
    5
}

fn default_target_score_floor() -> u32 {
    18
}

fn default_max_highlights() -> usize {
    5
}

fn default_model() -> String {
    "sonnet".to_string()
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_max_tokens() -> usize {
    4096
}

impl ScribeConfig {
    /// Load configuration from `.scribe/config.toml` or use defaults
    pub fn load_or_default(repo_root: &Path) -> Result<Self> {
        let config_path = repo_root.join(".scribe/config.toml");

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Self = toml::from_str(&content).map_err(|e| {
                ScribeError::Config(format!("Failed to parse config file: {}", e))
            })?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Write default configuration to `.scribe/config.toml`
    pub fn write_default(repo_root: &Path) -> Result<()> {
        let config_dir = repo_root.join(".scribe");
        std::fs::create_dir_all(&config_dir)?;

        let config_path = config_dir.join("config.toml");
        let content = toml::to_string_pretty(&Self::default()).map_err(|e| {
            ScribeError::Config(format!("Failed to serialize config: {}", e))
        })?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    /// Reject settings the resilience core cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.circuit.failure_threshold == 0 {
            return Err(ScribeError::Config(
                "circuit.failure_threshold must be at least 1".to_string(),
            ));
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(ScribeError::Config(format!(
                "retry.max_delay_ms ({}) is smaller than retry.base_delay_ms ({})",
                self.retry.max_delay_ms, self.retry.base_delay_ms
            )));
        }
        if self.operation.call_timeout_secs == 0 {
            return Err(ScribeError::Config(
                "operation.call_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.context.compaction_threshold == 0 {
            return Err(ScribeError::Config(
                "context.compaction_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl CircuitConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_secs)
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl OperationConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout_secs: default_recovery_timeout_secs(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
            retriable: default_retriable(),
        }
    }
}

impl Default for OperationConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: default_call_timeout_secs(),
        }
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            compaction_threshold: default_compaction_threshold(),
            recent_scores: default_recent_scores(),
            target_score_floor: default_target_score_floor(),
            max_highlights: default_max_highlights(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            default: default_model(),
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
        }
    }
}
