//! Monitor configuration
//!
//! Load order:
//! 1. JSON file (`--config` path, else `~/.config/eldercare-monitor/config.json` if present)
//! 2. Environment overrides: `ECM_ASSISTANT_ENDPOINT`, `ANTHROPIC_API_KEY`,
//!    `ECM_ASSISTANT_TIMEOUT_MS`, `ECM_DATA_DIR`
//!
//! The resulting object is passed explicitly to the orchestrator.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::ai::client::AssistantConfig;
use crate::model::Thresholds;
use crate::rules::RuleConfig;
use crate::store::DEFAULT_MAX_CLOCK_SKEW_SECS;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub assistant: AssistantConfig,
    pub rules: RuleConfig,
    /// Bands given to newly registered patients
    pub thresholds: Thresholds,
    /// Storage directory; `None` means the default under the config dir
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    /// How far past the wall clock a submitted timestamp may be
    pub max_clock_skew_secs: i64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            assistant: AssistantConfig::default(),
            rules: RuleConfig::default(),
            thresholds: Thresholds::default(),
            data_dir: None,
            max_clock_skew_secs: DEFAULT_MAX_CLOCK_SKEW_SECS,
        }
    }
}

impl MonitorConfig {
    /// `~/.config/eldercare-monitor`
    pub fn config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("eldercare-monitor")
    }

    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.json")
    }

    /// Load from `path` (must exist) or the default location (optional), then apply env
    pub fn auto_load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Self::default_path();
                if default.exists() {
                    Self::from_file(&default)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("cannot read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("invalid config {}", path.display()))?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Apply overrides from a key lookup (the environment in production)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(endpoint) = get("ECM_ASSISTANT_ENDPOINT") {
            self.assistant.endpoint = endpoint;
        }
        if let Some(key) = get("ANTHROPIC_API_KEY") {
            self.assistant.api_key = key;
        }
        if let Some(timeout) = get("ECM_ASSISTANT_TIMEOUT_MS") {
            self.assistant.timeout_ms = timeout
                .trim()
                .parse()
                .map_err(|_| anyhow!("ECM_ASSISTANT_TIMEOUT_MS must be milliseconds, got {:?}", timeout))?;
        }
        if let Some(dir) = get("ECM_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(dir));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.thresholds.validate()?;
        if self.assistant.timeout_ms == 0 {
            return Err(anyhow!("assistant.timeout_ms must be greater than zero"));
        }
        if self.assistant.max_response_length == 0 {
            return Err(anyhow!("assistant.max_response_length must be greater than zero"));
        }
        if self.rules.medication_window_hours <= 0 || self.rules.lookback_hours <= 0 {
            return Err(anyhow!("rule windows must be positive"));
        }
        if !self.rules.trend_min_step.is_finite() || self.rules.trend_min_step < 0.0 {
            return Err(anyhow!("rules.trend_min_step must be a non-negative number"));
        }
        if self.max_clock_skew_secs < 0 {
            return Err(anyhow!("max_clock_skew_secs must not be negative"));
        }
        Ok(())
    }

    pub fn max_clock_skew(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.max_clock_skew_secs)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("data"))
    }
}
