//! Configuration management
//!
//! Reads `tsplay.toml`. Every field has a default, so a missing file or a
//! partial one is fine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::batcher::{DEFAULT_FLUSH_INTERVAL, DEFAULT_HIGH_WATER_MARK};
use crate::debounce::DEFAULT_AUTO_RUN_DELAY;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PlaygroundConfig {
    #[serde(default)]
    pub run: RunConfig,

    #[serde(default)]
    pub auto_run: AutoRunConfig,

    /// Passed through to every spawned program
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_match_lines")]
    pub match_lines: bool,

    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    #[serde(default = "default_high_water_mark")]
    pub high_water_mark: usize,

    /// Program used to execute the composed entry file
    #[serde(default = "default_node")]
    pub node: String,

    #[serde(default = "default_entry_file")]
    pub entry_file: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            match_lines: default_match_lines(),
            flush_interval_ms: default_flush_interval_ms(),
            high_water_mark: default_high_water_mark(),
            node: default_node(),
            entry_file: default_entry_file(),
        }
    }
}

fn default_match_lines() -> bool {
    true
}

fn default_flush_interval_ms() -> u64 {
    DEFAULT_FLUSH_INTERVAL.as_millis() as u64
}

fn default_high_water_mark() -> usize {
    DEFAULT_HIGH_WATER_MARK
}

fn default_node() -> String {
    "node".to_string()
}

fn default_entry_file() -> String {
    "index.mjs".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoRunConfig {
    #[serde(default = "default_auto_run_enabled")]
    pub enabled: bool,

    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

impl Default for AutoRunConfig {
    fn default() -> Self {
        Self {
            enabled: default_auto_run_enabled(),
            delay_ms: default_delay_ms(),
        }
    }
}

fn default_auto_run_enabled() -> bool {
    true
}

fn default_delay_ms() -> u64 {
    DEFAULT_AUTO_RUN_DELAY.as_millis() as u64
}

impl AutoRunConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl PlaygroundConfig {
    /// Load config from a TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Load from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Serialize to TOML string
    pub fn to_toml(&self) -> Option<String> {
        toml::to_string_pretty(self).ok()
    }
}

/// Settings a [`RunSupervisor`](crate::RunSupervisor) needs for every run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    pub flush_interval: Duration,
    pub high_water_mark: usize,
    pub program: String,
    pub entry_file: String,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self::from(&RunConfig::default())
    }
}

impl From<&RunConfig> for SupervisorConfig {
    fn from(run: &RunConfig) -> Self {
        Self {
            flush_interval: Duration::from_millis(run.flush_interval_ms.max(1)),
            high_water_mark: run.high_water_mark,
            program: run.node.clone(),
            entry_file: run.entry_file.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = PlaygroundConfig::from_toml("").unwrap();
        assert_eq!(config, PlaygroundConfig::default());
        assert!(config.run.match_lines);
        assert_eq!(config.auto_run.delay_ms, 1000);
        assert_eq!(config.run.entry_file, "index.mjs");
    }

    #[test]
    fn test_defaults_track_shared_constants() {
        let config = PlaygroundConfig::default();
        assert_eq!(config.auto_run.delay(), DEFAULT_AUTO_RUN_DELAY);
        assert_eq!(
            SupervisorConfig::from(&config.run).flush_interval,
            DEFAULT_FLUSH_INTERVAL
        );
        assert_eq!(config.run.high_water_mark, DEFAULT_HIGH_WATER_MARK);
    }

    #[test]
    fn test_partial_config() {
        let config = PlaygroundConfig::from_toml(
            r#"
[run]
match_lines = false
high_water_mark = 16

[env]
API_KEY = "secret"
"#,
        )
        .unwrap();
        assert!(!config.run.match_lines);
        assert_eq!(config.run.high_water_mark, 16);
        assert_eq!(config.run.flush_interval_ms, 50);
        assert_eq!(config.env.get("API_KEY").map(String::as_str), Some("secret"));
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let err = PlaygroundConfig::from_toml("[run]\nmatch_lines = \"yes\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = PlaygroundConfig::default();
        config.env.insert("A".into(), "1".into());
        let text = config.to_toml().unwrap();
        assert_eq!(PlaygroundConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn test_supervisor_config_from_run() {
        let run = RunConfig {
            flush_interval_ms: 0,
            ..RunConfig::default()
        };
        let config = SupervisorConfig::from(&run);
        assert_eq!(config.flush_interval, Duration::from_millis(1));
        assert_eq!(config.program, "node");
    }
}
