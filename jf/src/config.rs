//! Jobflow configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main jobflow configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Name of the persisted workflow state inside the output directory
    #[serde(rename = "state-file")]
    pub state_file: StateFile,

    /// Live progress line
    pub progress: ProgressConfig,

    /// Log materialization thresholds
    pub logs: LogsConfig,

    /// Inspection output
    pub inspect: InspectConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .jobflow.yml
        let local_config = PathBuf::from(".jobflow.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/jobflow/jobflow.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("jobflow").join("jobflow.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is initialized
    ///
    /// Errors are swallowed: a broken config file is reported later by [`Config::load`].
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        Self::load(config_path).ok().and_then(|c| c.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// State file name wrapper so the default survives `#[serde(default)]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateFile(pub String);

impl Default for StateFile {
    fn default() -> Self {
        Self(crate::state::DEFAULT_STATE_FILE.to_string())
    }
}

/// Progress monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// Show the live progress line on interactive terminals
    pub enabled: bool,

    /// Refresh interval in milliseconds
    #[serde(rename = "interval-ms")]
    pub interval_ms: u64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 500,
        }
    }
}

/// Thresholds above which captured output is replaced by a log file reference
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogsConfig {
    /// Maximum number of lines kept in memory (line-based output)
    #[serde(rename = "max-inline-lines")]
    pub max_inline_lines: usize,

    /// Maximum number of characters kept in memory (text output)
    #[serde(rename = "max-inline-chars")]
    pub max_inline_chars: usize,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            max_inline_lines: 5,
            max_inline_chars: 50,
        }
    }
}

/// Inspection output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InspectConfig {
    /// Captured text shorter than this is printed inline by `show`
    #[serde(rename = "max-inline-chars")]
    pub max_inline_chars: usize,
}

impl Default for InspectConfig {
    fn default() -> Self {
        Self { max_inline_chars: 160 }
    }
}

/// Runtime knobs handed to a [`crate::Workflow`]
#[derive(Debug, Clone)]
pub struct Settings {
    pub state_file: String,
    pub show_progress: bool,
    pub progress_interval: Duration,
    pub max_inline_lines: usize,
    pub max_inline_chars: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for Settings {
    fn from(config: &Config) -> Self {
        Self {
            state_file: config.state_file.0.clone(),
            show_progress: config.progress.enabled,
            progress_interval: Duration::from_millis(config.progress.interval_ms),
            max_inline_lines: config.logs.max_inline_lines,
            max_inline_chars: config.logs.max_inline_chars,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.state_file.0, "workflow.json");
        assert_eq!(config.progress.interval_ms, 500);
        assert_eq!(config.logs.max_inline_lines, 5);
        assert_eq!(config.logs.max_inline_chars, 50);
        assert_eq!(config.inspect.max_inline_chars, 160);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "progress:\n  interval-ms: 250\nlogs:\n  max-inline-lines: 20\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.progress.interval_ms, 250);
        assert!(config.progress.enabled);
        assert_eq!(config.logs.max_inline_lines, 20);
        assert_eq!(config.logs.max_inline_chars, 50);
        assert_eq!(config.state_file.0, "workflow.json");
    }

    #[test]
    fn test_load_explicit_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("jobflow.yml");
        fs::write(&path, "log-level: debug\nstate-file: run.json\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.state_file.0, "run.json");
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("missing.yml");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = Config::default();
        config.progress.interval_ms = 100;
        config.progress.enabled = false;
        let settings = Settings::from(&config);
        assert_eq!(settings.progress_interval, Duration::from_millis(100));
        assert!(!settings.show_progress);
        assert_eq!(settings.state_file, "workflow.json");
    }
}
