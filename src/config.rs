//! Configuration loading for pathgate.
//!
//! Configuration follows a precedence chain:
//! 1. Environment variables (highest priority)
//! 2. Project config (`.pathgate/config.toml`)
//! 3. User config (`~/.pathgate/config.toml`)
//! 4. Defaults (lowest priority)
//!
//! All configuration is optional. The engine runs with defaults when no
//! config exists.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{PathgateError, Result};

/// Default max score of an activity without one.
pub const DEFAULT_ACTIVITY_MAX_SCORE: u32 = 10;

/// Main configuration struct.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Score computation settings.
    pub scoring: ScoringConfig,
    /// Data document location.
    pub storage: StorageConfig,
    /// Event log settings.
    pub events: EventsConfig,
}

/// Score computation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoringConfig {
    /// Max score used for activities whose own max is unset or zero.
    pub default_activity_max_score: u32,
}

impl ScoringConfig {
    /// Check if a default max score is usable.
    pub fn is_valid_max_score(value: u32) -> bool {
        value > 0
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            default_activity_max_score: DEFAULT_ACTIVITY_MAX_SCORE,
        }
    }
}

/// Data document location.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Path of the JSON data document. Defaults to `<pathgate_home>/data.json`.
    pub data_file: Option<PathBuf>,
}

impl StorageConfig {
    /// Resolved data document path.
    pub fn data_path(&self) -> Option<PathBuf> {
        self.data_file.clone().or_else(default_data_path)
    }
}

/// Event log settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EventsConfig {
    /// Whether events are written at all.
    pub enabled: bool,
    /// Path of the JSONL event log. Defaults to `<pathgate_home>/events.log`.
    pub log_file: Option<PathBuf>,
}

impl EventsConfig {
    /// Resolved event log path.
    pub fn log_path(&self) -> Option<PathBuf> {
        self.log_file.clone().or_else(default_events_path)
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration with full precedence chain.
    pub fn load() -> Self {
        match env::current_dir() {
            Ok(cwd) => Self::load_from_cwd(&cwd),
            Err(_) => {
                let mut config = Config::default();
                if let Some(user_config) = Self::load_user_config() {
                    config = config.merge(user_config);
                }
                config.apply_env_overrides();
                config
            }
        }
    }

    /// Load configuration with a specific working directory.
    pub fn load_from_cwd(cwd: &Path) -> Self {
        let mut config = Config::default();

        if let Some(user_config) = Self::load_user_config() {
            config = config.merge(user_config);
        }

        if let Some(project_config) = Self::load_project_config(cwd) {
            config = config.merge(project_config);
        }

        config.apply_env_overrides();

        config
    }

    /// Load user config from `<pathgate_home>/config.toml`.
    fn load_user_config() -> Option<Config> {
        let home = pathgate_home()?;
        Self::load_from_file(&home.join("config.toml")).ok()
    }

    /// Load project config from `.pathgate/config.toml` in the given directory.
    fn load_project_config(cwd: &Path) -> Option<Config> {
        let config_path = cwd.join(".pathgate").join("config.toml");
        Self::load_from_file(&config_path).ok()
    }

    /// Load config from a specific file path.
    fn load_from_file(path: &Path) -> Result<Config> {
        let content = fs::read_to_string(path).map_err(|e| PathgateError::storage(path, e))?;
        toml::from_str(&content).map_err(|e| PathgateError::config(e.to_string()))
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        // PATHGATE_DEFAULT_MAX_SCORE
        if let Ok(val) = env::var("PATHGATE_DEFAULT_MAX_SCORE") {
            match val.parse::<u32>() {
                Ok(n) if ScoringConfig::is_valid_max_score(n) => {
                    self.scoring.default_activity_max_score = n;
                }
                _ => tracing::warn!(
                    value = %val,
                    default = self.scoring.default_activity_max_score,
                    "invalid PATHGATE_DEFAULT_MAX_SCORE, expected a positive integer"
                ),
            }
        }

        // PATHGATE_DATA
        if let Ok(val) = env::var("PATHGATE_DATA") {
            if !val.is_empty() {
                self.storage.data_file = Some(PathBuf::from(val));
            }
        }

        // PATHGATE_EVENTS_ENABLED
        if let Ok(val) = env::var("PATHGATE_EVENTS_ENABLED") {
            match val.to_lowercase().as_str() {
                "true" | "1" | "yes" => self.events.enabled = true,
                "false" | "0" | "no" => self.events.enabled = false,
                _ => tracing::warn!(value = %val, "invalid PATHGATE_EVENTS_ENABLED, ignoring"),
            }
        }
    }

    /// Merge another config into this one, taking its non-default values.
    ///
    /// A lower layer's custom value survives a higher layer that spells out
    /// the default explicitly.
    fn merge(mut self, other: Config) -> Self {
        let default_scoring = ScoringConfig::default();
        if other.scoring.default_activity_max_score != default_scoring.default_activity_max_score
        {
            self.scoring.default_activity_max_score = other.scoring.default_activity_max_score;
        }

        if other.storage.data_file.is_some() {
            self.storage.data_file = other.storage.data_file;
        }

        let default_events = EventsConfig::default();
        if other.events.enabled != default_events.enabled {
            self.events.enabled = other.events.enabled;
        }
        if other.events.log_file.is_some() {
            self.events.log_file = other.events.log_file;
        }

        self
    }
}

/// Get the pathgate home directory.
///
/// `PATHGATE_HOME` wins when set to a non-empty value; otherwise
/// `~/.pathgate`, or a temp-dir fallback when there is no home directory.
pub fn pathgate_home() -> Option<PathBuf> {
    if let Ok(home) = env::var("PATHGATE_HOME") {
        if home.is_empty() {
            tracing::warn!("PATHGATE_HOME is empty, using default");
        } else {
            let path = PathBuf::from(&home);
            if path.is_absolute() {
                return Some(path);
            }
            if let Ok(canonical) = path.canonicalize() {
                return Some(canonical);
            }
            tracing::warn!("PATHGATE_HOME is relative and doesn't exist, using as-is");
            return Some(path);
        }
    }

    if let Some(home) = dirs::home_dir() {
        return Some(home.join(".pathgate"));
    }

    let fallback = env::temp_dir().join("pathgate");
    tracing::warn!(
        "HOME not set, using fallback location: {}",
        fallback.display()
    );
    Some(fallback)
}

/// Default data document path: `<pathgate_home>/data.json`.
pub fn default_data_path() -> Option<PathBuf> {
    pathgate_home().map(|h| h.join("data.json"))
}

/// Default event log path: `<pathgate_home>/events.log`.
pub fn default_events_path() -> Option<PathBuf> {
    pathgate_home().map(|h| h.join("events.log"))
}
