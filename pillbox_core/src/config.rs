//! Configuration file support for Pillbox.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/pillbox/config.toml`.

use crate::{Error, ReminderPeriod, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub reminders: ReminderConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Clock times for the named reminder periods
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReminderConfig {
    #[serde(default = "default_morning")]
    pub morning: String,

    #[serde(default = "default_noon")]
    pub noon: String,

    #[serde(default = "default_evening")]
    pub evening: String,

    /// How often `pillbox remind` wakes up to check for due reminders
    #[serde(default = "default_poll_seconds")]
    pub poll_seconds: u64,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            morning: default_morning(),
            noon: default_noon(),
            evening: default_evening(),
            poll_seconds: default_poll_seconds(),
        }
    }
}

impl ReminderConfig {
    /// Configured fire time for a period, falling back to the built-in time
    pub fn time_for(&self, period: ReminderPeriod) -> NaiveTime {
        let raw = match period {
            ReminderPeriod::Morning => &self.morning,
            ReminderPeriod::Noon => &self.noon,
            ReminderPeriod::Evening => &self.evening,
        };
        parse_clock(raw).unwrap_or_else(|| period.default_time())
    }

    fn validate(&self) -> Result<()> {
        for (name, raw) in [
            ("morning", &self.morning),
            ("noon", &self.noon),
            ("evening", &self.evening),
        ] {
            if parse_clock(raw).is_none() {
                return Err(Error::Config(format!(
                    "reminders.{} must be HH:MM, got {:?}",
                    name, raw
                )));
            }
        }
        if self.poll_seconds == 0 {
            return Err(Error::Config("reminders.poll_seconds must be positive".into()));
        }
        Ok(())
    }
}

fn parse_clock(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M").ok()
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
        PathBuf::from(home).join(".local/share")
    });
    base.join("pillbox")
}

fn default_morning() -> String {
    "08:00".into()
}

fn default_noon() -> String {
    "12:00".into()
}

fn default_evening() -> String {
    "20:00".into()
}

fn default_poll_seconds() -> u64 {
    30
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            Ok(Self::default())
        }
    }

    /// Like [`Config::load`], but an unreadable config falls back to defaults
    pub fn load_or_default() -> Self {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from_or_default(&config_path)
        } else {
            Self::default()
        }
    }

    /// Load from `path`, warning and using defaults when it cannot be read
    pub fn load_from_or_default(path: &Path) -> Self {
        Self::load_from(path).unwrap_or_else(|e| {
            tracing::warn!("Ignoring config {:?}: {}", path, e);
            Self::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.reminders.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
            PathBuf::from(home).join(".config")
        });
        base.join("pillbox").join("config.toml")
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(
            config.reminders.time_for(ReminderPeriod::Noon),
            NaiveTime::from_hms_opt(12, 0, 0).unwrap()
        );
        assert_eq!(config.reminders.poll_seconds, 30);
        assert!(config.data.data_dir.ends_with("pillbox"));
    }

    #[test]
    fn test_config_roundtrip_through_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");

        let mut config = Config::default();
        config.reminders.evening = "21:30".into();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(
            loaded.reminders.time_for(ReminderPeriod::Evening),
            NaiveTime::from_hms_opt(21, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
[reminders]
morning = "07:15"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(
            config.reminders.time_for(ReminderPeriod::Morning),
            NaiveTime::from_hms_opt(7, 15, 0).unwrap()
        );
        assert_eq!(config.reminders.noon, "12:00"); // default
    }

    #[test]
    fn test_invalid_reminder_time_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[reminders]\nnoon = \"lunch\"\n").unwrap();

        let result = Config::load_from(&path);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_malformed_config_falls_back_to_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[reminders\nmorning = ").unwrap();

        assert!(Config::load_from(&path).is_err());
        let config = Config::load_from_or_default(&path);
        assert_eq!(config.reminders.morning, "08:00");
        assert_eq!(config.reminders.poll_seconds, 30);
    }
}
