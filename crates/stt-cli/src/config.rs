//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::Weekday;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use stt_core::CalendarConfig;

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,

    /// Day weeks start on (e.g. `Mon`, `sunday`).
    pub first_day_of_week: Weekday,

    /// Offset of the day boundary from local midnight, in milliseconds.
    pub day_start_offset_ms: i64,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("first_day_of_week", &self.first_day_of_week)
            .field("day_start_offset_ms", &self.day_start_offset_ms)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        let calendar = CalendarConfig::default();
        Self {
            database_path: data_dir.join("stt.db"),
            first_day_of_week: calendar.first_day_of_week,
            day_start_offset_ms: calendar.day_start_offset_ms,
        }
    }
}

impl Config {
    /// Loads configuration from default locations.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(None)
    }

    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (STT_*)
        figment = figment.merge(Env::prefixed("STT_"));

        figment.extract()
    }

    /// Calendar preferences for range resolution.
    pub const fn calendar(&self) -> CalendarConfig {
        CalendarConfig {
            first_day_of_week: self.first_day_of_week,
            day_start_offset_ms: self.day_start_offset_ms,
        }
    }
}

/// Returns the platform-specific config directory for stt.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("stt"))
}

/// Returns the platform-specific data directory for stt.
///
/// On Linux: `~/.local/share/stt`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("stt"))
}
