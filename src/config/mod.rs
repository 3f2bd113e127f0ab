//! Configuration module for enDAQ Config
//!
//! This module handles application configuration:
//! - Application state persistence (recent devices, UI preferences, last
//!   dialog options) in `app_state.json`
//! - User-editable settings (scan timing, search roots) in `settings.toml`,
//!   see [`settings`]
//!
//! # App Data Location
//!
//! Application data is stored in the platform-appropriate location:
//! - **Linux**: `~/.local/share/io.endaq.config/`
//! - **macOS**: `~/Library/Application Support/io.endaq.config/`
//! - **Windows**: `%APPDATA%\io.endaq.config\`
//!
//! Log files are written to the `logs/` subdirectory.
//!
//! # Example
//!
//! ```ignore
//! use endaq_config::config::AppState;
//!
//! let mut state = AppState::load_or_default();
//! state.add_recent_device("/media/user/SSS", "Bridge Deck", "10001");
//! state.save()?;
//! ```

pub mod settings;

pub use settings::*;

use crate::engine::DialogOptions;
use crate::error::{ConfigError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for data directories
pub const APP_ID: &str = "io.endaq.config";

/// App state filename
pub const APP_STATE_FILE: &str = "app_state.json";

/// Settings filename
pub const SETTINGS_FILE: &str = "settings.toml";

/// Log directory name, under the app data directory
pub const LOG_DIR: &str = "logs";

/// Maximum number of recent devices to remember
pub const MAX_RECENT_DEVICES: usize = 10;

// ==================== App Data Directory ====================

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Ensure the app data directory exists
pub fn ensure_app_data_dir() -> Result<PathBuf> {
    let dir = app_data_dir().ok_or_else(|| {
        ConfigError::Config("Could not determine app data directory".to_string())
    })?;

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| {
            ConfigError::Config(format!("Failed to create app data directory: {}", e))
        })?;
    }

    Ok(dir)
}

/// Get the path to the app state file
pub fn app_state_path() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(APP_STATE_FILE))
}

/// Get the path to the settings file
pub fn settings_path() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(SETTINGS_FILE))
}

/// Directory for rolling log files
pub fn log_dir() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(LOG_DIR))
}

// ==================== Recent Device Entry ====================

/// A recorder that was configured recently
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentDevice {
    /// Mount point or path of the recorder
    pub path: PathBuf,

    /// User-assigned recorder name at the time
    pub name: String,

    pub serial: String,

    pub last_opened: DateTime<Utc>,
}

impl RecentDevice {
    pub fn new(path: impl Into<PathBuf>, name: impl Into<String>, serial: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            serial: serial.into(),
            last_opened: Utc::now(),
        }
    }

    /// Label for menus: the name if set, else the serial number
    pub fn label(&self) -> String {
        if self.name.is_empty() {
            format!("SN:{}", self.serial)
        } else {
            format!("{} (SN:{})", self.name, self.serial)
        }
    }
}

// ==================== App State ====================

/// Persistent application state
///
/// Stores preferences and history that persist across sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppState {
    /// Version for future migration support
    #[serde(default = "default_app_state_version")]
    pub version: u32,

    /// Recently configured devices, most recent first
    #[serde(default)]
    pub recent_devices: Vec<RecentDevice>,

    /// Dialog options last used
    #[serde(default)]
    pub last_options: LastOptions,

    #[serde(default)]
    pub ui_preferences: UiPreferences,
}

fn default_app_state_version() -> u32 {
    1
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            version: 1,
            recent_devices: Vec::new(),
            last_options: LastOptions::default(),
            ui_preferences: UiPreferences::default(),
        }
    }
}

impl AppState {
    /// Load app state from the default location
    pub fn load() -> Result<Self> {
        let path = app_state_path().ok_or_else(|| {
            ConfigError::Config("Could not determine app state path".to_string())
        })?;
        Self::load_from(&path)
    }

    /// Load app state from a file; a missing file gives defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Config(format!("Failed to read app state: {}", e)))?;

        serde_json::from_str(&content)
            .map_err(|e| ConfigError::Config(format!("Failed to parse app state: {}", e)))
    }

    /// Load app state, returning defaults on any error
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!("Failed to load app state, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save app state to the default location
    pub fn save(&self) -> Result<()> {
        let dir = ensure_app_data_dir()?;
        self.save_to(&dir.join(APP_STATE_FILE))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Config(format!("Failed to serialize app state: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ConfigError::Config(format!("Failed to write app state: {}", e)))
    }

    /// Add or update a recent device, moving it to the front
    pub fn add_recent_device(&mut self, path: impl AsRef<Path>, name: &str, serial: &str) {
        let path = path.as_ref().to_path_buf();
        self.recent_devices
            .retain(|d| d.path != path && (serial.is_empty() || d.serial != serial));
        self.recent_devices
            .insert(0, RecentDevice::new(path, name, serial));
        self.recent_devices.truncate(MAX_RECENT_DEVICES);
    }

    pub fn remove_recent_device(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        self.recent_devices.retain(|d| d.path != path);
    }

    /// Options for a new dialog, from what was used last
    pub fn dialog_options(&self, show_advanced: bool) -> DialogOptions {
        DialogOptions {
            set_time: self.last_options.set_time,
            use_utc: self.last_options.use_utc,
            save_on_ok: true,
            show_advanced,
        }
    }

    /// Remember the options a dialog closed with
    pub fn remember_options(&mut self, set_time: bool, use_utc: bool) {
        self.last_options = LastOptions { set_time, use_utc };
    }
}

/// Dialog checkboxes remembered between runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastOptions {
    #[serde(default = "default_true")]
    pub set_time: bool,
    #[serde(default = "default_true")]
    pub use_utc: bool,
}

impl Default for LastOptions {
    fn default() -> Self {
        Self {
            set_time: true,
            use_utc: true,
        }
    }
}

/// UI preferences that persist across sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiPreferences {
    /// Enable dark mode
    #[serde(default)]
    pub dark_mode: bool,

    /// Font scale factor
    #[serde(default = "default_font_scale")]
    pub font_scale: f32,

    /// Show hardware and firmware columns in the device list
    #[serde(default)]
    pub show_advanced_columns: bool,
}

fn default_true() -> bool {
    true
}

fn default_font_scale() -> f32 {
    1.0
}

impl Default for UiPreferences {
    fn default() -> Self {
        Self {
            dark_mode: false,
            font_scale: 1.0,
            show_advanced_columns: false,
        }
    }
}

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_state_default() {
        let state = AppState::default();
        assert!(state.recent_devices.is_empty());
        assert_eq!(state.version, 1);
        assert!(state.last_options.set_time);
    }

    #[test]
    fn test_add_recent_device() {
        let mut state = AppState::default();

        state.add_recent_device("/media/a", "Deck", "1");
        state.add_recent_device("/media/b", "", "2");
        assert_eq!(state.recent_devices.len(), 2);
        assert_eq!(state.recent_devices[0].serial, "2");
        assert_eq!(state.recent_devices[0].label(), "SN:2");

        // Same serial on another mount point replaces the entry
        state.add_recent_device("/media/c", "Deck", "1");
        assert_eq!(state.recent_devices.len(), 2);
        assert_eq!(state.recent_devices[0].path, PathBuf::from("/media/c"));
    }

    #[test]
    fn test_recent_devices_max_limit() {
        let mut state = AppState::default();
        for i in 0..15 {
            state.add_recent_device(format!("/media/{}", i), "", &i.to_string());
        }
        assert_eq!(state.recent_devices.len(), MAX_RECENT_DEVICES);
    }

    #[test]
    fn test_dialog_options_follow_last_used() {
        let mut state = AppState::default();
        state.remember_options(false, true);
        let options = state.dialog_options(true);
        assert!(!options.set_time);
        assert!(options.use_utc);
        assert!(options.save_on_ok);
        assert!(options.show_advanced);
    }

    #[test]
    fn test_app_state_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(APP_STATE_FILE);
        assert_eq!(AppState::load_from(&path).unwrap(), AppState::default());

        let mut state = AppState::default();
        state.add_recent_device("/media/x", "Deck", "7");
        state.ui_preferences.show_advanced_columns = true;
        state.save_to(&path).unwrap();
        assert_eq!(AppState::load_from(&path).unwrap(), state);
    }

    #[test]
    fn test_partial_state_uses_defaults() {
        let parsed: AppState = serde_json::from_str(r#"{"recent_devices": []}"#).unwrap();
        assert_eq!(parsed.version, 1);
        assert!(parsed.last_options.use_utc);
    }
}
