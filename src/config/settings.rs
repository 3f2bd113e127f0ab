//! User-editable settings (`settings.toml`)
//!
//! Everything here has a default, and a missing or partial file is fine:
//!
//! ```toml
//! scan_interval_ms = 1000
//! retention_ms = 4000
//! clock_deadline_ms = 5000
//! extra_roots = ["/mnt/recorders"]
//! ```

use crate::device::scanner::{ScanConfig, DEFAULT_RETENTION, DEFAULT_SCAN_INTERVAL};
use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default deadline for "set all clocks"
pub const DEFAULT_CLOCK_DEADLINE: Duration = Duration::from_secs(5);

/// Settings read from `settings.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Time between device scans
    pub scan_interval_ms: u64,

    /// How long a vanished device stays listed
    pub retention_ms: u64,

    /// How long "set all clocks" waits for every device
    pub clock_deadline_ms: u64,

    /// Initial state of "set clock on save" when nothing was remembered
    pub set_clock_default: bool,

    /// Initial state of "use UTC" when nothing was remembered
    pub use_utc_default: bool,

    /// Directories searched for recorders besides the usual mount points
    pub extra_roots: Vec<PathBuf>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            scan_interval_ms: DEFAULT_SCAN_INTERVAL.as_millis() as u64,
            retention_ms: DEFAULT_RETENTION.as_millis() as u64,
            clock_deadline_ms: DEFAULT_CLOCK_DEADLINE.as_millis() as u64,
            set_clock_default: true,
            use_utc_default: true,
            extra_roots: Vec::new(),
        }
    }
}

impl AppSettings {
    /// Load settings from a file; a missing file gives defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Config(format!("Failed to read settings: {}", e)))?;
        let settings: Self = toml::from_str(&content)
            .map_err(|e| ConfigError::Config(format!("Failed to parse settings: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from the default location, returning defaults on any error
    pub fn load_or_default() -> Self {
        let Some(path) = super::settings_path() else {
            return Self::default();
        };
        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load settings, using defaults: {}", e);
            Self::default()
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Config(format!("Failed to serialize settings: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)
            .map_err(|e| ConfigError::Config(format!("Failed to write settings: {}", e)))
    }

    fn validate(&self) -> Result<()> {
        if self.scan_interval_ms == 0 {
            return Err(ConfigError::Config(
                "scan_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.clock_deadline_ms == 0 {
            return Err(ConfigError::Config(
                "clock_deadline_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            interval: Duration::from_millis(self.scan_interval_ms),
            retention: Duration::from_millis(self.retention_ms),
            one_shot: false,
        }
    }

    pub fn clock_deadline(&self) -> Duration {
        Duration::from_millis(self.clock_deadline_ms)
    }
}
