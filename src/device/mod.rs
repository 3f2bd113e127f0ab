//! Recording device access
//!
//! Everything the application knows about a recorder goes through the
//! [`Recorder`] trait, so the UI and the configuration engine never touch
//! device files or command interfaces directly.
//!
//! # Components
//!
//! - [`Recorder`] / [`DeviceEnumerator`] - the device adapter interface
//! - [`DirectoryRecorder`] - a recorder mounted as a mass-storage volume
//! - [`MockRecorder`] - an in-memory recorder for tests and demo mode
//! - [`DeviceScanner`] - background thread that keeps the device list current
//! - [`DeviceCommandThread`] - fire-and-forget command execution
//! - [`status`] - status, battery and warning presentation

pub mod command;
pub mod file_device;
pub mod mock_device;
pub mod scanner;
pub mod status;

pub use command::{fan_out_with_deadline, CommandOutcome, DeviceCommandThread, FanOutReport};
pub use file_device::{DirectoryEnumerator, DirectoryRecorder};
pub use mock_device::{MockEnumerator, MockRecorder};
pub use scanner::{DeviceEntry, DeviceListUpdate, DeviceScanner, ScanCommand, ScanHandle, ScanMessage};

use crate::error::{DeviceError, DeviceResult, Result};
use crate::schema::SchemaDocument;
use crate::types::ConfigSnapshot;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

/// Device status code as reported by the command interface
pub type StatusCode = i32;

/// Idle / ready
pub const STATUS_IDLE: StatusCode = 0;

/// Shared handle to a recorder
pub type SharedRecorder = Arc<dyn Recorder>;

// ==== Device identity ====

/// Identity and capabilities of a recorder, read from its properties
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceInfo {
    pub product_name: String,
    pub part_number: String,
    pub serial: String,
    /// User-assigned recorder name
    pub name: String,
    pub hardware_revision: Option<i64>,
    pub firmware_revision: Option<i64>,
    /// Firmware version string, e.g. "3.1.12"
    pub firmware: Option<String>,
    pub path: Option<PathBuf>,
    pub manufactured: Option<DateTime<Utc>>,
    /// Expected service life, in days from manufacture
    pub lifespan_days: Option<i64>,
    pub has_wifi: bool,
    pub has_command_interface: bool,
    pub can_record: bool,
}

impl DeviceInfo {
    /// Read identity from a properties document (`RecorderInfo` section)
    pub fn from_properties(props: &Value) -> Self {
        let info = &props["RecorderInfo"];
        let text = |key: &str| info[key].as_str().unwrap_or_default().to_string();
        let flag = |key: &str| info[key].as_bool().unwrap_or(false);
        let serial = match &info["RecorderSerial"] {
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.clone(),
            _ => String::new(),
        };
        let has_command_interface = flag("SerialCommandInterface") || flag("FileCommandInterface");

        Self {
            product_name: text("ProductName"),
            part_number: text("PartNumber"),
            serial,
            name: String::new(),
            hardware_revision: info["HwRev"].as_i64(),
            firmware_revision: info["FwRev"].as_i64(),
            firmware: info["FwRevStr"].as_str().map(str::to_string),
            path: None,
            manufactured: info["DateOfManufacture"]
                .as_i64()
                .and_then(|t| Utc.timestamp_opt(t, 0).single()),
            lifespan_days: info["Lifespan"].as_i64(),
            has_wifi: flag("HasEsp32") || flag("HasWiFi"),
            has_command_interface,
            can_record: has_command_interface,
        }
    }

    /// Name used in error summaries
    pub fn display_name(&self) -> String {
        format!("{} SN:{}", self.product_name, self.serial)
    }

    /// Key identifying the device across scans
    pub fn key(&self) -> String {
        match &self.path {
            Some(path) => path.display().to_string(),
            None => format!("{}:{}", self.product_name, self.serial),
        }
    }

    /// Firmware as shown in the list
    pub fn firmware_label(&self) -> String {
        match (&self.firmware, self.firmware_revision) {
            (Some(s), _) => s.clone(),
            (None, Some(rev)) => rev.to_string(),
            (None, None) => String::new(),
        }
    }
}

// ==== Status ====

/// Battery state from a status query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BatteryStatus {
    pub has_battery: bool,
    pub external_power: bool,
    pub charging: bool,
    /// True if `level` is meaningful as a percentage
    pub percentage: bool,
    /// Charge level, 0-255
    pub level: u8,
}

impl BatteryStatus {
    /// Charge level in percent
    pub fn percent(&self) -> u8 {
        ((self.level as f64) * 0.39216 + 0.5) as u8
    }

    /// Human-readable description
    pub fn description(&self) -> String {
        if !self.has_battery {
            return String::new();
        }
        if self.external_power {
            return "Externally powered".to_string();
        }
        let level = self.percent();
        let mut desc = if level >= 20 && !self.percentage {
            "Partially charged".to_string()
        } else {
            format!("{}%", level)
        };
        if self.charging {
            desc.push_str(" (charging)");
        }
        desc
    }
}

// ==== Calibration ====

/// One calibration polynomial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationEntry {
    pub id: u32,
    #[serde(default)]
    pub channel: String,
    pub coefficients: Vec<f64>,
    #[serde(default)]
    pub references: Vec<f64>,
}

/// Factory and user calibration of a recorder
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSet {
    pub serial: Option<u32>,
    pub date: Option<DateTime<Utc>>,
    pub expires: Option<DateTime<Utc>>,
    pub factory: Vec<CalibrationEntry>,
    /// `None` if the recorder has no user calibration
    pub user: Option<Vec<CalibrationEntry>>,
}

// ==== Wi-Fi ====

/// An access point seen by a Wi-Fi scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessPoint {
    pub ssid: String,
    /// Signal strength; `None` for known networks not currently visible
    #[serde(default)]
    pub rssi: Option<f64>,
    #[serde(default)]
    pub auth: bool,
    #[serde(default)]
    pub known: bool,
    #[serde(default)]
    pub selected: bool,
}

/// A network stored on the recorder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownNetwork {
    pub ssid: String,
    #[serde(default)]
    pub selected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

// ==== Adapter traits ====

/// Interface to one recording device
///
/// Implementations must be shareable between the UI, the scan worker and
/// command threads. Calls that may block take a `cancel` callback and should
/// give up early once it returns true.
pub trait Recorder: Send + Sync {
    /// Identity and capabilities
    fn info(&self) -> DeviceInfo;

    /// Whether the device is still attached
    fn is_present(&self) -> bool {
        true
    }

    /// Full properties document (exported as `RecordingProperties`)
    fn properties(&self) -> DeviceResult<Value>;

    /// Raw configuration UI document
    fn config_ui_raw(&self) -> DeviceResult<String>;

    /// Parsed configuration UI document
    fn config_ui(&self) -> Result<SchemaDocument> {
        let raw = self.config_ui_raw()?;
        SchemaDocument::parse(&raw)
    }

    /// Configuration values
    ///
    /// With `original`, every stored value is returned as written, including
    /// IDs the configuration UI does not name. Otherwise only the values the
    /// configuration UI describes are returned.
    fn config_values(&self, original: bool) -> DeviceResult<ConfigSnapshot>;

    /// Format version of the stored configuration, if any was read
    fn config_version_read(&self) -> Option<u32>;

    /// Format versions the firmware accepts
    fn supported_config_versions(&self) -> Vec<u32>;

    /// Write configuration values
    ///
    /// With `unknown` set, stored values whose IDs are not in the
    /// configuration UI are kept.
    fn apply_config(&self, values: &ConfigSnapshot, unknown: bool, version: u32) -> DeviceResult<()>;

    /// Set the device clock to the current time
    fn set_time(&self) -> DeviceResult<()>;

    /// Last status reported by the device, if any
    fn status(&self) -> Option<StatusCode>;

    fn battery_status(&self, cancel: &dyn Fn() -> bool) -> DeviceResult<BatteryStatus>;

    /// Query the device, updating [`Recorder::status`]
    fn ping(&self, cancel: &dyn Fn() -> bool) -> DeviceResult<()>;

    fn start_recording(&self) -> DeviceResult<()>;

    fn stop_recording(&self) -> DeviceResult<()>;

    fn reset(&self) -> DeviceResult<()>;

    /// Free space on the device, in bytes
    fn free_space(&self) -> Option<u64> {
        None
    }

    fn calibration(&self) -> DeviceResult<CalibrationSet> {
        Err(DeviceError::Unsupported("calibration".to_string()))
    }

    fn write_user_calibration(&self, _entries: &[CalibrationEntry]) -> DeviceResult<()> {
        Err(DeviceError::Unsupported("user calibration".to_string()))
    }

    fn wifi_networks(&self) -> DeviceResult<Vec<KnownNetwork>> {
        Err(DeviceError::Unsupported("Wi-Fi".to_string()))
    }

    fn scan_wifi(&self, _cancel: &dyn Fn() -> bool) -> DeviceResult<Vec<AccessPoint>> {
        Err(DeviceError::Unsupported("Wi-Fi".to_string()))
    }

    fn set_wifi_networks(&self, _networks: &[KnownNetwork]) -> DeviceResult<()> {
        Err(DeviceError::Unsupported("Wi-Fi".to_string()))
    }
}

impl std::fmt::Debug for dyn Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let info = self.info();
        write!(f, "Recorder({})", info.display_name())
    }
}

/// Finds attached recorders
pub trait DeviceEnumerator: Send {
    /// All currently attached recorders
    fn get_devices(&mut self) -> DeviceResult<Vec<SharedRecorder>>;

    /// Cheap check for attach/detach since the last call
    fn device_changed(&mut self) -> bool;
}

/// Keep stored values whose IDs the configuration UI does not know
pub fn merge_unknown(
    values: &ConfigSnapshot,
    stored: &ConfigSnapshot,
    known: &std::collections::BTreeSet<crate::types::ConfigId>,
) -> ConfigSnapshot {
    let mut merged = values.clone();
    for (id, value) in stored.iter() {
        if !known.contains(&id) && !merged.contains(id) {
            merged.insert(id, value.clone());
        }
    }
    merged
}

/// Strip exported properties of `UnknownElement` entries and private
/// (`_`-prefixed) keys
pub fn clean_properties(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| k.as_str() != "UnknownElement" && !k.starts_with('_'))
                .map(|(k, v)| (k.clone(), clean_properties(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(clean_properties).collect()),
        other => other.clone(),
    }
}
