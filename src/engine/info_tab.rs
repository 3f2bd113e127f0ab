//! Device information and calibration tabs
//!
//! One component covers the three read-mostly tabs. What differs between
//! them is a capability set:
//!
//! | Tab                   | `editable` | `compare_factory` |
//! |-----------------------|------------|-------------------|
//! | Device info           | no         | no                |
//! | Factory calibration   | no         | no                |
//! | User calibration      | yes        | yes               |

use crate::device::{clean_properties, CalibrationEntry, CalibrationSet, Recorder};
use crate::engine::model::TabKind;
use crate::error::{ConfigError, DeviceError, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// What an info tab can do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InfoCapabilities {
    pub editable: bool,
    pub compare_factory: bool,
}

impl InfoCapabilities {
    pub fn for_kind(kind: TabKind) -> Self {
        match kind {
            TabKind::UserCalibration => Self {
                editable: true,
                compare_factory: true,
            },
            _ => Self::default(),
        }
    }
}

/// Properties not shown in the device info table
const HIDDEN_PROPERTIES: [&str; 4] = ["FwRev", "UniqueChipIDLong", "HasEsp32", "HasWiFi"];

/// A device info, factory or user calibration tab
#[derive(Debug, Clone)]
pub struct InfoTab {
    kind: TabKind,
    label: String,
    caps: InfoCapabilities,
    rows: Vec<(String, String)>,
    entries: Vec<CalibrationEntry>,
    factory: Vec<CalibrationEntry>,
    modified: bool,
}

impl InfoTab {
    /// Load the tab's contents from the recorder
    ///
    /// A recorder without calibration data gives an empty calibration tab.
    pub fn load(kind: TabKind, label: &str, recorder: &dyn Recorder) -> Result<Self> {
        let mut tab = Self {
            kind,
            label: label.to_string(),
            caps: InfoCapabilities::for_kind(kind),
            rows: Vec::new(),
            entries: Vec::new(),
            factory: Vec::new(),
            modified: false,
        };

        let calibration = match recorder.calibration() {
            Ok(cal) => Some(cal),
            Err(DeviceError::Unsupported(_)) => None,
            Err(e) => {
                tracing::warn!("Could not read calibration: {}", e);
                None
            }
        };

        match kind {
            TabKind::DeviceInfo => {
                let props = recorder.properties()?;
                tab.rows = device_rows(&props, calibration.as_ref());
                let info = recorder.info();
                if !info.serial.is_empty() {
                    set_row(&mut tab.rows, "Recorder Serial", info.serial);
                }
            }
            TabKind::FactoryCalibration => {
                if let Some(cal) = calibration {
                    tab.rows = calibration_rows(&cal);
                    tab.entries = cal.factory;
                }
            }
            TabKind::UserCalibration => {
                if let Some(cal) = calibration {
                    tab.entries = cal.user.unwrap_or_default();
                    tab.factory = cal.factory;
                }
            }
            _ => {
                return Err(ConfigError::Schema(format!(
                    "{:?} is not an info tab",
                    kind
                )))
            }
        }
        Ok(tab)
    }

    pub fn kind(&self) -> TabKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn capabilities(&self) -> InfoCapabilities {
        self.caps
    }

    /// Key/value rows, sorted by key
    pub fn rows(&self) -> &[(String, String)] {
        &self.rows
    }

    pub fn entries(&self) -> &[CalibrationEntry] {
        &self.entries
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Start a user calibration from a copy of the factory calibration
    pub fn create_from_factory(&mut self) {
        if self.caps.editable && self.entries.is_empty() {
            self.entries = self.factory.clone();
            self.modified = true;
        }
    }

    /// Change one coefficient of an entry
    pub fn set_coefficient(&mut self, entry: usize, index: usize, value: f64) -> Result<()> {
        if !self.caps.editable {
            return Err(ConfigError::Config(format!("{} is read-only", self.label)));
        }
        let coefficient = self
            .entries
            .get_mut(entry)
            .and_then(|e| e.coefficients.get_mut(index))
            .ok_or_else(|| {
                ConfigError::Config(format!("No coefficient {} in entry {}", index, entry))
            })?;
        if *coefficient != value {
            *coefficient = value;
            self.modified = true;
        }
        Ok(())
    }

    fn factory_for(&self, entry: &CalibrationEntry) -> Option<&CalibrationEntry> {
        self.factory.iter().find(|f| f.id == entry.id)
    }

    /// True if the entry differs from its factory counterpart
    pub fn differs_from_factory(&self, entry: usize) -> bool {
        if !self.caps.compare_factory {
            return false;
        }
        match self.entries.get(entry) {
            Some(e) => self.factory_for(e).is_some_and(|f| f != e),
            None => false,
        }
    }

    /// Restore one entry to the factory values
    pub fn revert_to_factory(&mut self, entry: usize) {
        let Some(current) = self.entries.get(entry) else {
            return;
        };
        if let Some(factory) = self.factory_for(current).cloned() {
            self.entries[entry] = factory;
            self.modified = true;
        }
    }

    /// Write an edited user calibration back to the recorder
    ///
    /// Returns true if anything was written.
    pub fn save(&mut self, recorder: &dyn Recorder) -> Result<bool> {
        if !self.caps.editable || !self.modified || self.entries.is_empty() {
            return Ok(false);
        }
        recorder.write_user_calibration(&self.entries)?;
        tracing::info!("Wrote {} user calibration entries", self.entries.len());
        self.modified = false;
        Ok(true)
    }
}

/// Break a CamelCase key into words ("DateOfManufacture" -> "Date of Manufacture")
pub fn from_camel_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    let mut last: Option<char> = None;
    for c in s.chars() {
        if c.is_uppercase() && last.is_some_and(char::is_lowercase) {
            out.push(' ');
        }
        out.push(c);
        last = Some(c);
    }
    out.replace("ID", "ID ")
        .replace("UTC", "UTC ")
        .replace(" Of ", " of ")
        .trim_end()
        .to_string()
}

fn format_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn format_date(d: Option<DateTime<Utc>>) -> String {
    d.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

fn set_row(rows: &mut Vec<(String, String)>, key: &str, value: String) {
    match rows.iter_mut().find(|(k, _)| k == key) {
        Some(row) => row.1 = value,
        None => rows.push((key.to_string(), value)),
    }
    rows.sort_by(|a, b| a.0.cmp(&b.0));
}

fn device_rows(props: &Value, calibration: Option<&CalibrationSet>) -> Vec<(String, String)> {
    let props = clean_properties(props);
    let mut rows: Vec<(String, String)> = Vec::new();
    if let Some(info) = props["RecorderInfo"].as_object() {
        let has_fw_str = info.contains_key("FwRevStr");
        for (k, v) in info {
            if (k == "FwRev" && !has_fw_str) || !HIDDEN_PROPERTIES.contains(&k.as_str()) {
                if k.starts_with("Unknown") {
                    continue;
                }
                rows.push((from_camel_case(k), format_value(v)));
            }
        }
    }
    if let Some(cal) = calibration {
        if let Some(serial) = cal.serial {
            rows.push(("Calibration Serial Number".to_string(), serial.to_string()));
        }
        rows.push(("Calibration Date".to_string(), format_date(cal.date)));
        rows.push((
            "Calibration Expiration Date".to_string(),
            format_date(cal.expires),
        ));
    }
    rows.sort_by(|a, b| a.0.cmp(&b.0));
    rows
}

fn calibration_rows(cal: &CalibrationSet) -> Vec<(String, String)> {
    let mut rows = Vec::new();
    if let Some(serial) = cal.serial {
        rows.push(("Calibration Serial Number".to_string(), serial.to_string()));
    }
    rows.push(("Calibration Date".to_string(), format_date(cal.date)));
    rows.push((
        "Calibration Expiration Date".to_string(),
        format_date(cal.expires),
    ));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MockRecorder;

    fn entry(id: u32, c: f64) -> CalibrationEntry {
        CalibrationEntry {
            id,
            channel: format!("ch{}", id),
            coefficients: vec![c, 0.0],
            references: vec![0.0],
        }
    }

    fn recorder() -> MockRecorder {
        MockRecorder::new("S3-D16", "77").with_calibration(CalibrationSet {
            serial: Some(5),
            factory: vec![entry(1, 1.0), entry(2, 2.0)],
            ..Default::default()
        })
    }

    #[test]
    fn test_camel_case() {
        assert_eq!(from_camel_case("DateOfManufacture"), "Date of Manufacture");
        assert_eq!(from_camel_case("ProductName"), "Product Name");
        assert_eq!(from_camel_case("UniqueChipID"), "Unique Chip ID");
    }

    #[test]
    fn test_device_info_rows() {
        let rec = recorder();
        let tab = InfoTab::load(TabKind::DeviceInfo, "Recorder Info", &rec).unwrap();
        let keys: Vec<&str> = tab.rows().iter().map(|(k, _)| k.as_str()).collect();
        assert!(keys.contains(&"Product Name"));
        assert!(keys.contains(&"Fw Rev Str"));
        assert!(!keys.contains(&"Fw Rev"));
        assert!(keys.contains(&"Calibration Serial Number"));
        assert!(!tab.capabilities().editable);
    }

    #[test]
    fn test_factory_tab_is_read_only() {
        let rec = recorder();
        let mut tab = InfoTab::load(TabKind::FactoryCalibration, "Factory", &rec).unwrap();
        assert_eq!(tab.entries().len(), 2);
        assert!(tab.set_coefficient(0, 0, 3.0).is_err());
        assert!(!tab.save(&rec).unwrap());
    }

    #[test]
    fn test_user_calibration_edit_and_revert() {
        let rec = recorder();
        let mut tab = InfoTab::load(TabKind::UserCalibration, "User", &rec).unwrap();
        assert!(tab.entries().is_empty());

        tab.create_from_factory();
        assert_eq!(tab.entries().len(), 2);
        assert!(!tab.differs_from_factory(0));

        tab.set_coefficient(0, 0, 1.5).unwrap();
        assert!(tab.differs_from_factory(0));
        tab.revert_to_factory(0);
        assert!(!tab.differs_from_factory(0));

        tab.set_coefficient(1, 1, 0.25).unwrap();
        assert!(tab.save(&rec).unwrap());
        assert!(rec.commands().contains(&"write_user_calibration"));
        assert!(!tab.is_modified());
    }
}
