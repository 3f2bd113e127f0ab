//! Shared state types for the frontend
//!
//! The device list keeps the latest scan result plus the per-device warnings
//! computed from it. Widgets never act on devices directly; they return
//! [`AppAction`]s that [`super::ConfigApp`] applies after rendering.

use chrono::{DateTime, Utc};

use crate::device::scanner::{DeviceEntry, DeviceListUpdate};
use crate::device::status::{device_warnings, status_display, worst_severity, DeviceWarning, Severity, StatusDisplay};

/// A device list row with its precomputed warnings
#[derive(Debug, Clone)]
pub struct DeviceRow {
    pub entry: DeviceEntry,
    pub warnings: Vec<DeviceWarning>,
}

impl DeviceRow {
    pub fn new(entry: DeviceEntry, now: DateTime<Utc>) -> Self {
        let expires = match entry.recorder.calibration() {
            Ok(cal) => cal.expires,
            Err(_) => None,
        };
        let warnings = device_warnings(&entry.info, entry.recorder.free_space(), expires, now);
        Self { entry, warnings }
    }

    pub fn key(&self) -> String {
        self.entry.info.key()
    }

    pub fn status(&self) -> StatusDisplay {
        status_display(self.entry.status, self.entry.present)
    }

    pub fn severity(&self) -> Severity {
        worst_severity(&self.warnings)
    }
}

/// Rows of the device list and the current selection
#[derive(Debug, Default)]
pub struct DeviceListState {
    rows: Vec<DeviceRow>,
    selected: Option<String>,
    scans: u64,
}

impl DeviceListState {
    /// Replace the rows with a new scan result, keeping the selection if the
    /// selected device is still listed
    pub fn apply_update(&mut self, update: DeviceListUpdate, now: DateTime<Utc>) {
        self.rows = update
            .devices
            .into_iter()
            .map(|entry| DeviceRow::new(entry, now))
            .collect();
        if let Some(key) = &self.selected {
            if !self.rows.iter().any(|r| &r.key() == key) {
                self.selected = None;
            }
        }
        self.scans += 1;
    }

    pub fn rows(&self) -> &[DeviceRow] {
        &self.rows
    }

    /// Number of attached devices
    pub fn present_count(&self) -> usize {
        self.rows.iter().filter(|r| r.entry.present).count()
    }

    /// Completed scans since start
    pub fn scan_count(&self) -> u64 {
        self.scans
    }

    pub fn select(&mut self, key: Option<String>) {
        self.selected = key;
    }

    pub fn selected_key(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn selected(&self) -> Option<&DeviceRow> {
        let key = self.selected.as_deref()?;
        self.rows.iter().find(|r| r.key() == key)
    }

    pub fn find(&self, key: &str) -> Option<&DeviceRow> {
        self.rows.iter().find(|r| r.key() == key)
    }
}

/// Actions the device list, menus and dialogs can emit
///
/// Devices are addressed by [`crate::device::DeviceInfo::key`].
#[derive(Debug, Clone, PartialEq)]
pub enum AppAction {
    /// Open the configuration dialog for a device
    Configure(String),
    StartRecording(String),
    StopRecording(String),
    /// Set the clock of every attached device
    SetAllClocks,
    /// Force a full rescan
    Rescan,
    OpenPreferences,
    /// Toggle advanced mode (extra columns, advanced fields)
    SetAdvanced(bool),
    Quit,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{MockRecorder, SharedRecorder};
    use std::sync::Arc;

    fn entry(serial: &str, present: bool) -> DeviceEntry {
        let recorder: SharedRecorder = Arc::new(MockRecorder::new("S3-E25D40", serial));
        DeviceEntry {
            info: recorder.info(),
            recorder,
            present,
            battery: None,
            status: None,
        }
    }

    #[test]
    fn test_selection_survives_rescan() {
        let mut state = DeviceListState::default();
        state.apply_update(
            DeviceListUpdate {
                devices: vec![entry("100", true), entry("101", true)],
            },
            Utc::now(),
        );
        let key = state.rows()[1].key();
        state.select(Some(key.clone()));

        state.apply_update(
            DeviceListUpdate {
                devices: vec![entry("101", false)],
            },
            Utc::now(),
        );
        assert_eq!(state.selected_key(), Some(key.as_str()));
        assert_eq!(state.present_count(), 0);

        state.apply_update(DeviceListUpdate::default(), Utc::now());
        assert!(state.selected().is_none());
        assert_eq!(state.scan_count(), 3);
    }
}
