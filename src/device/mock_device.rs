//! Mock Recorder Implementation
//!
//! An in-memory recorder used by the test suite and by `--demo` mode. It
//! keeps everything a real device would store (properties, configuration UI,
//! configuration values, calibration, Wi-Fi networks) and records every
//! write and command so tests can inspect them.
//!
//! # Example
//!
//! ```ignore
//! use endaq_config::device::{MockRecorder, Recorder};
//!
//! let recorder = MockRecorder::new("S3-D16", "10001")
//!     .with_version(Some(1), vec![1, 2])
//!     .with_wifi();
//!
//! recorder.set_time()?;
//! assert_eq!(recorder.commands(), vec!["set_time"]);
//! ```

use crate::device::{
    merge_unknown, AccessPoint, BatteryStatus, CalibrationEntry, CalibrationSet, DeviceEnumerator,
    DeviceInfo, KnownNetwork, Recorder, SharedRecorder, StatusCode, STATUS_IDLE,
};
use crate::error::{DeviceError, DeviceResult};
use crate::schema::SchemaDocument;
use crate::types::{ConfigSnapshot, ConfigValue, ID_RECORDER_NAME};
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Configuration UI used by demo recorders
pub const DEMO_CONFIG_UI: &str = include_str!("../../assets/demo_config_ui.json");

/// How a mock answers battery queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryBehavior {
    Report(BatteryStatus),
    /// Old firmware: the query is not supported at all
    Unsupported,
    /// The device rejects the command; status comes from a ping instead
    Rejected,
}

/// A failure a mock can be told to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Removed,
    Locked,
    Busy,
    Timeout,
    Io(std::io::ErrorKind),
    Command,
}

impl MockFailure {
    fn to_error(self, what: &str) -> DeviceError {
        match self {
            MockFailure::Removed => DeviceError::Removed,
            MockFailure::Locked => DeviceError::Locked(what.to_string()),
            MockFailure::Busy => DeviceError::Busy,
            MockFailure::Timeout => DeviceError::Timeout(what.to_string()),
            MockFailure::Io(kind) => DeviceError::Io(std::io::Error::new(kind, what.to_string())),
            MockFailure::Command => DeviceError::Command(what.to_string()),
        }
    }
}

#[derive(Debug)]
struct MockState {
    info: DeviceInfo,
    properties: Value,
    config_ui: String,
    values: ConfigSnapshot,
    version_read: Option<u32>,
    supported: Vec<u32>,
    status: Option<StatusCode>,
    ping_status: Option<StatusCode>,
    battery: BatteryBehavior,
    free_space: Option<u64>,
    calibration: Option<CalibrationSet>,
    networks: Vec<KnownNetwork>,
    visible: Vec<AccessPoint>,
    apply_failure: Option<MockFailure>,
    set_time_failure: Option<MockFailure>,
    set_time_delay: Duration,
    writes: Vec<(ConfigSnapshot, u32)>,
    commands: Vec<&'static str>,
}

/// In-memory recorder
#[derive(Debug)]
pub struct MockRecorder {
    state: Mutex<MockState>,
    present: AtomicBool,
}

impl MockRecorder {
    /// A bare recorder with the demo configuration UI and no values
    pub fn new(product: &str, serial: &str) -> Self {
        let properties = json!({
            "RecorderInfo": {
                "ProductName": product,
                "PartNumber": format!("{}-DC", product),
                "RecorderSerial": serial,
                "HwRev": 2,
                "FwRev": 12,
                "FwRevStr": "3.1.12",
                "SerialCommandInterface": true,
            }
        });
        let info = DeviceInfo::from_properties(&properties);

        Self {
            state: Mutex::new(MockState {
                info,
                properties,
                config_ui: DEMO_CONFIG_UI.to_string(),
                values: ConfigSnapshot::new(),
                version_read: None,
                supported: vec![1, 2],
                status: Some(STATUS_IDLE),
                ping_status: Some(STATUS_IDLE),
                battery: BatteryBehavior::Report(BatteryStatus {
                    has_battery: true,
                    percentage: true,
                    level: 200,
                    ..Default::default()
                }),
                free_space: None,
                calibration: None,
                networks: Vec::new(),
                visible: Vec::new(),
                apply_failure: None,
                set_time_failure: None,
                set_time_delay: Duration::ZERO,
                writes: Vec::new(),
                commands: Vec::new(),
            }),
            present: AtomicBool::new(true),
        }
    }

    /// A fully populated recorder for demo mode
    pub fn demo(product: &str, serial: &str, name: &str) -> Self {
        let now = Utc::now();
        let mut values = ConfigSnapshot::new();
        values.insert(ID_RECORDER_NAME, name);
        values.insert(0x0bff7f, 120i64);
        values.insert(0x01ff08, true);
        values.insert(0x02ff08, 1000i64);
        values.insert(0x01ff24, true);
        values.insert(0x02ff24, 0.5);
        let factory = vec![
            CalibrationEntry {
                id: 1,
                channel: "Accelerometer X".to_string(),
                coefficients: vec![1.0021, -0.0132],
                references: vec![0.0],
            },
            CalibrationEntry {
                id: 2,
                channel: "Accelerometer Y".to_string(),
                coefficients: vec![0.9987, 0.0071],
                references: vec![0.0],
            },
        ];

        let recorder = Self::new(product, serial)
            .with_values(values, Some(2))
            .with_wifi()
            .with_free_space(48 * 1024 * 1024)
            .with_calibration(CalibrationSet {
                serial: Some(1234),
                date: Some(now - ChronoDuration::days(300)),
                expires: Some(now + ChronoDuration::days(65)),
                factory,
                user: None,
            });
        {
            let mut state = recorder.state();
            state.info.name = name.to_string();
            state.info.manufactured = Some(now - ChronoDuration::days(700));
            state.info.lifespan_days = Some(1825);
            state.visible = vec![
                AccessPoint {
                    ssid: "Lab".to_string(),
                    rssi: Some(-48.0),
                    auth: true,
                    known: true,
                    selected: true,
                },
                AccessPoint {
                    ssid: "Guest".to_string(),
                    rssi: Some(-71.0),
                    auth: false,
                    known: false,
                    selected: false,
                },
            ];
            state.networks = vec![KnownNetwork {
                ssid: "Lab".to_string(),
                selected: true,
                password: None,
            }];
        }
        recorder
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ==== Builders ====

    pub fn with_config_ui(self, raw: &str) -> Self {
        self.state().config_ui = raw.to_string();
        self
    }

    pub fn with_values(self, values: ConfigSnapshot, version: Option<u32>) -> Self {
        {
            let mut state = self.state();
            if let Some(ConfigValue::Text(name)) = values.get(ID_RECORDER_NAME) {
                state.info.name = name.clone();
            }
            state.values = values;
            state.version_read = version;
        }
        self
    }

    pub fn with_version(self, read: Option<u32>, supported: Vec<u32>) -> Self {
        {
            let mut state = self.state();
            state.version_read = read;
            state.supported = supported;
        }
        self
    }

    pub fn with_properties(self, properties: Value) -> Self {
        {
            let mut state = self.state();
            let name = std::mem::take(&mut state.info.name);
            state.info = DeviceInfo::from_properties(&properties);
            state.info.name = name;
            state.properties = properties;
        }
        self
    }

    pub fn with_wifi(self) -> Self {
        {
            let mut state = self.state();
            state.info.has_wifi = true;
            state.properties["RecorderInfo"]["HasEsp32"] = Value::Bool(true);
        }
        self
    }

    pub fn without_command_interface(self) -> Self {
        {
            let mut state = self.state();
            state.info.has_command_interface = false;
            state.info.can_record = false;
            state.status = None;
        }
        self
    }

    pub fn with_status(self, status: Option<StatusCode>) -> Self {
        {
            let mut state = self.state();
            state.status = status;
            state.ping_status = status;
        }
        self
    }

    pub fn with_battery(self, battery: BatteryBehavior) -> Self {
        self.state().battery = battery;
        self
    }

    pub fn with_free_space(self, bytes: u64) -> Self {
        self.state().free_space = Some(bytes);
        self
    }

    pub fn with_calibration(self, calibration: CalibrationSet) -> Self {
        self.state().calibration = Some(calibration);
        self
    }

    pub fn with_networks(self, known: Vec<KnownNetwork>, visible: Vec<AccessPoint>) -> Self {
        {
            let mut state = self.state();
            state.networks = known;
            state.visible = visible;
        }
        self
    }

    pub fn failing_apply(self, failure: MockFailure) -> Self {
        self.state().apply_failure = Some(failure);
        self
    }

    pub fn failing_set_time(self, failure: MockFailure) -> Self {
        self.state().set_time_failure = Some(failure);
        self
    }

    /// Make `set_time` block for a while
    pub fn with_set_time_delay(self, delay: Duration) -> Self {
        self.state().set_time_delay = delay;
        self
    }

    // ==== Inspection ====

    pub fn set_present(&self, present: bool) {
        self.present.store(present, Ordering::SeqCst);
    }

    /// Every `(values, version)` written with `apply_config`
    pub fn writes(&self) -> Vec<(ConfigSnapshot, u32)> {
        self.state().writes.clone()
    }

    pub fn last_write(&self) -> Option<(ConfigSnapshot, u32)> {
        self.state().writes.last().cloned()
    }

    /// Names of commands received, in order
    pub fn commands(&self) -> Vec<&'static str> {
        self.state().commands.clone()
    }

    pub fn stored_values(&self) -> ConfigSnapshot {
        self.state().values.clone()
    }

    pub fn stored_networks(&self) -> Vec<KnownNetwork> {
        self.state().networks.clone()
    }

    fn command(&self, name: &'static str) -> DeviceResult<()> {
        if !self.is_present() {
            return Err(DeviceError::Removed);
        }
        self.state().commands.push(name);
        Ok(())
    }
}

impl Recorder for MockRecorder {
    fn info(&self) -> DeviceInfo {
        self.state().info.clone()
    }

    fn is_present(&self) -> bool {
        self.present.load(Ordering::SeqCst)
    }

    fn properties(&self) -> DeviceResult<Value> {
        Ok(self.state().properties.clone())
    }

    fn config_ui_raw(&self) -> DeviceResult<String> {
        Ok(self.state().config_ui.clone())
    }

    fn config_values(&self, original: bool) -> DeviceResult<ConfigSnapshot> {
        let state = self.state();
        if original {
            return Ok(state.values.clone());
        }
        let known = SchemaDocument::parse(&state.config_ui)
            .map(|doc| doc.root().config_ids())
            .unwrap_or_default();
        Ok(state
            .values
            .iter()
            .filter(|(id, _)| known.contains(id))
            .map(|(id, v)| (id, v.clone()))
            .collect())
    }

    fn config_version_read(&self) -> Option<u32> {
        self.state().version_read
    }

    fn supported_config_versions(&self) -> Vec<u32> {
        self.state().supported.clone()
    }

    fn apply_config(&self, values: &ConfigSnapshot, unknown: bool, version: u32) -> DeviceResult<()> {
        let mut state = self.state();
        if let Some(failure) = state.apply_failure {
            return Err(failure.to_error("config"));
        }
        let merged = if unknown {
            let known = SchemaDocument::parse(&state.config_ui)
                .map(|doc| doc.root().config_ids())
                .unwrap_or_default();
            merge_unknown(values, &state.values, &known)
        } else {
            values.clone()
        };
        if let Some(ConfigValue::Text(name)) = merged.get(ID_RECORDER_NAME) {
            state.info.name = name.clone();
        }
        state.writes.push((merged.clone(), version));
        state.values = merged;
        state.version_read = Some(version);
        state.commands.push("apply_config");
        Ok(())
    }

    fn set_time(&self) -> DeviceResult<()> {
        let (delay, failure) = {
            let state = self.state();
            (state.set_time_delay, state.set_time_failure)
        };
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        if let Some(failure) = failure {
            return Err(failure.to_error("set_time"));
        }
        self.command("set_time")
    }

    fn status(&self) -> Option<StatusCode> {
        self.state().status
    }

    fn battery_status(&self, _cancel: &dyn Fn() -> bool) -> DeviceResult<BatteryStatus> {
        match self.state().battery {
            BatteryBehavior::Report(status) => Ok(status),
            BatteryBehavior::Unsupported => Err(DeviceError::Unsupported("battery".to_string())),
            BatteryBehavior::Rejected => Err(DeviceError::Command("ERR_INVALID_COMMAND".to_string())),
        }
    }

    fn ping(&self, _cancel: &dyn Fn() -> bool) -> DeviceResult<()> {
        let mut state = self.state();
        state.status = state.ping_status;
        Ok(())
    }

    fn start_recording(&self) -> DeviceResult<()> {
        self.command("start_recording")?;
        self.state().status = Some(10);
        Ok(())
    }

    fn stop_recording(&self) -> DeviceResult<()> {
        self.command("stop_recording")?;
        self.state().status = Some(STATUS_IDLE);
        Ok(())
    }

    fn reset(&self) -> DeviceResult<()> {
        self.command("reset")
    }

    fn free_space(&self) -> Option<u64> {
        self.state().free_space
    }

    fn calibration(&self) -> DeviceResult<CalibrationSet> {
        self.state()
            .calibration
            .clone()
            .ok_or_else(|| DeviceError::Unsupported("calibration".to_string()))
    }

    fn write_user_calibration(&self, entries: &[CalibrationEntry]) -> DeviceResult<()> {
        let mut state = self.state();
        let cal = state.calibration.get_or_insert_with(CalibrationSet::default);
        cal.user = Some(entries.to_vec());
        state.commands.push("write_user_calibration");
        Ok(())
    }

    fn wifi_networks(&self) -> DeviceResult<Vec<KnownNetwork>> {
        let state = self.state();
        if !state.info.has_wifi {
            return Err(DeviceError::Unsupported("Wi-Fi".to_string()));
        }
        Ok(state.networks.clone())
    }

    fn scan_wifi(&self, _cancel: &dyn Fn() -> bool) -> DeviceResult<Vec<AccessPoint>> {
        let state = self.state();
        if !state.info.has_wifi {
            return Err(DeviceError::Unsupported("Wi-Fi".to_string()));
        }
        Ok(state.visible.clone())
    }

    fn set_wifi_networks(&self, networks: &[KnownNetwork]) -> DeviceResult<()> {
        let mut state = self.state();
        if !state.info.has_wifi {
            return Err(DeviceError::Unsupported("Wi-Fi".to_string()));
        }
        state.networks = networks.to_vec();
        state.commands.push("set_wifi_networks");
        Ok(())
    }
}

/// Enumerator over a mutable list of mock recorders
#[derive(Debug, Default)]
pub struct MockEnumerator {
    devices: Arc<Mutex<Vec<Arc<MockRecorder>>>>,
    changed: Arc<AtomicBool>,
    failure: Arc<Mutex<Option<MockFailure>>>,
}

impl MockEnumerator {
    pub fn new(devices: Vec<Arc<MockRecorder>>) -> Self {
        Self {
            devices: Arc::new(Mutex::new(devices)),
            changed: Arc::new(AtomicBool::new(true)),
            failure: Arc::new(Mutex::new(None)),
        }
    }

    /// Two demo recorders
    pub fn demo() -> Self {
        Self::new(vec![
            Arc::new(MockRecorder::demo("S3-D16", "10001", "Bridge Deck")),
            Arc::new(MockRecorder::demo("W8-E100D40", "10002", "Pump Room").with_status(Some(10))),
        ])
    }

    /// A handle sharing this enumerator's device list, for tests
    pub fn handle(&self) -> MockEnumerator {
        Self {
            devices: Arc::clone(&self.devices),
            changed: Arc::clone(&self.changed),
            failure: Arc::clone(&self.failure),
        }
    }

    pub fn attach(&self, device: Arc<MockRecorder>) {
        self.devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(device);
        self.changed.store(true, Ordering::SeqCst);
    }

    /// Remove a device by serial number
    pub fn detach(&self, serial: &str) {
        let mut devices = self.devices.lock().unwrap_or_else(PoisonError::into_inner);
        devices.retain(|d| {
            let keep = d.info().serial != serial;
            if !keep {
                d.set_present(false);
            }
            keep
        });
        self.changed.store(true, Ordering::SeqCst);
    }

    /// Make the next enumeration fail
    pub fn fail_next(&self, failure: MockFailure) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(failure);
    }
}

impl DeviceEnumerator for MockEnumerator {
    fn get_devices(&mut self) -> DeviceResult<Vec<SharedRecorder>> {
        if let Some(failure) = self
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            return Err(failure.to_error("enumeration"));
        }
        Ok(self
            .devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|d| Arc::clone(d) as SharedRecorder)
            .collect())
    }

    fn device_changed(&mut self) -> bool {
        self.changed.swap(false, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_schema_parses() {
        let doc = SchemaDocument::parse(DEMO_CONFIG_UI).unwrap();
        assert!(doc.root().config_ids().contains(&ID_RECORDER_NAME));
    }

    #[test]
    fn test_apply_config_keeps_unknown_ids() {
        let mut values = ConfigSnapshot::new();
        values.insert(0x7777, 5i64);
        values.insert(ID_RECORDER_NAME, "Old");
        let recorder = MockRecorder::new("S3", "1").with_values(values, Some(1));

        let mut new_values = ConfigSnapshot::new();
        new_values.insert(ID_RECORDER_NAME, "New");
        recorder.apply_config(&new_values, true, 2).unwrap();

        let stored = recorder.stored_values();
        assert_eq!(stored.get(0x7777), Some(&ConfigValue::Int(5)));
        assert!(recorder.config_values(true).unwrap().contains(0x7777));
        assert!(!recorder.config_values(false).unwrap().contains(0x7777));
        assert_eq!(recorder.info().name, "New");
        assert_eq!(recorder.config_version_read(), Some(2));

        recorder.apply_config(&new_values, false, 2).unwrap();
        assert!(!recorder.stored_values().contains(0x7777));
    }

    #[test]
    fn test_apply_failure() {
        let recorder = MockRecorder::new("S3", "1").failing_apply(MockFailure::Locked);
        let err = recorder
            .apply_config(&ConfigSnapshot::new(), true, 1)
            .unwrap_err();
        assert!(matches!(err, DeviceError::Locked(_)));
        assert!(recorder.writes().is_empty());
    }

    #[test]
    fn test_custom_properties_and_layout() {
        let layout = r#"{"ConfigUI": []}"#;
        let recorder = MockRecorder::demo("S3", "1", "Keep Me")
            .with_properties(serde_json::json!({
                "RecorderInfo": {
                    "ProductName": "W8-E100D40",
                    "RecorderSerial": 77,
                    "HasWiFi": true
                }
            }))
            .with_config_ui(layout);

        let info = recorder.info();
        assert_eq!(info.product_name, "W8-E100D40");
        assert_eq!(info.serial, "77");
        assert_eq!(info.name, "Keep Me");
        assert!(info.has_wifi);
        assert_eq!(recorder.config_ui_raw().unwrap(), layout);
    }

    #[test]
    fn test_removed_device_rejects_commands() {
        let recorder = MockRecorder::new("S3", "1");
        recorder.set_present(false);
        assert!(matches!(recorder.reset(), Err(DeviceError::Removed)));
    }

    #[test]
    fn test_enumerator_detach() {
        let mut enumerator = MockEnumerator::new(vec![
            Arc::new(MockRecorder::new("S3", "1")),
            Arc::new(MockRecorder::new("S3", "2")),
        ]);
        assert!(enumerator.device_changed());
        assert!(!enumerator.device_changed());
        enumerator.detach("1");
        assert!(enumerator.device_changed());
        assert_eq!(enumerator.get_devices().unwrap().len(), 1);

        enumerator.fail_next(MockFailure::Timeout);
        assert!(enumerator.get_devices().is_err());
        assert!(enumerator.get_devices().is_ok());
    }
}
