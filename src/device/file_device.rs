//! Recorders mounted as mass-storage volumes
//!
//! A recorder volume keeps its data as JSON files under `SYSTEM/`:
//!
//! | File                      | Contents                                   |
//! |---------------------------|--------------------------------------------|
//! | `SYSTEM/DEV/DEVINFO.json` | Properties (`RecorderInfo`, calibration)   |
//! | `SYSTEM/CONFIG.UI.json`   | Configuration UI document                  |
//! | `SYSTEM/config.json`      | `{ "version": n, "values": { id: value } }` |
//! | `SYSTEM/DEV/USERCAL.json` | User calibration entries                   |
//! | `SYSTEM/wifi.json`        | Known and visible networks                 |
//! | `SYSTEM/CLOCK.json`       | Last clock set request                     |
//! | `SYSTEM/STATUS.json`      | Status code and battery state              |
//! | `SYSTEM/COMMAND.json`     | Pending command                            |
//!
//! Every write goes through [`write_atomic`].

use crate::device::{
    merge_unknown, AccessPoint, BatteryStatus, CalibrationEntry, CalibrationSet, DeviceEnumerator,
    DeviceInfo, KnownNetwork, Recorder, SharedRecorder, StatusCode,
};
use crate::error::{DeviceError, DeviceResult};
use crate::schema::SchemaDocument;
use crate::types::{ConfigId, ConfigSnapshot, ConfigValue, ID_RECORDER_NAME};
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

const SYSTEM_DIR: &str = "SYSTEM";
const DEVINFO_FILE: &str = "SYSTEM/DEV/DEVINFO.json";
const CONFIG_UI_FILE: &str = "SYSTEM/CONFIG.UI.json";
const CONFIG_FILE: &str = "SYSTEM/config.json";
const USERCAL_FILE: &str = "SYSTEM/DEV/USERCAL.json";
const WIFI_FILE: &str = "SYSTEM/wifi.json";
const CLOCK_FILE: &str = "SYSTEM/CLOCK.json";
const STATUS_FILE: &str = "SYSTEM/STATUS.json";
const COMMAND_FILE: &str = "SYSTEM/COMMAND.json";

/// Write a file by way of a temporary sibling and a rename
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path).inspect_err(|_| {
        let _ = std::fs::remove_file(&tmp);
    })
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredConfig {
    #[serde(default)]
    version: Option<u32>,
    #[serde(default)]
    values: ConfigSnapshot,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct StoredWifi {
    networks: Vec<KnownNetwork>,
    visible: Vec<AccessPoint>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StoredStatus {
    status: Option<StatusCode>,
    battery: Option<BatteryStatus>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct StoredCalibration {
    serial: Option<u32>,
    /// Epoch seconds
    date: Option<i64>,
    expires: Option<i64>,
    entries: Vec<CalibrationEntry>,
}

/// A recorder whose files live under a directory
#[derive(Debug)]
pub struct DirectoryRecorder {
    root: PathBuf,
    info: Mutex<DeviceInfo>,
    version_read: Mutex<Option<u32>>,
    status: Mutex<Option<StatusCode>>,
}

impl DirectoryRecorder {
    /// True if `path` looks like a recorder volume
    pub fn is_recorder(path: &Path) -> bool {
        path.join(DEVINFO_FILE).is_file()
    }

    /// Open the recorder at `root`
    pub fn open(root: impl Into<PathBuf>) -> DeviceResult<Self> {
        let root = root.into();
        let properties = read_json(&root.join(DEVINFO_FILE))?;
        let mut info = DeviceInfo::from_properties(&properties);
        info.path = Some(root.clone());

        let recorder = Self {
            root,
            info: Mutex::new(info),
            version_read: Mutex::new(None),
            status: Mutex::new(None),
        };

        // Name and version come from the stored configuration
        let stored = recorder.read_config()?;
        if let Some(ConfigValue::Text(name)) = stored.values.get(ID_RECORDER_NAME) {
            recorder.info_mut().name = name.clone();
        }
        *lock(&recorder.version_read) = stored.version;
        *lock(&recorder.status) = recorder.read_status().status;

        tracing::debug!("Opened recorder at {}", recorder.root.display());
        Ok(recorder)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn info_mut(&self) -> std::sync::MutexGuard<'_, DeviceInfo> {
        lock(&self.info)
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    fn read_config(&self) -> DeviceResult<StoredConfig> {
        let path = self.path(CONFIG_FILE);
        if !path.exists() {
            return Ok(StoredConfig::default());
        }
        let value = read_json(&path)?;
        serde_json::from_value(value).map_err(|e| {
            DeviceError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("{}: {}", CONFIG_FILE, e),
            ))
        })
    }

    /// IDs named by the volume's configuration UI; empty if it is unreadable
    fn known_ids(&self) -> BTreeSet<ConfigId> {
        self.config_ui_raw()
            .ok()
            .and_then(|raw| SchemaDocument::parse(&raw).ok())
            .map(|doc| doc.root().config_ids())
            .unwrap_or_default()
    }

    fn read_status(&self) -> StoredStatus {
        read_json(&self.path(STATUS_FILE))
            .ok()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }

    fn read_wifi(&self) -> DeviceResult<StoredWifi> {
        if !self.info().has_wifi {
            return Err(DeviceError::Unsupported("Wi-Fi".to_string()));
        }
        let path = self.path(WIFI_FILE);
        if !path.exists() {
            return Ok(StoredWifi::default());
        }
        let value = read_json(&path)?;
        Ok(serde_json::from_value(value).unwrap_or_default())
    }

    fn write_json(&self, rel: &str, value: &Value) -> DeviceResult<()> {
        let bytes = serde_json::to_vec_pretty(value).map_err(|e| {
            DeviceError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        write_atomic(&self.path(rel), &bytes).map_err(|e| DeviceError::from_io(e, rel))
    }

    fn send_command(&self, command: &str) -> DeviceResult<()> {
        if !self.info().has_command_interface {
            return Err(DeviceError::Unsupported(format!("command {}", command)));
        }
        tracing::info!("Sending '{}' to {}", command, self.root.display());
        self.write_json(COMMAND_FILE, &json!({ "command": command }))
    }
}

impl Recorder for DirectoryRecorder {
    fn info(&self) -> DeviceInfo {
        self.info_mut().clone()
    }

    fn is_present(&self) -> bool {
        Self::is_recorder(&self.root)
    }

    fn properties(&self) -> DeviceResult<Value> {
        read_json(&self.path(DEVINFO_FILE))
    }

    fn config_ui_raw(&self) -> DeviceResult<String> {
        std::fs::read_to_string(self.path(CONFIG_UI_FILE))
            .map_err(|e| DeviceError::from_io(e, CONFIG_UI_FILE))
    }

    fn config_values(&self, original: bool) -> DeviceResult<ConfigSnapshot> {
        let stored = self.read_config()?;
        *lock(&self.version_read) = stored.version;
        if original {
            return Ok(stored.values);
        }
        let known = self.known_ids();
        Ok(stored
            .values
            .into_iter()
            .filter(|(id, _)| known.contains(id))
            .collect())
    }

    fn config_version_read(&self) -> Option<u32> {
        *lock(&self.version_read)
    }

    fn supported_config_versions(&self) -> Vec<u32> {
        let versions: Vec<u32> = self
            .properties()
            .ok()
            .and_then(|p| p["ConfigVersions"].as_array().cloned())
            .unwrap_or_default()
            .iter()
            .filter_map(|v| v.as_u64().and_then(|v| u32::try_from(v).ok()))
            .collect();
        if versions.is_empty() {
            vec![1]
        } else {
            versions
        }
    }

    fn apply_config(&self, values: &ConfigSnapshot, unknown: bool, version: u32) -> DeviceResult<()> {
        let values = if unknown {
            let stored = self.read_config()?;
            merge_unknown(values, &stored.values, &self.known_ids())
        } else {
            values.clone()
        };

        let doc = StoredConfig {
            version: Some(version),
            values,
        };
        let value = serde_json::to_value(&doc).map_err(|e| {
            DeviceError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        self.write_json(CONFIG_FILE, &value)?;

        if let Some(ConfigValue::Text(name)) = doc.values.get(ID_RECORDER_NAME) {
            self.info_mut().name = name.clone();
        }
        *lock(&self.version_read) = Some(version);
        tracing::info!(
            "Wrote {} values (version {}) to {}",
            doc.values.len(),
            version,
            self.root.display()
        );
        Ok(())
    }

    fn set_time(&self) -> DeviceResult<()> {
        self.write_json(CLOCK_FILE, &json!({ "time": Utc::now().timestamp() }))
    }

    fn status(&self) -> Option<StatusCode> {
        *lock(&self.status)
    }

    fn battery_status(&self, _cancel: &dyn Fn() -> bool) -> DeviceResult<BatteryStatus> {
        if !self.info().has_command_interface {
            return Err(DeviceError::Unsupported("battery".to_string()));
        }
        let stored = self.read_status();
        *lock(&self.status) = stored.status;
        stored
            .battery
            .ok_or_else(|| DeviceError::Unsupported("battery".to_string()))
    }

    fn ping(&self, _cancel: &dyn Fn() -> bool) -> DeviceResult<()> {
        if !self.is_present() {
            return Err(DeviceError::Removed);
        }
        *lock(&self.status) = self.read_status().status;
        Ok(())
    }

    fn start_recording(&self) -> DeviceResult<()> {
        self.send_command("start")
    }

    fn stop_recording(&self) -> DeviceResult<()> {
        self.send_command("stop")
    }

    fn reset(&self) -> DeviceResult<()> {
        self.send_command("reset")
    }

    fn calibration(&self) -> DeviceResult<CalibrationSet> {
        let props = self.properties()?;
        let cal_info = props
            .get("CalibrationInfo")
            .ok_or_else(|| DeviceError::Unsupported("calibration".to_string()))?;
        let stored: StoredCalibration = serde_json::from_value(cal_info.clone()).map_err(|e| {
            DeviceError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        let epoch = |t: Option<i64>| t.and_then(|t| Utc.timestamp_opt(t, 0).single());

        let user_path = self.path(USERCAL_FILE);
        let user = if user_path.exists() {
            let value = read_json(&user_path)?;
            Some(serde_json::from_value(value).unwrap_or_default())
        } else {
            None
        };

        Ok(CalibrationSet {
            serial: stored.serial,
            date: epoch(stored.date),
            expires: epoch(stored.expires),
            factory: stored.entries,
            user,
        })
    }

    fn write_user_calibration(&self, entries: &[CalibrationEntry]) -> DeviceResult<()> {
        let value = serde_json::to_value(entries).map_err(|e| {
            DeviceError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        self.write_json(USERCAL_FILE, &value)
    }

    fn wifi_networks(&self) -> DeviceResult<Vec<KnownNetwork>> {
        Ok(self.read_wifi()?.networks)
    }

    fn scan_wifi(&self, _cancel: &dyn Fn() -> bool) -> DeviceResult<Vec<AccessPoint>> {
        Ok(self.read_wifi()?.visible)
    }

    fn set_wifi_networks(&self, networks: &[KnownNetwork]) -> DeviceResult<()> {
        let mut stored = self.read_wifi()?;
        stored.networks = networks.to_vec();
        let value = serde_json::to_value(&stored).map_err(|e| {
            DeviceError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        self.write_json(WIFI_FILE, &value)
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read_json(path: &Path) -> DeviceResult<Value> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| DeviceError::from_io(e, &path.display().to_string()))?;
    serde_json::from_str(&text).map_err(|e| {
        DeviceError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("{}: {}", path.display(), e),
        ))
    })
}

/// Finds recorder volumes under a set of search roots
///
/// A root is either a recorder itself or a directory whose immediate
/// children are checked (e.g. `/media/<user>`).
#[derive(Debug, Default)]
pub struct DirectoryEnumerator {
    roots: Vec<PathBuf>,
    last_seen: BTreeSet<PathBuf>,
}

impl DirectoryEnumerator {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            last_seen: BTreeSet::new(),
        }
    }

    /// Platform mount points where removable volumes usually appear
    pub fn default_roots() -> Vec<PathBuf> {
        let mut roots = Vec::new();
        if cfg!(target_os = "macos") {
            roots.push(PathBuf::from("/Volumes"));
        } else if cfg!(target_os = "linux") {
            if let Ok(user) = std::env::var("USER") {
                roots.push(PathBuf::from("/media").join(&user));
                roots.push(PathBuf::from("/run/media").join(user));
            }
            roots.push(PathBuf::from("/mnt"));
        } else if cfg!(windows) {
            roots.extend((b'D'..=b'Z').map(|d| PathBuf::from(format!("{}:\\", d as char))));
        }
        roots
    }

    fn recorder_paths(&self) -> DeviceResult<BTreeSet<PathBuf>> {
        let mut found = BTreeSet::new();
        for root in &self.roots {
            if DirectoryRecorder::is_recorder(root) {
                found.insert(root.clone());
                continue;
            }
            let entries = match std::fs::read_dir(root) {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                    tracing::debug!("Skipping {}: {}", root.display(), e);
                    continue;
                }
                Err(e) => return Err(DeviceError::Io(e)),
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.join(SYSTEM_DIR).is_dir() && DirectoryRecorder::is_recorder(&path) {
                    found.insert(path);
                }
            }
        }
        Ok(found)
    }
}

impl DeviceEnumerator for DirectoryEnumerator {
    fn get_devices(&mut self) -> DeviceResult<Vec<SharedRecorder>> {
        let paths = self.recorder_paths()?;
        let mut devices: Vec<SharedRecorder> = Vec::with_capacity(paths.len());
        for path in &paths {
            match DirectoryRecorder::open(path) {
                Ok(rec) => devices.push(Arc::new(rec)),
                // Ejected between listing and opening
                Err(DeviceError::Removed) => {}
                Err(e) => tracing::warn!("Could not open recorder at {}: {}", path.display(), e),
            }
        }
        self.last_seen = paths;
        Ok(devices)
    }

    fn device_changed(&mut self) -> bool {
        match self.recorder_paths() {
            Ok(paths) => {
                let changed = paths != self.last_seen;
                self.last_seen = paths;
                changed
            }
            Err(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock_device::DEMO_CONFIG_UI;
    use tempfile::TempDir;

    fn make_recorder(dir: &Path, serial: u32) {
        let devinfo = json!({
            "RecorderInfo": {
                "ProductName": "S3-D16",
                "RecorderSerial": serial,
                "FwRev": 12,
                "HwRev": 2,
                "HasEsp32": true,
                "FileCommandInterface": true
            },
            "ConfigVersions": [1, 2],
            "CalibrationInfo": {
                "Serial": 77,
                "Date": 1_600_000_000,
                "Expires": 1_700_000_000,
                "Entries": [{"id": 1, "coefficients": [1.0, 0.0]}]
            }
        });
        write_atomic(
            &dir.join(DEVINFO_FILE),
            &serde_json::to_vec(&devinfo).unwrap(),
        )
        .unwrap();
        write_atomic(&dir.join(CONFIG_UI_FILE), DEMO_CONFIG_UI.as_bytes()).unwrap();
    }

    #[test]
    fn test_open_without_config() {
        let tmp = TempDir::new().unwrap();
        make_recorder(tmp.path(), 42);
        let rec = DirectoryRecorder::open(tmp.path()).unwrap();
        assert_eq!(rec.info().serial, "42");
        assert!(rec.config_values(true).unwrap().is_empty());
        assert_eq!(rec.config_version_read(), None);
        assert_eq!(rec.supported_config_versions(), vec![1, 2]);
        assert!(rec.config_ui().is_ok());
    }

    #[test]
    fn test_apply_config_preserves_unknown() {
        let tmp = TempDir::new().unwrap();
        make_recorder(tmp.path(), 42);
        write_atomic(
            &tmp.path().join(CONFIG_FILE),
            br#"{"version": 1, "values": {"589695": "Old", "3": 9}}"#,
        )
        .unwrap();

        let rec = DirectoryRecorder::open(tmp.path()).unwrap();
        assert_eq!(rec.info().name, "Old");
        assert_eq!(rec.config_version_read(), Some(1));

        let mut values = ConfigSnapshot::new();
        values.insert(ID_RECORDER_NAME, "New");
        rec.apply_config(&values, true, 2).unwrap();

        let reread = rec.config_values(true).unwrap();
        assert_eq!(reread.get(3), Some(&ConfigValue::Int(9)));
        let interpreted = rec.config_values(false).unwrap();
        assert!(!interpreted.contains(3));
        assert_eq!(
            interpreted.get(ID_RECORDER_NAME),
            Some(&ConfigValue::Text("New".into()))
        );
        assert_eq!(reread.get(ID_RECORDER_NAME), Some(&ConfigValue::Text("New".into())));
        assert_eq!(rec.config_version_read(), Some(2));
        assert_eq!(rec.info().name, "New");
        assert!(!tmp.path().join("SYSTEM/config.json.tmp").exists());
    }

    #[test]
    fn test_commands_and_calibration() {
        let tmp = TempDir::new().unwrap();
        make_recorder(tmp.path(), 1);
        let rec = DirectoryRecorder::open(tmp.path()).unwrap();

        rec.start_recording().unwrap();
        let cmd = read_json(&tmp.path().join(COMMAND_FILE)).unwrap();
        assert_eq!(cmd["command"], "start");

        let cal = rec.calibration().unwrap();
        assert_eq!(cal.serial, Some(77));
        assert_eq!(cal.factory.len(), 1);
        assert!(cal.user.is_none());

        rec.write_user_calibration(&cal.factory).unwrap();
        assert_eq!(rec.calibration().unwrap().user.map(|u| u.len()), Some(1));
    }

    #[test]
    fn test_wifi_round_trip() {
        let tmp = TempDir::new().unwrap();
        make_recorder(tmp.path(), 1);
        let rec = DirectoryRecorder::open(tmp.path()).unwrap();
        assert!(rec.wifi_networks().unwrap().is_empty());

        let nets = vec![KnownNetwork {
            ssid: "Lab".into(),
            selected: true,
            password: Some("secret".into()),
        }];
        rec.set_wifi_networks(&nets).unwrap();
        assert_eq!(rec.wifi_networks().unwrap(), nets);
    }

    #[test]
    fn test_enumerator_detects_changes() {
        let tmp = TempDir::new().unwrap();
        let mut enumerator = DirectoryEnumerator::new(vec![tmp.path().to_path_buf()]);
        assert!(enumerator.get_devices().unwrap().is_empty());
        assert!(!enumerator.device_changed());

        make_recorder(&tmp.path().join("REC1"), 1);
        assert!(enumerator.device_changed());
        assert!(!enumerator.device_changed());
        assert_eq!(enumerator.get_devices().unwrap().len(), 1);

        std::fs::remove_dir_all(tmp.path().join("REC1")).unwrap();
        assert!(enumerator.device_changed());
    }

    #[test]
    fn test_missing_root_is_not_an_error() {
        let mut enumerator = DirectoryEnumerator::new(vec![PathBuf::from("/no/such/root")]);
        assert!(enumerator.get_devices().unwrap().is_empty());
    }
}
