//! Test data builders for creating test objects

use endaq_config::device::file_device::write_atomic;
use endaq_config::device::mock_device::DEMO_CONFIG_UI;
use endaq_config::{ConfigId, ConfigSnapshot, ConfigValue};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

/// Builder for configuration value snapshots
#[derive(Default)]
pub struct SnapshotBuilder {
    values: ConfigSnapshot,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, id: ConfigId, value: impl Into<ConfigValue>) -> Self {
        self.values.insert(id, value);
        self
    }

    pub fn build(self) -> ConfigSnapshot {
        self.values
    }
}

/// Builder for a recorder volume laid out on disk
pub struct VolumeBuilder {
    root: PathBuf,
    product: String,
    serial: u32,
    firmware: i64,
    hardware: i64,
    versions: Vec<u32>,
    config: Option<(u32, Value)>,
}

impl VolumeBuilder {
    pub fn new(root: &Path, serial: u32) -> Self {
        Self {
            root: root.to_path_buf(),
            product: "S3-D16".to_string(),
            serial,
            firmware: 12,
            hardware: 2,
            versions: vec![1, 2],
            config: None,
        }
    }

    pub fn product(mut self, product: &str) -> Self {
        self.product = product.to_string();
        self
    }

    pub fn firmware(mut self, firmware: i64) -> Self {
        self.firmware = firmware;
        self
    }

    pub fn hardware(mut self, hardware: i64) -> Self {
        self.hardware = hardware;
        self
    }

    pub fn versions(mut self, versions: Vec<u32>) -> Self {
        self.versions = versions;
        self
    }

    /// Stored configuration, keyed by decimal ID strings
    pub fn config(mut self, version: u32, values: Value) -> Self {
        self.config = Some((version, values));
        self
    }

    /// Write the volume and return its root
    pub fn build(self) -> PathBuf {
        let devinfo = json!({
            "RecorderInfo": {
                "ProductName": self.product,
                "PartNumber": format!("{}-DC", self.product),
                "RecorderSerial": self.serial,
                "FwRev": self.firmware,
                "HwRev": self.hardware,
                "FileCommandInterface": true
            },
            "ConfigVersions": self.versions,
        });
        write_atomic(
            &self.root.join("SYSTEM/DEV/DEVINFO.json"),
            &serde_json::to_vec(&devinfo).unwrap(),
        )
        .unwrap();
        write_atomic(
            &self.root.join("SYSTEM/CONFIG.UI.json"),
            DEMO_CONFIG_UI.as_bytes(),
        )
        .unwrap();
        if let Some((version, values)) = self.config {
            let config = json!({ "version": version, "values": values });
            write_atomic(
                &self.root.join("SYSTEM/config.json"),
                &serde_json::to_vec(&config).unwrap(),
            )
            .unwrap();
        }
        self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_builder() {
        let values = SnapshotBuilder::new().with(1, true).with(2, 5i64).build();
        assert_eq!(values.len(), 2);
        assert_eq!(values.get(2), Some(&ConfigValue::Int(5)));
    }
}
