//! Configuration export and import (`.xcg` files)
//!
//! An export file is a JSON document with three sections:
//!
//! ```json
//! {
//!   "ExportedConfigurationData": {
//!     "RecorderConfigurationList": { "589695": "Bridge Deck", ... },
//!     "ConfigUI": "<raw configuration UI text>",
//!     "RecordingProperties": { "RecorderInfo": { ... } }
//!   }
//! }
//! ```
//!
//! Imported values are raw values in the units of the *exporting* device.
//! They are converted to display values with the file's own transforms and
//! then set through the dialog's display setter, so a field whose scaling
//! changed between firmware versions still receives the intended value.

use crate::device::file_device::write_atomic;
use crate::device::{clean_properties, DeviceInfo};
use crate::engine::model::{ConfigTree, NodeId};
use crate::error::{ConfigError, Result, ResultExt};
use crate::schema::SchemaDocument;
use crate::scripting::{DisplayTransform, ExpressionEngine};
use crate::types::{ConfigId, ConfigSnapshot};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// File extension of export files
pub const EXPORT_EXTENSION: &str = "xcg";

/// The contents of an export file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedConfig {
    #[serde(rename = "RecorderConfigurationList", default)]
    pub values: ConfigSnapshot,
    #[serde(rename = "ConfigUI", default)]
    pub config_ui: String,
    #[serde(rename = "RecordingProperties", default)]
    pub properties: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct ExportFile {
    #[serde(rename = "ExportedConfigurationData")]
    data: ExportedConfig,
}

/// Default file name for an export
pub fn default_export_name(info: &DeviceInfo) -> String {
    if info.serial.is_empty() {
        format!("config.{}", EXPORT_EXTENSION)
    } else {
        format!("{}_config.{}", info.serial, EXPORT_EXTENSION)
    }
}

/// Write an export file
///
/// Private and `UnknownElement` properties are stripped. The file is
/// written atomically.
pub fn export_config(
    path: &Path,
    values: &ConfigSnapshot,
    config_ui: &str,
    properties: &Value,
) -> Result<ExportedConfig> {
    let data = ExportedConfig {
        values: values.clone(),
        config_ui: config_ui.to_string(),
        properties: clean_properties(properties),
    };
    let file = ExportFile { data };
    let bytes = serde_json::to_vec_pretty(&file)?;
    write_atomic(path, &bytes)
        .map_err(ConfigError::from)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::info!("Exported {} values to {}", file.data.values.len(), path.display());
    Ok(file.data)
}

/// Read an export file
pub fn load_export(path: &Path) -> Result<ExportedConfig> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if ext != EXPORT_EXTENSION {
        return Err(ConfigError::Incompatible(format!(
            "Configuration data could not be read.\n\nThe file type '.{}' is unknown.",
            ext
        )));
    }
    let text = std::fs::read_to_string(path)
        .map_err(ConfigError::from)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let file: ExportFile = serde_json::from_str(&text)?;
    Ok(file.data)
}

/// Score how well imported data fits a device, from 0 to 5
///
/// - 5: the recorded properties equal the device's
/// - 4: same product, firmware and hardware revision
/// - 3: same product and firmware
/// - 2: same product, different or unknown firmware
/// - 1: different product
/// - 0: the file has no recorder info
pub fn check_compatibility(device_props: &Value, imported_props: &Value) -> u8 {
    let Some(imported) = imported_props.get("RecorderInfo").filter(|v| v.is_object()) else {
        return 0;
    };
    if clean_properties(device_props) == clean_properties(imported_props) {
        return 5;
    }

    let device = &device_props["RecorderInfo"];
    let same = |key: &str| {
        let a = &device[key];
        !a.is_null() && *a == imported[key]
    };

    if !same("ProductName") {
        return 1;
    }
    let same_fw = same("FwRevStr") || (device.get("FwRevStr").is_none() && same("FwRev"));
    match (same_fw, same("HwRev")) {
        (true, true) => 4,
        (true, false) => 3,
        _ => 2,
    }
}

/// What an import did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub applied: usize,
    pub excluded: usize,
    /// IDs the dialog has no field for
    pub unknown: usize,
    /// Values the exporting device's UI marks as having no value
    pub skipped: usize,
    pub failed: usize,
}

impl ImportReport {
    /// Every imported value lands in exactly one bucket
    pub fn total(&self) -> usize {
        self.applied + self.excluded + self.unknown + self.skipped + self.failed
    }

    fn record(
        &mut self,
        id: ConfigId,
        node: NodeId,
        result: Result<()>,
        received: &mut HashSet<NodeId>,
    ) {
        match result {
            Ok(()) => {
                received.insert(node);
                self.applied += 1;
            }
            Err(e) => {
                tracing::warn!("Could not import value for 0x{:X}: {}", id, e);
                self.failed += 1;
            }
        }
    }
}

/// Transforms of every field in the exporting device's configuration UI
pub fn file_converters(
    config_ui: &str,
    engine: &ExpressionEngine,
) -> HashMap<ConfigId, DisplayTransform> {
    let doc = match SchemaDocument::parse(config_ui) {
        Ok(doc) => doc,
        Err(e) => {
            tracing::warn!("Imported configuration UI is unusable: {}", e);
            return HashMap::new();
        }
    };
    let mut converters = HashMap::new();
    doc.root().visit(&mut |el| {
        let Some(id) = el.config_id else {
            return;
        };
        let transform = DisplayTransform::from_hints(
            &el.display_name(),
            el.display_format.as_deref(),
            el.value_format.as_deref(),
            el.gain,
            el.offset,
            engine,
        );
        if !matches!(transform, DisplayTransform::Identity) {
            converters.insert(id, transform);
        }
    });
    converters
}

/// Populate a dialog's tree with imported values
///
/// With `reset`, every item except the excluded IDs goes back to its
/// default first. Excluded IDs are never overwritten.
pub fn apply_imported_config(
    tree: &mut ConfigTree,
    engine: &ExpressionEngine,
    imported: &ExportedConfig,
    exclude: &[ConfigId],
    reset: bool,
) -> ImportReport {
    if reset {
        let nodes: Vec<NodeId> = tree
            .items()
            .filter(|(_, item)| item.id.is_none_or(|id| !exclude.contains(&id)))
            .map(|(n, _)| n)
            .collect();
        for node in nodes {
            tree.set_to_default(node);
        }
    }

    let converters = file_converters(&imported.config_ui, engine);
    let mut report = ImportReport::default();
    let mut received = HashSet::new();
    let mut converted = Vec::new();

    // Plain values first, so converted ones see them through `Config`
    for (id, value) in imported.values.iter() {
        if exclude.contains(&id) {
            report.excluded += 1;
            continue;
        }
        let Some(node) = tree.node(id) else {
            tracing::info!("Imported item 0x{:X} not in this dialog, probably okay", id);
            report.unknown += 1;
            continue;
        };
        match converters.get(&id) {
            Some(convert) => converted.push((id, node, convert, value)),
            None => report.record(id, node, tree.set_raw(node, value), &mut received),
        }
    }

    tree.update_disabled_items(engine);
    for (id, node, convert, value) in converted {
        let view = tree.config_view(engine);
        let result = match convert.to_display(value, engine, &view) {
            Ok(Some(display)) => tree.set_display_value(node, &display, engine, &view),
            Ok(None) => {
                report.skipped += 1;
                continue;
            }
            Err(e) => Err(e),
        };
        report.record(id, node, result, &mut received);
    }

    tree.sync_unnamed_check_groups(&received);
    tree.update_disabled_items(engine);
    tracing::info!(
        "Imported {} values ({} excluded, {} unknown, {} without value, {} failed)",
        report.applied,
        report.excluded,
        report.unknown,
        report.skipped,
        report.failed
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::builder::build_ui;
    use crate::engine::registry::ElementRegistry;
    use crate::types::ConfigValue;
    use serde_json::json;

    fn props(product: &str, fw: &str, hw: i64) -> Value {
        json!({"RecorderInfo": {"ProductName": product, "FwRevStr": fw, "HwRev": hw, "RecorderSerial": 1}})
    }

    #[test]
    fn test_compatibility_scores() {
        let dev = props("S3-D16", "3.1", 2);
        assert_eq!(check_compatibility(&dev, &dev), 5);

        let mut other_serial = dev.clone();
        other_serial["RecorderInfo"]["RecorderSerial"] = json!(2);
        assert_eq!(check_compatibility(&dev, &other_serial), 4);

        assert_eq!(check_compatibility(&dev, &props("S3-D16", "3.1", 3)), 3);
        assert_eq!(check_compatibility(&dev, &props("S3-D16", "2.0", 2)), 2);
        assert_eq!(check_compatibility(&dev, &props("W8", "3.1", 2)), 1);
        assert_eq!(check_compatibility(&dev, &Value::Null), 0);
        assert_eq!(check_compatibility(&dev, &json!({"Other": {}})), 0);
    }

    #[test]
    fn test_private_properties_do_not_break_identity() {
        let mut dev = props("S3", "1", 1);
        dev["RecorderInfo"]["_cache"] = json!(1);
        let exported = clean_properties(&dev);
        assert_eq!(check_compatibility(&dev, &exported), 5);
    }

    #[test]
    fn test_unknown_extension_is_rejected() {
        let err = load_export(Path::new("settings.cfg")).unwrap_err();
        assert!(err.to_string().contains("'.cfg' is unknown"));
    }

    #[test]
    fn test_file_converters_skip_identity() {
        let engine = ExpressionEngine::new();
        let ui = r#"{"element": "ConfigUI", "children": [
            {"element": "Tab", "children": [
                {"element": "FloatField", "config_id": 1, "gain": 0.5},
                {"element": "IntField", "config_id": 2},
                {"element": "FloatField", "config_id": 3, "display_format": "x * 2"}
            ]}
        ]}"#;
        let conv = file_converters(ui, &engine);
        assert!(conv.contains_key(&1));
        assert!(!conv.contains_key(&2));
        assert!(conv.contains_key(&3));
    }

    fn exported(config_ui: &str, values: &[(ConfigId, ConfigValue)]) -> ExportedConfig {
        ExportedConfig {
            values: values.iter().cloned().collect(),
            config_ui: config_ui.to_string(),
            properties: Value::Null,
        }
    }

    fn dialog_tree(engine: &ExpressionEngine) -> ConfigTree {
        let ui = r#"{"element": "ConfigUI", "children": [
            {"element": "Tab", "children": [
                {"element": "IntField", "config_id": 1, "default": 1},
                {"element": "FloatField", "config_id": 2, "default": 0.0},
                {"element": "IntField", "config_id": 3, "default": 7}
            ]}
        ]}"#;
        let doc = SchemaDocument::parse(ui).unwrap();
        build_ui(&doc, &ElementRegistry::with_defaults(), engine)
            .unwrap()
            .tree
    }

    #[test]
    fn test_converted_values_see_earlier_imports() {
        let engine = ExpressionEngine::new();
        let mut tree = dialog_tree(&engine);
        // The exporting device scaled field 2 by field 1
        let file_ui = r#"{"element": "ConfigUI", "children": [
            {"element": "Tab", "children": [
                {"element": "IntField", "config_id": 1},
                {"element": "FloatField", "config_id": 2, "display_format": "x * Config[1]"}
            ]}
        ]}"#;
        let file = exported(
            file_ui,
            &[(1, ConfigValue::Int(10)), (2, ConfigValue::Float(3.0))],
        );

        let report = apply_imported_config(&mut tree, &engine, &file, &[], true);
        assert_eq!(report.applied, 2);
        let snapshot = tree.snapshot();
        assert_eq!(snapshot.get(1), Some(&ConfigValue::Int(10)));
        assert_eq!(snapshot.get(2), Some(&ConfigValue::Float(30.0)));
    }

    #[test]
    fn test_report_counts_every_value() {
        let engine = ExpressionEngine::new();
        let mut tree = dialog_tree(&engine);
        let file_ui = r#"{"element": "ConfigUI", "children": [
            {"element": "Tab", "children": [
                {"element": "IntField", "config_id": 3, "display_format": ""}
            ]}
        ]}"#;
        let file = exported(
            file_ui,
            &[
                (1, ConfigValue::Int(4)),
                (2, ConfigValue::Text("not a number".into())),
                (3, ConfigValue::Int(9)),
                (0x99, ConfigValue::Int(1)),
                (0x8ff7f, ConfigValue::Text("Name".into())),
            ],
        );

        let report = apply_imported_config(&mut tree, &engine, &file, &[0x8ff7f], true);
        assert_eq!(
            report,
            ImportReport {
                applied: 1,
                excluded: 1,
                unknown: 1,
                skipped: 1,
                failed: 1,
            }
        );
        assert_eq!(report.total(), file.values.len());
        assert_eq!(tree.snapshot().get(3), Some(&ConfigValue::Int(7)));
    }

    #[test]
    fn test_default_export_name() {
        let info = DeviceInfo {
            serial: "10001".into(),
            ..Default::default()
        };
        assert_eq!(default_export_name(&info), "10001_config.xcg");
        assert_eq!(default_export_name(&DeviceInfo::default()), "config.xcg");
    }
}
