//! The configuration dialog controller
//!
//! [`ConfigSession`] owns everything one open dialog needs: the recorder, the
//! expression engine, the item tree and the two value snapshots ("original",
//! as loaded, and "current", pending write). The UI calls the node-level
//! setters as the user edits and the session keeps enable states and the
//! current snapshot up to date after each change.
//!
//! Anything that needs the user's answer goes through a [`Prompter`]. The
//! composite flows ([`ConfigSession::ok`], [`ConfigSession::cancel`],
//! [`ConfigSession::import_from`]) call it synchronously. A UI that cannot
//! block can drive the same steps itself: [`ConfigSession::version_question`],
//! [`ConfigSession::save_with_version`], [`ConfigSession::finish_save`] and
//! [`ConfigSession::reset_device`].

use crate::device::{Recorder, SharedRecorder};
use crate::engine::builder::build_ui;
use crate::engine::import_export::{
    apply_imported_config, check_compatibility, export_config, load_export, ExportedConfig,
    ImportReport,
};
use crate::engine::info_tab::InfoTab;
use crate::engine::model::{ConfigTree, ItemKind, NodeId, TabKind};
use crate::engine::registry::ElementRegistry;
use crate::engine::wifi::WifiTab;
use crate::error::{ConfigError, Result, ResultExt, LOCKED_MESSAGE};
use crate::schema::SchemaDocument;
use crate::scripting::{ConfigView, ExpressionEngine};
use crate::types::{ConfigId, ConfigSnapshot, ConfigValue, DEFAULT_IMPORT_EXCLUDE, ID_WIFI_ENABLE};
use std::collections::HashSet;
use std::path::Path;

const DIALOG_TITLE: &str = "Configure Device";
const IMPORT_TITLE: &str = "Import Configuration Data";

/// Options a dialog is opened with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialogOptions {
    /// Set the recorder's clock when saving
    pub set_time: bool,
    /// Wake times are entered in UTC
    pub use_utc: bool,
    /// OK writes to the recorder; off only for debugging
    pub save_on_ok: bool,
    /// Show fields and tabs flagged as advanced
    pub show_advanced: bool,
}

impl Default for DialogOptions {
    fn default() -> Self {
        Self {
            set_time: true,
            use_utc: true,
            save_on_ok: true,
            show_advanced: false,
        }
    }
}

/// What a closed dialog hands back
#[derive(Debug, Clone, PartialEq)]
pub struct DialogResult {
    /// The configuration values as written (or as edited, without saving)
    pub values: ConfigSnapshot,
    pub set_time: bool,
    pub use_utc: bool,
    pub post_config_message: Option<String>,
}

/// A question for the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Question {
    UpgradeVersion { read: u32, max: u32 },
    ResetForWifi,
    SaveBeforeExit,
    ImportIncompatible { score: u8 },
}

impl Question {
    pub fn title(&self) -> &'static str {
        match self {
            Question::UpgradeVersion { .. } => "Apply Configuration",
            Question::ImportIncompatible { .. } => IMPORT_TITLE,
            Question::ResetForWifi | Question::SaveBeforeExit => DIALOG_TITLE,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Question::UpgradeVersion { read, max } => format!(
                "Update configuration file version?\n\n\
                 The configuration data loaded from the device used an outdated format (v{}).\n\
                 The recorder's firmware can use a later version (v{}). Some newer configuration\n\
                 options in the dialog may be lost if the older version is used.\n\n\
                 'Yes' will save using the newer version (recommended).\n\
                 'No' will save using the file's original version.",
                read, max
            ),
            Question::ResetForWifi => "Reset recording device?\n\n\
                 Enabling or disabling Wi-Fi requires the recording device to reset in order \
                 to take effect.\nReset recorder now?"
                .to_string(),
            Question::SaveBeforeExit => "Save configuration changes before exiting?".to_string(),
            Question::ImportIncompatible { .. } => "The imported data may contain incompatibilities.\n\n\
                 Some configuration values may not be imported, or may be invalid for this device.\n\n\
                 Continue with import?"
                .to_string(),
        }
    }

    /// Whether the question offers a Cancel button
    pub fn can_cancel(&self) -> bool {
        matches!(self, Question::SaveBeforeExit)
    }
}

/// The user's answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Yes,
    No,
    Cancel,
}

/// Asks the user questions and shows errors
#[cfg_attr(test, mockall::automock)]
pub trait Prompter {
    fn ask(&mut self, question: &Question) -> Answer;

    fn show_error(&mut self, title: &str, message: &str);
}

/// How a cancel request ended
#[derive(Debug, Clone, PartialEq)]
pub enum CancelOutcome {
    /// Close the dialog; `Some` if the changes were saved first
    Close(Option<DialogResult>),
    KeepOpen,
}

/// A problem found while finishing a save, to be shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveNotice {
    pub title: String,
    pub message: String,
}

/// One open configuration dialog
pub struct ConfigSession {
    recorder: SharedRecorder,
    engine: ExpressionEngine,
    config_ui_raw: String,
    tree: ConfigTree,
    post_config_message: Option<String>,
    current: ConfigSnapshot,
    original: ConfigSnapshot,
    options: DialogOptions,
    apply_wifi_changes: bool,
    info_tabs: Vec<InfoTab>,
    wifi_tab: Option<WifiTab>,
    import_exclude: Vec<ConfigId>,
}

impl ConfigSession {
    /// Open a dialog for `recorder` with the default element set
    pub fn open(recorder: SharedRecorder, options: DialogOptions) -> Result<Self> {
        Self::with_registry(recorder, &ElementRegistry::with_defaults(), options)
    }

    /// Open a dialog, building tabs with `registry`
    pub fn with_registry(
        recorder: SharedRecorder,
        registry: &ElementRegistry,
        options: DialogOptions,
    ) -> Result<Self> {
        let engine = ExpressionEngine::new();
        let config_ui_raw = recorder
            .config_ui_raw()
            .map_err(ConfigError::from)
            .context("Valid configuration UI data could not be retrieved for the device")?;
        let doc = SchemaDocument::parse(&config_ui_raw)
            .context("The device appears to have corrupted configuration UI data")?;
        let built = build_ui(&doc, registry, &engine)?;

        let mut session = Self {
            recorder,
            engine,
            config_ui_raw,
            tree: built.tree,
            post_config_message: built.post_config_message,
            current: ConfigSnapshot::new(),
            original: ConfigSnapshot::new(),
            options,
            apply_wifi_changes: false,
            info_tabs: Vec::new(),
            wifi_tab: None,
            import_exclude: DEFAULT_IMPORT_EXCLUDE.to_vec(),
        };
        session.load_special_tabs();
        session.load_config_data()?;
        tracing::info!(
            "Opened configuration dialog for {} ({} items)",
            session.recorder.info().display_name(),
            session.tree.len()
        );
        Ok(session)
    }

    fn load_special_tabs(&mut self) {
        let has_wifi = self.recorder.info().has_wifi;
        for &node in self.tree.tabs() {
            let item = self.tree.item(node);
            let ItemKind::Tab(kind) = item.kind else {
                continue;
            };
            match kind {
                TabKind::Fields => {}
                TabKind::WiFiSelection => {
                    if !has_wifi {
                        continue;
                    }
                    match WifiTab::load(self.recorder.as_ref()) {
                        Ok(tab) => self.wifi_tab = Some(tab),
                        Err(e) => tracing::warn!("Could not load Wi-Fi networks: {}", e),
                    }
                }
                _ => match InfoTab::load(kind, &item.label, self.recorder.as_ref()) {
                    Ok(tab) => self.info_tabs.push(tab),
                    Err(e) => tracing::warn!("Could not load {}: {}", item.label, e),
                },
            }
        }
    }

    // ==== Accessors ====

    pub fn recorder(&self) -> &SharedRecorder {
        &self.recorder
    }

    pub fn engine(&self) -> &ExpressionEngine {
        &self.engine
    }

    pub fn tree(&self) -> &ConfigTree {
        &self.tree
    }

    pub fn options(&self) -> DialogOptions {
        self.options
    }

    pub fn options_mut(&mut self) -> &mut DialogOptions {
        &mut self.options
    }

    pub fn post_config_message(&self) -> Option<&str> {
        self.post_config_message.as_deref()
    }

    pub fn current(&self) -> &ConfigSnapshot {
        &self.current
    }

    pub fn original(&self) -> &ConfigSnapshot {
        &self.original
    }

    pub fn info_tabs(&self) -> &[InfoTab] {
        &self.info_tabs
    }

    pub fn info_tab_mut(&mut self, kind: TabKind) -> Option<&mut InfoTab> {
        self.info_tabs.iter_mut().find(|t| t.kind() == kind)
    }

    pub fn wifi_tab(&self) -> Option<&WifiTab> {
        self.wifi_tab.as_ref()
    }

    pub fn wifi_tab_mut(&mut self) -> Option<&mut WifiTab> {
        self.wifi_tab.as_mut()
    }

    pub fn apply_wifi_changes(&self) -> bool {
        self.apply_wifi_changes
    }

    pub fn set_apply_wifi_changes(&mut self, apply: bool) {
        self.apply_wifi_changes = apply;
    }

    /// IDs that imports never overwrite
    pub fn set_import_exclude(&mut self, ids: Vec<ConfigId>) {
        self.import_exclude = ids;
    }

    /// The display-value mapping expressions see
    pub fn config_view(&self) -> ConfigView {
        self.tree.config_view(&self.engine)
    }

    /// A field's display value, against a view from [`Self::config_view`]
    pub fn display_value(&self, node: NodeId, view: &ConfigView) -> Option<ConfigValue> {
        match self.tree.display_value(node, &self.engine, view) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("Display value of {} failed: {}", self.tree.item(node).name(), e);
                None
            }
        }
    }

    // ==== Loading ====

    /// Read the stored values from the recorder and show them
    ///
    /// The "original" snapshot is taken from the fields after loading, so
    /// defaults filled in for missing values and IDs the dialog does not
    /// know never count as changes.
    pub fn load_config_data(&mut self) -> Result<()> {
        let data = self
            .recorder
            .config_values(true)
            .map_err(ConfigError::from)
            .context("Could not read configuration data")?;
        self.apply_config_data(&data, false);
        self.update_config_data();
        self.original = self.current.clone();
        Ok(())
    }

    /// Set fields from raw values
    ///
    /// With `reset`, every item goes back to its default first. Unknown IDs
    /// and values a field rejects are logged and skipped.
    pub fn apply_config_data(&mut self, data: &ConfigSnapshot, reset: bool) {
        if reset {
            self.tree.reset_all();
        }
        let mut received = HashSet::new();
        for (id, value) in data.iter() {
            let Some(node) = self.tree.node(id) else {
                tracing::info!("Unknown config item 0x{:X}, probably okay", id);
                continue;
            };
            match self.tree.set_raw(node, value) {
                Ok(()) => {
                    received.insert(node);
                }
                Err(e) => tracing::warn!("Could not set {}: {}", self.tree.item(node).name(), e),
            }
        }
        self.tree.sync_unnamed_check_groups(&received);
        self.tree.update_disabled_items(&self.engine);
    }

    /// Rebuild the current snapshot from the fields
    pub fn update_config_data(&mut self) {
        self.current = self.tree.snapshot();
    }

    /// True if the current values differ from the ones loaded
    pub fn config_changed(&mut self) -> bool {
        self.update_config_data();
        self.current != self.original
    }

    pub fn update_disabled_items(&mut self) {
        self.tree.update_disabled_items(&self.engine);
    }

    fn after_change(&mut self) {
        self.update_disabled_items();
        self.update_config_data();
    }

    // ==== Editing ====

    /// Set a field from the value the user typed
    pub fn set_display_value(&mut self, node: NodeId, display: &ConfigValue) -> Result<()> {
        let view = self.config_view();
        let result = self.tree.set_display_value(node, display, &self.engine, &view);
        self.after_change();
        result
    }

    pub fn set_raw_value(&mut self, node: NodeId, raw: &ConfigValue) -> Result<()> {
        let result = self.tree.set_raw(node, raw);
        self.after_change();
        result
    }

    pub fn set_checked(&mut self, node: NodeId, checked: bool) {
        self.tree.set_checked(node, checked);
        self.after_change();
    }

    pub fn set_to_default(&mut self, node: NodeId) {
        self.tree.set_to_default(node);
        self.after_change();
    }

    /// Reset every field of the dialog to its default
    pub fn reset_all(&mut self) {
        self.tree.reset_all();
        self.after_change();
    }

    // ==== Saving ====

    fn version_bounds(&self) -> (u32, u32) {
        let read = self.recorder.config_version_read();
        let max = self
            .recorder
            .supported_config_versions()
            .into_iter()
            .max()
            .or(read)
            .unwrap_or(1);
        (read.unwrap_or(max), max)
    }

    /// The upgrade question, if the stored format is older but still usable
    pub fn version_question(&self) -> Option<Question> {
        let (read, max) = self.version_bounds();
        let supported = self.recorder.supported_config_versions();
        (read < max && supported.contains(&read)).then_some(Question::UpgradeVersion { read, max })
    }

    /// The version to write without asking
    pub fn default_version(&self) -> u32 {
        let (read, max) = self.version_bounds();
        read.max(max)
    }

    /// Pick the format version, asking if an upgrade is optional
    pub fn resolve_version(&self, prompter: &mut dyn Prompter) -> u32 {
        match self.version_question() {
            Some(q @ Question::UpgradeVersion { read, max }) => match prompter.ask(&q) {
                Answer::Yes => max,
                _ => read,
            },
            _ => self.default_version(),
        }
    }

    /// Write the current values using a chosen format version
    ///
    /// Stored values with IDs the dialog does not know are kept.
    pub fn save_with_version(&mut self, version: u32) -> Result<()> {
        self.update_config_data();
        self.recorder
            .apply_config(&self.current, true, version)
            .map_err(ConfigError::from)
            .context("Could not write configuration data")?;
        tracing::info!("Wrote {} configuration values (v{})", self.current.len(), version);
        self.original = self.current.clone();
        Ok(())
    }

    pub fn save_config_data(&mut self, prompter: &mut dyn Prompter) -> Result<()> {
        let version = self.resolve_version(prompter);
        self.save_with_version(version)
    }

    /// The text shown when a save fails
    pub fn save_error_message(&self, err: &ConfigError) -> String {
        match err.device_error() {
            Some(dev) => dev.user_message(self.options.show_advanced),
            None => {
                let mut msg = String::from(
                    "An unexpected error occurred when trying to update the recorder's \
                     configuration data.",
                );
                if self.options.show_advanced {
                    msg.push_str(&format!("\n\n{}", err));
                }
                msg
            }
        }
    }

    /// Save the calibration and Wi-Fi tabs
    ///
    /// The Wi-Fi tab is saved only when "apply Wi-Fi changes" is on. Stops
    /// at the first info tab that fails.
    pub fn save_tabs(&mut self) -> Result<()> {
        for tab in &mut self.info_tabs {
            tab.save(self.recorder.as_ref())?;
        }
        if self.apply_wifi_changes {
            if let Some(wifi) = &mut self.wifi_tab {
                wifi.save(self.recorder.as_ref())?;
            }
        }
        Ok(())
    }

    /// Set the recorder's clock if the option is on
    pub fn set_clock(&mut self) -> Result<bool> {
        if !self.options.set_time || !self.recorder.info().has_command_interface {
            return Ok(false);
        }
        if let Some(wifi) = &mut self.wifi_tab {
            wifi.shutdown();
        }
        tracing::info!("Setting clock...");
        self.recorder
            .set_time()
            .map_err(ConfigError::from)
            .context("Could not set the recorder's clock")?;
        Ok(true)
    }

    /// Steps after a successful configuration write
    ///
    /// Saves the tabs and sets the clock. Problems are returned for display,
    /// along with the reset question if Wi-Fi changed.
    pub fn finish_save(&mut self, wifi_was_enabled: bool) -> (Vec<SaveNotice>, Option<Question>) {
        let mut notices = Vec::new();
        if let Err(e) = self.save_tabs() {
            tracing::error!("Error saving tabs: {}", e);
            notices.push(SaveNotice {
                title: DIALOG_TITLE.to_string(),
                message: self.save_error_message(&e),
            });
        }
        if let Err(e) = self.set_clock() {
            tracing::error!("Error setting clock: {}", e);
            notices.push(SaveNotice {
                title: DIALOG_TITLE.to_string(),
                message: "The recorder's clock could not be set.".to_string(),
            });
        }
        let wifi_changed = self.recorder.info().has_wifi
            && self.current.is_truthy(ID_WIFI_ENABLE) != wifi_was_enabled;
        (notices, wifi_changed.then_some(Question::ResetForWifi))
    }

    pub fn reset_device(&self) -> Result<()> {
        tracing::info!("Resetting {}", self.recorder.info().display_name());
        self.recorder
            .reset()
            .map_err(ConfigError::from)
            .context("Could not reset the recorder")
    }

    /// Whether Wi-Fi was enabled in the data as loaded
    pub fn wifi_was_enabled(&self) -> bool {
        self.original.is_truthy(ID_WIFI_ENABLE)
    }

    pub fn result(&self) -> DialogResult {
        DialogResult {
            values: self.current.clone(),
            set_time: self.options.set_time,
            use_utc: self.options.use_utc,
            post_config_message: self.post_config_message.clone(),
        }
    }

    // ==== Dialog buttons ====

    /// Handle OK
    ///
    /// A failed write is shown to the user and still closes the dialog.
    pub fn ok(&mut self, prompter: &mut dyn Prompter) -> DialogResult {
        let wifi_was_enabled = self.wifi_was_enabled();
        if !self.options.save_on_ok {
            self.update_config_data();
            return self.result();
        }

        if let Err(e) = self.save_config_data(prompter) {
            tracing::error!("Could not save configuration: {}", e);
            let message = if e.is_locked() {
                LOCKED_MESSAGE.to_string()
            } else {
                self.save_error_message(&e)
            };
            prompter.show_error("Configuration Error", &message);
            return self.result();
        }

        let (notices, question) = self.finish_save(wifi_was_enabled);
        for notice in &notices {
            prompter.show_error(&notice.title, &notice.message);
        }
        if let Some(q) = question {
            if prompter.ask(&q) == Answer::Yes {
                if let Err(e) = self.reset_device() {
                    tracing::error!("{}", e);
                    prompter.show_error(DIALOG_TITLE, "The recorder could not be reset.");
                }
            }
        }
        self.result()
    }

    /// Handle Cancel, offering to save changes
    pub fn cancel(&mut self, prompter: &mut dyn Prompter) -> CancelOutcome {
        if !self.config_changed() {
            return CancelOutcome::Close(None);
        }
        match prompter.ask(&Question::SaveBeforeExit) {
            Answer::Cancel => CancelOutcome::KeepOpen,
            Answer::No => CancelOutcome::Close(None),
            Answer::Yes => match self.save_config_data(prompter) {
                Ok(()) => CancelOutcome::Close(Some(self.result())),
                Err(e) => {
                    tracing::error!("Could not save configuration: {}", e);
                    prompter.show_error("Configuration Error", &self.save_error_message(&e));
                    CancelOutcome::KeepOpen
                }
            },
        }
    }

    // ==== Import/export ====

    /// Export the current values with this device's UI and properties
    pub fn export_to(&mut self, path: &Path) -> Result<ExportedConfig> {
        self.update_config_data();
        let properties = self
            .recorder
            .properties()
            .map_err(ConfigError::from)
            .context("Could not read recorder properties")?;
        export_config(path, &self.current, &self.config_ui_raw, &properties)
    }

    /// Compatibility of imported data with this device, 0 to 5
    pub fn compatibility(&self, imported: &ExportedConfig) -> u8 {
        match self.recorder.properties() {
            Ok(props) => check_compatibility(&props, &imported.properties),
            Err(e) => {
                tracing::warn!("Could not read recorder properties: {}", e);
                0
            }
        }
    }

    /// The question to ask before importing, or an error if the data
    /// cannot be imported at all
    pub fn import_question(&self, imported: &ExportedConfig) -> Result<Option<Question>> {
        match self.compatibility(imported) {
            0 => Err(ConfigError::Incompatible(
                "This device is not compatible with the imported configuration data.\n\n\
                 The imported data was generated by an incompatible device, or is missing \
                 required information."
                    .to_string(),
            )),
            score @ 1..=2 => Ok(Some(Question::ImportIncompatible { score })),
            _ => Ok(None),
        }
    }

    /// Put imported values into the dialog without asking
    pub fn apply_import(&mut self, imported: &ExportedConfig) -> ImportReport {
        let report =
            apply_imported_config(&mut self.tree, &self.engine, imported, &self.import_exclude, true);
        self.update_config_data();
        report
    }

    /// Import a file, asking before possibly incompatible data
    ///
    /// Returns `None` if nothing was imported. Errors are shown through the
    /// prompter.
    pub fn import_from(&mut self, path: &Path, prompter: &mut dyn Prompter) -> Option<ImportReport> {
        let imported = match load_export(path) {
            Ok(data) => data,
            Err(e) => {
                tracing::error!("Could not import {}: {}", path.display(), e);
                let message = match e.root() {
                    ConfigError::Incompatible(msg) => msg.clone(),
                    _ => "Configuration data could not be read.".to_string(),
                };
                prompter.show_error(IMPORT_TITLE, &message);
                return None;
            }
        };
        match self.import_question(&imported) {
            Err(e) => {
                let message = match e {
                    ConfigError::Incompatible(msg) => msg,
                    other => other.to_string(),
                };
                prompter.show_error(IMPORT_TITLE, &message);
                return None;
            }
            Ok(Some(q)) => {
                if prompter.ask(&q) != Answer::Yes {
                    return None;
                }
            }
            Ok(None) => {}
        }
        Some(self.apply_import(&imported))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MockRecorder;
    use crate::types::ID_RECORDER_NAME;
    use mockall::predicate::eq;
    use std::sync::Arc;

    const ID_TIME_LIMIT: ConfigId = 0x0bff7f;
    const ID_THRESHOLD: ConfigId = 0x11ff7f;
    const ID_TRIGGER: ConfigId = 0x10ff7f;
    const ID_PRESSURE_RATE: ConfigId = 0x02ff24;
    const ID_PRESSURE_GROUP: ConfigId = 0x01ff24;

    fn values() -> ConfigSnapshot {
        let mut v = ConfigSnapshot::new();
        v.insert(ID_RECORDER_NAME, "Bridge");
        v.insert(ID_TIME_LIMIT, 120i64);
        v.insert(ID_TRIGGER, true);
        v.insert(ID_THRESHOLD, 2000.0);
        v
    }

    fn session_with(rec: MockRecorder) -> (Arc<MockRecorder>, ConfigSession) {
        let rec = Arc::new(rec);
        let session = ConfigSession::open(rec.clone(), DialogOptions::default()).unwrap();
        (rec, session)
    }

    fn no_questions() -> MockPrompter {
        let mut p = MockPrompter::new();
        p.expect_ask().never();
        p.expect_show_error().never();
        p
    }

    #[test]
    fn test_load_is_unchanged() {
        let (_, mut session) = session_with(MockRecorder::new("S3", "1").with_values(values(), Some(2)));
        assert!(!session.config_changed());
        assert_eq!(session.current().get(ID_TIME_LIMIT), Some(&ConfigValue::Int(120)));
    }

    #[test]
    fn test_single_edit_is_a_change() {
        let (_, mut session) = session_with(MockRecorder::new("S3", "1").with_values(values(), Some(2)));
        let node = session.tree().node(ID_TIME_LIMIT).unwrap();
        session.set_raw_value(node, &ConfigValue::Int(30)).unwrap();
        assert!(session.config_changed());
    }

    #[test]
    fn test_display_value_goes_through_transform() {
        let (_, mut session) = session_with(MockRecorder::new("S3", "1").with_values(values(), Some(2)));
        let node = session.tree().node(ID_THRESHOLD).unwrap();
        let view = session.config_view();
        assert_eq!(session.display_value(node, &view).and_then(|v| v.as_f64()), Some(2.0));

        session.set_display_value(node, &ConfigValue::Float(3.0)).unwrap();
        let raw = session.current().get(ID_THRESHOLD).and_then(|v| v.as_f64()).unwrap();
        assert!((raw - 3000.0).abs() < 1e-6);
    }

    #[test]
    fn test_condition_disables_dependent_field() {
        let (_, mut session) = session_with(MockRecorder::new("S3", "1").with_values(values(), Some(2)));
        let trigger = session.tree().node(ID_TRIGGER).unwrap();
        session.set_raw_value(trigger, &ConfigValue::Bool(false)).unwrap();
        assert!(session.current().get(ID_THRESHOLD).is_none());
    }

    #[test]
    fn test_unchecking_group_clears_descendants() {
        let mut v = values();
        v.insert(ID_PRESSURE_GROUP, true);
        v.insert(ID_PRESSURE_RATE, 2.0);
        let (_, mut session) = session_with(MockRecorder::new("S3", "1").with_values(v, Some(2)));
        assert!(session.current().contains(ID_PRESSURE_RATE));

        let group = session.tree().node(ID_PRESSURE_GROUP).unwrap();
        session.set_checked(group, false);
        assert!(session.current().get(ID_PRESSURE_RATE).is_none());
        assert_eq!(
            session.current().get(ID_PRESSURE_GROUP),
            Some(&ConfigValue::Bool(false))
        );
    }

    #[test]
    fn test_upgrade_declined_keeps_version() {
        let (rec, mut session) = session_with(
            MockRecorder::new("S3", "1")
                .with_values(values(), Some(1))
                .with_version(Some(1), vec![1, 2]),
        );
        let mut p = MockPrompter::new();
        p.expect_ask()
            .with(eq(Question::UpgradeVersion { read: 1, max: 2 }))
            .times(1)
            .return_const(Answer::No);
        session.save_config_data(&mut p).unwrap();
        assert_eq!(rec.last_write().unwrap().1, 1);
    }

    #[test]
    fn test_unsupported_version_writes_max_silently() {
        let (rec, mut session) = session_with(
            MockRecorder::new("S3", "1")
                .with_values(values(), Some(1))
                .with_version(Some(1), vec![2, 3]),
        );
        session.save_config_data(&mut no_questions()).unwrap();
        assert_eq!(rec.last_write().unwrap().1, 3);
    }

    #[test]
    fn test_unknown_ids_survive_save() {
        let mut v = values();
        v.insert(0x7777ff, 5i64);
        let (rec, mut session) = session_with(MockRecorder::new("S3", "1").with_values(v, Some(2)));
        session.save_config_data(&mut no_questions()).unwrap();
        assert!(rec.stored_values().contains(0x7777ff));
        assert!(!session.current().contains(0x7777ff));
    }

    #[test]
    fn test_ok_asks_reset_when_wifi_toggled() {
        let mut v = values();
        v.insert(ID_WIFI_ENABLE, true);
        let (rec, mut session) =
            session_with(MockRecorder::new("W8", "1").with_wifi().with_values(v, Some(2)));
        let node = session.tree().node(ID_WIFI_ENABLE).unwrap();
        session.set_raw_value(node, &ConfigValue::Bool(true)).unwrap();
        session.set_raw_value(node, &ConfigValue::Bool(false)).unwrap();

        let mut p = MockPrompter::new();
        p.expect_ask()
            .with(eq(Question::ResetForWifi))
            .times(1)
            .return_const(Answer::Yes);
        p.expect_show_error().never();
        let result = session.ok(&mut p);
        assert!(result.set_time);
        assert!(rec.commands().contains(&"reset"));
        assert!(rec.commands().contains(&"set_time"));
    }

    #[test]
    fn test_ok_without_save_does_not_write() {
        let rec = Arc::new(MockRecorder::new("S3", "1").with_values(values(), Some(2)));
        let options = DialogOptions {
            save_on_ok: false,
            ..Default::default()
        };
        let mut session = ConfigSession::open(rec.clone(), options).unwrap();
        let result = session.ok(&mut no_questions());
        assert_eq!(result.values.get(ID_TIME_LIMIT), Some(&ConfigValue::Int(120)));
        assert!(rec.writes().is_empty());
    }

    #[test]
    fn test_ok_reports_removed_device() {
        let (_, mut session) = session_with(
            MockRecorder::new("S3", "1")
                .with_values(values(), Some(2))
                .failing_apply(crate::device::mock_device::MockFailure::Removed),
        );
        let mut p = MockPrompter::new();
        p.expect_show_error()
            .withf(|_, msg| msg.contains("appears to have been removed"))
            .times(1)
            .return_const(());
        session.ok(&mut p);
    }

    #[test]
    fn test_cancel_paths() {
        let (_, mut session) = session_with(MockRecorder::new("S3", "1").with_values(values(), Some(2)));
        assert_eq!(session.cancel(&mut no_questions()), CancelOutcome::Close(None));

        let node = session.tree().node(ID_TIME_LIMIT).unwrap();
        session.set_raw_value(node, &ConfigValue::Int(5)).unwrap();

        let mut p = MockPrompter::new();
        p.expect_ask().times(1).return_const(Answer::Cancel);
        assert_eq!(session.cancel(&mut p), CancelOutcome::KeepOpen);

        let mut p = MockPrompter::new();
        p.expect_ask()
            .with(eq(Question::SaveBeforeExit))
            .times(1)
            .return_const(Answer::Yes);
        match session.cancel(&mut p) {
            CancelOutcome::Close(Some(result)) => {
                assert_eq!(result.values.get(ID_TIME_LIMIT), Some(&ConfigValue::Int(5)))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_special_tabs_follow_capabilities() {
        let (_, session) = session_with(MockRecorder::new("S3", "1"));
        assert!(session.wifi_tab().is_none());
        assert_eq!(session.info_tabs().len(), 3);

        let (_, session) = session_with(MockRecorder::new("W8", "1").with_wifi());
        assert!(session.wifi_tab().is_some());
    }

    #[test]
    fn test_question_text() {
        let q = Question::UpgradeVersion { read: 1, max: 3 };
        assert!(q.message().contains("(v1)"));
        assert!(q.message().contains("(v3)"));
        assert!(Question::SaveBeforeExit.can_cancel());
        assert!(!Question::ResetForWifi.can_cancel());
    }
}
