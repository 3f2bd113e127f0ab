//! The configuration dialog window
//!
//! [`ConfigDialogView`] renders a [`ConfigSession`]: one tab per schema tab,
//! a row per field, and the OK/Cancel/Import/Export bar. egui cannot block
//! on a question, so the save, cancel and import flows are a small state
//! machine ([`Flow`]) stepped by the answers from [`QuestionDialog`].
//!
//! Edits are collected while rendering and applied afterwards, so the
//! session is only borrowed immutably during layout.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Local, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};
use egui::{Color32, RichText, Ui};

use super::dialogs::{
    show_dialog, show_dialog_with_title, AddNetworkAction, AddNetworkContext, AddNetworkDialog,
    AddNetworkState, MessageContext, MessageDialog, MessageState, QuestionContext, QuestionDialog,
    QuestionState,
};
use crate::engine::import_export::default_export_name;
use crate::engine::{
    load_export, Answer, ConfigSession, DialogResult, ExportedConfig, InfoTab, ItemKind, NodeId,
    Question, TabKind, EXPORT_EXTENSION,
};
use crate::error::{ConfigError, LOCKED_MESSAGE};
use crate::scripting::ConfigView;
use crate::types::{ConfigValue, FieldKind};

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const TIME_FORMAT: &str = "%H:%M:%S";
const ERROR_TITLE: &str = "Configuration Error";
const IMPORT_TITLE: &str = "Import Configuration Data";
const EXPORT_TITLE: &str = "Export Configuration Data";

/// What the window wants after a frame
#[derive(Debug, Clone, PartialEq)]
pub enum ViewOutcome {
    Open,
    /// The dialog closed; `Some` if values were saved (or OK was pressed)
    Closed(Option<DialogResult>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SaveReason {
    Ok,
    Cancel,
}

/// Where the dialog is in its button flows
#[derive(Debug)]
enum Flow {
    Editing,
    AskVersion { reason: SaveReason, read: u32, max: u32 },
    AskSaveBeforeExit,
    AskReset,
    AskImport(Box<ExportedConfig>),
    /// Close once the message queue is empty
    Closing(Option<DialogResult>),
}

/// A change made while rendering
#[derive(Debug, Clone, PartialEq)]
enum FieldEdit {
    Display(NodeId, ConfigValue),
    Checked(NodeId, bool),
    Default(NodeId),
    Invalid { label: String, message: String },
}

#[derive(Debug, Clone, PartialEq)]
enum InfoEdit {
    Coefficient { entry: usize, index: usize, value: f64 },
    Revert(usize),
    CreateFromFactory,
}

#[derive(Debug, Clone, PartialEq)]
enum WifiEdit {
    Scan,
    Select(String),
    Forget(String),
    Add { ssid: String, open: bool },
}

/// One open configuration dialog window
pub struct ConfigDialogView {
    session: ConfigSession,
    title: String,
    device_key: String,
    selected_tab: Option<NodeId>,
    view: ConfigView,
    buffers: HashMap<NodeId, String>,
    flow: Flow,
    wifi_was_enabled: bool,
    question_open: bool,
    question: QuestionState,
    messages: MessageState,
    add_network_open: bool,
    add_network: AddNetworkState,
}

impl ConfigDialogView {
    pub fn new(session: ConfigSession) -> Self {
        let info = session.recorder().info();
        let title = if info.name.is_empty() {
            format!("Configure {}", info.display_name())
        } else {
            format!("Configure {} ({})", info.name, info.display_name())
        };
        let view = session.config_view();
        Self {
            title,
            device_key: info.key(),
            selected_tab: None,
            view,
            buffers: HashMap::new(),
            flow: Flow::Editing,
            wifi_was_enabled: false,
            question_open: false,
            question: QuestionState::default(),
            messages: MessageState::default(),
            add_network_open: false,
            add_network: AddNetworkState::default(),
            session,
        }
    }

    pub fn session(&self) -> &ConfigSession {
        &self.session
    }

    /// Key of the device being configured
    pub fn device_key(&self) -> &str {
        &self.device_key
    }

    /// Render the window and any modal on top of it
    pub fn show(&mut self, ctx: &egui::Context) -> ViewOutcome {
        if let Some(wifi) = self.session.wifi_tab_mut() {
            if wifi.poll() {
                ctx.request_repaint();
            }
            if wifi.is_scanning() {
                ctx.request_repaint_after(std::time::Duration::from_millis(100));
            }
        }

        let modal = self.question_open || !self.messages.is_empty() || self.add_network_open;
        let mut open = true;
        egui::Window::new(self.title.clone())
            .id(egui::Id::new("config_dialog"))
            .default_size([680.0, 520.0])
            .collapsible(false)
            .open(&mut open)
            .show(ctx, |ui| {
                ui.add_enabled_ui(!modal, |ui| self.render_body(ui));
            });
        if !open {
            // Closing the window behaves like Cancel
            self.on_cancel();
        }

        self.render_modals(ctx);
        self.poll_close()
    }

    /// Stop background work (the Wi-Fi scan)
    pub fn shutdown(&mut self) {
        if let Some(wifi) = self.session.wifi_tab_mut() {
            wifi.shutdown();
        }
    }

    fn poll_close(&mut self) -> ViewOutcome {
        if !matches!(self.flow, Flow::Closing(_)) || !self.messages.is_empty() {
            return ViewOutcome::Open;
        }
        self.shutdown();
        match std::mem::replace(&mut self.flow, Flow::Editing) {
            Flow::Closing(result) => ViewOutcome::Closed(result),
            _ => ViewOutcome::Open,
        }
    }

    // ==== Rendering ====

    /// Tabs shown: advanced ones only in advanced mode, special ones only if
    /// they loaded
    fn visible_tabs(&self) -> Vec<(NodeId, TabKind, String)> {
        let tree = self.session.tree();
        let show_advanced = self.session.options().show_advanced;
        tree.tabs()
            .iter()
            .filter_map(|&node| {
                let item = tree.item(node);
                let ItemKind::Tab(kind) = item.kind else {
                    return None;
                };
                if item.advanced && !show_advanced {
                    return None;
                }
                let loaded = match kind {
                    TabKind::Fields => true,
                    TabKind::WiFiSelection => self.session.wifi_tab().is_some(),
                    _ => self.session.info_tabs().iter().any(|t| t.kind() == kind),
                };
                loaded.then(|| (node, kind, item.label.clone()))
            })
            .collect()
    }

    fn render_body(&mut self, ui: &mut Ui) {
        let tabs = self.visible_tabs();
        if !tabs.iter().any(|(n, _, _)| Some(*n) == self.selected_tab) {
            self.selected_tab = tabs.first().map(|(n, _, _)| *n);
        }

        ui.horizontal_wrapped(|ui| {
            for (node, _, label) in &tabs {
                ui.selectable_value(&mut self.selected_tab, Some(*node), label);
            }
        });
        ui.separator();

        egui::TopBottomPanel::bottom("config_dialog_buttons")
            .show_inside(ui, |ui| self.render_button_bar(ui));

        egui::CentralPanel::default().show_inside(ui, |ui| {
            let Some((node, kind, _)) = tabs
                .iter()
                .find(|(n, _, _)| Some(*n) == self.selected_tab)
                .cloned()
            else {
                ui.label("This device has nothing to configure.");
                return;
            };
            egui::ScrollArea::vertical().show(ui, |ui| match kind {
                TabKind::Fields => self.render_fields_tab(ui, node),
                TabKind::WiFiSelection => self.render_wifi_tab(ui),
                _ => self.render_info_tab(ui, kind),
            });
        });
    }

    fn render_fields_tab(&mut self, ui: &mut Ui, tab: NodeId) {
        let options = self.session.options();
        let mut renderer = FieldRenderer {
            session: &self.session,
            view: &self.view,
            buffers: &mut self.buffers,
            show_advanced: options.show_advanced,
            use_utc: options.use_utc,
            edits: Vec::new(),
        };
        for &child in &self.session.tree().item(tab).children {
            renderer.item(ui, child);
        }
        let edits = renderer.edits;
        self.apply_edits(edits);
    }

    fn render_info_tab(&mut self, ui: &mut Ui, kind: TabKind) {
        let Some(tab) = self.session.info_tabs().iter().find(|t| t.kind() == kind) else {
            return;
        };
        let edits = render_info(ui, tab);
        if edits.is_empty() {
            return;
        }
        let Some(tab) = self.session.info_tab_mut(kind) else {
            return;
        };
        let mut errors = Vec::new();
        for edit in edits {
            match edit {
                InfoEdit::Coefficient { entry, index, value } => {
                    if let Err(e) = tab.set_coefficient(entry, index, value) {
                        errors.push(e.to_string());
                    }
                }
                InfoEdit::Revert(entry) => tab.revert_to_factory(entry),
                InfoEdit::CreateFromFactory => tab.create_from_factory(),
            }
        }
        for err in errors {
            self.messages.push(ERROR_TITLE, err);
        }
    }

    fn render_wifi_tab(&mut self, ui: &mut Ui) {
        let mut edits = Vec::new();
        let mut apply = self.session.apply_wifi_changes();
        let Some(wifi) = self.session.wifi_tab() else {
            return;
        };

        ui.horizontal(|ui| {
            if ui
                .add_enabled(!wifi.is_scanning(), egui::Button::new("Scan"))
                .on_hover_text("Look for access points near the recorder")
                .clicked()
            {
                edits.push(WifiEdit::Scan);
            }
            if wifi.is_scanning() {
                ui.spinner();
                ui.label("Scanning...");
            }
            if ui.button("Add Network...").clicked() {
                edits.push(WifiEdit::Add {
                    ssid: String::new(),
                    open: false,
                });
            }
        });
        if let Some(err) = wifi.last_error() {
            ui.colored_label(Color32::LIGHT_RED, err);
        }
        ui.add_space(4.0);

        egui::Grid::new("wifi_grid")
            .num_columns(5)
            .striped(true)
            .spacing([12.0, 4.0])
            .show(ui, |ui| {
                for header in ["Network", "Signal", "Security", "Status", ""] {
                    ui.strong(header);
                }
                ui.end_row();

                for ap in wifi.access_points() {
                    let name = if ap.selected {
                        RichText::new(&ap.ssid).strong()
                    } else {
                        RichText::new(&ap.ssid)
                    };
                    ui.label(name);
                    ui.label(ap.rssi.map(|r| format!("{:.0} dBm", r)).unwrap_or_default());
                    ui.label(if ap.auth { "Secured" } else { "Open" });
                    ui.label(match (ap.selected, ap.known) {
                        (true, _) => "Selected",
                        (false, true) => "Known",
                        (false, false) => "",
                    });
                    ui.horizontal(|ui| {
                        if !ap.selected && ui.small_button("Use").clicked() {
                            edits.push(if ap.known {
                                WifiEdit::Select(ap.ssid.clone())
                            } else {
                                WifiEdit::Add {
                                    ssid: ap.ssid.clone(),
                                    open: !ap.auth,
                                }
                            });
                        }
                        if ap.known && ui.small_button("Forget").clicked() {
                            edits.push(WifiEdit::Forget(ap.ssid.clone()));
                        }
                    });
                    ui.end_row();
                }
            });

        ui.add_space(8.0);
        ui.checkbox(&mut apply, "Apply Wi-Fi changes when saving");
        if apply != self.session.apply_wifi_changes() {
            self.session.set_apply_wifi_changes(apply);
        }

        if edits.is_empty() {
            return;
        }
        let recorder = self.session.recorder().clone();
        for edit in edits {
            match edit {
                WifiEdit::Add { ssid, open } => {
                    self.add_network = AddNetworkState::for_ssid(&ssid, open);
                    self.add_network_open = true;
                }
                WifiEdit::Scan => {
                    if let Some(wifi) = self.session.wifi_tab_mut() {
                        wifi.start_scan(recorder.clone());
                    }
                }
                WifiEdit::Select(ssid) => {
                    if let Some(wifi) = self.session.wifi_tab_mut() {
                        wifi.select(&ssid);
                    }
                    self.session.set_apply_wifi_changes(true);
                }
                WifiEdit::Forget(ssid) => {
                    if let Some(wifi) = self.session.wifi_tab_mut() {
                        wifi.forget(&ssid);
                    }
                    self.session.set_apply_wifi_changes(true);
                }
            }
        }
    }

    fn render_button_bar(&mut self, ui: &mut Ui) {
        let has_clock = self.session.recorder().info().has_command_interface;
        ui.add_space(4.0);
        ui.horizontal(|ui| {
            let options = self.session.options_mut();
            ui.add_enabled(
                has_clock,
                egui::Checkbox::new(&mut options.set_time, "Set device clock on exit"),
            );
            let use_utc = options.use_utc;
            ui.checkbox(&mut options.use_utc, "Show times in UTC");
            if use_utc != options.use_utc {
                self.buffers.clear();
            }
        });
        ui.add_space(4.0);
        ui.horizontal(|ui| {
            if ui.button("Import...").clicked() {
                if let Some(path) = rfd::FileDialog::new()
                    .set_title(IMPORT_TITLE)
                    .add_filter("Exported configuration", &[EXPORT_EXTENSION])
                    .pick_file()
                {
                    self.start_import(&path);
                }
            }
            if ui.button("Export...").clicked() {
                let name = default_export_name(&self.session.recorder().info());
                if let Some(path) = rfd::FileDialog::new()
                    .set_title(EXPORT_TITLE)
                    .add_filter("Exported configuration", &[EXPORT_EXTENSION])
                    .set_file_name(name)
                    .save_file()
                {
                    self.export(&path);
                }
            }
            if ui
                .button("Reset to Defaults")
                .on_hover_text("Reset every field to its default value")
                .clicked()
            {
                self.session.reset_all();
                self.refresh();
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui.button("Cancel").clicked() {
                    self.on_cancel();
                }
                if ui.button("  OK  ").clicked() {
                    self.on_ok();
                }
            });
        });
        ui.add_space(4.0);
    }

    fn render_modals(&mut self, ctx: &egui::Context) {
        if !self.messages.is_empty() {
            let title = self.messages.title();
            let mut open = true;
            show_dialog_with_title::<MessageDialog>(
                ctx,
                &title,
                &mut open,
                &mut self.messages,
                MessageContext,
            );
            return;
        }

        if self.question_open {
            let title = self.question.title();
            if let Some(answer) = show_dialog_with_title::<QuestionDialog>(
                ctx,
                title,
                &mut self.question_open,
                &mut self.question,
                QuestionContext,
            ) {
                self.answer(answer);
            }
            return;
        }

        if let Some(AddNetworkAction::Add { ssid, password }) = show_dialog::<AddNetworkDialog>(
            ctx,
            &mut self.add_network_open,
            &mut self.add_network,
            AddNetworkContext,
        ) {
            if let Some(wifi) = self.session.wifi_tab_mut() {
                wifi.add_network(&ssid, password);
            }
            self.session.set_apply_wifi_changes(true);
        }
    }

    // ==== Edits ====

    fn apply_edits(&mut self, edits: Vec<FieldEdit>) {
        if edits.is_empty() {
            return;
        }
        for edit in edits {
            match edit {
                FieldEdit::Display(node, value) => {
                    if let Err(e) = self.session.set_display_value(node, &value) {
                        tracing::warn!("Rejected value {}: {}", value, e);
                        let label = self.session.tree().item(node).label.clone();
                        self.messages
                            .push(ERROR_TITLE, format!("'{}' is not valid for {}", value, label));
                    }
                }
                FieldEdit::Checked(node, checked) => self.session.set_checked(node, checked),
                FieldEdit::Default(node) => self.session.set_to_default(node),
                FieldEdit::Invalid { label, message } => {
                    self.messages
                        .push(ERROR_TITLE, format!("{}: {}", label, message));
                }
            }
        }
        self.refresh();
    }

    /// Re-derive displayed text after values changed
    fn refresh(&mut self) {
        self.buffers.clear();
        self.view = self.session.config_view();
    }

    // ==== Button flows ====

    fn ask(&mut self, question: Question) {
        self.question = QuestionState::ask(question);
        self.question_open = true;
    }

    fn on_ok(&mut self) {
        if !matches!(self.flow, Flow::Editing) {
            return;
        }
        if !self.session.options().save_on_ok {
            self.session.update_config_data();
            self.flow = Flow::Closing(Some(self.session.result()));
            return;
        }
        self.wifi_was_enabled = self.session.wifi_was_enabled();
        self.begin_save(SaveReason::Ok);
    }

    fn on_cancel(&mut self) {
        if !matches!(self.flow, Flow::Editing) {
            return;
        }
        if !self.session.config_changed() {
            self.flow = Flow::Closing(None);
            return;
        }
        self.flow = Flow::AskSaveBeforeExit;
        self.ask(Question::SaveBeforeExit);
    }

    fn begin_save(&mut self, reason: SaveReason) {
        match self.session.version_question() {
            Some(q @ Question::UpgradeVersion { read, max }) => {
                self.flow = Flow::AskVersion { reason, read, max };
                self.ask(q);
            }
            _ => {
                let version = self.session.default_version();
                self.save(reason, version);
            }
        }
    }

    fn save(&mut self, reason: SaveReason, version: u32) {
        if let Err(e) = self.session.save_with_version(version) {
            tracing::error!("Could not save configuration: {}", e);
            let message = if reason == SaveReason::Ok && e.is_locked() {
                LOCKED_MESSAGE.to_string()
            } else {
                self.session.save_error_message(&e)
            };
            self.messages.push(ERROR_TITLE, message);
            self.flow = match reason {
                SaveReason::Ok => Flow::Closing(Some(self.session.result())),
                SaveReason::Cancel => Flow::Editing,
            };
            return;
        }

        if reason == SaveReason::Cancel {
            self.flow = Flow::Closing(Some(self.session.result()));
            return;
        }

        let (notices, question) = self.session.finish_save(self.wifi_was_enabled);
        for notice in notices {
            self.messages.push(notice.title, notice.message);
        }
        match question {
            Some(q) => {
                self.flow = Flow::AskReset;
                self.ask(q);
            }
            None => self.flow = Flow::Closing(Some(self.session.result())),
        }
    }

    fn answer(&mut self, answer: Answer) {
        match std::mem::replace(&mut self.flow, Flow::Editing) {
            Flow::AskVersion { reason, read, max } => {
                let version = if answer == Answer::Yes { max } else { read };
                self.save(reason, version);
            }
            Flow::AskSaveBeforeExit => match answer {
                Answer::Cancel => {}
                Answer::No => self.flow = Flow::Closing(None),
                Answer::Yes => self.begin_save(SaveReason::Cancel),
            },
            Flow::AskReset => {
                if answer == Answer::Yes {
                    if let Err(e) = self.session.reset_device() {
                        tracing::error!("{}", e);
                        self.messages
                            .push("Configure Device", "The recorder could not be reset.");
                    }
                }
                self.flow = Flow::Closing(Some(self.session.result()));
            }
            Flow::AskImport(imported) => {
                if answer == Answer::Yes {
                    self.finish_import(&imported);
                }
            }
            other => self.flow = other,
        }
    }

    // ==== Import/export ====

    fn start_import(&mut self, path: &Path) {
        let imported = match load_export(path) {
            Ok(data) => data,
            Err(e) => {
                tracing::error!("Could not import {}: {}", path.display(), e);
                let message = match e.root() {
                    ConfigError::Incompatible(msg) => msg.clone(),
                    _ => "Configuration data could not be read.".to_string(),
                };
                self.messages.push(IMPORT_TITLE, message);
                return;
            }
        };
        match self.session.import_question(&imported) {
            Err(e) => {
                let message = match e.root() {
                    ConfigError::Incompatible(msg) => msg.clone(),
                    other => other.to_string(),
                };
                self.messages.push(IMPORT_TITLE, message);
            }
            Ok(Some(q)) => {
                self.flow = Flow::AskImport(Box::new(imported));
                self.ask(q);
            }
            Ok(None) => self.finish_import(&imported),
        }
    }

    fn finish_import(&mut self, imported: &ExportedConfig) {
        let report = self.session.apply_import(imported);
        if report.failed > 0 {
            self.messages.push(
                IMPORT_TITLE,
                format!("{} imported values were not valid for this device", report.failed),
            );
        }
        self.refresh();
    }

    fn export(&mut self, path: &Path) {
        match self.session.export_to(path) {
            Ok(_) => tracing::info!("Exported configuration to {}", path.display()),
            Err(e) => {
                tracing::error!("Could not export to {}: {}", path.display(), e);
                let mut message = "Configuration data could not be exported.".to_string();
                if self.session.options().show_advanced {
                    message.push_str(&format!("\n\n{}", e));
                }
                self.messages.push(EXPORT_TITLE, message);
            }
        }
    }
}

// ==================== Field rendering ====================

struct FieldRenderer<'a> {
    session: &'a ConfigSession,
    view: &'a ConfigView,
    buffers: &'a mut HashMap<NodeId, String>,
    show_advanced: bool,
    use_utc: bool,
    edits: Vec<FieldEdit>,
}

impl<'a> FieldRenderer<'a> {
    fn item(&mut self, ui: &mut Ui, node: NodeId) {
        let item = self.session.tree().item(node);
        if item.advanced && !self.show_advanced {
            return;
        }
        match item.kind {
            ItemKind::Group => self.group(ui, node),
            ItemKind::Field(kind) => self.field(ui, node, kind),
            ItemKind::Tab(_) => {}
        }
    }

    fn group(&mut self, ui: &mut Ui, node: NodeId) {
        let session = self.session;
        let item = session.tree().item(node);
        ui.add_enabled_ui(item.is_enabled(), |ui| {
            ui.group(|ui| {
                let header = match item.checkbox() {
                    Some(mut checked) => {
                        let r = ui.checkbox(&mut checked, RichText::new(&item.label).strong());
                        if r.changed() {
                            self.edits.push(FieldEdit::Checked(node, checked));
                        }
                        r
                    }
                    None => ui.strong(&item.label),
                };
                if let Some(tip) = &item.tooltip {
                    header.on_hover_text(tip);
                }
                ui.add_enabled_ui(item.checkbox() != Some(false), |ui| {
                    for &child in &item.children {
                        self.item(ui, child);
                    }
                });
            });
        });
    }

    fn field(&mut self, ui: &mut Ui, node: NodeId, kind: FieldKind) {
        let session = self.session;
        let item = session.tree().item(node);
        let response = ui
            .add_enabled_ui(item.is_enabled(), |ui| {
                ui.horizontal(|ui| {
                    let value_open = match item.checkbox() {
                        Some(mut checked) => {
                            if ui.checkbox(&mut checked, &item.label).changed() {
                                self.edits.push(FieldEdit::Checked(node, checked));
                            }
                            checked
                        }
                        None => {
                            if kind != FieldKind::Boolean || !item.transform.contributes() {
                                ui.label(&item.label);
                            }
                            true
                        }
                    };
                    if !item.transform.contributes() {
                        return;
                    }
                    ui.add_enabled_ui(value_open, |ui| self.value_widget(ui, node, kind));
                    if let Some(units) = &item.units {
                        ui.label(units);
                    }
                })
                .response
            })
            .inner;

        let response = match &item.tooltip {
            Some(tip) => response.on_hover_text(tip),
            None => response,
        };
        response.context_menu(|ui| {
            if ui.button("Reset to default").clicked() {
                self.edits.push(FieldEdit::Default(node));
                ui.close();
            }
        });
    }

    /// The display value, falling back to the stored or default raw value
    /// for fields that are unchecked or disabled
    fn shown(&self, node: NodeId) -> Option<ConfigValue> {
        let session = self.session;
        session.display_value(node, self.view).or_else(|| {
            let item = session.tree().item(node);
            let raw = item.raw().or(item.default.as_ref())?;
            item.transform
                .to_display(raw, session.engine(), self.view)
                .ok()
                .flatten()
        })
    }

    fn value_widget(&mut self, ui: &mut Ui, node: NodeId, kind: FieldKind) {
        let item = self.session.tree().item(node);
        let shown = self.shown(node);
        match kind {
            FieldKind::Boolean => {
                let mut value = shown.as_ref().is_some_and(ConfigValue::is_truthy);
                let label = if item.checkbox().is_some() { "" } else { item.label.as_str() };
                if ui.checkbox(&mut value, label).changed() {
                    self.edits
                        .push(FieldEdit::Display(node, ConfigValue::Bool(value)));
                }
            }
            FieldKind::Enum => {
                let current = shown.as_ref().and_then(ConfigValue::as_i64);
                let text = item
                    .options
                    .iter()
                    .find(|o| Some(o.value) == current)
                    .map(|o| o.label.clone())
                    .or_else(|| current.map(|c| c.to_string()))
                    .unwrap_or_default();
                egui::ComboBox::from_id_salt(("enum_field", node))
                    .selected_text(text)
                    .show_ui(ui, |ui| {
                        for option in &item.options {
                            let selected = Some(option.value) == current;
                            if ui.selectable_label(selected, &option.label).clicked() && !selected {
                                self.edits
                                    .push(FieldEdit::Display(node, ConfigValue::Int(option.value)));
                            }
                        }
                    });
            }
            _ => {
                let original = format_value(kind, shown.as_ref(), self.use_utc);
                let buffer = self
                    .buffers
                    .entry(node)
                    .or_insert_with(|| original.clone());
                let width = match kind {
                    FieldKind::Text => 220.0,
                    FieldKind::DateTime => 160.0,
                    _ => 110.0,
                };
                let response = ui.add(egui::TextEdit::singleline(buffer).desired_width(width));
                if let Some(hint) = range_hint(item.min, item.max) {
                    response.clone().on_hover_text(hint);
                }
                if response.lost_focus() {
                    let text = buffer.trim().to_string();
                    self.buffers.remove(&node);
                    if text == original {
                        return;
                    }
                    match parse_value(kind, &text, self.use_utc, item.min, item.max) {
                        Ok(value) => self.edits.push(FieldEdit::Display(node, value)),
                        Err(message) => self.edits.push(FieldEdit::Invalid {
                            label: item.label.clone(),
                            message,
                        }),
                    }
                }
            }
        }
    }
}

fn range_hint(min: Option<f64>, max: Option<f64>) -> Option<String> {
    match (min, max) {
        (Some(lo), Some(hi)) => Some(format!("{} to {}", lo, hi)),
        (Some(lo), None) => Some(format!("At least {}", lo)),
        (None, Some(hi)) => Some(format!("At most {}", hi)),
        (None, None) => None,
    }
}

// ==================== Info tabs ====================

fn render_info(ui: &mut Ui, tab: &InfoTab) -> Vec<InfoEdit> {
    let mut edits = Vec::new();
    let caps = tab.capabilities();

    egui::Grid::new(("info_rows", tab.label()))
        .num_columns(2)
        .striped(true)
        .spacing([16.0, 4.0])
        .show(ui, |ui| {
            for (key, value) in tab.rows() {
                ui.strong(key);
                ui.monospace(value);
                ui.end_row();
            }
        });

    if tab.kind() == TabKind::DeviceInfo {
        return edits;
    }

    ui.add_space(8.0);
    if tab.entries().is_empty() {
        ui.label(RichText::new("No calibration data.").color(Color32::GRAY));
        if caps.editable && ui.button("Create from Factory Calibration").clicked() {
            edits.push(InfoEdit::CreateFromFactory);
        }
        return edits;
    }

    egui::Grid::new(("calibration_entries", tab.label()))
        .num_columns(4)
        .striped(true)
        .spacing([12.0, 4.0])
        .show(ui, |ui| {
            for header in ["ID", "Channel", "Coefficients", "References"] {
                ui.strong(header);
            }
            ui.end_row();

            for (entry_index, entry) in tab.entries().iter().enumerate() {
                ui.label(entry.id.to_string());
                ui.label(&entry.channel);
                ui.horizontal(|ui| {
                    for (index, &coefficient) in entry.coefficients.iter().enumerate() {
                        if caps.editable {
                            let mut value = coefficient;
                            if ui
                                .add(egui::DragValue::new(&mut value).speed(0.0001).max_decimals(6))
                                .changed()
                            {
                                edits.push(InfoEdit::Coefficient {
                                    entry: entry_index,
                                    index,
                                    value,
                                });
                            }
                        } else {
                            ui.monospace(format!("{:.6}", coefficient));
                        }
                    }
                    if caps.compare_factory && tab.differs_from_factory(entry_index) {
                        ui.colored_label(Color32::from_rgb(220, 180, 40), "modified");
                        if ui.small_button("Revert").clicked() {
                            edits.push(InfoEdit::Revert(entry_index));
                        }
                    }
                });
                ui.label(
                    entry
                        .references
                        .iter()
                        .map(|r| format!("{:.4}", r))
                        .collect::<Vec<_>>()
                        .join(", "),
                );
                ui.end_row();
            }
        });
    edits
}

// ==================== Value text ====================

/// Text shown in an entry box for a display value
pub fn format_value(kind: FieldKind, value: Option<&ConfigValue>, use_utc: bool) -> String {
    let Some(value) = value else {
        return String::new();
    };
    match kind {
        FieldKind::DateTime => {
            let Some(secs) = value.as_i64() else {
                return value.to_string();
            };
            match DateTime::<Utc>::from_timestamp(secs, 0) {
                Some(t) if use_utc => t.format(DATETIME_FORMAT).to_string(),
                Some(t) => t.with_timezone(&Local).format(DATETIME_FORMAT).to_string(),
                None => value.to_string(),
            }
        }
        FieldKind::Time => match value.as_i64() {
            Some(secs) => {
                let secs = secs.rem_euclid(86_400);
                format!("{:02}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60)
            }
            None => value.to_string(),
        },
        _ => value.to_string(),
    }
}

/// Parse an entry box into a display value, checking the field's range
pub fn parse_value(
    kind: FieldKind,
    text: &str,
    use_utc: bool,
    min: Option<f64>,
    max: Option<f64>,
) -> std::result::Result<ConfigValue, String> {
    let text = text.trim();
    let value = match kind {
        FieldKind::Text => return Ok(ConfigValue::Text(text.to_string())),
        _ if text.is_empty() => return Err("a value is required".to_string()),
        FieldKind::DateTime => {
            let naive = NaiveDateTime::parse_from_str(text, DATETIME_FORMAT)
                .map_err(|_| format!("'{}' is not a date and time (YYYY-MM-DD HH:MM:SS)", text))?;
            let secs = if use_utc {
                naive.and_utc().timestamp()
            } else {
                Local
                    .from_local_datetime(&naive)
                    .single()
                    .ok_or_else(|| format!("'{}' is not a valid local time", text))?
                    .timestamp()
            };
            ConfigValue::Int(secs)
        }
        FieldKind::Time => {
            let time = NaiveTime::parse_from_str(text, TIME_FORMAT)
                .map_err(|_| format!("'{}' is not a time (HH:MM:SS)", text))?;
            ConfigValue::Int(i64::from(time.num_seconds_from_midnight()))
        }
        FieldKind::Float => text
            .parse::<f64>()
            .map(ConfigValue::Float)
            .map_err(|_| format!("'{}' is not a number", text))?,
        _ => match text.parse::<i64>() {
            Ok(i) => ConfigValue::Int(i),
            Err(_) => text
                .parse::<f64>()
                .map(ConfigValue::Float)
                .map_err(|_| format!("'{}' is not a number", text))?,
        },
    };

    if kind == FieldKind::Unsigned && value.as_f64().is_some_and(|v| v < 0.0) {
        return Err("the value cannot be negative".to_string());
    }
    if let Some(v) = value.as_f64() {
        if let Some(lo) = min.filter(|lo| v < *lo) {
            return Err(format!("the value must be at least {}", lo));
        }
        if let Some(hi) = max.filter(|hi| v > *hi) {
            return Err(format!("the value must be at most {}", hi));
        }
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock_device::MockFailure;
    use crate::device::{MockRecorder, SharedRecorder};
    use crate::engine::DialogOptions;
    use crate::types::ID_RECORDER_NAME;
    use std::sync::Arc;

    fn view_for(recorder: MockRecorder) -> (ConfigDialogView, Arc<MockRecorder>) {
        let mock = Arc::new(recorder);
        let shared: SharedRecorder = mock.clone();
        let session = ConfigSession::open(shared, DialogOptions::default()).unwrap();
        (ConfigDialogView::new(session), mock)
    }

    fn rename(view: &mut ConfigDialogView, name: &str) {
        let node = view.session.tree().node(ID_RECORDER_NAME).unwrap();
        view.apply_edits(vec![FieldEdit::Display(node, ConfigValue::Text(name.into()))]);
    }

    #[test]
    fn test_format_and_parse_times() {
        let value = ConfigValue::Int(1_700_000_000);
        let text = format_value(FieldKind::DateTime, Some(&value), true);
        assert_eq!(text, "2023-11-14 22:13:20");
        assert_eq!(
            parse_value(FieldKind::DateTime, &text, true, None, None),
            Ok(value)
        );

        let noon = ConfigValue::Int(12 * 3600 + 30);
        assert_eq!(format_value(FieldKind::Time, Some(&noon), true), "12:00:30");
        assert_eq!(
            parse_value(FieldKind::Time, "12:00:30", true, None, None),
            Ok(noon)
        );
        assert!(parse_value(FieldKind::Time, "noon", true, None, None).is_err());
    }

    #[test]
    fn test_parse_numbers_checks_range() {
        assert_eq!(
            parse_value(FieldKind::Integer, "42", true, Some(0.0), Some(100.0)),
            Ok(ConfigValue::Int(42))
        );
        assert_eq!(
            parse_value(FieldKind::Integer, "2.5", true, None, None),
            Ok(ConfigValue::Float(2.5))
        );
        assert!(parse_value(FieldKind::Integer, "101", true, Some(0.0), Some(100.0)).is_err());
        assert!(parse_value(FieldKind::Unsigned, "-1", true, None, None).is_err());
        assert!(parse_value(FieldKind::Float, "", true, None, None).is_err());
        assert_eq!(
            parse_value(FieldKind::Text, "  Bridge 4 ", true, None, None),
            Ok(ConfigValue::Text("Bridge 4".into()))
        );
    }

    #[test]
    fn test_ok_asks_about_upgrade_then_saves() {
        let (mut view, mock) =
            view_for(MockRecorder::new("S3-E25D40", "1001").with_version(Some(1), vec![1, 2]));
        rename(&mut view, "Pier");

        view.on_ok();
        assert!(view.question_open);
        assert!(matches!(view.flow, Flow::AskVersion { read: 1, max: 2, .. }));

        view.answer(Answer::Yes);
        assert_eq!(mock.last_write().map(|(_, v)| v), Some(2));
        match view.poll_close() {
            ViewOutcome::Closed(Some(result)) => {
                assert_eq!(result.values.get(ID_RECORDER_NAME), Some(&ConfigValue::Text("Pier".into())));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_cancel_without_changes_closes() {
        let (mut view, mock) = view_for(MockRecorder::new("S3-E25D40", "1002"));
        view.on_cancel();
        assert_eq!(view.poll_close(), ViewOutcome::Closed(None));
        assert!(mock.writes().is_empty());
    }

    #[test]
    fn test_cancel_with_failed_save_stays_open() {
        let (mut view, _mock) = view_for(
            MockRecorder::new("S3-E25D40", "1003").failing_apply(MockFailure::Removed),
        );
        rename(&mut view, "Dock");

        view.on_cancel();
        assert!(matches!(view.flow, Flow::AskSaveBeforeExit));
        view.answer(Answer::Yes);
        assert!(matches!(view.flow, Flow::Editing));
        assert!(!view.messages.is_empty());
        assert_eq!(view.poll_close(), ViewOutcome::Open);

        view.messages = MessageState::default();
        view.on_cancel();
        view.answer(Answer::No);
        assert_eq!(view.poll_close(), ViewOutcome::Closed(None));
    }

    #[test]
    fn test_ok_with_failed_save_closes_after_message() {
        let (mut view, _mock) = view_for(
            MockRecorder::new("S3-E25D40", "1004").failing_apply(MockFailure::Removed),
        );
        view.on_ok();
        assert_eq!(view.poll_close(), ViewOutcome::Open);
        view.messages = MessageState::default();
        assert!(matches!(view.poll_close(), ViewOutcome::Closed(Some(_))));
    }
}
