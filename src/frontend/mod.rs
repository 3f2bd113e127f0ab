//! Frontend module for egui UI
//!
//! The main window lists the recorders found by the background scanner.
//! Scan results arrive over a crossbeam channel and are drained each frame;
//! device commands (start/stop recording, set all clocks) run on their own
//! threads so the UI never blocks on a device.
//!
//! # Main Types
//!
//! - [`ConfigApp`] - Main application state implementing [`eframe::App`]
//! - [`ConfigDialogView`] - One open configuration dialog
//! - [`DeviceListState`] - Rows and selection of the device list
//!
//! # Submodules
//!
//! - [`dialogs`] - Modal dialogs (questions, messages, preferences)
//! - `device_list` - The device table and its buttons
//! - `config_view` - Tabs and fields of the configuration dialog
//! - `widgets` - Status indicators and warning badges

pub mod config_view;
pub mod device_list;
pub mod dialogs;
pub mod state;
mod status_bar;
pub mod widgets;

pub use config_view::{ConfigDialogView, ViewOutcome};
pub use state::{AppAction, DeviceListState, DeviceRow};
pub use widgets::*;

use crossbeam_channel::Receiver;
use dialogs::{
    show_dialog, show_dialog_with_title, MessageContext, MessageDialog, MessageState,
    PreferencesAction, PreferencesContext, PreferencesDialog, PreferencesState,
};
use device_list::{render_device_list, DeviceListContext};
use status_bar::{render_status_bar, StatusBarContext};

use crate::config::settings::AppSettings;
use crate::config::{AppState, UiPreferences};
use crate::device::{
    fan_out_with_deadline, CommandOutcome, DeviceCommandThread, DeviceInfo, DirectoryRecorder,
    FanOutReport, ScanHandle, ScanMessage, SharedRecorder,
};
use crate::engine::{ConfigSession, DialogResult};
use crate::error::ConfigError;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub const APP_TITLE: &str = "enDAQ Configuration";
const CONFIGURE_TITLE: &str = "Configure Device";
const CLOCK_TITLE: &str = "Set Recorder Clocks";

/// How often the list is redrawn while idle, to pick up scan results
const REPAINT_INTERVAL: Duration = Duration::from_millis(250);

/// A start/stop recording command in flight
struct PendingCommand {
    what: &'static str,
    name: String,
    thread: DeviceCommandThread,
}

/// Main application state
pub struct ConfigApp {
    // === Communication ===
    /// `None` when configuring a single device given on the command line
    scanner: Option<ScanHandle>,
    scan_paused: bool,
    clock_job: Option<Receiver<FanOutReport>>,
    command: Option<PendingCommand>,

    // === Shared State ===
    app_state: AppState,
    settings: AppSettings,
    advanced: bool,
    devices: DeviceListState,
    last_error: Option<String>,

    // === Dialogs ===
    config_view: Option<ConfigDialogView>,
    messages: MessageState,
    preferences_open: bool,
    preferences: PreferencesState,

    /// Close the window once the configuration dialog is done
    exit_after_dialog: bool,
    exit_requested: bool,
}

impl ConfigApp {
    /// The device list, fed by a running scanner
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        scanner: ScanHandle,
        app_state: AppState,
        settings: AppSettings,
        advanced: bool,
    ) -> Self {
        let mut app = Self::base(app_state, settings, advanced);
        app.scanner = Some(scanner);
        apply_preferences(&cc.egui_ctx, &app.app_state.ui_preferences);
        app
    }

    /// Configure one device, then exit
    pub fn for_device(
        cc: &eframe::CreationContext<'_>,
        recorder: SharedRecorder,
        app_state: AppState,
        settings: AppSettings,
        advanced: bool,
    ) -> Self {
        let mut app = Self::base(app_state, settings, advanced);
        app.exit_after_dialog = true;
        apply_preferences(&cc.egui_ctx, &app.app_state.ui_preferences);
        app.open_config(recorder);
        if app.config_view.is_none() {
            app.exit_requested = true;
        }
        app
    }

    fn base(mut app_state: AppState, settings: AppSettings, advanced: bool) -> Self {
        if app_state == AppState::default() {
            app_state.remember_options(settings.set_clock_default, settings.use_utc_default);
        }
        Self {
            scanner: None,
            scan_paused: false,
            clock_job: None,
            command: None,
            app_state,
            settings,
            advanced,
            devices: DeviceListState::default(),
            last_error: None,
            config_view: None,
            messages: MessageState::default(),
            preferences_open: false,
            preferences: PreferencesState::default(),
            exit_after_dialog: false,
            exit_requested: false,
        }
    }

    // ==================== Background work ====================

    fn process_scan_messages(&mut self) -> bool {
        let Some(scanner) = &self.scanner else {
            return false;
        };
        let messages = scanner.drain();
        let had_messages = !messages.is_empty();

        for msg in messages {
            match msg {
                ScanMessage::DeviceList(update) => {
                    self.devices.apply_update(update, chrono::Utc::now());
                    self.last_error = None;
                }
                ScanMessage::ScanFailed(err) => {
                    tracing::error!("Device scan failed: {}", err);
                    self.last_error = Some(err);
                }
                ScanMessage::Stopped => {
                    tracing::info!("Device scanner stopped");
                }
            }
        }
        had_messages
    }

    fn poll_jobs(&mut self) {
        if let Some(rx) = &self.clock_job {
            if let Ok(report) = rx.try_recv() {
                self.clock_job = None;
                self.set_paused(false);
                tracing::info!(
                    "Set clocks: {} ok, {} failed, {} timed out",
                    report.succeeded.len(),
                    report.failed.len(),
                    report.timed_out.len()
                );
                if let Some(summary) = report.clock_summary() {
                    self.messages.push(CLOCK_TITLE, summary);
                }
            }
        }

        if self.command.as_ref().is_some_and(|c| c.thread.is_finished()) {
            if let Some(cmd) = self.command.take() {
                if let CommandOutcome::Failed(err) = cmd.thread.join() {
                    self.messages.push(
                        CONFIGURE_TITLE,
                        format!("Could not {} on {}.\n\n{}", cmd.what, cmd.name, err),
                    );
                }
                if let Some(scanner) = &self.scanner {
                    scanner.rescan();
                }
            }
        }
    }

    fn busy(&self) -> Option<&'static str> {
        if self.clock_job.is_some() {
            Some("Setting clocks...")
        } else if let Some(cmd) = &self.command {
            Some(cmd.what)
        } else {
            None
        }
    }

    fn set_paused(&mut self, paused: bool) {
        if let Some(scanner) = &self.scanner {
            if paused {
                scanner.pause();
            } else {
                scanner.resume();
            }
        }
        self.scan_paused = paused;
    }

    // ==================== Actions ====================

    fn handle_action(&mut self, action: AppAction) {
        match action {
            AppAction::Configure(key) => {
                let Some(row) = self.devices.find(&key) else {
                    return;
                };
                let recorder = Arc::clone(&row.entry.recorder);
                self.open_config(recorder);
            }
            AppAction::StartRecording(key) => self.run_command(&key, "start recording", |r| {
                r.start_recording()
            }),
            AppAction::StopRecording(key) => {
                self.run_command(&key, "stop recording", |r| r.stop_recording())
            }
            AppAction::SetAllClocks => self.set_all_clocks(),
            AppAction::Rescan => {
                if let Some(scanner) = &self.scanner {
                    scanner.rescan();
                }
            }
            AppAction::OpenPreferences => {
                self.preferences = PreferencesState::from_state(&self.app_state);
                self.preferences_open = true;
            }
            AppAction::SetAdvanced(advanced) => self.advanced = advanced,
            AppAction::Quit => self.exit_requested = true,
        }
    }

    fn open_config(&mut self, recorder: SharedRecorder) {
        if self.config_view.is_some() {
            return;
        }
        if let Some(scanner) = &self.scanner {
            scanner.set_updating(true);
        }
        let options = self.app_state.dialog_options(self.advanced);
        match ConfigSession::open(Arc::clone(&recorder), options) {
            Ok(session) => self.config_view = Some(ConfigDialogView::new(session)),
            Err(e) => {
                tracing::error!("Could not open configuration dialog: {}", e);
                if let Some(scanner) = &self.scanner {
                    scanner.set_updating(false);
                }
                self.messages
                    .push(CONFIGURE_TITLE, open_error_message(&e, self.advanced));
            }
        }
    }

    fn open_recent(&mut self, path: PathBuf) {
        match DirectoryRecorder::open(&path) {
            Ok(recorder) => self.open_config(Arc::new(recorder)),
            Err(e) => {
                tracing::warn!("Recent device {} unavailable: {}", path.display(), e);
                self.app_state.remove_recent_device(&path);
                self.messages.push(
                    CONFIGURE_TITLE,
                    format!("No recorder was found at {}", path.display()),
                );
            }
        }
    }

    fn dialog_closed(&mut self, options: (bool, bool), result: Option<DialogResult>, info: DeviceInfo) {
        self.app_state.remember_options(options.0, options.1);
        if let Some(scanner) = &self.scanner {
            scanner.set_updating(false);
            scanner.rescan();
        }

        if let Some(result) = result {
            if let Some(path) = &info.path {
                self.app_state
                    .add_recent_device(path, &info.name, &info.serial);
            }
            if let Some(msg) = result.post_config_message {
                self.messages.push("Configuration Complete", msg);
            }
        }
        if let Err(e) = self.app_state.save() {
            tracing::warn!("Failed to save app state: {}", e);
        }
        if self.exit_after_dialog {
            self.exit_requested = true;
        }
    }

    fn run_command<F>(&mut self, key: &str, what: &'static str, op: F)
    where
        F: FnOnce(&dyn crate::device::Recorder) -> crate::error::DeviceResult<()> + Send + 'static,
    {
        if self.command.is_some() {
            return;
        }
        let Some(row) = self.devices.find(key) else {
            return;
        };
        let name = row.entry.info.display_name();
        tracing::info!("{} on {}", what, name);
        let thread = DeviceCommandThread::spawn(Arc::clone(&row.entry.recorder), op);
        self.command = Some(PendingCommand { what, name, thread });
    }

    fn set_all_clocks(&mut self) {
        if self.clock_job.is_some() {
            return;
        }
        let devices: Vec<SharedRecorder> = self
            .devices
            .rows()
            .iter()
            .filter(|r| r.entry.present && r.entry.info.has_command_interface)
            .map(|r| Arc::clone(&r.entry.recorder))
            .collect();
        if devices.is_empty() {
            return;
        }

        let deadline = self.settings.clock_deadline();
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.set_paused(true);
        let spawned = std::thread::Builder::new()
            .name("set clocks".to_string())
            .spawn(move || {
                let report = fan_out_with_deadline(&devices, |r| r.set_time(), deadline);
                let _ = tx.send(report);
            });
        match spawned {
            Ok(_) => self.clock_job = Some(rx),
            Err(e) => {
                tracing::error!("Could not start clock thread: {}", e);
                self.set_paused(false);
                self.messages
                    .push(CLOCK_TITLE, "The recorder clocks could not be set");
            }
        }
    }

    // ==================== Rendering ====================

    fn render_menu_bar(&mut self, ctx: &egui::Context) -> Vec<AppAction> {
        let mut actions = Vec::new();
        let mut recent: Option<PathBuf> = None;

        egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
            egui::MenuBar::new().ui(ui, |ui| {
                ui.menu_button("File", |ui| {
                    let selected = self.devices.selected().filter(|r| r.entry.present);
                    if ui
                        .add_enabled(selected.is_some(), egui::Button::new("Configure..."))
                        .clicked()
                    {
                        if let Some(row) = selected {
                            actions.push(AppAction::Configure(row.key()));
                        }
                        ui.close();
                    }
                    ui.menu_button("Recent Devices", |ui| {
                        if self.app_state.recent_devices.is_empty() {
                            ui.label("(none)");
                        }
                        for device in &self.app_state.recent_devices {
                            if ui.button(device.label()).clicked() {
                                recent = Some(device.path.clone());
                                ui.close();
                            }
                        }
                    });
                    ui.separator();
                    if ui.button("Quit").clicked() {
                        actions.push(AppAction::Quit);
                        ui.close();
                    }
                });

                ui.menu_button("Devices", |ui| {
                    if ui.button("Rescan").clicked() {
                        actions.push(AppAction::Rescan);
                        ui.close();
                    }
                    if ui.button("Set All Clocks").clicked() {
                        actions.push(AppAction::SetAllClocks);
                        ui.close();
                    }
                });

                ui.menu_button("View", |ui| {
                    let mut advanced = self.advanced;
                    if ui.checkbox(&mut advanced, "Advanced Mode").changed() {
                        actions.push(AppAction::SetAdvanced(advanced));
                    }
                    if ui.button("Preferences...").clicked() {
                        actions.push(AppAction::OpenPreferences);
                        ui.close();
                    }
                });
            });
        });

        if let Some(path) = recent {
            self.open_recent(path);
        }
        actions
    }

    fn render_dialogs(&mut self, ctx: &egui::Context) {
        if let Some(view) = &mut self.config_view {
            if let ViewOutcome::Closed(result) = view.show(ctx) {
                let options = view.session().options();
                let info = view.session().recorder().info();
                self.config_view = None;
                self.dialog_closed((options.set_time, options.use_utc), result, info);
            }
        }

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
        }

        if let Some(PreferencesAction::Apply(prefs)) = show_dialog::<PreferencesDialog>(
            ctx,
            &mut self.preferences_open,
            &mut self.preferences,
            PreferencesContext,
        ) {
            prefs.apply_to(&mut self.app_state);
            apply_preferences(ctx, &self.app_state.ui_preferences);
        }
    }
}

impl eframe::App for ConfigApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let had_messages = self.process_scan_messages();
        self.poll_jobs();

        if had_messages || self.busy().is_some() {
            ctx.request_repaint();
        } else {
            ctx.request_repaint_after(REPAINT_INTERVAL);
        }

        if self.exit_requested && self.messages.is_empty() {
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }

        let mut actions = Vec::new();
        if !self.exit_after_dialog {
            actions.extend(self.render_menu_bar(ctx));

            egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
                let status = StatusBarContext {
                    scanning: self.scanner.as_ref().is_some_and(ScanHandle::is_running),
                    paused: self.scan_paused,
                    devices: self.devices.present_count(),
                    scans: self.devices.scan_count(),
                    busy: self.busy(),
                    last_error: self.last_error.as_deref(),
                };
                render_status_bar(ui, &status);
            });

            let list_ctx = DeviceListContext {
                show_advanced_columns: self.advanced
                    || self.app_state.ui_preferences.show_advanced_columns,
                busy: self.busy().is_some() || self.config_view.is_some(),
            };
            egui::CentralPanel::default().show(ctx, |ui| {
                actions.extend(render_device_list(ui, &mut self.devices, &list_ctx));
            });
        } else {
            egui::CentralPanel::default().show(ctx, |_ui| {});
        }

        for action in actions {
            self.handle_action(action);
        }

        self.render_dialogs(ctx);
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        if let Some(view) = &mut self.config_view {
            view.shutdown();
        }
        if let Some(scanner) = &self.scanner {
            scanner.stop();
        }
        if let Err(e) = self.app_state.save() {
            tracing::warn!("Failed to save app state: {}", e);
        }
    }
}

/// Visuals and zoom from the user's preferences
fn apply_preferences(ctx: &egui::Context, prefs: &UiPreferences) {
    if prefs.dark_mode {
        ctx.set_visuals(egui::Visuals::dark());
    } else {
        ctx.set_visuals(egui::Visuals::light());
    }
    ctx.set_zoom_factor(prefs.font_scale);
}

/// Text shown when a dialog cannot be opened
fn open_error_message(err: &ConfigError, advanced: bool) -> String {
    let mut msg = match err {
        ConfigError::WithContext { context, .. } => format!("{}.", context),
        _ => "The configuration dialog could not be opened.".to_string(),
    };
    if let Some(dev) = err.device_error() {
        msg = dev.user_message(advanced);
    } else if advanced {
        msg.push_str(&format!("\n\n{}", err.root()));
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeviceError;

    #[test]
    fn test_open_error_message_uses_context() {
        let err = ConfigError::Schema("no tabs".into())
            .with_context("The device appears to have corrupted configuration UI data");
        assert_eq!(
            open_error_message(&err, false),
            "The device appears to have corrupted configuration UI data."
        );
        assert!(open_error_message(&err, true).ends_with("no tabs"));

        let removed = ConfigError::Device(DeviceError::Removed).with_context("Could not read");
        assert!(open_error_message(&removed, false).contains("removed"));
    }
}
