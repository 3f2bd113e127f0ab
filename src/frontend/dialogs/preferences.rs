//! Preferences dialog
//!
//! Appearance, device list columns and the checkboxes a configuration
//! dialog starts with. Stored in the app state.

use egui::Ui;

use crate::config::{AppState, LastOptions, UiPreferences};
use crate::frontend::dialogs::{Dialog, DialogAction, DialogState, DialogWindowConfig};

/// State for the preferences dialog
#[derive(Debug, Clone)]
pub struct PreferencesState {
    pub dark_mode: bool,
    pub font_scale: f32,
    pub show_advanced_columns: bool,
    pub dialog_defaults: LastOptions,
}

impl Default for PreferencesState {
    fn default() -> Self {
        Self::from_state(&AppState::default())
    }
}

impl PreferencesState {
    pub fn from_state(state: &AppState) -> Self {
        let prefs = &state.ui_preferences;
        Self {
            dark_mode: prefs.dark_mode,
            font_scale: prefs.font_scale,
            show_advanced_columns: prefs.show_advanced_columns,
            dialog_defaults: state.last_options,
        }
    }

    /// Write the edited values back
    pub fn apply_to(&self, state: &mut AppState) {
        let prefs: &mut UiPreferences = &mut state.ui_preferences;
        prefs.dark_mode = self.dark_mode;
        prefs.font_scale = self.font_scale.clamp(0.5, 2.0);
        prefs.show_advanced_columns = self.show_advanced_columns;
        state.last_options = self.dialog_defaults;
    }
}

impl DialogState for PreferencesState {}

/// Actions produced by the preferences dialog
#[derive(Debug, Clone)]
pub enum PreferencesAction {
    /// Apply preferences
    Apply(PreferencesState),
}

/// Context for rendering
pub struct PreferencesContext;

/// The preferences dialog
pub struct PreferencesDialog;

impl Dialog for PreferencesDialog {
    type State = PreferencesState;
    type Action = PreferencesAction;
    type Context<'a> = PreferencesContext;

    fn title(_state: &Self::State) -> &'static str {
        "Preferences"
    }

    fn window_config() -> DialogWindowConfig {
        DialogWindowConfig {
            default_width: 360.0,
            ..Default::default()
        }
    }

    fn render(
        state: &mut Self::State,
        _ctx: Self::Context<'_>,
        ui: &mut Ui,
    ) -> DialogAction<Self::Action> {
        ui.heading("Appearance");
        ui.add_space(4.0);

        egui::Grid::new("prefs_appearance_grid")
            .num_columns(2)
            .spacing([10.0, 8.0])
            .show(ui, |ui| {
                ui.label("Dark mode:");
                ui.checkbox(&mut state.dark_mode, "");
                ui.end_row();

                ui.label("Font scale:");
                ui.add(egui::Slider::new(&mut state.font_scale, 0.5..=2.0).step_by(0.1));
                ui.end_row();
            });

        ui.add_space(8.0);
        ui.heading("Device List");
        ui.add_space(4.0);
        ui.checkbox(
            &mut state.show_advanced_columns,
            "Show hardware and firmware revisions",
        );

        ui.add_space(8.0);
        ui.heading("New Dialogs");
        ui.add_space(4.0);
        ui.checkbox(
            &mut state.dialog_defaults.set_time,
            "Set the device clock when saving",
        );
        ui.checkbox(&mut state.dialog_defaults.use_utc, "Show times in UTC");

        ui.add_space(8.0);
        ui.separator();
        ui.horizontal(|ui| {
            if ui.button("Defaults").clicked() {
                *state = PreferencesState::default();
            }
            if ui.button("Apply").clicked() {
                return DialogAction::CloseWithAction(PreferencesAction::Apply(state.clone()));
            }
            if ui.button("Cancel").clicked() {
                return DialogAction::Close;
            }
            DialogAction::None
        })
        .inner
    }
}
