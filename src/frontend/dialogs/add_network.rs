//! Add a Wi-Fi network by hand

use super::{Dialog, DialogAction, DialogState, DialogWindowConfig};
use egui::Ui;

#[derive(Debug, Default, Clone)]
pub struct AddNetworkState {
    pub ssid: String,
    pub password: String,
    /// Open network; no password is stored
    pub open: bool,
}

impl DialogState for AddNetworkState {
    fn is_valid(&self) -> bool {
        !self.ssid.trim().is_empty() && (self.open || !self.password.is_empty())
    }
}

impl AddNetworkState {
    /// Pre-fill the SSID, e.g. from a scanned access point
    pub fn for_ssid(ssid: &str, open: bool) -> Self {
        Self {
            ssid: ssid.to_string(),
            open,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddNetworkAction {
    Add {
        ssid: String,
        password: Option<String>,
    },
}

pub struct AddNetworkContext;

pub struct AddNetworkDialog;

impl Dialog for AddNetworkDialog {
    type State = AddNetworkState;
    type Action = AddNetworkAction;
    type Context<'a> = AddNetworkContext;

    fn title(_state: &Self::State) -> &'static str {
        "Add Wi-Fi Network"
    }

    fn window_config() -> DialogWindowConfig {
        DialogWindowConfig::centered_modal(320.0)
    }

    fn render(
        state: &mut Self::State,
        _ctx: Self::Context<'_>,
        ui: &mut Ui,
    ) -> DialogAction<Self::Action> {
        egui::Grid::new("add_network_grid")
            .num_columns(2)
            .spacing([10.0, 8.0])
            .show(ui, |ui| {
                ui.label("Network name:");
                ui.text_edit_singleline(&mut state.ssid);
                ui.end_row();

                ui.label("Open network:");
                ui.checkbox(&mut state.open, "");
                ui.end_row();

                ui.label("Password:");
                ui.add_enabled(
                    !state.open,
                    egui::TextEdit::singleline(&mut state.password).password(true),
                );
                ui.end_row();
            });

        ui.separator();
        let valid = state.is_valid();
        ui.horizontal(|ui| {
            if ui.add_enabled(valid, egui::Button::new("Add")).clicked() {
                let password = (!state.open).then(|| state.password.clone());
                return DialogAction::CloseWithAction(AddNetworkAction::Add {
                    ssid: state.ssid.trim().to_string(),
                    password,
                });
            }
            if ui.button("Cancel").clicked() {
                return DialogAction::Close;
            }
            DialogAction::None
        })
        .inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation() {
        assert!(!AddNetworkState::default().is_valid());
        assert!(AddNetworkState::for_ssid("Guest", true).is_valid());
        let mut secured = AddNetworkState::for_ssid("Lab", false);
        assert!(!secured.is_valid());
        secured.password = "secret".into();
        assert!(secured.is_valid());
    }
}
