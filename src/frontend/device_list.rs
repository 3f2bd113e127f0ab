//! The device list: one row per attached (or recently removed) recorder.

use egui::{Color32, RichText, Ui};

use super::state::{AppAction, DeviceListState, DeviceRow};
use super::widgets::{StatusIndicator, WarningBadge};

/// Context needed to render the device list.
pub struct DeviceListContext {
    /// Show hardware and firmware revision columns
    pub show_advanced_columns: bool,
    /// A device action is already running
    pub busy: bool,
}

/// Render the list and its buttons, returning the actions requested.
pub fn render_device_list(
    ui: &mut Ui,
    state: &mut DeviceListState,
    ctx: &DeviceListContext,
) -> Vec<AppAction> {
    let mut actions = Vec::new();

    render_buttons(ui, state, ctx, &mut actions);
    ui.separator();

    if state.rows().is_empty() {
        ui.centered_and_justified(|ui| {
            let text = if state.scan_count() == 0 {
                "Looking for recorders..."
            } else {
                "No recorders found. Attach a recorder to configure it."
            };
            ui.label(RichText::new(text).color(Color32::GRAY));
        });
        return actions;
    }

    let columns = if ctx.show_advanced_columns { 9 } else { 7 };
    let mut clicked: Option<String> = None;

    egui::ScrollArea::both().show(ui, |ui| {
        egui::Grid::new("device_list_grid")
            .num_columns(columns)
            .striped(true)
            .spacing([12.0, 4.0])
            .show(ui, |ui| {
                ui.label("");
                for header in ["Path", "Name", "Type", "Serial #", "Status", "Battery"] {
                    ui.strong(header);
                }
                if ctx.show_advanced_columns {
                    ui.strong("HW Rev.");
                    ui.strong("FW Rev.");
                }
                ui.end_row();

                let selected = state.selected_key().map(str::to_string);
                for row in state.rows() {
                    let key = row.key();
                    let is_selected = selected.as_deref() == Some(key.as_str());
                    if render_row(ui, row, is_selected, ctx.show_advanced_columns, &mut actions) {
                        clicked = Some(key);
                    }
                    ui.end_row();
                }
            });
    });

    if let Some(key) = clicked {
        state.select(Some(key));
    }
    actions
}

/// Returns true if the row was clicked
fn render_row(
    ui: &mut Ui,
    row: &DeviceRow,
    is_selected: bool,
    advanced: bool,
    actions: &mut Vec<AppAction>,
) -> bool {
    let info = &row.entry.info;
    let dim = |text: String| {
        if row.entry.present {
            RichText::new(text)
        } else {
            RichText::new(text).color(Color32::GRAY)
        }
    };

    ui.add(WarningBadge::new(&row.warnings));

    let path = info
        .path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(virtual)".to_string());
    let response = ui.selectable_label(is_selected, dim(path));
    if response.double_clicked() && row.entry.present {
        actions.push(AppAction::Configure(row.key()));
    }

    ui.label(dim(info.name.clone()));
    ui.label(dim(info.product_name.clone()))
        .on_hover_text(&info.part_number);
    ui.label(dim(info.serial.clone()));
    ui.add(StatusIndicator::for_status(&row.status()));
    ui.label(dim(
        row.entry
            .battery
            .map(|b| b.description())
            .unwrap_or_default(),
    ));

    if advanced {
        ui.label(dim(
            info.hardware_revision
                .map(|r| r.to_string())
                .unwrap_or_default(),
        ));
        ui.label(dim(info.firmware_label()));
    }

    response.clicked()
}

fn render_buttons(
    ui: &mut Ui,
    state: &DeviceListState,
    ctx: &DeviceListContext,
    actions: &mut Vec<AppAction>,
) {
    let selected = state.selected().filter(|r| r.entry.present);
    let can_command = selected.is_some_and(|r| {
        r.entry.info.has_command_interface && r.entry.info.can_record
    });

    ui.horizontal(|ui| {
        if ui
            .add_enabled(selected.is_some() && !ctx.busy, egui::Button::new("Configure..."))
            .on_hover_text("Configure the selected recorder")
            .clicked()
        {
            if let Some(row) = selected {
                actions.push(AppAction::Configure(row.key()));
            }
        }

        ui.separator();

        if ui
            .add_enabled(can_command && !ctx.busy, egui::Button::new("Start Recording"))
            .clicked()
        {
            if let Some(row) = selected {
                actions.push(AppAction::StartRecording(row.key()));
            }
        }
        if ui
            .add_enabled(can_command && !ctx.busy, egui::Button::new("Stop Recording"))
            .clicked()
        {
            if let Some(row) = selected {
                actions.push(AppAction::StopRecording(row.key()));
            }
        }

        ui.separator();

        if ui
            .add_enabled(
                state.present_count() > 0 && !ctx.busy,
                egui::Button::new("Set All Clocks"),
            )
            .on_hover_text("Set the clock of every attached recorder to the current time")
            .clicked()
        {
            actions.push(AppAction::SetAllClocks);
        }

        if ui.button("Rescan").clicked() {
            actions.push(AppAction::Rescan);
        }
    });
}
