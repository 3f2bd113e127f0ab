//! Status bar panel: bottom bar showing scan state, device count and errors.

use egui::{Color32, RichText, Ui};

/// Context needed to render the status bar.
pub struct StatusBarContext<'a> {
    pub scanning: bool,
    pub paused: bool,
    pub devices: usize,
    pub scans: u64,
    /// A long-running action, e.g. setting clocks
    pub busy: Option<&'a str>,
    pub last_error: Option<&'a str>,
}

/// Render the status bar.
pub fn render_status_bar(ui: &mut Ui, ctx: &StatusBarContext<'_>) {
    ui.horizontal(|ui| {
        ui.spacing_mut().item_spacing.x = 8.0;

        let (color, text) = match (ctx.scanning, ctx.paused) {
            (false, _) => (Color32::RED, "Scanner stopped"),
            (true, true) => (Color32::YELLOW, "Scanning paused"),
            (true, false) => (Color32::GREEN, "Scanning"),
        };
        ui.colored_label(color, "●");
        ui.label(RichText::new(text).small());

        ui.separator();

        let devices = match ctx.devices {
            1 => "1 recorder".to_string(),
            n => format!("{} recorders", n),
        };
        ui.label(RichText::new(devices).small());

        if ctx.scans == 0 && ctx.scanning {
            ui.separator();
            ui.spinner();
        }

        if let Some(busy) = ctx.busy {
            ui.separator();
            ui.spinner();
            ui.label(RichText::new(busy).small());
        }

        if let Some(err) = ctx.last_error {
            ui.separator();
            ui.colored_label(Color32::LIGHT_RED, RichText::new(err).small());
        }
    });
}
