//! Custom widgets for the device list and configuration dialog
//!
//! # Widgets
//!
//! - [`StatusIndicator`] - Coloured status dot with label
//! - [`WarningBadge`] - Severity icon with the warning text as tooltip

use crate::device::status::{DeviceWarning, Severity, StatusColour, StatusDisplay};
use egui::{Color32, Response, Ui, Widget};

/// Colour used for a status or severity
pub fn status_colour(colour: Option<StatusColour>) -> Option<Color32> {
    colour.map(|c| match c {
        StatusColour::Blue => Color32::from_rgb(70, 130, 230),
        StatusColour::Yellow => Color32::from_rgb(220, 180, 40),
        StatusColour::Grey => Color32::GRAY,
        StatusColour::Red => Color32::from_rgb(220, 60, 50),
    })
}

/// A widget that displays a coloured status indicator
pub struct StatusIndicator {
    color: Option<Color32>,
    label: String,
}

impl StatusIndicator {
    pub fn new(color: Option<Color32>, label: impl Into<String>) -> Self {
        Self {
            color,
            label: label.into(),
        }
    }

    /// Indicator for a device status
    pub fn for_status(display: &StatusDisplay) -> Self {
        Self::new(status_colour(display.colour), display.text)
    }
}

impl Widget for StatusIndicator {
    fn ui(self, ui: &mut Ui) -> Response {
        ui.horizontal(|ui| match self.color {
            Some(color) => {
                ui.colored_label(color, "●");
                ui.colored_label(color, &self.label);
            }
            None => {
                ui.label(&self.label);
            }
        })
        .response
    }
}

/// Icon for the most severe of a device's warnings
pub struct WarningBadge<'a> {
    warnings: &'a [DeviceWarning],
}

impl<'a> WarningBadge<'a> {
    pub fn new(warnings: &'a [DeviceWarning]) -> Self {
        Self { warnings }
    }
}

impl Widget for WarningBadge<'_> {
    fn ui(self, ui: &mut Ui) -> Response {
        let worst = crate::device::status::worst_severity(self.warnings);
        let (icon, color) = match worst {
            Severity::None => ("", Color32::TRANSPARENT),
            Severity::Info => ("ℹ", Color32::from_rgb(70, 130, 230)),
            Severity::Warn => ("⚠", Color32::from_rgb(220, 180, 40)),
            Severity::Error => ("⛔", Color32::from_rgb(220, 60, 50)),
        };
        let response = ui.colored_label(color, icon);
        if self.warnings.is_empty() {
            return response;
        }
        let text = self
            .warnings
            .iter()
            .map(|w| w.message.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        response.on_hover_text(text)
    }
}
