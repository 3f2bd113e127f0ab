//! Status text, colours and warnings for the device list

use crate::device::{DeviceInfo, StatusCode};
use chrono::{DateTime, Duration, Utc};

/// Colour hint for a status label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusColour {
    Blue,
    Yellow,
    Grey,
    Red,
}

/// How a status code is shown
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusDisplay {
    pub text: &'static str,
    pub colour: Option<StatusColour>,
}

const STATUS_TABLE: [(StatusCode, &str, Option<StatusColour>); 7] = [
    (0, "Ready", None),
    (10, "Recording", Some(StatusColour::Blue)),
    (20, "Resetting", Some(StatusColour::Yellow)),
    (30, "Starting Recording", Some(StatusColour::Yellow)),
    (40, "Awaiting Trigger", Some(StatusColour::Yellow)),
    (50, "Sleeping", Some(StatusColour::Grey)),
    (-10, "Error", Some(StatusColour::Red)),
];

/// Look up the text and colour of a status
///
/// Codes without an entry round down to a multiple of 10; any negative code
/// without one is an error. An absent status reads as "Ready" for a present
/// device and "Unavailable" otherwise.
pub fn status_display(code: Option<StatusCode>, present: bool) -> StatusDisplay {
    let Some(code) = code else {
        return if present {
            StatusDisplay {
                text: "Ready",
                colour: None,
            }
        } else {
            StatusDisplay {
                text: "Unavailable",
                colour: Some(StatusColour::Grey),
            }
        };
    };

    let lookup = |c: StatusCode| {
        STATUS_TABLE
            .iter()
            .find(|(k, _, _)| *k == c)
            .map(|(_, text, colour)| StatusDisplay {
                text: *text,
                colour: *colour,
            })
    };

    lookup(code)
        .or_else(|| lookup(code.div_euclid(10) * 10))
        .or_else(|| if code < 0 { lookup(-10) } else { None })
        .unwrap_or(StatusDisplay {
            text: "",
            colour: None,
        })
}

/// Warning severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    None,
    Info,
    Warn,
    Error,
}

/// A warning about a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceWarning {
    pub severity: Severity,
    pub message: String,
}

const MB: u64 = 1024 * 1024;
/// Free space below this is worth mentioning
pub const LOW_SPACE_INFO: u64 = 64 * MB;
/// Free space below this will prevent useful recording
pub const LOW_SPACE_ERROR: u64 = 16 * MB;
/// Warn this many days before end of life
pub const AGE_WARNING_DAYS: i64 = 182;
/// Warn this many days before calibration expires
pub const CALIBRATION_WARNING_DAYS: i64 = 120;

/// Collect warnings for a device, most severe first
pub fn device_warnings(
    info: &DeviceInfo,
    free_space: Option<u64>,
    calibration_expires: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Vec<DeviceWarning> {
    let mut warnings = Vec::new();

    if let Some(free) = free_space {
        if free < LOW_SPACE_ERROR {
            warnings.push(DeviceWarning {
                severity: Severity::Error,
                message: format!("Device is almost full ({} MB free).", free / MB),
            });
        } else if free < LOW_SPACE_INFO {
            warnings.push(DeviceWarning {
                severity: Severity::Info,
                message: format!("Device is low on space ({} MB free).", free / MB),
            });
        }
    }

    if let (Some(made), Some(lifespan)) = (info.manufactured, info.lifespan_days) {
        let end_of_life = made + Duration::days(lifespan);
        if now > end_of_life {
            warnings.push(DeviceWarning {
                severity: Severity::Warn,
                message: "This device is past its expected lifespan; the battery may need replacing."
                    .to_string(),
            });
        } else if end_of_life - now < Duration::days(AGE_WARNING_DAYS) {
            warnings.push(DeviceWarning {
                severity: Severity::Info,
                message: "This device is nearing the end of its expected lifespan.".to_string(),
            });
        }
    }

    if let Some(expires) = calibration_expires {
        if now > expires {
            warnings.push(DeviceWarning {
                severity: Severity::Warn,
                message: format!(
                    "This device's calibration expired on {}.",
                    expires.format("%Y-%m-%d")
                ),
            });
        } else if expires - now < Duration::days(CALIBRATION_WARNING_DAYS) {
            warnings.push(DeviceWarning {
                severity: Severity::Info,
                message: format!(
                    "This device's calibration expires on {}.",
                    expires.format("%Y-%m-%d")
                ),
            });
        }
    }

    warnings.sort_by(|a, b| b.severity.cmp(&a.severity));
    warnings
}

/// Highest severity among warnings
pub fn worst_severity(warnings: &[DeviceWarning]) -> Severity {
    warnings
        .iter()
        .map(|w| w.severity)
        .max()
        .unwrap_or(Severity::None)
}
