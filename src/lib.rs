//! # enDAQ Config: Recorder Discovery and Configuration
//!
//! Finds attached enDAQ / Slam Stick data recorders, lists them with their
//! status, and edits their configuration through a dialog generated from the
//! configuration UI document each recorder carries.
//!
//! ## Architecture
//!
//! - **Device**: the [`device::Recorder`] trait, a scanner thread that keeps
//!   the device list current, and command threads for clock and recording
//!   commands
//! - **Schema**: parses the configuration UI document into elements
//! - **Engine**: builds the tab/group/field tree and runs the dialog's save,
//!   import and export flows
//! - **Scripting**: Rhai-based enable conditions and display transforms
//! - **Frontend**: eframe/egui device list and configuration dialog
//! - **Communication**: crossbeam channels between the scanner and the UI
//!
//! ## Configuration
//!
//! Application state (recent devices, preferences) and `settings.toml` are
//! stored in the platform data directory under `io.endaq.config`; see
//! [`config`].
//!
//! ## Example
//!
//! ```ignore
//! use endaq_config::{
//!     config::{AppSettings, AppState},
//!     device::{DeviceScanner, MockEnumerator},
//!     frontend::ConfigApp,
//! };
//!
//! fn main() -> eframe::Result<()> {
//!     let settings = AppSettings::load_or_default();
//!     let (scanner, handle) =
//!         DeviceScanner::new(Box::new(MockEnumerator::demo()), settings.scan_config());
//!     scanner.spawn().expect("scanner thread");
//!
//!     eframe::run_native(
//!         "enDAQ Configuration",
//!         eframe::NativeOptions::default(),
//!         Box::new(|cc| {
//!             Ok(Box::new(ConfigApp::new(
//!                 cc,
//!                 handle,
//!                 AppState::load_or_default(),
//!                 settings,
//!                 false,
//!             )))
//!         }),
//!     )
//! }
//! ```

pub mod app;
pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod frontend;
pub mod schema;
pub mod scripting;
pub mod types;

// Re-export commonly used types
pub use app::ConfigApp;
pub use config::{AppSettings, AppState};
pub use device::{DeviceInfo, DeviceScanner, Recorder, ScanHandle, SharedRecorder};
pub use engine::{ConfigSession, DialogOptions, DialogResult};
pub use error::{ConfigError, DeviceError, Result};
pub use schema::SchemaDocument;
pub use scripting::ExpressionEngine;
pub use types::{ConfigId, ConfigSnapshot, ConfigValue};
