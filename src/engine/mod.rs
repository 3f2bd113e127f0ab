//! Configuration Dialog Engine
//!
//! Turns a recorder's configuration UI document into an item tree, keeps
//! field values and enable states in step with each other, and runs the
//! dialog's save, import and export flows.
//!
//! ## Data Flow
//!
//! ```text
//! Recorder --config_ui()--> SchemaDocument --build_ui()--> ConfigTree
//! Recorder --config_values()--> ConfigSnapshot --apply_config_data()--> ConfigTree
//! ConfigTree --snapshot()--> ConfigSnapshot --apply_config()--> Recorder
//! ```
//!
//! [`ConfigSession`] ties these together for one open dialog.

pub mod builder;
pub mod controller;
pub mod import_export;
pub mod info_tab;
pub mod model;
pub mod registry;
pub mod wifi;

pub use builder::{build_ui, BuiltUi};
pub use controller::{
    Answer, CancelOutcome, ConfigSession, DialogOptions, DialogResult, Prompter, Question,
    SaveNotice,
};
pub use import_export::{
    check_compatibility, export_config, load_export, ExportedConfig, ImportReport,
    EXPORT_EXTENSION,
};
pub use info_tab::{InfoCapabilities, InfoTab};
pub use model::{ConfigItem, ConfigTree, ItemKind, NodeId, TabKind};
pub use registry::ElementRegistry;
pub use wifi::{WifiMessage, WifiTab};
