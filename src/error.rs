//! Error handling for the enDAQ configuration tool
//!
//! This module defines custom error types and a Result alias for use
//! throughout the application. Device-level failures live in their own
//! [`DeviceError`] enum so they can be translated into user-facing messages
//! separately from schema and expression problems.

use thiserror::Error;

/// Errors raised by a recording device or its adapter
#[derive(Error, Debug)]
pub enum DeviceError {
    /// The device is no longer attached
    #[error("Device was removed")]
    Removed,

    /// Another process holds the device
    #[error("Device is locked by another process: {0}")]
    Locked(String),

    /// The device reported it was busy
    #[error("Device is busy")]
    Busy,

    /// A command did not complete in time
    #[error("Device timed out: {0}")]
    Timeout(String),

    /// The device does not support the requested feature
    #[error("Unsupported feature: {0}")]
    Unsupported(String),

    /// The device rejected a command
    #[error("Command failed: {0}")]
    Command(String),

    /// Low-level I/O failure
    #[error("Device I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeviceError {
    /// Classify an I/O error, splitting out removal and lock conflicts
    pub fn from_io(err: std::io::Error, context: &str) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => DeviceError::Removed,
            std::io::ErrorKind::PermissionDenied => {
                DeviceError::Locked(format!("{}: {}", context, err))
            }
            _ => DeviceError::Io(err),
        }
    }

    /// Build the message shown to the user after a failed configuration write
    ///
    /// With `advanced` set, the raw error name or OS code is appended.
    pub fn user_message(&self, advanced: bool) -> String {
        let mut msg = String::from(
            "An error occurred when trying to update the recorder's configuration data.\n\n",
        );
        match self {
            DeviceError::Removed => msg.push_str("The recorder appears to have been removed."),
            DeviceError::Locked(_) => msg.push_str(LOCKED_MESSAGE),
            DeviceError::Io(err) => {
                msg.push_str(&capitalize(&err.kind().to_string()));
                msg.push('.');
                if advanced {
                    match err.raw_os_error() {
                        Some(code) => msg.push_str(&format!(" (error code {})", code)),
                        None => msg.push_str(&format!(" ({:?})", err.kind())),
                    }
                }
            }
            other => {
                msg.push_str("The device reported a problem.");
                if advanced {
                    msg.push_str(&format!(" ({})", other));
                }
            }
        }
        msg
    }
}

/// Result type alias for device adapter calls
pub type DeviceResult<T> = std::result::Result<T, DeviceError>;

/// Message shown when another process has control of a device
pub const LOCKED_MESSAGE: &str = "Another process appears to have control of the device.\n\n\
     Close other applications that could be using the recorder and try again.";

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Main error type for configuration operations
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Missing or corrupt configuration UI data
    #[error("Configuration UI error: {0}")]
    Schema(String),

    /// A value could not be applied to a field
    #[error("Value error for ID 0x{id:X}: {message}")]
    Value { id: u32, message: String },

    /// Errors related to enable/transform expressions
    #[error("Expression error: {0}")]
    Expression(String),

    /// Imported data cannot be used with this device
    #[error("Incompatible configuration data: {0}")]
    Incompatible(String),

    /// Errors related to application settings loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors raised by the recording device
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<ConfigError>,
    },
}

impl ConfigError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        ConfigError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create an expression error from a Rhai error
    pub fn from_rhai_error(err: Box<rhai::EvalAltResult>) -> Self {
        ConfigError::Expression(err.to_string())
    }

    /// The innermost error, skipping context wrappers
    pub fn root(&self) -> &ConfigError {
        match self {
            ConfigError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// The device error underneath this one, if any
    pub fn device_error(&self) -> Option<&DeviceError> {
        match self.root() {
            ConfigError::Device(err) => Some(err),
            _ => None,
        }
    }

    /// True if the failure is a permission or lock conflict
    pub fn is_locked(&self) -> bool {
        matches!(self.device_error(), Some(DeviceError::Locked(_)))
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Serialization(err.to_string())
    }
}

/// Result type alias for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, Box<rhai::EvalAltResult>> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| ConfigError::from_rhai_error(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| ConfigError::from_rhai_error(e).with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConfigError::Schema("No CONFIG.UI data".to_string());
        assert_eq!(err.to_string(), "Configuration UI error: No CONFIG.UI data");
    }

    #[test]
    fn test_value_error_shows_hex_id() {
        let err = ConfigError::Value {
            id: 0x18ff7f,
            message: "bad".to_string(),
        };
        assert!(err.to_string().contains("0x18FF7F"));
    }

    #[test]
    fn test_error_with_context_keeps_root() {
        let err = ConfigError::Device(DeviceError::Locked("config.json".into()))
            .with_context("Failed to save");
        assert!(err.to_string().contains("Failed to save"));
        assert!(err.is_locked());
    }

    #[test]
    fn test_from_io_classification() {
        let removed = DeviceError::from_io(
            std::io::Error::from(std::io::ErrorKind::NotFound),
            "config",
        );
        assert!(matches!(removed, DeviceError::Removed));

        let locked = DeviceError::from_io(
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            "config",
        );
        assert!(matches!(locked, DeviceError::Locked(_)));
    }

    #[test]
    fn test_user_message_advanced_includes_code() {
        let err = DeviceError::Io(std::io::Error::from_raw_os_error(5));
        let plain = err.user_message(false);
        let advanced = err.user_message(true);
        assert!(!plain.contains("error code"));
        assert!(advanced.contains("(error code 5)"));
    }

    #[test]
    fn test_user_message_removed() {
        let msg = DeviceError::Removed.user_message(false);
        assert!(msg.contains("removed"));
    }
}
