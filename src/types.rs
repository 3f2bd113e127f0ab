//! Core data types for the configuration engine
//!
//! This module contains the fundamental value types shared by the schema,
//! the configuration model, the device adapters and the export format.
//!
//! # Main Types
//!
//! - [`ConfigId`] - Numeric identifier of a configuration item
//! - [`ConfigValue`] - A raw configuration value (native units)
//! - [`FieldKind`] - Declared data type of a configuration field
//! - [`ConfigSnapshot`] - Mapping of config IDs to raw values
//!
//! # Loose Equality
//!
//! Values read back from a device do not always keep the type they were
//! written with (a boolean may come back as `1`). [`ConfigValue`] equality is
//! therefore numeric across `Bool`, `Int` and `Float`, which keeps change
//! detection from flagging values that are the same but differently typed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a configuration item
pub type ConfigId = u32;

/// Recorder name
pub const ID_RECORDER_NAME: ConfigId = 0x08ff7f;

/// Recorder description
pub const ID_RECORDER_DESCRIPTION: ConfigId = 0x09ff7f;

/// Wi-Fi enable
pub const ID_WIFI_ENABLE: ConfigId = 0x18ff7f;

/// IDs never overwritten by an import
pub const DEFAULT_IMPORT_EXCLUDE: [ConfigId; 2] = [ID_RECORDER_NAME, ID_RECORDER_DESCRIPTION];

/// A raw configuration value
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ConfigValue {
    /// Numeric view of the value, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConfigValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            ConfigValue::Int(i) => Some(*i as f64),
            ConfigValue::Float(f) => Some(*f),
            ConfigValue::Text(_) => None,
        }
    }

    /// Integer view of the value; floats are rounded
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConfigValue::Bool(b) => Some(*b as i64),
            ConfigValue::Int(i) => Some(*i),
            ConfigValue::Float(f) if f.is_finite() => Some(f.round() as i64),
            _ => None,
        }
    }

    /// Text view of the value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Truthiness, as used by the Wi-Fi reset check
    pub fn is_truthy(&self) -> bool {
        match self {
            ConfigValue::Bool(b) => *b,
            ConfigValue::Int(i) => *i != 0,
            ConfigValue::Float(f) => *f != 0.0,
            ConfigValue::Text(s) => !s.is_empty(),
        }
    }

    /// Convert to a Rhai value for expression evaluation
    pub fn to_dynamic(&self) -> rhai::Dynamic {
        match self {
            ConfigValue::Bool(b) => rhai::Dynamic::from(*b),
            ConfigValue::Int(i) => rhai::Dynamic::from(*i),
            ConfigValue::Float(f) => rhai::Dynamic::from(*f),
            ConfigValue::Text(s) => rhai::Dynamic::from(s.clone()),
        }
    }

    /// Convert from a Rhai value; `()` maps to `None`
    pub fn from_dynamic(value: &rhai::Dynamic) -> Option<Self> {
        if value.is_unit() {
            None
        } else if let Ok(b) = value.as_bool() {
            Some(ConfigValue::Bool(b))
        } else if let Ok(i) = value.as_int() {
            Some(ConfigValue::Int(i))
        } else if let Ok(f) = value.as_float() {
            Some(ConfigValue::Float(f))
        } else if value.is_string() {
            value.clone().into_string().ok().map(ConfigValue::Text)
        } else {
            None
        }
    }
}

impl PartialEq for ConfigValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ConfigValue::Text(a), ConfigValue::Text(b)) => a == b,
            (ConfigValue::Int(a), ConfigValue::Int(b)) => a == b,
            (ConfigValue::Text(_), _) | (_, ConfigValue::Text(_)) => false,
            (a, b) => a.as_f64() == b.as_f64(),
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Bool(b) => write!(f, "{}", b),
            ConfigValue::Int(i) => write!(f, "{}", i),
            ConfigValue::Float(v) => write!(f, "{}", v),
            ConfigValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(v: bool) -> Self {
        ConfigValue::Bool(v)
    }
}

impl From<i64> for ConfigValue {
    fn from(v: i64) -> Self {
        ConfigValue::Int(v)
    }
}

impl From<f64> for ConfigValue {
    fn from(v: f64) -> Self {
        ConfigValue::Float(v)
    }
}

impl From<&str> for ConfigValue {
    fn from(v: &str) -> Self {
        ConfigValue::Text(v.to_string())
    }
}

/// Declared data type of a configuration field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    Boolean,
    Integer,
    Unsigned,
    Float,
    Text,
    /// One of a fixed set of integer options
    Enum,
    /// Epoch seconds (UTC)
    DateTime,
    /// Seconds since midnight
    Time,
}

impl FieldKind {
    /// Coerce a value into this kind's native representation
    pub fn coerce(&self, value: &ConfigValue) -> std::result::Result<ConfigValue, String> {
        match self {
            FieldKind::Boolean => match value {
                ConfigValue::Text(s) => Err(format!("expected a boolean, got {:?}", s)),
                other => Ok(ConfigValue::Bool(other.is_truthy())),
            },
            FieldKind::Float => value
                .as_f64()
                .map(ConfigValue::Float)
                .ok_or_else(|| format!("expected a number, got {}", value)),
            FieldKind::Text => match value {
                ConfigValue::Text(s) => Ok(ConfigValue::Text(s.clone())),
                other => Err(format!("expected text, got {}", other)),
            },
            FieldKind::Unsigned => match value.as_i64() {
                Some(i) if i >= 0 => Ok(ConfigValue::Int(i)),
                Some(i) => Err(format!("expected an unsigned value, got {}", i)),
                None => Err(format!("expected an integer, got {}", value)),
            },
            FieldKind::Integer | FieldKind::Enum | FieldKind::DateTime | FieldKind::Time => value
                .as_i64()
                .map(ConfigValue::Int)
                .ok_or_else(|| format!("expected an integer, got {}", value)),
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Boolean => "boolean",
            FieldKind::Integer => "integer",
            FieldKind::Unsigned => "unsigned",
            FieldKind::Float => "float",
            FieldKind::Text => "text",
            FieldKind::Enum => "enum",
            FieldKind::DateTime => "date/time",
            FieldKind::Time => "time",
        };
        write!(f, "{}", name)
    }
}

/// A mapping of config IDs to raw values
///
/// Used both for the state loaded from the device ("original") and for the
/// state pending write ("current").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigSnapshot(BTreeMap<ConfigId, ConfigValue>);

impl ConfigSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: ConfigId) -> Option<&ConfigValue> {
        self.0.get(&id)
    }

    pub fn insert(&mut self, id: ConfigId, value: impl Into<ConfigValue>) -> Option<ConfigValue> {
        self.0.insert(id, value.into())
    }

    pub fn remove(&mut self, id: ConfigId) -> Option<ConfigValue> {
        self.0.remove(&id)
    }

    pub fn contains(&self, id: ConfigId) -> bool {
        self.0.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConfigId, &ConfigValue)> {
        self.0.iter().map(|(k, v)| (*k, v))
    }

    pub fn ids(&self) -> impl Iterator<Item = ConfigId> + '_ {
        self.0.keys().copied()
    }

    /// Truthiness of an entry; absent entries are false
    pub fn is_truthy(&self, id: ConfigId) -> bool {
        self.get(id).is_some_and(ConfigValue::is_truthy)
    }
}

impl FromIterator<(ConfigId, ConfigValue)> for ConfigSnapshot {
    fn from_iter<I: IntoIterator<Item = (ConfigId, ConfigValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for ConfigSnapshot {
    type Item = (ConfigId, ConfigValue);
    type IntoIter = std::collections::btree_map::IntoIter<ConfigId, ConfigValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_loose_equality() {
        assert_eq!(ConfigValue::Bool(true), ConfigValue::Int(1));
        assert_eq!(ConfigValue::Int(3), ConfigValue::Float(3.0));
        assert_ne!(ConfigValue::Int(3), ConfigValue::Text("3".into()));
        assert_ne!(ConfigValue::Bool(false), ConfigValue::Int(2));
    }

    #[test]
    fn test_untagged_json() {
        let snap: ConfigSnapshot =
            serde_json::from_str(r#"{"589695": "Logger", "1638271": true, "16": 2.5}"#).unwrap();
        assert_eq!(snap.get(ID_RECORDER_NAME), Some(&ConfigValue::Text("Logger".into())));
        assert_eq!(snap.get(ID_WIFI_ENABLE), Some(&ConfigValue::Bool(true)));
        assert_eq!(snap.get(16), Some(&ConfigValue::Float(2.5)));
    }

    #[test]
    fn test_snapshot_equality_is_loose() {
        let a: ConfigSnapshot = [(1, ConfigValue::Bool(true))].into_iter().collect();
        let b: ConfigSnapshot = [(1, ConfigValue::Int(1))].into_iter().collect();
        let c: ConfigSnapshot = [(2, ConfigValue::Int(1))].into_iter().collect();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_coerce() {
        assert_eq!(
            FieldKind::Boolean.coerce(&ConfigValue::Int(1)),
            Ok(ConfigValue::Bool(true))
        );
        assert_eq!(
            FieldKind::Integer.coerce(&ConfigValue::Float(2.6)),
            Ok(ConfigValue::Int(3))
        );
        assert!(FieldKind::Unsigned.coerce(&ConfigValue::Int(-1)).is_err());
        assert!(FieldKind::Text.coerce(&ConfigValue::Int(1)).is_err());
        assert!(FieldKind::Float.coerce(&ConfigValue::Text("x".into())).is_err());
    }

    #[test]
    fn test_dynamic_conversion() {
        let v = ConfigValue::Float(1.5);
        assert_eq!(ConfigValue::from_dynamic(&v.to_dynamic()), Some(v));
        assert_eq!(ConfigValue::from_dynamic(&rhai::Dynamic::UNIT), None);
    }

    proptest! {
        #[test]
        fn snapshot_equality_ignores_numeric_kind(
            values in proptest::collection::btree_map(0u32..0x20_0000, -1_000_000i64..1_000_000, 0..12)
        ) {
            let ints: ConfigSnapshot = values
                .iter()
                .map(|(&id, &v)| (id, ConfigValue::Int(v)))
                .collect();
            let floats: ConfigSnapshot = values
                .iter()
                .map(|(&id, &v)| (id, ConfigValue::Float(v as f64)))
                .collect();
            prop_assert_eq!(&ints, &floats);
            prop_assert_eq!(&floats, &ints);

            let mut fewer = ints.clone();
            if let Some(&id) = values.keys().next() {
                fewer.remove(id);
                prop_assert_ne!(&fewer, &ints);
            }
        }
    }
}
