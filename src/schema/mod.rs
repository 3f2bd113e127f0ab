//! Configuration UI hint documents
//!
//! A recorder describes its configuration dialog with a tree of elements.
//! Each element has a name (`Tab`, `IntField`, `CheckGroup`, ...), a set of
//! attributes and optional children:
//!
//! ```json
//! {
//!   "element": "ConfigUI",
//!   "children": [
//!     { "element": "Tab", "label": "General", "children": [
//!       { "element": "TextField", "label": "Name", "config_id": 589695 }
//!     ]}
//!   ]
//! }
//! ```
//!
//! Parsing only checks the shape of the document. Interpreting element names
//! is left to the element registry so unknown elements can be skipped.

use crate::error::{ConfigError, Result};
use crate::types::{ConfigId, ConfigValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// One option of an `EnumField`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumOption {
    pub label: String,
    pub value: i64,
}

/// A single element of the UI hint tree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaElement {
    /// Element name, e.g. `BooleanField`
    pub element: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_id: Option<ConfigId>,
    /// Default value in native units
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<ConfigValue>,
    /// Initial checkbox state of `Check*` elements
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_if: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_if: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gain: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<EnumOption>,
    /// Only shown when advanced mode is on
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub advanced: bool,
    /// Free-form payload (e.g. the text of `PostConfigMessage`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SchemaElement>,
}

impl SchemaElement {
    /// Create an element with just a name
    pub fn new(element: impl Into<String>) -> Self {
        Self {
            element: element.into(),
            ..Default::default()
        }
    }

    /// The element's tag, if it is one the dialog knows about
    pub fn tag(&self) -> Option<ElementTag> {
        self.element.parse().ok()
    }

    /// Label for log messages and widgets
    pub fn display_name(&self) -> String {
        match (&self.label, self.config_id) {
            (Some(label), Some(id)) => format!("{} (0x{:X})", label, id),
            (Some(label), None) => label.clone(),
            (None, Some(id)) => format!("{} 0x{:X}", self.element, id),
            (None, None) => self.element.clone(),
        }
    }

    /// Every config ID in this element and its descendants
    pub fn config_ids(&self) -> BTreeSet<ConfigId> {
        let mut ids = BTreeSet::new();
        self.visit(&mut |el| {
            if let Some(id) = el.config_id {
                ids.insert(id);
            }
        });
        ids
    }

    /// Call `f` on this element and every descendant, depth first
    pub fn visit<'a>(&'a self, f: &mut impl FnMut(&'a SchemaElement)) {
        f(self);
        for child in &self.children {
            child.visit(f);
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_id(mut self, id: ConfigId) -> Self {
        self.config_id = Some(id);
        self
    }

    pub fn with_default(mut self, value: impl Into<ConfigValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_child(mut self, child: SchemaElement) -> Self {
        self.children.push(child);
        self
    }
}

/// A parsed configuration UI document
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDocument {
    root: SchemaElement,
    raw: String,
}

impl SchemaDocument {
    /// Parse a document from JSON text
    ///
    /// The raw text is kept for export.
    pub fn parse(raw: &str) -> Result<Self> {
        let root: SchemaElement = serde_json::from_str(raw)
            .map_err(|e| ConfigError::Schema(format!("Malformed configuration UI data: {}", e)))?;
        Ok(Self {
            root,
            raw: raw.to_string(),
        })
    }

    /// Wrap an element tree, generating its raw text
    pub fn from_root(root: SchemaElement) -> Result<Self> {
        let raw = serde_json::to_string_pretty(&root)?;
        Ok(Self { root, raw })
    }

    pub fn root(&self) -> &SchemaElement {
        &self.root
    }

    /// The top-level elements (tabs and messages)
    pub fn top_level(&self) -> &[SchemaElement] {
        &self.root.children
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }
}

/// Known element names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementTag {
    // Tabs
    Tab,
    DeviceInfoTab,
    FactoryCalibrationTab,
    UserCalibrationTab,
    WiFiSelectionTab,
    // Groups
    Group,
    CheckGroup,
    // Fields
    BooleanField,
    IntField,
    UIntField,
    FloatField,
    TextField,
    EnumField,
    DateTimeField,
    TimeField,
    CheckIntField,
    CheckUIntField,
    CheckFloatField,
    CheckTextField,
    CheckEnumField,
    // Other
    PostConfigMessage,
}

impl ElementTag {
    pub const ALL: [ElementTag; 21] = [
        ElementTag::Tab,
        ElementTag::DeviceInfoTab,
        ElementTag::FactoryCalibrationTab,
        ElementTag::UserCalibrationTab,
        ElementTag::WiFiSelectionTab,
        ElementTag::Group,
        ElementTag::CheckGroup,
        ElementTag::BooleanField,
        ElementTag::IntField,
        ElementTag::UIntField,
        ElementTag::FloatField,
        ElementTag::TextField,
        ElementTag::EnumField,
        ElementTag::DateTimeField,
        ElementTag::TimeField,
        ElementTag::CheckIntField,
        ElementTag::CheckUIntField,
        ElementTag::CheckFloatField,
        ElementTag::CheckTextField,
        ElementTag::CheckEnumField,
        ElementTag::PostConfigMessage,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ElementTag::Tab => "Tab",
            ElementTag::DeviceInfoTab => "DeviceInfoTab",
            ElementTag::FactoryCalibrationTab => "FactoryCalibrationTab",
            ElementTag::UserCalibrationTab => "UserCalibrationTab",
            ElementTag::WiFiSelectionTab => "WiFiSelectionTab",
            ElementTag::Group => "Group",
            ElementTag::CheckGroup => "CheckGroup",
            ElementTag::BooleanField => "BooleanField",
            ElementTag::IntField => "IntField",
            ElementTag::UIntField => "UIntField",
            ElementTag::FloatField => "FloatField",
            ElementTag::TextField => "TextField",
            ElementTag::EnumField => "EnumField",
            ElementTag::DateTimeField => "DateTimeField",
            ElementTag::TimeField => "TimeField",
            ElementTag::CheckIntField => "CheckIntField",
            ElementTag::CheckUIntField => "CheckUIntField",
            ElementTag::CheckFloatField => "CheckFloatField",
            ElementTag::CheckTextField => "CheckTextField",
            ElementTag::CheckEnumField => "CheckEnumField",
            ElementTag::PostConfigMessage => "PostConfigMessage",
        }
    }

    pub fn is_tab(&self) -> bool {
        matches!(
            self,
            ElementTag::Tab
                | ElementTag::DeviceInfoTab
                | ElementTag::FactoryCalibrationTab
                | ElementTag::UserCalibrationTab
                | ElementTag::WiFiSelectionTab
        )
    }

    /// True for elements carrying their own checkbox
    pub fn has_checkbox(&self) -> bool {
        matches!(
            self,
            ElementTag::CheckGroup
                | ElementTag::CheckIntField
                | ElementTag::CheckUIntField
                | ElementTag::CheckFloatField
                | ElementTag::CheckTextField
                | ElementTag::CheckEnumField
        )
    }
}

impl fmt::Display for ElementTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ElementTag {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ElementTag::ALL
            .iter()
            .copied()
            .find(|tag| tag.name() == s)
            .ok_or(())
    }
}
