//! Element registry: data-driven element construction.
//!
//! The registry maps each element tag to the factory that builds it. A
//! dialog owns its registry; [`ElementRegistry::with_defaults`] registers
//! every standard tab, group and field.

use crate::engine::builder::{self, TreeBuilder};
use crate::engine::model::NodeId;
use crate::error::Result;
use crate::schema::{ElementTag, SchemaElement};
use std::collections::HashMap;

/// Builds one element (and its children) into the tree
///
/// Returns `None` if the element was skipped.
pub type ElementFactory =
    fn(&mut TreeBuilder<'_>, &SchemaElement, Option<NodeId>) -> Result<Option<NodeId>>;

/// Metadata for an element kind, including its factory function.
#[derive(Clone, Copy)]
pub struct ElementKindInfo {
    pub tag: ElementTag,
    pub factory: ElementFactory,
}

/// Mapping of element tags to their factories
#[derive(Clone, Default)]
pub struct ElementRegistry {
    entries: HashMap<ElementTag, ElementKindInfo>,
}

impl ElementRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every standard element registered
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_tabs();
        registry.register_groups();
        registry.register_fields();
        registry
    }

    /// Register (or replace) the factory for a tag
    pub fn register(&mut self, tag: ElementTag, factory: ElementFactory) {
        self.entries.insert(tag, ElementKindInfo { tag, factory });
    }

    pub fn register_tabs(&mut self) {
        for tag in [
            ElementTag::Tab,
            ElementTag::DeviceInfoTab,
            ElementTag::FactoryCalibrationTab,
            ElementTag::UserCalibrationTab,
            ElementTag::WiFiSelectionTab,
        ] {
            self.register(tag, builder::build_tab);
        }
    }

    pub fn register_groups(&mut self) {
        self.register(ElementTag::Group, builder::build_group);
        self.register(ElementTag::CheckGroup, builder::build_group);
    }

    pub fn register_fields(&mut self) {
        for tag in [
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
        ] {
            self.register(tag, builder::build_field);
        }
    }

    /// Look up an element by name
    pub fn lookup(&self, name: &str) -> Option<ElementKindInfo> {
        let tag: ElementTag = name.parse().ok()?;
        self.get(tag)
    }

    pub fn get(&self, tag: ElementTag) -> Option<ElementKindInfo> {
        self.entries.get(&tag).copied()
    }

    pub fn contains(&self, tag: ElementTag) -> bool {
        self.entries.contains_key(&tag)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for ElementRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut tags: Vec<&str> = self.entries.keys().map(|t| t.name()).collect();
        tags.sort_unstable();
        f.debug_struct("ElementRegistry").field("tags", &tags).finish()
    }
}
