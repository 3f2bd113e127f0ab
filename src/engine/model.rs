//! Arena model of tabs, groups and fields
//!
//! Items are stored in document order; each keeps the index of its parent.
//! Only the raw value is stored. Display values are always derived through
//! the item's [`DisplayTransform`].

use crate::error::{ConfigError, Result};
use crate::schema::{ElementTag, EnumOption};
use crate::scripting::{CompiledExpression, ConfigView, DisplayTransform, ExpressionEngine};
use crate::types::{ConfigId, ConfigSnapshot, ConfigValue, FieldKind};
use std::collections::{HashMap, HashSet};

/// Index of an item in a [`ConfigTree`]
pub type NodeId = usize;

/// Kinds of tab
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TabKind {
    Fields,
    DeviceInfo,
    FactoryCalibration,
    UserCalibration,
    WiFiSelection,
}

impl TabKind {
    pub fn from_tag(tag: ElementTag) -> Option<Self> {
        match tag {
            ElementTag::Tab => Some(TabKind::Fields),
            ElementTag::DeviceInfoTab => Some(TabKind::DeviceInfo),
            ElementTag::FactoryCalibrationTab => Some(TabKind::FactoryCalibration),
            ElementTag::UserCalibrationTab => Some(TabKind::UserCalibration),
            ElementTag::WiFiSelectionTab => Some(TabKind::WiFiSelection),
            _ => None,
        }
    }
}

/// What an item is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Tab(TabKind),
    Group,
    Field(FieldKind),
}

/// An enable rule: `enable_if` and/or `disable_if`
#[derive(Debug, Clone, Default)]
pub struct Condition {
    pub enable_if: Option<CompiledExpression>,
    pub disable_if: Option<CompiledExpression>,
}

impl Condition {
    pub fn is_empty(&self) -> bool {
        self.enable_if.is_none() && self.disable_if.is_none()
    }

    /// Evaluate against the display values; failures count as enabled
    fn allows(&self, name: &str, engine: &ExpressionEngine, view: &ConfigView) -> bool {
        let check = |expr: &CompiledExpression, want: bool| match engine.eval_condition(expr, view) {
            Ok(v) => v == want,
            Err(e) => {
                tracing::warn!("Enable condition of {} failed: {}", name, e);
                true
            }
        };
        self.enable_if.as_ref().map_or(true, |e| check(e, true))
            && self.disable_if.as_ref().map_or(true, |e| check(e, false))
    }
}

/// A tab, group or field
#[derive(Debug, Clone)]
pub struct ConfigItem {
    pub kind: ItemKind,
    pub tag: ElementTag,
    pub id: Option<ConfigId>,
    pub label: String,
    pub tooltip: Option<String>,
    pub units: Option<String>,
    pub default: Option<ConfigValue>,
    pub default_checked: bool,
    pub options: Vec<EnumOption>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub condition: Condition,
    pub transform: DisplayTransform,
    pub advanced: bool,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    raw: Option<ConfigValue>,
    checkbox: Option<bool>,
    enabled: bool,
}

impl ConfigItem {
    /// Create an item with no value
    pub fn new(kind: ItemKind, tag: ElementTag, label: impl Into<String>) -> Self {
        Self {
            kind,
            tag,
            id: None,
            label: label.into(),
            tooltip: None,
            units: None,
            default: None,
            default_checked: false,
            options: Vec::new(),
            min: None,
            max: None,
            condition: Condition::default(),
            transform: DisplayTransform::Identity,
            advanced: false,
            parent: None,
            children: Vec::new(),
            raw: None,
            checkbox: if tag.has_checkbox() { Some(false) } else { None },
            enabled: true,
        }
    }

    pub fn field_kind(&self) -> Option<FieldKind> {
        match self.kind {
            ItemKind::Field(kind) => Some(kind),
            _ => None,
        }
    }

    pub fn is_field(&self) -> bool {
        matches!(self.kind, ItemKind::Field(_))
    }

    /// Fields, and `CheckGroup`s with an ID (stored as a boolean)
    pub fn holds_value(&self) -> bool {
        self.id.is_some()
            && (self.is_field() || (self.kind == ItemKind::Group && self.checkbox.is_some()))
    }

    pub fn raw(&self) -> Option<&ConfigValue> {
        self.raw.as_ref()
    }

    /// `None` if the item has no checkbox
    pub fn checkbox(&self) -> Option<bool> {
        self.checkbox
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Name for log messages
    pub fn name(&self) -> String {
        match self.id {
            Some(id) => format!("{} (0x{:X})", self.label, id),
            None => self.label.clone(),
        }
    }

    /// Enabled and not unchecked
    fn is_open(&self) -> bool {
        self.enabled && self.checkbox != Some(false)
    }

    /// Coerce a raw value to this field's type and options
    fn validate(&self, value: &ConfigValue) -> Result<ConfigValue> {
        let id = self.id.unwrap_or_default();
        let kind = self.field_kind().ok_or_else(|| ConfigError::Value {
            id,
            message: format!("{} does not hold a value", self.label),
        })?;
        let value = kind
            .coerce(value)
            .map_err(|message| ConfigError::Value { id, message })?;
        if kind == FieldKind::Enum
            && !self.options.is_empty()
            && !self.options.iter().any(|o| Some(o.value) == value.as_i64())
        {
            return Err(ConfigError::Value {
                id,
                message: format!("{} is not one of the options", value),
            });
        }
        Ok(value)
    }
}

/// The arena holding every item of one dialog
#[derive(Debug, Clone, Default)]
pub struct ConfigTree {
    items: Vec<ConfigItem>,
    tabs: Vec<NodeId>,
    by_id: HashMap<ConfigId, NodeId>,
}

impl ConfigTree {
    pub fn new() -> Self {
        Self::default()
    }

    // ==== Structure ====

    /// Add an item under `parent`; IDs must be unique
    pub fn add(&mut self, mut item: ConfigItem, parent: Option<NodeId>) -> Result<NodeId> {
        let node = self.items.len();
        if let Some(id) = item.id {
            if self.by_id.contains_key(&id) {
                return Err(ConfigError::Schema(format!(
                    "Duplicate config ID 0x{:X} ({})",
                    id, item.label
                )));
            }
            self.by_id.insert(id, node);
        }
        item.parent = parent;
        match parent {
            Some(p) => self.items[p].children.push(node),
            None => self.tabs.push(node),
        }
        self.items.push(item);
        Ok(node)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item(&self, node: NodeId) -> &ConfigItem {
        &self.items[node]
    }

    pub fn items(&self) -> impl Iterator<Item = (NodeId, &ConfigItem)> {
        self.items.iter().enumerate()
    }

    pub fn tabs(&self) -> &[NodeId] {
        &self.tabs
    }

    pub fn node(&self, id: ConfigId) -> Option<NodeId> {
        self.by_id.get(&id).copied()
    }

    /// Items holding a value (fields and `CheckGroup`s with an ID), in
    /// document order
    pub fn fields(&self) -> impl Iterator<Item = (NodeId, ConfigId, &ConfigItem)> {
        self.items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.holds_value())
            .filter_map(|(n, item)| item.id.map(|id| (n, id, item)))
    }

    /// All descendants of `node`, depth first
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.items[node].children.iter().rev().copied().collect();
        while let Some(n) = stack.pop() {
            out.push(n);
            stack.extend(self.items[n].children.iter().rev().copied());
        }
        out
    }

    // ==== Values ====

    /// True if the item and all of its ancestors are enabled and checked
    pub fn is_active(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(n) = current {
            let item = &self.items[n];
            if !item.is_open() {
                return false;
            }
            current = item.parent;
        }
        true
    }

    /// The raw value that would be persisted, if any
    ///
    /// A `CheckGroup` with an ID reports its checkbox state, even unchecked.
    pub fn effective_raw(&self, node: NodeId) -> Option<&ConfigValue> {
        let item = &self.items[node];
        let active = if item.is_field() {
            self.is_active(node)
        } else {
            item.enabled && item.parent.map_or(true, |p| self.is_active(p))
        };
        if !item.transform.contributes() || !active {
            return None;
        }
        item.raw.as_ref()
    }

    /// Set a raw value, checking the item's checkbox
    pub fn set_raw(&mut self, node: NodeId, value: &ConfigValue) -> Result<()> {
        if !self.items[node].is_field() {
            if self.items[node].holds_value() {
                self.set_checked(node, value.is_truthy());
                return Ok(());
            }
            return Err(ConfigError::Value {
                id: self.items[node].id.unwrap_or_default(),
                message: format!("{} does not hold a value", self.items[node].label),
            });
        }
        let value = self.items[node].validate(value)?;
        let item = &mut self.items[node];
        item.raw = Some(value);
        if item.checkbox.is_some() {
            item.checkbox = Some(true);
        }
        Ok(())
    }

    pub fn set_checked(&mut self, node: NodeId, checked: bool) {
        let item = &mut self.items[node];
        if item.checkbox.is_some() {
            item.checkbox = Some(checked);
            if item.holds_value() && !item.is_field() {
                item.raw = Some(ConfigValue::Bool(checked));
            }
        }
    }

    /// Restore the schema default value and checkbox state
    pub fn set_to_default(&mut self, node: NodeId) {
        let item = &mut self.items[node];
        item.raw = match (&item.default, item.field_kind()) {
            (Some(v), Some(kind)) => kind.coerce(v).ok(),
            _ => None,
        };
        let checked = item.default_checked;
        self.set_checked(node, checked);
    }

    /// Reset every field and group to its default
    pub fn reset_all(&mut self) {
        for node in 0..self.items.len() {
            self.set_to_default(node);
        }
    }

    /// Display value of a field
    pub fn display_value(
        &self,
        node: NodeId,
        engine: &ExpressionEngine,
        view: &ConfigView,
    ) -> Result<Option<ConfigValue>> {
        match self.effective_raw(node) {
            Some(raw) => self.items[node].transform.to_display(raw, engine, view),
            None => Ok(None),
        }
    }

    /// Set a field from a displayed value
    pub fn set_display_value(
        &mut self,
        node: NodeId,
        display: &ConfigValue,
        engine: &ExpressionEngine,
        view: &ConfigView,
    ) -> Result<()> {
        let raw = self.items[node].transform.to_raw(display, engine, view)?;
        match raw {
            Some(raw) => self.set_raw(node, &raw),
            None => Ok(()),
        }
    }

    /// Check each `CheckGroup` without an ID iff one of its descendants
    /// received a value
    pub fn sync_unnamed_check_groups(&mut self, received: &HashSet<NodeId>) {
        for node in 0..self.items.len() {
            let item = &self.items[node];
            if item.kind != ItemKind::Group || item.checkbox.is_none() || item.id.is_some() {
                continue;
            }
            let filled = self
                .descendants(node)
                .iter()
                .any(|n| received.contains(n));
            self.set_checked(node, filled);
        }
    }

    /// Effective raw values of every field
    pub fn snapshot(&self) -> ConfigSnapshot {
        self.fields()
            .filter_map(|(n, id, _)| self.effective_raw(n).map(|v| (id, v.clone())))
            .collect()
    }

    /// The mapping expressions see as `Config`
    ///
    /// Transforms that read `Config` themselves see raw values.
    pub fn config_view(&self, engine: &ExpressionEngine) -> ConfigView {
        let raw_view = ConfigView::new(self.snapshot().into_iter().collect());
        let mut display = HashMap::new();
        for (n, id, item) in self.fields() {
            match self.display_value(n, engine, &raw_view) {
                Ok(Some(v)) => {
                    display.insert(id, v);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("Could not compute display value of {}: {}", item.name(), e),
            }
        }
        ConfigView::new(display)
    }

    // ==== Enable/disable ====

    /// Recompute one item's enabled flag
    pub fn update_disabled(&mut self, node: NodeId, engine: &ExpressionEngine, view: &ConfigView) {
        let parent_open = self.items[node]
            .parent
            .map_or(true, |p| self.is_active(p));
        let item = &self.items[node];
        let allowed = parent_open
            && (item.condition.is_empty() || item.condition.allows(&item.name(), engine, view));
        self.items[node].enabled = allowed;
    }

    /// Recompute every item's enabled flag, parents before children
    ///
    /// The view is kept current as items change state, so conditions see the
    /// effect of earlier items in document order.
    pub fn update_disabled_items(&mut self, engine: &ExpressionEngine) {
        let mut view = self.config_view(engine);
        for node in 0..self.items.len() {
            let was_active = self.is_active(node);
            self.update_disabled(node, engine, &view);
            if was_active == self.is_active(node) {
                continue;
            }
            let targets: Vec<NodeId> = std::iter::once(node)
                .chain(self.descendants(node))
                .collect();
            for n in targets {
                if let Some(id) = self.items[n].id.filter(|_| self.items[n].holds_value()) {
                    let value = self.display_value(n, engine, &view).ok().flatten();
                    view.set(id, value);
                }
            }
        }
    }
}
