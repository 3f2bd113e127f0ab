//! Builds the item tree from a UI hint document

use crate::engine::model::{Condition, ConfigItem, ConfigTree, ItemKind, NodeId, TabKind};
use crate::engine::registry::ElementRegistry;
use crate::error::{ConfigError, Result};
use crate::schema::{ElementTag, SchemaDocument, SchemaElement};
use crate::scripting::{CompiledExpression, DisplayTransform, ExpressionEngine};
use crate::types::FieldKind;

/// Result of building a dialog
#[derive(Debug, Clone, Default)]
pub struct BuiltUi {
    pub tree: ConfigTree,
    /// Text of the `PostConfigMessage` element, shown after configuring
    pub post_config_message: Option<String>,
}

/// Builder state shared by the element factories
pub struct TreeBuilder<'a> {
    tree: ConfigTree,
    registry: &'a ElementRegistry,
    engine: &'a ExpressionEngine,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(registry: &'a ElementRegistry, engine: &'a ExpressionEngine) -> Self {
        Self {
            tree: ConfigTree::new(),
            registry,
            engine,
        }
    }

    /// Build every top-level tab of a document
    pub fn build(mut self, doc: &SchemaDocument) -> Result<BuiltUi> {
        if doc.top_level().is_empty() {
            return Err(ConfigError::Schema("No CONFIG.UI data".to_string()));
        }

        let mut post_config_message = None;
        for el in doc.top_level() {
            match el.tag() {
                Some(ElementTag::PostConfigMessage) => {
                    post_config_message = el.value.clone();
                }
                Some(tag) if tag.is_tab() => match self.registry.get(tag) {
                    Some(info) => {
                        (info.factory)(&mut self, el, None)?;
                    }
                    None => tracing::debug!("No factory registered for {}", tag),
                },
                _ => tracing::debug!("Ignoring top-level element {}", el.element),
            }
        }

        if self.tree.tabs().is_empty() {
            return Err(ConfigError::Schema(
                "Configuration UI data has no usable tabs".to_string(),
            ));
        }

        tracing::debug!(
            "Built {} tabs ({} items, {} compiled expressions)",
            self.tree.tabs().len(),
            self.tree.len(),
            self.engine.cached_expressions()
        );

        Ok(BuiltUi {
            tree: self.tree,
            post_config_message,
        })
    }

    /// Build the children of a tab or group
    pub fn build_children(&mut self, el: &SchemaElement, parent: NodeId) -> Result<()> {
        for child in &el.children {
            match self.registry.lookup(&child.element) {
                Some(info) if !info.tag.is_tab() => {
                    (info.factory)(self, child, Some(parent))?;
                }
                _ => tracing::debug!(
                    "Skipping unknown element {} in {}",
                    child.element,
                    el.display_name()
                ),
            }
        }
        Ok(())
    }

    fn compile(&self, el: &SchemaElement, source: Option<&str>) -> Option<CompiledExpression> {
        let source = source?.trim();
        if source.is_empty() {
            return None;
        }
        match self.engine.compile(&el.display_name(), source) {
            Ok(expr) => Some(expr),
            Err(e) => {
                tracing::warn!("Ignoring condition: {}", e);
                None
            }
        }
    }

    /// Create an item with the attributes every element shares
    fn base_item(&self, el: &SchemaElement, kind: ItemKind, tag: ElementTag) -> ConfigItem {
        let mut item = ConfigItem::new(kind, tag, el.label.clone().unwrap_or_default());
        item.id = el.config_id;
        item.tooltip = el.tooltip.clone();
        item.advanced = el.advanced;
        item.default_checked = el.checked.unwrap_or(false);
        item.condition = Condition {
            enable_if: self.compile(el, el.enable_if.as_deref()),
            disable_if: self.compile(el, el.disable_if.as_deref()),
        };
        item
    }

    fn add(&mut self, item: ConfigItem, parent: Option<NodeId>) -> Result<NodeId> {
        let node = self.tree.add(item, parent)?;
        self.tree.set_to_default(node);
        Ok(node)
    }
}

/// Map a field tag to its data type
pub fn field_kind(tag: ElementTag) -> Option<FieldKind> {
    match tag {
        ElementTag::BooleanField => Some(FieldKind::Boolean),
        ElementTag::IntField | ElementTag::CheckIntField => Some(FieldKind::Integer),
        ElementTag::UIntField | ElementTag::CheckUIntField => Some(FieldKind::Unsigned),
        ElementTag::FloatField | ElementTag::CheckFloatField => Some(FieldKind::Float),
        ElementTag::TextField | ElementTag::CheckTextField => Some(FieldKind::Text),
        ElementTag::EnumField | ElementTag::CheckEnumField => Some(FieldKind::Enum),
        ElementTag::DateTimeField => Some(FieldKind::DateTime),
        ElementTag::TimeField => Some(FieldKind::Time),
        _ => None,
    }
}

// ==== Factories ====

pub fn build_tab(
    b: &mut TreeBuilder<'_>,
    el: &SchemaElement,
    parent: Option<NodeId>,
) -> Result<Option<NodeId>> {
    let Some(tag) = el.tag() else {
        return Ok(None);
    };
    let Some(kind) = TabKind::from_tag(tag) else {
        return Ok(None);
    };
    let mut item = b.base_item(el, ItemKind::Tab(kind), tag);
    if item.label.is_empty() {
        item.label = match kind {
            TabKind::Fields => "General",
            TabKind::DeviceInfo => "Device Info",
            TabKind::FactoryCalibration => "Factory Calibration",
            TabKind::UserCalibration => "User Calibration",
            TabKind::WiFiSelection => "Wi-Fi",
        }
        .to_string();
    }
    let node = b.add(item, parent)?;
    if kind == TabKind::Fields {
        b.build_children(el, node)?;
    }
    Ok(Some(node))
}

pub fn build_group(
    b: &mut TreeBuilder<'_>,
    el: &SchemaElement,
    parent: Option<NodeId>,
) -> Result<Option<NodeId>> {
    let Some(tag) = el.tag() else {
        return Ok(None);
    };
    let item = b.base_item(el, ItemKind::Group, tag);
    let node = b.add(item, parent)?;
    b.build_children(el, node)?;
    Ok(Some(node))
}

pub fn build_field(
    b: &mut TreeBuilder<'_>,
    el: &SchemaElement,
    parent: Option<NodeId>,
) -> Result<Option<NodeId>> {
    let Some((tag, kind)) = el.tag().and_then(|t| field_kind(t).map(|k| (t, k))) else {
        return Ok(None);
    };
    if el.config_id.is_none() {
        tracing::warn!("{} has no config ID, skipping", el.display_name());
        return Ok(None);
    }

    let mut item = b.base_item(el, ItemKind::Field(kind), tag);
    item.units = el.units.clone();
    item.default = el.default.clone();
    item.options = el.options.clone();
    item.min = el.min;
    item.max = el.max;
    item.transform = DisplayTransform::from_hints(
        &el.display_name(),
        el.display_format.as_deref(),
        el.value_format.as_deref(),
        el.gain,
        el.offset,
        b.engine,
    );
    b.add(item, parent).map(Some)
}

/// Build a dialog's tree using `registry`
pub fn build_ui(
    doc: &SchemaDocument,
    registry: &ElementRegistry,
    engine: &ExpressionEngine,
) -> Result<BuiltUi> {
    TreeBuilder::new(registry, engine).build(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConfigValue;

    fn doc(children: Vec<SchemaElement>) -> SchemaDocument {
        let mut root = SchemaElement::new("ConfigUI");
        root.children = children;
        SchemaDocument::from_root(root).unwrap()
    }

    #[test]
    fn test_empty_schema_fails() {
        let engine = ExpressionEngine::new();
        let err = build_ui(&doc(vec![]), &ElementRegistry::with_defaults(), &engine).unwrap_err();
        assert!(matches!(err, ConfigError::Schema(_)));

        let only_unknown = doc(vec![SchemaElement::new("Bogus")]);
        assert!(build_ui(&only_unknown, &ElementRegistry::with_defaults(), &engine).is_err());
    }

    #[test]
    fn test_builds_tabs_fields_and_message() {
        let engine = ExpressionEngine::new();
        let mut message = SchemaElement::new("PostConfigMessage");
        message.value = Some("Unplug me".into());
        let tab = SchemaElement::new("Tab")
            .with_label("General")
            .with_child(
                SchemaElement::new("IntField")
                    .with_label("Rate")
                    .with_id(0x10)
                    .with_default(100i64),
            )
            .with_child(SchemaElement::new("Spacer"))
            .with_child(
                SchemaElement::new("CheckGroup")
                    .with_label("Trigger")
                    .with_child(SchemaElement::new("FloatField").with_id(0x11)),
            );
        let info = SchemaElement::new("DeviceInfoTab");

        let built = build_ui(
            &doc(vec![tab, message, info]),
            &ElementRegistry::with_defaults(),
            &engine,
        )
        .unwrap();

        assert_eq!(built.tree.tabs().len(), 2);
        assert_eq!(built.post_config_message.as_deref(), Some("Unplug me"));
        let rate = built.tree.node(0x10).unwrap();
        assert_eq!(built.tree.item(rate).raw(), Some(&ConfigValue::Int(100)));
        let trig = built.tree.node(0x11).unwrap();
        let group = built.tree.item(trig).parent.unwrap();
        assert_eq!(built.tree.item(group).tag, ElementTag::CheckGroup);
        assert_eq!(built.tree.item(built.tree.tabs()[1]).label, "Device Info");
    }

    #[test]
    fn test_duplicate_ids_fail() {
        let engine = ExpressionEngine::new();
        let tab = SchemaElement::new("Tab")
            .with_child(SchemaElement::new("IntField").with_id(1))
            .with_child(SchemaElement::new("IntField").with_id(1));
        assert!(build_ui(&doc(vec![tab]), &ElementRegistry::with_defaults(), &engine).is_err());
    }

    #[test]
    fn test_unregistered_field_is_skipped() {
        let engine = ExpressionEngine::new();
        let mut registry = ElementRegistry::new();
        registry.register_tabs();
        let tab = SchemaElement::new("Tab").with_child(SchemaElement::new("IntField").with_id(1));
        let built = build_ui(&doc(vec![tab]), &registry, &engine).unwrap();
        assert!(built.tree.node(1).is_none());
    }
}
