//! Rhai Expression Engine Implementation
//!
//! Evaluates enable conditions and display transforms against a read-only
//! view of the dialog's display values.

use crate::error::{ConfigError, Result};
use crate::scripting::{CompiledExpression, ExpressionCache};
use crate::types::{ConfigId, ConfigValue};
use rhai::{Dynamic, Engine, Scope};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Read-only view of display values, indexed by config ID from expressions
///
/// `Config[0x18ff7f]` yields the display value, or `()` (`null`) when the
/// field is absent or has no effective value.
#[derive(Debug, Clone, Default)]
pub struct ConfigView {
    values: Arc<HashMap<ConfigId, ConfigValue>>,
}

impl ConfigView {
    pub fn new(values: HashMap<ConfigId, ConfigValue>) -> Self {
        Self {
            values: Arc::new(values),
        }
    }

    /// Look up a display value
    pub fn get(&self, id: ConfigId) -> Option<&ConfigValue> {
        self.values.get(&id)
    }

    /// Replace or remove a value
    pub fn set(&mut self, id: ConfigId, value: Option<ConfigValue>) {
        let values = Arc::make_mut(&mut self.values);
        match value {
            Some(v) => {
                values.insert(id, v);
            }
            None => {
                values.remove(&id);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn index(&mut self, id: i64) -> Dynamic {
        u32::try_from(id)
            .ok()
            .and_then(|id| self.values.get(&id))
            .map(ConfigValue::to_dynamic)
            .unwrap_or(Dynamic::UNIT)
    }
}

/// The expression engine used by a configuration dialog
pub struct ExpressionEngine {
    /// The Rhai engine instance
    engine: Engine,
    /// Cache of compiled expressions
    cache: RwLock<ExpressionCache>,
}

impl ExpressionEngine {
    /// Create a new expression engine with default configuration
    pub fn new() -> Self {
        let mut engine = Engine::new();
        Self::configure_engine(&mut engine);

        Self {
            engine,
            cache: RwLock::new(ExpressionCache::new()),
        }
    }

    /// Configure the Rhai engine with the config view type and safety limits
    fn configure_engine(engine: &mut Engine) {
        engine.set_max_expr_depths(32, 32);
        engine.set_max_call_levels(16);
        engine.set_max_operations(10_000);
        engine.set_max_string_size(10_000);

        engine.register_type_with_name::<ConfigView>("ConfigView");
        engine.register_indexer_get(ConfigView::index);
    }

    /// Compile an expression, reusing a cached copy when possible
    pub fn compile(&self, name: &str, source: &str) -> Result<CompiledExpression> {
        let mut cache = self.cache.write().map_err(|e| {
            ConfigError::Expression(format!("Failed to acquire cache lock: {}", e))
        })?;

        cache.get_or_compile(&self.engine, name, source)
    }

    fn scope(view: &ConfigView) -> Scope<'static> {
        let mut scope = Scope::new();
        scope.push_constant("null", ());
        scope.push("Config", view.clone());
        scope
    }

    /// Evaluate an expression to a raw Rhai value
    fn eval(
        &self,
        expr: &CompiledExpression,
        view: &ConfigView,
        x: Option<&ConfigValue>,
    ) -> Result<Dynamic> {
        let mut scope = Self::scope(view);
        if let Some(x) = x {
            scope.push("x", x.to_dynamic());
        }

        self.engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, expr.ast())
            .map_err(|e| ConfigError::Expression(format!("{}: {}", expr.name(), e)))
    }

    /// Evaluate a condition; non-boolean results use value truthiness
    pub fn eval_condition(&self, expr: &CompiledExpression, view: &ConfigView) -> Result<bool> {
        let result = self.eval(expr, view, None)?;
        if let Ok(b) = result.as_bool() {
            return Ok(b);
        }
        Ok(ConfigValue::from_dynamic(&result).is_some_and(|v| v.is_truthy()))
    }

    /// Evaluate a transform of `x`; a `null` result yields `None`
    pub fn eval_transform(
        &self,
        expr: &CompiledExpression,
        x: &ConfigValue,
        view: &ConfigView,
    ) -> Result<Option<ConfigValue>> {
        let result = self.eval(expr, view, Some(x))?;
        if !result.is_unit() && ConfigValue::from_dynamic(&result).is_none() {
            return Err(ConfigError::Expression(format!(
                "{}: unsupported result type {}",
                expr.name(),
                result.type_name()
            )));
        }
        Ok(ConfigValue::from_dynamic(&result))
    }

    /// Validate an expression without evaluating it
    pub fn validate(&self, source: &str) -> Result<()> {
        self.engine
            .compile_expression(source)
            .map(|_| ())
            .map_err(|e| ConfigError::Expression(format!("Validation error: {}", e)))
    }

    /// Number of distinct compiled expressions
    pub fn cached_expressions(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }
}

impl Default for ExpressionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExpressionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpressionEngine")
            .field("cache_size", &self.cached_expressions())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(entries: &[(ConfigId, ConfigValue)]) -> ConfigView {
        ConfigView::new(entries.iter().cloned().collect())
    }

    #[test]
    fn test_condition_reads_config_view() {
        let engine = ExpressionEngine::new();
        let expr = engine
            .compile("trigger", "Config[0x10ff7f] == true")
            .unwrap();

        let on = view(&[(0x10ff7f, ConfigValue::Bool(true))]);
        let off = view(&[(0x10ff7f, ConfigValue::Bool(false))]);
        assert!(engine.eval_condition(&expr, &on).unwrap());
        assert!(!engine.eval_condition(&expr, &off).unwrap());
    }

    #[test]
    fn test_missing_value_is_null() {
        let engine = ExpressionEngine::new();
        let expr = engine.compile("absent", "Config[0x1234] == null").unwrap();
        assert!(engine.eval_condition(&expr, &ConfigView::default()).unwrap());
    }

    #[test]
    fn test_condition_truthiness() {
        let engine = ExpressionEngine::new();
        let expr = engine.compile("count", "Config[5]").unwrap();
        assert!(engine
            .eval_condition(&expr, &view(&[(5, ConfigValue::Int(3))]))
            .unwrap());
        assert!(!engine
            .eval_condition(&expr, &view(&[(5, ConfigValue::Int(0))]))
            .unwrap());
        assert!(!engine.eval_condition(&expr, &ConfigView::default()).unwrap());
    }

    #[test]
    fn test_transform_uses_x() {
        let engine = ExpressionEngine::new();
        let expr = engine.compile("rate", "1.0 / x").unwrap();
        let result = engine
            .eval_transform(&expr, &ConfigValue::Float(0.5), &ConfigView::default())
            .unwrap();
        assert_eq!(result, Some(ConfigValue::Float(2.0)));
    }

    #[test]
    fn test_compile_error() {
        let engine = ExpressionEngine::new();
        assert!(engine.compile("bad", "Config[").is_err());
        assert!(engine.validate("x +").is_err());
    }

    #[test]
    fn test_cache_reuses_expressions() {
        let engine = ExpressionEngine::new();
        engine.compile("a", "x * 2").unwrap();
        engine.compile("b", "x * 2").unwrap();
        assert_eq!(engine.cached_expressions(), 1);
    }

    #[test]
    fn test_cached_expression_keeps_caller_name() {
        let engine = ExpressionEngine::new();
        let first = engine.compile("Sample Rate", "x.missing()").unwrap();
        let second = engine.compile("Trigger Level", "x.missing()").unwrap();
        assert_eq!(first.name(), "Sample Rate");
        assert_eq!(second.name(), "Trigger Level");

        let err = engine
            .eval_transform(&second, &ConfigValue::Int(1), &ConfigView::default())
            .unwrap_err();
        assert!(err.to_string().contains("Trigger Level"), "{}", err);
    }
}
