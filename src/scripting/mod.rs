//! Rhai Expressions for Enable Conditions and Display Transforms
//!
//! Configuration UI hints can attach small expressions to fields:
//!
//! - `enable_if` / `disable_if` - boolean expressions deciding whether a field
//!   (or group) is active
//! - `display_format` - converts the raw (native unit) value `x` into the
//!   value shown to the user
//! - `value_format` - converts a displayed value `x` back into native units
//!
//! ## Variables
//!
//! - `Config[id]` - the current display value of another field, or `null`
//!   if it is absent or disabled
//! - `null` - the "no value" constant
//! - `x` - the input value (transforms only)
//!
//! ## Example Expressions
//!
//! Only enable the trigger threshold when the trigger is on:
//! ```rhai
//! Config[0x10ff7f] != null && Config[0x10ff7f]
//! ```
//!
//! Show a sample period (seconds) as a rate (Hz):
//! ```rhai
//! 1.0 / x
//! ```

mod engine;
pub mod transform;

pub use engine::{ConfigView, ExpressionEngine};
pub use transform::DisplayTransform;

use crate::error::{ConfigError, Result};
use rhai::{Engine, AST};
use std::collections::HashMap;

/// A compiled expression that can be evaluated repeatedly
#[derive(Clone)]
pub struct CompiledExpression {
    /// The compiled AST
    ast: AST,
    /// The original source code
    source: String,
    /// Name used in log messages (label and config ID)
    name: String,
}

impl CompiledExpression {
    /// Get the source code of this expression
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Get the name of this expression
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn ast(&self) -> &AST {
        &self.ast
    }
}

impl std::fmt::Debug for CompiledExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledExpression")
            .field("name", &self.name)
            .field("source", &self.source)
            .finish()
    }
}

/// Cache for compiled expressions to avoid recompilation
///
/// Schemas repeat the same condition on many fields (every child of a
/// group gated by one checkbox, for instance).
#[derive(Default)]
pub struct ExpressionCache {
    /// Map from expression source to compiled expression
    cache: HashMap<String, CompiledExpression>,
}

impl ExpressionCache {
    /// Create a new empty cache
    pub fn new() -> Self {
        Self {
            cache: HashMap::new(),
        }
    }

    /// Get a cached expression or compile and cache it
    pub fn get_or_compile(
        &mut self,
        engine: &Engine,
        name: &str,
        source: &str,
    ) -> Result<CompiledExpression> {
        if let Some(expr) = self.cache.get(source) {
            // The AST is shared; the name belongs to the caller
            return Ok(CompiledExpression {
                name: name.to_string(),
                ..expr.clone()
            });
        }

        let ast = engine
            .compile_expression(source)
            .map_err(|e| ConfigError::Expression(format!("{}: {}", name, e)))?;

        let expr = CompiledExpression {
            ast,
            source: source.to_string(),
            name: name.to_string(),
        };

        self.cache.insert(source.to_string(), expr.clone());
        Ok(expr)
    }

    /// Number of cached expressions
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Clear the cache
    pub fn clear(&mut self) {
        self.cache.clear();
    }
}
