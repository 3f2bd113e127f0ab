//! Display transforms between raw (native) values and displayed values

use crate::error::Result;
use crate::scripting::{CompiledExpression, ConfigView, ExpressionEngine};
use crate::types::ConfigValue;

/// How a field's raw value is presented to the user
#[derive(Debug, Clone, Default)]
pub enum DisplayTransform {
    /// Raw and displayed values are the same
    #[default]
    Identity,
    /// `display = (raw + offset) * gain`, `raw = display / gain - offset`
    Linear { gain: f64, offset: f64 },
    /// Expression pair; a missing direction passes values through unchanged
    Expression {
        to_display: Option<CompiledExpression>,
        to_raw: Option<CompiledExpression>,
    },
    /// The field never contributes a value (empty `display_format`)
    NoValue,
}

impl DisplayTransform {
    /// Build a transform from a field's hint attributes
    ///
    /// Expressions take precedence over `gain`/`offset`. An expression that
    /// fails to compile is logged and that direction falls back to identity.
    pub fn from_hints(
        name: &str,
        display_format: Option<&str>,
        value_format: Option<&str>,
        gain: Option<f64>,
        offset: Option<f64>,
        engine: &ExpressionEngine,
    ) -> Self {
        if display_format.is_some_and(|s| s.trim().is_empty()) {
            return DisplayTransform::NoValue;
        }

        if display_format.is_some() || value_format.is_some() {
            let compile = |source: Option<&str>| {
                source.and_then(|s| match engine.compile(name, s) {
                    Ok(expr) => Some(expr),
                    Err(e) => {
                        tracing::warn!("Ignoring transform for {}: {}", name, e);
                        None
                    }
                })
            };
            let to_display = compile(display_format);
            let to_raw = compile(value_format);
            if to_display.is_some() != to_raw.is_some() {
                tracing::warn!(
                    "{} has a one-way transform; the other direction is unchanged",
                    name
                );
            }
            return DisplayTransform::Expression { to_display, to_raw };
        }

        if gain.is_none() && offset.is_none() {
            return DisplayTransform::Identity;
        }

        let gain = gain.unwrap_or(1.0);
        if gain == 0.0 || !gain.is_finite() {
            tracing::warn!("{} has an unusable gain ({}), ignoring it", name, gain);
            return DisplayTransform::Identity;
        }
        DisplayTransform::Linear {
            gain,
            offset: offset.unwrap_or(0.0),
        }
    }

    /// False if the field never contributes a value
    pub fn contributes(&self) -> bool {
        !matches!(self, DisplayTransform::NoValue)
    }

    /// Convert a raw value into its displayed form
    pub fn to_display(
        &self,
        raw: &ConfigValue,
        engine: &ExpressionEngine,
        view: &ConfigView,
    ) -> Result<Option<ConfigValue>> {
        match self {
            DisplayTransform::Identity => Ok(Some(raw.clone())),
            DisplayTransform::NoValue => Ok(None),
            DisplayTransform::Linear { gain, offset } => Ok(Some(match raw.as_f64() {
                Some(x) => ConfigValue::Float((x + offset) * gain),
                None => raw.clone(),
            })),
            DisplayTransform::Expression { to_display, .. } => match to_display {
                Some(expr) => engine.eval_transform(expr, raw, view),
                None => Ok(Some(raw.clone())),
            },
        }
    }

    /// Convert a displayed value back into native units
    pub fn to_raw(
        &self,
        display: &ConfigValue,
        engine: &ExpressionEngine,
        view: &ConfigView,
    ) -> Result<Option<ConfigValue>> {
        match self {
            DisplayTransform::Identity => Ok(Some(display.clone())),
            DisplayTransform::NoValue => Ok(None),
            DisplayTransform::Linear { gain, offset } => Ok(Some(match display.as_f64() {
                Some(x) => ConfigValue::Float(x / gain - offset),
                None => display.clone(),
            })),
            DisplayTransform::Expression { to_raw, .. } => match to_raw {
                Some(expr) => engine.eval_transform(expr, display, view),
                None => Ok(Some(display.clone())),
            },
        }
    }
}
