use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigurationError;

/// Where a middleware runs relative to the handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Before,
    After,
}

/// Declarative configuration attaching a named middleware to a handler.
///
/// Directives of the same phase run in ascending `ordinal` order; equal
/// ordinals keep their declaration order.
///
/// Directives deserialize from configuration:
///
/// ```
/// use relay_rust::pipeline::{MiddlewareDirective, Phase};
///
/// let directive = MiddlewareDirective::from_json(serde_json::json!({
///     "phase": "Before",
///     "ordinal": 1,
///     "middleware": "policy",
///     "params": ["retry"]
/// }))
/// .unwrap();
/// assert_eq!(directive.phase, Phase::Before);
/// assert_eq!(directive.params.len(), 1);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MiddlewareDirective {
    pub phase: Phase,
    pub ordinal: i32,
    pub middleware: String,
    /// Opaque init params handed to the middleware factory, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<Value>,
}

impl MiddlewareDirective {
    pub fn new(phase: Phase, ordinal: i32, middleware: impl Into<String>) -> Self {
        Self {
            phase,
            ordinal,
            middleware: middleware.into(),
            params: Vec::new(),
        }
    }

    pub fn before(ordinal: i32, middleware: impl Into<String>) -> Self {
        Self::new(Phase::Before, ordinal, middleware)
    }

    pub fn after(ordinal: i32, middleware: impl Into<String>) -> Self {
        Self::new(Phase::After, ordinal, middleware)
    }

    pub fn with_param(mut self, param: impl Into<Value>) -> Self {
        self.params.push(param.into());
        self
    }

    pub fn with_params<I, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.params.extend(params.into_iter().map(Into::into));
        self
    }

    /// Parse a directive from a JSON value.
    pub fn from_json(value: Value) -> Result<Self, ConfigurationError> {
        serde_json::from_value(value)
            .map_err(|e| ConfigurationError::InvalidDirective(e.to_string()))
    }

    /// Parse a list of directives from JSON text.
    pub fn list_from_str(text: &str) -> Result<Vec<Self>, ConfigurationError> {
        serde_json::from_str(text).map_err(|e| ConfigurationError::InvalidDirective(e.to_string()))
    }
}

/// Directives of one phase in execution order. The sort is stable.
pub(crate) fn ordered(
    directives: &[MiddlewareDirective],
    phase: Phase,
) -> Vec<&MiddlewareDirective> {
    let mut selected: Vec<&MiddlewareDirective> =
        directives.iter().filter(|d| d.phase == phase).collect();
    selected.sort_by_key(|d| d.ordinal);
    selected
}
