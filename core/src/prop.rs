//! Prop values and event handlers.
//!
//! Both are closed variant sets decoded once, when a descriptor tree crosses the host
//! boundary. Reserved tags start with `$`, which no legitimate prop name does:
//!
//! ```json
//! { "$model": "m1", "path": ["a", 1], "modifiers": ["trim"], "initial": "hi" }
//! { "$var": "row", "path": ["name"] }
//! { "$expr": "items.length > 0" }
//! ```
//!
//! Anything else is a [`PropValue::Literal`]. Values that look tagged but are malformed
//! are kept as literals so they still render as a serialized attribute.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::id::{CallbackId, ModelId};
use crate::path::{Path, PathKey};

/// Tag of a model reference.
pub const MODEL_TAG: &str = "$model";
/// Tag of a scoped-variable reference.
pub const SCOPED_TAG: &str = "$var";
/// Tag of a raw host expression.
pub const EXPRESSION_TAG: &str = "$expr";

/// Binding modifiers attached to a model or scoped reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Modifiers(Vec<String>);

impl Modifiers {
    /// Strip surrounding whitespace from string payloads.
    pub const TRIM: &'static str = "trim";
    /// Parse numeric strings into numbers.
    pub const NUMBER: &'static str = "number";
    /// Commit on `change` instead of `input`.
    pub const LAZY: &'static str = "lazy";

    /// Creates a modifier set, dropping duplicates while keeping order.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut list: Vec<String> = Vec::new();
        for name in names {
            let name = name.into();
            if !list.contains(&name) {
                list.push(name);
            }
        }
        Self(list)
    }

    /// Returns `true` when the modifier is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|m| m == name)
    }

    /// Returns `true` when there are no modifiers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the modifier names in order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Applies the payload-transforming modifiers to a value coming from the UI.
    #[must_use]
    pub fn apply(&self, value: Value) -> Value {
        let value = match value {
            Value::String(text) if self.contains(Self::TRIM) => Value::String(text.trim().to_owned()),
            other => other,
        };
        match value {
            Value::String(text) if self.contains(Self::NUMBER) => parse_number(&text)
                .map_or(Value::String(text), Value::Number),
            other => other,
        }
    }
}

fn parse_number(text: &str) -> Option<serde_json::Number> {
    let text = text.trim();
    if let Ok(int) = text.parse::<i64>() {
        return Some(int.into());
    }
    text.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
}

/// Reference to a globally stored, backend-synchronized value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelRef {
    /// Referenced model.
    pub model: ModelId,
    /// Location inside the model value.
    pub path: Path,
    /// Binding modifiers.
    pub modifiers: Modifiers,
    /// Value used to seed the store when the model is unseen.
    pub initial: Option<Value>,
}

/// Reference to a caller-scoped variable, such as a scoped-slot argument.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopedRef {
    /// Name of the scoped variable.
    pub variable: String,
    /// Location inside the variable's value.
    pub path: Path,
    /// Binding modifiers.
    pub modifiers: Modifiers,
}

/// A prop value after decoding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PropValue {
    /// Plain JSON: string, number, bool, null, or a composite without a reserved tag.
    Literal(Value),
    /// Bound to the data store.
    Model(ModelRef),
    /// Bound to a caller-scoped variable.
    Scoped(ScopedRef),
    /// Verbatim, trusted host expression.
    Expression(String),
}

impl PropValue {
    /// Decodes a wire value, falling back to [`PropValue::Literal`] for unsupported shapes.
    #[must_use]
    pub fn from_wire(value: Value) -> Self {
        let Value::Object(map) = value else {
            return Self::Literal(value);
        };
        match decode_tagged(&map) {
            Ok(Some(prop)) => prop,
            Ok(None) => Self::Literal(Value::Object(map)),
            Err(reason) => {
                debug!(%reason, "tagged prop did not decode, keeping it as a literal");
                Self::Literal(Value::Object(map))
            }
        }
    }
}

impl<'de> Deserialize<'de> for PropValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from_wire)
    }
}

/// Returns `Ok(None)` for untagged objects and `Err` for malformed tagged ones.
fn decode_tagged(map: &Map<String, Value>) -> Result<Option<PropValue>, String> {
    if let Some(model) = map.get(MODEL_TAG) {
        let model = ModelId::from_value(model)
            .ok_or_else(|| format!("`{MODEL_TAG}` must be a string or integer, got {model}"))?;
        return Ok(Some(PropValue::Model(ModelRef {
            model,
            path: decode_path(map)?,
            modifiers: decode_modifiers(map)?,
            initial: map.get("initial").cloned(),
        })));
    }
    if let Some(variable) = map.get(SCOPED_TAG) {
        let Value::String(variable) = variable else {
            return Err(format!("`{SCOPED_TAG}` must be a string, got {variable}"));
        };
        return Ok(Some(PropValue::Scoped(ScopedRef {
            variable: variable.clone(),
            path: decode_path(map)?,
            modifiers: decode_modifiers(map)?,
        })));
    }
    if let Some(expression) = map.get(EXPRESSION_TAG) {
        let Value::String(expression) = expression else {
            return Err(format!("`{EXPRESSION_TAG}` must be a string, got {expression}"));
        };
        return Ok(Some(PropValue::Expression(expression.clone())));
    }
    if let Some(unknown) = map.keys().find(|key| key.starts_with('$')) {
        return Err(format!("unknown reserved key `{unknown}`"));
    }
    Ok(None)
}

fn decode_path(map: &Map<String, Value>) -> Result<Path, String> {
    match map.get("path") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(path) => Vec::<PathKey>::deserialize(path).map_err(|err| format!("invalid path: {err}")),
    }
}

fn decode_modifiers(map: &Map<String, Value>) -> Result<Modifiers, String> {
    match map.get("modifiers") {
        None | Some(Value::Null) => Ok(Modifiers::default()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(name) => Ok(name.clone()),
                other => Err(format!("modifier must be a string, got {other}")),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Modifiers::new),
        Some(other) => Err(format!("modifiers must be a list, got {other}")),
    }
}

/// Handler bound to a descriptor event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum EventHandler {
    /// Forward the event payload to a backend callback.
    Callback(CallbackId),
    /// Verbatim host expression.
    Expression(String),
}

impl<'de> Deserialize<'de> for EventHandler {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::Number(ref number) => number
                .as_u64()
                .map(|raw| Self::Callback(CallbackId::new(raw)))
                .ok_or_else(|| serde::de::Error::custom(format!("invalid callback id {value}"))),
            Value::String(expression) => Ok(Self::Expression(expression)),
            Value::Object(ref map) => match map.get(EXPRESSION_TAG) {
                Some(Value::String(expression)) => Ok(Self::Expression(expression.clone())),
                _ => Err(serde::de::Error::custom(format!(
                    "event handler object needs a string `{EXPRESSION_TAG}`"
                ))),
            },
            other => Err(serde::de::Error::custom(format!(
                "event handler must be a callback id or an expression, got {other}"
            ))),
        }
    }
}
