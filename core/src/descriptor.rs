//! Descriptor trees as sent by the backend, and descriptors as stored after registration.
//!
//! A [`DescriptorTree`] may own nested inline descriptors in its children and slot
//! children. Registration flattens those into separate [`Descriptor`]s referenced by id,
//! so a stored [`Node`] can only hold [`Child::Id`] or [`Child::Text`].

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::id::ComponentId;
use crate::prop::{EventHandler, PropValue};

/// Name of the event dispatched once when an instance is first assembled.
pub const LOAD_EVENT: &str = "load";

// ============================================================================
// Wire shape
// ============================================================================

/// A descriptor as it arrives from the backend.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DescriptorTree {
    /// Backend-assigned identity, stable across refreshes.
    pub id: ComponentId,
    /// Component kind, classes, props, events and children.
    #[serde(flatten)]
    pub node: TreeNode,
    /// Named slots.
    #[serde(default)]
    pub slots: BTreeMap<String, SlotTree>,
    /// Literal text; a node with text and no component kind registers as a text entry.
    #[serde(default)]
    pub text: Option<String>,
}

/// A named slot as it arrives from the backend.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SlotTree {
    /// Name of the per-invocation argument, for scoped slots.
    #[serde(default)]
    pub scope: Option<String>,
    /// Slot wrapper and content.
    #[serde(flatten)]
    pub node: TreeNode,
}

/// Fields shared by descriptors and slots on the wire.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TreeNode {
    /// Component kind (tag). `None` renders an empty placeholder.
    #[serde(default)]
    pub component: Option<String>,
    /// Class list, rendered verbatim.
    #[serde(default, deserialize_with = "classes")]
    pub classes: Option<String>,
    /// Props by name.
    #[serde(default)]
    pub props: BTreeMap<String, PropValue>,
    /// Events by name. Handlers of no known shape are dropped.
    #[serde(default, deserialize_with = "events")]
    pub events: BTreeMap<String, EventHandler>,
    /// Ordered children.
    #[serde(default)]
    pub children: Vec<TreeChild>,
}

/// A child entry on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum TreeChild {
    /// Reference to a descriptor registered separately.
    Id(ComponentId),
    /// Literal text or markup, passed through verbatim.
    Text(String),
    /// Nested descriptor, flattened on registration.
    Inline(Box<DescriptorTree>),
    /// A value of no known child shape; dropped on registration.
    Unsupported(Value),
}

impl<'de> Deserialize<'de> for TreeChild {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::Number(ref number) => number
                .as_u64()
                .map_or(Self::Unsupported(value.clone()), |raw| {
                    Self::Id(ComponentId::new(raw))
                }),
            Value::String(text) => Self::Text(text),
            Value::Object(_) => match DescriptorTree::deserialize(&value) {
                Ok(tree) => Self::Inline(Box::new(tree)),
                Err(_) => Self::Unsupported(value),
            },
            other => Self::Unsupported(other),
        })
    }
}

/// Accepts a class string or a list of class names.
fn classes<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let classes = match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(classes)) => Some(classes),
        Some(Value::Array(items)) => Some(
            items
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(" "),
        ),
        Some(other) => Some(other.to_string()),
    };
    Ok(classes.filter(|c| !c.is_empty()))
}

/// Decodes handlers one by one so a malformed entry does not reject the whole tree.
fn events<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<BTreeMap<String, EventHandler>, D::Error> {
    let map = match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => return Ok(BTreeMap::new()),
        Some(Value::Object(map)) => map,
        Some(other) => {
            warn!(%other, "events must be an object, ignoring them");
            return Ok(BTreeMap::new());
        }
    };
    Ok(map
        .into_iter()
        .filter_map(|(event, value)| match EventHandler::deserialize(&value) {
            Ok(handler) => Some((event, handler)),
            Err(err) => {
                warn!(event, "dropping event handler: {err}");
                None
            }
        })
        .collect())
}

// ============================================================================
// Registered shape
// ============================================================================

/// A child entry after registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Child {
    /// Reference to a registered descriptor.
    Id(ComponentId),
    /// Literal text or markup.
    Text(String),
}

/// Fields shared by stored descriptors and slots.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Node {
    /// Component kind (tag).
    pub component: Option<String>,
    /// Class list.
    pub classes: Option<String>,
    /// Props by name.
    pub props: BTreeMap<String, PropValue>,
    /// Events by name.
    pub events: BTreeMap<String, EventHandler>,
    /// Ordered children: ids or literal text only.
    pub children: Vec<Child>,
}

/// A named slot after registration.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Slot {
    /// Name of the per-invocation argument, for scoped slots.
    pub scope: Option<String>,
    /// Slot wrapper and content.
    pub node: Node,
}

impl Slot {
    /// Returns `true` for scoped slots.
    #[must_use]
    pub const fn is_scoped(&self) -> bool {
        self.scope.is_some()
    }
}

/// A descriptor after registration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Descriptor {
    /// Backend-assigned identity.
    pub id: ComponentId,
    /// Component kind, classes, props, events and children.
    pub node: Node,
    /// Named slots.
    pub slots: BTreeMap<String, Slot>,
}

impl Descriptor {
    /// Returns the handler of the `load` event, if any.
    #[must_use]
    pub fn load_handler(&self) -> Option<&EventHandler> {
        self.node.events.get(LOAD_EVENT)
    }
}
