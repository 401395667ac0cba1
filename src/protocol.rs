//! Messages sent by the host to the core.
//!
//! Every message is one JSON object tagged by `type`:
//!
//! ```json
//! {"type": "setRoot", "tree": {"id": 1, "component": "q-page"}}
//! {"type": "setSecondaryRoot", "tree": false}
//! {"type": "applyDataPatch", "patches": [{"id": "m1", "path": ["a"], "value": 2}]}
//! {"type": "setComputedResult", "id": "total", "serializedArgs": "[1,2]", "value": 3}
//! {"type": "registerShortcut", "combo": "ctrl+s", "callback": 4}
//! {"type": "refreshComponent", "tree": {"id": 1, "component": "q-page"}}
//! {"type": "invokeMethod", "id": 3, "method": "focus", "args": []}
//! ```

use aqueduct_core::{CallbackId, ComponentId, ComputedId, DescriptorTree, ModelId, Path};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::shortcut::KeyCombo;

/// One host to core call.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HostMessage {
    /// Register a tree and make it the root.
    SetRoot {
        /// Root descriptor tree.
        tree: DescriptorTree,
    },
    /// Register a tree and make it the overlay, or clear the overlay with `false`.
    SetSecondaryRoot {
        /// Overlay tree, `None` to clear.
        #[serde(deserialize_with = "tree_or_false")]
        tree: Option<DescriptorTree>,
    },
    /// Backend-side model changes.
    ApplyDataPatch {
        /// Patches, applied in order.
        patches: Vec<DataPatch>,
    },
    /// Backend-pushed computed result.
    #[serde(rename_all = "camelCase")]
    SetComputedResult {
        /// Computed id.
        id: ComputedId,
        /// Serialized argument tuple.
        serialized_args: String,
        /// Result.
        value: Value,
    },
    /// Bind a key combination to a callback.
    RegisterShortcut {
        /// Key combination.
        combo: KeyCombo,
        /// Callback to dispatch.
        callback: CallbackId,
    },
    /// Re-register a tree, replacing existing entries.
    RefreshComponent {
        /// Refreshed descriptor tree.
        tree: DescriptorTree,
    },
    /// Invoke a method on a mounted instance.
    InvokeMethod {
        /// Target component.
        id: ComponentId,
        /// Method name.
        method: String,
        /// Arguments.
        #[serde(default)]
        args: Vec<Value>,
    },
}

/// A backend-side model change.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DataPatch {
    /// Target model.
    pub id: ModelId,
    /// Location inside the model; empty replaces the whole value.
    #[serde(default)]
    pub path: Path,
    /// New value.
    pub value: Value,
}

fn tree_or_false<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DescriptorTree>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Bool(false) | Value::Null => Ok(None),
        value => DescriptorTree::deserialize(value)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use aqueduct_core::{ComponentId, ModelId, PathKey};
    use serde_json::json;

    use super::{DataPatch, HostMessage};

    fn decode(value: serde_json::Value) -> HostMessage {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn decodes_secondary_root() {
        assert_eq!(
            decode(json!({"type": "setSecondaryRoot", "tree": false})),
            HostMessage::SetSecondaryRoot { tree: None }
        );
        let HostMessage::SetSecondaryRoot { tree: Some(tree) } =
            decode(json!({"type": "setSecondaryRoot", "tree": {"id": 5, "component": "q-dialog"}}))
        else {
            panic!("expected an overlay tree");
        };
        assert_eq!(tree.id, ComponentId::new(5));
    }

    #[test]
    fn decodes_patches_and_results() {
        assert_eq!(
            decode(json!({"type": "applyDataPatch", "patches": [{"id": 1, "path": ["a", 0], "value": true}, {"id": "m", "value": 2}]})),
            HostMessage::ApplyDataPatch {
                patches: vec![
                    DataPatch {
                        id: ModelId::new("1"),
                        path: vec![PathKey::from("a"), PathKey::from(0)],
                        value: json!(true),
                    },
                    DataPatch {
                        id: ModelId::new("m"),
                        path: Vec::new(),
                        value: json!(2),
                    },
                ]
            }
        );
        assert!(matches!(
            decode(json!({"type": "setComputedResult", "id": "c", "serializedArgs": "[1]", "value": 2})),
            HostMessage::SetComputedResult { serialized_args, .. } if serialized_args == "[1]"
        ));
        assert!(matches!(
            decode(json!({"type": "registerShortcut", "combo": "Shift+Ctrl+P", "callback": 3})),
            HostMessage::RegisterShortcut { combo, .. } if combo.as_str() == "ctrl+shift+p"
        ));
    }

    #[test]
    fn rejects_unknown_messages() {
        assert!(serde_json::from_value::<HostMessage>(json!({"type": "reboot"})).is_err());
        assert!(serde_json::from_value::<HostMessage>(json!({"type": "setRoot"})).is_err());
    }
}
