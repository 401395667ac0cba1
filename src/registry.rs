//! Registered descriptors, by id.
//!
//! Registration flattens a [`DescriptorTree`]: every inline descriptor found in
//! `children` or in a slot's children is registered on its own, depth first, and
//! replaced by its id before the parent is stored. Each stored entry carries a revision
//! that changes whenever the entry is stored again, which is how the render driver tells
//! an explicit refresh apart from an unrelated state change.

use std::collections::HashMap;

use aqueduct_core::{
    Child, ComponentId, Descriptor, DescriptorTree, Node, Slot, TreeChild, TreeNode,
};
use tracing::{debug, trace, warn};

/// A registered entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    /// A component descriptor.
    Component(Descriptor),
    /// Literal text registered under an id.
    Text(String),
}

#[derive(Debug)]
struct Stored {
    entry: Entry,
    revision: u64,
}

/// Session-scoped store of descriptors.
#[derive(Debug, Default)]
pub struct Registry {
    entries: HashMap<ComponentId, Stored>,
    next_revision: u64,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a descriptor tree and returns its id.
    ///
    /// Without `refresh`, an id that is already registered is left untouched, nested
    /// inline descriptors included. With `refresh`, the descriptor and every nested
    /// inline descriptor are stored again.
    pub fn register(&mut self, tree: DescriptorTree, refresh: bool) -> ComponentId {
        let id = tree.id;
        if !refresh && self.entries.contains_key(&id) {
            trace!(%id, "component already registered");
            return id;
        }
        self.store(tree, refresh);
        id
    }

    /// Returns the entry registered for `id`.
    #[must_use]
    pub fn get(&self, id: ComponentId) -> Option<&Entry> {
        self.entries.get(&id).map(|stored| &stored.entry)
    }

    /// Returns the descriptor registered for `id`, if it is a component.
    #[must_use]
    pub fn descriptor(&self, id: ComponentId) -> Option<&Descriptor> {
        match self.get(id)? {
            Entry::Component(descriptor) => Some(descriptor),
            Entry::Text(_) => None,
        }
    }

    /// Returns the revision of the entry registered for `id`.
    #[must_use]
    pub fn revision(&self, id: ComponentId) -> Option<u64> {
        self.entries.get(&id).map(|stored| stored.revision)
    }

    /// Returns `true` when `id` is registered.
    #[must_use]
    pub fn contains(&self, id: ComponentId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Number of registered entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn store(&mut self, tree: DescriptorTree, refresh: bool) {
        let DescriptorTree {
            id,
            node,
            slots,
            text,
        } = tree;

        let entry = match (node.component.is_none(), text) {
            (true, Some(text)) => Entry::Text(text),
            _ => {
                let node = self.flatten(id, node, refresh);
                let slots = slots
                    .into_iter()
                    .map(|(name, slot)| {
                        let node = self.flatten(id, slot.node, refresh);
                        (
                            name,
                            Slot {
                                scope: slot.scope,
                                node,
                            },
                        )
                    })
                    .collect();
                Entry::Component(Descriptor { id, node, slots })
            }
        };

        self.next_revision += 1;
        debug!(%id, revision = self.next_revision, refresh, "component stored");
        self.entries.insert(
            id,
            Stored {
                entry,
                revision: self.next_revision,
            },
        );
    }

    fn flatten(&mut self, owner: ComponentId, node: TreeNode, refresh: bool) -> Node {
        let TreeNode {
            component,
            classes,
            props,
            events,
            children: tree_children,
        } = node;

        let mut children = Vec::with_capacity(tree_children.len());
        for child in tree_children {
            match child {
                TreeChild::Id(id) => children.push(Child::Id(id)),
                TreeChild::Text(text) => children.push(Child::Text(text)),
                TreeChild::Inline(tree) => children.push(Child::Id(self.register(*tree, refresh))),
                TreeChild::Unsupported(value) => {
                    warn!(%owner, %value, "dropping child of unsupported shape");
                }
            }
        }

        Node {
            component,
            classes,
            props,
            events,
            children,
        }
    }
}

#[cfg(test)]
mod tests {
    use aqueduct_core::{Child, ComponentId, DescriptorTree};
    use serde_json::{Value, json};

    use super::{Entry, Registry};

    fn tree(value: Value) -> DescriptorTree {
        serde_json::from_value(value).unwrap()
    }

    fn component(registry: &Registry, id: u64) -> &aqueduct_core::Descriptor {
        registry.descriptor(ComponentId::new(id)).unwrap()
    }

    #[test]
    fn second_plain_registration_is_ignored() {
        let mut registry = Registry::new();
        registry.register(tree(json!({"id": 1, "component": "div", "classes": "a"})), false);
        registry.register(
            tree(json!({"id": 1, "component": "span", "children": [{"id": 2, "component": "b"}]})),
            false,
        );

        assert_eq!(component(&registry, 1).node.component.as_deref(), Some("div"));
        assert!(!registry.contains(ComponentId::new(2)));
        assert_eq!(registry.revision(ComponentId::new(1)), Some(1));
    }

    #[test]
    fn refresh_replaces_nested_descriptors() {
        let mut registry = Registry::new();
        registry.register(
            tree(json!({"id": 1, "component": "div", "children": [{"id": 2, "component": "b", "classes": "old"}]})),
            false,
        );
        let before = registry.revision(ComponentId::new(2));

        registry.register(
            tree(json!({
                "id": 1,
                "component": "section",
                "children": [{"id": 2, "component": "b", "classes": "new"}],
                "slots": {"footer": {"children": [{"id": 3, "component": "i"}]}}
            })),
            true,
        );

        assert_eq!(component(&registry, 1).node.component.as_deref(), Some("section"));
        assert_eq!(component(&registry, 2).node.classes.as_deref(), Some("new"));
        assert_ne!(registry.revision(ComponentId::new(2)), before);
        assert!(registry.contains(ComponentId::new(3)));
    }

    #[test]
    fn inline_children_are_flattened_to_ids() {
        let mut registry = Registry::new();
        registry.register(
            tree(json!({
                "id": 1,
                "component": "q-list",
                "children": ["head", {"id": 2, "component": "q-item", "children": [{"id": 3, "component": "span"}]}, 4, false],
                "slots": {"body": {"scope": "row", "children": [{"id": 5, "component": "td"}, "tail"]}}
            })),
            false,
        );

        let root = component(&registry, 1);
        assert_eq!(
            root.node.children,
            vec![
                Child::Text("head".into()),
                Child::Id(ComponentId::new(2)),
                Child::Id(ComponentId::new(4)),
            ]
        );
        assert_eq!(
            root.slots["body"].node.children,
            vec![Child::Id(ComponentId::new(5)), Child::Text("tail".into())]
        );
        assert!(root.slots["body"].is_scoped());
        assert_eq!(component(&registry, 2).node.children, vec![Child::Id(ComponentId::new(3))]);
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn text_nodes_register_as_text() {
        let mut registry = Registry::new();
        registry.register(tree(json!({"id": 7, "text": "<b>hi</b>"})), false);
        assert_eq!(
            registry.get(ComponentId::new(7)),
            Some(&Entry::Text("<b>hi</b>".into()))
        );
        assert!(registry.descriptor(ComponentId::new(7)).is_none());
        assert!(registry.get(ComponentId::new(8)).is_none());
    }
}
