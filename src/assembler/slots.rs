//! Children and slot expansion.
//!
//! Scoped slots always expand their children eagerly: a deferred placeholder would be
//! resolved later, outside the scope that defines the slot argument.

use aqueduct_core::{Child, ComponentId, Slot};
use serde_json::Value;
use tracing::{trace, warn};

use super::Assembler;
use crate::error::Error;
use crate::markup::{Markup, SlotMarkup};

impl Assembler<'_> {
    pub(super) fn children(&mut self, children: &[Child], recursive: bool) -> Vec<Markup> {
        children
            .iter()
            .map(|child| match child {
                Child::Text(text) => Markup::text(text.clone()),
                Child::Id(id) if recursive => self.assemble(*id, true),
                Child::Id(id) => Markup::Deferred { id: *id },
            })
            .collect()
    }

    pub(super) fn slot(
        &mut self,
        owner: ComponentId,
        name: &str,
        slot: &Slot,
        recursive: bool,
    ) -> SlotMarkup {
        let eager = recursive || slot.is_scoped();
        let (attributes, listeners) = self.bind(owner, &slot.node);
        SlotMarkup {
            name: name.to_owned(),
            scope: slot.scope.clone(),
            tag: slot.node.component.clone(),
            classes: slot.node.classes.clone(),
            attributes,
            listeners,
            children: self.children(&slot.node.children, eager),
        }
    }

    /// Assembles one invocation of the slot `name` of `owner`.
    ///
    /// For a scoped slot, `argument` is bound to the slot's scope name while its content
    /// is assembled, so every invocation resolves scoped references against its own
    /// argument. Returns `None` when the owner or the slot does not exist.
    pub fn render_slot(&mut self, owner: ComponentId, name: &str, argument: Value) -> Option<SlotMarkup> {
        let registry = self.registry;
        let Some(descriptor) = registry.descriptor(owner) else {
            warn!("{}, cannot render slot `{name}`", Error::MissingReference { id: owner });
            return None;
        };
        let Some(slot) = descriptor.slots.get(name) else {
            warn!(%owner, "component has no slot `{name}`");
            return None;
        };

        self.record(owner);
        self.ancestors.push(owner);
        let markup = match slot.scope.clone() {
            None => self.slot(owner, name, slot, true),
            Some(scope) => {
                trace!(%owner, slot = name, %scope, "entering slot scope");
                self.scope.push((scope, argument));
                let markup = self.slot(owner, name, slot, true);
                self.scope.pop();
                markup
            }
        };
        self.ancestors.pop();
        Some(markup)
    }
}

#[cfg(test)]
mod tests {
    use aqueduct_core::{ComponentId, DescriptorTree};
    use serde_json::json;

    use crate::assembler::Assembler;
    use crate::backend::Outbox;
    use crate::instance::LoadTracker;
    use crate::markup::{AttributeValue, Markup, SlotMarkup};
    use crate::registry::Registry;
    use crate::store::DataStore;

    fn registry() -> Registry {
        let tree: DescriptorTree = serde_json::from_value(json!({
            "id": 1,
            "component": "q-table",
            "slots": {
                "body": {
                    "scope": "row",
                    "component": "q-tr",
                    "children": [{
                        "id": 2,
                        "component": "q-td",
                        "props": {"label": {"$var": "row", "path": ["name"]}},
                        "children": [3]
                    }]
                },
                "top": {"children": [4, "title"]}
            }
        }))
        .unwrap();
        let mut registry = Registry::new();
        registry.register(tree, false);
        registry.register(
            serde_json::from_value(json!({"id": 3, "component": "span", "props": {"text": {"$var": "row"}}})).unwrap(),
            false,
        );
        registry
    }

    fn label(slot: &SlotMarkup) -> Option<serde_json::Value> {
        let cell = slot.children[0].as_element()?;
        match cell.attribute("label")? {
            AttributeValue::Scoped(binding) => binding.value.clone(),
            _ => None,
        }
    }

    #[test]
    fn scoped_slots_resolve_per_invocation() {
        let registry = registry();
        let outbox = Outbox::new();
        let store = DataStore::new(outbox.sender());
        let mut loads = LoadTracker::new();
        let mount = loads.new_mount();
        let mut assembler = Assembler::new(&registry, &store, &mut loads, outbox.sender(), mount);

        let owner = ComponentId::new(1);
        let alice = assembler
            .render_slot(owner, "body", json!({"name": "alice"}))
            .unwrap();
        let bob = assembler
            .render_slot(owner, "body", json!({"name": "bob"}))
            .unwrap();

        assert_eq!(label(&alice), Some(json!("alice")));
        assert_eq!(label(&bob), Some(json!("bob")));
        assert_eq!(alice.tag.as_deref(), Some("q-tr"));

        let nested = bob.children[0].as_element().unwrap().children[0]
            .as_element()
            .unwrap();
        assert!(matches!(
            nested.attribute("text"),
            Some(AttributeValue::Scoped(binding)) if binding.value == Some(json!({"name": "bob"}))
        ));
    }

    #[test]
    fn slots_expand_with_the_owner() {
        let registry = registry();
        let outbox = Outbox::new();
        let store = DataStore::new(outbox.sender());
        let mut loads = LoadTracker::new();
        let mount = loads.new_mount();
        let mut assembler = Assembler::new(&registry, &store, &mut loads, outbox.sender(), mount);

        let markup = assembler.assemble(ComponentId::new(1), false);
        let table = markup.as_element().unwrap();

        let body = table.slot("body").unwrap();
        assert_eq!(body.scope.as_deref(), Some("row"));
        assert!(body.children[0].as_element().is_some());
        assert_eq!(label(body), None);

        let top = table.slot("top").unwrap();
        assert_eq!(top.tag, None);
        assert_eq!(
            top.children,
            vec![Markup::Deferred { id: ComponentId::new(4) }, Markup::text("title")]
        );

        assert!(assembler.render_slot(ComponentId::new(1), "missing", json!(null)).is_none());
        assert!(assembler.render_slot(ComponentId::new(9), "body", json!(null)).is_none());
    }
}
