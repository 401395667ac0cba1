//! Descriptor to markup compilation.
//!
//! [`Assembler::assemble`] walks the registry from one id and produces [`Markup`]:
//!
//! 1. resolve the id; a missing id is empty output, a text entry passes through;
//! 2. a descriptor without a component kind becomes a vacant placeholder;
//! 3. the element is tagged with its own id;
//! 4. a callback `load` event is dispatched once per mounted instance;
//! 5. classes, props, events, children and slots are rendered in that order.
//!
//! An id already being assembled further up the same pass renders empty, so a
//! descriptor that references its own ancestor cannot recurse forever.
//!
//! Assembly reads the registry and the data store and never fails: malformed input
//! degrades to empty output plus a log entry. The only side effects are seeding models
//! from their initial value and the `load` dispatch.

mod slots;

use aqueduct_core::{
    ComponentId, EventHandler, LOAD_EVENT, ModelRef, Modifiers, Node, PropValue, ScopedRef,
    path,
};
use serde_json::Value;
use tracing::{debug, error, trace, warn};

use crate::backend::{OutboxSender, Outgoing};
use crate::error::Error;
use crate::instance::{LoadTracker, MountId};
use crate::markup::{
    Attribute, AttributeValue, Element, Handler, Listener, Markup, ModelBinding, ScopedBinding,
};
use crate::registry::{Entry, Registry};
use crate::store::DataStore;

/// Event used to commit a `value` model binding.
pub const INPUT_EVENT: &str = "input";
/// Event used to commit a lazy `value` model binding.
pub const CHANGE_EVENT: &str = "change";

/// One assembly pass over the registry, within one mounted instance.
#[derive(Debug)]
pub struct Assembler<'a> {
    registry: &'a Registry,
    store: &'a DataStore,
    loads: &'a mut LoadTracker,
    outbox: OutboxSender,
    mount: MountId,
    scope: Vec<(String, Value)>,
    ancestors: Vec<ComponentId>,
    expanded: Vec<(ComponentId, Option<u64>)>,
}

impl<'a> Assembler<'a> {
    /// Creates an assembler for `mount`.
    pub fn new(
        registry: &'a Registry,
        store: &'a DataStore,
        loads: &'a mut LoadTracker,
        outbox: OutboxSender,
        mount: MountId,
    ) -> Self {
        Self {
            registry,
            store,
            loads,
            outbox,
            mount,
            scope: Vec::new(),
            ancestors: Vec::new(),
            expanded: Vec::new(),
        }
    }

    /// Assembles the entry registered for `id`.
    ///
    /// With `recursive`, child ids are assembled immediately; otherwise they become
    /// [`Markup::Deferred`] placeholders the host resolves on its own render cycle.
    pub fn assemble(&mut self, id: ComponentId, recursive: bool) -> Markup {
        if self.ancestors.contains(&id) {
            warn!("{}, rendering nothing", Error::CyclicReference { id });
            return Markup::Empty;
        }
        let registry = self.registry;
        self.record(id);
        let descriptor = match registry.get(id) {
            None => {
                warn!("{}, rendering nothing", Error::MissingReference { id });
                return Markup::Empty;
            }
            Some(Entry::Text(text)) => return Markup::text(text.clone()),
            Some(Entry::Component(descriptor)) => descriptor,
        };

        let Some(tag) = descriptor.node.component.clone() else {
            trace!(%id, "descriptor has no component kind");
            return Markup::Vacant { id };
        };

        self.dispatch_load(id, descriptor.load_handler());

        self.ancestors.push(id);
        let (attributes, listeners) = self.bind(id, &descriptor.node);
        let children = self.children(&descriptor.node.children, recursive);
        let slots = descriptor
            .slots
            .iter()
            .map(|(name, slot)| self.slot(id, name, slot, recursive))
            .collect();
        self.ancestors.pop();

        Markup::Element(Box::new(Element {
            id,
            tag,
            classes: descriptor.node.classes.clone(),
            attributes,
            listeners,
            children,
            slots,
        }))
    }

    /// Mount this pass assembles for.
    #[must_use]
    pub const fn mount(&self) -> MountId {
        self.mount
    }

    /// Ids this pass looked up, with the revision each had at the time.
    ///
    /// Missing ids are included with no revision, so a later registration shows up as a
    /// change too.
    #[must_use]
    pub fn expanded(&self) -> &[(ComponentId, Option<u64>)] {
        &self.expanded
    }

    /// Consumes the pass, returning [`Assembler::expanded`].
    #[must_use]
    pub fn into_expanded(self) -> Vec<(ComponentId, Option<u64>)> {
        self.expanded
    }

    fn record(&mut self, id: ComponentId) {
        if !self.expanded.iter().any(|(seen, _)| *seen == id) {
            self.expanded.push((id, self.registry.revision(id)));
        }
    }

    fn dispatch_load(&mut self, id: ComponentId, handler: Option<&EventHandler>) {
        let Some(EventHandler::Callback(callback)) = handler else {
            return;
        };
        if self.loads.has_fired(self.mount, id) {
            trace!(%id, mount = %self.mount, "load already dispatched");
            return;
        }
        if let Err(err) = self.loads.mark(self.mount, id) {
            error!("{err}");
            return;
        }
        debug!(%id, mount = %self.mount, "dispatching load event");
        self.outbox.push(Outgoing::DispatchCallback {
            callback: *callback,
            payload: Value::Null,
        });
    }

    /// Renders props and events of a node or slot wrapper.
    fn bind(&self, owner: ComponentId, node: &Node) -> (Vec<Attribute>, Vec<Listener>) {
        let mut attributes = Vec::with_capacity(node.props.len());
        let mut write_backs = Vec::new();

        for (name, prop) in &node.props {
            let value = match prop {
                PropValue::Literal(Value::Null) => AttributeValue::Flag,
                PropValue::Literal(Value::String(text)) => AttributeValue::Static(text.clone()),
                PropValue::Literal(literal @ Value::Object(map)) => {
                    if let Some(key) = map.keys().find(|key| key.starts_with('$')) {
                        let err = Error::UnsupportedPropShape {
                            prop: name.clone(),
                            reason: format!("reserved key `{key}` did not decode"),
                        };
                        warn!(%owner, "{err}, rendering it serialized");
                    }
                    AttributeValue::Serialized(literal.to_string())
                }
                PropValue::Literal(other) => AttributeValue::Serialized(other.to_string()),
                PropValue::Model(reference) => {
                    write_backs.push(write_back(name, reference));
                    AttributeValue::Model(self.bind_model(reference))
                }
                PropValue::Scoped(reference) => {
                    AttributeValue::Scoped(self.bind_scoped(owner, name, reference))
                }
                PropValue::Expression(expression) => AttributeValue::Expression(expression.clone()),
            };
            attributes.push(Attribute {
                name: name.clone(),
                value,
            });
        }

        let mut listeners: Vec<Listener> = node
            .events
            .iter()
            .filter(|(event, handler)| {
                !(event.as_str() == LOAD_EVENT && matches!(handler, EventHandler::Callback(_)))
            })
            .map(|(event, handler)| Listener {
                event: event.clone(),
                handler: match handler {
                    EventHandler::Callback(callback) => Handler::Callback {
                        callback: *callback,
                    },
                    EventHandler::Expression(expression) => Handler::Expression {
                        expression: expression.clone(),
                    },
                },
            })
            .collect();
        listeners.extend(write_backs);

        (attributes, listeners)
    }

    fn bind_model(&self, reference: &ModelRef) -> ModelBinding {
        if let Some(initial) = &reference.initial {
            self.store.seed(&reference.model, initial.clone());
        }
        ModelBinding {
            model: reference.model.clone(),
            path: reference.path.clone(),
            modifiers: reference.modifiers.clone(),
            value: self.store.read_at(&reference.model, &reference.path),
        }
    }

    fn bind_scoped(&self, owner: ComponentId, prop: &str, reference: &ScopedRef) -> ScopedBinding {
        let value = self.lookup_scope(&reference.variable).map(|value| {
            path::lookup(value, &reference.path)
                .cloned()
                .unwrap_or(Value::Null)
        });
        if value.is_none() {
            trace!(%owner, prop, variable = %reference.variable, "scoped variable left to the host");
        }
        ScopedBinding {
            variable: reference.variable.clone(),
            path: reference.path.clone(),
            modifiers: reference.modifiers.clone(),
            value,
        }
    }

    fn lookup_scope(&self, variable: &str) -> Option<&Value> {
        self.scope
            .iter()
            .rev()
            .find(|(name, _)| name == variable)
            .map(|(_, value)| value)
    }
}

/// Generated listener that writes a bound prop back into the store.
fn write_back(prop: &str, reference: &ModelRef) -> Listener {
    let event = if prop == "value" {
        if reference.modifiers.contains(Modifiers::LAZY) {
            CHANGE_EVENT.to_owned()
        } else {
            INPUT_EVENT.to_owned()
        }
    } else {
        format!("update:{prop}")
    };
    Listener {
        event,
        handler: Handler::WriteBack {
            model: reference.model.clone(),
            path: reference.path.clone(),
            modifiers: reference.modifiers.clone(),
        },
    }
}
