//! Renderable markup produced by the assembler.
//!
//! [`Markup`] is a plain tree: elements carry their attributes, listeners, children and
//! slots already resolved against the registry and the data store. The host reactivity
//! runtime consumes it directly. For debugging, any fragment renders to a Vue-style
//! template string:
//!
//! ```text
//! <q-input data-component-id="1" :value="$models['m1']" @input="$write('m1', [], $event)"></q-input>
//! ```

use core::fmt::{self, Display, Write};

use aqueduct_core::{CallbackId, ComponentId, Modifiers, ModelId, PathKey};
use serde::Serialize;
use serde_json::Value;

/// Attribute that carries the component id when none is configured.
pub const DEFAULT_ID_ATTRIBUTE: &str = "data-component-id";

/// Tag used when a deferred placeholder is written out as a template.
pub const DEFERRED_TAG: &str = "aqueduct-component";

/// An assembled fragment.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Markup {
    /// Nothing to render.
    Empty,
    /// Literal text or markup, passed through verbatim.
    Text {
        /// The text.
        text: String,
    },
    /// A registered descriptor without a component kind.
    Vacant {
        /// Its id.
        id: ComponentId,
    },
    /// A child the host resolves lazily on its own render cycle.
    Deferred {
        /// Id to resolve.
        id: ComponentId,
    },
    /// A rendered component.
    Element(Box<Element>),
}

impl Markup {
    /// Creates a text fragment.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Returns the element, if this fragment is one.
    #[must_use]
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Self::Element(element) => Some(element),
            _ => None,
        }
    }

    /// Returns `true` for [`Markup::Empty`].
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Finds the first element with `id`, searching children and slots depth first.
    #[must_use]
    pub fn find(&self, id: ComponentId) -> Option<&Element> {
        let element = self.as_element()?;
        if element.id == id {
            return Some(element);
        }
        element
            .children
            .iter()
            .chain(element.slots.iter().flat_map(|slot| slot.children.iter()))
            .find_map(|child| child.find(id))
    }

    /// Renders the fragment as a template, tagging elements with `id_attribute`.
    #[must_use]
    pub const fn template<'a>(&'a self, id_attribute: &'a str) -> Template<'a> {
        Template {
            markup: self,
            id_attribute,
        }
    }
}

impl Display for Markup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.template(DEFAULT_ID_ATTRIBUTE).fmt(f)
    }
}

/// A rendered component.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Element {
    /// Id of the descriptor this element was assembled from.
    pub id: ComponentId,
    /// Component kind.
    pub tag: String,
    /// Class list, verbatim.
    pub classes: Option<String>,
    /// Attributes in prop order.
    pub attributes: Vec<Attribute>,
    /// Event listeners, generated write-back listeners last.
    pub listeners: Vec<Listener>,
    /// Children in order.
    pub children: Vec<Markup>,
    /// Named slots.
    pub slots: Vec<SlotMarkup>,
}

impl Element {
    /// Returns the value of the attribute called `name`.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes
            .iter()
            .find(|attribute| attribute.name == name)
            .map(|attribute| &attribute.value)
    }

    /// Returns the handler listening to `event`.
    #[must_use]
    pub fn listener(&self, event: &str) -> Option<&Handler> {
        self.listeners
            .iter()
            .find(|listener| listener.event == event)
            .map(|listener| &listener.handler)
    }

    /// Returns the slot called `name`.
    #[must_use]
    pub fn slot(&self, name: &str) -> Option<&SlotMarkup> {
        self.slots.iter().find(|slot| slot.name == name)
    }
}

/// A rendered named slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotMarkup {
    /// Slot name.
    pub name: String,
    /// Scoped argument name.
    pub scope: Option<String>,
    /// Optional wrapper component kind.
    pub tag: Option<String>,
    /// Wrapper classes.
    pub classes: Option<String>,
    /// Wrapper attributes.
    pub attributes: Vec<Attribute>,
    /// Wrapper listeners.
    pub listeners: Vec<Listener>,
    /// Slot content.
    pub children: Vec<Markup>,
}

/// A named attribute.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribute {
    /// Prop name.
    pub name: String,
    /// Bound value.
    pub value: AttributeValue,
}

/// How an attribute gets its value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "binding", rename_all = "camelCase")]
pub enum AttributeValue {
    /// Bare boolean attribute.
    Flag,
    /// Literal string.
    Static(String),
    /// Any other literal, in serialized form.
    Serialized(String),
    /// Bound to the data store.
    Model(ModelBinding),
    /// Bound to a caller-scoped variable.
    Scoped(ScopedBinding),
    /// Trusted host expression.
    Expression(String),
}

/// An attribute bound to a model value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelBinding {
    /// Bound model.
    pub model: ModelId,
    /// Location inside the model value.
    pub path: Vec<PathKey>,
    /// Binding modifiers.
    pub modifiers: Modifiers,
    /// Store value at assembly time.
    pub value: Value,
}

/// An attribute bound to a scoped variable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopedBinding {
    /// Variable name.
    pub variable: String,
    /// Location inside the variable value.
    pub path: Vec<PathKey>,
    /// Binding modifiers.
    pub modifiers: Modifiers,
    /// Resolved value, or `None` when the variable was not in scope.
    pub value: Option<Value>,
}

/// An event listener.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Listener {
    /// Event name.
    pub event: String,
    /// What the event triggers.
    pub handler: Handler,
}

/// What an event triggers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Handler {
    /// Forward the payload to a backend callback.
    Callback {
        /// Target callback.
        callback: CallbackId,
    },
    /// Run a trusted host expression.
    Expression {
        /// The expression.
        expression: String,
    },
    /// Write the payload into the data store.
    WriteBack {
        /// Target model.
        model: ModelId,
        /// Location inside the model value.
        path: Vec<PathKey>,
        /// Payload modifiers.
        modifiers: Modifiers,
    },
}

// ============================================================================
// Template output
// ============================================================================

/// Template rendering of a [`Markup`] fragment.
#[derive(Debug, Clone, Copy)]
pub struct Template<'a> {
    markup: &'a Markup,
    id_attribute: &'a str,
}

impl Display for Template<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_markup(f, self.markup, self.id_attribute)
    }
}

fn write_markup(f: &mut fmt::Formatter<'_>, markup: &Markup, id_attribute: &str) -> fmt::Result {
    match markup {
        Markup::Empty => Ok(()),
        Markup::Text { text } => f.write_str(text),
        Markup::Vacant { id } => write!(f, "<!--{id}-->"),
        Markup::Deferred { id } => write!(f, "<{DEFERRED_TAG} :id=\"{id}\"></{DEFERRED_TAG}>"),
        Markup::Element(element) => {
            write!(f, "<{} {id_attribute}=\"{}\"", element.tag, element.id)?;
            write_head(f, element.classes.as_deref(), &element.attributes, &element.listeners)?;
            f.write_char('>')?;
            for child in &element.children {
                write_markup(f, child, id_attribute)?;
            }
            for slot in &element.slots {
                write_slot(f, slot, id_attribute)?;
            }
            write!(f, "</{}>", element.tag)
        }
    }
}

fn write_slot(f: &mut fmt::Formatter<'_>, slot: &SlotMarkup, id_attribute: &str) -> fmt::Result {
    write!(f, "<template v-slot:{}", slot.name)?;
    if let Some(scope) = &slot.scope {
        write!(f, "=\"{}\"", escape(scope))?;
    }
    f.write_char('>')?;
    if let Some(tag) = &slot.tag {
        write!(f, "<{tag}")?;
        write_head(f, slot.classes.as_deref(), &slot.attributes, &slot.listeners)?;
        f.write_char('>')?;
    }
    for child in &slot.children {
        write_markup(f, child, id_attribute)?;
    }
    if let Some(tag) = &slot.tag {
        write!(f, "</{tag}>")?;
    }
    f.write_str("</template>")
}

fn write_head(
    f: &mut fmt::Formatter<'_>,
    classes: Option<&str>,
    attributes: &[Attribute],
    listeners: &[Listener],
) -> fmt::Result {
    if let Some(classes) = classes {
        write!(f, " class=\"{}\"", escape(classes))?;
    }
    for Attribute { name, value } in attributes {
        match value {
            AttributeValue::Flag => write!(f, " {name}")?,
            AttributeValue::Static(text) => write!(f, " {name}=\"{}\"", escape(text))?,
            AttributeValue::Serialized(json) => write!(f, " :{name}=\"{}\"", escape(json))?,
            AttributeValue::Model(binding) => write!(
                f,
                " :{name}=\"$models[{}]{}\"",
                quote(binding.model.as_str()),
                accessors(&binding.path)
            )?,
            AttributeValue::Scoped(binding) => write!(
                f,
                " :{name}=\"{}{}\"",
                escape(&binding.variable),
                accessors(&binding.path)
            )?,
            AttributeValue::Expression(expression) => {
                write!(f, " :{name}=\"{}\"", escape(expression))?;
            }
        }
    }
    for Listener { event, handler } in listeners {
        match handler {
            Handler::Callback { callback } => write!(f, " @{event}=\"$callback({callback}, $event)\"")?,
            Handler::Expression { expression } => write!(f, " @{event}=\"{}\"", escape(expression))?,
            Handler::WriteBack {
                model,
                path,
                modifiers,
            } => {
                let path: Vec<String> = path.iter().map(literal).collect();
                write!(f, " @{event}=\"$write({}, [{}], $event", quote(model.as_str()), path.join(", "))?;
                if !modifiers.is_empty() {
                    let names: Vec<String> = modifiers.iter().map(quote).collect();
                    write!(f, ", [{}]", names.join(", "))?;
                }
                f.write_str(")\"")?;
            }
        }
    }
    Ok(())
}

/// Escapes a value placed inside a double-quoted attribute.
#[must_use]
pub fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('"', "&quot;")
}

fn quote(text: &str) -> String {
    format!("'{}'", escape(&text.replace('\\', "\\\\").replace('\'', "\\'")))
}

fn literal(key: &PathKey) -> String {
    match key {
        PathKey::Index(index) => index.to_string(),
        PathKey::Key(key) => quote(key),
    }
}

fn accessors(path: &[PathKey]) -> String {
    path.iter().map(|key| format!("[{}]", literal(key))).collect()
}
