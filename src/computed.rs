//! Memoized backend-computed values.
//!
//! A computed value is keyed by its id and the serialized argument tuple. The first
//! request for a key stores a pending placeholder and asks the backend to evaluate it;
//! the response replaces the placeholder only when it differs from what is stored.
//! Entries are [`Binding`]s, so whoever rendered a pending value can watch it and
//! re-render once it resolves. Nothing is ever evicted.

use core::cell::RefCell;
use core::fmt;
use std::collections::HashMap;
use std::rc::Rc;

use aqueduct_core::ComputedId;
use futures::executor::LocalSpawner;
use futures::task::LocalSpawnExt;
use nami::Binding;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::backend::Backend;
use crate::error::Error;

/// Current state of one computed entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "state", content = "value", rename_all = "camelCase")]
pub enum ComputedValue {
    /// No response has arrived yet.
    #[default]
    Pending,
    /// Latest value reported by the backend.
    Ready(Value),
}

impl ComputedValue {
    /// Returns `true` while no response has arrived.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Returns the resolved value, if any.
    #[must_use]
    pub const fn as_ready(&self) -> Option<&Value> {
        match self {
            Self::Pending => None,
            Self::Ready(value) => Some(value),
        }
    }

    /// Converts into a plain value; pending becomes `null`.
    #[must_use]
    pub fn into_value(self) -> Value {
        match self {
            Self::Pending => Value::Null,
            Self::Ready(value) => value,
        }
    }
}

type Key = (ComputedId, String);
type Entries = Rc<RefCell<HashMap<Key, Binding<ComputedValue>>>>;

/// Serializes an argument tuple into its cache key.
#[must_use]
pub fn cache_key(args: &[Value]) -> String {
    Value::Array(args.to_vec()).to_string()
}

/// Normalizes a key received from the backend so it matches [`cache_key`].
fn canonical_key(raw: &str) -> String {
    serde_json::from_str::<Value>(raw).map_or_else(|_| raw.to_owned(), |value| value.to_string())
}

/// Session-scoped cache of computed values.
pub struct ComputedCache {
    entries: Entries,
    backend: Rc<dyn Backend>,
    spawner: LocalSpawner,
    dedupe: bool,
}

impl fmt::Debug for ComputedCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputedCache")
            .field("entries", &self.entries.borrow().len())
            .field("dedupe", &self.dedupe)
            .finish_non_exhaustive()
    }
}

impl ComputedCache {
    /// Creates an empty cache whose evaluations run on `spawner`.
    ///
    /// With `dedupe` off, every request for a still-pending key issues another
    /// evaluation; the last response to arrive wins.
    #[must_use]
    pub fn new(backend: Rc<dyn Backend>, spawner: LocalSpawner, dedupe: bool) -> Self {
        Self {
            entries: Rc::new(RefCell::new(HashMap::new())),
            backend,
            spawner,
            dedupe,
        }
    }

    /// Returns the current value for `(computed, args)`, requesting it when needed.
    pub fn get_or_compute(&self, computed: &ComputedId, args: Vec<Value>) -> ComputedValue {
        let key = (computed.clone(), cache_key(&args));
        let existing = self.entries.borrow().get(&key).cloned();
        match existing {
            Some(entry) => {
                let current = entry.get();
                if current.is_pending() && !self.dedupe {
                    trace!(%computed, key = %key.1, "re-requesting pending computed value");
                    self.request(key, args);
                }
                current
            }
            None => {
                debug!(%computed, key = %key.1, "computed value requested");
                self.entries
                    .borrow_mut()
                    .insert(key.clone(), Binding::container(ComputedValue::Pending));
                self.request(key, args);
                ComputedValue::Pending
            }
        }
    }

    /// Returns the current value without requesting anything.
    #[must_use]
    pub fn get(&self, computed: &ComputedId, args: &[Value]) -> Option<ComputedValue> {
        self.binding(computed, args).map(|entry| entry.get())
    }

    /// Returns the binding of an entry so the host can watch it.
    #[must_use]
    pub fn binding(&self, computed: &ComputedId, args: &[Value]) -> Option<Binding<ComputedValue>> {
        self.entries
            .borrow()
            .get(&(computed.clone(), cache_key(args)))
            .cloned()
    }

    /// Stores a result pushed by the backend, creating the entry when missing.
    pub fn set_result(&self, computed: &ComputedId, serialized_args: &str, value: Value) {
        let key = (computed.clone(), canonical_key(serialized_args));
        let existing = self.entries.borrow().get(&key).cloned();
        match existing {
            Some(entry) => update(&entry, value),
            None => {
                debug!(%computed, key = %key.1, "computed result pushed for new key");
                self.entries
                    .borrow_mut()
                    .insert(key, Binding::container(ComputedValue::Ready(value)));
            }
        }
    }

    /// Re-evaluates every cached argument tuple of `computed`. Returns how many
    /// requests were issued.
    pub fn invalidate(&self, computed: &ComputedId) -> usize {
        let keys: Vec<Key> = self
            .entries
            .borrow()
            .keys()
            .filter(|(id, _)| id == computed)
            .cloned()
            .collect();

        let mut issued = 0;
        for key in keys {
            match serde_json::from_str::<Vec<Value>>(&key.1) {
                Ok(args) => {
                    self.request(key, args);
                    issued += 1;
                }
                Err(err) => warn!(%computed, key = %key.1, "cannot re-evaluate computed key: {err}"),
            }
        }
        debug!(%computed, issued, "computed value invalidated");
        issued
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Returns `true` when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    fn request(&self, key: Key, args: Vec<Value>) {
        let response = self.backend.evaluate_computed(&key.0, args);
        let entries = Rc::clone(&self.entries);
        let task = async move {
            match response.await {
                Ok(value) => {
                    let entry = entries.borrow().get(&key).cloned();
                    if let Some(entry) = entry {
                        update(&entry, value);
                    }
                }
                Err(source) => {
                    let err = Error::BackendCallFailure {
                        operation: "evaluateComputed",
                        source,
                    };
                    warn!(computed = %key.0, key = %key.1, "{err}");
                }
            }
        };
        if let Err(err) = self.spawner.spawn_local(task) {
            warn!("cannot schedule computed evaluation: {err}");
        }
    }
}

/// Replaces the entry value only when it changed.
fn update(entry: &Binding<ComputedValue>, value: Value) {
    let next = ComputedValue::Ready(value);
    if entry.get() == next {
        trace!("computed value unchanged");
        return;
    }
    entry.set(next);
}
