//! Model values shared between the UI and the backend.
//!
//! Every model lives in a [`Binding`] so the host reactivity runtime can watch it. The
//! first explicit write to a model registers a watcher that forwards each new value to
//! the backend through the outbox. Values seeded from a prop's initial value, or patched
//! by the backend itself, are not echoed back.

use core::cell::{Cell, RefCell};
use core::fmt;
use std::collections::HashMap;
use std::rc::Rc;

use aqueduct_core::path::{self, PathError};
use aqueduct_core::{ModelId, PathKey};
use nami::{Binding, Signal};
use serde_json::Value;
use tracing::{debug, trace};

use crate::backend::{Outgoing, OutboxSender};
use crate::error::{Error, Result};

type ModelGuard = <Binding<Value> as Signal>::Guard;

/// Session-scoped store of model values.
pub struct DataStore {
    models: RefCell<HashMap<ModelId, Binding<Value>>>,
    observers: RefCell<HashMap<ModelId, ModelGuard>>,
    suppress_write_back: Rc<Cell<bool>>,
    outbox: OutboxSender,
}

impl fmt::Debug for DataStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataStore")
            .field("models", &self.models.borrow().keys().collect::<Vec<_>>())
            .field("observed", &self.observers.borrow().keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl DataStore {
    /// Creates an empty store that writes back through `outbox`.
    #[must_use]
    pub fn new(outbox: OutboxSender) -> Self {
        Self {
            models: RefCell::new(HashMap::new()),
            observers: RefCell::new(HashMap::new()),
            suppress_write_back: Rc::new(Cell::new(false)),
            outbox,
        }
    }

    /// Returns `true` when the model exists.
    #[must_use]
    pub fn contains(&self, model: &ModelId) -> bool {
        self.models.borrow().contains_key(model)
    }

    /// Returns the whole value of a model, or `null` when it does not exist.
    #[must_use]
    pub fn read(&self, model: &ModelId) -> Value {
        self.read_at(model, &[])
    }

    /// Returns the value at `path` inside a model, or `null` when it does not exist.
    #[must_use]
    pub fn read_at(&self, model: &ModelId, path: &[PathKey]) -> Value {
        let Some(binding) = self.binding(model) else {
            trace!(%model, "read of unknown model");
            return Value::Null;
        };
        let value = binding.get();
        path::lookup(&value, path).cloned().unwrap_or(Value::Null)
    }

    /// Returns the reactive binding of a model so the host can watch it.
    #[must_use]
    pub fn binding(&self, model: &ModelId) -> Option<Binding<Value>> {
        self.models.borrow().get(model).cloned()
    }

    /// Creates the model with `initial` unless it already exists. Never writes back.
    ///
    /// Returns `true` when the model was created.
    pub fn seed(&self, model: &ModelId, initial: Value) -> bool {
        let mut models = self.models.borrow_mut();
        if models.contains_key(model) {
            return false;
        }
        debug!(%model, "seeding model");
        models.insert(model.clone(), Binding::container(initial));
        true
    }

    /// Writes `value` at `path` and forwards the new model value to the backend.
    ///
    /// An empty path replaces the whole value and creates the model if needed. A
    /// non-empty path mutates an existing container inside an existing model.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPath`] when the path cannot be applied; the store is left
    /// unchanged and nothing is forwarded.
    pub fn write(&self, model: &ModelId, path: &[PathKey], value: Value) -> Result<()> {
        let (binding, next) = self.prepare(model, path, value)?;
        self.observe(model, &binding);
        binding.set(next);
        Ok(())
    }

    /// Applies a backend patch. Same rules as [`DataStore::write`], without write-back.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPath`] when the path cannot be applied.
    pub fn apply_patch(&self, model: &ModelId, path: &[PathKey], value: Value) -> Result<()> {
        let (binding, next) = self.prepare(model, path, value)?;
        self.suppress_write_back.set(true);
        binding.set(next);
        self.suppress_write_back.set(false);
        Ok(())
    }

    /// Returns `true` when a write-back observer is registered for the model.
    #[must_use]
    pub fn is_observed(&self, model: &ModelId) -> bool {
        self.observers.borrow().contains_key(model)
    }

    /// Number of registered write-back observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers.borrow().len()
    }

    /// Resolves the binding to mutate and computes its next value.
    fn prepare(
        &self,
        model: &ModelId,
        path: &[PathKey],
        value: Value,
    ) -> Result<(Binding<Value>, Value)> {
        let existing = self.binding(model);
        let binding = match existing {
            Some(binding) => binding,
            None if path.is_empty() => {
                let binding = Binding::container(Value::Null);
                self.models
                    .borrow_mut()
                    .insert(model.clone(), binding.clone());
                binding
            }
            None => {
                return Err(Error::invalid_path(
                    model,
                    path,
                    PathError::Missing { depth: 0 },
                ));
            }
        };

        let mut next = binding.get();
        path::assign(&mut next, path, value)
            .map_err(|source| Error::invalid_path(model, path, source))?;
        Ok((binding, next))
    }

    fn observe(&self, model: &ModelId, binding: &Binding<Value>) {
        if self.observers.borrow().contains_key(model) {
            return;
        }
        debug!(%model, "registering write-back observer");
        let outbox = self.outbox.clone();
        let suppress = Rc::clone(&self.suppress_write_back);
        let id = model.clone();
        let guard = binding.watch(move |context| {
            if suppress.get() {
                return;
            }
            outbox.push(Outgoing::WriteModelValue {
                model: id.clone(),
                value: context.into_value(),
            });
        });
        self.observers.borrow_mut().insert(model.clone(), guard);
    }
}
