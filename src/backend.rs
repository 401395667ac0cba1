//! Calls from the core to the backend process.
//!
//! The backend lives on the other side of a process boundary. Callback dispatch and model
//! write-back are fire-and-forget; computed evaluation is request/response. Fire-and-forget
//! calls go through an [`Outbox`]: a single FIFO queue, so writes to one model reach the
//! backend in the order they were issued and a callback never overtakes the writes that
//! preceded it.
//!
//! ```text
//! ┌─────────────┐  push   ┌──────────────┐  flush / pump  ┌──────────────┐
//! │ Data Store  │────────▶│    Outbox    │───────────────▶│   Backend    │
//! │ Assembler   │         │ (FIFO queue) │                │  (external)  │
//! └─────────────┘         └──────────────┘                └──────────────┘
//! ```

use aqueduct_core::{CallbackId, ComponentId, ComputedId, ModelId};
use async_channel::{Receiver, Sender};
use futures::future::LocalBoxFuture;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{trace, warn};

use crate::error::Error;

/// Failure reported by a backend call.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// The backend could not be reached.
    #[error("backend unreachable: {0}")]
    Unreachable(String),
    /// The backend rejected the call.
    #[error("backend rejected the call: {0}")]
    Rejected(String),
}

/// The backend interface consumed by the core.
pub trait Backend {
    /// Forwards an event payload to a backend callback.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] when the call could not be delivered.
    fn dispatch_callback(&self, callback: CallbackId, payload: Value) -> Result<(), BackendError>;

    /// Pushes the new value of a model to the backend.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] when the call could not be delivered.
    fn write_model_value(&self, model: &ModelId, value: Value) -> Result<(), BackendError>;

    /// Asks the backend to evaluate a computed value for one argument tuple.
    fn evaluate_computed(
        &self,
        computed: &ComputedId,
        args: Vec<Value>,
    ) -> LocalBoxFuture<'static, Result<Value, BackendError>>;
}

/// Host capability: resolve a mounted instance by its stable id and invoke a method on it.
pub trait InstanceBridge {
    /// Invokes `method` on the instance mounted for `id`.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] when the host could not find the instance or the method.
    fn invoke(&self, id: ComponentId, method: &str, args: Vec<Value>) -> Result<(), BackendError>;
}

/// A queued fire-and-forget call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "call", rename_all = "camelCase")]
pub enum Outgoing {
    /// `dispatchCallback(callback, payload)`.
    DispatchCallback {
        /// Target callback.
        callback: CallbackId,
        /// Event payload.
        payload: Value,
    },
    /// `writeModelValue(model, value)`.
    WriteModelValue {
        /// Written model.
        model: ModelId,
        /// Whole new value of the model.
        value: Value,
    },
}

impl Outgoing {
    /// Delivers the call, logging failures instead of propagating them.
    pub fn deliver(self, backend: &dyn Backend) {
        let result = match self {
            Self::DispatchCallback { callback, payload } => {
                trace!(%callback, "dispatching callback");
                backend
                    .dispatch_callback(callback, payload)
                    .map_err(|source| Error::BackendCallFailure {
                        operation: "dispatchCallback",
                        source,
                    })
            }
            Self::WriteModelValue { model, value } => {
                trace!(%model, "writing model value back");
                backend
                    .write_model_value(&model, value)
                    .map_err(|source| Error::BackendCallFailure {
                        operation: "writeModelValue",
                        source,
                    })
            }
        };
        if let Err(err) = result {
            warn!("{err}");
        }
    }
}

/// Sending half of the outbox, shared by everything that emits backend calls.
#[derive(Debug, Clone)]
pub struct OutboxSender(Sender<Outgoing>);

impl OutboxSender {
    /// Queues a call.
    pub fn push(&self, call: Outgoing) {
        if self.0.try_send(call).is_err() {
            warn!("outbox closed, dropping backend call");
        }
    }
}

/// FIFO queue of fire-and-forget backend calls.
#[derive(Debug)]
pub struct Outbox {
    sender: OutboxSender,
    receiver: Receiver<Outgoing>,
}

impl Default for Outbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Outbox {
    /// Creates an empty outbox.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = async_channel::unbounded();
        Self {
            sender: OutboxSender(sender),
            receiver,
        }
    }

    /// Returns a sender for this outbox.
    #[must_use]
    pub fn sender(&self) -> OutboxSender {
        self.sender.clone()
    }

    /// Number of calls waiting for delivery.
    #[must_use]
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Returns `true` when nothing is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Delivers every queued call in order. Returns how many were delivered.
    pub fn flush(&self, backend: &dyn Backend) -> usize {
        let mut delivered = 0;
        while let Ok(call) = self.receiver.try_recv() {
            call.deliver(backend);
            delivered += 1;
        }
        delivered
    }

    /// Delivers calls as they arrive, until every sender is gone.
    pub async fn pump(&self, backend: &dyn Backend) {
        while let Ok(call) = self.receiver.recv().await {
            call.deliver(backend);
        }
    }
}
