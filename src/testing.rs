//! Test doubles shared by the unit tests.

use std::cell::RefCell;

use aqueduct_core::{CallbackId, ComputedId, ModelId};
use futures::FutureExt;
use futures::channel::oneshot;
use futures::future::LocalBoxFuture;
use serde_json::{Value, json};

use crate::backend::{Backend, BackendError};

type Responder = oneshot::Sender<Result<Value, BackendError>>;

/// Backend that records every call and lets the test answer evaluations by hand.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    calls: RefCell<Vec<Value>>,
    evaluations: RefCell<Vec<(ComputedId, Vec<Value>)>>,
    responders: RefCell<Vec<Option<Responder>>>,
    fail: bool,
}

impl RecordingBackend {
    /// A backend whose fire-and-forget calls are all rejected.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Recorded fire-and-forget calls, as JSON.
    pub fn calls(&self) -> Vec<Value> {
        self.calls.borrow().clone()
    }

    /// Recorded evaluation requests.
    pub fn evaluations(&self) -> Vec<(ComputedId, Vec<Value>)> {
        self.evaluations.borrow().clone()
    }

    /// Answers evaluation request `index`.
    pub fn respond(&self, index: usize, result: Result<Value, BackendError>) {
        let responder = self.responders.borrow_mut()[index]
            .take()
            .expect("evaluation already answered");
        let _ = responder.send(result);
    }

    fn record(&self, call: Value) -> Result<(), BackendError> {
        if self.fail {
            return Err(BackendError::Unreachable("test backend is offline".into()));
        }
        self.calls.borrow_mut().push(call);
        Ok(())
    }
}

impl Backend for RecordingBackend {
    fn dispatch_callback(&self, callback: CallbackId, payload: Value) -> Result<(), BackendError> {
        self.record(json!({"call": "dispatchCallback", "callback": callback, "payload": payload}))
    }

    fn write_model_value(&self, model: &ModelId, value: Value) -> Result<(), BackendError> {
        self.record(json!({"call": "writeModelValue", "model": model, "value": value}))
    }

    fn evaluate_computed(
        &self,
        computed: &ComputedId,
        args: Vec<Value>,
    ) -> LocalBoxFuture<'static, Result<Value, BackendError>> {
        let (sender, receiver) = oneshot::channel();
        self.evaluations.borrow_mut().push((computed.clone(), args));
        self.responders.borrow_mut().push(Some(sender));
        async move {
            receiver
                .await
                .unwrap_or_else(|_| Err(BackendError::Unreachable("request dropped".into())))
        }
        .boxed_local()
    }
}
