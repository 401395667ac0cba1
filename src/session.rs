//! The session context.
//!
//! A [`Session`] owns everything one connected UI needs: the registry, the data store,
//! the computed cache, the load flags, the outbox of backend calls and the registered
//! shortcuts. It is `!Send` and meant to live on the UI thread.
//!
//! ```text
//!        host calls                            user-side calls
//!  setRoot / refreshComponent ──┐        ┌── trigger / write / computed
//!  applyDataPatch / ...         ▼        ▼
//!                         ┌──────────────────┐   flush / pump   ┌─────────┐
//!                         │     Session      │─────────────────▶│ Backend │
//!                         └──────────────────┘                  └─────────┘
//!                                  │ assemble / render_slot
//!                                  ▼
//!                            RenderDriver ──▶ Surface
//! ```

use core::cell::{Cell, Ref, RefCell};
use core::fmt;
use std::rc::Rc;

use aqueduct_core::{
    CallbackId, ComponentId, ComputedId, DescriptorTree, ModelId, PathKey,
};
use futures::executor::LocalPool;
use serde_json::Value;
use tracing::{debug, info, trace, warn};

use crate::assembler::Assembler;
use crate::backend::{Backend, InstanceBridge, Outbox, Outgoing};
use crate::computed::{ComputedCache, ComputedValue};
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::instance::{LoadTracker, MountId};
use crate::markup::{Handler, Markup, SlotMarkup};
use crate::protocol::{DataPatch, HostMessage};
use crate::registry::Registry;
use crate::shortcut::{KeyCombo, Shortcuts};
use crate::store::DataStore;

/// Session-scoped state shared by the assembler and the render driver.
pub struct Session {
    config: SessionConfig,
    backend: Rc<dyn Backend>,
    bridge: Option<Rc<dyn InstanceBridge>>,
    registry: RefCell<Registry>,
    store: DataStore,
    computed: ComputedCache,
    loads: RefCell<LoadTracker>,
    outbox: Outbox,
    shortcuts: RefCell<Shortcuts>,
    root: Cell<Option<ComponentId>>,
    overlay: Cell<Option<ComponentId>>,
    pool: RefCell<LocalPool>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("root", &self.root.get())
            .field("overlay", &self.overlay.get())
            .field("registry", &self.registry.borrow().len())
            .field("store", &self.store)
            .field("computed", &self.computed)
            .field("pending_calls", &self.outbox.len())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates a session with the default configuration.
    #[must_use]
    pub fn new(backend: Rc<dyn Backend>) -> Self {
        Self::with_config(backend, SessionConfig::default())
    }

    /// Creates a session with `config`.
    #[must_use]
    pub fn with_config(backend: Rc<dyn Backend>, config: SessionConfig) -> Self {
        let outbox = Outbox::new();
        let pool = LocalPool::new();
        let computed = ComputedCache::new(Rc::clone(&backend), pool.spawner(), config.dedupe_computed);
        debug!(?config, "session created");
        Self {
            store: DataStore::new(outbox.sender()),
            computed,
            backend,
            bridge: None,
            registry: RefCell::new(Registry::new()),
            loads: RefCell::new(LoadTracker::new()),
            outbox,
            shortcuts: RefCell::new(Shortcuts::default()),
            root: Cell::new(None),
            overlay: Cell::new(None),
            pool: RefCell::new(pool),
            config,
        }
    }

    /// Attaches the host capability used by `invokeMethod`.
    #[must_use]
    pub fn with_bridge(mut self, bridge: Rc<dyn InstanceBridge>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current root id.
    #[must_use]
    pub fn root(&self) -> Option<ComponentId> {
        self.root.get()
    }

    /// Current overlay id.
    #[must_use]
    pub fn overlay(&self) -> Option<ComponentId> {
        self.overlay.get()
    }

    /// Borrows the registry.
    ///
    /// # Panics
    ///
    /// Panics when called while a host call is registering descriptors.
    #[must_use]
    pub fn registry(&self) -> Ref<'_, Registry> {
        self.registry.borrow()
    }

    /// The data store.
    #[must_use]
    pub const fn store(&self) -> &DataStore {
        &self.store
    }

    /// The computed cache.
    #[must_use]
    pub const fn computed_cache(&self) -> &ComputedCache {
        &self.computed
    }

    // ========================================================================
    // Host calls
    // ========================================================================

    /// `setRoot`: registers `tree` and makes it the root.
    pub fn set_root(&self, tree: DescriptorTree) -> ComponentId {
        let id = self.registry.borrow_mut().register(tree, false);
        info!(%id, "root set");
        self.root.set(Some(id));
        id
    }

    /// `setSecondaryRoot`: registers `tree` as the overlay, or clears it with `None`.
    pub fn set_secondary_root(&self, tree: Option<DescriptorTree>) -> Option<ComponentId> {
        let id = tree.map(|tree| self.registry.borrow_mut().register(tree, false));
        match id {
            Some(id) => info!(%id, "overlay set"),
            None => info!("overlay cleared"),
        }
        self.overlay.set(id);
        id
    }

    /// `refreshComponent`: re-registers `tree` and its nested descriptors.
    pub fn refresh_component(&self, tree: DescriptorTree) -> ComponentId {
        let id = self.registry.borrow_mut().register(tree, true);
        debug!(%id, "component refreshed");
        id
    }

    /// `applyDataPatch`: applies backend model changes without echoing them back.
    ///
    /// Every patch is attempted; failures are logged.
    ///
    /// # Errors
    ///
    /// Returns the first failure after all patches were attempted.
    pub fn apply_data_patch(&self, patches: Vec<DataPatch>) -> Result<()> {
        let mut first_error = None;
        for DataPatch { id, path, value } in patches {
            if let Err(err) = self.store.apply_patch(&id, &path, value) {
                warn!("{err}");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// `setComputedResult`: stores a backend-pushed computed value.
    pub fn set_computed_result(&self, computed: &ComputedId, serialized_args: &str, value: Value) {
        self.computed.set_result(computed, serialized_args, value);
    }

    /// `registerShortcut`: binds a key combination to a callback.
    pub fn register_shortcut(&self, combo: KeyCombo, callback: CallbackId) {
        self.shortcuts.borrow_mut().register(combo, callback);
    }

    /// `invokeMethod`: calls `method` on the instance mounted for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingReference`] for an unregistered id and
    /// [`Error::BackendCallFailure`] when the host bridge fails.
    pub fn invoke_method(&self, id: ComponentId, method: &str, args: Vec<Value>) -> Result<()> {
        if !self.registry.borrow().contains(id) {
            let err = Error::MissingReference { id };
            warn!("{err}, cannot invoke `{method}`");
            return Err(err);
        }
        let Some(bridge) = &self.bridge else {
            debug!(%id, method, "no instance bridge attached, ignoring method call");
            return Ok(());
        };
        bridge.invoke(id, method, args).map_err(|source| {
            let err = Error::BackendCallFailure {
                operation: "invokeMethod",
                source,
            };
            warn!("{err}");
            err
        })
    }

    /// Applies one decoded host message.
    ///
    /// # Errors
    ///
    /// Returns the error of the underlying host call, if it can fail.
    pub fn handle_message(&self, message: HostMessage) -> Result<()> {
        trace!(?message, "host message");
        match message {
            HostMessage::SetRoot { tree } => {
                self.set_root(tree);
            }
            HostMessage::SetSecondaryRoot { tree } => {
                self.set_secondary_root(tree);
            }
            HostMessage::ApplyDataPatch { patches } => self.apply_data_patch(patches)?,
            HostMessage::SetComputedResult {
                id,
                serialized_args,
                value,
            } => self.set_computed_result(&id, &serialized_args, value),
            HostMessage::RegisterShortcut { combo, callback } => {
                self.register_shortcut(combo, callback);
            }
            HostMessage::RefreshComponent { tree } => {
                self.refresh_component(tree);
            }
            HostMessage::InvokeMethod { id, method, args } => self.invoke_method(id, &method, args)?,
        }
        Ok(())
    }

    /// Decodes and applies one JSON host message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] when the text is not a host message, or the error of
    /// the host call.
    pub fn handle_json(&self, text: &str) -> Result<()> {
        let message = serde_json::from_str::<HostMessage>(text).map_err(|err| {
            warn!("malformed host message: {err}");
            Error::Protocol(err)
        })?;
        self.handle_message(message)
    }

    // ========================================================================
    // User-side calls
    // ========================================================================

    /// Runs a rendered listener with the event `payload`.
    ///
    /// Callbacks are queued for the backend, write-back listeners apply their modifiers
    /// and write into the store. Expressions belong to the host and are ignored here.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPath`] when a write-back cannot be applied.
    pub fn trigger(&self, handler: &Handler, payload: Value) -> Result<()> {
        let result = match handler {
            Handler::Callback { callback } => {
                self.outbox.sender().push(Outgoing::DispatchCallback {
                    callback: *callback,
                    payload,
                });
                Ok(())
            }
            Handler::Expression { expression } => {
                trace!(expression, "host expression left to the host runtime");
                Ok(())
            }
            Handler::WriteBack {
                model,
                path,
                modifiers,
            } => self.store.write(model, path, modifiers.apply(payload)),
        };
        if let Err(err) = &result {
            warn!("{err}");
        }
        self.auto_flush();
        result
    }

    /// Dispatches the callback bound to `combo`. Returns `false` when nothing is bound.
    pub fn trigger_shortcut(&self, combo: &KeyCombo) -> bool {
        let Some(callback) = self.shortcuts.borrow().get(combo) else {
            trace!(%combo, "no shortcut bound");
            return false;
        };
        debug!(%combo, %callback, "shortcut triggered");
        self.outbox.sender().push(Outgoing::DispatchCallback {
            callback,
            payload: Value::String(combo.as_str().to_owned()),
        });
        self.auto_flush();
        true
    }

    /// Reads a whole model value.
    #[must_use]
    pub fn read(&self, model: &ModelId) -> Value {
        self.store.read(model)
    }

    /// Writes into a model and forwards the new value to the backend.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPath`] when the path cannot be applied.
    pub fn write(&self, model: &ModelId, path: &[PathKey], value: Value) -> Result<()> {
        let result = self.store.write(model, path, value);
        self.auto_flush();
        result
    }

    /// Returns the current value of a computed, requesting it when needed.
    pub fn computed(&self, computed: &ComputedId, args: Vec<Value>) -> ComputedValue {
        self.computed.get_or_compute(computed, args)
    }

    /// Delivers every queued backend call. Returns how many were delivered.
    pub fn flush(&self) -> usize {
        self.outbox.flush(self.backend.as_ref())
    }

    /// Delivers backend calls as they are queued. Never completes while the session lives.
    pub async fn pump(&self) {
        self.outbox.pump(self.backend.as_ref()).await;
    }

    /// Runs pending computed evaluations until none can make progress.
    ///
    /// # Panics
    ///
    /// Panics when called re-entrantly from a watcher fired by an evaluation.
    pub fn run_until_stalled(&self) {
        self.pool.borrow_mut().run_until_stalled();
    }

    fn auto_flush(&self) {
        if self.config.auto_flush {
            self.flush();
        }
    }

    // ========================================================================
    // Assembly
    // ========================================================================

    pub(crate) fn new_mount(&self) -> MountId {
        self.loads.borrow_mut().new_mount()
    }

    pub(crate) fn forget_mount(&self, mount: MountId) {
        self.loads.borrow_mut().forget(mount);
    }

    /// Revision of the entry registered for `id`.
    #[must_use]
    pub fn revision(&self, id: ComponentId) -> Option<u64> {
        self.registry.borrow().revision(id)
    }

    /// Assembles `id` within `mount`.
    pub fn assemble(&self, mount: MountId, id: ComponentId, recursive: bool) -> Markup {
        self.assemble_tracked(mount, id, recursive).0
    }

    /// Like [`Session::assemble`], also returning every id the pass looked up with its
    /// revision at the time.
    pub(crate) fn assemble_tracked(
        &self,
        mount: MountId,
        id: ComponentId,
        recursive: bool,
    ) -> (Markup, Vec<(ComponentId, Option<u64>)>) {
        let assembled = {
            let registry = self.registry.borrow();
            let mut loads = self.loads.borrow_mut();
            let mut assembler =
                Assembler::new(&registry, &self.store, &mut loads, self.outbox.sender(), mount);
            let markup = assembler.assemble(id, recursive);
            (markup, assembler.into_expanded())
        };
        self.auto_flush();
        assembled
    }

    /// Assembles one invocation of a scoped slot within `mount`.
    pub fn render_slot(
        &self,
        mount: MountId,
        owner: ComponentId,
        slot: &str,
        argument: Value,
    ) -> Option<SlotMarkup> {
        let markup = {
            let registry = self.registry.borrow();
            let mut loads = self.loads.borrow_mut();
            Assembler::new(&registry, &self.store, &mut loads, self.outbox.sender(), mount)
                .render_slot(owner, slot, argument)
        };
        self.auto_flush();
        markup
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use aqueduct_core::{CallbackId, ComponentId, ComputedId, ModelId};
    use serde_json::{Value, json};

    use super::Session;
    use crate::backend::{Backend, BackendError, InstanceBridge};
    use crate::computed::ComputedValue;
    use crate::config::SessionConfig;
    use crate::error::Error;
    use crate::markup::Handler;
    use crate::testing::RecordingBackend;

    fn session() -> (Session, Rc<RecordingBackend>) {
        let backend = Rc::new(RecordingBackend::default());
        let shared: Rc<dyn Backend> = backend.clone();
        (Session::new(shared), backend)
    }

    #[derive(Default)]
    struct RecordingBridge {
        calls: RefCell<Vec<(ComponentId, String, Vec<Value>)>>,
    }

    impl InstanceBridge for RecordingBridge {
        fn invoke(&self, id: ComponentId, method: &str, args: Vec<Value>) -> Result<(), BackendError> {
            self.calls.borrow_mut().push((id, method.to_owned(), args));
            Ok(())
        }
    }

    #[test]
    fn host_messages_drive_the_session() {
        let (session, _backend) = session();
        session
            .handle_json(r#"{"type": "setRoot", "tree": {"id": 1, "component": "q-page", "children": [{"id": 2, "component": "q-btn"}]}}"#)
            .unwrap();
        session
            .handle_json(r#"{"type": "setSecondaryRoot", "tree": {"id": 5, "component": "q-dialog"}}"#)
            .unwrap();
        assert_eq!(session.root(), Some(ComponentId::new(1)));
        assert_eq!(session.overlay(), Some(ComponentId::new(5)));
        assert_eq!(session.registry().len(), 3);

        session
            .handle_json(r#"{"type": "setSecondaryRoot", "tree": false}"#)
            .unwrap();
        assert_eq!(session.overlay(), None);

        assert!(matches!(session.handle_json("{not json"), Err(Error::Protocol(_))));
    }

    #[test]
    fn malformed_event_handler_keeps_the_root() {
        let (session, _backend) = session();
        session
            .handle_json(
                r#"{"type": "setRoot", "tree": {"id": 1, "component": "div",
                    "events": {"click": true}, "children": ["hello"]}}"#,
            )
            .unwrap();
        assert_eq!(session.root(), Some(ComponentId::new(1)));

        let mount = session.new_mount();
        let markup = session.assemble(mount, ComponentId::new(1), false);
        assert_eq!(markup.to_string(), "<div data-component-id=\"1\">hello</div>");
    }

    #[test]
    fn data_patches_are_not_echoed() {
        let (session, backend) = session();
        let id = ModelId::new("m");
        session.write(&id, &[], json!({"a": 1})).unwrap();
        session
            .handle_json(r#"{"type": "applyDataPatch", "patches": [{"id": "m", "path": ["a"], "value": 2}, {"id": "n", "path": ["x"], "value": 0}]}"#)
            .unwrap_err();

        assert_eq!(session.read(&id), json!({"a": 2}));
        assert_eq!(
            backend.calls(),
            vec![json!({"call": "writeModelValue", "model": "m", "value": {"a": 1}})]
        );
    }

    #[test]
    fn write_back_listeners_apply_modifiers() {
        let (session, backend) = session();
        let handler = Handler::WriteBack {
            model: ModelId::new("age"),
            path: Vec::new(),
            modifiers: aqueduct_core::Modifiers::new(["trim", "number"]),
        };
        session.trigger(&handler, json!(" 42 ")).unwrap();
        session
            .trigger(&Handler::Callback { callback: CallbackId::new(9) }, json!("clicked"))
            .unwrap();

        assert_eq!(session.read(&ModelId::new("age")), json!(42));
        assert_eq!(
            backend.calls(),
            vec![
                json!({"call": "writeModelValue", "model": "age", "value": 42}),
                json!({"call": "dispatchCallback", "callback": 9, "payload": "clicked"}),
            ]
        );
    }

    #[test]
    fn manual_flush_when_auto_flush_is_off() {
        let backend = Rc::new(RecordingBackend::default());
        let shared: Rc<dyn Backend> = backend.clone();
        let config = SessionConfig {
            auto_flush: false,
            ..SessionConfig::default()
        };
        let session = Session::with_config(shared, config);
        session.write(&ModelId::new("m"), &[], json!(1)).unwrap();
        assert!(backend.calls().is_empty());
        assert_eq!(session.flush(), 1);
        assert_eq!(backend.calls().len(), 1);
    }

    #[test]
    fn shortcuts_dispatch_registered_callbacks() {
        let (session, backend) = session();
        session
            .handle_json(r#"{"type": "registerShortcut", "combo": "Ctrl+S", "callback": 4}"#)
            .unwrap();
        assert!(session.trigger_shortcut(&"control+s".parse().unwrap()));
        assert!(!session.trigger_shortcut(&"ctrl+q".parse().unwrap()));
        assert_eq!(
            backend.calls(),
            vec![json!({"call": "dispatchCallback", "callback": 4, "payload": "ctrl+s"})]
        );
    }

    #[test]
    fn methods_go_through_the_bridge() {
        let backend: Rc<dyn Backend> = Rc::new(RecordingBackend::default());
        let bridge = Rc::new(RecordingBridge::default());
        let shared: Rc<dyn InstanceBridge> = bridge.clone();
        let session = Session::new(backend).with_bridge(shared);
        session
            .set_root(serde_json::from_value(json!({"id": 3, "component": "q-input"})).unwrap());

        session
            .handle_json(r#"{"type": "invokeMethod", "id": 3, "method": "focus"}"#)
            .unwrap();
        assert!(matches!(
            session.invoke_method(ComponentId::new(4), "focus", Vec::new()),
            Err(Error::MissingReference { .. })
        ));
        assert_eq!(
            *bridge.calls.borrow(),
            vec![(ComponentId::new(3), "focus".to_owned(), Vec::new())]
        );
    }

    #[test]
    fn computed_values_resolve_on_the_session_pool() {
        let (session, backend) = session();
        let id = ComputedId::new("sum");
        assert_eq!(session.computed(&id, vec![json!(1), json!(2)]), ComputedValue::Pending);
        backend.respond(0, Ok(json!(3)));
        session.run_until_stalled();
        assert_eq!(session.computed(&id, vec![json!(1), json!(2)]), ComputedValue::Ready(json!(3)));

        session
            .handle_json(r#"{"type": "setComputedResult", "id": "sum", "serializedArgs": "[1, 2]", "value": 4}"#)
            .unwrap();
        assert_eq!(session.computed(&id, vec![json!(1), json!(2)]), ComputedValue::Ready(json!(4)));
        assert_eq!(backend.evaluations().len(), 1);
    }
}
