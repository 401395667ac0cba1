//! End-to-end scenarios through the public session API.

use std::cell::RefCell;
use std::rc::Rc;

use aqueduct::driver::{MountTarget, RenderDriver, Surface};
use aqueduct::markup::{AttributeValue, Handler, Markup};
use aqueduct::{
    Backend, BackendError, CallbackId, ComponentId, ComputedId, ComputedValue, ModelId, PathKey,
    Session, SessionConfig,
};
use futures::FutureExt;
use futures::channel::oneshot;
use futures::future::LocalBoxFuture;
use serde_json::{Value, json};

type Responder = oneshot::Sender<Result<Value, BackendError>>;

#[derive(Default)]
struct Backstage {
    calls: RefCell<Vec<Value>>,
    responders: RefCell<Vec<Responder>>,
}

impl Backstage {
    fn calls(&self) -> Vec<Value> {
        self.calls.borrow().clone()
    }

    fn respond(&self, index: usize, value: Value) {
        let responder = self.responders.borrow_mut().remove(index);
        responder.send(Ok(value)).unwrap();
    }
}

impl Backend for Backstage {
    fn dispatch_callback(&self, callback: CallbackId, payload: Value) -> Result<(), BackendError> {
        self.calls
            .borrow_mut()
            .push(json!({"callback": callback, "payload": payload}));
        Ok(())
    }

    fn write_model_value(&self, model: &ModelId, value: Value) -> Result<(), BackendError> {
        self.calls
            .borrow_mut()
            .push(json!({"model": model, "value": value}));
        Ok(())
    }

    fn evaluate_computed(
        &self,
        _computed: &ComputedId,
        _args: Vec<Value>,
    ) -> LocalBoxFuture<'static, Result<Value, BackendError>> {
        let (sender, receiver) = oneshot::channel();
        self.responders.borrow_mut().push(sender);
        async move {
            receiver
                .await
                .unwrap_or_else(|_| Err(BackendError::Unreachable("dropped".into())))
        }
        .boxed_local()
    }
}

#[derive(Default)]
struct Screen {
    mounted: Vec<(MountTarget, Markup)>,
}

impl Surface for Screen {
    fn mount(&mut self, target: MountTarget, markup: Markup) {
        self.mounted.push((target, markup));
    }

    fn unmount(&mut self, target: MountTarget) {
        self.mounted.retain(|(mounted, _)| *mounted != target);
    }
}

fn session_with(config: SessionConfig) -> (Session, Rc<Backstage>) {
    let backend = Rc::new(Backstage::default());
    let shared: Rc<dyn Backend> = backend.clone();
    (Session::with_config(shared, config), backend)
}

fn session() -> (Session, Rc<Backstage>) {
    session_with(SessionConfig::default())
}

#[test]
fn text_field_bound_to_a_model() {
    let (session, backend) = session();
    session
        .handle_json(
            r#"{"type": "setRoot", "tree": {"id": 1, "component": "text-field",
                "props": {"value": {"$model": "m1", "initial": "hi"}}, "events": {}}}"#,
        )
        .unwrap();

    let mut driver = RenderDriver::new(Screen::default());
    driver.sync(&session);
    let (_, markup) = &driver.surface().mounted[0];
    let field = markup.as_element().unwrap();

    let Some(AttributeValue::Model(binding)) = field.attribute("value") else {
        panic!("value must be bound to the store");
    };
    assert_eq!(binding.model, ModelId::new("m1"));
    assert_eq!(binding.value, json!("hi"));
    assert_eq!(session.read(&ModelId::new("m1")), json!("hi"));

    let input = field.listener("input").unwrap().clone();
    session.trigger(&input, json!("bye")).unwrap();

    assert_eq!(backend.calls(), vec![json!({"model": "m1", "value": "bye"})]);
    assert_eq!(session.read(&ModelId::new("m1")), json!("bye"));
}

#[test]
fn scoped_slot_resolves_per_row() {
    let (session, _backend) = session();
    session
        .handle_json(
            r#"{"type": "setRoot", "tree": {"id": 1, "component": "q-table", "slots": {
                "body": {"scope": "row", "children": [
                    {"id": 2, "component": "q-td", "props": {"label": {"$var": "row", "path": ["name"]}}}
                ]}}}}"#,
        )
        .unwrap();
    let mut driver = RenderDriver::new(Screen::default());
    driver.sync(&session);

    let label = |argument: Value| {
        let slot = driver
            .render_slot(&session, MountTarget::Root, ComponentId::new(1), "body", argument)
            .unwrap();
        match slot.children[0].as_element().unwrap().attribute("label") {
            Some(AttributeValue::Scoped(binding)) => binding.value.clone(),
            other => panic!("unexpected label {other:?}"),
        }
    };

    let first = label(json!({"name": "ada"}));
    let second = label(json!({"name": "grace"}));
    assert_eq!(first, Some(json!("ada")));
    assert_eq!(second, Some(json!("grace")));
}

#[test]
fn writes_reach_the_backend_in_order() {
    let (session, backend) = session();
    let id = ModelId::new("counter");
    session.write(&id, &[], json!({"a": [1, 2]})).unwrap();
    session
        .write(&id, &[PathKey::from("a"), PathKey::from(1)], json!(9))
        .unwrap();
    session.write(&id, &[], json!(1)).unwrap();
    session.write(&id, &[], json!(2)).unwrap();

    let values: Vec<Value> = backend.calls().into_iter().map(|call| call["value"].clone()).collect();
    assert_eq!(
        values,
        vec![json!({"a": [1, 2]}), json!({"a": [1, 9]}), json!(1), json!(2)]
    );
    assert_eq!(session.read(&id), json!(2));
}

#[test]
fn load_fires_once_per_instance_across_refreshes() {
    let (session, backend) = session_with(SessionConfig {
        lazy_children: false,
        ..SessionConfig::default()
    });
    let tree = |title: &str| {
        serde_json::from_value(json!({
            "id": 1,
            "component": "q-page",
            "events": {"load": 5},
            "children": [{"id": 2, "component": "q-card", "events": {"load": 6}, "children": [title]}]
        }))
        .unwrap()
    };

    session.set_root(tree("one"));
    let mut driver = RenderDriver::new(Screen::default());
    driver.sync(&session);
    driver.resolve(&session, MountTarget::Root, ComponentId::new(2));
    session.refresh_component(tree("two"));
    driver.sync(&session);

    let (_, markup) = &driver.surface().mounted[1];
    assert!(markup.to_string().contains(">two</q-card>"));

    let callbacks: Vec<Value> = backend.calls().into_iter().map(|call| call["callback"].clone()).collect();
    assert_eq!(callbacks, vec![json!(5), json!(6)]);

    session.set_root(serde_json::from_value(json!({"id": 9, "component": "div"})).unwrap());
    driver.sync(&session);
    session.set_root(tree("ignored"));
    driver.sync(&session);
    let callbacks: Vec<Value> = backend.calls().into_iter().map(|call| call["callback"].clone()).collect();
    assert_eq!(callbacks, vec![json!(5), json!(6), json!(5), json!(6)]);
}

#[test]
fn last_computed_response_to_arrive_wins() {
    let (session, backend) = session_with(SessionConfig {
        dedupe_computed: false,
        ..SessionConfig::default()
    });
    let id = ComputedId::new("price");
    let args = vec![json!(1), json!(2)];
    assert_eq!(session.computed(&id, args.clone()), ComputedValue::Pending);
    assert_eq!(session.computed(&id, args.clone()), ComputedValue::Pending);

    backend.respond(1, json!("late issue, early arrival"));
    session.run_until_stalled();
    backend.respond(0, json!("early issue, late arrival"));
    session.run_until_stalled();

    assert_eq!(
        session.computed(&id, args),
        ComputedValue::Ready(json!("early issue, late arrival"))
    );
}

#[test]
fn backend_patches_update_rendered_values_without_remounting() {
    let (session, backend) = session();
    session
        .handle_json(
            r#"{"type": "setRoot", "tree": {"id": 1, "component": "q-toggle",
                "props": {"model-value": {"$model": "flag", "initial": false}}}}"#,
        )
        .unwrap();
    let mut driver = RenderDriver::new(Screen::default());
    driver.sync(&session);

    session
        .handle_json(r#"{"type": "applyDataPatch", "patches": [{"id": "flag", "value": true}]}"#)
        .unwrap();
    assert!(driver.sync(&session).is_unchanged());
    assert_eq!(session.read(&ModelId::new("flag")), json!(true));
    assert!(backend.calls().is_empty());

    let (_, markup) = &driver.surface().mounted[0];
    assert!(matches!(
        markup.as_element().unwrap().listener("update:model-value"),
        Some(Handler::WriteBack { .. })
    ));
}
