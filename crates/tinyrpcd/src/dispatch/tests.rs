//! Dispatcher registration, resolution and dispatch tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use rstest::{fixture, rstest};
use serde_json::{Value, json};

use tinyrpc_protocol::{
    BatchRequest, ErrorKind, Message, Outcome, Reply, Request, RequestId, Response, RpcError,
    decode,
};

use super::*;

struct Calculator;

impl Calculator {
    fn add(&self, params: &Params<'_>) -> MethodResult {
        let (left, right): (i64, i64) = params.positional()?;
        Ok(json!(left + right))
    }

    fn divide(&self, params: &Params<'_>) -> MethodResult {
        let (left, right): (i64, i64) = params.positional()?;
        if right == 0 {
            return Err(anyhow!("division by zero").into());
        }
        Ok(json!(left / right))
    }
}

impl RpcService for Calculator {
    fn describe(self: Arc<Self>) -> Service {
        let add = Arc::clone(&self);
        let divide = Arc::clone(&self);
        Service::builder("Calculator")
            .publish(Method::new("add", move |params| add.add(params)).with_doc("Adds two integers."))
            .publish(Method::new("divide", move |params| divide.divide(params)))
            .build()
    }
}

fn echo() -> Method {
    Method::new("echo", |params| Ok(Value::Array(params.args().to_vec())))
}

fn constant(name: &str, value: Value) -> Method {
    Method::new(name, move |_| Ok(value.clone()))
}

#[fixture]
fn dispatcher() -> Dispatcher {
    let mut dispatcher = Dispatcher::new();
    dispatcher.add_method(echo()).expect("register echo");
    dispatcher
        .register_instances([("calc", Service::from(Arc::new(Calculator)))])
        .expect("register calculator");
    dispatcher
}

fn call(dispatcher: &Dispatcher, method: &str, args: Vec<Value>) -> Response {
    dispatcher
        .dispatch(&Request::call(1, method).with_args(args))
        .expect("call should produce a reply")
}

fn error_kind(response: &Response) -> ErrorKind {
    response.error().expect("error reply").kind
}

#[rstest]
fn resolves_the_registered_callable() {
    let mut dispatcher = Dispatcher::new();
    let method = echo();
    dispatcher.add_method(method.clone()).expect("register");
    let resolved = dispatcher.get_method("echo").expect("resolve");
    assert!(resolved.ptr_eq(&method));
}

#[rstest]
fn resolves_through_prefixes(dispatcher: Dispatcher) {
    let resolved = dispatcher.get_method("calc.add").expect("resolve prefixed");
    assert_eq!(resolved.name(), "add");
    assert!(dispatcher.get_method("add").is_err());
}

#[rstest]
fn add_method_as_overrides_the_declared_name() {
    let mut dispatcher = Dispatcher::new();
    dispatcher.add_method_as("ping", echo()).expect("register");
    assert!(dispatcher.get_method("ping").is_ok());
    assert!(dispatcher.get_method("echo").is_err());
}

#[rstest]
fn rejects_duplicate_names() {
    let mut dispatcher = Dispatcher::new();
    dispatcher.add_method(echo()).expect("first registration");
    let error = dispatcher.add_method(echo()).expect_err("duplicate");
    assert_eq!(error, RegistrationError::duplicate("echo"));
}

#[rstest]
fn missing_method_yields_method_not_found(dispatcher: Dispatcher) {
    let error = dispatcher.get_method("calc.nope").expect_err("unknown method");
    assert_eq!(error.name, "calc.nope");
    let response = call(&dispatcher, "calc.nope", vec![]);
    assert_eq!(error_kind(&response), ErrorKind::MethodNotFound);
}

#[rstest]
fn detects_collisions_under_one_prefix() {
    let mut dispatcher = Dispatcher::new();
    let mut first = Dispatcher::new();
    first.add_method(constant("read", json!(1))).expect("register");
    let mut second = Dispatcher::new();
    second.add_method(constant("read", json!(2))).expect("register");
    second.add_method(constant("write", json!(3))).expect("register");

    dispatcher.add_subdispatch(first, "adc.").expect("first child");
    let error = dispatcher
        .add_subdispatch(second, "adc.")
        .expect_err("collision");
    assert_eq!(
        error,
        RegistrationError::NameCollision {
            prefix: "adc.".to_owned(),
            names: vec!["read".to_owned()],
        }
    );
}

#[rstest]
fn children_under_one_prefix_are_searched_in_order() {
    let mut dispatcher = Dispatcher::new();
    let mut first = Dispatcher::new();
    first.add_method(constant("read", json!("first"))).expect("register");
    let mut second = Dispatcher::new();
    second.add_method(constant("write", json!("second"))).expect("register");
    dispatcher.add_subdispatch(first, "io.").expect("first child");
    dispatcher.add_subdispatch(second, "io.").expect("second child");

    let read = call(&dispatcher, "io.read", vec![]);
    let write = call(&dispatcher, "io.write", vec![]);
    assert_eq!(read.outcome, Outcome::Result(json!("first")));
    assert_eq!(write.outcome, Outcome::Result(json!("second")));
}

#[rstest]
fn dispatch_returns_the_method_result(dispatcher: Dispatcher) {
    let response = call(&dispatcher, "calc.add", vec![json!(2), json!(3)]);
    assert_eq!(response.id, Some(RequestId::Number(1)));
    assert_eq!(response.outcome, Outcome::Result(json!(5)));
}

#[rstest]
fn method_failure_becomes_application_error(dispatcher: Dispatcher) {
    let response = call(&dispatcher, "calc.divide", vec![json!(1), json!(0)]);
    let error = response.error().expect("error reply");
    assert_eq!(error.kind, ErrorKind::ApplicationError);
    assert_eq!(error.message, "division by zero");
    assert!(error.trace.is_some());
}

#[rstest]
fn binding_failure_becomes_invalid_params(dispatcher: Dispatcher) {
    let response = call(&dispatcher, "calc.add", vec![json!("two")]);
    assert_eq!(error_kind(&response), ErrorKind::InvalidParams);
}

#[rstest]
fn panicking_method_becomes_application_error() {
    let mut dispatcher = Dispatcher::new();
    dispatcher
        .add_method(Method::new("explode", |_| panic!("relay stuck")))
        .expect("register");
    let response = call(&dispatcher, "explode", vec![]);
    let error = response.error().expect("error reply");
    assert_eq!(error.kind, ErrorKind::ApplicationError);
    assert_eq!(error.message, "relay stuck");
}

#[rstest]
fn notifications_run_without_reply(dispatcher: Dispatcher) {
    let reply = dispatcher.dispatch(&Request::notification("calc.add").with_args(vec![
        json!(1),
        json!(1),
    ]));
    assert!(reply.is_none());
}

#[rstest]
fn batch_skips_notification_replies(dispatcher: Dispatcher) {
    let batch = BatchRequest::new(vec![
        Request::call(1, "calc.add").with_args(vec![json!(1), json!(2)]),
        Request::notification("echo"),
        Request::call(2, "calc.nope"),
        Request::call(3, "echo").with_args(vec![json!("x")]),
    ]);
    let replies = dispatcher.dispatch_batch(&batch).into_inner();
    let ids: Vec<_> = replies.iter().map(|reply| reply.id.clone()).collect();
    assert_eq!(
        ids,
        vec![
            Some(RequestId::Number(1)),
            Some(RequestId::Number(2)),
            Some(RequestId::Number(3)),
        ]
    );
    assert!(replies.get(1).is_some_and(Response::is_error));
}

#[rstest]
fn invalid_batch_members_do_not_block_the_rest(dispatcher: Dispatcher) {
    let message = decode(
        br#"[{"jsonrpc":"2.0","method":"echo","args":["a"],"id":1},{"jsonrpc":"2.0","id":2}]"#,
    )
    .expect("decode batch");
    let Some(Reply::Batch(replies)) = dispatcher.dispatch_message(&message) else {
        panic!("expected a batch reply");
    };
    let replies = replies.into_inner();
    assert_eq!(replies.len(), 2);
    let echoed = replies.first().expect("echo reply");
    assert_eq!(echoed.id, Some(RequestId::Number(1)));
    assert_eq!(echoed.outcome, Outcome::Result(json!(["a"])));
    let rejected = replies.get(1).expect("rejection");
    assert_eq!(rejected.id, Some(RequestId::Number(2)));
    assert_eq!(error_kind(rejected), ErrorKind::InvalidRequest);
}

#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<(String, bool)>>,
}

impl CallObserver for Recorder {
    fn observe(&self, request: &Request, response: &Response, _elapsed: Duration) {
        self.calls
            .lock()
            .expect("calls lock")
            .push((request.method.clone(), response.is_error()));
    }
}

#[rstest]
fn observers_see_every_call_including_notifications(dispatcher: Dispatcher) {
    let recorder = Recorder::default();
    let batch = BatchRequest::new(vec![
        Request::notification("echo"),
        Request::call(1, "calc.nope"),
    ]);
    let reply = dispatcher.dispatch_message_with(&Message::Batch(batch), &recorder);
    assert!(reply.is_some());
    let calls = recorder.calls.into_inner().expect("calls lock");
    assert_eq!(
        calls,
        vec![("echo".to_owned(), false), ("calc.nope".to_owned(), true)]
    );
}

struct Faulty;

impl CallObserver for Faulty {
    fn observe(&self, _request: &Request, _response: &Response, _elapsed: Duration) {
        panic!("observer fault");
    }
}

#[rstest]
fn failures_outside_invocation_become_opaque_server_errors(dispatcher: Dispatcher) {
    let request = Request::call(5, "echo").with_args(vec![json!(1)]);
    let response = dispatcher
        .dispatch_with(&request, &Faulty)
        .expect("reply for a call");
    assert_eq!(response.id, Some(RequestId::Number(5)));
    let error = response.error().expect("error reply");
    assert_eq!(error.kind, ErrorKind::ServerError);
    assert_eq!(error.message, RpcError::SERVER_ERROR_MESSAGE);
    assert_eq!(error.trace, None);
}

#[rstest]
fn registration_is_atomic() {
    let mut dispatcher = Dispatcher::new();
    let broken = Service::builder("Broken").public_api(["missing"]).build();
    let error = dispatcher
        .register_instances([
            ("calc", Service::from(Arc::new(Calculator))),
            ("broken", broken),
        ])
        .expect_err("second instance fails");
    assert!(matches!(error, RegistrationError::UnresolvedMember { .. }));
    assert!(dispatcher.get_method("calc.add").is_err());
}

#[rstest]
fn whitelisted_attribute_fails_registration() {
    let mut dispatcher = Dispatcher::new();
    let service = Service::builder("Dac")
        .attribute("vref")
        .public_api(["vref"])
        .build();
    let error = dispatcher.register_instance(service).expect_err("not callable");
    assert!(error.to_string().contains("method argument must be callable"));
}

#[rstest]
fn all_methods_lists_every_prefix(dispatcher: Dispatcher) {
    let catalogue = dispatcher.all_methods();
    let root: Vec<&str> = catalogue
        .get("")
        .expect("root entry")
        .iter()
        .map(|info| info.name.as_str())
        .collect();
    assert_eq!(root, vec!["echo"]);

    let calc = catalogue.get("calc.").expect("calc entry");
    assert_eq!(
        calc,
        &vec![
            MethodInfo {
                name: "add".to_owned(),
                doc: Some("Adds two integers.".to_owned()),
            },
            MethodInfo {
                name: "divide".to_owned(),
                doc: None,
            },
        ]
    );
}

#[rstest]
fn root_instances_merge_into_the_root_entry() {
    let mut dispatcher = Dispatcher::new();
    dispatcher.add_method(echo()).expect("register echo");
    dispatcher
        .register_instance(Arc::new(Calculator))
        .expect("register at root");
    let root = dispatcher.all_methods().remove("").expect("root entry");
    let names: Vec<String> = root.into_iter().map(|info| info.name).collect();
    assert_eq!(names, vec!["echo", "add", "divide"]);
    assert!(dispatcher.get_method("divide").is_ok());
}
