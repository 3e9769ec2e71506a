//! Client behaviour against a scripted server.

mod support;

use std::time::{Duration, Instant};

use rstest::rstest;
use serde_json::{Value, json};

use tinyrpc_protocol::{
    BatchRequest, BatchResponse, Encode, ErrorKind, Message, Request, RequestId, Response,
    RpcError,
};

use crate::{ClientError, ClientTransport, Kwargs, RpcClient};

use self::support::{FakeServer, Script};

const TIMEOUT: Duration = Duration::from_secs(2);

fn encoded(response: &Response) -> Vec<u8> {
    response.encode().expect("encode reply")
}

fn single(message: &Message) -> &Request {
    match message {
        Message::Single(request) => request,
        Message::Batch(_) => panic!("expected a single call"),
    }
}

/// Answers every call with `value`.
fn answer_with(value: Value) -> Script {
    Box::new(move |message: &Message| {
        let request = single(message);
        vec![encoded(&Response::success(request.id.clone(), value.clone()))]
    })
}

fn connect(script: Script) -> (FakeServer, RpcClient) {
    let server = FakeServer::spawn(script).expect("spawn fake server");
    let transport =
        ClientTransport::connect(server.receiver(), server.replier()).expect("connect client");
    (server, RpcClient::new(transport, TIMEOUT))
}

fn finish(mut server: FakeServer, client: RpcClient) -> Vec<Message> {
    server.finish().expect("fake server succeeds");
    drop(client);
    server.calls()
}

#[rstest]
fn call_returns_the_result() {
    let (server, mut client) = connect(answer_with(json!("pong")));
    let result = client
        .call("ping", vec![json!(1)], Kwargs::new())
        .expect("call succeeds");
    assert_eq!(result, json!("pong"));

    let calls = finish(server, client);
    let request = single(calls.first().expect("one call"));
    assert_eq!(request.method, "ping");
    assert_eq!(request.args, vec![json!(1)]);
    assert!(matches!(request.id, Some(RequestId::Text(ref id)) if id.len() == 32));
}

#[rstest]
fn stale_replies_are_discarded() {
    let script: Script = Box::new(|message: &Message| {
        let request = single(message);
        vec![
            encoded(&Response::success(Some(RequestId::from("stale")), json!("old"))),
            encoded(&Response::success(request.id.clone(), json!("fresh"))),
        ]
    });
    let (server, mut client) = connect(script);
    let result = client
        .call("read", Vec::new(), Kwargs::new())
        .expect("call succeeds");
    assert_eq!(result, json!("fresh"));
    finish(server, client);
}

#[rstest]
fn unattributed_rejections_answer_the_call() {
    let script: Script = Box::new(|_: &Message| {
        vec![encoded(&Response::failure(
            None,
            RpcError::invalid_request("missing method"),
        ))]
    });
    let (server, mut client) = connect(script);
    let error = client
        .call("read", Vec::new(), Kwargs::new())
        .expect_err("rejected");
    assert!(
        matches!(error, ClientError::Remote(ref rpc) if rpc.kind == ErrorKind::InvalidRequest),
        "unexpected error: {error:?}"
    );
    finish(server, client);
}

#[rstest]
fn remote_failures_carry_the_error() {
    let script: Script = Box::new(|message: &Message| {
        let request = single(message);
        vec![encoded(&Response::failure(
            request.id.clone(),
            RpcError::application("relay stuck", Some("trace".to_owned())),
        ))]
    });
    let (server, mut client) = connect(script);
    let error = client
        .call("relay.close", vec![json!(3)], Kwargs::new())
        .expect_err("remote failure");
    let ClientError::Remote(rpc) = error else {
        panic!("expected a remote error, got {error:?}");
    };
    assert_eq!(rpc.kind, ErrorKind::ApplicationError);
    assert_eq!(rpc.message, "relay stuck");
    assert_eq!(rpc.trace.as_deref(), Some("trace"));
    finish(server, client);
}

#[rstest]
#[case(Duration::from_millis(150))]
#[case(Duration::from_millis(400))]
fn silence_times_out_at_the_deadline(#[case] timeout: Duration) {
    let (server, mut client) = connect(Box::new(|_: &Message| Vec::new()));
    let started = Instant::now();
    let error = client
        .call_with_timeout("util.sleep", vec![json!(2)], Kwargs::new(), timeout)
        .expect_err("no reply");
    let elapsed = started.elapsed();
    assert!(error.is_timeout(), "unexpected error: {error:?}");
    assert!(elapsed >= timeout, "returned early after {elapsed:?}");
    assert!(
        elapsed < timeout + Duration::from_millis(500),
        "returned late after {elapsed:?}"
    );
    finish(server, client);
}

#[rstest]
fn notifications_are_sent_without_an_id() {
    let (server, mut client) = connect(Box::new(|_: &Message| Vec::new()));
    client
        .notify("relay.reset", Vec::new(), Kwargs::new())
        .expect("notify");

    let calls = finish(server, client);
    let first = single(calls.first().expect("notification recorded"));
    assert!(first.is_notification());
}

#[rstest]
fn proxies_qualify_method_names() {
    let (server, mut client) = connect(answer_with(Value::Null));
    {
        let mut bank = client.proxy("relay");
        let mut channel = bank.proxy("bank");
        assert_eq!(channel.prefix(), "relay.bank");
        let result = channel
            .call("close", vec![json!(3)], Kwargs::new())
            .expect("call succeeds");
        assert_eq!(result, Value::Null);
    }
    let calls = finish(server, client);
    assert_eq!(single(calls.first().expect("one call")).method, "relay.bank.close");
}

#[rstest]
fn batches_return_every_reply() {
    let script: Script = Box::new(|message: &Message| {
        let Message::Batch(batch) = message else {
            return Vec::new();
        };
        let replies: BatchResponse = batch
            .iter()
            .filter(|request| !request.is_notification())
            .map(|request| Response::success(request.id.clone(), json!(request.method)))
            .collect();
        vec![replies.encode().expect("encode batch")]
    });
    let (server, mut client) = connect(script);
    let batch = BatchRequest::new(vec![
        Request::call(1, "first"),
        Request::notification("ignored"),
        Request::call(2, "second"),
    ]);
    let replies = client.batch(&batch).expect("batch succeeds");
    let results: Vec<_> = replies
        .into_iter()
        .map(|reply| reply.into_result().expect("success"))
        .collect();
    assert_eq!(results, vec![json!("first"), json!("second")]);
    finish(server, client);
}

#[rstest]
fn notification_only_batches_do_not_wait() {
    let (server, mut client) = connect(Box::new(|_: &Message| Vec::new()));
    let batch = BatchRequest::new(vec![Request::notification("a"), Request::notification("b")]);
    let started = Instant::now();
    let replies = client.batch(&batch).expect("batch sent");
    assert!(replies.is_empty());
    assert!(started.elapsed() < TIMEOUT);
    finish(server, client);
}
