//! Correlation properties: responses settle exactly the request they answer,
//! timeouts are final, and instance/handler lifecycle changes behave like
//! silent drops.

mod common;

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use penpal::{
    ClientOptions, LocalBus, MessageBus, ReplyError, RequestHandlers, RequestMessage,
    ResponseData, ResponseMessage, Server, Settings,
};
use serde_json::{json, Value};

fn echo_server(bus: &LocalBus, name: &str) -> Server<LocalBus> {
    Server::new(
        bus.clone(),
        name,
        RequestHandlers::new().with("echo", |_: &Settings, args: &[Value]| {
            args.first().cloned().unwrap_or_default()
        }),
    )
}

/// Records raw requests on `Request.<server>/<topic>` for manual answering.
fn intercept_requests(bus: &LocalBus, server: &str, topic: &str) -> Rc<RefCell<Vec<RequestMessage>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    bus.subscribe(
        &format!("Request.{server}"),
        topic,
        Rc::new(move |payload| {
            if let Ok(request) = RequestMessage::from_payload(payload) {
                sink.borrow_mut().push(request);
            }
        }),
    );
    seen
}

fn answer(bus: &LocalBus, server: &str, topic: &str, request: RequestMessage, data: ResponseData) {
    let response = ResponseMessage {
        client_request: request,
        response_data: data,
    };
    bus.broadcast(
        &format!("Response.{server}"),
        topic,
        response.to_payload().unwrap(),
    );
}

#[tokio::test(start_paused = true)]
async fn test_out_of_order_responses_resolve_their_callers() {
    common::init_tracing();
    common::run_local(async {
        let bus = LocalBus::new();
        // Never started: only the interceptor answers.
        let server = echo_server(&bus, "Manual");
        let requests = intercept_requests(&bus, "Manual", "echo");
        let client = server.new_client("main", ClientOptions::default());

        let futures: Vec<_> = (0..5)
            .map(|n| client.call("echo", vec![json!(n)]).unwrap())
            .collect();
        common::settle().await;
        assert_eq!(requests.borrow().len(), 5);
        assert_eq!(client.pending_count(), 5);

        let seen: Vec<RequestMessage> = requests.borrow_mut().drain(..).collect();
        for request in seen.into_iter().rev() {
            let n = request.args[0].as_i64().unwrap();
            answer(&bus, "Manual", "echo", request, json!(n * 10).into());
        }

        for (n, future) in futures.into_iter().enumerate() {
            assert_eq!(future.await, Ok(json!(n as i64 * 10)));
        }
        assert_eq!(client.pending_count(), 0);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_clients_never_cross_resolve() {
    common::init_tracing();
    common::run_local(async {
        let bus = LocalBus::new();
        let server = echo_server(&bus, "Shared");
        server.start("main", None);

        let alice = server.new_client("main", ClientOptions::new().with_client_name("alice"));
        let bob = server.new_client("main", ClientOptions::new().with_client_name("bob"));

        // Issued in the same turn, answered on the same response topic.
        let a1 = alice.call("echo", vec![json!("a1")]).unwrap();
        let b1 = bob.call("echo", vec![json!("b1")]).unwrap();
        let a2 = alice.call("echo", vec![json!("a2")]).unwrap();
        let b2 = bob.call("echo", vec![json!("b2")]).unwrap();

        assert_eq!(b2.await, Ok(json!("b2")));
        assert_eq!(a1.await, Ok(json!("a1")));
        assert_eq!(b1.await, Ok(json!("b1")));
        assert_eq!(a2.await, Ok(json!("a2")));
        assert_eq!(alice.pending_count(), 0);
        assert_eq!(bob.pending_count(), 0);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_request_carries_client_and_instance() {
    common::init_tracing();
    common::run_local(async {
        let bus = LocalBus::new();
        let server = echo_server(&bus, "Audit");
        let requests = intercept_requests(&bus, "Audit", "echo");
        let client = server.new_client("tenant-a", ClientOptions::new().with_client_name("ui"));

        let future = client.call("echo", vec![json!(1), json!("two")]).unwrap();
        common::settle().await;

        let requests = requests.borrow();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].instance_name, "tenant-a");
        assert_eq!(requests[0].client_name, "ui");
        assert_eq!(&requests[0].request_id, future.request_id());
        assert_eq!(requests[0].args, vec![json!(1), json!("two")]);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_late_start_does_not_resolve_earlier_request() {
    common::init_tracing();
    common::run_local(async {
        let bus = LocalBus::new();
        let server = echo_server(&bus, "Late");
        let client = server.new_client(
            "main",
            ClientOptions::new().with_timeout(Duration::from_millis(500)),
        );

        let future = client.call("echo", vec![json!("early")]).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        server.start("main", None);

        assert_eq!(future.await, Err(ReplyError::Timeout));

        // The instance now exists, so new requests succeed.
        let later = client.call("echo", vec![json!("later")]).unwrap().await;
        assert_eq!(later, Ok(json!("later")));
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_behaves_like_never_started() {
    common::init_tracing();
    common::run_local(async {
        let bus = LocalBus::new();
        let server = echo_server(&bus, "Stoppable");
        server.start("main", None);
        let client = server.new_client(
            "main",
            ClientOptions::new().with_timeout(Duration::from_millis(200)),
        );

        assert_eq!(
            client.call("echo", vec![json!("up")]).unwrap().await,
            Ok(json!("up"))
        );

        server.stop("main");
        let started = tokio::time::Instant::now();
        assert_eq!(
            client.call("echo", vec![json!("down")]).unwrap().await,
            Err(ReplyError::Timeout)
        );
        assert!(started.elapsed() >= Duration::from_millis(200));
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_late_response_after_timeout_is_ignored() {
    common::init_tracing();
    common::run_local(async {
        let bus = LocalBus::new();
        let server = echo_server(&bus, "Slow");
        let requests = intercept_requests(&bus, "Slow", "echo");
        let client = server.new_client(
            "main",
            ClientOptions::new().with_timeout(Duration::from_millis(100)),
        );

        let future = client.call("echo", vec![json!("slow")]).unwrap();
        assert_eq!(future.await, Err(ReplyError::Timeout));
        assert_eq!(client.pending_count(), 0);

        let request = requests.borrow_mut().pop().unwrap();
        answer(&bus, "Slow", "echo", request, json!("too late").into());
        common::settle().await;

        assert_eq!(client.pending_count(), 0);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_response_settles_once() {
    common::init_tracing();
    common::run_local(async {
        let bus = LocalBus::new();
        let server = echo_server(&bus, "Dup");
        let requests = intercept_requests(&bus, "Dup", "echo");
        let client = server.new_client("main", ClientOptions::default());

        let future = client.call("echo", vec![json!("x")]).unwrap();
        common::settle().await;

        let request = requests.borrow_mut().pop().unwrap();
        answer(&bus, "Dup", "echo", request.clone(), json!("first").into());
        answer(&bus, "Dup", "echo", request, ResponseData::invalid());

        assert_eq!(future.await, Ok(json!("first")));
        common::settle().await;
        assert_eq!(client.pending_count(), 0);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_handlers_added_later_are_invisible_to_existing_clients() {
    common::init_tracing();
    common::run_local(async {
        let bus = LocalBus::new();
        let server = echo_server(&bus, "Growing");
        server.start("main", None);
        let early = server.new_client("main", ClientOptions::default());

        server.add_request_handler("shout", |_: &Settings, args: &[Value]| {
            args.first().and_then(Value::as_str).unwrap_or_default().to_uppercase()
        });
        let late = server.new_client("main", ClientOptions::default());

        assert!(early.method("shout").is_none());
        assert!(matches!(
            early.call("shout", vec![json!("hi")]),
            Err(penpal::PenpalError::UnknownMethod(_))
        ));

        assert_eq!(late.method_names(), ["echo".to_string(), "shout".to_string()]);
        assert_eq!(
            late.call("shout", vec![json!("hi")]).unwrap().await,
            Ok(json!("HI"))
        );
        assert_eq!(
            early.call("echo", vec![json!("still here")]).unwrap().await,
            Ok(json!("still here"))
        );
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_handler_sees_restarted_settings() {
    common::init_tracing();
    common::run_local(async {
        let bus = LocalBus::new();
        let server = Server::new(
            bus,
            "Config",
            RequestHandlers::new().with("mode", |settings: &Settings, _: &[Value]| {
                settings.get("mode").cloned().unwrap_or(Value::Null)
            }),
        );
        let client = server.new_client("main", ClientOptions::default());

        let mut first = Settings::new();
        first.insert("mode".to_string(), json!("fast"));
        server.start("main", Some(first));
        assert_eq!(client.call("mode", vec![]).unwrap().await, Ok(json!("fast")));

        let mut second = Settings::new();
        second.insert("mode".to_string(), json!("safe"));
        server.start("main", Some(second));
        assert_eq!(client.call("mode", vec![]).unwrap().await, Ok(json!("safe")));
    })
    .await;
}
