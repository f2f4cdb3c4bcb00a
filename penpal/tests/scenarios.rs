//! End-to-end usage scenarios: greeting, prefixed echo, unresponsive server,
//! and handler-signalled rejection.

mod common;

use std::time::Duration;

use penpal::{ClientOptions, LocalBus, ReplyError, RequestHandlers, ResponseCode, Server, Settings};
use serde_json::{json, Value};
use tokio::time::Instant;

fn prefixed_echo(settings: &Settings, args: &[Value]) -> String {
    let prefix = settings
        .get("prefix")
        .and_then(Value::as_str)
        .unwrap_or("Hello ");
    format!("{}{}", prefix, args.first().and_then(Value::as_str).unwrap_or_default())
}

fn settings(prefix: &str) -> Settings {
    let mut settings = Settings::new();
    settings.insert("prefix".to_string(), json!(prefix));
    settings
}

#[tokio::test(start_paused = true)]
async fn test_greeting() {
    common::init_tracing();
    common::run_local(async {
        let server = Server::new(
            LocalBus::new(),
            "Foo",
            RequestHandlers::new().with("greeting", |_: &Settings, args: &[Value]| {
                format!("Hello {}", args.first().and_then(Value::as_str).unwrap_or_default())
            }),
        );
        server.start("bar", None);

        let client = server.new_client("bar", ClientOptions::default());
        let reply = client.call("greeting", vec![json!("ben")]).unwrap().await;

        assert_eq!(reply, Ok(json!("Hello ben")));
        assert_eq!(client.pending_count(), 0);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_prefixed_echo_per_instance() {
    common::init_tracing();
    common::run_local(async {
        let server = Server::new(
            LocalBus::new(),
            "EchoServer",
            RequestHandlers::new().with("echo", prefixed_echo),
        );
        server.start("mean-server", Some(settings("Shut up ")));
        server.start("nice-server", Some(settings("Hola ")));
        server.start("plain-server", None);

        let mean = server.new_client("mean-server", ClientOptions::default());
        let nice = server.new_client("nice-server", ClientOptions::default());
        let plain = server.new_client("plain-server", ClientOptions::default());

        let echo = mean.method("echo").unwrap();
        assert_eq!(echo.name(), "echo");
        assert_eq!(echo.call(vec![json!("haha")]).await, Ok(json!("Shut up haha")));
        assert_eq!(
            nice.call("echo", vec![json!("amigo!")]).unwrap().await,
            Ok(json!("Hola amigo!"))
        );
        assert_eq!(
            plain.call("echo", vec![json!("there")]).unwrap().await,
            Ok(json!("Hello there"))
        );
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_unresponsive_server_times_out() {
    common::init_tracing();
    common::run_local(async {
        let server = Server::new(
            LocalBus::new(),
            "DeadServer",
            RequestHandlers::new().with("hi", |_: &Settings, _: &[Value]| json!("never sent")),
        );

        // "main" is never started, so the request is silently dropped.
        let client = server.new_client("main", ClientOptions::default());

        let started = Instant::now();
        let reply = client.call("hi", vec![]).unwrap().await;
        let elapsed = started.elapsed();

        assert_eq!(reply, Err(ReplyError::Timeout));
        assert_eq!(reply.unwrap_err().code(), Some(ResponseCode::Timeout));
        assert!(elapsed >= Duration::from_millis(5000), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(6000), "elapsed {elapsed:?}");
        assert_eq!(client.pending_count(), 0);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_invalid_rejects_before_timeout() {
    common::init_tracing();
    common::run_local(async {
        let server = Server::new(
            LocalBus::new(),
            "Validator",
            RequestHandlers::new().with("validate", |_: &Settings, args: &[Value]| {
                match args.first().and_then(Value::as_i64) {
                    Some(n) if n >= 0 => json!(n).into(),
                    _ => penpal::ResponseData::invalid(),
                }
            }),
        );
        server.start("main", None);
        let client = server.new_client("main", ClientOptions::default());

        let started = Instant::now();
        let rejected = client.call("validate", vec![json!(-1)]).unwrap().await;
        assert_eq!(rejected, Err(ReplyError::Invalid));
        assert!(started.elapsed() < Duration::from_millis(100));

        let accepted = client.call("validate", vec![json!(7)]).unwrap().await;
        assert_eq!(accepted, Ok(json!(7)));
    })
    .await;
}
