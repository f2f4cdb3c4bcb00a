//! Greeting and per-instance echo servers.
//!
//! Run with: `RUST_LOG=penpal=debug cargo run --example greeting`

use penpal::{ClientOptions, LocalBus, PenpalError, RequestHandlers, Server, Settings};
use serde_json::{json, Value};
use tokio::task::LocalSet;
use tracing_subscriber::EnvFilter;

fn prefix_settings(prefix: &str) -> Settings {
    let mut settings = Settings::new();
    settings.insert("prefix".to_string(), json!(prefix));
    settings
}

async fn run() -> Result<(), PenpalError> {
    let bus = LocalBus::new();

    let foo = Server::new(
        bus.clone(),
        "Foo",
        RequestHandlers::new().with("greeting", |_: &Settings, args: &[Value]| {
            format!("Hello {}", args.first().and_then(Value::as_str).unwrap_or_default())
        }),
    );
    foo.start("bar", None);

    let client = foo.new_client("bar", ClientOptions::default());
    match client.call("greeting", vec![json!("ben")])?.await {
        Ok(reply) => println!("greeting: {reply}"),
        Err(err) => println!("greeting failed: {err}"),
    }

    let echo_server = Server::new(
        bus,
        "EchoServer",
        RequestHandlers::new().with("echo", |settings: &Settings, args: &[Value]| {
            let prefix = settings
                .get("prefix")
                .and_then(Value::as_str)
                .unwrap_or("Hello ");
            format!("{}{}", prefix, args.first().and_then(Value::as_str).unwrap_or_default())
        }),
    );
    echo_server.start("mean-server", Some(prefix_settings("Shut up ")));
    echo_server.start("nice-server", Some(prefix_settings("Hola ")));

    let mean = echo_server.new_client("mean-server", ClientOptions::default());
    let nice = echo_server.new_client("nice-server", ClientOptions::default());

    // Both requests are in flight at once.
    let mean_reply = mean.call("echo", vec![json!("haha")])?;
    let nice_reply = nice.call("echo", vec![json!("amigo!")])?;

    for (label, reply) in [("mean", mean_reply.await), ("nice", nice_reply.await)] {
        match reply {
            Ok(reply) => println!("{label}: {reply}"),
            Err(err) => println!("{label} failed: {err}"),
        }
    }

    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("Failed to create Tokio runtime");

    if let Err(e) = LocalSet::new().block_on(&runtime, run()) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
