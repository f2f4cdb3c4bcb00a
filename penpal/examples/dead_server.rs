//! A client calling an instance that was never started times out.
//!
//! Run with: `RUST_LOG=penpal=trace cargo run --example dead_server`

use std::time::{Duration, Instant};

use penpal::{ClientOptions, LocalBus, PenpalError, RequestHandlers, Server, Settings};
use serde_json::{json, Value};
use tokio::task::LocalSet;
use tracing_subscriber::EnvFilter;

async fn run() -> Result<(), PenpalError> {
    let server = Server::new(
        LocalBus::new(),
        "DeadServer",
        RequestHandlers::new().with("hi", |_: &Settings, _: &[Value]| json!("hi!")),
    );

    let client = server.new_client(
        "main",
        ClientOptions::new().with_timeout(Duration::from_secs(1)),
    );

    let started = Instant::now();
    match client.call("hi", vec![])?.await {
        Ok(reply) => println!("unexpected reply: {reply}"),
        Err(err) => println!("hi failed after {:?}: {err}", started.elapsed()),
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
