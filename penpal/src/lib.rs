//! # Penpal
//!
//! Request/response messaging on top of a publish-subscribe bus.
//!
//! A [`Server`] exposes named request handlers. Each started *instance* of a
//! server carries its own settings, handed explicitly to every handler call.
//! A [`Client`] bound to an instance calls those handlers as if they were
//! local and gets a [`ResponseFuture`] back, settled by the matching response
//! or by a timeout.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  Request.<server>/<handler>   ┌──────────────┐
//! │    Client    │ ───────────────────────────► │    Server    │
//! │ pending: id  │                              │ instances    │
//! │  → promise   │ ◄─────────────────────────── │ handlers     │
//! └──────────────┘  Response.<server>/<handler> └──────────────┘
//!         ▲                                            ▲
//!         └──────────── MessageBus (LocalBus) ─────────┘
//! ```
//!
//! Everything is single-threaded: state lives in `Rc`/`RefCell`, and bus
//! delivery plus request timeouts run as `tokio::task::spawn_local` tasks.
//! Drive servers and clients from inside a `tokio::task::LocalSet`.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use penpal::{ClientOptions, LocalBus, RequestHandlers, Server};
//! use serde_json::{json, Value};
//!
//! let bus = LocalBus::new();
//! let server = Server::new(
//!     bus,
//!     "Foo",
//!     RequestHandlers::new().with("greeting", |_settings, args| {
//!         format!("Hello {}", args.first().and_then(Value::as_str).unwrap_or_default())
//!     }),
//! );
//! server.start("bar", None);
//!
//! let client = server.new_client("bar", ClientOptions::default());
//! let reply = client.call("greeting", vec![json!("ben")])?.await;
//! assert_eq!(reply, Ok(json!("Hello ben")));
//! ```
//!
//! ## Failure
//!
//! | Outcome | How it surfaces |
//! |---------|-----------------|
//! | Handler returns [`ResponseCode::Invalid`] | [`ReplyError::Invalid`] |
//! | No response within the timeout | [`ReplyError::Timeout`] |
//! | Instance not started | nothing is sent back; [`ReplyError::Timeout`] |
//! | Response for an unknown request | silently discarded |

#![deny(missing_docs)]

pub mod bus;
pub mod client;
pub mod correlation;
pub mod error;
pub mod id;
pub mod message;
pub mod options;
pub mod server;

pub use bus::{Listener, LocalBus, MessageBus};
pub use client::{Client, Method};
pub use correlation::{Reply, ResponseFuture};
pub use error::{PenpalError, ReplyError};
pub use message::{RequestId, RequestMessage, ResponseCode, ResponseData, ResponseMessage};
pub use options::{ClientOptions, DEFAULT_TIMEOUT};
pub use server::{HandlerFn, RequestHandlers, Server, Settings};
