//! Clients: callers of a server instance's handlers.
//!
//! A [`Client`] is bound to one server and one instance name. At construction
//! it snapshots the server's handler names; each becomes a callable
//! [`Method`]. Handlers added to the server later are not visible.
//!
//! Every call returns a [`ResponseFuture`] immediately. The outcome arrives
//! through one of two independent turns:
//!
//! - the response router, matching `clientRequest.requestId` against the
//!   pending table
//! - the request's timeout task, rejecting with [`ReplyError::Timeout`]
//!
//! Whichever removes the pending entry first settles the request.
//!
//! [`ReplyError::Timeout`]: crate::ReplyError::Timeout

use std::rc::{Rc, Weak};
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::bus::{Listener, MessageBus};
use crate::correlation::{PendingRequest, PendingRequests, ResponseFuture};
use crate::error::{PenpalError, ReplyError};
use crate::id::generate_id;
use crate::message::{request_channel, response_channel, RequestId, RequestMessage, ResponseData};
use crate::options::ClientOptions;
use crate::server::Server;

/// Caller bound to one server instance.
///
/// Must be used from within a `tokio::task::LocalSet`: request timers run as
/// local tasks.
///
/// The bus has no unsubscribe, so a dropped client leaves one inert response
/// listener per method behind. Those listeners only hold a `Weak` to the
/// pending table and return immediately once the client is gone.
///
/// # Example
///
/// ```rust,ignore
/// let client = server.new_client("mean-server", ClientOptions::default());
/// let echo = client.method("echo").expect("snapshotted at construction");
/// assert_eq!(echo.call(vec![json!("haha")]).await?, json!("Shut up haha"));
/// ```
pub struct Client<B: MessageBus> {
    bus: B,
    server_name: String,
    instance_name: String,
    client_name: String,
    timeout: Duration,
    methods: Vec<String>,
    pending: Rc<PendingRequests>,
}

impl<B: MessageBus + Clone + 'static> Client<B> {
    /// Bind a client to `server`'s instance `instance_name`.
    ///
    /// Subscribes the response router once per handler name known right now.
    pub fn new(server: &Server<B>, instance_name: impl Into<String>, options: ClientOptions) -> Self {
        let methods = server.handler_names();
        let pending = Rc::new(PendingRequests::new());
        let bus = server.bus().clone();
        let channel = response_channel(server.name());

        for method in &methods {
            let pending = Rc::downgrade(&pending);
            let listener: Listener = Rc::new(move |payload| route_weak(&pending, payload));
            bus.subscribe(&channel, method, listener);
        }

        let client = Self {
            bus,
            server_name: server.name().to_string(),
            instance_name: instance_name.into(),
            client_name: options
                .client_name()
                .map_or_else(generate_id, str::to_string),
            timeout: options.timeout(),
            methods,
            pending,
        };

        tracing::debug!(
            server = %client.server_name,
            instance = %client.instance_name,
            client = %client.client_name,
            methods = ?client.methods,
            "Client created"
        );
        client
    }

    /// The callable for `name`, if it existed when this client was built.
    pub fn method(&self, name: &str) -> Option<Method<'_, B>> {
        self.methods
            .iter()
            .find(|method| method.as_str() == name)
            .map(|name| Method { client: self, name })
    }

    /// All callables of this client.
    pub fn methods(&self) -> impl Iterator<Item = Method<'_, B>> {
        self.methods.iter().map(move |name| Method { client: self, name })
    }

    /// Call handler `name` with positional `args`.
    ///
    /// # Errors
    ///
    /// [`PenpalError::UnknownMethod`] if `name` was not a handler when this
    /// client was constructed. Protocol failures arrive through the future.
    pub fn call(&self, name: &str, args: Vec<Value>) -> Result<ResponseFuture, PenpalError> {
        let method = self
            .method(name)
            .ok_or_else(|| PenpalError::UnknownMethod(name.to_string()))?;
        Ok(method.call(args))
    }

    /// Handler names snapshotted at construction.
    pub fn method_names(&self) -> &[String] {
        &self.methods
    }

    /// Name carried in this client's requests.
    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    /// Instance this client targets.
    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    /// Name of the server this client targets.
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// How long a request may stay unanswered.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of requests still awaiting an outcome.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn send(&self, method: &str, args: Vec<Value>) -> ResponseFuture {
        let request_id = RequestId::generate();
        let (tx, rx) = oneshot::channel();

        // Spawned tasks do not run before this turn yields, so the entry is
        // always registered before the timer can look for it.
        let timer = self.spawn_timeout(request_id.clone());
        self.pending
            .register(request_id.clone(), PendingRequest::new(tx).with_timer(timer));

        let request = RequestMessage {
            instance_name: self.instance_name.clone(),
            client_name: self.client_name.clone(),
            request_id: request_id.clone(),
            args,
        };

        tracing::debug!(
            server = %self.server_name,
            instance = %self.instance_name,
            client = %self.client_name,
            %request_id,
            method,
            "Sending request"
        );

        match request.to_payload() {
            Ok(payload) => self
                .bus
                .broadcast(&request_channel(&self.server_name), method, payload),
            Err(err) => {
                // Left pending: the timer settles it.
                tracing::warn!(%request_id, error = %err, "Failed to encode request");
            }
        }

        ResponseFuture::new(request_id, rx)
    }

    /// The deadline is fixed at call time, not when the task first runs.
    fn spawn_timeout(&self, request_id: RequestId) -> JoinHandle<()> {
        let pending = Rc::clone(&self.pending);
        let deadline = Instant::now() + self.timeout;
        tokio::task::spawn_local(async move {
            tokio::time::sleep_until(deadline).await;
            pending.handle_timeout(&request_id);
        })
    }
}

/// The part of a response the router needs. Other request fields are
/// ignored, so a peer may echo only `clientRequest.requestId`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoutedResponse {
    client_request: RoutedRequest,
    response_data: ResponseData,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoutedRequest {
    request_id: RequestId,
}

fn route_weak(pending: &Weak<PendingRequests>, payload: Value) {
    if let Some(pending) = pending.upgrade() {
        route_response(&pending, payload);
    }
}

/// Shared by every response subscription of one client.
fn route_response(pending: &PendingRequests, payload: Value) {
    let response = match serde_json::from_value::<RoutedResponse>(payload) {
        Ok(response) => response,
        Err(err) => {
            tracing::trace!(error = %err, "Discarding undecodable response");
            return;
        }
    };

    let outcome = match response.response_data {
        ResponseData::Value(value) => Ok(value),
        ResponseData::Code(code) => Err(ReplyError::from(code)),
    };

    // Late responses and responses for other clients land here.
    if let Err(err) = pending.complete(&response.client_request.request_id, outcome) {
        tracing::trace!(error = %err, "Discarding response");
    }
}

impl<B: MessageBus> std::fmt::Debug for Client<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("server_name", &self.server_name)
            .field("instance_name", &self.instance_name)
            .field("client_name", &self.client_name)
            .field("timeout", &self.timeout)
            .field("methods", &self.methods)
            .field("pending", &self.pending.len())
            .finish()
    }
}

/// One remote operation of a [`Client`].
pub struct Method<'a, B: MessageBus> {
    client: &'a Client<B>,
    name: &'a str,
}

impl<B: MessageBus + Clone + 'static> Method<'_, B> {
    /// Handler name.
    pub fn name(&self) -> &str {
        self.name
    }

    /// Issue the request. Never blocks; the future settles exactly once.
    pub fn call(&self, args: Vec<Value>) -> ResponseFuture {
        self.client.send(self.name, args)
    }
}

impl<B: MessageBus> std::fmt::Debug for Method<'_, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Method").field("name", &self.name).finish()
    }
}
