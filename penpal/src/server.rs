//! Servers: named handler registries with independently configured instances.
//!
//! A [`Server`] owns:
//!
//! - a name, from which its bus channels are derived
//! - a registry of request handlers, one bus subscription per handler name
//! - a registry of instances, each a settings object handed to handlers
//!
//! ```text
//! Request.<name>/<handler> ──► listener
//!                               │ decode RequestMessage
//!                               │ instance missing? ──► drop (caller times out)
//!                               │ handler(&settings, &args)
//!                               ▼
//! Response.<name>/<handler> ◄── ResponseMessage { clientRequest, responseData }
//! ```

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::{Rc, Weak};

use serde_json::{Map, Value};

use crate::bus::{Listener, MessageBus};
use crate::client::Client;
use crate::error::PenpalError;
use crate::message::{
    request_channel, response_channel, RequestMessage, ResponseData, ResponseMessage,
};
use crate::options::ClientOptions;

/// Settings object of a server instance.
pub type Settings = Map<String, Value>;

/// Type-erased request handler.
///
/// Receives the target instance's settings and the request's positional
/// arguments. Failure is signalled by returning
/// [`ResponseData::Code`]`(`[`ResponseCode::Invalid`](crate::ResponseCode::Invalid)`)`;
/// panics are not converted into rejections.
pub type HandlerFn = Rc<dyn Fn(&Settings, &[Value]) -> ResponseData>;

fn erase<F, R>(handler: F) -> HandlerFn
where
    F: Fn(&Settings, &[Value]) -> R + 'static,
    R: Into<ResponseData>,
{
    Rc::new(move |settings: &Settings, args: &[Value]| handler(settings, args).into())
}

/// Handlers a server starts with.
///
/// # Example
///
/// ```rust,ignore
/// let handlers = RequestHandlers::new()
///     .with("greeting", |_settings, args| {
///         format!("Hello {}", args.first().and_then(Value::as_str).unwrap_or_default())
///     });
/// ```
#[derive(Clone, Default)]
pub struct RequestHandlers {
    handlers: BTreeMap<String, HandlerFn>,
}

impl RequestHandlers {
    /// Create an empty set of handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the handler for `name`.
    pub fn with<F, R>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Settings, &[Value]) -> R + 'static,
        R: Into<ResponseData>,
    {
        self.handlers.insert(name.into(), erase(handler));
        self
    }

    /// Handler names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Number of handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether there are no handlers.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for RequestHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}

struct ServerInner<B> {
    name: String,
    bus: B,
    handlers: RefCell<BTreeMap<String, HandlerFn>>,
    instances: RefCell<HashMap<String, Rc<Settings>>>,
}

/// A named request/response server on a message bus.
///
/// Cloning yields another handle to the same registries. Listeners hold only
/// weak references, so once every handle is dropped requests go unanswered.
///
/// # Example
///
/// ```rust,ignore
/// let server = Server::new(bus, "Foo", RequestHandlers::new().with("greeting", greet));
/// server.start("bar", None);
///
/// let client = server.new_client("bar", ClientOptions::default());
/// let reply = client.call("greeting", vec![json!("ben")])?.await;
/// ```
pub struct Server<B: MessageBus> {
    inner: Rc<ServerInner<B>>,
}

impl<B: MessageBus> Clone for Server<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<B: MessageBus + Clone + 'static> Server<B> {
    /// Create a server and subscribe a listener for every handler.
    ///
    /// `name` must stay unique among servers sharing `bus`.
    pub fn new(bus: B, name: impl Into<String>, handlers: RequestHandlers) -> Self {
        let server = Self {
            inner: Rc::new(ServerInner {
                name: name.into(),
                bus,
                handlers: RefCell::new(BTreeMap::new()),
                instances: RefCell::new(HashMap::new()),
            }),
        };

        for (handler_name, handler) in handlers.handlers {
            server.install(handler_name, handler);
        }

        tracing::debug!(server = %server.inner.name, "Server created");
        server
    }

    /// The server's name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Add or replace a handler.
    ///
    /// Clients constructed earlier do not gain the new operation.
    pub fn add_request_handler<F, R>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(&Settings, &[Value]) -> R + 'static,
        R: Into<ResponseData>,
    {
        self.install(name.into(), erase(handler));
    }

    /// Activate (or reconfigure) the instance `instance_name`.
    ///
    /// `None` settings means an empty settings object.
    pub fn start(&self, instance_name: impl Into<String>, settings: Option<Settings>) {
        let instance_name = instance_name.into();
        tracing::debug!(server = %self.inner.name, instance = %instance_name, "Server::start");
        self.inner
            .instances
            .borrow_mut()
            .insert(instance_name, Rc::new(settings.unwrap_or_default()));
    }

    /// Deactivate `instance_name`.
    ///
    /// Requests already dispatched are not cancelled; later ones are dropped.
    pub fn stop(&self, instance_name: &str) {
        let removed = self.inner.instances.borrow_mut().remove(instance_name);
        tracing::debug!(
            server = %self.inner.name,
            instance = instance_name,
            was_running = removed.is_some(),
            "Server::stop"
        );
    }

    /// Create a client for `instance_name`.
    ///
    /// The instance does not need to exist yet.
    pub fn new_client(&self, instance_name: impl Into<String>, options: ClientOptions) -> Client<B> {
        Client::new(self, instance_name, options)
    }

    /// Whether `instance_name` is currently started.
    pub fn has_instance(&self, instance_name: &str) -> bool {
        self.inner.instances.borrow().contains_key(instance_name)
    }

    /// Names of started instances, sorted.
    pub fn instance_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.instances.borrow().keys().cloned().collect();
        names.sort();
        names
    }

    /// Settings of a started instance.
    pub fn settings(&self, instance_name: &str) -> Option<Settings> {
        self.inner
            .instances
            .borrow()
            .get(instance_name)
            .map(|settings| settings.as_ref().clone())
    }

    /// Registered handler names, sorted.
    pub fn handler_names(&self) -> Vec<String> {
        self.inner.handlers.borrow().keys().cloned().collect()
    }

    pub(crate) fn bus(&self) -> &B {
        &self.inner.bus
    }

    fn install(&self, handler_name: String, handler: HandlerFn) {
        let is_new = self
            .inner
            .handlers
            .borrow_mut()
            .insert(handler_name.clone(), handler)
            .is_none();

        // The listener looks the handler up per request, so a replacement
        // needs no second subscription.
        if !is_new {
            tracing::debug!(server = %self.inner.name, handler = %handler_name, "Handler replaced");
            return;
        }

        let weak = Rc::downgrade(&self.inner);
        let topic = handler_name.clone();
        let listener: Listener = Rc::new(move |payload| dispatch(&weak, &topic, payload));
        self.inner
            .bus
            .subscribe(&request_channel(&self.inner.name), &handler_name, listener);
    }
}

fn dispatch<B: MessageBus>(server: &Weak<ServerInner<B>>, handler_name: &str, payload: Value) {
    let Some(server) = server.upgrade() else {
        tracing::trace!(handler = handler_name, "Server dropped, request ignored");
        return;
    };

    if let Err(err) = handle_request(&server, handler_name, payload) {
        tracing::warn!(
            server = %server.name,
            handler = handler_name,
            error = %err,
            "Failed to handle request"
        );
    }
}

fn handle_request<B: MessageBus>(
    server: &ServerInner<B>,
    handler_name: &str,
    payload: Value,
) -> Result<(), PenpalError> {
    let request = RequestMessage::from_payload(payload)?;

    // Borrows end here so handlers may start/stop instances.
    let settings = server.instances.borrow().get(&request.instance_name).cloned();
    let Some(settings) = settings else {
        tracing::trace!(
            server = %server.name,
            instance = %request.instance_name,
            request_id = %request.request_id,
            "No such instance, request dropped"
        );
        return Ok(());
    };
    let handler = server.handlers.borrow().get(handler_name).cloned();
    let Some(handler) = handler else {
        return Ok(());
    };

    tracing::debug!(
        server = %server.name,
        instance = %request.instance_name,
        client = %request.client_name,
        request_id = %request.request_id,
        handler = handler_name,
        "Handling request"
    );

    let response_data = handler(settings.as_ref(), request.args.as_slice());
    let response = ResponseMessage {
        client_request: request,
        response_data,
    };
    server.bus.broadcast(
        &response_channel(&server.name),
        handler_name,
        response.to_payload()?,
    );
    Ok(())
}

impl<B: MessageBus> std::fmt::Debug for Server<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("name", &self.inner.name)
            .field("handlers", &self.inner.handlers.borrow().keys().collect::<Vec<_>>())
            .field("instances", &self.inner.instances.borrow().len())
            .finish()
    }
}
