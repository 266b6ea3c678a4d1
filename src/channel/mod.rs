//! Request/response and fire-and-forget messaging between contexts
//!
//! A `Channel` layers correlation-id request routing on top of the raw
//! broadcast [`Transport`]. Requests resolve when the matching reply comes
//! back, fail with `Timeout` when it never does (the remote context is gone
//! or never existed), and resolve to JSON null when the remote context is
//! alive but nobody provides the service.

pub mod hub;

pub use hub::{ContextId, Envelope, EnvelopeKind, HubTransport, MessageHub, Transport};

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

/// Default bound on a request round trip. Generous because a start-record
/// reply can legitimately wait on a user permission prompt.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Process-wide correlation id source. Monotonically increasing, so two
/// channel instances can never mint the same id.
static CORRELATION: AtomicU64 = AtomicU64::new(1);

/// Channel instance ids, used to skip self-delivered broadcast traffic.
static CHANNEL_SEQ: AtomicU64 = AtomicU64::new(1);

type ServiceHandler =
    Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, String>> + Send + Sync>;
type EventHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// Resolves "the currently focused page" for [`RequestTarget::Focused`].
pub type FocusResolver = Arc<dyn Fn() -> Option<ContextId> + Send + Sync>;

/// Where a request is going.
#[derive(Clone, Copy, Debug)]
pub enum RequestTarget {
    Context(ContextId),
    /// Resolved through the externally supplied focus resolver.
    Focused,
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("no reply to {service} within {timeout_ms}ms")]
    Timeout { service: String, timeout_ms: u64 },
    #[error("no focused page context to address")]
    NoFocusedContext,
    #[error("transport closed before a reply arrived")]
    TransportClosed,
    #[error("{service} rejected the request: {message}")]
    Rejected { service: String, message: String },
}

/// One messaging endpoint inside a context. Each instance holds exactly one
/// transport subscription; several instances in the same context multiplex
/// safely because replies route by correlation id and every instance
/// ignores its own transmissions.
pub struct Channel {
    inner: Arc<ChannelInner>,
    timeout: Duration,
    focus: Option<FocusResolver>,
    dispatch: JoinHandle<()>,
}

struct ChannelInner {
    id: u64,
    context: ContextId,
    transport: Arc<dyn Transport>,
    pending: Mutex<HashMap<u64, oneshot::Sender<Result<Value, ChannelError>>>>,
    services: Mutex<HashMap<String, ServiceHandler>>,
    listeners: Mutex<HashMap<String, Vec<EventHandler>>>,
}

impl Channel {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let inner = Arc::new(ChannelInner {
            id: CHANNEL_SEQ.fetch_add(1, Ordering::Relaxed),
            context: transport.context_id(),
            transport: transport.clone(),
            pending: Mutex::new(HashMap::new()),
            services: Mutex::new(HashMap::new()),
            listeners: Mutex::new(HashMap::new()),
        });
        // Subscribe before spawning so nothing sent after `new` returns can
        // be missed.
        let rx = transport.subscribe();
        let dispatch = tokio::spawn(dispatch_loop(inner.clone(), rx));
        Self {
            inner,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            focus: None,
            dispatch,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_focus_resolver(mut self, resolver: FocusResolver) -> Self {
        self.focus = Some(resolver);
        self
    }

    pub fn context_id(&self) -> ContextId {
        self.inner.context
    }

    /// Register the asynchronous handler for `service` in this context.
    /// Registering a name twice replaces the earlier handler.
    pub fn provide<F, Fut>(&self, service: impl Into<String>, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        let service = service.into();
        let handler: ServiceHandler = Arc::new(move |params| Box::pin(handler(params)));
        let replaced = self
            .inner
            .services
            .lock()
            .insert(service.clone(), handler)
            .is_some();
        if replaced {
            tracing::debug!(service = %service, "service handler replaced");
        } else {
            self.inner.transport.register_service(&service);
        }
    }

    /// Subscribe a fire-and-forget listener for `event` broadcasts.
    pub fn on<F>(&self, event: impl Into<String>, listener: F)
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.inner
            .listeners
            .lock()
            .entry(event.into())
            .or_default()
            .push(Arc::new(listener));
    }

    /// Non-replying broadcast to every listening context. Ordering holds
    /// per sender only.
    pub fn emit(&self, event: &str, payload: Value) {
        self.inner.transport.send(Envelope {
            from: self.inner.context,
            to: None,
            kind: EnvelopeKind::Event,
            name: event.to_string(),
            correlation: None,
            body: payload,
            sender: self.inner.id,
        });
    }

    /// Send `params` to `service` on the target context and wait for the
    /// reply. A null result means the context is alive but does not provide
    /// the service; callers must not mistake that for success.
    pub async fn request(
        &self,
        target: RequestTarget,
        service: &str,
        params: Value,
    ) -> Result<Value, ChannelError> {
        let to = match target {
            RequestTarget::Context(id) => id,
            RequestTarget::Focused => self
                .focus
                .as_ref()
                .and_then(|resolve| resolve())
                .ok_or(ChannelError::NoFocusedContext)?,
        };
        let correlation = CORRELATION.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.inner.pending.lock();
            let displaced = pending.insert(correlation, tx);
            // A collision here would break reply routing; the counter makes
            // it unreachable.
            debug_assert!(displaced.is_none(), "duplicate correlation id");
        }
        self.inner.transport.send(Envelope {
            from: self.inner.context,
            to: Some(to),
            kind: EnvelopeKind::Request,
            name: service.to_string(),
            correlation: Some(correlation),
            body: params,
            sender: self.inner.id,
        });
        tracing::trace!(service, correlation, target = %to, "request sent");

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(ChannelError::TransportClosed),
            Err(_) => {
                self.inner.pending.lock().remove(&correlation);
                Err(ChannelError::Timeout {
                    service: service.to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
        }
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.dispatch.abort();
        for service in self.inner.services.lock().keys() {
            self.inner.transport.unregister_service(service);
        }
    }
}

async fn dispatch_loop(inner: Arc<ChannelInner>, mut rx: broadcast::Receiver<Envelope>) {
    loop {
        let envelope = match rx.recv().await {
            Ok(envelope) => envelope,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(
                    context = %inner.context,
                    skipped,
                    "channel subscription lagged, messages lost"
                );
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        if envelope.sender == inner.id {
            continue;
        }
        match envelope.kind {
            EnvelopeKind::Request => inner.clone().handle_request(envelope),
            EnvelopeKind::Reply => inner.handle_reply(envelope),
            EnvelopeKind::Event => inner.handle_event(envelope),
        }
    }
}

impl ChannelInner {
    fn handle_request(self: Arc<Self>, envelope: Envelope) {
        if envelope.to != Some(self.context) {
            return;
        }
        let Some(correlation) = envelope.correlation else {
            tracing::warn!(name = %envelope.name, "request without correlation id dropped");
            return;
        };
        let handler = self.services.lock().get(&envelope.name).cloned();
        let reply_to = envelope.from;
        match handler {
            Some(handler) => {
                // Handlers can suspend (device acquisition, agent round
                // trips), so they run off the dispatch loop.
                let inner = self;
                tokio::spawn(async move {
                    let outcome = handler(envelope.body).await;
                    inner.send_reply(reply_to, &envelope.name, correlation, outcome);
                });
            }
            None => {
                // A sibling endpoint in this context may own the handler;
                // its reply is the one the caller must see.
                if self.transport.provides(&envelope.name) {
                    return;
                }
                // Null reply: the caller resolves to "service absent"
                // instead of waiting out the timeout.
                self.send_reply(reply_to, &envelope.name, correlation, Ok(Value::Null));
            }
        }
    }

    fn send_reply(
        &self,
        to: ContextId,
        name: &str,
        correlation: u64,
        outcome: Result<Value, String>,
    ) {
        let body = match outcome {
            Ok(value) => json!({ "ok": value }),
            Err(message) => json!({ "err": message }),
        };
        self.transport.send(Envelope {
            from: self.context,
            to: Some(to),
            kind: EnvelopeKind::Reply,
            name: name.to_string(),
            correlation: Some(correlation),
            body,
            sender: self.id,
        });
    }

    fn handle_reply(&self, envelope: Envelope) {
        if envelope.to != Some(self.context) {
            return;
        }
        let Some(correlation) = envelope.correlation else {
            return;
        };
        let outcome = match decode_reply(&envelope.name, envelope.body) {
            Some(outcome) => outcome,
            None => {
                tracing::warn!(
                    name = %envelope.name,
                    correlation,
                    "malformed reply body dropped"
                );
                return;
            }
        };
        let Some(tx) = self.pending.lock().remove(&correlation) else {
            // Another channel in this context owns the correlation, or a
            // duplicate reply raced in; either way it is not ours.
            tracing::trace!(correlation, "reply with no pending request ignored");
            return;
        };
        let _ = tx.send(outcome);
    }

    fn handle_event(&self, envelope: Envelope) {
        let listeners = self
            .listeners
            .lock()
            .get(&envelope.name)
            .cloned()
            .unwrap_or_default();
        for listener in listeners {
            listener(envelope.body.clone());
        }
    }
}

fn decode_reply(service: &str, body: Value) -> Option<Result<Value, ChannelError>> {
    let Value::Object(mut map) = body else {
        return None;
    };
    if let Some(value) = map.remove("ok") {
        return Some(Ok(value));
    }
    if let Some(Value::String(message)) = map.remove("err") {
        return Some(Err(ChannelError::Rejected {
            service: service.to_string(),
            message,
        }));
    }
    None
}
