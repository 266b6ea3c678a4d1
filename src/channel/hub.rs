//! In-process one-to-many broadcast transport shared by all contexts

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

/// How many in-flight envelopes a slow subscriber can fall behind before
/// the transport starts dropping on it.
const HUB_CAPACITY: usize = 256;

/// Process-wide context id source. Global rather than per-hub so an id
/// restored from the store can never collide with one a later hub mints.
static CONTEXT_SEQ: AtomicU64 = AtomicU64::new(1);

/// Identifier of an isolated execution context attached to the hub. Stable
/// across reloads of the same page, the way a tab keeps its id across
/// navigations.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ContextId(pub u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// What an envelope carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    Request,
    Reply,
    Event,
}

/// The untyped wire unit contexts exchange. Bodies are plain JSON; typing
/// happens at the edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub from: ContextId,
    /// None broadcasts to every listening context.
    pub to: Option<ContextId>,
    pub kind: EnvelopeKind,
    /// Service name for requests and replies, event name for events.
    pub name: String,
    pub correlation: Option<u64>,
    pub body: Value,
    /// Channel instance that sent this; receivers skip their own traffic.
    pub(crate) sender: u64,
}

/// A context's endpoint on the messaging fabric. Delivery is best-effort
/// one-to-many: every subscriber sees every envelope, a send with nobody
/// listening vanishes, and a lagging subscriber loses messages instead of
/// exerting backpressure.
pub trait Transport: Send + Sync {
    fn context_id(&self) -> ContextId;
    fn send(&self, envelope: Envelope);
    fn subscribe(&self) -> broadcast::Receiver<Envelope>;
    /// Announce that an endpoint in this context handles `service`.
    fn register_service(&self, service: &str);
    /// Withdraw one [`register_service`](Transport::register_service)
    /// announcement.
    fn unregister_service(&self, service: &str);
    /// Whether any endpoint in this context currently handles `service`.
    fn provides(&self, service: &str) -> bool;
}

/// The in-process messaging fabric. One hub per "browser": every context
/// attaches to it, and the focused-page slot backs the control surface's
/// focus resolver.
pub struct MessageHub {
    tx: broadcast::Sender<Envelope>,
    focused: Mutex<Option<ContextId>>,
    /// How many endpoints per context provide each service. Lets an
    /// endpoint that lacks a handler tell "nobody here provides this"
    /// apart from "a sibling endpoint owns it".
    services: Mutex<HashMap<(ContextId, String), usize>>,
}

impl MessageHub {
    pub fn new() -> Arc<Self> {
        let (tx, _) = broadcast::channel(HUB_CAPACITY);
        Arc::new(Self {
            tx,
            focused: Mutex::new(None),
            services: Mutex::new(HashMap::new()),
        })
    }

    /// Allocate a context id no other context holds.
    pub fn allocate_context(&self) -> ContextId {
        ContextId(CONTEXT_SEQ.fetch_add(1, Ordering::Relaxed))
    }

    fn register_service(&self, context: ContextId, service: &str) {
        *self
            .services
            .lock()
            .entry((context, service.to_string()))
            .or_insert(0) += 1;
    }

    fn unregister_service(&self, context: ContextId, service: &str) {
        let mut services = self.services.lock();
        let key = (context, service.to_string());
        if let Some(count) = services.get_mut(&key) {
            *count -= 1;
            if *count == 0 {
                services.remove(&key);
            }
        }
    }

    fn context_provides(&self, context: ContextId, service: &str) -> bool {
        self.services
            .lock()
            .contains_key(&(context, service.to_string()))
    }

    /// Attach a transport endpoint for `context`. A reloaded page
    /// reattaches with the id it had before.
    pub fn attach(self: &Arc<Self>, context: ContextId) -> HubTransport {
        HubTransport {
            context,
            hub: self.clone(),
        }
    }

    /// Record which page currently has focus.
    pub fn set_focused(&self, context: Option<ContextId>) {
        *self.focused.lock() = context;
    }

    pub fn focused(&self) -> Option<ContextId> {
        *self.focused.lock()
    }
}

/// [`Transport`] implementation handed out by [`MessageHub::attach`].
#[derive(Clone)]
pub struct HubTransport {
    context: ContextId,
    hub: Arc<MessageHub>,
}

impl Transport for HubTransport {
    fn context_id(&self) -> ContextId {
        self.context
    }

    fn send(&self, envelope: Envelope) {
        // Err here only means no subscriber is alive; a lossy broadcast
        // with no listeners simply disappears.
        let _ = self.hub.tx.send(envelope);
    }

    fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.hub.tx.subscribe()
    }

    fn register_service(&self, service: &str) {
        self.hub.register_service(self.context, service);
    }

    fn unregister_service(&self, service: &str) {
        self.hub.unregister_service(self.context, service);
    }

    fn provides(&self, service: &str) -> bool {
        self.hub.context_provides(self.context, service)
    }
}
