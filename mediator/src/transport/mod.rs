use crate::CorrelationId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// In-process transport.
#[cfg(feature = "memory")]
pub mod memory;

/// Identifies a client connected to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub u32);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

/// Where an event is sent to, or where it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// The current process.
    Local,
    /// The other side: the server as seen from a client, every connected
    /// client as seen from the server.
    Remote,
    /// A single client, only addressable by the server.
    Peer(PeerId),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Local => f.write_str("local"),
            Scope::Remote => f.write_str("remote"),
            Scope::Peer(id) => write!(f, "{}", id),
        }
    }
}

/// An event as delivered by a [Transport].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    /// Where the event came from, seen from the receiving side.
    pub source: Scope,
    /// Present on requests and their responses only.
    pub correlation_id: Option<CorrelationId>,
    pub payload: String,
}

/// Callback invoked by a [Transport] for every event on a subscribed name.
pub type RawHandler = Arc<dyn Fn(Inbound) + Send + Sync>;

/// Handle returned by [Transport::subscribe], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// A one-way event primitive.
///
/// Transports carry opaque payloads keyed by event name. They never look at
/// the correlation id, never confirm delivery, and may drop events.
pub trait Transport: Send + Sync {
    /// Emits an event to `target`.
    fn send(
        &self,
        target: Scope,
        event_name: &str,
        correlation_id: Option<&CorrelationId>,
        payload: String,
    );

    /// Registers `handler` for events named `event_name` arriving from any scope.
    fn subscribe(&self, event_name: &str, handler: RawHandler) -> SubscriptionId;

    /// Removes a subscription. Unknown ids are ignored.
    fn unsubscribe(&self, event_name: &str, id: SubscriptionId);
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send(
        &self,
        target: Scope,
        event_name: &str,
        correlation_id: Option<&CorrelationId>,
        payload: String,
    ) {
        (**self).send(target, event_name, correlation_id, payload)
    }

    fn subscribe(&self, event_name: &str, handler: RawHandler) -> SubscriptionId {
        (**self).subscribe(event_name, handler)
    }

    fn unsubscribe(&self, event_name: &str, id: SubscriptionId) {
        (**self).unsubscribe(event_name, id)
    }
}
