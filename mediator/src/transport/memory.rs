//! An in-process network with one server endpoint and any number of clients.
//!
//! Delivery happens synchronously inside [Transport::send], in send order, to
//! the listeners subscribed at that moment. Events for a disconnected client
//! are dropped.

use super::{Inbound, PeerId, RawHandler, Scope, SubscriptionId, Transport};
use crate::CorrelationId;
use log::{trace, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

#[derive(Default)]
struct Listeners {
    next_id: AtomicU64,
    by_name: Mutex<HashMap<String, Vec<(SubscriptionId, RawHandler)>>>,
}

impl Listeners {
    fn add(&self, event_name: &str, handler: RawHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut by_name = self.by_name.lock().unwrap_or_else(PoisonError::into_inner);
        by_name
            .entry(event_name.to_owned())
            .or_insert_with(Vec::new)
            .push((id, handler));
        id
    }

    fn remove(&self, event_name: &str, id: SubscriptionId) {
        let mut by_name = self.by_name.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handlers) = by_name.get_mut(event_name) {
            handlers.retain(|(sub, _)| *sub != id);
            if handlers.is_empty() {
                by_name.remove(event_name);
            }
        }
    }

    fn count(&self, event_name: &str) -> usize {
        let by_name = self.by_name.lock().unwrap_or_else(PoisonError::into_inner);
        by_name.get(event_name).map_or(0, Vec::len)
    }

    fn deliver(&self, event_name: &str, inbound: Inbound) {
        // Snapshot so listeners can (un)subscribe while being called.
        let handlers: Vec<RawHandler> = {
            let by_name = self.by_name.lock().unwrap_or_else(PoisonError::into_inner);
            match by_name.get(event_name) {
                Some(handlers) => handlers.iter().map(|(_, h)| h.clone()).collect(),
                None => Vec::new(),
            }
        };

        if handlers.is_empty() {
            trace!("no listener for `{}` from {}", event_name, inbound.source);
            return;
        }

        for handler in handlers {
            handler(inbound.clone());
        }
    }
}

#[derive(Default)]
struct Network {
    server: Arc<Listeners>,
    clients: RwLock<HashMap<PeerId, Arc<Listeners>>>,
    next_peer: AtomicU32,
}

impl Network {
    fn client(&self, id: PeerId) -> Option<Arc<Listeners>> {
        let clients = self.clients.read().unwrap_or_else(PoisonError::into_inner);
        clients.get(&id).cloned()
    }

    fn all_clients(&self) -> Vec<Arc<Listeners>> {
        let clients = self.clients.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<_> = clients.keys().copied().collect();
        ids.sort();
        ids.into_iter().filter_map(|id| clients.get(&id).cloned()).collect()
    }
}

/// An in-memory network connecting one server with its clients.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    inner: Arc<Network>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the server endpoint. Every call returns a handle to the same endpoint.
    pub fn server(&self) -> MemoryEndpoint {
        MemoryEndpoint {
            network: self.inner.clone(),
            side: Side::Server,
            listeners: self.inner.server.clone(),
        }
    }

    /// Connects a new client and returns its endpoint.
    pub fn connect(&self) -> MemoryEndpoint {
        let id = PeerId(self.inner.next_peer.fetch_add(1, Ordering::Relaxed) + 1);
        let listeners = Arc::new(Listeners::default());

        self.inner
            .clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, listeners.clone());

        MemoryEndpoint {
            network: self.inner.clone(),
            side: Side::Client(id),
            listeners,
        }
    }

    /// Disconnects a client, events sent to it afterwards are dropped.
    pub fn disconnect(&self, id: PeerId) {
        self.inner
            .clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    /// Returns the ids of the connected clients.
    pub fn peers(&self) -> Vec<PeerId> {
        let clients = self
            .inner
            .clients
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<_> = clients.keys().copied().collect();
        ids.sort();
        ids
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Server,
    Client(PeerId),
}

/// One process attached to a [MemoryNetwork].
#[derive(Clone)]
pub struct MemoryEndpoint {
    network: Arc<Network>,
    side: Side,
    listeners: Arc<Listeners>,
}

impl MemoryEndpoint {
    /// Returns the client id, `None` for the server endpoint.
    pub fn peer_id(&self) -> Option<PeerId> {
        match self.side {
            Side::Server => None,
            Side::Client(id) => Some(id),
        }
    }

    /// Number of listeners subscribed to `event_name` on this endpoint.
    pub fn listener_count(&self, event_name: &str) -> usize {
        self.listeners.count(event_name)
    }
}

impl Transport for MemoryEndpoint {
    fn send(
        &self,
        target: Scope,
        event_name: &str,
        correlation_id: Option<&CorrelationId>,
        payload: String,
    ) {
        let inbound = |source: Scope| Inbound {
            source,
            correlation_id: correlation_id.cloned(),
            payload: payload.clone(),
        };

        match (self.side, target) {
            (_, Scope::Local) => self.listeners.deliver(event_name, inbound(Scope::Local)),
            (Side::Server, Scope::Remote) => {
                for client in self.network.all_clients() {
                    client.deliver(event_name, inbound(Scope::Remote));
                }
            }
            (Side::Server, Scope::Peer(id)) => match self.network.client(id) {
                Some(client) => client.deliver(event_name, inbound(Scope::Remote)),
                None => trace!("{} is not connected, dropping `{}`", id, event_name),
            },
            (Side::Client(id), Scope::Remote) => {
                self.network.server.deliver(event_name, inbound(Scope::Peer(id)))
            }
            (Side::Client(id), Scope::Peer(other)) => {
                warn!(
                    "{} cannot address {} directly, dropping `{}`",
                    id, other, event_name
                );
            }
        }
    }

    fn subscribe(&self, event_name: &str, handler: RawHandler) -> SubscriptionId {
        self.listeners.add(event_name, handler)
    }

    fn unsubscribe(&self, event_name: &str, id: SubscriptionId) {
        self.listeners.remove(event_name, id)
    }
}
