//! Request/response on top of a one-way transport.
//!
//! Every request mints a [CorrelationId] and subscribes a transient listener to
//! the paired response event. The listener only reacts to its own id, so any
//! number of requests on the same event may be in flight at once. The
//! listener is owned by a [PendingRequest] guard and goes away with it,
//! whichever way the request ends.

use crate::name::EventNames;
use crate::transport::{Inbound, RawHandler, Scope, SubscriptionId, Transport};
use crate::{Codec, Error, ErrorKind, Payload};
use log::trace;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Opaque token pairing a request with its response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Mints a new random id.
    pub fn new() -> Self {
        CorrelationId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for CorrelationId {
    fn from(id: String) -> Self {
        CorrelationId(id)
    }
}

impl From<&str> for CorrelationId {
    fn from(id: &str) -> Self {
        CorrelationId(id.to_owned())
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A request waiting for its response.
///
/// Dropping it detaches the response listener from the transport.
struct PendingRequest {
    transport: Arc<dyn Transport>,
    correlation_id: CorrelationId,
    response_event: Arc<str>,
    subscription: SubscriptionId,
    in_flight: Arc<AtomicUsize>,
}

impl PendingRequest {
    fn register(
        transport: Arc<dyn Transport>,
        response_event: Arc<str>,
        in_flight: Arc<AtomicUsize>,
    ) -> (Self, oneshot::Receiver<String>) {
        let correlation_id = CorrelationId::new();
        let (tx, rx) = oneshot::channel();
        let slot = Mutex::new(Some(tx));

        let expected = correlation_id.clone();
        let listener: RawHandler = Arc::new(move |inbound: Inbound| {
            if inbound.correlation_id.as_ref() != Some(&expected) {
                return;
            }

            let tx = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
            match tx {
                Some(tx) => {
                    // The receiver is gone when the request was abandoned meanwhile.
                    let _ = tx.send(inbound.payload);
                }
                None => trace!("dropping duplicate response for {}", expected),
            }
        });

        let subscription = transport.subscribe(&response_event, listener);
        in_flight.fetch_add(1, Ordering::SeqCst);

        let pending = PendingRequest {
            transport,
            correlation_id,
            response_event,
            subscription,
            in_flight,
        };

        (pending, rx)
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        self.transport
            .unsubscribe(&self.response_event, self.subscription);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        trace!(
            "detached `{}` listener for {}",
            self.response_event,
            self.correlation_id
        );
    }
}

/// Sends requests and waits for their correlated responses.
pub(crate) struct CorrelationEngine<C> {
    transport: Arc<dyn Transport>,
    codec: Arc<C>,
    in_flight: Arc<AtomicUsize>,
}

impl<C: Codec> CorrelationEngine<C> {
    pub fn new(transport: Arc<dyn Transport>, codec: Arc<C>) -> Self {
        CorrelationEngine {
            transport,
            codec,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of requests currently waiting for a response.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Sends `req` to `target` and waits for the response.
    ///
    /// A zero `timeout` waits forever.
    pub async fn request<Req, Res>(
        &self,
        target: Scope,
        names: &EventNames,
        req: &Req,
        timeout: Duration,
    ) -> crate::Result<Res>
    where
        Req: Payload,
        Res: Payload,
    {
        let payload = self.codec.encode(req)?;
        let (pending, rx) = PendingRequest::register(
            self.transport.clone(),
            names.response.clone(),
            self.in_flight.clone(),
        );

        trace!(
            "sending `{}` to {} as {}",
            names.event,
            target,
            pending.correlation_id
        );
        self.transport.send(
            target,
            &names.event,
            Some(&pending.correlation_id),
            payload,
        );

        let received = if timeout.is_zero() {
            rx.await
        } else {
            // A deadline past what `Instant` can represent waits forever.
            match tokio::time::timeout(timeout, rx).await {
                Ok(received) => received,
                Err(_) => return Err(Error::timeout(&names.event, timeout)),
            }
        };
        drop(pending);

        let payload = received.map_err(|_| {
            Error::new(
                ErrorKind::ChannelClosed,
                format!("listener for `{}` was dropped", names.response),
            )
        })?;

        self.codec.decode(&payload)
    }
}
