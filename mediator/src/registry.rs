use crate::handler::ErasedHandler;
use crate::name::EventNames;
use crate::options::{DuplicatePolicy, ResponseRouting};
use crate::transport::{Inbound, RawHandler, Scope, SubscriptionId, Transport};
use crate::{CorrelationId, Error, ErrorKind};
use log::{debug, error, trace, warn};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Role a registered event name plays on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Fire-and-forget, no correlation id.
    Command,
    /// Carries a correlation id and is answered on the response event.
    Request,
    /// Broadcast to every subscriber, no correlation id.
    Notification,
}

impl Role {
    pub fn as_str(&self) -> &str {
        match *self {
            Role::Command => "command",
            Role::Request => "request",
            Role::Notification => "notification",
        }
    }

    /// Whether events of this role carry a correlation id.
    pub fn expects_correlation(&self) -> bool {
        matches!(self, Role::Request)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Registration {
    role: Role,
    response_event: Arc<str>,
    handlers: Vec<ErasedHandler>,
    subscription: SubscriptionId,
}

/// Handlers registered by the application, keyed by event name.
///
/// The map sits behind a mutex that is never held across an await or while a
/// handler runs, so registration may race with dispatch.
///
/// Events arriving from the transport are queued per event name and
/// dispatched one after the other in arrival order. Different event names
/// do not wait on each other.
pub(crate) struct HandlerRegistry {
    transport: Arc<dyn Transport>,
    runtime: Handle,
    routing: ResponseRouting,
    duplicates: DuplicatePolicy,
    entries: Mutex<HashMap<Arc<str>, Registration>>,
}

impl HandlerRegistry {
    pub fn new(
        transport: Arc<dyn Transport>,
        runtime: Handle,
        routing: ResponseRouting,
        duplicates: DuplicatePolicy,
    ) -> Self {
        HandlerRegistry {
            transport,
            runtime,
            routing,
            duplicates,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Adds a handler, subscribing to the transport on the first registration of a name.
    pub fn register(
        self: &Arc<Self>,
        names: &EventNames,
        role: Role,
        handler: ErasedHandler,
    ) -> crate::Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        match entries.get_mut(&names.event) {
            Some(registration) => {
                if registration.role != role {
                    return Err(Error::registration(format!(
                        "`{}` is registered as a {}, cannot add a {} handler",
                        names.event, registration.role, role
                    )));
                }

                match (role, self.duplicates) {
                    (Role::Notification, _) | (_, DuplicatePolicy::Append) => {
                        registration.handlers.push(handler)
                    }
                    (_, DuplicatePolicy::Replace) => {
                        registration.handlers.clear();
                        registration.handlers.push(handler);
                    }
                    (_, DuplicatePolicy::Reject) => {
                        return Err(Error::registration(format!(
                            "a {} handler for `{}` already exists",
                            role, names.event
                        )));
                    }
                }
            }
            None => {
                let (queue, inbox) = mpsc::unbounded_channel();
                let subscription = self
                    .transport
                    .subscribe(&names.event, Self::listener(names.event.clone(), queue));
                self.runtime.spawn(Self::drain(
                    Arc::downgrade(self),
                    names.event.clone(),
                    inbox,
                ));

                entries.insert(
                    names.event.clone(),
                    Registration {
                        role,
                        response_event: names.response.clone(),
                        handlers: vec![handler],
                        subscription,
                    },
                );
            }
        }

        if role == Role::Request {
            debug!(
                "added request handler for `{}` with response `{}`",
                names.event, names.response
            );
        } else {
            debug!("added {} handler for `{}`", role, names.event);
        }

        Ok(())
    }

    /// Returns the role and handler count registered for `event_name`.
    pub fn registration(&self, event_name: &str) -> Option<(Role, usize)> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(event_name)
            .map(|registration| (registration.role, registration.handlers.len()))
    }

    /// Routes an inbound event to its handlers.
    ///
    /// Events nobody registered for are dropped. An event whose correlation id
    /// contradicts the registered role fails with [ErrorKind::Protocol].
    pub async fn dispatch(&self, event_name: &str, inbound: Inbound) -> crate::Result<()> {
        let (role, response_event, handlers) = {
            let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            match entries.get(event_name) {
                Some(registration) => (
                    registration.role,
                    registration.response_event.clone(),
                    registration.handlers.clone(),
                ),
                None => {
                    trace!("no handler for `{}`, dropping it", event_name);
                    return Ok(());
                }
            }
        };

        match (role.expects_correlation(), &inbound.correlation_id) {
            (true, None) => {
                return Err(Error::protocol(format!(
                    "`{}` is registered as a request but arrived without a correlation id",
                    event_name
                )));
            }
            (false, Some(correlation_id)) => {
                return Err(Error::protocol(format!(
                    "`{}` is registered as a {} but arrived with correlation id {}",
                    event_name, role, correlation_id
                )));
            }
            _ => {}
        }

        match inbound.correlation_id {
            Some(correlation_id) => {
                let mut first_error = None;
                for handler in handlers {
                    match handler(inbound.source, inbound.payload.clone()).await {
                        Ok(Some(response)) => {
                            self.respond(&response_event, inbound.source, &correlation_id, response)
                        }
                        Ok(None) => {}
                        Err(err) => {
                            warn!("request handler for `{}` failed: {}", event_name, err);
                            first_error.get_or_insert(err);
                        }
                    }
                }

                match first_error {
                    Some(err) => Err(err),
                    None => Ok(()),
                }
            }
            None => self.fan_out(event_name, inbound, handlers).await,
        }
    }

    // Each handler runs as its own task, a failing or panicking one does not
    // keep the others from running. The first failure is returned.
    async fn fan_out(
        &self,
        event_name: &str,
        inbound: Inbound,
        handlers: Vec<ErasedHandler>,
    ) -> crate::Result<()> {
        let tasks: Vec<_> = handlers
            .into_iter()
            .map(|handler| {
                self.runtime
                    .spawn(handler(inbound.source, inbound.payload.clone()))
            })
            .collect();

        let mut first_error = None;
        for task in tasks {
            let err = match task.await {
                Ok(Ok(_)) => continue,
                Ok(Err(err)) => err,
                Err(join_error) => Error::new(
                    ErrorKind::Unknown,
                    format!("handler for `{}` panicked: {}", event_name, join_error),
                ),
            };

            warn!("handler for `{}` failed: {}", event_name, err);
            first_error.get_or_insert(err);
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn respond(
        &self,
        response_event: &str,
        requester: Scope,
        correlation_id: &CorrelationId,
        response: String,
    ) {
        match self.routing {
            ResponseRouting::Origin => {
                trace!("responding `{}` to {}", response_event, requester);
                self.transport
                    .send(requester, response_event, Some(correlation_id), response);
            }
            ResponseRouting::Broadcast => {
                trace!("responding `{}` to local and remote", response_event);
                self.transport.send(
                    Scope::Local,
                    response_event,
                    Some(correlation_id),
                    response.clone(),
                );
                self.transport
                    .send(Scope::Remote, response_event, Some(correlation_id), response);
            }
        }
    }

    fn listener(event_name: Arc<str>, queue: UnboundedSender<Inbound>) -> RawHandler {
        Arc::new(move |inbound: Inbound| {
            if queue.send(inbound).is_err() {
                trace!("dispatcher for `{}` is gone, dropping event", event_name);
            }
        })
    }

    // Holds the registry weakly between events, dropping it unsubscribes the
    // listener, which closes the queue and ends this task.
    async fn drain(
        weak: Weak<Self>,
        event_name: Arc<str>,
        mut inbox: UnboundedReceiver<Inbound>,
    ) {
        while let Some(inbound) = inbox.recv().await {
            let registry = match weak.upgrade() {
                Some(registry) => registry,
                None => break,
            };

            if let Err(err) = registry.dispatch(&event_name, inbound).await {
                error!("dispatch of `{}` failed: {}", event_name, err);
            }
        }
    }
}

impl Drop for HandlerRegistry {
    fn drop(&mut self) {
        let entries = self.entries.get_mut().unwrap_or_else(PoisonError::into_inner);
        for (event_name, registration) in entries.drain() {
            self.transport
                .unsubscribe(&event_name, registration.subscription);
        }
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use crate::handler::{erase, from_fn};
    use crate::transport::memory::{MemoryEndpoint, MemoryNetwork};
    use crate::{JsonCodec, Message, NameResolver};
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Serialize, Deserialize)]
    struct Shout(String);
    impl Message for Shout {}

    fn registry(endpoint: &MemoryEndpoint, duplicates: DuplicatePolicy) -> Arc<HandlerRegistry> {
        Arc::new(HandlerRegistry::new(
            Arc::new(endpoint.clone()),
            Handle::current(),
            ResponseRouting::Origin,
            duplicates,
        ))
    }

    fn counting(counter: &'static AtomicUsize) -> ErasedHandler {
        erase(
            Arc::new(JsonCodec),
            false,
            from_fn(move |_, _: Shout| async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    fn inbound(correlation_id: Option<&str>) -> Inbound {
        Inbound {
            source: Scope::Local,
            correlation_id: correlation_id.map(CorrelationId::from),
            payload: "\"hey\"".to_owned(),
        }
    }

    #[tokio::test]
    async fn unknown_event_is_dropped_test() {
        let network = MemoryNetwork::new();
        let registry = registry(&network.server(), DuplicatePolicy::Reject);

        registry.dispatch("Nobody", inbound(None)).await.unwrap();
        registry.dispatch("Nobody", inbound(Some("x"))).await.unwrap();
    }

    #[tokio::test]
    async fn protocol_violation_test() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);

        let network = MemoryNetwork::new();
        let registry = registry(&network.server(), DuplicatePolicy::Reject);
        let names = NameResolver::new().resolve::<Shout>().unwrap();

        registry
            .register(&names, Role::Command, counting(&CALLS))
            .unwrap();

        let err = registry.dispatch("Shout", inbound(Some("x"))).await.unwrap_err();
        assert_eq!(ErrorKind::Protocol, err.kind());
        assert_eq!(0, CALLS.load(Ordering::SeqCst));

        registry.dispatch("Shout", inbound(None)).await.unwrap();
        assert_eq!(1, CALLS.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn request_without_correlation_test() {
        let network = MemoryNetwork::new();
        let registry = registry(&network.server(), DuplicatePolicy::Reject);
        let names = NameResolver::new().resolve::<Shout>().unwrap();

        let handler = erase(
            Arc::new(JsonCodec),
            true,
            from_fn(|_, shout: Shout| async move { shout.0.to_uppercase() }),
        );
        registry.register(&names, Role::Request, handler).unwrap();

        let err = registry.dispatch("Shout", inbound(None)).await.unwrap_err();
        assert_eq!(ErrorKind::Protocol, err.kind());
    }

    #[tokio::test]
    async fn duplicate_policy_test() {
        static REJECTED: AtomicUsize = AtomicUsize::new(0);
        static REPLACED: AtomicUsize = AtomicUsize::new(0);
        static APPENDED: AtomicUsize = AtomicUsize::new(0);

        let network = MemoryNetwork::new();
        let names = NameResolver::new().resolve::<Shout>().unwrap();

        let reject = registry(&network.server(), DuplicatePolicy::Reject);
        reject.register(&names, Role::Command, counting(&REJECTED)).unwrap();
        let err = reject
            .register(&names, Role::Command, counting(&REJECTED))
            .unwrap_err();
        assert_eq!(ErrorKind::Registration, err.kind());
        assert_eq!(Some((Role::Command, 1)), reject.registration("Shout"));
        drop(reject);

        let replace = registry(&network.server(), DuplicatePolicy::Replace);
        replace.register(&names, Role::Command, counting(&REJECTED)).unwrap();
        replace.register(&names, Role::Command, counting(&REPLACED)).unwrap();
        replace.dispatch("Shout", inbound(None)).await.unwrap();
        assert_eq!(0, REJECTED.load(Ordering::SeqCst));
        assert_eq!(1, REPLACED.load(Ordering::SeqCst));
        drop(replace);

        let append = registry(&network.server(), DuplicatePolicy::Append);
        append.register(&names, Role::Command, counting(&APPENDED)).unwrap();
        append.register(&names, Role::Command, counting(&APPENDED)).unwrap();
        append.dispatch("Shout", inbound(None)).await.unwrap();
        assert_eq!(2, APPENDED.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn failing_request_handler_does_not_stop_others_test() {
        let network = MemoryNetwork::new();
        let server = network.server();
        let registry = registry(&server, DuplicatePolicy::Append);
        let names = NameResolver::new().resolve::<Shout>().unwrap();

        let responses = Arc::new(Mutex::new(Vec::new()));
        let sink = responses.clone();
        server.subscribe(
            "Shout_response",
            Arc::new(move |inbound: Inbound| sink.lock().unwrap().push(inbound.payload)),
        );

        let undecodable = erase(
            Arc::new(JsonCodec),
            true,
            from_fn(|_, n: u32| async move { n }),
        );
        let shouting = erase(
            Arc::new(JsonCodec),
            true,
            from_fn(|_, shout: Shout| async move { shout.0.to_uppercase() }),
        );
        registry.register(&names, Role::Request, undecodable).unwrap();
        registry.register(&names, Role::Request, shouting).unwrap();

        let err = registry.dispatch("Shout", inbound(Some("x"))).await.unwrap_err();
        assert_eq!(ErrorKind::Deserialization, err.kind());
        assert_eq!(vec!["\"HEY\"".to_owned()], *responses.lock().unwrap());
    }

    #[tokio::test]
    async fn role_conflict_test() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);

        let network = MemoryNetwork::new();
        let registry = registry(&network.server(), DuplicatePolicy::Append);
        let names = NameResolver::new().resolve::<Shout>().unwrap();

        registry
            .register(&names, Role::Notification, counting(&CALLS))
            .unwrap();
        let err = registry
            .register(&names, Role::Command, counting(&CALLS))
            .unwrap_err();

        assert_eq!(ErrorKind::Registration, err.kind());
        assert_eq!(Some((Role::Notification, 1)), registry.registration("Shout"));
    }

    #[tokio::test]
    async fn failing_subscriber_does_not_stop_others_test() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);

        let network = MemoryNetwork::new();
        let registry = registry(&network.server(), DuplicatePolicy::Reject);
        let names = NameResolver::new().resolve::<Shout>().unwrap();

        let panicking = erase(
            Arc::new(JsonCodec),
            false,
            from_fn(|_, shout: Shout| async move {
                if shout.0 == "hey" {
                    panic!("subscriber blew up");
                }
            }),
        );

        registry.register(&names, Role::Notification, counting(&CALLS)).unwrap();
        registry.register(&names, Role::Notification, panicking).unwrap();
        registry.register(&names, Role::Notification, counting(&CALLS)).unwrap();

        let err = registry.dispatch("Shout", inbound(None)).await.unwrap_err();
        assert_eq!(ErrorKind::Unknown, err.kind());
        assert_eq!(2, CALLS.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn drop_unsubscribes_test() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);

        let network = MemoryNetwork::new();
        let server = network.server();
        let registry = registry(&server, DuplicatePolicy::Reject);
        let names = NameResolver::new().resolve::<Shout>().unwrap();

        registry.register(&names, Role::Command, counting(&CALLS)).unwrap();
        assert_eq!(1, server.listener_count("Shout"));

        drop(registry);
        assert_eq!(0, server.listener_count("Shout"));
    }
}
