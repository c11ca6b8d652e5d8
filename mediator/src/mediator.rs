use crate::correlation::CorrelationEngine;
use crate::handler::{erase, from_fn, BoxFuture};
use crate::name::{EventNames, NameResolver};
use crate::options::{DuplicatePolicy, LocalDelivery, MediatorOptions, ResponseRouting};
use crate::registry::{HandlerRegistry, Role};
use crate::roles::{check_target, Direction};
use crate::transport::{Inbound, Scope, Transport};
use crate::{
    Codec, Command, CommandHandler, JsonCodec, Message, Notification, NotificationHandler,
    Payload, Request, RequestHandler,
};
use log::trace;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Mutex as AsyncMutex;

/// Scopes a notification is published to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fanout {
    /// Subscribers of this process only.
    Local,
    /// The other side only.
    Remote,
    /// The other side and this process, the publisher receives its own notification.
    Both,
}

struct Inner<C> {
    transport: Arc<dyn Transport>,
    codec: Arc<C>,
    names: NameResolver,
    registry: Arc<HandlerRegistry>,
    correlation: CorrelationEngine<C>,
    options: MediatorOptions,
}

/// Sends commands, requests and notifications to the other side and
/// dispatches the ones it receives to registered handlers.
///
/// `D` fixes which scopes this side may address, see [ServerSide](crate::ServerSide)
/// and [ClientSide](crate::ClientSide). Clones share the same handlers.
pub struct Mediator<D, C = JsonCodec> {
    inner: Arc<Inner<C>>,
    _direction: PhantomData<fn() -> D>,
}

impl<D, C> Clone for Mediator<D, C> {
    fn clone(&self) -> Self {
        Mediator {
            inner: self.inner.clone(),
            _direction: PhantomData,
        }
    }
}

impl<D: Direction> Mediator<D, JsonCodec> {
    /// Gets a [Mediator] builder over `transport`.
    pub fn builder<T: Transport + 'static>(transport: T) -> MediatorBuilder<D> {
        MediatorBuilder::new(transport)
    }
}

impl<D: Direction, C: Codec> Mediator<D, C> {
    /// Returns the options this mediator was built with.
    pub fn options(&self) -> &MediatorOptions {
        &self.inner.options
    }

    /// Number of requests waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.inner.correlation.in_flight()
    }

    /// Sends a command to `target`. Nothing tells whether anyone handled it.
    pub fn send<Cmd: Command>(&self, target: Scope, command: Cmd) -> crate::Result<()> {
        check_target::<D>(target)?;
        let names = self.inner.names.resolve::<Cmd>()?;
        let payload = self.inner.codec.encode(&command)?;

        trace!("{} sends `{}` to {}", D::SIDE, names.event, target);
        self.inner.transport.send(target, &names.event, None, payload);
        Ok(())
    }

    /// Sends a request to `target` and waits for the response using the default timeout.
    pub async fn request<Req, Res>(&self, target: Scope, req: Req) -> crate::Result<Res>
    where
        Req: Request<Res>,
        Res: Payload,
    {
        let timeout = self.inner.options.default_timeout;
        self.request_with_timeout(target, req, timeout).await
    }

    /// Sends a request to `target` and waits at most `timeout` for the response.
    ///
    /// A zero `timeout` waits forever. Dropping the returned future abandons
    /// the request, a late response is then ignored.
    pub async fn request_with_timeout<Req, Res>(
        &self,
        target: Scope,
        req: Req,
        timeout: Duration,
    ) -> crate::Result<Res>
    where
        Req: Request<Res>,
        Res: Payload,
    {
        check_target::<D>(target)?;
        let names = self.inner.names.resolve::<Req>()?;
        self.inner
            .correlation
            .request(target, &names, &req, timeout)
            .await
    }

    /// Publishes a notification.
    pub async fn publish<N: Notification>(
        &self,
        notification: N,
        fanout: Fanout,
    ) -> crate::Result<()> {
        let names = self.inner.names.resolve::<N>()?;
        let payload = self.inner.codec.encode(&notification)?;

        if matches!(fanout, Fanout::Remote | Fanout::Both) {
            trace!("{} publishes `{}` to remote", D::SIDE, names.event);
            self.inner
                .transport
                .send(Scope::Remote, &names.event, None, payload.clone());
        }

        if matches!(fanout, Fanout::Local | Fanout::Both) {
            self.publish_local(&names, payload).await?;
        }

        Ok(())
    }

    /// Publishes a notification to a single scope.
    pub async fn publish_to<N: Notification>(
        &self,
        target: Scope,
        notification: N,
    ) -> crate::Result<()> {
        check_target::<D>(target)?;
        let names = self.inner.names.resolve::<N>()?;
        let payload = self.inner.codec.encode(&notification)?;

        match target {
            Scope::Local => self.publish_local(&names, payload).await,
            _ => {
                trace!("{} publishes `{}` to {}", D::SIDE, names.event, target);
                self.inner.transport.send(target, &names.event, None, payload);
                Ok(())
            }
        }
    }

    async fn publish_local(&self, names: &EventNames, payload: String) -> crate::Result<()> {
        match self.inner.options.local_delivery {
            LocalDelivery::Loopback => {
                self.inner
                    .transport
                    .send(Scope::Local, &names.event, None, payload);
                Ok(())
            }
            LocalDelivery::Direct => {
                let inbound = Inbound {
                    source: Scope::Local,
                    correlation_id: None,
                    payload,
                };
                self.dispatch(&names.event, inbound).await
            }
        }
    }

    /// Dispatches an inbound event to the handlers registered for `event_name`.
    ///
    /// The transport subscriptions call this already. It is public for hosts
    /// that deliver events themselves and want to see dispatch errors.
    pub async fn dispatch(&self, event_name: &str, inbound: Inbound) -> crate::Result<()> {
        self.inner.registry.dispatch(event_name, inbound).await
    }

    /// Returns the role and the number of handlers registered for `event_name`.
    pub fn registration(&self, event_name: &str) -> Option<(Role, usize)> {
        self.inner.registry.registration(event_name)
    }

    fn register<M, Out, F>(&self, role: Role, call: F) -> crate::Result<()>
    where
        M: Message,
        Out: Payload,
        F: Fn(Scope, M) -> BoxFuture<'static, Out> + Send + Sync + 'static,
    {
        let names = self.inner.names.resolve::<M>()?;
        let handler = erase(self.inner.codec.clone(), role == Role::Request, call);
        self.inner.registry.register(&names, role, handler)
    }

    /// Registers a command handler.
    pub fn add_command_handler<Cmd, H>(&self, handler: H) -> crate::Result<()>
    where
        Cmd: Command,
        H: CommandHandler<Cmd> + 'static,
    {
        let handler = Arc::new(AsyncMutex::new(handler));

        self.register(
            Role::Command,
            move |_: Scope, command: Cmd| -> BoxFuture<'static, ()> {
                let handler = handler.clone();
                Box::pin(async move {
                    let mut handler = handler.lock().await;
                    handler.handle(command).await;
                })
            },
        )
    }

    /// Registers a command handler from a function.
    pub fn add_command_handler_fn<Cmd, H, F>(&self, mut handler: H) -> crate::Result<()>
    where
        Cmd: Command,
        H: FnMut(Cmd) -> F + Send + 'static,
        F: Future<Output = ()> + Send + 'static,
    {
        self.add_command_handler_from(move |_: Scope, command: Cmd| handler(command))
    }

    /// Registers a command handler from a function that also receives the sender's scope.
    pub fn add_command_handler_from<Cmd, H, F>(&self, handler: H) -> crate::Result<()>
    where
        Cmd: Command,
        H: FnMut(Scope, Cmd) -> F + Send + 'static,
        F: Future<Output = ()> + Send + 'static,
    {
        self.register(Role::Command, from_fn(handler))
    }

    /// Registers a request handler, its return value is sent back to the requester.
    pub fn add_request_handler<Req, Res, H>(&self, handler: H) -> crate::Result<()>
    where
        Req: Request<Res>,
        Res: Payload,
        H: RequestHandler<Req, Res> + 'static,
    {
        let handler = Arc::new(AsyncMutex::new(handler));

        self.register(
            Role::Request,
            move |_: Scope, req: Req| -> BoxFuture<'static, Res> {
                let handler = handler.clone();
                Box::pin(async move {
                    let mut handler = handler.lock().await;
                    let res = handler.handle(req).await;
                    res
                })
            },
        )
    }

    /// Registers a request handler from a function.
    pub fn add_request_handler_fn<Req, Res, H, F>(&self, mut handler: H) -> crate::Result<()>
    where
        Req: Request<Res>,
        Res: Payload,
        H: FnMut(Req) -> F + Send + 'static,
        F: Future<Output = Res> + Send + 'static,
    {
        self.add_request_handler_from(move |_: Scope, req: Req| handler(req))
    }

    /// Registers a request handler from a function that also receives the requester's scope.
    pub fn add_request_handler_from<Req, Res, H, F>(&self, handler: H) -> crate::Result<()>
    where
        Req: Request<Res>,
        Res: Payload,
        H: FnMut(Scope, Req) -> F + Send + 'static,
        F: Future<Output = Res> + Send + 'static,
    {
        self.register(Role::Request, from_fn(handler))
    }

    /// Subscribes a handler to a notification.
    pub fn subscribe<N, H>(&self, handler: H) -> crate::Result<()>
    where
        N: Notification,
        H: NotificationHandler<N> + 'static,
    {
        let handler = Arc::new(AsyncMutex::new(handler));

        self.register(
            Role::Notification,
            move |_: Scope, notification: N| -> BoxFuture<'static, ()> {
                let handler = handler.clone();
                Box::pin(async move {
                    let mut handler = handler.lock().await;
                    handler.handle(notification).await;
                })
            },
        )
    }

    /// Subscribes a function to a notification.
    pub fn subscribe_fn<N, H, F>(&self, mut handler: H) -> crate::Result<()>
    where
        N: Notification,
        H: FnMut(N) -> F + Send + 'static,
        F: Future<Output = ()> + Send + 'static,
    {
        self.subscribe_from(move |_: Scope, notification: N| handler(notification))
    }

    /// Subscribes a function that also receives the publisher's scope.
    pub fn subscribe_from<N, H, F>(&self, handler: H) -> crate::Result<()>
    where
        N: Notification,
        H: FnMut(Scope, N) -> F + Send + 'static,
        F: Future<Output = ()> + Send + 'static,
    {
        self.register(Role::Notification, from_fn(handler))
    }
}

/// A builder for the [Mediator].
pub struct MediatorBuilder<D, C = JsonCodec> {
    transport: Arc<dyn Transport>,
    codec: C,
    options: MediatorOptions,
    runtime: Option<Handle>,
    _direction: PhantomData<fn() -> D>,
}

impl<D: Direction> MediatorBuilder<D, JsonCodec> {
    pub fn new<T: Transport + 'static>(transport: T) -> Self {
        MediatorBuilder {
            transport: Arc::new(transport),
            codec: JsonCodec,
            options: MediatorOptions::default(),
            runtime: None,
            _direction: PhantomData,
        }
    }
}

impl<D: Direction, C: Codec> MediatorBuilder<D, C> {
    /// Uses `codec` for payloads instead of JSON.
    pub fn codec<C2: Codec>(self, codec: C2) -> MediatorBuilder<D, C2> {
        MediatorBuilder {
            transport: self.transport,
            codec,
            options: self.options,
            runtime: self.runtime,
            _direction: PhantomData,
        }
    }

    /// Replaces all options at once.
    pub fn options(mut self, options: MediatorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.options.default_timeout = timeout;
        self
    }

    pub fn response_routing(mut self, routing: ResponseRouting) -> Self {
        self.options.response_routing = routing;
        self
    }

    pub fn duplicate_handlers(mut self, policy: DuplicatePolicy) -> Self {
        self.options.duplicate_handlers = policy;
        self
    }

    pub fn local_delivery(mut self, delivery: LocalDelivery) -> Self {
        self.options.local_delivery = delivery;
        self
    }

    /// Runtime the handlers are spawned on, defaults to the current one.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Builds the [Mediator].
    ///
    /// # Panics
    /// When no runtime was given and this is not called from within a Tokio runtime.
    pub fn build(self) -> Mediator<D, C> {
        let runtime = self.runtime.unwrap_or_else(Handle::current);
        let codec = Arc::new(self.codec);

        let registry = HandlerRegistry::new(
            self.transport.clone(),
            runtime,
            self.options.response_routing,
            self.options.duplicate_handlers,
        );

        let inner = Inner {
            transport: self.transport.clone(),
            codec: codec.clone(),
            names: NameResolver::new(),
            registry: Arc::new(registry),
            correlation: CorrelationEngine::new(self.transport, codec),
            options: self.options,
        };

        Mediator {
            inner: Arc::new(inner),
            _direction: PhantomData,
        }
    }
}

/// Assert the `Mediator` is `Send + Sync`.
#[cfg(test)]
fn _dummy() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Mediator<crate::ServerSide>>();
    assert_send_sync::<Mediator<crate::ClientSide>>();
}
