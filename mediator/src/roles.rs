//! The two sides of a connection.
//!
//! Both sides run the same [Mediator]; they only differ in which scopes they
//! may address. [ServerMediator] and [ClientMediator] name the usual calls of
//! each side and deref to the underlying [Mediator] for registering handlers.

use crate::mediator::{Fanout, Mediator};
use crate::transport::{PeerId, Scope, Transport};
use crate::{Codec, Command, Error, ErrorKind, JsonCodec, Notification, Payload, Request};
use std::ops::Deref;

/// Which scopes a side is allowed to send to.
pub trait Direction: Send + Sync + 'static {
    /// Name of the side, used in logs and errors.
    const SIDE: &'static str;

    /// Returns `true` if this side may send to `scope`.
    fn can_target(scope: Scope) -> bool;
}

/// The side clients connect to, it can address every client or a single one.
pub enum ServerSide {}

impl Direction for ServerSide {
    const SIDE: &'static str = "server";

    fn can_target(_: Scope) -> bool {
        true
    }
}

/// A connected client, its only remote is the server.
pub enum ClientSide {}

impl Direction for ClientSide {
    const SIDE: &'static str = "client";

    fn can_target(scope: Scope) -> bool {
        !matches!(scope, Scope::Peer(_))
    }
}

pub(crate) fn check_target<D: Direction>(scope: Scope) -> crate::Result<()> {
    if D::can_target(scope) {
        Ok(())
    } else {
        Err(Error::new(
            ErrorKind::InvalidScope,
            format!("the {} side cannot send to {}", D::SIDE, scope),
        ))
    }
}

/// Server facing calls over a [Mediator].
pub struct ServerMediator<C = JsonCodec>(Mediator<ServerSide, C>);

impl ServerMediator<JsonCodec> {
    /// Creates a server mediator with default options.
    pub fn new<T: Transport + 'static>(transport: T) -> Self {
        ServerMediator(Mediator::builder(transport).build())
    }
}

impl<C: Codec> ServerMediator<C> {
    /// Sends a command to every connected client.
    pub fn send_to_clients<Cmd: Command>(&self, command: Cmd) -> crate::Result<()> {
        self.0.send(Scope::Remote, command)
    }

    /// Sends a command to one client.
    pub fn send_to_client<Cmd: Command>(&self, peer: PeerId, command: Cmd) -> crate::Result<()> {
        self.0.send(Scope::Peer(peer), command)
    }

    /// Sends a command to the server's own handlers.
    pub fn send_local<Cmd: Command>(&self, command: Cmd) -> crate::Result<()> {
        self.0.send(Scope::Local, command)
    }

    /// Sends a request to one client and waits for its response.
    pub async fn request_client<Req, Res>(&self, peer: PeerId, req: Req) -> crate::Result<Res>
    where
        Req: Request<Res>,
        Res: Payload,
    {
        self.0.request(Scope::Peer(peer), req).await
    }

    /// Sends a request to the server's own handlers.
    pub async fn request_local<Req, Res>(&self, req: Req) -> crate::Result<Res>
    where
        Req: Request<Res>,
        Res: Payload,
    {
        self.0.request(Scope::Local, req).await
    }

    /// Publishes to every client and to the server itself.
    pub async fn publish_all<N: Notification>(&self, notification: N) -> crate::Result<()> {
        self.0.publish(notification, Fanout::Both).await
    }

    /// Publishes to the server's own subscribers.
    pub async fn publish_to_server<N: Notification>(&self, notification: N) -> crate::Result<()> {
        self.0.publish(notification, Fanout::Local).await
    }

    /// Publishes to every client.
    pub async fn publish_to_clients<N: Notification>(&self, notification: N) -> crate::Result<()> {
        self.0.publish(notification, Fanout::Remote).await
    }

    /// Publishes to one client.
    pub async fn publish_to_client<N: Notification>(
        &self,
        peer: PeerId,
        notification: N,
    ) -> crate::Result<()> {
        self.0.publish_to(Scope::Peer(peer), notification).await
    }
}

impl<C> From<Mediator<ServerSide, C>> for ServerMediator<C> {
    fn from(mediator: Mediator<ServerSide, C>) -> Self {
        ServerMediator(mediator)
    }
}

impl<C> Deref for ServerMediator<C> {
    type Target = Mediator<ServerSide, C>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<C> Clone for ServerMediator<C> {
    fn clone(&self) -> Self {
        ServerMediator(self.0.clone())
    }
}

/// Client facing calls over a [Mediator].
pub struct ClientMediator<C = JsonCodec>(Mediator<ClientSide, C>);

impl ClientMediator<JsonCodec> {
    /// Creates a client mediator with default options.
    pub fn new<T: Transport + 'static>(transport: T) -> Self {
        ClientMediator(Mediator::builder(transport).build())
    }
}

impl<C: Codec> ClientMediator<C> {
    /// Sends a command to the server.
    pub fn send_to_server<Cmd: Command>(&self, command: Cmd) -> crate::Result<()> {
        self.0.send(Scope::Remote, command)
    }

    /// Sends a command to the client's own handlers.
    pub fn send_local<Cmd: Command>(&self, command: Cmd) -> crate::Result<()> {
        self.0.send(Scope::Local, command)
    }

    /// Sends a request to the server and waits for its response.
    pub async fn request_server<Req, Res>(&self, req: Req) -> crate::Result<Res>
    where
        Req: Request<Res>,
        Res: Payload,
    {
        self.0.request(Scope::Remote, req).await
    }

    /// Sends a request to the client's own handlers.
    pub async fn request_local<Req, Res>(&self, req: Req) -> crate::Result<Res>
    where
        Req: Request<Res>,
        Res: Payload,
    {
        self.0.request(Scope::Local, req).await
    }

    /// Publishes to the server and to the client itself.
    pub async fn publish_all<N: Notification>(&self, notification: N) -> crate::Result<()> {
        self.0.publish(notification, Fanout::Both).await
    }

    /// Publishes to the server's subscribers.
    pub async fn publish_to_server<N: Notification>(&self, notification: N) -> crate::Result<()> {
        self.0.publish(notification, Fanout::Remote).await
    }

    /// Publishes to the client's own subscribers.
    pub async fn publish_to_client<N: Notification>(&self, notification: N) -> crate::Result<()> {
        self.0.publish(notification, Fanout::Local).await
    }
}

impl<C> From<Mediator<ClientSide, C>> for ClientMediator<C> {
    fn from(mediator: Mediator<ClientSide, C>) -> Self {
        ClientMediator(mediator)
    }
}

impl<C> Deref for ClientMediator<C> {
    type Target = Mediator<ClientSide, C>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<C> Clone for ClientMediator<C> {
    fn clone(&self) -> Self {
        ClientMediator(self.0.clone())
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use crate::transport::memory::MemoryNetwork;
    use crate::{LocalDelivery, Message};
    use serde::{Deserialize, Serialize};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct GetHealth;
    impl Message for GetHealth {}
    impl Request<u8> for GetHealth {}

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Freeze(bool);
    impl Message for Freeze {}
    impl Command for Freeze {}

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Announcement(String);
    impl Message for Announcement {}
    impl Notification for Announcement {}

    type Log = Arc<Mutex<Vec<String>>>;

    fn record(mediator: &Mediator<ClientSide>, log: &Log, name: &'static str) {
        let freezes = log.clone();
        mediator
            .add_command_handler_fn(move |freeze: Freeze| {
                let freezes = freezes.clone();
                async move {
                    freezes.lock().unwrap().push(format!("{} freeze {}", name, freeze.0));
                }
            })
            .unwrap();

        let announcements = log.clone();
        mediator
            .subscribe_fn(move |announcement: Announcement| {
                let announcements = announcements.clone();
                async move {
                    announcements
                        .lock()
                        .unwrap()
                        .push(format!("{} heard {}", name, announcement.0));
                }
            })
            .unwrap();
    }

    fn sorted(log: &Log) -> Vec<String> {
        let mut entries = log.lock().unwrap().clone();
        entries.sort();
        entries
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[test]
    fn direction_test() {
        let peer = Scope::Peer(PeerId(3));

        assert!(ServerSide::can_target(Scope::Local));
        assert!(ServerSide::can_target(Scope::Remote));
        assert!(ServerSide::can_target(peer));

        assert!(ClientSide::can_target(Scope::Local));
        assert!(ClientSide::can_target(Scope::Remote));
        assert!(!ClientSide::can_target(peer));

        let err = check_target::<ClientSide>(peer).unwrap_err();
        assert_eq!("invalid scope: the client side cannot send to peer#3", err.to_string());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn server_addresses_clients_test() {
        let network = MemoryNetwork::new();
        let server = ServerMediator::new(network.server());
        let alice_endpoint = network.connect();
        let bob_endpoint = network.connect();
        let alice = ClientMediator::new(alice_endpoint.clone());
        let bob = ClientMediator::new(bob_endpoint.clone());

        let log: Log = Arc::default();
        record(&alice, &log, "alice");
        record(&bob, &log, "bob");

        let bob_id = bob_endpoint.peer_id().unwrap();

        server.send_to_client(bob_id, Freeze(true)).unwrap();
        server.send_to_clients(Freeze(false)).unwrap();
        server
            .publish_to_client(bob_id, Announcement("psst".to_owned()))
            .await
            .unwrap();
        server
            .publish_to_clients(Announcement("hello".to_owned()))
            .await
            .unwrap();
        settle().await;

        assert_eq!(
            vec![
                "alice freeze false",
                "alice heard hello",
                "bob freeze false",
                "bob freeze true",
                "bob heard hello",
                "bob heard psst",
            ],
            sorted(&log)
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn server_requests_client_test() {
        let network = MemoryNetwork::new();
        let server = ServerMediator::new(network.server());
        let endpoint = network.connect();
        let client = ClientMediator::new(endpoint.clone());

        client
            .add_request_handler_fn(|_: GetHealth| async move { 87u8 })
            .unwrap();

        let health = server
            .request_client(endpoint.peer_id().unwrap(), GetHealth)
            .await
            .unwrap();
        assert_eq!(87, health);

        let local = client.request_local(GetHealth).await.unwrap();
        assert_eq!(87, local);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn client_reaches_server_test() {
        let network = MemoryNetwork::new();
        let server = ServerMediator::new(network.server());
        let endpoint = network.connect();
        let client = ClientMediator::new(endpoint.clone());

        let origins = Arc::new(Mutex::new(Vec::new()));
        let sink = origins.clone();
        server
            .add_request_handler_from(move |origin: Scope, _: GetHealth| {
                sink.lock().unwrap().push(origin);
                async move { 100u8 }
            })
            .unwrap();

        assert_eq!(100, client.request_server(GetHealth).await.unwrap());
        assert_eq!(
            vec![Scope::Peer(endpoint.peer_id().unwrap())],
            *origins.lock().unwrap()
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn publish_all_reaches_both_sides_test() {
        let network = MemoryNetwork::new();
        let server: ServerMediator = Mediator::<ServerSide>::builder(network.server())
            .local_delivery(LocalDelivery::Direct)
            .build()
            .into();
        let client = ClientMediator::new(network.connect());

        let log: Log = Arc::default();
        record(&client, &log, "client");

        let heard = log.clone();
        server
            .subscribe_fn(move |announcement: Announcement| {
                let heard = heard.clone();
                async move {
                    heard
                        .lock()
                        .unwrap()
                        .push(format!("server heard {}", announcement.0));
                }
            })
            .unwrap();

        server
            .publish_all(Announcement("restart".to_owned()))
            .await
            .unwrap();
        client
            .publish_to_server(Announcement("ready".to_owned()))
            .await
            .unwrap();
        client
            .publish_to_client(Announcement("self".to_owned()))
            .await
            .unwrap();
        settle().await;

        assert_eq!(
            vec![
                "client heard restart",
                "client heard self",
                "server heard ready",
                "server heard restart",
            ],
            sorted(&log)
        );
    }
}
