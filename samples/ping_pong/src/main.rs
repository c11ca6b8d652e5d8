use peer_mediator::memory::MemoryNetwork;
use peer_mediator::{
    ClientMediator, Command, ErrorKind, Message, Notification, PeerId, Request, Scope,
    ServerMediator,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize)]
struct Ping(u32);
impl Message for Ping {}
impl Request<Pong> for Ping {}

#[derive(Debug, Serialize, Deserialize)]
struct Pong {
    seq: u32,
    from: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Hello {
    name: String,
}
impl Message for Hello {}
impl Command for Hello {}

#[derive(Debug, Serialize, Deserialize)]
struct WhoAreYou;
impl Message for WhoAreYou {}
impl Request<String> for WhoAreYou {}

#[derive(Debug, Serialize, Deserialize)]
struct Unanswered;
impl Message for Unanswered {}
impl Request<()> for Unanswered {}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Announcement(String);
impl Message for Announcement {}
impl Notification for Announcement {}

fn client(
    network: &MemoryNetwork,
    name: &'static str,
) -> anyhow::Result<(PeerId, ClientMediator)> {
    let endpoint = network.connect();
    let peer = endpoint
        .peer_id()
        .ok_or_else(|| anyhow::anyhow!("client endpoint without a peer id"))?;
    let mediator = ClientMediator::new(endpoint);

    mediator.add_request_handler_fn(move |_: WhoAreYou| async move { name.to_owned() })?;
    mediator.subscribe_fn(move |event: Announcement| async move {
        log::info!("{} heard: {}", name, event.0);
    })?;

    Ok((peer, mediator))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("debug"));

    let network = MemoryNetwork::new();
    let server = ServerMediator::new(network.server());

    server.add_request_handler_from(|origin: Scope, ping: Ping| async move {
        Pong {
            seq: ping.0,
            from: format!("server, answering {}", origin),
        }
    })?;

    server.add_command_handler_from(|origin: Scope, hello: Hello| async move {
        log::info!("{} says hello from {}", hello.name, origin);
    })?;

    server.subscribe_fn(|event: Announcement| async move {
        log::info!("server heard: {}", event.0);
    })?;

    let (alice_id, alice) = client(&network, "alice")?;
    let (bob_id, bob) = client(&network, "bob")?;

    alice.send_to_server(Hello {
        name: "alice".to_owned(),
    })?;
    bob.send_to_server(Hello {
        name: "bob".to_owned(),
    })?;

    let (first, second) = tokio::join!(
        alice.request_server(Ping(1)),
        bob.request_server(Ping(2))
    );
    log::info!("alice got {:?}", first?);
    log::info!("bob got {:?}", second?);

    for peer in [alice_id, bob_id] {
        let name: String = server.request_client(peer, WhoAreYou).await?;
        log::info!("{} is {}", peer, name);
    }

    server.publish_all(Announcement("server is up".to_owned())).await?;
    alice.publish_to_server(Announcement("alice is here".to_owned())).await?;

    match alice
        .request_with_timeout(Scope::Remote, Unanswered, Duration::from_millis(200))
        .await
    {
        Err(err) if err.kind() == ErrorKind::Timeout => log::warn!("{}", err),
        other => anyhow::bail!("expected a timeout, got {:?}", other),
    }

    // Notification handlers run on spawned tasks.
    tokio::time::sleep(Duration::from_millis(100)).await;
    Ok(())
}
