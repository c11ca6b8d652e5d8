//! # peer-mediator
//! A mediator that carries commands, requests and notifications between
//! a server and its clients over a pluggable transport.
//!
//! Messages are addressed by an event name derived from their type. Requests
//! are matched with their response by a correlation id, and a request that gets
//! no answer in time fails with a timeout instead of waiting forever.
//!
//! ## Example
//! ```rust
//! use peer_mediator::memory::MemoryNetwork;
//! use peer_mediator::{ClientMediator, Message, Notification, Request, ServerMediator};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct GetPrice(String);
//! impl Message for GetPrice {}
//! impl Request<u32> for GetPrice {}
//!
//! #[derive(Clone, Serialize, Deserialize)]
//! struct PriceChanged(String, u32);
//! impl Message for PriceChanged {}
//! impl Notification for PriceChanged {}
//!
//! #[tokio::main]
//! async fn main() -> peer_mediator::Result<()> {
//!     let network = MemoryNetwork::new();
//!     let server = ServerMediator::new(network.server());
//!     let client = ClientMediator::new(network.connect());
//!
//!     server.add_request_handler_fn(|req: GetPrice| async move {
//!         if req.0 == "Microwave" { 120u32 } else { 0 }
//!     })?;
//!
//!     client.subscribe_fn(|event: PriceChanged| async move {
//!         println!("{} now costs {}", event.0, event.1);
//!     })?;
//!
//!     let price: u32 = client.request_server(GetPrice("Microwave".to_owned())).await?;
//!     assert_eq!(120, price);
//!
//!     server.publish_to_clients(PriceChanged("Microwave".to_owned(), 99)).await?;
//!     Ok(())
//! }
//! ```

/// A convenient result type.
pub type Result<T> = std::result::Result<T, error::Error>;

/// Module for the errors.
mod error;
pub use error::*;

/// Module for the message traits and event names.
mod message;
pub use message::*;

mod command;
pub use command::*;

/// Module for the request-response.
mod request;
pub use request::*;

mod notification;
pub use notification::*;

mod name;
pub use name::{EventNames, NameResolver, RESPONSE_SUFFIX};

/// Module for the payload codecs.
mod codec;
pub use codec::*;

/// Module for the transports the mediator runs over.
pub mod transport;
pub use transport::{Inbound, PeerId, RawHandler, Scope, SubscriptionId, Transport};

#[cfg(feature = "memory")]
pub use transport::memory;

mod correlation;
pub use correlation::CorrelationId;

mod handler;
pub use handler::BoxFuture;

mod registry;
pub use registry::Role;

/// Module for the mediator options.
mod options;
pub use options::*;

/// Module for the mediator.
mod mediator;
pub use crate::mediator::*;

/// Server and client wrappers.
mod roles;
pub use roles::{ClientMediator, ClientSide, Direction, ServerMediator, ServerSide};
