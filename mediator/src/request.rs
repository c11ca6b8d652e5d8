use crate::{Message, Payload};

/// Represents a request answered by exactly one response of type `Res`.
pub trait Request<Res>: Message
where
    Res: Payload,
{
}

/// Handles a request and returns the response sent back to the requester.
#[async_trait::async_trait]
pub trait RequestHandler<Req, Res>: Send
where
    Req: Request<Res>,
    Res: Payload,
{
    /// Handle a request and returns the response.
    async fn handle(&mut self, req: Req) -> Res;
}
