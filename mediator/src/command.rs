use crate::Message;

/// A fire-and-forget message, no response is expected.
pub trait Command: Message {}

/// Handles commands sent by either side.
#[async_trait::async_trait]
pub trait CommandHandler<C>: Send
where
    C: Command,
{
    /// Handles a command.
    async fn handle(&mut self, command: C);
}
