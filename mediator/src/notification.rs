use crate::Message;

/// A broadcast message delivered to every subscriber.
pub trait Notification: Message + Clone {}

/// A handler for notifications.
#[async_trait::async_trait]
pub trait NotificationHandler<N>: Send
where
    N: Notification,
{
    /// Handles a notification.
    async fn handle(&mut self, notification: N);
}
