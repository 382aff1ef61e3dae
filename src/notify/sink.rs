use async_trait::async_trait;

use crate::error::NotifyError;

/// Transport that pushes one message to a human.
///
/// Implementations make a single delivery attempt per call; retries belong
/// to [`NotificationDispatcher`](crate::notify::NotificationDispatcher).
#[async_trait]
pub trait NotificationSink: Send + Sync + 'static {
    /// Short identifier used in events and logs.
    fn name(&self) -> &str;

    /// Sends one message.
    async fn send(&self, title: &str, body: &str) -> Result<(), NotifyError>;
}
