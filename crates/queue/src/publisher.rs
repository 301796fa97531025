//! Queue publisher trait.

use async_trait::async_trait;

use crate::error::QueueError;

/// Trait for publishing raw bodies onto named durable queues.
///
/// Messages go through the default exchange with the queue name as
/// routing key and are marked persistent.
#[async_trait]
pub trait QueuePublisher: Send + Sync {
    /// Declare a durable queue (idempotent).
    async fn declare(&self, queue: &str) -> Result<(), QueueError>;

    /// Delete a queue and everything in it. Returns the number of dropped messages.
    async fn delete(&self, queue: &str) -> Result<u32, QueueError>;

    /// Publish one message and wait for the broker to accept it.
    async fn publish(&self, queue: &str, body: &[u8]) -> Result<(), QueueError>;
}
