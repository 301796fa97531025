//! Queue consumer trait and types.

use std::borrow::Cow;
use std::fmt;

use async_trait::async_trait;

use crate::error::QueueError;

/// A message handed to the consumer, pending acknowledgment.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Channel-scoped delivery tag used to ack/nack this message.
    pub tag: u64,
    /// Raw message body.
    pub body: Vec<u8>,
    /// Whether the broker has delivered this message before.
    pub redelivered: bool,
}

impl Delivery {
    pub fn new(tag: u64, body: Vec<u8>, redelivered: bool) -> Self {
        Self {
            tag,
            body,
            redelivered,
        }
    }

    /// Body as text for logging; invalid UTF-8 is replaced, never rejected.
    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

impl fmt::Display for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Delivery {{ tag: {}, bytes: {}, redelivered: {} }}",
            self.tag,
            self.body.len(),
            self.redelivered
        )
    }
}

/// Trait for queue consumer backends.
///
/// The methods follow the order a worker calls them in: declare the queue,
/// bound the number of unacknowledged messages, start consuming, then
/// alternate `next_delivery` with `ack` until shutdown, and finally `close`.
#[async_trait]
pub trait QueueConsumer: Send + Sync {
    /// Declare a durable queue. Declaring an existing durable queue is a no-op.
    async fn declare(&mut self, queue: &str) -> Result<(), QueueError>;

    /// Limit how many unacknowledged messages the broker hands this consumer.
    async fn set_prefetch(&mut self, count: u16) -> Result<(), QueueError>;

    /// Register this consumer on `queue` with manual acknowledgment.
    async fn start_consuming(&mut self, queue: &str) -> Result<(), QueueError>;

    /// Wait for the next delivery.
    ///
    /// Blocks without timeout. Returns `Ok(None)` when the broker ends the
    /// delivery stream (consumer cancelled, channel closed).
    async fn next_delivery(&mut self) -> Result<Option<Delivery>, QueueError>;

    /// Acknowledge processing; removes the message from the queue.
    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Negative-acknowledge, optionally returning the message to the queue.
    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<(), QueueError>;

    /// Stop consuming and release the channel and connection.
    async fn close(&mut self) -> Result<(), QueueError>;

    /// Queue provider name (e.g., "rabbitmq", "memory").
    fn provider(&self) -> &str;
}
