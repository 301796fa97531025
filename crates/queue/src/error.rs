//! Queue error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("queue declare error: {0}")]
    Declare(String),

    #[error("consume error: {0}")]
    Consume(String),

    #[error("acknowledge error: {0}")]
    Ack(String),

    #[error("publish error: {0}")]
    Publish(String),

    #[error("provider error: {0}")]
    Provider(String),
}
