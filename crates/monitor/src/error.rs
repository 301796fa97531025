use thiserror::Error;

use pitwatch_core::CoreError;
use pitwatch_notify::NotifyError;
use pitwatch_queue::QueueError;

/// Failures that end a monitor worker.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("broker error: {0}")]
    Queue(#[from] QueueError),

    #[error("configuration error: {0}")]
    Config(#[from] CoreError),

    #[error("alert setup error: {0}")]
    Notify(#[from] NotifyError),

    #[error("delivery stream from queue '{0}' ended unexpectedly")]
    StreamEnded(String),
}
