use thiserror::Error;

use pitwatch_core::ReadingError;
use pitwatch_queue::QueueError;

#[derive(Error, Debug)]
pub enum ProducerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("dataset line {line}: {message}")]
    Dataset { line: usize, message: String },

    #[error("dataset line {line}, column {column}: {source}")]
    Cell {
        line: usize,
        column: usize,
        source: ReadingError,
    },

    #[error(transparent)]
    Queue(#[from] QueueError),
}
