//! Replays a recorded cooking session onto the sensor queues.

pub mod dataset;
pub mod error;
pub mod replay;

pub use dataset::DatasetRow;
pub use error::ProducerError;
pub use replay::{Replayer, ReplaySummary, Route};
