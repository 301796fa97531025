//! Streaming threshold monitor for pit temperature readings.
//!
//! One [`SensorWorker`] per sensor queue keeps a [`SlidingWindow`] of recent
//! temperatures, evaluates its [`TrendPolicy`] on every reading, and hands
//! alert decisions to an [`AlertDispatcher`] that fires once per excursion.

pub mod alert;
pub mod error;
pub mod policy;
pub mod window;
pub mod worker;

pub use alert::{AlertDispatcher, AlertOutcome, DEFAULT_SEND_TIMEOUT};
pub use error::MonitorError;
pub use policy::{TrendDecision, TrendPolicy};
pub use window::SlidingWindow;
pub use worker::{connect_with_retry, LoopState, MessageOutcome, RunSummary, SensorWorker};
