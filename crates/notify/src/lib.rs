//! Alert transports for temperature alerts.
//!
//! This crate provides:
//! - `Notifier` trait for pluggable notification channels
//! - Email, webhook, and log notifier implementations
//! - Minijinja template rendering for alert subject and body
//! - Dispatcher that fans an alert out to every configured channel

pub mod dispatcher;
pub mod email;
pub mod log;
pub mod templating;
pub mod traits;
pub mod webhook;

pub use dispatcher::Dispatcher;
pub use templating::{AlertContext, TemplateRenderer};
pub use traits::{DispatchResult, Notification, Notifier, NotifyError};
