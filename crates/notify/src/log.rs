//! Notifier that writes alerts to the tracing log.
//!
//! Used when no email or webhook transport is configured, so an alert is
//! never silently dropped.

use crate::traits::{Notification, Notifier, NotifyError};

#[derive(Debug, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::warn!(
            channel = "log",
            subject = %notification.subject,
            body = %notification.body,
            sensor = notification.metadata.get("sensor").map(String::as_str).unwrap_or(""),
            "temperature alert"
        );
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "log"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_notifier_always_succeeds() {
        let notifier = LogNotifier::new();
        let notification =
            Notification::new("Smoker Temperature Alert", "body").with_metadata("sensor", "smoker");
        assert!(notifier.send(&notification).await.is_ok());
        assert_eq!(notifier.channel_name(), "log");
    }
}
