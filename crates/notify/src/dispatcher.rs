//! Fans a notification out to every configured channel.
//!
//! Individual channel failures don't block other channels. A dispatch
//! counts as delivered when at least one channel succeeded.

use pitwatch_core::Config;

use crate::email::EmailNotifier;
use crate::log::LogNotifier;
use crate::traits::{DispatchResult, Notification, Notifier, NotifyError};
use crate::webhook::WebhookNotifier;

/// Dispatches notifications to a fixed set of channels.
pub struct Dispatcher {
    channels: Vec<Box<dyn Notifier>>,
}

impl Dispatcher {
    pub fn new(channels: Vec<Box<dyn Notifier>>) -> Self {
        Self { channels }
    }

    /// Build channels from the environment config.
    ///
    /// Email is added when SMTP host, sender and recipients are set; the
    /// webhook when `ALERT_WEBHOOK_URL` is set. Both are bounded by the
    /// configured alert timeout. With neither, alerts go to the log so
    /// they are still visible.
    pub fn from_config(config: &Config) -> Result<Self, NotifyError> {
        let mut channels: Vec<Box<dyn Notifier>> = Vec::new();

        let timeout = config.alert_timeout();

        if config.smtp.is_configured() {
            channels.push(Box::new(EmailNotifier::from_config(&config.smtp, timeout)?));
        }

        if let Some(url) = config.webhook.url.as_deref() {
            channels.push(Box::new(WebhookNotifier::new(url, timeout)?));
        }

        if channels.is_empty() {
            tracing::warn!("No alert transport configured, alerts will only be logged");
            channels.push(Box::new(LogNotifier::new()));
        }

        Ok(Self::new(channels))
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.channel_name()).collect()
    }

    /// Deliver a notification to every channel, in order.
    pub async fn dispatch(&self, notification: &Notification) -> Vec<DispatchResult> {
        let sensor = notification
            .metadata
            .get("sensor")
            .map(String::as_str)
            .unwrap_or("");

        if self.channels.is_empty() {
            tracing::debug!(sensor, "No notification channels configured");
            return Vec::new();
        }

        let mut results = Vec::with_capacity(self.channels.len());

        for channel in &self.channels {
            let start = std::time::Instant::now();
            let result = channel.send(notification).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            let (success, error) = match result {
                Ok(()) => {
                    tracing::info!(
                        sensor,
                        channel = channel.channel_name(),
                        duration_ms,
                        "Notification delivered"
                    );
                    (true, None)
                }
                Err(e) => {
                    tracing::warn!(
                        sensor,
                        channel = channel.channel_name(),
                        error = %e,
                        duration_ms,
                        "Notification delivery failed"
                    );
                    (false, Some(e.to_string()))
                }
            };

            results.push(DispatchResult {
                channel: channel.channel_name().to_string(),
                success,
                error,
                duration_ms,
            });
        }

        results
    }
}

#[async_trait::async_trait]
impl Notifier for Dispatcher {
    /// Succeeds when at least one channel delivered the notification.
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let results = self.dispatch(notification).await;
        if results.iter().any(|r| r.success) {
            return Ok(());
        }
        let errors: Vec<String> = results
            .into_iter()
            .map(|r| {
                format!(
                    "{}: {}",
                    r.channel,
                    r.error.unwrap_or_else(|| "unknown error".to_string())
                )
            })
            .collect();
        Err(NotifyError::Config(if errors.is_empty() {
            "no notification channels configured".to_string()
        } else {
            errors.join("; ")
        }))
    }

    fn channel_name(&self) -> &str {
        "dispatcher"
    }
}
