//! Generic HTTP webhook notifier.
//!
//! Delivers alerts as JSON payloads (`subject`, `body`, `metadata`) to a
//! configured URL.

use std::time::Duration;

use crate::traits::{Notification, Notifier, NotifyError};

/// Posts notifications as JSON to a configured endpoint.
#[derive(Debug)]
pub struct WebhookNotifier {
    url: String,
    timeout: Duration,
    /// Shared HTTP client (connection pooling).
    client: reqwest::Client,
}

impl WebhookNotifier {
    /// Create a notifier whose requests give up after `timeout`.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, NotifyError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| NotifyError::Config(format!("invalid webhook URL {url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(NotifyError::Config(format!(
                "webhook URL must be http or https, got {}",
                parsed.scheme()
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;

        Ok(Self {
            url: url.to_string(),
            timeout,
            client,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let response = self.client.post(&self.url).json(notification).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(NotifyError::Config(format!(
                "webhook returned {status}: {body_text}"
            )));
        }

        tracing::debug!(url = %self.url, status = %status, "webhook alert delivered");

        Ok(())
    }

    fn channel_name(&self) -> &str {
        "webhook"
    }
}
