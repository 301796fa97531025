//! Alert deduplication in front of the notification transport.
//!
//! An [`AlertDispatcher`] starts armed. The first alert decision of an
//! excursion is rendered and sent, after which the dispatcher stays
//! disarmed until a quiet decision re-arms it. Transport failures and
//! sends that outlive the send timeout are logged and still count as the
//! excursion's one attempt.

use std::sync::Arc;
use std::time::Duration;

use pitwatch_core::SensorConfig;
use pitwatch_notify::templating::{DEFAULT_BODY, DEFAULT_SUBJECT};
use pitwatch_notify::{AlertContext, Notification, Notifier, NotifyError, TemplateRenderer};
use tracing::{debug, info, warn};

use crate::policy::{TrendDecision, TrendPolicy};

/// Upper bound on one alert send when none is configured.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// What happened to a decision handed to [`AlertDispatcher::observe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertOutcome {
    /// Quiet decision; the dispatcher is armed afterwards.
    Idle,
    /// Alert delivered by the transport.
    Sent,
    /// Alert attempted but the transport failed or timed out.
    Failed,
    /// Alert for an excursion that already fired.
    Suppressed,
}

/// Renders and sends alerts for one sensor, at most once per excursion.
pub struct AlertDispatcher {
    sensor: String,
    label: String,
    policy: TrendPolicy,
    window: usize,
    window_minutes: f64,
    subject: String,
    body: String,
    renderer: TemplateRenderer,
    notifier: Arc<dyn Notifier>,
    send_timeout: Duration,
    armed: bool,
}

impl AlertDispatcher {
    /// Build a dispatcher from a sensor profile. Custom templates are
    /// validated here so a bad template fails at startup.
    pub fn new(
        sensor: &str,
        profile: &SensorConfig,
        reading_interval_secs: u64,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, NotifyError> {
        let renderer = TemplateRenderer::new();
        let subject = profile.subject.clone().unwrap_or_else(|| DEFAULT_SUBJECT.to_string());
        let body = profile.body.clone().unwrap_or_else(|| DEFAULT_BODY.to_string());
        renderer.validate(&subject)?;
        renderer.validate(&body)?;

        Ok(Self {
            sensor: sensor.to_string(),
            label: profile.display_label(sensor).to_string(),
            policy: profile.policy.into(),
            window: profile.window,
            window_minutes: profile.window_secs(reading_interval_secs) as f64 / 60.0,
            subject,
            body,
            renderer,
            notifier,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            armed: true,
        })
    }

    /// Give up on a send after `timeout`; the alert then counts as failed.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn send_timeout(&self) -> Duration {
        self.send_timeout
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn rearm(&mut self) {
        if !self.armed {
            debug!(sensor = %self.sensor, "condition cleared, alert re-armed");
        }
        self.armed = true;
    }

    /// Feed one evaluator decision. `latest` is the newest value in the
    /// window, used for the alert text.
    pub async fn observe(&mut self, decision: &TrendDecision, latest: f64) -> AlertOutcome {
        match decision {
            TrendDecision::NoAlert => {
                self.rearm();
                AlertOutcome::Idle
            }
            TrendDecision::Alert { reason, timestamp } => self.fire(reason, timestamp, latest).await,
        }
    }

    /// Send an alert if armed, then disarm regardless of the result.
    pub async fn fire(&mut self, reason: &str, timestamp: &str, latest: f64) -> AlertOutcome {
        if !self.armed {
            debug!(sensor = %self.sensor, timestamp, "alert already fired for this excursion");
            return AlertOutcome::Suppressed;
        }
        self.armed = false;

        let context = AlertContext {
            sensor: self.sensor.clone(),
            label: self.label.clone(),
            timestamp: timestamp.to_string(),
            reason: reason.to_string(),
            policy: self.policy.kind().to_string(),
            value: latest,
            threshold: self.policy.threshold(),
            window: self.window,
            window_minutes: self.window_minutes,
            now: chrono::Utc::now().to_rfc3339(),
        };

        let notification = match self.render(&context) {
            Ok(n) => n,
            Err(e) => {
                warn!(sensor = %self.sensor, error = %e, "failed to render alert");
                return AlertOutcome::Failed;
            }
        };

        match tokio::time::timeout(self.send_timeout, self.notifier.send(&notification)).await {
            Ok(Ok(())) => {
                info!(
                    sensor = %self.sensor,
                    timestamp,
                    reason,
                    value = latest,
                    subject = %notification.subject,
                    "alert sent"
                );
                AlertOutcome::Sent
            }
            Ok(Err(e)) => {
                warn!(sensor = %self.sensor, timestamp, error = %e, "alert transport failed");
                AlertOutcome::Failed
            }
            Err(_) => {
                warn!(
                    sensor = %self.sensor,
                    timestamp,
                    timeout_ms = self.send_timeout.as_millis() as u64,
                    "alert transport timed out"
                );
                AlertOutcome::Failed
            }
        }
    }

    fn render(&self, context: &AlertContext) -> Result<Notification, NotifyError> {
        let subject = self.renderer.render(&self.subject, context)?;
        let body = self.renderer.render(&self.body, context)?;
        Ok(Notification::new(subject, body)
            .with_metadata("sensor", &self.sensor)
            .with_metadata("timestamp", &context.timestamp)
            .with_metadata("reason", &context.reason)
            .with_metadata("value", context.value.to_string()))
    }
}
