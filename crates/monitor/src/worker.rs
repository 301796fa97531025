//! Per-sensor consumption loop.
//!
//! A [`SensorWorker`] owns one sliding window and one alert dispatcher.
//! [`SensorWorker::run`] declares the sensor's queue, limits the channel to
//! one unacknowledged delivery, and handles deliveries strictly one at a
//! time: decode, push, evaluate, alert, then acknowledge. Every delivery is
//! acknowledged, including those that fail to decode.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use pitwatch_core::{Reading, ReadingError, SensorConfig};
use pitwatch_notify::Notifier;
use pitwatch_queue::{Delivery, QueueConsumer, QueueError, QueuePublisher};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::alert::{AlertDispatcher, AlertOutcome};
use crate::error::MonitorError;
use crate::policy::{TrendDecision, TrendPolicy};
use crate::window::SlidingWindow;

/// Upper bound for the delay between connection attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

// ── Connection ───────────────────────────────────────────────────────

/// Call `connect` until it succeeds, at most `retries + 1` times.
///
/// The delay starts at `backoff` and doubles after each failure, capped
/// at 30 seconds. The closure receives the 1-based attempt number.
pub async fn connect_with_retry<T, F, Fut>(
    retries: u32,
    backoff: Duration,
    mut connect: F,
) -> Result<T, QueueError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, QueueError>>,
{
    let mut delay = backoff;
    let mut attempt = 1;
    loop {
        match connect(attempt).await {
            Ok(conn) => return Ok(conn),
            Err(e) if attempt <= retries => {
                warn!(attempt, retries, error = %e, delay_ms = delay.as_millis() as u64, "broker connection failed, retrying");
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(MAX_BACKOFF);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

// ── Loop state ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Disconnected,
    Connected,
    QueueDeclared,
    Consuming,
    Draining,
    Closed,
}

/// Counters reported when the loop stops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub deliveries: u64,
    pub absent: u64,
    pub decode_errors: u64,
    pub dead_lettered: u64,
    pub alerts_sent: u64,
    pub alerts_failed: u64,
    pub alerts_suppressed: u64,
}

/// Result of routing one message body through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageOutcome {
    /// `No Reading`: nothing pushed, alert state untouched.
    Absent,
    Evaluated {
        decision: TrendDecision,
        alert: AlertOutcome,
    },
    Rejected(ReadingError),
}

// ── SensorWorker ─────────────────────────────────────────────────────

pub struct SensorWorker {
    sensor: String,
    queue: String,
    dead_letter_queue: Option<String>,
    dead_letters: Option<Arc<dyn QueuePublisher>>,
    window: SlidingWindow,
    policy: TrendPolicy,
    alerts: AlertDispatcher,
    state: LoopState,
    summary: RunSummary,
}

impl SensorWorker {
    pub fn new(
        sensor: &str,
        profile: &SensorConfig,
        reading_interval_secs: u64,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, MonitorError> {
        Ok(Self {
            sensor: sensor.to_string(),
            queue: profile.queue.clone(),
            dead_letter_queue: profile.dead_letter_queue.clone(),
            dead_letters: None,
            window: SlidingWindow::new(profile.window),
            policy: profile.policy.into(),
            alerts: AlertDispatcher::new(sensor, profile, reading_interval_secs, notifier)?,
            state: LoopState::Disconnected,
            summary: RunSummary::default(),
        })
    }

    /// Bound each alert send so a stalled transport cannot hold up the
    /// delivery being processed.
    pub fn with_alert_timeout(mut self, timeout: Duration) -> Self {
        self.alerts = self.alerts.with_send_timeout(timeout);
        self
    }

    /// Publisher used to forward undecodable bodies when the profile names
    /// a dead-letter queue. Without one, such bodies are only logged.
    pub fn with_dead_letters(mut self, publisher: Arc<dyn QueuePublisher>) -> Self {
        self.dead_letters = Some(publisher);
        self
    }

    pub fn sensor(&self) -> &str {
        &self.sensor
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn window(&self) -> &SlidingWindow {
        &self.window
    }

    pub fn alerts(&self) -> &AlertDispatcher {
        &self.alerts
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    /// Decode one body and route it through window, policy and alerts.
    ///
    /// Decode errors leave the window and alert state untouched.
    pub async fn handle_body(&mut self, body: &[u8]) -> MessageOutcome {
        let reading = match Reading::decode(body) {
            Ok(r) => r,
            Err(e) => {
                self.summary.decode_errors += 1;
                return MessageOutcome::Rejected(e);
            }
        };

        let Some(value) = reading.value else {
            self.summary.absent += 1;
            debug!(sensor = %self.sensor, timestamp = %reading.timestamp, "no reading, skipped");
            return MessageOutcome::Absent;
        };

        self.window.push(value);
        let decision = self.policy.evaluate(&self.window, &reading.timestamp);
        let alert = self.alerts.observe(&decision, value).await;
        match alert {
            AlertOutcome::Sent => self.summary.alerts_sent += 1,
            AlertOutcome::Failed => self.summary.alerts_failed += 1,
            AlertOutcome::Suppressed => self.summary.alerts_suppressed += 1,
            AlertOutcome::Idle => {}
        }

        debug!(
            sensor = %self.sensor,
            timestamp = %reading.timestamp,
            value,
            window_len = self.window.len(),
            alert = decision.is_alert(),
            "reading evaluated"
        );

        MessageOutcome::Evaluated { decision, alert }
    }

    /// Consume the sensor's queue until `shutdown` is notified.
    ///
    /// Returns the run summary on a clean interrupt. The stream ending,
    /// a delivery error, or a failed acknowledgment is returned as an
    /// error after the consumer is closed.
    pub async fn run<C>(
        &mut self,
        consumer: &mut C,
        shutdown: Arc<Notify>,
    ) -> Result<RunSummary, MonitorError>
    where
        C: QueueConsumer + ?Sized,
    {
        self.state = LoopState::Connected;
        let result = self.consume(consumer, shutdown).await;

        if let Err(e) = consumer.close().await {
            warn!(sensor = %self.sensor, error = %e, "failed to close broker connection");
        }
        self.state = LoopState::Closed;

        match &result {
            Ok(summary) => info!(
                sensor = %self.sensor,
                deliveries = summary.deliveries,
                alerts_sent = summary.alerts_sent,
                "connection closed, goodbye"
            ),
            Err(e) => error!(sensor = %self.sensor, error = %e, "consumption loop failed"),
        }
        result
    }

    async fn consume<C>(
        &mut self,
        consumer: &mut C,
        shutdown: Arc<Notify>,
    ) -> Result<RunSummary, MonitorError>
    where
        C: QueueConsumer + ?Sized,
    {
        consumer.declare(&self.queue).await?;
        self.state = LoopState::QueueDeclared;

        if let (Some(dlq), Some(publisher)) = (&self.dead_letter_queue, &self.dead_letters) {
            if let Err(e) = publisher.declare(dlq).await {
                warn!(sensor = %self.sensor, queue = %dlq, error = %e, "failed to declare dead-letter queue");
            }
        }

        consumer.set_prefetch(1).await?;
        consumer.start_consuming(&self.queue).await?;
        self.state = LoopState::Consuming;
        info!(
            sensor = %self.sensor,
            queue = %self.queue,
            provider = consumer.provider(),
            policy = %self.policy,
            window = self.window.capacity(),
            "ready for readings, press CTRL+C to exit"
        );

        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.notified() => {
                    self.state = LoopState::Draining;
                    info!(sensor = %self.sensor, "interrupted, stopping consumption");
                    return Ok(self.summary.clone());
                }
                next = consumer.next_delivery() => next?,
            };

            let Some(delivery) = next else {
                return Err(MonitorError::StreamEnded(self.queue.clone()));
            };

            self.process(&delivery).await;
            consumer.ack(&delivery).await?;
        }
    }

    async fn process(&mut self, delivery: &Delivery) {
        self.summary.deliveries += 1;
        debug!(
            sensor = %self.sensor,
            delivery_tag = delivery.tag,
            redelivered = delivery.redelivered,
            body = %delivery.body_text(),
            "received"
        );

        if let MessageOutcome::Rejected(e) = self.handle_body(&delivery.body).await {
            warn!(
                sensor = %self.sensor,
                delivery_tag = delivery.tag,
                body = %delivery.body_text(),
                error = %e,
                "undecodable reading, acknowledging and discarding"
            );
            self.dead_letter(delivery).await;
        }
    }

    async fn dead_letter(&mut self, delivery: &Delivery) {
        let (Some(dlq), Some(publisher)) = (&self.dead_letter_queue, &self.dead_letters) else {
            return;
        };
        match publisher.publish(dlq, &delivery.body).await {
            Ok(()) => {
                self.summary.dead_lettered += 1;
                debug!(sensor = %self.sensor, queue = %dlq, delivery_tag = delivery.tag, "forwarded to dead-letter queue");
            }
            Err(e) => {
                warn!(sensor = %self.sensor, queue = %dlq, error = %e, "dead-letter publish failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pitwatch_core::MonitorConfig;
    use pitwatch_notify::{Notification, NotifyError};
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingNotifier {
        sends: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Notifier for CountingNotifier {
        async fn send(&self, _notification: &Notification) -> Result<(), NotifyError> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn channel_name(&self) -> &str {
            "counting"
        }
    }

    fn worker(sensor: &str) -> (SensorWorker, Arc<CountingNotifier>) {
        let config = MonitorConfig::reference();
        let notifier = Arc::new(CountingNotifier::default());
        let worker = SensorWorker::new(
            sensor,
            config.sensor(sensor).unwrap(),
            config.reading_interval_secs,
            notifier.clone(),
        )
        .unwrap();
        (worker, notifier)
    }

    #[tokio::test]
    async fn smoker_scenario_alerts_once() {
        let (mut worker, notifier) = worker("smoker");

        let first = worker.handle_body(b"t1,100").await;
        assert!(matches!(first, MessageOutcome::Evaluated { alert: AlertOutcome::Idle, .. }));
        assert_eq!(notifier.sends.load(Ordering::SeqCst), 0);

        let second = worker.handle_body(b"t2,116").await;
        assert!(matches!(second, MessageOutcome::Evaluated { alert: AlertOutcome::Sent, .. }));

        let third = worker.handle_body(b"t3,117").await;
        assert!(matches!(third, MessageOutcome::Evaluated { alert: AlertOutcome::Suppressed, .. }));
        assert_eq!(notifier.sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn absent_readings_are_skipped() {
        let (mut worker, notifier) = worker("food-a");
        for i in 0..30 {
            let body = format!("t{i},No Reading");
            assert_eq!(worker.handle_body(body.as_bytes()).await, MessageOutcome::Absent);
        }
        assert!(worker.window().is_empty());
        assert!(worker.alerts().is_armed());
        assert_eq!(notifier.sends.load(Ordering::SeqCst), 0);
        assert_eq!(worker.summary().absent, 30);
    }

    #[tokio::test]
    async fn absent_reading_does_not_rearm() {
        let (mut worker, notifier) = worker("smoker");
        worker.handle_body(b"t1,100").await;
        worker.handle_body(b"t2,130").await;
        assert!(!worker.alerts().is_armed());

        worker.handle_body(b"t3,No Reading").await;
        assert!(!worker.alerts().is_armed());
        assert_eq!(notifier.sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn decode_error_leaves_state_untouched() {
        let (mut worker, _notifier) = worker("smoker");
        worker.handle_body(b"t1,100").await;

        let outcome = worker.handle_body(b"t2,100,extra").await;
        assert_eq!(outcome, MessageOutcome::Rejected(ReadingError::FieldCount { found: 3 }));
        assert!(matches!(
            worker.handle_body(b"t3,hot").await,
            MessageOutcome::Rejected(ReadingError::InvalidValue(_))
        ));
        assert_eq!(worker.window().snapshot(), vec![100.0]);
        assert!(worker.alerts().is_armed());
        assert_eq!(worker.summary().decode_errors, 2);
    }

    #[tokio::test]
    async fn retry_gives_up_after_budget() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), QueueError> =
            connect_with_retry(2, Duration::from_millis(1), |_| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(QueueError::Connection("refused".into())) }
            })
            .await;
        assert!(matches!(result, Err(QueueError::Connection(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_succeeds_on_later_attempt() {
        let result = connect_with_retry(3, Duration::from_millis(1), |attempt| async move {
            if attempt < 3 {
                Err(QueueError::Connection("refused".into()))
            } else {
                Ok(attempt)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn no_retries_fails_fast() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), QueueError> = connect_with_retry(0, Duration::from_secs(60), |_| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(QueueError::Connection("refused".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
