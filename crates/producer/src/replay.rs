//! Replays dataset rows onto the sensor queues at a fixed cadence.

use std::sync::Arc;
use std::time::Duration;

use pitwatch_core::MonitorConfig;
use pitwatch_queue::QueuePublisher;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::dataset::DatasetRow;
use crate::error::ProducerError;

/// Where one sensor's readings are published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub sensor: String,
    pub queue: String,
    pub column: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub rows: usize,
    pub published: usize,
    pub skipped: usize,
    pub interrupted: bool,
}

pub struct Replayer<'a> {
    publisher: &'a dyn QueuePublisher,
    routes: Vec<Route>,
    interval: Duration,
}

impl<'a> Replayer<'a> {
    /// Routes come from the sensor profiles, ordered by dataset column.
    pub fn new(publisher: &'a dyn QueuePublisher, config: &MonitorConfig) -> Self {
        let routes = config
            .sensors_by_column()
            .into_iter()
            .map(|(name, sensor)| Route {
                sensor: name.to_string(),
                queue: sensor.queue.clone(),
                column: sensor.column,
            })
            .collect();
        Self {
            publisher,
            routes,
            interval: Duration::from_secs(config.reading_interval_secs),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Declare every sensor queue, deleting it first when `purge` is set.
    pub async fn prepare(&self, purge: bool) -> Result<(), ProducerError> {
        for route in &self.routes {
            if purge {
                let dropped = self.publisher.delete(&route.queue).await?;
                info!(queue = %route.queue, dropped, "queue purged");
            }
            self.publisher.declare(&route.queue).await?;
        }
        Ok(())
    }

    /// Prepare the queues, then replay `rows`. Nothing is published when
    /// preparation fails.
    pub async fn run(
        &self,
        rows: &[DatasetRow],
        purge: bool,
        limit: Option<usize>,
        shutdown: Arc<Notify>,
    ) -> Result<ReplaySummary, ProducerError> {
        self.prepare(purge).await?;
        self.replay(rows, limit, shutdown).await
    }

    /// Publish one message per sensor per row, waiting `interval` between
    /// rows. Stops early when `shutdown` is notified.
    pub async fn replay(
        &self,
        rows: &[DatasetRow],
        limit: Option<usize>,
        shutdown: Arc<Notify>,
    ) -> Result<ReplaySummary, ProducerError> {
        let mut summary = ReplaySummary::default();
        let rows = &rows[..limit.unwrap_or(rows.len()).min(rows.len())];

        for (index, row) in rows.iter().enumerate() {
            for route in &self.routes {
                match row.message(route.column) {
                    Ok(body) => {
                        self.publisher.publish(&route.queue, body.as_bytes()).await?;
                        summary.published += 1;
                        info!(queue = %route.queue, message = %body, "sent");
                    }
                    Err(e) => {
                        summary.skipped += 1;
                        warn!(sensor = %route.sensor, error = %e, "skipping unpublishable cell");
                    }
                }
            }
            summary.rows += 1;

            let last = index + 1 == rows.len();
            if !last && !self.interval.is_zero() {
                tokio::select! {
                    biased;
                    _ = shutdown.notified() => {
                        summary.interrupted = true;
                        info!(rows = summary.rows, "interrupted, stopping replay");
                        break;
                    }
                    _ = tokio::time::sleep(self.interval) => {}
                }
            }
        }

        Ok(summary)
    }
}
