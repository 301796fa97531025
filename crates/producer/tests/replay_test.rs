use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::timeout;

use pitwatch_core::MonitorConfig;
use pitwatch_producer::dataset;
use pitwatch_producer::Replayer;
use pitwatch_producer::ProducerError;
use pitwatch_queue::{MemoryPublisher, QueueError, QueuePublisher};

/// Broker that refuses every queue declaration.
struct RefusingPublisher {
    inner: MemoryPublisher,
}

#[async_trait::async_trait]
impl QueuePublisher for RefusingPublisher {
    async fn declare(&self, queue: &str) -> Result<(), QueueError> {
        Err(QueueError::Declare(format!("access refused for '{queue}'")))
    }

    async fn delete(&self, queue: &str) -> Result<u32, QueueError> {
        self.inner.delete(queue).await
    }

    async fn publish(&self, queue: &str, body: &[u8]) -> Result<(), QueueError> {
        self.inner.publish(queue, body).await
    }
}

const SESSION: &str = "\
Time (UTC),Channel1,Channel2,Channel3
10/25/23 8:00:00,35.0,,
10/25/23 8:00:30,36.1,32.4,
10/25/23 8:01:00,,32.5,32.0
";

fn bodies(publisher: &MemoryPublisher, queue: &str) -> Vec<String> {
    publisher
        .published(queue)
        .into_iter()
        .map(|b| String::from_utf8(b).unwrap())
        .collect()
}

#[tokio::test]
async fn publishes_each_column_to_its_queue() {
    let config = MonitorConfig::reference();
    let publisher = MemoryPublisher::new();
    let replayer = Replayer::new(&publisher, &config).with_interval(Duration::ZERO);

    let queues: Vec<&str> = replayer.routes().iter().map(|r| r.queue.as_str()).collect();
    assert_eq!(queues, vec!["01-smoker", "02-food-A", "03-food-B"]);

    replayer.prepare(false).await.unwrap();
    let rows = dataset::parse(SESSION).unwrap();
    let summary = replayer.replay(&rows, None, Arc::new(Notify::new())).await.unwrap();

    assert_eq!(summary.rows, 3);
    assert_eq!(summary.published, 9);
    assert!(!summary.interrupted);
    assert_eq!(
        bodies(&publisher, "01-smoker"),
        vec![
            "10/25/23 8:00:00,35",
            "10/25/23 8:00:30,36.1",
            "10/25/23 8:01:00,No Reading",
        ]
    );
    assert_eq!(
        bodies(&publisher, "03-food-B"),
        vec![
            "10/25/23 8:00:00,No Reading",
            "10/25/23 8:00:30,No Reading",
            "10/25/23 8:01:00,32",
        ]
    );
}

#[tokio::test]
async fn purge_drops_queued_messages() {
    let config = MonitorConfig::reference();
    let publisher = MemoryPublisher::new();
    publisher.declare("01-smoker").await.unwrap();
    publisher.publish("01-smoker", b"stale,1").await.unwrap();

    let replayer = Replayer::new(&publisher, &config).with_interval(Duration::ZERO);
    replayer.prepare(true).await.unwrap();

    assert!(publisher.published("01-smoker").is_empty());
    assert_eq!(publisher.declared().len(), 3);
}

#[tokio::test]
async fn limit_caps_rows() {
    let config = MonitorConfig::reference();
    let publisher = MemoryPublisher::new();
    let replayer = Replayer::new(&publisher, &config).with_interval(Duration::ZERO);
    replayer.prepare(false).await.unwrap();

    let rows = dataset::parse(SESSION).unwrap();
    let summary = replayer.replay(&rows, Some(1), Arc::new(Notify::new())).await.unwrap();

    assert_eq!(summary.rows, 1);
    assert_eq!(bodies(&publisher, "02-food-A"), vec!["10/25/23 8:00:00,No Reading"]);
}

#[tokio::test]
async fn interrupt_stops_between_rows() {
    let config = MonitorConfig::reference();
    let publisher = MemoryPublisher::new();
    let replayer = Replayer::new(&publisher, &config).with_interval(Duration::from_secs(3600));
    replayer.prepare(false).await.unwrap();

    let shutdown = Arc::new(Notify::new());
    shutdown.notify_one();

    let rows = dataset::parse(SESSION).unwrap();
    let summary = timeout(Duration::from_secs(5), replayer.replay(&rows, None, shutdown))
        .await
        .expect("replay ignored the interrupt")
        .unwrap();

    assert!(summary.interrupted);
    assert_eq!(summary.rows, 1);
    assert_eq!(summary.published, 3);
}

#[tokio::test]
async fn unpublishable_cells_are_skipped() {
    let config = MonitorConfig::reference();
    let publisher = MemoryPublisher::new();
    let replayer = Replayer::new(&publisher, &config).with_interval(Duration::ZERO);
    replayer.prepare(false).await.unwrap();

    let rows = dataset::parse("header\nt1,hot,100,101\n").unwrap();
    let summary = replayer.replay(&rows, None, Arc::new(Notify::new())).await.unwrap();

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.published, 2);
    assert!(publisher.published("01-smoker").is_empty());
}

#[tokio::test]
async fn failed_preparation_publishes_nothing() {
    let config = MonitorConfig::reference();
    let publisher = RefusingPublisher {
        inner: MemoryPublisher::new(),
    };
    let replayer = Replayer::new(&publisher, &config).with_interval(Duration::ZERO);

    let rows = dataset::parse(SESSION).unwrap();
    let result = replayer.run(&rows, false, None, Arc::new(Notify::new())).await;

    assert!(matches!(result, Err(ProducerError::Queue(QueueError::Declare(_)))));
    assert!(publisher.inner.published("01-smoker").is_empty());
}

#[tokio::test]
async fn run_prepares_then_replays() {
    let config = MonitorConfig::reference();
    let publisher = MemoryPublisher::new();
    let replayer = Replayer::new(&publisher, &config).with_interval(Duration::ZERO);

    let rows = dataset::parse(SESSION).unwrap();
    let summary = replayer.run(&rows, true, None, Arc::new(Notify::new())).await.unwrap();

    assert_eq!(summary.published, 9);
    assert_eq!(publisher.declared().len(), 3);
}
