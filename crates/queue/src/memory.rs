//! In-process queue used by tests and dry runs.
//!
//! [`MemoryQueue`] behaves like a broker-side queue feeding one consumer:
//! bodies pushed through the [`MemoryQueueHandle`] are delivered in order,
//! the prefetch limit is enforced, and every ack/nack is recorded so tests
//! can assert on acknowledgment discipline.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::consumer::{Delivery, QueueConsumer};
use crate::error::QueueError;
use crate::publisher::QueuePublisher;

#[derive(Debug, Default)]
struct MemoryState {
    declared: Vec<String>,
    prefetch: Option<u16>,
    consuming: Option<String>,
    next_tag: u64,
    unacked: HashSet<u64>,
    acked: Vec<u64>,
    nacked: Vec<(u64, bool)>,
    published: BTreeMap<String, Vec<Vec<u8>>>,
    fail_next_ack: bool,
    closed: bool,
}

fn lock(state: &Mutex<MemoryState>) -> MutexGuard<'_, MemoryState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Consumer side of an in-memory queue.
pub struct MemoryQueue {
    state: Arc<Mutex<MemoryState>>,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

/// Test-side handle: feeds messages in and inspects what the consumer did.
#[derive(Clone)]
pub struct MemoryQueueHandle {
    state: Arc<Mutex<MemoryState>>,
    tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
}

impl MemoryQueue {
    pub fn new() -> (Self, MemoryQueueHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(MemoryState::default()));
        (
            Self {
                state: state.clone(),
                rx,
            },
            MemoryQueueHandle {
                state,
                tx: Some(tx),
            },
        )
    }
}

impl MemoryQueueHandle {
    /// Enqueue a raw body.
    pub fn send(&self, body: impl Into<Vec<u8>>) {
        if let Some(tx) = &self.tx {
            // The receiver only disappears once the consumer is dropped.
            let _ = tx.send(body.into());
        }
    }

    /// Stop feeding; the consumer sees the end of the stream once drained.
    ///
    /// Every clone of the handle must be closed (or dropped) for the
    /// stream to end.
    pub fn close(&mut self) {
        self.tx = None;
    }

    /// Make the next `ack` fail, as a dropped channel would.
    pub fn fail_next_ack(&self) {
        lock(&self.state).fail_next_ack = true;
    }

    pub fn declared(&self) -> Vec<String> {
        lock(&self.state).declared.clone()
    }

    pub fn prefetch(&self) -> Option<u16> {
        lock(&self.state).prefetch
    }

    pub fn consuming(&self) -> Option<String> {
        lock(&self.state).consuming.clone()
    }

    /// Delivery tags acknowledged so far, in order.
    pub fn acked(&self) -> Vec<u64> {
        lock(&self.state).acked.clone()
    }

    pub fn nacked(&self) -> Vec<(u64, bool)> {
        lock(&self.state).nacked.clone()
    }

    /// Number of deliveries handed out but not yet acked or nacked.
    pub fn in_flight(&self) -> usize {
        lock(&self.state).unacked.len()
    }

    /// Bodies published to `queue` through a [`MemoryPublisher`].
    pub fn published(&self, queue: &str) -> Vec<Vec<u8>> {
        lock(&self.state)
            .published
            .get(queue)
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    /// A publisher writing into this queue's shared state.
    pub fn publisher(&self) -> MemoryPublisher {
        MemoryPublisher {
            state: self.state.clone(),
        }
    }
}

impl MemoryQueue {
    fn settle(&self, tag: u64) -> Result<(), QueueError> {
        let mut state = lock(&self.state);
        if !state.unacked.remove(&tag) {
            return Err(QueueError::Ack(format!("unknown delivery tag {tag}")));
        }
        Ok(())
    }
}

#[async_trait]
impl QueueConsumer for MemoryQueue {
    async fn declare(&mut self, queue: &str) -> Result<(), QueueError> {
        let mut state = lock(&self.state);
        if !state.declared.iter().any(|q| q == queue) {
            state.declared.push(queue.to_string());
        }
        Ok(())
    }

    async fn set_prefetch(&mut self, count: u16) -> Result<(), QueueError> {
        lock(&self.state).prefetch = Some(count);
        Ok(())
    }

    async fn start_consuming(&mut self, queue: &str) -> Result<(), QueueError> {
        let mut state = lock(&self.state);
        if !state.declared.iter().any(|q| q == queue) {
            return Err(QueueError::Consume(format!("queue '{queue}' was not declared")));
        }
        state.consuming = Some(queue.to_string());
        Ok(())
    }

    async fn next_delivery(&mut self) -> Result<Option<Delivery>, QueueError> {
        {
            let state = lock(&self.state);
            if state.consuming.is_none() {
                return Err(QueueError::Consume("start_consuming was not called".into()));
            }
            if let Some(limit) = state.prefetch {
                if limit > 0 && state.unacked.len() >= limit as usize {
                    return Err(QueueError::Provider(format!(
                        "prefetch limit {limit} reached with unacknowledged deliveries"
                    )));
                }
            }
        }

        let Some(body) = self.rx.recv().await else {
            return Ok(None);
        };

        let mut state = lock(&self.state);
        state.next_tag += 1;
        let tag = state.next_tag;
        state.unacked.insert(tag);
        Ok(Some(Delivery::new(tag, body, false)))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        {
            let mut state = lock(&self.state);
            if state.fail_next_ack {
                state.fail_next_ack = false;
                return Err(QueueError::Ack("channel closed".into()));
            }
        }
        self.settle(delivery.tag)?;
        lock(&self.state).acked.push(delivery.tag);
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<(), QueueError> {
        self.settle(delivery.tag)?;
        lock(&self.state).nacked.push((delivery.tag, requeue));
        Ok(())
    }

    async fn close(&mut self) -> Result<(), QueueError> {
        let mut state = lock(&self.state);
        state.consuming = None;
        state.closed = true;
        self.rx.close();
        Ok(())
    }

    fn provider(&self) -> &str {
        "memory"
    }
}

/// Publisher recording bodies per queue name.
#[derive(Clone)]
pub struct MemoryPublisher {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
        }
    }

    pub fn published(&self, queue: &str) -> Vec<Vec<u8>> {
        lock(&self.state)
            .published
            .get(queue)
            .cloned()
            .unwrap_or_default()
    }

    pub fn declared(&self) -> Vec<String> {
        lock(&self.state).declared.clone()
    }
}

impl Default for MemoryPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueuePublisher for MemoryPublisher {
    async fn declare(&self, queue: &str) -> Result<(), QueueError> {
        let mut state = lock(&self.state);
        if !state.declared.iter().any(|q| q == queue) {
            state.declared.push(queue.to_string());
        }
        Ok(())
    }

    async fn delete(&self, queue: &str) -> Result<u32, QueueError> {
        let mut state = lock(&self.state);
        state.declared.retain(|q| q != queue);
        let dropped = state.published.remove(queue).map(|m| m.len()).unwrap_or(0);
        Ok(dropped as u32)
    }

    async fn publish(&self, queue: &str, body: &[u8]) -> Result<(), QueueError> {
        let mut state = lock(&self.state);
        if !state.declared.iter().any(|q| q == queue) {
            return Err(QueueError::Publish(format!("queue '{queue}' was not declared")));
        }
        state
            .published
            .entry(queue.to_string())
            .or_default()
            .push(body.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn consuming_queue(prefetch: u16) -> (MemoryQueue, MemoryQueueHandle) {
        let (mut queue, handle) = MemoryQueue::new();
        queue.declare("q").await.unwrap();
        queue.set_prefetch(prefetch).await.unwrap();
        queue.start_consuming("q").await.unwrap();
        (queue, handle)
    }

    #[tokio::test]
    async fn delivers_in_order_and_records_acks() {
        let (mut queue, handle) = consuming_queue(1).await;
        handle.send("t1,100");
        handle.send("t2,101");

        let first = queue.next_delivery().await.unwrap().unwrap();
        assert_eq!(first.body, b"t1,100");
        queue.ack(&first).await.unwrap();

        let second = queue.next_delivery().await.unwrap().unwrap();
        assert_eq!(second.body, b"t2,101");
        queue.ack(&second).await.unwrap();

        assert_eq!(handle.acked(), vec![first.tag, second.tag]);
        assert_eq!(handle.in_flight(), 0);
    }

    #[tokio::test]
    async fn prefetch_limit_is_enforced() {
        let (mut queue, handle) = consuming_queue(1).await;
        handle.send("a");
        handle.send("b");

        let _first = queue.next_delivery().await.unwrap().unwrap();
        let err = queue.next_delivery().await.unwrap_err();
        assert!(err.to_string().contains("prefetch"), "got: {err}");
    }

    #[tokio::test]
    async fn double_ack_is_rejected() {
        let (mut queue, handle) = consuming_queue(1).await;
        handle.send("a");
        let delivery = queue.next_delivery().await.unwrap().unwrap();
        queue.ack(&delivery).await.unwrap();
        assert!(matches!(queue.ack(&delivery).await, Err(QueueError::Ack(_))));
        assert_eq!(handle.acked().len(), 1);
    }

    #[tokio::test]
    async fn stream_ends_after_handle_closed() {
        let (mut queue, mut handle) = consuming_queue(1).await;
        handle.send("last");
        handle.close();

        let delivery = queue.next_delivery().await.unwrap().unwrap();
        queue.nack(&delivery, false).await.unwrap();
        assert!(queue.next_delivery().await.unwrap().is_none());
        assert_eq!(handle.nacked(), vec![(delivery.tag, false)]);
    }

    #[tokio::test]
    async fn consuming_requires_declared_queue() {
        let (mut queue, _handle) = MemoryQueue::new();
        assert!(queue.start_consuming("nope").await.is_err());
        assert!(queue.next_delivery().await.is_err());
    }

    #[tokio::test]
    async fn injected_ack_failure_leaves_delivery_in_flight() {
        let (mut queue, handle) = consuming_queue(1).await;
        handle.send("a");
        let delivery = queue.next_delivery().await.unwrap().unwrap();
        handle.fail_next_ack();
        assert!(queue.ack(&delivery).await.is_err());
        assert_eq!(handle.in_flight(), 1);
    }

    #[tokio::test]
    async fn publisher_requires_declare_and_supports_delete() {
        let publisher = MemoryPublisher::new();
        assert!(publisher.publish("q", b"x").await.is_err());

        publisher.declare("q").await.unwrap();
        publisher.publish("q", b"x").await.unwrap();
        publisher.publish("q", b"y").await.unwrap();
        assert_eq!(publisher.published("q").len(), 2);

        assert_eq!(publisher.delete("q").await.unwrap(), 2);
        assert!(publisher.declared().is_empty());
    }
}
