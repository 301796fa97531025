//! RabbitMQ (AMQP 0-9-1) consumer and publisher via `lapin`.

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicCancelOptions, BasicConsumeOptions, BasicNackOptions,
    BasicPublishOptions, BasicQosOptions, QueueDeclareOptions, QueueDeleteOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer};
use tracing::{debug, info, warn};

use crate::consumer::{Delivery, QueueConsumer};
use crate::error::QueueError;
use crate::publisher::QueuePublisher;

/// AMQP reply code for a normal close.
const REPLY_SUCCESS: u16 = 200;

/// Delivery mode flag marking a message persistent.
const PERSISTENT: u8 = 2;

async fn declare_durable(channel: &Channel, queue: &str) -> Result<(), QueueError> {
    channel
        .queue_declare(
            queue,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| QueueError::Declare(format!("queue '{queue}': {e}")))?;
    Ok(())
}

/// RabbitMQ-backed queue consumer with manual acknowledgment.
pub struct RabbitMqConsumer {
    connection: Connection,
    channel: Channel,
    consumer: Option<Consumer>,
    consumer_tag: String,
}

impl RabbitMqConsumer {
    /// Open a connection and a channel to the broker at `uri`.
    pub async fn connect(uri: &str) -> Result<Self, QueueError> {
        let connection = Connection::connect(uri, ConnectionProperties::default())
            .await
            .map_err(|e| QueueError::Connection(e.to_string()))?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| QueueError::Connection(format!("channel open failed: {e}")))?;

        let consumer_tag = format!("pitwatch-{}", uuid::Uuid::new_v4());
        debug!(consumer_tag = %consumer_tag, "RabbitMQ channel opened");

        Ok(Self {
            connection,
            channel,
            consumer: None,
            consumer_tag,
        })
    }

    /// A publisher sharing this consumer's channel (used for dead-lettering).
    pub fn publisher(&self) -> RabbitMqPublisher {
        RabbitMqPublisher {
            connection: None,
            channel: self.channel.clone(),
        }
    }
}

#[async_trait]
impl QueueConsumer for RabbitMqConsumer {
    async fn declare(&mut self, queue: &str) -> Result<(), QueueError> {
        declare_durable(&self.channel, queue).await
    }

    async fn set_prefetch(&mut self, count: u16) -> Result<(), QueueError> {
        self.channel
            .basic_qos(count, BasicQosOptions::default())
            .await
            .map_err(|e| QueueError::Provider(format!("basic.qos failed: {e}")))
    }

    async fn start_consuming(&mut self, queue: &str) -> Result<(), QueueError> {
        // no_ack stays false: every delivery waits for an explicit ack.
        let consumer = self
            .channel
            .basic_consume(
                queue,
                &self.consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| QueueError::Consume(format!("basic.consume on '{queue}': {e}")))?;
        info!(queue, consumer_tag = %self.consumer_tag, "RabbitMQ consumer registered");
        self.consumer = Some(consumer);
        Ok(())
    }

    async fn next_delivery(&mut self) -> Result<Option<Delivery>, QueueError> {
        let consumer = self
            .consumer
            .as_mut()
            .ok_or_else(|| QueueError::Consume("start_consuming was not called".into()))?;

        match consumer.next().await {
            Some(Ok(delivery)) => Ok(Some(Delivery::new(
                delivery.delivery_tag,
                delivery.data,
                delivery.redelivered,
            ))),
            Some(Err(e)) => Err(QueueError::Consume(e.to_string())),
            None => Ok(None),
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        debug!(delivery_tag = delivery.tag, "Acking RabbitMQ delivery");
        self.channel
            .basic_ack(delivery.tag, BasicAckOptions::default())
            .await
            .map_err(|e| QueueError::Ack(format!("basic.ack {}: {e}", delivery.tag)))
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<(), QueueError> {
        debug!(delivery_tag = delivery.tag, requeue, "Nacking RabbitMQ delivery");
        self.channel
            .basic_nack(
                delivery.tag,
                BasicNackOptions {
                    multiple: false,
                    requeue,
                },
            )
            .await
            .map_err(|e| QueueError::Ack(format!("basic.nack {}: {e}", delivery.tag)))
    }

    async fn close(&mut self) -> Result<(), QueueError> {
        if self.consumer.take().is_some() {
            if let Err(e) = self
                .channel
                .basic_cancel(&self.consumer_tag, BasicCancelOptions::default())
                .await
            {
                warn!(error = %e, "basic.cancel failed during close");
            }
        }
        if self.channel.status().connected() {
            self.channel
                .close(REPLY_SUCCESS, "Goodbye")
                .await
                .map_err(|e| QueueError::Provider(format!("channel close failed: {e}")))?;
        }
        if self.connection.status().connected() {
            self.connection
                .close(REPLY_SUCCESS, "Goodbye")
                .await
                .map_err(|e| QueueError::Connection(format!("connection close failed: {e}")))?;
        }
        Ok(())
    }

    fn provider(&self) -> &str {
        "rabbitmq"
    }
}

/// Publishes persistent messages to named queues through the default exchange.
pub struct RabbitMqPublisher {
    /// Owned connection when this publisher opened its own; `None` when it
    /// borrows a consumer's channel.
    connection: Option<Connection>,
    channel: Channel,
}

impl RabbitMqPublisher {
    /// Open a dedicated connection and channel for publishing.
    pub async fn connect(uri: &str) -> Result<Self, QueueError> {
        let connection = Connection::connect(uri, ConnectionProperties::default())
            .await
            .map_err(|e| QueueError::Connection(e.to_string()))?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| QueueError::Connection(format!("channel open failed: {e}")))?;
        Ok(Self {
            connection: Some(connection),
            channel,
        })
    }

    /// Close the channel and, if owned, the connection.
    pub async fn close(self) -> Result<(), QueueError> {
        let Some(connection) = self.connection else {
            return Ok(());
        };
        self.channel
            .close(REPLY_SUCCESS, "Goodbye")
            .await
            .map_err(|e| QueueError::Provider(format!("channel close failed: {e}")))?;
        connection
            .close(REPLY_SUCCESS, "Goodbye")
            .await
            .map_err(|e| QueueError::Connection(format!("connection close failed: {e}")))
    }
}

#[async_trait]
impl QueuePublisher for RabbitMqPublisher {
    async fn declare(&self, queue: &str) -> Result<(), QueueError> {
        declare_durable(&self.channel, queue).await
    }

    async fn delete(&self, queue: &str) -> Result<u32, QueueError> {
        self.channel
            .queue_delete(queue, QueueDeleteOptions::default())
            .await
            .map_err(|e| QueueError::Declare(format!("queue.delete '{queue}': {e}")))
    }

    async fn publish(&self, queue: &str, body: &[u8]) -> Result<(), QueueError> {
        self.channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                body,
                BasicProperties::default().with_delivery_mode(PERSISTENT),
            )
            .await
            .map_err(|e| QueueError::Publish(format!("basic.publish to '{queue}': {e}")))?
            .await
            .map(|_| ())
            .map_err(|e| QueueError::Publish(format!("publish confirm for '{queue}': {e}")))
    }
}
