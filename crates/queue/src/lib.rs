pub mod consumer;
pub mod error;
pub mod memory;
pub mod publisher;
pub mod rabbitmq;

pub use consumer::{Delivery, QueueConsumer};
pub use error::QueueError;
pub use memory::{MemoryPublisher, MemoryQueue, MemoryQueueHandle};
pub use publisher::QueuePublisher;
pub use rabbitmq::{RabbitMqConsumer, RabbitMqPublisher};
