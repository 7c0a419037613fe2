use async_trait::async_trait;
use futures::stream::BoxStream;

mod channel;
mod rabbitmq;

pub use channel::ChannelEventSource;
pub use rabbitmq::RabbitMqEventSource;

/// Lazy sequence of opaque event payloads
pub type EventStream = BoxStream<'static, anyhow::Result<Vec<u8>>>;

/// Producer of newsletter publish events
///
/// A stream ends only when the underlying source goes away. Consumers stop
/// pulling from it to cancel.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Start consuming the events published on `topic`
    async fn consume(&self, topic: &str) -> anyhow::Result<EventStream>;
}
