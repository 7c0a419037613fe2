use async_trait::async_trait;
use futures::{stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::event_source::{EventSource, EventStream};

/// In-process event source fed through a `tokio` channel
///
/// It can be consumed once, whatever the topic, and its stream ends when
/// every sender is dropped.
pub struct ChannelEventSource {
    receiver: Mutex<Option<mpsc::Receiver<Vec<u8>>>>,
}

impl ChannelEventSource {
    /// Build a source together with the sender that feeds it
    pub fn new(buffer: usize) -> (Self, mpsc::Sender<Vec<u8>>) {
        let (sender, receiver) = mpsc::channel(buffer);
        let source = Self {
            receiver: Mutex::new(Some(receiver)),
        };
        (source, sender)
    }
}

#[async_trait]
impl EventSource for ChannelEventSource {
    async fn consume(&self, topic: &str) -> anyhow::Result<EventStream> {
        let receiver = self
            .receiver
            .lock()
            .take()
            .ok_or_else(|| anyhow::anyhow!("The event source for `{topic}` was already consumed"))?;

        Ok(stream::unfold(receiver, |mut receiver| async move {
            receiver
                .recv()
                .await
                .map(|payload| (Ok::<_, anyhow::Error>(payload), receiver))
        })
        .boxed())
    }
}
