use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::broadcast;

use crate::dispatcher::NewsletterDispatcher;
use crate::domain::NewsletterIssue;
use crate::event_source::EventSource;

/// Process a single publish event
#[tracing::instrument(skip_all, fields(payload_bytes = payload.len()))]
async fn try_execute_task(dispatcher: &NewsletterDispatcher, payload: &[u8]) {
    let issue = match NewsletterIssue::from_payload(payload) {
        Ok(issue) => issue,
        Err(e) => {
            tracing::error!(
                error.cause_chain = ?e,
                error.message = %e,
                "Skipping a publish event because its payload is invalid"
            );
            return;
        }
    };

    if let Err(e) = dispatcher.dispatch(&issue).await {
        tracing::error!(
            error.cause_chain = ?e,
            error.message = %e,
            "Failed to dispatch a newsletter issue"
        );
    }
}

/// Dispatch every issue published on `topic` until shutdown or the end of the stream
///
/// Each dispatch completes before the next event is pulled. A shutdown signal
/// received during a dispatch takes effect once that dispatch is done.
pub async fn run_worker_until_stopped(
    source: Arc<dyn EventSource>,
    topic: String,
    dispatcher: NewsletterDispatcher,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let mut events = source.consume(&topic).await?;
    tracing::info!(topic = %topic, "Delivery worker started");

    loop {
        let event = tokio::select! {
            biased;
            _ = shutdown.recv() => {
                tracing::info!("Delivery worker received shutdown signal");
                break;
            }
            event = events.next() => event,
        };

        match event {
            Some(Ok(payload)) => try_execute_task(&dispatcher, &payload).await,
            Some(Err(e)) => {
                tracing::error!(
                    error.cause_chain = ?e,
                    error.message = %e,
                    "Failed to read from the event source"
                );
            }
            None => {
                tracing::warn!(topic = %topic, "Event stream ended");
                break;
            }
        }
    }

    Ok(())
}
