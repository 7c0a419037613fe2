use std::sync::Arc;

use anyhow::Context;
use tracing::field::display;
use tracing::Span;
use uuid::Uuid;

use crate::domain::{EmailAddress, NewsletterIssue};
use crate::email_client::MailTransport;
use crate::store::SubscriberStore;

/// Outcome of a single fan-out
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    /// Recipients whose delivery failed or whose stored address is invalid
    pub failed: Vec<String>,
}

/// Best-effort fan-out of newsletter issues to the active subscriber set
#[derive(Clone)]
pub struct NewsletterDispatcher {
    store: Arc<dyn SubscriberStore>,
    mail: Arc<dyn MailTransport>,
}

impl NewsletterDispatcher {
    pub fn new(store: Arc<dyn SubscriberStore>, mail: Arc<dyn MailTransport>) -> Self {
        Self { store, mail }
    }

    /// Deliver an issue to every subscriber active at the time of the call
    ///
    /// Per-subscriber failures are logged and do not stop the loop. Only a
    /// failure to read the active set fails the whole dispatch.
    #[tracing::instrument(
        name = "Dispatching newsletter issue",
        skip_all,
        fields(dispatch_id = tracing::field::Empty, subject = %issue.subject)
    )]
    pub async fn dispatch(&self, issue: &NewsletterIssue) -> anyhow::Result<DispatchReport> {
        Span::current().record("dispatch_id", display(Uuid::new_v4()));

        let subscribers = self
            .store
            .active_subscribers()
            .await
            .context("Failed to load the active subscribers")?;

        let mut report = DispatchReport::default();
        for subscriber in subscribers {
            let email = match EmailAddress::parse(subscriber.email.clone()) {
                Ok(email) => email,
                Err(e) => {
                    tracing::warn!(
                        error.message = %e,
                        "Skipping an active subscriber because their stored contact details are invalid"
                    );
                    report.failed.push(subscriber.email);
                    continue;
                }
            };

            match self.mail.send(&email, &issue.subject, &issue.body).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::error!(
                        error.cause_chain = ?e,
                        error.message = %e,
                        "Failed to deliver issue to active subscriber {}", email
                    );
                    report.failed.push(subscriber.email);
                }
            }
        }

        tracing::info!(
            delivered = report.delivered,
            failed = report.failed.len(),
            "Newsletter issue dispatched"
        );
        Ok(report)
    }
}
