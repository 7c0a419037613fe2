//! In-memory stand-ins for external collaborators, used by unit tests

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use linkify::{LinkFinder, LinkKind};
use parking_lot::Mutex;
use url::Url;

use crate::domain::{EmailAddress, Subscriber, SubscriberStatus, SubscriptionToken};
use crate::email_client::MailTransport;
use crate::store::{InMemorySubscriberStore, StoreError, SubscriberStore};
use crate::token_issuer::TokenIssuer;

/// Email captured by `RecordingMailTransport`
#[derive(Debug, Clone)]
pub struct SentEmail {
    pub recipient: String,
    pub subject: String,
    pub html_body: String,
}

impl SentEmail {
    /// Extract the single link embedded in the body
    pub fn link(&self) -> Url {
        let links: Vec<_> = LinkFinder::new()
            .links(&self.html_body)
            .filter(|l| *l.kind() == LinkKind::Url)
            .collect();
        assert_eq!(links.len(), 1, "expected one link in {:?}", self.html_body);
        Url::parse(links[0].as_str()).unwrap()
    }

    /// Extract a query parameter from the embedded link
    pub fn link_param(&self, name: &str) -> String {
        self.link()
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
            .unwrap()
    }
}

/// Mail transport that records every delivery and fails for chosen recipients
#[derive(Default)]
pub struct RecordingMailTransport {
    sent: Mutex<Vec<SentEmail>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingMailTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every delivery to `recipient` fail from now on
    pub fn fail_for(&self, recipient: &str) {
        self.failing.lock().insert(recipient.to_owned());
    }

    /// Let deliveries to `recipient` succeed again
    pub fn heal(&self, recipient: &str) {
        self.failing.lock().remove(recipient);
    }

    /// Successfully delivered emails
    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().clone()
    }

    pub fn sent_to(&self, recipient: &str) -> Vec<SentEmail> {
        self.sent()
            .into_iter()
            .filter(|e| e.recipient == recipient)
            .collect()
    }
}

#[async_trait]
impl MailTransport for RecordingMailTransport {
    async fn send(
        &self,
        recipient: &EmailAddress,
        subject: &str,
        html_body: &str,
    ) -> anyhow::Result<()> {
        if self.failing.lock().contains(recipient.as_ref()) {
            anyhow::bail!("Mailbox {recipient} is unavailable");
        }
        self.sent.lock().push(SentEmail {
            recipient: recipient.as_ref().to_owned(),
            subject: subject.to_owned(),
            html_body: html_body.to_owned(),
        });
        Ok(())
    }
}

/// Token issuer that always hands out the same token
pub struct FixedTokenIssuer(pub SubscriptionToken);

impl TokenIssuer for FixedTokenIssuer {
    fn issue(&self) -> SubscriptionToken {
        self.0.clone()
    }
}

/// In-memory store counting `open` and `close` calls
#[derive(Default)]
pub struct LifecycleStore {
    inner: InMemorySubscriberStore,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl LifecycleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SubscriberStore for LifecycleStore {
    async fn open(&self) -> Result<(), StoreError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.inner.open().await
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        self.inner.close().await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Subscriber>, StoreError> {
        self.inner.find_by_email(email).await
    }

    async fn find_by_token(
        &self,
        token: &SubscriptionToken,
    ) -> Result<Option<Subscriber>, StoreError> {
        self.inner.find_by_token(token).await
    }

    async fn find_by_status(
        &self,
        status: SubscriberStatus,
    ) -> Result<Vec<Subscriber>, StoreError> {
        self.inner.find_by_status(status).await
    }

    async fn insert(&self, subscriber: &Subscriber) -> Result<(), StoreError> {
        self.inner.insert(subscriber).await
    }

    async fn update_status_and_token(
        &self,
        email: &str,
        status: SubscriberStatus,
        token: Option<&SubscriptionToken>,
    ) -> Result<(), StoreError> {
        self.inner.update_status_and_token(email, status, token).await
    }

    async fn activate(&self, token: &SubscriptionToken) -> Result<Option<Subscriber>, StoreError> {
        self.inner.activate(token).await
    }
}
