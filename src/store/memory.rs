use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use crate::domain::{Subscriber, SubscriberStatus, SubscriptionToken};
use crate::store::{StoreError, SubscriberStore};

/// Records keyed by email, with a secondary index on live tokens
#[derive(Default)]
struct Records {
    by_email: BTreeMap<String, Subscriber>,
    by_token: HashMap<SubscriptionToken, String>,
}

/// Process-local subscriber store
///
/// A single mutex serializes all writes, which gives the per-key atomicity the
/// store contract asks for. Nothing survives a restart.
#[derive(Default)]
pub struct InMemorySubscriberStore {
    records: Mutex<Records>,
}

impl InMemorySubscriberStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriberStore for InMemorySubscriberStore {
    async fn open(&self) -> Result<(), StoreError> {
        tracing::warn!("Using the in-memory subscriber store, records will not be persisted");
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Subscriber>, StoreError> {
        Ok(self.records.lock().by_email.get(email).cloned())
    }

    async fn find_by_token(
        &self,
        token: &SubscriptionToken,
    ) -> Result<Option<Subscriber>, StoreError> {
        let records = self.records.lock();
        Ok(records
            .by_token
            .get(token)
            .and_then(|email| records.by_email.get(email))
            .cloned())
    }

    async fn find_by_status(
        &self,
        status: SubscriberStatus,
    ) -> Result<Vec<Subscriber>, StoreError> {
        Ok(self
            .records
            .lock()
            .by_email
            .values()
            .filter(|s| s.status == status)
            .cloned()
            .collect())
    }

    async fn insert(&self, subscriber: &Subscriber) -> Result<(), StoreError> {
        let mut records = self.records.lock();
        if records.by_email.contains_key(&subscriber.email) {
            return Err(StoreError::Conflict);
        }
        if let Some(token) = &subscriber.token {
            if records.by_token.contains_key(token) {
                return Err(StoreError::Conflict);
            }
            records
                .by_token
                .insert(token.clone(), subscriber.email.clone());
        }
        records
            .by_email
            .insert(subscriber.email.clone(), subscriber.clone());
        Ok(())
    }

    async fn update_status_and_token(
        &self,
        email: &str,
        status: SubscriberStatus,
        token: Option<&SubscriptionToken>,
    ) -> Result<(), StoreError> {
        let mut records = self.records.lock();
        let Records { by_email, by_token } = &mut *records;

        let subscriber = by_email.get_mut(email).ok_or(StoreError::NotFound)?;
        if let Some(token) = token {
            if by_token.get(token).is_some_and(|owner| owner != email) {
                return Err(StoreError::Conflict);
            }
        }

        if let Some(previous) = subscriber.token.take() {
            by_token.remove(&previous);
        }
        if let Some(token) = token {
            by_token.insert(token.clone(), email.to_owned());
        }
        subscriber.status = status;
        subscriber.token = token.cloned();
        Ok(())
    }

    async fn activate(&self, token: &SubscriptionToken) -> Result<Option<Subscriber>, StoreError> {
        let mut records = self.records.lock();
        let Records { by_email, by_token } = &mut *records;

        let Some(email) = by_token.get(token) else {
            return Ok(None);
        };
        let Some(subscriber) = by_email.get_mut(email) else {
            return Ok(None);
        };
        if subscriber.status != SubscriberStatus::PendingConfirmation {
            return Ok(None);
        }

        by_token.remove(token);
        subscriber.status = SubscriberStatus::Active;
        subscriber.token = None;
        subscriber.subscribed_at = Some(Utc::now());
        Ok(Some(subscriber.clone()))
    }
}
