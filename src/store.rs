use std::fmt;

use async_trait::async_trait;

use crate::domain::{Subscriber, SubscriberStatus, SubscriptionToken};
use crate::utils::error_chain_fmt;

mod memory;
mod postgres;

pub use memory::InMemorySubscriberStore;
pub use postgres::PostgresSubscriberStore;

/// Subscriber store error
#[derive(thiserror::Error)]
pub enum StoreError {
    #[error("No subscriber matches the provided key")]
    NotFound,
    #[error("A subscriber with the same email or token already exists")]
    Conflict,
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}

impl fmt::Debug for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        error_chain_fmt(self, f)
    }
}

/// Durable storage of subscriber records
///
/// Implementations enforce one record per email and one record per live token,
/// and provide per-key atomicity for writes. Callers layer no locking on top.
#[async_trait]
pub trait SubscriberStore: Send + Sync {
    /// Acquire the underlying resources
    async fn open(&self) -> Result<(), StoreError>;

    /// Release the underlying resources
    async fn close(&self) -> Result<(), StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Subscriber>, StoreError>;

    async fn find_by_token(
        &self,
        token: &SubscriptionToken,
    ) -> Result<Option<Subscriber>, StoreError>;

    async fn find_by_status(&self, status: SubscriberStatus)
        -> Result<Vec<Subscriber>, StoreError>;

    /// Snapshot of the subscribers currently in the active state
    async fn active_subscribers(&self) -> Result<Vec<Subscriber>, StoreError> {
        self.find_by_status(SubscriberStatus::Active).await
    }

    /// Insert a new record, failing with `Conflict` if the email or token is taken
    async fn insert(&self, subscriber: &Subscriber) -> Result<(), StoreError>;

    /// Overwrite status and token of an existing record
    async fn update_status_and_token(
        &self,
        email: &str,
        status: SubscriberStatus,
        token: Option<&SubscriptionToken>,
    ) -> Result<(), StoreError>;

    /// Atomically move the pending record holding `token` to active
    ///
    /// The token is cleared and `subscribed_at` is stamped. Returns `None` if no
    /// pending record holds the token, so at most one caller wins per token.
    async fn activate(&self, token: &SubscriptionToken) -> Result<Option<Subscriber>, StoreError>;
}
