use chrono::{DateTime, Utc};

use crate::domain::{EmailAddress, SubscriberStatus, SubscriptionToken};

/// Subscriber record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscriber {
    /// Unique and immutable, compared case-sensitively
    pub email: String,
    pub status: SubscriberStatus,
    /// Only meaningful while `status` is `PendingConfirmation`
    pub token: Option<SubscriptionToken>,
    pub created_at: DateTime<Utc>,
    pub subscribed_at: Option<DateTime<Utc>>,
}

impl Subscriber {
    /// Build a new subscriber awaiting confirmation
    pub fn pending(email: &EmailAddress, token: SubscriptionToken) -> Self {
        Self {
            email: email.as_ref().to_owned(),
            status: SubscriberStatus::PendingConfirmation,
            token: Some(token),
            created_at: Utc::now(),
            subscribed_at: None,
        }
    }
}
