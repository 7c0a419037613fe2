use std::fmt;
use std::sync::Arc;

use anyhow::Context;

use crate::domain::{EmailAddress, Subscriber, SubscriberStatus, SubscriptionToken};
use crate::email_client::MailTransport;
use crate::link_signer::LinkSigner;
use crate::store::{StoreError, SubscriberStore};
use crate::token_issuer::TokenIssuer;
use crate::utils::error_chain_fmt;

/// Subscription lifecycle error
#[derive(thiserror::Error)]
pub enum SubscriptionError {
    #[error("{0}")]
    Invalid(String),
    #[error("Either email or hash is invalid.")]
    InvalidLink,
    #[error("A subscriber with the same email or token already exists")]
    Conflict,
    #[error("There is no pending subscriber associated with the provided token")]
    NotFound,
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}

impl fmt::Debug for SubscriptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl From<StoreError> for SubscriptionError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => Self::NotFound,
            StoreError::Conflict => Self::Conflict,
            StoreError::UnexpectedError(e) => Self::UnexpectedError(e),
        }
    }
}

/// Result of a subscribe request that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// A confirmation email went out and the record is pending
    Created,
    /// The record is already pending, nothing was sent
    AlreadyPending,
    /// The record is already active, nothing was sent
    AlreadyActive,
}

/// Subscriber lifecycle: subscribe, confirm, unsubscribe
pub struct SubscriptionService {
    store: Arc<dyn SubscriberStore>,
    mail: Arc<dyn MailTransport>,
    token_issuer: Arc<dyn TokenIssuer>,
    link_signer: LinkSigner,
    base_url: String,
    product_name: String,
}

impl SubscriptionService {
    pub fn new(
        store: Arc<dyn SubscriberStore>,
        mail: Arc<dyn MailTransport>,
        token_issuer: Arc<dyn TokenIssuer>,
        link_signer: LinkSigner,
        base_url: String,
        product_name: String,
    ) -> Self {
        Self {
            store,
            mail,
            token_issuer,
            link_signer,
            base_url: base_url.trim_end_matches('/').to_owned(),
            product_name,
        }
    }

    /// Name of the newsletter, as shown to subscribers
    pub fn product_name(&self) -> &str {
        &self.product_name
    }

    /// Start or resume a subscription
    ///
    /// A pending record is left alone so repeated submissions do not flood the
    /// inbox. An unsubscribed record gets a fresh token and a new confirmation
    /// email. The record is written only after the email went out.
    #[tracing::instrument(
        name = "Adding a new subscriber",
        skip(self, email),
        fields(subscriber_email = %email)
    )]
    pub async fn subscribe(&self, email: String) -> Result<SubscribeOutcome, SubscriptionError> {
        let email = EmailAddress::parse(email).map_err(SubscriptionError::Invalid)?;

        let Some(existing) = self.store.find_by_email(email.as_ref()).await? else {
            let token = self.token_issuer.issue();
            self.send_confirmation_email(&email, &token).await?;
            self.store
                .insert(&Subscriber::pending(&email, token))
                .await?;
            return Ok(SubscribeOutcome::Created);
        };

        match existing.status {
            SubscriberStatus::PendingConfirmation => Ok(SubscribeOutcome::AlreadyPending),
            SubscriberStatus::Active => Ok(SubscribeOutcome::AlreadyActive),
            SubscriberStatus::Unsubscribed => {
                let token = self.token_issuer.issue();
                self.send_confirmation_email(&email, &token).await?;
                self.store
                    .update_status_and_token(
                        email.as_ref(),
                        SubscriberStatus::PendingConfirmation,
                        Some(&token),
                    )
                    .await?;
                Ok(SubscribeOutcome::Created)
            }
        }
    }

    /// Activate the pending subscriber holding `token` and return its email
    ///
    /// A token that is not 32 alphanumeric characters is rejected as `Invalid`
    /// without touching the store. A well-formed token that no pending record
    /// holds, including one already used, is `NotFound`. A failed thank-you
    /// email is logged and does not undo the activation.
    #[tracing::instrument(
        name = "Confirm a pending subscriber",
        skip_all,
        fields(subscriber_email = tracing::field::Empty)
    )]
    pub async fn confirm(&self, token: String) -> Result<String, SubscriptionError> {
        let token = SubscriptionToken::parse(token).map_err(SubscriptionError::Invalid)?;
        let subscriber = self
            .store
            .activate(&token)
            .await?
            .ok_or(SubscriptionError::NotFound)?;
        tracing::Span::current().record("subscriber_email", subscriber.email.as_str());

        if let Err(e) = self.send_thank_you_email(&subscriber.email).await {
            tracing::error!(
                error.cause_chain = ?e,
                error.message = %e,
                subscriber_email = %subscriber.email,
                "Failed to send the thank-you email"
            );
        }

        Ok(subscriber.email)
    }

    /// Unsubscribe `email` if `hash` is its link signature
    ///
    /// Unknown emails with a valid signature succeed as well, so the outcome
    /// never reveals whether an address is registered.
    #[tracing::instrument(name = "Unsubscribe a subscriber", skip(self, hash))]
    pub async fn unsubscribe(&self, email: &str, hash: &str) -> Result<(), SubscriptionError> {
        if !self.link_signer.verify(email, hash) {
            return Err(SubscriptionError::InvalidLink);
        }

        match self
            .store
            .update_status_and_token(email, SubscriberStatus::Unsubscribed, None)
            .await
        {
            Ok(()) | Err(StoreError::NotFound) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Every subscriber currently in the active state
    pub async fn active_subscribers(&self) -> Result<Vec<Subscriber>, SubscriptionError> {
        Ok(self.store.active_subscribers().await?)
    }

    #[tracing::instrument(name = "Sending confirmation email", skip(self, token))]
    async fn send_confirmation_email(
        &self,
        email: &EmailAddress,
        token: &SubscriptionToken,
    ) -> Result<(), SubscriptionError> {
        let confirmation_link = format!(
            "{}/subscriptions/confirm?token={}",
            self.base_url,
            token.as_ref()
        );
        let html_body = format!(
            "Welcome to {}!<br />\
            Click <a href=\"{confirmation_link}\">here</a> to confirm your subscription.",
            self.product_name
        );

        self.mail
            .send(email, "Confirm your subscription", &html_body)
            .await
            .context("Failed to send a confirmation email")?;
        Ok(())
    }

    async fn send_thank_you_email(&self, email: &str) -> anyhow::Result<()> {
        let recipient = EmailAddress::parse(email.to_owned()).map_err(|e| anyhow::anyhow!(e))?;
        let unsubscribe_link = format!(
            "{}/unsubscribe?{}",
            self.base_url,
            self.link_signer.unsubscribe_query(email)
        );
        let html_body = format!(
            "Thank you for subscribing to {}!<br />\
            Click <a href=\"{unsubscribe_link}\">here</a> if you no longer wish to receive it.",
            self.product_name
        );

        self.mail
            .send(&recipient, "Thank you for subscribing", &html_body)
            .await
            .context("Failed to send a thank-you email")
    }
}
