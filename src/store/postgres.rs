use std::time;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;

use crate::domain::{Subscriber, SubscriberStatus, SubscriptionToken};
use crate::store::{StoreError, SubscriberStore};

/// Subscriber row as stored in the `subscriptions` table
#[derive(sqlx::FromRow)]
struct SubscriberRow {
    email: String,
    status: String,
    token: Option<String>,
    created_at: DateTime<Utc>,
    subscribed_at: Option<DateTime<Utc>>,
}

impl TryFrom<SubscriberRow> for Subscriber {
    type Error = StoreError;

    fn try_from(row: SubscriberRow) -> Result<Self, Self::Error> {
        let status = SubscriberStatus::try_from(row.status).map_err(|e| anyhow::anyhow!(e))?;
        let token = row
            .token
            .map(SubscriptionToken::parse)
            .transpose()
            .map_err(|e| anyhow::anyhow!(e))?;
        Ok(Self {
            email: row.email,
            status,
            token,
            created_at: row.created_at,
            subscribed_at: row.subscribed_at,
        })
    }
}

/// Subscriber store backed by a Postgres connection pool
pub struct PostgresSubscriberStore {
    db_pool: PgPool,
}

impl PostgresSubscriberStore {
    pub const fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    /// Build a store whose connections are established on first use
    pub fn connect_lazy(options: PgConnectOptions) -> Self {
        let db_pool = PgPoolOptions::new()
            .acquire_timeout(time::Duration::from_secs(2))
            .connect_lazy_with(options);
        Self::new(db_pool)
    }
}

/// Map unique constraint violations to `Conflict`, everything else is unexpected
fn write_error(e: sqlx::Error, context: &'static str) -> StoreError {
    match &e {
        sqlx::Error::Database(db_error) if db_error.is_unique_violation() => StoreError::Conflict,
        _ => StoreError::UnexpectedError(anyhow::Error::new(e).context(context)),
    }
}

#[async_trait]
impl SubscriberStore for PostgresSubscriberStore {
    #[tracing::instrument(name = "Open subscriber store", skip(self))]
    async fn open(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.db_pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    #[tracing::instrument(name = "Close subscriber store", skip(self))]
    async fn close(&self) -> Result<(), StoreError> {
        self.db_pool.close().await;
        Ok(())
    }

    #[tracing::instrument(name = "Find subscriber by email", skip(self))]
    async fn find_by_email(&self, email: &str) -> Result<Option<Subscriber>, StoreError> {
        sqlx::query_as::<_, SubscriberRow>(
            r"
            SELECT email, status, token, created_at, subscribed_at
            FROM subscriptions
            WHERE email = $1
            ",
        )
        .bind(email)
        .fetch_optional(&self.db_pool)
        .await
        .context("Failed to perform a query to find a subscriber by email")?
        .map(Subscriber::try_from)
        .transpose()
    }

    #[tracing::instrument(name = "Find subscriber by token", skip_all)]
    async fn find_by_token(
        &self,
        token: &SubscriptionToken,
    ) -> Result<Option<Subscriber>, StoreError> {
        sqlx::query_as::<_, SubscriberRow>(
            r"
            SELECT email, status, token, created_at, subscribed_at
            FROM subscriptions
            WHERE token = $1
            ",
        )
        .bind(token.as_ref())
        .fetch_optional(&self.db_pool)
        .await
        .context("Failed to perform a query to find a subscriber by token")?
        .map(Subscriber::try_from)
        .transpose()
    }

    #[tracing::instrument(name = "Find subscribers by status", skip(self))]
    async fn find_by_status(
        &self,
        status: SubscriberStatus,
    ) -> Result<Vec<Subscriber>, StoreError> {
        sqlx::query_as::<_, SubscriberRow>(
            r"
            SELECT email, status, token, created_at, subscribed_at
            FROM subscriptions
            WHERE status = $1
            ORDER BY created_at
            ",
        )
        .bind(status.as_str())
        .fetch_all(&self.db_pool)
        .await
        .context("Failed to perform a query to find subscribers by status")?
        .into_iter()
        .map(Subscriber::try_from)
        .collect()
    }

    #[tracing::instrument(
        name = "Saving new subscriber details in the database",
        skip(self, subscriber),
        fields(subscriber_email = %subscriber.email)
    )]
    async fn insert(&self, subscriber: &Subscriber) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO subscriptions (email, status, token, created_at, subscribed_at)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(&subscriber.email)
        .bind(subscriber.status.as_str())
        .bind(subscriber.token.as_ref().map(AsRef::<str>::as_ref))
        .bind(subscriber.created_at)
        .bind(subscriber.subscribed_at)
        .execute(&self.db_pool)
        .await
        .map_err(|e| write_error(e, "Failed to insert a new subscriber"))?;
        Ok(())
    }

    #[tracing::instrument(name = "Update subscriber status", skip(self, token))]
    async fn update_status_and_token(
        &self,
        email: &str,
        status: SubscriberStatus,
        token: Option<&SubscriptionToken>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r"
            UPDATE subscriptions
            SET status = $2, token = $3
            WHERE email = $1
            ",
        )
        .bind(email)
        .bind(status.as_str())
        .bind(token.map(AsRef::<str>::as_ref))
        .execute(&self.db_pool)
        .await
        .map_err(|e| write_error(e, "Failed to update the subscriber status"))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    #[tracing::instrument(name = "Marking subscriber as active", skip_all)]
    async fn activate(&self, token: &SubscriptionToken) -> Result<Option<Subscriber>, StoreError> {
        // The status guard in the WHERE clause makes concurrent calls race on the
        // row lock, and only the first one sees a matching row
        sqlx::query_as::<_, SubscriberRow>(
            r"
            UPDATE subscriptions
            SET status = 'active', token = NULL, subscribed_at = now()
            WHERE token = $1 AND status = 'pending_confirmation'
            RETURNING email, status, token, created_at, subscribed_at
            ",
        )
        .bind(token.as_ref())
        .fetch_optional(&self.db_pool)
        .await
        .context("Failed to update subscriber status to `active`")?
        .map(Subscriber::try_from)
        .transpose()
    }
}
