use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Result as SqlxResult, Transaction};
use tracing::instrument;

use crate::db::PgResult;
use crate::db::models::event::{EventId, EventItem, ItemId};
use crate::db::models::team::{Team, TeamId};
use crate::db::models::tracked_item::TrackedItem;

pub mod event;
pub mod team;
pub mod tracked_item;

/// Authoritative storage for tracked items.
///
/// Every write touches exactly one row, so a failed or abandoned batch never leaves a
/// half-written item behind.
#[async_trait]
pub trait TrackedItemStore: Send + Sync {
    async fn tracked_item_ids(&self, event: &EventId) -> PgResult<HashSet<ItemId>>;

    /// Inserts a freshly started item, returning `false` if the pair was already tracked.
    async fn insert_new(&self, item: &TrackedItem) -> PgResult<bool>;

    async fn list_active(&self, event: &EventId) -> PgResult<Vec<TrackedItem>>;

    async fn list_for_event(&self, event: &EventId) -> PgResult<Vec<TrackedItem>>;

    /// Persists a refreshed item only if the stored row is still active at `prev_cycle`;
    /// returns `false` when another writer got there first.
    async fn save_refresh(&self, item: &TrackedItem, prev_cycle: i32) -> PgResult<bool>;

    async fn events_with_active_items(&self) -> PgResult<Vec<EventId>>;

    /// Events with an active item, or any item touched at or after `since`.
    async fn events_for_sync(&self, since: DateTime<Utc>) -> PgResult<Vec<EventId>>;

    async fn delete_event(&self, event: &EventId) -> PgResult<u64>;
}

#[async_trait]
pub trait TeamStore: Send + Sync {
    async fn teams_for_event(&self, event: &EventId) -> PgResult<Vec<Team>>;

    /// Writes every supplied aggregate for the event as one unit.
    async fn write_aggregates(&self, event: &EventId, scores: &[(TeamId, i64)]) -> PgResult<()>;

    async fn reset_aggregates(&self, event: &EventId) -> PgResult<u64>;
}

/// Event and content catalog maintained outside the engine.
#[async_trait]
pub trait EventCatalog: Send + Sync {
    async fn eligible_events(&self) -> PgResult<Vec<EventId>>;

    async fn relevant_items(&self, event: &EventId) -> PgResult<Vec<EventItem>>;
}

pub struct Tx {
    inner: Option<Transaction<'static, Postgres>>,
}

impl Tx {
    /// Runs `f` inside a transaction, committing if it returns `Ok` and rolling back otherwise.
    #[instrument(skip(pool, f))]
    pub async fn with_tx<F, Fut, T>(pool: &'static Pool<Postgres>, f: F) -> SqlxResult<T>
    where
        F: FnOnce(Tx) -> Fut,
        Fut: Future<Output = (Tx, SqlxResult<T>)>,
    {
        let tx = Self::begin(pool).await?;
        let (mut tx, result) = f(tx).await;

        match result {
            Ok(val) => {
                tx.commit().await?;
                Ok(val)
            }
            Err(e) => {
                tracing::trace!(error = ?e, "transacted query failure");
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = ?rollback_err, "rollback failed");
                }
                Err(e)
            }
        }
    }

    #[instrument(skip(pool))]
    pub async fn begin(pool: &'static Pool<Postgres>) -> SqlxResult<Self> {
        let inner = pool.begin().await?;
        Ok(Self { inner: Some(inner) })
    }

    #[instrument(skip(self))]
    pub async fn commit(&mut self) -> SqlxResult<()> {
        match self.inner.take() {
            Some(tx) => tx.commit().await,
            None => Err(sqlx::Error::Protocol("Transaction already completed".into())),
        }
    }

    #[instrument(skip(self))]
    pub async fn rollback(&mut self) -> SqlxResult<()> {
        match self.inner.take() {
            Some(tx) => tx.rollback().await,
            None => Err(sqlx::Error::Protocol("Transaction already completed".into())),
        }
    }

    fn inner_mut(&mut self) -> SqlxResult<&mut Transaction<'static, Postgres>> {
        self.inner
            .as_mut()
            .ok_or_else(|| sqlx::Error::Protocol("Transaction already completed".into()))
    }

    /// Overwrites a team's aggregate score, scoped to its event.
    #[instrument(skip(self))]
    pub async fn set_team_score(
        &mut self,
        event_id: &EventId,
        team_id: &TeamId,
        score: i64,
    ) -> SqlxResult<u64> {
        let res = sqlx::query(
            r#"
            UPDATE team
            SET score = $3,
                updated_at = NOW()
            WHERE id = $2
            AND event_id = $1
            "#,
        )
        .bind(event_id.as_str())
        .bind(team_id.as_str())
        .bind(score)
        .execute(&mut **self.inner_mut()?)
        .await?;

        Ok(res.rows_affected())
    }

    #[instrument(skip(self))]
    pub async fn reset_team_scores(&mut self, event_id: &EventId) -> SqlxResult<u64> {
        let res = sqlx::query(
            r#"
            UPDATE team
            SET score = 0,
                updated_at = NOW()
            WHERE event_id = $1
            "#,
        )
        .bind(event_id.as_str())
        .execute(&mut **self.inner_mut()?)
        .await?;

        Ok(res.rows_affected())
    }
}

pub mod sql_fragment {
    pub const TRACKED_ITEM_FIELDS: &str = r#"
        event_id,
        item_id,
        video_ref,
        baseline_views,
        baseline_likes,
        baseline_comments,
        latest_views,
        latest_likes,
        latest_comments,
        score,
        cycle_count,
        status,
        created_at,
        updated_at
    "#;
}
