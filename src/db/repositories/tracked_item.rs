use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use tracing::instrument;

use super::sql_fragment;
use crate::db::models::event::{EventId, ItemId};
use crate::db::models::tracked_item::{Counters, ItemStatus, TrackedItem};
use crate::db::repositories::TrackedItemStore;
use crate::db::{PgError, PgResult};

#[derive(Debug)]
pub struct TrackedItemRepository {
    pool: &'static Pool<Postgres>,
}

impl TrackedItemRepository {
    pub fn new(pool: &'static Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn select_where(&self, event: &EventId, only_active: bool) -> PgResult<Vec<TrackedItem>> {
        let status_clause = if only_active {
            "AND status = 'active'"
        } else {
            ""
        };

        let rows = sqlx::query_as::<_, TrackedItemRow>(&format!(
            "SELECT {} FROM tracked_item WHERE event_id = $1 {} ORDER BY item_id",
            sql_fragment::TRACKED_ITEM_FIELDS,
            status_clause,
        ))
        .bind(event.as_str())
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TrackedItem::try_from).collect()
    }
}

#[async_trait]
impl TrackedItemStore for TrackedItemRepository {
    #[instrument(skip(self))]
    async fn tracked_item_ids(&self, event: &EventId) -> PgResult<HashSet<ItemId>> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT item_id FROM tracked_item WHERE event_id = $1",
        )
        .bind(event.as_str())
        .fetch_all(self.pool)
        .await?;

        Ok(ids.into_iter().map(ItemId::from).collect())
    }

    #[instrument(skip(self, item), fields(event = %item.event_id, item = %item.item_id))]
    async fn insert_new(&self, item: &TrackedItem) -> PgResult<bool> {
        let res = sqlx::query(
            r#"
            INSERT INTO tracked_item (
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
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (event_id, item_id)
            DO NOTHING
            "#,
        )
        .bind(item.event_id.as_str())
        .bind(item.item_id.as_str())
        .bind(item.video_ref.as_str())
        .bind(item.baseline.views)
        .bind(item.baseline.likes)
        .bind(item.baseline.comments)
        .bind(item.latest.views)
        .bind(item.latest.likes)
        .bind(item.latest.comments)
        .bind(item.score)
        .bind(item.cycle_count)
        .bind(item.status.as_str())
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(self.pool)
        .await;

        match res {
            Ok(r) => Ok(r.rows_affected() == 1),
            Err(e) => {
                tracing::error!(error = ?e, "failure during tracked item insertion");
                Err(e.into())
            }
        }
    }

    #[instrument(skip(self))]
    async fn list_active(&self, event: &EventId) -> PgResult<Vec<TrackedItem>> {
        self.select_where(event, true).await
    }

    #[instrument(skip(self))]
    async fn list_for_event(&self, event: &EventId) -> PgResult<Vec<TrackedItem>> {
        self.select_where(event, false).await
    }

    #[instrument(skip(self, item), fields(event = %item.event_id, item = %item.item_id))]
    async fn save_refresh(&self, item: &TrackedItem, prev_cycle: i32) -> PgResult<bool> {
        let res = sqlx::query(
            r#"
            UPDATE tracked_item
            SET latest_views = $3,
                latest_likes = $4,
                latest_comments = $5,
                score = $6,
                cycle_count = $7,
                status = $8,
                updated_at = $9
            WHERE event_id = $1
            AND item_id = $2
            AND status = 'active'
            AND cycle_count = $10
            "#,
        )
        .bind(item.event_id.as_str())
        .bind(item.item_id.as_str())
        .bind(item.latest.views)
        .bind(item.latest.likes)
        .bind(item.latest.comments)
        .bind(item.score)
        .bind(item.cycle_count)
        .bind(item.status.as_str())
        .bind(item.updated_at)
        .bind(prev_cycle)
        .execute(self.pool)
        .await?;

        Ok(res.rows_affected() == 1)
    }

    #[instrument(skip(self))]
    async fn events_with_active_items(&self) -> PgResult<Vec<EventId>> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT event_id FROM tracked_item WHERE status = 'active' ORDER BY event_id",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(ids.into_iter().map(EventId::from).collect())
    }

    #[instrument(skip(self))]
    async fn events_for_sync(&self, since: DateTime<Utc>) -> PgResult<Vec<EventId>> {
        let ids = sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT event_id
            FROM tracked_item
            WHERE status = 'active'
            OR updated_at >= $1
            ORDER BY event_id
            "#,
        )
        .bind(since)
        .fetch_all(self.pool)
        .await?;

        Ok(ids.into_iter().map(EventId::from).collect())
    }

    #[instrument(skip(self))]
    async fn delete_event(&self, event: &EventId) -> PgResult<u64> {
        let res = sqlx::query("DELETE FROM tracked_item WHERE event_id = $1")
            .bind(event.as_str())
            .execute(self.pool)
            .await?;

        tracing::warn!(event = %event, deleted = res.rows_affected(), "tracked items deleted");
        Ok(res.rows_affected())
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TrackedItemRow {
    pub event_id: String,
    pub item_id: String,
    pub video_ref: String,
    pub baseline_views: i64,
    pub baseline_likes: i64,
    pub baseline_comments: i64,
    pub latest_views: i64,
    pub latest_likes: i64,
    pub latest_comments: i64,
    pub score: i64,
    pub cycle_count: i32,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<TrackedItemRow> for TrackedItem {
    type Error = PgError;

    fn try_from(row: TrackedItemRow) -> Result<Self, Self::Error> {
        let status = ItemStatus::from_db(&row.status).ok_or(PgError::InvalidStatus(row.status))?;

        Ok(Self {
            event_id: row.event_id.into(),
            item_id: row.item_id.into(),
            video_ref: row.video_ref.into(),
            baseline: Counters::new(row.baseline_views, row.baseline_likes, row.baseline_comments),
            latest: Counters::new(row.latest_views, row.latest_likes, row.latest_comments),
            score: row.score,
            cycle_count: row.cycle_count,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
