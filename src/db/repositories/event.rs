use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use tracing::instrument;

use crate::db::PgResult;
use crate::db::models::event::{EventId, EventItem};
use crate::db::repositories::EventCatalog;

/// Read-only view over the event and short tables owned by the catalog service.
#[derive(Debug)]
pub struct EventRepository {
    pool: &'static Pool<Postgres>,
}

impl EventRepository {
    pub fn new(pool: &'static Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventCatalog for EventRepository {
    #[instrument(skip(self))]
    async fn eligible_events(&self) -> PgResult<Vec<EventId>> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT id FROM event WHERE status = 'active' ORDER BY id",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(ids.into_iter().map(EventId::from).collect())
    }

    #[instrument(skip(self))]
    async fn relevant_items(&self, event: &EventId) -> PgResult<Vec<EventItem>> {
        Ok(sqlx::query_as::<_, EventItem>(
            r#"
            SELECT
                id AS item_id,
                video_url AS video_ref
            FROM short
            WHERE event_id = $1
            ORDER BY id
            "#,
        )
        .bind(event.as_str())
        .fetch_all(self.pool)
        .await?)
    }
}
