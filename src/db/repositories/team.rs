use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use tracing::instrument;

use crate::db::PgResult;
use crate::db::models::event::EventId;
use crate::db::models::team::{Team, TeamId, TeamRow};
use crate::db::repositories::{TeamStore, Tx};

#[derive(Debug)]
pub struct TeamRepository {
    pool: &'static Pool<Postgres>,
}

impl TeamRepository {
    pub fn new(pool: &'static Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TeamStore for TeamRepository {
    #[instrument(skip(self))]
    async fn teams_for_event(&self, event: &EventId) -> PgResult<Vec<Team>> {
        let rows = sqlx::query_as::<_, TeamRow>(
            r#"
            SELECT
                t.id,
                t.user_id,
                t.event_id,
                t.name,
                COALESCE(
                    ARRAY_AGG(ts.short_id ORDER BY ts.short_id)
                        FILTER (WHERE ts.short_id IS NOT NULL),
                    '{}'
                ) AS members,
                t.score,
                t.created_at
            FROM team t
            LEFT JOIN team_short ts ON ts.team_id = t.id
            WHERE t.event_id = $1
            GROUP BY t.id
            ORDER BY t.id
            "#,
        )
        .bind(event.as_str())
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Team::from).collect())
    }

    #[instrument(skip(self, scores), fields(team_count = scores.len()))]
    async fn write_aggregates(&self, event: &EventId, scores: &[(TeamId, i64)]) -> PgResult<()> {
        Tx::with_tx(self.pool, |mut tx| async move {
            let result = async {
                for (team_id, score) in scores {
                    if tx.set_team_score(event, team_id, *score).await? == 0 {
                        tracing::warn!(team = %team_id, "team vanished before its aggregate was written");
                    }
                }
                Ok::<(), sqlx::Error>(())
            }
            .await;

            (tx, result)
        })
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn reset_aggregates(&self, event: &EventId) -> PgResult<u64> {
        let reset = Tx::with_tx(self.pool, |mut tx| async move {
            let result = tx.reset_team_scores(event).await;
            (tx, result)
        })
        .await?;

        Ok(reset)
    }
}
