use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::instrument;

use crate::db::models::event::EventId;
use crate::db::models::leaderboard::{
    LeaderboardEntry, LeaderboardStatus, RankedEntry, RankedPage, assign_ranks, page_of,
    rank_order,
};
use crate::db::models::team::Team;
use crate::db::redis::ranked_set::RankedSet;
use crate::db::redis::redis_pool::RedisResult;

/// Publishes team aggregates into the ranked set and serves reads from it.
///
/// The last ranking published by this process is kept so reads can degrade to a stale answer
/// while the ranked set is unreachable. Events whose clear did not reach the ranked set are
/// remembered until a later clear or publish replaces the leftover ranking.
pub struct LeaderboardSync {
    ranked: Arc<dyn RankedSet>,
    published: RwLock<HashMap<EventId, Arc<Vec<RankedEntry>>>>,
    uncleared: RwLock<HashSet<EventId>>,
}

impl LeaderboardSync {
    pub fn new(ranked: Arc<dyn RankedSet>) -> Self {
        Self {
            ranked,
            published: RwLock::new(HashMap::new()),
            uncleared: RwLock::new(HashSet::new()),
        }
    }

    /// Replaces the event's ranking with exactly `teams`.
    #[instrument(skip(self, teams), fields(team_count = teams.len()))]
    pub async fn publish(&self, event: &EventId, teams: &[Team]) -> RedisResult<()> {
        let mut entries: Vec<LeaderboardEntry> = teams.iter().map(LeaderboardEntry::from).collect();
        entries.sort_by(rank_order);

        self.ranked.rebuild(event, &entries).await?;
        self.uncleared.write().await.remove(event);

        self.published
            .write()
            .await
            .insert(event.clone(), Arc::new(assign_ranks(entries)));

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn read(
        &self,
        event: &EventId,
        offset: i64,
        limit: i64,
    ) -> (LeaderboardStatus, RankedPage) {
        let uncleared = self.uncleared.read().await.contains(event);
        if uncleared && self.clear(event).await.is_err() {
            // the ranked set still holds the pre-reset ranking
            return (LeaderboardStatus::Stale, RankedPage::default());
        }

        match self.ranked.range_descending(event, offset, limit).await {
            Ok(page) => (LeaderboardStatus::Live, page),
            Err(e) => {
                tracing::warn!(error = %e, event = %event, "ranked set read failed, falling back");

                match self.published.read().await.get(event) {
                    Some(ranked) => (LeaderboardStatus::Stale, page_of(ranked, offset, limit)),
                    None => (LeaderboardStatus::Unavailable, RankedPage::default()),
                }
            }
        }
    }

    /// Drops the event from the ranked set and from the fallback snapshot.
    pub async fn clear(&self, event: &EventId) -> RedisResult<()> {
        self.published.write().await.remove(event);

        match self.ranked.clear(event).await {
            Ok(()) => {
                self.uncleared.write().await.remove(event);
                Ok(())
            }
            Err(e) => {
                self.uncleared.write().await.insert(event.clone());
                Err(e)
            }
        }
    }
}
