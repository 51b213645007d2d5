use std::collections::HashMap;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::redis_pool::{RedisErr, RedisKey, RedisResult};
use crate::constants::STAGING_KEY_TTL_SECS;
use crate::db::models::event::EventId;
use crate::db::models::leaderboard::{LeaderboardEntry, RankedEntry, RankedPage};

/// Per-event ranked read structure.
///
/// A rebuild must become visible all at once: a reader sees either the previous complete
/// ranking or the new one.
#[async_trait]
pub trait RankedSet: Send + Sync {
    async fn rebuild(&self, event: &EventId, entries: &[LeaderboardEntry]) -> RedisResult<()>;

    /// Entries ordered by score descending, ties by team id ascending, with absolute ranks.
    async fn range_descending(&self, event: &EventId, offset: i64, limit: i64)
    -> RedisResult<RankedPage>;

    async fn clear(&self, event: &EventId) -> RedisResult<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct TeamMeta {
    label: String,
    owner: String,
}

/// Negated so an ascending range reads score descending.
fn stored_score(score: i64) -> f64 {
    -(score as f64)
}

/// Turns one `ZRANGE ... WITHSCORES` window starting at `offset` into ranked entries.
fn decode_page(
    members: Vec<(String, f64)>,
    total: i64,
    meta: &HashMap<String, String>,
    offset: i64,
) -> RedisResult<RankedPage> {
    let mut items = Vec::with_capacity(members.len());
    for (idx, (team_id, stored)) in members.into_iter().enumerate() {
        let raw = meta
            .get(&team_id)
            .ok_or_else(|| RedisErr::MissingMetadata(team_id.clone()))?;
        let TeamMeta { label, owner } = serde_json::from_str(raw)?;

        items.push(RankedEntry {
            team_id: team_id.into(),
            team_label: label,
            owner_ref: owner,
            score: (-stored).round() as i64,
            rank: offset + idx as i64 + 1,
        });
    }

    Ok(RankedPage { items, total })
}

/// Redis-backed ranked set.
///
/// Scores are stored negated so that a plain ascending `ZRANGE` yields score descending with
/// equal scores in ascending member (team id) order.
#[derive(Clone)]
pub struct RedisRankedSet {
    manager: ConnectionManager,
}

impl RedisRankedSet {
    pub fn new(manager: ConnectionManager) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl RankedSet for RedisRankedSet {
    #[instrument(skip(self, entries), fields(entry_count = entries.len()))]
    async fn rebuild(&self, event: &EventId, entries: &[LeaderboardEntry]) -> RedisResult<()> {
        let mut conn = self.manager.clone();
        let ranking = RedisKey::Ranking.with_event(event);
        let teams = RedisKey::Teams.with_event(event);

        if entries.is_empty() {
            let _: () = redis::pipe()
                .atomic()
                .del(&ranking)
                .ignore()
                .del(&teams)
                .ignore()
                .query_async(&mut conn)
                .await?;

            return Ok(());
        }

        let token = uuid::Uuid::new_v4().to_string();
        let staging_ranking = RedisKey::Ranking.staging(event, &token);
        let staging_teams = RedisKey::Teams.staging(event, &token);

        let mut stage = redis::pipe();
        for entry in entries {
            let meta = serde_json::to_string(&TeamMeta {
                label: entry.team_label.clone(),
                owner: entry.owner_ref.clone(),
            })?;

            stage
                .zadd(&staging_ranking, entry.team_id.as_str(), stored_score(entry.score))
                .ignore()
                .hset(&staging_teams, entry.team_id.as_str(), meta)
                .ignore();
        }
        stage
            .expire(&staging_ranking, STAGING_KEY_TTL_SECS)
            .ignore()
            .expire(&staging_teams, STAGING_KEY_TTL_SECS)
            .ignore();

        let _: () = stage.query_async(&mut conn).await?;

        // both renames land in one MULTI, so readers never see one key swapped without the other
        let _: () = redis::pipe()
            .atomic()
            .rename(&staging_ranking, &ranking)
            .ignore()
            .rename(&staging_teams, &teams)
            .ignore()
            .persist(&ranking)
            .ignore()
            .persist(&teams)
            .ignore()
            .query_async(&mut conn)
            .await?;

        tracing::debug!(event = %event, entries = entries.len(), "ranked set swapped in");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn range_descending(
        &self,
        event: &EventId,
        offset: i64,
        limit: i64,
    ) -> RedisResult<RankedPage> {
        let mut conn = self.manager.clone();
        let ranking = RedisKey::Ranking.with_event(event);
        let teams = RedisKey::Teams.with_event(event);

        let offset = offset.max(0);
        if limit <= 0 {
            let total: i64 = redis::cmd("ZCARD").arg(&ranking).query_async(&mut conn).await?;
            return Ok(RankedPage {
                items: Vec::new(),
                total,
            });
        }

        let start = offset as isize;
        let stop = offset.saturating_add(limit - 1) as isize;

        let (members, total, meta): (Vec<(String, f64)>, i64, HashMap<String, String>) =
            redis::pipe()
                .atomic()
                .zrange_withscores(&ranking, start, stop)
                .zcard(&ranking)
                .hgetall(&teams)
                .query_async(&mut conn)
                .await?;

        decode_page(members, total, &meta, offset)
    }

    #[instrument(skip(self))]
    async fn clear(&self, event: &EventId) -> RedisResult<()> {
        let mut conn = self.manager.clone();

        let _: () = redis::pipe()
            .atomic()
            .del(RedisKey::Ranking.with_event(event))
            .ignore()
            .del(RedisKey::Teams.with_event(event))
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db::models::leaderboard::assign_ranks;

    fn entry(id: &str, score: i64) -> LeaderboardEntry {
        LeaderboardEntry {
            team_id: id.into(),
            team_label: format!("T-{id}"),
            owner_ref: format!("owner-{id}"),
            score,
        }
    }

    fn meta_of(entries: &[LeaderboardEntry]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|e| {
                let meta = TeamMeta {
                    label: e.team_label.clone(),
                    owner: e.owner_ref.clone(),
                };
                (e.team_id.to_string(), serde_json::to_string(&meta).unwrap())
            })
            .collect()
    }

    /// Members as a sorted set returns them: score ascending, then member bytes ascending.
    fn zrange(entries: &[LeaderboardEntry], offset: usize, limit: usize) -> Vec<(String, f64)> {
        let mut members: Vec<(String, f64)> = entries
            .iter()
            .map(|e| (e.team_id.to_string(), stored_score(e.score)))
            .collect();
        members.sort_by(|a, b| {
            a.1.total_cmp(&b.1)
                .then_with(|| a.0.as_bytes().cmp(b.0.as_bytes()))
        });

        members.into_iter().skip(offset).take(limit).collect()
    }

    #[test]
    fn test_decode_tie_at_forty() {
        let entries = vec![entry("team-y", 40), entry("team-x", 40), entry("team-z", 7)];

        let page = decode_page(zrange(&entries, 0, 10), 3, &meta_of(&entries), 0).unwrap();

        assert_eq!(page.total, 3);
        assert_eq!(page.items, assign_ranks(entries));
        assert_eq!(page.items[0].team_id.as_str(), "team-x");
        assert_eq!(page.items[0].score, 40);
        assert_eq!(page.items[1].team_id.as_str(), "team-y");
        assert_eq!(page.items[1].rank, 2);
    }

    #[test]
    fn test_decode_offset_keeps_absolute_ranks() {
        let entries = vec![
            entry("a", 50),
            entry("b", 40),
            entry("c", 40),
            entry("d", 0),
            entry("e", 12),
        ];

        let page = decode_page(zrange(&entries, 2, 2), 5, &meta_of(&entries), 2).unwrap();

        let ranked = assign_ranks(entries);
        assert_eq!(page.items, ranked[2..4].to_vec());
        assert_eq!(page.items[0].team_id.as_str(), "c");
        assert_eq!(page.items[0].rank, 3);
        assert_eq!(page.items[1].team_id.as_str(), "e");
        assert_eq!(page.items[1].score, 12);
        assert_eq!(page.items[1].rank, 4);
    }

    #[test]
    fn test_decode_zero_score_round_trips() {
        let entries = vec![entry("a", 0)];

        let page = decode_page(zrange(&entries, 0, 1), 1, &meta_of(&entries), 0).unwrap();
        assert_eq!(page.items[0].score, 0);
    }

    #[test]
    fn test_decode_missing_metadata() {
        let entries = vec![entry("a", 3), entry("b", 2)];
        let mut meta = meta_of(&entries);
        meta.remove("b");

        let err = decode_page(zrange(&entries, 0, 10), 2, &meta, 0).unwrap_err();
        assert!(matches!(err, RedisErr::MissingMetadata(id) if id == "b"));
    }
}
