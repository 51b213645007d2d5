use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::db::models::PaginatedResponse;
use crate::db::models::team::TeamId;

/// A team's standing as written into the ranked set; rank is assigned on read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub team_id: TeamId,
    pub team_label: String,
    pub owner_ref: String,
    pub score: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub team_id: TeamId,
    pub team_label: String,
    pub owner_ref: String,
    pub score: i64,
    pub rank: i64,
}

/// A contiguous slice of an event's ranking.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RankedPage {
    pub items: Vec<RankedEntry>,
    pub total: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaderboardStatus {
    /// Read straight from the ranked set.
    Live,
    /// Ranked set unreachable; served from the last ranking this process published.
    Stale,
    /// Ranked set unreachable and nothing published yet.
    Unavailable,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardView {
    pub event_id: String,
    pub status: LeaderboardStatus,
    #[serde(flatten)]
    pub page: PaginatedResponse<RankedEntry>,
}

/// Ranking order: score descending, then team id ascending.
pub fn rank_order(a: &LeaderboardEntry, b: &LeaderboardEntry) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| a.team_id.as_str().as_bytes().cmp(b.team_id.as_str().as_bytes()))
}

/// Sorts entries into ranking order and assigns 1-based ranks.
pub fn assign_ranks(mut entries: Vec<LeaderboardEntry>) -> Vec<RankedEntry> {
    entries.sort_by(rank_order);
    entries
        .into_iter()
        .enumerate()
        .map(|(idx, e)| e.ranked(idx as i64 + 1))
        .collect()
}

/// Slices an already-ranked list the same way a ranked-set range read would.
pub fn page_of(ranked: &[RankedEntry], offset: i64, limit: i64) -> RankedPage {
    let start = offset.max(0) as usize;
    let limit = limit.max(0) as usize;

    RankedPage {
        items: ranked.iter().skip(start).take(limit).cloned().collect(),
        total: ranked.len() as i64,
    }
}

impl LeaderboardEntry {
    pub fn ranked(self, rank: i64) -> RankedEntry {
        RankedEntry {
            team_id: self.team_id,
            team_label: self.team_label,
            owner_ref: self.owner_ref,
            score: self.score,
            rank,
        }
    }
}
