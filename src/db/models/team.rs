use core::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::models::event::{EventId, ItemId};
use crate::db::models::leaderboard::LeaderboardEntry;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct TeamId(pub String);

/// Base team table model, with its member items joined in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub owner_id: String,
    pub event_id: EventId,
    pub name: String,
    pub member_item_ids: Vec<ItemId>,
    pub aggregate_score: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TeamRow {
    pub id: String,
    pub user_id: String,
    pub event_id: String,
    pub name: String,
    pub members: Vec<String>,
    pub score: i64,
    pub created_at: DateTime<Utc>,
}

impl From<TeamRow> for Team {
    fn from(row: TeamRow) -> Self {
        Self {
            id: row.id.into(),
            owner_id: row.user_id,
            event_id: row.event_id.into(),
            name: row.name,
            member_item_ids: row.members.into_iter().map(ItemId::from).collect(),
            aggregate_score: row.score,
            created_at: row.created_at,
        }
    }
}

impl From<&Team> for LeaderboardEntry {
    fn from(team: &Team) -> Self {
        LeaderboardEntry {
            team_id: team.id.clone(),
            team_label: team.name.clone(),
            owner_ref: team.owner_id.clone(),
            score: team.aggregate_score,
        }
    }
}

impl TeamId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for TeamId {
    fn from(value: String) -> Self {
        TeamId(value)
    }
}

impl From<&str> for TeamId {
    fn from(value: &str) -> Self {
        TeamId(value.to_string())
    }
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
