use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::instrument;

use crate::db::models::event::{EventId, ItemId};
use crate::db::models::team::{Team, TeamId};
use crate::db::repositories::{TeamStore, TrackedItemStore};
use crate::scoring::EngineResult;

/// Result of one aggregation pass. `teams` carries the scores as written, including teams
/// that kept their stored score because none of their members are tracked.
#[derive(Debug, Clone)]
pub struct Aggregation {
    pub teams: Vec<Team>,
    pub updated: usize,
}

pub struct TeamAggregator {
    items: Arc<dyn TrackedItemStore>,
    teams: Arc<dyn TeamStore>,
}

impl TeamAggregator {
    pub fn new(items: Arc<dyn TrackedItemStore>, teams: Arc<dyn TeamStore>) -> Self {
        Self { items, teams }
    }

    #[instrument(skip(self))]
    pub async fn aggregate(&self, event: &EventId) -> EngineResult<Aggregation> {
        let scores: HashMap<ItemId, i64> = self
            .items
            .list_for_event(event)
            .await?
            .into_iter()
            .map(|i| (i.item_id, i.score))
            .collect();

        let mut teams = self.teams.teams_for_event(event).await?;
        let mut updates: Vec<(TeamId, i64)> = Vec::with_capacity(teams.len());

        for team in teams.iter_mut() {
            if let Some(total) = team_total(&team.member_item_ids, &scores) {
                team.aggregate_score = total;
                updates.push((team.id.clone(), total));
            }
        }

        self.teams.write_aggregates(event, &updates).await?;
        tracing::debug!(event = %event, teams = teams.len(), updated = updates.len(), "aggregates written");

        Ok(Aggregation {
            updated: updates.len(),
            teams,
        })
    }
}

/// Sums the current scores of a team's tracked members, retired ones included.
///
/// Returns `None` when no member is tracked so the stored aggregate is left alone.
pub fn team_total(members: &[ItemId], scores: &HashMap<ItemId, i64>) -> Option<i64> {
    let tracked: Vec<i64> = members
        .iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .filter_map(|m| scores.get(m).copied())
        .collect();

    if tracked.is_empty() {
        return None;
    }

    Some(tracked.into_iter().fold(0i64, i64::saturating_add))
}
