use serde::Serialize;

use crate::db::models::event::{EventId, ItemId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemReport<O> {
    pub item_id: ItemId,
    #[serde(flatten)]
    pub outcome: O,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PollOutcome {
    Created,
    AlreadyTracked,
    FetchFailed { reason: String },
    PersistFailed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RefreshOutcome {
    Refreshed {
        score: i64,
        cycle_count: i32,
        retired: bool,
    },
    FetchFailed {
        reason: String,
    },
    PersistFailed {
        reason: String,
    },
    BudgetExhausted,
    NotActive,
}

#[derive(Debug, Clone, Serialize)]
pub struct PollReport {
    pub event_id: EventId,
    pub items: Vec<ItemReport<PollOutcome>>,
}

/// Per-item results of one refresh cycle over an event.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub event_id: EventId,
    pub items: Vec<ItemReport<RefreshOutcome>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub event_id: EventId,
    pub teams: usize,
    pub aggregated: usize,
    pub published: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResetReport {
    pub event_id: EventId,
    pub deleted_items: u64,
    pub teams_reset: u64,
    pub index_cleared: bool,
}

/// Outcome of running one operation across every eligible event.
#[derive(Debug, Serialize)]
pub struct BatchReport<R> {
    pub completed: Vec<R>,
    pub failed: Vec<(EventId, String)>,
}

impl PollReport {
    pub fn created(&self) -> usize {
        self.count(|o| matches!(o, PollOutcome::Created))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| {
            matches!(
                o,
                PollOutcome::FetchFailed { .. } | PollOutcome::PersistFailed { .. }
            )
        })
    }

    fn count(&self, f: impl Fn(&PollOutcome) -> bool) -> usize {
        self.items.iter().filter(|r| f(&r.outcome)).count()
    }
}

impl CycleReport {
    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, RefreshOutcome::Refreshed { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| {
            matches!(
                o,
                RefreshOutcome::FetchFailed { .. } | RefreshOutcome::PersistFailed { .. }
            )
        })
    }

    pub fn retired(&self) -> usize {
        self.count(|o| matches!(o, RefreshOutcome::Refreshed { retired: true, .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, RefreshOutcome::BudgetExhausted | RefreshOutcome::NotActive))
    }

    #[cfg(test)]
    pub fn outcome_of(&self, item: &str) -> Option<&RefreshOutcome> {
        self.items
            .iter()
            .find(|r| r.item_id.as_str() == item)
            .map(|r| &r.outcome)
    }

    fn count(&self, f: impl Fn(&RefreshOutcome) -> bool) -> usize {
        self.items.iter().filter(|r| f(&r.outcome)).count()
    }
}

impl<R> Default for BatchReport<R> {
    fn default() -> Self {
        Self {
            completed: Vec::new(),
            failed: Vec::new(),
        }
    }
}
