use core::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::RETIREMENT_THRESHOLD;
use crate::db::models::event::{EventId, ItemId};

/// Opaque reference handed to the metrics source, usually a video url.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct VideoRef(pub String);

impl VideoRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for VideoRef {
    fn from(value: &str) -> Self {
        VideoRef(value.to_string())
    }
}

impl From<String> for VideoRef {
    fn from(value: String) -> Self {
        VideoRef(value)
    }
}

impl fmt::Display for VideoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub views: i64,
    pub likes: i64,
    pub comments: i64,
}

impl Counters {
    pub fn new(views: i64, likes: i64, comments: i64) -> Self {
        Self {
            views,
            likes,
            comments,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Active,
    Inactive,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Active => "active",
            ItemStatus::Inactive => "inactive",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "active" => Some(ItemStatus::Active),
            "inactive" => Some(ItemStatus::Inactive),
            _ => None,
        }
    }
}

/// Engagement tracking record for one item within one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedItem {
    pub event_id: EventId,
    pub item_id: ItemId,
    pub video_ref: VideoRef,
    pub baseline: Counters,
    pub latest: Counters,
    pub score: i64,
    pub cycle_count: i32,
    pub status: ItemStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of applying one successful fetch to an active item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Advanced,
    Retired,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleErr {
    #[error("item is inactive")]
    Inactive,

    #[error("cycle budget exhausted at cycle {0}")]
    BudgetExhausted(i32),
}

impl TrackedItem {
    /// Starts tracking with the first fetched counters as both baseline and latest snapshot.
    pub fn start(
        event_id: EventId,
        item_id: ItemId,
        video_ref: VideoRef,
        fetched: Counters,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id,
            item_id,
            video_ref,
            baseline: fetched,
            latest: fetched,
            score: 0,
            cycle_count: 1,
            status: ItemStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ItemStatus::Active
    }

    /// Checks whether the item may be refreshed at all this cycle.
    pub fn ensure_refreshable(&self) -> Result<(), LifecycleErr> {
        if !self.is_active() {
            return Err(LifecycleErr::Inactive);
        }

        if self.cycle_count > RETIREMENT_THRESHOLD {
            return Err(LifecycleErr::BudgetExhausted(self.cycle_count));
        }

        Ok(())
    }

    /// Records a fresh set of counters.
    ///
    /// The cycle score is the view growth since the previous fetch, floored at zero. Retirement
    /// happens after the score is written, so the last score stays as the frozen contribution.
    pub fn apply_refresh(
        &mut self,
        fetched: Counters,
        now: DateTime<Utc>,
    ) -> Result<Transition, LifecycleErr> {
        self.ensure_refreshable()?;

        let delta = fetched.views.saturating_sub(self.latest.views);

        self.latest = fetched;
        self.score = delta.max(0);
        self.cycle_count += 1;
        self.updated_at = now;

        if self.cycle_count > RETIREMENT_THRESHOLD {
            self.status = ItemStatus::Inactive;
            return Ok(Transition::Retired);
        }

        Ok(Transition::Advanced)
    }
}
