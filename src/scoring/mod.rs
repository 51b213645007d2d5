use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use futures::future::join_all;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::instrument;

use crate::constants::{FETCH_TIMEOUT, NUM_FETCH_WORKERS, RECENTLY_ACTIVE_WINDOW};
use crate::db::PgError;
use crate::db::models::Pagination;
use crate::db::models::PaginatedResponse;
use crate::db::models::event::EventId;
use crate::db::models::leaderboard::LeaderboardView;
use crate::db::redis::ranked_set::RankedSet;
use crate::db::repositories::{EventCatalog, TeamStore, TrackedItemStore};

use aggregator::TeamAggregator;
use poller::ScorePoller;
use refresher::ScoreRefresher;
use report::{BatchReport, CycleReport, PollReport, ResetReport, SyncReport};
use source::MetricsSource;
use sync::LeaderboardSync;

pub mod aggregator;
pub mod poller;
pub mod refresher;
pub mod report;
pub mod source;
pub mod sync;

pub type EngineResult<T> = core::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("authoritative store unavailable: {0}")]
    Store(#[from] PgError),
}

#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub workers: usize,
    pub fetch_timeout: Duration,
    /// How long after its last update an item still keeps its event in the sync set.
    pub recent_window: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            workers: NUM_FETCH_WORKERS,
            fetch_timeout: FETCH_TIMEOUT,
            recent_window: RECENTLY_ACTIVE_WINDOW,
        }
    }
}

/// One async lock per event, so refresh and aggregate+sync never interleave on the same
/// event while different events proceed in parallel.
#[derive(Default)]
pub struct EventLocks {
    locks: Mutex<HashMap<EventId, Arc<Mutex<()>>>>,
}

impl EventLocks {
    pub async fn acquire(&self, event: &EventId) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .lock()
            .await
            .entry(event.clone())
            .or_default()
            .clone();

        lock.lock_owned().await
    }
}

pub struct Engine {
    items: Arc<dyn TrackedItemStore>,
    teams: Arc<dyn TeamStore>,
    catalog: Arc<dyn EventCatalog>,
    poller: ScorePoller,
    refresher: ScoreRefresher,
    aggregator: TeamAggregator,
    sync: LeaderboardSync,
    locks: EventLocks,
    settings: EngineSettings,
}

impl Engine {
    pub fn new(
        items: Arc<dyn TrackedItemStore>,
        teams: Arc<dyn TeamStore>,
        catalog: Arc<dyn EventCatalog>,
        source: Arc<dyn MetricsSource>,
        ranked: Arc<dyn RankedSet>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            poller: ScorePoller::new(items.clone(), catalog.clone(), source.clone(), settings),
            refresher: ScoreRefresher::new(items.clone(), source, settings),
            aggregator: TeamAggregator::new(items.clone(), teams.clone()),
            sync: LeaderboardSync::new(ranked),
            locks: EventLocks::default(),
            items,
            teams,
            catalog,
            settings,
        }
    }

    pub async fn poll_event(&self, event: &EventId) -> EngineResult<PollReport> {
        self.poller.poll_event(event).await
    }

    #[instrument(skip(self))]
    pub async fn poll_all(&self) -> EngineResult<BatchReport<PollReport>> {
        let events = self.catalog.eligible_events().await?;
        let results = join_all(events.into_iter().map(|e| async move {
            let res = self.poll_event(&e).await;
            (e, res)
        }))
        .await;

        Ok(batch("poll", results))
    }

    pub async fn refresh_event(&self, event: &EventId) -> EngineResult<CycleReport> {
        let _guard = self.locks.acquire(event).await;
        self.refresher.refresh_event(event).await
    }

    #[instrument(skip(self))]
    pub async fn refresh_all(&self) -> EngineResult<BatchReport<CycleReport>> {
        let events = self.items.events_with_active_items().await?;
        let results = join_all(events.into_iter().map(|e| async move {
            let res = self.refresh_event(&e).await;
            (e, res)
        }))
        .await;

        Ok(batch("refresh", results))
    }

    /// Aggregates team scores and then rebuilds the event's ranking from them.
    ///
    /// An unreachable ranked set is reported in the result; the aggregates stay committed and
    /// the next sync publishes them.
    #[instrument(skip(self))]
    pub async fn sync_event(&self, event: &EventId) -> EngineResult<SyncReport> {
        let _guard = self.locks.acquire(event).await;

        let aggregation = self.aggregator.aggregate(event).await?;
        let mut report = SyncReport {
            event_id: event.clone(),
            teams: aggregation.teams.len(),
            aggregated: aggregation.updated,
            published: false,
            error: None,
        };

        match self.sync.publish(event, &aggregation.teams).await {
            Ok(()) => report.published = true,
            Err(e) => {
                tracing::warn!(error = %e, event = %event, "ranked set rebuild failed, keeping previous ranking");
                report.error = Some(e.to_string());
            }
        }

        Ok(report)
    }

    #[instrument(skip(self))]
    pub async fn sync_all(&self) -> EngineResult<BatchReport<SyncReport>> {
        let since = recent_cutoff(Utc::now(), self.settings.recent_window);
        let events = self.items.events_for_sync(since).await?;
        let results = join_all(events.into_iter().map(|e| async move {
            let res = self.sync_event(&e).await;
            (e, res)
        }))
        .await;

        Ok(batch("sync", results))
    }

    /// Forgets everything the engine tracked for an event.
    #[instrument(skip(self))]
    pub async fn reset_event(&self, event: &EventId) -> EngineResult<ResetReport> {
        let _guard = self.locks.acquire(event).await;

        let deleted_items = self.items.delete_event(event).await?;
        let teams_reset = self.teams.reset_aggregates(event).await?;

        let index_cleared = match self.sync.clear(event).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, event = %event, "could not clear ranked set");
                false
            }
        };

        tracing::info!(event = %event, deleted_items, teams_reset, index_cleared, "event tracking reset");

        Ok(ResetReport {
            event_id: event.clone(),
            deleted_items,
            teams_reset,
            index_cleared,
        })
    }

    pub async fn leaderboard(&self, event: &EventId, pagination: &Pagination) -> LeaderboardView {
        let (offset, limit) = pagination.window();
        let (status, page) = self.sync.read(event, offset, limit).await;

        LeaderboardView {
            event_id: event.to_string(),
            status,
            page: PaginatedResponse::new(page.items, page.total, limit, offset / limit),
        }
    }
}

fn recent_cutoff(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(window)
        .ok()
        .and_then(|w| now.checked_sub_signed(w))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn batch<R>(op: &'static str, results: Vec<(EventId, EngineResult<R>)>) -> BatchReport<R> {
    let mut report = BatchReport::default();
    for (event, res) in results {
        match res {
            Ok(r) => report.completed.push(r),
            Err(e) => {
                tracing::error!(error = %e, event = %event, op, "event run failed");
                report.failed.push((event, e.to_string()));
            }
        }
    }

    report
}
