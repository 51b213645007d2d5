use std::sync::Arc;

use chrono::Utc;
use futures::{StreamExt, stream};
use tracing::instrument;

use crate::db::models::event::EventId;
use crate::db::models::tracked_item::{LifecycleErr, TrackedItem, Transition};
use crate::db::repositories::TrackedItemStore;
use crate::scoring::report::{CycleReport, ItemReport, RefreshOutcome};
use crate::scoring::source::{MetricsSource, fetch_with_timeout};
use crate::scoring::{EngineResult, EngineSettings};

/// Runs refresh cycles: refetch every active item, rescore it and advance its lifecycle.
pub struct ScoreRefresher {
    items: Arc<dyn TrackedItemStore>,
    source: Arc<dyn MetricsSource>,
    settings: EngineSettings,
}

impl ScoreRefresher {
    pub fn new(
        items: Arc<dyn TrackedItemStore>,
        source: Arc<dyn MetricsSource>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            items,
            source,
            settings,
        }
    }

    /// Only failing to list the event's items aborts the cycle; per-item failures are
    /// reported and leave that item untouched for the next cycle.
    #[instrument(skip(self))]
    pub async fn refresh_event(&self, event: &EventId) -> EngineResult<CycleReport> {
        let active = self.items.list_active(event).await?;

        let mut items: Vec<_> = stream::iter(active)
            .map(|item| self.refresh_item(item))
            .buffer_unordered(self.settings.workers)
            .collect()
            .await;
        items.sort_by(|a, b| a.item_id.cmp(&b.item_id));

        let report = CycleReport {
            event_id: event.clone(),
            items,
        };

        tracing::info!(
            event = %event,
            refreshed = report.succeeded(),
            failed = report.failed(),
            retired = report.retired(),
            skipped = report.skipped(),
            "refresh cycle complete"
        );

        Ok(report)
    }

    async fn refresh_item(&self, mut item: TrackedItem) -> ItemReport<RefreshOutcome> {
        let outcome = match item.ensure_refreshable() {
            Ok(()) => self.rescore(&mut item).await,
            Err(e) => skipped(&item, e),
        };

        ItemReport {
            item_id: item.item_id,
            outcome,
        }
    }

    async fn rescore(&self, item: &mut TrackedItem) -> RefreshOutcome {
        let fetched = match fetch_with_timeout(
            self.source.as_ref(),
            &item.video_ref,
            self.settings.fetch_timeout,
        )
        .await
        {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, item = %item.item_id, "metrics fetch failed, item left as is");
                return RefreshOutcome::FetchFailed {
                    reason: e.to_string(),
                };
            }
        };

        let prev_cycle = item.cycle_count;
        let transition = match item.apply_refresh(fetched, Utc::now()) {
            Ok(t) => t,
            Err(e) => return skipped(item, e),
        };

        match self.items.save_refresh(item, prev_cycle).await {
            Ok(true) => {
                if transition == Transition::Retired {
                    tracing::info!(item = %item.item_id, cycle = item.cycle_count, "item retired");
                }

                RefreshOutcome::Refreshed {
                    score: item.score,
                    cycle_count: item.cycle_count,
                    retired: transition == Transition::Retired,
                }
            }
            Ok(false) => {
                tracing::warn!(item = %item.item_id, "tracked item changed underneath refresh");
                RefreshOutcome::PersistFailed {
                    reason: String::from("tracked item was modified concurrently"),
                }
            }
            Err(e) => {
                tracing::error!(error = ?e, item = %item.item_id, "could not persist refreshed item");
                RefreshOutcome::PersistFailed {
                    reason: e.to_string(),
                }
            }
        }
    }
}

fn skipped(item: &TrackedItem, err: LifecycleErr) -> RefreshOutcome {
    match err {
        LifecycleErr::BudgetExhausted(cycle) => {
            tracing::warn!(item = %item.item_id, cycle, "active item past its cycle budget, skipped");
            RefreshOutcome::BudgetExhausted
        }
        LifecycleErr::Inactive => RefreshOutcome::NotActive,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::constants::RETIREMENT_THRESHOLD;
    use crate::db::memory::{MemoryItemStore, ScriptedSource};
    use crate::db::models::tracked_item::{Counters, ItemStatus};

    fn seeded(store: &MemoryItemStore, item: &str, video: &str, views: i64) {
        store.insert(TrackedItem::start(
            "event-1".into(),
            item.into(),
            video.into(),
            Counters::new(views, 0, 0),
            Utc::now(),
        ));
    }

    fn refresher(items: Arc<MemoryItemStore>, source: Arc<ScriptedSource>) -> ScoreRefresher {
        ScoreRefresher::new(items, source, EngineSettings::default())
    }

    #[tokio::test]
    async fn test_scores_view_growth() {
        let items = Arc::new(MemoryItemStore::default());
        seeded(&items, "short-a", "vid-a", 100);

        let source = Arc::new(ScriptedSource::default());
        source.push_ok("vid-a", Counters::new(130, 4, 1));
        source.push_ok("vid-a", Counters::new(125, 4, 1));

        let refresher = refresher(items.clone(), source);

        let report = refresher.refresh_event(&"event-1".into()).await.unwrap();
        assert_eq!(
            report.outcome_of("short-a"),
            Some(&RefreshOutcome::Refreshed {
                score: 30,
                cycle_count: 2,
                retired: false
            })
        );

        refresher.refresh_event(&"event-1".into()).await.unwrap();
        let stored = items.get("event-1", "short-a").unwrap();
        assert_eq!(stored.score, 0);
        assert_eq!(stored.cycle_count, 3);
        assert_eq!(stored.latest.views, 125);
        assert_eq!(stored.baseline.views, 100);
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let items = Arc::new(MemoryItemStore::default());
        seeded(&items, "short-a", "vid-a", 10);
        seeded(&items, "short-b", "vid-b", 10);

        let source = Arc::new(ScriptedSource::default());
        source.push_err("vid-a");
        source.push_ok("vid-b", Counters::new(25, 0, 0));

        let before_a = items.get("event-1", "short-a").unwrap();
        let report = refresher(items.clone(), source)
            .refresh_event(&"event-1".into())
            .await
            .unwrap();

        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 1);
        assert!(matches!(
            report.outcome_of("short-a"),
            Some(RefreshOutcome::FetchFailed { .. })
        ));
        assert_eq!(items.get("event-1", "short-a").unwrap(), before_a);

        let b = items.get("event-1", "short-b").unwrap();
        assert_eq!(b.score, 15);
        assert_eq!(b.cycle_count, 2);
    }

    #[tokio::test]
    async fn test_persist_failure_is_isolated() {
        let items = Arc::new(MemoryItemStore::default());
        seeded(&items, "short-a", "vid-a", 10);
        seeded(&items, "short-b", "vid-b", 10);
        items.fail_writes_for("short-a");

        let source = Arc::new(ScriptedSource::default());
        source.push_ok("vid-a", Counters::new(50, 0, 0));
        source.push_ok("vid-b", Counters::new(20, 0, 0));

        let report = refresher(items.clone(), source)
            .refresh_event(&"event-1".into())
            .await
            .unwrap();

        assert!(matches!(
            report.outcome_of("short-a"),
            Some(RefreshOutcome::PersistFailed { .. })
        ));
        assert_eq!(items.get("event-1", "short-a").unwrap().cycle_count, 1);
        assert_eq!(items.get("event-1", "short-b").unwrap().score, 10);
    }

    #[tokio::test]
    async fn test_retires_on_final_cycle() {
        let items = Arc::new(MemoryItemStore::default());
        seeded(&items, "short-a", "vid-a", 100);
        let mut at_limit = items.get("event-1", "short-a").unwrap();
        at_limit.cycle_count = RETIREMENT_THRESHOLD;
        items.insert(at_limit);

        let source = Arc::new(ScriptedSource::default());
        source.push_ok("vid-a", Counters::new(160, 0, 0));
        source.push_ok("vid-a", Counters::new(500, 0, 0));

        let refresher = refresher(items.clone(), source.clone());
        let report = refresher.refresh_event(&"event-1".into()).await.unwrap();
        assert_eq!(report.retired(), 1);

        let retired = items.get("event-1", "short-a").unwrap();
        assert_eq!(retired.status, ItemStatus::Inactive);
        assert_eq!(retired.score, 60);

        let report = refresher.refresh_event(&"event-1".into()).await.unwrap();
        assert!(report.items.is_empty());
        assert_eq!(items.get("event-1", "short-a").unwrap(), retired);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_budget_is_skipped() {
        let items = Arc::new(MemoryItemStore::default());
        seeded(&items, "short-a", "vid-a", 100);
        let mut stuck = items.get("event-1", "short-a").unwrap();
        stuck.cycle_count = RETIREMENT_THRESHOLD + 2;
        items.insert(stuck.clone());

        let source = Arc::new(ScriptedSource::default());
        let report = refresher(items.clone(), source.clone())
            .refresh_event(&"event-1".into())
            .await
            .unwrap();

        assert_eq!(
            report.outcome_of("short-a"),
            Some(&RefreshOutcome::BudgetExhausted)
        );
        assert_eq!(items.get("event-1", "short-a").unwrap(), stuck);
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_listing_failure_aborts_cycle() {
        let items = Arc::new(MemoryItemStore::default());
        items.set_unreachable(true);

        let res = refresher(items, Arc::new(ScriptedSource::default()))
            .refresh_event(&"event-1".into())
            .await;

        assert!(res.is_err());
    }
}
