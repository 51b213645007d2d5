use std::sync::Arc;

use chrono::Utc;
use futures::{StreamExt, stream};
use tracing::instrument;

use crate::db::models::event::{EventId, EventItem};
use crate::db::models::tracked_item::TrackedItem;
use crate::db::repositories::{EventCatalog, TrackedItemStore};
use crate::scoring::report::{ItemReport, PollOutcome, PollReport};
use crate::scoring::source::{MetricsSource, fetch_with_timeout};
use crate::scoring::{EngineResult, EngineSettings};

/// Seeds tracking records for catalog items the engine has not seen yet.
pub struct ScorePoller {
    items: Arc<dyn TrackedItemStore>,
    catalog: Arc<dyn EventCatalog>,
    source: Arc<dyn MetricsSource>,
    settings: EngineSettings,
}

impl ScorePoller {
    pub fn new(
        items: Arc<dyn TrackedItemStore>,
        catalog: Arc<dyn EventCatalog>,
        source: Arc<dyn MetricsSource>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            items,
            catalog,
            source,
            settings,
        }
    }

    #[instrument(skip(self))]
    pub async fn poll_event(&self, event: &EventId) -> EngineResult<PollReport> {
        let candidates = self.catalog.relevant_items(event).await?;
        let tracked = self.items.tracked_item_ids(event).await?;

        let (known, fresh): (Vec<EventItem>, Vec<EventItem>) = candidates
            .into_iter()
            .partition(|c| tracked.contains(&c.item_id));

        let mut items: Vec<ItemReport<PollOutcome>> = known
            .into_iter()
            .map(|c| ItemReport {
                item_id: c.item_id,
                outcome: PollOutcome::AlreadyTracked,
            })
            .collect();

        let seeded: Vec<_> = stream::iter(fresh)
            .map(|candidate| self.seed(event, candidate))
            .buffer_unordered(self.settings.workers)
            .collect()
            .await;

        items.extend(seeded);
        items.sort_by(|a, b| a.item_id.cmp(&b.item_id));

        let report = PollReport {
            event_id: event.clone(),
            items,
        };

        tracing::info!(
            event = %event,
            created = report.created(),
            failed = report.failed(),
            "poll complete"
        );

        Ok(report)
    }

    async fn seed(&self, event: &EventId, candidate: EventItem) -> ItemReport<PollOutcome> {
        let outcome = match fetch_with_timeout(
            self.source.as_ref(),
            &candidate.video_ref,
            self.settings.fetch_timeout,
        )
        .await
        {
            Ok(counters) => {
                let item = TrackedItem::start(
                    event.clone(),
                    candidate.item_id.clone(),
                    candidate.video_ref,
                    counters,
                    Utc::now(),
                );

                match self.items.insert_new(&item).await {
                    Ok(true) => PollOutcome::Created,
                    Ok(false) => PollOutcome::AlreadyTracked,
                    Err(e) => {
                        tracing::error!(error = ?e, item = %candidate.item_id, "could not persist new tracked item");
                        PollOutcome::PersistFailed {
                            reason: e.to_string(),
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, item = %candidate.item_id, "initial metrics fetch failed, retrying next run");
                PollOutcome::FetchFailed {
                    reason: e.to_string(),
                }
            }
        };

        ItemReport {
            item_id: candidate.item_id,
            outcome,
        }
    }
}
