//! In-process stand-ins for the store, catalog, ranked set and metrics source seams.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::models::event::{EventId, EventItem, ItemId};
use crate::db::models::leaderboard::{
    LeaderboardEntry, RankedEntry, RankedPage, assign_ranks, page_of,
};
use crate::db::models::team::{Team, TeamId};
use crate::db::models::tracked_item::{Counters, ItemStatus, TrackedItem, VideoRef};
use crate::db::redis::ranked_set::RankedSet;
use crate::db::redis::redis_pool::{RedisErr, RedisResult};
use crate::db::repositories::{EventCatalog, TeamStore, TrackedItemStore};
use crate::db::{PgError, PgResult};
use crate::scoring::source::{FetchError, MetricsSource};

fn unreachable_store() -> PgError {
    PgError::SqlxError(sqlx::Error::PoolTimedOut)
}

#[derive(Default)]
pub struct MemoryItemStore {
    items: Mutex<BTreeMap<(EventId, ItemId), TrackedItem>>,
    failing_writes: Mutex<HashSet<ItemId>>,
    unreachable: AtomicBool,
}

impl MemoryItemStore {
    pub fn insert(&self, item: TrackedItem) {
        self.items
            .lock()
            .unwrap()
            .insert((item.event_id.clone(), item.item_id.clone()), item);
    }

    pub fn get(&self, event: &str, item: &str) -> Option<TrackedItem> {
        self.items
            .lock()
            .unwrap()
            .get(&(event.into(), item.into()))
            .cloned()
    }

    pub fn fail_writes_for(&self, item: &str) {
        self.failing_writes.lock().unwrap().insert(item.into());
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    fn check(&self) -> PgResult<()> {
        match self.unreachable.load(Ordering::SeqCst) {
            true => Err(unreachable_store()),
            false => Ok(()),
        }
    }

    fn check_write(&self, item: &ItemId) -> PgResult<()> {
        self.check()?;
        match self.failing_writes.lock().unwrap().contains(item) {
            true => Err(unreachable_store()),
            false => Ok(()),
        }
    }

    fn filtered(&self, f: impl Fn(&TrackedItem) -> bool) -> Vec<TrackedItem> {
        self.items
            .lock()
            .unwrap()
            .values()
            .filter(|&i| f(i))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TrackedItemStore for MemoryItemStore {
    async fn tracked_item_ids(&self, event: &EventId) -> PgResult<HashSet<ItemId>> {
        self.check()?;
        Ok(self
            .filtered(|i| &i.event_id == event)
            .into_iter()
            .map(|i| i.item_id)
            .collect())
    }

    async fn insert_new(&self, item: &TrackedItem) -> PgResult<bool> {
        self.check_write(&item.item_id)?;

        let mut items = self.items.lock().unwrap();
        let key = (item.event_id.clone(), item.item_id.clone());
        if items.contains_key(&key) {
            return Ok(false);
        }

        items.insert(key, item.clone());
        Ok(true)
    }

    async fn list_active(&self, event: &EventId) -> PgResult<Vec<TrackedItem>> {
        self.check()?;
        Ok(self.filtered(|i| &i.event_id == event && i.is_active()))
    }

    async fn list_for_event(&self, event: &EventId) -> PgResult<Vec<TrackedItem>> {
        self.check()?;
        Ok(self.filtered(|i| &i.event_id == event))
    }

    async fn save_refresh(&self, item: &TrackedItem, prev_cycle: i32) -> PgResult<bool> {
        self.check_write(&item.item_id)?;

        let mut items = self.items.lock().unwrap();
        match items.get_mut(&(item.event_id.clone(), item.item_id.clone())) {
            Some(stored)
                if stored.status == ItemStatus::Active && stored.cycle_count == prev_cycle =>
            {
                *stored = item.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn events_with_active_items(&self) -> PgResult<Vec<EventId>> {
        self.check()?;
        let mut events: Vec<EventId> = self
            .filtered(TrackedItem::is_active)
            .into_iter()
            .map(|i| i.event_id)
            .collect();
        events.dedup();

        Ok(events)
    }

    async fn events_for_sync(&self, since: DateTime<Utc>) -> PgResult<Vec<EventId>> {
        self.check()?;
        let mut events: Vec<EventId> = self
            .filtered(|i| i.is_active() || i.updated_at >= since)
            .into_iter()
            .map(|i| i.event_id)
            .collect();
        events.dedup();

        Ok(events)
    }

    async fn delete_event(&self, event: &EventId) -> PgResult<u64> {
        self.check()?;
        let mut items = self.items.lock().unwrap();
        let before = items.len();
        items.retain(|(e, _), _| e != event);

        Ok((before - items.len()) as u64)
    }
}

#[derive(Default)]
pub struct MemoryTeamStore {
    teams: Mutex<BTreeMap<TeamId, Team>>,
    unreachable: AtomicBool,
}

impl MemoryTeamStore {
    pub fn add(&self, event: &str, id: &str, members: &[&str]) {
        let team = Team {
            id: id.into(),
            owner_id: format!("owner-{id}"),
            event_id: event.into(),
            name: format!("Team {id}"),
            member_item_ids: members.iter().map(|m| ItemId::from(*m)).collect(),
            aggregate_score: 0,
            created_at: Utc::now(),
        };
        self.teams.lock().unwrap().insert(team.id.clone(), team);
    }

    pub fn score_of(&self, id: &str) -> Option<i64> {
        self.teams
            .lock()
            .unwrap()
            .get(&TeamId::from(id))
            .map(|t| t.aggregate_score)
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    fn check(&self) -> PgResult<()> {
        match self.unreachable.load(Ordering::SeqCst) {
            true => Err(unreachable_store()),
            false => Ok(()),
        }
    }
}

#[async_trait]
impl TeamStore for MemoryTeamStore {
    async fn teams_for_event(&self, event: &EventId) -> PgResult<Vec<Team>> {
        self.check()?;
        Ok(self
            .teams
            .lock()
            .unwrap()
            .values()
            .filter(|t| &t.event_id == event)
            .cloned()
            .collect())
    }

    async fn write_aggregates(&self, event: &EventId, scores: &[(TeamId, i64)]) -> PgResult<()> {
        self.check()?;
        let mut teams = self.teams.lock().unwrap();
        for (id, score) in scores {
            if let Some(team) = teams.get_mut(id).filter(|t| &t.event_id == event) {
                team.aggregate_score = *score;
            }
        }

        Ok(())
    }

    async fn reset_aggregates(&self, event: &EventId) -> PgResult<u64> {
        self.check()?;
        let mut count = 0;
        for team in self.teams.lock().unwrap().values_mut() {
            if &team.event_id == event {
                team.aggregate_score = 0;
                count += 1;
            }
        }

        Ok(count)
    }
}

#[derive(Default)]
pub struct MemoryCatalog {
    events: BTreeMap<EventId, Vec<EventItem>>,
}

impl MemoryCatalog {
    pub fn with_event(mut self, event: &str, items: &[(&str, &str)]) -> Self {
        self.events.insert(
            event.into(),
            items
                .iter()
                .map(|(item, video)| EventItem {
                    item_id: (*item).into(),
                    video_ref: (*video).into(),
                })
                .collect(),
        );
        self
    }
}

#[async_trait]
impl EventCatalog for MemoryCatalog {
    async fn eligible_events(&self) -> PgResult<Vec<EventId>> {
        Ok(self.events.keys().cloned().collect())
    }

    async fn relevant_items(&self, event: &EventId) -> PgResult<Vec<EventItem>> {
        Ok(self.events.get(event).cloned().unwrap_or_default())
    }
}

pub struct MemoryRankedSet {
    rankings: RwLock<HashMap<EventId, Arc<Vec<RankedEntry>>>>,
    available: AtomicBool,
    failing_clears: AtomicBool,
}

impl Default for MemoryRankedSet {
    fn default() -> Self {
        Self {
            rankings: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
            failing_clears: AtomicBool::new(false),
        }
    }
}

impl MemoryRankedSet {
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Makes only `clear` fail; reads and rebuilds keep working.
    pub fn fail_clears(&self, failing: bool) {
        self.failing_clears.store(failing, Ordering::SeqCst);
    }

    pub fn snapshot(&self, event: &str) -> Option<Arc<Vec<RankedEntry>>> {
        self.rankings.read().unwrap().get(&event.into()).cloned()
    }

    fn check(&self) -> RedisResult<()> {
        match self.available.load(Ordering::SeqCst) {
            true => Ok(()),
            false => Err(RedisErr::Unavailable(String::from("connection refused"))),
        }
    }
}

#[async_trait]
impl RankedSet for MemoryRankedSet {
    async fn rebuild(&self, event: &EventId, entries: &[LeaderboardEntry]) -> RedisResult<()> {
        self.check()?;
        let ranked = Arc::new(assign_ranks(entries.to_vec()));
        self.rankings.write().unwrap().insert(event.clone(), ranked);

        Ok(())
    }

    async fn range_descending(
        &self,
        event: &EventId,
        offset: i64,
        limit: i64,
    ) -> RedisResult<RankedPage> {
        self.check()?;
        Ok(match self.rankings.read().unwrap().get(event) {
            Some(ranked) => page_of(ranked, offset, limit),
            None => RankedPage::default(),
        })
    }

    async fn clear(&self, event: &EventId) -> RedisResult<()> {
        self.check()?;
        if self.failing_clears.load(Ordering::SeqCst) {
            return Err(RedisErr::Unavailable(String::from("clear rejected")));
        }
        self.rankings.write().unwrap().remove(event);

        Ok(())
    }
}

/// Replays queued responses per video; a video with nothing queued is unavailable.
#[derive(Default)]
pub struct ScriptedSource {
    responses: Mutex<HashMap<VideoRef, VecDeque<Option<Counters>>>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn push_ok(&self, video: &str, counters: Counters) {
        self.push(video, Some(counters));
    }

    pub fn push_err(&self, video: &str) {
        self.push(video, None);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn push(&self, video: &str, response: Option<Counters>) {
        self.responses
            .lock()
            .unwrap()
            .entry(video.into())
            .or_default()
            .push_back(response);
    }
}

#[async_trait]
impl MetricsSource for ScriptedSource {
    async fn fetch(&self, video: &VideoRef) -> Result<Counters, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let next = self
            .responses
            .lock()
            .unwrap()
            .get_mut(video)
            .and_then(VecDeque::pop_front);

        match next {
            Some(Some(counters)) => Ok(counters),
            Some(None) => Err(FetchError::Status(503)),
            None => Err(FetchError::NotFound(video.to_string())),
        }
    }
}
