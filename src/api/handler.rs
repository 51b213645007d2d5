use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use tracing::instrument;

use crate::api::server::{AppState, JsonResult, RouteError};
use crate::db::models::Pagination;
use crate::db::models::event::EventId;
use crate::db::models::leaderboard::LeaderboardView;
use crate::scoring::report::{CycleReport, PollReport, ResetReport, SyncReport};

const MAX_EVENT_ID_LEN: usize = 64;

/// Event ids end up inside redis key names, so only a conservative charset is accepted.
fn event_id(raw: String) -> Result<EventId, RouteError> {
    let valid = !raw.is_empty()
        && raw.len() <= MAX_EVENT_ID_LEN
        && raw
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');

    match valid {
        true => Ok(EventId::from(raw)),
        false => Err(RouteError::InvalidEvent(raw)),
    }
}

#[instrument(skip(state))]
pub async fn poll_event(
    State(state): State<Arc<AppState>>,
    Path(event): Path<String>,
) -> JsonResult<PollReport> {
    let event = event_id(event)?;
    Ok(Json(state.engine.poll_event(&event).await?))
}

#[instrument(skip(state))]
pub async fn refresh_event(
    State(state): State<Arc<AppState>>,
    Path(event): Path<String>,
) -> JsonResult<CycleReport> {
    let event = event_id(event)?;
    Ok(Json(state.engine.refresh_event(&event).await?))
}

#[instrument(skip(state))]
pub async fn sync_event(
    State(state): State<Arc<AppState>>,
    Path(event): Path<String>,
) -> JsonResult<SyncReport> {
    let event = event_id(event)?;
    Ok(Json(state.engine.sync_event(&event).await?))
}

#[instrument(skip(state))]
pub async fn reset_event(
    State(state): State<Arc<AppState>>,
    Path(event): Path<String>,
) -> JsonResult<ResetReport> {
    let event = event_id(event)?;
    Ok(Json(state.engine.reset_event(&event).await?))
}

#[instrument(skip(state))]
pub async fn leaderboard(
    Query(param): Query<Pagination>,
    State(state): State<Arc<AppState>>,
    Path(event): Path<String>,
) -> JsonResult<LeaderboardView> {
    let event = event_id(event)?;
    Ok(Json(state.engine.leaderboard(&event, &param).await))
}
