use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::api::server::{AppState, RouteError};
use crate::constants::{
    DEFAULT_POLL_INTERVAL_SECS, DEFAULT_REFRESH_INTERVAL_SECS, DEFAULT_SYNC_INTERVAL_SECS,
};
use crate::db::prelude::*;
use crate::db::redis::ranked_set::RedisRankedSet;
use crate::db::redis::redis_pool::{RedisErr, redis_pool};
use crate::jobs::Scheduler;
use crate::jobs::tasks::{EngineJob, JobKind};
use crate::scoring::{Engine, EngineSettings};
use crate::util::env::{self, EnvErr, Var};
use crate::util::telemetry;
use crate::util::youtube::Youtube;

mod api;
mod constants;
mod db;
mod jobs;
mod scoring;
mod util;

#[derive(Debug, Error)]
enum RunnerErr {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Std(#[from] Box<dyn std::error::Error>),

    #[error(transparent)]
    Env(#[from] EnvErr),

    #[error(transparent)]
    Db(#[from] PgError),

    #[error(transparent)]
    Redis(#[from] RedisErr),

    #[error(transparent)]
    Route(#[from] RouteError),
}

type Result<T> = core::result::Result<T, RunnerErr>;

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry_registry = telemetry::Telemetry::new().await?.register();

    tracing::info!("starting engagement engine");

    let pool = db_pool().await?;
    db::migrate(pool).await?;

    let redis = redis_pool().await?;
    let source = Youtube::from_env().await?;

    let engine = Arc::new(Engine::new(
        Arc::new(TrackedItemRepository::new(pool)),
        Arc::new(TeamRepository::new(pool)),
        Arc::new(EventRepository::new(pool)),
        Arc::new(source),
        Arc::new(RedisRankedSet::new(redis.manager.clone())),
        EngineSettings::default(),
    ));

    let mut scheduler = Scheduler::new();
    for (kind, var, default_secs) in [
        (JobKind::Poll, Var::PollIntervalSecs, DEFAULT_POLL_INTERVAL_SECS),
        (JobKind::Refresh, Var::RefreshIntervalSecs, DEFAULT_REFRESH_INTERVAL_SECS),
        (JobKind::Sync, Var::SyncIntervalSecs, DEFAULT_SYNC_INTERVAL_SECS),
    ] {
        let interval = env::interval(var, default_secs).await?;
        scheduler.register(Arc::new(EngineJob::new(kind, engine.clone(), interval)));
    }
    scheduler.start();

    let state = Arc::new(AppState {
        engine,
        internal_token: var!(Var::InternalToken).await?,
    });

    let shutdown = CancellationToken::new();
    let mut server = tokio::spawn(api::server::serve(
        state,
        env::server_port().await?,
        shutdown.child_token(),
    ));

    let server_res = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("shutdown requested");
            shutdown.cancel();
            (&mut server).await
        }

        res = &mut server => res,
    };

    scheduler.shutdown().await;
    telemetry_registry.shutdown();

    match server_res {
        Ok(res) => res?,
        Err(e) => tracing::error!(error = ?e, "server task panicked"),
    }

    Ok(())
}
