use std::sync::LazyLock;

use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::instrument;

use crate::db::models::event::EventId;
use crate::util::env::{EnvErr, Var};
use crate::var;

static REDIS_POOL: LazyLock<OnceCell<RedisPool>> = LazyLock::new(OnceCell::new);
pub async fn redis_pool() -> RedisResult<&'static RedisPool> {
    REDIS_POOL
        .get_or_try_init(|| async { RedisPool::new().await })
        .await
}

/// Per-event leaderboard keys.
///
/// The ranking zset's members are team ids for the lifetime of an entry; display data lives in
/// the companion hash under the same team id.
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub enum RedisKey {
    Ranking,
    Teams,
}

impl RedisKey {
    #[instrument]
    pub fn with_event(&self, event: &EventId) -> String {
        match self {
            RedisKey::Ranking => format!("leaderboard:{}:ranking", event),
            RedisKey::Teams => format!("leaderboard:{}:teams", event),
        }
    }

    /// Scratch key a rebuild writes into before it is renamed over the live key.
    #[instrument]
    pub fn staging(&self, event: &EventId, token: &str) -> String {
        format!("{}:staging:{}", self.with_event(event), token)
    }
}

pub struct RedisPool {
    pub manager: ConnectionManager,
}

impl RedisPool {
    #[instrument]
    pub async fn new() -> RedisResult<Self> {
        let redis_url = var!(Var::RedisUrl).await?;
        tracing::debug!(redis_url, "connecting to redis server");

        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;

        Ok(Self { manager })
    }
}

pub type RedisResult<T> = core::result::Result<T, RedisErr>;

#[derive(Debug, Error)]
pub enum RedisErr {
    #[error(transparent)]
    EnvErr(#[from] EnvErr),

    #[error(transparent)]
    RedisClientError(#[from] redis::RedisError),

    #[error(transparent)]
    SerdeError(#[from] serde_json::Error),

    #[error("ranked set member '{0}' has no team metadata")]
    MissingMetadata(String),

    #[cfg(test)]
    #[error("ranked set unavailable: {0}")]
    Unavailable(String),
}
