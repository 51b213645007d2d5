use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::db::models::tracked_item::{Counters, VideoRef};

/// Anything that can report current engagement counters for a video.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn fetch(&self, video: &VideoRef) -> Result<Counters, FetchError>;
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("metrics fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("unrecognised video reference '{0}'")]
    BadReference(VideoRef),

    #[error("video '{0}' not found")]
    NotFound(String),

    #[error("malformed metrics response: {0}")]
    Malformed(String),

    #[error("metrics provider responded with status {0}")]
    Status(u16),

    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),
}

/// Fetches with an upper bound on waiting; a timeout counts as an ordinary fetch failure.
pub async fn fetch_with_timeout(
    source: &dyn MetricsSource,
    video: &VideoRef,
    timeout: Duration,
) -> Result<Counters, FetchError> {
    match tokio::time::timeout(timeout, source.fetch(video)).await {
        Ok(res) => res,
        Err(_) => Err(FetchError::Timeout(timeout)),
    }
}
