use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use tracing::instrument;

use crate::db::models::tracked_item::{Counters, VideoRef};
use crate::scoring::source::{FetchError, MetricsSource};
use crate::util::env::{EnvResult, Var};
use crate::var;

/// YouTube Data API v3 client used as the production metrics source.
#[derive(Debug, Clone)]
pub struct Youtube {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl Youtube {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    pub async fn from_env() -> EnvResult<Self> {
        let base_url = var!(Var::YoutubeApiUrl).await?;
        let api_key = var!(Var::YoutubeApiKey).await?;

        Ok(Self::new(base_url, api_key))
    }

    #[instrument(skip(self))]
    async fn fetch_statistics(&self, video_id: &str) -> Result<VideoStatistics, FetchError> {
        let res = self
            .client
            .get(format!("{}/videos", self.base_url))
            .query(&[
                ("part", "statistics"),
                ("id", video_id),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            tracing::warn!(code = %status, body, "non-success response from youtube");

            return Err(FetchError::Status(status.as_u16()));
        }

        let body = res
            .json::<VideoListResponse>()
            .await
            .map_err(|e| FetchError::Malformed(e.to_string()))?;

        body.items
            .into_iter()
            .find(|v| v.id == video_id)
            .ok_or_else(|| FetchError::NotFound(video_id.to_string()))?
            .statistics
            .ok_or_else(|| FetchError::Malformed(String::from("statistics part missing")))
    }
}

#[async_trait]
impl MetricsSource for Youtube {
    #[instrument(skip(self), fields(video = %video))]
    async fn fetch(&self, video: &VideoRef) -> Result<Counters, FetchError> {
        let video_id = video_id(video).ok_or_else(|| FetchError::BadReference(video.clone()))?;
        let stats = self.fetch_statistics(&video_id).await?;

        stats.into_counters()
    }
}

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoResource>,
}

#[derive(Debug, Deserialize)]
struct VideoResource {
    id: String,
    statistics: Option<VideoStatistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoStatistics {
    view_count: Option<String>,
    like_count: Option<String>,
    comment_count: Option<String>,
}

impl VideoStatistics {
    /// Views are mandatory. Likes and comments can be hidden by the uploader, in which case
    /// they read as zero, but a value that is present has to parse.
    fn into_counters(self) -> Result<Counters, FetchError> {
        let views = self
            .view_count
            .as_deref()
            .ok_or_else(|| FetchError::Malformed(String::from("viewCount missing")))
            .and_then(|v| parse_count("viewCount", v))?;

        let likes = match self.like_count.as_deref() {
            Some(v) => parse_count("likeCount", v)?,
            None => 0,
        };

        let comments = match self.comment_count.as_deref() {
            Some(v) => parse_count("commentCount", v)?,
            None => 0,
        };

        Ok(Counters::new(views, likes, comments))
    }
}

fn parse_count(field: &str, raw: &str) -> Result<i64, FetchError> {
    raw.parse::<u64>()
        .ok()
        .and_then(|v| i64::try_from(v).ok())
        .ok_or_else(|| FetchError::Malformed(format!("{field} '{raw}' is not a count")))
}

/// Extracts the video id from a bare id or one of the common youtube url shapes.
pub fn video_id(video: &VideoRef) -> Option<String> {
    let raw = video.as_str().trim();
    if is_video_id(raw) {
        return Some(raw.to_string());
    }

    let url = Url::parse(raw).ok()?;
    let host = url.host_str()?.trim_start_matches("www.").trim_start_matches("m.");
    let mut segments = url.path_segments()?.filter(|s| !s.is_empty());

    let candidate = match host {
        "youtu.be" => segments.next().map(str::to_string),
        "youtube.com" => match segments.next()? {
            "watch" => url
                .query_pairs()
                .find(|(k, _)| k == "v")
                .map(|(_, v)| v.into_owned()),
            "shorts" | "embed" | "live" => segments.next().map(str::to_string),
            _ => None,
        },
        _ => None,
    }?;

    is_video_id(&candidate).then_some(candidate)
}

fn is_video_id(s: &str) -> bool {
    s.len() == 11
        && s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}
