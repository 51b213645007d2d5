use std::time::Duration;

/// A tracked item retires once its cycle count passes this value.
pub const RETIREMENT_THRESHOLD: i32 = 30;

/// Upper bound on concurrent metrics fetches within one job run.
pub const NUM_FETCH_WORKERS: usize = 8;

pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Events whose items were touched within this window still get leaderboard syncs after every
/// item has retired, so the final frozen scores land in the index.
pub const RECENTLY_ACTIVE_WINDOW: Duration = Duration::from_secs(60 * 60);

// five minutes per job unless overridden
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 300;

pub const DEFAULT_SERVER_PORT: u16 = 3000;
pub const DEFAULT_YOUTUBE_API_URL: &str = "https://www.googleapis.com/youtube/v3";

pub const LEADERBOARD_PAGE_MAX: i64 = 100;

/// Staging keys for a leaderboard rebuild expire on their own if the swap never happens.
pub const STAGING_KEY_TTL_SECS: i64 = 300;
