//! Process configuration read from the environment (and `.env` during development).
//!
//! Every value is kept as a string and parsed at the call site, mirroring how the variables
//! arrive. Optional variables default to an empty string, which is treated as "unset".

use std::sync::LazyLock;
use std::time::Duration;

use serde::Deserialize;
use serde::de::value::MapDeserializer;
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::constants;

static ENV_VARS: LazyLock<OnceCell<Env>> = LazyLock::new(OnceCell::new);
pub async fn get_var(var: Var) -> EnvResult<&'static str> {
    let vars = ENV_VARS.get_or_try_init(|| async { Env::new() }).await?;
    Ok(match var {
        Var::DatabaseUrl => &vars.database_url,
        Var::RedisUrl => &vars.redis_url,
        Var::YoutubeApiKey => &vars.youtube_api_key,
        Var::YoutubeApiUrl => &vars.youtube_api_url,
        Var::InternalToken => &vars.internal_post_token,
        Var::ServerApiPort => &vars.server_api_port,
        Var::OtelExporterEndpoint => &vars.otel_exporter_otlp_endpoint,
        Var::ApiServiceName => &vars.api_service_name,
        Var::ApiTracerName => &vars.api_tracer_name,
        Var::PollIntervalSecs => &vars.poll_interval_secs,
        Var::RefreshIntervalSecs => &vars.refresh_interval_secs,
        Var::SyncIntervalSecs => &vars.sync_interval_secs,
    })
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Env {
    pub database_url: String,
    pub redis_url: String,
    pub youtube_api_key: String,
    pub internal_post_token: String,
    #[serde(default)]
    pub youtube_api_url: String,
    #[serde(default)]
    pub server_api_port: String,
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: String,
    #[serde(default)]
    pub api_service_name: String,
    #[serde(default)]
    pub api_tracer_name: String,
    #[serde(default)]
    pub poll_interval_secs: String,
    #[serde(default)]
    pub refresh_interval_secs: String,
    #[serde(default)]
    pub sync_interval_secs: String,
}

impl Env {
    pub fn new() -> EnvResult<Self> {
        // a missing .env file is fine; real deployments set the variables directly
        _ = dotenvy::dotenv();
        Self::from_iter(std::env::vars())
    }

    pub fn from_iter<I>(vars: I) -> EnvResult<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let deserializer = MapDeserializer::<_, serde::de::value::Error>::new(vars.into_iter());
        let mut env = Env::deserialize(deserializer)?;

        if env.youtube_api_url.is_empty() {
            env.youtube_api_url = constants::DEFAULT_YOUTUBE_API_URL.to_string();
        }
        if env.api_service_name.is_empty() {
            env.api_service_name = env!("CARGO_PKG_NAME").to_string();
        }
        if env.api_tracer_name.is_empty() {
            env.api_tracer_name = format!("{}-tracer", env.api_service_name);
        }

        Ok(env)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Var {
    DatabaseUrl,
    RedisUrl,
    YoutubeApiKey,
    YoutubeApiUrl,
    InternalToken,
    ServerApiPort,
    OtelExporterEndpoint,
    ApiServiceName,
    ApiTracerName,
    PollIntervalSecs,
    RefreshIntervalSecs,
    SyncIntervalSecs,
}

#[macro_export]
macro_rules! var {
    ($ev:expr) => {
        $crate::util::env::get_var($ev)
    };
}

/// Reads an optional variable, returning `None` when it was left unset.
pub async fn optional_var(var: Var) -> EnvResult<Option<&'static str>> {
    let value = get_var(var).await?;
    Ok((!value.trim().is_empty()).then_some(value))
}

pub async fn server_port() -> EnvResult<u16> {
    match optional_var(Var::ServerApiPort).await? {
        Some(raw) => parse_number(Var::ServerApiPort, raw),
        None => Ok(constants::DEFAULT_SERVER_PORT),
    }
}

/// Resolves a job interval variable, falling back to `default_secs` when unset.
pub async fn interval(var: Var, default_secs: u64) -> EnvResult<Duration> {
    let secs = match optional_var(var).await? {
        Some(raw) => parse_number::<u64>(var, raw)?,
        None => default_secs,
    };

    if secs == 0 {
        return Err(EnvErr::Invalid {
            var,
            value: String::from("0"),
        });
    }

    Ok(Duration::from_secs(secs))
}

fn parse_number<T: std::str::FromStr>(var: Var, raw: &str) -> EnvResult<T> {
    raw.trim().parse::<T>().map_err(|_| EnvErr::Invalid {
        var,
        value: raw.to_string(),
    })
}

pub type EnvResult<T> = core::result::Result<T, EnvErr>;

#[derive(Debug, Error)]
pub enum EnvErr {
    #[error("environment deserialization failed: {0}")]
    Deserialize(#[from] serde::de::value::Error),

    #[error("invalid value '{value}' for {var:?}")]
    Invalid { var: Var, value: String },
}
