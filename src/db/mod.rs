use std::sync::LazyLock;

use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::instrument;

use crate::util::env::{self, Var};
use crate::var;

#[cfg(test)]
pub mod memory;
pub mod models;
pub mod redis;
pub mod repositories;

pub mod prelude {
    pub use crate::db::PgError;
    pub use crate::db::db_pool;

    pub use crate::db::repositories::event::EventRepository;
    pub use crate::db::repositories::team::TeamRepository;
    pub use crate::db::repositories::tracked_item::TrackedItemRepository;
}

static DB_POOL: LazyLock<OnceCell<Db>> = LazyLock::new(OnceCell::new);
pub async fn db_pool() -> PgResult<&'static PgPool> {
    Ok(&DB_POOL
        .get_or_try_init(|| async { Db::new_pool().await })
        .await?
        .pool)
}

struct Db {
    pool: PgPool,
}

impl Db {
    pub async fn new_pool() -> PgResult<Self> {
        let db_url = var!(Var::DatabaseUrl).await?;
        let pool = sqlx::PgPool::connect(db_url).await?;

        Ok(Self { pool })
    }
}

#[instrument(skip(pool))]
pub async fn migrate(pool: &PgPool) -> PgResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("database migrations applied");

    Ok(())
}

pub type PgResult<T> = core::result::Result<T, PgError>;

#[allow(clippy::enum_variant_names)]
#[derive(Debug, Error)]
pub enum PgError {
    #[error(transparent)]
    SqlxError(#[from] sqlx::Error),

    #[error(transparent)]
    MigrateError(#[from] sqlx::migrate::MigrateError),

    #[error("{0}")]
    EnvError(#[from] env::EnvErr),

    #[error("unknown tracked item status '{0}'")]
    InvalidStatus(String),
}
