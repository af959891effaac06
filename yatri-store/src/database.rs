use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::info;

use yatri_domain::StorageError;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(connection_string: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }
}

/// Postgres-backed implementation of the storage traits. The database is the
/// serialization point: multi-row claims run under a per-bus advisory lock,
/// lifecycle transitions are guarded updates, wallet writes take the row
/// lock.
#[derive(Clone)]
pub struct PgStore {
    pub pool: Pool<Postgres>,
}

impl PgStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

/// 40001 is a serialization failure, 40P01 a deadlock; both are transient
/// and retried by the engine.
pub(crate) fn map_sqlx(e: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db) = &e {
        if let Some(code) = db.code() {
            if code == "40001" || code == "40P01" {
                return StorageError::Conflict(db.message().to_string());
            }
        }
    }
    StorageError::Unavailable(e.to_string())
}
