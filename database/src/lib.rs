use std::time::Duration;

use sqlx::{Pool, Sqlite};

mod build;
mod dialog;
mod manifest;

pub use build::{migration_status, DatabaseSource, MigrationRecord, QuoteclipDbConnectOptions};
pub use dialog::ImportOutcome;
pub use manifest::ManifestOutcome;

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error(transparent)]
    MediaId(#[from] quoteclip_core::identifiers::MediaIdError),
    #[error("unable to convert datatype from sql: {}", _0)]
    ConvertFromSqlError(String),
}

/// Dialog lines and the ingest manifest.
#[derive(Debug, Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
    source: DatabaseSource,
}

impl Database {
    pub async fn connect(opts: &QuoteclipDbConnectOptions) -> Result<Database, DatabaseError> {
        let pool = opts.create_pool().await?;
        build::run_migrations(&pool).await?;
        log::info!("connected to sqlite db at {}", opts.source);
        Ok(Database {
            pool,
            source: opts.source.clone(),
        })
    }

    pub async fn memory() -> Result<Database, DatabaseError> {
        Database::connect(&QuoteclipDbConnectOptions::memory()?).await
    }

    pub async fn from_path<P: Into<std::path::PathBuf>>(
        filename: P,
    ) -> Result<Database, DatabaseError> {
        Database::connect(&QuoteclipDbConnectOptions::from_path(filename)).await
    }

    pub async fn from_url(url: &str) -> Result<Database, DatabaseError> {
        Database::connect(&QuoteclipDbConnectOptions::from_url(url)?).await
    }

    pub fn source(&self) -> &DatabaseSource {
        &self.source
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

fn to_sql_int<T: TryInto<i64>>(value: T, what: &str) -> Result<i64, DatabaseError> {
    value
        .try_into()
        .map_err(|_| DatabaseError::ConvertFromSqlError(format!("{} does not fit in i64", what)))
}

fn from_sql_u32(value: i64, what: &str) -> Result<u32, DatabaseError> {
    u32::try_from(value).map_err(|_| {
        DatabaseError::ConvertFromSqlError(format!("{} out of range: {}", what, value))
    })
}

fn from_sql_ms(value: i64, what: &str) -> Result<Duration, DatabaseError> {
    u64::try_from(value)
        .map(Duration::from_millis)
        .map_err(|_| DatabaseError::ConvertFromSqlError(format!("negative {}: {}", what, value)))
}
