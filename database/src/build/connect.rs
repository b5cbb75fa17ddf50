use std::{path::PathBuf, str::FromStr, time::Duration};

use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    Pool, Sqlite,
};

use super::DatabaseSource;
use crate::DatabaseError;

const POOL_TIMEOUT: Duration = Duration::from_secs(30);
const POOL_MAX_CONN: u32 = 4;
const MEMORY_URL: &str = "sqlite::memory:";

#[derive(Debug, Clone)]
pub struct QuoteclipDbConnectOptions {
    inner: SqliteConnectOptions,
    pub source: DatabaseSource,
}

impl QuoteclipDbConnectOptions {
    pub fn memory() -> Result<QuoteclipDbConnectOptions, DatabaseError> {
        Ok(QuoteclipDbConnectOptions {
            inner: SqliteConnectOptions::from_str(MEMORY_URL)?,
            source: DatabaseSource::Memory,
        }
        .apply_common()
        .map(|opt| opt.journal_mode(SqliteJournalMode::Memory)))
    }

    /// Accepts `sqlite:` urls. A bare path is treated as a file name.
    pub fn from_url(url: &str) -> Result<QuoteclipDbConnectOptions, DatabaseError> {
        if url == MEMORY_URL || url == "sqlite://:memory:" {
            QuoteclipDbConnectOptions::memory()
        } else if url.starts_with("sqlite:") {
            Ok(QuoteclipDbConnectOptions {
                inner: SqliteConnectOptions::from_str(url)?,
                source: DatabaseSource::Url(url.to_owned()),
            }
            .apply_common())
        } else {
            Ok(QuoteclipDbConnectOptions::from_path(url))
        }
    }

    pub fn from_path(filename: impl Into<PathBuf>) -> QuoteclipDbConnectOptions {
        let p: PathBuf = filename.into();
        QuoteclipDbConnectOptions {
            inner: SqliteConnectOptions::new().filename(p.as_path()),
            source: DatabaseSource::Path(p),
        }
        .apply_common()
    }

    pub fn create_if_missing(self, create: bool) -> QuoteclipDbConnectOptions {
        self.map(|opt| opt.create_if_missing(create))
    }

    pub async fn create_pool(&self) -> Result<Pool<Sqlite>, DatabaseError> {
        log::debug!("connecting to sqlite database: {:?}", self.source);
        if let DatabaseSource::Path(p) = &self.source {
            if let Some(dir) = p.parent().filter(|d| !d.as_os_str().is_empty()) {
                if let Err(e) = std::fs::create_dir_all(dir) {
                    log::error!("unable to create directory {:?} for the database: {}", dir, e);
                }
            }
        }
        let pool_opts = if self.source == DatabaseSource::Memory {
            // every connection to an in-memory database sees its own data,
            // so the pool must hold onto exactly one forever
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(POOL_MAX_CONN)
        };
        Ok(pool_opts
            .acquire_timeout(POOL_TIMEOUT)
            .connect_with(self.inner.clone())
            .await?)
    }

    fn map(self, f: impl FnOnce(SqliteConnectOptions) -> SqliteConnectOptions) -> Self {
        QuoteclipDbConnectOptions {
            inner: f(self.inner),
            source: self.source,
        }
    }

    fn apply_common(self) -> QuoteclipDbConnectOptions {
        self.map(|opt| {
            opt.synchronous(SqliteSynchronous::Normal)
                .create_if_missing(true)
                .busy_timeout(POOL_TIMEOUT)
                .journal_mode(SqliteJournalMode::Wal)
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn create_in_memory_db_from_url() {
        let opts = QuoteclipDbConnectOptions::from_url("sqlite::memory:").unwrap();
        assert_eq!(opts.source, DatabaseSource::Memory);
        opts.create_pool().await.unwrap();
    }

    #[tokio::test]
    async fn bare_path_is_a_file() {
        let root = tempfile::tempdir().unwrap();
        let db_path = root.path().join("nested").join("test.db");
        let opts = QuoteclipDbConnectOptions::from_url(db_path.to_str().unwrap()).unwrap();
        assert_eq!(opts.source, DatabaseSource::Path(db_path.clone()));
        opts.create_pool().await.unwrap();
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn fail_to_create_db_with_create_false() {
        let root = tempfile::tempdir().unwrap();
        let db_path = root.path().join("test.db");
        let res = QuoteclipDbConnectOptions::from_path(&db_path)
            .create_if_missing(false)
            .create_pool()
            .await;
        assert!(res.is_err())
    }
}
