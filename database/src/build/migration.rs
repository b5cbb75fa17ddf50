use sqlx::{
    migrate::{Migrate, Migrator},
    Pool, Sqlite,
};

use crate::DatabaseError;

static MIGRATOR: Migrator = sqlx::migrate!();

#[derive(Debug, PartialEq, Eq)]
pub struct MigrationRecord {
    pub version: i64,
    pub description: Option<String>,
    pub applied: bool,
}

pub(crate) async fn run_migrations(pool: &Pool<Sqlite>) -> Result<(), DatabaseError> {
    log::trace!("check/run migrations against database");
    if let Err(e) = MIGRATOR.run(pool).await {
        match migration_status(pool).await {
            Ok(hist) => log::warn!("migration history: {:#?}", hist),
            Err(status_err) => log::error!("could not get migration history: {:?}", status_err),
        }
        return Err(e.into());
    }
    Ok(())
}

/// Every migration this build knows about, plus any the database has applied
/// that this build does not know.
pub async fn migration_status(pool: &Pool<Sqlite>) -> Result<Vec<MigrationRecord>, DatabaseError> {
    let mut conn = pool.acquire().await?;
    conn.ensure_migrations_table().await?;
    let applied = conn
        .list_applied_migrations()
        .await?
        .into_iter()
        .map(|m| m.version)
        .collect::<Vec<_>>();

    let mut records = MIGRATOR
        .migrations
        .iter()
        .map(|m| MigrationRecord {
            version: m.version,
            description: Some(m.description.to_string()),
            applied: applied.contains(&m.version),
        })
        .collect::<Vec<_>>();
    for version in applied {
        if !records.iter().any(|r| r.version == version) {
            records.push(MigrationRecord {
                version,
                description: None,
                applied: true,
            });
        }
    }
    records.sort_unstable_by_key(|r| r.version);
    Ok(records)
}
