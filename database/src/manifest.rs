use std::{
    collections::HashMap,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use futures::TryStreamExt;
use sqlx::{Row, SqliteConnection};

use crate::{Database, DatabaseError};

/// What recording a source file in the manifest changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestOutcome {
    Created,
    /// The file was known, and its modification time moved forward.
    Updated,
    Noop,
}

fn to_nanos(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_nanos().min(i64::MAX as u128) as i64,
        Err(e) => -(e.duration().as_nanos().min(i64::MAX as u128) as i64),
    }
}

fn from_nanos(n: i64) -> SystemTime {
    if n >= 0 {
        UNIX_EPOCH + Duration::from_nanos(n as u64)
    } else {
        UNIX_EPOCH - Duration::from_nanos(n.unsigned_abs())
    }
}

pub(crate) async fn manifest_add_conn(
    conn: &mut SqliteConnection,
    srt_file: &str,
    mtime: SystemTime,
) -> Result<ManifestOutcome, DatabaseError> {
    let nanos = to_nanos(mtime);
    let existing: Option<i64> =
        sqlx::query_scalar("SELECT srt_mod_time FROM manifest WHERE srt_file = ?1")
            .bind(srt_file)
            .fetch_optional(&mut *conn)
            .await?;

    let outcome = match existing {
        None => {
            sqlx::query("INSERT INTO manifest (srt_file, srt_mod_time) VALUES (?1, ?2)")
                .bind(srt_file)
                .bind(nanos)
                .execute(&mut *conn)
                .await?;
            ManifestOutcome::Created
        }
        // equal times are treated as unchanged content
        Some(prev) if nanos > prev => {
            sqlx::query("UPDATE manifest SET srt_mod_time = ?1 WHERE srt_file = ?2")
                .bind(nanos)
                .bind(srt_file)
                .execute(&mut *conn)
                .await?;
            ManifestOutcome::Updated
        }
        Some(_) => ManifestOutcome::Noop,
    };
    log::trace!("manifest {:?}: {}", outcome, srt_file);
    Ok(outcome)
}

impl Database {
    pub async fn manifest_add(
        &self,
        srt_file: &str,
        mtime: SystemTime,
    ) -> Result<ManifestOutcome, DatabaseError> {
        let mut tx = self.pool.begin().await?;
        let outcome = manifest_add_conn(&mut *tx, srt_file, mtime).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    /// Drop `srt_file` from the manifest so the next pass ingests it again.
    pub async fn manifest_forget(&self, srt_file: &str) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM manifest WHERE srt_file = ?1")
            .bind(srt_file)
            .execute(&self.pool)
            .await?;
        log::trace!("manifest forgot {}", srt_file);
        Ok(())
    }

    pub async fn get_manifest(&self) -> Result<HashMap<String, SystemTime>, DatabaseError> {
        let mut rows = sqlx::query("SELECT srt_file, srt_mod_time FROM manifest").fetch(&self.pool);
        let mut manifest = HashMap::new();
        while let Some(row) = rows.try_next().await? {
            let file: String = row.try_get("srt_file")?;
            let nanos: i64 = row.try_get("srt_mod_time")?;
            manifest.insert(file, from_nanos(nanos));
        }
        Ok(manifest)
    }
}
