use std::time::SystemTime;

use quoteclip_core::{
    identifiers::{EpisodeId, MediaId},
    Dialog, Episode, Publication,
};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use crate::{
    from_sql_ms, from_sql_u32,
    manifest::{manifest_add_conn, ManifestOutcome},
    to_sql_int, Database, DatabaseError,
};

// stays well under sqlite's bound parameter limit
const INSERT_CHUNK: usize = 100;

const DIALOG_COLUMNS: &str = "pos, start_ms, end_ms, content, video_file_name";

/// What importing an episode did to the stored rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    Inserted,
    Replaced,
    /// Stored rows already matched the episode.
    Unchanged,
}

#[derive(Debug, PartialEq, Eq, sqlx::FromRow)]
struct DialogRow {
    pos: i64,
    start_ms: i64,
    end_ms: i64,
    content: String,
    video_file_name: String,
}

impl DialogRow {
    fn from_dialog(d: &Dialog, video_file_name: &str) -> Result<DialogRow, DatabaseError> {
        Ok(DialogRow {
            pos: i64::from(d.pos),
            start_ms: to_sql_int(d.start.as_millis(), "start_ms")?,
            end_ms: to_sql_int(d.end.as_millis(), "end_ms")?,
            content: d.content.clone(),
            video_file_name: video_file_name.to_owned(),
        })
    }

    fn into_dialog(self) -> Result<Dialog, DatabaseError> {
        Ok(Dialog {
            pos: from_sql_u32(self.pos, "pos")?,
            start: from_sql_ms(self.start_ms, "start_ms")?,
            end: from_sql_ms(self.end_ms, "end_ms")?,
            content: self.content,
        })
    }
}

async fn episode_rows(
    conn: &mut SqliteConnection,
    id: &EpisodeId,
) -> Result<Vec<DialogRow>, DatabaseError> {
    let sql = format!(
        "SELECT {} FROM dialog WHERE publication = ?1 AND series = ?2 AND episode = ?3 ORDER BY pos",
        DIALOG_COLUMNS
    );
    Ok(sqlx::query_as::<_, DialogRow>(&sql)
        .bind(&id.publication)
        .bind(id.series)
        .bind(id.episode)
        .fetch_all(&mut *conn)
        .await?)
}

pub(crate) async fn import_episode_conn(
    conn: &mut SqliteConnection,
    episode: &Episode,
) -> Result<ImportOutcome, DatabaseError> {
    let id = &episode.id;
    let rows = episode
        .dialog
        .iter()
        .map(|d| DialogRow::from_dialog(d, &episode.video_file))
        .collect::<Result<Vec<_>, _>>()?;

    let existing = episode_rows(conn, id).await?;
    if existing == rows {
        log::trace!("episode {} unchanged, {} lines", id, rows.len());
        return Ok(ImportOutcome::Unchanged);
    }

    let deleted =
        sqlx::query("DELETE FROM dialog WHERE publication = ?1 AND series = ?2 AND episode = ?3")
            .bind(&id.publication)
            .bind(id.series)
            .bind(id.episode)
            .execute(&mut *conn)
            .await?
            .rows_affected();

    for chunk in rows.chunks(INSERT_CHUNK) {
        let mut insert_builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "INSERT INTO dialog (publication, series, episode, {}) ",
            DIALOG_COLUMNS
        ));
        insert_builder.push_values(chunk, |mut b, row| {
            b.push_bind(id.publication.clone())
                .push_bind(id.series)
                .push_bind(id.episode)
                .push_bind(row.pos)
                .push_bind(row.start_ms)
                .push_bind(row.end_ms)
                .push_bind(row.content.clone())
                .push_bind(row.video_file_name.clone());
        });
        insert_builder.build().execute(&mut *conn).await?;
    }

    log::debug!(
        "imported episode {}: deleted {} rows, inserted {}",
        id,
        deleted,
        rows.len()
    );
    Ok(if existing.is_empty() {
        ImportOutcome::Inserted
    } else {
        ImportOutcome::Replaced
    })
}

impl Database {
    /// Replace every stored line of the episode in one transaction.
    pub async fn import_episode(&self, episode: &Episode) -> Result<ImportOutcome, DatabaseError> {
        let mut tx = self.pool.begin().await?;
        let outcome = import_episode_conn(&mut *tx, episode).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    /// Record the source file in the manifest and import its episode, both or
    /// neither.
    ///
    /// A file whose modification time has not advanced is left alone.
    pub async fn ingest_episode(
        &self,
        episode: &Episode,
        srt_file: &str,
        mtime: SystemTime,
    ) -> Result<(ImportOutcome, ManifestOutcome), DatabaseError> {
        let mut tx = self.pool.begin().await?;
        let manifest = manifest_add_conn(&mut *tx, srt_file, mtime).await?;
        if manifest == ManifestOutcome::Noop {
            tx.rollback().await?;
            return Ok((ImportOutcome::Unchanged, manifest));
        }
        let import = import_episode_conn(&mut *tx, episode).await?;
        tx.commit().await?;
        Ok((import, manifest))
    }

    /// Lines `start..=end`, ordered by position.
    pub async fn get_dialog_range(
        &self,
        id: &EpisodeId,
        start: u32,
        end: u32,
    ) -> Result<Vec<Dialog>, DatabaseError> {
        let sql = format!(
            r#"
            SELECT {}
            FROM dialog
            WHERE publication = ?1 AND series = ?2 AND episode = ?3
                AND pos >= ?4 AND pos <= ?5
            ORDER BY pos
            "#,
            DIALOG_COLUMNS
        );
        sqlx::query_as::<_, DialogRow>(&sql)
            .bind(&id.publication)
            .bind(id.series)
            .bind(id.episode)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(DialogRow::into_dialog)
            .collect()
    }

    pub async fn get_dialog(&self, media_id: &MediaId) -> Result<Vec<Dialog>, DatabaseError> {
        self.get_dialog_range(&media_id.episode, media_id.start(), media_id.end())
            .await
    }

    /// Up to `before_n` lines preceding `start` and up to `after_n` lines
    /// following `end`, each ordered by position.
    pub async fn get_dialog_context(
        &self,
        id: &EpisodeId,
        start: u32,
        end: u32,
        before_n: u32,
        after_n: u32,
    ) -> Result<(Vec<Dialog>, Vec<Dialog>), DatabaseError> {
        let before_sql = format!(
            r#"
            SELECT {}
            FROM dialog
            WHERE publication = ?1 AND series = ?2 AND episode = ?3 AND pos < ?4
            ORDER BY pos DESC
            LIMIT ?5
            "#,
            DIALOG_COLUMNS
        );
        let mut before = sqlx::query_as::<_, DialogRow>(&before_sql)
            .bind(&id.publication)
            .bind(id.series)
            .bind(id.episode)
            .bind(start)
            .bind(before_n)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(DialogRow::into_dialog)
            .collect::<Result<Vec<_>, _>>()?;
        before.reverse();

        let after_sql = format!(
            r#"
            SELECT {}
            FROM dialog
            WHERE publication = ?1 AND series = ?2 AND episode = ?3 AND pos > ?4
            ORDER BY pos
            LIMIT ?5
            "#,
            DIALOG_COLUMNS
        );
        let after = sqlx::query_as::<_, DialogRow>(&after_sql)
            .bind(&id.publication)
            .bind(id.series)
            .bind(id.episode)
            .bind(end)
            .bind(after_n)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(DialogRow::into_dialog)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((before, after))
    }

    /// Every publication with the series ingested for it, both sorted.
    pub async fn list_publications(&self) -> Result<Vec<Publication>, DatabaseError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT DISTINCT publication, series FROM dialog ORDER BY publication, series",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut publications: Vec<Publication> = Vec::new();
        for (name, series) in rows {
            let series = from_sql_u32(series, "series")?;
            match publications.last_mut() {
                Some(p) if p.name == name => p.series.push(series),
                _ => publications.push(Publication {
                    name,
                    series: vec![series],
                }),
            }
        }
        Ok(publications)
    }

    pub async fn episode_video(&self, id: &EpisodeId) -> Result<Option<String>, DatabaseError> {
        Ok(sqlx::query_scalar(
            r#"
            SELECT video_file_name
            FROM dialog
            WHERE publication = ?1 AND series = ?2 AND episode = ?3
            LIMIT 1
            "#,
        )
        .bind(&id.publication)
        .bind(id.series)
        .bind(id.episode)
        .fetch_optional(&self.pool)
        .await?)
    }
}

#[cfg(test)]
mod test {
    use std::time::{Duration, UNIX_EPOCH};

    use quoteclip_core::test_util::generate_dialog;

    use super::*;

    fn episode(publication: &str, series: u32, ep: u32, lines: &[&str]) -> Episode {
        let id = EpisodeId::new(publication, series, ep).unwrap();
        Episode {
            srt_file: format!("{}.srt", id),
            video_file: format!("{}.webm", id),
            id,
            dialog: generate_dialog(lines),
        }
    }

    async fn dump(db: &Database) -> Vec<(i64, String, i64)> {
        sqlx::query_as("SELECT id, content, pos FROM dialog ORDER BY id")
            .fetch_all(&db.pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn import_and_read_range() {
        let db = Database::memory().await.unwrap();
        let ep = episode("show", 1, 2, &["one", "two", "three", "four"]);
        assert_eq!(db.import_episode(&ep).await.unwrap(), ImportOutcome::Inserted);

        let lines = db.get_dialog_range(&ep.id, 2, 3).await.unwrap();
        assert_eq!(lines, ep.dialog[1..3].to_vec());

        let id = MediaId::single(ep.id.clone(), 4);
        assert_eq!(db.get_dialog(&id).await.unwrap()[0].content, "four");
        assert!(db.get_dialog_range(&ep.id, 9, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reimport_identical_is_untouched() {
        let db = Database::memory().await.unwrap();
        let ep = episode("show", 1, 2, &["one", "two"]);
        db.import_episode(&ep).await.unwrap();
        let before = dump(&db).await;
        assert_eq!(db.import_episode(&ep).await.unwrap(), ImportOutcome::Unchanged);
        assert_eq!(dump(&db).await, before);
    }

    #[tokio::test]
    async fn reimport_replaces_whole_episode() {
        let db = Database::memory().await.unwrap();
        db.import_episode(&episode("show", 1, 2, &["one", "two", "three"]))
            .await
            .unwrap();
        let other = episode("show", 1, 3, &["other"]);
        db.import_episode(&other).await.unwrap();

        let ep = episode("show", 1, 2, &["uno"]);
        assert_eq!(db.import_episode(&ep).await.unwrap(), ImportOutcome::Replaced);
        let lines = db.get_dialog_range(&ep.id, 1, 10).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].content, "uno");
        assert_eq!(db.get_dialog_range(&other.id, 1, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn context_around_range() {
        let db = Database::memory().await.unwrap();
        let ep = episode("show", 1, 1, &["a", "b", "c", "d", "e", "f"]);
        db.import_episode(&ep).await.unwrap();

        let (before, after) = db.get_dialog_context(&ep.id, 3, 4, 1, 5).await.unwrap();
        assert_eq!(
            before.iter().map(|d| d.pos).collect::<Vec<_>>(),
            vec![2]
        );
        assert_eq!(
            after.iter().map(|d| d.pos).collect::<Vec<_>>(),
            vec![5, 6]
        );

        let (before, after) = db.get_dialog_context(&ep.id, 1, 1, 3, 0).await.unwrap();
        assert!(before.is_empty());
        assert!(after.is_empty());

        let (before, _) = db.get_dialog_context(&ep.id, 6, 6, 3, 3).await.unwrap();
        assert_eq!(
            before.iter().map(|d| d.pos).collect::<Vec<_>>(),
            vec![3, 4, 5]
        );
    }

    #[tokio::test]
    async fn publications_group_series() {
        let db = Database::memory().await.unwrap();
        for ep in [
            episode("xfm", 2, 1, &["x"]),
            episode("xfm", 1, 1, &["x"]),
            episode("xfm", 1, 2, &["x"]),
            episode("peepshow", 8, 6, &["x"]),
        ] {
            db.import_episode(&ep).await.unwrap();
        }
        assert_eq!(
            db.list_publications().await.unwrap(),
            vec![
                Publication {
                    name: "peepshow".to_owned(),
                    series: vec![8]
                },
                Publication {
                    name: "xfm".to_owned(),
                    series: vec![1, 2]
                },
            ]
        );
    }

    #[tokio::test]
    async fn video_for_episode() {
        let db = Database::memory().await.unwrap();
        let ep = episode("show", 1, 2, &["one"]);
        db.import_episode(&ep).await.unwrap();
        assert_eq!(
            db.episode_video(&ep.id).await.unwrap().as_deref(),
            Some("show-S01E02.webm")
        );
        let missing = EpisodeId::new("show", 9, 9).unwrap();
        assert_eq!(db.episode_video(&missing).await.unwrap(), None);
    }

    #[tokio::test]
    async fn ingest_records_manifest_with_rows() {
        let db = Database::memory().await.unwrap();
        let ep = episode("show", 1, 2, &["one", "two", "three"]);
        let t0 = UNIX_EPOCH + Duration::from_secs(1000);

        let res = db.ingest_episode(&ep, "/m/show-S01E02.srt", t0).await.unwrap();
        assert_eq!(res, (ImportOutcome::Inserted, ManifestOutcome::Created));
        assert_eq!(db.get_manifest().await.unwrap().len(), 1);

        let res = db.ingest_episode(&ep, "/m/show-S01E02.srt", t0).await.unwrap();
        assert_eq!(res, (ImportOutcome::Unchanged, ManifestOutcome::Noop));

        let newer = episode("show", 1, 2, &["one", "two"]);
        let t1 = t0 + Duration::from_secs(1);
        let res = db
            .ingest_episode(&newer, "/m/show-S01E02.srt", t1)
            .await
            .unwrap();
        assert_eq!(res, (ImportOutcome::Replaced, ManifestOutcome::Updated));
        assert_eq!(db.get_dialog_range(&ep.id, 1, 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn large_episode_spans_chunks() {
        let db = Database::memory().await.unwrap();
        let text = (0..250).map(|i| format!("line {}", i)).collect::<Vec<_>>();
        let refs = text.iter().map(|s| s.as_str()).collect::<Vec<_>>();
        let ep = episode("show", 1, 1, &refs);
        db.import_episode(&ep).await.unwrap();
        let all = db.get_dialog_range(&ep.id, 1, 1000).await.unwrap();
        assert_eq!(all, ep.dialog);
    }
}
