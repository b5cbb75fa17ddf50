//! Keeping the dialog store and search index in step with the media
//! directory.
//!
//! Every pass compares the `*.srt` files on disk against the ingest
//! manifest, and feeds new or newer files through parse, metadata, store and
//! index. Each file is its own transaction: one bad file is logged and
//! skipped, the rest of the batch carries on.
use std::{
    borrow::Cow,
    path::{Path, PathBuf},
    time::Duration,
};

use database::{Database, DatabaseError, ManifestOutcome};
use quoteclip_core::{
    srt::{self, SrtError, SrtOptions},
    Episode,
};
use search::{episode_documents, SearchError, SearchIndex};

mod metadata;
mod scan;

pub use metadata::{metadata_file, write_metadata};
pub use scan::{parse_episode_filename, pending_files, scan_srt_files, video_file_name, SrtFile};

pub const POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const WATCH_BATCH_WINDOW: Duration = Duration::from_secs(2);
/// Publish index writes at least this often during a batch.
pub const REFRESH_EVERY: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error(transparent)]
    Search(#[from] SearchError),
    #[error(transparent)]
    Srt(#[from] SrtError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Watch(#[from] notify::Error),
    #[error("file name does not look like <publication>-S##E##.srt: {0:?}")]
    FileName(PathBuf),
    #[error("media directory {0:?} is not readable: {1}")]
    MediaDir(PathBuf, #[source] std::io::Error),
}

/// Tally of one pass over the media directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl IngestReport {
    pub fn total(&self) -> usize {
        self.created + self.updated + self.unchanged + self.failed
    }

    fn record(&mut self, outcome: ManifestOutcome) {
        match outcome {
            ManifestOutcome::Created => self.created += 1,
            ManifestOutcome::Updated => self.updated += 1,
            ManifestOutcome::Noop => self.unchanged += 1,
        }
    }
}

impl std::fmt::Display for IngestReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} unchanged, {} failed",
            self.created, self.updated, self.unchanged, self.failed
        )
    }
}

/// SRT files should be UTF-8 but are often WINDOWS-1252.
pub fn decode_srt_bytes<'a>(path: &Path, data: &'a [u8]) -> Cow<'a, str> {
    let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
    match std::str::from_utf8(data) {
        Ok(s) => Cow::Borrowed(s),
        Err(_) => {
            let (text, encoding, replacements) = encoding_rs::WINDOWS_1252.decode(data);
            if replacements {
                log::warn!(
                    "decoding {:?} as {} required replacements",
                    path,
                    encoding.name()
                );
            } else {
                log::warn!("{:?} is not utf8, decoded as {}", path, encoding.name());
            }
            text
        }
    }
}

#[derive(Debug, Clone)]
pub struct Ingester {
    db: Database,
    index: SearchIndex,
    media_path: PathBuf,
    metadata_path: PathBuf,
    srt_opts: SrtOptions,
}

impl Ingester {
    pub fn new(
        db: Database,
        index: SearchIndex,
        media_path: PathBuf,
        metadata_path: PathBuf,
        srt_opts: SrtOptions,
    ) -> Ingester {
        Ingester {
            db,
            index,
            media_path,
            metadata_path,
            srt_opts,
        }
    }

    pub fn media_path(&self) -> &Path {
        &self.media_path
    }

    /// Files whose modification time is ahead of the manifest.
    pub async fn pending(&self) -> Result<Vec<SrtFile>, IngestError> {
        let root = self.media_path.clone();
        let files = tokio::task::spawn_blocking(move || {
            scan_srt_files(&root).map_err(|e| IngestError::MediaDir(root.clone(), e))
        })
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))??;
        let manifest = self.db.get_manifest().await?;
        let pending = pending_files(files, &manifest);
        log::debug!("{} srt files pending ingest", pending.len());
        Ok(pending)
    }

    /// Read and parse one file into its episode record.
    pub async fn load_episode(&self, file: &SrtFile) -> Result<Episode, IngestError> {
        let name = file
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| IngestError::FileName(file.path.clone()))?;
        let id = parse_episode_filename(name).ok_or_else(|| IngestError::FileName(file.path.clone()))?;
        let data = tokio::fs::read(&file.path).await?;
        let text = decode_srt_bytes(&file.path, &data);
        let dialog = srt::parse_srt(&text, &self.srt_opts)?;
        Ok(Episode {
            id,
            srt_file: name.to_owned(),
            video_file: video_file_name(name),
            dialog,
        })
    }

    /// Parse, write metadata, then store and index in one step. Returns
    /// how the manifest classified the file.
    ///
    /// The episode's indexed dialog is always replaced as a whole, so an
    /// emptied file leaves nothing behind and a retried file never doubles
    /// up. If the index write fails the file is dropped from the manifest
    /// and the next pass tries it again.
    pub async fn ingest_file(&self, file: &SrtFile) -> Result<ManifestOutcome, IngestError> {
        let episode = self.load_episode(file).await?;
        write_metadata(&self.metadata_path, &episode)?;
        let (import, manifest) = self
            .db
            .ingest_episode(&episode, &file.key, file.mtime)
            .await?;
        log::trace!("{}: {:?} {:?}", episode.id, import, manifest);
        if manifest != ManifestOutcome::Noop {
            if let Err(e) = self.reindex(&episode) {
                self.forget(&file.key).await;
                return Err(e.into());
            }
        }
        Ok(manifest)
    }

    fn reindex(&self, episode: &Episode) -> Result<(), SearchError> {
        self.index.delete_episode(&episode.id)?;
        self.index.upsert(&episode_documents(episode), false)
    }

    async fn forget(&self, key: &str) {
        if let Err(e) = self.db.manifest_forget(key).await {
            log::error!("unable to drop {:?} from the ingest manifest: {}", key, e);
        }
    }

    /// Publish pending index writes. On failure the files written since the
    /// last refresh are dropped from the manifest, to be ingested again.
    async fn refresh(&self, changed: &mut Vec<String>) -> Result<(), IngestError> {
        let result = self.index.refresh_snapshot();
        if result.is_err() {
            for key in changed.iter() {
                self.forget(key).await;
            }
        }
        changed.clear();
        Ok(result?)
    }

    /// Ingest `files` in order, refreshing the index every
    /// [`REFRESH_EVERY`] files and once more at the end.
    pub async fn ingest_batch(&self, files: &[SrtFile]) -> Result<IngestReport, IngestError> {
        let mut report = IngestReport::default();
        let mut changed = Vec::new();
        for file in files {
            match self.ingest_file(file).await {
                Ok(outcome) => {
                    log::info!("ingested {:?}: {:?}", file.key, outcome);
                    report.record(outcome);
                    if outcome != ManifestOutcome::Noop {
                        changed.push(file.key.clone());
                    }
                }
                Err(e) => {
                    log::error!("unable to ingest {:?}: {}", file.path, e);
                    report.failed += 1;
                }
            }
            if changed.len() >= REFRESH_EVERY {
                self.refresh(&mut changed).await?;
            }
        }
        if !changed.is_empty() {
            self.refresh(&mut changed).await?;
        }
        Ok(report)
    }

    /// One full pass.
    pub async fn run_once(&self) -> Result<IngestReport, IngestError> {
        let pending = self.pending().await?;
        let report = self.ingest_batch(&pending).await?;
        if report.total() > 0 {
            log::info!("ingest pass complete: {}", report);
        }
        Ok(report)
    }

    /// A pass inside a long-running loop. Only an unreadable media directory
    /// ends the loop; anything else is logged and retried on the next pass.
    async fn run_pass(&self) -> Result<(), IngestError> {
        match self.run_once().await {
            Ok(_) => Ok(()),
            Err(e @ IngestError::MediaDir(_, _)) => Err(e),
            Err(e) => {
                log::error!("ingest pass failed, will retry: {}", e);
                Ok(())
            }
        }
    }

    /// Re-scan every `interval` until the media directory goes away.
    pub async fn poll(&self, interval: Duration) -> Result<(), IngestError> {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.run_pass().await?;
        }
    }

    /// Re-scan after filesystem changes, coalescing the events that arrive
    /// within `window` of the first one.
    pub async fn watch(&self, window: Duration) -> Result<(), IngestError> {
        use notify::Watcher;

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            // the receiver only goes away when we stop watching
            let _ = tx.send(res);
        })?;
        watcher.watch(&self.media_path, notify::RecursiveMode::Recursive)?;
        log::info!("watching {:?} for subtitle changes", self.media_path);

        self.run_pass().await?;
        while let Some(first) = rx.recv().await {
            let mut relevant = is_srt_event(first);
            let deadline = tokio::time::sleep(window);
            tokio::pin!(deadline);
            loop {
                tokio::select! {
                    _ = &mut deadline => break,
                    next = rx.recv() => match next {
                        Some(ev) => relevant |= is_srt_event(ev),
                        None => break,
                    },
                }
            }
            if relevant {
                self.run_pass().await?;
            }
        }
        Ok(())
    }

    pub async fn run(&self, watch: bool) -> Result<(), IngestError> {
        if watch {
            self.watch(WATCH_BATCH_WINDOW).await
        } else {
            self.poll(POLL_INTERVAL).await
        }
    }
}

fn is_srt_event(ev: notify::Result<notify::Event>) -> bool {
    match ev {
        Ok(ev) => ev.paths.iter().any(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("srt"))
                .unwrap_or(false)
        }),
        Err(e) => {
            log::warn!("filesystem watch error: {}", e);
            false
        }
    }
}
