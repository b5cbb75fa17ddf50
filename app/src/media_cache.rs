//! A flat directory of rendered clips, one file per key.
//!
//! Concurrent producers of the same key are kept apart in two ways: within
//! this process a per-key mutex serializes callers, and across processes the
//! file is created with `O_EXCL` and held under an exclusive `flock` while it
//! is written. Readers take a shared lock, so they wait for a writer to
//! finish. Nothing is ever evicted here.
use std::{
    collections::HashMap,
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("invalid cache key: {0:?}")]
    InvalidKey(String),
}

/// How a request was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    /// Produced and stored.
    Miss,
    /// Produced without touching the cache.
    Bypass,
}

/// Makes the bytes for a key when they are not cached.
#[async_trait]
pub trait CacheProducer: Send + Sync {
    type Error: From<CacheError> + Send;

    async fn produce(&self) -> Result<Vec<u8>, Self::Error>;
}

type KeyLocks = Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>;

#[derive(Debug, Clone)]
pub struct MediaCache {
    root: PathBuf,
    in_flight: KeyLocks,
}

fn valid_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('.')
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

#[cfg(unix)]
fn flock(file: &std::fs::File, op: libc::c_int) -> std::io::Result<()> {
    use std::os::unix::io::AsRawFd;
    // Safety: the descriptor belongs to `file`, which outlives the call.
    let ret = unsafe { libc::flock(file.as_raw_fd(), op) };
    if ret == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(unix)]
fn lock_shared(file: &std::fs::File) -> std::io::Result<()> {
    flock(file, libc::LOCK_SH)
}

#[cfg(unix)]
fn lock_exclusive(file: &std::fs::File) -> std::io::Result<()> {
    flock(file, libc::LOCK_EX)
}

#[cfg(not(unix))]
fn lock_shared(_file: &std::fs::File) -> std::io::Result<()> {
    Ok(())
}

#[cfg(not(unix))]
fn lock_exclusive(_file: &std::fs::File) -> std::io::Result<()> {
    Ok(())
}

async fn blocking<T, F>(f: F) -> std::io::Result<T>
where
    F: FnOnce() -> std::io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?
}

/// Removes a half written cache file unless it was completed.
struct PartialFile {
    path: Option<PathBuf>,
}

impl PartialFile {
    fn complete(mut self) {
        self.path = None;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if let Some(p) = self.path.take() {
            log::debug!("removing incomplete cache entry {:?}", p);
            if let Err(e) = std::fs::remove_file(&p) {
                log::warn!("unable to remove incomplete cache entry {:?}: {}", p, e);
            }
        }
    }
}

enum Lookup {
    Found(Vec<u8>),
    /// Left behind by a writer that never finished.
    Empty,
    Missing,
}

enum Opened {
    Writable(std::fs::File),
    /// Someone else completed the entry while we waited for the lock.
    Filled(Vec<u8>),
}

/// Create the entry, or with `reclaim` take over an existing empty one, and
/// hold it under an exclusive lock.
fn open_entry(path: &Path, reclaim: bool) -> std::io::Result<Opened> {
    if !reclaim {
        let f = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;
        lock_exclusive(&f)?;
        return Ok(Opened::Writable(f));
    }
    let mut f = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)?;
    lock_exclusive(&f)?;
    let mut bytes = Vec::new();
    std::io::Read::read_to_end(&mut f, &mut bytes)?;
    if !bytes.is_empty() {
        return Ok(Opened::Filled(bytes));
    }
    f.set_len(0)?;
    Ok(Opened::Writable(f))
}

impl MediaCache {
    pub fn new<P: Into<PathBuf>>(root: P) -> Result<MediaCache, CacheError> {
        let root: PathBuf = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(MediaCache {
            root,
            in_flight: Default::default(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &str) -> Result<PathBuf, CacheError> {
        if !valid_key(key) {
            return Err(CacheError::InvalidKey(key.to_owned()));
        }
        Ok(self.root.join(key))
    }

    fn key_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(key.to_owned()).or_default().clone()
    }

    fn release_key(&self, key: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        drop(lock);
        // the map holds one reference, anyone still waiting holds another
        if locks.get(key).map(Arc::strong_count) == Some(1) {
            locks.remove(key);
        }
    }

    /// Write the bytes for `key` into `sink`, producing them if needed.
    pub async fn get<W, P>(
        &self,
        key: &str,
        sink: &mut W,
        no_cache: bool,
        producer: &P,
    ) -> Result<CacheStatus, P::Error>
    where
        W: AsyncWrite + Unpin + Send,
        P: CacheProducer + ?Sized,
    {
        if no_cache {
            log::trace!("cache bypass for {}", key);
            let bytes = producer.produce().await?;
            write_sink(sink, &bytes).await?;
            return Ok(CacheStatus::Bypass);
        }
        let path = self.path_for(key)?;

        let lock = self.key_lock(key);
        let status = {
            let _guard = lock.lock().await;
            self.get_locked(&path, sink, producer).await
        };
        self.release_key(key, lock);
        status
    }

    async fn get_locked<W, P>(
        &self,
        path: &Path,
        sink: &mut W,
        producer: &P,
    ) -> Result<CacheStatus, P::Error>
    where
        W: AsyncWrite + Unpin + Send,
        P: CacheProducer + ?Sized,
    {
        let reclaim = match read_entry(path).await {
            Ok(Lookup::Found(bytes)) => {
                log::debug!("cache hit {:?}", path);
                write_sink(sink, &bytes).await?;
                return Ok(CacheStatus::Hit);
            }
            Ok(Lookup::Missing) => false,
            Ok(Lookup::Empty) => {
                log::info!("reclaiming empty cache entry {:?}", path);
                true
            }
            Err(e) => {
                log::warn!("cache unavailable for {:?}, producing directly: {}", path, e);
                return direct(sink, producer).await;
            }
        };

        let opened = {
            let p = path.to_path_buf();
            blocking(move || open_entry(&p, reclaim)).await
        };
        let mut file = match opened {
            Ok(Opened::Writable(f)) => f,
            Ok(Opened::Filled(bytes)) => {
                write_sink(sink, &bytes).await?;
                return Ok(CacheStatus::Hit);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                // another process won the race, its entry is complete once
                // we can take the shared lock
                log::debug!("cache entry {:?} is being written elsewhere", path);
                return match read_entry(path).await {
                    Ok(Lookup::Found(bytes)) => {
                        write_sink(sink, &bytes).await?;
                        Ok(CacheStatus::Hit)
                    }
                    _ => direct(sink, producer).await,
                };
            }
            Err(e) => {
                log::warn!("unable to create cache entry {:?}: {}", path, e);
                return direct(sink, producer).await;
            }
        };
        let partial = PartialFile {
            path: Some(path.to_path_buf()),
        };

        let bytes = producer.produce().await?;
        write_sink(sink, &bytes).await?;

        let stored = blocking(move || {
            file.write_all(&bytes)?;
            file.sync_data()?;
            // closing the file releases the lock
            drop(file);
            Ok(())
        })
        .await;
        match stored {
            Ok(()) => {
                partial.complete();
                log::debug!("cache stored {:?}", path);
                Ok(CacheStatus::Miss)
            }
            Err(e) => {
                log::warn!("unable to store cache entry {:?}: {}", path, e);
                drop(partial);
                Ok(CacheStatus::Bypass)
            }
        }
    }
}

async fn direct<W, P>(sink: &mut W, producer: &P) -> Result<CacheStatus, P::Error>
where
    W: AsyncWrite + Unpin + Send,
    P: CacheProducer + ?Sized,
{
    let bytes = producer.produce().await?;
    write_sink(sink, &bytes).await?;
    Ok(CacheStatus::Bypass)
}

async fn write_sink<W>(sink: &mut W, bytes: &[u8]) -> Result<(), CacheError>
where
    W: AsyncWrite + Unpin + Send,
{
    sink.write_all(bytes).await?;
    sink.flush().await?;
    Ok(())
}

/// Read a complete entry under a shared lock. A writer holds its lock until
/// the bytes are in, so an empty file here was abandoned.
async fn read_entry(path: &Path) -> std::io::Result<Lookup> {
    let p = path.to_path_buf();
    blocking(move || {
        let mut f = match std::fs::File::open(&p) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Lookup::Missing),
            Err(e) => return Err(e),
        };
        lock_shared(&f)?;
        let mut bytes = Vec::new();
        std::io::Read::read_to_end(&mut f, &mut bytes)?;
        if bytes.is_empty() {
            return Ok(Lookup::Empty);
        }
        Ok(Lookup::Found(bytes))
    })
    .await
}
