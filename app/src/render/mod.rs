//! Turning a media id and its settings into clip bytes.
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use quoteclip_core::{identifiers::MediaId, Dialog};

use crate::{
    ffmpeg::{TranscodeError, Transcoder},
    media_cache::{CacheError, CacheProducer, CacheStatus, MediaCache},
};

mod filters;
mod lock;
pub mod options;

pub use filters::{ClipWindow, FilterInput};
pub use lock::{LockError, RenderPermit, RenderRegistry};
pub use options::{ClipSettings, Mode, OutputFormat, Overlay, StickerOptions};

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error(transparent)]
    Transcode(#[from] TranscodeError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("no dialog to render for {0}")]
    NoDialog(MediaId),
    #[error("overlay image not found: {0}")]
    MissingOverlay(String),
    #[error("video file not found: {0:?}")]
    MissingVideo(PathBuf),
}

/// One clip to render.
#[derive(Debug, Clone)]
pub struct RenderRequest<'a> {
    /// Stable id of the user asking, the render lock key.
    pub user_id: &'a str,
    pub media_id: &'a MediaId,
    pub video_file: &'a str,
    pub dialog: &'a [Dialog],
    pub settings: &'a ClipSettings,
    pub overlays: &'a [Overlay],
    pub disable_cache: bool,
}

impl<'a> RenderRequest<'a> {
    /// `<media-id>.<extension>`
    pub fn cache_key(&self) -> String {
        format!("{}.{}", self.media_id, self.settings.format.extension())
    }

    pub fn cache_eligible(&self) -> bool {
        !(self.disable_cache || self.settings.is_customized() || !self.overlays.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct RenderedClip {
    pub media_id: MediaId,
    pub format: OutputFormat,
    pub bytes: Vec<u8>,
    pub cache: CacheStatus,
}

impl RenderedClip {
    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    pub fn file_name(&self) -> String {
        format!("{}.{}", self.media_id, self.format.extension())
    }
}

#[derive(Debug, Clone)]
pub struct RenderPaths {
    pub media: PathBuf,
    pub fonts: PathBuf,
    pub overlays: PathBuf,
}

pub struct Renderer {
    transcoder: Arc<dyn Transcoder>,
    cache: MediaCache,
    locks: RenderRegistry,
    paths: RenderPaths,
    max_clip: Duration,
    timeout: Duration,
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("cache", &self.cache.root())
            .field("paths", &self.paths)
            .field("max_clip", &self.max_clip)
            .field("timeout", &self.timeout)
            .finish()
    }
}

struct TranscodeJob<'a> {
    transcoder: &'a dyn Transcoder,
    args: Vec<String>,
    timeout: Duration,
}

#[async_trait]
impl<'a> CacheProducer for TranscodeJob<'a> {
    type Error = RenderError;

    async fn produce(&self) -> Result<Vec<u8>, RenderError> {
        match tokio::time::timeout(self.timeout, self.transcoder.transcode(self.args.clone())).await
        {
            Ok(r) => Ok(r?),
            Err(_) => {
                log::error!("transcode timed out after {:?}", self.timeout);
                Err(TranscodeError::Timeout(self.timeout).into())
            }
        }
    }
}

fn secs_arg(d: Duration) -> String {
    format!("{:.3}", d.as_secs_f64())
}

impl Renderer {
    pub fn new(
        transcoder: Arc<dyn Transcoder>,
        cache: MediaCache,
        paths: RenderPaths,
        max_clip: Duration,
        timeout: Duration,
    ) -> Renderer {
        Renderer {
            transcoder,
            cache,
            locks: RenderRegistry::new(),
            paths,
            max_clip,
            timeout,
        }
    }

    pub fn max_clip(&self) -> Duration {
        self.max_clip
    }

    pub fn locks(&self) -> &RenderRegistry {
        &self.locks
    }

    fn overlay_file(&self, overlay: &Overlay) -> PathBuf {
        self.paths.overlays.join(format!("{}.png", overlay.name))
    }

    /// The full transcoder argument vector for a request.
    pub fn build_args(&self, req: &RenderRequest<'_>) -> Result<Vec<String>, RenderError> {
        let window = ClipWindow::compute(req.dialog, req.settings, self.max_clip)
            .ok_or_else(|| RenderError::NoDialog(req.media_id.clone()))?;
        let video = self.paths.media.join(req.video_file);

        let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        args.extend([
            "-ss".to_owned(),
            secs_arg(window.start),
            "-t".to_owned(),
            secs_arg(window.duration()),
            "-i".to_owned(),
            path_arg(&video),
        ]);
        for overlay in req.overlays {
            args.push("-i".to_owned());
            args.push(path_arg(&self.overlay_file(overlay)));
        }

        let input = FilterInput {
            publication: &req.media_id.episode.publication,
            dialog: req.dialog,
            settings: req.settings,
            window,
            font_dir: &self.paths.fonts,
        };
        args.push("-filter_complex".to_owned());
        args.push(filters::filter_graph(&input, req.overlays, req.settings.format));
        args.extend(["-map".to_owned(), "[out]".to_owned(), "-an".to_owned()]);
        args.extend(filters::output_args(req.settings.format));
        Ok(args)
    }

    /// Render under the user's lock, through the cache when allowed.
    pub async fn render(&self, req: &RenderRequest<'_>) -> Result<RenderedClip, RenderError> {
        let _permit = self.locks.acquire(req.user_id, req.media_id)?;
        if req.dialog.is_empty() {
            return Err(RenderError::NoDialog(req.media_id.clone()));
        }
        let video = self.paths.media.join(req.video_file);
        if !tokio::fs::try_exists(&video).await.unwrap_or(false) {
            return Err(RenderError::MissingVideo(video));
        }
        for overlay in req.overlays {
            if !tokio::fs::try_exists(self.overlay_file(overlay))
                .await
                .unwrap_or(false)
            {
                return Err(RenderError::MissingOverlay(overlay.name.clone()));
            }
        }

        let job = TranscodeJob {
            transcoder: self.transcoder.as_ref(),
            args: self.build_args(req)?,
            timeout: self.timeout,
        };
        let key = req.cache_key();
        let mut bytes = Vec::new();
        log::debug!("rendering {} for {}", key, req.user_id);
        let cache = self
            .cache
            .get(&key, &mut bytes, !req.cache_eligible(), &job)
            .await?;
        log::info!("rendered {} ({:?}, {} bytes)", key, cache, bytes.len());
        Ok(RenderedClip {
            media_id: req.media_id.clone(),
            format: req.settings.format,
            bytes,
            cache,
        })
    }
}

fn path_arg(p: &Path) -> String {
    p.to_string_lossy().into_owned()
}
