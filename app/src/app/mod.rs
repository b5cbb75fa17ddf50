use std::sync::Arc;

use database::Database;
use quoteclip_core::srt::{SrtOptions, DEFAULT_MAX_DURATION};
use search::SearchIndex;

use crate::{
    controller::{Controller, InteractionGateway},
    ffmpeg::{FFmpegTranscoder, Transcoder},
    ingest::Ingester,
    media_cache::MediaCache,
    render::{RenderPaths, Renderer},
    QuoteclipAppError,
};

mod quoteclip_config;

pub use quoteclip_config::{ConfigBuilder, ConfigError, QuoteclipConfig};

#[derive(Debug)]
pub struct QuoteclipBuilder {
    pub config: ConfigBuilder,
}

impl QuoteclipBuilder {
    pub fn new() -> Result<Self, ConfigError> {
        Ok(QuoteclipBuilder {
            config: ConfigBuilder::new()?.load_environment(true),
        })
    }

    pub async fn build(self) -> Result<QuoteclipApp, QuoteclipAppError> {
        let config = self.config.build()?;
        QuoteclipApp::open(config).await
    }
}

/// The stores, plus the configuration to build everything else from.
#[derive(Debug)]
pub struct QuoteclipApp {
    pub db: Database,
    pub index: SearchIndex,
    pub config: QuoteclipConfig,
}

impl QuoteclipApp {
    /// Create any missing directories, then open the database and index.
    pub async fn open(config: QuoteclipConfig) -> Result<QuoteclipApp, QuoteclipAppError> {
        for dir in [
            config.media_path(),
            config.cache_path(),
            config.metadata_path(),
            config.index_path(),
            config.var_path(),
        ] {
            std::fs::create_dir_all(dir)?;
        }
        let db = Database::connect(&config.database_connection_opts()?).await?;
        log::debug!("loading search index from: {:?}", config.index_path());
        let index = SearchIndex::open_or_create(config.index_path())?;
        let app = QuoteclipApp { db, index, config };
        log::trace!("{:#?}", app);
        Ok(app)
    }

    pub fn srt_options(&self) -> SrtOptions {
        SrtOptions {
            max_duration: DEFAULT_MAX_DURATION,
            eliminate_gaps: self.config.eliminate_gaps(),
        }
    }

    pub fn ingester(&self) -> Ingester {
        Ingester::new(
            self.db.clone(),
            self.index.clone(),
            self.config.media_path().to_path_buf(),
            self.config.metadata_path().to_path_buf(),
            self.srt_options(),
        )
    }

    /// ffmpeg, as configured.
    pub fn transcoder(&self) -> Arc<dyn Transcoder> {
        Arc::new(FFmpegTranscoder::new(self.config.ffmpeg()))
    }

    pub fn renderer(&self, transcoder: Arc<dyn Transcoder>) -> Result<Renderer, QuoteclipAppError> {
        let cache = MediaCache::new(self.config.cache_path())?;
        Ok(Renderer::new(
            transcoder,
            cache,
            RenderPaths {
                media: self.config.media_path().to_path_buf(),
                fonts: self.config.font_path(),
                overlays: self.config.overlay_path(),
            },
            self.config.max_clip_duration(),
            self.config.render_timeout(),
        ))
    }

    pub fn controller(
        &self,
        renderer: Arc<Renderer>,
        gateway: Arc<dyn InteractionGateway>,
    ) -> Controller {
        Controller::new(
            self.db.clone(),
            self.index.clone(),
            renderer,
            gateway,
            self.config.bot_user_id().map(str::to_owned),
        )
    }
}
