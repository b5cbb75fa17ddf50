use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use camino::{Utf8Path, Utf8PathBuf};
use database::{DatabaseError, QuoteclipDbConnectOptions};
use serde::{Deserialize, Serialize};

use crate::ffmpeg::FFMpegBinary;

const QUALIFIER: &str = "io";
const ORGANIZATION: &str = "vauntware";
const APP: &str = "quoteclip";
const APP_CAPS: &str = "QUOTECLIP";

const MEDIA_PATH_KEY: &str = "media_path";
const MEDIA_DIR: &str = "media";
const CACHE_PATH_KEY: &str = "cache_path";
const CACHE_DIR: &str = "cache";
const METADATA_PATH_KEY: &str = "metadata_path";
const METADATA_DIR: &str = "metadata";
const INDEX_PATH_KEY: &str = "index_path";
const INDEX_DIR: &str = "index";
const VAR_PATH_KEY: &str = "var_path";
const VAR_DIR: &str = "var";

const DATABASE_KEY: &str = "db";
const DEFAULT_DB_NAME: &str = "quoteclip.db";
const FONT_PATH_KEY: &str = "font_path";
const FONT_DIR: &str = "fonts";
const OVERLAY_PATH_KEY: &str = "overlay_path";
const OVERLAY_DIR: &str = "overlays";

const GATEWAY_TOKEN_KEY: &str = "gateway_token";
const BOT_USER_ID_KEY: &str = "bot_user_id";
const WATCH_KEY: &str = "watch";
const FFMPEG_CMD_KEY: &str = "ffmpeg";
const MAX_CLIP_DURATION_KEY: &str = "max_clip_duration";
const RENDER_TIMEOUT_KEY: &str = "render_timeout";
const ELIMINATE_GAPS_KEY: &str = "eliminate_gaps";

const DEFAULT_MAX_CLIP_SECS: u64 = 20;
const DEFAULT_RENDER_TIMEOUT_SECS: u64 = 30;

const DEFAULT_CONFIG_FILE: &str = "quoteclip.toml";

type ExtConfigBuilder = config::ConfigBuilder<config::builder::DefaultState>;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    ConfigError(#[from] config::ConfigError),
    #[error("unable to get user home directory")]
    NoUserHome,
    #[error("path is not utf8: {:?}", _0)]
    NonUtf8Path(PathBuf),
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
}

fn camino_path(std_path: &Path) -> Result<&Utf8Path, ConfigError> {
    Utf8Path::from_path(std_path).ok_or_else(|| ConfigError::NonUtf8Path(std_path.to_path_buf()))
}

fn new_config_builder(data_dir: &Utf8Path) -> Result<ExtConfigBuilder, ConfigError> {
    Ok(config::Config::builder()
        .set_default(MEDIA_PATH_KEY, data_dir.join(MEDIA_DIR).as_str())?
        .set_default(CACHE_PATH_KEY, data_dir.join(CACHE_DIR).as_str())?
        .set_default(METADATA_PATH_KEY, data_dir.join(METADATA_DIR).as_str())?
        .set_default(INDEX_PATH_KEY, data_dir.join(INDEX_DIR).as_str())?
        .set_default(VAR_PATH_KEY, data_dir.join(VAR_DIR).as_str())?
        .set_default(DATABASE_KEY, Option::<&str>::None)?
        .set_default(FONT_PATH_KEY, Option::<&str>::None)?
        .set_default(OVERLAY_PATH_KEY, Option::<&str>::None)?
        .set_default(GATEWAY_TOKEN_KEY, Option::<&str>::None)?
        .set_default(BOT_USER_ID_KEY, Option::<&str>::None)?
        .set_default(FFMPEG_CMD_KEY, Option::<&str>::None)?
        .set_default(WATCH_KEY, false)?
        .set_default(MAX_CLIP_DURATION_KEY, DEFAULT_MAX_CLIP_SECS)?
        .set_default(RENDER_TIMEOUT_KEY, DEFAULT_RENDER_TIMEOUT_SECS)?
        .set_default(ELIMINATE_GAPS_KEY, true)?)
}

#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config_dir: Utf8PathBuf,
    config_path: Option<Utf8PathBuf>,
    load_environment: bool,
    config_builder: ExtConfigBuilder,
}

impl ConfigBuilder {
    #[cfg(test)]
    pub fn new_test_config(root: &Path) -> Result<QuoteclipConfig, ConfigError> {
        let root = camino_path(root)?;
        let data_dir = root.join("app_data_dir");
        let config = new_config_builder(&data_dir)?
            .set_override(FFMPEG_CMD_KEY, "no_ffmpeg_in_tests")?
            .set_override(BOT_USER_ID_KEY, "1000")?
            .build()?;
        QuoteclipConfig::from_config(config)
    }

    pub fn new() -> Result<Self, ConfigError> {
        let dirs = directories::ProjectDirs::from(QUALIFIER, ORGANIZATION, APP)
            .ok_or(ConfigError::NoUserHome)?;
        let data_dir = camino_path(dirs.data_dir())?;
        let config_dir = camino_path(dirs.config_dir())?.to_path_buf();
        Ok(Self {
            load_environment: false,
            config_path: None,
            config_dir,
            config_builder: new_config_builder(data_dir)?,
        })
    }

    /// Should we load configuration from the environment?
    pub fn load_environment(mut self, load_environment: bool) -> Self {
        self.load_environment = load_environment;
        self
    }

    fn set_path_override(mut self, key: &str, path: Option<&Path>) -> Result<Self, ConfigError> {
        let path_override = path.map(camino_path).transpose()?;
        let str_override = path_override.as_ref().map(|c| c.as_str());
        self.config_builder = self.config_builder.set_override_option(key, str_override)?;
        Ok(self)
    }

    pub fn config_file(mut self, config_file: Option<&Path>) -> Result<Self, ConfigError> {
        self.config_path = config_file
            .map(|p| camino_path(p).map(|p| p.to_path_buf()))
            .transpose()?;
        Ok(self)
    }

    pub fn media_path(self, path: Option<&Path>) -> Result<Self, ConfigError> {
        self.set_path_override(MEDIA_PATH_KEY, path)
    }

    pub fn cache_path(self, path: Option<&Path>) -> Result<Self, ConfigError> {
        self.set_path_override(CACHE_PATH_KEY, path)
    }

    pub fn index_path(self, path: Option<&Path>) -> Result<Self, ConfigError> {
        self.set_path_override(INDEX_PATH_KEY, path)
    }

    pub fn var_path(self, path: Option<&Path>) -> Result<Self, ConfigError> {
        self.set_path_override(VAR_PATH_KEY, path)
    }

    pub fn database(mut self, db: Option<&str>) -> Result<Self, ConfigError> {
        self.config_builder = self.config_builder.set_override_option(DATABASE_KEY, db)?;
        Ok(self)
    }

    pub fn ffmpeg_override(self, ffmpeg: Option<&Path>) -> Result<Self, ConfigError> {
        self.set_path_override(FFMPEG_CMD_KEY, ffmpeg)
    }

    /// Only a `true` flag overrides the file and environment.
    pub fn watch(mut self, watch: bool) -> Result<Self, ConfigError> {
        if watch {
            self.config_builder = self.config_builder.set_override(WATCH_KEY, true)?;
        }
        Ok(self)
    }

    pub fn build(mut self) -> Result<QuoteclipConfig, ConfigError> {
        let cfg_file = self
            .config_path
            .unwrap_or_else(|| self.config_dir.join(DEFAULT_CONFIG_FILE));

        if cfg_file.exists() {
            log::debug!("loading config file: {}", cfg_file);
            self.config_builder = self
                .config_builder
                .add_source(config::File::from(cfg_file.as_std_path()));
        }

        if self.load_environment {
            self.config_builder = self
                .config_builder
                .add_source(config::Environment::with_prefix(APP_CAPS).try_parsing(true))
        }

        let cfg = QuoteclipConfig::from_config(self.config_builder.build()?)?;
        log::trace!("{:#?}", cfg);
        Ok(cfg)
    }
}

/// Keeps a credential out of debug output.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("\"<redacted>\"")
    }
}

/// Every setting after layering, with the derived defaults still unresolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub media_path: PathBuf,
    pub cache_path: PathBuf,
    pub metadata_path: PathBuf,
    pub index_path: PathBuf,
    pub var_path: PathBuf,
    pub db: Option<String>,
    pub font_path: Option<PathBuf>,
    pub overlay_path: Option<PathBuf>,
    #[serde(skip_serializing)]
    pub gateway_token: Option<Secret>,
    pub bot_user_id: Option<String>,
    pub watch: bool,
    pub ffmpeg: Option<PathBuf>,
    pub max_clip_duration: u64,
    pub render_timeout: u64,
    pub eliminate_gaps: bool,
}

#[derive(Debug, Clone)]
pub struct QuoteclipConfig {
    settings: Settings,
}

impl QuoteclipConfig {
    fn from_config(inner: config::Config) -> Result<QuoteclipConfig, ConfigError> {
        let settings: Settings = inner.try_deserialize()?;
        if settings.max_clip_duration == 0 {
            return Err(ConfigError::ZeroDuration(MAX_CLIP_DURATION_KEY));
        }
        if settings.render_timeout == 0 {
            return Err(ConfigError::ZeroDuration(RENDER_TIMEOUT_KEY));
        }
        Ok(QuoteclipConfig { settings })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn database_path(&self) -> String {
        match &self.settings.db {
            Some(db) => db.clone(),
            None => self
                .settings
                .var_path
                .join(DEFAULT_DB_NAME)
                .to_string_lossy()
                .into_owned(),
        }
    }

    pub fn database_connection_opts(&self) -> Result<QuoteclipDbConnectOptions, DatabaseError> {
        QuoteclipDbConnectOptions::from_url(&self.database_path())
    }

    pub fn media_path(&self) -> &Path {
        &self.settings.media_path
    }
    pub fn cache_path(&self) -> &Path {
        &self.settings.cache_path
    }
    pub fn metadata_path(&self) -> &Path {
        &self.settings.metadata_path
    }
    pub fn index_path(&self) -> &Path {
        &self.settings.index_path
    }
    pub fn var_path(&self) -> &Path {
        &self.settings.var_path
    }
    pub fn font_path(&self) -> PathBuf {
        self.settings
            .font_path
            .clone()
            .unwrap_or_else(|| self.settings.var_path.join(FONT_DIR))
    }
    pub fn overlay_path(&self) -> PathBuf {
        self.settings
            .overlay_path
            .clone()
            .unwrap_or_else(|| self.settings.var_path.join(OVERLAY_DIR))
    }
    pub fn gateway_token(&self) -> Option<&str> {
        self.settings.gateway_token.as_ref().map(Secret::expose)
    }
    pub fn bot_user_id(&self) -> Option<&str> {
        self.settings.bot_user_id.as_deref()
    }
    pub fn watch(&self) -> bool {
        self.settings.watch
    }
    pub fn eliminate_gaps(&self) -> bool {
        self.settings.eliminate_gaps
    }
    pub fn max_clip_duration(&self) -> Duration {
        Duration::from_secs(self.settings.max_clip_duration)
    }
    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.render_timeout)
    }
    pub fn ffmpeg(&self) -> FFMpegBinary {
        FFMpegBinary::from(self.settings.ffmpeg.clone())
    }
}
