use std::path::PathBuf;

use anyhow::Context;
use app::app::{ConfigBuilder, QuoteclipApp, QuoteclipBuilder, QuoteclipConfig};
use clap::{Parser, Subcommand};

use super::{ingest::IngestCommand, render::RenderCommand, search::SearchCommand};

pub fn get_args() -> CliOpts {
    CliOpts::parse()
}

#[derive(Parser, Debug)]
#[command(version = clap::crate_version!(), about = "Search subtitles and render clips")]
pub struct CliOpts {
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(flatten)]
    pub cfg: AppConfig,

    #[command(subcommand)]
    pub subcmd: SubCommand,
}

#[derive(Subcommand, Debug)]
pub enum SubCommand {
    /// Load new and changed subtitle files from the media directory
    Ingest(IngestCommand),

    /// Run a query against the search index
    Search(SearchCommand),

    /// Render one clip to a file
    Render(RenderCommand),

    /// List every publication and its series
    Publications,

    /// Show the configuration after files, environment, and flags are applied
    ShowConfig,
}

/// Overrides for the configuration file and `QUOTECLIP_*` environment.
#[derive(Parser, Debug)]
pub struct AppConfig {
    /// Read this configuration file instead of the one in the user config dir
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory of video and subtitle files
    #[arg(long, global = true)]
    pub media_path: Option<PathBuf>,

    /// Directory for rendered clips
    #[arg(long, global = true)]
    pub cache_path: Option<PathBuf>,

    /// Directory for the search index
    #[arg(long, global = true)]
    pub index_path: Option<PathBuf>,

    /// Directory for the database, fonts, and overlays
    #[arg(long, global = true)]
    pub var_path: Option<PathBuf>,

    /// Path to sqlite database file, or a `sqlite:` url
    #[arg(long, global = true)]
    pub database: Option<String>,

    /// ffmpeg binary to use instead of the one on PATH
    #[arg(long, global = true)]
    pub ffmpeg: Option<PathBuf>,
}

impl AppConfig {
    fn config_builder(&self, watch: bool) -> anyhow::Result<ConfigBuilder> {
        Ok(ConfigBuilder::new()?
            .load_environment(true)
            .config_file(self.config.as_deref())?
            .media_path(self.media_path.as_deref())?
            .cache_path(self.cache_path.as_deref())?
            .index_path(self.index_path.as_deref())?
            .var_path(self.var_path.as_deref())?
            .database(self.database.as_deref())?
            .ffmpeg_override(self.ffmpeg.as_deref())?
            .watch(watch)?)
    }

    pub fn build_config(&self) -> anyhow::Result<QuoteclipConfig> {
        self.config_builder(false)?
            .build()
            .context("could not load configuration")
    }

    pub async fn build_app(&self) -> anyhow::Result<QuoteclipApp> {
        self.build_app_with_watch(false).await
    }

    pub async fn build_app_with_watch(&self, watch: bool) -> anyhow::Result<QuoteclipApp> {
        QuoteclipBuilder {
            config: self.config_builder(watch)?,
        }
        .build()
        .await
        .context("could not open quoteclip stores")
    }
}
