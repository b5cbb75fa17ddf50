pub mod app;
pub mod controller;
pub mod ffmpeg;
pub mod ingest;
pub mod media_cache;
pub mod preview;
pub mod render;

#[derive(Debug, thiserror::Error)]
pub enum QuoteclipAppError {
    #[error(transparent)]
    Database(#[from] database::DatabaseError),
    #[error(transparent)]
    Search(#[from] search::SearchError),
    #[error(transparent)]
    Config(#[from] app::ConfigError),
    #[error(transparent)]
    Cache(#[from] media_cache::CacheError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
