use std::path::PathBuf;

mod connect;
mod migration;

pub use connect::QuoteclipDbConnectOptions;
pub(crate) use migration::run_migrations;
pub use migration::{migration_status, MigrationRecord};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseSource {
    Memory,
    Url(String),
    Path(PathBuf),
}

impl std::fmt::Display for DatabaseSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseSource::Memory => f.write_str("sqlite::memory:"),
            DatabaseSource::Url(u) => f.write_str(u),
            DatabaseSource::Path(p) => write!(f, "sqlite:{}", p.display()),
        }
    }
}
