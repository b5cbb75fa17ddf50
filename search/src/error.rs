use quoteclip_core::identifiers::MediaIdError;
use tantivy::TantivyError;
use thiserror::Error;

use crate::query::QueryError;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("tantivy error: {0}")]
    Tantivy(#[from] TantivyError),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    MediaId(#[from] MediaIdError),
    #[error("field `{field}` has more than {limit} terms")]
    TooManyTerms { field: String, limit: usize },
    #[error("field `{0}` can not be listed")]
    UnlistableField(String),
    #[error("indexed document is missing `{0}`")]
    MissingField(&'static str),
    #[error("index writer lock was poisoned")]
    WriterPoisoned,
}
