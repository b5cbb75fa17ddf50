mod error;
mod index;
pub mod query;
mod schema;

pub use error::SearchError;
pub use index::{episode_documents, DialogDocument, SearchIndex, SearchResult};
pub use query::{parse, strip_offset, QueryError, Term, Terms};
pub use schema::SchemaField;

/// Results per page unless a caller asks otherwise.
pub const DEFAULT_PAGE_SIZE: usize = 10;
/// `list_terms` refuses to enumerate more distinct values than this.
pub const MAX_LISTED_TERMS: usize = 100;
