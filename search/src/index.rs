use std::{
    collections::BTreeSet,
    path::Path,
    str::FromStr,
    sync::{Arc, Mutex},
    time::Duration,
};

use quoteclip_core::{
    duration::format_short_timestamp,
    identifiers::{EpisodeId, MediaId},
    Episode,
};
use serde::{Deserialize, Serialize};
use tantivy::{
    collector::TopDocs,
    directory::MmapDirectory,
    doc,
    query::TermQuery,
    schema::{Field, IndexRecordOption, Value},
    Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, TantivyError,
    Term as IndexTerm,
};

use crate::{
    query::{compile::compile, parse, strip_offset, Term},
    schema::{create_schema, Fields, SchemaField},
    SearchError, MAX_LISTED_TERMS,
};

const WRITER_HEAP_BYTES: usize = 50_000_000;
const MAX_TIE_FETCH: usize = 1000;

/// One dialog line as it goes into the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogDocument {
    pub episode: EpisodeId,
    pub pos: u32,
    pub start: Duration,
    pub end: Duration,
    pub content: String,
    pub video_file_name: String,
}

impl DialogDocument {
    pub fn media_id(&self) -> MediaId {
        MediaId::single(self.episode.clone(), self.pos)
    }
}

pub fn episode_documents(episode: &Episode) -> Vec<DialogDocument> {
    episode
        .dialog
        .iter()
        .map(|d| DialogDocument {
            episode: episode.id.clone(),
            pos: d.pos,
            start: d.start,
            end: d.end,
            content: d.content.clone(),
            video_file_name: episode.video_file.clone(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: MediaId,
    pub score: f32,
    pub start: Duration,
    pub end: Duration,
    pub content: String,
    pub video_file_name: String,
}

impl SearchResult {
    pub fn episode(&self) -> &EpisodeId {
        &self.id.episode
    }

    /// `S##E##`
    pub fn label(&self) -> String {
        self.id.episode.label()
    }

    pub fn start_timestamp(&self) -> String {
        format_short_timestamp(self.start)
    }

    pub fn end_timestamp(&self) -> String {
        format_short_timestamp(self.end)
    }
}

/// The full text index of dialog lines.
///
/// Clones share one writer. Writes become visible to searches only after
/// [`SearchIndex::refresh_snapshot`].
#[derive(Clone)]
pub struct SearchIndex {
    index: Index,
    reader: IndexReader,
    writer: Arc<Mutex<IndexWriter>>,
    fields: Fields,
}

impl std::fmt::Debug for SearchIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchIndex")
            .field("docs", &self.doc_count())
            .finish()
    }
}

impl SearchIndex {
    pub fn open_or_create<P: AsRef<Path>>(path: P) -> Result<SearchIndex, SearchError> {
        let index_dir = path.as_ref();
        std::fs::create_dir_all(index_dir)?;
        log::trace!("opening search index at: {:?}", index_dir);
        let dir = MmapDirectory::open(index_dir).map_err(TantivyError::from)?;
        SearchIndex::from_index(Index::open_or_create(dir, create_schema())?)
    }

    pub fn memory() -> Result<SearchIndex, SearchError> {
        SearchIndex::from_index(Index::create_in_ram(create_schema()))
    }

    fn from_index(index: Index) -> Result<SearchIndex, SearchError> {
        let fields = Fields::new(&index.schema());
        let writer: IndexWriter = index.writer(WRITER_HEAP_BYTES)?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        Ok(SearchIndex {
            index,
            reader,
            writer: Arc::new(Mutex::new(writer)),
            fields,
        })
    }

    /// Add documents, first removing every document of the episodes they
    /// belong to when `delete_first` is set.
    pub fn upsert(&self, docs: &[DialogDocument], delete_first: bool) -> Result<(), SearchError> {
        let writer = self.writer.lock().map_err(|_| SearchError::WriterPoisoned)?;
        if delete_first {
            let episodes = docs
                .iter()
                .map(|d| d.episode.to_string())
                .collect::<BTreeSet<_>>();
            for ep in episodes {
                log::trace!("removing indexed dialog for {}", ep);
                writer.delete_term(IndexTerm::from_field_text(self.fields.episode_id, &ep));
            }
        }
        let f = &self.fields;
        for d in docs {
            writer.add_document(doc!(
                f.id => d.media_id().to_string(),
                f.episode_id => d.episode.to_string(),
                f.publication => d.episode.publication.as_str(),
                f.series => u64::from(d.episode.series),
                f.episode => u64::from(d.episode.episode),
                f.pos => u64::from(d.pos),
                f.start_ms => d.start.as_millis() as u64,
                f.end_ms => d.end.as_millis() as u64,
                f.content => d.content.as_str(),
                f.video_file_name => d.video_file_name.as_str(),
            ))?;
        }
        Ok(())
    }

    /// Remove every document of `episode`. Takes effect at the next
    /// refresh, together with any documents added after it.
    pub fn delete_episode(&self, episode: &EpisodeId) -> Result<(), SearchError> {
        let writer = self.writer.lock().map_err(|_| SearchError::WriterPoisoned)?;
        log::trace!("removing indexed dialog for {}", episode);
        writer.delete_term(IndexTerm::from_field_text(
            self.fields.episode_id,
            &episode.to_string(),
        ));
        Ok(())
    }

    /// Commit pending writes and point searches at them.
    pub fn refresh_snapshot(&self) -> Result<(), SearchError> {
        {
            let mut writer = self.writer.lock().map_err(|_| SearchError::WriterPoisoned)?;
            writer.commit()?;
        }
        self.reader.reload()?;
        log::debug!("search index refreshed, {} documents", self.doc_count());
        Ok(())
    }

    /// One page of results, best first, ties in episode and position order.
    pub fn search(
        &self,
        terms: &[Term],
        page_size: usize,
        offset: usize,
    ) -> Result<Vec<SearchResult>, SearchError> {
        if page_size == 0 {
            return Ok(Vec::new());
        }
        let query = compile(&self.index, &self.fields, terms)?;
        let searcher = self.reader.searcher();
        let limit = offset.saturating_add(page_size);
        let max_fetch = MAX_TIE_FETCH.max(limit);

        // keep widening until the tie group at the page boundary is complete,
        // otherwise equal scores would page in collector order
        let mut fetch = limit;
        let top_docs = loop {
            let top = searcher.search(query.as_ref(), &TopDocs::with_limit(fetch))?;
            let boundary_tied = top.len() == fetch
                && top.get(limit - 1).map(|d| d.0) == top.last().map(|d| d.0);
            if !boundary_tied || fetch >= max_fetch {
                break top;
            }
            fetch = fetch.saturating_mul(2).min(max_fetch);
        };

        let mut results = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc: TantivyDocument = searcher.doc(address)?;
            results.push(self.to_result(score, &doc)?);
        }
        results.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| (&a.id.episode, a.id.start()).cmp(&(&b.id.episode, b.id.start())))
        });
        Ok(results.into_iter().skip(offset).take(page_size).collect())
    }

    /// Parse query text and search it, honoring any `>N` offset in the text.
    pub fn search_text(
        &self,
        text: &str,
        page_size: usize,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let (terms, offset) = strip_offset(parse(text)?);
        self.search(&terms, page_size, offset.unwrap_or(0) as usize)
    }

    pub fn get(&self, id: &MediaId) -> Result<Option<SearchResult>, SearchError> {
        let query = TermQuery::new(
            IndexTerm::from_field_text(self.fields.id, &id.to_string()),
            IndexRecordOption::Basic,
        );
        let searcher = self.reader.searcher();
        match searcher.search(&query, &TopDocs::with_limit(1))?.first() {
            Some((score, address)) => {
                let doc: TantivyDocument = searcher.doc(*address)?;
                Ok(Some(self.to_result(*score, &doc)?))
            }
            None => Ok(None),
        }
    }

    /// Every distinct value of a keyword field, sorted.
    pub fn list_terms(&self, field_name: &str) -> Result<Vec<String>, SearchError> {
        let field = SchemaField::from_name(field_name)
            .filter(|f| f.is_keyword())
            .ok_or_else(|| SearchError::UnlistableField(field_name.to_owned()))?;
        let field = self.fields.get(field);

        let searcher = self.reader.searcher();
        let mut terms = BTreeSet::new();
        for segment_reader in searcher.segment_readers() {
            let inverted_index = segment_reader.inverted_index(field)?;
            let mut stream = inverted_index.terms().stream()?;
            while stream.advance() {
                terms.insert(String::from_utf8_lossy(stream.key()).into_owned());
                if terms.len() > MAX_LISTED_TERMS {
                    return Err(SearchError::TooManyTerms {
                        field: field_name.to_owned(),
                        limit: MAX_LISTED_TERMS,
                    });
                }
            }
        }
        Ok(terms.into_iter().collect())
    }

    pub fn doc_count(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    fn to_result(&self, score: f32, doc: &TantivyDocument) -> Result<SearchResult, SearchError> {
        let f = &self.fields;
        let text = |field: Field, name: &'static str| {
            doc.get_first(field)
                .and_then(|v| v.as_str())
                .map(str::to_owned)
                .ok_or(SearchError::MissingField(name))
        };
        let ms = |field: Field, name: &'static str| {
            doc.get_first(field)
                .and_then(|v| v.as_u64())
                .map(Duration::from_millis)
                .ok_or(SearchError::MissingField(name))
        };
        Ok(SearchResult {
            id: MediaId::from_str(&text(f.id, "id")?)?,
            score,
            start: ms(f.start_ms, "start_ms")?,
            end: ms(f.end_ms, "end_ms")?,
            content: text(f.content, "content")?,
            video_file_name: text(f.video_file_name, "video_file_name")?,
        })
    }
}
