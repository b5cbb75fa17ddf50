use tantivy::schema::{
    Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, FAST, INDEXED, STORED,
    STRING,
};

pub(crate) const CONTENT_TOKENIZER: &str = "en_stem";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaField {
    Id,
    EpisodeId,
    Publication,
    Series,
    Episode,
    Pos,
    StartMs,
    EndMs,
    Content,
    VideoFileName,
}

impl SchemaField {
    pub fn as_str(self) -> &'static str {
        match self {
            SchemaField::Id => "id",
            SchemaField::EpisodeId => "episode_id",
            SchemaField::Publication => "publication",
            SchemaField::Series => "series",
            SchemaField::Episode => "episode",
            SchemaField::Pos => "pos",
            SchemaField::StartMs => "start_ms",
            SchemaField::EndMs => "end_ms",
            SchemaField::Content => "content",
            SchemaField::VideoFileName => "video_file_name",
        }
    }

    pub fn from_name(name: &str) -> Option<SchemaField> {
        Some(match name {
            "id" => SchemaField::Id,
            "episode_id" => SchemaField::EpisodeId,
            "publication" => SchemaField::Publication,
            "series" => SchemaField::Series,
            "episode" => SchemaField::Episode,
            "pos" => SchemaField::Pos,
            "start_ms" => SchemaField::StartMs,
            "end_ms" => SchemaField::EndMs,
            "content" => SchemaField::Content,
            "video_file_name" => SchemaField::VideoFileName,
            _ => return None,
        })
    }

    /// Keyword fields have a term dictionary of whole values.
    pub fn is_keyword(self) -> bool {
        matches!(
            self,
            SchemaField::Id | SchemaField::EpisodeId | SchemaField::Publication
        )
    }
}

pub(crate) fn create_schema() -> Schema {
    let mut schema_builder = Schema::builder();

    let content_options = TextOptions::default()
        .set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(CONTENT_TOKENIZER)
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        )
        .set_stored();
    let number = || INDEXED | STORED | FAST;

    schema_builder.add_text_field(SchemaField::Id.as_str(), STRING | STORED);
    schema_builder.add_text_field(SchemaField::EpisodeId.as_str(), STRING | STORED);
    schema_builder.add_text_field(SchemaField::Publication.as_str(), STRING | STORED);
    schema_builder.add_u64_field(SchemaField::Series.as_str(), number());
    schema_builder.add_u64_field(SchemaField::Episode.as_str(), number());
    schema_builder.add_u64_field(SchemaField::Pos.as_str(), number());
    schema_builder.add_u64_field(SchemaField::StartMs.as_str(), number());
    schema_builder.add_u64_field(SchemaField::EndMs.as_str(), number());
    schema_builder.add_text_field(SchemaField::Content.as_str(), content_options);
    schema_builder.add_text_field(SchemaField::VideoFileName.as_str(), STORED);
    schema_builder.build()
}

/// Resolved handles for every field of the dialog schema.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Fields {
    pub id: Field,
    pub episode_id: Field,
    pub publication: Field,
    pub series: Field,
    pub episode: Field,
    pub pos: Field,
    pub start_ms: Field,
    pub end_ms: Field,
    pub content: Field,
    pub video_file_name: Field,
}

impl Fields {
    pub fn new(schema: &Schema) -> Fields {
        Fields {
            id: get_field(schema, SchemaField::Id),
            episode_id: get_field(schema, SchemaField::EpisodeId),
            publication: get_field(schema, SchemaField::Publication),
            series: get_field(schema, SchemaField::Series),
            episode: get_field(schema, SchemaField::Episode),
            pos: get_field(schema, SchemaField::Pos),
            start_ms: get_field(schema, SchemaField::StartMs),
            end_ms: get_field(schema, SchemaField::EndMs),
            content: get_field(schema, SchemaField::Content),
            video_file_name: get_field(schema, SchemaField::VideoFileName),
        }
    }

    pub fn get(&self, field: SchemaField) -> Field {
        match field {
            SchemaField::Id => self.id,
            SchemaField::EpisodeId => self.episode_id,
            SchemaField::Publication => self.publication,
            SchemaField::Series => self.series,
            SchemaField::Episode => self.episode,
            SchemaField::Pos => self.pos,
            SchemaField::StartMs => self.start_ms,
            SchemaField::EndMs => self.end_ms,
            SchemaField::Content => self.content,
            SchemaField::VideoFileName => self.video_file_name,
        }
    }
}

fn get_field(schema: &Schema, field: SchemaField) -> Field {
    schema
        .get_field(field.as_str())
        .expect("field in enum was not in schema")
}
