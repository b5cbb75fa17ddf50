use std::ops::Bound;

use tantivy::{
    query::{
        AllQuery, BooleanQuery, BoostQuery, ConstScoreQuery, FuzzyTermQuery, Occur, PhraseQuery,
        Query, RangeQuery, TermQuery,
    },
    schema::{Field, IndexRecordOption},
    tokenizer::TokenStream,
    Index, Term as IndexTerm,
};

use super::{QueryError, Term, TermField, TermOp, TermValue};
use crate::{
    schema::{Fields, SchemaField},
    SearchError,
};

const FUZZY_DISTANCE: u8 = 1;
const PHRASE_BOOST: f32 = 2.0;
/// Tokens this short would match nearly everything at edit distance one.
const EXACT_TOKEN_LEN: usize = 2;

/// Run `text` through the tokenizer the index uses for `field`.
fn analyze(index: &Index, field: Field, text: &str) -> Result<Vec<String>, SearchError> {
    let mut analyzer = index.tokenizer_for_field(field)?;
    let mut stream = analyzer.token_stream(text);
    let mut tokens = Vec::new();
    while stream.advance() {
        tokens.push(stream.token().text.clone());
    }
    Ok(tokens)
}

fn exact_tokens(field: Field, tokens: &[String]) -> Box<dyn Query> {
    if tokens.len() == 1 {
        Box::new(TermQuery::new(
            IndexTerm::from_field_text(field, &tokens[0]),
            IndexRecordOption::WithFreqs,
        ))
    } else {
        Box::new(PhraseQuery::new(
            tokens
                .iter()
                .map(|t| IndexTerm::from_field_text(field, t))
                .collect(),
        ))
    }
}

/// Every token must match within one edit; exact tokens and the exact phrase
/// score higher.
fn fuzzy_tokens(field: Field, tokens: &[String]) -> Box<dyn Query> {
    let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
    for token in tokens {
        let term = IndexTerm::from_field_text(field, token);
        let required: Box<dyn Query> = if token.chars().count() <= EXACT_TOKEN_LEN {
            Box::new(TermQuery::new(term.clone(), IndexRecordOption::WithFreqs))
        } else {
            Box::new(FuzzyTermQuery::new(term.clone(), FUZZY_DISTANCE, true))
        };
        clauses.push((Occur::Must, required));
        clauses.push((
            Occur::Should,
            Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs)),
        ));
    }
    if tokens.len() > 1 {
        clauses.push((
            Occur::Should,
            Box::new(BoostQuery::new(exact_tokens(field, tokens), PHRASE_BOOST)),
        ));
    }
    Box::new(BooleanQuery::new(clauses))
}

/// Filters restrict the result set without changing relevance.
fn filter(query: Box<dyn Query>) -> Box<dyn Query> {
    Box::new(ConstScoreQuery::new(query, 0.0))
}

fn compile_term(
    index: &Index,
    fields: &Fields,
    term: &Term,
) -> Result<Option<Box<dyn Query>>, SearchError> {
    let query = match (term.field, term.op, &term.value) {
        (TermField::Content, op @ (TermOp::FuzzyLike | TermOp::Eq), TermValue::Str(text)) => {
            let tokens = analyze(index, fields.content, text)?;
            if tokens.is_empty() {
                return Ok(None);
            }
            if op == TermOp::Eq {
                exact_tokens(fields.content, &tokens)
            } else {
                fuzzy_tokens(fields.content, &tokens)
            }
        }
        (TermField::Publication, TermOp::Eq, TermValue::Str(name)) => filter(Box::new(
            TermQuery::new(
                IndexTerm::from_field_text(fields.publication, &name.to_ascii_lowercase()),
                IndexRecordOption::Basic,
            ),
        )),
        (TermField::Series, TermOp::Eq, TermValue::Int(n)) => filter(Box::new(TermQuery::new(
            IndexTerm::from_field_u64(fields.series, *n),
            IndexRecordOption::Basic,
        ))),
        (TermField::Episode, TermOp::Eq, TermValue::Int(n)) => filter(Box::new(TermQuery::new(
            IndexTerm::from_field_u64(fields.episode, *n),
            IndexRecordOption::Basic,
        ))),
        (TermField::StartMs, TermOp::Gte, TermValue::Int(ms)) => {
            filter(Box::new(RangeQuery::new_u64_bounds(
                SchemaField::StartMs.as_str().to_owned(),
                Bound::Included(*ms),
                Bound::Unbounded,
            )))
        }
        (TermField::Offset, _, _) => {
            log::debug!("offset term reached the query compiler: {}", term);
            return Ok(None);
        }
        _ => return Err(QueryError::Unsupported(format!("{:?}", term)).into()),
    };
    Ok(Some(query))
}

/// All terms must hold. No terms at all matches every document.
pub(crate) fn compile(
    index: &Index,
    fields: &Fields,
    terms: &[Term],
) -> Result<Box<dyn Query>, SearchError> {
    let mut clauses = Vec::new();
    for term in terms {
        if let Some(q) = compile_term(index, fields, term)? {
            clauses.push((Occur::Must, q));
        }
    }
    Ok(match clauses.len() {
        0 => Box::new(AllQuery),
        1 => clauses.remove(0).1,
        _ => Box::new(BooleanQuery::new(clauses)),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::schema::create_schema;

    fn index() -> (Index, Fields) {
        let index = Index::create_in_ram(create_schema());
        let fields = Fields::new(&index.schema());
        (index, fields)
    }

    #[test]
    fn content_is_stemmed_and_lowercased() {
        let (index, fields) = index();
        assert_eq!(
            analyze(&index, fields.content, "Running, DOGS!").unwrap(),
            vec!["run".to_owned(), "dog".to_owned()]
        );
    }

    #[test]
    fn unsupported_combination() {
        let (index, fields) = index();
        let bad = Term {
            field: TermField::Series,
            op: TermOp::FuzzyLike,
            value: TermValue::Int(1),
        };
        assert!(matches!(
            compile(&index, &fields, &[bad]),
            Err(SearchError::Query(QueryError::Unsupported(_)))
        ));
    }

    #[test]
    fn punctuation_only_content_is_skipped() {
        let (index, fields) = index();
        let term = Term::fuzzy("?!");
        assert!(compile_term(&index, &fields, &term).unwrap().is_none());
    }
}
