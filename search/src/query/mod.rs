//! The user facing query language.
//!
//! Text is lexed into tokens, tokens are parsed into a flat list of
//! [`Term`]s, and the compiler turns terms into an index query. Terms also
//! format back into query text, which is how a query travels inside preview
//! state and autocomplete values.
use std::{fmt, str::FromStr};

use quoteclip_core::duration::parse_unit_millis;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub(crate) mod compile;
mod lexer;
mod parser;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("unterminated quote")]
    UnterminatedQuote,
    #[error("expected a value after `{0}`")]
    EmptyFilter(char),
    #[error("invalid episode filter `#{0}`, try something like #s1e2")]
    BadId(String),
    #[error("invalid timestamp `+{0}`, try something like +10m30s")]
    BadTimestamp(String),
    #[error("invalid offset `>{0}`")]
    BadOffset(String),
    #[error("unsupported query term: {0}")]
    Unsupported(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TermField {
    Content,
    Publication,
    Series,
    Episode,
    StartMs,
    Offset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TermOp {
    Eq,
    FuzzyLike,
    Gte,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TermValue {
    Int(u64),
    Str(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Term {
    pub field: TermField,
    pub op: TermOp,
    pub value: TermValue,
}

impl Term {
    pub fn fuzzy(text: impl Into<String>) -> Term {
        Term {
            field: TermField::Content,
            op: TermOp::FuzzyLike,
            value: TermValue::Str(text.into()),
        }
    }

    pub fn phrase(text: impl Into<String>) -> Term {
        Term {
            field: TermField::Content,
            op: TermOp::Eq,
            value: TermValue::Str(text.into()),
        }
    }

    pub fn publication(name: &str) -> Term {
        Term {
            field: TermField::Publication,
            op: TermOp::Eq,
            value: TermValue::Str(name.to_ascii_lowercase()),
        }
    }

    pub fn series(n: u64) -> Term {
        Term {
            field: TermField::Series,
            op: TermOp::Eq,
            value: TermValue::Int(n),
        }
    }

    pub fn episode(n: u64) -> Term {
        Term {
            field: TermField::Episode,
            op: TermOp::Eq,
            value: TermValue::Int(n),
        }
    }

    pub fn start_at_least(ms: u64) -> Term {
        Term {
            field: TermField::StartMs,
            op: TermOp::Gte,
            value: TermValue::Int(ms),
        }
    }

    pub fn offset(n: u64) -> Term {
        Term {
            field: TermField::Offset,
            op: TermOp::Eq,
            value: TermValue::Int(n),
        }
    }
}

/// `1h2m3s450ms` style, the inverse of the `+` timestamp filter.
fn format_unit_millis(ms: u64) -> String {
    if ms == 0 {
        return "0s".to_owned();
    }
    let mut out = String::new();
    let parts = [
        (ms / 3_600_000, "h"),
        ((ms / 60_000) % 60, "m"),
        ((ms / 1000) % 60, "s"),
        (ms % 1000, "ms"),
    ];
    for (value, unit) in parts {
        if value > 0 {
            out.push_str(&format!("{}{}", value, unit));
        }
    }
    out
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.field, self.op, &self.value) {
            (TermField::Content, TermOp::FuzzyLike, TermValue::Str(s)) => f.write_str(s),
            (TermField::Content, TermOp::Eq, TermValue::Str(s)) => write!(f, "\"{}\"", s),
            (TermField::Publication, TermOp::Eq, TermValue::Str(s)) => write!(f, "~{}", s),
            (TermField::Series, TermOp::Eq, TermValue::Int(n)) => write!(f, "#s{}", n),
            (TermField::Episode, TermOp::Eq, TermValue::Int(n)) => write!(f, "#e{}", n),
            (TermField::StartMs, TermOp::Gte, TermValue::Int(n)) => {
                write!(f, "+{}", format_unit_millis(*n))
            }
            (TermField::Offset, TermOp::Eq, TermValue::Int(n)) => write!(f, ">{}", n),
            (field, op, value) => write!(f, "<{:?} {:?} {:?}>", field, op, value),
        }
    }
}

/// Parse query text into terms. Offsets are kept, see [`strip_offset`].
pub fn parse(text: &str) -> Result<Vec<Term>, QueryError> {
    parser::parse_tokens(lexer::lex(text)?)
}

/// Remove paging offset terms, returning the last offset given.
pub fn strip_offset(terms: Vec<Term>) -> (Vec<Term>, Option<u64>) {
    let mut offset = None;
    let terms = terms
        .into_iter()
        .filter(|t| {
            if t.field == TermField::Offset {
                if let TermValue::Int(n) = t.value {
                    offset = Some(n);
                }
                false
            } else {
                true
            }
        })
        .collect();
    (terms, offset)
}

/// A parsed query that displays and serializes as query text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Terms(pub Vec<Term>);

impl Terms {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[Term] {
        &self.0
    }
}

impl fmt::Display for Terms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, term) in self.0.iter().enumerate() {
            if idx != 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", term)?;
        }
        Ok(())
    }
}

impl FromStr for Terms {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s).map(Terms)
    }
}

impl Serialize for Terms {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Terms {
    fn deserialize<D>(deserializer: D) -> Result<Terms, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FromStr::from_str(&s).map_err(serde::de::Error::custom)
    }
}

pub(crate) fn parse_timestamp_filter(word: &str) -> Result<u64, QueryError> {
    let err = || QueryError::BadTimestamp(word.to_owned());
    if !word.is_empty() && word.bytes().all(|b| b.is_ascii_digit()) {
        return word
            .parse::<u64>()
            .ok()
            .and_then(|s| s.checked_mul(1000))
            .ok_or_else(err);
    }
    parse_unit_millis(&word.to_ascii_lowercase())
        .and_then(|ms| u64::try_from(ms).ok())
        .ok_or_else(err)
}
