use std::{iter::Peekable, str::CharIndices};

use super::QueryError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    Word(String),
    Quoted(String),
    Mention(String),
    Publication(String),
    Id(String),
    Timestamp(String),
    Offset(String),
    /// Punctuation or anything else without meaning, only separates words.
    Separator,
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn take_word(text: &str, start: usize, chars: &mut Peekable<CharIndices<'_>>) -> String {
    let mut end = start;
    while let Some(&(idx, c)) = chars.peek() {
        if !is_word_char(c) {
            break;
        }
        end = idx + c.len_utf8();
        chars.next();
    }
    text[start..end].to_owned()
}

/// Split query text into tokens.
///
/// Whitespace is dropped, other unrecognized characters become
/// [`Token::Separator`].
pub(crate) fn lex(text: &str) -> Result<Vec<Token>, QueryError> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some(&(idx, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if is_word_char(c) {
            tokens.push(Token::Word(take_word(text, idx, &mut chars)));
            continue;
        }
        chars.next();
        let body_start = idx + c.len_utf8();
        let token = match c {
            '"' => {
                let close = text[body_start..]
                    .find('"')
                    .ok_or(QueryError::UnterminatedQuote)?;
                let inner = &text[body_start..body_start + close];
                while let Some(&(i, _)) = chars.peek() {
                    if i > body_start + close {
                        break;
                    }
                    chars.next();
                }
                Token::Quoted(inner.to_owned())
            }
            '@' | '~' | '#' | '+' | '>' => {
                let word = take_word(text, body_start, &mut chars);
                if word.is_empty() {
                    return Err(QueryError::EmptyFilter(c));
                }
                match c {
                    '@' => Token::Mention(word),
                    '~' => Token::Publication(word),
                    '#' => Token::Id(word),
                    '+' => Token::Timestamp(word),
                    _ => Token::Offset(word),
                }
            }
            _ => Token::Separator,
        };
        tokens.push(token);
    }
    Ok(tokens)
}
