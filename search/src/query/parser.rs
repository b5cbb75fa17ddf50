use super::{lexer::Token, parse_timestamp_filter, QueryError, Term};

/// `s1`, `e2`, `s1e2`, in any case.
fn parse_id(word: &str) -> Result<(Option<u64>, Option<u64>), QueryError> {
    let err = || QueryError::BadId(word.to_owned());
    let lower = word.to_ascii_lowercase();
    let mut rest = lower.as_str();

    let mut take_number = |prefix: char| -> Result<Option<u64>, QueryError> {
        let Some(after) = rest.strip_prefix(prefix) else {
            return Ok(None);
        };
        let digits = after.bytes().take_while(|b| b.is_ascii_digit()).count();
        if digits == 0 {
            return Err(err());
        }
        let value = after[..digits].parse().map_err(|_| err())?;
        rest = &after[digits..];
        Ok(Some(value))
    };

    let series = take_number('s')?;
    let episode = take_number('e')?;
    if !rest.is_empty() || (series.is_none() && episode.is_none()) {
        return Err(err());
    }
    Ok((series, episode))
}

fn push_filter(token: Token, terms: &mut Vec<Term>) -> Result<(), QueryError> {
    match token {
        Token::Quoted(text) => {
            let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
            if !text.is_empty() {
                terms.push(Term::phrase(text));
            }
        }
        Token::Mention(name) => {
            log::trace!("ignoring mention @{}", name);
        }
        Token::Publication(name) => terms.push(Term::publication(&name)),
        Token::Id(word) => {
            let (series, episode) = parse_id(&word)?;
            if let Some(s) = series {
                terms.push(Term::series(s));
            }
            if let Some(e) = episode {
                terms.push(Term::episode(e));
            }
        }
        Token::Timestamp(word) => {
            terms.push(Term::start_at_least(parse_timestamp_filter(&word)?))
        }
        Token::Offset(word) => {
            let n = word
                .parse::<u64>()
                .map_err(|_| QueryError::BadOffset(word.clone()))?;
            terms.push(Term::offset(n));
        }
        Token::Word(_) | Token::Separator => {}
    }
    Ok(())
}

/// Adjacent words, even across punctuation, become one fuzzy term. Any other
/// token ends the run.
pub(crate) fn parse_tokens(tokens: Vec<Token>) -> Result<Vec<Term>, QueryError> {
    let mut terms = Vec::new();
    let mut words: Vec<String> = Vec::new();

    for token in tokens {
        match token {
            Token::Word(w) => words.push(w),
            Token::Separator => {}
            filter => {
                if !words.is_empty() {
                    terms.push(Term::fuzzy(words.join(" ")));
                    words.clear();
                }
                push_filter(filter, &mut terms)?;
            }
        }
    }
    if !words.is_empty() {
        terms.push(Term::fuzzy(words.join(" ")));
    }
    Ok(terms)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::query::parse;

    #[test]
    fn words_merge_until_a_filter() {
        assert_eq!(
            parse("foo, bar ~xfm baz").unwrap(),
            vec![
                Term::fuzzy("foo bar"),
                Term::publication("xfm"),
                Term::fuzzy("baz")
            ]
        );
    }

    #[test]
    fn id_forms() {
        assert_eq!(parse_id("s1e2"), Ok((Some(1), Some(2))));
        assert_eq!(parse_id("S10"), Ok((Some(10), None)));
        assert_eq!(parse_id("e7"), Ok((None, Some(7))));
        assert!(parse_id("x1").is_err());
        assert!(parse_id("s").is_err());
        assert!(parse_id("s1e").is_err());
        assert!(parse_id("e1s2").is_err());
    }

    #[test]
    fn episode_filter_terms() {
        assert_eq!(
            parse("#s3e4").unwrap(),
            vec![Term::series(3), Term::episode(4)]
        );
        assert_eq!(parse("#e4").unwrap(), vec![Term::episode(4)]);
    }

    #[test]
    fn mention_is_dropped() {
        assert_eq!(parse("@someone hi").unwrap(), vec![Term::fuzzy("hi")]);
    }

    #[test]
    fn empty_quotes_are_ignored() {
        assert_eq!(parse(r#"""  "  " x"#).unwrap(), vec![Term::fuzzy("x")]);
    }

    #[test]
    fn bad_filters() {
        assert_eq!(parse(">abc"), Err(QueryError::BadOffset("abc".to_owned())));
        assert_eq!(
            parse("+soon"),
            Err(QueryError::BadTimestamp("soon".to_owned()))
        );
        assert_eq!(parse("#pilot"), Err(QueryError::BadId("pilot".to_owned())));
    }

    #[test]
    fn timestamp_filter() {
        assert_eq!(
            parse("+10m30s").unwrap(),
            vec![Term::start_at_least(630_000)]
        );
    }
}
