//! SQL tokens with byte spans, on top of `sqlparser`'s DuckDB tokenizer.
//!
//! Whitespace and comments are dropped. Spans are byte ranges into the input so callers can
//! splice the original text.

use std::ops::Range;

use sqlparser::dialect::DuckDbDialect;
use sqlparser::tokenizer::{Location, Token, Tokenizer, TokenizerError, Word};

use crate::error::{DuckfedError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct SqlToken {
    pub token: Token,
    pub span: Range<usize>,
}

impl SqlToken {
    fn word(&self) -> Option<&Word> {
        match &self.token {
            Token::Word(word) => Some(word),
            _ => None,
        }
    }

    /// Unquoted identifier or keyword text.
    pub fn bare_word(&self) -> Option<&str> {
        self.word()
            .filter(|w| w.quote_style.is_none())
            .map(|w| w.value.as_str())
    }

    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.bare_word()
            .is_some_and(|w| w.eq_ignore_ascii_case(keyword))
    }

    pub fn is_identifier(&self) -> bool {
        self.word().is_some()
    }

    pub fn is_quoted(&self) -> bool {
        self.word().is_some_and(|w| w.quote_style.is_some())
    }

    /// Identifier text with quoting removed, or `None` for non-identifiers.
    pub fn ident_value(&self) -> Option<String> {
        self.word().map(|w| w.value.clone())
    }
}

/// Maps the tokenizer's 1-based line/column (in chars) to byte offsets.
struct LineIndex<'a> {
    sql: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    fn new(sql: &'a str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(sql.match_indices('\n').map(|(i, _)| i + 1));
        Self { sql, line_starts }
    }

    fn offset(&self, location: Location) -> usize {
        let line_start = usize::try_from(location.line)
            .ok()
            .and_then(|line| line.checked_sub(1))
            .and_then(|line| self.line_starts.get(line).copied());
        let Some(line_start) = line_start else {
            return self.sql.len();
        };
        let column = usize::try_from(location.column)
            .unwrap_or(usize::MAX)
            .saturating_sub(1);
        self.sql[line_start..]
            .char_indices()
            .nth(column)
            .map_or(self.sql.len(), |(i, _)| line_start + i)
    }
}

fn lex(sql: &str) -> std::result::Result<Vec<SqlToken>, TokenizerError> {
    let dialect = DuckDbDialect {};
    let raw = Tokenizer::new(&dialect, sql).tokenize_with_location()?;
    let index = LineIndex::new(sql);
    Ok(raw
        .into_iter()
        .filter(|t| !matches!(t.token, Token::Whitespace(_) | Token::EOF))
        .map(|t| SqlToken {
            span: index.offset(t.span.start)..index.offset(t.span.end),
            token: t.token,
        })
        .collect())
}

/// Tokenize, failing on unterminated strings, quoted identifiers or block comments.
pub fn tokenize(sql: &str) -> Result<Vec<SqlToken>> {
    lex(sql).map_err(|e| DuckfedError::Sql(e.to_string()))
}

/// Tokenize text that may still be mid-edit: input from the first unterminated construct
/// onwards is dropped.
pub fn tokenize_lenient(sql: &str) -> Vec<SqlToken> {
    let mut end = sql.len();
    loop {
        let text = &sql[..end];
        let error = match lex(text) {
            Ok(tokens) => return tokens,
            Err(error) => error,
        };
        let at = LineIndex::new(text).offset(error.location);
        let cut = if at < end {
            Some(at)
        } else {
            last_opener(text)
        };
        match cut {
            Some(cut) if cut < end => end = cut,
            _ => return Vec::new(),
        }
    }
}

fn last_opener(text: &str) -> Option<usize> {
    ["'", "\"", "`", "/*"]
        .iter()
        .filter_map(|opener| text.rfind(opener))
        .max()
}

/// Reject text with unterminated quotes or unbalanced parentheses.
pub fn check_balanced(sql: &str) -> Result<()> {
    let mut depth: i64 = 0;
    for token in tokenize(sql)? {
        match token.token {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth -= 1;
                if depth < 0 {
                    return Err(DuckfedError::Sql(format!(
                        "unexpected ')' at offset {}",
                        token.span.start
                    )));
                }
            }
            _ => {}
        }
    }
    if depth > 0 {
        return Err(DuckfedError::Sql(format!("{depth} unclosed '('")));
    }
    Ok(())
}
