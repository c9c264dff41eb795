//! Table references in SQL text and their classification.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use sqlparser::tokenizer::Token;

use crate::sql_tokens::{self, SqlToken};

use super::alias::ConnectionDirectory;
use super::AttachDatabase;

/// A table named after `FROM` / `JOIN`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableReference {
    /// First segment of a qualified name (catalog or schema); `None` for bare names.
    pub prefix: Option<String>,
    pub table: String,
    /// Every segment, unquoted.
    pub parts: Vec<String>,
}

impl TableReference {
    fn from_parts(parts: Vec<String>) -> Option<Self> {
        let table = parts.last()?.clone();
        let prefix = if parts.len() > 1 {
            parts.first().cloned()
        } else {
            None
        };
        Some(Self {
            prefix,
            table,
            parts,
        })
    }

    pub fn qualified_name(&self) -> String {
        self.parts.join(".")
    }
}

/// Words that end a table reference instead of aliasing it.
const CLAUSE_WORDS: &[&str] = &[
    "where", "join", "inner", "left", "right", "full", "outer", "cross", "natural", "on",
    "using", "group", "order", "having", "limit", "offset", "union", "intersect", "except",
    "window", "qualify", "as", "lateral", "positional", "asof", "semi", "anti", "pivot",
    "unpivot", "tablesample", "returning", "set", "values", "select", "from",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Query,
    Other,
}

/// Collect table references after `FROM` / `JOIN`, in order of first appearance.
///
/// Comments and string literals are skipped, comma-separated FROM lists and subqueries are
/// followed, and `FROM` inside function-call parentheses (`EXTRACT(YEAR FROM d)`) and table
/// functions (`read_csv(...)`) are ignored. Never fails; unfinished SQL yields what it can.
pub fn extract_table_refs(sql: &str) -> Vec<TableReference> {
    let tokens = sql_tokens::tokenize_lenient(sql);
    let mut frames: Vec<Frame> = Vec::new();
    let mut refs = Vec::new();
    let mut seen = HashSet::new();
    let mut i = 0;

    while i < tokens.len() {
        let token = &tokens[i];
        if token.token == Token::LParen {
            let query = tokens.get(i + 1).is_some_and(|t| {
                t.is_keyword("select") || t.is_keyword("with") || t.is_keyword("values")
            });
            frames.push(if query { Frame::Query } else { Frame::Other });
            i += 1;
            continue;
        }
        if token.token == Token::RParen {
            frames.pop();
            i += 1;
            continue;
        }

        let at_query_level = frames.last().map_or(true, |f| *f == Frame::Query);
        let is_from = token.is_keyword("from");
        if at_query_level && (is_from || token.is_keyword("join")) {
            i += 1;
            loop {
                while tokens
                    .get(i)
                    .is_some_and(|t| t.is_keyword("lateral") || t.is_keyword("only"))
                {
                    i += 1;
                }
                let (next, found) = table_reference_at(&tokens, i);
                if let Some(reference) = found {
                    if seen.insert(reference.parts.clone()) {
                        refs.push(reference);
                    }
                }
                i = skip_alias(&tokens, next);
                if is_from && tokens.get(i).is_some_and(|t| t.token == Token::Comma) {
                    i += 1;
                    continue;
                }
                break;
            }
            continue;
        }
        i += 1;
    }
    refs
}

/// Parse `ident(.ident)*` at `start`. Table functions and subqueries yield no reference;
/// the returned index is where scanning should resume.
fn table_reference_at(tokens: &[SqlToken], start: usize) -> (usize, Option<TableReference>) {
    let Some(first) = tokens.get(start) else {
        return (start, None);
    };
    if !first.is_identifier() || is_clause_word(first) {
        return (start, None);
    }
    let mut parts = Vec::new();
    let mut i = start;
    while let Some(value) = tokens.get(i).and_then(SqlToken::ident_value) {
        parts.push(value);
        i += 1;
        if tokens.get(i).is_some_and(|t| t.token == Token::Period)
            && tokens.get(i + 1).is_some_and(SqlToken::is_identifier)
        {
            i += 1;
        } else {
            break;
        }
    }
    if tokens.get(i).is_some_and(|t| t.token == Token::LParen) {
        // table function; its arguments are scanned by the caller
        return (i, None);
    }
    (i, TableReference::from_parts(parts))
}

fn is_clause_word(token: &SqlToken) -> bool {
    token
        .bare_word()
        .is_some_and(|w| CLAUSE_WORDS.contains(&w.to_ascii_lowercase().as_str()))
}

fn skip_alias(tokens: &[SqlToken], mut i: usize) -> usize {
    if tokens.get(i).is_some_and(|t| t.is_keyword("as")) {
        i += 1;
        if tokens.get(i).is_some_and(SqlToken::is_identifier) {
            i += 1;
        }
        return i;
    }
    if tokens
        .get(i)
        .is_some_and(|t| t.is_identifier() && !is_clause_word(t))
    {
        i += 1;
    }
    i
}

/// A prefix that matched neither a local schema nor a registered connection alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnrecognizedPrefix {
    pub prefix: String,
    pub reference: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedReferences {
    pub local: Vec<TableReference>,
    pub attachments: Vec<AttachDatabase>,
    pub unrecognized: Vec<UnrecognizedPrefix>,
}

/// Classify references: bare names and local schemas stay local, registered aliases
/// (case-sensitive) become attachments, anything else is reported.
pub fn resolve_references(
    refs: &[TableReference],
    directory: &ConnectionDirectory,
    local_schemas: &[String],
) -> ResolvedReferences {
    let mut resolved = ResolvedReferences::default();
    for reference in refs {
        let Some(prefix) = &reference.prefix else {
            resolved.local.push(reference.clone());
            continue;
        };
        if let Some(conn) = directory.by_alias(prefix) {
            if !resolved
                .attachments
                .iter()
                .any(|a| a.connection_id == conn.id)
            {
                resolved.attachments.push(conn.attachment());
            }
            continue;
        }
        if local_schemas.iter().any(|s| s.eq_ignore_ascii_case(prefix)) {
            resolved.local.push(reference.clone());
            continue;
        }
        if !resolved.unrecognized.iter().any(|u| &u.prefix == prefix) {
            resolved.unrecognized.push(UnrecognizedPrefix {
                prefix: prefix.clone(),
                reference: reference.qualified_name(),
            });
        }
    }
    resolved
}
