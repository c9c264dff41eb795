//! Raw SQL expression fragments typed by the user (calculated fields, expression filters).

use crate::casts::ResolvedCasts;
use crate::dialect::Dialect;
use crate::error::{DuckfedError, Result};
use sqlparser::tokenizer::Token;

use crate::sql_tokens::{self, SqlToken};

const AGGREGATE_FUNCTIONS: &[&str] = &[
    "sum",
    "count",
    "avg",
    "min",
    "max",
    "median",
    "stddev",
    "stddev_pop",
    "stddev_samp",
    "variance",
    "var_pop",
    "var_samp",
    "string_agg",
    "array_agg",
    "list",
    "approx_count_distinct",
    "first",
    "last",
    "any_value",
    "mode",
];

/// Words that can never be column references.
const RESERVED: &[&str] = &[
    "and", "or", "not", "null", "true", "false", "is", "in", "like", "ilike", "between", "case",
    "when", "then", "else", "end", "as", "distinct", "interval", "cast", "try_cast", "over",
    "partition", "by", "order", "asc", "desc", "filter", "where", "escape",
];

/// Validate a raw expression and wrap every column that has a resolved cast in `TRY_CAST`.
///
/// Unqualified columns are looked up against `default_label` first, then as bare names.
pub(crate) fn prepare_raw(
    expression: &str,
    casts: &ResolvedCasts,
    default_label: &str,
    dialect: &dyn Dialect,
) -> Result<String> {
    let trimmed = expression.trim();
    if trimmed.is_empty() {
        return Err(DuckfedError::Sql("empty expression".to_string()));
    }
    sql_tokens::check_balanced(trimmed)
        .map_err(|e| DuckfedError::Sql(format!("malformed expression `{trimmed}`: {e}")))?;
    if casts.is_empty() {
        return Ok(trimmed.to_string());
    }

    let tokens = sql_tokens::tokenize(trimmed)?;
    let mut out = String::with_capacity(trimmed.len());
    let mut cursor = 0;
    let mut i = 0;
    while i < tokens.len() {
        let Some((end, qualifier, column)) = column_reference_at(&tokens, i) else {
            i += 1;
            continue;
        };
        let span_start = tokens[i].span.start;
        let span_end = tokens[end - 1].span.end;
        let data_type = match &qualifier {
            Some(q) => casts.for_column(Some(q), &column),
            None => casts.for_column(Some(default_label), &column),
        };
        if let Some(data_type) = data_type {
            out.push_str(&trimmed[cursor..span_start]);
            out.push_str(&dialect.render_cast(&trimmed[span_start..span_end], data_type, true));
            cursor = span_end;
        }
        i = end;
    }
    out.push_str(&trimmed[cursor..]);
    Ok(out)
}

/// Recognize `ident(.ident)*` starting at `start` that is used as a column, not a function,
/// keyword or type name. Returns the end token index, qualifier and column name.
fn column_reference_at(tokens: &[SqlToken], start: usize) -> Option<(usize, Option<String>, String)> {
    let first = &tokens[start];
    if !first.is_identifier() {
        return None;
    }
    if start > 0 {
        let prev = &tokens[start - 1];
        // continuation of an earlier chain, a type name after AS, or `::type`
        if matches!(prev.token, Token::Period | Token::DoubleColon | Token::Colon)
            || prev.is_keyword("as")
        {
            return None;
        }
    }

    let mut parts = vec![first.ident_value()?];
    let mut end = start + 1;
    while end + 1 < tokens.len()
        && tokens[end].token == Token::Period
        && tokens[end + 1].is_identifier()
    {
        parts.push(tokens[end + 1].ident_value()?);
        end += 2;
    }

    if tokens.get(end).is_some_and(|t| t.token == Token::LParen) {
        return None;
    }
    if parts.len() == 1
        && first
            .bare_word()
            .is_some_and(|w| RESERVED.contains(&w.to_ascii_lowercase().as_str()))
    {
        return None;
    }

    let column = parts.pop()?;
    let qualifier = if parts.is_empty() {
        None
    } else {
        Some(parts.join("."))
    };
    Some((end, qualifier, column))
}

/// Whether an expression calls an aggregate function at its top level or anywhere inside.
pub(crate) fn contains_aggregate(expression: &str) -> bool {
    let tokens = sql_tokens::tokenize_lenient(expression);
    tokens.windows(2).any(|pair| {
        pair[1].token == Token::LParen
            && pair[0]
                .bare_word()
                .is_some_and(|w| AGGREGATE_FUNCTIONS.contains(&w.to_ascii_lowercase().as_str()))
    })
}
