//! SQL dialect abstractions.
//!
//! The compiler only targets DuckDB, which is also the federated engine, but identifier
//! quoting and literal rendering stay behind a trait so the renderer never hard-codes them.

use crate::visual_query::Aggregation;

/// Dialects render identifiers and primitive expression pieces.
/// Expression tree walking lives in the renderer; the dialect
/// only maps logical constructs to SQL fragments.
pub trait Dialect {
    fn quote_ident(&self, ident: &str) -> String;

    /// Quote a possibly qualified reference (`schema.table`, `t.col`).
    ///
    /// Names that are already quoted, or dotted chains of plain identifiers, pass through
    /// segment by segment; anything else is treated as one identifier and quoted whole.
    fn quote_reference(&self, reference: &str) -> String {
        let reference = reference.trim();
        let segments: Vec<&str> = split_reference_segments(reference);
        if segments.len() > 1 && segments.iter().all(|s| is_plain_ident(s) || is_quoted(s)) {
            return segments
                .iter()
                .map(|s| {
                    if is_quoted(s) {
                        s.to_string()
                    } else {
                        self.quote_ident(s)
                    }
                })
                .collect::<Vec<_>>()
                .join(".");
        }
        if is_quoted(reference) {
            return reference.to_string();
        }
        self.quote_ident(reference)
    }

    fn render_aggregation(&self, agg: &Aggregation, expr: &str) -> String {
        match agg {
            // Basic aggregations
            Aggregation::Sum => format!("SUM({expr})"),
            Aggregation::Count => format!("COUNT({expr})"),
            Aggregation::CountDistinct => format!("COUNT(DISTINCT {expr})"),
            Aggregation::Min => format!("MIN({expr})"),
            Aggregation::Max => format!("MAX({expr})"),
            Aggregation::Avg => format!("AVG({expr})"),
            // Statistical aggregations
            Aggregation::Median => format!("MEDIAN({expr})"),
            Aggregation::Stddev => format!("STDDEV_POP({expr})"),
            Aggregation::StddevSamp => format!("STDDEV_SAMP({expr})"),
            Aggregation::Variance => format!("VAR_POP({expr})"),
            Aggregation::VarianceSamp => format!("VAR_SAMP({expr})"),
            // List/String aggregations
            Aggregation::StringAgg { separator } => {
                let escaped = separator.replace('\'', "''");
                format!("STRING_AGG({expr}, '{escaped}')")
            }
            Aggregation::ArrayAgg => format!("ARRAY_AGG({expr})"),
            // Approximate aggregations
            Aggregation::ApproxCountDistinct => format!("APPROX_COUNT_DISTINCT({expr})"),
            // First/Last
            Aggregation::First => format!("FIRST({expr})"),
            Aggregation::Last => format!("LAST({expr})"),
        }
    }

    fn render_literal(&self, value: &serde_json::Value) -> String {
        match value {
            serde_json::Value::Null => "NULL".to_string(),
            serde_json::Value::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::String(s) => format!("'{}'", s.replace('\'', "''")),
            serde_json::Value::Array(items) => {
                let rendered: Vec<String> = items.iter().map(|v| self.render_literal(v)).collect();
                rendered.join(", ")
            }
            serde_json::Value::Object(_) => {
                format!("'{}'", value.to_string().replace('\'', "''"))
            }
        }
    }

    fn render_cast(&self, expr: &str, data_type: &str, try_cast: bool) -> String {
        let func = if try_cast { "TRY_CAST" } else { "CAST" };
        format!("{func}({expr} AS {data_type})")
    }
}

fn is_quoted(s: &str) -> bool {
    s.len() >= 2 && s.starts_with('"') && s.ends_with('"')
}

pub(crate) fn is_plain_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Split on dots that are outside double quotes.
fn split_reference_segments(reference: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (idx, c) in reference.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            '.' if !in_quotes => {
                segments.push(&reference[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    segments.push(&reference[start..]);
    segments
}

mod duckdb;
pub use duckdb::DuckDbDialect;
