//! Type-aware literal formatting.

use serde_json::Value;

use crate::types::TypeCategory;

/// Single-quote a string, doubling embedded quotes.
pub(crate) fn quote_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Plain text of a scalar value; `None` for null.
pub(crate) fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// Accepts the usual spellings: true/false, 1/0, yes/no, t/f (also y/n, on/off).
pub(crate) fn normalize_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_f64() {
            Some(v) if v == 1.0 => Some(true),
            Some(v) if v == 0.0 => Some(false),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "1" | "on" => Some(true),
            "false" | "f" | "no" | "n" | "0" | "off" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn numeric_text(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    let plausible = !trimmed.is_empty()
        && trimmed
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'));
    match trimmed.parse::<f64>() {
        Ok(v) if plausible && v.is_finite() => Some(trimmed),
        _ => None,
    }
}

/// Render a comparison value for a column of the given category.
///
/// Numbers are emitted bare on numeric columns (quoted when they do not parse), booleans
/// are normalized on boolean columns, everything else is a quoted string.
pub(crate) fn format_literal(value: &Value, category: TypeCategory) -> String {
    if value.is_null() {
        return "NULL".to_string();
    }
    match category {
        TypeCategory::Number => match value {
            Value::Number(n) => n.to_string(),
            Value::String(s) => match numeric_text(s) {
                Some(num) => num.to_string(),
                None => quote_string(s),
            },
            Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            other => quote_string(&other.to_string()),
        },
        TypeCategory::Boolean => match normalize_bool(value) {
            Some(true) => "TRUE".to_string(),
            Some(false) => "FALSE".to_string(),
            None => quote_string(&value_text(value).unwrap_or_default()),
        },
        _ => quote_string(&value_text(value).unwrap_or_default()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LikeMode {
    /// Bare text is wrapped as a substring match; text with `%` is a pattern already.
    Like,
    Contains,
    StartsWith,
    EndsWith,
}

pub(crate) fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Build a LIKE pattern. Returns the pattern and whether it needs `ESCAPE '\'`.
pub(crate) fn like_pattern(text: &str, mode: LikeMode) -> (String, bool) {
    match mode {
        LikeMode::Like if text.contains('%') => (text.to_string(), false),
        LikeMode::Like | LikeMode::Contains => (format!("%{}%", escape_like(text)), true),
        LikeMode::StartsWith => (format!("{}%", escape_like(text)), true),
        LikeMode::EndsWith => (format!("%{}", escape_like(text)), true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_values_are_bare_when_they_parse() {
        assert_eq!(format_literal(&json!("1"), TypeCategory::Number), "1");
        assert_eq!(format_literal(&json!(2.5), TypeCategory::Number), "2.5");
        assert_eq!(format_literal(&json!(" -3e2 "), TypeCategory::Number), "-3e2");
        assert_eq!(format_literal(&json!("12abc"), TypeCategory::Number), "'12abc'");
        assert_eq!(format_literal(&json!("inf"), TypeCategory::Number), "'inf'");
    }

    #[test]
    fn booleans_normalize_common_spellings() {
        for yes in ["true", "T", "yes", "1"] {
            assert_eq!(format_literal(&json!(yes), TypeCategory::Boolean), "TRUE");
        }
        for no in ["false", "f", "NO", "0"] {
            assert_eq!(format_literal(&json!(no), TypeCategory::Boolean), "FALSE");
        }
        assert_eq!(format_literal(&json!(0), TypeCategory::Boolean), "FALSE");
        assert_eq!(format_literal(&json!("maybe"), TypeCategory::Boolean), "'maybe'");
    }

    #[test]
    fn everything_else_is_quoted() {
        assert_eq!(format_literal(&json!("O'Brien"), TypeCategory::String), "'O''Brien'");
        assert_eq!(format_literal(&json!(42), TypeCategory::Unknown), "'42'");
        assert_eq!(format_literal(&json!(null), TypeCategory::String), "NULL");
    }

    #[test]
    fn like_patterns() {
        assert_eq!(like_pattern("50%_off", LikeMode::Contains), ("%50\\%\\_off%".to_string(), true));
        assert_eq!(like_pattern("ab%", LikeMode::Like), ("ab%".to_string(), false));
        assert_eq!(like_pattern("a_b", LikeMode::Like), ("%a\\_b%".to_string(), true));
        assert_eq!(like_pattern("pre", LikeMode::StartsWith), ("pre%".to_string(), true));
        assert_eq!(like_pattern("suf", LikeMode::EndsWith), ("%suf".to_string(), true));
    }
}
