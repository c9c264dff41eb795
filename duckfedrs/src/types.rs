//! Column type classification.
//!
//! Source databases report column types as free-form strings (`DECIMAL(18,4)`,
//! `timestamp with time zone`, `VARCHAR[]`, ...). Everything downstream reasons about a
//! small set of semantic categories instead.

use std::fmt;

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Semantic type category of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeCategory {
    Number,
    Boolean,
    Datetime,
    Date,
    Time,
    Json,
    String,
    Unknown,
}

impl TypeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeCategory::Number => "number",
            TypeCategory::Boolean => "boolean",
            TypeCategory::Datetime => "datetime",
            TypeCategory::Date => "date",
            TypeCategory::Time => "time",
            TypeCategory::Json => "json",
            TypeCategory::String => "string",
            TypeCategory::Unknown => "unknown",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, TypeCategory::Number)
    }

    /// Date, datetime and time all count as temporal.
    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            TypeCategory::Datetime | TypeCategory::Date | TypeCategory::Time
        )
    }

    /// Categories that are safest to compare as text.
    pub fn is_textual(&self) -> bool {
        matches!(self, TypeCategory::String | TypeCategory::Json)
    }

    /// Canonical DuckDB type used when a category has to be spelled out.
    pub fn sql_type(&self) -> &'static str {
        match self {
            TypeCategory::Number => "DOUBLE",
            TypeCategory::Boolean => "BOOLEAN",
            TypeCategory::Datetime => "TIMESTAMP",
            TypeCategory::Date => "DATE",
            TypeCategory::Time => "TIME",
            TypeCategory::Json => "JSON",
            TypeCategory::String | TypeCategory::Unknown => "VARCHAR",
        }
    }
}

impl fmt::Display for TypeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Matched against the start of each word, so `point` is not an integer type.
const NUMERIC_PREFIXES: &[&str] = &[
    "int", "bigint", "smallint", "tinyint", "hugeint", "mediumint", "varint", "uint", "ubigint",
    "usmallint", "utinyint", "uhugeint", "decimal", "numeric", "double", "float", "real",
];
const JSON_KEYWORDS: &[&str] = &["json", "map", "array", "struct", "variant", "union"];
const STRING_KEYWORDS: &[&str] = &[
    "char", "text", "string", "uuid", "binary", "blob", "object", "enum", "bytea",
];

/// Classify a raw column type. Total: never fails, `None`/empty yields `Unknown`.
pub fn normalize_type(raw: Option<&str>) -> TypeCategory {
    let Some(raw) = raw else {
        return TypeCategory::Unknown;
    };
    let lowered = raw.trim().to_ascii_lowercase();
    if lowered.is_empty() {
        return TypeCategory::Unknown;
    }
    if lowered.ends_with("[]") || lowered.starts_with("list") || lowered.starts_with("array") {
        return TypeCategory::Json;
    }
    let base = strip_type_modifiers(&lowered);
    if base.contains("interval") {
        return TypeCategory::Unknown;
    }

    let contains_any = |keywords: &[&str]| keywords.iter().any(|k| base.contains(k));
    let is_numeric = base
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|word| NUMERIC_PREFIXES.iter().any(|p| word.starts_with(p)));
    if is_numeric {
        TypeCategory::Number
    } else if base.contains("bool") {
        TypeCategory::Boolean
    } else if base.contains("timestamp") || base.contains("datetime") {
        TypeCategory::Datetime
    } else if base.contains("date") {
        TypeCategory::Date
    } else if base.contains("time") {
        TypeCategory::Time
    } else if contains_any(JSON_KEYWORDS) {
        TypeCategory::Json
    } else if contains_any(STRING_KEYWORDS) {
        TypeCategory::String
    } else {
        TypeCategory::Unknown
    }
}

/// Drop every parenthesised section (`decimal(18,4)` → `decimal`, `struct(a int)` → `struct`).
pub(crate) fn strip_type_modifiers(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut depth = 0usize;
    for c in raw.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out.trim().to_string()
}

/// Observed statistics for a column, when the metadata provider reports them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ColumnStats {
    pub null_count: Option<u64>,
    pub distinct_count: Option<u64>,
    pub min: Option<Value>,
    pub max: Option<Value>,
}

/// One column's declared type plus its derived category.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnProfile {
    pub name: String,
    #[serde(rename = "type")]
    pub raw_type: String,
    pub normalized_type: TypeCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<ColumnStats>,
}

impl ColumnProfile {
    pub fn new(name: impl Into<String>, raw_type: impl Into<String>) -> Self {
        let raw_type = raw_type.into();
        Self {
            name: name.into(),
            normalized_type: normalize_type(Some(&raw_type)),
            raw_type,
            stats: None,
        }
    }

    pub fn with_stats(mut self, stats: ColumnStats) -> Self {
        self.stats = Some(stats);
        self
    }
}

impl<'de> Deserialize<'de> for ColumnProfile {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Metadata providers disagree on naming: `{name, type}` vs `{column_name, data_type}`.
        #[derive(Deserialize)]
        struct Raw {
            #[serde(alias = "column_name", alias = "columnName")]
            name: Option<String>,
            #[serde(rename = "type", alias = "data_type", alias = "dataType", alias = "rawType")]
            raw_type: Option<String>,
            #[serde(default)]
            stats: Option<ColumnStats>,
        }
        let raw = Raw::deserialize(deserializer)?;
        let name = raw
            .name
            .ok_or_else(|| de::Error::custom("column metadata requires `name` or `column_name`"))?;
        let mut profile = ColumnProfile::new(name, raw.raw_type.unwrap_or_default());
        profile.stats = raw.stats;
        Ok(profile)
    }
}

/// Case-insensitive lookup of a column's category; qualified names (`t.col`) match on
/// their last segment. Missing columns are `Unknown`.
pub fn category_of(profiles: &[ColumnProfile], column: &str) -> TypeCategory {
    profile_of(profiles, column)
        .map(|p| p.normalized_type)
        .unwrap_or(TypeCategory::Unknown)
}

pub fn profile_of<'a>(profiles: &'a [ColumnProfile], column: &str) -> Option<&'a ColumnProfile> {
    let bare = unqualified(column);
    profiles
        .iter()
        .find(|p| p.name.eq_ignore_ascii_case(column))
        .or_else(|| profiles.iter().find(|p| p.name.eq_ignore_ascii_case(&bare)))
}

/// Last segment of a possibly qualified, possibly quoted identifier.
pub(crate) fn unqualified(column: &str) -> String {
    let last = column.rsplit('.').next().unwrap_or(column).trim();
    last.trim_matches('"').to_string()
}
