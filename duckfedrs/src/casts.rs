//! Type compatibility checks, cast recommendations and conflict resolution.
//!
//! A conflict is identified by its content (`left.column::right.column`, lower-cased),
//! never by its position in a list, so resolutions survive the pair list being rebuilt
//! from a changed configuration.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{DuckfedError, Result};
use crate::types::{normalize_type, strip_type_modifiers, unqualified, ColumnProfile, TypeCategory};
use crate::visual_query::{JoinType, VisualQueryConfig};

/// Whether two categories can be compared or combined without a cast.
pub fn are_compatible(a: TypeCategory, b: TypeCategory) -> bool {
    use TypeCategory::*;
    if a == b || a == Unknown || b == Unknown {
        return true;
    }
    matches!((a, b), (Date, Datetime) | (Datetime, Date))
}

/// Recommended common type for two raw column types. Symmetric in its arguments.
pub fn recommend_cast(left_raw: &str, right_raw: &str) -> String {
    let left = normalize_type(Some(left_raw));
    let right = normalize_type(Some(right_raw));

    if left.is_textual() || right.is_textual() {
        return "VARCHAR".to_string();
    }
    if (left.is_temporal() && right.is_numeric()) || (right.is_temporal() && left.is_numeric()) {
        return "TIMESTAMP".to_string();
    }
    if left.is_temporal() && right.is_temporal() {
        return if left == right {
            left.sql_type().to_string()
        } else {
            "TIMESTAMP".to_string()
        };
    }
    if left.is_numeric() && right.is_numeric() {
        return wider_numeric(left_raw, right_raw);
    }
    match (left, right) {
        (TypeCategory::Unknown, other) | (other, TypeCategory::Unknown)
            if other != TypeCategory::Unknown =>
        {
            other.sql_type().to_string()
        }
        (a, b) if a == b => a.sql_type().to_string(),
        _ => "VARCHAR".to_string(),
    }
}

fn numeric_rank(raw: &str) -> u8 {
    let base = strip_type_modifiers(&raw.trim().to_ascii_lowercase());
    if base.contains("double") {
        7
    } else if base.contains("float") || base.contains("real") {
        6
    } else if base.contains("decimal") || base.contains("numeric") {
        5
    } else if base.contains("hugeint") {
        4
    } else if base.contains("bigint") || base.contains("int8") || base.contains("long") {
        3
    } else if base.contains("smallint") || base.contains("int2") {
        1
    } else if base.contains("tinyint") || base.contains("int1") {
        0
    } else {
        2
    }
}

/// Picks the wider numeric type, keeping its precision; ties break on the
/// lexicographically smaller spelling so the result never depends on argument order.
fn wider_numeric(left_raw: &str, right_raw: &str) -> String {
    let left = left_raw.trim().to_ascii_uppercase();
    let right = right_raw.trim().to_ascii_uppercase();
    match numeric_rank(&left).cmp(&numeric_rank(&right)) {
        std::cmp::Ordering::Greater => left,
        std::cmp::Ordering::Less => right,
        std::cmp::Ordering::Equal => std::cmp::min(left, right),
    }
}

/// Content-derived identity of a column pair.
pub fn conflict_key(left_label: &str, left_column: &str, right_label: &str, right_column: &str) -> String {
    format!(
        "{}.{}::{}.{}",
        left_label.to_lowercase(),
        left_column.to_lowercase(),
        right_label.to_lowercase(),
        right_column.to_lowercase()
    )
}

/// One side of a compared column pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnRef {
    /// Table name or alias the column is qualified with.
    pub label: String,
    pub column: String,
    pub raw_type: String,
}

impl ColumnRef {
    pub fn new(label: impl Into<String>, column: impl Into<String>, raw_type: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            column: column.into(),
            raw_type: raw_type.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnPair {
    pub left: ColumnRef,
    pub right: ColumnRef,
}

impl ColumnPair {
    pub fn new(left: ColumnRef, right: ColumnRef) -> Self {
        Self { left, right }
    }

    pub fn key(&self) -> String {
        conflict_key(
            &self.left.label,
            &self.left.column,
            &self.right.label,
            &self.right.column,
        )
    }

    fn is_self_reference(&self) -> bool {
        self.left.label.eq_ignore_ascii_case(&self.right.label)
            && self.left.column.eq_ignore_ascii_case(&self.right.column)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeConflict {
    pub key: String,
    pub left_label: String,
    pub left_column: String,
    pub right_label: String,
    pub right_column: String,
    pub left_type: String,
    pub right_type: String,
    pub left_category: TypeCategory,
    pub right_category: TypeCategory,
    pub recommended_type: String,
    pub resolved_type: Option<String>,
}

impl TypeConflict {
    pub fn is_resolved(&self) -> bool {
        self.resolved_type.is_some()
    }
}

/// Flag every incompatible pair. Pairs comparing a column with itself are never flagged,
/// and a pair listed twice yields one conflict.
pub fn detect_conflicts(pairs: &[ColumnPair]) -> Vec<TypeConflict> {
    let mut seen = std::collections::HashSet::new();
    let mut conflicts = Vec::new();
    for pair in pairs {
        if pair.is_self_reference() {
            continue;
        }
        let left_category = normalize_type(Some(&pair.left.raw_type));
        let right_category = normalize_type(Some(&pair.right.raw_type));
        if are_compatible(left_category, right_category) {
            continue;
        }
        let key = pair.key();
        if !seen.insert(key.clone()) {
            continue;
        }
        conflicts.push(TypeConflict {
            key,
            left_label: pair.left.label.clone(),
            left_column: pair.left.column.clone(),
            right_label: pair.right.label.clone(),
            right_column: pair.right.column.clone(),
            left_type: pair.left.raw_type.clone(),
            right_type: pair.right.raw_type.clone(),
            left_category,
            right_category,
            recommended_type: recommend_cast(&pair.left.raw_type, &pair.right.raw_type),
            resolved_type: None,
        });
    }
    conflicts
}

/// Split `label.column` into its parts, falling back to `default_label` when unqualified.
pub(crate) fn split_reference(reference: &str, default_label: &str) -> (String, String) {
    let trimmed = reference.trim();
    match trimmed.rsplit_once('.') {
        Some((label, column)) => (
            label.trim_matches('"').to_string(),
            column.trim_matches('"').to_string(),
        ),
        None => (default_label.to_string(), trimmed.trim_matches('"').to_string()),
    }
}

/// Column pairs compared by the join conditions of a configuration.
///
/// `profiles_by_table` is keyed by table name or alias (case-insensitive); columns without
/// a profile get an empty raw type and are therefore never flagged.
pub fn pairs_from_joins(
    config: &VisualQueryConfig,
    base_table: &str,
    profiles_by_table: &HashMap<String, Vec<ColumnProfile>>,
) -> Vec<ColumnPair> {
    let raw_type_of = |label: &str, column: &str| -> String {
        profiles_by_table
            .iter()
            .find(|(table, _)| table.eq_ignore_ascii_case(label))
            .and_then(|(_, profiles)| {
                profiles
                    .iter()
                    .find(|p| p.name.eq_ignore_ascii_case(&unqualified(column)))
            })
            .map(|p| p.raw_type.clone())
            .unwrap_or_default()
    };

    let mut pairs = Vec::new();
    for join in &config.joins {
        if join.join_type == JoinType::Cross {
            continue;
        }
        for condition in &join.conditions {
            if condition.left_column.trim().is_empty() || condition.right_column.trim().is_empty() {
                continue;
            }
            let (left_label, left_column) = split_reference(&condition.left_column, base_table);
            let (right_label, right_column) = split_reference(&condition.right_column, join.label());
            let left_type = raw_type_of(&left_label, &left_column);
            let right_type = raw_type_of(&right_label, &right_column);
            pairs.push(ColumnPair::new(
                ColumnRef::new(left_label, left_column, left_type),
                ColumnRef::new(right_label, right_column, right_type),
            ));
        }
    }
    pairs
}

/// Resolved cast types looked up by column reference; consumed by the compiler.
#[derive(Debug, Clone, Default)]
pub struct ResolvedCasts {
    by_reference: HashMap<String, String>,
    // None marks a bare column name resolved to different types on different tables.
    by_column: HashMap<String, Option<String>>,
}

impl ResolvedCasts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: &str, column: &str, data_type: &str) {
        let column = column.to_lowercase();
        self.by_reference.insert(
            format!("{}.{}", label.to_lowercase(), column),
            data_type.to_string(),
        );
        self.by_column
            .entry(column)
            .and_modify(|existing| {
                if existing.as_deref() != Some(data_type) {
                    *existing = None;
                }
            })
            .or_insert_with(|| Some(data_type.to_string()));
    }

    /// Cast type for a column. Qualified references (`t.col`) and an explicit label are
    /// matched exactly; bare names fall back to an unambiguous per-column entry.
    pub fn for_column(&self, label: Option<&str>, column: &str) -> Option<&str> {
        let column = column.trim();
        if let Some((qualifier, name)) = column.rsplit_once('.') {
            let key = format!(
                "{}.{}",
                qualifier.trim_matches('"').to_lowercase(),
                name.trim_matches('"').to_lowercase()
            );
            return self.by_reference.get(&key).map(String::as_str);
        }
        let bare = column.trim_matches('"').to_lowercase();
        if let Some(label) = label {
            let key = format!("{}.{}", label.to_lowercase(), bare);
            if let Some(found) = self.by_reference.get(&key) {
                return Some(found);
            }
        }
        self.by_column.get(&bare).and_then(|t| t.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.by_reference.is_empty()
    }

    pub fn len(&self) -> usize {
        self.by_reference.len()
    }
}

/// Owns the detected conflicts and the user's resolutions for them.
#[derive(Debug, Clone, Default)]
pub struct CastResolver {
    conflicts: Vec<TypeConflict>,
    resolutions: BTreeMap<String, String>,
}

impl CastResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(pairs: &[ColumnPair]) -> Self {
        let mut resolver = Self::new();
        resolver.update_pairs(pairs);
        resolver
    }

    /// Recompute conflicts for a new pair list and prune resolutions whose pair vanished.
    pub fn update_pairs(&mut self, pairs: &[ColumnPair]) {
        self.conflicts = detect_conflicts(pairs);
        let live: std::collections::HashSet<&str> =
            self.conflicts.iter().map(|c| c.key.as_str()).collect();
        let before = self.resolutions.len();
        self.resolutions.retain(|key, _| live.contains(key.as_str()));
        tracing::debug!(
            conflicts = self.conflicts.len(),
            pruned = before - self.resolutions.len(),
            "recomputed type conflicts"
        );
    }

    /// Current conflicts with their resolutions applied.
    pub fn conflicts(&self) -> Vec<TypeConflict> {
        self.conflicts
            .iter()
            .cloned()
            .map(|mut conflict| {
                conflict.resolved_type = self.resolutions.get(&conflict.key).cloned();
                conflict
            })
            .collect()
    }

    pub fn conflict(&self, key: &str) -> Option<TypeConflict> {
        self.conflicts().into_iter().find(|c| c.key == key)
    }

    pub fn unresolved(&self) -> Vec<TypeConflict> {
        self.conflicts()
            .into_iter()
            .filter(|c| !c.is_resolved())
            .collect()
    }

    pub fn has_unresolved(&self) -> bool {
        self.conflicts
            .iter()
            .any(|c| !self.resolutions.contains_key(&c.key))
    }

    /// Record the user's chosen type for a conflict. Any type string is accepted.
    pub fn resolve_conflict(&mut self, key: &str, data_type: &str) -> Result<()> {
        if !self.conflicts.iter().any(|c| c.key == key) {
            return Err(DuckfedError::Validation(format!("unknown type conflict {key}")));
        }
        let data_type = data_type.trim();
        if data_type.is_empty() {
            return Err(DuckfedError::Validation(format!(
                "empty cast type for conflict {key}"
            )));
        }
        self.resolutions.insert(key.to_string(), data_type.to_string());
        Ok(())
    }

    pub fn clear_resolution(&mut self, key: &str) -> bool {
        self.resolutions.remove(key).is_some()
    }

    /// Overwrite every resolution, including manual ones, with its recommendation.
    pub fn resolve_all_with_recommendations(&mut self) {
        for conflict in &self.conflicts {
            self.resolutions
                .insert(conflict.key.clone(), conflict.recommended_type.clone());
        }
    }

    pub fn clear_all(&mut self) {
        self.resolutions.clear();
    }

    /// Resolutions keyed by column reference, both sides of every resolved pair.
    pub fn resolved_casts(&self) -> ResolvedCasts {
        let mut casts = ResolvedCasts::new();
        for conflict in &self.conflicts {
            if let Some(data_type) = self.resolutions.get(&conflict.key) {
                casts.insert(&conflict.left_label, &conflict.left_column, data_type);
                casts.insert(&conflict.right_label, &conflict.right_column, data_type);
            }
        }
        casts
    }
}
