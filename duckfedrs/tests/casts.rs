//! Type classification, conflict detection and resolution.

use std::collections::HashMap;

use duckfed::casts::{
    are_compatible, detect_conflicts, pairs_from_joins, recommend_cast, CastResolver, ColumnPair,
    ColumnRef,
};
use duckfed::types::{normalize_type, ColumnProfile, TypeCategory};
use duckfed::visual_query::{JoinCondition, JoinConfig, JoinType, VisualQueryConfig};

fn pair(l: (&str, &str, &str), r: (&str, &str, &str)) -> ColumnPair {
    ColumnPair::new(ColumnRef::new(l.0, l.1, l.2), ColumnRef::new(r.0, r.1, r.2))
}

#[test]
fn classifies_common_types() {
    assert_eq!(normalize_type(Some("DECIMAL(18,4)")), TypeCategory::Number);
    assert_eq!(normalize_type(Some("")), TypeCategory::Unknown);
    assert_eq!(normalize_type(None), TypeCategory::Unknown);
    assert_eq!(normalize_type(Some("BIGINT")), TypeCategory::Number);
    assert_eq!(normalize_type(Some("varchar(255)")), TypeCategory::String);
    assert_eq!(normalize_type(Some("TIMESTAMP WITH TIME ZONE")), TypeCategory::Datetime);
    assert_eq!(normalize_type(Some("DATE")), TypeCategory::Date);
    assert_eq!(normalize_type(Some("BOOLEAN")), TypeCategory::Boolean);
    assert_eq!(normalize_type(Some("INTEGER[]")), TypeCategory::Json);
}

#[test]
fn integer_families_match_on_word_starts() {
    for raw in ["UINTEGER", "INT8", "HUGEINT", "DOUBLE PRECISION", "unsigned bigint", "FLOAT4"] {
        assert_eq!(normalize_type(Some(raw)), TypeCategory::Number, "{raw}");
    }
    assert_eq!(normalize_type(Some("POINT")), TypeCategory::Unknown);
    assert_eq!(normalize_type(Some("GEOMETRY(POINT, 4326)")), TypeCategory::Unknown);
    assert_eq!(normalize_type(Some("INTERVAL")), TypeCategory::Unknown);
    assert_eq!(normalize_type(Some("print_status")), TypeCategory::Unknown);
}

#[test]
fn classification_is_idempotent() {
    for raw in ["DECIMAL(10,2)", "text", "TIMESTAMP", "", "weird_type", "JSON"] {
        assert_eq!(normalize_type(Some(raw)), normalize_type(Some(raw)));
    }
}

#[test]
fn date_and_datetime_are_compatible() {
    assert!(are_compatible(TypeCategory::Date, TypeCategory::Datetime));
    assert!(are_compatible(TypeCategory::Unknown, TypeCategory::Json));
    assert!(!are_compatible(TypeCategory::String, TypeCategory::Number));
}

#[test]
fn recommendations_are_symmetric() {
    let types = ["VARCHAR", "INTEGER", "BIGINT", "DOUBLE", "DATE", "TIMESTAMP", "BOOLEAN", ""];
    for a in types {
        for b in types {
            assert_eq!(recommend_cast(a, b), recommend_cast(b, a), "{a} vs {b}");
        }
    }
    assert_eq!(recommend_cast("INTEGER", "BIGINT"), "BIGINT");
    assert_eq!(recommend_cast("DATE", "DOUBLE"), "TIMESTAMP");
    assert_eq!(recommend_cast("DECIMAL(18,4)", "FLOAT"), "FLOAT");
}

#[test]
fn varchar_against_integer_is_one_conflict() {
    let conflicts = detect_conflicts(&[pair(
        ("orders", "customer_id", "VARCHAR"),
        ("customers", "id", "INTEGER"),
    )]);
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].recommended_type, "VARCHAR");
    assert_eq!(conflicts[0].key, "orders.customer_id::customers.id");
}

#[test]
fn self_references_and_duplicates_are_ignored() {
    let conflicts = detect_conflicts(&[
        pair(("t", "a", "VARCHAR"), ("T", "A", "INTEGER")),
        pair(("t", "a", "VARCHAR"), ("u", "b", "INTEGER")),
        pair(("T", "A", "TEXT"), ("U", "B", "BIGINT")),
    ]);
    assert_eq!(conflicts.len(), 1);
}

#[test]
fn keys_do_not_depend_on_pair_order() {
    let a = pair(("o", "x", "VARCHAR"), ("c", "y", "INTEGER"));
    let b = pair(("o", "z", "DATE"), ("c", "w", "BOOLEAN"));
    let forward = detect_conflicts(&[a.clone(), b.clone()]);
    let backward = detect_conflicts(&[b, a]);
    let mut fk: Vec<_> = forward.iter().map(|c| c.key.clone()).collect();
    let mut bk: Vec<_> = backward.iter().map(|c| c.key.clone()).collect();
    fk.sort();
    bk.sort();
    assert_eq!(fk, bk);
}

#[test]
fn resolutions_survive_recompute_and_are_pruned_with_their_pair() -> anyhow::Result<()> {
    let a = pair(("o", "x", "VARCHAR"), ("c", "y", "INTEGER"));
    let b = pair(("o", "z", "DATE"), ("c", "w", "BOOLEAN"));
    let mut resolver = CastResolver::from_pairs(&[a.clone(), b.clone()]);
    resolver.resolve_conflict(&a.key(), "BIGINT")?;

    resolver.update_pairs(&[b.clone(), a.clone()]);
    assert_eq!(
        resolver.conflict(&a.key()).and_then(|c| c.resolved_type),
        Some("BIGINT".to_string())
    );
    assert!(resolver.has_unresolved());

    resolver.update_pairs(&[b.clone()]);
    resolver.update_pairs(&[a.clone(), b]);
    assert!(resolver.conflict(&a.key()).is_some_and(|c| !c.is_resolved()));
    Ok(())
}

#[test]
fn unknown_key_or_blank_type_is_rejected() {
    let a = pair(("o", "x", "VARCHAR"), ("c", "y", "INTEGER"));
    let mut resolver = CastResolver::from_pairs(&[a.clone()]);
    assert!(resolver.resolve_conflict("nope::nope", "VARCHAR").is_err());
    assert!(resolver.resolve_conflict(&a.key(), "  ").is_err());
}

#[test]
fn bulk_recommendation_overwrites_manual_choices() -> anyhow::Result<()> {
    let a = pair(("o", "x", "VARCHAR"), ("c", "y", "INTEGER"));
    let b = pair(("o", "z", "DATE"), ("c", "w", "DOUBLE"));
    let mut resolver = CastResolver::from_pairs(&[a.clone(), b]);
    resolver.resolve_conflict(&a.key(), "BIGINT")?;
    resolver.resolve_all_with_recommendations();
    for conflict in resolver.conflicts() {
        assert_eq!(conflict.resolved_type.as_deref(), Some(conflict.recommended_type.as_str()));
    }
    assert!(!resolver.has_unresolved());

    let casts = resolver.resolved_casts();
    assert_eq!(casts.for_column(Some("o"), "x"), Some("VARCHAR"));
    assert_eq!(casts.for_column(Some("c"), "w"), Some("TIMESTAMP"));

    resolver.clear_all();
    assert_eq!(resolver.unresolved().len(), 2);
    Ok(())
}

#[test]
fn join_conditions_become_pairs() {
    let config = VisualQueryConfig {
        joins: vec![
            JoinConfig {
                table: "customers".to_string(),
                alias: Some("c".to_string()),
                join_type: JoinType::Left,
                conditions: vec![JoinCondition {
                    left_column: "customer_id".to_string(),
                    right_column: "id".to_string(),
                    operator: None,
                }],
            },
            JoinConfig {
                table: "regions".to_string(),
                join_type: JoinType::Cross,
                ..Default::default()
            },
        ],
        ..Default::default()
    };
    let mut profiles = HashMap::new();
    profiles.insert(
        "orders".to_string(),
        vec![ColumnProfile::new("customer_id", "VARCHAR")],
    );
    profiles.insert("c".to_string(), vec![ColumnProfile::new("id", "INTEGER")]);

    let pairs = pairs_from_joins(&config, "orders", &profiles);
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].key(), "orders.customer_id::c.id");
    assert_eq!(detect_conflicts(&pairs).len(), 1);
}
