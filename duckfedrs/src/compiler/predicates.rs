//! Predicate trees shared by WHERE, HAVING and CASE branches.

use std::collections::HashSet;

use serde_json::Value;

use crate::sql_ast::{SqlBinaryOperator, SqlExpr};
use crate::types::{normalize_type, TypeCategory};
use crate::visual_query::{
    FilterCondition, FilterNode, FilterOperator, LogicalOperator, ValueKind,
};

use super::values::{format_literal, like_pattern, quote_string, value_text, LikeMode};
use super::CompileContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Clause {
    Where,
    Having,
}

/// Combine top-level nodes with `logic`; `None` when nothing usable remains.
pub(crate) fn build_predicates(
    ctx: &mut CompileContext<'_>,
    nodes: &[FilterNode],
    logic: LogicalOperator,
    clause: Clause,
) -> Option<SqlExpr> {
    let items: Vec<SqlExpr> = nodes
        .iter()
        .filter_map(|node| build_node(ctx, node, clause))
        .collect();
    if items.is_empty() {
        return None;
    }
    Some(SqlExpr::Logical { op: logic, items })
}

pub(crate) fn build_node(
    ctx: &mut CompileContext<'_>,
    node: &FilterNode,
    clause: Clause,
) -> Option<SqlExpr> {
    match node {
        FilterNode::Group(group) => {
            let built = build_predicates(ctx, &group.conditions, group.logic, clause);
            if built.is_none() {
                ctx.warn("empty filter group skipped");
            }
            built
        }
        FilterNode::Condition(condition) => build_condition(ctx, condition, clause),
    }
}

fn build_condition(
    ctx: &mut CompileContext<'_>,
    cond: &FilterCondition,
    clause: Clause,
) -> Option<SqlExpr> {
    if cond.operator == FilterOperator::Expression {
        return expression_predicate(ctx, cond);
    }

    let column = cond.column.trim();
    if column.is_empty() {
        ctx.warn("filter without a column skipped");
        return None;
    }
    let (lhs, category) = operand(ctx, cond, clause);

    match cond.operator {
        FilterOperator::Eq
        | FilterOperator::Neq
        | FilterOperator::Gt
        | FilterOperator::Lt
        | FilterOperator::Gte
        | FilterOperator::Lte => comparison(ctx, cond, lhs, category),
        FilterOperator::IsNull => Some(lhs.is_null(false)),
        FilterOperator::IsNotNull => Some(lhs.is_null(true)),
        FilterOperator::Like
        | FilterOperator::NotLike
        | FilterOperator::ILike
        | FilterOperator::Contains
        | FilterOperator::StartsWith
        | FilterOperator::EndsWith => like(ctx, cond, lhs),
        FilterOperator::Between => between(ctx, cond, lhs, category),
        FilterOperator::In | FilterOperator::NotIn => membership(ctx, cond, lhs, category),
        FilterOperator::Expression => None,
    }
}

/// Left-hand side of a condition plus the category used to format its values.
fn operand(ctx: &CompileContext<'_>, cond: &FilterCondition, clause: Clause) -> (SqlExpr, TypeCategory) {
    let column = cond.column.trim();
    if clause == Clause::Having && cond.table.is_none() {
        if let Some((expr, category)) = ctx.aggregate_aliases.get(&column.to_lowercase()) {
            return (expr.clone(), *category);
        }
    }
    let table = cond.table.as_deref();
    let base = ctx.column_expr(table, column);
    if let Some(cast) = cond.cast.as_deref().filter(|c| !c.trim().is_empty()) {
        return (base.cast(cast.trim(), false), normalize_type(Some(cast)));
    }
    if let Some(resolved) = ctx.resolved_cast(table, column) {
        return (base.cast(resolved, true), normalize_type(Some(resolved)));
    }
    (base, ctx.category(column))
}

fn comparison(
    ctx: &mut CompileContext<'_>,
    cond: &FilterCondition,
    lhs: SqlExpr,
    category: TypeCategory,
) -> Option<SqlExpr> {
    let op = cond
        .operator
        .comparison_sql()
        .and_then(SqlBinaryOperator::from_comparison)?;

    let rhs = match cond.value_kind {
        ValueKind::Constant => match &cond.value {
            None => {
                ctx.warn(format!("filter on {} has no value; skipped", cond.column));
                return None;
            }
            Some(Value::Null) => {
                return match op {
                    SqlBinaryOperator::Eq => Some(lhs.is_null(false)),
                    SqlBinaryOperator::Neq => Some(lhs.is_null(true)),
                    _ => {
                        ctx.warn(format!(
                            "filter on {} compares against NULL; skipped",
                            cond.column
                        ));
                        None
                    }
                };
            }
            Some(value) => SqlExpr::Raw(format_literal(value, category)),
        },
        ValueKind::Column => {
            let Some(other) = cond.value.as_ref().and_then(value_text) else {
                ctx.warn(format!(
                    "column comparison on {} names no column; skipped",
                    cond.column
                ));
                return None;
            };
            ctx.cast_column(None, other.trim())
        }
        ValueKind::Expression => {
            let raw = cond
                .expression
                .clone()
                .or_else(|| cond.value.as_ref().and_then(value_text));
            let Some(raw) = raw else {
                ctx.warn(format!("expression comparison on {} is empty; skipped", cond.column));
                return None;
            };
            SqlExpr::Raw(ctx.raw_expression(&raw)?)
        }
    };
    Some(SqlExpr::binary(op, lhs, rhs))
}

fn like(ctx: &mut CompileContext<'_>, cond: &FilterCondition, lhs: SqlExpr) -> Option<SqlExpr> {
    let Some(text) = cond.value.as_ref().and_then(value_text) else {
        ctx.warn(format!("pattern filter on {} has no value; skipped", cond.column));
        return None;
    };
    let (mode, negated, case_insensitive) = match cond.operator {
        FilterOperator::NotLike => (LikeMode::Like, true, false),
        FilterOperator::ILike => (LikeMode::Like, false, true),
        FilterOperator::Contains => (LikeMode::Contains, false, false),
        FilterOperator::StartsWith => (LikeMode::StartsWith, false, false),
        FilterOperator::EndsWith => (LikeMode::EndsWith, false, false),
        _ => (LikeMode::Like, false, false),
    };
    let (pattern, escaped) = like_pattern(&text, mode);
    Some(SqlExpr::Like {
        expr: Box::new(lhs),
        pattern: Box::new(SqlExpr::Raw(quote_string(&pattern))),
        negated,
        case_insensitive,
        escape: escaped.then_some('\\'),
    })
}

fn between(
    ctx: &mut CompileContext<'_>,
    cond: &FilterCondition,
    lhs: SqlExpr,
    category: TypeCategory,
) -> Option<SqlExpr> {
    let bounds = match cond.values.as_slice() {
        [low, high, ..] => Some((low, high)),
        _ => cond.value.as_ref().zip(cond.second_value.as_ref()),
    };
    let Some((low, high)) = bounds.filter(|(l, h)| !l.is_null() && !h.is_null()) else {
        ctx.warn(format!("BETWEEN on {} needs two bounds; skipped", cond.column));
        return None;
    };
    Some(SqlExpr::Between {
        expr: Box::new(lhs),
        low: Box::new(SqlExpr::Raw(format_literal(low, category))),
        high: Box::new(SqlExpr::Raw(format_literal(high, category))),
    })
}

/// IN / NOT IN with duplicates removed; a NULL in the list becomes an `IS [NOT] NULL` branch.
fn membership(
    ctx: &mut CompileContext<'_>,
    cond: &FilterCondition,
    lhs: SqlExpr,
    category: TypeCategory,
) -> Option<SqlExpr> {
    let negated = cond.operator == FilterOperator::NotIn;
    let raw_values: Vec<Value> = if !cond.values.is_empty() {
        cond.values.clone()
    } else {
        match &cond.value {
            Some(Value::Array(items)) => items.clone(),
            Some(value) => vec![value.clone()],
            None => Vec::new(),
        }
    };
    if raw_values.is_empty() {
        ctx.warn(format!("IN filter on {} has no values; skipped", cond.column));
        return None;
    }

    let mut seen = HashSet::new();
    let mut list = Vec::new();
    let mut has_null = false;
    for value in &raw_values {
        if value.is_null() {
            has_null = true;
            continue;
        }
        let rendered = format_literal(value, category);
        if seen.insert(rendered.clone()) {
            list.push(SqlExpr::Raw(rendered));
        }
    }

    let null_check = lhs.clone().is_null(negated);
    if list.is_empty() {
        return Some(null_check);
    }
    let in_list = SqlExpr::InList {
        expr: Box::new(lhs),
        list,
        negated,
    };
    if !has_null {
        return Some(in_list);
    }
    let op = if negated {
        LogicalOperator::And
    } else {
        LogicalOperator::Or
    };
    Some(SqlExpr::Logical {
        op,
        items: vec![in_list, null_check],
    })
}

fn expression_predicate(ctx: &mut CompileContext<'_>, cond: &FilterCondition) -> Option<SqlExpr> {
    let raw = cond
        .expression
        .clone()
        .filter(|e| !e.trim().is_empty())
        .or_else(|| cond.value.as_ref().and_then(value_text));
    let Some(raw) = raw else {
        ctx.warn("expression filter is empty; skipped");
        return None;
    };
    let sql = ctx.raw_expression(&raw)?;
    let expr = SqlExpr::Raw(sql);
    match cond.cast.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        Some(cast) => Some(expr.cast(cast, false)),
        None => Some(expr),
    }
}
