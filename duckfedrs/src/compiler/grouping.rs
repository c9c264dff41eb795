//! GROUP BY inference and ORDER BY construction.

use std::collections::HashSet;

use crate::sql_ast::{OrderItem, SqlExpr, SqlRenderer};
use crate::visual_query::{SortCast, SortConfig};

use super::select::SelectPlan;
use super::CompileContext;

/// Explicit GROUP BY entries first, then (only when aggregating) every non-aggregated
/// select expression, deduplicated by rendered SQL.
///
/// Aggregation-only selects get no automatic GROUP BY and yield one summary row.
pub(crate) fn build_group_by(ctx: &mut CompileContext<'_>, plan: &SelectPlan) -> Vec<SqlExpr> {
    let renderer = SqlRenderer::new(ctx.dialect);
    let mut seen = HashSet::new();
    let mut group_by = Vec::new();

    let config = ctx.config;
    for entry in &config.group_by {
        let entry = entry.trim();
        if entry.is_empty() {
            ctx.warn("empty GROUP BY entry skipped");
            continue;
        }
        let expr = ctx.column_expr(None, entry);
        if seen.insert(renderer.render_expr(&expr)) {
            group_by.push(expr);
        }
    }

    if plan.has_aggregations {
        for expr in &plan.plain {
            if seen.insert(renderer.render_expr(expr)) {
                group_by.push(expr.clone());
            }
        }
    }

    group_by
}

/// Sort entries by priority (unset last, ties keep configured order) and apply cast hints.
pub(crate) fn build_order_by(ctx: &mut CompileContext<'_>, sorts: &[SortConfig]) -> Vec<OrderItem> {
    let mut ordered: Vec<&SortConfig> = sorts.iter().collect();
    ordered.sort_by_key(|s| (s.priority.is_none(), s.priority.unwrap_or_default()));

    let mut items = Vec::new();
    for sort in ordered {
        let column = sort.column.trim();
        if column.is_empty() {
            ctx.warn("sort without a column skipped");
            continue;
        }
        let base = if ctx.is_select_alias(column) {
            SqlExpr::Raw(ctx.quote(column))
        } else {
            ctx.column_expr(None, column)
        };
        let expr = match sort.cast {
            Some(SortCast::Numeric) => base.cast("DOUBLE", true),
            Some(SortCast::Date) => base.cast("TIMESTAMP", true),
            Some(SortCast::String) => base.cast("VARCHAR", false),
            None => base,
        };
        items.push(OrderItem {
            expr,
            direction: sort.direction,
        });
    }
    items
}
