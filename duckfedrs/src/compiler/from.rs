//! FROM clause: base table, configured joins and lateral JSON-table expansions.

use crate::sql_ast::{Join, SqlBinaryOperator, SqlExpr, SqlJoinType, SqlRenderer, TableRef};
use crate::types::normalize_type;
use crate::visual_query::{JoinConfig, JoinType, JsonTableConfig, LateralJoinType};

use super::values::{format_literal, quote_string};
use super::CompileContext;

pub(crate) fn build_joins(ctx: &mut CompileContext<'_>) -> Vec<Join> {
    let config = ctx.config;
    let mut joins = Vec::new();
    for join in &config.joins {
        if let Some(built) = table_join(ctx, join) {
            joins.push(built);
        }
    }
    for json_table in &config.json_tables {
        if let Some(built) = json_table_join(ctx, json_table) {
            joins.push(built);
        }
    }
    joins
}

fn table_join(ctx: &mut CompileContext<'_>, join: &JoinConfig) -> Option<Join> {
    let table = join.table.trim();
    if table.is_empty() {
        ctx.warn("join without a table skipped");
        return None;
    }
    let label = join.label().trim().to_string();
    let table_ref = TableRef {
        name: table.to_string(),
        alias: join.alias.clone().filter(|a| !a.trim().is_empty()),
        subquery: None,
    };

    let mut on = Vec::new();
    if join.join_type != JoinType::Cross {
        for condition in &join.conditions {
            let left = condition.left_column.trim();
            let right = condition.right_column.trim();
            if left.is_empty() || right.is_empty() {
                ctx.warn(format!("incomplete join condition on {table} skipped"));
                continue;
            }
            let op = match condition.operator.as_deref() {
                None => SqlBinaryOperator::Eq,
                Some(token) => match SqlBinaryOperator::from_comparison(token) {
                    Some(op) => op,
                    None => {
                        ctx.warn(format!(
                            "unsupported join operator '{token}' on {table}; condition skipped"
                        ));
                        continue;
                    }
                },
            };
            let left_expr = ctx.cast_column(Some(ctx.table), left);
            let right_expr = ctx.cast_column(Some(&label), right);
            on.push(SqlExpr::binary(op, left_expr, right_expr));
        }
    }

    let join_type = match join.join_type {
        _ if on.is_empty() => {
            if join.join_type != JoinType::Cross {
                ctx.warn(format!("join on {table} has no conditions; compiled as CROSS JOIN"));
            }
            SqlJoinType::Cross
        }
        JoinType::Inner => SqlJoinType::Inner,
        JoinType::Left => SqlJoinType::Left,
        JoinType::Right => SqlJoinType::Right,
        JoinType::Full => SqlJoinType::Full,
        JoinType::Cross => SqlJoinType::Cross,
    };

    Some(Join {
        join_type,
        lateral: false,
        table: table_ref,
        on,
    })
}

/// `[LEFT] JOIN LATERAL (<unnest + projections>) AS alias ON TRUE`.
fn json_table_join(ctx: &mut CompileContext<'_>, cfg: &JsonTableConfig) -> Option<Join> {
    let alias = cfg.alias.trim();
    let source = cfg.source_column.trim();
    if alias.is_empty() || source.is_empty() {
        ctx.warn("JSON table needs a source column and an alias; skipped");
        return None;
    }
    if cfg.columns.is_empty() {
        ctx.warn(format!("JSON table {alias} declares no columns; skipped"));
        return None;
    }

    let renderer = SqlRenderer::new(ctx.dialect);
    let source_table = cfg
        .source_table
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(ctx.table);
    let source_sql = renderer.render_expr(&ctx.column_expr(Some(source_table), source));

    let root = match cfg.root_path.trim() {
        "" => "$",
        path => path,
    };
    let list_sql = if root.contains("[*]") {
        format!("json_extract({source_sql}, {})", quote_string(root))
    } else {
        format!("CAST(json_extract({source_sql}, {}) AS JSON[])", quote_string(root))
    };

    let value_ref = "\"__je\".\"__value\"";
    let mut projections = Vec::new();
    for column in &cfg.columns {
        let name = column.name.trim();
        if name.is_empty() {
            ctx.warn(format!("JSON table {alias} has a column without a name; skipped"));
            continue;
        }
        let expr = if column.ordinal {
            "\"__je\".\"__ordinal\"".to_string()
        } else {
            let path = match column.path.trim() {
                "" => format!("$.{name}"),
                p => p.to_string(),
            };
            let data_type = column.data_type.trim().to_ascii_uppercase();
            let extracted = if data_type == "JSON" {
                format!("json_extract({value_ref}, {})", quote_string(&path))
            } else {
                format!(
                    "TRY_CAST(json_extract_string({value_ref}, {}) AS {data_type})",
                    quote_string(&path)
                )
            };
            match &column.default_value {
                Some(default) if !default.is_null() => {
                    let literal = format_literal(default, normalize_type(Some(&data_type)));
                    format!("COALESCE({extracted}, {literal})")
                }
                _ => extracted,
            }
        };
        projections.push(format!("{expr} AS {}", ctx.quote(name)));
    }
    if projections.is_empty() {
        ctx.warn(format!("JSON table {alias} has no usable columns; skipped"));
        return None;
    }

    let subquery = format!(
        "SELECT {} FROM (SELECT unnest(\"__jl\".\"__list\") AS \"__value\", \
         generate_subscripts(\"__jl\".\"__list\", 1) AS \"__ordinal\" \
         FROM (SELECT {list_sql} AS \"__list\") AS \"__jl\") AS \"__je\"",
        projections.join(", ")
    );

    Some(Join {
        join_type: match cfg.join_type {
            LateralJoinType::Left => SqlJoinType::Left,
            LateralJoinType::Inner => SqlJoinType::Inner,
        },
        lateral: true,
        table: TableRef {
            name: alias.to_string(),
            alias: Some(alias.to_string()),
            subquery: Some(subquery),
        },
        on: Vec::new(),
    })
}
