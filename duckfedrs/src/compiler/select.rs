//! SELECT list: columns, calculated fields, conditional fields and aggregations.

use serde_json::Value;

use crate::sql_ast::{SelectItem, SqlExpr};
use crate::types::{category_of, normalize_type, TypeCategory};
use crate::visual_query::{Aggregation, AggregationConfig, ConditionalField};

use super::expressions::contains_aggregate;
use super::predicates::{build_node, Clause};
use super::CompileContext;

/// Output of the SELECT stage.
#[derive(Debug, Default)]
pub(crate) struct SelectPlan {
    pub(crate) items: Vec<SelectItem>,
    /// Non-aggregated expressions, in select order; GROUP BY candidates.
    pub(crate) plain: Vec<SqlExpr>,
    pub(crate) has_aggregations: bool,
}

pub(crate) fn build_select(ctx: &mut CompileContext<'_>) -> SelectPlan {
    let mut plan = SelectPlan::default();
    let config = ctx.config;

    for column in &config.columns {
        let name = column.name.trim();
        if name.is_empty() {
            ctx.warn("selected column without a name skipped");
            continue;
        }
        let expr = if name == "*" {
            SqlExpr::Star
        } else {
            ctx.column_expr(column.table.as_deref(), name)
        };
        if name != "*" {
            plan.plain.push(expr.clone());
        }
        if let Some(alias) = &column.alias {
            ctx.select_aliases.push(alias.clone());
        }
        plan.items.push(SelectItem {
            expr,
            alias: column.alias.clone(),
        });
    }

    for field in &config.calculated_fields {
        if field.alias.trim().is_empty() || field.expression.trim().is_empty() {
            ctx.warn("calculated field needs both an alias and an expression; skipped");
            continue;
        }
        let Some(sql) = ctx.raw_expression(&field.expression) else {
            continue;
        };
        let aggregated = contains_aggregate(&sql);
        let mut expr = SqlExpr::Raw(sql);
        if let Some(cast) = field.cast.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            expr = expr.cast(cast, false);
        }
        if aggregated {
            plan.has_aggregations = true;
        } else {
            plan.plain.push(expr.clone());
        }
        ctx.select_aliases.push(field.alias.clone());
        plan.items.push(SelectItem {
            expr,
            alias: Some(field.alias.clone()),
        });
    }

    for field in &config.conditional_fields {
        if field.alias().trim().is_empty() {
            ctx.warn("conditional field without an alias skipped");
            continue;
        }
        let Some(expr) = conditional_expr(ctx, field) else {
            continue;
        };
        plan.plain.push(expr.clone());
        ctx.select_aliases.push(field.alias().to_string());
        plan.items.push(SelectItem {
            expr,
            alias: Some(field.alias().to_string()),
        });
    }

    for agg in &config.aggregations {
        let Some((item, category)) = aggregation_item(ctx, agg) else {
            continue;
        };
        plan.has_aggregations = true;
        if let Some(alias) = &item.alias {
            ctx.aggregate_aliases
                .insert(alias.to_lowercase(), (item.expr.clone(), category));
            ctx.select_aliases.push(alias.clone());
        }
        plan.items.push(item);
    }

    plan
}

fn conditional_expr(ctx: &mut CompileContext<'_>, field: &ConditionalField) -> Option<SqlExpr> {
    match field {
        ConditionalField::Case {
            alias,
            branches,
            else_value,
        } => {
            let mut built = Vec::new();
            for branch in branches {
                if let Some(when) = build_node(ctx, &branch.when, Clause::Where) {
                    built.push((when, SqlExpr::Literal(branch.then.clone())));
                }
            }
            if built.is_empty() {
                ctx.warn(format!("conditional field {alias} has no usable branches; skipped"));
                return None;
            }
            Some(SqlExpr::Case {
                branches: built,
                else_expr: else_value
                    .clone()
                    .map(|v| Box::new(SqlExpr::Literal(v))),
            })
        }
        ConditionalField::Bins {
            alias,
            column,
            min,
            max,
            buckets,
        } => {
            if column.trim().is_empty() || *buckets == 0 || !(max > min) {
                ctx.warn(format!(
                    "bins {alias} need a column, at least one bucket and max > min; skipped"
                ));
                return None;
            }
            let (Some(min), Some(max)) = (number(*min), number(*max)) else {
                ctx.warn(format!("bins {alias} have non-finite bounds; skipped"));
                return None;
            };
            Some(SqlExpr::Function {
                name: "WIDTH_BUCKET".to_string(),
                args: vec![
                    ctx.cast_column(None, column.trim()),
                    SqlExpr::Literal(min),
                    SqlExpr::Literal(max),
                    SqlExpr::Literal(Value::from(*buckets)),
                ],
            })
        }
    }
}

fn number(v: f64) -> Option<Value> {
    // whole numbers render without a trailing `.0`
    if v.fract() == 0.0 && v.abs() < 1e15 {
        return Some(Value::from(v as i64));
    }
    serde_json::Number::from_f64(v).map(Value::Number)
}

/// Build one aggregation item. Unsupported function names are hard errors.
pub(crate) fn aggregation_item(
    ctx: &mut CompileContext<'_>,
    agg: &AggregationConfig,
) -> Option<(SelectItem, TypeCategory)> {
    let Some(function) = Aggregation::parse(&agg.function, agg.separator.as_deref()) else {
        ctx.error(format!("unsupported aggregation function '{}'", agg.function));
        return None;
    };
    let column = agg.column.trim();
    let is_star = column.is_empty() || column == "*";

    let input = if is_star {
        if function != Aggregation::Count {
            ctx.warn(format!("{} needs a column; skipped", function.name()));
            return None;
        }
        SqlExpr::Star
    } else if let Some(resolved) = ctx.resolved_cast(None, column) {
        ctx.column_expr(None, column).cast(resolved, true)
    } else {
        let category = ctx.category(column);
        let base = ctx.column_expr(None, column);
        if function.wants_numeric_input()
            && !category.is_numeric()
            && category != TypeCategory::Unknown
        {
            let target = ctx.options.numeric_cast_type.clone();
            ctx.warn(format!(
                "{}({column}) on a {category} column: input wrapped in TRY_CAST(.. AS {target})",
                function.name().to_uppercase()
            ));
            base.cast(target, true)
        } else {
            base
        }
    };

    let category = output_category(ctx, &function, column, &input);
    let alias = agg
        .alias
        .clone()
        .filter(|a| !a.trim().is_empty())
        .unwrap_or_else(|| default_alias(&function, column));
    Some((
        SelectItem {
            expr: SqlExpr::Aggregate {
                agg: function,
                expr: Box::new(input),
            },
            alias: Some(alias),
        },
        category,
    ))
}

fn output_category(
    ctx: &CompileContext<'_>,
    function: &Aggregation,
    column: &str,
    input: &SqlExpr,
) -> TypeCategory {
    match function {
        Aggregation::StringAgg { .. } => TypeCategory::String,
        Aggregation::ArrayAgg => TypeCategory::Json,
        f if f.preserves_input_type() => match input {
            SqlExpr::Cast { data_type, .. } => normalize_type(Some(data_type)),
            _ => category_of(ctx.profiles, column),
        },
        _ => TypeCategory::Number,
    }
}

fn default_alias(function: &Aggregation, column: &str) -> String {
    if column.is_empty() || column == "*" {
        return function.name().to_string();
    }
    let sanitized: String = column
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    format!("{}_{}", function.name(), sanitized.trim_matches('_'))
}
