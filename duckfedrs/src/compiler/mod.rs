//! Visual query compiler: turns a [`VisualQueryConfig`] into DuckDB SQL text.
//!
//! Compilation never fails outright. Hard problems (blank table, unsupported aggregation,
//! malformed raw expression) land in `errors` with `success = false`; anything merely
//! malformed is skipped with a warning.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::casts::ResolvedCasts;
use crate::config::CompilerConfig;
use crate::dialect::{Dialect, DuckDbDialect};
use crate::sql_ast::{PivotClause, SelectQuery, SqlExpr, SqlRenderer, TableRef};
use crate::types::{category_of, ColumnProfile, TypeCategory};
use crate::visual_query::VisualQueryConfig;

mod expressions;
mod from;
mod grouping;
mod predicates;
mod select;
mod values;

/// First line of every compiled query when headers are enabled.
pub const HEADER: &str = "-- duckfed visual query";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileOutput {
    pub success: bool,
    pub sql: String,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Compile with default options.
pub fn compile(
    config: &VisualQueryConfig,
    table_name: &str,
    profiles: &[ColumnProfile],
    casts: &ResolvedCasts,
) -> CompileOutput {
    SqlCompiler::default().compile(config, table_name, profiles, casts)
}

#[derive(Debug, Clone, Default)]
pub struct SqlCompiler {
    options: CompilerConfig,
    dialect: DuckDbDialect,
}

impl SqlCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: CompilerConfig) -> Self {
        Self {
            options,
            dialect: DuckDbDialect,
        }
    }

    pub fn options(&self) -> &CompilerConfig {
        &self.options
    }

    pub fn compile(
        &self,
        config: &VisualQueryConfig,
        table_name: &str,
        profiles: &[ColumnProfile],
        casts: &ResolvedCasts,
    ) -> CompileOutput {
        let table = table_name.trim();
        if table.is_empty() {
            return CompileOutput {
                success: false,
                sql: String::new(),
                errors: vec!["table name is required".to_string()],
                warnings: Vec::new(),
            };
        }
        if config.is_empty() {
            return CompileOutput {
                success: true,
                sql: String::new(),
                errors: Vec::new(),
                warnings: vec![
                    "query configuration is empty; default query behavior will be used".to_string(),
                ],
            };
        }

        let mut ctx = CompileContext {
            config,
            table,
            profiles,
            casts,
            options: &self.options,
            dialect: &self.dialect,
            warnings: Vec::new(),
            errors: Vec::new(),
            aggregate_aliases: HashMap::new(),
            select_aliases: Vec::new(),
        };
        let query = build_query(&mut ctx);

        if !ctx.errors.is_empty() {
            tracing::debug!(table, errors = ctx.errors.len(), "visual query compile failed");
            return CompileOutput {
                success: false,
                sql: String::new(),
                errors: ctx.errors,
                warnings: ctx.warnings,
            };
        }

        let body = SqlRenderer::new(&self.dialect).render_select(&query);
        let sql = if self.options.emit_header {
            format!("{HEADER}\n{body}")
        } else {
            body
        };
        tracing::debug!(
            table,
            warnings = ctx.warnings.len(),
            joins = query.joins.len(),
            "compiled visual query"
        );
        CompileOutput {
            success: true,
            sql,
            errors: Vec::new(),
            warnings: ctx.warnings,
        }
    }
}

fn build_query(ctx: &mut CompileContext<'_>) -> SelectQuery {
    let config = ctx.config;
    let plan = select::build_select(ctx);
    let joins = from::build_joins(ctx);

    let filters = predicates::build_predicates(
        ctx,
        &config.filters,
        config.filter_logic,
        predicates::Clause::Where,
    );
    let group_by = grouping::build_group_by(ctx, &plan);
    let having = predicates::build_predicates(
        ctx,
        &config.having,
        config.having_logic,
        predicates::Clause::Having,
    );
    if having.is_some() && !plan.has_aggregations && group_by.is_empty() {
        ctx.warn("HAVING without aggregations or GROUP BY");
    }
    let pivot = config.pivot.as_ref().and_then(|p| build_pivot(ctx, p));
    let order_by = grouping::build_order_by(ctx, &config.order_by);

    let limit = config.limit.or(match ctx.options.default_limit {
        0 => None,
        n => Some(n),
    });

    SelectQuery {
        distinct: config.distinct,
        select: plan.items,
        from: TableRef::named(ctx.table),
        joins,
        filters: filters.into_iter().collect(),
        group_by,
        having: having.into_iter().collect(),
        pivot,
        order_by,
        limit,
        offset: None,
    }
}

fn build_pivot(
    ctx: &mut CompileContext<'_>,
    pivot: &crate::visual_query::PivotConfig,
) -> Option<PivotClause> {
    let on: Vec<SqlExpr> = pivot
        .on
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .map(|c| ctx.column_expr(None, c))
        .collect();
    if on.is_empty() {
        ctx.warn("PIVOT without ON columns skipped");
        return None;
    }
    let mut using = Vec::new();
    for agg in &pivot.using {
        if let Some((item, _)) = select::aggregation_item(ctx, agg) {
            using.push(item);
        }
    }
    let group_by = pivot
        .group_by
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .map(|c| ctx.column_expr(None, c))
        .collect();
    Some(PivotClause {
        on,
        using,
        group_by,
    })
}

/// Per-compile working state shared by the clause builders.
pub(crate) struct CompileContext<'a> {
    pub(crate) config: &'a VisualQueryConfig,
    pub(crate) table: &'a str,
    pub(crate) profiles: &'a [ColumnProfile],
    pub(crate) casts: &'a ResolvedCasts,
    pub(crate) options: &'a CompilerConfig,
    pub(crate) dialect: &'a DuckDbDialect,
    pub(crate) warnings: Vec<String>,
    pub(crate) errors: Vec<String>,
    /// Lower-cased aggregation alias → aggregate expression and its output category.
    pub(crate) aggregate_aliases: HashMap<String, (SqlExpr, TypeCategory)>,
    pub(crate) select_aliases: Vec<String>,
}

impl<'a> CompileContext<'a> {
    pub(crate) fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::trace!(warning = %message, "compile warning");
        self.warnings.push(message);
    }

    pub(crate) fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub(crate) fn quote(&self, ident: &str) -> String {
        self.dialect.quote_ident(ident)
    }

    pub(crate) fn category(&self, column: &str) -> TypeCategory {
        category_of(self.profiles, column)
    }

    /// Column reference, qualified with `table` unless the name already carries a qualifier.
    pub(crate) fn column_expr(&self, table: Option<&str>, column: &str) -> SqlExpr {
        let column = column.trim();
        match table.map(str::trim).filter(|t| !t.is_empty()) {
            Some(t) if !column.contains('.') => SqlExpr::qualified(t, column),
            _ => SqlExpr::column(column),
        }
    }

    /// Resolved conflict cast for a column; unqualified names default to the base table.
    pub(crate) fn resolved_cast(&self, table: Option<&str>, column: &str) -> Option<&'a str> {
        self.casts
            .for_column(Some(table.unwrap_or(self.table)), column)
    }

    /// Column reference wrapped in `TRY_CAST` when a resolved cast applies.
    pub(crate) fn cast_column(&self, table: Option<&str>, column: &str) -> SqlExpr {
        let expr = self.column_expr(table, column);
        match self.resolved_cast(table, column) {
            Some(data_type) => expr.cast(data_type, true),
            None => expr,
        }
    }

    pub(crate) fn is_select_alias(&self, name: &str) -> bool {
        self.select_aliases
            .iter()
            .any(|alias| alias.eq_ignore_ascii_case(name))
    }

    /// Validate and cast-inject a raw expression; failures become hard errors.
    pub(crate) fn raw_expression(&mut self, expression: &str) -> Option<String> {
        match expressions::prepare_raw(expression, self.casts, self.table, self.dialect) {
            Ok(sql) => Some(sql),
            Err(e) => {
                self.error(e.to_string());
                None
            }
        }
    }
}
