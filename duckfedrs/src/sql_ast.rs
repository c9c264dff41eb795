use serde_json::Value;

use crate::dialect::Dialect;
use crate::visual_query::{Aggregation, LogicalOperator, SortDirection};

#[derive(Debug, Clone, PartialEq)]
pub enum SqlExpr {
    /// Column reference; unqualified names containing dots are treated as qualified.
    Column {
        table: Option<String>,
        name: String,
    },
    /// Pre-rendered SQL, emitted verbatim.
    Raw(String),
    Literal(Value),
    Star,
    Cast {
        expr: Box<SqlExpr>,
        data_type: String,
        try_cast: bool,
    },
    Function {
        name: String,
        args: Vec<SqlExpr>,
    },
    Case {
        branches: Vec<(SqlExpr, SqlExpr)>,
        else_expr: Option<Box<SqlExpr>>,
    },
    BinaryOp {
        op: SqlBinaryOperator,
        left: Box<SqlExpr>,
        right: Box<SqlExpr>,
    },
    Aggregate {
        agg: Aggregation,
        expr: Box<SqlExpr>,
    },
    InList {
        expr: Box<SqlExpr>,
        list: Vec<SqlExpr>,
        negated: bool,
    },
    IsNull {
        expr: Box<SqlExpr>,
        negated: bool,
    },
    Between {
        expr: Box<SqlExpr>,
        low: Box<SqlExpr>,
        high: Box<SqlExpr>,
    },
    Like {
        expr: Box<SqlExpr>,
        pattern: Box<SqlExpr>,
        negated: bool,
        case_insensitive: bool,
        escape: Option<char>,
    },
    /// `AND` / `OR` over any number of items.
    Logical {
        op: LogicalOperator,
        items: Vec<SqlExpr>,
    },
}

impl SqlExpr {
    pub fn column(name: impl Into<String>) -> Self {
        SqlExpr::Column {
            table: None,
            name: name.into(),
        }
    }

    pub fn qualified(table: impl Into<String>, name: impl Into<String>) -> Self {
        SqlExpr::Column {
            table: Some(table.into()),
            name: name.into(),
        }
    }

    pub fn cast(self, data_type: impl Into<String>, try_cast: bool) -> Self {
        SqlExpr::Cast {
            expr: Box::new(self),
            data_type: data_type.into(),
            try_cast,
        }
    }

    pub fn binary(op: SqlBinaryOperator, left: SqlExpr, right: SqlExpr) -> Self {
        SqlExpr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn is_null(self, negated: bool) -> Self {
        SqlExpr::IsNull {
            expr: Box::new(self),
            negated,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlBinaryOperator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl SqlBinaryOperator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SqlBinaryOperator::Eq => "=",
            SqlBinaryOperator::Neq => "!=",
            SqlBinaryOperator::Gt => ">",
            SqlBinaryOperator::Gte => ">=",
            SqlBinaryOperator::Lt => "<",
            SqlBinaryOperator::Lte => "<=",
        }
    }

    /// Map a comparison token (`=`, `<>`, `>=`, ...) to an operator.
    pub fn from_comparison(token: &str) -> Option<Self> {
        let op = match token.trim() {
            "=" | "==" => SqlBinaryOperator::Eq,
            "!=" | "<>" => SqlBinaryOperator::Neq,
            ">" => SqlBinaryOperator::Gt,
            ">=" => SqlBinaryOperator::Gte,
            "<" => SqlBinaryOperator::Lt,
            "<=" => SqlBinaryOperator::Lte,
            _ => return None,
        };
        Some(op)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: SqlExpr,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableRef {
    pub name: String,
    pub alias: Option<String>,
    /// Rendered derived table; when set it replaces `name`.
    pub subquery: Option<String>,
}

impl TableRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            subquery: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlJoinType {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub join_type: SqlJoinType,
    pub lateral: bool,
    pub table: TableRef,
    pub on: Vec<SqlExpr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub expr: SqlExpr,
    pub direction: SortDirection,
}

/// DuckDB `PIVOT (<query>) ON ... USING ... GROUP BY ...`.
#[derive(Debug, Clone, PartialEq)]
pub struct PivotClause {
    pub on: Vec<SqlExpr>,
    pub using: Vec<SelectItem>,
    pub group_by: Vec<SqlExpr>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectQuery {
    pub distinct: bool,
    pub select: Vec<SelectItem>,
    pub from: TableRef,
    pub joins: Vec<Join>,
    pub filters: Vec<SqlExpr>,
    pub group_by: Vec<SqlExpr>,
    pub having: Vec<SqlExpr>,
    pub pivot: Option<PivotClause>,
    pub order_by: Vec<OrderItem>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

pub struct SqlRenderer<'d> {
    dialect: &'d dyn Dialect,
}

impl<'d> SqlRenderer<'d> {
    pub fn new(dialect: &'d dyn Dialect) -> Self {
        Self { dialect }
    }

    pub fn render_select(&self, query: &SelectQuery) -> String {
        let mut sql = self.render_core(query);

        if let Some(pivot) = &query.pivot {
            sql = self.render_pivot(&sql, pivot);
        }

        if !query.order_by.is_empty() {
            let orders: Vec<String> = query
                .order_by
                .iter()
                .map(|o| {
                    let expr = self.render_expr(&o.expr);
                    let dir = match o.direction {
                        SortDirection::Asc => "ASC",
                        SortDirection::Desc => "DESC",
                    };
                    format!("{expr} {dir}")
                })
                .collect();
            sql.push_str(&format!(" ORDER BY {}", orders.join(", ")));
        }

        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = query.offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }

        sql
    }

    /// SELECT through HAVING.
    fn render_core(&self, query: &SelectQuery) -> String {
        let select_items = if query.select.is_empty() {
            "*".to_string()
        } else {
            self.render_select_items(&query.select)
        };

        let distinct = if query.distinct { "DISTINCT " } else { "" };
        let mut sql = format!(
            "SELECT {distinct}{select_items} FROM {}",
            self.render_table_ref(&query.from)
        );

        for join in &query.joins {
            sql.push(' ');
            sql.push_str(&self.render_join(join));
        }

        if !query.filters.is_empty() {
            let filters: Vec<String> = query.filters.iter().map(|f| self.render_expr(f)).collect();
            sql.push_str(&format!(" WHERE {}", filters.join(" AND ")));
        }

        if !query.group_by.is_empty() {
            let groups: Vec<String> = query.group_by.iter().map(|g| self.render_expr(g)).collect();
            sql.push_str(&format!(" GROUP BY {}", groups.join(", ")));
        }

        if !query.having.is_empty() {
            let having: Vec<String> = query.having.iter().map(|h| self.render_expr(h)).collect();
            sql.push_str(&format!(" HAVING {}", having.join(" AND ")));
        }

        sql
    }

    fn render_select_items(&self, items: &[SelectItem]) -> String {
        items
            .iter()
            .map(|item| {
                let expr_sql = self.render_expr(&item.expr);
                match &item.alias {
                    Some(alias) => format!("{expr_sql} AS {}", self.dialect.quote_ident(alias)),
                    None => expr_sql,
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn render_pivot(&self, core: &str, pivot: &PivotClause) -> String {
        let on: Vec<String> = pivot.on.iter().map(|e| self.render_expr(e)).collect();
        let mut sql = format!("PIVOT ({core}) ON {}", on.join(", "));
        if !pivot.using.is_empty() {
            sql.push_str(&format!(" USING {}", self.render_select_items(&pivot.using)));
        }
        if !pivot.group_by.is_empty() {
            let groups: Vec<String> = pivot.group_by.iter().map(|g| self.render_expr(g)).collect();
            sql.push_str(&format!(" GROUP BY {}", groups.join(", ")));
        }
        sql
    }

    fn render_join(&self, join: &Join) -> String {
        let join_kw = match join.join_type {
            SqlJoinType::Inner => "JOIN",
            SqlJoinType::Left => "LEFT JOIN",
            SqlJoinType::Right => "RIGHT JOIN",
            SqlJoinType::Full => "FULL JOIN",
            SqlJoinType::Cross => "CROSS JOIN",
        };
        let lateral = if join.lateral { " LATERAL" } else { "" };
        let table = self.render_table_ref(&join.table);
        if join.join_type == SqlJoinType::Cross {
            return format!("{join_kw}{lateral} {table}");
        }
        let on_clause = if join.on.is_empty() {
            "TRUE".to_string()
        } else {
            join.on
                .iter()
                .map(|e| self.render_expr(e))
                .collect::<Vec<_>>()
                .join(" AND ")
        };
        format!("{join_kw}{lateral} {table} ON {on_clause}")
    }

    fn render_table_ref(&self, table: &TableRef) -> String {
        if let Some(subquery) = &table.subquery {
            let alias = table.alias.as_deref().unwrap_or(&table.name);
            return format!("({subquery}) AS {}", self.dialect.quote_ident(alias));
        }
        match &table.alias {
            Some(alias) => format!(
                "{} AS {}",
                self.dialect.quote_reference(&table.name),
                self.dialect.quote_ident(alias)
            ),
            None => self.dialect.quote_reference(&table.name),
        }
    }

    pub fn render_expr(&self, expr: &SqlExpr) -> String {
        match expr {
            SqlExpr::Column { table, name } => match table {
                Some(t) => format!(
                    "{}.{}",
                    self.dialect.quote_reference(t),
                    self.dialect.quote_ident(name)
                ),
                None => self.dialect.quote_reference(name),
            },
            SqlExpr::Raw(sql) => sql.clone(),
            SqlExpr::Literal(v) => self.dialect.render_literal(v),
            SqlExpr::Star => "*".to_string(),
            SqlExpr::Cast {
                expr,
                data_type,
                try_cast,
            } => self
                .dialect
                .render_cast(&self.render_expr(expr), data_type, *try_cast),
            SqlExpr::Function { name, args } => {
                let rendered_args: Vec<String> = args.iter().map(|a| self.render_expr(a)).collect();
                format!("{name}({})", rendered_args.join(", "))
            }
            SqlExpr::Case {
                branches,
                else_expr,
            } => {
                let mut parts = Vec::new();
                parts.push("CASE".to_string());
                for (when, then) in branches {
                    parts.push(format!(
                        " WHEN {} THEN {}",
                        self.render_expr(when),
                        self.render_expr(then)
                    ));
                }
                if let Some(else_expr) = else_expr {
                    parts.push(format!(" ELSE {}", self.render_expr(else_expr)));
                }
                parts.push(" END".to_string());
                parts.join("")
            }
            SqlExpr::BinaryOp { op, left, right } => format!(
                "({} {} {})",
                self.render_expr(left),
                op.as_sql(),
                self.render_expr(right)
            ),
            SqlExpr::Aggregate { agg, expr } => self
                .dialect
                .render_aggregation(agg, &self.render_expr(expr)),
            SqlExpr::InList {
                expr,
                list,
                negated,
            } => {
                let rendered_values: Vec<String> =
                    list.iter().map(|v| self.render_expr(v)).collect();
                let not_kw = if *negated { "NOT " } else { "" };
                format!(
                    "{} {}IN ({})",
                    self.render_expr(expr),
                    not_kw,
                    rendered_values.join(", ")
                )
            }
            SqlExpr::IsNull { expr, negated } => {
                let not_kw = if *negated { "NOT " } else { "" };
                format!("{} IS {not_kw}NULL", self.render_expr(expr))
            }
            SqlExpr::Between { expr, low, high } => format!(
                "({} BETWEEN {} AND {})",
                self.render_expr(expr),
                self.render_expr(low),
                self.render_expr(high)
            ),
            SqlExpr::Like {
                expr,
                pattern,
                negated,
                case_insensitive,
                escape,
            } => {
                let not_kw = if *negated { "NOT " } else { "" };
                let like_kw = if *case_insensitive { "ILIKE" } else { "LIKE" };
                let escape_sql = match escape {
                    Some(c) => format!(" ESCAPE '{}'", c.to_string().replace('\'', "''")),
                    None => String::new(),
                };
                format!(
                    "({} {not_kw}{like_kw} {}{escape_sql})",
                    self.render_expr(expr),
                    self.render_expr(pattern)
                )
            }
            SqlExpr::Logical { op, items } => match items.as_slice() {
                [] => match op {
                    LogicalOperator::And => "TRUE".to_string(),
                    LogicalOperator::Or => "FALSE".to_string(),
                },
                [single] => self.render_expr(single),
                many => {
                    let rendered: Vec<String> = many.iter().map(|i| self.render_expr(i)).collect();
                    format!("({})", rendered.join(&format!(" {} ", op.as_sql())))
                }
            },
        }
    }
}
