//! Visual query configuration: the structured description of a query the UI builds
//! instead of SQL text.
//!
//! Wire shapes are camelCase JSON. Most collections default to empty so partial
//! configurations deserialize; structural problems are reported by the compiler as
//! warnings rather than rejected here.

use std::path::Path;

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{DuckfedError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VisualQueryConfig {
    pub columns: Vec<SelectedColumn>,
    pub calculated_fields: Vec<CalculatedField>,
    pub conditional_fields: Vec<ConditionalField>,
    pub aggregations: Vec<AggregationConfig>,
    pub filters: Vec<FilterNode>,
    pub filter_logic: LogicalOperator,
    pub having: Vec<FilterNode>,
    pub having_logic: LogicalOperator,
    pub group_by: Vec<String>,
    pub order_by: Vec<SortConfig>,
    pub limit: Option<u64>,
    pub distinct: bool,
    pub joins: Vec<JoinConfig>,
    pub json_tables: Vec<JsonTableConfig>,
    pub pivot: Option<PivotConfig>,
}

impl VisualQueryConfig {
    pub fn from_json_str(input: &str) -> Result<Self> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn from_yaml_str(input: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(input)?)
    }

    /// Load a saved configuration; `.yml`/`.yaml` files are YAML, everything else JSON.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yml") | Some("yaml") => Self::from_yaml_str(&contents),
            Some("json") | None => Self::from_json_str(&contents),
            Some(other) => Err(DuckfedError::Validation(format!(
                "unsupported query config extension .{other}"
            ))),
        }
    }

    /// True when nothing at all has been configured.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
            && self.calculated_fields.is_empty()
            && self.conditional_fields.is_empty()
            && self.aggregations.is_empty()
            && self.filters.is_empty()
            && self.having.is_empty()
            && self.group_by.is_empty()
            && self.order_by.is_empty()
            && self.limit.is_none()
            && !self.distinct
            && self.joins.is_empty()
            && self.json_tables.is_empty()
            && self.pivot.is_none()
    }
}

/// A picked column. Accepts a bare string as shorthand for `{ "name": ... }`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedColumn {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl SelectedColumn {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            alias: None,
        }
    }
}

impl<'de> Deserialize<'de> for SelectedColumn {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::String(s) => Ok(SelectedColumn::new(s)),
            other => {
                #[derive(Deserialize)]
                #[serde(rename_all = "camelCase")]
                struct Full {
                    #[serde(alias = "column")]
                    name: String,
                    table: Option<String>,
                    alias: Option<String>,
                }
                let full = Full::deserialize(other).map_err(de::Error::custom)?;
                Ok(SelectedColumn {
                    name: full.name,
                    table: full.table,
                    alias: full.alias,
                })
            }
        }
    }
}

/// `expression AS alias`, optionally cast.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CalculatedField {
    #[serde(alias = "name")]
    pub alias: String,
    pub expression: String,
    pub cast: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConditionalField {
    /// `CASE WHEN ... THEN ... ELSE ... END`.
    Case {
        alias: String,
        #[serde(default)]
        branches: Vec<CaseBranch>,
        #[serde(default, rename = "elseValue", alias = "else_value")]
        else_value: Option<Value>,
    },
    /// Equal-width binning via `WIDTH_BUCKET`.
    Bins {
        alias: String,
        column: String,
        min: f64,
        max: f64,
        buckets: u32,
    },
}

impl ConditionalField {
    pub fn alias(&self) -> &str {
        match self {
            ConditionalField::Case { alias, .. } | ConditionalField::Bins { alias, .. } => alias,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseBranch {
    pub when: FilterNode,
    pub then: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AggregationConfig {
    pub column: String,
    /// Function name as typed by the user (`SUM`, `count_distinct`, ...). Validated at compile time.
    pub function: String,
    pub alias: Option<String>,
    /// Separator for `STRING_AGG`.
    pub separator: Option<String>,
}

impl AggregationConfig {
    pub fn new(function: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            function: function.into(),
            alias: None,
            separator: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    // Basic aggregations
    Sum,
    Count,
    CountDistinct,
    Min,
    Max,
    Avg,
    // Statistical aggregations
    Median,
    Stddev,
    StddevSamp,
    Variance,
    VarianceSamp,
    // List/String aggregations
    StringAgg { separator: String },
    ArrayAgg,
    // Approximate aggregations
    ApproxCountDistinct,
    // First/Last
    First,
    Last,
}

impl Aggregation {
    /// Parse a user-supplied function name. `None` means unsupported.
    pub fn parse(name: &str, separator: Option<&str>) -> Option<Self> {
        let normalized = name.trim().to_ascii_uppercase().replace([' ', '-'], "_");
        let agg = match normalized.as_str() {
            "SUM" => Aggregation::Sum,
            "COUNT" => Aggregation::Count,
            "COUNT_DISTINCT" | "COUNTDISTINCT" => Aggregation::CountDistinct,
            "MIN" => Aggregation::Min,
            "MAX" => Aggregation::Max,
            "AVG" | "AVERAGE" | "MEAN" => Aggregation::Avg,
            "MEDIAN" => Aggregation::Median,
            "STDDEV" | "STDDEV_POP" => Aggregation::Stddev,
            "STDDEV_SAMP" => Aggregation::StddevSamp,
            "VARIANCE" | "VAR_POP" => Aggregation::Variance,
            "VAR_SAMP" | "VARIANCE_SAMP" => Aggregation::VarianceSamp,
            "STRING_AGG" => Aggregation::StringAgg {
                separator: separator.unwrap_or(",").to_string(),
            },
            "ARRAY_AGG" | "LIST" => Aggregation::ArrayAgg,
            "APPROX_COUNT_DISTINCT" => Aggregation::ApproxCountDistinct,
            "FIRST" => Aggregation::First,
            "LAST" => Aggregation::Last,
            _ => return None,
        };
        Some(agg)
    }

    /// Lower-case function name used to build default aliases.
    pub fn name(&self) -> &'static str {
        match self {
            Aggregation::Sum => "sum",
            Aggregation::Count => "count",
            Aggregation::CountDistinct => "count_distinct",
            Aggregation::Min => "min",
            Aggregation::Max => "max",
            Aggregation::Avg => "avg",
            Aggregation::Median => "median",
            Aggregation::Stddev => "stddev",
            Aggregation::StddevSamp => "stddev_samp",
            Aggregation::Variance => "variance",
            Aggregation::VarianceSamp => "var_samp",
            Aggregation::StringAgg { .. } => "string_agg",
            Aggregation::ArrayAgg => "array_agg",
            Aggregation::ApproxCountDistinct => "approx_count_distinct",
            Aggregation::First => "first",
            Aggregation::Last => "last",
        }
    }

    /// Aggregations whose input gets a best-effort numeric cast when the column is not numeric.
    pub fn wants_numeric_input(&self) -> bool {
        matches!(
            self,
            Aggregation::Sum | Aggregation::Avg | Aggregation::Min | Aggregation::Max
        )
    }

    /// Aggregations whose output keeps the input column's type.
    pub fn preserves_input_type(&self) -> bool {
        matches!(
            self,
            Aggregation::Min | Aggregation::Max | Aggregation::First | Aggregation::Last
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOperator {
    #[default]
    #[serde(rename = "AND", alias = "and")]
    And,
    #[serde(rename = "OR", alias = "or")]
    Or,
}

impl LogicalOperator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            LogicalOperator::And => "AND",
            LogicalOperator::Or => "OR",
        }
    }
}

/// A predicate tree node: either a nested group or a single condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterNode {
    Group(FilterGroup),
    Condition(FilterCondition),
}

impl From<FilterCondition> for FilterNode {
    fn from(condition: FilterCondition) -> Self {
        FilterNode::Condition(condition)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterGroup {
    #[serde(default)]
    pub logic: LogicalOperator,
    pub conditions: Vec<FilterNode>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterCondition {
    pub column: String,
    pub table: Option<String>,
    pub operator: FilterOperator,
    pub value: Option<Value>,
    /// IN / NOT IN lists, or the two BETWEEN bounds.
    pub values: Vec<Value>,
    /// Upper bound for BETWEEN when `values` is not used.
    pub second_value: Option<Value>,
    pub value_kind: ValueKind,
    /// Raw SQL for `ValueKind::Expression` right-hand sides and `EXPRESSION` predicates.
    pub expression: Option<String>,
    /// Explicit cast applied to the column before comparing.
    pub cast: Option<String>,
}

impl FilterCondition {
    pub fn new(column: impl Into<String>, operator: FilterOperator) -> Self {
        Self {
            column: column.into(),
            operator,
            ..Default::default()
        }
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_values(mut self, values: Vec<Value>) -> Self {
        self.values = values;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOperator {
    #[default]
    #[serde(rename = "=", alias = "eq", alias = "equals")]
    Eq,
    #[serde(rename = "!=", alias = "<>", alias = "neq", alias = "not_equals")]
    Neq,
    #[serde(rename = ">", alias = "gt")]
    Gt,
    #[serde(rename = "<", alias = "lt")]
    Lt,
    #[serde(rename = ">=", alias = "gte")]
    Gte,
    #[serde(rename = "<=", alias = "lte")]
    Lte,
    #[serde(rename = "IS NULL", alias = "is_null")]
    IsNull,
    #[serde(rename = "IS NOT NULL", alias = "is_not_null")]
    IsNotNull,
    #[serde(rename = "LIKE", alias = "like")]
    Like,
    #[serde(rename = "NOT LIKE", alias = "not_like")]
    NotLike,
    #[serde(rename = "ILIKE", alias = "ilike")]
    ILike,
    #[serde(rename = "CONTAINS", alias = "contains")]
    Contains,
    #[serde(rename = "STARTS_WITH", alias = "starts_with")]
    StartsWith,
    #[serde(rename = "ENDS_WITH", alias = "ends_with")]
    EndsWith,
    #[serde(rename = "BETWEEN", alias = "between")]
    Between,
    #[serde(rename = "IN", alias = "in")]
    In,
    #[serde(rename = "NOT IN", alias = "not_in")]
    NotIn,
    #[serde(rename = "EXPRESSION", alias = "expression")]
    Expression,
}

impl FilterOperator {
    /// SQL token for the plain comparison operators.
    pub fn comparison_sql(&self) -> Option<&'static str> {
        match self {
            FilterOperator::Eq => Some("="),
            FilterOperator::Neq => Some("!="),
            FilterOperator::Gt => Some(">"),
            FilterOperator::Lt => Some("<"),
            FilterOperator::Gte => Some(">="),
            FilterOperator::Lte => Some("<="),
            _ => None,
        }
    }
}

/// How the right-hand side of a comparison is interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    #[default]
    Constant,
    Column,
    Expression,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SortConfig {
    pub column: String,
    pub direction: SortDirection,
    pub cast: Option<SortCast>,
    /// Lower sorts first; unset entries keep their order after prioritised ones.
    pub priority: Option<i32>,
}

impl SortConfig {
    pub fn new(column: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            column: column.into(),
            direction,
            cast: None,
            priority: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    #[serde(rename = "ASC", alias = "asc")]
    Asc,
    #[serde(rename = "DESC", alias = "desc")]
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortCast {
    Numeric,
    Date,
    String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JoinConfig {
    pub table: String,
    pub alias: Option<String>,
    pub join_type: JoinType,
    pub conditions: Vec<JoinCondition>,
}

impl JoinConfig {
    /// Label used to qualify this join's columns.
    pub fn label(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JoinCondition {
    pub left_column: String,
    pub right_column: String,
    pub operator: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinType {
    #[default]
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

/// Lateral expansion of a JSON array column into rows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JsonTableConfig {
    pub source_column: String,
    pub source_table: Option<String>,
    pub alias: String,
    /// JSON path of the array to iterate, e.g. `$.items` or `$.orders[*].lines`.
    pub root_path: String,
    pub join_type: LateralJoinType,
    pub columns: Vec<JsonTableColumn>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LateralJoinType {
    #[default]
    Left,
    Inner,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonTableColumn {
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default = "default_json_column_type")]
    pub data_type: String,
    #[serde(default)]
    pub default_value: Option<Value>,
    /// Emit a 1-based element index instead of an extracted value.
    #[serde(default)]
    pub ordinal: bool,
}

fn default_json_column_type() -> String {
    "VARCHAR".to_string()
}

/// DuckDB `PIVOT` over the compiled query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PivotConfig {
    pub on: Vec<String>,
    pub using: Vec<AggregationConfig>,
    pub group_by: Vec<String>,
}
