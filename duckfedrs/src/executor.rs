//! Uniform query results.

#[cfg(feature = "duckdb")]
use duckdb::types::Value as DuckValue;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::backends::{BackendResponse, BackendRows};
use crate::error::ExecutionError;

pub type Row = Map<String, Value>;

/// Result of one routed execution. Rows are always column-keyed objects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub data: Vec<Row>,
    pub columns: Vec<String>,
    pub row_count: usize,
    pub exec_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionError>,
    pub request_id: String,
}

impl QueryResult {
    pub fn from_response(
        response: BackendResponse,
        exec_time_ms: u64,
        request_id: impl Into<String>,
    ) -> Self {
        let data = normalize_rows(&response.columns, response.rows);
        Self {
            row_count: data.len(),
            data,
            columns: response.columns,
            exec_time_ms,
            error: None,
            request_id: request_id.into(),
        }
    }

    pub fn failed(
        error: ExecutionError,
        exec_time_ms: u64,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            exec_time_ms,
            error: Some(error),
            request_id: request_id.into(),
            ..Default::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn is_cancelled(&self) -> bool {
        self.error.as_ref().is_some_and(ExecutionError::is_cancelled)
    }
}

/// Key array rows by `columns`, in column order. Short rows are padded with `null`;
/// extra trailing values are dropped. Object rows pass through unchanged.
pub fn normalize_rows(columns: &[String], rows: BackendRows) -> Vec<Row> {
    match rows {
        BackendRows::Objects(rows) => rows,
        BackendRows::Arrays(rows) => rows
            .into_iter()
            .map(|values| {
                let mut values = values.into_iter();
                columns
                    .iter()
                    .map(|name| (name.clone(), values.next().unwrap_or(Value::Null)))
                    .collect()
            })
            .collect(),
    }
}

/// Convert one DuckDB cell to JSON.
///
/// Temporal values become ISO-8601 strings. Integers wider than 64 bits and decimals are
/// strings so no precision is lost; blobs are hex.
#[cfg(feature = "duckdb")]
pub(crate) fn duck_value_to_json(value: DuckValue) -> Value {
    match value {
        DuckValue::Null => Value::Null,
        DuckValue::Boolean(b) => b.into(),
        DuckValue::TinyInt(i) => i.into(),
        DuckValue::SmallInt(i) => i.into(),
        DuckValue::Int(i) => i.into(),
        DuckValue::BigInt(i) => i.into(),
        DuckValue::UTinyInt(i) => i.into(),
        DuckValue::USmallInt(i) => i.into(),
        DuckValue::UInt(i) => i.into(),
        DuckValue::UBigInt(i) => i.into(),
        DuckValue::Float(f) => f.into(),
        DuckValue::Double(f) => f.into(),
        DuckValue::HugeInt(i) => Value::String(i.to_string()),
        DuckValue::Decimal(d) => Value::String(d.to_string()),
        DuckValue::Text(s) | DuckValue::Enum(s) => Value::String(s),
        DuckValue::Blob(bytes) => Value::String(hex::encode(bytes)),
        DuckValue::Date32(days) => temporal::date(days).map_or(Value::from(days), Value::String),
        DuckValue::Timestamp(unit, t) => {
            temporal::timestamp(unit, t).map_or(Value::from(t), Value::String)
        }
        DuckValue::Time64(unit, t) => temporal::time(unit, t).map_or(Value::from(t), Value::String),
        DuckValue::Interval {
            months,
            days,
            nanos,
        } => serde_json::json!({ "months": months, "days": days, "nanos": nanos }),
        DuckValue::List(items) | DuckValue::Array(items) => {
            Value::Array(items.into_iter().map(duck_value_to_json).collect())
        }
        DuckValue::Struct(fields) => Value::Object(
            fields
                .iter()
                .map(|(key, val)| (key.clone(), duck_value_to_json(val.clone())))
                .collect(),
        ),
        DuckValue::Map(entries) => Value::Object(
            entries
                .iter()
                .map(|(key, val)| {
                    let key = match duck_value_to_json(key.clone()) {
                        Value::String(s) => s,
                        other => other.to_string(),
                    };
                    (key, duck_value_to_json(val.clone()))
                })
                .collect(),
        ),
        DuckValue::Union(inner) => duck_value_to_json(*inner),
    }
}

#[cfg(feature = "duckdb")]
mod temporal {
    use chrono::{DateTime, NaiveDate, NaiveTime};
    use duckdb::types::TimeUnit;

    /// `NaiveDate` day number (counted from 0001-01-01 as day 1) of 1970-01-01.
    const UNIX_EPOCH_FROM_CE: i32 = 719_163;

    fn to_micros(unit: TimeUnit, value: i64) -> i64 {
        match unit {
            TimeUnit::Second => value.saturating_mul(1_000_000),
            TimeUnit::Millisecond => value.saturating_mul(1_000),
            TimeUnit::Microsecond => value,
            TimeUnit::Nanosecond => value / 1_000,
        }
    }

    /// `YYYY-MM-DD` for days since the Unix epoch.
    pub(super) fn date(days: i32) -> Option<String> {
        let date = NaiveDate::from_num_days_from_ce_opt(days.checked_add(UNIX_EPOCH_FROM_CE)?)?;
        Some(date.format("%Y-%m-%d").to_string())
    }

    /// `YYYY-MM-DDTHH:MM:SS[.ffffff]`; DuckDB timestamps carry no zone.
    pub(super) fn timestamp(unit: TimeUnit, value: i64) -> Option<String> {
        let ts = DateTime::from_timestamp_micros(to_micros(unit, value))?;
        Some(ts.naive_utc().format("%Y-%m-%dT%H:%M:%S%.f").to_string())
    }

    /// `HH:MM:SS[.ffffff]` for a time since midnight.
    pub(super) fn time(unit: TimeUnit, value: i64) -> Option<String> {
        let micros = to_micros(unit, value);
        let secs = u32::try_from(micros.div_euclid(1_000_000)).ok()?;
        let nanos = u32::try_from(micros.rem_euclid(1_000_000) * 1_000).ok()?;
        let time = NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)?;
        Some(time.format("%H:%M:%S%.f").to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn array_rows_are_keyed_in_column_order() {
        let columns = vec!["b".to_string(), "a".to_string(), "c".to_string()];
        let rows = BackendRows::Arrays(vec![vec![json!(1), json!("x")]]);
        let out = normalize_rows(&columns, rows);
        let keys: Vec<&String> = out[0].keys().collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
        assert_eq!(out[0]["b"], json!(1));
        assert_eq!(out[0]["a"], json!("x"));
        assert_eq!(out[0]["c"], Value::Null);
    }

    #[cfg(feature = "duckdb")]
    #[test]
    fn temporal_values_render_as_iso_8601() {
        use duckdb::types::TimeUnit;

        assert_eq!(duck_value_to_json(DuckValue::Date32(0)), json!("1970-01-01"));
        assert_eq!(duck_value_to_json(DuckValue::Date32(19_782)), json!("2024-02-29"));
        assert_eq!(duck_value_to_json(DuckValue::Date32(-1)), json!("1969-12-31"));
        assert_eq!(
            duck_value_to_json(DuckValue::Timestamp(
                TimeUnit::Microsecond,
                1_700_000_000_000_000
            )),
            json!("2023-11-14T22:13:20")
        );
        assert_eq!(
            duck_value_to_json(DuckValue::Timestamp(TimeUnit::Millisecond, 1_700_000_000_123)),
            json!("2023-11-14T22:13:20.123")
        );
        assert_eq!(
            duck_value_to_json(DuckValue::Time64(TimeUnit::Microsecond, 45_296_000_000)),
            json!("12:34:56")
        );
    }

    #[cfg(feature = "duckdb")]
    #[test]
    fn out_of_range_temporals_keep_the_raw_number() {
        use duckdb::types::TimeUnit;

        assert_eq!(
            duck_value_to_json(DuckValue::Time64(TimeUnit::Second, -5)),
            json!(-5)
        );
        assert_eq!(
            duck_value_to_json(DuckValue::Date32(i32::MAX)),
            json!(i32::MAX)
        );
    }
}
