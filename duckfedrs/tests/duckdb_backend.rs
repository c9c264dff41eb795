#![cfg(feature = "duckdb")]
//! Compiled queries executed against a real DuckDB database.

use std::sync::Arc;

use duckfed::backends::{ExecutionBackend, ExecutionContext};
use duckfed::casts::ResolvedCasts;
use duckfed::config::DuckDbConfig;
use duckfed::error::ExecutionError;
use duckfed::federation::{AttachDatabase, TableSource};
use duckfed::metadata::{ColumnMetadataProvider, MetadataCache};
use duckfed::router::{QueryRouter, QueryState};
use duckfed::types::TypeCategory;
use duckfed::{DuckDbBackend, SqlCompiler, VisualQueryConfig};
use serde_json::json;

const SETUP: &str = "
    CREATE TABLE customers (id INTEGER, name VARCHAR, country VARCHAR);
    CREATE TABLE orders (id INTEGER, customer_id INTEGER, amount VARCHAR, placed_on DATE);
    INSERT INTO customers VALUES (1, 'Alice', 'US'), (2, 'Bob', 'UK'), (3, 'Carla', 'US');
    INSERT INTO orders VALUES
        (1, 1, '100.0', DATE '2024-02-29'),
        (2, 1, '50.0', DATE '2024-03-01'),
        (3, 2, '25.0', DATE '2024-03-02'),
        (4, 3, 'n/a', DATE '2024-03-03');
";

async fn seeded() -> Arc<DuckDbBackend> {
    let backend = DuckDbBackend::in_memory().unwrap();
    backend.execute_batch(SETUP).await.unwrap();
    Arc::new(backend)
}

#[tokio::test]
async fn column_metadata_comes_from_table_info() {
    let backend = seeded().await;
    let columns = backend.fetch_columns("orders").await.unwrap();
    let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["id", "customer_id", "amount", "placed_on"]);
    assert_eq!(columns[2].raw_type, "VARCHAR");
    assert_eq!(columns[3].normalized_type, TypeCategory::Date);

    let mut cache = MetadataCache::new();
    let first = cache.get_or_fetch("local", "orders", backend.as_ref()).await.unwrap();
    assert_eq!(first, columns);
    assert_eq!(cache.len(), 1);
    assert!(cache.get("local", "orders").is_some());
}

#[tokio::test]
async fn compiled_aggregate_runs_through_the_router() {
    let backend = seeded().await;
    let mut cache = MetadataCache::new();
    let profiles = cache.get_or_fetch("local", "orders", backend.as_ref()).await.unwrap();

    let config = VisualQueryConfig::from_json_str(
        r#"{
            "columns": ["customers.country"],
            "aggregations": [{"column": "amount", "function": "SUM", "alias": "revenue"},
                             {"column": "*", "function": "COUNT", "alias": "order_count"}],
            "joins": [{"table": "customers",
                       "conditions": [{"leftColumn": "customer_id", "rightColumn": "id"}]}],
            "orderBy": [{"column": "country"}]
        }"#,
    )
    .unwrap();
    let output = SqlCompiler::new().compile(&config, "orders", &profiles, &ResolvedCasts::new());
    assert!(output.success, "{:?}", output.errors);

    let router = QueryRouter::new(backend);
    let result = router.execute(&output.sql, &TableSource::duckdb()).await;
    assert!(result.is_ok(), "{:?}", result.error);
    assert_eq!(result.columns, vec!["country", "revenue", "order_count"]);
    assert_eq!(result.row_count, 2);
    assert_eq!(result.data[0]["country"], json!("UK"));
    assert_eq!(result.data[1]["country"], json!("US"));
    // the unparseable amount is skipped by TRY_CAST but still counted
    assert_eq!(result.data[1]["order_count"], json!(3));
    assert!(matches!(router.state(), QueryState::Ready(_)));
}

#[tokio::test]
async fn dates_come_back_as_iso_strings() {
    let backend = seeded().await;
    let ctx = ExecutionContext::new("r1");
    let response = backend
        .execute_local("SELECT placed_on FROM orders WHERE id = 1", &ctx)
        .await
        .unwrap();
    let rows = duckfed::executor::normalize_rows(&response.columns, response.rows);
    assert_eq!(rows[0]["placed_on"], json!("2024-02-29"));

    let response = backend
        .execute_local(
            "SELECT TIMESTAMP '2024-02-29 08:30:00.25' AS ts, TIME '12:34:56' AS t",
            &ctx,
        )
        .await
        .unwrap();
    let rows = duckfed::executor::normalize_rows(&response.columns, response.rows);
    assert_eq!(rows[0]["ts"], json!("2024-02-29T08:30:00.250"));
    assert_eq!(rows[0]["t"], json!("12:34:56"));
}

#[tokio::test]
async fn sql_errors_surface_on_the_result() {
    let router = QueryRouter::new(seeded().await);
    let result = router
        .execute("SELECT * FROM missing_table", &TableSource::duckdb())
        .await;
    assert!(matches!(result.error, Some(ExecutionError::Failed(_))));
    assert!(result.data.is_empty());
}

#[tokio::test]
async fn federated_queries_need_a_registered_target() {
    let router = QueryRouter::new(seeded().await);
    let result = router
        .execute(
            "SELECT * FROM mysql_shop.orders",
            &TableSource::federated(vec![AttachDatabase::new("c1", "mysql_shop")]),
        )
        .await;
    match result.error {
        Some(ExecutionError::Failed(message)) => assert!(message.contains("c1")),
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn file_databases_are_shared_across_pooled_connections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shop.duckdb");
    let backend = DuckDbBackend::new(&DuckDbConfig {
        path: path.to_string_lossy().into_owned(),
        max_concurrency: 2,
    })
    .unwrap();
    backend.execute_batch(SETUP).await.unwrap();

    let backend = Arc::new(backend);
    let mut handles = Vec::new();
    for i in 0..4 {
        let backend = backend.clone();
        handles.push(tokio::spawn(async move {
            let ctx = ExecutionContext::new(format!("r{i}"));
            backend
                .execute_local("SELECT count(*) AS n FROM customers", &ctx)
                .await
        }));
    }
    for handle in handles {
        let response = handle.await.unwrap().unwrap();
        let rows = duckfed::executor::normalize_rows(&response.columns, response.rows);
        assert_eq!(rows[0]["n"], json!(3));
    }
}
