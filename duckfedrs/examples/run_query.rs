use std::sync::Arc;

use duckfed::{
    casts::ResolvedCasts, metadata::MetadataCache, DuckDbBackend, QueryRouter, SqlCompiler,
    TableSource, VisualQueryConfig,
};

const SETUP: &str = "
    CREATE TABLE customers (
        id INTEGER PRIMARY KEY,
        name VARCHAR,
        country VARCHAR
    );
    CREATE TABLE orders (
        id INTEGER PRIMARY KEY,
        customer_id INTEGER,
        amount VARCHAR,
        created_at TIMESTAMP
    );
    INSERT INTO customers VALUES
        (1, 'Alice', 'US'),
        (2, 'Bob', 'UK'),
        (3, 'Carla', 'US');
    INSERT INTO orders VALUES
        (1, 1, '100.0', '2023-01-01'),
        (2, 1, '50.0', '2023-01-02'),
        (3, 2, '25.0', '2023-01-03');
";

const QUERY: &str = r#"{
    "columns": ["customers.country"],
    "aggregations": [{"column": "amount", "function": "SUM", "alias": "revenue"}],
    "joins": [{
        "table": "customers",
        "conditions": [{"leftColumn": "customer_id", "rightColumn": "id"}]
    }],
    "orderBy": [{"column": "revenue", "direction": "DESC"}]
}"#;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    duckfed::init_tracing();

    let backend = Arc::new(DuckDbBackend::in_memory()?);
    backend.execute_batch(SETUP).await?;

    let mut cache = MetadataCache::new();
    let profiles = cache.get_or_fetch("local", "orders", backend.as_ref()).await?;

    let config = VisualQueryConfig::from_json_str(QUERY)?;
    let output = SqlCompiler::new().compile(&config, "orders", &profiles, &ResolvedCasts::new());
    for warning in &output.warnings {
        eprintln!("warning: {warning}");
    }
    anyhow::ensure!(output.success, "compile failed: {:?}", output.errors);
    println!("{}\n", output.sql);

    let router = QueryRouter::new(backend);
    let result = router.execute(&output.sql, &TableSource::duckdb()).await;
    if let Some(error) = &result.error {
        anyhow::bail!("query failed: {error}");
    }
    println!("{}", serde_json::to_string_pretty(&result.data)?);
    println!("{} rows in {} ms", result.row_count, result.exec_time_ms);
    Ok(())
}
