//! DuckDB backend: local execution plus federated execution through `ATTACH`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::config::DuckDbConfig;
use crate::dialect::{Dialect, DuckDbDialect};
use crate::error::{DuckfedError, Result};
use crate::executor::duck_value_to_json;
use crate::federation::{AttachDatabase, DatabaseType};
use crate::metadata::ColumnMetadataProvider;
use crate::types::ColumnProfile;

use super::{BackendResponse, BackendRows, ExecutionBackend, ExecutionContext};

/// Where an external connection lives, for `ATTACH`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachTarget {
    /// Connection string or file path understood by the DuckDB scanner extension.
    pub dsn: String,
    pub db_type: DatabaseType,
}

impl AttachTarget {
    pub fn new(dsn: impl Into<String>, db_type: DatabaseType) -> Self {
        Self {
            dsn: dsn.into(),
            db_type,
        }
    }
}

/// Pooled DuckDB execution.
///
/// Every pooled connection is cloned from one root connection, so they all see the same
/// database, including `:memory:` ones.
#[derive(Clone)]
pub struct DuckDbBackend {
    database_path: String,
    dialect: DuckDbDialect,
    root: Arc<std::sync::Mutex<duckdb::Connection>>,
    limiter: Arc<Semaphore>,
    pool: Arc<Mutex<Vec<duckdb::Connection>>>,
    targets: HashMap<String, AttachTarget>,
    // ATTACH is database-wide; federated runs take turns
    federation: Arc<Mutex<()>>,
}

impl DuckDbBackend {
    pub fn open(path: impl Into<String>) -> Result<Self> {
        Self::new(&DuckDbConfig {
            path: path.into(),
            ..Default::default()
        })
    }

    pub fn in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    pub fn new(config: &DuckDbConfig) -> Result<Self> {
        tracing::info!(
            path = %config.path,
            max_concurrency = config.max_concurrency,
            "creating DuckDB backend"
        );
        let root = if config.path == ":memory:" {
            duckdb::Connection::open_in_memory()?
        } else {
            duckdb::Connection::open(&config.path)?
        };
        Ok(Self {
            database_path: config.path.clone(),
            dialect: DuckDbDialect,
            root: Arc::new(std::sync::Mutex::new(root)),
            limiter: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            pool: Arc::new(Mutex::new(Vec::new())),
            targets: HashMap::new(),
            federation: Arc::new(Mutex::new(())),
        })
    }

    /// Configure maximum concurrent executions.
    pub fn with_max_concurrency(mut self, max_in_flight: usize) -> Self {
        tracing::debug!(max_concurrency = max_in_flight, "configuring DuckDB concurrency");
        self.limiter = Arc::new(Semaphore::new(max_in_flight.max(1)));
        self
    }

    /// Register how to attach `connection_id` for federated queries.
    pub fn with_attach_target(
        mut self,
        connection_id: impl Into<String>,
        target: AttachTarget,
    ) -> Self {
        self.targets.insert(connection_id.into(), target);
        self
    }

    /// Run setup statements (DDL, inserts) on the shared database.
    pub async fn execute_batch(&self, sql: &str) -> Result<()> {
        let sql = sql.to_string();
        self.run_pooled((), move |conn| conn.execute_batch(&sql).map_err(DuckfedError::from))
            .await
    }

    async fn acquire_slot(&self) -> Result<OwnedSemaphorePermit> {
        if self.limiter.available_permits() == 0 {
            tracing::debug!("all DuckDB slots in use, waiting for permit");
        }
        Arc::clone(&self.limiter)
            .acquire_owned()
            .await
            .map_err(|e| DuckfedError::Execution(format!("limiter closed: {e}")))
    }

    /// Run `work` on a pooled connection on the blocking pool.
    ///
    /// The connection goes back to the pool, and `held` is dropped, inside the blocking task
    /// once `work` returns. Dropping the returned future leaves both with the running task.
    async fn run_pooled<T, H, F>(&self, held: H, work: F) -> Result<T>
    where
        T: Send + 'static,
        H: Send + 'static,
        F: FnOnce(&duckdb::Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.checkout_connection().await?;
        let pool = Arc::clone(&self.pool);
        tokio::task::spawn_blocking(move || {
            let result = work(&conn);
            pool.blocking_lock().push(conn);
            drop(held);
            result
        })
        .await
        .map_err(|e| DuckfedError::Execution(format!("task join error: {e}")))?
    }

    async fn checkout_connection(&self) -> Result<duckdb::Connection> {
        let mut guard = self.pool.lock().await;
        if let Some(conn) = guard.pop() {
            tracing::trace!(pool_remaining = guard.len(), "reusing pooled DuckDB connection");
            return Ok(conn);
        }
        drop(guard);
        tracing::debug!(path = %self.database_path, "opening new DuckDB connection");
        let root = self
            .root
            .lock()
            .map_err(|_| DuckfedError::Execution("duckdb root connection poisoned".to_string()))?;
        Ok(root.try_clone()?)
    }

    fn attach_statements(&self, attachments: &[AttachDatabase]) -> Result<(Vec<String>, Vec<String>)> {
        let mut attach = Vec::with_capacity(attachments.len());
        let mut detach = Vec::with_capacity(attachments.len());
        for attachment in attachments {
            let target = self.targets.get(&attachment.connection_id).ok_or_else(|| {
                DuckfedError::Execution(format!(
                    "no attach target registered for connection `{}`",
                    attachment.connection_id
                ))
            })?;
            let alias = self.dialect.quote_ident(&attachment.alias);
            attach.push(format!(
                "ATTACH IF NOT EXISTS {} AS {alias} (TYPE {}, READ_ONLY)",
                self.dialect.render_literal(&Value::String(target.dsn.clone())),
                target.db_type.attach_type(),
            ));
            detach.push(format!("DETACH DATABASE IF EXISTS {alias}"));
        }
        Ok((attach, detach))
    }
}

/// Run `sql` and collect array rows, stopping early once `signal` fires.
fn run_query(
    conn: &duckdb::Connection,
    sql: &str,
    signal: &CancellationToken,
) -> Result<BackendResponse> {
    let start = Instant::now();
    let mut stmt = conn.prepare(sql)?;
    let mut rows_iter = stmt.query([])?;
    let stmt_ref = rows_iter
        .as_ref()
        .ok_or_else(|| DuckfedError::Execution("statement missing".to_string()))?;
    let mut columns = Vec::new();
    for idx in 0..stmt_ref.column_count() {
        let name = stmt_ref
            .column_name(idx)
            .map_err(|e| DuckfedError::Execution(e.to_string()))?;
        columns.push(name.to_string());
    }
    let mut rows = Vec::new();
    while let Some(row) = rows_iter.next()? {
        if signal.is_cancelled() {
            return Err(DuckfedError::Cancelled);
        }
        let mut values = Vec::with_capacity(columns.len());
        for idx in 0..columns.len() {
            values.push(duck_value_to_json(row.get_ref(idx)?.to_owned()));
        }
        rows.push(values);
    }
    Ok(BackendResponse {
        columns,
        rows: BackendRows::Arrays(rows),
        execution_time_ms: Some(start.elapsed().as_millis() as u64),
    })
}

#[async_trait]
impl ExecutionBackend for DuckDbBackend {
    async fn execute_local(&self, sql: &str, ctx: &ExecutionContext) -> Result<BackendResponse> {
        let sql = sql.to_string();
        let signal = ctx.signal.clone();
        let permit = self.acquire_slot().await?;
        let response = self
            .run_pooled(permit, move |conn| run_query(conn, &sql, &signal))
            .await?;
        tracing::debug!(
            request_id = %ctx.request_id,
            columns = response.columns.len(),
            ms = response.execution_time_ms.unwrap_or_default(),
            "duckdb execute_local"
        );
        Ok(response)
    }

    async fn execute_federated(
        &self,
        sql: &str,
        attachments: &[AttachDatabase],
        ctx: &ExecutionContext,
    ) -> Result<BackendResponse> {
        let (attach, detach) = self.attach_statements(attachments)?;
        let sql = sql.to_string();
        let signal = ctx.signal.clone();

        let turn = Arc::clone(&self.federation).lock_owned().await;
        let permit = self.acquire_slot().await?;
        let response = self
            .run_pooled((turn, permit), move |conn| {
                let result = (|| -> Result<BackendResponse> {
                    for statement in &attach {
                        conn.execute_batch(statement)?;
                    }
                    run_query(conn, &sql, &signal)
                })();
                for statement in &detach {
                    if let Err(e) = conn.execute_batch(statement) {
                        tracing::warn!(statement = %statement, error = %e, "detach failed");
                    }
                }
                result
            })
            .await?;
        tracing::debug!(
            request_id = %ctx.request_id,
            attachments = attachments.len(),
            columns = response.columns.len(),
            ms = response.execution_time_ms.unwrap_or_default(),
            "duckdb execute_federated"
        );
        Ok(response)
    }

    async fn cancel(&self, request_id: &str) -> Result<()> {
        // queries poll the router's token between rows
        tracing::debug!(request_id, "duckdb cancel requested");
        Ok(())
    }
}

#[async_trait]
impl ColumnMetadataProvider for DuckDbBackend {
    async fn fetch_columns(&self, table: &str) -> Result<Vec<ColumnProfile>> {
        let pragma_sql = format!(
            "PRAGMA table_info({})",
            self.dialect.render_literal(&Value::String(table.to_string()))
        );
        let table_name = table.to_string();
        self.run_pooled((), move |conn| {
            let start = Instant::now();
            let mut stmt = conn.prepare(&pragma_sql)?;
            let mut rows = stmt.query([])?;
            let mut columns = Vec::new();
            while let Some(row) = rows.next()? {
                let name: String = row.get("name")?;
                let data_type: String = row.get("type")?;
                columns.push(ColumnProfile::new(name, data_type));
            }
            tracing::debug!(
                table = table_name.as_str(),
                columns = columns.len(),
                ms = start.elapsed().as_millis(),
                "duckdb fetch_columns"
            );
            Ok(columns)
        })
        .await
    }
}
