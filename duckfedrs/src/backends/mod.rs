//! Execution backends.
//!
//! The router talks to a backend only through [`ExecutionBackend`]; concrete engines live in
//! their own files behind feature flags.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::executor::Row;
use crate::federation::AttachDatabase;

/// Per-request data handed to a backend.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub request_id: String,
    /// Triggered when the caller cancels; backends may poll it to stop early.
    pub signal: CancellationToken,
}

impl ExecutionContext {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            signal: CancellationToken::new(),
        }
    }
}

/// Rows in whichever shape the backend produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BackendRows {
    Objects(Vec<Row>),
    Arrays(Vec<Vec<Value>>),
}

impl Default for BackendRows {
    fn default() -> Self {
        BackendRows::Arrays(Vec::new())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendResponse {
    pub columns: Vec<String>,
    pub rows: BackendRows,
    /// Time the backend itself reported, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
}

/// Engine a routed query runs on.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    async fn execute_local(&self, sql: &str, ctx: &ExecutionContext) -> Result<BackendResponse>;

    /// Run `sql` with every database in `attachments` attached under its alias.
    async fn execute_federated(
        &self,
        sql: &str,
        attachments: &[AttachDatabase],
        ctx: &ExecutionContext,
    ) -> Result<BackendResponse>;

    /// Best-effort request to stop `request_id`.
    async fn cancel(&self, request_id: &str) -> Result<()>;
}

#[cfg(feature = "duckdb")]
mod duckdb;
#[cfg(feature = "duckdb")]
pub use duckdb::{AttachTarget, DuckDbBackend};
