use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DuckfedError>;

#[derive(Debug, Error)]
pub enum DuckfedError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("config error: {0}")]
    Config(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("sql generation error: {0}")]
    Sql(String),
    #[error("execution error: {0}")]
    Execution(String),
    #[error("query cancelled")]
    Cancelled,
    #[cfg(feature = "duckdb")]
    #[error("duckdb error: {0}")]
    DuckDb(#[from] duckdb::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Failure recorded on a `QueryResult`.
///
/// Cancellation is its own variant so callers can tell "the user stopped it"
/// apart from "the query failed".
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum ExecutionError {
    #[error("query cancelled")]
    Cancelled,
    #[error("missing attach databases: {0}")]
    MissingAttachments(String),
    #[error("{0}")]
    Failed(String),
}

impl ExecutionError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExecutionError::Cancelled)
    }
}

impl From<DuckfedError> for ExecutionError {
    fn from(err: DuckfedError) -> Self {
        match err {
            DuckfedError::Cancelled => ExecutionError::Cancelled,
            other => ExecutionError::Failed(other.to_string()),
        }
    }
}
