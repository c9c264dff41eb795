//! Query execution router.
//!
//! Sends finished SQL to the local or federated path of an [`ExecutionBackend`], tags every
//! call with a fresh request id, and applies only the result of the latest call to its
//! observable state. Earlier calls still complete, but their results are discarded.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::backends::{ExecutionBackend, ExecutionContext};
use crate::error::ExecutionError;
use crate::executor::QueryResult;
use crate::federation::{connection_alias, AttachDatabase, SourceKind, TableSource};

/// What observers of a router see.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum QueryState {
    #[default]
    Idle,
    Loading {
        request_id: String,
    },
    Ready(QueryResult),
    Failed {
        error: ExecutionError,
        /// Last successful result, kept for display.
        last_result: Option<QueryResult>,
    },
}

impl QueryState {
    pub fn is_loading(&self) -> bool {
        matches!(self, QueryState::Loading { .. })
    }
}

struct InFlight {
    request_id: String,
    token: CancellationToken,
}

#[derive(Default)]
struct RouterState {
    current: Option<InFlight>,
    last_request: Option<(String, TableSource)>,
    last_success: Option<QueryResult>,
}

pub struct QueryRouter {
    backend: Arc<dyn ExecutionBackend>,
    state: Mutex<RouterState>,
    tx: watch::Sender<QueryState>,
}

impl QueryRouter {
    pub fn new(backend: Arc<dyn ExecutionBackend>) -> Self {
        let (tx, _rx) = watch::channel(QueryState::Idle);
        Self {
            backend,
            state: Mutex::new(RouterState::default()),
            tx,
        }
    }

    pub fn state(&self) -> QueryState {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<QueryState> {
        self.tx.subscribe()
    }

    /// Id of the request whose result will be applied, if one is running.
    pub async fn current_request_id(&self) -> Option<String> {
        self.state
            .lock()
            .await
            .current
            .as_ref()
            .map(|f| f.request_id.clone())
    }

    /// Execute `sql` against `source`. Failures, including cancellation, are reported in
    /// [`QueryResult::error`]; this never returns early with an error of its own.
    pub async fn execute(&self, sql: &str, source: &TableSource) -> QueryResult {
        let request_id = Uuid::new_v4().to_string();
        let token = CancellationToken::new();
        {
            let mut state = self.state.lock().await;
            if let Some(previous) = state.current.replace(InFlight {
                request_id: request_id.clone(),
                token: token.clone(),
            }) {
                tracing::debug!(
                    superseded = %previous.request_id,
                    request_id = %request_id,
                    "superseding in-flight query"
                );
            }
            state.last_request = Some((sql.to_string(), source.clone()));
        }
        self.tx.send_replace(QueryState::Loading {
            request_id: request_id.clone(),
        });

        let ctx = ExecutionContext {
            request_id: request_id.clone(),
            signal: token.clone(),
        };
        let start = Instant::now();
        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => Err(ExecutionError::Cancelled),
            outcome = self.dispatch(sql, source, &ctx) => outcome,
        };
        let elapsed = start.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(response) => QueryResult::from_response(response, elapsed, request_id.clone()),
            Err(error) => QueryResult::failed(error, elapsed, request_id.clone()),
        };
        tracing::debug!(
            request_id = %request_id,
            kind = ?source.kind,
            rows = result.row_count,
            ms = elapsed,
            error = result.error.as_ref().map(|e| e.to_string()),
            "query executed"
        );
        self.settle(&result).await;
        result
    }

    /// Re-run the last submitted query, if any.
    pub async fn retry(&self) -> Option<QueryResult> {
        let last = self.state.lock().await.last_request.clone();
        match last {
            Some((sql, source)) => Some(self.execute(&sql, &source).await),
            None => None,
        }
    }

    /// Cancel the current query: stop waiting locally, then ask the backend to stop.
    pub async fn cancel(&self) {
        let (in_flight, last_result) = {
            let mut state = self.state.lock().await;
            (state.current.take(), state.last_success.clone())
        };
        let Some(in_flight) = in_flight else {
            return;
        };
        in_flight.token.cancel();
        self.tx.send_replace(QueryState::Failed {
            error: ExecutionError::Cancelled,
            last_result,
        });
        tracing::debug!(request_id = %in_flight.request_id, "query cancelled");

        if let Err(e) = self.backend.cancel(&in_flight.request_id).await {
            tracing::warn!(
                request_id = %in_flight.request_id,
                error = %e,
                "backend cancel failed"
            );
        }
    }

    async fn dispatch(
        &self,
        sql: &str,
        source: &TableSource,
        ctx: &ExecutionContext,
    ) -> std::result::Result<crate::backends::BackendResponse, ExecutionError> {
        match source.kind {
            SourceKind::Duckdb => Ok(self.backend.execute_local(sql, ctx).await?),
            SourceKind::External | SourceKind::Federated => {
                let attachments = attachments_for(source)?;
                Ok(self
                    .backend
                    .execute_federated(sql, &attachments, ctx)
                    .await?)
            }
        }
    }

    /// Apply `result` unless a newer request (or a cancel) has replaced it.
    async fn settle(&self, result: &QueryResult) {
        let mut state = self.state.lock().await;
        let is_current = state
            .current
            .as_ref()
            .is_some_and(|f| f.request_id == result.request_id);
        if !is_current {
            tracing::debug!(request_id = %result.request_id, "discarding stale result");
            return;
        }
        state.current = None;
        let next = match &result.error {
            None => {
                state.last_success = Some(result.clone());
                QueryState::Ready(result.clone())
            }
            Some(error) => QueryState::Failed {
                error: error.clone(),
                last_result: state.last_success.clone(),
            },
        };
        self.tx.send_replace(next);
    }
}

/// Attach list for a non-local source. Older callers only set `connection_id` (plus type and
/// name); those get a single synthesized entry.
pub fn attachments_for(source: &TableSource) -> std::result::Result<Vec<AttachDatabase>, ExecutionError> {
    if !source.attach_databases.is_empty() {
        return Ok(source.attach_databases.clone());
    }
    match (&source.connection_id, source.database_type) {
        (Some(id), Some(db_type)) => {
            let name = source.connection_name.as_deref().unwrap_or(id);
            Ok(vec![AttachDatabase::new(id.clone(), connection_alias(db_type, name))])
        }
        (Some(id), None) => Err(ExecutionError::MissingAttachments(format!(
            "connection `{id}` has no database type to derive an alias from"
        ))),
        (None, _) => Err(ExecutionError::MissingAttachments(
            "no attach databases for an external query".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::federation::DatabaseType;

    #[test]
    fn explicit_attachments_win() {
        let source = TableSource::federated(vec![AttachDatabase::new("c1", "mysql_shop")]);
        assert_eq!(
            attachments_for(&source).unwrap(),
            vec![AttachDatabase::new("c1", "mysql_shop")]
        );
    }

    #[test]
    fn legacy_source_synthesizes_one_attachment() {
        let source = TableSource {
            kind: SourceKind::External,
            connection_id: Some("c9".to_string()),
            connection_name: Some("Sales DB".to_string()),
            database_type: Some(DatabaseType::Postgresql),
            attach_databases: Vec::new(),
        };
        assert_eq!(
            attachments_for(&source).unwrap(),
            vec![AttachDatabase::new("c9", "postgresql_sales_db")]
        );
    }

    #[test]
    fn bare_external_source_is_missing_attachments() {
        let source = TableSource::federated(Vec::new());
        assert!(matches!(
            attachments_for(&source),
            Err(ExecutionError::MissingAttachments(_))
        ));
    }
}
