//! Routing, result normalization, supersession and cancellation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use duckfed::backends::{BackendResponse, BackendRows, ExecutionBackend, ExecutionContext};
use duckfed::error::{DuckfedError, ExecutionError, Result};
use duckfed::federation::{AttachDatabase, DatabaseType, SourceKind, TableSource};
use duckfed::router::{QueryRouter, QueryState};
use serde_json::{json, Value};
use tokio::sync::Notify;

/// Backend whose behavior is keyed off the SQL text.
#[derive(Default)]
struct ScriptedBackend {
    local_calls: AtomicUsize,
    federated_calls: Mutex<Vec<Vec<AttachDatabase>>>,
    cancelled: Mutex<Vec<String>>,
    started: Notify,
    gate: Notify,
    fail_cancel: bool,
}

impl ScriptedBackend {
    async fn respond(&self, sql: &str) -> Result<BackendResponse> {
        if sql.contains("slow") {
            self.started.notify_one();
            self.gate.notified().await;
        }
        if sql.contains("broken") {
            return Err(DuckfedError::Execution("Parser Error: syntax error".to_string()));
        }
        Ok(BackendResponse {
            columns: vec!["id".to_string(), "name".to_string()],
            rows: BackendRows::Arrays(vec![vec![json!(1), json!("a")], vec![json!(2)]]),
            execution_time_ms: None,
        })
    }
}

#[async_trait]
impl ExecutionBackend for ScriptedBackend {
    async fn execute_local(&self, sql: &str, _ctx: &ExecutionContext) -> Result<BackendResponse> {
        self.local_calls.fetch_add(1, Ordering::SeqCst);
        self.respond(sql).await
    }

    async fn execute_federated(
        &self,
        sql: &str,
        attachments: &[AttachDatabase],
        _ctx: &ExecutionContext,
    ) -> Result<BackendResponse> {
        self.federated_calls
            .lock()
            .unwrap()
            .push(attachments.to_vec());
        self.respond(sql).await
    }

    async fn cancel(&self, request_id: &str) -> Result<()> {
        self.cancelled.lock().unwrap().push(request_id.to_string());
        if self.fail_cancel {
            return Err(DuckfedError::Execution("cancel endpoint unreachable".to_string()));
        }
        Ok(())
    }
}

fn router_with(backend: Arc<ScriptedBackend>) -> Arc<QueryRouter> {
    Arc::new(QueryRouter::new(backend))
}

#[tokio::test]
async fn local_rows_are_normalized_to_objects() {
    let backend = Arc::new(ScriptedBackend::default());
    let router = router_with(backend.clone());

    let result = router.execute("SELECT id, name FROM t", &TableSource::duckdb()).await;
    assert!(result.is_ok());
    assert_eq!(result.columns, vec!["id", "name"]);
    assert_eq!(result.row_count, 2);
    assert_eq!(result.data[0]["name"], json!("a"));
    assert_eq!(result.data[1]["name"], Value::Null);
    assert_eq!(backend.local_calls.load(Ordering::SeqCst), 1);
    assert!(!result.request_id.is_empty());
    assert_eq!(router.state(), QueryState::Ready(result));
}

#[tokio::test]
async fn federated_source_without_attachments_fails_fast() {
    let backend = Arc::new(ScriptedBackend::default());
    let router = router_with(backend.clone());

    let result = router
        .execute("SELECT 1", &TableSource::federated(Vec::new()))
        .await;
    assert!(matches!(
        result.error,
        Some(ExecutionError::MissingAttachments(_))
    ));
    assert!(backend.federated_calls.lock().unwrap().is_empty());
    assert!(matches!(router.state(), QueryState::Failed { .. }));
}

#[tokio::test]
async fn federated_sources_forward_their_attachments() {
    let backend = Arc::new(ScriptedBackend::default());
    let router = router_with(backend.clone());
    let attachments = vec![
        AttachDatabase::new("c1", "mysql_orders"),
        AttachDatabase::new("c2", "postgresql_events"),
    ];

    let result = router
        .execute("SELECT 1", &TableSource::federated(attachments.clone()))
        .await;
    assert!(result.is_ok());

    let legacy = TableSource {
        kind: SourceKind::External,
        connection_id: Some("c1".to_string()),
        connection_name: Some("Orders".to_string()),
        database_type: Some(DatabaseType::Mysql),
        attach_databases: Vec::new(),
    };
    router.execute("SELECT 1", &legacy).await;

    let calls = backend.federated_calls.lock().unwrap().clone();
    assert_eq!(calls[0], attachments);
    assert_eq!(calls[1], vec![AttachDatabase::new("c1", "mysql_orders")]);
    assert_eq!(backend.local_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failures_keep_the_last_good_result() {
    let backend = Arc::new(ScriptedBackend::default());
    let router = router_with(backend.clone());

    let good = router.execute("SELECT 1", &TableSource::duckdb()).await;
    let bad = router.execute("SELECT broken", &TableSource::duckdb()).await;
    assert!(matches!(bad.error, Some(ExecutionError::Failed(ref m)) if m.contains("syntax error")));
    assert!(!bad.is_cancelled());

    match router.state() {
        QueryState::Failed { error, last_result } => {
            assert!(matches!(error, ExecutionError::Failed(_)));
            assert_eq!(last_result, Some(good));
        }
        other => panic!("unexpected state {other:?}"),
    }

    let again = router.retry().await.expect("a previous request");
    assert!(again.error.is_some());
    assert_eq!(backend.local_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn cancelling_mid_flight_reports_cancellation() {
    let backend = Arc::new(ScriptedBackend {
        fail_cancel: true,
        ..Default::default()
    });
    let router = router_with(backend.clone());

    let running = {
        let router = router.clone();
        tokio::spawn(async move { router.execute("SELECT slow", &TableSource::duckdb()).await })
    };
    backend.started.notified().await;
    assert!(router.state().is_loading());
    let in_flight = router.current_request_id().await.expect("request in flight");

    router.cancel().await;
    assert!(router.current_request_id().await.is_none());

    let result = running.await.unwrap();
    assert!(result.is_cancelled());
    assert_eq!(result.request_id, in_flight);
    assert_eq!(*backend.cancelled.lock().unwrap(), vec![in_flight]);
    assert!(matches!(
        router.state(),
        QueryState::Failed {
            error: ExecutionError::Cancelled,
            ..
        }
    ));
}

#[tokio::test]
async fn superseded_results_are_discarded() {
    let backend = Arc::new(ScriptedBackend::default());
    let router = router_with(backend.clone());

    let slow = {
        let router = router.clone();
        tokio::spawn(async move { router.execute("SELECT slow", &TableSource::duckdb()).await })
    };
    backend.started.notified().await;

    let fast = router.execute("SELECT fast", &TableSource::duckdb()).await;
    assert_eq!(router.state(), QueryState::Ready(fast.clone()));

    backend.gate.notify_one();
    let late = slow.await.unwrap();
    // the superseded call still completes for its caller
    assert!(late.is_ok());
    assert_ne!(late.request_id, fast.request_id);
    assert_eq!(router.state(), QueryState::Ready(fast));
}

#[tokio::test]
async fn cancel_without_a_query_is_a_no_op() {
    let backend = Arc::new(ScriptedBackend::default());
    let router = router_with(backend.clone());
    router.cancel().await;
    assert_eq!(router.state(), QueryState::Idle);
    assert!(backend.cancelled.lock().unwrap().is_empty());
    assert!(router.retry().await.is_none());
}
