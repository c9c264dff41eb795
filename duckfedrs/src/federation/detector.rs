//! Debounced, observable detection over changing SQL text and table selection.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::DetectorConfig;

use super::alias::{ConnectionDirectory, ConnectionRegistry};
use super::selection::{SelectedTable, TableSelection};
use super::{detect, extract_table_refs, resolve_references, AttachDatabase, Detection};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParsePhase {
    /// Nothing parsed yet.
    #[default]
    Idle,
    /// Inputs changed; `detection` still holds the previous result.
    Parsing,
    Parsed,
}

/// Snapshot published to observers after every transition.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectorState {
    pub phase: ParsePhase,
    pub sql: String,
    pub selection: TableSelection,
    pub manual_attachments: Vec<AttachDatabase>,
    pub detection: Detection,
}

struct Inner {
    state: DetectorState,
    pending: Option<JoinHandle<()>>,
    // bumped on every schedule; a timer only parses if it is still the latest
    generation: u64,
}

struct Shared {
    inner: Mutex<Inner>,
    registry: Arc<dyn ConnectionRegistry>,
    local_schemas: Vec<String>,
    tx: watch::Sender<DetectorState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, inner: &Inner) {
        self.tx.send_replace(inner.state.clone());
    }

    fn detect_current(&self, inner: &Inner) -> Detection {
        let directory = ConnectionDirectory::from_registry(self.registry.as_ref());
        detect(
            &inner.state.sql,
            &inner.state.selection,
            &inner.state.manual_attachments,
            &directory,
            &self.local_schemas,
        )
    }

    /// Parse the current inputs; `expected` skips the parse when a newer schedule exists.
    fn parse(&self, expected: Option<u64>) {
        let mut inner = self.lock();
        if expected.is_some_and(|g| g != inner.generation) {
            return;
        }
        let detection = self.detect_current(&inner);
        tracing::debug!(
            attachments = detection.attach_databases.len(),
            unrecognized = detection.unrecognized_prefixes.len(),
            scope = ?detection.scope,
            "federation detection updated"
        );
        inner.state.detection = detection;
        inner.state.phase = ParsePhase::Parsed;
        inner.pending = None;
        self.publish(&inner);
    }

    /// Whether the current selection or SQL text still needs `connection_id`.
    fn still_needed(&self, inner: &Inner, connection_id: &str) -> bool {
        if inner.state.selection.uses_connection(connection_id) {
            return true;
        }
        let directory = ConnectionDirectory::from_registry(self.registry.as_ref());
        let refs = extract_table_refs(&inner.state.sql);
        resolve_references(&refs, &directory, &self.local_schemas)
            .attachments
            .iter()
            .any(|a| a.connection_id == connection_id)
    }

    /// Drop attachments for connections nothing references any more.
    ///
    /// The detection is recomputed right away rather than after the debounce, so the
    /// source never keeps pointing at a pruned connection in between.
    fn prune_orphaned(&self, inner: &mut Inner, removed: &[SelectedTable]) {
        let mut pruned = false;
        for table in removed {
            let Some(connection_id) = table.connection_id() else {
                continue;
            };
            if self.still_needed(inner, connection_id) {
                continue;
            }
            tracing::debug!(connection_id, table = %table.name, "pruning orphaned attachment");
            inner
                .state
                .manual_attachments
                .retain(|a| a.connection_id != connection_id);
            pruned = true;
        }
        if pruned {
            inner.state.detection = self.detect_current(inner);
        }
    }
}

/// Watches SQL text and table selection and keeps the required attachments current.
///
/// Input changes are debounced (`detector.debounce_ms`); only the latest schedule fires.
/// With a zero delay, or outside a tokio runtime, parsing happens inline.
pub struct FederatedQueryDetector {
    shared: Arc<Shared>,
    debounce: Duration,
}

impl FederatedQueryDetector {
    pub fn new(registry: Arc<dyn ConnectionRegistry>, config: &DetectorConfig) -> Self {
        let (tx, _rx) = watch::channel(DetectorState::default());
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    state: DetectorState::default(),
                    pending: None,
                    generation: 0,
                }),
                registry,
                local_schemas: config.local_schemas.clone(),
                tx,
            }),
            debounce: Duration::from_millis(config.debounce_ms),
        }
    }

    pub fn state(&self) -> DetectorState {
        self.shared.lock().state.clone()
    }

    pub fn detection(&self) -> Detection {
        self.shared.lock().state.detection.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DetectorState> {
        self.shared.tx.subscribe()
    }

    pub fn set_sql(&self, sql: impl Into<String>) {
        let sql = sql.into();
        {
            let mut inner = self.shared.lock();
            if inner.state.sql == sql {
                return;
            }
            inner.state.sql = sql;
        }
        self.schedule();
    }

    pub fn set_selected_tables(&self, tables: impl Into<TableSelection>) {
        let tables = tables.into();
        {
            let mut inner = self.shared.lock();
            let old = std::mem::replace(&mut inner.state.selection, tables);
            let removed: Vec<SelectedTable> = old
                .iter()
                .filter(|t| !inner.state.selection.contains(t))
                .cloned()
                .collect();
            self.shared.prune_orphaned(&mut inner, &removed);
            self.shared.publish(&inner);
        }
        self.schedule();
    }

    pub fn add_table(&self, table: SelectedTable) -> bool {
        let added = self.shared.lock().state.selection.add(table);
        if added {
            self.schedule();
        }
        added
    }

    /// Remove a table and, when nothing else needs its connection, that connection's
    /// attachment (including one added by hand).
    pub fn remove_table(&self, table: &SelectedTable) -> bool {
        {
            let mut inner = self.shared.lock();
            let Some(removed) = inner.state.selection.remove(table) else {
                return false;
            };
            self.shared.prune_orphaned(&mut inner, &[removed]);
            self.shared.publish(&inner);
        }
        self.schedule();
        true
    }

    /// Idempotent: a second attachment for the same connection is ignored.
    pub fn add_attachment(&self, attachment: AttachDatabase) -> bool {
        {
            let mut inner = self.shared.lock();
            if inner
                .state
                .manual_attachments
                .iter()
                .any(|a| a.connection_id == attachment.connection_id)
            {
                return false;
            }
            inner.state.manual_attachments.push(attachment);
        }
        self.reparse_now();
        true
    }

    pub fn remove_attachment(&self, connection_id: &str) -> bool {
        let removed = {
            let mut inner = self.shared.lock();
            let before = inner.state.manual_attachments.len();
            inner
                .state
                .manual_attachments
                .retain(|a| a.connection_id != connection_id);
            inner.state.manual_attachments.len() != before
        };
        if removed {
            self.reparse_now();
        }
        removed
    }

    pub fn clear_attachments(&self) {
        self.shared.lock().state.manual_attachments.clear();
        self.reparse_now();
    }

    /// Cancel any pending timer and parse immediately.
    pub fn reparse_now(&self) {
        {
            let mut inner = self.shared.lock();
            inner.generation += 1;
            if let Some(handle) = inner.pending.take() {
                handle.abort();
            }
        }
        self.shared.parse(None);
    }

    fn schedule(&self) {
        let runtime = tokio::runtime::Handle::try_current();
        if self.debounce.is_zero() || runtime.is_err() {
            self.reparse_now();
            return;
        }

        let mut inner = self.shared.lock();
        inner.generation += 1;
        let generation = inner.generation;
        if let Some(handle) = inner.pending.take() {
            handle.abort();
        }
        inner.state.phase = ParsePhase::Parsing;
        self.shared.publish(&inner);

        let shared = Arc::clone(&self.shared);
        let delay = self.debounce;
        if let Ok(runtime) = runtime {
            inner.pending = Some(runtime.spawn(async move {
                tokio::time::sleep(delay).await;
                shared.parse(Some(generation));
            }));
        }
    }
}

impl Drop for FederatedQueryDetector {
    fn drop(&mut self) {
        if let Some(handle) = self.shared.lock().pending.take() {
            handle.abort();
        }
    }
}
