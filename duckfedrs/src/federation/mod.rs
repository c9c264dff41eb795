//! Federated query detection.
//!
//! Works out which external databases a query needs attached, from three inputs: table
//! references parsed out of the SQL text, the explicit table selection, and attachments the
//! user added by hand.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

mod alias;
mod detector;
mod refs;
mod selection;

pub use alias::{
    connection_alias, normalize_connection_name, ConnectionDirectory, ConnectionInfo,
    ConnectionRegistry, DatabaseType,
};
pub use detector::{DetectorState, FederatedQueryDetector, ParsePhase};
pub use refs::{
    extract_table_refs, resolve_references, ResolvedReferences, TableReference, UnrecognizedPrefix,
};
pub use selection::{SelectedTable, TableOrigin, TableSelection};

/// One external connection to `ATTACH` before running a federated query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachDatabase {
    pub connection_id: String,
    pub alias: String,
}

impl AttachDatabase {
    pub fn new(connection_id: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            connection_id: connection_id.into(),
            alias: alias.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Duckdb,
    External,
    Federated,
}

/// Routing descriptor for one execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSource {
    #[serde(rename = "type")]
    pub kind: SourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_type: Option<DatabaseType>,
    #[serde(default)]
    pub attach_databases: Vec<AttachDatabase>,
}

impl TableSource {
    pub fn duckdb() -> Self {
        Self::default()
    }

    /// External source carrying `primary`'s details plus every attachment.
    pub fn external(primary: &ConnectionInfo, attach_databases: Vec<AttachDatabase>) -> Self {
        Self {
            kind: SourceKind::External,
            connection_id: Some(primary.id.clone()),
            connection_name: Some(primary.name.clone()),
            database_type: Some(primary.db_type),
            attach_databases,
        }
    }

    pub fn federated(attach_databases: Vec<AttachDatabase>) -> Self {
        Self {
            kind: SourceKind::Federated,
            attach_databases,
            ..Default::default()
        }
    }

    pub fn is_local(&self) -> bool {
        self.kind == SourceKind::Duckdb
    }
}

/// Where the tables of a query live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryScope {
    #[default]
    Local,
    External,
    Mixed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    pub references: Vec<TableReference>,
    /// Attachments implied by the SQL text alone.
    pub parsed_attachments: Vec<AttachDatabase>,
    /// Selection, parsed and manual attachments merged, one per connection.
    pub attach_databases: Vec<AttachDatabase>,
    pub unrecognized_prefixes: Vec<UnrecognizedPrefix>,
    pub table_source: TableSource,
    pub requires_federated_query: bool,
    pub scope: QueryScope,
}

/// Attachments deduplicated by connection id, first occurrence wins.
pub(crate) fn merge_attachments<'a>(
    groups: impl IntoIterator<Item = &'a [AttachDatabase]>,
) -> Vec<AttachDatabase> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for group in groups {
        for attachment in group {
            if seen.insert(attachment.connection_id.clone()) {
                merged.push(attachment.clone());
            }
        }
    }
    merged
}

/// One-shot detection over the current inputs.
pub fn detect(
    sql: &str,
    selection: &TableSelection,
    manual: &[AttachDatabase],
    directory: &ConnectionDirectory,
    local_schemas: &[String],
) -> Detection {
    let references = extract_table_refs(sql);
    let resolved = resolve_references(&references, directory, local_schemas);
    let from_selection = selection.attachments();

    let attach_databases = merge_attachments([
        from_selection.as_slice(),
        resolved.attachments.as_slice(),
        manual,
    ]);

    let table_source = match attach_databases.first() {
        None => TableSource::duckdb(),
        Some(first) => {
            let primary = selection
                .connections()
                .find(|c| c.id == first.connection_id)
                .cloned()
                .or_else(|| directory.by_id(&first.connection_id).cloned());
            match primary {
                Some(primary) => TableSource::external(&primary, attach_databases.clone()),
                None => TableSource {
                    kind: SourceKind::External,
                    connection_id: Some(first.connection_id.clone()),
                    attach_databases: attach_databases.clone(),
                    ..Default::default()
                },
            }
        }
    };

    let has_local = !resolved.local.is_empty() || selection.has_local_tables();
    let scope = match (attach_databases.is_empty(), has_local) {
        (true, _) => QueryScope::Local,
        (false, false) => QueryScope::External,
        (false, true) => QueryScope::Mixed,
    };

    if !resolved.unrecognized.is_empty() {
        tracing::debug!(
            prefixes = ?resolved.unrecognized.iter().map(|u| u.prefix.as_str()).collect::<Vec<_>>(),
            "unrecognized table prefixes"
        );
    }

    Detection {
        references,
        parsed_attachments: resolved.attachments,
        requires_federated_query: !attach_databases.is_empty(),
        attach_databases,
        unrecognized_prefixes: resolved.unrecognized,
        table_source,
        scope,
    }
}
