//! Tables picked for querying.

use std::collections::HashSet;

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::alias::ConnectionInfo;
use super::AttachDatabase;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableOrigin {
    #[default]
    Duckdb,
    External,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedTable {
    pub name: String,
    pub source: TableOrigin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection: Option<ConnectionInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl SelectedTable {
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: TableOrigin::Duckdb,
            connection: None,
            schema: None,
            display_name: None,
        }
    }

    pub fn external(name: impl Into<String>, connection: ConnectionInfo) -> Self {
        Self {
            name: name.into(),
            source: TableOrigin::External,
            connection: Some(connection),
            schema: None,
            display_name: None,
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn connection_id(&self) -> Option<&str> {
        self.connection.as_ref().map(|c| c.id.as_str())
    }

    /// Same source, name, connection id and schema.
    pub fn is_same_table(&self, other: &SelectedTable) -> bool {
        self.source == other.source
            && self.name == other.name
            && self.connection_id() == other.connection_id()
            && self.schema == other.schema
    }

    /// Attachment needed to query this table, if it lives in an external database.
    pub fn attachment(&self) -> Option<AttachDatabase> {
        match (self.source, &self.connection) {
            (TableOrigin::External, Some(conn)) => Some(conn.attachment()),
            _ => None,
        }
    }

    /// Name to use in SQL: `alias[.schema].table` for external tables, `[schema.]table` locally.
    pub fn qualified_name(&self) -> String {
        let mut parts = Vec::new();
        if let Some(attachment) = self.attachment() {
            parts.push(attachment.alias);
        }
        if let Some(schema) = self.schema.as_deref().filter(|s| !s.is_empty()) {
            parts.push(schema.to_string());
        }
        parts.push(self.name.clone());
        parts.join(".")
    }
}

impl<'de> Deserialize<'de> for SelectedTable {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // A plain string is always a local table.
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::String(name) => Ok(SelectedTable::local(name)),
            other => {
                #[derive(Deserialize)]
                #[serde(rename_all = "camelCase")]
                struct Full {
                    name: String,
                    #[serde(default)]
                    source: TableOrigin,
                    connection: Option<ConnectionInfo>,
                    schema: Option<String>,
                    display_name: Option<String>,
                }
                let full = Full::deserialize(other).map_err(de::Error::custom)?;
                Ok(SelectedTable {
                    name: full.name,
                    source: full.source,
                    connection: full.connection,
                    schema: full.schema,
                    display_name: full.display_name,
                })
            }
        }
    }
}

/// Ordered set of selected tables under [`SelectedTable::is_same_table`] identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableSelection {
    tables: Vec<SelectedTable>,
}

impl TableSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the table unless an equivalent one is already selected.
    pub fn add(&mut self, table: SelectedTable) -> bool {
        if self.contains(&table) {
            return false;
        }
        self.tables.push(table);
        true
    }

    pub fn remove(&mut self, table: &SelectedTable) -> Option<SelectedTable> {
        let idx = self.tables.iter().position(|t| t.is_same_table(table))?;
        Some(self.tables.remove(idx))
    }

    pub fn contains(&self, table: &SelectedTable) -> bool {
        self.tables.iter().any(|t| t.is_same_table(table))
    }

    pub fn iter(&self) -> impl Iterator<Item = &SelectedTable> {
        self.tables.iter()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn has_local_tables(&self) -> bool {
        self.tables.iter().any(|t| t.attachment().is_none())
    }

    pub fn uses_connection(&self, connection_id: &str) -> bool {
        self.tables
            .iter()
            .any(|t| t.source == TableOrigin::External && t.connection_id() == Some(connection_id))
    }

    /// One attachment per distinct external connection, in selection order.
    pub fn attachments(&self) -> Vec<AttachDatabase> {
        let mut seen = HashSet::new();
        self.tables
            .iter()
            .filter_map(SelectedTable::attachment)
            .filter(|a| seen.insert(a.connection_id.clone()))
            .collect()
    }

    pub fn connections(&self) -> impl Iterator<Item = &ConnectionInfo> {
        self.tables.iter().filter_map(|t| t.connection.as_ref())
    }
}

impl From<Vec<SelectedTable>> for TableSelection {
    fn from(tables: Vec<SelectedTable>) -> Self {
        let mut selection = TableSelection::new();
        for table in tables {
            selection.add(table);
        }
        selection
    }
}
