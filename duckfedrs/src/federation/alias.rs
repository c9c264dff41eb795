//! External connections and the aliases they are attached under.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::AttachDatabase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    Mysql,
    #[serde(alias = "postgres")]
    Postgresql,
    Sqlite,
}

impl DatabaseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseType::Mysql => "mysql",
            DatabaseType::Postgresql => "postgresql",
            DatabaseType::Sqlite => "sqlite",
        }
    }

    /// `TYPE` argument of DuckDB's `ATTACH`.
    pub fn attach_type(&self) -> &'static str {
        match self {
            DatabaseType::Mysql => "mysql",
            DatabaseType::Postgresql => "postgres",
            DatabaseType::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowercase, non-alphanumerics to `_`, runs collapsed, edges trimmed; empty becomes `db`.
pub fn normalize_connection_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "db".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Deterministic alias a connection is attached under: `<type>_<normalized name>`.
pub fn connection_alias(db_type: DatabaseType, name: &str) -> String {
    format!("{}_{}", db_type.as_str(), normalize_connection_name(name))
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub db_type: DatabaseType,
}

impl ConnectionInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>, db_type: DatabaseType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            db_type,
        }
    }

    pub fn alias(&self) -> String {
        connection_alias(self.db_type, &self.name)
    }

    pub fn attachment(&self) -> AttachDatabase {
        AttachDatabase::new(self.id.clone(), self.alias())
    }
}

/// Source of the known external connections.
pub trait ConnectionRegistry: Send + Sync {
    fn connections(&self) -> Vec<ConnectionInfo>;
}

impl ConnectionRegistry for Vec<ConnectionInfo> {
    fn connections(&self) -> Vec<ConnectionInfo> {
        self.clone()
    }
}

/// Alias and id lookup over a registry snapshot.
#[derive(Debug, Clone, Default)]
pub struct ConnectionDirectory {
    by_alias: HashMap<String, ConnectionInfo>,
    by_id: HashMap<String, ConnectionInfo>,
}

impl ConnectionDirectory {
    pub fn new(connections: Vec<ConnectionInfo>) -> Self {
        let mut directory = Self::default();
        for conn in connections {
            let alias = conn.alias();
            if let Some(existing) = directory.by_alias.get(&alias) {
                tracing::warn!(
                    alias = %alias,
                    kept = %existing.id,
                    ignored = %conn.id,
                    "two connections share an alias"
                );
            } else {
                directory.by_alias.insert(alias, conn.clone());
            }
            directory.by_id.entry(conn.id.clone()).or_insert(conn);
        }
        directory
    }

    pub fn from_registry(registry: &dyn ConnectionRegistry) -> Self {
        Self::new(registry.connections())
    }

    /// Case-sensitive alias lookup.
    pub fn by_alias(&self, alias: &str) -> Option<&ConnectionInfo> {
        self.by_alias.get(alias)
    }

    pub fn by_id(&self, id: &str) -> Option<&ConnectionInfo> {
        self.by_id.get(id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_are_normalized() {
        assert_eq!(connection_alias(DatabaseType::Mysql, "Orders"), "mysql_orders");
        assert_eq!(
            connection_alias(DatabaseType::Postgresql, "  Prod DB -- EU!! "),
            "postgresql_prod_db_eu"
        );
        assert_eq!(connection_alias(DatabaseType::Sqlite, "***"), "sqlite_db");
    }

    #[test]
    fn postgres_spelling_deserializes() {
        let info: ConnectionInfo =
            serde_json::from_str(r#"{"id":"c1","name":"x","type":"postgres"}"#).unwrap();
        assert_eq!(info.db_type, DatabaseType::Postgresql);
        assert_eq!(info.db_type.attach_type(), "postgres");
    }

    #[test]
    fn directory_lookup_is_case_sensitive() {
        let dir = ConnectionDirectory::new(vec![ConnectionInfo::new(
            "c1",
            "orders",
            DatabaseType::Mysql,
        )]);
        assert!(dir.by_alias("mysql_orders").is_some());
        assert!(dir.by_alias("MYSQL_ORDERS").is_none());
        assert_eq!(dir.by_id("c1").map(|c| c.name.as_str()), Some("orders"));
    }
}
