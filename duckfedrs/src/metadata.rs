//! Column metadata: the provider seam and a TTL cache in front of it.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::MetadataCacheConfig;
use crate::error::{DuckfedError, Result};
use crate::types::ColumnProfile;

/// Anything that can describe a table's columns.
#[async_trait]
pub trait ColumnMetadataProvider: Send + Sync {
    async fn fetch_columns(&self, table: &str) -> Result<Vec<ColumnProfile>>;
}

/// Parse a column metadata payload.
///
/// Accepts a bare array or an object with a `columns` array; each entry may use either
/// `{name, type}` or `{column_name, data_type}`.
pub fn parse_column_metadata(json: &str) -> Result<Vec<ColumnProfile>> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Payload {
        List(Vec<ColumnProfile>),
        Wrapped { columns: Vec<ColumnProfile> },
    }
    let payload: Payload = serde_json::from_str(json).map_err(|e| {
        DuckfedError::Validation(format!("unrecognized column metadata payload: {e}"))
    })?;
    Ok(match payload {
        Payload::List(columns) | Payload::Wrapped { columns } => columns,
    })
}

#[derive(Debug, Clone)]
struct CacheEntry {
    columns: Vec<ColumnProfile>,
    inserted_at: Instant,
}

/// Column profiles keyed by (source, table), with TTL and size limits.
#[derive(Debug)]
pub struct MetadataCache {
    entries: HashMap<(String, String), CacheEntry>,
    ttl: Duration,
    max_size: usize,
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::with_config(&MetadataCacheConfig::default())
    }

    pub fn with_config(config: &MetadataCacheConfig) -> Self {
        Self {
            entries: HashMap::new(),
            ttl: Duration::from_secs(config.ttl_secs),
            max_size: config.max_size,
        }
    }

    pub fn insert(&mut self, source: &str, table: &str, columns: Vec<ColumnProfile>) {
        let key = (source.to_string(), table.to_string());
        if self.max_size == 0 {
            return;
        }
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_size {
            self.evict_oldest();
        }
        self.entries.insert(
            key,
            CacheEntry {
                columns,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Cached profiles, or `None` when missing or expired.
    pub fn get(&self, source: &str, table: &str) -> Option<&[ColumnProfile]> {
        let key = (source.to_string(), table.to_string());
        self.entries
            .get(&key)
            .filter(|entry| entry.inserted_at.elapsed() < self.ttl)
            .map(|entry| entry.columns.as_slice())
    }

    /// Cached profiles, fetching from `provider` on a miss.
    pub async fn get_or_fetch(
        &mut self,
        source: &str,
        table: &str,
        provider: &dyn ColumnMetadataProvider,
    ) -> Result<Vec<ColumnProfile>> {
        if let Some(columns) = self.get(source, table) {
            tracing::trace!(source, table, "column metadata cache hit");
            return Ok(columns.to_vec());
        }
        let columns = provider.fetch_columns(table).await?;
        tracing::debug!(source, table, columns = columns.len(), "fetched column metadata");
        self.insert(source, table, columns.clone());
        Ok(columns)
    }

    pub fn invalidate(&mut self, source: &str, table: &str) {
        self.entries.remove(&(source.to_string(), table.to_string()));
    }

    pub fn evict_expired(&mut self) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, entry| entry.inserted_at.elapsed() < ttl);
    }

    fn evict_oldest(&mut self) {
        if let Some(oldest_key) = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.inserted_at)
            .map(|(k, _)| k.clone())
        {
            tracing::debug!(
                source = %oldest_key.0,
                table = %oldest_key.1,
                "evicting oldest column metadata"
            );
            self.entries.remove(&oldest_key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeCategory;

    #[test]
    fn parses_both_field_conventions() {
        let cols = parse_column_metadata(
            r#"[{"name":"id","type":"INTEGER"},{"column_name":"price","data_type":"DECIMAL(18,4)"}]"#,
        )
        .unwrap();
        assert_eq!(cols[0].normalized_type, TypeCategory::Number);
        assert_eq!(cols[1].name, "price");
        assert_eq!(cols[1].normalized_type, TypeCategory::Number);

        let wrapped = parse_column_metadata(r#"{"columns":[{"name":"d","type":"DATE"}]}"#).unwrap();
        assert_eq!(wrapped[0].normalized_type, TypeCategory::Date);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_column_metadata(r#"{"rows": 3}"#).is_err());
    }

    #[test]
    fn evicts_oldest_at_capacity() {
        let mut cache = MetadataCache::with_config(&MetadataCacheConfig {
            ttl_secs: 60,
            max_size: 2,
        });
        cache.insert("local", "a", vec![ColumnProfile::new("x", "INTEGER")]);
        std::thread::sleep(Duration::from_millis(2));
        cache.insert("local", "b", vec![]);
        std::thread::sleep(Duration::from_millis(2));
        cache.insert("local", "c", vec![]);
        assert_eq!(cache.len(), 2);
        assert!(cache.get("local", "a").is_none());
        assert!(cache.get("local", "c").is_some());
    }

    #[test]
    fn zero_ttl_is_always_a_miss() {
        let mut cache = MetadataCache::with_config(&MetadataCacheConfig {
            ttl_secs: 0,
            max_size: 10,
        });
        cache.insert("local", "a", vec![]);
        assert!(cache.get("local", "a").is_none());
        cache.evict_expired();
        assert!(cache.is_empty());
    }
}
