use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::config::SchemaCacheConfig;

#[derive(Debug, Clone)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

/// Live column layout of one physical table, as reported by a store.
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    schema: TableSchema,
    inserted_at: Instant,
}

/// Schema cache with TTL and size limits, keyed by (data source, table).
#[derive(Debug)]
pub struct SchemaCache {
    schemas: HashMap<(String, String), CacheEntry>,
    ttl: Duration,
    max_size: usize,
}

impl Default for SchemaCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::with_config(&SchemaCacheConfig::default())
    }

    pub fn with_config(config: &SchemaCacheConfig) -> Self {
        Self {
            schemas: HashMap::new(),
            ttl: Duration::from_secs(config.ttl_secs),
            max_size: config.max_size,
        }
    }

    pub fn insert(&mut self, data_source: String, table: String, schema: TableSchema) {
        if self.schemas.len() >= self.max_size {
            self.evict_oldest();
        }
        self.schemas.insert(
            (data_source, table),
            CacheEntry {
                schema,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn get(&self, data_source: &str, table: &str) -> Option<&TableSchema> {
        let key = (data_source.to_string(), table.to_string());
        self.schemas.get(&key).and_then(|entry| {
            if entry.inserted_at.elapsed() < self.ttl {
                Some(&entry.schema)
            } else {
                None
            }
        })
    }

    /// Remove expired entries.
    pub fn evict_expired(&mut self) {
        self.schemas
            .retain(|_, entry| entry.inserted_at.elapsed() < self.ttl);
    }

    fn evict_oldest(&mut self) {
        if let Some(oldest_key) = self
            .schemas
            .iter()
            .min_by_key(|(_, entry)| entry.inserted_at)
            .map(|(k, _)| k.clone())
        {
            tracing::debug!(
                data_source = %oldest_key.0,
                table = %oldest_key.1,
                "evicting oldest schema from cache"
            );
            self.schemas.remove(&oldest_key);
        }
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    pub fn clear(&mut self) {
        self.schemas.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(columns: &[&str]) -> TableSchema {
        TableSchema {
            columns: columns
                .iter()
                .map(|name| ColumnSchema {
                    name: name.to_string(),
                    data_type: "VARCHAR".to_string(),
                    nullable: true,
                })
                .collect(),
        }
    }

    #[test]
    fn size_bound_evicts_oldest() {
        let mut cache = SchemaCache::with_config(&SchemaCacheConfig {
            ttl_secs: 3600,
            max_size: 2,
        });
        cache.insert("ds".into(), "a".into(), schema(&["x"]));
        cache.insert("ds".into(), "b".into(), schema(&["y"]));
        cache.insert("ds".into(), "c".into(), schema(&["z"]));
        assert_eq!(cache.len(), 2);
        assert!(cache.get("ds", "c").is_some());
    }

    #[test]
    fn ttl_expiry_is_a_miss() {
        let mut cache = SchemaCache::with_config(&SchemaCacheConfig {
            ttl_secs: 0,
            max_size: 10,
        });
        cache.insert("ds".into(), "a".into(), schema(&["x"]));
        assert!(cache.get("ds", "a").is_none());
        cache.evict_expired();
        assert!(cache.is_empty());
    }
}
