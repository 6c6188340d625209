//! Backing-store client implementations.
//!
//! A store accepts the structured query produced by compilation and returns
//! flat records. SQL stores render the query through their dialect; the
//! in-memory store interprets it directly.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{ReportflowConfig, ResolvedDatasourceConfig};
use crate::dialect::Dialect;
use crate::error::Result;
use crate::executor::QueryResult;
use crate::schema_cache::TableSchema;
use crate::sql_ast::SelectQuery;

/// Unified interface for all backing stores.
#[async_trait]
pub trait StoreClient: Send + Sync {
    fn dialect(&self) -> &(dyn Dialect + Send + Sync);
    async fn fetch_schema(&self, table: &str) -> Result<TableSchema>;
    async fn execute(&self, query: &SelectQuery) -> Result<QueryResult>;
}

/// Minimal connection manager keyed by data source name.
#[derive(Clone, Default)]
pub struct ConnectionManager {
    connections: HashMap<String, Arc<dyn StoreClient>>,
    config: Option<ReportflowConfig>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: HashMap::new(),
            config: None,
        }
    }

    /// Create a connection manager with configuration.
    pub fn with_config(config: ReportflowConfig) -> Self {
        Self {
            connections: HashMap::new(),
            config: Some(config),
        }
    }

    pub fn config(&self) -> Option<&ReportflowConfig> {
        self.config.as_ref()
    }

    /// Get resolved configuration for a specific datasource.
    pub fn config_for(&self, name: &str) -> ResolvedDatasourceConfig {
        match &self.config {
            Some(cfg) => cfg.for_datasource(name),
            None => ReportflowConfig::default().for_datasource(name),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, conn: Arc<dyn StoreClient>) {
        self.connections.insert(name.into(), conn);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn StoreClient>> {
        self.connections.get(name)
    }
}

mod memory;
pub use memory::MemoryStore;

#[cfg(feature = "duckdb")]
mod duckdb;
#[cfg(feature = "duckdb")]
pub use duckdb::DuckDbStore;
