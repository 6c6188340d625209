use std::collections::HashSet;
use std::sync::Mutex;

use crate::backends::ConnectionManager;
use crate::config::ReportflowConfig;
use crate::error::{ReportError, Result};
use crate::registry::{EntityDef, SchemaRegistry};
use crate::schema_cache::{SchemaCache, TableSchema};

/// Cross-checks declared entities against the live schemas of their backing
/// stores, and relationship declarations against the registry itself.
pub struct Validator {
    stores: ConnectionManager,
    cache: Mutex<SchemaCache>,
    warn_only: bool,
}

impl Validator {
    pub fn new(stores: ConnectionManager, warn_only: bool) -> Self {
        Self {
            stores,
            cache: Mutex::new(SchemaCache::new()),
            warn_only,
        }
    }

    pub fn with_config(stores: ConnectionManager, config: &ReportflowConfig) -> Self {
        Self {
            stores,
            cache: Mutex::new(SchemaCache::with_config(&config.defaults.schema_cache)),
            warn_only: config.defaults.validation.warn_only,
        }
    }

    pub async fn validate_registry(&self, registry: &SchemaRegistry) -> Result<()> {
        for entity in registry.entities.values() {
            let schema = self.ensure_schema(&entity.data_source, &entity.table).await?;
            self.validate_entity(entity, &schema)?;
        }
        for entity in registry.entities.values() {
            self.validate_relationships(entity, registry)?;
        }
        Ok(())
    }

    async fn ensure_schema(&self, data_source: &str, table: &str) -> Result<TableSchema> {
        if let Some(schema) = self.cache.lock().unwrap().get(data_source, table).cloned() {
            return Ok(schema);
        }
        let store = self
            .stores
            .get(data_source)
            .ok_or_else(|| {
                ReportError::Validation(format!("unknown data source {data_source}"))
            })?
            .clone();
        let schema = store.fetch_schema(table).await?;
        self.cache.lock().unwrap().insert(
            data_source.to_string(),
            table.to_string(),
            schema.clone(),
        );
        Ok(schema)
    }

    fn validate_entity(&self, entity: &EntityDef, schema: &TableSchema) -> Result<()> {
        let mut declared = HashSet::new();
        for column in &entity.columns {
            self.check(
                declared.insert(column.name.clone()),
                format!(
                    "duplicate column {} declared on entity {}",
                    column.name, entity.name
                ),
            )?;
            self.check(
                schema.has_column(&column.name),
                format!(
                    "column {} declared on entity {} missing from table {}",
                    column.name, entity.name, entity.table
                ),
            )?;
        }
        Ok(())
    }

    fn validate_relationships(&self, entity: &EntityDef, registry: &SchemaRegistry) -> Result<()> {
        for (name, relationship) in &entity.relationships {
            let target = match registry.get_entity(&relationship.entity) {
                Some(target) => target,
                None => {
                    self.check(
                        false,
                        format!(
                            "relationship {name} on {} targets unknown entity {}",
                            entity.name, relationship.entity
                        ),
                    )?;
                    continue;
                }
            };
            self.check(
                entity.has_column(&relationship.local_key),
                format!(
                    "relationship {name} local key {} missing on entity {}",
                    relationship.local_key, entity.name
                ),
            )?;
            self.check(
                target.has_column(&relationship.foreign_key),
                format!(
                    "relationship {name} foreign key {} missing on entity {}",
                    relationship.foreign_key, target.name
                ),
            )?;
        }
        Ok(())
    }

    fn check(&self, condition: bool, message: String) -> Result<()> {
        if condition {
            return Ok(());
        }
        if self.warn_only {
            tracing::warn!("{message}");
            Ok(())
        } else {
            Err(ReportError::Validation(message))
        }
    }
}
