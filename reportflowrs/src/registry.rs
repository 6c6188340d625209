use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use glob::glob;
use serde::{Deserialize, Serialize};

use crate::error::{ReportError, Result};
use crate::report::ValueType;

/// A queryable entity: its physical table, known columns (the allow-list for
/// every dynamically referenced identifier) and declared relationships.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDef {
    pub name: String,
    pub data_source: String,
    pub table: String,
    #[serde(default)]
    pub columns: Vec<ColumnDef>,
    #[serde(default)]
    pub relationships: BTreeMap<String, Relationship>,
    pub description: Option<String>,
}

impl EntityDef {
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.relationships.get(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: ValueType,
    pub label: Option<String>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, kind: ValueType) -> Self {
        Self {
            name: name.into(),
            kind,
            label: None,
        }
    }
}

/// How many related records one parent record can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    One,
    Many,
}

/// A named traversal from one entity to another, keyed by columns on each
/// side. `one` relations may be flattened into parent rows; `many` relations
/// may not without aggregation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub entity: String,
    pub kind: RelationKind,
    pub local_key: String,
    pub foreign_key: String,
    pub label: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct SchemaRegistry {
    pub entities: HashMap<String, EntityDef>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(entities: Vec<EntityDef>) -> Self {
        let mut registry = SchemaRegistry::new();
        for entity in entities {
            registry.entities.insert(entity.name.clone(), entity);
        }
        registry
    }

    /// Load entity definitions from `<root>/entities/*.yml|yaml`.
    pub fn load_from_dir<P: AsRef<Path>>(root: P) -> Result<Self> {
        let mut registry = SchemaRegistry::new();
        registry.load_entities(root.as_ref().join("entities"))?;
        tracing::info!(entities = registry.entities.len(), "schema registry loaded");
        Ok(registry)
    }

    fn load_entities(&mut self, dir: PathBuf) -> Result<()> {
        if !dir.exists() {
            return Err(ReportError::Validation(format!(
                "entities directory not found: {}",
                dir.display()
            )));
        }
        for pattern in ["yml", "yaml"] {
            for entry in glob(&format!("{}/*.{pattern}", dir.display()))
                .map_err(|e| ReportError::Other(e.into()))?
                .flatten()
            {
                self.load_entity_file(&entry)?;
            }
        }
        Ok(())
    }

    fn load_entity_file(&mut self, path: &Path) -> Result<()> {
        let contents = fs::read_to_string(path)?;
        let entity: EntityDef = serde_yaml::from_str(&contents)?;
        self.entities.insert(entity.name.clone(), entity);
        Ok(())
    }

    pub fn exists(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    pub fn get_entity(&self, name: &str) -> Option<&EntityDef> {
        self.entities.get(name)
    }

    /// Entity lookup as an error-producing operation, for compilation paths.
    pub fn entity(&self, name: &str) -> Result<&EntityDef> {
        self.get_entity(name).ok_or_else(|| ReportError::UnknownModel {
            model: name.to_string(),
        })
    }

    /// Candidate grouping/aggregation columns for a builder UI.
    pub fn list_columns(&self, entity: &str) -> Result<&[ColumnDef]> {
        Ok(&self.entity(entity)?.columns)
    }
}
