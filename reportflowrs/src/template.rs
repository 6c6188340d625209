//! Saved report templates and their parameterized filters.
//!
//! A template is a named report specification plus presentation metadata for
//! the filters a caller may supply at execution time. Storage and sharing of
//! templates belong to the surrounding application; the core only reads them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ReportError, Result};
use crate::report::{FilterOp, FilterSpec, ReportSpec, PRIMARY_TABLE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ViewType {
    #[default]
    Table,
    Pivot,
}

/// Input widget hint for a builder UI; carried through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    #[default]
    Text,
    Number,
    Select,
    Date,
    Boolean,
}

fn default_operator() -> FilterOp {
    FilterOp::Eq
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateFilter {
    pub column: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default = "default_operator")]
    pub operator: FilterOp,
    #[serde(default)]
    pub input: InputKind,
    #[serde(default)]
    pub options: Vec<Value>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<Value>,
}

impl TemplateFilter {
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.column)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    pub description: Option<String>,
    pub spec: ReportSpec,
    #[serde(default)]
    pub default_view: ViewType,
    #[serde(default)]
    pub filters: Vec<TemplateFilter>,
}

impl Template {
    /// Resolve parameterized filters against caller-supplied overrides: an
    /// override wins, else the stored default, else the filter is skipped
    /// unless marked required.
    pub fn resolve_filters(&self, overrides: &Map<String, Value>) -> Result<Vec<FilterSpec>> {
        let mut resolved = Vec::new();
        for filter in &self.filters {
            let value = overrides
                .get(&filter.column)
                .cloned()
                .or_else(|| filter.default.clone());
            let value = match value {
                Some(value) if !value.is_null() => value,
                _ if filter.operator.is_nullary() => Value::Null,
                _ if filter.required => {
                    return Err(ReportError::MissingRequiredFilter {
                        name: filter.column.clone(),
                    })
                }
                _ => continue,
            };
            resolved.push(FilterSpec {
                column: filter.column.clone(),
                op: filter.operator,
                value,
                table: PRIMARY_TABLE.to_string(),
            });
        }
        Ok(resolved)
    }

    /// The stored specification with parameterized filters appended.
    pub fn resolved_spec(&self, overrides: &Map<String, Value>) -> Result<ReportSpec> {
        let mut spec = self.spec.clone();
        spec.filters.extend(self.resolve_filters(overrides)?);
        Ok(spec)
    }
}
