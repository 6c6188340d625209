pub mod aggregate;
pub mod backends;
pub mod config;
pub mod dialect;
pub mod error;
pub mod executor;
pub mod filters;
pub mod pivot;
pub mod query_builder;
pub mod registry;
pub mod relations;
pub mod report;
pub mod runtime;
pub mod schema_cache;
pub mod sql_ast;
pub mod template;
pub mod validation;

use std::path::Path;

use crate::error::Result;

/// Load entity definitions from disk and validate them with the provided validator.
pub async fn load_and_validate<P: AsRef<Path>>(
    model_dir: P,
    validator: &crate::validation::Validator,
) -> Result<SchemaRegistry> {
    let registry = SchemaRegistry::load_from_dir(model_dir)?;
    validator.validate_registry(&registry).await?;
    Ok(registry)
}

pub use crate::validation::Validator;
#[cfg(feature = "duckdb")]
pub use backends::DuckDbStore;
pub use backends::{ConnectionManager, MemoryStore, StoreClient};
pub use config::ReportflowConfig;
pub use error::ReportError;
pub use executor::{QueryResult, Record, ReportData, ResultEnvelope};
pub use pivot::{build_pivot, PivotMetric, PivotTable};
pub use query_builder::{CompiledReport, GroupingStrategy, QueryBuilder};
pub use registry::{EntityDef, SchemaRegistry};
pub use report::{
    Aggregate, DimensionSpec, FilterOp, FilterSpec, MetricSpec, ReportSpec, SortDirection,
};
pub use runtime::{run_report, run_template, ReportView};
pub use schema_cache::TableSchema;
pub use template::{Template, TemplateFilter, ViewType};
