use std::{fs, path::Path};

use reportflow::backends::{ConnectionManager, DuckDbStore};
use reportflow::registry::{ColumnDef, EntityDef, SchemaRegistry};
use reportflow::report::{Aggregate, DimensionSpec, MetricSpec, ReportSpec, ValueType};
use reportflow::runtime::{run_report, ReportView};
use reportflow::validation::Validator;
use std::sync::Arc;

fn bootstrap_duckdb(path: &Path) -> anyhow::Result<()> {
    let conn = duckdb::Connection::open(path)?;
    conn.execute_batch(
        "
        CREATE TABLE orders (
            id INTEGER PRIMARY KEY,
            region VARCHAR,
            quarter VARCHAR,
            amount DOUBLE
        );
        INSERT INTO orders VALUES
            (1, 'East', 'Q1', 100.0),
            (2, 'East', 'Q2', 50.0),
            (3, 'West', 'Q1', 75.0);
        ",
    )?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let db_path = Path::new("demo.duckdb");
    if db_path.exists() {
        fs::remove_file(db_path)?;
    }
    bootstrap_duckdb(db_path)?;

    let mut stores = ConnectionManager::new();
    stores.insert("main", Arc::new(DuckDbStore::new(db_path)));

    let registry = SchemaRegistry::from_parts(vec![EntityDef {
        name: "Order".to_string(),
        data_source: "main".to_string(),
        table: "orders".to_string(),
        columns: vec![
            ColumnDef::new("id", ValueType::Integer),
            ColumnDef::new("region", ValueType::String),
            ColumnDef::new("quarter", ValueType::String),
            ColumnDef::new("amount", ValueType::Number),
        ],
        relationships: Default::default(),
        description: None,
    }]);
    let validator = Validator::new(stores.clone(), false);
    validator.validate_registry(&registry).await?;

    let mut spec = ReportSpec::new("Order");
    spec.row_dimensions.push(DimensionSpec::new("region"));
    spec.column_dimensions.push(DimensionSpec::new("quarter"));
    spec.metrics
        .push(MetricSpec::new("amount", Aggregate::Sum).with_alias("revenue_sum"));

    let envelope = run_report(
        &registry,
        &stores,
        &spec,
        ReportView::Pivot {
            include_totals: true,
        },
    )
    .await?;

    println!(
        "executed in {}ms over {} grouped rows",
        envelope.execution_time_ms, envelope.record_count
    );
    println!("{}", serde_json::to_string_pretty(&envelope.data)?);
    Ok(())
}
