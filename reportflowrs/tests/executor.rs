//! End-to-end execution tests over the in-memory store.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use reportflow::backends::{ConnectionManager, MemoryStore, StoreClient};
use reportflow::dialect::{Dialect, DuckDbDialect};
use reportflow::error::Result;
use reportflow::executor::{QueryResult, Record, ReportData};
use reportflow::registry::{ColumnDef, EntityDef, RelationKind, Relationship, SchemaRegistry};
use reportflow::report::{
    Aggregate, DimensionSpec, FilterOp, FilterSpec, MetricSpec, ReportSpec, ValueType,
};
use reportflow::runtime::{run_report, run_template, ReportView};
use reportflow::schema_cache::TableSchema;
use reportflow::sql_ast::SelectQuery;
use reportflow::template::{InputKind, Template, TemplateFilter, ViewType};
use reportflow::ReportError;
use serde_json::{json, Map, Value};

// ============================================================================
// Fixtures
// ============================================================================

fn sales_registry() -> SchemaRegistry {
    let orders = EntityDef {
        name: "Order".to_string(),
        data_source: "main".to_string(),
        table: "orders".to_string(),
        columns: vec![
            ColumnDef::new("id", ValueType::Integer),
            ColumnDef::new("region", ValueType::String),
            ColumnDef::new("quarter", ValueType::String),
            ColumnDef::new("status", ValueType::String),
            ColumnDef::new("amount", ValueType::Number),
            ColumnDef::new("customer_id", ValueType::Integer),
        ],
        relationships: [(
            "customer".to_string(),
            Relationship {
                entity: "Customer".to_string(),
                kind: RelationKind::One,
                local_key: "customer_id".to_string(),
                foreign_key: "id".to_string(),
                label: None,
            },
        )]
        .into_iter()
        .collect(),
        description: None,
    };
    let customers = EntityDef {
        name: "Customer".to_string(),
        data_source: "main".to_string(),
        table: "customers".to_string(),
        columns: vec![
            ColumnDef::new("id", ValueType::Integer),
            ColumnDef::new("country", ValueType::String),
        ],
        relationships: Default::default(),
        description: None,
    };
    SchemaRegistry::from_parts(vec![orders, customers])
}

fn order_rows() -> Vec<Record> {
    [
        json!({"id": 1, "region": "East", "quarter": "Q1", "status": "open", "amount": 10, "customer_id": 1}),
        json!({"id": 2, "region": "East", "quarter": "Q2", "status": "shipped", "amount": 20, "customer_id": 1}),
        json!({"id": 3, "region": "West", "quarter": "Q1", "status": "open", "amount": 30, "customer_id": 2}),
    ]
    .into_iter()
    .map(|v| v.as_object().unwrap().clone())
    .collect()
}

fn memory_stores(rows: Vec<Record>) -> ConnectionManager {
    let mut stores = ConnectionManager::new();
    stores.insert(
        "main",
        Arc::new(MemoryStore::new().with_table("orders", rows)),
    );
    stores
}

fn sum_spec() -> ReportSpec {
    let mut spec = ReportSpec::new("Order");
    spec.metrics.push(MetricSpec::new("amount", Aggregate::Sum));
    spec
}

fn flat_rows(data: &ReportData) -> &[Record] {
    match data {
        ReportData::Flat { rows } => rows,
        other => panic!("expected flat data, got {other:?}"),
    }
}

// ============================================================================
// Ad-hoc execution
// ============================================================================

#[tokio::test]
async fn metrics_without_dimensions_return_one_row() {
    let envelope = run_report(
        &sales_registry(),
        &memory_stores(order_rows()),
        &sum_spec(),
        ReportView::Flat,
    )
    .await
    .unwrap();

    assert_eq!(envelope.record_count, 1);
    let rows = flat_rows(&envelope.data);
    assert_eq!(rows[0]["amount_sum"], json!(60));
    assert!(envelope.dimensions.is_empty());
    assert_eq!(envelope.metrics.len(), 1);
}

#[tokio::test]
async fn grouped_report_orders_by_first_dimension() {
    let mut spec = sum_spec();
    spec.row_dimensions.push(DimensionSpec::new("region"));
    let envelope = run_report(
        &sales_registry(),
        &memory_stores(order_rows()),
        &spec,
        ReportView::Flat,
    )
    .await
    .unwrap();

    let rows = flat_rows(&envelope.data);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["region"], json!("East"));
    assert_eq!(rows[0]["amount_sum"], json!(30));
    assert_eq!(rows[1]["region"], json!("West"));
    assert_eq!(rows[1]["amount_sum"], json!(30));
}

#[tokio::test]
async fn aggregates_over_no_matching_rows_are_zero() {
    let mut spec = ReportSpec::new("Order");
    spec.metrics.push(MetricSpec::new("amount", Aggregate::Sum));
    spec.metrics.push(MetricSpec::new("amount", Aggregate::Avg));
    spec.metrics.push(MetricSpec::new("amount", Aggregate::Count));
    spec.filters
        .push(FilterSpec::new("status", FilterOp::Eq, json!("cancelled")));
    let envelope = run_report(
        &sales_registry(),
        &memory_stores(order_rows()),
        &spec,
        ReportView::Flat,
    )
    .await
    .unwrap();

    let rows = flat_rows(&envelope.data);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["amount_sum"], json!(0));
    assert_eq!(rows[0]["amount_avg"], json!(0));
    assert_eq!(rows[0]["amount_count"], json!(0));
}

#[tokio::test]
async fn between_filter_selects_inclusive_range() {
    let mut spec = sum_spec();
    spec.filters
        .push(FilterSpec::new("amount", FilterOp::Between, json!([10, 20])));
    let envelope = run_report(
        &sales_registry(),
        &memory_stores(order_rows()),
        &spec,
        ReportView::Flat,
    )
    .await
    .unwrap();
    assert_eq!(flat_rows(&envelope.data)[0]["amount_sum"], json!(30));
}

#[tokio::test]
async fn between_filter_with_one_value_filters_nothing() {
    let mut spec = sum_spec();
    spec.filters
        .push(FilterSpec::new("amount", FilterOp::Between, json!([10])));
    let envelope = run_report(
        &sales_registry(),
        &memory_stores(order_rows()),
        &spec,
        ReportView::Flat,
    )
    .await
    .unwrap();
    assert_eq!(flat_rows(&envelope.data)[0]["amount_sum"], json!(60));
}

// ============================================================================
// Pivot execution
// ============================================================================

#[tokio::test]
async fn pivot_with_totals_over_grouped_rows() {
    let rows = [
        json!({"id": 1, "region": "East", "quarter": "Q1", "status": "open", "amount": 100, "customer_id": 1}),
        json!({"id": 2, "region": "East", "quarter": "Q2", "status": "open", "amount": 50, "customer_id": 1}),
        json!({"id": 3, "region": "West", "quarter": "Q1", "status": "open", "amount": 75, "customer_id": 2}),
    ]
    .into_iter()
    .map(|v| v.as_object().unwrap().clone())
    .collect();

    let mut spec = ReportSpec::new("Order");
    spec.row_dimensions.push(DimensionSpec::new("region"));
    spec.column_dimensions.push(DimensionSpec::new("quarter"));
    spec.metrics
        .push(MetricSpec::new("amount", Aggregate::Sum).with_alias("revenue_sum"));

    let envelope = run_report(
        &sales_registry(),
        &memory_stores(rows),
        &spec,
        ReportView::Pivot {
            include_totals: true,
        },
    )
    .await
    .unwrap();

    let table = match &envelope.data {
        ReportData::Pivot { table } => table,
        other => panic!("expected pivot data, got {other:?}"),
    };
    assert_eq!(table.row_headers, vec![vec![json!("East")], vec![json!("West")]]);
    assert_eq!(table.column_headers, vec![vec![json!("Q1")], vec![json!("Q2")]]);
    assert_eq!(table.data_matrix[0][0]["revenue_sum"], json!(100));
    assert_eq!(table.data_matrix[0][1]["revenue_sum"], json!(50));
    assert_eq!(table.data_matrix[1][0]["revenue_sum"], json!(75));
    assert_eq!(table.data_matrix[1][1]["revenue_sum"], json!(0));
    assert_eq!(table.row_totals[0]["revenue_sum"], json!(150));
    assert_eq!(table.row_totals[1]["revenue_sum"], json!(75));
    assert_eq!(table.column_totals[0]["revenue_sum"], json!(175));
    assert_eq!(table.column_totals[1]["revenue_sum"], json!(50));
    assert_eq!(table.grand_total["revenue_sum"], json!(225));
    // Underlying record count is the grouped row count, not the cell count.
    assert_eq!(envelope.record_count, 3);
}

#[tokio::test]
async fn count_metrics_merge_as_sums_when_pivoted() {
    let mut spec = ReportSpec::new("Order");
    spec.row_dimensions.push(DimensionSpec::new("region"));
    spec.column_dimensions.push(DimensionSpec::new("quarter"));
    spec.metrics.push(MetricSpec::new("id", Aggregate::Count));

    let envelope = run_report(
        &sales_registry(),
        &memory_stores(order_rows()),
        &spec,
        ReportView::Pivot {
            include_totals: true,
        },
    )
    .await
    .unwrap();

    let table = match &envelope.data {
        ReportData::Pivot { table } => table,
        other => panic!("expected pivot data, got {other:?}"),
    };
    // Three orders in total, one per (region, quarter) group here.
    assert_eq!(table.grand_total["id_count"], json!(3));
}

// ============================================================================
// Joined dimensions: in-memory grouping over row-level fetches
// ============================================================================

/// Store standing in for a database that performed the join: returns fixed
/// row-level records for whatever query it receives.
struct StubStore {
    rows: Vec<Record>,
}

#[async_trait]
impl StoreClient for StubStore {
    fn dialect(&self) -> &(dyn Dialect + Send + Sync) {
        &DuckDbDialect
    }

    async fn fetch_schema(&self, _table: &str) -> Result<TableSchema> {
        Ok(TableSchema { columns: Vec::new() })
    }

    async fn execute(&self, _query: &SelectQuery) -> Result<QueryResult> {
        Ok(QueryResult {
            columns: Vec::new(),
            rows: self.rows.clone(),
        })
    }
}

#[tokio::test]
async fn joined_dimensions_group_in_memory() {
    let row_level = [
        json!({"customer_country": "US", "amount_sum": 100}),
        json!({"customer_country": "US", "amount_sum": 50}),
        json!({"customer_country": "UK", "amount_sum": 25}),
    ]
    .into_iter()
    .map(|v| v.as_object().unwrap().clone())
    .collect();

    let mut stores = ConnectionManager::new();
    stores.insert("main", Arc::new(StubStore { rows: row_level }));

    let mut spec = sum_spec();
    spec.row_dimensions
        .push(DimensionSpec::new("customer.country"));

    let envelope = run_report(&sales_registry(), &stores, &spec, ReportView::Flat)
        .await
        .unwrap();

    let rows = flat_rows(&envelope.data);
    assert_eq!(rows.len(), 2);
    // Default ordering: ascending by the first dimension.
    assert_eq!(rows[0]["customer_country"], json!("UK"));
    assert_eq!(rows[0]["amount_sum"], json!(25));
    assert_eq!(rows[1]["customer_country"], json!("US"));
    assert_eq!(rows[1]["amount_sum"], json!(150));
}

// ============================================================================
// Failure paths
// ============================================================================

/// Store that records how often it is asked to execute.
struct SpyStore {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl StoreClient for SpyStore {
    fn dialect(&self) -> &(dyn Dialect + Send + Sync) {
        &DuckDbDialect
    }

    async fn fetch_schema(&self, _table: &str) -> Result<TableSchema> {
        Ok(TableSchema { columns: Vec::new() })
    }

    async fn execute(&self, _query: &SelectQuery) -> Result<QueryResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(QueryResult {
            columns: Vec::new(),
            rows: Vec::new(),
        })
    }
}

#[tokio::test]
async fn validation_failures_never_reach_the_store() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut stores = ConnectionManager::new();
    stores.insert(
        "main",
        Arc::new(SpyStore {
            calls: calls.clone(),
        }),
    );

    let mut spec = ReportSpec::new("Order");
    spec.metrics.push(MetricSpec::new("discount", Aggregate::Sum));

    let err = run_report(&sales_registry(), &stores, &spec, ReportView::Flat)
        .await
        .unwrap_err();
    assert!(matches!(err, ReportError::UnknownColumn { .. }));
    assert!(err.is_bad_request());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

struct FailingStore;

#[async_trait]
impl StoreClient for FailingStore {
    fn dialect(&self) -> &(dyn Dialect + Send + Sync) {
        &DuckDbDialect
    }

    async fn fetch_schema(&self, _table: &str) -> Result<TableSchema> {
        Err(ReportError::Backend("connection refused".to_string()))
    }

    async fn execute(&self, _query: &SelectQuery) -> Result<QueryResult> {
        Err(ReportError::Backend("connection refused".to_string()))
    }
}

#[tokio::test]
async fn backend_failures_surface_unchanged() {
    let mut stores = ConnectionManager::new();
    stores.insert("main", Arc::new(FailingStore));

    let err = run_report(&sales_registry(), &stores, &sum_spec(), ReportView::Flat)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "backend_execution");
    assert!(!err.is_bad_request());
}

// ============================================================================
// Templates
// ============================================================================

fn status_template(required: bool, default: Option<Value>) -> Template {
    let mut spec = sum_spec();
    spec.row_dimensions.push(DimensionSpec::new("region"));
    Template {
        name: "sales-by-region".to_string(),
        description: Some("Order totals per region".to_string()),
        spec,
        default_view: ViewType::Table,
        filters: vec![TemplateFilter {
            column: "status".to_string(),
            label: Some("Status".to_string()),
            operator: FilterOp::Eq,
            input: InputKind::Select,
            options: vec![json!("open"), json!("shipped")],
            required,
            default,
        }],
    }
}

#[tokio::test]
async fn template_applies_caller_override() {
    let mut overrides = Map::new();
    overrides.insert("status".to_string(), json!("open"));
    let envelope = run_template(
        &sales_registry(),
        &memory_stores(order_rows()),
        &status_template(true, None),
        &overrides,
        None,
    )
    .await
    .unwrap();

    let rows = flat_rows(&envelope.data);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["amount_sum"], json!(10));
    assert_eq!(rows[1]["amount_sum"], json!(30));
}

#[tokio::test]
async fn template_falls_back_to_stored_default() {
    let envelope = run_template(
        &sales_registry(),
        &memory_stores(order_rows()),
        &status_template(false, Some(json!("shipped"))),
        &Map::new(),
        None,
    )
    .await
    .unwrap();

    let rows = flat_rows(&envelope.data);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["amount_sum"], json!(20));
}

#[tokio::test]
async fn required_template_filter_without_value_fails() {
    let err = run_template(
        &sales_registry(),
        &memory_stores(order_rows()),
        &status_template(true, None),
        &Map::new(),
        None,
    )
    .await
    .unwrap_err();
    match err {
        ReportError::MissingRequiredFilter { name } => assert_eq!(name, "status"),
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn template_default_view_selects_pivot() {
    let mut template = status_template(false, None);
    template.default_view = ViewType::Pivot;
    template.spec.column_dimensions.push(DimensionSpec::new("quarter"));

    let envelope = run_template(
        &sales_registry(),
        &memory_stores(order_rows()),
        &template,
        &Map::new(),
        None,
    )
    .await
    .unwrap();
    assert!(matches!(envelope.data, ReportData::Pivot { .. }));
}
