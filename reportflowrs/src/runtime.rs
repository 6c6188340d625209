//! End-to-end report execution.
//!
//! Validation and compilation run before the store is contacted; a report
//! that fails validation never reaches a backend. Execution time is measured
//! around the store round trip only. Failures are returned to the caller
//! as-is, never retried.

use std::collections::HashMap;
use std::time::Instant;

use serde_json::{Map, Value};

use crate::aggregate::{self, compare_values};
use crate::backends::ConnectionManager;
use crate::error::{ReportError, Result};
use crate::executor::{Record, ReportData, ResultEnvelope};
use crate::pivot::{build_pivot, PivotMetric};
use crate::query_builder::{GroupingStrategy, InMemoryGrouping, QueryBuilder};
use crate::registry::SchemaRegistry;
use crate::report::{Aggregate, ReportSpec, SortDirection};
use crate::template::{Template, ViewType};

/// How the caller wants the result shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportView {
    Flat,
    Pivot { include_totals: bool },
}

/// Execute an ad-hoc report specification.
pub async fn run_report(
    registry: &SchemaRegistry,
    stores: &ConnectionManager,
    spec: &ReportSpec,
    view: ReportView,
) -> Result<ResultEnvelope> {
    let compiled = QueryBuilder::default().compile(registry, spec)?;
    let entity = registry.entity(&spec.model)?;
    let store = stores.get(&entity.data_source).ok_or_else(|| {
        ReportError::Validation(format!(
            "data source {} not registered",
            entity.data_source
        ))
    })?;

    let start = Instant::now();
    let result = store.execute(&compiled.query).await?;
    let execution_time_ms = start.elapsed().as_millis() as u64;

    let rows = match &compiled.grouping {
        GroupingStrategy::Store => result.rows,
        GroupingStrategy::InMemory(grouping) => group_in_memory(result.rows, grouping),
    };
    let record_count = rows.len();
    tracing::debug!(
        model = spec.model.as_str(),
        rows = record_count,
        ms = execution_time_ms,
        "report executed"
    );

    let data = match view {
        ReportView::Flat => ReportData::Flat { rows },
        ReportView::Pivot { include_totals } => {
            let row_dimensions: Vec<String> = spec
                .row_dimensions
                .iter()
                .map(|d| d.output_key())
                .collect();
            let column_dimensions: Vec<String> = spec
                .column_dimensions
                .iter()
                .map(|d| d.output_key())
                .collect();
            let metrics = pivot_metrics(spec);
            let table = build_pivot(
                &rows,
                &row_dimensions,
                &column_dimensions,
                &metrics,
                include_totals,
            );
            ReportData::Pivot { table }
        }
    };

    Ok(ResultEnvelope {
        data,
        dimensions: spec.dimensions().cloned().collect(),
        metrics: spec.metrics.clone(),
        execution_time_ms,
        record_count,
    })
}

/// Execute a stored template with caller-supplied filter values.
pub async fn run_template(
    registry: &SchemaRegistry,
    stores: &ConnectionManager,
    template: &Template,
    overrides: &Map<String, Value>,
    view: Option<ReportView>,
) -> Result<ResultEnvelope> {
    let spec = template.resolved_spec(overrides)?;
    let view = view.unwrap_or(match template.default_view {
        ViewType::Table => ReportView::Flat,
        ViewType::Pivot => ReportView::Pivot {
            include_totals: true,
        },
    });
    run_report(registry, stores, &spec, view).await
}

/// Pivot metrics over already-grouped rows. The fetched rows carry one value
/// per group under each metric alias, so counts re-aggregate as sums of the
/// per-group counts; everything else keeps its declared kind.
fn pivot_metrics(spec: &ReportSpec) -> Vec<PivotMetric> {
    spec.metrics
        .iter()
        .map(|metric| {
            let alias = metric.output_alias();
            let aggregate = match metric.aggregate {
                Aggregate::Count | Aggregate::CountDistinct => Aggregate::Sum,
                other => other,
            };
            PivotMetric {
                alias: alias.clone(),
                key: Some(alias),
                aggregate,
            }
        })
        .collect()
}

/// Grouping pass for reports whose dimensions span joined relations: the
/// store returned row-level records, grouped and aggregated here instead.
fn group_in_memory(rows: Vec<Record>, grouping: &InMemoryGrouping) -> Vec<Record> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut keys: Vec<Vec<Value>> = Vec::new();
    let mut groups: Vec<Vec<Record>> = Vec::new();
    for record in rows {
        let tuple: Vec<Value> = grouping
            .dimensions
            .iter()
            .map(|d| record.get(d).cloned().unwrap_or(Value::Null))
            .collect();
        let key = serde_json::to_string(&tuple).unwrap_or_default();
        match index.get(&key) {
            Some(&slot) => groups[slot].push(record),
            None => {
                index.insert(key, groups.len());
                keys.push(tuple);
                groups.push(vec![record]);
            }
        }
    }

    let mut output: Vec<Record> = keys
        .into_iter()
        .zip(groups.iter())
        .map(|(tuple, group)| {
            let mut record = Record::new();
            for (dimension, value) in grouping.dimensions.iter().zip(tuple) {
                record.insert(dimension.clone(), value);
            }
            for metric in &grouping.metrics {
                let value =
                    aggregate::calculate(group, metric.key.as_deref(), metric.aggregate)
                        .unwrap_or(Value::Null);
                record.insert(metric.alias.clone(), value);
            }
            record
        })
        .collect();

    if !grouping.order_by.is_empty() {
        output.sort_by(|a, b| {
            for item in &grouping.order_by {
                let left = a.get(&item.column).unwrap_or(&Value::Null);
                let right = b.get(&item.column).unwrap_or(&Value::Null);
                let ord = match item.direction {
                    SortDirection::Asc => compare_values(left, right),
                    SortDirection::Desc => compare_values(right, left),
                };
                if !ord.is_eq() {
                    return ord;
                }
            }
            std::cmp::Ordering::Equal
        });
    }

    let offset = grouping.offset.unwrap_or(0) as usize;
    if offset > 0 {
        output = output.into_iter().skip(offset).collect();
    }
    if let Some(limit) = grouping.limit {
        output.truncate(limit as usize);
    }
    output
}
