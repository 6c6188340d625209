//! Two-axis pivot construction over flat record sets.
//!
//! Each cell re-filters the source records and re-aggregates, which is
//! O(rows x cols x records). Fine at preview scale (a few thousand records);
//! larger sets should be pre-grouped into a map keyed by header tuple before
//! the cell pass.

use serde_json::{Map, Value};
use serde::Serialize;

use crate::aggregate;
use crate::executor::Record;
use crate::report::Aggregate;

/// One metric as the pivot sees it: the record key to aggregate and the
/// aggregate to apply, both for cells and for totals.
#[derive(Debug, Clone)]
pub struct PivotMetric {
    pub alias: String,
    /// Record key holding the values; `None` counts records.
    pub key: Option<String>,
    pub aggregate: Aggregate,
}

impl PivotMetric {
    pub fn new(alias: impl Into<String>, key: impl Into<String>, aggregate: Aggregate) -> Self {
        Self {
            alias: alias.into(),
            key: Some(key.into()),
            aggregate,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PivotTable {
    /// Distinct row-dimension tuples in first-seen order.
    pub row_headers: Vec<Vec<Value>>,
    /// Distinct column-dimension tuples in first-seen order.
    pub column_headers: Vec<Vec<Value>>,
    /// Dense: `data_matrix[i][j]` exists for every header pair, zero-filled
    /// (or null for min/max) where no source records match.
    pub data_matrix: Vec<Vec<Map<String, Value>>>,
    pub row_totals: Vec<Map<String, Value>>,
    pub column_totals: Vec<Map<String, Value>>,
    pub grand_total: Map<String, Value>,
}

/// Reshape `records` into a pivot over the given axes. With both axes empty
/// the result is the empty shape; a single empty axis degrades to a 1-wide or
/// 1-tall matrix through the single-empty-tuple sentinel.
pub fn build_pivot(
    records: &[Record],
    row_dimensions: &[String],
    column_dimensions: &[String],
    metrics: &[PivotMetric],
    include_totals: bool,
) -> PivotTable {
    if row_dimensions.is_empty() && column_dimensions.is_empty() {
        return PivotTable::default();
    }

    let row_headers = distinct_tuples(records, row_dimensions);
    let column_headers = distinct_tuples(records, column_dimensions);

    let mut data_matrix = Vec::with_capacity(row_headers.len());
    for row_header in &row_headers {
        let row_records: Vec<Record> = records
            .iter()
            .filter(|r| tuple_matches(r, row_dimensions, row_header))
            .cloned()
            .collect();
        let mut cells = Vec::with_capacity(column_headers.len());
        for column_header in &column_headers {
            let cell_records: Vec<Record> = row_records
                .iter()
                .filter(|r| tuple_matches(r, column_dimensions, column_header))
                .cloned()
                .collect();
            cells.push(aggregate_metrics(&cell_records, metrics));
        }
        data_matrix.push(cells);
    }

    let (row_totals, column_totals, grand_total) = if include_totals {
        let row_totals = row_headers
            .iter()
            .map(|header| {
                let subset: Vec<Record> = records
                    .iter()
                    .filter(|r| tuple_matches(r, row_dimensions, header))
                    .cloned()
                    .collect();
                aggregate_metrics(&subset, metrics)
            })
            .collect();
        let column_totals = column_headers
            .iter()
            .map(|header| {
                let subset: Vec<Record> = records
                    .iter()
                    .filter(|r| tuple_matches(r, column_dimensions, header))
                    .cloned()
                    .collect();
                aggregate_metrics(&subset, metrics)
            })
            .collect();
        let grand_total = aggregate_metrics(records, metrics);
        (row_totals, column_totals, grand_total)
    } else {
        (Vec::new(), Vec::new(), Map::new())
    };

    PivotTable {
        row_headers,
        column_headers,
        data_matrix,
        row_totals,
        column_totals,
        grand_total,
    }
}

/// Distinct dimension tuples in first-seen order, preserving the source
/// ordering. An empty dimension list yields the single-empty-tuple sentinel.
fn distinct_tuples(records: &[Record], dimensions: &[String]) -> Vec<Vec<Value>> {
    if dimensions.is_empty() {
        return vec![Vec::new()];
    }
    let mut seen: Vec<Vec<Value>> = Vec::new();
    for record in records {
        let tuple: Vec<Value> = dimensions
            .iter()
            .map(|d| record.get(d).cloned().unwrap_or(Value::Null))
            .collect();
        if !seen.contains(&tuple) {
            seen.push(tuple);
        }
    }
    seen
}

/// Null-safe equality of a record against a header tuple.
fn tuple_matches(record: &Record, dimensions: &[String], header: &[Value]) -> bool {
    dimensions.iter().zip(header.iter()).all(|(dimension, expected)| {
        record.get(dimension).unwrap_or(&Value::Null) == expected
    })
}

/// Every metric aggregated over a record subset; totals re-aggregate with the
/// metric's declared kind (a recomputed average, never an average of
/// averages). Sums and counts over an empty subset are zero; min/max are
/// null. Empty metric lists yield empty maps.
fn aggregate_metrics(records: &[Record], metrics: &[PivotMetric]) -> Map<String, Value> {
    let mut out = Map::new();
    for metric in metrics {
        let value = aggregate::calculate(records, metric.key.as_deref(), metric.aggregate)
            .unwrap_or(Value::Null);
        out.insert(metric.alias.clone(), value);
    }
    out
}
