//! In-memory store over registered record tables.
//!
//! Interprets the structured query directly: scalar conditions through the
//! shared filter interpreter, aggregation through the aggregate calculator.
//! Joins and existence conditions need a real database and are reported as
//! backend errors. Intended for tests and demos.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::aggregate::{self, compare_values};
use crate::dialect::{Dialect, DuckDbDialect};
use crate::error::{ReportError, Result};
use crate::executor::{ColumnMeta, QueryResult, Record};
use crate::filters::{eval_condition, eval_scalar};
use crate::report::{Aggregate, SortDirection};
use crate::schema_cache::{ColumnSchema, TableSchema};
use crate::sql_ast::{SelectItem, SelectQuery, SqlExpr};

#[derive(Default, Clone)]
pub struct MemoryStore {
    tables: HashMap<String, Vec<Record>>,
    dialect: DuckDbDialect,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: impl Into<String>, rows: Vec<Record>) -> Self {
        self.tables.insert(name.into(), rows);
        self
    }

    pub fn insert_table(&mut self, name: impl Into<String>, rows: Vec<Record>) {
        self.tables.insert(name.into(), rows);
    }

    fn table(&self, name: &str) -> Result<&[Record]> {
        self.tables
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| ReportError::Backend(format!("unknown table {name}")))
    }
}

#[async_trait]
impl super::StoreClient for MemoryStore {
    fn dialect(&self) -> &(dyn Dialect + Send + Sync) {
        // Only consulted when a caller renders the query for display.
        &self.dialect
    }

    async fn fetch_schema(&self, table: &str) -> Result<TableSchema> {
        let rows = self.table(table)?;
        let columns = rows
            .first()
            .map(|row| {
                row.iter()
                    .map(|(name, value)| ColumnSchema {
                        name: name.clone(),
                        data_type: type_name(value).to_string(),
                        nullable: true,
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(TableSchema { columns })
    }

    async fn execute(&self, query: &SelectQuery) -> Result<QueryResult> {
        if !query.joins.is_empty() {
            return Err(ReportError::Backend(
                "joins are not supported by the in-memory store".to_string(),
            ));
        }
        let source = self.table(&query.from.name)?;

        let mut rows: Vec<Record> = Vec::new();
        for record in source {
            let mut keep = true;
            for condition in &query.filters {
                if !eval_condition(record, condition)? {
                    keep = false;
                    break;
                }
            }
            if keep {
                rows.push(record.clone());
            }
        }

        let aggregated = query.select.iter().any(|item| {
            matches!(
                item.expr,
                SqlExpr::Aggregate { .. } | SqlExpr::AggregateStar { .. }
            )
        });

        let mut output = if aggregated || !query.group_by.is_empty() {
            let groups = group_rows(&rows, &query.group_by)?;
            let mut output = Vec::with_capacity(groups.len());
            for group in groups {
                output.push(project_group(&group, &query.select)?);
            }
            output
        } else {
            let mut output = Vec::with_capacity(rows.len());
            for record in &rows {
                let mut projected = Record::new();
                for item in &query.select {
                    projected.insert(select_key(item), eval_scalar(record, &item.expr)?);
                }
                output.push(projected);
            }
            output
        };

        if !query.order_by.is_empty() {
            let order = query.order_by.clone();
            output.sort_by(|a, b| {
                for item in &order {
                    let left = eval_scalar(a, &item.expr).unwrap_or(Value::Null);
                    let right = eval_scalar(b, &item.expr).unwrap_or(Value::Null);
                    let ord = match item.direction {
                        SortDirection::Asc => compare_values(&left, &right),
                        SortDirection::Desc => compare_values(&right, &left),
                    };
                    if !ord.is_eq() {
                        return ord;
                    }
                }
                std::cmp::Ordering::Equal
            });
        }

        let offset = query.offset.unwrap_or(0) as usize;
        if offset > 0 {
            output = output.into_iter().skip(offset).collect();
        }
        if let Some(limit) = query.limit {
            output.truncate(limit as usize);
        }

        let columns = query.select.iter().map(|item| ColumnMeta {
            name: select_key(item),
        });
        Ok(QueryResult {
            columns: columns.collect(),
            rows: output,
        })
    }
}

/// Partition filtered rows by group-by tuple, first-seen order. An empty
/// group-by list yields one group over all rows, matching how a store
/// aggregates an ungrouped query (one result row, even over no input).
fn group_rows(rows: &[Record], group_by: &[SqlExpr]) -> Result<Vec<Vec<Record>>> {
    if group_by.is_empty() {
        return Ok(vec![rows.to_vec()]);
    }
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<Vec<Record>> = Vec::new();
    for record in rows {
        let mut tuple = Vec::with_capacity(group_by.len());
        for expr in group_by {
            tuple.push(eval_scalar(record, expr)?);
        }
        let key = serde_json::to_string(&tuple)?;
        match index.get(&key) {
            Some(&slot) => groups[slot].push(record.clone()),
            None => {
                index.insert(key, groups.len());
                groups.push(vec![record.clone()]);
            }
        }
    }
    Ok(groups)
}

fn project_group(group: &[Record], select: &[SelectItem]) -> Result<Record> {
    let mut projected = Record::new();
    for item in select {
        let value = match &item.expr {
            SqlExpr::Aggregate { agg, expr } => match expr.as_ref() {
                SqlExpr::Column { name, .. } => {
                    aggregate::calculate(group, Some(name), *agg).unwrap_or(Value::Null)
                }
                other => {
                    return Err(ReportError::Backend(format!(
                        "cannot aggregate expression in memory: {other:?}"
                    )))
                }
            },
            SqlExpr::AggregateStar { .. } => {
                aggregate::calculate(group, None, Aggregate::Count).unwrap_or(Value::Null)
            }
            scalar => match group.first() {
                Some(record) => eval_scalar(record, scalar)?,
                None => Value::Null,
            },
        };
        projected.insert(select_key(item), value);
    }
    Ok(projected)
}

fn select_key(item: &SelectItem) -> String {
    if let Some(alias) = &item.alias {
        return alias.clone();
    }
    match &item.expr {
        SqlExpr::Column { name, .. } => name.clone(),
        other => format!("{other:?}"),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "NULL",
        Value::Bool(_) => "BOOLEAN",
        Value::Number(n) if n.is_i64() || n.is_u64() => "BIGINT",
        Value::Number(_) => "DOUBLE",
        Value::String(_) => "VARCHAR",
        Value::Array(_) | Value::Object(_) => "JSON",
    }
}
