//! Report compilation: a declarative [`ReportSpec`] becomes a structured
//! [`SelectQuery`] plus a grouping strategy.
//!
//! Every column reference is resolved against the schema registry before it
//! is placed anywhere in the query tree; nothing user-influenced reaches the
//! renderer unvalidated.
//!
//! Grouping happens at the store when all dimensions live on the primary
//! entity. As soon as a dimension references a joined relation the compiler
//! emits a row-level query instead and defers the whole grouping pass to the
//! executor, which aggregates the fetched rows in memory; store-side GROUP BY
//! over join-flattened columns is not attempted.

use std::collections::{HashSet, HashMap};

use crate::error::{ReportError, Result};
use crate::filters;
use crate::registry::{ColumnDef, EntityDef, RelationKind, SchemaRegistry};
use crate::relations::{self, ResolvedRelation};
use crate::report::{
    parse_qualified, Aggregate, DimensionSpec, MetricSpec, OrderItem, ReportSpec, SortDirection,
};
use crate::sql_ast::{
    Join, OrderItem as SqlOrderItem, SelectItem, SelectQuery, SqlExpr, TableRef,
};

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledReport {
    pub query: SelectQuery,
    pub grouping: GroupingStrategy,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GroupingStrategy {
    /// The store returns rows already grouped and aggregated.
    Store,
    /// The store returns row-level records; grouping and aggregation run in
    /// the executor.
    InMemory(InMemoryGrouping),
}

#[derive(Debug, Clone, PartialEq)]
pub struct InMemoryGrouping {
    /// Output keys of the grouping columns, row axis first.
    pub dimensions: Vec<String>,
    pub metrics: Vec<InMemoryMetric>,
    pub order_by: Vec<OrderItem>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InMemoryMetric {
    pub alias: String,
    /// Record key holding the raw values; `None` counts whole records.
    pub key: Option<String>,
    pub aggregate: Aggregate,
}

enum ResolvedColumn<'a> {
    Local(&'a ColumnDef),
    Joined {
        relation: ResolvedRelation<'a>,
        column: &'a ColumnDef,
    },
}

#[derive(Default)]
pub struct QueryBuilder;

impl QueryBuilder {
    pub fn compile(&self, registry: &SchemaRegistry, spec: &ReportSpec) -> Result<CompiledReport> {
        let entity = registry.entity(&spec.model)?;

        if spec.metrics.is_empty() {
            return Err(ReportError::Validation(
                "report requires at least one metric".to_string(),
            ));
        }
        ensure_unique_aliases(&spec.metrics)?;

        // Declared relationship traversals fail fast, referenced or not.
        for name in &spec.relationships {
            relations::resolve(registry, entity, name)?;
        }

        let mut query = SelectQuery {
            from: TableRef::named(entity.table.clone()),
            ..SelectQuery::default()
        };
        let mut joins: Vec<Join> = Vec::new();
        let mut joined: HashSet<String> = HashSet::new();
        let mut register_join = |relation: &ResolvedRelation<'_>, joins: &mut Vec<Join>| {
            if joined.insert(relation.name.to_string()) {
                joins.push(relations::flatten_join(entity, relation));
            }
        };

        let dimensions: Vec<&DimensionSpec> = spec.dimensions().collect();
        let has_joined_dimension = dimensions
            .iter()
            .any(|d| parse_qualified(&d.column).is_some());
        let group_in_store = !has_joined_dimension;

        let mut dimension_exprs: HashMap<String, SqlExpr> = HashMap::new();
        for dimension in &dimensions {
            let expr = match resolve_column(registry, entity, &dimension.column)? {
                ResolvedColumn::Local(column) => SqlExpr::Column {
                    table: Some(entity.table.clone()),
                    name: column.name.clone(),
                },
                ResolvedColumn::Joined { relation, column } => {
                    relations::ensure_groupable(&relation)?;
                    register_join(&relation, &mut joins);
                    SqlExpr::Column {
                        table: Some(relation.name.to_string()),
                        name: column.name.clone(),
                    }
                }
            };
            if group_in_store {
                query.group_by.push(expr.clone());
            }
            dimension_exprs.insert(dimension.output_key(), expr.clone());
            query.select.push(SelectItem {
                expr,
                alias: Some(dimension.output_key()),
            });
        }

        let mut in_memory_metrics = Vec::new();
        for metric in &spec.metrics {
            let alias = metric.output_alias();
            if metric.aggregate == Aggregate::Value && !dimensions.is_empty() {
                return Err(ReportError::InvalidAggregate {
                    column: metric.column.clone(),
                    aggregate: metric.aggregate.as_str().to_string(),
                });
            }
            if metric.column == "*" {
                if metric.aggregate != Aggregate::Count {
                    return Err(ReportError::InvalidAggregate {
                        column: metric.column.clone(),
                        aggregate: metric.aggregate.as_str().to_string(),
                    });
                }
                if group_in_store {
                    query.select.push(SelectItem {
                        expr: SqlExpr::AggregateStar {
                            agg: Aggregate::Count,
                        },
                        alias: Some(alias.clone()),
                    });
                } else {
                    in_memory_metrics.push(InMemoryMetric {
                        alias,
                        key: None,
                        aggregate: Aggregate::Count,
                    });
                }
                continue;
            }

            let expr = match resolve_column(registry, entity, &metric.column)? {
                ResolvedColumn::Local(column) => SqlExpr::Column {
                    table: Some(entity.table.clone()),
                    name: column.name.clone(),
                },
                ResolvedColumn::Joined { relation, column } => {
                    if relation.kind() == RelationKind::Many
                        && metric.aggregate == Aggregate::Value
                    {
                        return Err(ReportError::AmbiguousJoin {
                            relation: relation.name.to_string(),
                            reason: "a to-many relation column needs an aggregate".to_string(),
                        });
                    }
                    register_join(&relation, &mut joins);
                    SqlExpr::Column {
                        table: Some(relation.name.to_string()),
                        name: column.name.clone(),
                    }
                }
            };
            if group_in_store {
                query.select.push(SelectItem {
                    expr: SqlExpr::Aggregate {
                        agg: metric.aggregate,
                        expr: Box::new(expr),
                    },
                    alias: Some(alias),
                });
            } else {
                // Row-level fetch: select the raw column under the metric
                // alias; aggregation happens after the grouping pass.
                query.select.push(SelectItem {
                    expr,
                    alias: Some(alias.clone()),
                });
                in_memory_metrics.push(InMemoryMetric {
                    alias: alias.clone(),
                    key: Some(alias),
                    aggregate: metric.aggregate,
                });
            }
        }

        for filter in &spec.filters {
            match parse_qualified(&filter.column) {
                Some((relation_name, column_name)) => {
                    let relation = relations::resolve(registry, entity, relation_name)?;
                    let column = related_column(&relation, column_name)?;
                    let target = SqlExpr::Column {
                        table: Some(relation.related.table.clone()),
                        name: column.name.clone(),
                    };
                    if let Some(condition) = filters::to_condition(target, filter)? {
                        query
                            .filters
                            .push(relations::existence_filter(entity, &relation, Some(condition)));
                    }
                }
                None => {
                    let column = local_column(entity, &filter.column)?;
                    let target = SqlExpr::Column {
                        table: Some(entity.table.clone()),
                        name: column.name.clone(),
                    };
                    if let Some(condition) = filters::to_condition(target, filter)? {
                        query.filters.push(condition);
                    }
                }
            }
        }

        query.joins = joins;

        let order_by = resolve_ordering(spec, &dimensions)?;
        if group_in_store {
            for item in &order_by {
                let expr = match dimension_exprs.get(&item.column) {
                    Some(expr) => expr.clone(),
                    // Ordering by a metric refers to its select alias.
                    None => SqlExpr::Column {
                        table: None,
                        name: item.column.clone(),
                    },
                };
                query.order_by.push(SqlOrderItem {
                    expr,
                    direction: item.direction,
                });
            }
            query.limit = spec.limit.map(u64::from);
            query.offset = spec.offset.map(u64::from);
            Ok(CompiledReport {
                query,
                grouping: GroupingStrategy::Store,
            })
        } else {
            Ok(CompiledReport {
                query,
                grouping: GroupingStrategy::InMemory(InMemoryGrouping {
                    dimensions: dimensions.iter().map(|d| d.output_key()).collect(),
                    metrics: in_memory_metrics,
                    order_by,
                    limit: spec.limit,
                    offset: spec.offset,
                }),
            })
        }
    }
}

fn ensure_unique_aliases(metrics: &[MetricSpec]) -> Result<()> {
    let mut seen = HashSet::new();
    for metric in metrics {
        let alias = metric.output_alias();
        if !seen.insert(alias.clone()) {
            return Err(ReportError::Validation(format!(
                "duplicate metric alias {alias}"
            )));
        }
    }
    Ok(())
}

/// Explicit ordering if given, else ascending by the first dimension, else
/// none. Order columns must reference a dimension output key or a metric
/// alias; anything else is rejected before the store sees the query.
fn resolve_ordering(
    spec: &ReportSpec,
    dimensions: &[&DimensionSpec],
) -> Result<Vec<OrderItem>> {
    if !spec.order_by.is_empty() {
        let metric_aliases: HashSet<String> =
            spec.metrics.iter().map(|m| m.output_alias()).collect();
        let mut resolved = Vec::new();
        for item in &spec.order_by {
            let known_dimension = dimensions
                .iter()
                .any(|d| d.output_key() == item.column || d.column == item.column);
            if !known_dimension && !metric_aliases.contains(&item.column) {
                return Err(ReportError::Validation(format!(
                    "order_by references unknown field {}",
                    item.column
                )));
            }
            let column = dimensions
                .iter()
                .find(|d| d.column == item.column)
                .map(|d| d.output_key())
                .unwrap_or_else(|| item.column.clone());
            resolved.push(OrderItem {
                column,
                direction: item.direction,
            });
        }
        return Ok(resolved);
    }
    Ok(dimensions
        .first()
        .map(|d| {
            vec![OrderItem {
                column: d.output_key(),
                direction: SortDirection::Asc,
            }]
        })
        .unwrap_or_default())
}

fn resolve_column<'a>(
    registry: &'a SchemaRegistry,
    entity: &'a EntityDef,
    column: &'a str,
) -> Result<ResolvedColumn<'a>> {
    match parse_qualified(column) {
        Some((relation_name, column_name)) => {
            let relation = relations::resolve(registry, entity, relation_name)?;
            let column = related_column(&relation, column_name)?;
            Ok(ResolvedColumn::Joined { relation, column })
        }
        None => Ok(ResolvedColumn::Local(local_column(entity, column)?)),
    }
}

fn local_column<'a>(entity: &'a EntityDef, name: &str) -> Result<&'a ColumnDef> {
    entity.column(name).ok_or_else(|| ReportError::UnknownColumn {
        entity: entity.name.clone(),
        column: name.to_string(),
    })
}

fn related_column<'a>(
    relation: &ResolvedRelation<'a>,
    name: &str,
) -> Result<&'a ColumnDef> {
    relation
        .related
        .column(name)
        .ok_or_else(|| ReportError::UnknownColumn {
            entity: relation.related.name.clone(),
            column: name.to_string(),
        })
}
