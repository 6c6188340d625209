//! Relationship traversal strategies.
//!
//! A `one` relation flattens into the parent row through a LEFT JOIN aliased
//! by the relation name; its columns appear in results as
//! `relation_column`. A `many` relation cannot be flattened row-level:
//! as a dimension it is rejected, as a metric it is only admitted under an
//! aggregate (the join multiplies parent rows, which the aggregate absorbs),
//! and as a filter it becomes a filtered existence condition so parent
//! cardinality is preserved.

use crate::error::{ReportError, Result};
use crate::registry::{EntityDef, RelationKind, Relationship, SchemaRegistry};
use crate::sql_ast::{Join, SelectItem, SelectQuery, SqlBinaryOperator, SqlExpr, SqlJoinType, TableRef};

#[derive(Debug, Clone, Copy)]
pub struct ResolvedRelation<'a> {
    pub name: &'a str,
    pub relationship: &'a Relationship,
    pub related: &'a EntityDef,
}

impl<'a> ResolvedRelation<'a> {
    pub fn kind(&self) -> RelationKind {
        self.relationship.kind
    }

    pub fn label(&self) -> &str {
        self.relationship.label.as_deref().unwrap_or(self.name)
    }
}

/// Resolve a named relationship declared on `entity`.
pub fn resolve<'a>(
    registry: &'a SchemaRegistry,
    entity: &'a EntityDef,
    name: &'a str,
) -> Result<ResolvedRelation<'a>> {
    let relationship = entity
        .relationship(name)
        .ok_or_else(|| ReportError::UnknownColumn {
            entity: entity.name.clone(),
            column: name.to_string(),
        })?;
    let related = registry.entity(&relationship.entity)?;
    Ok(ResolvedRelation {
        name,
        relationship,
        related,
    })
}

/// Reject relations that cannot serve as a row-level grouping column.
pub fn ensure_groupable(relation: &ResolvedRelation<'_>) -> Result<()> {
    match relation.kind() {
        RelationKind::One => Ok(()),
        RelationKind::Many => Err(ReportError::AmbiguousJoin {
            relation: relation.name.to_string(),
            reason: "a to-many relation column cannot be used as a dimension without an aggregate"
                .to_string(),
        }),
    }
}

/// LEFT JOIN flattening a relation into the parent row set, aliased by the
/// relation name so column references stay unambiguous.
pub fn flatten_join(parent: &EntityDef, relation: &ResolvedRelation<'_>) -> Join {
    Join {
        join_type: SqlJoinType::Left,
        table: TableRef::aliased(relation.related.table.clone(), relation.name),
        on: vec![SqlExpr::BinaryOp {
            op: SqlBinaryOperator::Eq,
            left: Box::new(SqlExpr::Column {
                table: Some(parent.table.clone()),
                name: relation.relationship.local_key.clone(),
            }),
            right: Box::new(SqlExpr::Column {
                table: Some(relation.name.to_string()),
                name: relation.relationship.foreign_key.clone(),
            }),
        }],
    }
}

/// Filtered existence: parent rows having at least one related record
/// matching `condition`. Used for relation-qualified filters so that a
/// filter never changes the parent row cardinality.
pub fn existence_filter(
    parent: &EntityDef,
    relation: &ResolvedRelation<'_>,
    condition: Option<SqlExpr>,
) -> SqlExpr {
    let correlated = TableRef::named(relation.related.table.clone());
    let mut filters = vec![SqlExpr::BinaryOp {
        op: SqlBinaryOperator::Eq,
        left: Box::new(SqlExpr::Column {
            table: Some(correlated.qualifier().to_string()),
            name: relation.relationship.foreign_key.clone(),
        }),
        right: Box::new(SqlExpr::Column {
            table: Some(parent.table.clone()),
            name: relation.relationship.local_key.clone(),
        }),
    }];
    filters.extend(condition);
    SqlExpr::Exists {
        query: Box::new(SelectQuery {
            select: vec![SelectItem {
                expr: SqlExpr::Literal(serde_json::Value::from(1)),
                alias: None,
            }],
            from: correlated,
            filters,
            ..SelectQuery::default()
        }),
    }
}
