//! Structured query representation handed to backing-store adapters.
//!
//! Compilation produces this tree; rendering to SQL text happens separately
//! through a [`Dialect`], so no user-influenced identifier is ever spliced
//! into a string before it has been validated against the schema registry.

use serde_json::Value;

use crate::dialect::Dialect;
use crate::report::{Aggregate, SortDirection};

#[derive(Debug, Clone, PartialEq)]
pub enum SqlExpr {
    Column {
        table: Option<String>,
        name: String,
    },
    Literal(Value),
    Aggregate {
        agg: Aggregate,
        expr: Box<SqlExpr>,
    },
    /// COUNT(*) and friends; an aggregate over whole rows.
    AggregateStar {
        agg: Aggregate,
    },
    BinaryOp {
        op: SqlBinaryOperator,
        left: Box<SqlExpr>,
        right: Box<SqlExpr>,
    },
    InList {
        expr: Box<SqlExpr>,
        list: Vec<SqlExpr>,
        negated: bool,
    },
    Between {
        expr: Box<SqlExpr>,
        low: Box<SqlExpr>,
        high: Box<SqlExpr>,
    },
    IsNull {
        expr: Box<SqlExpr>,
        negated: bool,
    },
    /// Filtered existence: restricts parent rows to those with at least one
    /// matching row in the subquery.
    Exists {
        query: Box<SelectQuery>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlBinaryOperator {
    And,
    Or,
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: SqlExpr,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableRef {
    pub name: String,
    pub alias: Option<String>,
}

impl TableRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
        }
    }

    pub fn aliased(name: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: Some(alias.into()),
        }
    }

    /// Qualifier usable in column references: the alias when present.
    pub fn qualifier(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlJoinType {
    Inner,
    Left,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub join_type: SqlJoinType,
    pub table: TableRef,
    pub on: Vec<SqlExpr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub expr: SqlExpr,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectQuery {
    pub select: Vec<SelectItem>,
    pub from: TableRef,
    pub joins: Vec<Join>,
    pub filters: Vec<SqlExpr>,
    pub group_by: Vec<SqlExpr>,
    pub order_by: Vec<OrderItem>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

pub struct SqlRenderer<'d> {
    dialect: &'d dyn Dialect,
}

impl<'d> SqlRenderer<'d> {
    pub fn new(dialect: &'d dyn Dialect) -> Self {
        Self { dialect }
    }

    pub fn render_select(&self, query: &SelectQuery) -> String {
        let select_items: Vec<String> = query
            .select
            .iter()
            .map(|item| {
                let expr_sql = self.render_expr(&item.expr);
                match &item.alias {
                    Some(alias) => format!("{expr_sql} AS {}", self.dialect.quote_ident(alias)),
                    None => expr_sql,
                }
            })
            .collect();

        let mut sql = format!(
            "SELECT {} FROM {}",
            select_items.join(", "),
            self.render_table_ref(&query.from)
        );

        for join in &query.joins {
            let join_kw = match join.join_type {
                SqlJoinType::Inner => "JOIN",
                SqlJoinType::Left => "LEFT JOIN",
            };
            let on_clause: Vec<String> = join.on.iter().map(|e| self.render_expr(e)).collect();
            sql.push_str(&format!(
                " {join_kw} {} ON {}",
                self.render_table_ref(&join.table),
                on_clause.join(" AND ")
            ));
        }

        if !query.filters.is_empty() {
            let filters: Vec<String> = query.filters.iter().map(|f| self.render_expr(f)).collect();
            sql.push_str(&format!(" WHERE {}", filters.join(" AND ")));
        }

        if !query.group_by.is_empty() {
            let groups: Vec<String> = query.group_by.iter().map(|g| self.render_expr(g)).collect();
            sql.push_str(&format!(" GROUP BY {}", groups.join(", ")));
        }

        if !query.order_by.is_empty() {
            let orders: Vec<String> = query
                .order_by
                .iter()
                .map(|o| {
                    let expr = self.render_expr(&o.expr);
                    let dir = match o.direction {
                        SortDirection::Asc => "ASC",
                        SortDirection::Desc => "DESC",
                    };
                    format!("{expr} {dir}")
                })
                .collect();
            sql.push_str(&format!(" ORDER BY {}", orders.join(", ")));
        }

        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = query.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }

        sql
    }

    fn render_table_ref(&self, table: &TableRef) -> String {
        match &table.alias {
            Some(alias) => format!(
                "{} {}",
                self.dialect.quote_ident(&table.name),
                self.dialect.quote_ident(alias)
            ),
            None => self.dialect.quote_ident(&table.name),
        }
    }

    fn render_expr(&self, expr: &SqlExpr) -> String {
        match expr {
            SqlExpr::Column { table, name } => match table {
                Some(t) => format!(
                    "{}.{}",
                    self.dialect.quote_ident(t),
                    self.dialect.quote_ident(name)
                ),
                None => self.dialect.quote_ident(name),
            },
            SqlExpr::Literal(v) => self.dialect.render_literal(v),
            SqlExpr::Aggregate { agg, expr } => self
                .dialect
                .render_aggregation(agg, &self.render_expr(expr)),
            SqlExpr::AggregateStar { agg } => self.dialect.render_aggregation(agg, "*"),
            SqlExpr::BinaryOp { op, left, right } => {
                let op_sql = match op {
                    SqlBinaryOperator::And => "AND",
                    SqlBinaryOperator::Or => "OR",
                    SqlBinaryOperator::Eq => "=",
                    SqlBinaryOperator::Neq => "!=",
                    SqlBinaryOperator::Gt => ">",
                    SqlBinaryOperator::Gte => ">=",
                    SqlBinaryOperator::Lt => "<",
                    SqlBinaryOperator::Lte => "<=",
                    SqlBinaryOperator::Like => "LIKE",
                };
                format!(
                    "({} {} {})",
                    self.render_expr(left),
                    op_sql,
                    self.render_expr(right)
                )
            }
            SqlExpr::InList {
                expr,
                list,
                negated,
            } => {
                let rendered_values: Vec<String> =
                    list.iter().map(|v| self.render_expr(v)).collect();
                let not_kw = if *negated { "NOT " } else { "" };
                format!(
                    "{} {}IN ({})",
                    self.render_expr(expr),
                    not_kw,
                    rendered_values.join(", ")
                )
            }
            SqlExpr::Between { expr, low, high } => format!(
                "({} BETWEEN {} AND {})",
                self.render_expr(expr),
                self.render_expr(low),
                self.render_expr(high)
            ),
            SqlExpr::IsNull { expr, negated } => {
                let not_kw = if *negated { " NOT" } else { "" };
                format!("({} IS{not_kw} NULL)", self.render_expr(expr))
            }
            SqlExpr::Exists { query } => format!("EXISTS ({})", self.render_select(query)),
        }
    }
}
