//! Rendering tests for the structured query tree.

use reportflow::dialect::DuckDbDialect;
use reportflow::report::{Aggregate, SortDirection};
use reportflow::sql_ast::{
    Join, OrderItem, SelectItem, SelectQuery, SqlBinaryOperator, SqlExpr, SqlJoinType,
    SqlRenderer, TableRef,
};
use serde_json::json;

fn column(table: &str, name: &str) -> SqlExpr {
    SqlExpr::Column {
        table: Some(table.to_string()),
        name: name.to_string(),
    }
}

fn render(query: &SelectQuery) -> String {
    SqlRenderer::new(&DuckDbDialect).render_select(query)
}

#[test]
fn renders_full_select_shape() {
    let query = SelectQuery {
        select: vec![
            SelectItem {
                expr: column("orders", "region"),
                alias: Some("region".to_string()),
            },
            SelectItem {
                expr: SqlExpr::Aggregate {
                    agg: Aggregate::Sum,
                    expr: Box::new(column("orders", "amount")),
                },
                alias: Some("amount_sum".to_string()),
            },
        ],
        from: TableRef::named("orders"),
        filters: vec![SqlExpr::BinaryOp {
            op: SqlBinaryOperator::Eq,
            left: Box::new(column("orders", "status")),
            right: Box::new(SqlExpr::Literal(json!("open"))),
        }],
        group_by: vec![column("orders", "region")],
        order_by: vec![OrderItem {
            expr: column("orders", "region"),
            direction: SortDirection::Asc,
        }],
        limit: Some(100),
        offset: Some(10),
        ..SelectQuery::default()
    };
    assert_eq!(
        render(&query),
        "SELECT \"orders\".\"region\" AS \"region\", SUM(\"orders\".\"amount\") AS \"amount_sum\" \
         FROM \"orders\" WHERE (\"orders\".\"status\" = 'open') GROUP BY \"orders\".\"region\" \
         ORDER BY \"orders\".\"region\" ASC LIMIT 100 OFFSET 10"
    );
}

#[test]
fn renders_left_join_with_alias() {
    let query = SelectQuery {
        select: vec![SelectItem {
            expr: column("customer", "country"),
            alias: Some("customer_country".to_string()),
        }],
        from: TableRef::named("orders"),
        joins: vec![Join {
            join_type: SqlJoinType::Left,
            table: TableRef::aliased("customers", "customer"),
            on: vec![SqlExpr::BinaryOp {
                op: SqlBinaryOperator::Eq,
                left: Box::new(column("orders", "customer_id")),
                right: Box::new(column("customer", "id")),
            }],
        }],
        ..SelectQuery::default()
    };
    assert_eq!(
        render(&query),
        "SELECT \"customer\".\"country\" AS \"customer_country\" FROM \"orders\" \
         LEFT JOIN \"customers\" \"customer\" ON (\"orders\".\"customer_id\" = \"customer\".\"id\")"
    );
}

#[test]
fn renders_exists_subquery() {
    let inner = SelectQuery {
        select: vec![SelectItem {
            expr: SqlExpr::Literal(json!(1)),
            alias: None,
        }],
        from: TableRef::named("order_items"),
        filters: vec![SqlExpr::BinaryOp {
            op: SqlBinaryOperator::Eq,
            left: Box::new(column("order_items", "order_id")),
            right: Box::new(column("orders", "id")),
        }],
        ..SelectQuery::default()
    };
    let query = SelectQuery {
        select: vec![SelectItem {
            expr: SqlExpr::AggregateStar {
                agg: Aggregate::Count,
            },
            alias: Some("count".to_string()),
        }],
        from: TableRef::named("orders"),
        filters: vec![SqlExpr::Exists {
            query: Box::new(inner),
        }],
        ..SelectQuery::default()
    };
    assert_eq!(
        render(&query),
        "SELECT COUNT(*) AS \"count\" FROM \"orders\" WHERE EXISTS \
         (SELECT 1 FROM \"order_items\" WHERE (\"order_items\".\"order_id\" = \"orders\".\"id\"))"
    );
}

#[test]
fn renders_between_in_list_and_null_checks() {
    let query = SelectQuery {
        select: vec![SelectItem {
            expr: column("orders", "id"),
            alias: None,
        }],
        from: TableRef::named("orders"),
        filters: vec![
            SqlExpr::Between {
                expr: Box::new(column("orders", "amount")),
                low: Box::new(SqlExpr::Literal(json!(10))),
                high: Box::new(SqlExpr::Literal(json!(20))),
            },
            SqlExpr::InList {
                expr: Box::new(column("orders", "status")),
                list: vec![
                    SqlExpr::Literal(json!("open")),
                    SqlExpr::Literal(json!("shipped")),
                ],
                negated: true,
            },
            SqlExpr::IsNull {
                expr: Box::new(column("orders", "cancelled_at")),
                negated: false,
            },
        ],
        ..SelectQuery::default()
    };
    let sql = render(&query);
    assert!(sql.contains("(\"orders\".\"amount\" BETWEEN 10 AND 20)"));
    assert!(sql.contains("\"orders\".\"status\" NOT IN ('open', 'shipped')"));
    assert!(sql.contains("(\"orders\".\"cancelled_at\" IS NULL)"));
}

#[test]
fn literal_strings_are_escaped() {
    let query = SelectQuery {
        select: vec![SelectItem {
            expr: column("customers", "id"),
            alias: None,
        }],
        from: TableRef::named("customers"),
        filters: vec![SqlExpr::BinaryOp {
            op: SqlBinaryOperator::Eq,
            left: Box::new(column("customers", "name")),
            right: Box::new(SqlExpr::Literal(json!("O'Brien"))),
        }],
        ..SelectQuery::default()
    };
    assert!(render(&query).contains("'O''Brien'"));
}
