//! Filter translation: one declarative filter, two executable forms.
//!
//! [`to_condition`] produces a structured query condition for the backing
//! store; [`to_predicate`] produces an in-memory closure over flat records.
//! Both forms are derived from the same condition tree and evaluated by the
//! same interpreter, so they cannot drift apart.
//!
//! `like` is substring containment; case sensitivity follows the backend's
//! collation and is therefore backend-dependent. `between` with anything
//! other than exactly two values is a warned no-op rather than an error,
//! matching the established behavior of the report builder.
//!
//! Relation-qualified filters (`relation.column`) compile to a filtered
//! existence condition through the relationship resolver, which restricts
//! parents to those having at least one matching related record; the
//! predicate form instead reads the flattened `relation_column` key of an
//! already-joined record. The two differ in cardinality for many-relations,
//! which callers must account for.

use serde_json::Value;

use crate::aggregate::compare_values;
use crate::error::{ReportError, Result};
use crate::executor::Record;
use crate::report::{FilterOp, FilterSpec};
use crate::sql_ast::{SqlBinaryOperator, SqlExpr};

pub type Predicate = Box<dyn Fn(&Record) -> bool + Send + Sync>;

/// Translate a filter into a condition over `target` (a column reference the
/// compiler has already validated). `Ok(None)` means the filter is a no-op.
pub fn to_condition(target: SqlExpr, filter: &FilterSpec) -> Result<Option<SqlExpr>> {
    match filter.op {
        FilterOp::IsNull => Ok(Some(SqlExpr::IsNull {
            expr: Box::new(target),
            negated: false,
        })),
        FilterOp::IsNotNull => Ok(Some(SqlExpr::IsNull {
            expr: Box::new(target),
            negated: true,
        })),
        FilterOp::In | FilterOp::NotIn => {
            let list = value_list(filter)?;
            Ok(Some(SqlExpr::InList {
                expr: Box::new(target),
                list: list.into_iter().map(SqlExpr::Literal).collect(),
                negated: filter.op == FilterOp::NotIn,
            }))
        }
        FilterOp::Between => match filter.value.as_array() {
            Some(bounds) if bounds.len() == 2 => Ok(Some(SqlExpr::Between {
                expr: Box::new(target),
                low: Box::new(SqlExpr::Literal(bounds[0].clone())),
                high: Box::new(SqlExpr::Literal(bounds[1].clone())),
            })),
            _ => {
                tracing::warn!(
                    column = filter.column.as_str(),
                    "between filter without exactly two values; skipping"
                );
                Ok(None)
            }
        },
        FilterOp::Like => {
            let needle = scalar_value(filter)?;
            let pattern = match needle {
                Value::String(s) => format!("%{s}%"),
                other => format!("%{other}%"),
            };
            Ok(Some(SqlExpr::BinaryOp {
                op: SqlBinaryOperator::Like,
                left: Box::new(target),
                right: Box::new(SqlExpr::Literal(Value::String(pattern))),
            }))
        }
        FilterOp::Eq | FilterOp::Neq | FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte => {
            let value = scalar_value(filter)?;
            let op = match filter.op {
                FilterOp::Eq => SqlBinaryOperator::Eq,
                FilterOp::Neq => SqlBinaryOperator::Neq,
                FilterOp::Gt => SqlBinaryOperator::Gt,
                FilterOp::Gte => SqlBinaryOperator::Gte,
                FilterOp::Lt => SqlBinaryOperator::Lt,
                FilterOp::Lte => SqlBinaryOperator::Lte,
                _ => unreachable!(),
            };
            Ok(Some(SqlExpr::BinaryOp {
                op,
                left: Box::new(target),
                right: Box::new(SqlExpr::Literal(value)),
            }))
        }
    }
}

/// In-memory form of the same filter, evaluated against flat records keyed by
/// output column name (`relation.column` flattens to `relation_column`).
pub fn to_predicate(filter: &FilterSpec) -> Result<Predicate> {
    let key = filter.column.replace('.', "_");
    let target = SqlExpr::Column {
        table: None,
        name: key,
    };
    match to_condition(target, filter)? {
        Some(condition) => Ok(Box::new(move |record: &Record| {
            eval_condition(record, &condition).unwrap_or(false)
        })),
        None => Ok(Box::new(|_| true)),
    }
}

fn scalar_value(filter: &FilterSpec) -> Result<Value> {
    match &filter.value {
        Value::String(_) | Value::Number(_) | Value::Bool(_) => Ok(filter.value.clone()),
        Value::Null => Err(ReportError::InvalidFilter {
            column: filter.column.clone(),
            reason: "operator requires a value".to_string(),
        }),
        Value::Array(_) | Value::Object(_) => Err(ReportError::InvalidFilter {
            column: filter.column.clone(),
            reason: "operator requires a scalar value".to_string(),
        }),
    }
}

/// Membership list: an already-split array, or a comma-delimited string whose
/// trimmed items are parsed as numbers where possible. A bare scalar is
/// treated as a one-element list.
fn value_list(filter: &FilterSpec) -> Result<Vec<Value>> {
    let items = match &filter.value {
        Value::Array(items) => items.clone(),
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(parse_list_item)
            .collect(),
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    };
    if items.is_empty() {
        return Err(ReportError::InvalidFilter {
            column: filter.column.clone(),
            reason: "membership operator requires at least one value".to_string(),
        });
    }
    Ok(items)
}

fn parse_list_item(item: &str) -> Value {
    if let Ok(n) = item.parse::<i64>() {
        return Value::from(n);
    }
    if let Ok(f) = item.parse::<f64>() {
        return Value::from(f);
    }
    Value::String(item.to_string())
}

// ---------------------------------------------------------------------------
// Condition interpreter, shared by predicates and the in-memory store.
// ---------------------------------------------------------------------------

/// Evaluate a scalar expression against one record. Column lookups use the
/// bare column name; table qualifiers are only meaningful to SQL rendering.
pub(crate) fn eval_scalar(record: &Record, expr: &SqlExpr) -> Result<Value> {
    match expr {
        SqlExpr::Column { name, .. } => Ok(record.get(name).cloned().unwrap_or(Value::Null)),
        SqlExpr::Literal(value) => Ok(value.clone()),
        other => Err(ReportError::Backend(format!(
            "expression not evaluable per record: {other:?}"
        ))),
    }
}

pub(crate) fn eval_condition(record: &Record, expr: &SqlExpr) -> Result<bool> {
    match expr {
        SqlExpr::BinaryOp { op, left, right } => match op {
            SqlBinaryOperator::And => {
                Ok(eval_condition(record, left)? && eval_condition(record, right)?)
            }
            SqlBinaryOperator::Or => {
                Ok(eval_condition(record, left)? || eval_condition(record, right)?)
            }
            SqlBinaryOperator::Eq => {
                let (a, b) = (eval_scalar(record, left)?, eval_scalar(record, right)?);
                Ok(!a.is_null() && !b.is_null() && values_equal(&a, &b))
            }
            SqlBinaryOperator::Neq => {
                let (a, b) = (eval_scalar(record, left)?, eval_scalar(record, right)?);
                Ok(!a.is_null() && !b.is_null() && !values_equal(&a, &b))
            }
            SqlBinaryOperator::Gt | SqlBinaryOperator::Gte | SqlBinaryOperator::Lt
            | SqlBinaryOperator::Lte => {
                let (a, b) = (eval_scalar(record, left)?, eval_scalar(record, right)?);
                if a.is_null() || b.is_null() {
                    return Ok(false);
                }
                let ord = compare_values(&a, &b);
                Ok(match op {
                    SqlBinaryOperator::Gt => ord.is_gt(),
                    SqlBinaryOperator::Gte => ord.is_ge(),
                    SqlBinaryOperator::Lt => ord.is_lt(),
                    SqlBinaryOperator::Lte => ord.is_le(),
                    _ => unreachable!(),
                })
            }
            SqlBinaryOperator::Like => {
                let (a, b) = (eval_scalar(record, left)?, eval_scalar(record, right)?);
                match (scalar_text(&a), scalar_text(&b)) {
                    (Some(text), Some(pattern)) => Ok(like_match(&text, &pattern)),
                    _ => Ok(false),
                }
            }
        },
        SqlExpr::InList {
            expr,
            list,
            negated,
        } => {
            let value = eval_scalar(record, expr)?;
            if value.is_null() {
                return Ok(false);
            }
            let mut found = false;
            for item in list {
                if values_equal(&value, &eval_scalar(record, item)?) {
                    found = true;
                    break;
                }
            }
            Ok(found != *negated)
        }
        SqlExpr::Between { expr, low, high } => {
            let value = eval_scalar(record, expr)?;
            let low = eval_scalar(record, low)?;
            let high = eval_scalar(record, high)?;
            if value.is_null() || low.is_null() || high.is_null() {
                return Ok(false);
            }
            Ok(compare_values(&value, &low).is_ge() && compare_values(&value, &high).is_le())
        }
        SqlExpr::IsNull { expr, negated } => {
            let value = eval_scalar(record, expr)?;
            Ok(value.is_null() != *negated)
        }
        SqlExpr::Exists { .. } => Err(ReportError::Backend(
            "existence conditions require the backing store".to_string(),
        )),
        other => Err(ReportError::Backend(format!(
            "expression is not a condition: {other:?}"
        ))),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Minimal LIKE matcher supporting `%` wildcards, case-sensitive.
fn like_match(text: &str, pattern: &str) -> bool {
    let parts: Vec<&str> = pattern.split('%').collect();
    if parts.len() == 1 {
        return text == pattern;
    }
    let mut remainder = text;
    for (idx, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if idx == 0 {
            match remainder.strip_prefix(part) {
                Some(rest) => remainder = rest,
                None => return false,
            }
        } else if idx == parts.len() - 1 {
            return remainder.ends_with(part);
        } else {
            match remainder.find(part) {
                Some(pos) => remainder = &remainder[pos + part.len()..],
                None => return false,
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(pairs: &[(&str, Value)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn filter(op: FilterOp, value: Value) -> FilterSpec {
        FilterSpec::new("amount", op, value)
    }

    #[test]
    fn between_requires_two_values_else_noop() {
        let f = filter(FilterOp::Between, json!([10]));
        let target = SqlExpr::Column {
            table: None,
            name: "amount".to_string(),
        };
        assert!(to_condition(target, &f).unwrap().is_none());

        let predicate = to_predicate(&f).unwrap();
        assert!(predicate(&record(&[("amount", json!(999))])));
    }

    #[test]
    fn between_is_inclusive() {
        let predicate = to_predicate(&filter(FilterOp::Between, json!([10, 20]))).unwrap();
        assert!(predicate(&record(&[("amount", json!(10))])));
        assert!(predicate(&record(&[("amount", json!(20))])));
        assert!(predicate(&record(&[("amount", json!(15))])));
        assert!(!predicate(&record(&[("amount", json!(21))])));
    }

    #[test]
    fn comparison_with_null_value_is_invalid() {
        let err = to_predicate(&filter(FilterOp::Gt, Value::Null)).err().unwrap();
        assert!(matches!(err, ReportError::InvalidFilter { .. }));
    }

    #[test]
    fn comparison_with_array_value_is_invalid() {
        let err = to_predicate(&filter(FilterOp::Eq, json!([1, 2]))).err().unwrap();
        assert!(matches!(err, ReportError::InvalidFilter { .. }));
    }

    #[test]
    fn in_accepts_comma_delimited_string() {
        let predicate =
            to_predicate(&filter(FilterOp::In, json!("10, 20 ,shipped"))).unwrap();
        assert!(predicate(&record(&[("amount", json!(20))])));
        assert!(predicate(&record(&[("amount", json!("shipped"))])));
        assert!(!predicate(&record(&[("amount", json!(30))])));
    }

    #[test]
    fn not_in_excludes_members() {
        let predicate = to_predicate(&filter(FilterOp::NotIn, json!(["a", "b"]))).unwrap();
        assert!(!predicate(&record(&[("amount", json!("a"))])));
        assert!(predicate(&record(&[("amount", json!("c"))])));
    }

    #[test]
    fn like_is_substring_containment() {
        let predicate = to_predicate(&filter(FilterOp::Like, json!("ship"))).unwrap();
        assert!(predicate(&record(&[("amount", json!("shipped"))])));
        assert!(predicate(&record(&[("amount", json!("dropship"))])));
        assert!(!predicate(&record(&[("amount", json!("SHIPPED"))])));
    }

    #[test]
    fn null_checks() {
        let is_null = to_predicate(&filter(FilterOp::IsNull, Value::Null)).unwrap();
        assert!(is_null(&record(&[("amount", Value::Null)])));
        assert!(is_null(&record(&[])));
        assert!(!is_null(&record(&[("amount", json!(1))])));

        let not_null = to_predicate(&filter(FilterOp::IsNotNull, Value::Null)).unwrap();
        assert!(not_null(&record(&[("amount", json!(1))])));
        assert!(!not_null(&record(&[])));
    }

    #[test]
    fn qualified_column_predicate_reads_flattened_key() {
        let f = FilterSpec::new("customer.region", FilterOp::Eq, json!("East"));
        let predicate = to_predicate(&f).unwrap();
        assert!(predicate(&record(&[("customer_region", json!("East"))])));
        assert!(!predicate(&record(&[("customer_region", json!("West"))])));
    }

    #[test]
    fn like_matcher_wildcards() {
        assert!(like_match("shipped", "%ship%"));
        assert!(like_match("shipped", "ship%"));
        assert!(like_match("shipped", "%ped"));
        assert!(!like_match("shipped", "ship"));
        assert!(like_match("ship", "ship"));
    }
}
