//! Aggregate calculation over in-memory record sets.
//!
//! Pure functions; the same semantics the SQL rendering produces for the
//! corresponding aggregate expressions, so in-memory grouping and store-side
//! grouping agree.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde_json::Value;

use crate::executor::Record;
use crate::report::Aggregate;

/// Compute one aggregate over `records` for `column`. `None` as a column is
/// only meaningful for `count`, which then counts records.
///
/// Empty-input semantics: `sum`, `avg` and both counts yield `0`; `min`,
/// `max` and `value` yield `None` (absent, for the caller to map to null).
pub fn calculate(records: &[Record], column: Option<&str>, aggregate: Aggregate) -> Option<Value> {
    match aggregate {
        Aggregate::Sum => Some(number(numeric_values(records, column).iter().sum())),
        Aggregate::Avg => {
            let values = numeric_values(records, column);
            if values.is_empty() {
                // Guarded: an empty group averages to zero, not NaN.
                return Some(number(0.0));
            }
            let sum: f64 = values.iter().sum();
            Some(number(sum / values.len() as f64))
        }
        Aggregate::Min => present_values(records, column)
            .into_iter()
            .min_by(|a, b| compare_values(a, b))
            .cloned(),
        Aggregate::Max => present_values(records, column)
            .into_iter()
            .max_by(|a, b| compare_values(a, b))
            .cloned(),
        Aggregate::Count => match column {
            Some(column) => Some(Value::from(present_values(records, Some(column)).len())),
            None => Some(Value::from(records.len())),
        },
        Aggregate::CountDistinct => {
            let distinct: BTreeSet<String> = present_values(records, column)
                .into_iter()
                .map(|v| v.to_string())
                .collect();
            Some(Value::from(distinct.len()))
        }
        Aggregate::Value => records.first().map(|record| {
            column
                .and_then(|column| record.get(column))
                .cloned()
                .unwrap_or(Value::Null)
        }),
    }
}

/// Non-null values for `column`; missing keys are absent, not zero.
fn present_values<'a>(records: &'a [Record], column: Option<&str>) -> Vec<&'a Value> {
    let Some(column) = column else {
        return Vec::new();
    };
    records
        .iter()
        .filter_map(|record| record.get(column))
        .filter(|value| !value.is_null())
        .collect()
}

fn numeric_values(records: &[Record], column: Option<&str>) -> Vec<f64> {
    present_values(records, column)
        .into_iter()
        .filter_map(as_f64)
        .collect()
}

pub(crate) fn as_f64(value: &Value) -> Option<f64> {
    value.as_f64()
}

/// Render a computed number, collapsing integral floats back to integers so
/// sums over integer columns stay integers.
pub(crate) fn number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
        Value::from(value as i64)
    } else {
        Value::from(value)
    }
}

/// Total order over scalar JSON values: null first, then booleans, numbers,
/// strings (lexical), then composites by their serialization.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(_), Value::Number(_)) => {
            let x = a.as_f64().unwrap_or(f64::NAN);
            let y = b.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)).then_with(|| a.to_string().cmp(&b.to_string())),
    }
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}
