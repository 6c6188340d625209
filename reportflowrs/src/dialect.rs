use crate::report::Aggregate;

/// Dialects render identifiers and primitive expression pieces.
/// Expression tree walking lives in the renderer; the dialect only maps
/// logical constructs to SQL fragments.
pub trait Dialect {
    fn quote_ident(&self, ident: &str) -> String;

    fn render_aggregation(&self, agg: &Aggregate, expr: &str) -> String {
        match agg {
            Aggregate::Sum => format!("SUM({expr})"),
            Aggregate::Avg => format!("AVG({expr})"),
            Aggregate::Min => format!("MIN({expr})"),
            Aggregate::Max => format!("MAX({expr})"),
            Aggregate::Count => format!("COUNT({expr})"),
            Aggregate::CountDistinct => format!("COUNT(DISTINCT {expr})"),
            // First-seen value; only emitted for ungrouped queries, where it
            // collapses the result to a single row like the other aggregates.
            Aggregate::Value => format!("FIRST({expr})"),
        }
    }

    fn render_literal(&self, value: &serde_json::Value) -> String {
        match value {
            serde_json::Value::Null => "NULL".to_string(),
            serde_json::Value::Bool(b) => b.to_string(),
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::String(s) => format!("'{}'", s.replace('\'', "''")),
            serde_json::Value::Array(items) => {
                let rendered: Vec<String> = items.iter().map(|v| self.render_literal(v)).collect();
                rendered.join(", ")
            }
            serde_json::Value::Object(_) => format!("'{}'", value.to_string().replace('\'', "''")),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DuckDbDialect;

impl Dialect for DuckDbDialect {
    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }
}
