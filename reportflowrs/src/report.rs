use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Logical table marker for columns on the primary entity (as opposed to a
/// join alias).
pub const PRIMARY_TABLE: &str = "primary";

fn primary_table() -> String {
    PRIMARY_TABLE.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    #[default]
    String,
    Integer,
    Number,
    Boolean,
    Date,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate {
    Sum,
    Avg,
    Min,
    Max,
    Count,
    CountDistinct,
    /// Raw pass-through: the first value seen for the column. Only meaningful
    /// in ungrouped reports.
    Value,
}

impl Aggregate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregate::Sum => "sum",
            Aggregate::Avg => "avg",
            Aggregate::Min => "min",
            Aggregate::Max => "max",
            Aggregate::Count => "count",
            Aggregate::CountDistinct => "count_distinct",
            Aggregate::Value => "value",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Neq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "like")]
    Like,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "not_in")]
    NotIn,
    #[serde(rename = "is_null")]
    IsNull,
    #[serde(rename = "is_not_null")]
    IsNotNull,
    #[serde(rename = "between")]
    Between,
}

impl FilterOp {
    /// Operators that carry no value at all.
    pub fn is_nullary(&self) -> bool {
        matches!(self, FilterOp::IsNull | FilterOp::IsNotNull)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionSpec {
    pub column: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: ValueType,
    #[serde(default = "primary_table")]
    pub table: String,
}

impl DimensionSpec {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            label: None,
            kind: ValueType::String,
            table: primary_table(),
        }
    }

    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.column)
    }

    /// Key under which this dimension appears in result rows: the column name
    /// for primary-entity columns, `relation_column` for joined ones.
    pub fn output_key(&self) -> String {
        self.column.replace('.', "_")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSpec {
    pub column: String,
    pub aggregate: Aggregate,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default = "primary_table")]
    pub table: String,
}

impl MetricSpec {
    pub fn new(column: impl Into<String>, aggregate: Aggregate) -> Self {
        Self {
            column: column.into(),
            aggregate,
            alias: None,
            label: None,
            table: primary_table(),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// The unique output name for this metric's value in a result row.
    /// Derived deterministically when not supplied explicitly.
    pub fn output_alias(&self) -> String {
        match &self.alias {
            Some(alias) => alias.clone(),
            None => derive_alias(&self.column, self.aggregate),
        }
    }

    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.column)
    }
}

/// `{column}_{aggregate}`, with `.` replaced by `_`. A bare `*` (count over
/// whole records) collapses to the aggregate name alone.
pub fn derive_alias(column: &str, aggregate: Aggregate) -> String {
    if column == "*" {
        return aggregate.as_str().to_string();
    }
    format!("{}_{}", column.replace('.', "_"), aggregate.as_str())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterSpec {
    pub column: String,
    pub op: FilterOp,
    #[serde(default)]
    pub value: Value,
    #[serde(default = "primary_table")]
    pub table: String,
}

impl FilterSpec {
    pub fn new(column: impl Into<String>, op: FilterOp, value: Value) -> Self {
        Self {
            column: column.into(),
            op,
            value,
            table: primary_table(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub column: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Declarative description of one report: primary entity, optional
/// relationship traversals, grouping dimensions on two axes, aggregated
/// metrics, filters, ordering and paging. Constructed per request, compiled,
/// executed and discarded; stored durably only as part of a template.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReportSpec {
    pub model: String,
    #[serde(default)]
    pub relationships: Vec<String>,
    #[serde(default)]
    pub row_dimensions: Vec<DimensionSpec>,
    #[serde(default)]
    pub column_dimensions: Vec<DimensionSpec>,
    #[serde(default)]
    pub metrics: Vec<MetricSpec>,
    #[serde(default)]
    pub filters: Vec<FilterSpec>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    #[serde(default)]
    pub order_by: Vec<OrderItem>,
}

impl ReportSpec {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    /// All grouping dimensions, row axis first.
    pub fn dimensions(&self) -> impl Iterator<Item = &DimensionSpec> {
        self.row_dimensions.iter().chain(self.column_dimensions.iter())
    }
}

/// Split `relation.column` into its parts. Returns `None` for plain columns.
pub fn parse_qualified(name: &str) -> Option<(&str, &str)> {
    let mut parts = name.splitn(2, '.');
    let relation = parts.next()?;
    let column = parts.next()?;
    if relation.is_empty() || column.is_empty() {
        return None;
    }
    Some((relation, column))
}
