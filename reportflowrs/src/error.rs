use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReportError>;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("config error: {0}")]
    Config(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("unknown model {model}")]
    UnknownModel { model: String },
    #[error("unknown column {column} on entity {entity}")]
    UnknownColumn { entity: String, column: String },
    #[error("invalid filter on {column}: {reason}")]
    InvalidFilter { column: String, reason: String },
    #[error("invalid aggregate {aggregate} on column {column}")]
    InvalidAggregate { column: String, aggregate: String },
    #[error("ambiguous join via {relation}: {reason}")]
    AmbiguousJoin { relation: String, reason: String },
    #[error("required filter {name} has no value")]
    MissingRequiredFilter { name: String },
    #[error("backend execution error: {0}")]
    Backend(String),
    #[cfg(feature = "duckdb")]
    #[error("duckdb error: {0}")]
    DuckDb(#[from] duckdb::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ReportError {
    /// Stable tag for structured failure responses.
    pub fn kind(&self) -> &'static str {
        match self {
            ReportError::Io(_) => "io",
            ReportError::Yaml(_) => "yaml",
            ReportError::Json(_) => "json",
            ReportError::Config(_) => "config",
            ReportError::Validation(_) => "validation",
            ReportError::UnknownModel { .. } => "unknown_model",
            ReportError::UnknownColumn { .. } => "unknown_column",
            ReportError::InvalidFilter { .. } => "invalid_filter",
            ReportError::InvalidAggregate { .. } => "invalid_aggregate",
            ReportError::AmbiguousJoin { .. } => "ambiguous_join",
            ReportError::MissingRequiredFilter { .. } => "missing_required_filter",
            ReportError::Backend(_) => "backend_execution",
            #[cfg(feature = "duckdb")]
            ReportError::DuckDb(_) => "backend_execution",
            ReportError::Other(_) => "internal",
        }
    }

    /// True for errors detected before the backing store is contacted.
    /// These map to a 4xx-style response; backend failures do not.
    pub fn is_bad_request(&self) -> bool {
        matches!(
            self,
            ReportError::Validation(_)
                | ReportError::UnknownModel { .. }
                | ReportError::UnknownColumn { .. }
                | ReportError::InvalidFilter { .. }
                | ReportError::InvalidAggregate { .. }
                | ReportError::AmbiguousJoin { .. }
                | ReportError::MissingRequiredFilter { .. }
        )
    }
}
