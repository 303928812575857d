use thiserror::Error;

use crate::types::Type;
use crate::query::ComparisonOperator;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Field already exists: {0}")]
    FieldExists(String),

    #[error("Field not found: {0}")]
    FieldNotFound(String),

    #[error("Analyser not found: {0}")]
    AnalyserNotFound(String),

    #[error("Unknown database backend: {0}")]
    UnknownBackend(String),

    #[error("Missing parameter '{key}' for {component}")]
    MissingParameter { component: String, key: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Operator {operator:?} is not supported for attributes of type {ty}")]
    UnsupportedOperator { operator: ComparisonOperator, ty: Type },

    #[error("Type {ty} is not supported by the {backend} backend")]
    UnsupportedType { ty: Type, backend: &'static str },

    #[error("Layout mismatch: {0}")]
    LayoutMismatch(String),

    #[error("Initialization failed for: {}", .0.join(", "))]
    Initialization(Vec<String>),

    #[error("Partial write for retrievable {retrievable}: failed {}", .failed.join(", "))]
    PartialWrite {
        retrievable: uuid::Uuid,
        succeeded: Vec<String>,
        failed: Vec<String>,
    },

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Argument and configuration errors are raised before any backend call.
    pub fn is_argument_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidArgument(_)
                | Error::DimensionMismatch { .. }
                | Error::UnsupportedOperator { .. }
                | Error::MissingParameter { .. }
                | Error::LayoutMismatch(_)
                | Error::FieldExists(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
