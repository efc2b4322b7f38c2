use thiserror::Error;

/// Failures raised while building the design matrix or fitting the model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("empty input: {0}")]
    EmptyInput(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("row {row}: missing value for {column}")]
    MissingValue { column: String, row: usize },

    #[error("row {row}: {column} is not finite after transformation")]
    NonFinite { column: String, row: usize },

    #[error("linear algebra error: {0}")]
    Singular(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;
