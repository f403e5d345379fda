//! Errors for learned residual-dynamics models.
//!
//! [`ResidualError`] covers malformed query batches, inconsistent model
//! outputs, and failures while conditioning a Gaussian process on data. The iteration loop converts these into
//! [`ZoroError::ResidualModelFailure`](crate::zoro::errors::ZoroError).

/// Result alias for residual-model operations.
pub type ResidualResult<T> = Result<T, ResidualError>;

#[derive(Debug, Clone, PartialEq)]
pub enum ResidualError {
    /// Array shape differs from the expected one.
    ShapeMismatch { what: &'static str, expected: Vec<usize>, found: Vec<usize> },

    /// Training inputs or targets contain NaN/inf.
    NonFiniteTrainingData { what: &'static str, index: usize, value: f64 },

    /// Kernel hyperparameters must be finite and strictly positive.
    InvalidHyperparameter { name: &'static str, value: f64 },

    /// Gram matrix is not positive definite.
    CholeskyFailed { output: usize },

    /// Training set is empty.
    EmptyTrainingSet,

    /// Model-specific failure.
    Backend { text: String },
}

impl std::error::Error for ResidualError {}

impl std::fmt::Display for ResidualError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResidualError::ShapeMismatch { what, expected, found } => {
                write!(f, "Shape mismatch for {what}: expected {expected:?}, found {found:?}")
            }
            ResidualError::NonFiniteTrainingData { what, index, value } => {
                write!(f, "Non-finite training {what} at flat index {index}: {value}")
            }
            ResidualError::InvalidHyperparameter { name, value } => {
                write!(f, "Invalid hyperparameter {name} = {value}: must be finite and > 0")
            }
            ResidualError::CholeskyFailed { output } => {
                write!(f, "Gram matrix for output {output} is not positive definite")
            }
            ResidualError::EmptyTrainingSet => {
                write!(f, "Training set must contain at least one sample")
            }
            ResidualError::Backend { text } => {
                write!(f, "Residual model backend error: {text}")
            }
        }
    }
}
