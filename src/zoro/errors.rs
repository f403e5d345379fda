//! Errors for the ZORO pipeline (configuration checks, dimension
//! consistency, numerical degeneracy, and external solver failures).
//!
//! This module defines [`ZoroError`], the single error type surfaced by the
//! covariance, sensitivity, dynamics and iteration-loop layers, together with
//! the [`ZoroResult`] alias. Residual-model failures are defined separately in
//! [`crate::residual::errors`] and converted here.
//!
//! ## Conventions
//! - **Stage and iteration indices are 0-based.**
//! - `IterationCapReached` is *not* an error: exhausting `n_iter_max` is a
//!   normal termination reported through
//!   [`Termination`](crate::zoro::stats::Termination).
//! - A non-zero feedback status from the external OCP solver is fatal and is
//!   reported as [`ZoroError::SolverFailure`]; nothing is retried.
use crate::{residual::errors::ResidualError, zoro::interfaces::RtiPhase};

/// Crate-wide result alias for ZORO operations.
pub type ZoroResult<T> = Result<T, ZoroError>;

#[derive(Debug, Clone, PartialEq)]
pub enum ZoroError {
    // ---- Shapes ----
    /// Matrix has the wrong shape.
    DimensionMismatch { what: &'static str, expected: (usize, usize), found: (usize, usize) },

    /// Vector has the wrong length.
    LengthMismatch { what: &'static str, expected: usize, found: usize },

    /// Matrix must be square.
    NotSquare { what: &'static str, rows: usize, cols: usize },

    /// Length is not a triangular number `n(n+1)/2`.
    InvalidSymVecLength { len: usize },

    /// Matrix must be symmetric.
    NotSymmetric { what: &'static str, row: usize, col: usize, gap: f64 },

    /// Configuration matrix/vector contains a non-finite entry.
    NonFiniteInput { what: &'static str, index: usize, value: f64 },

    /// Horizon must contain at least one shooting interval.
    EmptyHorizon,

    // ---- Options ----
    /// Termination tolerance must be finite and strictly positive.
    InvalidTolerance { tol: f64, reason: &'static str },

    /// Iteration cap must be positive.
    InvalidMaxIter { max_iter: usize, reason: &'static str },

    /// Probability level must lie in (0, 1).
    InvalidProbability { prob: f64, reason: &'static str },

    // ---- Numerics ----
    /// NaN/inf detected in an intermediate quantity of the pipeline.
    NumericalDegeneracy {
        what: &'static str,
        iteration: usize,
        stage: usize,
        index: usize,
        value: f64,
    },

    // ---- External collaborators ----
    /// Discrete-time integrator failed at a stage.
    IntegratorFailure { stage: usize, reason: String },

    /// OCP solver returned a non-zero status.
    SolverFailure { iteration: usize, phase: RtiPhase, status: i32 },

    /// Stage index outside the OCP horizon.
    StageOutOfRange { stage: usize, horizon: usize },

    /// Residual model evaluation failed.
    ResidualModelFailure { reason: String },
}

impl std::error::Error for ZoroError {}

impl std::fmt::Display for ZoroError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // ---- Shapes ----
            ZoroError::DimensionMismatch { what, expected, found } => {
                write!(f, "Dimension mismatch for {what}: expected {expected:?}, found {found:?}")
            }
            ZoroError::LengthMismatch { what, expected, found } => {
                write!(f, "Length mismatch for {what}: expected {expected}, found {found}")
            }
            ZoroError::NotSquare { what, rows, cols } => {
                write!(f, "{what} must be square, found ({rows}, {cols})")
            }
            ZoroError::InvalidSymVecLength { len } => {
                write!(f, "Invalid symmetric vector length {len}: not of the form n(n+1)/2")
            }
            ZoroError::NotSymmetric { what, row, col, gap } => {
                write!(f, "{what} is not symmetric at ({row}, {col}): |a_ij - a_ji| = {gap}")
            }
            ZoroError::NonFiniteInput { what, index, value } => {
                write!(f, "Non-finite entry in {what} at flat index {index}: {value}")
            }
            ZoroError::EmptyHorizon => {
                write!(f, "Horizon must contain at least one shooting interval")
            }

            // ---- Options ----
            ZoroError::InvalidTolerance { tol, reason } => {
                write!(f, "Invalid termination tolerance {tol}: {reason}")
            }
            ZoroError::InvalidMaxIter { max_iter, reason } => {
                write!(f, "Invalid maximum iterations {max_iter}: {reason}")
            }
            ZoroError::InvalidProbability { prob, reason } => {
                write!(f, "Invalid probability level {prob}: {reason}")
            }

            // ---- Numerics ----
            ZoroError::NumericalDegeneracy { what, iteration, stage, index, value } => {
                write!(
                    f,
                    "Non-finite {what} at iteration {iteration}, stage {stage}, flat index {index}: {value}"
                )
            }

            // ---- External collaborators ----
            ZoroError::IntegratorFailure { stage, reason } => {
                write!(f, "Integrator failed at stage {stage}: {reason}")
            }
            ZoroError::SolverFailure { iteration, phase, status } => {
                write!(
                    f,
                    "OCP solver returned status {status} in {phase:?} phase of iteration {iteration}"
                )
            }
            ZoroError::StageOutOfRange { stage, horizon } => {
                write!(f, "Stage {stage} is outside the horizon 0..={horizon}")
            }
            ZoroError::ResidualModelFailure { reason } => {
                write!(f, "Residual model failure: {reason}")
            }
        }
    }
}

impl From<ResidualError> for ZoroError {
    fn from(err: ResidualError) -> Self {
        ZoroError::ResidualModelFailure { reason: err.to_string() }
    }
}

#[cfg(feature = "python-bindings")]
impl std::convert::From<ZoroError> for pyo3::PyErr {
    fn from(err: ZoroError) -> pyo3::PyErr {
        pyo3::exceptions::PyValueError::new_err(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Human-readable rendering of the fatal solver error.
    // - Conversion of residual-model errors into `ZoroError`.
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // The solver failure message must name the phase, status and iteration.
    //
    // Given
    // -----
    // - A `SolverFailure` in the feedback phase of iteration 3 with status 4.
    //
    // Expect
    // ------
    // - The rendered message mentions all three.
    fn solver_failure_display_names_iteration_phase_and_status() {
        // Arrange
        let err = ZoroError::SolverFailure { iteration: 3, phase: RtiPhase::Feedback, status: 4 };

        // Act
        let msg = err.to_string();

        // Assert
        assert!(msg.contains("status 4"));
        assert!(msg.contains("Feedback"));
        assert!(msg.contains("iteration 3"));
    }

    #[test]
    // Purpose
    // -------
    // Residual errors are folded into `ResidualModelFailure` with their text.
    //
    // Given
    // -----
    // - A `ResidualError::ShapeMismatch`.
    //
    // Expect
    // ------
    // - Conversion yields `ResidualModelFailure` whose reason contains the
    //   original message.
    fn residual_error_converts_into_residual_model_failure() {
        // Arrange
        let err = ResidualError::ShapeMismatch {
            what: "mean",
            expected: vec![3, 2],
            found: vec![2, 2],
        };
        let text = err.to_string();

        // Act
        let converted: ZoroError = err.into();

        // Assert
        match converted {
            ZoroError::ResidualModelFailure { reason } => assert_eq!(reason, text),
            other => panic!("Expected ResidualModelFailure, got {other:?}"),
        }
    }
}
