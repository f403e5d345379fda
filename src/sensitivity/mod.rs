//! sensitivity — constraint Jacobians w.r.t. the vectorized covariance.
//!
//! The zero-order tightening needs `H = ∂h/∂sigma_vec` at every stage. This
//! module offers two providers behind the [`constraint::ConstraintSensitivity`]
//! trait:
//!
//! - [`constraint::DualJacobian`]: exact, forward-mode derivatives of an
//!   expression written once over the [`dual::Real`] scalar trait;
//! - [`constraint::FiniteDiffJacobian`]: central differences of a plain
//!   closure, for constraints only available as `f64` code.
//!
//! The expression is fixed when the provider is built; only the evaluation
//! point changes between calls.
pub mod constraint;
pub mod dual;

pub mod prelude {
    pub use super::constraint::{
        ConstraintExpr, ConstraintSensitivity, DualJacobian, FiniteDiffJacobian,
        LinearBackoffConstraint,
    };
    pub use super::dual::{Dual, Real};
}
