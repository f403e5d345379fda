//! residual — learned residual dynamics feeding the uncertainty pipeline.
//!
//! Purpose
//! -------
//! Model the mismatch between the nominal discrete-time dynamics and the
//! real system as `x⁺ = f(x, u) + B·(g(x, u) + w)`, where `g` is a
//! probabilistic regression model. Its mean shifts the linearization, its
//! Jacobian augments `A` and `B`, and its predictive variance enlarges the
//! process noise.
//!
//! Key behaviors
//! -------------
//! - [`adapter::ResidualModel`] is the seam for any regression backend.
//! - [`adapter::ResidualModelAdapter`] makes the model optional and checks
//!   output shapes.
//! - [`gp::GaussianProcess`] is an exact GP posterior with analytic mean
//!   gradients.
//!
//! Invariants & assumptions
//! ------------------------
//! - Models are queried once per outer iteration with all `N` stage points.
//! - Training and hyperparameter selection happen outside this crate.
pub mod adapter;
pub mod errors;
pub mod gp;

pub mod prelude {
    pub use super::adapter::{ResidualModel, ResidualModelAdapter, ResidualPrediction};
    pub use super::errors::{ResidualError, ResidualResult};
    pub use super::gp::{GaussianProcess, SeKernel};
}
