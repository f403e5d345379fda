//! dynamics — nominal integration and augmented stage linearization.
//!
//! Purpose
//! -------
//! Produce, for every shooting interval, the affine model
//! `x⁺ ≈ A_total x + B_total u + f_hat` that combines the nominal
//! discrete-time dynamics with the learned residual. The matrices are handed
//! to the OCP solver as stage parameters and also drive the covariance
//! propagation.
//!
//! Key behaviors
//! -------------
//! - [`integrator::SensitivityIntegrator`] is the seam for the external
//!   simulator; [`integrator::AffineIntegrator`] and
//!   [`integrator::Rk4Integrator`] are provided.
//! - [`linearize::build_stage_model`] augments the nominal sensitivities
//!   with the residual Jacobian and mean.
pub mod integrator;
pub mod linearize;

pub mod prelude {
    pub use super::integrator::{
        AffineIntegrator, IntegratorOutput, Rk4Integrator, SensitivityIntegrator,
    };
    pub use super::linearize::{AugmentedStage, build_stage_model};
}
