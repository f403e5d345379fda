//! dynamics::linearize — augmented affine stage model.
//!
//! Builds the affine model the OCP solver sees at stage `k` by combining the
//! nominal integrator sensitivities with the residual model:
//!
//! ```text
//! A_total = Sx + B · ∂mean_k/∂x
//! B_total = Su + B · ∂mean_k/∂u
//! f_hat   = x⁺_nom + B · mean_k − A_total · x_k − B_total · u_k
//! ```
//!
//! so that `A_total x + B_total u + f_hat` reproduces the augmented dynamics
//! `x⁺_nom + B·mean_k` at the linearization point. NaN/inf in any input flow
//! through unchanged.
use crate::{dynamics::integrator::IntegratorOutput, residual::adapter::ResidualPrediction};
use ndarray::{Array1, Array2};

/// Affine stage model `x⁺ ≈ A x + B u + f_hat`.
#[derive(Debug, Clone, PartialEq)]
pub struct AugmentedStage {
    pub a_total: Array2<f64>,
    pub b_total: Array2<f64>,
    pub f_hat: Array1<f64>,
}

impl AugmentedStage {
    /// Evaluate the affine model at `(x, u)`.
    pub fn predict(&self, x: &Array1<f64>, u: &Array1<f64>) -> Array1<f64> {
        self.a_total.dot(x) + self.b_total.dot(u) + &self.f_hat
    }
}

/// build_stage_model — linearize stage `stage` around `(x, u)`.
///
/// `noise_map` is the `nx×nw` matrix mapping residual outputs into the
/// state. Shapes are assumed consistent with `nominal` and `prediction`; the
/// caller validates them once up front.
pub fn build_stage_model(
    nominal: &IntegratorOutput, noise_map: &Array2<f64>, prediction: &ResidualPrediction,
    stage: usize, x: &Array1<f64>, u: &Array1<f64>,
) -> AugmentedStage {
    let nx = x.len();
    let a_total = &nominal.sx + &noise_map.dot(&prediction.state_jacobian(stage, nx));
    let b_total = &nominal.su + &noise_map.dot(&prediction.control_jacobian(stage, nx));
    let shifted = &nominal.x_next + &noise_map.dot(&prediction.mean.row(stage));
    let f_hat = shifted - a_total.dot(x) - b_total.dot(u);
    AugmentedStage { a_total, b_total, f_hat }
}
