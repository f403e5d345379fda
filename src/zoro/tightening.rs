//! zoro::tightening — zero-order constraint tightening.
//!
//! Purpose
//! -------
//! Adjust the lower bounds of the uncertainty-aware constraints at each
//! stage by a first-order correction in the covariance change since the
//! previous iteration:
//!
//! ```text
//! delta_k      = sigma_vec_k − sigma_vec_k^prev   (0 when there is no previous)
//! tightening_k = H(x_k, sigma_vec_k) · delta_k
//! lh_k         = lh_nominal + tightening_k
//! ```
//!
//! with `H = ∂h/∂sigma_vec`. Only lower bounds are tightened; upper and
//! general linear bounds are left as configured in the OCP.
//!
//! Invariants & assumptions
//! ------------------------
//! - The correction is accurate only while the covariance moves little
//!   between iterations; it is exact in the limit of a converged
//!   covariance trajectory.
//! - `previous` refers to the same stage in the previous outer iteration.
//!
//! [`exact_backoff`] evaluates the full Gaussian back-off for comparison.
use crate::{
    sensitivity::constraint::ConstraintSensitivity,
    zoro::errors::{ZoroError, ZoroResult},
};
use ndarray::{Array1, Array2};
use statrs::distribution::{ContinuousCDF, Normal};

/// Outcome of tightening one stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageTightening {
    pub delta_sigma: Array1<f64>,
    pub tightening: Array1<f64>,
    pub lh: Array1<f64>,
}

impl StageTightening {
    /// Largest absolute covariance change entering the correction.
    pub fn max_abs_delta(&self) -> f64 {
        self.delta_sigma.iter().fold(0.0_f64, |m, d| m.max(d.abs()))
    }
}

/// Applies the zero-order correction around a fixed sensitivity provider.
#[derive(Debug, Clone)]
pub struct ConstraintTightener<S: ConstraintSensitivity> {
    sensitivity: S,
    lh_nominal: Array1<f64>,
}

impl<S: ConstraintSensitivity> ConstraintTightener<S> {
    /// # Errors
    /// `ZoroError::LengthMismatch` when `lh_nominal` does not have `nh`
    /// entries.
    pub fn new(sensitivity: S, lh_nominal: Array1<f64>) -> ZoroResult<Self> {
        let nh = sensitivity.nh();
        if lh_nominal.len() != nh {
            return Err(ZoroError::LengthMismatch {
                what: "nominal lower bound lh",
                expected: nh,
                found: lh_nominal.len(),
            });
        }
        Ok(ConstraintTightener { sensitivity, lh_nominal })
    }

    pub fn sensitivity(&self) -> &S {
        &self.sensitivity
    }

    pub fn lh_nominal(&self) -> &Array1<f64> {
        &self.lh_nominal
    }

    pub fn nh(&self) -> usize {
        self.lh_nominal.len()
    }

    /// `H` at `(x, sigma_vec)`, checked to be `nh × nvec`.
    pub fn jacobian(&self, x: &Array1<f64>, sigma_vec: &Array1<f64>) -> ZoroResult<Array2<f64>> {
        let h = self.sensitivity.jacobian(x, sigma_vec)?;
        let expected = (self.sensitivity.nh(), self.sensitivity.nvec());
        if h.dim() != expected {
            return Err(ZoroError::DimensionMismatch {
                what: "constraint sensitivity H",
                expected,
                found: h.dim(),
            });
        }
        Ok(h)
    }

    /// Covariance change against the previous iteration's value.
    pub fn delta(
        &self, sigma_vec: &Array1<f64>, previous: Option<&Array1<f64>>,
    ) -> ZoroResult<Array1<f64>> {
        match previous {
            None => Ok(Array1::zeros(sigma_vec.len())),
            Some(prev) if prev.len() == sigma_vec.len() => Ok(sigma_vec - prev),
            Some(prev) => Err(ZoroError::LengthMismatch {
                what: "previous sigma_vec",
                expected: sigma_vec.len(),
                found: prev.len(),
            }),
        }
    }

    /// First-order correction `H · delta`.
    ///
    /// # Errors
    /// `ZoroError::LengthMismatch` when `delta` does not match the columns
    /// of `H`.
    pub fn correction(&self, h: &Array2<f64>, delta: &Array1<f64>) -> ZoroResult<Array1<f64>> {
        if h.ncols() != delta.len() {
            return Err(ZoroError::LengthMismatch {
                what: "covariance change delta_sigma",
                expected: h.ncols(),
                found: delta.len(),
            });
        }
        Ok(h.dot(delta))
    }

    /// Tightened lower bound `lh_nominal + tightening`.
    pub fn lower_bound(&self, tightening: &Array1<f64>) -> Array1<f64> {
        &self.lh_nominal + tightening
    }

    /// Full zero-order tightening of one stage.
    ///
    /// # Errors
    /// Shape errors from the sensitivity provider or a mismatched
    /// `previous`.
    pub fn tighten(
        &self, x: &Array1<f64>, sigma_vec: &Array1<f64>, previous: Option<&Array1<f64>>,
    ) -> ZoroResult<StageTightening> {
        let h = self.jacobian(x, sigma_vec)?;
        let delta_sigma = self.delta(sigma_vec, previous)?;
        let tightening = self.correction(&h, &delta_sigma)?;
        let lh = self.lower_bound(&tightening);
        Ok(StageTightening { delta_sigma, tightening, lh })
    }
}

/// exact_backoff — Gaussian back-off `Φ⁻¹(prob) · sqrt(diag(h_x P h_xᵀ))`.
///
/// Parameters
/// ----------
/// - `h_x`: `&Array2<f64>` constraint Jacobian w.r.t. the state, `nh × nx`.
/// - `p`: `&Array2<f64>` state covariance, `nx × nx`.
/// - `prob`: `f64` satisfaction probability in `(0, 1)`.
///
/// Returns
/// -------
/// `ZoroResult<Array1<f64>>`
///   Per-constraint back-off. Negative variances from rounding are clamped
///   to zero.
///
/// Errors
/// ------
/// - `ZoroError::InvalidProbability` unless `0 < prob < 1`.
/// - `ZoroError::DimensionMismatch` on inconsistent shapes.
pub fn exact_backoff(h_x: &Array2<f64>, p: &Array2<f64>, prob: f64) -> ZoroResult<Array1<f64>> {
    if !(prob > 0.0 && prob < 1.0) {
        return Err(ZoroError::InvalidProbability {
            prob,
            reason: "Probability must lie strictly between 0 and 1.",
        });
    }
    let nx = h_x.ncols();
    if p.dim() != (nx, nx) {
        return Err(ZoroError::DimensionMismatch {
            what: "covariance P",
            expected: (nx, nx),
            found: p.dim(),
        });
    }
    let std_normal = Normal::new(0.0, 1.0).map_err(|_| ZoroError::InvalidProbability {
        prob,
        reason: "Standard normal distribution could not be constructed.",
    })?;
    let kappa = std_normal.inverse_cdf(prob);
    let hp = h_x.dot(p);
    let variances = (&hp * h_x).sum_axis(ndarray::Axis(1));
    Ok(variances.mapv(|v| kappa * v.max(0.0).sqrt()))
}
