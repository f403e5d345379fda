//! zoro::options — iteration settings, uncertainty description, dimensions.
//!
//! - [`ZoroOptions`]: termination tolerance, iteration cap, finiteness checks.
//! - [`UncertaintyModel`]: initial covariance, process noise and noise map.
//! - [`ZoroDims`]: problem dimensions cross-checked at solver construction.
use crate::{
    covariance::{codec::sym_vec_len, propagation::check_symmetric},
    zoro::errors::{ZoroError, ZoroResult},
};
use ndarray::Array2;

/// Relative tolerance for symmetry checks on user-supplied covariances.
pub const SYMMETRY_TOL: f64 = 1e-10;

/// Settings for one call to [`ZoroSolver::solve`](crate::zoro::solver::ZoroSolver::solve).
///
/// - `tol_nlp`: converged when `max(residuals) < tol_nlp`.
/// - `n_iter_max`: hard cap on outer iterations.
/// - `check_finite`: when `true`, NaN/inf in a stage model, propagated
///   covariance or tightened bound aborts with
///   [`ZoroError::NumericalDegeneracy`]; when `false` they propagate
///   silently.
///
/// Default: `tol_nlp = 1e-6`, `n_iter_max = 30`, `check_finite = true`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoroOptions {
    pub tol_nlp: f64,
    pub n_iter_max: usize,
    pub check_finite: bool,
}

impl ZoroOptions {
    /// Construct validated options.
    ///
    /// # Errors
    /// - `ZoroError::InvalidTolerance` if `tol_nlp` is not finite and > 0.
    /// - `ZoroError::InvalidMaxIter` if `n_iter_max == 0`.
    pub fn new(tol_nlp: f64, n_iter_max: usize, check_finite: bool) -> ZoroResult<Self> {
        if !tol_nlp.is_finite() {
            return Err(ZoroError::InvalidTolerance {
                tol: tol_nlp,
                reason: "Tolerance must be finite.",
            });
        }
        if tol_nlp <= 0.0 {
            return Err(ZoroError::InvalidTolerance {
                tol: tol_nlp,
                reason: "Tolerance must be positive.",
            });
        }
        if n_iter_max == 0 {
            return Err(ZoroError::InvalidMaxIter {
                max_iter: n_iter_max,
                reason: "Maximum iterations must be greater than zero.",
            });
        }
        Ok(Self { tol_nlp, n_iter_max, check_finite })
    }
}

impl Default for ZoroOptions {
    fn default() -> Self {
        Self { tol_nlp: 1e-6, n_iter_max: 30, check_finite: true }
    }
}

/// Gaussian uncertainty entering the prediction model.
///
/// `x_{k+1} = f(x_k, u_k) + B (g(x_k, u_k) + w_k)`, `w_k ~ N(0, Sigma_W)`,
/// `x_0 ~ N(x̄_0, Sigma_x0)`.
#[derive(Debug, Clone, PartialEq)]
pub struct UncertaintyModel {
    pub sigma_x0: Array2<f64>,
    pub sigma_w: Array2<f64>,
    pub noise_map: Array2<f64>,
}

impl UncertaintyModel {
    /// Validate and assemble the uncertainty description.
    ///
    /// `noise_map` defaults to the `nx×nx` identity (so `nw = nx`).
    ///
    /// # Errors
    /// - `NotSquare`/`NonFiniteInput`/`NotSymmetric` for malformed
    ///   covariances.
    /// - `DimensionMismatch` when `noise_map` is not `nx×nw`.
    pub fn new(
        sigma_x0: Array2<f64>, sigma_w: Array2<f64>, noise_map: Option<Array2<f64>>,
    ) -> ZoroResult<Self> {
        check_symmetric("Sigma_x0", &sigma_x0, SYMMETRY_TOL)?;
        check_symmetric("Sigma_W", &sigma_w, SYMMETRY_TOL)?;
        let nx = sigma_x0.nrows();
        let nw = sigma_w.nrows();
        let noise_map = noise_map.unwrap_or_else(|| Array2::eye(nx));
        if noise_map.dim() != (nx, nw) {
            return Err(ZoroError::DimensionMismatch {
                what: "noise map B",
                expected: (nx, nw),
                found: noise_map.dim(),
            });
        }
        if let Some((index, &value)) = noise_map.iter().enumerate().find(|(_, v)| !v.is_finite())
        {
            return Err(ZoroError::NonFiniteInput { what: "noise map B", index, value });
        }
        Ok(Self { sigma_x0, sigma_w, noise_map })
    }

    pub fn nx(&self) -> usize {
        self.sigma_x0.nrows()
    }

    pub fn nw(&self) -> usize {
        self.sigma_w.nrows()
    }
}

/// Problem dimensions.
///
/// `nx` states, `nu` controls, `nw` residual/noise outputs, `nh` tightened
/// constraints per stage, `n` shooting intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoroDims {
    pub nx: usize,
    pub nu: usize,
    pub nw: usize,
    pub nh: usize,
    pub n: usize,
}

impl ZoroDims {
    /// Length of the vectorized covariance, `nx(nx+1)/2`.
    pub const fn nvec(&self) -> usize {
        sym_vec_len(self.nx)
    }

    /// Query dimension `nx + nu`.
    pub const fn ny(&self) -> usize {
        self.nx + self.nu
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Defaults and validation of `ZoroOptions`.
    // - Identity default and shape checks of `UncertaintyModel`.
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // Defaults match the documented values and invalid settings are rejected.
    //
    // Given
    // -----
    // - `ZoroOptions::default()`, a zero tolerance, a NaN tolerance and a
    //   zero iteration cap.
    //
    // Expect
    // ------
    // - (1e-6, 30, true); `InvalidTolerance` twice; `InvalidMaxIter`.
    fn options_defaults_and_validation() {
        let opts = ZoroOptions::default();
        assert_eq!(opts, ZoroOptions::new(1e-6, 30, true).unwrap());

        assert!(matches!(ZoroOptions::new(0.0, 5, true), Err(ZoroError::InvalidTolerance { .. })));
        assert!(matches!(
            ZoroOptions::new(f64::NAN, 5, true),
            Err(ZoroError::InvalidTolerance { .. })
        ));
        assert!(matches!(
            ZoroOptions::new(1e-3, 0, true),
            Err(ZoroError::InvalidMaxIter { max_iter: 0, .. })
        ));
    }

    #[test]
    // Purpose
    // -------
    // The noise map defaults to identity and is otherwise shape-checked.
    //
    // Given
    // -----
    // - nx = 2 with nw = 2 and no map; then nw = 1 with a 2×2 map.
    //
    // Expect
    // ------
    // - Identity map; `DimensionMismatch` for the wrong map.
    fn uncertainty_model_defaults_noise_map_to_identity() {
        let model = UncertaintyModel::new(Array2::eye(2), Array2::eye(2) * 0.1, None).unwrap();
        assert_eq!(model.noise_map, Array2::<f64>::eye(2));
        assert_eq!((model.nx(), model.nw()), (2, 2));

        let err = UncertaintyModel::new(Array2::eye(2), array![[0.1]], Some(Array2::eye(2)))
            .unwrap_err();
        assert_eq!(err, ZoroError::DimensionMismatch {
            what: "noise map B",
            expected: (2, 1),
            found: (2, 2)
        });
    }
}
