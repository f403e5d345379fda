//! residual::adapter — uniform access to an optional residual-dynamics model.
//!
//! Purpose
//! -------
//! Hide whether a learned residual model is present. The iteration loop
//! always receives a [`ResidualPrediction`] with the residual mean, its
//! Jacobian w.r.t. the query points, and the predictive variance; without a
//! model every entry is zero and the pipeline reduces to the nominal
//! dynamics.
//!
//! Key behaviors
//! -------------
//! - One batched evaluation per outer iteration for all `N` query points.
//! - [`ResidualModel::synchronize`] is called before and after the batch so
//!   accelerator-backed models finish outstanding work.
//! - Returned shapes are checked before they reach the stage builder.
//!
//! Conventions
//! -----------
//! - Query matrix `y` is `N × (nx + nu)`: row `k` is `[x_k, u_k]`.
//! - `mean` and `variance` are `N × nw`.
//! - `mean_jacobian` is `nw × N × (nx + nu)`; entry `[i, k, j]` is
//!   `∂mean[k, i] / ∂y[k, j]`. Cross-sample derivatives are not represented.
use crate::residual::errors::{ResidualError, ResidualResult};
use finitediff::FiniteDiff;
use ndarray::{Array1, Array2, Array3, ArrayView2, s};
use std::cell::RefCell;

/// Learned correction `g(x, u)` to the nominal discrete-time dynamics.
pub trait ResidualModel {
    /// Query dimension `nx + nu`.
    fn input_dim(&self) -> usize;

    /// Residual dimension `nw`.
    fn output_dim(&self) -> usize;

    /// Posterior mean and variance at every row of `y`.
    fn predict(&self, y: &Array2<f64>) -> ResidualResult<(Array2<f64>, Array2<f64>)>;

    /// Jacobian of the posterior mean, `nw × N × input_dim`.
    ///
    /// Defaults to per-sample central differences of [`ResidualModel::predict`].
    fn mean_jacobian(&self, y: &Array2<f64>) -> ResidualResult<Array3<f64>> {
        fd_mean_jacobian(self, y)
    }

    /// Ordering barrier around batched evaluation. No-op by default.
    fn synchronize(&self) {}
}

/// fd_mean_jacobian — central-difference mean Jacobian of a residual model.
///
/// Each sample is perturbed on its own, so the cost is
/// `2 · N · nw · input_dim` single-row predictions. Any error raised by the
/// model inside the difference stencil is captured and returned.
///
/// # Errors
/// - The first error returned by `model.predict` while differencing.
/// - `ResidualError::ShapeMismatch` when a single-row prediction does not
///   have `output_dim` columns.
pub fn fd_mean_jacobian<M: ResidualModel + ?Sized>(
    model: &M, y: &Array2<f64>,
) -> ResidualResult<Array3<f64>> {
    let (n, ny) = y.dim();
    let nw = model.output_dim();
    let mut jac = Array3::<f64>::zeros((nw, n, ny));
    let closure_err: RefCell<Option<ResidualError>> = RefCell::new(None);

    for k in 0..n {
        let point: Array1<f64> = y.row(k).to_owned();
        for i in 0..nw {
            let mean_i = |p: &Array1<f64>| -> f64 {
                let batch = p.clone().insert_axis(ndarray::Axis(0));
                match model.predict(&batch) {
                    Ok((mean, _)) if mean.dim() == (1, nw) => mean[[0, i]],
                    Ok((mean, _)) => {
                        closure_err.replace(Some(ResidualError::ShapeMismatch {
                            what: "single-sample mean",
                            expected: vec![1, nw],
                            found: mean.shape().to_vec(),
                        }));
                        f64::NAN
                    }
                    Err(err) => {
                        closure_err.replace(Some(err));
                        f64::NAN
                    }
                }
            };
            let grad = point.central_diff(&mean_i);
            if let Some(err) = closure_err.take() {
                return Err(err);
            }
            jac.slice_mut(s![i, k, ..]).assign(&grad);
        }
    }
    Ok(jac)
}

/// Residual model outputs for one batch of query points.
#[derive(Debug, Clone, PartialEq)]
pub struct ResidualPrediction {
    pub mean: Array2<f64>,
    pub mean_jacobian: Array3<f64>,
    pub variance: Array2<f64>,
}

impl ResidualPrediction {
    /// All-zero prediction for `n` samples.
    pub fn zeros(n: usize, nw: usize, ny: usize) -> Self {
        ResidualPrediction {
            mean: Array2::zeros((n, nw)),
            mean_jacobian: Array3::zeros((nw, n, ny)),
            variance: Array2::zeros((n, nw)),
        }
    }

    pub fn len(&self) -> usize {
        self.mean.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.mean.nrows() == 0
    }

    /// `∂mean[k] / ∂x_k`, shape `nw × nx`.
    pub fn state_jacobian(&self, stage: usize, nx: usize) -> ArrayView2<'_, f64> {
        self.mean_jacobian.slice(s![.., stage, 0..nx])
    }

    /// `∂mean[k] / ∂u_k`, shape `nw × nu`.
    pub fn control_jacobian(&self, stage: usize, nx: usize) -> ArrayView2<'_, f64> {
        self.mean_jacobian.slice(s![.., stage, nx..])
    }
}

/// Wraps an optional [`ResidualModel`] behind a fixed `(nx, nu, nw)` layout.
pub struct ResidualModelAdapter {
    model: Option<Box<dyn ResidualModel>>,
    nx: usize,
    nu: usize,
    nw: usize,
}

impl std::fmt::Debug for ResidualModelAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResidualModelAdapter")
            .field("has_model", &self.model.is_some())
            .field("nx", &self.nx)
            .field("nu", &self.nu)
            .field("nw", &self.nw)
            .finish()
    }
}

impl ResidualModelAdapter {
    /// Build an adapter; a present model must match `nx + nu` inputs and
    /// `nw` outputs.
    ///
    /// # Errors
    /// `ResidualError::ShapeMismatch` on a dimension disagreement.
    pub fn new(
        model: Option<Box<dyn ResidualModel>>, nx: usize, nu: usize, nw: usize,
    ) -> ResidualResult<Self> {
        if let Some(m) = &model {
            if m.input_dim() != nx + nu || m.output_dim() != nw {
                return Err(ResidualError::ShapeMismatch {
                    what: "residual model (input_dim, output_dim)",
                    expected: vec![nx + nu, nw],
                    found: vec![m.input_dim(), m.output_dim()],
                });
            }
        }
        Ok(ResidualModelAdapter { model, nx, nu, nw })
    }

    /// Adapter with no model: every prediction is zero.
    pub fn none(nx: usize, nu: usize, nw: usize) -> Self {
        ResidualModelAdapter { model: None, nx, nu, nw }
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    pub fn nx(&self) -> usize {
        self.nx
    }

    pub fn nu(&self) -> usize {
        self.nu
    }

    pub fn nw(&self) -> usize {
        self.nw
    }

    /// Evaluate mean, mean Jacobian and variance at all rows of `y`.
    ///
    /// # Errors
    /// - `ResidualError::ShapeMismatch` when `y` is not `N × (nx + nu)` or a
    ///   model output has the wrong shape.
    /// - Any error returned by the model itself.
    pub fn evaluate(&self, y: &Array2<f64>) -> ResidualResult<ResidualPrediction> {
        let ny = self.nx + self.nu;
        let n = y.nrows();
        if y.ncols() != ny {
            return Err(ResidualError::ShapeMismatch {
                what: "query points",
                expected: vec![n, ny],
                found: y.shape().to_vec(),
            });
        }
        let Some(model) = &self.model else {
            return Ok(ResidualPrediction::zeros(n, self.nw, ny));
        };

        model.synchronize();
        let (mean, variance) = model.predict(y)?;
        let mean_jacobian = model.mean_jacobian(y)?;
        model.synchronize();

        check_shape("mean", mean.shape(), &[n, self.nw])?;
        check_shape("variance", variance.shape(), &[n, self.nw])?;
        check_shape("mean_jacobian", mean_jacobian.shape(), &[self.nw, n, ny])?;

        Ok(ResidualPrediction { mean, mean_jacobian, variance })
    }
}

fn check_shape(what: &'static str, found: &[usize], expected: &[usize]) -> ResidualResult<()> {
    if found != expected {
        return Err(ResidualError::ShapeMismatch {
            what,
            expected: expected.to_vec(),
            found: found.to_vec(),
        });
    }
    Ok(())
}
