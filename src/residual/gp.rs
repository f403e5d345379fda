//! residual::gp — exact Gaussian-process residual model.
//!
//! Purpose
//! -------
//! Provide a ready-to-use [`ResidualModel`]: one independent GP per residual
//! output, each with a squared-exponential ARD kernel, conditioned on a fixed
//! training set. Hyperparameters are supplied by the caller.
//!
//! Key behaviors
//! -------------
//! - The noisy Gram matrix `K + σ_n² I` is Cholesky-factorized once per
//!   output at construction (`nalgebra`); predictions reuse the factor.
//! - Posterior mean `k*ᵀ α` with `α = (K + σ_n² I)⁻¹ y`.
//! - Posterior variance of the latent function, `σ_f² − k*ᵀ (K + σ_n² I)⁻¹ k*`,
//!   clamped at zero.
//! - The mean Jacobian is analytic, replacing the finite-difference default.
//!
//! Invariants & assumptions
//! ------------------------
//! - Training inputs are `M × input_dim`, targets `M × nw`, both finite.
//! - Every lengthscale, `σ_f²` and `σ_n²` is finite and strictly positive.
use crate::residual::{
    adapter::ResidualModel,
    errors::{ResidualError, ResidualResult},
};
use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use ndarray::{Array1, Array2, Array3, ArrayView1};

/// Squared-exponential kernel with per-dimension lengthscales.
#[derive(Debug, Clone, PartialEq)]
pub struct SeKernel {
    pub lengthscales: Array1<f64>,
    pub signal_variance: f64,
    pub noise_variance: f64,
}

impl SeKernel {
    /// # Errors
    /// `ResidualError::InvalidHyperparameter` for a non-finite or
    /// non-positive hyperparameter.
    pub fn new(
        lengthscales: Array1<f64>, signal_variance: f64, noise_variance: f64,
    ) -> ResidualResult<Self> {
        for &l in lengthscales.iter() {
            check_positive("lengthscale", l)?;
        }
        check_positive("signal_variance", signal_variance)?;
        check_positive("noise_variance", noise_variance)?;
        Ok(SeKernel { lengthscales, signal_variance, noise_variance })
    }

    /// `k(a, b) = σ_f² exp(−½ Σ_d ((a_d − b_d) / l_d)²)`.
    pub fn eval(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        let r2: f64 = a
            .iter()
            .zip(b.iter())
            .zip(self.lengthscales.iter())
            .map(|((ai, bi), l)| {
                let d = (ai - bi) / l;
                d * d
            })
            .sum();
        self.signal_variance * (-0.5 * r2).exp()
    }
}

fn check_positive(name: &'static str, value: f64) -> ResidualResult<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ResidualError::InvalidHyperparameter { name, value });
    }
    Ok(())
}

#[derive(Debug, Clone)]
struct OutputPosterior {
    kernel: SeKernel,
    chol: Cholesky<f64, Dyn>,
    alpha: DVector<f64>,
}

/// Independent-output exact GP posterior.
#[derive(Debug, Clone)]
pub struct GaussianProcess {
    x_train: Array2<f64>,
    outputs: Vec<OutputPosterior>,
}

impl GaussianProcess {
    /// Condition one GP per target column on `(x_train, y_train)`.
    ///
    /// # Errors
    /// - `ResidualError::EmptyTrainingSet` when `x_train` has no rows.
    /// - `ResidualError::ShapeMismatch` when rows, kernel count, or
    ///   lengthscale count disagree.
    /// - `ResidualError::NonFiniteTrainingData` on NaN/inf in the data.
    /// - `ResidualError::CholeskyFailed` when a Gram matrix is not positive
    ///   definite.
    pub fn new(
        x_train: Array2<f64>, y_train: Array2<f64>, kernels: Vec<SeKernel>,
    ) -> ResidualResult<Self> {
        let (m, ny) = x_train.dim();
        if m == 0 {
            return Err(ResidualError::EmptyTrainingSet);
        }
        let nw = kernels.len();
        if y_train.dim() != (m, nw) {
            return Err(ResidualError::ShapeMismatch {
                what: "training targets",
                expected: vec![m, nw],
                found: y_train.shape().to_vec(),
            });
        }
        for (what, data) in [("inputs", &x_train), ("targets", &y_train)] {
            if let Some((index, &value)) = data.iter().enumerate().find(|(_, v)| !v.is_finite()) {
                return Err(ResidualError::NonFiniteTrainingData { what, index, value });
            }
        }

        let mut outputs = Vec::with_capacity(nw);
        for (i, kernel) in kernels.into_iter().enumerate() {
            if kernel.lengthscales.len() != ny {
                return Err(ResidualError::ShapeMismatch {
                    what: "kernel lengthscales",
                    expected: vec![ny],
                    found: vec![kernel.lengthscales.len()],
                });
            }
            let gram = DMatrix::from_fn(m, m, |r, c| {
                let k = kernel.eval(x_train.row(r), x_train.row(c));
                if r == c { k + kernel.noise_variance } else { k }
            });
            let chol = Cholesky::new(gram).ok_or(ResidualError::CholeskyFailed { output: i })?;
            let targets = DVector::from_iterator(m, y_train.column(i).iter().copied());
            let alpha = chol.solve(&targets);
            outputs.push(OutputPosterior { kernel, chol, alpha });
        }
        Ok(GaussianProcess { x_train, outputs })
    }

    pub fn n_train(&self) -> usize {
        self.x_train.nrows()
    }

    fn cross_kernel(&self, kernel: &SeKernel, q: ArrayView1<f64>) -> DVector<f64> {
        DVector::from_iterator(
            self.x_train.nrows(),
            self.x_train.rows().into_iter().map(|xj| kernel.eval(q, xj)),
        )
    }

    fn check_query(&self, y: &Array2<f64>) -> ResidualResult<()> {
        if y.ncols() != self.input_dim() {
            return Err(ResidualError::ShapeMismatch {
                what: "query points",
                expected: vec![y.nrows(), self.input_dim()],
                found: y.shape().to_vec(),
            });
        }
        Ok(())
    }
}

impl ResidualModel for GaussianProcess {
    fn input_dim(&self) -> usize {
        self.x_train.ncols()
    }

    fn output_dim(&self) -> usize {
        self.outputs.len()
    }

    fn predict(&self, y: &Array2<f64>) -> ResidualResult<(Array2<f64>, Array2<f64>)> {
        self.check_query(y)?;
        let n = y.nrows();
        let nw = self.outputs.len();
        let mut mean = Array2::<f64>::zeros((n, nw));
        let mut var = Array2::<f64>::zeros((n, nw));
        for (k, q) in y.rows().into_iter().enumerate() {
            for (i, post) in self.outputs.iter().enumerate() {
                let k_star = self.cross_kernel(&post.kernel, q);
                mean[[k, i]] = k_star.dot(&post.alpha);
                let v = post.chol.solve(&k_star);
                var[[k, i]] = (post.kernel.signal_variance - k_star.dot(&v)).max(0.0);
            }
        }
        Ok((mean, var))
    }

    // ∂/∂q_d k(q, x_j) = −k(q, x_j) (q_d − x_jd) / l_d².
    fn mean_jacobian(&self, y: &Array2<f64>) -> ResidualResult<Array3<f64>> {
        self.check_query(y)?;
        let (n, ny) = y.dim();
        let mut jac = Array3::<f64>::zeros((self.outputs.len(), n, ny));
        for (k, q) in y.rows().into_iter().enumerate() {
            for (i, post) in self.outputs.iter().enumerate() {
                for (j, xj) in self.x_train.rows().into_iter().enumerate() {
                    let w = post.alpha[j] * post.kernel.eval(q, xj);
                    for d in 0..ny {
                        let l = post.kernel.lengthscales[d];
                        jac[[i, k, d]] -= w * (q[d] - xj[d]) / (l * l);
                    }
                }
            }
        }
        Ok(jac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::residual::adapter::fd_mean_jacobian;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Hyperparameter validation.
    // - Interpolation and variance collapse at training points.
    // - Analytic mean gradient against finite differences.
    // - Reversion to the prior far from data.
    // -------------------------------------------------------------------------

    fn fitted(noise: f64) -> GaussianProcess {
        let x = array![[0.0, 0.0], [1.0, 0.5], [-0.5, 1.0], [0.3, -0.7], [1.2, 1.1]];
        let y = array![[0.0, 1.0], [0.8, -0.2], [-0.4, 0.3], [0.2, 0.9], [1.0, -0.5]];
        let kernels = vec![
            SeKernel::new(array![0.8, 1.1], 1.0, noise).unwrap(),
            SeKernel::new(array![0.5, 0.6], 0.5, noise).unwrap(),
        ];
        GaussianProcess::new(x, y, kernels).unwrap()
    }

    #[test]
    // Purpose
    // -------
    // Reject invalid hyperparameters.
    //
    // Given
    // -----
    // - A zero lengthscale and a negative noise variance.
    //
    // Expect
    // ------
    // - `InvalidHyperparameter` naming the offending field.
    fn invalid_hyperparameters_are_rejected() {
        let err = SeKernel::new(array![1.0, 0.0], 1.0, 0.1).unwrap_err();
        assert_eq!(err, ResidualError::InvalidHyperparameter { name: "lengthscale", value: 0.0 });
        let err = SeKernel::new(array![1.0], 1.0, -0.1).unwrap_err();
        assert!(matches!(err, ResidualError::InvalidHyperparameter { name: "noise_variance", .. }));
    }

    #[test]
    // Purpose
    // -------
    // With near-zero noise the posterior interpolates the targets and its
    // variance collapses at training inputs.
    //
    // Given
    // -----
    // - Five training points, σ_n² = 1e-8.
    //
    // Expect
    // ------
    // - Mean within 1e-3 of targets, variance below 1e-3.
    fn posterior_interpolates_training_data() {
        // Arrange
        let gp = fitted(1e-8);
        let x = array![[1.0, 0.5], [0.3, -0.7]];

        // Act
        let (mean, var) = gp.predict(&x).unwrap();

        // Assert
        assert_abs_diff_eq!(mean[[0, 0]], 0.8, epsilon = 1e-3);
        assert_abs_diff_eq!(mean[[1, 1]], 0.9, epsilon = 1e-3);
        assert!(var.iter().all(|&v| (0.0..1e-3).contains(&v)));
    }

    #[test]
    // Purpose
    // -------
    // The analytic mean Jacobian matches central differences.
    //
    // Given
    // -----
    // - σ_n² = 1e-2 and three query points away from the training inputs.
    //
    // Expect
    // ------
    // - Entrywise agreement within 1e-5.
    fn analytic_gradient_matches_finite_differences() {
        // Arrange
        let gp = fitted(1e-2);
        let q = array![[0.4, 0.2], [-0.1, 0.9], [1.5, -0.3]];

        // Act
        let analytic = gp.mean_jacobian(&q).unwrap();
        let numeric = fd_mean_jacobian(&gp, &q).unwrap();

        // Assert
        assert_eq!(analytic.dim(), (2, 3, 2));
        for (a, b) in analytic.iter().zip(numeric.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-5);
        }
    }

    #[test]
    // Purpose
    // -------
    // Far from the data the posterior reverts to the zero-mean prior.
    //
    // Given
    // -----
    // - A query point 100 lengthscales away.
    //
    // Expect
    // ------
    // - Mean ≈ 0 and variance ≈ σ_f² for each output.
    fn far_query_reverts_to_prior() {
        let gp = fitted(1e-2);
        let (mean, var) = gp.predict(&array![[100.0, 100.0]]).unwrap();
        assert_abs_diff_eq!(mean[[0, 0]], 0.0, epsilon = 1e-12);
        assert_relative_eq!(var[[0, 0]], 1.0, epsilon = 1e-12);
        assert_relative_eq!(var[[0, 1]], 0.5, epsilon = 1e-12);
    }
}
