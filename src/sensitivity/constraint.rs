//! sensitivity::constraint — Jacobians of the constraint w.r.t. the
//! vectorized covariance.
//!
//! Purpose
//! -------
//! Provide the sensitivity `H = ∂h/∂sigma_vec` (shape `nh × nx(nx+1)/2`) that
//! the zero-order tightening multiplies against the covariance change. The
//! function is fixed at construction time and then evaluated once per stage
//! per iteration.
//!
//! Key behaviors
//! -------------
//! - [`DualJacobian`] differentiates a [`ConstraintExpr`] exactly with
//!   forward-mode [`Dual`] numbers, one column per seeded coordinate. It also
//!   exposes the state Jacobian `∂h/∂x` used by the exact back-off.
//! - [`FiniteDiffJacobian`] wraps a plain `f64` closure and differentiates it
//!   with `finitediff` central differences, row by row.
//!
//! Invariants & assumptions
//! ------------------------
//! - `sigma_vec` follows the codec ordering in
//!   [`crate::covariance::codec`]; expressions that need the matrix form
//!   rebuild it with [`unflatten`].
//! - Returned Jacobians are `nh × nvec` and are checked for shape.
use crate::{
    covariance::codec::{sym_vec_len, unflatten},
    sensitivity::dual::{Dual, Real, quad_form},
    zoro::errors::{ZoroError, ZoroResult},
};
use finitediff::FiniteDiff;
use ndarray::{Array1, Array2};

/// Evaluation interface shared by all sensitivity providers.
pub trait ConstraintSensitivity {
    fn nx(&self) -> usize;
    fn nh(&self) -> usize;

    fn nvec(&self) -> usize {
        sym_vec_len(self.nx())
    }

    /// `H = ∂h/∂sigma_vec` at `(x, sigma_vec)`, shape `nh × nvec`.
    fn jacobian(&self, x: &Array1<f64>, sigma_vec: &Array1<f64>) -> ZoroResult<Array2<f64>>;
}

/// Constraint `h(x, sigma_vec)` written generically over the scalar type.
pub trait ConstraintExpr {
    fn nx(&self) -> usize;
    fn nh(&self) -> usize;
    fn eval<T: Real>(&self, x: &Array1<T>, sigma_vec: &Array1<T>) -> Array1<T>;
}

fn check_inputs(nx: usize, x: &Array1<f64>, sigma_vec: &Array1<f64>) -> ZoroResult<()> {
    if x.len() != nx {
        return Err(ZoroError::LengthMismatch { what: "state", expected: nx, found: x.len() });
    }
    let nvec = sym_vec_len(nx);
    if sigma_vec.len() != nvec {
        return Err(ZoroError::LengthMismatch {
            what: "sigma_vec",
            expected: nvec,
            found: sigma_vec.len(),
        });
    }
    Ok(())
}

fn check_output(nh: usize, found: usize) -> ZoroResult<()> {
    if found != nh {
        return Err(ZoroError::LengthMismatch { what: "constraint output", expected: nh, found });
    }
    Ok(())
}

/// Exact Jacobians of a [`ConstraintExpr`] via forward-mode duals.
#[derive(Debug, Clone)]
pub struct DualJacobian<C: ConstraintExpr> {
    expr: C,
}

impl<C: ConstraintExpr> DualJacobian<C> {
    pub fn new(expr: C) -> Self {
        DualJacobian { expr }
    }

    pub fn expr(&self) -> &C {
        &self.expr
    }

    /// Nominal constraint value `h(x, sigma_vec)`.
    pub fn value(&self, x: &Array1<f64>, sigma_vec: &Array1<f64>) -> ZoroResult<Array1<f64>> {
        check_inputs(self.expr.nx(), x, sigma_vec)?;
        let h = self.expr.eval(x, sigma_vec);
        check_output(self.expr.nh(), h.len())?;
        Ok(h)
    }

    /// `∂h/∂x` at `(x, sigma_vec)`, shape `nh × nx`.
    pub fn state_jacobian(
        &self, x: &Array1<f64>, sigma_vec: &Array1<f64>,
    ) -> ZoroResult<Array2<f64>> {
        check_inputs(self.expr.nx(), x, sigma_vec)?;
        let sigma_d = sigma_vec.mapv(Dual::constant);
        self.seeded_columns(x.len(), |j| {
            let mut x_d = x.mapv(Dual::constant);
            x_d[j] = Dual::variable(x[j]);
            self.expr.eval(&x_d, &sigma_d)
        })
    }

    // Column j holds the tangents of h with coordinate j seeded.
    fn seeded_columns<F>(&self, ncols: usize, eval_seeded: F) -> ZoroResult<Array2<f64>>
    where
        F: Fn(usize) -> Array1<Dual>,
    {
        let nh = self.expr.nh();
        let mut jac = Array2::<f64>::zeros((nh, ncols));
        for j in 0..ncols {
            let h = eval_seeded(j);
            check_output(nh, h.len())?;
            for (i, hi) in h.iter().enumerate() {
                jac[[i, j]] = hi.tangent();
            }
        }
        Ok(jac)
    }
}

impl<C: ConstraintExpr> ConstraintSensitivity for DualJacobian<C> {
    fn nx(&self) -> usize {
        self.expr.nx()
    }

    fn nh(&self) -> usize {
        self.expr.nh()
    }

    fn jacobian(&self, x: &Array1<f64>, sigma_vec: &Array1<f64>) -> ZoroResult<Array2<f64>> {
        check_inputs(self.expr.nx(), x, sigma_vec)?;
        let x_d = x.mapv(Dual::constant);
        self.seeded_columns(sigma_vec.len(), |j| {
            let mut sigma_d = sigma_vec.mapv(Dual::constant);
            sigma_d[j] = Dual::variable(sigma_vec[j]);
            self.expr.eval(&x_d, &sigma_d)
        })
    }
}

/// Finite-difference Jacobians of a plain `f64` constraint closure.
pub struct FiniteDiffJacobian<F>
where
    F: Fn(&Array1<f64>, &Array1<f64>) -> Array1<f64>,
{
    nx: usize,
    nh: usize,
    func: F,
}

impl<F> FiniteDiffJacobian<F>
where
    F: Fn(&Array1<f64>, &Array1<f64>) -> Array1<f64>,
{
    pub fn new(nx: usize, nh: usize, func: F) -> Self {
        FiniteDiffJacobian { nx, nh, func }
    }
}

impl<F> ConstraintSensitivity for FiniteDiffJacobian<F>
where
    F: Fn(&Array1<f64>, &Array1<f64>) -> Array1<f64>,
{
    fn nx(&self) -> usize {
        self.nx
    }

    fn nh(&self) -> usize {
        self.nh
    }

    fn jacobian(&self, x: &Array1<f64>, sigma_vec: &Array1<f64>) -> ZoroResult<Array2<f64>> {
        check_inputs(self.nx, x, sigma_vec)?;
        check_output(self.nh, (self.func)(x, sigma_vec).len())?;
        // finitediff returns inputs × outputs.
        let jac = sigma_vec.central_jacobian(&|s: &Array1<f64>| (self.func)(x, s));
        Ok(jac.reversed_axes())
    }
}

/// Standard-deviation back-off constraint `h(x, P) = cᵀx + κ·sqrt(cᵀ P c + ε)`.
///
/// One row per direction `c`. This is the usual chance-constraint surrogate
/// and serves as a ready-made [`ConstraintExpr`].
#[derive(Debug, Clone)]
pub struct LinearBackoffConstraint {
    directions: Array2<f64>,
    kappa: f64,
    epsilon: f64,
}

impl LinearBackoffConstraint {
    /// `directions` has shape `nh × nx`; `epsilon` regularizes the square
    /// root at zero variance.
    pub fn new(directions: Array2<f64>, kappa: f64, epsilon: f64) -> ZoroResult<Self> {
        if let Some((index, &value)) =
            directions.iter().enumerate().find(|(_, v)| !v.is_finite())
        {
            return Err(ZoroError::NonFiniteInput { what: "constraint directions", index, value });
        }
        if !kappa.is_finite() {
            return Err(ZoroError::NonFiniteInput { what: "kappa", index: 0, value: kappa });
        }
        if !epsilon.is_finite() || epsilon < 0.0 {
            return Err(ZoroError::NonFiniteInput { what: "epsilon", index: 0, value: epsilon });
        }
        Ok(LinearBackoffConstraint { directions, kappa, epsilon })
    }
}

impl ConstraintExpr for LinearBackoffConstraint {
    fn nx(&self) -> usize {
        self.directions.ncols()
    }

    fn nh(&self) -> usize {
        self.directions.nrows()
    }

    fn eval<T: Real>(&self, x: &Array1<T>, sigma_vec: &Array1<T>) -> Array1<T> {
        let nx = self.nx();
        let p: Array2<T> = match unflatten(sigma_vec, nx) {
            Ok(p) => p,
            Err(_) => return Array1::from_elem(self.nh(), T::constant(f64::NAN)),
        };
        let kappa = T::constant(self.kappa);
        let eps = T::constant(self.epsilon);
        self.directions
            .rows()
            .into_iter()
            .map(|row| {
                let c: Vec<T> = row.iter().map(|&v| T::constant(v)).collect();
                let mean = c.iter().zip(x.iter()).fold(T::zero(), |acc, (&ci, &xi)| acc + ci * xi);
                mean + kappa * (quad_form(&c, &p) + eps).sqrt()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::covariance::codec::sym_mat2vec;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Exact dual Jacobians of a linear-in-sigma constraint.
    // - Agreement of dual and finite-difference Jacobians on a nonlinear
    //   back-off constraint.
    // - Input length validation.
    // -------------------------------------------------------------------------

    struct TraceConstraint;

    // h(x, P) = [ P00 + 2 P01 + 3 P11 + x0 ]
    impl ConstraintExpr for TraceConstraint {
        fn nx(&self) -> usize {
            2
        }

        fn nh(&self) -> usize {
            1
        }

        fn eval<T: Real>(&self, x: &Array1<T>, s: &Array1<T>) -> Array1<T> {
            Array1::from(vec![s[0] + T::constant(2.0) * s[1] + T::constant(3.0) * s[2] + x[0]])
        }
    }

    #[test]
    // Purpose
    // -------
    // Dual Jacobians recover exact linear coefficients.
    //
    // Given
    // -----
    // - h = P00 + 2 P01 + 3 P11 + x0 on nx = 2.
    //
    // Expect
    // ------
    // - H = [[1, 2, 3]] and ∂h/∂x = [[1, 0]].
    fn dual_jacobian_is_exact_for_linear_expression() {
        // Arrange
        let jac = DualJacobian::new(TraceConstraint);
        let x = array![0.5, -1.0];
        let s = array![1.0, 0.1, 2.0];

        // Act
        let h = jac.jacobian(&x, &s).unwrap();
        let hx = jac.state_jacobian(&x, &s).unwrap();

        // Assert
        assert_eq!(h, array![[1.0, 2.0, 3.0]]);
        assert_eq!(hx, array![[1.0, 0.0]]);
    }

    #[test]
    // Purpose
    // -------
    // Dual and finite-difference providers agree on a nonlinear constraint.
    //
    // Given
    // -----
    // - Two back-off rows on nx = 2 with κ = 1.5 and a positive-definite P.
    //
    // Expect
    // ------
    // - Both Jacobians are 2×3 and agree to 1e-6.
    fn dual_and_finite_difference_jacobians_agree() {
        // Arrange
        let expr = LinearBackoffConstraint::new(array![[1.0, 0.0], [0.5, -1.0]], 1.5, 1e-8)
            .unwrap();
        let plain = expr.clone();
        let dual = DualJacobian::new(expr);
        let fd = FiniteDiffJacobian::new(2, 2, move |x: &Array1<f64>, s: &Array1<f64>| {
            plain.eval(x, s)
        });
        let x = array![0.3, 0.7];
        let s = sym_mat2vec(&array![[0.4, 0.1], [0.1, 0.9]]).unwrap();

        // Act
        let h_dual = dual.jacobian(&x, &s).unwrap();
        let h_fd = fd.jacobian(&x, &s).unwrap();

        // Assert
        assert_eq!(h_dual.dim(), (2, 3));
        for (a, b) in h_dual.iter().zip(h_fd.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-6);
        }
    }

    #[test]
    // Purpose
    // -------
    // Wrongly sized inputs are rejected before evaluation.
    //
    // Given
    // -----
    // - sigma_vec of length 4 for nx = 2.
    //
    // Expect
    // ------
    // - `LengthMismatch` naming sigma_vec.
    fn wrong_sigma_length_is_rejected() {
        let jac = DualJacobian::new(TraceConstraint);
        let err = jac.jacobian(&array![0.0, 0.0], &Array1::zeros(4)).unwrap_err();
        assert_eq!(err, ZoroError::LengthMismatch { what: "sigma_vec", expected: 3, found: 4 });
    }
}
