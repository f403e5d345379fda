//! covariance::propagation — one-step and open-loop covariance propagation.
//!
//! Purpose
//! -------
//! Propagate a state covariance through a linearized stage,
//! `P⁺ = A P Aᵀ + B W Bᵀ`, and assemble the per-stage process noise
//! `W = Sigma_W + diag(var_k)` from the residual model's predictive
//! variance.
//!
//! Invariants & assumptions
//! ------------------------
//! - `P` is `nx×nx`, `A` is `nx×nx`, `B` is `nx×nw`, `W` is `nw×nw`. Shapes
//!   are checked once at solver construction; the hot path here does not
//!   re-check them and `ndarray` panics on inconsistent products.
//! - The result is symmetric by construction: off-diagonal pairs are
//!   averaged after the products, which removes floating-point asymmetry.
//! - If `P` and `W` are PSD then so is the result, up to rounding.
use crate::zoro::errors::{ZoroError, ZoroResult};
use ndarray::{Array2, ArrayView1};

/// propagate_covariance — `A P Aᵀ + B W Bᵀ`, symmetrized.
///
/// Parameters
/// ----------
/// - `p`: `&Array2<f64>` current covariance, `nx×nx`.
/// - `a`: `&Array2<f64>` state transition, `nx×nx`.
/// - `b`: `&Array2<f64>` noise map, `nx×nw`.
/// - `w`: `&Array2<f64>` process noise covariance, `nw×nw`.
///
/// Returns
/// -------
/// `Array2<f64>`
///   Next covariance, `nx×nx`, exactly symmetric.
///
/// Panics
/// ------
/// - On inconsistent shapes (through `ndarray::dot`).
///
/// Examples
/// --------
/// ```rust
/// # use ndarray::Array2;
/// # use zoro_mpc::covariance::propagation::propagate_covariance;
/// let eye = Array2::<f64>::eye(2);
/// let p = propagate_covariance(&eye, &eye, &eye, &(0.5 * &eye));
/// assert_eq!(p, 1.5 * &eye);
/// ```
pub fn propagate_covariance(
    p: &Array2<f64>, a: &Array2<f64>, b: &Array2<f64>, w: &Array2<f64>,
) -> Array2<f64> {
    let mut next = a.dot(p).dot(&a.t()) + b.dot(w).dot(&b.t());
    symmetrize(&mut next);
    next
}

/// process_noise — `Sigma_W + diag(variance)`.
///
/// # Errors
/// - `ZoroError::LengthMismatch` when `variance.len()` differs from the
///   dimension of `sigma_w`.
pub fn process_noise(sigma_w: &Array2<f64>, variance: ArrayView1<f64>) -> ZoroResult<Array2<f64>> {
    let nw = sigma_w.nrows();
    if variance.len() != nw {
        return Err(ZoroError::LengthMismatch {
            what: "residual variance",
            expected: nw,
            found: variance.len(),
        });
    }
    let mut w = sigma_w.clone();
    w.diag_mut().zip_mut_with(&variance, |wi, &vi| *wi += vi);
    Ok(w)
}

/// propagate_open_loop — covariance trajectory along fixed linearizations.
///
/// Starting from `p0`, applies [`propagate_covariance`] for each stage
/// `k = 0..n` with `A = a_of(k)` and `W = w_of(k)`, returning
/// `[P0, P1, …, Pn]`. Useful to evaluate an uncertainty tube for a given
/// trajectory without running the full iteration loop.
///
/// # Errors
/// Propagates any error returned by `a_of` or `w_of`.
pub fn propagate_open_loop<FA, FW>(
    p0: &Array2<f64>, b: &Array2<f64>, n: usize, mut a_of: FA, mut w_of: FW,
) -> ZoroResult<Vec<Array2<f64>>>
where
    FA: FnMut(usize) -> ZoroResult<Array2<f64>>,
    FW: FnMut(usize) -> ZoroResult<Array2<f64>>,
{
    let mut out = Vec::with_capacity(n + 1);
    out.push(p0.clone());
    for k in 0..n {
        let a = a_of(k)?;
        let w = w_of(k)?;
        let next = propagate_covariance(&out[k], &a, b, &w);
        out.push(next);
    }
    Ok(out)
}

/// Largest absolute asymmetry `|m_ij − m_ji|` and where it occurs.
pub fn max_asymmetry(m: &Array2<f64>) -> (usize, usize, f64) {
    let mut worst = (0, 0, 0.0);
    for i in 0..m.nrows() {
        for j in (i + 1)..m.ncols() {
            let gap = (m[[i, j]] - m[[j, i]]).abs();
            if gap > worst.2 || gap.is_nan() {
                worst = (i, j, gap);
            }
        }
    }
    worst
}

/// Validate a square, finite, symmetric matrix (within `tol`).
pub fn check_symmetric(what: &'static str, m: &Array2<f64>, tol: f64) -> ZoroResult<()> {
    let (rows, cols) = m.dim();
    if rows != cols {
        return Err(ZoroError::NotSquare { what, rows, cols });
    }
    if let Some((index, &value)) = m.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        return Err(ZoroError::NonFiniteInput { what, index, value });
    }
    let (row, col, gap) = max_asymmetry(m);
    let scale = m.iter().fold(1.0_f64, |acc, v| acc.max(v.abs()));
    if gap > tol * scale {
        return Err(ZoroError::NotSymmetric { what, row, col, gap });
    }
    Ok(())
}

// Average off-diagonal pairs in place.
fn symmetrize(m: &mut Array2<f64>) {
    for i in 0..m.nrows() {
        for j in 0..i {
            let avg = 0.5 * (m[[i, j]] + m[[j, i]]);
            m[[i, j]] = avg;
            m[[j, i]] = avg;
        }
    }
}
