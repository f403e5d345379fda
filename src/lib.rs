//! zoro_mpc — zero-order robust optimization for stochastic NMPC.
//!
//! Purpose
//! -------
//! Provide the uncertainty-propagation and constraint-tightening machinery
//! of the ZORO scheme for nonlinear model predictive control with a learned
//! residual model, driving an external SQP-RTI solver. When the
//! `python-bindings` feature is enabled, this module also defines the
//! `_zoro_mpc` extension module exposing the covariance and back-off
//! helpers to Python.
//!
//! Key behaviors
//! -------------
//! - [`covariance`]: symmetric vectorization and `A P Aᵀ + B W Bᵀ`
//!   propagation.
//! - [`residual`]: the residual model seam and an exact GP implementation.
//! - [`dynamics`]: integrators with sensitivities and the augmented stage
//!   linearization.
//! - [`sensitivity`]: constraint Jacobians w.r.t. the vectorized covariance
//!   (forward-mode duals or finite differences).
//! - [`zoro`]: the iteration loop, OCP solver interface, tightening and
//!   timing statistics.
//!
//! Invariants & assumptions
//! ------------------------
//! - All heavy numerical work lives in the inner modules; the PyO3 items in
//!   this file only convert inputs and map errors.
//! - The vectorization order of symmetric matrices is fixed crate-wide (row-
//!   major upper triangle) and shared by every consumer of `sigma_vec`.
//!
//! Conventions
//! -----------
//! - Stages and iterations are 0-based; states live at `0..=N`, controls at
//!   `0..N`.
//! - Errors are rich enums internally ([`zoro::errors::ZoroError`],
//!   [`residual::errors::ResidualError`]) and become `ValueError` at the
//!   PyO3 boundary.
//!
//! Testing notes
//! -------------
//! - Unit tests live next to each module; `tests/integration_zoro_pipeline.rs`
//!   runs the full loop against mock OCP solvers.

pub mod covariance;
pub mod dynamics;
pub mod residual;
pub mod sensitivity;
pub mod utils;
pub mod zoro;

#[cfg(feature = "python-bindings")]
use numpy::{IntoPyArray, PyArray1, PyArray2};

#[cfg(feature = "python-bindings")]
use pyo3::{prelude::*, types::PyAny};

#[cfg(feature = "python-bindings")]
use crate::utils::{extract_matrix, extract_vector};

/// sym_mat2vec(mat) — upper triangle of a symmetric matrix, row-major.
#[cfg(feature = "python-bindings")]
#[pyfunction(name = "sym_mat2vec")]
#[pyo3(text_signature = "(mat, /)")]
fn py_sym_mat2vec<'py>(
    py: Python<'py>, mat: &Bound<'py, PyAny>,
) -> PyResult<Bound<'py, PyArray1<f64>>> {
    let mat = extract_matrix(mat)?;
    let vec = covariance::codec::sym_mat2vec(&mat)?;
    Ok(vec.into_pyarray(py))
}

/// vec2sym_mat(vec, n) — inverse of `sym_mat2vec`.
#[cfg(feature = "python-bindings")]
#[pyfunction(name = "vec2sym_mat")]
#[pyo3(text_signature = "(vec, n, /)")]
fn py_vec2sym_mat<'py>(
    py: Python<'py>, vec: &Bound<'py, PyAny>, n: usize,
) -> PyResult<Bound<'py, PyArray2<f64>>> {
    let vec = extract_vector(py, vec)?;
    let mat = covariance::codec::vec2sym_mat(&vec, n)?;
    Ok(mat.into_pyarray(py))
}

/// propagate_covariance(P, A, B, W) — `A P Aᵀ + B W Bᵀ`, symmetrized.
#[cfg(feature = "python-bindings")]
#[pyfunction(name = "propagate_covariance")]
#[pyo3(text_signature = "(p, a, b, w, /)")]
fn py_propagate_covariance<'py>(
    py: Python<'py>, p: &Bound<'py, PyAny>, a: &Bound<'py, PyAny>, b: &Bound<'py, PyAny>,
    w: &Bound<'py, PyAny>,
) -> PyResult<Bound<'py, PyArray2<f64>>> {
    use crate::zoro::errors::ZoroError;

    let (p, a) = (extract_matrix(p)?, extract_matrix(a)?);
    let (b, w) = (extract_matrix(b)?, extract_matrix(w)?);
    let nx = p.nrows();
    let nw = w.nrows();
    if a.dim() != (nx, nx) {
        return Err(ZoroError::DimensionMismatch { what: "A", expected: (nx, nx), found: a.dim() }
            .into());
    }
    if b.dim() != (nx, nw) {
        return Err(ZoroError::DimensionMismatch { what: "B", expected: (nx, nw), found: b.dim() }
            .into());
    }
    covariance::propagation::check_symmetric("P", &p, zoro::options::SYMMETRY_TOL)?;
    covariance::propagation::check_symmetric("W", &w, zoro::options::SYMMETRY_TOL)?;
    let next = covariance::propagation::propagate_covariance(&p, &a, &b, &w);
    Ok(next.into_pyarray(py))
}

/// exact_backoff(h_x, P, prob) — Gaussian back-off per constraint.
#[cfg(feature = "python-bindings")]
#[pyfunction(name = "exact_backoff")]
#[pyo3(text_signature = "(h_x, p, prob, /)")]
fn py_exact_backoff<'py>(
    py: Python<'py>, h_x: &Bound<'py, PyAny>, p: &Bound<'py, PyAny>, prob: f64,
) -> PyResult<Bound<'py, PyArray1<f64>>> {
    let (h_x, p) = (extract_matrix(h_x)?, extract_matrix(p)?);
    let backoff = zoro::tightening::exact_backoff(&h_x, &p, prob)?;
    Ok(backoff.into_pyarray(py))
}

/// _zoro_mpc — PyO3 module initializer.
///
/// Registers the `covariance` and `tightening` submodules and inserts them
/// into `sys.modules` so that `zoro_mpc.covariance` imports work with dot
/// notation.
#[cfg(feature = "python-bindings")]
#[pymodule]
fn _zoro_mpc<'py>(py: Python<'py>, m: &Bound<'py, PyModule>) -> PyResult<()> {
    let covariance_mod = PyModule::new(py, "covariance")?;
    let tightening_mod = PyModule::new(py, "tightening")?;
    covariance_functions(m, &covariance_mod)?;
    tightening_functions(m, &tightening_mod)?;

    let modules = py.import("sys")?.getattr("modules")?;
    modules.set_item("zoro_mpc.covariance", covariance_mod)?;
    modules.set_item("zoro_mpc.tightening", tightening_mod)?;
    Ok(())
}

#[cfg(feature = "python-bindings")]
fn covariance_functions<'py>(
    parent: &Bound<'py, PyModule>, m: &Bound<'py, PyModule>,
) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(py_sym_mat2vec, m)?)?;
    m.add_function(wrap_pyfunction!(py_vec2sym_mat, m)?)?;
    m.add_function(wrap_pyfunction!(py_propagate_covariance, m)?)?;
    parent.add_submodule(m)?;
    Ok(())
}

#[cfg(feature = "python-bindings")]
fn tightening_functions<'py>(
    parent: &Bound<'py, PyModule>, m: &Bound<'py, PyModule>,
) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(py_exact_backoff, m)?)?;
    parent.add_submodule(m)?;
    Ok(())
}
