//! covariance::codec — symmetric matrix ⇄ upper-triangular vector.
//!
//! Purpose
//! -------
//! Pass covariance matrices through flat parameter slots by storing only
//! their upper triangle. The same algorithm serves every container that
//! implements [`SymmetricStorage`]: plain `f64` arrays, arrays of
//! forward-mode [`Dual`](crate::sensitivity::dual::Dual) numbers used when
//! differentiating constraints, and `nalgebra` matrices.
//!
//! Conventions
//! -----------
//! - Ordering is the upper triangle **row by row**:
//!   `(0,0), (0,1), …, (0,n-1), (1,1), (1,2), …, (n-1,n-1)`.
//! - A vector of length `n(n+1)/2` maps to an `n×n` matrix; any other length
//!   is rejected with [`ZoroError::InvalidSymVecLength`] or
//!   [`ZoroError::LengthMismatch`].
//! - `flatten` does not check symmetry; it reads the upper triangle only.
use crate::zoro::errors::{ZoroError, ZoroResult};
use nalgebra::{DMatrix, DVector, Scalar};
use ndarray::{Array1, Array2};

/// Length of the vectorized upper triangle of an `n×n` matrix.
pub const fn sym_vec_len(n: usize) -> usize {
    n * (n + 1) / 2
}

/// Recover `n` from a vectorized length `n(n+1)/2`.
///
/// # Errors
/// [`ZoroError::InvalidSymVecLength`] when `len` is not a triangular number.
pub fn sym_dim_from_len(len: usize) -> ZoroResult<usize> {
    let mut n = 0;
    while sym_vec_len(n) < len {
        n += 1;
    }
    if sym_vec_len(n) == len { Ok(n) } else { Err(ZoroError::InvalidSymVecLength { len }) }
}

/// Iterate over `(row, col)` pairs of the upper triangle in codec order.
pub fn upper_triangle_indices(n: usize) -> impl Iterator<Item = (usize, usize)> {
    (0..n).flat_map(move |i| (i..n).map(move |j| (i, j)))
}

/// Capability set a matrix container needs to take part in the codec.
///
/// Implementors expose element access plus a matching flat vector type.
/// Nothing here inspects the element type, so the same `flatten`/`unflatten`
/// work for numeric and differentiable elements alike.
pub trait SymmetricStorage: Sized {
    type Elem: Clone + Default;
    type Flat;

    fn dims(&self) -> (usize, usize);
    fn get(&self, row: usize, col: usize) -> Self::Elem;
    fn set(&mut self, row: usize, col: usize, value: Self::Elem);
    fn filled(n: usize, value: Self::Elem) -> Self;

    fn flat_len(flat: &Self::Flat) -> usize;
    fn flat_get(flat: &Self::Flat, k: usize) -> Self::Elem;
    fn flat_from_vec(values: Vec<Self::Elem>) -> Self::Flat;
}

impl<T: Clone + Default> SymmetricStorage for Array2<T> {
    type Elem = T;
    type Flat = Array1<T>;

    fn dims(&self) -> (usize, usize) {
        self.dim()
    }

    fn get(&self, row: usize, col: usize) -> T {
        self[[row, col]].clone()
    }

    fn set(&mut self, row: usize, col: usize, value: T) {
        self[[row, col]] = value;
    }

    fn filled(n: usize, value: T) -> Self {
        Array2::from_elem((n, n), value)
    }

    fn flat_len(flat: &Array1<T>) -> usize {
        flat.len()
    }

    fn flat_get(flat: &Array1<T>, k: usize) -> T {
        flat[k].clone()
    }

    fn flat_from_vec(values: Vec<T>) -> Array1<T> {
        Array1::from(values)
    }
}

impl<T: Scalar + Default> SymmetricStorage for DMatrix<T> {
    type Elem = T;
    type Flat = DVector<T>;

    fn dims(&self) -> (usize, usize) {
        self.shape()
    }

    fn get(&self, row: usize, col: usize) -> T {
        self[(row, col)].clone()
    }

    fn set(&mut self, row: usize, col: usize, value: T) {
        self[(row, col)] = value;
    }

    fn filled(n: usize, value: T) -> Self {
        DMatrix::from_element(n, n, value)
    }

    fn flat_len(flat: &DVector<T>) -> usize {
        flat.len()
    }

    fn flat_get(flat: &DVector<T>, k: usize) -> T {
        flat[k].clone()
    }

    fn flat_from_vec(values: Vec<T>) -> DVector<T> {
        DVector::from_vec(values)
    }
}

/// flatten — vectorize the upper triangle of a square matrix.
///
/// Parameters
/// ----------
/// - `mat`: `&M`
///   Square matrix, assumed symmetric. Only the upper triangle is read.
///
/// Returns
/// -------
/// `ZoroResult<M::Flat>`
///   Vector of length `n(n+1)/2` in row-major upper-triangular order.
///
/// Errors
/// ------
/// - `ZoroError::NotSquare` when `mat` is not square.
///
/// Examples
/// --------
/// ```rust
/// # use ndarray::array;
/// # use zoro_mpc::covariance::codec::flatten;
/// let p = array![[1.0, 2.0], [2.0, 3.0]];
/// let v = flatten(&p).unwrap();
/// assert_eq!(v.to_vec(), vec![1.0, 2.0, 3.0]);
/// ```
pub fn flatten<M: SymmetricStorage>(mat: &M) -> ZoroResult<M::Flat> {
    let (rows, cols) = mat.dims();
    if rows != cols {
        return Err(ZoroError::NotSquare { what: "symmetric matrix", rows, cols });
    }
    let values = upper_triangle_indices(rows).map(|(i, j)| mat.get(i, j)).collect();
    Ok(M::flat_from_vec(values))
}

/// unflatten — rebuild a symmetric `n×n` matrix from its upper triangle.
///
/// Both triangles are written from `vec`, so `unflatten(flatten(M)) == M`
/// holds exactly for any symmetric `M`.
///
/// # Errors
/// - `ZoroError::LengthMismatch` when `vec` does not hold `n(n+1)/2` entries.
pub fn unflatten<M: SymmetricStorage>(vec: &M::Flat, n: usize) -> ZoroResult<M> {
    let len = M::flat_len(vec);
    let expected = sym_vec_len(n);
    if len != expected {
        return Err(ZoroError::LengthMismatch { what: "symmetric vector", expected, found: len });
    }
    let mut mat = M::filled(n, M::Elem::default());
    for (k, (i, j)) in upper_triangle_indices(n).enumerate() {
        let value = M::flat_get(vec, k);
        if i != j {
            mat.set(j, i, value.clone());
        }
        mat.set(i, j, value);
    }
    Ok(mat)
}

/// `f64` convenience wrapper around [`flatten`] for `ndarray` matrices.
pub fn sym_mat2vec(mat: &Array2<f64>) -> ZoroResult<Array1<f64>> {
    flatten(mat)
}

/// `f64` convenience wrapper around [`unflatten`] for `ndarray` vectors.
pub fn vec2sym_mat(vec: &Array1<f64>, n: usize) -> ZoroResult<Array2<f64>> {
    unflatten(vec, n)
}
