//! covariance — symmetric-matrix codec and covariance propagation.
//!
//! Purpose
//! -------
//! Hold the two pieces of covariance bookkeeping the iteration loop needs:
//! a compact vectorization of symmetric matrices so covariances can travel
//! through flat parameter slots, and the linear propagation law that moves a
//! covariance from one shooting node to the next.
//!
//! Key behaviors
//! -------------
//! - [`codec`] maps an `n×n` symmetric matrix to its `n(n+1)/2` upper
//!   triangle (row-major) and back, generically over the container and its
//!   element type.
//! - [`propagation`] computes `A P Aᵀ + B W Bᵀ`, assembles the stage process
//!   noise from the residual-model variance, and offers an open-loop
//!   trajectory helper.
//!
//! Conventions
//! -----------
//! - The vectorization order is fixed for the crate and shared with every
//!   constraint expression that consumes `sigma_vec`.
//! - Matrices are `ndarray::Array2<f64>` unless a caller explicitly uses the
//!   `nalgebra` codec instantiation.
pub mod codec;
pub mod propagation;

pub mod prelude {
    pub use super::codec::{
        SymmetricStorage, flatten, sym_dim_from_len, sym_mat2vec, sym_vec_len, unflatten,
        vec2sym_mat,
    };
    pub use super::propagation::{process_noise, propagate_covariance, propagate_open_loop};
}
