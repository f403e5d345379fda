//! zoro::interfaces — the external OCP solver seam and its stage parameters.
//!
//! Purpose
//! -------
//! Describe what the iteration loop needs from an SQP-RTI solver without
//! depending on any particular QP backend: stage-wise reads of the current
//! iterate, stage-wise writes of linearization parameters and lower bounds,
//! a two-phase solve, and convergence residuals.
//!
//! Conventions
//! -----------
//! - Stages are `0..=horizon()` for states and `0..horizon()` for controls.
//! - Solve status `0` means success; any other value is solver-specific.
//! - [`StageParameters::to_flat`] fixes the flat parameter layout
//!   `[vec(A) | vec(B) | f_hat | sigma_vec]`, with `A` and `B` stored
//!   column-major as is customary for generated solver code.
use crate::{
    covariance::codec::sym_vec_len,
    zoro::errors::{ZoroError, ZoroResult},
};
use ndarray::{Array1, Array2, ShapeBuilder, s};

/// Phase of one real-time iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RtiPhase {
    /// Linearize and condense; may run before the current state is known.
    Preparation,
    /// Solve the QP with the latest state.
    Feedback,
}

/// Linearization data written to one stage of the OCP.
#[derive(Debug, Clone, PartialEq)]
pub struct StageParameters {
    pub a: Array2<f64>,
    pub b: Array2<f64>,
    pub offset: Array1<f64>,
    pub sigma_vec: Array1<f64>,
}

/// Offsets of each block inside the flat stage parameter vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterLayout {
    pub nx: usize,
    pub nu: usize,
}

impl ParameterLayout {
    pub const fn new(nx: usize, nu: usize) -> Self {
        ParameterLayout { nx, nu }
    }

    pub const fn a_range(&self) -> std::ops::Range<usize> {
        0..self.nx * self.nx
    }

    pub const fn b_range(&self) -> std::ops::Range<usize> {
        let start = self.nx * self.nx;
        start..start + self.nx * self.nu
    }

    pub const fn offset_range(&self) -> std::ops::Range<usize> {
        let start = self.nx * self.nx + self.nx * self.nu;
        start..start + self.nx
    }

    pub const fn sigma_range(&self) -> std::ops::Range<usize> {
        let start = self.nx * self.nx + self.nx * self.nu + self.nx;
        start..start + sym_vec_len(self.nx)
    }

    /// Total number of stage parameters.
    pub const fn len(&self) -> usize {
        self.nx * self.nx + self.nx * self.nu + self.nx + sym_vec_len(self.nx)
    }

    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StageParameters {
    pub fn layout(&self) -> ParameterLayout {
        ParameterLayout::new(self.a.nrows(), self.b.ncols())
    }

    /// Concatenate into `[vec(A) | vec(B) | f_hat | sigma_vec]`, with `A` and
    /// `B` flattened column by column.
    pub fn to_flat(&self) -> Array1<f64> {
        let layout = self.layout();
        let mut flat = Array1::<f64>::zeros(layout.len());
        let col_major = |m: &Array2<f64>| m.t().iter().copied().collect::<Vec<f64>>();
        flat.slice_mut(s![layout.a_range()]).assign(&Array1::from(col_major(&self.a)));
        flat.slice_mut(s![layout.b_range()]).assign(&Array1::from(col_major(&self.b)));
        flat.slice_mut(s![layout.offset_range()]).assign(&self.offset);
        flat.slice_mut(s![layout.sigma_range()]).assign(&self.sigma_vec);
        flat
    }

    /// Inverse of [`StageParameters::to_flat`].
    ///
    /// # Errors
    /// `ZoroError::LengthMismatch` when `flat` does not match the layout for
    /// `(nx, nu)`.
    pub fn from_flat(flat: &Array1<f64>, nx: usize, nu: usize) -> ZoroResult<Self> {
        let layout = ParameterLayout::new(nx, nu);
        if flat.len() != layout.len() {
            return Err(ZoroError::LengthMismatch {
                what: "stage parameters",
                expected: layout.len(),
                found: flat.len(),
            });
        }
        let from_col_major = |range: std::ops::Range<usize>, rows: usize, cols: usize| {
            let data = flat.slice(s![range]).to_vec();
            let found = data.len();
            Array2::from_shape_vec((rows, cols).f(), data).map_err(|_| {
                ZoroError::LengthMismatch { what: "stage block", expected: rows * cols, found }
            })
        };
        Ok(StageParameters {
            a: from_col_major(layout.a_range(), nx, nx)?,
            b: from_col_major(layout.b_range(), nx, nu)?,
            offset: flat.slice(s![layout.offset_range()]).to_owned(),
            sigma_vec: flat.slice(s![layout.sigma_range()]).to_owned(),
        })
    }
}

/// Stage-wise interface of an SQP-RTI optimal control solver.
pub trait OcpSolver {
    /// Number of shooting intervals `N`.
    fn horizon(&self) -> usize;

    /// Current state iterate at `stage ∈ 0..=N`.
    fn state(&self, stage: usize) -> ZoroResult<Array1<f64>>;

    /// Current control iterate at `stage ∈ 0..N`.
    fn control(&self, stage: usize) -> ZoroResult<Array1<f64>>;

    /// Write the linearization parameters of `stage`.
    fn set_stage_parameters(&mut self, stage: usize, params: &StageParameters) -> ZoroResult<()>;

    /// Write the lower bound of the tightened constraints at `stage`.
    fn set_constraint_lower_bound(&mut self, stage: usize, lh: &Array1<f64>) -> ZoroResult<()>;

    /// Run one RTI phase and return the solver status (`0` on success).
    fn solve(&mut self, phase: RtiPhase) -> i32;

    /// Convergence residuals of the last solve (stationarity, equality,
    /// inequality, complementarity).
    fn residuals(&self) -> Array1<f64>;

    /// Wall time of the last solve in seconds, as measured by the solver.
    fn last_solve_time(&self) -> f64;
}
