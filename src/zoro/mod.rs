//! zoro — zero-order robust optimization around an SQP-RTI solver.
//!
//! Purpose
//! -------
//! Tie the covariance, dynamics, residual and sensitivity layers into the
//! outer iteration that robustifies a nominal NMPC problem: at every
//! iteration the covariance trajectory is propagated along the current
//! linearization and the constraint lower bounds are tightened by a
//! first-order correction in the covariance change, instead of adding the
//! covariance to the OCP's decision variables.
//!
//! Key behaviors
//! -------------
//! - [`solver::ZoroSolver`] owns the loop, the covariance trajectory and the
//!   external components.
//! - [`interfaces::OcpSolver`] is the seam for the QP-based solver;
//!   [`interfaces::StageParameters`] fixes what is written per stage.
//! - [`tightening::ConstraintTightener`] applies the zero-order correction;
//!   [`tightening::exact_backoff`] evaluates the full Gaussian back-off.
//! - [`stats`] records per-phase wall times and aggregates them over solves.
//!
//! Invariants & assumptions
//! ------------------------
//! - Options and the uncertainty description are validated at construction
//!   ([`options`]); component dimensions are cross-checked once in
//!   [`solver::ZoroSolver::new`] ([`validation`]).
//! - All failures surface as [`errors::ZoroError`]; reaching the iteration
//!   cap is a normal termination.
//!
//! Downstream usage
//! ----------------
//! ```rust,ignore
//! use zoro_mpc::zoro::prelude::*;
//!
//! let mut zoro = ZoroSolver::new(ocp, integrator, adapter, tightener, uncertainty)?;
//! let stats = zoro.solve(&ZoroOptions::default())?;
//! let solution = zoro.get_solution()?;
//! println!("{stats}");
//! ```
pub mod errors;
pub mod interfaces;
pub mod options;
pub mod solver;
pub mod stats;
pub mod tightening;
pub mod validation;

pub mod prelude {
    pub use super::errors::{ZoroError, ZoroResult};
    pub use super::interfaces::{OcpSolver, ParameterLayout, RtiPhase, StageParameters};
    pub use super::options::{UncertaintyModel, ZoroDims, ZoroOptions};
    pub use super::solver::{ZoroSolution, ZoroSolver};
    pub use super::stats::{
        BACKOFF_PHASES, DEFAULT_PHASES, RAW_PHASES, PhaseSummary, SolveStats, SolveStatsRecorder,
        Termination, TimingPhase, timings_per_task, total_iterations, total_timings,
    };
    pub use super::tightening::{ConstraintTightener, StageTightening, exact_backoff};
}
