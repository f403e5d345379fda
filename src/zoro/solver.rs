//! zoro::solver — the ZORO real-time iteration loop.
//!
//! Purpose
//! -------
//! Drive an external SQP-RTI solver towards a robustified solution by
//! alternating, in every outer iteration, between
//!
//! 1. reading the current iterate `(x_k, u_k)` from the OCP,
//! 2. one batched evaluation of the residual model at all stages,
//! 3. a stage-ordered sweep that integrates, linearizes, propagates the
//!    covariance, writes stage parameters and tightens the lower bounds,
//! 4. a preparation and a feedback solve of the OCP,
//! 5. a termination check on the OCP residuals.
//!
//! Key behaviors
//! -------------
//! - Stages are processed strictly in order `0..N`: `P[k+1]` depends on
//!   `P[k]` from the same iteration.
//! - The covariance change used by the zero-order correction is taken
//!   against the same stage in the previous iteration. That snapshot is a
//!   local of [`ZoroSolver::solve`] and starts empty on every call, so the
//!   first iteration of each solve applies no correction.
//! - A non-zero preparation status is logged and ignored; a non-zero
//!   feedback status aborts with [`ZoroError::SolverFailure`].
//! - Integrator errors abort the solve with the failing stage attached;
//!   integrator outputs of the wrong shape are rejected before use.
//! - Convergence requires `max(residuals) < tol_nlp`. A NaN residual or an
//!   empty residual vector never converges and runs into the iteration cap.
//!
//! Invariants & assumptions
//! ------------------------
//! - Dimensions of every component are cross-checked once in
//!   [`ZoroSolver::new`]; iterate lengths are rechecked on every read.
//! - `P[0] = Sigma_x0` at the start of every solve.
//! - Timings are recorded per iteration in a [`SolveStatsRecorder`]; on an
//!   error the partial statistics are discarded.
use crate::{
    covariance::{
        codec::sym_mat2vec,
        propagation::{check_symmetric, process_noise, propagate_covariance},
    },
    dynamics::{integrator::SensitivityIntegrator, linearize::build_stage_model},
    residual::adapter::{ResidualModelAdapter, ResidualPrediction},
    sensitivity::constraint::ConstraintSensitivity,
    zoro::{
        errors::{ZoroError, ZoroResult},
        interfaces::{OcpSolver, RtiPhase, StageParameters},
        options::{SYMMETRY_TOL, UncertaintyModel, ZoroDims, ZoroOptions},
        stats::{SolveStats, SolveStatsRecorder, Termination, TimingPhase},
        tightening::{ConstraintTightener, StageTightening},
        validation::{check_finite, validate_dims, validate_integrator_output, validate_iterate},
    },
};
use ndarray::{Array1, Array2, Axis, concatenate, s};
use std::time::Instant;
use tracing::{debug, info, trace, warn};

/// Iterate and covariance trajectory after a solve.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoroSolution {
    /// States, `(N+1) × nx`.
    pub x: Array2<f64>,
    /// Controls, `N × nu`.
    pub u: Array2<f64>,
    /// `P[0..=N]`.
    pub covariances: Vec<Array2<f64>>,
}

/// ZORO outer loop around an OCP solver, an integrator and a constraint
/// sensitivity provider.
pub struct ZoroSolver<O, I, S>
where
    O: OcpSolver,
    I: SensitivityIntegrator,
    S: ConstraintSensitivity,
{
    ocp: O,
    integrator: I,
    residual: ResidualModelAdapter,
    tightener: ConstraintTightener<S>,
    uncertainty: UncertaintyModel,
    dims: ZoroDims,
    x_hat: Array2<f64>,
    u_hat: Array2<f64>,
    covariances: Vec<Array2<f64>>,
    covariance_vecs: Vec<Array1<f64>>,
}

impl<O, I, S> ZoroSolver<O, I, S>
where
    O: OcpSolver,
    I: SensitivityIntegrator,
    S: ConstraintSensitivity,
{
    /// Assemble the loop and cross-check all dimensions.
    ///
    /// `nx`/`nu` are taken from the integrator, `N` from the OCP, `nh` from
    /// the tightener.
    ///
    /// # Errors
    /// `EmptyHorizon`, `DimensionMismatch` or `LengthMismatch` when the
    /// components disagree.
    pub fn new(
        ocp: O, integrator: I, residual: ResidualModelAdapter, tightener: ConstraintTightener<S>,
        uncertainty: UncertaintyModel,
    ) -> ZoroResult<Self> {
        let dims = validate_dims(
            ocp.horizon(),
            integrator.nx(),
            integrator.nu(),
            &residual,
            tightener.sensitivity().nx(),
            tightener.nh(),
            &uncertainty,
        )?;
        let ZoroDims { nx, nu, n, .. } = dims;

        let mut covariances = vec![Array2::zeros((nx, nx)); n + 1];
        covariances[0] = uncertainty.sigma_x0.clone();
        let covariance_vecs = covariances.iter().map(sym_mat2vec).collect::<ZoroResult<Vec<_>>>()?;

        debug!(nx, nu, nw = dims.nw, nh = dims.nh, horizon = n, "ZORO solver assembled");
        Ok(ZoroSolver {
            ocp,
            integrator,
            residual,
            tightener,
            uncertainty,
            dims,
            x_hat: Array2::zeros((n + 1, nx)),
            u_hat: Array2::zeros((n, nu)),
            covariances,
            covariance_vecs,
        })
    }

    pub fn dims(&self) -> ZoroDims {
        self.dims
    }

    /// Covariances `P[0..=N]` from the last completed sweep.
    pub fn covariances(&self) -> &[Array2<f64>] {
        &self.covariances
    }

    /// Vectorized covariances matching [`ZoroSolver::covariances`].
    pub fn covariance_vecs(&self) -> &[Array1<f64>] {
        &self.covariance_vecs
    }

    pub fn ocp(&self) -> &O {
        &self.ocp
    }

    /// Mutable access to the OCP, e.g. to update the initial state between
    /// closed-loop steps.
    pub fn ocp_mut(&mut self) -> &mut O {
        &mut self.ocp
    }

    pub fn uncertainty(&self) -> &UncertaintyModel {
        &self.uncertainty
    }

    /// Replace `Sigma_x0` for subsequent solves.
    ///
    /// # Errors
    /// `DimensionMismatch` for a wrong shape; `NotSymmetric` or
    /// `NonFiniteInput` for a malformed covariance.
    pub fn set_initial_covariance(&mut self, sigma_x0: Array2<f64>) -> ZoroResult<()> {
        let nx = self.dims.nx;
        if sigma_x0.dim() != (nx, nx) {
            return Err(ZoroError::DimensionMismatch {
                what: "Sigma_x0",
                expected: (nx, nx),
                found: sigma_x0.dim(),
            });
        }
        check_symmetric("Sigma_x0", &sigma_x0, SYMMETRY_TOL)?;
        self.uncertainty.sigma_x0 = sigma_x0;
        Ok(())
    }

    /// solve — run ZORO iterations until convergence or the iteration cap.
    ///
    /// Parameters
    /// ----------
    /// - `opts`: `&ZoroOptions` tolerance, iteration cap and finiteness
    ///   checks.
    ///
    /// Returns
    /// -------
    /// `ZoroResult<SolveStats>`
    ///   Iteration count, [`Termination`] and per-phase timings truncated to
    ///   the executed iterations.
    ///
    /// Errors
    /// ------
    /// - `ZoroError::SolverFailure` when the feedback solve fails.
    /// - `ZoroError::IntegratorFailure` when a stage cannot be simulated.
    /// - `ZoroError::NumericalDegeneracy` when `opts.check_finite` is set
    ///   and a NaN/inf appears.
    /// - `ZoroError::ResidualModelFailure` from the residual model.
    /// - Shape errors from any external component.
    pub fn solve(&mut self, opts: &ZoroOptions) -> ZoroResult<SolveStats> {
        let solve_start = Instant::now();
        let mut recorder = SolveStatsRecorder::new(opts.n_iter_max);
        self.covariances[0] = self.uncertainty.sigma_x0.clone();
        self.covariance_vecs[0] = sym_mat2vec(&self.covariances[0])?;

        let mut previous: Option<Vec<Array1<f64>>> = None;
        let mut termination = None;
        let mut last_residual = f64::INFINITY;
        let mut n_iter = 0;

        for iter in 0..opts.n_iter_max {
            let iter_start = Instant::now();
            let residual = self.iterate(iter, opts, previous.as_deref(), &mut recorder)?;
            recorder.add(TimingPhase::Total, iter, iter_start.elapsed().as_secs_f64());
            previous = Some(self.covariance_vecs.clone());
            n_iter = iter + 1;
            last_residual = residual;
            if residual < opts.tol_nlp {
                termination = Some(Termination::Converged { residual });
                break;
            }
        }

        let termination =
            termination.unwrap_or(Termination::IterationCapReached { residual: last_residual });
        match termination {
            Termination::Converged { residual } => {
                info!(n_iter, residual, "ZORO converged");
            }
            Termination::IterationCapReached { residual } => {
                info!(n_iter, residual, tol = opts.tol_nlp, "ZORO reached the iteration cap");
            }
        }
        Ok(recorder.finish(n_iter, termination, solve_start.elapsed().as_secs_f64()))
    }

    /// Current OCP iterate together with the last covariance trajectory.
    ///
    /// # Errors
    /// Errors from the OCP reads or iterate length mismatches.
    pub fn get_solution(&self) -> ZoroResult<ZoroSolution> {
        let (x, u) = self.read_iterate()?;
        Ok(ZoroSolution { x, u, covariances: self.covariances.clone() })
    }

    /// One outer iteration; returns `max(residuals)`.
    fn iterate(
        &mut self, iter: usize, opts: &ZoroOptions, previous: Option<&[Array1<f64>]>,
        recorder: &mut SolveStatsRecorder,
    ) -> ZoroResult<f64> {
        let start = Instant::now();
        let (x_hat, u_hat) = self.read_iterate()?;
        self.x_hat = x_hat;
        self.u_hat = u_hat;
        let y = self.query_points()?;
        recorder.add(TimingPhase::QueryNodes, iter, start.elapsed().as_secs_f64());

        let start = Instant::now();
        let prediction = self.residual.evaluate(&y)?;
        recorder.add(TimingPhase::ResidualModel, iter, start.elapsed().as_secs_f64());

        for stage in 0..self.dims.n {
            self.update_stage(iter, stage, opts, &prediction, previous, recorder)?;
        }

        let start = Instant::now();
        let status = self.ocp.solve(RtiPhase::Preparation);
        recorder.add(TimingPhase::Preparation, iter, start.elapsed().as_secs_f64());
        if status != 0 {
            warn!(iteration = iter, status, "preparation phase returned a non-zero status");
        }

        let start = Instant::now();
        let status = self.ocp.solve(RtiPhase::Feedback);
        recorder.add(TimingPhase::SolveQp, iter, start.elapsed().as_secs_f64());
        recorder.add(TimingPhase::SolveQpExternal, iter, self.ocp.last_solve_time());
        if status != 0 {
            return Err(ZoroError::SolverFailure {
                iteration: iter,
                phase: RtiPhase::Feedback,
                status,
            });
        }

        let start = Instant::now();
        let residuals = self.ocp.residuals();
        if opts.check_finite {
            check_finite("OCP residuals", iter, self.dims.n, &residuals)?;
        }
        let max_residual = worst_residual(&residuals);
        if residuals.is_empty() {
            warn!(iteration = iter, "OCP returned no residuals; convergence cannot be declared");
        }
        recorder.add(TimingPhase::CheckTermination, iter, start.elapsed().as_secs_f64());
        debug!(iteration = iter, max_residual, residuals = ?residuals.to_vec(), "ZORO iteration");
        Ok(max_residual)
    }

    /// Integrate, linearize, propagate and tighten one stage.
    fn update_stage(
        &mut self, iter: usize, stage: usize, opts: &ZoroOptions, prediction: &ResidualPrediction,
        previous: Option<&[Array1<f64>]>, recorder: &mut SolveStatsRecorder,
    ) -> ZoroResult<()> {
        let x = self.x_hat.row(stage).to_owned();
        let u = self.u_hat.row(stage).to_owned();

        // ---- Integrate ----
        let start = Instant::now();
        let nominal = self.integrator.simulate(&x, &u).map_err(|e| match e {
            ZoroError::IntegratorFailure { reason, .. } => ZoroError::IntegratorFailure {
                stage,
                reason: format!("iteration {iter}: {reason}"),
            },
            other => other,
        })?;
        validate_integrator_output(&self.dims, &nominal).inspect_err(|e| {
            warn!(iteration = iter, stage, error = %e, "integrator output rejected");
        })?;
        recorder.add(TimingPhase::Integrate, iter, start.elapsed().as_secs_f64());
        recorder.add(TimingPhase::IntegrateExternal, iter, nominal.time_tot);

        // ---- Linearize ----
        let start = Instant::now();
        let model =
            build_stage_model(&nominal, &self.uncertainty.noise_map, prediction, stage, &x, &u);
        recorder.add(TimingPhase::BuildLinModel, iter, start.elapsed().as_secs_f64());
        if opts.check_finite {
            check_finite("A_total", iter, stage, &model.a_total)?;
            check_finite("B_total", iter, stage, &model.b_total)?;
            check_finite("f_hat", iter, stage, &model.f_hat)?;
        }

        // ---- Propagate ----
        let start = Instant::now();
        let w = process_noise(&self.uncertainty.sigma_w, prediction.variance.row(stage))?;
        let p_next = propagate_covariance(
            &self.covariances[stage],
            &model.a_total,
            &self.uncertainty.noise_map,
            &w,
        );
        if opts.check_finite {
            check_finite("propagated covariance", iter, stage + 1, &p_next)?;
        }
        self.covariance_vecs[stage + 1] = sym_mat2vec(&p_next)?;
        self.covariances[stage + 1] = p_next;
        recorder.add(TimingPhase::PropagateCovar, iter, start.elapsed().as_secs_f64());

        // ---- Stage parameters ----
        let start = Instant::now();
        let params = StageParameters {
            a: model.a_total,
            b: model.b_total,
            offset: model.f_hat,
            sigma_vec: self.covariance_vecs[stage].clone(),
        };
        recorder.add(TimingPhase::SetSensitivitiesReshape, iter, start.elapsed().as_secs_f64());
        let start = Instant::now();
        self.ocp.set_stage_parameters(stage, &params)?;
        recorder.add(TimingPhase::SetSensitivities, iter, start.elapsed().as_secs_f64());

        // ---- Back-offs ----
        let backoff_start = Instant::now();
        let sigma_vec = &self.covariance_vecs[stage];

        let start = Instant::now();
        let h = self.tightener.jacobian(&x, sigma_vec)?;
        recorder.add(TimingPhase::GetBackoffsJac, iter, start.elapsed().as_secs_f64());

        let start = Instant::now();
        let delta_sigma = self.tightener.delta(sigma_vec, previous.and_then(|p| p.get(stage)))?;
        let tightening = self.tightener.correction(&h, &delta_sigma)?;
        recorder.add(TimingPhase::GetBackoffsMatmul, iter, start.elapsed().as_secs_f64());

        let start = Instant::now();
        let lh = self.tightener.lower_bound(&tightening);
        let now = Instant::now();
        recorder.add(TimingPhase::GetBackoffsAdd, iter, (now - start).as_secs_f64());
        recorder.add(TimingPhase::GetBackoffs, iter, (now - backoff_start).as_secs_f64());
        let stage_tightening = StageTightening { delta_sigma, tightening, lh };
        if opts.check_finite {
            check_finite("tightened lower bound", iter, stage, &stage_tightening.lh)?;
        }
        trace!(
            iteration = iter,
            stage,
            max_delta = stage_tightening.max_abs_delta(),
            tightening = ?stage_tightening.tightening.to_vec(),
            "stage tightened"
        );

        let start = Instant::now();
        self.ocp.set_constraint_lower_bound(stage, &stage_tightening.lh)?;
        recorder.add(TimingPhase::SetTightening, iter, start.elapsed().as_secs_f64());
        Ok(())
    }

    /// Read `x[0..=N]` and `u[0..N]` from the OCP.
    fn read_iterate(&self) -> ZoroResult<(Array2<f64>, Array2<f64>)> {
        let ZoroDims { nx, nu, n, .. } = self.dims;
        let mut x_all = Array2::zeros((n + 1, nx));
        let mut u_all = Array2::zeros((n, nu));
        for stage in 0..=n {
            let x = self.ocp.state(stage)?;
            validate_iterate(&self.dims, x.len(), None)?;
            x_all.row_mut(stage).assign(&x);
        }
        for stage in 0..n {
            let u = self.ocp.control(stage)?;
            validate_iterate(&self.dims, nx, Some(u.len()))?;
            u_all.row_mut(stage).assign(&u);
        }
        Ok((x_all, u_all))
    }

    /// Query matrix `y = [x_k, u_k]` for `k ∈ 0..N`.
    fn query_points(&self) -> ZoroResult<Array2<f64>> {
        let n = self.dims.n;
        concatenate(Axis(1), &[self.x_hat.slice(s![..n, ..]), self.u_hat.view()]).map_err(|_| {
            ZoroError::DimensionMismatch {
                what: "query points",
                expected: (n, self.dims.ny()),
                found: (self.u_hat.nrows(), self.x_hat.ncols() + self.u_hat.ncols()),
            }
        })
    }
}

/// Largest OCP residual, or NaN when any entry is NaN or there are none.
///
/// NaN never satisfies `residual < tol`, so such an iteration cannot be
/// reported as converged.
fn worst_residual(residuals: &Array1<f64>) -> f64 {
    if residuals.is_empty() || residuals.iter().any(|r| r.is_nan()) {
        return f64::NAN;
    }
    residuals.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dynamics::integrator::{AffineIntegrator, IntegratorOutput},
        sensitivity::constraint::{DualJacobian, LinearBackoffConstraint},
    };
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Construction-time dimension checks.
    // - Non-fatal preparation status and fatal feedback status.
    // - Stage attribution of integrator failures.
    // - Rejection of misshaped integrator outputs.
    // - No convergence from NaN or empty residual vectors.
    // - Reset of P[0] from an updated initial covariance.
    //
    // End-to-end trajectories are covered in tests/integration_zoro_pipeline.rs.
    // -------------------------------------------------------------------------

    type Tightener = ConstraintTightener<DualJacobian<LinearBackoffConstraint>>;

    struct FixedOcp {
        x: Array2<f64>,
        u: Array2<f64>,
        preparation_status: i32,
        feedback_status: i32,
        residual: f64,
        n_residuals: usize,
        solves: Vec<RtiPhase>,
    }

    impl FixedOcp {
        fn new(n: usize) -> Self {
            FixedOcp {
                x: Array2::from_elem((n + 1, 2), 0.5),
                u: Array2::zeros((n, 1)),
                preparation_status: 0,
                feedback_status: 0,
                residual: 0.0,
                n_residuals: 4,
                solves: Vec::new(),
            }
        }
    }

    impl OcpSolver for FixedOcp {
        fn horizon(&self) -> usize {
            self.u.nrows()
        }

        fn state(&self, stage: usize) -> ZoroResult<Array1<f64>> {
            Ok(self.x.row(stage).to_owned())
        }

        fn control(&self, stage: usize) -> ZoroResult<Array1<f64>> {
            Ok(self.u.row(stage).to_owned())
        }

        fn set_stage_parameters(&mut self, _: usize, _: &StageParameters) -> ZoroResult<()> {
            Ok(())
        }

        fn set_constraint_lower_bound(&mut self, _: usize, _: &Array1<f64>) -> ZoroResult<()> {
            Ok(())
        }

        fn solve(&mut self, phase: RtiPhase) -> i32 {
            self.solves.push(phase);
            match phase {
                RtiPhase::Preparation => self.preparation_status,
                RtiPhase::Feedback => self.feedback_status,
            }
        }

        fn residuals(&self) -> Array1<f64> {
            Array1::from_elem(self.n_residuals, self.residual)
        }

        fn last_solve_time(&self) -> f64 {
            1e-4
        }
    }

    /// Fails on the `fail_at`-th call (0-based).
    struct FlakyIntegrator {
        inner: AffineIntegrator,
        calls: usize,
        fail_at: usize,
    }

    impl SensitivityIntegrator for FlakyIntegrator {
        fn nx(&self) -> usize {
            self.inner.nx()
        }

        fn nu(&self) -> usize {
            self.inner.nu()
        }

        fn simulate(&mut self, x: &Array1<f64>, u: &Array1<f64>) -> ZoroResult<IntegratorOutput> {
            let call = self.calls;
            self.calls += 1;
            if call == self.fail_at {
                return Err(ZoroError::IntegratorFailure {
                    stage: 0,
                    reason: "Newton iterations did not converge.".to_string(),
                });
            }
            self.inner.simulate(x, u)
        }
    }

    /// Returns a 3×3 `Sx` while claiming two states.
    struct MisshapedIntegrator;

    impl SensitivityIntegrator for MisshapedIntegrator {
        fn nx(&self) -> usize {
            2
        }

        fn nu(&self) -> usize {
            1
        }

        fn simulate(&mut self, x: &Array1<f64>, _: &Array1<f64>) -> ZoroResult<IntegratorOutput> {
            Ok(IntegratorOutput {
                x_next: x.clone(),
                sx: Array2::eye(3),
                su: Array2::zeros((2, 1)),
                time_tot: 0.0,
            })
        }
    }

    fn affine() -> AffineIntegrator {
        AffineIntegrator::linear(array![[1.0, 0.1], [0.0, 1.0]], array![[0.0], [0.1]]).unwrap()
    }

    fn tightener() -> Tightener {
        let expr = LinearBackoffConstraint::new(array![[1.0, 0.0]], 2.0, 1e-8).unwrap();
        ConstraintTightener::new(DualJacobian::new(expr), array![-1.0]).unwrap()
    }

    fn uncertainty() -> UncertaintyModel {
        UncertaintyModel::new(Array2::eye(2) * 0.01, Array2::eye(2) * 1e-3, None).unwrap()
    }

    fn solver<I: SensitivityIntegrator>(
        ocp: FixedOcp, integrator: I,
    ) -> ZoroSolver<FixedOcp, I, DualJacobian<LinearBackoffConstraint>> {
        let adapter = ResidualModelAdapter::none(2, 1, 2);
        ZoroSolver::new(ocp, integrator, adapter, tightener(), uncertainty()).unwrap()
    }

    #[test]
    // Purpose
    // -------
    // Components that disagree on dimensions are rejected at construction.
    //
    // Given
    // -----
    // - An adapter built for nu = 2 next to a single-input integrator.
    // - An OCP with an empty horizon.
    //
    // Expect
    // ------
    // - `LengthMismatch` and `EmptyHorizon`.
    fn new_rejects_inconsistent_components() {
        let adapter = ResidualModelAdapter::none(2, 2, 2);
        let res = ZoroSolver::new(FixedOcp::new(3), affine(), adapter, tightener(), uncertainty());
        assert!(matches!(res, Err(ZoroError::LengthMismatch { .. })));

        let adapter = ResidualModelAdapter::none(2, 1, 2);
        let res = ZoroSolver::new(FixedOcp::new(0), affine(), adapter, tightener(), uncertainty());
        assert!(matches!(res, Err(ZoroError::EmptyHorizon)));
    }

    #[test]
    // Purpose
    // -------
    // A failing preparation phase is tolerated, a failing feedback phase is
    // not.
    //
    // Given
    // -----
    // - Preparation status 3 with feedback status 0 and zero residuals.
    // - Then feedback status 4.
    //
    // Expect
    // ------
    // - Convergence after one iteration, phases in order
    //   [Preparation, Feedback].
    // - `SolverFailure { iteration: 0, phase: Feedback, status: 4 }`.
    fn preparation_status_is_tolerated_feedback_status_is_fatal() {
        // Arrange
        let mut ocp = FixedOcp::new(3);
        ocp.preparation_status = 3;
        let mut zoro = solver(ocp, affine());

        // Act
        let stats = zoro.solve(&ZoroOptions::default()).unwrap();

        // Assert
        assert!(stats.termination.is_converged());
        assert_eq!(stats.n_iter, 1);
        assert_eq!(zoro.ocp().solves, vec![RtiPhase::Preparation, RtiPhase::Feedback]);

        zoro.ocp_mut().feedback_status = 4;
        let err = zoro.solve(&ZoroOptions::default()).unwrap_err();
        assert_eq!(err, ZoroError::SolverFailure {
            iteration: 0,
            phase: RtiPhase::Feedback,
            status: 4
        });
    }

    #[test]
    // Purpose
    // -------
    // Integrator failures carry the stage at which they happened.
    //
    // Given
    // -----
    // - An integrator that fails on its third call (stage 2 of iteration 0).
    //
    // Expect
    // ------
    // - `IntegratorFailure { stage: 2, .. }` with the iteration in the
    //   reason.
    fn integrator_failure_reports_stage() {
        // Arrange
        let flaky = FlakyIntegrator { inner: affine(), calls: 0, fail_at: 2 };
        let mut zoro = solver(FixedOcp::new(3), flaky);

        // Act
        let err = zoro.solve(&ZoroOptions::default()).unwrap_err();

        // Assert
        match err {
            ZoroError::IntegratorFailure { stage, reason } => {
                assert_eq!(stage, 2);
                assert!(reason.starts_with("iteration 0"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    // Purpose
    // -------
    // An updated initial covariance is picked up by the next solve.
    //
    // Given
    // -----
    // - `set_initial_covariance(diag(0.04, 0.09))` before solving; a
    //   non-square replacement afterwards.
    //
    // Expect
    // ------
    // - `P[0]` equals the new covariance after the solve.
    // - `DimensionMismatch` for the wrong shape.
    fn initial_covariance_is_reset_on_solve() {
        // Arrange
        let mut zoro = solver(FixedOcp::new(2), affine());
        let sigma_x0 = array![[0.04, 0.0], [0.0, 0.09]];

        // Act
        zoro.set_initial_covariance(sigma_x0.clone()).unwrap();
        zoro.solve(&ZoroOptions::default()).unwrap();

        // Assert
        assert_eq!(zoro.covariances()[0], sigma_x0);
        assert_eq!(zoro.covariance_vecs()[0], array![0.04, 0.0, 0.09]);
        assert!(matches!(
            zoro.set_initial_covariance(Array2::eye(3)),
            Err(ZoroError::DimensionMismatch { .. })
        ));
    }

    #[test]
    // Purpose
    // -------
    // An integrator output of the wrong shape is an error, not a panic in
    // the stage linearization.
    //
    // Given
    // -----
    // - An integrator declaring nx = 2 that returns a 3×3 `Sx`.
    //
    // Expect
    // ------
    // - `DimensionMismatch` on `Sx` before any stage parameters are written
    //   or the OCP is solved.
    fn misshaped_integrator_output_is_rejected() {
        // Arrange
        let mut zoro = solver(FixedOcp::new(3), MisshapedIntegrator);

        // Act
        let err = zoro.solve(&ZoroOptions::default()).unwrap_err();

        // Assert
        assert_eq!(err, ZoroError::DimensionMismatch {
            what: "integrator sensitivity Sx",
            expected: (2, 2),
            found: (3, 3)
        });
        assert!(zoro.ocp().solves.is_empty());
    }

    #[test]
    // Purpose
    // -------
    // Residual vectors that carry no usable information never converge.
    //
    // Given
    // -----
    // - Constant NaN residuals with finiteness checks off.
    // - An OCP reporting no residuals at all.
    //
    // Expect
    // ------
    // - Both run into the iteration cap of 3 with a NaN residual.
    // - Finite residuals reduce to their maximum; one NaN makes it NaN.
    fn nan_or_empty_residuals_never_converge() {
        // Arrange
        let opts = ZoroOptions::new(1e-6, 3, false).unwrap();
        let mut nan_ocp = FixedOcp::new(2);
        nan_ocp.residual = f64::NAN;
        let mut empty_ocp = FixedOcp::new(2);
        empty_ocp.n_residuals = 0;

        // Act
        let nan_stats = solver(nan_ocp, affine()).solve(&opts).unwrap();
        let empty_stats = solver(empty_ocp, affine()).solve(&opts).unwrap();

        // Assert
        for stats in [nan_stats, empty_stats] {
            assert_eq!(stats.n_iter, 3);
            assert!(matches!(
                stats.termination,
                Termination::IterationCapReached { residual } if residual.is_nan()
            ));
        }
        assert_eq!(worst_residual(&array![0.1, 0.3, 0.2]), 0.3);
        assert!(worst_residual(&array![0.1, f64::NAN]).is_nan());
    }
}
