//! zoro::stats — per-solve timing and termination statistics.
//!
//! Purpose
//! -------
//! Record how long each phase of every outer iteration takes, how many
//! iterations were run, and why the loop stopped. A fresh
//! [`SolveStatsRecorder`] is created at the start of every solve and turned
//! into an immutable [`SolveStats`] at the end.
//!
//! Key behaviors
//! -------------
//! - [`TimingPhase`] names every timed section. Some phases nest inside
//!   others (`GetBackoffsJac` inside `GetBackoffs`, `IntegrateExternal`
//!   inside `Integrate`, `SolveQpExternal` inside `SolveQp`); the "other"
//!   time in the report is `Total` minus the top-level phases only.
//! - Per-phase arrays have one entry per executed iteration.
//! - Free functions aggregate over a sequence of solves, e.g. a closed-loop
//!   simulation.
use ndarray::Array1;
use std::collections::BTreeMap;

/// Timed sections of one outer iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimingPhase {
    QueryNodes,
    ResidualModel,
    Integrate,
    IntegrateExternal,
    BuildLinModel,
    PropagateCovar,
    SetSensitivitiesReshape,
    SetSensitivities,
    GetBackoffs,
    GetBackoffsJac,
    GetBackoffsMatmul,
    GetBackoffsAdd,
    SetTightening,
    Preparation,
    SolveQp,
    SolveQpExternal,
    CheckTermination,
    Total,
}

impl TimingPhase {
    pub const ALL: [TimingPhase; 18] = [
        TimingPhase::QueryNodes,
        TimingPhase::ResidualModel,
        TimingPhase::Integrate,
        TimingPhase::IntegrateExternal,
        TimingPhase::BuildLinModel,
        TimingPhase::PropagateCovar,
        TimingPhase::SetSensitivitiesReshape,
        TimingPhase::SetSensitivities,
        TimingPhase::GetBackoffs,
        TimingPhase::GetBackoffsJac,
        TimingPhase::GetBackoffsMatmul,
        TimingPhase::GetBackoffsAdd,
        TimingPhase::SetTightening,
        TimingPhase::Preparation,
        TimingPhase::SolveQp,
        TimingPhase::SolveQpExternal,
        TimingPhase::CheckTermination,
        TimingPhase::Total,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            TimingPhase::QueryNodes => "query_nodes",
            TimingPhase::ResidualModel => "residual_model",
            TimingPhase::Integrate => "integrate",
            TimingPhase::IntegrateExternal => "integrate_external",
            TimingPhase::BuildLinModel => "build_lin_model",
            TimingPhase::PropagateCovar => "propagate_covar",
            TimingPhase::SetSensitivitiesReshape => "set_sensitivities_reshape",
            TimingPhase::SetSensitivities => "set_sensitivities",
            TimingPhase::GetBackoffs => "get_backoffs",
            TimingPhase::GetBackoffsJac => "get_backoffs_jac",
            TimingPhase::GetBackoffsMatmul => "get_backoffs_matmul",
            TimingPhase::GetBackoffsAdd => "get_backoffs_add",
            TimingPhase::SetTightening => "set_tightening",
            TimingPhase::Preparation => "preparation",
            TimingPhase::SolveQp => "solve_qp",
            TimingPhase::SolveQpExternal => "solve_qp_external",
            TimingPhase::CheckTermination => "check_termination",
            TimingPhase::Total => "total",
        }
    }

    /// Phase this one is nested in, if any.
    pub const fn parent(self) -> Option<TimingPhase> {
        match self {
            TimingPhase::IntegrateExternal => Some(TimingPhase::Integrate),
            TimingPhase::GetBackoffsJac
            | TimingPhase::GetBackoffsMatmul
            | TimingPhase::GetBackoffsAdd => Some(TimingPhase::GetBackoffs),
            TimingPhase::SolveQpExternal => Some(TimingPhase::SolveQp),
            _ => None,
        }
    }

    /// Time reported by an external component rather than measured here.
    pub const fn is_external(self) -> bool {
        matches!(self, TimingPhase::IntegrateExternal | TimingPhase::SolveQpExternal)
    }

    /// Directly nested in `Total`.
    pub const fn is_top_level(self) -> bool {
        self.parent().is_none() && !matches!(self, TimingPhase::Total)
    }
}

impl std::fmt::Display for TimingPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Every phase except `Total`.
pub const DEFAULT_PHASES: [TimingPhase; 17] = [
    TimingPhase::QueryNodes,
    TimingPhase::ResidualModel,
    TimingPhase::Integrate,
    TimingPhase::IntegrateExternal,
    TimingPhase::BuildLinModel,
    TimingPhase::PropagateCovar,
    TimingPhase::SetSensitivitiesReshape,
    TimingPhase::SetSensitivities,
    TimingPhase::GetBackoffs,
    TimingPhase::GetBackoffsJac,
    TimingPhase::GetBackoffsMatmul,
    TimingPhase::GetBackoffsAdd,
    TimingPhase::SetTightening,
    TimingPhase::Preparation,
    TimingPhase::SolveQp,
    TimingPhase::SolveQpExternal,
    TimingPhase::CheckTermination,
];

/// Leaf phases only: wrappers around external calls and the back-off
/// parent are replaced by their constituents, so the sum does not double
/// count.
pub const RAW_PHASES: [TimingPhase; 14] = [
    TimingPhase::QueryNodes,
    TimingPhase::ResidualModel,
    TimingPhase::IntegrateExternal,
    TimingPhase::BuildLinModel,
    TimingPhase::PropagateCovar,
    TimingPhase::SetSensitivitiesReshape,
    TimingPhase::SetSensitivities,
    TimingPhase::GetBackoffsJac,
    TimingPhase::GetBackoffsMatmul,
    TimingPhase::GetBackoffsAdd,
    TimingPhase::SetTightening,
    TimingPhase::Preparation,
    TimingPhase::SolveQpExternal,
    TimingPhase::CheckTermination,
];

/// Constituents of the constraint tightening.
pub const BACKOFF_PHASES: [TimingPhase; 3] =
    [TimingPhase::GetBackoffsJac, TimingPhase::GetBackoffsMatmul, TimingPhase::GetBackoffsAdd];

/// Why the outer loop stopped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Termination {
    /// `max(residuals) < tol_nlp`.
    Converged { residual: f64 },
    /// Ran `n_iter_max` iterations without meeting the tolerance.
    IterationCapReached { residual: f64 },
}

impl Termination {
    pub fn is_converged(&self) -> bool {
        matches!(self, Termination::Converged { .. })
    }

    /// Largest residual after the last iteration.
    pub fn residual(&self) -> f64 {
        match *self {
            Termination::Converged { residual } | Termination::IterationCapReached { residual } => {
                residual
            }
        }
    }
}

/// Aggregate of one phase over the executed iterations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseSummary {
    pub total: f64,
    pub mean: f64,
    pub max: f64,
    pub min: f64,
    pub calls: usize,
}

impl PhaseSummary {
    pub fn from_samples(samples: &Array1<f64>) -> Self {
        let calls = samples.len();
        if calls == 0 {
            return PhaseSummary { total: 0.0, mean: 0.0, max: 0.0, min: 0.0, calls };
        }
        let total = samples.sum();
        let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
        PhaseSummary { total, mean: total / calls as f64, max, min, calls }
    }
}

/// Statistics of one call to `solve`.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveStats {
    pub n_iter: usize,
    pub termination: Termination,
    /// Wall time of the whole solve in seconds.
    pub timings_total: f64,
    /// Seconds per phase, one entry per executed iteration.
    pub timings: BTreeMap<TimingPhase, Array1<f64>>,
}

impl SolveStats {
    /// Per-iteration samples of `phase` (empty when never recorded).
    pub fn phase(&self, phase: TimingPhase) -> Array1<f64> {
        self.timings.get(&phase).cloned().unwrap_or_else(|| Array1::zeros(self.n_iter))
    }

    pub fn summary(&self, phase: TimingPhase) -> PhaseSummary {
        PhaseSummary::from_samples(&self.phase(phase))
    }

    /// `Total` minus every top-level phase.
    pub fn other_time(&self) -> f64 {
        let total = self.summary(TimingPhase::Total).total;
        let accounted: f64 = TimingPhase::ALL
            .iter()
            .filter(|p| p.is_top_level())
            .map(|&p| self.summary(p).total)
            .sum();
        total - accounted
    }
}

impl std::fmt::Display for SolveStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let n = self.n_iter;
        for phase in TimingPhase::ALL {
            let s = self.summary(phase);
            writeln!(
                f,
                "{:26}: {:8.3}ms ({} calls), {:8.3}/{:8.3}/{:8.3}ms (avg/max/min per call)",
                phase.name(),
                1e3 * s.total,
                s.calls,
                1e3 * s.mean,
                1e3 * s.max,
                1e3 * s.min,
            )?;
        }
        let other = self.other_time();
        let per_call = if n > 0 { other / n as f64 } else { 0.0 };
        writeln!(f, "{}", "-".repeat(72))?;
        write!(
            f,
            "{:26}: {:8.3}ms ({} calls), {:8.3}ms (1 call)",
            "other",
            1e3 * other,
            n,
            1e3 * per_call
        )
    }
}

/// Accumulates phase timings during one solve.
#[derive(Debug, Clone)]
pub struct SolveStatsRecorder {
    timings: BTreeMap<TimingPhase, Array1<f64>>,
}

impl SolveStatsRecorder {
    /// Zeroed arrays of length `n_iter_max` for every phase.
    pub fn new(n_iter_max: usize) -> Self {
        let timings = TimingPhase::ALL.iter().map(|&p| (p, Array1::zeros(n_iter_max))).collect();
        SolveStatsRecorder { timings }
    }

    /// Add `seconds` to `phase` in iteration `iter`; out-of-range
    /// iterations are ignored.
    pub fn add(&mut self, phase: TimingPhase, iter: usize, seconds: f64) {
        if let Some(slot) = self.timings.get_mut(&phase).and_then(|arr| arr.get_mut(iter)) {
            *slot += seconds;
        }
    }

    /// Truncate to the executed iterations and freeze.
    pub fn finish(self, n_iter: usize, termination: Termination, timings_total: f64) -> SolveStats {
        let timings = self
            .timings
            .into_iter()
            .map(|(p, arr)| {
                let keep = n_iter.min(arr.len());
                (p, arr.slice(ndarray::s![..keep]).to_owned())
            })
            .collect();
        SolveStats { n_iter, termination, timings_total, timings }
    }
}

// ---- Aggregation over several solves ----

/// Total seconds per phase for each solve.
pub fn timings_per_task(solves: &[SolveStats]) -> BTreeMap<TimingPhase, Vec<f64>> {
    let mut out: BTreeMap<TimingPhase, Vec<f64>> = BTreeMap::new();
    for s in solves {
        for (&phase, arr) in &s.timings {
            out.entry(phase).or_default().push(arr.sum());
        }
    }
    out
}

/// Per solve, the summed time of the selected `phases`.
pub fn total_timings(solves: &[SolveStats], phases: &[TimingPhase]) -> Array1<f64> {
    solves
        .iter()
        .map(|s| phases.iter().map(|&p| s.summary(p).total).sum::<f64>())
        .collect()
}

/// Iterations per solve.
pub fn total_iterations(solves: &[SolveStats]) -> Vec<usize> {
    solves.iter().map(|s| s.n_iter).collect()
}
