//! dynamics::integrator — discrete-time simulation with sensitivities.
//!
//! Purpose
//! -------
//! Define the interface the iteration loop uses to obtain the nominal
//! successor state and its Jacobians at each shooting node, plus two
//! concrete integrators.
//!
//! Key behaviors
//! -------------
//! - [`SensitivityIntegrator::simulate`] returns `x⁺ = f(x, u)` together
//!   with `Sx = ∂f/∂x` (`nx×nx`) and `Su = ∂f/∂u` (`nx×nu`) and the time
//!   spent.
//! - [`AffineIntegrator`] is exact for `x⁺ = A x + B u + c`.
//! - [`Rk4Integrator`] takes fixed RK4 steps over a continuous-time
//!   right-hand side and obtains sensitivities by central differences of
//!   the whole step map, `2·(nx + nu)` step evaluations per call.
use crate::zoro::errors::{ZoroError, ZoroResult};
use finitediff::FiniteDiff;
use ndarray::{Array1, Array2, Axis, concatenate, s};
use std::time::Instant;

/// Result of one discrete-time simulation step.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegratorOutput {
    pub x_next: Array1<f64>,
    pub sx: Array2<f64>,
    pub su: Array2<f64>,
    /// Seconds spent inside the integrator.
    pub time_tot: f64,
}

/// Discrete-time dynamics with forward sensitivities.
pub trait SensitivityIntegrator {
    fn nx(&self) -> usize;
    fn nu(&self) -> usize;

    /// Simulate one shooting interval from `(x, u)`.
    ///
    /// # Errors
    /// Implementations report failures as `ZoroError::IntegratorFailure`
    /// or a shape error.
    fn simulate(&mut self, x: &Array1<f64>, u: &Array1<f64>) -> ZoroResult<IntegratorOutput>;
}

fn check_lengths(nx: usize, nu: usize, x: &Array1<f64>, u: &Array1<f64>) -> ZoroResult<()> {
    if x.len() != nx {
        return Err(ZoroError::LengthMismatch { what: "state", expected: nx, found: x.len() });
    }
    if u.len() != nu {
        return Err(ZoroError::LengthMismatch { what: "control", expected: nu, found: u.len() });
    }
    Ok(())
}

/// Exact integrator for affine discrete-time dynamics.
#[derive(Debug, Clone, PartialEq)]
pub struct AffineIntegrator {
    a: Array2<f64>,
    b: Array2<f64>,
    c: Array1<f64>,
}

impl AffineIntegrator {
    /// # Errors
    /// `ZoroError::DimensionMismatch`/`LengthMismatch` when `a` is not
    /// `nx×nx`, `b` has a different row count, or `c` is not length `nx`.
    pub fn new(a: Array2<f64>, b: Array2<f64>, c: Array1<f64>) -> ZoroResult<Self> {
        let nx = a.nrows();
        if a.ncols() != nx {
            return Err(ZoroError::NotSquare { what: "A", rows: a.nrows(), cols: a.ncols() });
        }
        if b.nrows() != nx {
            return Err(ZoroError::DimensionMismatch {
                what: "B",
                expected: (nx, b.ncols()),
                found: b.dim(),
            });
        }
        if c.len() != nx {
            return Err(ZoroError::LengthMismatch { what: "c", expected: nx, found: c.len() });
        }
        Ok(AffineIntegrator { a, b, c })
    }

    /// `x⁺ = A x + B u`.
    pub fn linear(a: Array2<f64>, b: Array2<f64>) -> ZoroResult<Self> {
        let nx = a.nrows();
        Self::new(a, b, Array1::zeros(nx))
    }
}

impl SensitivityIntegrator for AffineIntegrator {
    fn nx(&self) -> usize {
        self.a.nrows()
    }

    fn nu(&self) -> usize {
        self.b.ncols()
    }

    fn simulate(&mut self, x: &Array1<f64>, u: &Array1<f64>) -> ZoroResult<IntegratorOutput> {
        check_lengths(self.nx(), self.nu(), x, u)?;
        let start = Instant::now();
        let x_next = self.a.dot(x) + self.b.dot(u) + &self.c;
        Ok(IntegratorOutput {
            x_next,
            sx: self.a.clone(),
            su: self.b.clone(),
            time_tot: start.elapsed().as_secs_f64(),
        })
    }
}

/// Fixed-step RK4 over `ẋ = f(x, u)` with zero-order-hold control.
pub struct Rk4Integrator<F>
where
    F: Fn(&Array1<f64>, &Array1<f64>) -> Array1<f64>,
{
    nx: usize,
    nu: usize,
    dt: f64,
    num_steps: usize,
    rhs: F,
}

impl<F> Rk4Integrator<F>
where
    F: Fn(&Array1<f64>, &Array1<f64>) -> Array1<f64>,
{
    /// `dt` is the shooting interval, split into `num_steps` RK4 steps.
    ///
    /// # Errors
    /// `ZoroError::IntegratorFailure` when `dt` is not finite and positive
    /// or `num_steps == 0`.
    pub fn new(nx: usize, nu: usize, dt: f64, num_steps: usize, rhs: F) -> ZoroResult<Self> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(ZoroError::IntegratorFailure {
                stage: 0,
                reason: format!("step length must be finite and > 0, got {dt}"),
            });
        }
        if num_steps == 0 {
            return Err(ZoroError::IntegratorFailure {
                stage: 0,
                reason: "number of RK4 steps must be positive".to_string(),
            });
        }
        Ok(Rk4Integrator { nx, nu, dt, num_steps, rhs })
    }

    /// Step map `x⁺ = Φ(x, u)` without sensitivities.
    pub fn step(&self, x: &Array1<f64>, u: &Array1<f64>) -> Array1<f64> {
        let h = self.dt / self.num_steps as f64;
        let mut state = x.clone();
        for _ in 0..self.num_steps {
            let k1 = (self.rhs)(&state, u);
            let k2 = (self.rhs)(&(&state + &(0.5 * h * &k1)), u);
            let k3 = (self.rhs)(&(&state + &(0.5 * h * &k2)), u);
            let k4 = (self.rhs)(&(&state + &(h * &k3)), u);
            state = state + (h / 6.0) * (k1 + 2.0 * k2 + 2.0 * k3 + k4);
        }
        state
    }
}

impl<F> SensitivityIntegrator for Rk4Integrator<F>
where
    F: Fn(&Array1<f64>, &Array1<f64>) -> Array1<f64>,
{
    fn nx(&self) -> usize {
        self.nx
    }

    fn nu(&self) -> usize {
        self.nu
    }

    fn simulate(&mut self, x: &Array1<f64>, u: &Array1<f64>) -> ZoroResult<IntegratorOutput> {
        check_lengths(self.nx, self.nu, x, u)?;
        let start = Instant::now();
        let x_next = self.step(x, u);
        if x_next.len() != self.nx {
            return Err(ZoroError::IntegratorFailure {
                stage: 0,
                reason: format!(
                    "right-hand side returned {} states, expected {}",
                    x_next.len(),
                    self.nx
                ),
            });
        }

        // Differentiate the step map in z = [x, u]; finitediff lays the
        // Jacobian out as inputs × outputs.
        let z = concatenate(Axis(0), &[x.view(), u.view()])
            .map_err(|e| ZoroError::IntegratorFailure { stage: 0, reason: e.to_string() })?;
        let jac = z
            .central_jacobian(&|zz: &Array1<f64>| {
                let xs = zz.slice(s![..self.nx]).to_owned();
                let us = zz.slice(s![self.nx..]).to_owned();
                self.step(&xs, &us)
            })
            .reversed_axes();

        Ok(IntegratorOutput {
            x_next,
            sx: jac.slice(s![.., ..self.nx]).to_owned(),
            su: jac.slice(s![.., self.nx..]).to_owned(),
            time_tot: start.elapsed().as_secs_f64(),
        })
    }
}
