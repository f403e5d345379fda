//! sensitivity::dual — forward-mode dual numbers and the `Real` scalar trait.
//!
//! Purpose
//! -------
//! Let constraint expressions be written once, generically over a scalar
//! type, and evaluated either on plain `f64` values or on [`Dual`] numbers
//! that carry a single directional derivative alongside the value. Seeding
//! one input coordinate at a time yields exact Jacobian columns without
//! symbolic machinery or finite-difference step selection.
//!
//! Conventions
//! -----------
//! - A [`Dual`] is `value + tangent·ε` with `ε² = 0`.
//! - [`Real::constant`] lifts an `f64` with zero tangent; literals inside a
//!   generic expression must go through it.
//! - Ordering on duals compares the value part first, so branches inside an
//!   expression follow the primal evaluation.
use std::ops::{Add, AddAssign, Div, Mul, MulAssign, Neg, Sub, SubAssign};

/// Scalar capability set required by generic constraint expressions.
pub trait Real:
    Copy
    + Default
    + PartialOrd
    + std::fmt::Debug
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
{
    fn constant(value: f64) -> Self;
    fn value(self) -> f64;

    fn sqrt(self) -> Self;
    fn exp(self) -> Self;
    fn ln(self) -> Self;
    fn sin(self) -> Self;
    fn cos(self) -> Self;
    fn powi(self, n: i32) -> Self;
    fn abs(self) -> Self;

    fn zero() -> Self {
        Self::constant(0.0)
    }

    fn one() -> Self {
        Self::constant(1.0)
    }
}

impl Real for f64 {
    fn constant(value: f64) -> Self {
        value
    }

    fn value(self) -> f64 {
        self
    }

    fn sqrt(self) -> Self {
        f64::sqrt(self)
    }

    fn exp(self) -> Self {
        f64::exp(self)
    }

    fn ln(self) -> Self {
        f64::ln(self)
    }

    fn sin(self) -> Self {
        f64::sin(self)
    }

    fn cos(self) -> Self {
        f64::cos(self)
    }

    fn powi(self, n: i32) -> Self {
        f64::powi(self, n)
    }

    fn abs(self) -> Self {
        f64::abs(self)
    }
}

/// Forward-mode dual number with a single tangent direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd)]
pub struct Dual {
    pub re: f64,
    pub eps: f64,
}

impl Dual {
    pub const fn new(re: f64, eps: f64) -> Self {
        Dual { re, eps }
    }

    /// Independent variable: tangent seeded to one.
    pub const fn variable(re: f64) -> Self {
        Dual { re, eps: 1.0 }
    }

    pub const fn tangent(self) -> f64 {
        self.eps
    }

    // Chain rule for a unary function with derivative `df` at `self.re`.
    fn chain(self, f: f64, df: f64) -> Self {
        Dual { re: f, eps: df * self.eps }
    }
}

impl Add for Dual {
    type Output = Dual;

    fn add(self, rhs: Dual) -> Dual {
        Dual { re: self.re + rhs.re, eps: self.eps + rhs.eps }
    }
}

impl Sub for Dual {
    type Output = Dual;

    fn sub(self, rhs: Dual) -> Dual {
        Dual { re: self.re - rhs.re, eps: self.eps - rhs.eps }
    }
}

impl Mul for Dual {
    type Output = Dual;

    fn mul(self, rhs: Dual) -> Dual {
        Dual { re: self.re * rhs.re, eps: self.eps * rhs.re + self.re * rhs.eps }
    }
}

impl Div for Dual {
    type Output = Dual;

    fn div(self, rhs: Dual) -> Dual {
        let inv = 1.0 / rhs.re;
        Dual { re: self.re * inv, eps: (self.eps * rhs.re - self.re * rhs.eps) * inv * inv }
    }
}

impl Neg for Dual {
    type Output = Dual;

    fn neg(self) -> Dual {
        Dual { re: -self.re, eps: -self.eps }
    }
}

impl AddAssign for Dual {
    fn add_assign(&mut self, rhs: Dual) {
        *self = *self + rhs;
    }
}

impl SubAssign for Dual {
    fn sub_assign(&mut self, rhs: Dual) {
        *self = *self - rhs;
    }
}

impl MulAssign for Dual {
    fn mul_assign(&mut self, rhs: Dual) {
        *self = *self * rhs;
    }
}

impl Real for Dual {
    fn constant(value: f64) -> Self {
        Dual { re: value, eps: 0.0 }
    }

    fn value(self) -> f64 {
        self.re
    }

    fn sqrt(self) -> Self {
        let s = self.re.sqrt();
        self.chain(s, 0.5 / s)
    }

    fn exp(self) -> Self {
        let e = self.re.exp();
        self.chain(e, e)
    }

    fn ln(self) -> Self {
        self.chain(self.re.ln(), 1.0 / self.re)
    }

    fn sin(self) -> Self {
        self.chain(self.re.sin(), self.re.cos())
    }

    fn cos(self) -> Self {
        self.chain(self.re.cos(), -self.re.sin())
    }

    fn powi(self, n: i32) -> Self {
        if n == 0 {
            return Dual::constant(1.0);
        }
        self.chain(self.re.powi(n), f64::from(n) * self.re.powi(n - 1))
    }

    fn abs(self) -> Self {
        if self.re < 0.0 { -self } else { self }
    }
}

// ---- Generic linear-algebra helpers ----

/// Inner product of two equally long slices.
pub fn dot<T: Real>(a: &[T], b: &[T]) -> T {
    a.iter().zip(b).fold(T::zero(), |acc, (&ai, &bi)| acc + ai * bi)
}

/// Quadratic form `cᵀ M c` for a row-major `n×n` matrix `m`.
pub fn quad_form<T: Real>(c: &[T], m: &ndarray::Array2<T>) -> T {
    let n = c.len();
    let mut acc = T::zero();
    for i in 0..n {
        for j in 0..n {
            acc += c[i] * m[[i, j]] * c[j];
        }
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Arithmetic derivative rules (product, quotient).
    // - Elementary functions against closed-form derivatives.
    // - Generic helpers evaluated on both scalar types.
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // Product and quotient rules.
    //
    // Given
    // -----
    // - x = 3 seeded as variable, c = 2 constant.
    //
    // Expect
    // ------
    // - d(x·x)/dx = 6, d(c/x)/dx = -2/9.
    fn product_and_quotient_rules_hold() {
        // Arrange
        let x = Dual::variable(3.0);
        let c = Dual::constant(2.0);

        // Act
        let sq = x * x;
        let q = c / x;

        // Assert
        assert_relative_eq!(sq.re, 9.0);
        assert_relative_eq!(sq.eps, 6.0);
        assert_relative_eq!(q.eps, -2.0 / 9.0, epsilon = 1e-15);
    }

    #[test]
    // Purpose
    // -------
    // Elementary functions propagate tangents correctly.
    //
    // Given
    // -----
    // - x = 0.7 seeded as variable.
    //
    // Expect
    // ------
    // - Tangents equal the analytic derivatives of sqrt, exp, ln, sin, cos
    //   and x³.
    fn elementary_functions_match_analytic_derivatives() {
        let x = Dual::variable(0.7);

        assert_relative_eq!(x.sqrt().eps, 0.5 / 0.7_f64.sqrt(), epsilon = 1e-14);
        assert_relative_eq!(x.exp().eps, 0.7_f64.exp(), epsilon = 1e-14);
        assert_relative_eq!(x.ln().eps, 1.0 / 0.7, epsilon = 1e-14);
        assert_relative_eq!(x.sin().eps, 0.7_f64.cos(), epsilon = 1e-14);
        assert_relative_eq!(x.cos().eps, -0.7_f64.sin(), epsilon = 1e-14);
        assert_relative_eq!(x.powi(3).eps, 3.0 * 0.49, epsilon = 1e-14);
    }

    #[test]
    // Purpose
    // -------
    // The quadratic-form helper gives the same value on f64 and Dual and the
    // right derivative w.r.t. a matrix entry.
    //
    // Given
    // -----
    // - c = [1, 2], M = [[2, 0.5], [0.5, 1]], with M[0,0] seeded.
    //
    // Expect
    // ------
    // - Value cᵀMc = 8; derivative w.r.t. M[0,0] equals c0² = 1.
    fn quad_form_agrees_across_scalar_types() {
        // Arrange
        let c = [1.0, 2.0];
        let m = array![[2.0, 0.5], [0.5, 1.0]];
        let cd = [Dual::constant(1.0), Dual::constant(2.0)];
        let mut md = m.mapv(Dual::constant);
        md[[0, 0]] = Dual::variable(2.0);

        // Act
        let plain = quad_form(&c, &m);
        let dual = quad_form(&cd, &md);

        // Assert
        assert_relative_eq!(plain, 8.0);
        assert_relative_eq!(dual.re, plain);
        assert_relative_eq!(dual.eps, 1.0);
    }
}
