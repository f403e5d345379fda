//! Validation helpers for the ZORO iteration loop.
//!
//! - **Construction checks**: [`validate_dims`] cross-checks the OCP, the
//!   integrator, the residual adapter, the tightener and the uncertainty
//!   description and derives [`ZoroDims`].
//! - **Iterate checks**: [`validate_iterate`] verifies the state and control
//!   lengths returned by the OCP at one stage.
//! - **Integrator checks**: [`validate_integrator_output`] verifies the
//!   successor and sensitivity shapes returned by the integrator.
//! - **Finiteness**: [`check_finite`] reports the first NaN/inf in an
//!   intermediate quantity as [`ZoroError::NumericalDegeneracy`].
use crate::{
    dynamics::integrator::IntegratorOutput,
    residual::adapter::ResidualModelAdapter,
    zoro::{
        errors::{ZoroError, ZoroResult},
        options::{UncertaintyModel, ZoroDims},
    },
};
use ndarray::{ArrayBase, Data, Dimension};

/// Derive and cross-check problem dimensions.
///
/// `nx`/`nu` come from the integrator; the horizon from the OCP.
///
/// # Errors
/// - `ZoroError::EmptyHorizon` when the OCP horizon is zero.
/// - `ZoroError::DimensionMismatch`/`LengthMismatch` when any component
///   disagrees on `nx`, `nu` or `nw`.
pub fn validate_dims(
    horizon: usize, integrator_nx: usize, integrator_nu: usize, adapter: &ResidualModelAdapter,
    sensitivity_nx: usize, nh: usize, uncertainty: &UncertaintyModel,
) -> ZoroResult<ZoroDims> {
    if horizon == 0 {
        return Err(ZoroError::EmptyHorizon);
    }
    let (nx, nu) = (integrator_nx, integrator_nu);
    let nw = uncertainty.nw();
    if uncertainty.nx() != nx {
        return Err(ZoroError::DimensionMismatch {
            what: "Sigma_x0",
            expected: (nx, nx),
            found: uncertainty.sigma_x0.dim(),
        });
    }
    if (adapter.nx(), adapter.nu(), adapter.nw()) != (nx, nu, nw) {
        return Err(ZoroError::LengthMismatch {
            what: "residual adapter dimension (nx + nu + nw)",
            expected: nx + nu + nw,
            found: adapter.nx() + adapter.nu() + adapter.nw(),
        });
    }
    if sensitivity_nx != nx {
        return Err(ZoroError::LengthMismatch {
            what: "constraint sensitivity state dimension",
            expected: nx,
            found: sensitivity_nx,
        });
    }
    Ok(ZoroDims { nx, nu, nw, nh, n: horizon })
}

/// Verify stage iterate lengths.
///
/// # Errors
/// `ZoroError::LengthMismatch` naming the offending quantity.
pub fn validate_iterate(dims: &ZoroDims, x_len: usize, u_len: Option<usize>) -> ZoroResult<()> {
    if x_len != dims.nx {
        return Err(ZoroError::LengthMismatch {
            what: "OCP state iterate",
            expected: dims.nx,
            found: x_len,
        });
    }
    if let Some(u_len) = u_len {
        if u_len != dims.nu {
            return Err(ZoroError::LengthMismatch {
                what: "OCP control iterate",
                expected: dims.nu,
                found: u_len,
            });
        }
    }
    Ok(())
}

/// Verify the shapes of one integrator output against `dims`.
///
/// # Errors
/// - `ZoroError::LengthMismatch` when `x_next` does not have `nx` entries.
/// - `ZoroError::DimensionMismatch` when `Sx` is not `nx × nx` or `Su` is not
///   `nx × nu`.
pub fn validate_integrator_output(dims: &ZoroDims, output: &IntegratorOutput) -> ZoroResult<()> {
    let (nx, nu) = (dims.nx, dims.nu);
    if output.x_next.len() != nx {
        return Err(ZoroError::LengthMismatch {
            what: "integrator successor x_next",
            expected: nx,
            found: output.x_next.len(),
        });
    }
    if output.sx.dim() != (nx, nx) {
        return Err(ZoroError::DimensionMismatch {
            what: "integrator sensitivity Sx",
            expected: (nx, nx),
            found: output.sx.dim(),
        });
    }
    if output.su.dim() != (nx, nu) {
        return Err(ZoroError::DimensionMismatch {
            what: "integrator sensitivity Su",
            expected: (nx, nu),
            found: output.su.dim(),
        });
    }
    Ok(())
}

/// Report the first non-finite entry of `values` as `NumericalDegeneracy`.
///
/// # Errors
/// `ZoroError::NumericalDegeneracy` with the flat index of the entry.
pub fn check_finite<S, D>(
    what: &'static str, iteration: usize, stage: usize, values: &ArrayBase<S, D>,
) -> ZoroResult<()>
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    match values.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        Some((index, &value)) => {
            Err(ZoroError::NumericalDegeneracy { what, iteration, stage, index, value })
        }
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2, array};

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Dimension derivation and mismatch reporting.
    // - Iterate length checks.
    // - Integrator output shape checks.
    // - Location reporting of non-finite values.
    // -------------------------------------------------------------------------

    fn uncertainty(nx: usize) -> UncertaintyModel {
        UncertaintyModel::new(Array2::eye(nx), Array2::eye(nx) * 0.01, None).unwrap()
    }

    #[test]
    // Purpose
    // -------
    // Consistent components yield the derived dimensions.
    //
    // Given
    // -----
    // - nx = 2, nu = 1, nw = 2, nh = 1, horizon 3.
    //
    // Expect
    // ------
    // - `ZoroDims { nx: 2, nu: 1, nw: 2, nh: 1, n: 3 }`.
    fn consistent_components_yield_dims() {
        let adapter = ResidualModelAdapter::none(2, 1, 2);
        let dims = validate_dims(3, 2, 1, &adapter, 2, 1, &uncertainty(2)).unwrap();
        assert_eq!(dims, ZoroDims { nx: 2, nu: 1, nw: 2, nh: 1, n: 3 });
        assert_eq!(dims.nvec(), 3);
    }

    #[test]
    // Purpose
    // -------
    // Disagreements are reported.
    //
    // Given
    // -----
    // - Zero horizon; a 3-state covariance with a 2-state integrator; an
    //   adapter built for nu = 2.
    //
    // Expect
    // ------
    // - `EmptyHorizon`, `DimensionMismatch`, `LengthMismatch`.
    fn inconsistent_components_are_rejected() {
        let adapter = ResidualModelAdapter::none(2, 1, 2);
        assert_eq!(
            validate_dims(0, 2, 1, &adapter, 2, 1, &uncertainty(2)).unwrap_err(),
            ZoroError::EmptyHorizon
        );
        assert!(matches!(
            validate_dims(3, 2, 1, &adapter, 2, 1, &uncertainty(3)),
            Err(ZoroError::DimensionMismatch { what: "Sigma_x0", .. })
        ));
        let adapter = ResidualModelAdapter::none(2, 2, 2);
        assert!(matches!(
            validate_dims(3, 2, 1, &adapter, 2, 1, &uncertainty(2)),
            Err(ZoroError::LengthMismatch { .. })
        ));
    }

    #[test]
    // Purpose
    // -------
    // Non-finite values are located by iteration, stage and flat index.
    //
    // Given
    // -----
    // - A 2×2 matrix with +inf at (1, 0).
    //
    // Expect
    // ------
    // - `NumericalDegeneracy { index: 2, .. }`; wrong iterate length caught.
    fn non_finite_values_are_located() {
        let m = array![[1.0, 2.0], [f64::INFINITY, 3.0]];
        let err = check_finite("covariance", 4, 1, &m).unwrap_err();
        assert_eq!(err, ZoroError::NumericalDegeneracy {
            what: "covariance",
            iteration: 4,
            stage: 1,
            index: 2,
            value: f64::INFINITY
        });
        assert!(check_finite("covariance", 0, 0, &array![1.0, 2.0]).is_ok());

        let dims = ZoroDims { nx: 2, nu: 1, nw: 2, nh: 1, n: 3 };
        assert!(validate_iterate(&dims, 2, Some(1)).is_ok());
        assert!(validate_iterate(&dims, 2, Some(3)).is_err());
    }

    #[test]
    // Purpose
    // -------
    // Integrator outputs of the wrong shape are named by the offending part.
    //
    // Given
    // -----
    // - nx = 2, nu = 1; a well-shaped output, then a 3-entry successor, a
    //   3×3 Sx and a 2×2 Su.
    //
    // Expect
    // ------
    // - `Ok` for the well-shaped output; `LengthMismatch` on `x_next`,
    //   `DimensionMismatch` on `Sx` and `Su`.
    fn integrator_output_shapes_are_checked() {
        // Arrange
        let dims = ZoroDims { nx: 2, nu: 1, nw: 2, nh: 1, n: 3 };
        let good = IntegratorOutput {
            x_next: Array1::zeros(2),
            sx: Array2::eye(2),
            su: Array2::zeros((2, 1)),
            time_tot: 0.0,
        };

        // Act & Assert
        assert!(validate_integrator_output(&dims, &good).is_ok());

        let long_x = IntegratorOutput { x_next: Array1::zeros(3), ..good.clone() };
        assert_eq!(
            validate_integrator_output(&dims, &long_x).unwrap_err(),
            ZoroError::LengthMismatch { what: "integrator successor x_next", expected: 2, found: 3 }
        );

        let wide_sx = IntegratorOutput { sx: Array2::eye(3), ..good.clone() };
        assert_eq!(
            validate_integrator_output(&dims, &wide_sx).unwrap_err(),
            ZoroError::DimensionMismatch {
                what: "integrator sensitivity Sx",
                expected: (2, 2),
                found: (3, 3)
            }
        );

        let wide_su = IntegratorOutput { su: Array2::zeros((2, 2)), ..good };
        assert!(matches!(
            validate_integrator_output(&dims, &wide_su),
            Err(ZoroError::DimensionMismatch { what: "integrator sensitivity Su", .. })
        ));
    }
}
