//! First-order bias correction of a frozen preintegrated rotation.
//!
//! When the optimizer moves the gyro bias away from the value used during
//! integration, the preintegrated rotation is updated without re-integrating:
//!
//! ```text
//! ΔR(b) ≈ ΔR(b̂) · Exp(∂ΔR/∂b · (b - b̂))
//! ```
//!
//! The approximation is exact to first order in `b - b̂` and degrades as the bias
//! moves further from `b̂`; callers re-integrate when that matters.

use nalgebra::{Rotation3, Vector3};

use super::preintegration::PreintegratedRotation;
use super::sample::ImuBias;
use crate::geometry::so3;

/// A preintegrated rotation re-linearized for a candidate bias.
#[derive(Debug, Clone, PartialEq)]
pub struct BiasCorrectedRotation {
    /// ΔR_ij corrected for the candidate bias.
    pub delta_r: Rotation3<f64>,
    /// Tangent-space correction `∂ΔR/∂b · δb` applied on the right.
    pub correction: Vector3<f64>,
    /// Gyro bias increment `b - b̂` w.r.t. the integration bias.
    pub bias_gyro_incr: Vector3<f64>,
}

impl PreintegratedRotation {
    /// Re-linearizes the preintegrated rotation at `bias`.
    pub fn correct_for_bias(&self, bias: &ImuBias) -> BiasCorrectedRotation {
        let bias_gyro_incr = bias.gyro - self.bias_hat().gyro;
        let correction = self.d_r_d_bias_gyro() * bias_gyro_incr;

        BiasCorrectedRotation {
            delta_r: self.delta_r() * so3::exp(&correction),
            correction,
            bias_gyro_incr,
        }
    }

    /// ΔR_ij corrected for `bias`.
    pub fn bias_corrected_delta_r(&self, bias: &ImuBias) -> Rotation3<f64> {
        self.correct_for_bias(bias).delta_r
    }
}
