//! Gyroscope rotation preintegration.
//!
//! Folds an ordered stream of angular-rate samples into one relative rotation
//! ΔR_ij, its elapsed time, the Jacobian of Log(ΔR_ij) w.r.t. the gyro bias and
//! the covariance induced by gyro noise, following the rotation part of
//! Forster et al. "On-Manifold Preintegration for Real-Time Visual-Inertial
//! Odometry".
//!
//! ```text
//! δ      = Exp((ω_m - b̂_g) Δt)
//! ΔR    ← ΔR · δ
//! ∂ΔR/∂b ← δᵀ · ∂ΔR/∂b - Jr((ω_m - b̂_g) Δt) Δt
//! Σ      ← δᵀ Σ δ + Jr Σ_gyro Jrᵀ Δt
//! ```

use nalgebra::{Matrix3, Rotation3, Vector3};
use tracing::debug;

use super::sample::{GyroSample, ImuBias};
use crate::error::{AhrsError, Result};
use crate::geometry::so3;

/// Preintegrated gyroscope measurements between two keyframes.
///
/// A plain value: cloning yields an independent accumulator, so a partially
/// integrated snapshot can be branched and continued separately.
#[derive(Debug, Clone, PartialEq)]
pub struct PreintegratedRotation {
    /// Accumulated relative rotation ΔR_ij.
    delta_r: Rotation3<f64>,
    /// Accumulated integration time (s).
    delta_t: f64,
    /// Bias estimate used while integrating.
    bias_hat: ImuBias,
    /// ∂Log(ΔR_ij)/∂b_g at `bias_hat`.
    d_r_d_bias_gyro: Matrix3<f64>,
    /// Covariance of the preintegrated rotation.
    covariance: Matrix3<f64>,
    /// Per-sample gyro noise covariance Σ_gyro.
    gyro_noise_covariance: Matrix3<f64>,
    /// Rate at the start of the interval, if the caller tracks it.
    initial_rotation_rate: Vector3<f64>,
}

impl PreintegratedRotation {
    pub fn new(bias_hat: ImuBias, gyro_noise_covariance: Matrix3<f64>) -> Self {
        Self {
            delta_r: Rotation3::identity(),
            delta_t: 0.0,
            bias_hat,
            d_r_d_bias_gyro: Matrix3::zeros(),
            covariance: Matrix3::zeros(),
            gyro_noise_covariance,
            initial_rotation_rate: Vector3::zeros(),
        }
    }

    /// Records the angular rate at the start of the interval.
    ///
    /// Kept alongside the measurement for callers that stitch consecutive
    /// intervals together; it does not enter the accumulation.
    pub fn with_initial_rotation_rate(mut self, rate: Vector3<f64>) -> Self {
        self.initial_rotation_rate = rate;
        self
    }

    /// Clears the accumulated state, keeping the bias estimate and noise.
    pub fn reset(&mut self) {
        self.delta_r = Rotation3::identity();
        self.delta_t = 0.0;
        self.d_r_d_bias_gyro = Matrix3::zeros();
        self.covariance = Matrix3::zeros();
    }

    /// State after integrating one more sample, leaving `self` untouched.
    pub fn propagate(&self, measured_omega: &Vector3<f64>, dt: f64) -> Result<Self> {
        if !(dt > 0.0) || !dt.is_finite() {
            return Err(AhrsError::InvalidDuration(dt));
        }

        let corrected_omega = measured_omega - self.bias_hat.gyro;
        let theta_incr = corrected_omega * dt;
        let incr = so3::exp(&theta_incr);
        let jr = so3::right_jacobian_so3(&theta_incr);

        // Ad(δ⁻¹) transports the previous tangent quantities to the new endpoint.
        let ad_incr_inv = so3::adjoint(&incr.inverse());

        let d_r_d_bias_gyro = ad_incr_inv * self.d_r_d_bias_gyro - jr * dt;

        let covariance = ad_incr_inv * self.covariance * ad_incr_inv.transpose()
            + jr * self.gyro_noise_covariance * jr.transpose() * dt;

        Ok(Self {
            delta_r: so3::normalized(&(self.delta_r * incr)),
            delta_t: self.delta_t + dt,
            d_r_d_bias_gyro,
            covariance: 0.5 * (covariance + covariance.transpose()),
            ..self.clone()
        })
    }

    /// Integrates a single angular-rate sample held for `dt` seconds.
    ///
    /// Non-positive durations are rejected and leave the state unchanged.
    pub fn integrate_measurement(&mut self, measured_omega: &Vector3<f64>, dt: f64) -> Result<()> {
        *self = self.propagate(measured_omega, dt)?;
        Ok(())
    }

    /// Integrates a timestamped stream.
    ///
    /// Each sample's rate is held from its timestamp to the next one, so the last
    /// sample only closes the interval. Returns the number of steps integrated.
    pub fn integrate_samples(&mut self, samples: &[GyroSample]) -> Result<usize> {
        let mut next = self.clone();
        let mut steps = 0;

        for pair in samples.windows(2) {
            let (prev, curr) = (&pair[0], &pair[1]);
            let dt = curr.timestamp_s - prev.timestamp_s;
            if !(dt > 0.0) {
                return Err(AhrsError::NonMonotonicTimestamp {
                    previous: prev.timestamp_s,
                    current: curr.timestamp_s,
                });
            }
            next.integrate_measurement(&prev.gyro, dt)?;
            steps += 1;
        }

        debug!(
            steps,
            delta_t = next.delta_t,
            angle = next.delta_r.angle(),
            "preintegrated gyro batch"
        );
        *self = next;
        Ok(steps)
    }

    pub fn delta_r(&self) -> &Rotation3<f64> {
        &self.delta_r
    }

    pub fn delta_t(&self) -> f64 {
        self.delta_t
    }

    pub fn bias_hat(&self) -> &ImuBias {
        &self.bias_hat
    }

    pub fn d_r_d_bias_gyro(&self) -> &Matrix3<f64> {
        &self.d_r_d_bias_gyro
    }

    pub fn covariance(&self) -> &Matrix3<f64> {
        &self.covariance
    }

    pub fn gyro_noise_covariance(&self) -> &Matrix3<f64> {
        &self.gyro_noise_covariance
    }

    pub fn initial_rotation_rate(&self) -> &Vector3<f64> {
        &self.initial_rotation_rate
    }
}
