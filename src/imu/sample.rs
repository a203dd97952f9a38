use nalgebra::{Matrix3, Vector3, Vector6};
use serde::{Deserialize, Serialize};

/// Gyroscope noise parameters (continuous-time densities).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GyroNoise {
    /// White noise density (rad/s/√Hz).
    pub noise_density: f64,
    /// Bias random walk (rad/s²/√Hz).
    pub random_walk: f64,
}

impl GyroNoise {
    pub fn new(noise_density: f64, random_walk: f64) -> Self {
        Self {
            noise_density,
            random_walk,
        }
    }

    /// Per-sample noise covariance Σ_gyro fed to the preintegrator.
    pub fn covariance(&self) -> Matrix3<f64> {
        Matrix3::identity() * (self.noise_density * self.noise_density)
    }
}

impl Default for GyroNoise {
    fn default() -> Self {
        // EuRoC ADIS16448 datasheet values
        Self {
            noise_density: 1.6968e-4,
            random_walk: 1.9393e-5,
        }
    }
}

/// IMU biases.
///
/// Only the gyroscope half is used by rotation preintegration; the accelerometer
/// half keeps the bias variable in its usual 6-DOF shape. Tangent vectors are
/// ordered `[gyro, accel]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ImuBias {
    pub gyro: Vector3<f64>,
    pub accel: Vector3<f64>,
}

impl ImuBias {
    pub fn new(gyro: Vector3<f64>, accel: Vector3<f64>) -> Self {
        Self { gyro, accel }
    }

    pub fn zero() -> Self {
        Self {
            gyro: Vector3::zeros(),
            accel: Vector3::zeros(),
        }
    }

    pub fn from_gyro(gyro: Vector3<f64>) -> Self {
        Self {
            gyro,
            accel: Vector3::zeros(),
        }
    }

    pub fn to_vector(&self) -> Vector6<f64> {
        Vector6::new(
            self.gyro.x,
            self.gyro.y,
            self.gyro.z,
            self.accel.x,
            self.accel.y,
            self.accel.z,
        )
    }

    /// Bias moved by a tangent increment `[δgyro, δaccel]`.
    pub fn retract(&self, delta: &Vector6<f64>) -> Self {
        Self {
            gyro: self.gyro + delta.fixed_rows::<3>(0),
            accel: self.accel + delta.fixed_rows::<3>(3),
        }
    }

    /// Tangent increment taking `self` to `other`.
    pub fn local(&self, other: &ImuBias) -> Vector6<f64> {
        other.to_vector() - self.to_vector()
    }
}

/// Single timestamped gyroscope reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GyroSample {
    pub timestamp_s: f64,
    /// Angular velocity in the sensor frame (rad/s).
    pub gyro: Vector3<f64>,
}

impl GyroSample {
    pub fn new(timestamp_s: f64, gyro: Vector3<f64>) -> Self {
        Self { timestamp_s, gyro }
    }
}
