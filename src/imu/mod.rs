//! Gyroscope preintegration for attitude estimation.
//!
//! - `GyroSample`, `ImuBias`, `GyroNoise`: raw readings and sensor parameters
//! - `PreintegratedRotation`: rotation-only preintegration between keyframes
//! - `BiasCorrectedRotation`: first-order re-linearization for a new bias

pub mod bias_correction;
pub mod preintegration;
pub mod sample;

pub use bias_correction::BiasCorrectedRotation;
pub use preintegration::PreintegratedRotation;
pub use sample::{GyroNoise, GyroSample, ImuBias};
