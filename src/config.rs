//! Runtime configuration for the attitude graph pipeline.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::optimizer::LevenbergMarquardtConfig;

/// Pipeline configuration, read from YAML. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Time between consecutive attitude keyframes (s).
    pub keyframe_interval_s: f64,
    /// Maximum number of keyframes in one graph.
    pub max_keyframes: usize,
    /// Earth rotation rate in the navigation frame (rad/s).
    pub omega_coriolis: Vector3<f64>,
    pub use_second_order_coriolis: bool,
    /// Prior standard deviation on the first attitude (rad).
    pub prior_sigma_rot: f64,
    /// Prior standard deviation on the bias (rad/s, m/s²).
    pub prior_sigma_bias: f64,
    pub optimizer: LevenbergMarquardtConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            keyframe_interval_s: 0.5,
            max_keyframes: 40,
            omega_coriolis: Vector3::zeros(),
            use_second_order_coriolis: false,
            prior_sigma_rot: 1e-3,
            prior_sigma_bias: 1e-2,
            optimizer: LevenbergMarquardtConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("Failed to open config {:?}", path))?;
        serde_yaml::from_reader(file).with_context(|| format!("Failed to parse config {:?}", path))
    }
}
