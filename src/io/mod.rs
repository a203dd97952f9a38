//! Dataset loaders.

pub mod euroc;

pub use euroc::{EurocImuDataset, GroundTruthEntry, ImuCalibration};
