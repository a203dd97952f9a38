pub mod config;
pub mod error;
pub mod geometry;
pub mod imu;
pub mod io;
pub mod optimizer;

pub use error::{AhrsError, Result};
