//! Geometry utilities: SO(3) maps and Jacobians.

pub mod so3;
