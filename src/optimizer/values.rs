//! Variable keys and the container of current estimates.

use std::collections::HashMap;
use std::fmt;

use nalgebra::{DVectorView, Rotation3, Vector3, Vector6};

use crate::error::{AhrsError, Result};
use crate::geometry::so3;
use crate::imu::ImuBias;

/// Symbolic variable key: a type character and an index, e.g. `x1`, `b1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key {
    pub chr: char,
    pub index: u64,
}

impl Key {
    pub const fn new(chr: char, index: u64) -> Self {
        Self { chr, index }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.chr, self.index)
    }
}

/// Key of an attitude variable.
#[allow(non_snake_case)]
pub const fn X(index: u64) -> Key {
    Key::new('x', index)
}

/// Key of a bias variable.
#[allow(non_snake_case)]
pub const fn B(index: u64) -> Key {
    Key::new('b', index)
}

/// A single optimization variable.
#[derive(Debug, Clone, PartialEq)]
pub enum Variable {
    Rotation(Rotation3<f64>),
    Bias(ImuBias),
}

impl Variable {
    /// Tangent-space dimension.
    pub fn dim(&self) -> usize {
        match self {
            Variable::Rotation(_) => 3,
            Variable::Bias(_) => 6,
        }
    }

    /// Applies a tangent increment: `R · Exp(δ)` for rotations, addition for biases.
    pub fn retract(&self, delta: DVectorView<'_, f64>) -> Variable {
        match self {
            Variable::Rotation(rot) => {
                let phi = Vector3::new(delta[0], delta[1], delta[2]);
                Variable::Rotation(so3::normalized(&(rot * so3::exp(&phi))))
            }
            Variable::Bias(bias) => {
                let incr = Vector6::from_iterator(delta.iter().copied());
                Variable::Bias(bias.retract(&incr))
            }
        }
    }
}

/// Current estimates of all variables, indexed by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Values {
    values: HashMap<Key, Variable>,
}

impl Values {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: Key, value: Variable) -> Option<Variable> {
        self.values.insert(key, value)
    }

    pub fn insert_rotation(&mut self, key: Key, rot: Rotation3<f64>) -> Option<Variable> {
        self.insert(key, Variable::Rotation(rot))
    }

    pub fn insert_bias(&mut self, key: Key, bias: ImuBias) -> Option<Variable> {
        self.insert(key, Variable::Bias(bias))
    }

    pub fn get(&self, key: Key) -> Result<&Variable> {
        self.values.get(&key).ok_or(AhrsError::MissingKey(key))
    }

    pub fn rotation(&self, key: Key) -> Result<&Rotation3<f64>> {
        match self.get(key)? {
            Variable::Rotation(rot) => Ok(rot),
            _ => Err(AhrsError::WrongVariableType {
                key,
                expected: "rotation",
            }),
        }
    }

    pub fn bias(&self, key: Key) -> Result<&ImuBias> {
        match self.get(key)? {
            Variable::Bias(bias) => Ok(bias),
            _ => Err(AhrsError::WrongVariableType {
                key,
                expected: "bias",
            }),
        }
    }

    pub fn dim(&self, key: Key) -> Result<usize> {
        Ok(self.get(key)?.dim())
    }

    pub fn contains(&self, key: Key) -> bool {
        self.values.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Keys in sorted order, for a deterministic parameter layout.
    pub fn keys(&self) -> Vec<Key> {
        let mut keys: Vec<Key> = self.values.keys().copied().collect();
        keys.sort();
        keys
    }

    /// Replaces the value at `key` by its retraction along `delta`.
    pub fn retract(&mut self, key: Key, delta: DVectorView<'_, f64>) -> Result<()> {
        let updated = self.get(key)?.retract(delta);
        self.values.insert(key, updated);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::DVector;

    #[test]
    fn test_key_display_and_order() {
        assert_eq!(X(1).to_string(), "x1");
        assert_eq!(B(12).to_string(), "b12");
        assert!(B(5) < X(1));
        assert!(X(1) < X(2));
    }

    #[test]
    fn test_typed_lookup_errors() {
        let mut values = Values::new();
        values.insert_rotation(X(1), Rotation3::identity());
        values.insert_bias(B(1), ImuBias::zero());

        assert!(values.rotation(X(1)).is_ok());
        assert_eq!(values.bias(X(1)), Err(AhrsError::WrongVariableType { key: X(1), expected: "bias" }));
        assert_eq!(values.rotation(X(2)), Err(AhrsError::MissingKey(X(2))));
        assert_eq!(values.dim(B(1)), Ok(6));
        assert_eq!(values.keys(), vec![B(1), X(1)]);
    }

    #[test]
    fn test_retract_rotation_on_the_right() {
        let rot = so3::rot_rz_ry_rx(0.1, 0.2, 0.3);
        let mut values = Values::new();
        values.insert_rotation(X(1), rot);

        let delta = DVector::from_vec(vec![0.0, 0.0, 0.05]);
        values.retract(X(1), delta.rows(0, 3)).unwrap();

        let expected = rot * so3::exp(&Vector3::new(0.0, 0.0, 0.05));
        assert_relative_eq!(*values.rotation(X(1)).unwrap(), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_retract_bias_adds() {
        let mut values = Values::new();
        values.insert_bias(B(1), ImuBias::zero());

        let delta = DVector::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        values.retract(B(1), delta.rows(0, 6)).unwrap();

        let bias = values.bias(B(1)).unwrap();
        assert_eq!(bias.gyro, Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(bias.accel, Vector3::new(4.0, 5.0, 6.0));
    }
}
