//! Configuration for multibody dynamics.
//!
//! Controls the uniform gravity field applied at the Acceleration stage and
//! the default rotation parameterization of quaternion mobilizers.

use nalgebra::Vector3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Standard gravitational acceleration (m/s²).
pub const STANDARD_GRAVITY: f64 = 9.81;

/// Dynamics configuration shared by every state of a tree.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DynamicsConfig {
    /// Uniform gravitational acceleration in ground (m/s²).
    pub gravity: Vector3<f64>,
    /// Whether quaternion mobilizers start out using Euler angles.
    pub use_euler_angles: bool,
}

impl Default for DynamicsConfig {
    fn default() -> Self {
        Self {
            gravity: Vector3::new(0.0, 0.0, -STANDARD_GRAVITY),
            use_euler_angles: false,
        }
    }
}

impl DynamicsConfig {
    /// Set the gravity vector.
    #[must_use]
    pub fn with_gravity(mut self, gravity: Vector3<f64>) -> Self {
        self.gravity = gravity;
        self
    }

    /// Disable gravity (zero-G environment).
    #[must_use]
    pub fn zero_gravity(mut self) -> Self {
        self.gravity = Vector3::zeros();
        self
    }

    /// Start quaternion mobilizers in Euler-angle mode.
    #[must_use]
    pub fn with_euler_angles(mut self) -> Self {
        self.use_euler_angles = true;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if !self.gravity.iter().all(|g| g.is_finite()) {
            return Err(crate::MultibodyError::invalid_config(
                "gravity must be finite",
            ));
        }
        Ok(())
    }
}
