//! Rigid-body mass properties.

use nalgebra::{Matrix3, Rotation3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::spatial::{SpatialMat, spatial_inertia};

/// Mass properties of a rigid body.
///
/// Contains mass, center of mass offset, and inertia tensor.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MassProperties {
    /// Total mass in kg.
    pub mass: f64,
    /// Center of mass offset from body origin in body coordinates.
    pub center_of_mass: Vector3<f64>,
    /// Inertia tensor about center of mass in body coordinates (kg·m²).
    pub inertia: Matrix3<f64>,
}

impl Default for MassProperties {
    fn default() -> Self {
        Self::point_mass(1.0)
    }
}

impl MassProperties {
    /// Create mass properties with given values.
    ///
    /// # Arguments
    ///
    /// * `mass` - Total mass (must be positive)
    /// * `center_of_mass` - COM offset from body origin
    /// * `inertia` - Inertia tensor about COM
    #[must_use]
    pub const fn new(mass: f64, center_of_mass: Vector3<f64>, inertia: Matrix3<f64>) -> Self {
        Self {
            mass,
            center_of_mass,
            inertia,
        }
    }

    /// Create mass properties for a point mass at the origin.
    #[must_use]
    pub fn point_mass(mass: f64) -> Self {
        Self {
            mass,
            center_of_mass: Vector3::zeros(),
            inertia: Matrix3::zeros(),
        }
    }

    /// Create mass properties for a uniform sphere.
    ///
    /// Inertia of a solid sphere: I = (2/5) * m * r²
    #[must_use]
    pub fn sphere(mass: f64, radius: f64) -> Self {
        let i = 0.4 * mass * radius * radius;
        Self {
            mass,
            center_of_mass: Vector3::zeros(),
            inertia: Matrix3::from_diagonal(&Vector3::new(i, i, i)),
        }
    }

    /// Create mass properties for a uniform box.
    ///
    /// Inertia of a solid box with dimensions (x, y, z):
    /// - Ixx = (1/12) * m * (y² + z²)
    /// - Iyy = (1/12) * m * (x² + z²)
    /// - Izz = (1/12) * m * (x² + y²)
    #[must_use]
    pub fn box_shape(mass: f64, half_extents: Vector3<f64>) -> Self {
        let x2 = 4.0 * half_extents.x * half_extents.x;
        let y2 = 4.0 * half_extents.y * half_extents.y;
        let z2 = 4.0 * half_extents.z * half_extents.z;

        Self {
            mass,
            center_of_mass: Vector3::zeros(),
            inertia: Matrix3::from_diagonal(&Vector3::new(
                mass * (y2 + z2) / 12.0,
                mass * (x2 + z2) / 12.0,
                mass * (x2 + y2) / 12.0,
            )),
        }
    }

    /// Same properties with the center of mass moved to `offset`.
    #[must_use]
    pub fn with_center_of_mass(mut self, offset: Vector3<f64>) -> Self {
        self.center_of_mass = offset;
        self
    }

    /// Inertia about the body origin (parallel-axis theorem), body frame.
    #[must_use]
    pub fn inertia_about_origin(&self) -> Matrix3<f64> {
        let c = &self.center_of_mass;
        self.inertia + (Matrix3::identity() * c.norm_squared() - c * c.transpose()) * self.mass
    }

    /// Center of mass and origin inertia re-expressed by `r_gb`.
    ///
    /// Returns `(com_G, I_OB_G)`: the COM offset from the body origin and the
    /// inertia about the body origin, both in the rotated frame.
    #[must_use]
    pub fn reexpress(&self, r_gb: &Rotation3<f64>) -> (Vector3<f64>, Matrix3<f64>) {
        let r = r_gb.matrix();
        (
            r_gb * self.center_of_mass,
            r * self.inertia_about_origin() * r.transpose(),
        )
    }

    /// Spatial inertia about the body origin, expressed in the frame reached by `r_gb`.
    #[must_use]
    pub fn spatial_inertia_in(&self, r_gb: &Rotation3<f64>) -> SpatialMat {
        let (com, inertia) = self.reexpress(r_gb);
        spatial_inertia(self.mass, &com, &inertia)
    }

    /// Validate that the mass properties are physically valid.
    ///
    /// A movable body needs strictly positive, finite mass.
    pub fn validate(&self) -> crate::Result<()> {
        if !self.mass.is_finite() {
            return Err(crate::MultibodyError::invalid_mass("mass must be finite"));
        }

        if self.mass <= 0.0 {
            return Err(crate::MultibodyError::invalid_mass(
                "mass must be positive",
            ));
        }

        if !self.center_of_mass.iter().all(|x| x.is_finite()) {
            return Err(crate::MultibodyError::invalid_mass(
                "center of mass must be finite",
            ));
        }

        // Eigenvalues should be non-negative for physical inertia
        let eigenvalues = self.inertia.symmetric_eigenvalues();
        if eigenvalues.iter().any(|&e| e < -1e-10) {
            return Err(crate::MultibodyError::invalid_mass(
                "inertia tensor must be positive semi-definite",
            ));
        }

        Ok(())
    }
}
