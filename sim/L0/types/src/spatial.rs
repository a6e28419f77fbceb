//! Spatial algebra for 6D motion and force vectors.
//!
//! Every spatial quantity is laid out `[angular (3), linear (3)]`:
//! - Motion vectors: `[ω, v]` (angular velocity, linear velocity of a point)
//! - Force vectors: `[τ, f]` (moment about a point, force)
//!
//! Joint Jacobians follow the same layout with one column per generalized
//! speed, so `H * u` is a spatial velocity.

use nalgebra::{Matrix3, Matrix6, Rotation3, SMatrix, Vector3, Vector6};

/// 6D spatial vector: `[angular (3), linear (3)]`.
pub type SpatialVec = Vector6<f64>;

/// 6×6 spatial matrix (spatial inertias, articulated inertias, projectors).
pub type SpatialMat = Matrix6<f64>;

/// Velocity Jacobian of an `N`-dof mobilizer: 6 rows, one column per speed.
///
/// Rows 0-2 are angular, rows 3-5 linear. This is the transpose of the
/// `N×6` layout used by Jain and Featherstone.
pub type HType<const N: usize> = SMatrix<f64, 6, N>;

/// Build a spatial vector from its angular and linear halves.
#[inline]
#[must_use]
pub fn spatial_vec(angular: &Vector3<f64>, linear: &Vector3<f64>) -> SpatialVec {
    SpatialVec::new(
        angular.x, angular.y, angular.z, linear.x, linear.y, linear.z,
    )
}

/// Angular half of a spatial vector.
#[inline]
#[must_use]
pub fn angular(v: &SpatialVec) -> Vector3<f64> {
    Vector3::new(v[0], v[1], v[2])
}

/// Linear half of a spatial vector.
#[inline]
#[must_use]
pub fn linear(v: &SpatialVec) -> Vector3<f64> {
    Vector3::new(v[3], v[4], v[5])
}

/// Re-express a spatial vector in another frame (both halves rotated).
#[inline]
#[must_use]
pub fn rotate_spatial(r: &Rotation3<f64>, v: &SpatialVec) -> SpatialVec {
    spatial_vec(&(r * angular(v)), &(r * linear(v)))
}

/// Spatial cross product for motion vectors: `v × s`.
#[inline]
#[must_use]
pub fn spatial_cross_motion(v: &SpatialVec, s: &SpatialVec) -> SpatialVec {
    let w = angular(v);
    let v_lin = linear(v);
    let s_ang = angular(s);
    let s_lin = linear(s);
    spatial_vec(&w.cross(&s_ang), &(w.cross(&s_lin) + v_lin.cross(&s_ang)))
}

/// Spatial cross product for force vectors: `v ×* f`.
#[inline]
#[must_use]
pub fn spatial_cross_force(v: &SpatialVec, f: &SpatialVec) -> SpatialVec {
    let w = angular(v);
    let v_lin = linear(v);
    let f_ang = angular(f);
    let f_lin = linear(f);
    spatial_vec(&(w.cross(&f_ang) + v_lin.cross(&f_lin)), &w.cross(&f_lin))
}

/// Spatial inertia about a body origin, expressed in the frame of its inputs.
///
/// - `mass`: body mass
/// - `com`: center of mass measured from the body origin
/// - `inertia_about_origin`: rotational inertia about the body origin
///
/// ```text
/// Mk = [ I_O       m*[c]× ]
///      [ -m*[c]×   m*1    ]
/// ```
#[must_use]
pub fn spatial_inertia(
    mass: f64,
    com: &Vector3<f64>,
    inertia_about_origin: &Matrix3<f64>,
) -> SpatialMat {
    let mc = (com * mass).cross_matrix();
    let mut mk = SpatialMat::zeros();
    mk.fixed_view_mut::<3, 3>(0, 0).copy_from(inertia_about_origin);
    mk.fixed_view_mut::<3, 3>(0, 3).copy_from(&mc);
    mk.fixed_view_mut::<3, 3>(3, 0).copy_from(&(-mc));
    mk.fixed_view_mut::<3, 3>(3, 3)
        .copy_from(&(Matrix3::identity() * mass));
    mk
}

/// Rigid-body shift operator between a parent origin and a child origin.
///
/// Stores `l = p_child - p_parent`, expressed in ground. Applying `phi` to a
/// force moves it from the child origin inward to the parent origin; applying
/// `phiᵀ` to a motion vector moves it outward from the parent to the child.
///
/// ```text
/// phi  = [ 1  [l]× ]      phi * F  = [τ + l × f; f]
///        [ 0   1   ]      phiᵀ * A = [ω; v + ω × l]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PhiMatrix {
    l: Vector3<f64>,
}

impl PhiMatrix {
    /// Shift operator for the given parent-to-child origin offset.
    #[must_use]
    pub const fn new(l: Vector3<f64>) -> Self {
        Self { l }
    }

    /// Parent-to-child origin offset.
    #[must_use]
    pub fn l(&self) -> &Vector3<f64> {
        &self.l
    }

    /// `phi * F`: move a spatial force from the child origin to the parent's.
    #[inline]
    #[must_use]
    pub fn shift_force(&self, f: &SpatialVec) -> SpatialVec {
        let force = linear(f);
        spatial_vec(&(angular(f) + self.l.cross(&force)), &force)
    }

    /// `phiᵀ * A`: move a motion vector from the parent origin to the child's.
    #[inline]
    #[must_use]
    pub fn transpose_shift_motion(&self, a: &SpatialVec) -> SpatialVec {
        let w = angular(a);
        spatial_vec(&w, &(linear(a) + w.cross(&self.l)))
    }

    /// Dense 6×6 form of `phi`.
    #[must_use]
    pub fn to_matrix(&self) -> SpatialMat {
        let mut m = SpatialMat::identity();
        m.fixed_view_mut::<3, 3>(0, 3)
            .copy_from(&self.l.cross_matrix());
        m
    }

    /// `phi * M * phiᵀ` for a 6×6 inertia-like matrix.
    #[must_use]
    pub fn shift_inertia(&self, m: &SpatialMat) -> SpatialMat {
        let phi = self.to_matrix();
        phi * m * phi.transpose()
    }
}
