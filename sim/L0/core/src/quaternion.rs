//! Quaternion coordinates for rotational mobilizers.
//!
//! Quaternions are stored `[w, x, y, z]` in four consecutive coordinate
//! slots and describe `R_FM`. Their rates use the angular velocity `w_FM`
//! expressed in F:
//!
//! ```text
//! qdot = ½ (0, ω) ⊗ q = ½ E(q) ω,    E(q) = [ -vᵀ ; w·1 - [v]× ]
//! ```
//!
//! For a unit quaternion `Eᵀ E = 1`, so `ω = 2 E(q)ᵀ qdot`.

use nalgebra::{Quaternion, SMatrix, UnitQuaternion, Vector3, Vector4};

/// Renormalization beyond this relative error is logged.
const LARGE_NORM_ERROR: f64 = 1e-3;

/// Unit quaternion from stored coordinates, normalizing on the way.
///
/// A zero or non-finite quaternion maps to the identity.
#[must_use]
pub fn unit_quaternion(q: &Vector4<f64>) -> UnitQuaternion<f64> {
    let quat = Quaternion::new(q[0], q[1], q[2], q[3]);
    let norm = quat.norm();
    if norm.is_finite() && norm > 0.0 {
        UnitQuaternion::new_unchecked(quat / norm)
    } else {
        UnitQuaternion::identity()
    }
}

/// Stored coordinates `[w, x, y, z]` of a rotation, with `w >= 0`.
#[must_use]
pub fn quaternion_coords(r: &UnitQuaternion<f64>) -> Vector4<f64> {
    let q = r.quaternion();
    let sign = if q.w < 0.0 { -1.0 } else { 1.0 };
    Vector4::new(q.w, q.i, q.j, q.k) * sign
}

/// `|q| - 1`.
#[must_use]
pub fn quaternion_error(q: &[f64]) -> f64 {
    q[..4].iter().map(|x| x * x).sum::<f64>().sqrt() - 1.0
}

/// Scale the four coordinates in `q` to unit length.
///
/// Returns `true` if anything changed. Degenerate input (zero or non-finite)
/// is reset to the identity rotation.
#[allow(clippy::float_cmp)]
pub fn normalize_quaternion(q: &mut [f64]) -> bool {
    let norm = q[..4].iter().map(|x| x * x).sum::<f64>().sqrt();
    if !norm.is_finite() || norm == 0.0 {
        tracing::warn!(?norm, "degenerate quaternion reset to identity");
        q[..4].copy_from_slice(&[1.0, 0.0, 0.0, 0.0]);
        return true;
    }
    if norm == 1.0 {
        return false;
    }
    if (norm - 1.0).abs() > LARGE_NORM_ERROR {
        tracing::debug!(norm, "renormalizing quaternion far from unit length");
    }
    for x in &mut q[..4] {
        *x /= norm;
    }
    true
}

/// `E(q)`, the 4×3 map from angular velocity to `2 qdot`.
#[must_use]
pub fn quaternion_rate_matrix(q: &Vector4<f64>) -> SMatrix<f64, 4, 3> {
    let (w, v) = (q[0], Vector3::new(q[1], q[2], q[3]));
    let lower = SMatrix::<f64, 3, 3>::identity() * w - v.cross_matrix();
    let mut e = SMatrix::<f64, 4, 3>::zeros();
    e.fixed_view_mut::<1, 3>(0, 0).copy_from(&(-v.transpose()));
    e.fixed_view_mut::<3, 3>(1, 0).copy_from(&lower);
    e
}

/// `qdot = ½ E(q) ω`.
#[must_use]
pub fn quaternion_rate(q: &Vector4<f64>, w_fm: &Vector3<f64>) -> Vector4<f64> {
    quaternion_rate_matrix(q) * w_fm * 0.5
}
