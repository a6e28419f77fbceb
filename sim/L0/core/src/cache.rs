//! Stage caches.
//!
//! One flat array per quantity, owned by the state rather than the nodes.
//! Per-body entries are indexed by body number (ground is 0), per-coordinate
//! entries by `q_index`, per-speed entries by `u_index` and per-speed-squared
//! entries by `u_sq_index`. 6×N Jacobians are stored column by column in
//! per-speed `SpatialVec` arrays.

use mbs_types::{PhiMatrix, SpatialMat, SpatialVec};
use nalgebra::{Isometry3, Matrix3, Vector3};

/// Results of the Position stage.
#[derive(Debug, Clone, Default)]
pub struct PositionCache {
    /// Sine of each coordinate (nq).
    pub sq: Vec<f64>,
    /// Cosine of each coordinate (nq).
    pub cq: Vec<f64>,
    /// Normalized coordinates; only quaternion slots are meaningful (nq).
    pub qnorm: Vec<f64>,

    /// Across-joint transform in use, `X_FM` (per body).
    pub x_fm: Vec<Isometry3<f64>>,
    /// Parent-to-body transform, `X_PB`.
    pub x_pb: Vec<Isometry3<f64>>,
    /// Ground-to-body transform, `X_GB`.
    pub x_gb: Vec<Isometry3<f64>>,
    /// Shift from the parent origin to this body's origin, in ground.
    pub phi: Vec<PhiMatrix>,
    /// Center of mass offset from the body origin, in ground.
    pub com_g: Vec<Vector3<f64>>,
    /// Rotational inertia about the body origin, in ground.
    pub inertia_ob_g: Vec<Matrix3<f64>>,
    /// Spatial inertia about the body origin, in ground.
    pub mk: Vec<SpatialMat>,

    /// Columns of `H_FM` (nu).
    pub h_fm: Vec<SpatialVec>,
    /// Columns of `H_PB_G`, the parent-to-body Jacobian in ground (nu).
    pub h: Vec<SpatialVec>,
}

impl PositionCache {
    /// Allocate for `nb` bodies, `nq` coordinates and `nu` speeds.
    #[must_use]
    pub fn allocate(nb: usize, nq: usize, nu: usize) -> Self {
        Self {
            sq: vec![0.0; nq],
            cq: vec![1.0; nq],
            qnorm: vec![0.0; nq],
            x_fm: vec![Isometry3::identity(); nb],
            x_pb: vec![Isometry3::identity(); nb],
            x_gb: vec![Isometry3::identity(); nb],
            phi: vec![PhiMatrix::default(); nb],
            com_g: vec![Vector3::zeros(); nb],
            inertia_ob_g: vec![Matrix3::zeros(); nb],
            mk: vec![SpatialMat::zeros(); nb],
            h_fm: vec![SpatialVec::zeros(); nu],
            h: vec![SpatialVec::zeros(); nu],
        }
    }
}

/// Results of the Velocity stage.
#[derive(Debug, Clone, Default)]
pub struct VelocityCache {
    /// Across-joint velocity `V_FM`, in F (per body).
    pub v_fm: Vec<SpatialVec>,
    /// Velocity of the body relative to its parent, in ground.
    pub v_pb_g: Vec<SpatialVec>,
    /// Spatial velocity of the body origin in ground.
    pub v_gb: Vec<SpatialVec>,
}

impl VelocityCache {
    /// Allocate for `nb` bodies.
    #[must_use]
    pub fn allocate(nb: usize) -> Self {
        Self {
            v_fm: vec![SpatialVec::zeros(); nb],
            v_pb_g: vec![SpatialVec::zeros(); nb],
            v_gb: vec![SpatialVec::zeros(); nb],
        }
    }
}

/// Results of the Dynamics stage, including the articulated-body inertias.
#[derive(Debug, Clone, Default)]
pub struct DynamicsCache {
    /// Columns of `HDot_FM` (nu).
    pub hdot_fm: Vec<SpatialVec>,
    /// Columns of `HDot_PB_G` (nu).
    pub hdot: Vec<SpatialVec>,
    /// Columns of the gain `G = P H D⁻¹` (nu).
    pub g: Vec<SpatialVec>,
    /// `D = Hᵀ P H`, column-major per body (nusq).
    pub d: Vec<f64>,
    /// `D⁻¹`, column-major per body (nusq).
    pub di: Vec<f64>,

    /// `HDot_PB_G * u` (per body).
    pub vd_pb_g: Vec<SpatialVec>,
    /// Coriolis acceleration `a`.
    pub coriolis: Vec<SpatialVec>,
    /// Gyroscopic force `b`.
    pub gyroscopic: Vec<SpatialVec>,
    /// `P a + b`.
    pub centrifugal: Vec<SpatialVec>,
    /// Articulated-body inertia `P`.
    pub p: Vec<SpatialMat>,
    /// `1 - G Hᵀ`.
    pub tau_bar: Vec<SpatialMat>,
    /// `phi * tau_bar`.
    pub psi: Vec<SpatialMat>,
    /// Spatial acceleration of each body per unit spatial force applied to
    /// it, `J_b M⁻¹ J_bᵀ`.
    pub y: Vec<SpatialMat>,
}

impl DynamicsCache {
    /// Allocate for `nb` bodies, `nu` speeds and `nusq` squared-speed slots.
    #[must_use]
    pub fn allocate(nb: usize, nu: usize, nusq: usize) -> Self {
        Self {
            hdot_fm: vec![SpatialVec::zeros(); nu],
            hdot: vec![SpatialVec::zeros(); nu],
            g: vec![SpatialVec::zeros(); nu],
            d: vec![0.0; nusq],
            di: vec![0.0; nusq],
            vd_pb_g: vec![SpatialVec::zeros(); nb],
            coriolis: vec![SpatialVec::zeros(); nb],
            gyroscopic: vec![SpatialVec::zeros(); nb],
            centrifugal: vec![SpatialVec::zeros(); nb],
            p: vec![SpatialMat::zeros(); nb],
            tau_bar: vec![SpatialMat::identity(); nb],
            psi: vec![SpatialMat::zeros(); nb],
            y: vec![SpatialMat::zeros(); nb],
        }
    }
}

/// Results of forward dynamics.
#[derive(Debug, Clone, Default)]
pub struct AccelerationCache {
    /// Spatial acceleration of each body origin in ground.
    pub a_gb: Vec<SpatialVec>,
    /// Articulated residual force `z` per body.
    pub z: Vec<SpatialVec>,
    /// `G * epsilon` per body.
    pub g_epsilon: Vec<SpatialVec>,
    /// Residual generalized force `epsilon` (nu).
    pub epsilon: Vec<f64>,
    /// `D⁻¹ * epsilon` (nu).
    pub nu: Vec<f64>,
    /// Net hinge force `D * udot` (nu).
    pub net_hinge_force: Vec<f64>,
}

impl AccelerationCache {
    /// Allocate for `nb` bodies and `nu` speeds.
    #[must_use]
    pub fn allocate(nb: usize, nu: usize) -> Self {
        Self {
            a_gb: vec![SpatialVec::zeros(); nb],
            z: vec![SpatialVec::zeros(); nb],
            g_epsilon: vec![SpatialVec::zeros(); nb],
            epsilon: vec![0.0; nu],
            nu: vec![0.0; nu],
            net_hinge_force: vec![0.0; nu],
        }
    }
}
