//! Tree nodes.
//!
//! A node is one mobilized body: its [`NodeBase`] (topology, frames, slots)
//! plus the joint that connects it to its parent. [`RigidBodyNodeSpec<M, N>`]
//! fixes the dof count at compile time so every per-node quantity lives in a
//! stack-allocated matrix; the tree stores nodes behind the object-safe
//! [`RigidBodyNode`] trait, which erases `N` once at construction.
//!
//! ```text
//!   Position   base → tip   X_FM, X_PB, X_GB, H_FM, H, Mk
//!   Velocity   base → tip   qdot, V_FM, V_PB_G, V_GB
//!   Dynamics   base → tip   HDot_FM, HDot, a, b
//!              tip → base   P, D, DI, G, tau_bar, psi
//!              base → tip   Y
//!   UDot       tip → base   z, epsilon, G epsilon
//!              base → tip   udot, A_GB, net hinge force
//! ```
//!
//! Each method reads its own slots plus already-realized parent (outward
//! passes) or children (inward passes) entries, and writes only its own.

mod articulated;
mod base;
mod operators;
mod spec;

pub use base::{BodySpec, NodeBase, SlotCounter};
pub use spec::RigidBodyNodeSpec;

use std::fmt;

use mbs_types::{MultibodyError, SpatialVec};
use nalgebra::Isometry3;

use crate::cache::{AccelerationCache, DynamicsCache, PositionCache, VelocityCache};
use crate::state::{DynamicsVars, InstanceVars, ModelVars, StateView, TimeVars};

/// Dof-erased interface the tree drives.
///
/// Every method has a no-op default, which is exactly the behavior of the
/// ground node. Mobilized nodes override all of them.
#[allow(clippy::too_many_arguments)]
pub trait RigidBodyNode: fmt::Debug + Send + Sync {
    /// Mobilizer-independent data.
    fn base(&self) -> &NodeBase;

    /// Mutable base, for wiring children while the tree is built.
    fn base_mut(&mut self) -> &mut NodeBase;

    /// Degrees of freedom.
    fn dof(&self) -> usize {
        self.base().dof()
    }

    // ===== Coordinate counts =====

    /// Coordinates in use.
    fn nq_in_use(&self, _model: &ModelVars) -> usize {
        0
    }

    /// Speeds in use.
    fn nu_in_use(&self, _model: &ModelVars) -> usize {
        0
    }

    /// Offset of a quaternion within this node's coordinates.
    fn is_using_quaternion(&self, _model: &ModelVars) -> Option<usize> {
        None
    }

    // ===== Default values =====

    /// Install Model-stage defaults.
    fn set_default_model_values(&self, _model: &mut ModelVars) {}
    /// Install Instance-stage defaults.
    fn set_default_instance_values(&self, _instance: &mut InstanceVars) {}
    /// Install Time-stage defaults.
    fn set_default_time_values(&self, _time: &mut TimeVars) {}
    /// Install default coordinates.
    fn set_default_position_values(&self, _model: &ModelVars, _q: &mut [f64]) {}
    /// Install default speeds.
    fn set_default_velocity_values(&self, _u: &mut [f64]) {}
    /// Install Dynamics-stage defaults.
    fn set_default_dynamics_values(&self, _dynamics: &mut DynamicsVars) {}
    /// Install Acceleration-stage defaults.
    fn set_default_acceleration_values(&self, _dynamics: &mut DynamicsVars) {}

    // ===== Realize =====

    /// Model-stage hook.
    fn realize_model(&self, _vars: &StateView<'_>) {}
    /// Instance-stage hook.
    fn realize_instance(&self, _vars: &StateView<'_>) {}
    /// Time-stage hook.
    fn realize_time(&self, _vars: &StateView<'_>) {}

    /// Transforms, Jacobians and inertias. Parent must already be realized.
    fn realize_position(&self, _vars: &StateView<'_>, _q_err: &mut [f64], _pc: &mut PositionCache) {
    }

    /// `qdot` and spatial velocities. Parent must already be realized.
    fn realize_velocity(
        &self,
        _vars: &StateView<'_>,
        _pc: &PositionCache,
        _qdot: &mut [f64],
        _vc: &mut VelocityCache,
    ) {
    }

    /// Jacobian derivatives and velocity-dependent bias terms.
    fn realize_dynamics(
        &self,
        _vars: &StateView<'_>,
        _pc: &PositionCache,
        _vc: &VelocityCache,
        _dc: &mut DynamicsCache,
    ) {
    }

    /// Acceleration-stage hook.
    fn realize_acceleration(&self, _vars: &StateView<'_>) {}
    /// Report-stage hook.
    fn realize_report(&self, _vars: &StateView<'_>) {}

    // ===== Articulated-body method =====

    /// Compose `P` from this body's spatial inertia and its children's
    /// articulated inertias, then derive `D`, `DI`, `G`, `tau_bar`, `psi`.
    fn calc_articulated_body_inertias_inward(
        &self,
        _pc: &PositionCache,
        _dc: &mut DynamicsCache,
    ) -> Result<(), MultibodyError> {
        Ok(())
    }

    /// `Y = H DI Hᵀ + psiᵀ Y_P psi`, the articulated response of this body
    /// to a unit spatial force on it. Parent must be done.
    fn calc_y_outward(&self, _pc: &PositionCache, _dc: &mut DynamicsCache) {}

    /// Inward sweep of forward dynamics.
    fn calc_udot_pass1_inward(
        &self,
        _pc: &PositionCache,
        _dc: &DynamicsCache,
        _joint_forces: &[f64],
        _body_forces: &[SpatialVec],
        _ac: &mut AccelerationCache,
    ) {
    }

    /// Outward sweep of forward dynamics.
    fn calc_udot_pass2_outward(
        &self,
        _pc: &PositionCache,
        _dc: &DynamicsCache,
        _ac: &mut AccelerationCache,
        _udot: &mut [f64],
    ) {
    }

    /// Inward sweep of `M⁻¹ f`.
    fn calc_m_inverse_f_pass1_inward(
        &self,
        _pc: &PositionCache,
        _dc: &DynamicsCache,
        _f: &[f64],
        _scratch: &mut AccelerationCache,
    ) {
    }

    /// Outward sweep of `M⁻¹ f`.
    fn calc_m_inverse_f_pass2_outward(
        &self,
        _pc: &PositionCache,
        _dc: &DynamicsCache,
        _scratch: &mut AccelerationCache,
        _udot: &mut [f64],
    ) {
    }

    // ===== Inverse dynamics and Jacobian products =====

    /// Outward sweep of `M a`: `A_GB = phiᵀ A_GP + H udot`.
    fn calc_ma_pass1_outward(&self, _pc: &PositionCache, _udot: &[f64], _a_gb: &mut [SpatialVec]) {}

    /// Inward sweep of `M a`: `F = Mk A_GB + Σ phi_c F_c`, `tau = Hᵀ F`.
    fn calc_ma_pass2_inward(
        &self,
        _pc: &PositionCache,
        _a_gb: &[SpatialVec],
        _f_gb: &mut [SpatialVec],
        _tau: &mut [f64],
    ) {
    }

    /// Outward sweep of inverse dynamics (includes the Coriolis term).
    fn calc_inverse_dynamics_pass1_outward(
        &self,
        _pc: &PositionCache,
        _dc: &DynamicsCache,
        _udot: &[f64],
        _a_gb: &mut [SpatialVec],
    ) {
    }

    /// Inward sweep of inverse dynamics.
    fn calc_inverse_dynamics_pass2_inward(
        &self,
        _pc: &PositionCache,
        _dc: &DynamicsCache,
        _joint_forces: &[f64],
        _body_forces: &[SpatialVec],
        _a_gb: &[SpatialVec],
        _f_gb: &mut [SpatialVec],
        _tau: &mut [f64],
    ) {
    }

    /// `Jᵀ F` for spatial forces applied to bodies.
    fn calc_equivalent_joint_forces(
        &self,
        _pc: &PositionCache,
        _body_forces: &[SpatialVec],
        _all_z: &mut [SpatialVec],
        _joint_forces: &mut [f64],
    ) {
    }

    /// `J v`: spatial velocities produced by speeds `v`.
    fn calc_spatial_kinematics_from_internal(
        &self,
        _pc: &PositionCache,
        _v: &[f64],
        _jv: &mut [SpatialVec],
    ) {
    }

    /// `Jᵀ X`: generalized gradient of a spatial quantity.
    fn calc_internal_gradient_from_spatial(
        &self,
        _pc: &PositionCache,
        _x: &[SpatialVec],
        _all_z: &mut [SpatialVec],
        _jx: &mut [f64],
    ) {
    }

    /// Speeds best reproducing the ground spatial velocity `s_vel` of this body.
    fn set_vel_from_svel(
        &self,
        _pc: &PositionCache,
        _vc: &VelocityCache,
        _s_vel: &SpatialVec,
        _u: &mut [f64],
    ) {
    }

    // ===== Coordinates =====

    /// `qdotdot` from `udot`.
    fn calc_qdotdot(
        &self,
        _vars: &StateView<'_>,
        _pc: &PositionCache,
        _udot: &[f64],
        _qdotdot: &mut [f64],
    ) {
    }

    /// `N * input` on this node's slots (global arrays).
    fn multiply_by_n(
        &self,
        _vars: &StateView<'_>,
        _pc: &PositionCache,
        _matrix_on_right: bool,
        _input: &[f64],
        _out: &mut [f64],
    ) {
    }

    /// `N⁻¹ * input` on this node's slots (global arrays).
    fn multiply_by_n_inv(
        &self,
        _vars: &StateView<'_>,
        _pc: &PositionCache,
        _matrix_on_right: bool,
        _input: &[f64],
        _out: &mut [f64],
    ) {
    }

    /// Renormalize quaternions; `true` if `q` changed.
    fn enforce_quaternion_constraints(&self, _model: &ModelVars, _q: &mut [f64]) -> bool {
        false
    }

    /// Fit coordinates to an as-defined across-joint transform.
    fn set_q_to_fit_transform(&self, _model: &ModelVars, _x_f0m0: &Isometry3<f64>, _q: &mut [f64]) {
    }

    /// Fit speeds to the across-joint velocity in use, `V_FM`. Reversed
    /// nodes read `X_FM` from `pc`.
    fn set_u_to_fit_velocity(
        &self,
        _q: &[f64],
        _pc: &PositionCache,
        _v_fm: &SpatialVec,
        _u: &mut [f64],
    ) {
    }

    /// Copy this node's coordinates in use from `q_in` into `q`.
    fn copy_q(&self, _model: &ModelVars, _q_in: &[f64], _q: &mut [f64]) {}

    /// Copy this node's speeds from `u_in` into `u`.
    fn copy_u(&self, _u_in: &[f64], _u: &mut [f64]) {}

    /// Quaternion coordinates in `q_in` to Euler angles in `q`.
    fn convert_to_euler_angles(&self, _q_in: &[f64], _q: &mut [f64]) {}

    /// Euler-angle coordinates in `q_in` to quaternions in `q`.
    fn convert_to_quaternions(&self, _q_in: &[f64], _q: &mut [f64]) {}
}

/// Body 0. Never moves and has no slots.
#[derive(Debug, Clone)]
pub struct GroundNode {
    base: NodeBase,
}

impl GroundNode {
    /// The ground node.
    #[must_use]
    pub fn new() -> Self {
        Self {
            base: NodeBase::ground(),
        }
    }
}

impl Default for GroundNode {
    fn default() -> Self {
        Self::new()
    }
}

impl RigidBodyNode for GroundNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }
}
