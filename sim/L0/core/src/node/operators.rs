//! Inverse dynamics, `M a`, and products with the system Jacobian.
//!
//! None of these need the articulated inertias; `M a` and the Jacobian
//! products need only the Position stage, inverse dynamics also the
//! velocity-dependent terms of the Dynamics stage.

use mbs_types::SpatialVec;

use super::RigidBodyNodeSpec;
use crate::cache::{DynamicsCache, PositionCache};
use crate::mobilizer::Mobilizer;

impl<M: Mobilizer<N>, const N: usize> RigidBodyNodeSpec<M, N> {
    /// `A_GB = phiᵀ A_GP + H udot`.
    pub(super) fn ma_pass1_outward(
        &self,
        pc: &PositionCache,
        udot: &[f64],
        a_gb: &mut [SpatialVec],
    ) {
        let b = self.base.node_num();
        let alpha = self
            .base
            .get_phi(pc)
            .transpose_shift_motion(&a_gb[self.base.parent()]);
        a_gb[b] = alpha + self.get_h(pc) * self.base.from_u::<N>(udot);
    }

    /// `F = Mk A_GB + Σ_c phi_c F_c`, `tau = Hᵀ F`.
    pub(super) fn ma_pass2_inward(
        &self,
        pc: &PositionCache,
        a_gb: &[SpatialVec],
        f_gb: &mut [SpatialVec],
        tau: &mut [f64],
    ) {
        let b = self.base.node_num();
        let f = self.base.get_mk(pc) * a_gb[b] + self.children_forces(pc, f_gb);
        f_gb[b] = f;
        self.base.to_u(tau, &(self.get_h(pc).transpose() * f));
    }

    /// `A_GB = phiᵀ A_GP + H udot + a`.
    pub(super) fn inverse_dynamics_pass1_outward(
        &self,
        pc: &PositionCache,
        dc: &DynamicsCache,
        udot: &[f64],
        a_gb: &mut [SpatialVec],
    ) {
        self.ma_pass1_outward(pc, udot, a_gb);
        a_gb[self.base.node_num()] += dc.coriolis[self.base.node_num()];
    }

    /// `F = Mk A_GB + b - F_body + Σ_c phi_c F_c`, `tau = Hᵀ F - tau_applied`.
    ///
    /// `tau` is the generalized force still needed, on top of the applied
    /// `joint_forces`, to produce the given accelerations.
    #[allow(clippy::too_many_arguments)]
    pub(super) fn inverse_dynamics_pass2_inward(
        &self,
        pc: &PositionCache,
        dc: &DynamicsCache,
        joint_forces: &[f64],
        body_forces: &[SpatialVec],
        a_gb: &[SpatialVec],
        f_gb: &mut [SpatialVec],
        tau: &mut [f64],
    ) {
        let b = self.base.node_num();
        let f = self.base.get_mk(pc) * a_gb[b] + dc.gyroscopic[b] - body_forces[b]
            + self.children_forces(pc, f_gb);
        f_gb[b] = f;
        let required = self.get_h(pc).transpose() * f - self.base.from_u::<N>(joint_forces);
        self.base.to_u(tau, &required);
    }

    /// `Jv_B = phiᵀ Jv_P + H v`.
    pub(super) fn spatial_kinematics_from_internal(
        &self,
        pc: &PositionCache,
        v: &[f64],
        jv: &mut [SpatialVec],
    ) {
        // Same recurrence as the outward sweep of M a.
        self.ma_pass1_outward(pc, v, jv);
    }

    /// `z = X_B + Σ_c phi_c z_c`, `JX = Hᵀ z`.
    pub(super) fn internal_gradient_from_spatial(
        &self,
        pc: &PositionCache,
        x: &[SpatialVec],
        all_z: &mut [SpatialVec],
        jx: &mut [f64],
    ) {
        let b = self.base.node_num();
        let z = x[b] + self.children_forces(pc, all_z);
        all_z[b] = z;
        self.base.to_u(jx, &(self.get_h(pc).transpose() * z));
    }

    fn children_forces(&self, pc: &PositionCache, f_gb: &[SpatialVec]) -> SpatialVec {
        self.base
            .children()
            .iter()
            .fold(SpatialVec::zeros(), |acc, &c| acc + pc.phi[c].shift_force(&f_gb[c]))
    }
}
