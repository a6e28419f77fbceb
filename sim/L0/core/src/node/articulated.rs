//! Articulated-body inertias and the forward-dynamics sweeps.
//!
//! Inertias are composed tip-to-base once per Dynamics realization. Forward
//! dynamics then costs one inward sweep (residual forces) and one outward
//! sweep (accelerations); `M⁻¹ f` is the same pair of sweeps with the
//! velocity-dependent bias and body forces left out. The outward `Y` sweep
//! gives each body's operational-space inverse inertia.

use mbs_types::{MultibodyError, SpatialMat, SpatialVec};
use nalgebra::SVector;

use super::RigidBodyNodeSpec;
use super::spec::write_columns;
use crate::cache::{AccelerationCache, DynamicsCache, PositionCache};
use crate::mobilizer::Mobilizer;

impl<M: Mobilizer<N>, const N: usize> RigidBodyNodeSpec<M, N> {
    /// ```text
    /// P       = Mk + Σ_c phi_c (tau_bar_c P_c) phi_cᵀ
    /// D       = Hᵀ P H,   DI = D⁻¹,   G = P H DI
    /// tau_bar = 1 - G Hᵀ, psi = phi tau_bar
    /// ```
    ///
    /// Also caches the centrifugal force `P a + b`. Children must be done.
    pub(super) fn articulated_body_inertias_inward(
        &self,
        pc: &PositionCache,
        dc: &mut DynamicsCache,
    ) -> Result<(), MultibodyError> {
        let b = self.base.node_num();

        let mut p = *self.base.get_mk(pc);
        for &c in self.base.children() {
            p += pc.phi[c].shift_inertia(&(dc.tau_bar[c] * dc.p[c]));
        }

        let h = self.get_h(pc);
        let ph = p * h;
        let d = h.transpose() * ph;
        let Some(di) = d.try_inverse() else {
            tracing::warn!(body = b, dof = N, "articulated inertia D is singular");
            return Err(MultibodyError::SingularArticulatedInertia { node: b });
        };
        let g = ph * di;
        let tau_bar = SpatialMat::identity() - g * h.transpose();

        dc.psi[b] = pc.phi[b].to_matrix() * tau_bar;
        dc.tau_bar[b] = tau_bar;
        dc.centrifugal[b] = p * dc.coriolis[b] + dc.gyroscopic[b];
        dc.p[b] = p;
        self.base.to_u_sq(&mut dc.d, &d);
        self.base.to_u_sq(&mut dc.di, &di);
        write_columns(&mut dc.g, self.base.u_index(), &g);
        Ok(())
    }

    /// ```text
    /// Y = H DI Hᵀ + psiᵀ Y_P psi
    /// ```
    ///
    /// Ground's `Y` stays zero. Parent must be done.
    pub(super) fn y_outward(&self, pc: &PositionCache, dc: &mut DynamicsCache) {
        let b = self.base.node_num();
        let h = self.get_h(pc);
        let psi = dc.psi[b];
        dc.y[b] = h * self.get_di(dc) * h.transpose()
            + psi.transpose() * dc.y[self.base.parent()] * psi;
    }

    /// ```text
    /// z       = P a + b - F_body + Σ_c phi_c (z_c + G_c eps_c)
    /// epsilon = tau - Hᵀ z
    /// ```
    pub(super) fn udot_pass1_inward(
        &self,
        pc: &PositionCache,
        dc: &DynamicsCache,
        joint_forces: &[f64],
        body_forces: &[SpatialVec],
        ac: &mut AccelerationCache,
    ) {
        let b = self.base.node_num();
        let z = dc.centrifugal[b] - body_forces[b] + self.inboard_residual(pc, ac);
        self.finish_pass1(pc, dc, joint_forces, z, ac);
    }

    /// ```text
    /// alpha = phiᵀ A_GP
    /// udot  = DI eps - Gᵀ alpha
    /// A_GB  = alpha + H udot + a
    /// ```
    ///
    /// Also records `nu = DI eps` and the net hinge force `D udot`.
    pub(super) fn udot_pass2_outward(
        &self,
        pc: &PositionCache,
        dc: &DynamicsCache,
        ac: &mut AccelerationCache,
        udot: &mut [f64],
    ) {
        let b = self.base.node_num();
        let udot_b = self.finish_pass2(pc, dc, ac, udot);
        ac.a_gb[b] += dc.coriolis[b];
        self.base
            .to_u(&mut ac.net_hinge_force, &(self.get_d(dc) * udot_b));
    }

    /// Pass 1 of `M⁻¹ f`: as [`Self::udot_pass1_inward`] with no bias and no
    /// body forces.
    pub(super) fn m_inverse_f_pass1_inward(
        &self,
        pc: &PositionCache,
        dc: &DynamicsCache,
        f: &[f64],
        scratch: &mut AccelerationCache,
    ) {
        let z = self.inboard_residual(pc, scratch);
        self.finish_pass1(pc, dc, f, z, scratch);
    }

    /// Pass 2 of `M⁻¹ f`: as [`Self::udot_pass2_outward`] with no Coriolis term.
    pub(super) fn m_inverse_f_pass2_outward(
        &self,
        pc: &PositionCache,
        dc: &DynamicsCache,
        scratch: &mut AccelerationCache,
        udot: &mut [f64],
    ) {
        self.finish_pass2(pc, dc, scratch, udot);
    }

    /// `Σ_c phi_c (z_c + G_c eps_c)` over the children.
    fn inboard_residual(&self, pc: &PositionCache, ac: &AccelerationCache) -> SpatialVec {
        self.base
            .children()
            .iter()
            .fold(SpatialVec::zeros(), |acc, &c| {
                acc + pc.phi[c].shift_force(&(ac.z[c] + ac.g_epsilon[c]))
            })
    }

    fn finish_pass1(
        &self,
        pc: &PositionCache,
        dc: &DynamicsCache,
        f: &[f64],
        z: SpatialVec,
        ac: &mut AccelerationCache,
    ) {
        let b = self.base.node_num();
        let eps = self.base.from_u::<N>(f) - self.get_h(pc).transpose() * z;
        ac.z[b] = z;
        ac.g_epsilon[b] = self.get_g(dc) * eps;
        self.base.to_u(&mut ac.epsilon, &eps);
    }

    fn finish_pass2(
        &self,
        pc: &PositionCache,
        dc: &DynamicsCache,
        ac: &mut AccelerationCache,
        udot: &mut [f64],
    ) -> SVector<f64, N> {
        let b = self.base.node_num();
        let alpha = self
            .base
            .get_phi(pc)
            .transpose_shift_motion(&ac.a_gb[self.base.parent()]);
        let nu = self.get_di(dc) * self.base.from_u::<N>(&ac.epsilon);
        let udot_b = nu - self.get_g(dc).transpose() * alpha;

        ac.a_gb[b] = alpha + self.get_h(pc) * udot_b;
        self.base.to_u(&mut ac.nu, &nu);
        self.base.to_u(udot, &udot_b);
        udot_b
    }
}
