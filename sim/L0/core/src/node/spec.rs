//! Nodes with a compile-time dof count.
//!
//! [`RigidBodyNodeSpec<M, N>`] combines a [`NodeBase`] with a joint
//! implementing [`Mobilizer<N>`]. It owns the kinematic realize pipeline; the
//! articulated-body passes live in `articulated.rs` and the inverse-dynamics
//! and Jacobian products in `operators.rs`.

use mbs_types::{HType, MultibodyError, SpatialVec, angular, linear, spatial_vec};
use nalgebra::{Isometry3, SMatrix};

use super::{NodeBase, RigidBodyNode};
use crate::cache::{AccelerationCache, DynamicsCache, PositionCache, VelocityCache};
use crate::mobilizer::{Mobilizer, MobilizerDigest, as_defined_velocity};
use crate::state::{DynamicsVars, InstanceVars, ModelVars, StateView, TimeVars};

/// A mobilized body whose joint has `N` degrees of freedom.
#[derive(Debug, Clone)]
pub struct RigidBodyNodeSpec<M, const N: usize> {
    pub(super) base: NodeBase,
    pub(super) mobilizer: M,
}

impl<M: Mobilizer<N>, const N: usize> RigidBodyNodeSpec<M, N> {
    const DOF_IN_RANGE: () = assert!(N >= 1 && N <= 6, "mobilizers have 1 to 6 dofs");

    /// Pair a base with its joint.
    ///
    /// # Panics
    ///
    /// Panics if the base was built for a different dof count.
    #[must_use]
    pub fn new(base: NodeBase, mobilizer: M) -> Self {
        let () = Self::DOF_IN_RANGE;
        assert_eq!(base.dof(), N, "node base dof does not match mobilizer");
        Self { base, mobilizer }
    }

    /// The joint.
    #[must_use]
    pub fn mobilizer(&self) -> &M {
        &self.mobilizer
    }

    // ==================== Cache accessors ====================

    /// Across-joint Jacobian in use, `H_FM`.
    #[must_use]
    pub fn get_h_fm(&self, pc: &PositionCache) -> HType<N> {
        read_columns(&pc.h_fm, self.base.u_index())
    }

    /// Parent-to-body Jacobian in ground, `H_PB_G`.
    #[must_use]
    pub fn get_h(&self, pc: &PositionCache) -> HType<N> {
        read_columns(&pc.h, self.base.u_index())
    }

    /// Time derivative of `H_FM`, in F.
    #[must_use]
    pub fn get_hdot_fm(&self, dc: &DynamicsCache) -> HType<N> {
        read_columns(&dc.hdot_fm, self.base.u_index())
    }

    /// Time derivative of `H_PB_G`, in ground.
    #[must_use]
    pub fn get_hdot(&self, dc: &DynamicsCache) -> HType<N> {
        read_columns(&dc.hdot, self.base.u_index())
    }

    /// Articulated gain `G = P H D⁻¹`.
    #[must_use]
    pub fn get_g(&self, dc: &DynamicsCache) -> HType<N> {
        read_columns(&dc.g, self.base.u_index())
    }

    /// `D = Hᵀ P H`.
    #[must_use]
    pub fn get_d(&self, dc: &DynamicsCache) -> SMatrix<f64, N, N> {
        self.base.from_u_sq(&dc.d)
    }

    /// `D⁻¹`.
    #[must_use]
    pub fn get_di(&self, dc: &DynamicsCache) -> SMatrix<f64, N, N> {
        self.base.from_u_sq(&dc.di)
    }

    // ==================== Position ====================

    /// `X_PB = X_PF X_FM X_MB` and `X_GB = X_GP X_PB`. Requires `X_FM`.
    pub fn calc_body_transforms(&self, pc: &PositionCache) -> (Isometry3<f64>, Isometry3<f64>) {
        let x_pb = self.base.x_pf() * pc.x_fm[self.base.node_num()] * self.base.x_mb();
        let x_gb = self.base.get_x_gp(pc) * x_pb;
        (x_pb, x_gb)
    }

    /// `H_PB_G`: columns of `H_FM` shifted from OM to OB and re-expressed in
    /// ground. Requires `X_FM`, `X_GP` and `H_FM`.
    #[must_use]
    pub fn calc_parent_to_child_velocity_jacobian_in_ground(&self, pc: &PositionCache) -> HType<N> {
        let h_fm = self.get_h_fm(pc);
        let r_fm = &pc.x_fm[self.base.node_num()].rotation;
        let r_mb_f = r_fm * self.base.x_mb().translation.vector;
        let r_gf = self.base.get_x_gp(pc).rotation * self.base.x_pf().rotation;

        let mut h = HType::<N>::zeros();
        for (j, col) in h_fm.column_iter().enumerate() {
            let col = col.into_owned();
            let w = angular(&col);
            let v = linear(&col) + w.cross(&r_mb_f);
            h.set_column(j, &spatial_vec(&(r_gf * w), &(r_gf * v)));
        }
        h
    }

    /// Ground-frame time derivative of `H_PB_G`. Requires `HDot_FM`, `V_FM`
    /// and `V_GP` in addition to the Position results.
    #[must_use]
    pub fn calc_parent_to_child_velocity_jacobian_in_ground_dot(
        &self,
        pc: &PositionCache,
        vc: &VelocityCache,
        dc: &DynamicsCache,
    ) -> HType<N> {
        let b = self.base.node_num();
        let h_fm = self.get_h_fm(pc);
        let hdot_fm = self.get_hdot_fm(dc);
        let h_g = self.get_h(pc);

        let r_fm = &pc.x_fm[b].rotation;
        let r_mb_f = r_fm * self.base.x_mb().translation.vector;
        let r_gf = self.base.get_x_gp(pc).rotation * self.base.x_pf().rotation;
        let w_fm = angular(&vc.v_fm[b]);
        let w_gp = angular(self.base.get_v_gp(vc));
        // OB moves relative to OM only through the joint rotation.
        let rdot_mb_f = w_fm.cross(&r_mb_f);

        let mut hdot = HType::<N>::zeros();
        for j in 0..N {
            let col = h_fm.column(j).into_owned();
            let dcol = hdot_fm.column(j).into_owned();
            let gcol = h_g.column(j).into_owned();

            let w = angular(&col);
            let wd = angular(&dcol);
            let vd = linear(&dcol) + wd.cross(&r_mb_f) + w.cross(&rdot_mb_f);

            let in_f = spatial_vec(&(r_gf * wd), &(r_gf * vd));
            let frame_rate = spatial_vec(
                &w_gp.cross(&angular(&gcol)),
                &w_gp.cross(&linear(&gcol)),
            );
            hdot.set_column(j, &(in_f + frame_rate));
        }
        hdot
    }

    /// `V_FM = H_FM u`, `V_PB_G = H u`, then `V_GB`.
    pub fn calc_joint_kinematics_vel(
        &self,
        vars: &StateView<'_>,
        pc: &PositionCache,
        vc: &mut VelocityCache,
    ) {
        let b = self.base.node_num();
        let u = self.base.from_u::<N>(vars.u);
        vc.v_fm[b] = self.get_h_fm(pc) * u;
        vc.v_pb_g[b] = self.get_h(pc) * u;
        self.base.calc_joint_independent_kinematics_vel(pc, vc);
    }

    /// `VD_PB_G = HDot u`. Requires `HDot_PB_G`.
    pub fn calc_joint_dynamics(&self, vars: &StateView<'_>, dc: &mut DynamicsCache) {
        let u = self.base.from_u::<N>(vars.u);
        dc.vd_pb_g[self.base.node_num()] = self.get_hdot(dc) * u;
    }

    fn digest<'a>(&'a self, vars: &StateView<'a>, pc: &'a PositionCache) -> MobilizerDigest<'a> {
        MobilizerDigest::new(&self.base, *vars, pc)
    }
}

pub(super) fn read_columns<const N: usize>(cols: &[SpatialVec], start: usize) -> HType<N> {
    HType::<N>::from_columns(&cols[start..start + N])
}

pub(super) fn write_columns<const N: usize>(cols: &mut [SpatialVec], start: usize, h: &HType<N>) {
    for (j, dst) in cols[start..start + N].iter_mut().enumerate() {
        *dst = h.column(j).into_owned();
    }
}

impl<M: Mobilizer<N>, const N: usize> RigidBodyNode for RigidBodyNodeSpec<M, N> {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn dof(&self) -> usize {
        N
    }

    fn nq_in_use(&self, model: &ModelVars) -> usize {
        self.mobilizer.nq_in_use(model)
    }

    fn nu_in_use(&self, model: &ModelVars) -> usize {
        self.mobilizer.nu_in_use(model)
    }

    fn is_using_quaternion(&self, model: &ModelVars) -> Option<usize> {
        self.mobilizer.is_using_quaternion(model)
    }

    fn set_default_model_values(&self, model: &mut ModelVars) {
        self.mobilizer.set_default_model_values(&self.base, model);
    }

    fn set_default_instance_values(&self, instance: &mut InstanceVars) {
        instance.mass_properties[self.base.node_num()] = *self.base.mass_properties();
        self.mobilizer.set_default_instance_values(&self.base, instance);
    }

    fn set_default_time_values(&self, time: &mut TimeVars) {
        self.mobilizer.set_default_time_values(&self.base, time);
    }

    fn set_default_position_values(&self, model: &ModelVars, q: &mut [f64]) {
        self.mobilizer.set_default_position_values(&self.base, model, q);
    }

    fn set_default_velocity_values(&self, u: &mut [f64]) {
        self.mobilizer.set_default_velocity_values(&self.base, u);
    }

    fn set_default_dynamics_values(&self, dynamics: &mut DynamicsVars) {
        self.mobilizer.set_default_dynamics_values(&self.base, dynamics);
    }

    fn set_default_acceleration_values(&self, dynamics: &mut DynamicsVars) {
        self.mobilizer.set_default_acceleration_values(&self.base, dynamics);
    }

    fn realize_position(&self, vars: &StateView<'_>, q_err: &mut [f64], pc: &mut PositionCache) {
        let b = self.base.node_num();

        self.mobilizer.calc_joint_sin_cos_q_norm(&self.base, vars, pc, q_err);

        let x_f0m0 = self.mobilizer.calc_across_joint_transform(&self.digest(vars, pc));
        pc.x_fm[b] = if self.base.is_reversed() {
            x_f0m0.inverse()
        } else {
            x_f0m0
        };

        let (x_pb, x_gb) = self.calc_body_transforms(pc);
        pc.x_pb[b] = x_pb;
        pc.x_gb[b] = x_gb;

        let h_fm = {
            let d = self.digest(vars, pc);
            if self.base.is_reversed() {
                self.mobilizer.calc_reverse_mobilizer_h_fm(&d)
            } else {
                self.mobilizer.calc_across_joint_velocity_jacobian(&d)
            }
        };
        write_columns(&mut pc.h_fm, self.base.u_index(), &h_fm);

        let h = self.calc_parent_to_child_velocity_jacobian_in_ground(pc);
        write_columns(&mut pc.h, self.base.u_index(), &h);

        self.base.calc_joint_independent_kinematics_pos(vars.instance, pc);
    }

    fn realize_velocity(
        &self,
        vars: &StateView<'_>,
        pc: &PositionCache,
        qdot: &mut [f64],
        vc: &mut VelocityCache,
    ) {
        self.mobilizer.calc_qdot(&self.digest(vars, pc), qdot);
        self.calc_joint_kinematics_vel(vars, pc, vc);
    }

    fn realize_dynamics(
        &self,
        vars: &StateView<'_>,
        pc: &PositionCache,
        vc: &VelocityCache,
        dc: &mut DynamicsCache,
    ) {
        let hdot_fm = {
            let d = self.digest(vars, pc).with_velocity(vc);
            if self.base.is_reversed() {
                self.mobilizer.calc_reverse_mobilizer_hdot_fm(&d)
            } else {
                self.mobilizer.calc_across_joint_velocity_jacobian_dot(&d)
            }
        };
        write_columns(&mut dc.hdot_fm, self.base.u_index(), &hdot_fm);

        let hdot = self.calc_parent_to_child_velocity_jacobian_in_ground_dot(pc, vc, dc);
        write_columns(&mut dc.hdot, self.base.u_index(), &hdot);

        self.calc_joint_dynamics(vars, dc);
        self.base
            .calc_joint_independent_dynamics_vel(vars.instance, pc, vc, dc);
    }

    fn calc_articulated_body_inertias_inward(
        &self,
        pc: &PositionCache,
        dc: &mut DynamicsCache,
    ) -> Result<(), MultibodyError> {
        self.articulated_body_inertias_inward(pc, dc)
    }

    fn calc_y_outward(&self, pc: &PositionCache, dc: &mut DynamicsCache) {
        self.y_outward(pc, dc);
    }

    fn calc_udot_pass1_inward(
        &self,
        pc: &PositionCache,
        dc: &DynamicsCache,
        joint_forces: &[f64],
        body_forces: &[SpatialVec],
        ac: &mut AccelerationCache,
    ) {
        self.udot_pass1_inward(pc, dc, joint_forces, body_forces, ac);
    }

    fn calc_udot_pass2_outward(
        &self,
        pc: &PositionCache,
        dc: &DynamicsCache,
        ac: &mut AccelerationCache,
        udot: &mut [f64],
    ) {
        self.udot_pass2_outward(pc, dc, ac, udot);
    }

    fn calc_m_inverse_f_pass1_inward(
        &self,
        pc: &PositionCache,
        dc: &DynamicsCache,
        f: &[f64],
        scratch: &mut AccelerationCache,
    ) {
        self.m_inverse_f_pass1_inward(pc, dc, f, scratch);
    }

    fn calc_m_inverse_f_pass2_outward(
        &self,
        pc: &PositionCache,
        dc: &DynamicsCache,
        scratch: &mut AccelerationCache,
        udot: &mut [f64],
    ) {
        self.m_inverse_f_pass2_outward(pc, dc, scratch, udot);
    }

    fn calc_ma_pass1_outward(&self, pc: &PositionCache, udot: &[f64], a_gb: &mut [SpatialVec]) {
        self.ma_pass1_outward(pc, udot, a_gb);
    }

    fn calc_ma_pass2_inward(
        &self,
        pc: &PositionCache,
        a_gb: &[SpatialVec],
        f_gb: &mut [SpatialVec],
        tau: &mut [f64],
    ) {
        self.ma_pass2_inward(pc, a_gb, f_gb, tau);
    }

    fn calc_inverse_dynamics_pass1_outward(
        &self,
        pc: &PositionCache,
        dc: &DynamicsCache,
        udot: &[f64],
        a_gb: &mut [SpatialVec],
    ) {
        self.inverse_dynamics_pass1_outward(pc, dc, udot, a_gb);
    }

    fn calc_inverse_dynamics_pass2_inward(
        &self,
        pc: &PositionCache,
        dc: &DynamicsCache,
        joint_forces: &[f64],
        body_forces: &[SpatialVec],
        a_gb: &[SpatialVec],
        f_gb: &mut [SpatialVec],
        tau: &mut [f64],
    ) {
        self.inverse_dynamics_pass2_inward(pc, dc, joint_forces, body_forces, a_gb, f_gb, tau);
    }

    fn calc_equivalent_joint_forces(
        &self,
        pc: &PositionCache,
        body_forces: &[SpatialVec],
        all_z: &mut [SpatialVec],
        joint_forces: &mut [f64],
    ) {
        self.internal_gradient_from_spatial(pc, body_forces, all_z, joint_forces);
    }

    fn calc_spatial_kinematics_from_internal(
        &self,
        pc: &PositionCache,
        v: &[f64],
        jv: &mut [SpatialVec],
    ) {
        self.spatial_kinematics_from_internal(pc, v, jv);
    }

    fn calc_internal_gradient_from_spatial(
        &self,
        pc: &PositionCache,
        x: &[SpatialVec],
        all_z: &mut [SpatialVec],
        jx: &mut [f64],
    ) {
        self.internal_gradient_from_spatial(pc, x, all_z, jx);
    }

    fn set_vel_from_svel(
        &self,
        pc: &PositionCache,
        vc: &VelocityCache,
        s_vel: &SpatialVec,
        u: &mut [f64],
    ) {
        let relative = s_vel - self.base.get_phi(pc).transpose_shift_motion(self.base.get_v_gp(vc));
        self.base.to_u(u, &(self.get_h(pc).transpose() * relative));
    }

    fn calc_qdotdot(
        &self,
        vars: &StateView<'_>,
        pc: &PositionCache,
        udot: &[f64],
        qdotdot: &mut [f64],
    ) {
        self.mobilizer.calc_qdotdot(&self.digest(vars, pc), udot, qdotdot);
    }

    fn multiply_by_n(
        &self,
        vars: &StateView<'_>,
        pc: &PositionCache,
        matrix_on_right: bool,
        input: &[f64],
        out: &mut [f64],
    ) {
        // N is nq×nu: the q side is the output unless the matrix is on the right.
        let (in_range, out_range) = if matrix_on_right {
            (self.base.q_range(), self.base.u_range())
        } else {
            (self.base.u_range(), self.base.q_range())
        };
        self.mobilizer.multiply_by_n(
            &self.digest(vars, pc),
            matrix_on_right,
            &input[in_range],
            &mut out[out_range],
        );
    }

    fn multiply_by_n_inv(
        &self,
        vars: &StateView<'_>,
        pc: &PositionCache,
        matrix_on_right: bool,
        input: &[f64],
        out: &mut [f64],
    ) {
        let (in_range, out_range) = if matrix_on_right {
            (self.base.u_range(), self.base.q_range())
        } else {
            (self.base.q_range(), self.base.u_range())
        };
        self.mobilizer.multiply_by_n_inv(
            &self.digest(vars, pc),
            matrix_on_right,
            &input[in_range],
            &mut out[out_range],
        );
    }

    fn enforce_quaternion_constraints(&self, model: &ModelVars, q: &mut [f64]) -> bool {
        self.mobilizer.enforce_quaternion_constraints(&self.base, model, q)
    }

    fn set_q_to_fit_transform(&self, model: &ModelVars, x_f0m0: &Isometry3<f64>, q: &mut [f64]) {
        self.mobilizer.set_q_to_fit_transform(&self.base, model, x_f0m0, q);
    }

    fn set_u_to_fit_velocity(
        &self,
        q: &[f64],
        pc: &PositionCache,
        v_fm: &SpatialVec,
        u: &mut [f64],
    ) {
        let v_f0m0 = if self.base.is_reversed() {
            as_defined_velocity(&pc.x_fm[self.base.node_num()], v_fm)
        } else {
            *v_fm
        };
        self.mobilizer.set_u_to_fit_velocity(&self.base, q, &v_f0m0, u);
    }

    fn copy_q(&self, model: &ModelVars, q_in: &[f64], q: &mut [f64]) {
        self.mobilizer.copy_q(&self.base, model, q_in, q);
    }

    fn copy_u(&self, u_in: &[f64], u: &mut [f64]) {
        self.base.to_u(u, &self.base.from_u::<N>(u_in));
    }

    fn convert_to_euler_angles(&self, q_in: &[f64], q: &mut [f64]) {
        self.mobilizer.convert_to_euler_angles(&self.base, q_in, q);
    }

    fn convert_to_quaternions(&self, q_in: &[f64], q: &mut [f64]) {
        self.mobilizer.convert_to_quaternions(&self.base, q_in, q);
    }
}
