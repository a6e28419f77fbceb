//! Joint types used across the integration tests.
//!
//! Each is written for the joint as defined, from F0 to M0; reversal is the
//! tree's business.

use mbs_core::quaternion::{
    normalize_quaternion, quaternion_coords, quaternion_error, quaternion_rate,
    quaternion_rate_matrix, unit_quaternion,
};
use mbs_core::{
    HType, Mobilizer, MobilizerDigest, ModelVars, NodeBase, PositionCache, QDotHandling,
    QuaternionUse, StateView,
};
use nalgebra::{
    DMatrix, DVector, Isometry3, Matrix3, Quaternion, SMatrix, Translation3, UnitQuaternion,
    Vector3, Vector4,
};

// ==================== Simple joints (qdot == u) ====================

/// Revolute joint about the shared z axis of F and M.
#[derive(Debug, Clone, Copy, Default)]
pub struct PinZ;

impl Mobilizer<1> for PinZ {
    fn calc_across_joint_transform(&self, d: &MobilizerDigest<'_>) -> Isometry3<f64> {
        Isometry3::from_parts(
            Translation3::identity(),
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), d.q()[0]),
        )
    }

    fn calc_across_joint_velocity_jacobian(&self, _d: &MobilizerDigest<'_>) -> HType<1> {
        HType::<1>::new(0.0, 0.0, 1.0, 0.0, 0.0, 0.0)
    }

    fn calc_across_joint_velocity_jacobian_dot(&self, _d: &MobilizerDigest<'_>) -> HType<1> {
        HType::<1>::zeros()
    }

    fn set_q_to_fit_rotation(
        &self,
        node: &NodeBase,
        _model: &ModelVars,
        r_fm: &UnitQuaternion<f64>,
        q: &mut [f64],
    ) {
        q[node.q_index()] = r_fm.euler_angles().2;
    }

    fn set_q_to_fit_translation(
        &self,
        _node: &NodeBase,
        _model: &ModelVars,
        _p_fm: &Vector3<f64>,
        _q: &mut [f64],
    ) {
    }

    fn set_u_to_fit_angular_velocity(
        &self,
        node: &NodeBase,
        _q: &[f64],
        w_fm: &Vector3<f64>,
        u: &mut [f64],
    ) {
        u[node.u_index()] = w_fm.z;
    }

    fn set_u_to_fit_linear_velocity(
        &self,
        _node: &NodeBase,
        _q: &[f64],
        _v_fm: &Vector3<f64>,
        _u: &mut [f64],
    ) {
    }
}

/// Prismatic joint along the shared x axis.
#[derive(Debug, Clone, Copy, Default)]
pub struct SliderX;

impl Mobilizer<1> for SliderX {
    fn calc_across_joint_transform(&self, d: &MobilizerDigest<'_>) -> Isometry3<f64> {
        Isometry3::translation(d.q()[0], 0.0, 0.0)
    }

    fn calc_across_joint_velocity_jacobian(&self, _d: &MobilizerDigest<'_>) -> HType<1> {
        HType::<1>::new(0.0, 0.0, 0.0, 1.0, 0.0, 0.0)
    }

    fn calc_across_joint_velocity_jacobian_dot(&self, _d: &MobilizerDigest<'_>) -> HType<1> {
        HType::<1>::zeros()
    }

    fn set_q_to_fit_rotation(
        &self,
        _node: &NodeBase,
        _model: &ModelVars,
        _r_fm: &UnitQuaternion<f64>,
        _q: &mut [f64],
    ) {
    }

    fn set_q_to_fit_translation(
        &self,
        node: &NodeBase,
        _model: &ModelVars,
        p_fm: &Vector3<f64>,
        q: &mut [f64],
    ) {
        q[node.q_index()] = p_fm.x;
    }

    fn set_u_to_fit_angular_velocity(
        &self,
        _node: &NodeBase,
        _q: &[f64],
        _w_fm: &Vector3<f64>,
        _u: &mut [f64],
    ) {
    }

    fn set_u_to_fit_linear_velocity(
        &self,
        node: &NodeBase,
        _q: &[f64],
        v_fm: &Vector3<f64>,
        u: &mut [f64],
    ) {
        u[node.u_index()] = v_fm.x;
    }
}

/// Universal joint: `R_FM = Rx(q0) Ry(q1)`.
///
/// The second axis moves with the first, so `HDot` is not zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct UJoint;

impl Mobilizer<2> for UJoint {
    fn calc_across_joint_transform(&self, d: &MobilizerDigest<'_>) -> Isometry3<f64> {
        let r = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), d.q()[0])
            * UnitQuaternion::from_axis_angle(&Vector3::y_axis(), d.q()[1]);
        Isometry3::from_parts(Translation3::identity(), r)
    }

    fn calc_across_joint_velocity_jacobian(&self, d: &MobilizerDigest<'_>) -> HType<2> {
        let (s, c) = (d.sin_q()[0], d.cos_q()[0]);
        HType::<2>::from_columns(&[
            SMatrix::<f64, 6, 1>::new(1.0, 0.0, 0.0, 0.0, 0.0, 0.0),
            SMatrix::<f64, 6, 1>::new(0.0, c, s, 0.0, 0.0, 0.0),
        ])
    }

    fn calc_across_joint_velocity_jacobian_dot(&self, d: &MobilizerDigest<'_>) -> HType<2> {
        let (s, c) = (d.sin_q()[0], d.cos_q()[0]);
        let u0 = d.u()[0];
        HType::<2>::from_columns(&[
            SMatrix::<f64, 6, 1>::zeros(),
            SMatrix::<f64, 6, 1>::new(0.0, -s * u0, c * u0, 0.0, 0.0, 0.0),
        ])
    }

    fn set_q_to_fit_rotation(
        &self,
        node: &NodeBase,
        _model: &ModelVars,
        r_fm: &UnitQuaternion<f64>,
        q: &mut [f64],
    ) {
        let m = r_fm.to_rotation_matrix().into_inner();
        q[node.q_index()] = m[(2, 1)].atan2(m[(1, 1)]);
        q[node.q_index() + 1] = m[(0, 2)].atan2(m[(0, 0)]);
    }

    fn set_q_to_fit_translation(
        &self,
        _node: &NodeBase,
        _model: &ModelVars,
        _p_fm: &Vector3<f64>,
        _q: &mut [f64],
    ) {
    }

    fn set_u_to_fit_angular_velocity(
        &self,
        node: &NodeBase,
        q: &[f64],
        w_fm: &Vector3<f64>,
        u: &mut [f64],
    ) {
        // The two axes are orthogonal, so projection is the least-squares fit.
        let (s, c) = q[node.q_index()].sin_cos();
        u[node.u_index()] = w_fm.x;
        u[node.u_index() + 1] = w_fm.dot(&Vector3::new(0.0, c, s));
    }

    fn set_u_to_fit_linear_velocity(
        &self,
        _node: &NodeBase,
        _q: &[f64],
        _v_fm: &Vector3<f64>,
        _u: &mut [f64],
    ) {
    }
}

/// Planar joint: rotation about z, then translation in the xy plane of F.
#[derive(Debug, Clone, Copy, Default)]
pub struct Planar;

impl Mobilizer<3> for Planar {
    fn calc_across_joint_transform(&self, d: &MobilizerDigest<'_>) -> Isometry3<f64> {
        let q = d.q();
        Isometry3::from_parts(
            Translation3::new(q[1], q[2], 0.0),
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), q[0]),
        )
    }

    fn calc_across_joint_velocity_jacobian(&self, _d: &MobilizerDigest<'_>) -> HType<3> {
        let mut h = HType::<3>::zeros();
        h[(2, 0)] = 1.0;
        h[(3, 1)] = 1.0;
        h[(4, 2)] = 1.0;
        h
    }

    fn calc_across_joint_velocity_jacobian_dot(&self, _d: &MobilizerDigest<'_>) -> HType<3> {
        HType::<3>::zeros()
    }

    fn set_q_to_fit_rotation(
        &self,
        node: &NodeBase,
        _model: &ModelVars,
        r_fm: &UnitQuaternion<f64>,
        q: &mut [f64],
    ) {
        q[node.q_index()] = r_fm.euler_angles().2;
    }

    fn set_q_to_fit_translation(
        &self,
        node: &NodeBase,
        _model: &ModelVars,
        p_fm: &Vector3<f64>,
        q: &mut [f64],
    ) {
        q[node.q_index() + 1] = p_fm.x;
        q[node.q_index() + 2] = p_fm.y;
    }

    fn set_u_to_fit_angular_velocity(
        &self,
        node: &NodeBase,
        _q: &[f64],
        w_fm: &Vector3<f64>,
        u: &mut [f64],
    ) {
        u[node.u_index()] = w_fm.z;
    }

    fn set_u_to_fit_linear_velocity(
        &self,
        node: &NodeBase,
        _q: &[f64],
        v_fm: &Vector3<f64>,
        u: &mut [f64],
    ) {
        u[node.u_index() + 1] = v_fm.x;
        u[node.u_index() + 2] = v_fm.y;
    }
}

// ==================== Spherical coordinates ====================

/// Rotational coordinates shared by [`Ball`] and [`Free`]: a unit
/// quaternion, or body-fixed x-y-z Euler angles when the model asks for them.
/// Speeds are always the angular velocity `w_FM` expressed in F.
mod spherical {
    use super::*;

    pub(super) fn nq(model: &ModelVars) -> usize {
        if model.use_euler_angles { 3 } else { 4 }
    }

    /// Fills the position-stage slots; returns the quaternion norm error.
    pub(super) fn sin_cos_q_norm(
        model: &ModelVars,
        q: &[f64],
        sq: &mut [f64],
        cq: &mut [f64],
        qnorm: &mut [f64],
    ) -> f64 {
        if model.use_euler_angles {
            for i in 0..3 {
                (sq[i], cq[i]) = q[i].sin_cos();
            }
            0.0
        } else {
            let r = unit_quaternion(&quaternion(q));
            qnorm[..4].copy_from_slice(&[r.w, r.i, r.j, r.k]);
            quaternion_error(q)
        }
    }

    pub(super) fn rotation(d: &MobilizerDigest<'_>) -> UnitQuaternion<f64> {
        if d.model().use_euler_angles {
            let q = d.q();
            euler_rotation(&Vector3::new(q[0], q[1], q[2]))
        } else {
            let n = d.q_norm();
            UnitQuaternion::new_unchecked(Quaternion::new(n[0], n[1], n[2], n[3]))
        }
    }

    /// `Rx(a) Ry(b) Rz(c)`.
    pub(super) fn euler_rotation(angles: &Vector3<f64>) -> UnitQuaternion<f64> {
        UnitQuaternion::from_axis_angle(&Vector3::x_axis(), angles[0])
            * UnitQuaternion::from_axis_angle(&Vector3::y_axis(), angles[1])
            * UnitQuaternion::from_axis_angle(&Vector3::z_axis(), angles[2])
    }

    pub(super) fn set_rotation(euler: bool, r: &UnitQuaternion<f64>, q: &mut [f64]) {
        if euler {
            let m = r.to_rotation_matrix().into_inner();
            q[0] = (-m[(1, 2)]).atan2(m[(2, 2)]);
            q[1] = m[(0, 2)].clamp(-1.0, 1.0).asin();
            q[2] = (-m[(0, 1)]).atan2(m[(0, 0)]);
        } else {
            q[..4].copy_from_slice(quaternion_coords(r).as_slice());
        }
    }

    /// Zero every slot, then write the identity rotation.
    pub(super) fn set_identity(model: &ModelVars, q: &mut [f64]) {
        q.fill(0.0);
        if !model.use_euler_angles {
            q[0] = 1.0;
        }
    }

    /// Quaternion at the start of the node's slots in `q_in` to Euler angles
    /// in `q`; the rest of the node's slots are zeroed.
    pub(super) fn to_euler(node: &NodeBase, q_in: &[f64], q: &mut [f64]) {
        let r = unit_quaternion(&node.from_quat(q_in));
        let out = &mut q[node.q_range()];
        out.fill(0.0);
        set_rotation(true, &r, out);
    }

    /// Euler angles at the start of the node's slots in `q_in` to a
    /// quaternion in `q`.
    pub(super) fn to_quaternion(node: &NodeBase, q_in: &[f64], q: &mut [f64]) {
        let r = euler_rotation(&node.from_vec3(q_in, 0));
        node.to_quat(q, &quaternion_coords(&r));
    }

    /// Copy the first `n` of the node's slots.
    pub(super) fn copy_leading(node: &NodeBase, n: usize, q_in: &[f64], q: &mut [f64]) {
        let r = node.q_index()..node.q_index() + n;
        q[r.clone()].copy_from_slice(&q_in[r]);
    }

    /// `N`: rotational coordinate rates per unit angular velocity.
    pub(super) fn n(d: &MobilizerDigest<'_>) -> DMatrix<f64> {
        if d.model().use_euler_angles {
            dense(&euler_rate_inv(d))
        } else {
            dense(&(quaternion_rate_matrix(&quaternion(d.q())) * 0.5))
        }
    }

    /// `N⁻¹`.
    pub(super) fn n_inv(d: &MobilizerDigest<'_>) -> DMatrix<f64> {
        if d.model().use_euler_angles {
            dense(&euler_rate(d))
        } else {
            dense(&(quaternion_rate_matrix(&quaternion(d.q())).transpose() * 2.0))
        }
    }

    /// `NDot` along the motion with angular velocity `w`.
    pub(super) fn n_dot(d: &MobilizerDigest<'_>, w: &Vector3<f64>) -> DMatrix<f64> {
        if d.model().use_euler_angles {
            let w_inv = euler_rate_inv(d);
            let qdot = w_inv * w;
            dense(&-(w_inv * euler_rate_dot(d, &qdot) * w_inv))
        } else {
            let qdot = quaternion_rate(&quaternion(d.q()), w);
            dense(&(quaternion_rate_matrix(&qdot) * 0.5))
        }
    }

    /// `W` with `w_FM = W qdot` for Euler angles `(a, b, c)`.
    fn euler_rate(d: &MobilizerDigest<'_>) -> Matrix3<f64> {
        let (sa, ca, sb, cb) = angles(d);
        Matrix3::new(
            1.0, 0.0, sb, //
            0.0, ca, -sa * cb, //
            0.0, sa, ca * cb,
        )
    }

    /// `W⁻¹`; singular at `b = ±π/2`.
    fn euler_rate_inv(d: &MobilizerDigest<'_>) -> Matrix3<f64> {
        let (sa, ca, sb, cb) = angles(d);
        Matrix3::new(
            cb, sa * sb, -ca * sb, //
            0.0, ca * cb, sa * cb, //
            0.0, -sa, ca,
        ) / cb
    }

    fn euler_rate_dot(d: &MobilizerDigest<'_>, qdot: &Vector3<f64>) -> Matrix3<f64> {
        let (sa, ca, sb, cb) = angles(d);
        let (ad, bd) = (qdot[0], qdot[1]);
        Matrix3::new(
            0.0, 0.0, cb * bd, //
            0.0, -sa * ad, -ca * cb * ad + sa * sb * bd, //
            0.0, ca * ad, -sa * cb * ad - ca * sb * bd,
        )
    }

    fn angles(d: &MobilizerDigest<'_>) -> (f64, f64, f64, f64) {
        let (sq, cq) = (d.sin_q(), d.cos_q());
        (sq[0], cq[0], sq[1], cq[1])
    }

    fn quaternion(q: &[f64]) -> Vector4<f64> {
        Vector4::from_column_slice(&q[..4])
    }

    fn dense<const R: usize, const C: usize>(m: &SMatrix<f64, R, C>) -> DMatrix<f64> {
        DMatrix::from_column_slice(R, C, m.as_slice())
    }
}

/// `out = m * input`, or `out = mᵀ * input` when `matrix_on_right`, using
/// as many leading entries of each slice as `m` needs.
fn apply(m: &DMatrix<f64>, matrix_on_right: bool, input: &[f64], out: &mut [f64]) {
    if matrix_on_right {
        let y = m.tr_mul(&DVector::from_column_slice(&input[..m.nrows()]));
        out[..m.ncols()].copy_from_slice(y.as_slice());
    } else {
        let y = m * DVector::from_column_slice(&input[..m.ncols()]);
        out[..m.nrows()].copy_from_slice(y.as_slice());
    }
}

/// `out = N udot + NDot u`.
fn apply_second_order(
    n: &DMatrix<f64>,
    n_dot: &DMatrix<f64>,
    u: &[f64],
    udot: &[f64],
    out: &mut [f64],
) {
    let y = n * DVector::from_column_slice(udot) + n_dot * DVector::from_column_slice(u);
    out[..y.len()].copy_from_slice(y.as_slice());
}

fn angular_speeds(u: &[f64]) -> Vector3<f64> {
    Vector3::new(u[0], u[1], u[2])
}

fn identity_jacobian<const N: usize>() -> HType<N> {
    let mut h = HType::<N>::zeros();
    for j in 0..N {
        h[(j, j)] = 1.0;
    }
    h
}

// ==================== Ball ====================

/// Three-dof spherical joint.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ball;

impl Mobilizer<3> for Ball {
    fn calc_across_joint_transform(&self, d: &MobilizerDigest<'_>) -> Isometry3<f64> {
        Isometry3::from_parts(Translation3::identity(), spherical::rotation(d))
    }

    fn calc_across_joint_velocity_jacobian(&self, _d: &MobilizerDigest<'_>) -> HType<3> {
        identity_jacobian::<3>()
    }

    fn calc_across_joint_velocity_jacobian_dot(&self, _d: &MobilizerDigest<'_>) -> HType<3> {
        HType::<3>::zeros()
    }

    fn set_q_to_fit_rotation(
        &self,
        node: &NodeBase,
        model: &ModelVars,
        r_fm: &UnitQuaternion<f64>,
        q: &mut [f64],
    ) {
        spherical::set_rotation(model.use_euler_angles, r_fm, &mut q[node.q_range()]);
    }

    fn set_q_to_fit_translation(
        &self,
        _node: &NodeBase,
        _model: &ModelVars,
        _p_fm: &Vector3<f64>,
        _q: &mut [f64],
    ) {
    }

    fn set_u_to_fit_angular_velocity(
        &self,
        node: &NodeBase,
        _q: &[f64],
        w_fm: &Vector3<f64>,
        u: &mut [f64],
    ) {
        u[node.u_range()].copy_from_slice(w_fm.as_slice());
    }

    fn set_u_to_fit_linear_velocity(
        &self,
        _node: &NodeBase,
        _q: &[f64],
        _v_fm: &Vector3<f64>,
        _u: &mut [f64],
    ) {
    }

    fn qdot_handling(&self) -> QDotHandling {
        QDotHandling::JointSpecific
    }

    fn quaternion_use(&self) -> QuaternionUse {
        QuaternionUse::ForRotation
    }

    fn calc_joint_sin_cos_q_norm(
        &self,
        node: &NodeBase,
        vars: &StateView<'_>,
        pc: &mut PositionCache,
        q_err: &mut [f64],
    ) {
        let r = node.q_range();
        q_err[node.node_num()] = spherical::sin_cos_q_norm(
            vars.model,
            &vars.q[r.clone()],
            &mut pc.sq[r.clone()],
            &mut pc.cq[r.clone()],
            &mut pc.qnorm[r],
        );
    }

    fn calc_qdot(&self, d: &MobilizerDigest<'_>, qdot: &mut [f64]) {
        apply(&spherical::n(d), false, d.u(), &mut qdot[d.node().q_range()]);
    }

    fn calc_qdotdot(&self, d: &MobilizerDigest<'_>, udot: &[f64], qdotdot: &mut [f64]) {
        let node = d.node();
        apply_second_order(
            &spherical::n(d),
            &spherical::n_dot(d, &angular_speeds(d.u())),
            d.u(),
            &udot[node.u_range()],
            &mut qdotdot[node.q_range()],
        );
    }

    fn multiply_by_n(
        &self,
        d: &MobilizerDigest<'_>,
        matrix_on_right: bool,
        input: &[f64],
        out: &mut [f64],
    ) {
        apply(&spherical::n(d), matrix_on_right, input, out);
    }

    fn multiply_by_n_inv(
        &self,
        d: &MobilizerDigest<'_>,
        matrix_on_right: bool,
        input: &[f64],
        out: &mut [f64],
    ) {
        apply(&spherical::n_inv(d), matrix_on_right, input, out);
    }

    fn multiply_by_n_dot(
        &self,
        d: &MobilizerDigest<'_>,
        matrix_on_right: bool,
        input: &[f64],
        out: &mut [f64],
    ) {
        let n_dot = spherical::n_dot(d, &angular_speeds(d.u()));
        apply(&n_dot, matrix_on_right, input, out);
    }

    fn max_nq(&self) -> usize {
        4
    }

    fn nq_in_use(&self, model: &ModelVars) -> usize {
        spherical::nq(model)
    }

    fn is_using_quaternion(&self, model: &ModelVars) -> Option<usize> {
        (!model.use_euler_angles).then_some(0)
    }

    fn enforce_quaternion_constraints(
        &self,
        node: &NodeBase,
        model: &ModelVars,
        q: &mut [f64],
    ) -> bool {
        !model.use_euler_angles && normalize_quaternion(&mut q[node.q_range()])
    }

    fn set_default_position_values(&self, node: &NodeBase, model: &ModelVars, q: &mut [f64]) {
        spherical::set_identity(model, &mut q[node.q_range()]);
    }

    fn copy_q(&self, node: &NodeBase, model: &ModelVars, q_in: &[f64], q: &mut [f64]) {
        spherical::copy_leading(node, spherical::nq(model), q_in, q);
    }

    fn convert_to_euler_angles(&self, node: &NodeBase, q_in: &[f64], q: &mut [f64]) {
        spherical::to_euler(node, q_in, q);
    }

    fn convert_to_quaternions(&self, node: &NodeBase, q_in: &[f64], q: &mut [f64]) {
        spherical::to_quaternion(node, q_in, q);
    }
}

// ==================== Free ====================

/// Six-dof joint: spherical rotation plus translation of OM in F.
///
/// Speeds are `[w_FM; v_FM]`, both in F, so `H_FM` is the identity.
/// Coordinates are the rotation followed by the three translations.
#[derive(Debug, Clone, Copy, Default)]
pub struct Free;

impl Free {
    fn n(d: &MobilizerDigest<'_>) -> DMatrix<f64> {
        with_translation(spherical::n(d), true)
    }

    fn n_inv(d: &MobilizerDigest<'_>) -> DMatrix<f64> {
        with_translation(spherical::n_inv(d), true)
    }

    fn n_dot(d: &MobilizerDigest<'_>) -> DMatrix<f64> {
        with_translation(spherical::n_dot(d, &angular_speeds(d.u())), false)
    }
}

/// Block-diagonal `[rot, 0; 0, 1 or 0]`.
fn with_translation(rot: DMatrix<f64>, identity: bool) -> DMatrix<f64> {
    let (r, c) = rot.shape();
    let mut m = DMatrix::zeros(r + 3, c + 3);
    m.view_mut((0, 0), (r, c)).copy_from(&rot);
    if identity {
        m.view_mut((r, c), (3, 3)).fill_with_identity();
    }
    m
}

impl Mobilizer<6> for Free {
    fn calc_across_joint_transform(&self, d: &MobilizerDigest<'_>) -> Isometry3<f64> {
        let p = &d.q()[spherical::nq(d.model())..];
        Isometry3::from_parts(Translation3::new(p[0], p[1], p[2]), spherical::rotation(d))
    }

    fn calc_across_joint_velocity_jacobian(&self, _d: &MobilizerDigest<'_>) -> HType<6> {
        identity_jacobian::<6>()
    }

    fn calc_across_joint_velocity_jacobian_dot(&self, _d: &MobilizerDigest<'_>) -> HType<6> {
        HType::<6>::zeros()
    }

    fn set_q_to_fit_rotation(
        &self,
        node: &NodeBase,
        model: &ModelVars,
        r_fm: &UnitQuaternion<f64>,
        q: &mut [f64],
    ) {
        spherical::set_rotation(model.use_euler_angles, r_fm, &mut q[node.q_range()]);
    }

    fn set_q_to_fit_translation(
        &self,
        node: &NodeBase,
        model: &ModelVars,
        p_fm: &Vector3<f64>,
        q: &mut [f64],
    ) {
        node.to_vec3(q, spherical::nq(model), p_fm);
    }

    fn set_u_to_fit_angular_velocity(
        &self,
        node: &NodeBase,
        _q: &[f64],
        w_fm: &Vector3<f64>,
        u: &mut [f64],
    ) {
        let i = node.u_index();
        u[i..i + 3].copy_from_slice(w_fm.as_slice());
    }

    fn set_u_to_fit_linear_velocity(
        &self,
        node: &NodeBase,
        _q: &[f64],
        v_fm: &Vector3<f64>,
        u: &mut [f64],
    ) {
        let i = node.u_index() + 3;
        u[i..i + 3].copy_from_slice(v_fm.as_slice());
    }

    fn qdot_handling(&self) -> QDotHandling {
        QDotHandling::JointSpecific
    }

    fn quaternion_use(&self) -> QuaternionUse {
        QuaternionUse::ForRotation
    }

    fn calc_joint_sin_cos_q_norm(
        &self,
        node: &NodeBase,
        vars: &StateView<'_>,
        pc: &mut PositionCache,
        q_err: &mut [f64],
    ) {
        let r = node.q_range();
        q_err[node.node_num()] = spherical::sin_cos_q_norm(
            vars.model,
            &vars.q[r.clone()],
            &mut pc.sq[r.clone()],
            &mut pc.cq[r.clone()],
            &mut pc.qnorm[r],
        );
    }

    fn calc_qdot(&self, d: &MobilizerDigest<'_>, qdot: &mut [f64]) {
        apply(&Self::n(d), false, d.u(), &mut qdot[d.node().q_range()]);
    }

    fn calc_qdotdot(&self, d: &MobilizerDigest<'_>, udot: &[f64], qdotdot: &mut [f64]) {
        let node = d.node();
        apply_second_order(
            &Self::n(d),
            &Self::n_dot(d),
            d.u(),
            &udot[node.u_range()],
            &mut qdotdot[node.q_range()],
        );
    }

    fn multiply_by_n(
        &self,
        d: &MobilizerDigest<'_>,
        matrix_on_right: bool,
        input: &[f64],
        out: &mut [f64],
    ) {
        apply(&Self::n(d), matrix_on_right, input, out);
    }

    fn multiply_by_n_inv(
        &self,
        d: &MobilizerDigest<'_>,
        matrix_on_right: bool,
        input: &[f64],
        out: &mut [f64],
    ) {
        apply(&Self::n_inv(d), matrix_on_right, input, out);
    }

    fn multiply_by_n_dot(
        &self,
        d: &MobilizerDigest<'_>,
        matrix_on_right: bool,
        input: &[f64],
        out: &mut [f64],
    ) {
        apply(&Self::n_dot(d), matrix_on_right, input, out);
    }

    fn max_nq(&self) -> usize {
        7
    }

    fn nq_in_use(&self, model: &ModelVars) -> usize {
        spherical::nq(model) + 3
    }

    fn is_using_quaternion(&self, model: &ModelVars) -> Option<usize> {
        (!model.use_euler_angles).then_some(0)
    }

    fn enforce_quaternion_constraints(
        &self,
        node: &NodeBase,
        model: &ModelVars,
        q: &mut [f64],
    ) -> bool {
        !model.use_euler_angles && normalize_quaternion(&mut q[node.q_range()])
    }

    fn set_default_position_values(&self, node: &NodeBase, model: &ModelVars, q: &mut [f64]) {
        spherical::set_identity(model, &mut q[node.q_range()]);
    }

    fn copy_q(&self, node: &NodeBase, model: &ModelVars, q_in: &[f64], q: &mut [f64]) {
        spherical::copy_leading(node, spherical::nq(model) + 3, q_in, q);
    }

    // Translations follow the rotation, so they move down one slot.
    fn convert_to_euler_angles(&self, node: &NodeBase, q_in: &[f64], q: &mut [f64]) {
        let p = node.from_vec3(q_in, 4);
        spherical::to_euler(node, q_in, q);
        node.to_vec3(q, 3, &p);
    }

    fn convert_to_quaternions(&self, node: &NodeBase, q_in: &[f64], q: &mut [f64]) {
        let p = node.from_vec3(q_in, 3);
        spherical::to_quaternion(node, q_in, q);
        node.to_vec3(q, 4, &p);
    }
}
