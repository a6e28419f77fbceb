//! The per-joint-type contract.
//!
//! A concrete joint type implements [`Mobilizer<N>`] for its dof count `N`.
//! It supplies the across-joint transform, the velocity Jacobian and its time
//! derivative, and the four fitting functions. Everything else has a default
//! that is correct for joints whose generalized coordinates are their
//! generalized speeds (`qdot == u`) and that never use quaternions.
//!
//! All required functions are written for the joint *as defined*: from its
//! fixed frame F0 to its moving frame M0. When a body is mobilized by a
//! reversed joint the node swaps the roles of the frames and routes the
//! Jacobians through [`Mobilizer::calc_reverse_mobilizer_h_fm`] and
//! [`Mobilizer::calc_reverse_mobilizer_hdot_fm`].

use std::fmt;

use mbs_types::{HType, SpatialVec, angular, linear, spatial_vec};
use nalgebra::{Isometry3, UnitQuaternion, Vector3};

use crate::cache::{PositionCache, VelocityCache};
use crate::node::NodeBase;
use crate::state::{DynamicsVars, InstanceVars, ModelVars, StateView, TimeVars};

/// How a joint's coordinate derivatives relate to its speeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QDotHandling {
    /// `qdot == u` and `qdotdot == udot`; N is the identity.
    #[default]
    SameAsU,
    /// The joint supplies its own `N(q)` mapping.
    JointSpecific,
}

/// Whether a joint stores part of its rotation as a quaternion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuaternionUse {
    /// Never: the coordinate count equals the dof count.
    #[default]
    Never,
    /// The rotational part may be a 4-coordinate quaternion.
    ForRotation,
}

/// Read-only view handed to a mobilizer while its node is being realized.
///
/// Gives the joint its own coordinates and speeds plus whichever per-node
/// cache entries have already been computed for the current stage.
#[derive(Clone, Copy)]
pub struct MobilizerDigest<'a> {
    node: &'a NodeBase,
    vars: StateView<'a>,
    position: &'a PositionCache,
    velocity: Option<&'a VelocityCache>,
}

impl fmt::Debug for MobilizerDigest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MobilizerDigest")
            .field("node", &self.node.node_num())
            .field("q", &self.q())
            .field("u", &self.u())
            .field("has_velocity", &self.velocity.is_some())
            .finish()
    }
}

impl<'a> MobilizerDigest<'a> {
    /// Digest for Position-stage work.
    #[must_use]
    pub fn new(node: &'a NodeBase, vars: StateView<'a>, position: &'a PositionCache) -> Self {
        Self {
            node,
            vars,
            position,
            velocity: None,
        }
    }

    /// Same digest with Velocity-stage results attached.
    #[must_use]
    pub fn with_velocity(mut self, velocity: &'a VelocityCache) -> Self {
        self.velocity = Some(velocity);
        self
    }

    /// The node being realized.
    #[must_use]
    pub fn node(&self) -> &'a NodeBase {
        self.node
    }

    /// Modeling choices of the state.
    #[must_use]
    pub fn model(&self) -> &'a ModelVars {
        self.vars.model
    }

    /// This joint's coordinates (`max_nq` entries).
    #[must_use]
    pub fn q(&self) -> &'a [f64] {
        &self.vars.q[self.node.q_range()]
    }

    /// This joint's speeds (`dof` entries).
    #[must_use]
    pub fn u(&self) -> &'a [f64] {
        &self.vars.u[self.node.u_range()]
    }

    /// Sines of this joint's coordinates.
    #[must_use]
    pub fn sin_q(&self) -> &'a [f64] {
        &self.position.sq[self.node.q_range()]
    }

    /// Cosines of this joint's coordinates.
    #[must_use]
    pub fn cos_q(&self) -> &'a [f64] {
        &self.position.cq[self.node.q_range()]
    }

    /// Normalized coordinates (meaningful only for quaternion joints).
    #[must_use]
    pub fn q_norm(&self) -> &'a [f64] {
        &self.position.qnorm[self.node.q_range()]
    }

    /// Across-joint transform actually in use (already inverted if reversed).
    #[must_use]
    pub fn x_fm(&self) -> &'a Isometry3<f64> {
        &self.position.x_fm[self.node.node_num()]
    }

    /// Across-joint transform of the joint as defined.
    #[must_use]
    pub fn x_f0m0(&self) -> Isometry3<f64> {
        let x_fm = self.x_fm();
        if self.node.is_reversed() {
            x_fm.inverse()
        } else {
            *x_fm
        }
    }

    /// Across-joint spatial velocity `V_FM`, in F.
    ///
    /// # Panics
    ///
    /// Panics if the Velocity stage has not been realized for this node.
    #[must_use]
    pub fn v_fm(&self) -> &'a SpatialVec {
        let Some(vc) = self.velocity else {
            panic!(
                "V_FM of body {} requested before velocities were realized",
                self.node.node_num()
            );
        };
        &vc.v_fm[self.node.node_num()]
    }
}

/// Re-express an as-defined Jacobian `H_MF` as `H_FM` for a reversed joint.
///
/// `x_fm` is the reversed transform in use. Each column is rotated into F,
/// its reference point moved from OF to OM, then negated: the velocity of M
/// relative to F is the opposite of the velocity of F relative to M at the
/// same point.
#[must_use]
pub fn reverse_velocity_jacobian<const N: usize>(
    x_fm: &Isometry3<f64>,
    h_mf: &HType<N>,
) -> HType<N> {
    let r_fm = &x_fm.rotation;
    let p_fm = &x_fm.translation.vector;
    let mut h_fm = HType::<N>::zeros();
    for (j, col) in h_mf.column_iter().enumerate() {
        let w = r_fm * Vector3::new(col[0], col[1], col[2]);
        let v = r_fm * Vector3::new(col[3], col[4], col[5]);
        h_fm.set_column(j, &-spatial_vec(&w, &(v + w.cross(p_fm))));
    }
    h_fm
}

/// Undo [`reverse_velocity_jacobian`] for one velocity.
///
/// Given the reversed transform `x_fm` in use and a velocity `v_fm` of M in
/// F, returns the as-defined `V_MF`: the velocity of F relative to M,
/// expressed in M, about OF.
#[must_use]
pub fn as_defined_velocity(x_fm: &Isometry3<f64>, v_fm: &SpatialVec) -> SpatialVec {
    let r_mf = x_fm.rotation.inverse();
    let w = angular(v_fm);
    let v = linear(v_fm) - w.cross(&x_fm.translation.vector);
    -spatial_vec(&(r_mf * w), &(r_mf * v))
}

/// Time derivative, taken in F, of [`reverse_velocity_jacobian`].
///
/// `v_fm` is the reversed across-joint velocity `V_FM` (expressed in F).
/// Vectors rotated from M pick up `w_FM ×` terms and the `OF → OM` shift
/// picks up the motion of OM.
#[must_use]
pub fn reverse_velocity_jacobian_dot<const N: usize>(
    x_fm: &Isometry3<f64>,
    v_fm: &SpatialVec,
    h_mf: &HType<N>,
    hdot_mf: &HType<N>,
) -> HType<N> {
    let r_fm = &x_fm.rotation;
    let p_fm = &x_fm.translation.vector;
    let w_fm = angular(v_fm);
    let v_om = linear(v_fm);
    let mut hdot_fm = HType::<N>::zeros();
    for j in 0..N {
        let col = h_mf.column(j);
        let dcol = hdot_mf.column(j);
        let w = r_fm * Vector3::new(col[0], col[1], col[2]);
        let v = r_fm * Vector3::new(col[3], col[4], col[5]);
        let wd = r_fm * Vector3::new(dcol[0], dcol[1], dcol[2]) + w_fm.cross(&w);
        let vd = r_fm * Vector3::new(dcol[3], dcol[4], dcol[5]) + w_fm.cross(&v);
        let lin = vd + wd.cross(p_fm) + w.cross(&v_om);
        hdot_fm.set_column(j, &-spatial_vec(&wd, &lin));
    }
    hdot_fm
}

/// Capabilities a joint type provides for a node with `N` degrees of freedom.
///
/// Global-array arguments (`q`, `u`, `qdot`, ...) are whole-tree vectors; a
/// joint reads and writes only its own slots through [`NodeBase`].
pub trait Mobilizer<const N: usize>: fmt::Debug + Send + Sync {
    // ===== Required =====

    /// `X_F0M0` for the joint as defined, from the current coordinates.
    fn calc_across_joint_transform(&self, d: &MobilizerDigest<'_>) -> Isometry3<f64>;

    /// `H_F0M0`: columns map each speed to a spatial velocity of M0 in F0.
    fn calc_across_joint_velocity_jacobian(&self, d: &MobilizerDigest<'_>) -> HType<N>;

    /// Time derivative in F0 of `H_F0M0`. May be zero.
    fn calc_across_joint_velocity_jacobian_dot(&self, d: &MobilizerDigest<'_>) -> HType<N>;

    /// Choose coordinates whose rotation best matches `r_fm`.
    fn set_q_to_fit_rotation(
        &self,
        node: &NodeBase,
        model: &ModelVars,
        r_fm: &UnitQuaternion<f64>,
        q: &mut [f64],
    );

    /// Choose coordinates whose translation best matches `p_fm`.
    fn set_q_to_fit_translation(
        &self,
        node: &NodeBase,
        model: &ModelVars,
        p_fm: &Vector3<f64>,
        q: &mut [f64],
    );

    /// Choose speeds whose angular velocity best matches `w_fm`.
    fn set_u_to_fit_angular_velocity(
        &self,
        node: &NodeBase,
        q: &[f64],
        w_fm: &Vector3<f64>,
        u: &mut [f64],
    );

    /// Choose speeds whose linear velocity best matches `v_fm`.
    fn set_u_to_fit_linear_velocity(
        &self,
        node: &NodeBase,
        q: &[f64],
        v_fm: &Vector3<f64>,
        u: &mut [f64],
    );

    // ===== Modes =====

    /// Coordinate-derivative mapping this joint uses.
    fn qdot_handling(&self) -> QDotHandling {
        QDotHandling::SameAsU
    }

    /// Whether this joint ever stores a quaternion.
    fn quaternion_use(&self) -> QuaternionUse {
        QuaternionUse::Never
    }

    // ===== Fitting =====

    /// Fit rotation first, then translation.
    fn set_q_to_fit_transform(
        &self,
        node: &NodeBase,
        model: &ModelVars,
        x_fm: &Isometry3<f64>,
        q: &mut [f64],
    ) {
        self.set_q_to_fit_rotation(node, model, &x_fm.rotation, q);
        self.set_q_to_fit_translation(node, model, &x_fm.translation.vector, q);
    }

    /// Fit angular velocity first, then linear.
    fn set_u_to_fit_velocity(&self, node: &NodeBase, q: &[f64], v_fm: &SpatialVec, u: &mut [f64]) {
        self.set_u_to_fit_angular_velocity(node, q, &angular(v_fm), u);
        self.set_u_to_fit_linear_velocity(node, q, &linear(v_fm), u);
    }

    // ===== Position-stage helpers =====

    /// Fill this joint's `sq`, `cq` and `qnorm` slots and its `q_err` entry.
    ///
    /// The default takes the sine and cosine of each of the first `N`
    /// coordinates; `qnorm` and `q_err` are left alone.
    fn calc_joint_sin_cos_q_norm(
        &self,
        node: &NodeBase,
        vars: &StateView<'_>,
        pc: &mut PositionCache,
        _q_err: &mut [f64],
    ) {
        let q0 = node.q_index();
        for (i, &qi) in vars.q[q0..q0 + N].iter().enumerate() {
            let (s, c) = qi.sin_cos();
            pc.sq[q0 + i] = s;
            pc.cq[q0 + i] = c;
        }
    }

    /// `H_FM` for a reversed joint, from the as-defined `H_MF`.
    fn calc_reverse_mobilizer_h_fm(&self, d: &MobilizerDigest<'_>) -> HType<N> {
        reverse_velocity_jacobian(d.x_fm(), &self.calc_across_joint_velocity_jacobian(d))
    }

    /// `HDot_FM` for a reversed joint, from the as-defined `H_MF` and `HDot_MF`.
    fn calc_reverse_mobilizer_hdot_fm(&self, d: &MobilizerDigest<'_>) -> HType<N> {
        reverse_velocity_jacobian_dot(
            d.x_fm(),
            d.v_fm(),
            &self.calc_across_joint_velocity_jacobian(d),
            &self.calc_across_joint_velocity_jacobian_dot(d),
        )
    }

    // ===== Coordinate derivatives =====

    /// `qdot = N(q) u` for this joint's slots.
    fn calc_qdot(&self, d: &MobilizerDigest<'_>, qdot: &mut [f64]) {
        assert_same_as_u(d.node(), "calc_qdot");
        let q0 = d.node().q_index();
        qdot[q0..q0 + N].copy_from_slice(d.u());
    }

    /// `qdotdot = N(q) udot + NDot(q, u) u` for this joint's slots.
    fn calc_qdotdot(&self, d: &MobilizerDigest<'_>, udot: &[f64], qdotdot: &mut [f64]) {
        assert_same_as_u(d.node(), "calc_qdotdot");
        let node = d.node();
        let q0 = node.q_index();
        qdotdot[q0..q0 + N].copy_from_slice(&udot[node.u_range()]);
    }

    /// `out = N * input`, or `out = inputᵀ * N` when `matrix_on_right`.
    fn multiply_by_n(
        &self,
        d: &MobilizerDigest<'_>,
        _matrix_on_right: bool,
        input: &[f64],
        out: &mut [f64],
    ) {
        assert_same_as_u(d.node(), "multiply_by_n");
        out[..N].copy_from_slice(&input[..N]);
    }

    /// `out = N⁻¹ * input`, or `out = inputᵀ * N⁻¹` when `matrix_on_right`.
    fn multiply_by_n_inv(
        &self,
        d: &MobilizerDigest<'_>,
        _matrix_on_right: bool,
        input: &[f64],
        out: &mut [f64],
    ) {
        assert_same_as_u(d.node(), "multiply_by_n_inv");
        out[..N].copy_from_slice(&input[..N]);
    }

    /// `out = NDot * input`, or `out = inputᵀ * NDot` when `matrix_on_right`.
    ///
    /// Zero when `N` is the identity. Joints with their own mapping must
    /// override this together with [`Mobilizer::calc_qdotdot`].
    fn multiply_by_n_dot(
        &self,
        d: &MobilizerDigest<'_>,
        _matrix_on_right: bool,
        _input: &[f64],
        out: &mut [f64],
    ) {
        assert_same_as_u(d.node(), "multiply_by_n_dot");
        out[..N].fill(0.0);
    }

    // ===== Coordinate counts and quaternions =====

    /// Coordinate slots reserved for this joint.
    fn max_nq(&self) -> usize {
        assert_no_quaternion(self.quaternion_use(), "max_nq");
        N
    }

    /// Coordinates in use under the current modeling choices.
    fn nq_in_use(&self, _model: &ModelVars) -> usize {
        assert_no_quaternion(self.quaternion_use(), "nq_in_use");
        N
    }

    /// Speeds in use. Always the dof count.
    fn nu_in_use(&self, _model: &ModelVars) -> usize {
        N
    }

    /// Offset of the quaternion within this joint's coordinates, if one is in use.
    fn is_using_quaternion(&self, _model: &ModelVars) -> Option<usize> {
        assert_no_quaternion(self.quaternion_use(), "is_using_quaternion");
        None
    }

    /// Renormalize any quaternion in this joint's coordinates in place.
    ///
    /// Returns `true` if a coordinate changed.
    fn enforce_quaternion_constraints(
        &self,
        _node: &NodeBase,
        _model: &ModelVars,
        _q: &mut [f64],
    ) -> bool {
        assert_no_quaternion(self.quaternion_use(), "enforce_quaternion_constraints");
        false
    }

    /// Copy this joint's coordinates in use from `q_in` into `q`.
    fn copy_q(&self, node: &NodeBase, _model: &ModelVars, q_in: &[f64], q: &mut [f64]) {
        assert_no_quaternion(self.quaternion_use(), "copy_q");
        node.to_q::<N>(q, &node.from_q::<N>(q_in));
    }

    /// Rewrite this joint's coordinates from quaternion form in `q_in` to
    /// Euler-angle form in `q`, keeping the pose. Joints without a
    /// quaternion copy.
    fn convert_to_euler_angles(&self, node: &NodeBase, q_in: &[f64], q: &mut [f64]) {
        assert_no_quaternion(self.quaternion_use(), "convert_to_euler_angles");
        node.to_q::<N>(q, &node.from_q::<N>(q_in));
    }

    /// Rewrite this joint's coordinates from Euler-angle form in `q_in` to
    /// quaternion form in `q`, keeping the pose. Joints without a
    /// quaternion copy.
    fn convert_to_quaternions(&self, node: &NodeBase, q_in: &[f64], q: &mut [f64]) {
        assert_no_quaternion(self.quaternion_use(), "convert_to_quaternions");
        node.to_q::<N>(q, &node.from_q::<N>(q_in));
    }

    // ===== Default values =====

    /// Model-stage defaults.
    fn set_default_model_values(&self, _node: &NodeBase, _model: &mut ModelVars) {}

    /// Instance-stage defaults.
    fn set_default_instance_values(&self, _node: &NodeBase, _instance: &mut InstanceVars) {}

    /// Time-stage defaults.
    fn set_default_time_values(&self, _node: &NodeBase, _time: &mut TimeVars) {}

    /// Position-stage defaults: zero coordinates.
    fn set_default_position_values(&self, node: &NodeBase, _model: &ModelVars, q: &mut [f64]) {
        q[node.q_range()].fill(0.0);
    }

    /// Velocity-stage defaults: zero speeds.
    fn set_default_velocity_values(&self, node: &NodeBase, u: &mut [f64]) {
        u[node.u_range()].fill(0.0);
    }

    /// Dynamics-stage defaults.
    fn set_default_dynamics_values(&self, _node: &NodeBase, _dynamics: &mut DynamicsVars) {}

    /// Acceleration-stage defaults.
    fn set_default_acceleration_values(&self, _node: &NodeBase, _dynamics: &mut DynamicsVars) {}
}

#[track_caller]
fn assert_same_as_u(node: &NodeBase, what: &str) {
    assert!(
        node.qdot_handling() == QDotHandling::SameAsU,
        "body {}: joint with its own qdot mapping must override {what}",
        node.node_num()
    );
}

#[track_caller]
fn assert_no_quaternion(quaternion_use: QuaternionUse, what: &str) {
    assert!(
        quaternion_use == QuaternionUse::Never,
        "quaternion joint must override {what}"
    );
}
