//! Mobilizer-independent node data: topology, frames, slots.

use std::ops::Range;

use mbs_types::{
    MassProperties, PhiMatrix, SpatialMat, SpatialVec, angular, linear, spatial_inertia,
    spatial_vec,
};
use nalgebra::{Isometry3, SMatrix, SVector, Vector3, Vector4};

use crate::cache::{DynamicsCache, PositionCache, VelocityCache};
use crate::mobilizer::{QDotHandling, QuaternionUse};
use crate::state::InstanceVars;

/// Running totals used to hand out state slots, one node at a time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotCounter {
    /// Next free coordinate slot.
    pub next_q: usize,
    /// Next free speed slot.
    pub next_u: usize,
    /// Next free squared-speed slot.
    pub next_u_sq: usize,
}

/// How a body is attached to its parent.
#[derive(Debug, Clone, PartialEq)]
pub struct BodySpec {
    /// Mass properties of the body.
    pub mass_properties: MassProperties,
    /// Joint fixed frame F in the parent body frame.
    pub x_pf: Isometry3<f64>,
    /// Joint moving frame M in this body's frame.
    pub x_bm: Isometry3<f64>,
    /// Whether the joint is used upside-down.
    pub reversed: bool,
}

impl BodySpec {
    /// Body with coincident joint frames.
    #[must_use]
    pub fn new(mass_properties: MassProperties) -> Self {
        Self {
            mass_properties,
            x_pf: Isometry3::identity(),
            x_bm: Isometry3::identity(),
            reversed: false,
        }
    }

    /// Place the joint's fixed frame on the parent.
    #[must_use]
    pub fn with_inboard_frame(mut self, x_pf: Isometry3<f64>) -> Self {
        self.x_pf = x_pf;
        self
    }

    /// Place the joint's moving frame on this body.
    #[must_use]
    pub fn with_outboard_frame(mut self, x_bm: Isometry3<f64>) -> Self {
        self.x_bm = x_bm;
        self
    }

    /// Use the joint reversed: its as-defined moving frame is attached to the
    /// parent and its fixed frame to this body.
    #[must_use]
    pub fn reversed(mut self) -> Self {
        self.reversed = true;
        self
    }
}

/// Data every node carries regardless of its joint type.
///
/// Immutable once the tree is built.
#[derive(Debug, Clone)]
pub struct NodeBase {
    node_num: usize,
    parent: usize,
    children: Vec<usize>,
    level: usize,

    mass_properties: MassProperties,
    x_pf: Isometry3<f64>,
    x_bm: Isometry3<f64>,
    x_mb: Isometry3<f64>,
    reversed: bool,

    qdot_handling: QDotHandling,
    quaternion_use: QuaternionUse,

    dof: usize,
    max_nq: usize,
    q_index: usize,
    u_index: usize,
    u_sq_index: usize,
}

impl NodeBase {
    /// The ground node: body 0, no dof, no slots.
    #[must_use]
    pub fn ground() -> Self {
        Self {
            node_num: 0,
            parent: 0,
            children: Vec::new(),
            level: 0,
            mass_properties: MassProperties::point_mass(f64::INFINITY),
            x_pf: Isometry3::identity(),
            x_bm: Isometry3::identity(),
            x_mb: Isometry3::identity(),
            reversed: false,
            qdot_handling: QDotHandling::SameAsU,
            quaternion_use: QuaternionUse::Never,
            dof: 0,
            max_nq: 0,
            q_index: 0,
            u_index: 0,
            u_sq_index: 0,
        }
    }

    /// A mobilized body. Slots are assigned later by [`NodeBase::update_slots`].
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        node_num: usize,
        parent: usize,
        level: usize,
        spec: &BodySpec,
        dof: usize,
        max_nq: usize,
        qdot_handling: QDotHandling,
        quaternion_use: QuaternionUse,
    ) -> Self {
        Self {
            node_num,
            parent,
            children: Vec::new(),
            level,
            mass_properties: spec.mass_properties,
            x_pf: spec.x_pf,
            x_bm: spec.x_bm,
            x_mb: spec.x_bm.inverse(),
            reversed: spec.reversed,
            qdot_handling,
            quaternion_use,
            dof,
            max_nq,
            q_index: 0,
            u_index: 0,
            u_sq_index: 0,
        }
    }

    /// Take the next `dof`, `dof²` and `max_nq` slots from `counter`.
    pub fn update_slots(&mut self, counter: &mut SlotCounter) {
        self.u_index = counter.next_u;
        self.u_sq_index = counter.next_u_sq;
        self.q_index = counter.next_q;
        counter.next_u += self.dof;
        counter.next_u_sq += self.dof * self.dof;
        counter.next_q += self.max_nq;
    }

    pub(crate) fn add_child(&mut self, child: usize) {
        self.children.push(child);
    }

    // ==================== Topology and frames ====================

    /// Body number; ground is 0.
    #[must_use]
    pub fn node_num(&self) -> usize {
        self.node_num
    }

    /// Parent body number (ground is its own parent).
    #[must_use]
    pub fn parent(&self) -> usize {
        self.parent
    }

    /// Child body numbers.
    #[must_use]
    pub fn children(&self) -> &[usize] {
        &self.children
    }

    /// Distance from ground.
    #[must_use]
    pub fn level(&self) -> usize {
        self.level
    }

    /// Whether this is the ground node.
    #[must_use]
    pub fn is_ground(&self) -> bool {
        self.node_num == 0
    }

    /// Mass properties supplied at construction.
    #[must_use]
    pub fn mass_properties(&self) -> &MassProperties {
        &self.mass_properties
    }

    /// Joint fixed frame F in the parent frame.
    #[must_use]
    pub fn x_pf(&self) -> &Isometry3<f64> {
        &self.x_pf
    }

    /// Joint moving frame M in this body's frame.
    #[must_use]
    pub fn x_bm(&self) -> &Isometry3<f64> {
        &self.x_bm
    }

    /// Body frame in the joint moving frame, `X_BM⁻¹`.
    #[must_use]
    pub fn x_mb(&self) -> &Isometry3<f64> {
        &self.x_mb
    }

    /// Whether the joint is used reversed.
    #[must_use]
    pub fn is_reversed(&self) -> bool {
        self.reversed
    }

    /// Coordinate-derivative mapping of the joint.
    #[must_use]
    pub fn qdot_handling(&self) -> QDotHandling {
        self.qdot_handling
    }

    /// Quaternion usage of the joint.
    #[must_use]
    pub fn quaternion_use(&self) -> QuaternionUse {
        self.quaternion_use
    }

    // ==================== Slots ====================

    /// Degrees of freedom.
    #[must_use]
    pub fn dof(&self) -> usize {
        self.dof
    }

    /// Coordinate slots reserved.
    #[must_use]
    pub fn max_nq(&self) -> usize {
        self.max_nq
    }

    /// First coordinate slot.
    #[must_use]
    pub fn q_index(&self) -> usize {
        self.q_index
    }

    /// First speed slot.
    #[must_use]
    pub fn u_index(&self) -> usize {
        self.u_index
    }

    /// First squared-speed slot.
    #[must_use]
    pub fn u_sq_index(&self) -> usize {
        self.u_sq_index
    }

    /// Reserved coordinate slots.
    #[must_use]
    pub fn q_range(&self) -> Range<usize> {
        self.q_index..self.q_index + self.max_nq
    }

    /// Speed slots.
    #[must_use]
    pub fn u_range(&self) -> Range<usize> {
        self.u_index..self.u_index + self.dof
    }

    /// Squared-speed slots.
    #[must_use]
    pub fn u_sq_range(&self) -> Range<usize> {
        self.u_sq_index..self.u_sq_index + self.dof * self.dof
    }

    /// First `N` coordinates as a fixed-size vector.
    #[must_use]
    pub fn from_q<const N: usize>(&self, q: &[f64]) -> SVector<f64, N> {
        SVector::from_column_slice(&q[self.q_index..self.q_index + N])
    }

    /// Write the first `N` coordinates.
    pub fn to_q<const N: usize>(&self, q: &mut [f64], v: &SVector<f64, N>) {
        q[self.q_index..self.q_index + N].copy_from_slice(v.as_slice());
    }

    /// This node's speeds (or any per-speed quantity) as a fixed-size vector.
    #[must_use]
    pub fn from_u<const N: usize>(&self, u: &[f64]) -> SVector<f64, N> {
        debug_assert_eq!(N, self.dof);
        SVector::from_column_slice(&u[self.u_index..self.u_index + N])
    }

    /// Write this node's speeds (or any per-speed quantity).
    pub fn to_u<const N: usize>(&self, u: &mut [f64], v: &SVector<f64, N>) {
        debug_assert_eq!(N, self.dof);
        u[self.u_index..self.u_index + N].copy_from_slice(v.as_slice());
    }

    /// This node's N×N block of a per-speed-squared array.
    #[must_use]
    pub fn from_u_sq<const N: usize>(&self, usq: &[f64]) -> SMatrix<f64, N, N> {
        debug_assert_eq!(N, self.dof);
        SMatrix::from_column_slice(&usq[self.u_sq_range()])
    }

    /// Write this node's N×N block of a per-speed-squared array.
    pub fn to_u_sq<const N: usize>(&self, usq: &mut [f64], m: &SMatrix<f64, N, N>) {
        debug_assert_eq!(N, self.dof);
        usq[self.u_sq_range()].copy_from_slice(m.as_slice());
    }

    /// Quaternion stored in the first four coordinates, `[w, x, y, z]`.
    #[must_use]
    pub fn from_quat(&self, q: &[f64]) -> Vector4<f64> {
        Vector4::from_column_slice(&q[self.q_index..self.q_index + 4])
    }

    /// Write a quaternion into the first four coordinates.
    pub fn to_quat(&self, q: &mut [f64], quat: &Vector4<f64>) {
        q[self.q_index..self.q_index + 4].copy_from_slice(quat.as_slice());
    }

    /// Three coordinates starting `offset` slots into this node's coordinates.
    #[must_use]
    pub fn from_vec3(&self, q: &[f64], offset: usize) -> Vector3<f64> {
        let i = self.q_index + offset;
        Vector3::from_column_slice(&q[i..i + 3])
    }

    /// Write three coordinates starting `offset` slots in.
    pub fn to_vec3(&self, q: &mut [f64], offset: usize, v: &Vector3<f64>) {
        let i = self.q_index + offset;
        q[i..i + 3].copy_from_slice(v.as_slice());
    }

    // ==================== Cached per-body quantities ====================

    /// `X_GB` of this body.
    #[must_use]
    pub fn get_x_gb<'a>(&self, pc: &'a PositionCache) -> &'a Isometry3<f64> {
        &pc.x_gb[self.node_num]
    }

    /// `X_GP`: ground transform of the parent.
    #[must_use]
    pub fn get_x_gp<'a>(&self, pc: &'a PositionCache) -> &'a Isometry3<f64> {
        &pc.x_gb[self.parent]
    }

    /// Parent-to-child shift of this body.
    #[must_use]
    pub fn get_phi<'a>(&self, pc: &'a PositionCache) -> &'a PhiMatrix {
        &pc.phi[self.node_num]
    }

    /// Spatial inertia about the body origin, in ground.
    #[must_use]
    pub fn get_mk<'a>(&self, pc: &'a PositionCache) -> &'a SpatialMat {
        &pc.mk[self.node_num]
    }

    /// `V_GB` of this body.
    #[must_use]
    pub fn get_v_gb<'a>(&self, vc: &'a VelocityCache) -> &'a SpatialVec {
        &vc.v_gb[self.node_num]
    }

    /// `V_GP`: ground velocity of the parent.
    #[must_use]
    pub fn get_v_gp<'a>(&self, vc: &'a VelocityCache) -> &'a SpatialVec {
        &vc.v_gb[self.parent]
    }

    // ==================== Mobilizer-independent kinematics ====================

    /// Shift operator, COM and inertias in ground. Requires `X_GB`.
    pub(crate) fn calc_joint_independent_kinematics_pos(
        &self,
        instance: &InstanceVars,
        pc: &mut PositionCache,
    ) {
        let b = self.node_num;
        let p_gb = pc.x_gb[b].translation.vector;
        let p_gp = pc.x_gb[self.parent].translation.vector;
        pc.phi[b] = PhiMatrix::new(p_gb - p_gp);

        let mp = &instance.mass_properties[b];
        let (com_g, inertia_ob_g) = mp.reexpress(&pc.x_gb[b].rotation.to_rotation_matrix());
        pc.mk[b] = spatial_inertia(mp.mass, &com_g, &inertia_ob_g);
        pc.com_g[b] = com_g;
        pc.inertia_ob_g[b] = inertia_ob_g;
    }

    /// `V_GB = phiᵀ V_GP + V_PB_G`. Requires `V_PB_G`.
    pub(crate) fn calc_joint_independent_kinematics_vel(
        &self,
        pc: &PositionCache,
        vc: &mut VelocityCache,
    ) {
        let b = self.node_num;
        vc.v_gb[b] = pc.phi[b].transpose_shift_motion(&vc.v_gb[self.parent]) + vc.v_pb_g[b];
    }

    /// Coriolis acceleration and gyroscopic force. Requires `VD_PB_G`.
    pub(crate) fn calc_joint_independent_dynamics_vel(
        &self,
        instance: &InstanceVars,
        pc: &PositionCache,
        vc: &VelocityCache,
        dc: &mut DynamicsCache,
    ) {
        let b = self.node_num;
        let v_gb = &vc.v_gb[b];
        let v_gp = &vc.v_gb[self.parent];
        let w_gp = angular(v_gp);

        dc.coriolis[b] =
            spatial_vec(&Vector3::zeros(), &w_gp.cross(&(linear(v_gb) - linear(v_gp))))
                + dc.vd_pb_g[b];

        let w = angular(v_gb);
        let mass = instance.mass_properties[b].mass;
        let com = &pc.com_g[b];
        dc.gyroscopic[b] = spatial_vec(
            &w.cross(&(pc.inertia_ob_g[b] * w)),
            &(w.cross(&w.cross(com)) * mass),
        );
    }
}
