//! Append-only tree of mobilized bodies and the sweeps over it.
//!
//! Bodies are appended after their parent, so index order is a valid
//! base-to-tip order and reverse index order a valid tip-to-base order.
//! The topology never changes once bodies are added; everything that
//! varies lives in a [`TreeState`].

use mbs_types::{DynamicsConfig, MultibodyError, Result, SpatialVec, Stage, spatial_vec};
use nalgebra::{DVector, Isometry3, Vector3};

use crate::cache::{AccelerationCache, DynamicsCache, PositionCache};
use crate::mobilizer::Mobilizer;
use crate::node::{BodySpec, GroundNode, NodeBase, RigidBodyNode, RigidBodyNodeSpec, SlotCounter};
use crate::state::{InstanceVars, ModelVars, StateView, TreeState};

/// A tree of rigid bodies connected by mobilizers, rooted at ground.
#[derive(Debug)]
pub struct MultibodyTree {
    nodes: Vec<Box<dyn RigidBodyNode>>,
    slots: SlotCounter,
    config: DynamicsConfig,
}

impl MultibodyTree {
    /// A tree holding only ground.
    pub fn new(config: DynamicsConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            nodes: vec![Box::new(GroundNode::new())],
            slots: SlotCounter::default(),
            config,
        })
    }

    /// Append a body mobilized by `mobilizer` relative to `parent`.
    ///
    /// Returns the new body number.
    pub fn add_body<M, const N: usize>(
        &mut self,
        parent: usize,
        spec: BodySpec,
        mobilizer: M,
    ) -> Result<usize>
    where
        M: Mobilizer<N> + 'static,
    {
        let num_bodies = self.nodes.len();
        let Some(parent_node) = self.nodes.get_mut(parent) else {
            return Err(MultibodyError::InvalidParent { parent, num_bodies });
        };
        spec.mass_properties.validate()?;

        let level = parent_node.base().level() + 1;
        let mut base = NodeBase::new(
            num_bodies,
            parent,
            level,
            &spec,
            N,
            mobilizer.max_nq(),
            mobilizer.qdot_handling(),
            mobilizer.quaternion_use(),
        );
        base.update_slots(&mut self.slots);
        parent_node.base_mut().add_child(num_bodies);

        tracing::debug!(
            body = num_bodies,
            parent,
            dof = N,
            nq = base.max_nq(),
            reversed = spec.reversed,
            "added mobilized body"
        );
        self.nodes
            .push(Box::new(RigidBodyNodeSpec::new(base, mobilizer)));
        Ok(num_bodies)
    }

    /// Allocate a state and install every node's default values.
    #[must_use]
    pub fn make_state(&self) -> TreeState {
        let mut state = TreeState::allocate(
            self.nodes.len(),
            self.slots.next_q,
            self.slots.next_u,
            self.slots.next_u_sq,
        );
        state.model.use_euler_angles = self.config.use_euler_angles;

        for node in &self.nodes {
            node.set_default_model_values(&mut state.model);
            node.set_default_instance_values(&mut state.instance);
            node.set_default_time_values(&mut state.time);
            node.set_default_position_values(&state.model, state.q.as_mut_slice());
            node.set_default_velocity_values(state.u.as_mut_slice());
            node.set_default_dynamics_values(&mut state.dynamics_vars);
            node.set_default_acceleration_values(&mut state.dynamics_vars);
        }

        tracing::debug!(
            bodies = self.nodes.len(),
            nq = self.slots.next_q,
            nu = self.slots.next_u,
            "made state"
        );
        state
    }

    // ==================== Topology ====================

    /// Bodies, ground included.
    #[must_use]
    pub fn num_bodies(&self) -> usize {
        self.nodes.len()
    }

    /// Total coordinate slots.
    #[must_use]
    pub fn nq(&self) -> usize {
        self.slots.next_q
    }

    /// Total speeds.
    #[must_use]
    pub fn nu(&self) -> usize {
        self.slots.next_u
    }

    /// Coordinates in use under the state's modeling choices.
    #[must_use]
    pub fn nq_in_use(&self, state: &TreeState) -> usize {
        self.nodes
            .iter()
            .map(|n| n.nq_in_use(&state.model))
            .sum()
    }

    /// Node for body `body`.
    #[must_use]
    pub fn node(&self, body: usize) -> Option<&dyn RigidBodyNode> {
        self.nodes.get(body).map(AsRef::as_ref)
    }

    /// Shared configuration.
    #[must_use]
    pub fn config(&self) -> &DynamicsConfig {
        &self.config
    }

    // ==================== Realize ====================

    /// Realize every stage up to and including `target`.
    pub fn realize(&self, state: &mut TreeState, target: Stage) -> Result<()> {
        while state.stage() < target {
            match state.stage() {
                Stage::Empty | Stage::Topology => self.realize_model(state)?,
                Stage::Model => self.realize_instance(state)?,
                Stage::Instance => self.realize_time(state)?,
                Stage::Time => self.realize_position(state)?,
                Stage::Position => self.realize_velocity(state)?,
                Stage::Velocity => self.realize_dynamics(state)?,
                Stage::Dynamics => self.realize_acceleration(state)?,
                Stage::Acceleration => self.realize_report(state)?,
                Stage::Report => break,
            }
        }
        Ok(())
    }

    /// Model stage: per-node hooks only.
    pub fn realize_model(&self, state: &mut TreeState) -> Result<()> {
        self.realize_hooks(state, Stage::Model, |node, vars| node.realize_model(vars))
    }

    /// Instance stage: per-node hooks only.
    pub fn realize_instance(&self, state: &mut TreeState) -> Result<()> {
        self.realize_hooks(state, Stage::Instance, |node, vars| node.realize_instance(vars))
    }

    /// Time stage: per-node hooks only.
    pub fn realize_time(&self, state: &mut TreeState) -> Result<()> {
        self.realize_hooks(state, Stage::Time, |node, vars| node.realize_time(vars))
    }

    /// Position stage, base to tip.
    pub fn realize_position(&self, state: &mut TreeState) -> Result<()> {
        begin(state, Stage::Position)?;
        let TreeState {
            model,
            instance,
            q,
            u,
            q_err,
            position,
            ..
        } = &mut *state;
        let vars = StateView {
            model,
            instance,
            q: q.as_slice(),
            u: u.as_slice(),
        };
        for node in &self.nodes {
            node.realize_position(&vars, q_err, position);
        }
        finish(state, Stage::Position);
        Ok(())
    }

    /// Velocity stage, base to tip.
    pub fn realize_velocity(&self, state: &mut TreeState) -> Result<()> {
        begin(state, Stage::Velocity)?;
        let TreeState {
            model,
            instance,
            q,
            u,
            qdot,
            position,
            velocity,
            ..
        } = &mut *state;
        let vars = StateView {
            model,
            instance,
            q: q.as_slice(),
            u: u.as_slice(),
        };
        for node in &self.nodes {
            node.realize_velocity(&vars, position, qdot.as_mut_slice(), velocity);
        }
        finish(state, Stage::Velocity);
        Ok(())
    }

    /// Dynamics stage: bias terms base to tip, articulated-body inertias tip
    /// to base, then `Y` base to tip.
    pub fn realize_dynamics(&self, state: &mut TreeState) -> Result<()> {
        begin(state, Stage::Dynamics)?;
        let TreeState {
            model,
            instance,
            q,
            u,
            position,
            velocity,
            dynamics,
            ..
        } = &mut *state;
        let vars = StateView {
            model,
            instance,
            q: q.as_slice(),
            u: u.as_slice(),
        };
        for node in &self.nodes {
            node.realize_dynamics(&vars, position, velocity, dynamics);
        }
        for node in self.nodes.iter().rev() {
            node.calc_articulated_body_inertias_inward(position, dynamics)?;
        }
        for node in &self.nodes {
            node.calc_y_outward(position, dynamics);
        }
        finish(state, Stage::Dynamics);
        Ok(())
    }

    /// Acceleration stage: forward dynamics under the state's applied forces
    /// plus gravity, then `qdotdot`.
    pub fn realize_acceleration(&self, state: &mut TreeState) -> Result<()> {
        begin(state, Stage::Acceleration)?;
        self.check_u("mobility forces", state.dynamics_vars.mobility_forces.as_slice())?;
        self.check_bodies("body forces", &state.dynamics_vars.body_forces)?;
        let TreeState {
            model,
            instance,
            q,
            u,
            dynamics_vars,
            udot,
            qdotdot,
            position,
            dynamics,
            acceleration,
            ..
        } = &mut *state;

        let gravity = gravity_forces(position, instance, &self.config.gravity);
        let body_forces: Vec<SpatialVec> = dynamics_vars
            .body_forces
            .iter()
            .zip(&gravity)
            .map(|(applied, g)| applied + g)
            .collect();
        self.forward_dynamics_into(
            position,
            dynamics,
            dynamics_vars.mobility_forces.as_slice(),
            &body_forces,
            acceleration,
            udot.as_mut_slice(),
        );

        let vars = StateView {
            model,
            instance,
            q: q.as_slice(),
            u: u.as_slice(),
        };
        for node in &self.nodes {
            node.calc_qdotdot(&vars, position, udot.as_slice(), qdotdot.as_mut_slice());
            node.realize_acceleration(&vars);
        }
        finish(state, Stage::Acceleration);
        Ok(())
    }

    /// Report stage: per-node hooks only.
    pub fn realize_report(&self, state: &mut TreeState) -> Result<()> {
        self.realize_hooks(state, Stage::Report, |node, vars| node.realize_report(vars))
    }

    fn realize_hooks(
        &self,
        state: &mut TreeState,
        stage: Stage,
        hook: impl Fn(&dyn RigidBodyNode, &StateView<'_>),
    ) -> Result<()> {
        begin(state, stage)?;
        let vars = state.view();
        for node in &self.nodes {
            hook(node.as_ref(), &vars);
        }
        finish(state, stage);
        Ok(())
    }

    // ==================== Dynamics operators ====================

    /// `udot` produced by generalized forces `mobility_forces` and spatial
    /// `body_forces` (no gravity added). Requires Dynamics.
    pub fn calc_tree_forward_dynamics(
        &self,
        state: &TreeState,
        mobility_forces: &[f64],
        body_forces: &[SpatialVec],
    ) -> Result<DVector<f64>> {
        require(state, Stage::Dynamics)?;
        self.check_u("mobility forces", mobility_forces)?;
        self.check_bodies("body forces", body_forces)?;

        let mut ac = AccelerationCache::allocate(self.nodes.len(), self.nu());
        let mut udot = DVector::zeros(self.nu());
        self.forward_dynamics_into(
            &state.position,
            &state.dynamics,
            mobility_forces,
            body_forces,
            &mut ac,
            udot.as_mut_slice(),
        );
        Ok(udot)
    }

    /// Generalized forces that, added to `mobility_forces` and `body_forces`,
    /// produce `udot`. Requires Dynamics.
    pub fn calc_tree_inverse_dynamics(
        &self,
        state: &TreeState,
        udot: &[f64],
        mobility_forces: &[f64],
        body_forces: &[SpatialVec],
    ) -> Result<DVector<f64>> {
        require(state, Stage::Dynamics)?;
        self.check_u("udot", udot)?;
        self.check_u("mobility forces", mobility_forces)?;
        self.check_bodies("body forces", body_forces)?;

        let pc = &state.position;
        let dc = &state.dynamics;
        let mut a_gb = vec![SpatialVec::zeros(); self.nodes.len()];
        let mut f_gb = vec![SpatialVec::zeros(); self.nodes.len()];
        let mut tau = DVector::zeros(self.nu());
        for node in &self.nodes {
            node.calc_inverse_dynamics_pass1_outward(pc, dc, udot, &mut a_gb);
        }
        for node in self.nodes.iter().rev() {
            node.calc_inverse_dynamics_pass2_inward(
                pc,
                dc,
                mobility_forces,
                body_forces,
                &a_gb,
                &mut f_gb,
                tau.as_mut_slice(),
            );
        }
        Ok(tau)
    }

    /// `M⁻¹ f` in O(n). Requires Dynamics.
    pub fn calc_m_inverse_f(&self, state: &TreeState, f: &[f64]) -> Result<DVector<f64>> {
        require(state, Stage::Dynamics)?;
        self.check_u("f", f)?;

        let pc = &state.position;
        let dc = &state.dynamics;
        let mut scratch = AccelerationCache::allocate(self.nodes.len(), self.nu());
        let mut udot = DVector::zeros(self.nu());
        for node in self.nodes.iter().rev() {
            node.calc_m_inverse_f_pass1_inward(pc, dc, f, &mut scratch);
        }
        for node in &self.nodes {
            node.calc_m_inverse_f_pass2_outward(pc, dc, &mut scratch, udot.as_mut_slice());
        }
        Ok(udot)
    }

    /// `M a` in O(n). Requires Position.
    pub fn calc_m_times(&self, state: &TreeState, a: &[f64]) -> Result<DVector<f64>> {
        require(state, Stage::Position)?;
        self.check_u("a", a)?;

        let pc = &state.position;
        let mut a_gb = vec![SpatialVec::zeros(); self.nodes.len()];
        let mut f_gb = vec![SpatialVec::zeros(); self.nodes.len()];
        let mut tau = DVector::zeros(self.nu());
        for node in &self.nodes {
            node.calc_ma_pass1_outward(pc, a, &mut a_gb);
        }
        for node in self.nodes.iter().rev() {
            node.calc_ma_pass2_inward(pc, &a_gb, &mut f_gb, tau.as_mut_slice());
        }
        Ok(tau)
    }

    /// `Jᵀ F`: generalized forces equivalent to spatial `body_forces`.
    /// Requires Position.
    pub fn calc_equivalent_joint_forces(
        &self,
        state: &TreeState,
        body_forces: &[SpatialVec],
    ) -> Result<DVector<f64>> {
        require(state, Stage::Position)?;
        self.check_bodies("body forces", body_forces)?;

        let mut all_z = vec![SpatialVec::zeros(); self.nodes.len()];
        let mut tau = DVector::zeros(self.nu());
        for node in self.nodes.iter().rev() {
            node.calc_equivalent_joint_forces(
                &state.position,
                body_forces,
                &mut all_z,
                tau.as_mut_slice(),
            );
        }
        Ok(tau)
    }

    /// `J v`: body spatial velocities produced by speeds `v`. Requires Position.
    pub fn calc_spatial_kinematics(&self, state: &TreeState, v: &[f64]) -> Result<Vec<SpatialVec>> {
        require(state, Stage::Position)?;
        self.check_u("v", v)?;

        let mut jv = vec![SpatialVec::zeros(); self.nodes.len()];
        for node in &self.nodes {
            node.calc_spatial_kinematics_from_internal(&state.position, v, &mut jv);
        }
        Ok(jv)
    }

    /// `Jᵀ X` for one spatial vector per body. Requires Position.
    pub fn calc_internal_gradient(
        &self,
        state: &TreeState,
        x: &[SpatialVec],
    ) -> Result<DVector<f64>> {
        require(state, Stage::Position)?;
        self.check_bodies("x", x)?;

        let mut all_z = vec![SpatialVec::zeros(); self.nodes.len()];
        let mut jx = DVector::zeros(self.nu());
        for node in self.nodes.iter().rev() {
            node.calc_internal_gradient_from_spatial(
                &state.position,
                x,
                &mut all_z,
                jx.as_mut_slice(),
            );
        }
        Ok(jx)
    }

    /// Gravity from the configuration as spatial forces about each body
    /// origin. Requires Position.
    pub fn gravity_body_forces(&self, state: &TreeState) -> Result<Vec<SpatialVec>> {
        require(state, Stage::Position)?;
        Ok(gravity_forces(&state.position, &state.instance, &self.config.gravity))
    }

    fn forward_dynamics_into(
        &self,
        pc: &PositionCache,
        dc: &DynamicsCache,
        mobility_forces: &[f64],
        body_forces: &[SpatialVec],
        ac: &mut AccelerationCache,
        udot: &mut [f64],
    ) {
        for node in self.nodes.iter().rev() {
            node.calc_udot_pass1_inward(pc, dc, mobility_forces, body_forces, ac);
        }
        for node in &self.nodes {
            node.calc_udot_pass2_outward(pc, dc, ac, udot);
        }
    }

    // ==================== Coordinates ====================

    /// `N q̇`-style product: `N * input` (input per speed, output per
    /// coordinate), or `inputᵀ * N` when `matrix_on_right`. Requires Position.
    pub fn multiply_by_n(
        &self,
        state: &TreeState,
        matrix_on_right: bool,
        input: &[f64],
    ) -> Result<DVector<f64>> {
        require(state, Stage::Position)?;
        let (n_in, n_out) = if matrix_on_right {
            (self.nq(), self.nu())
        } else {
            (self.nu(), self.nq())
        };
        MultibodyError::check_len("input", n_in, input.len())?;

        let mut out = DVector::zeros(n_out);
        let vars = state.view();
        for node in &self.nodes {
            node.multiply_by_n(&vars, &state.position, matrix_on_right, input, out.as_mut_slice());
        }
        Ok(out)
    }

    /// `N⁻¹ * input` (input per coordinate, output per speed), or
    /// `inputᵀ * N⁻¹` when `matrix_on_right`. Requires Position.
    pub fn multiply_by_n_inv(
        &self,
        state: &TreeState,
        matrix_on_right: bool,
        input: &[f64],
    ) -> Result<DVector<f64>> {
        require(state, Stage::Position)?;
        let (n_in, n_out) = if matrix_on_right {
            (self.nu(), self.nq())
        } else {
            (self.nq(), self.nu())
        };
        MultibodyError::check_len("input", n_in, input.len())?;

        let mut out = DVector::zeros(n_out);
        let vars = state.view();
        for node in &self.nodes {
            node.multiply_by_n_inv(
                &vars,
                &state.position,
                matrix_on_right,
                input,
                out.as_mut_slice(),
            );
        }
        Ok(out)
    }

    /// Renormalize every quaternion in `q`. Returns `true` if any changed,
    /// in which case the state drops back to Time.
    pub fn enforce_quaternion_constraints(&self, state: &mut TreeState) -> bool {
        let mut changed = false;
        for node in &self.nodes {
            changed |= node.enforce_quaternion_constraints(&state.model, state.q.as_mut_slice());
        }
        if changed {
            state.invalidate(Stage::Time);
        }
        changed
    }

    /// Set body `body`'s coordinates so that its across-joint transform
    /// `X_FM` (the one in use, reversed if the joint is) best matches `x_fm`.
    pub fn set_q_to_fit_transform(
        &self,
        state: &mut TreeState,
        body: usize,
        x_fm: &Isometry3<f64>,
    ) -> Result<()> {
        let node = self.mobilized(body)?;
        let x_f0m0 = if node.base().is_reversed() {
            x_fm.inverse()
        } else {
            *x_fm
        };
        state.invalidate(Stage::Time);
        node.set_q_to_fit_transform(&state.model, &x_f0m0, state.q.as_mut_slice());
        Ok(())
    }

    /// Set body `body`'s speeds so that its across-joint velocity `V_FM`
    /// (the one in use, reversed if the joint is) best matches `v_fm`.
    ///
    /// A reversed joint needs `X_FM`, so its state must be realized through
    /// Position.
    pub fn set_u_to_fit_velocity(
        &self,
        state: &mut TreeState,
        body: usize,
        v_fm: &SpatialVec,
    ) -> Result<()> {
        let node = self.mobilized(body)?;
        if node.base().is_reversed() {
            require(state, Stage::Position)?;
        }
        let TreeState { q, u, position, .. } = &mut *state;
        node.set_u_to_fit_velocity(q.as_slice(), position, v_fm, u.as_mut_slice());
        state.invalidate(Stage::Position);
        Ok(())
    }

    /// Set body `body`'s speeds to `Hᵀ (V_GB - phiᵀ V_GP)` for a desired
    /// ground velocity `v_gb`. Requires Velocity.
    pub fn set_u_from_spatial_velocity(
        &self,
        state: &mut TreeState,
        body: usize,
        v_gb: &SpatialVec,
    ) -> Result<()> {
        let node = self.mobilized(body)?;
        require(state, Stage::Velocity)?;
        let TreeState {
            u,
            position,
            velocity,
            ..
        } = &mut *state;
        node.set_vel_from_svel(position, velocity, v_gb, u.as_mut_slice());
        state.invalidate(Stage::Position);
        Ok(())
    }

    /// Copy every body's coordinates in use under `model` from `q_in` into
    /// `q`. Slots a body reserves but does not use are left alone.
    pub fn copy_q(&self, model: &ModelVars, q_in: &[f64], q: &mut [f64]) -> Result<()> {
        MultibodyError::check_len("q_in", self.nq(), q_in.len())?;
        MultibodyError::check_len("q", self.nq(), q.len())?;
        for node in &self.nodes {
            node.copy_q(model, q_in, q);
        }
        Ok(())
    }

    /// Copy every body's speeds from `u_in` into `u`.
    pub fn copy_u(&self, u_in: &[f64], u: &mut [f64]) -> Result<()> {
        self.check_u("u_in", u_in)?;
        self.check_u("u", u)?;
        for node in &self.nodes {
            node.copy_u(u_in, u);
        }
        Ok(())
    }

    /// Switch the state to Euler angles, rewriting `q` so every body keeps
    /// its pose. Does nothing if the state already uses Euler angles;
    /// otherwise the state drops to Topology.
    pub fn convert_to_euler_angles(&self, state: &mut TreeState) {
        self.convert_rotations(state, true);
    }

    /// Switch the state to quaternions, rewriting `q` so every body keeps
    /// its pose. Does nothing if the state already uses quaternions;
    /// otherwise the state drops to Topology.
    pub fn convert_to_quaternions(&self, state: &mut TreeState) {
        self.convert_rotations(state, false);
    }

    fn convert_rotations(&self, state: &mut TreeState, to_euler: bool) {
        if state.model.use_euler_angles == to_euler {
            return;
        }
        let mut q = state.q.clone();
        for node in &self.nodes {
            if to_euler {
                node.convert_to_euler_angles(state.q.as_slice(), q.as_mut_slice());
            } else {
                node.convert_to_quaternions(state.q.as_slice(), q.as_mut_slice());
            }
        }
        state.model_mut().use_euler_angles = to_euler;
        state.q = q;
        tracing::debug!(to_euler, "converted rotation coordinates");
    }

    fn mobilized(&self, body: usize) -> Result<&dyn RigidBodyNode> {
        match self.nodes.get(body) {
            Some(node) if body != 0 => Ok(node.as_ref()),
            _ => Err(MultibodyError::InvalidNode(body)),
        }
    }

    fn check_u(&self, what: &'static str, v: &[f64]) -> Result<()> {
        MultibodyError::check_len(what, self.nu(), v.len())
    }

    fn check_bodies(&self, what: &'static str, v: &[SpatialVec]) -> Result<()> {
        MultibodyError::check_len(what, self.nodes.len(), v.len())
    }
}

/// `[c × m g; m g]` per body, ground left at zero.
fn gravity_forces(
    pc: &PositionCache,
    instance: &InstanceVars,
    g: &Vector3<f64>,
) -> Vec<SpatialVec> {
    let mut forces = vec![SpatialVec::zeros(); pc.x_gb.len()];
    for (b, force) in forces.iter_mut().enumerate().skip(1) {
        let weight = g * instance.mass_properties[b].mass;
        *force = spatial_vec(&pc.com_g[b].cross(&weight), &weight);
    }
    forces
}

fn require(state: &TreeState, required: Stage) -> Result<()> {
    check_stage(state, required, required)
}

fn check_stage(state: &TreeState, requested: Stage, required: Stage) -> Result<()> {
    if state.stage() < required {
        return Err(MultibodyError::StageOutOfOrder {
            requested,
            required,
            current: state.stage(),
        });
    }
    Ok(())
}

fn begin(state: &TreeState, stage: Stage) -> Result<()> {
    check_stage(state, stage, stage.prev())
}

fn finish(state: &mut TreeState, stage: Stage) {
    state.stage = stage;
    tracing::trace!(%stage, "realized");
}
