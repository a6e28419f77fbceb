//! Per-instance state: variables, stage caches and the realized stage.
//!
//! A [`TreeState`] is created by [`MultibodyTree::make_state`] with every
//! array sized from the tree's slot counts. Nodes never own per-instance
//! storage; they index into the arrays here.
//!
//! [`MultibodyTree::make_state`]: crate::MultibodyTree::make_state

use mbs_types::{MassProperties, SpatialVec, Stage};
use nalgebra::DVector;

use crate::cache::{AccelerationCache, DynamicsCache, PositionCache, VelocityCache};

/// Model-stage variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelVars {
    /// Quaternion joints use Euler angles instead of quaternions.
    pub use_euler_angles: bool,
}

/// Instance-stage variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceVars {
    /// Mass properties of each body (ground included, unused).
    pub mass_properties: Vec<MassProperties>,
}

/// Time-stage variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeVars {
    /// Current time (s).
    pub time: f64,
}

/// Applied forces, consumed by the Acceleration stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DynamicsVars {
    /// Generalized forces, one per speed.
    pub mobility_forces: DVector<f64>,
    /// Spatial forces on each body, about the body origin, in ground.
    pub body_forces: Vec<SpatialVec>,
}

/// Borrowed view of the variables a node reads while being realized.
#[derive(Debug, Clone, Copy)]
pub struct StateView<'a> {
    /// Model-stage variables.
    pub model: &'a ModelVars,
    /// Instance-stage variables.
    pub instance: &'a InstanceVars,
    /// Generalized coordinates (whole tree).
    pub q: &'a [f64],
    /// Generalized speeds (whole tree).
    pub u: &'a [f64],
}

/// Everything that varies between instances of one tree.
#[derive(Debug, Clone)]
pub struct TreeState {
    pub(crate) stage: Stage,

    pub(crate) model: ModelVars,
    pub(crate) instance: InstanceVars,
    pub(crate) time: TimeVars,
    pub(crate) dynamics_vars: DynamicsVars,

    pub(crate) q: DVector<f64>,
    pub(crate) u: DVector<f64>,

    /// Per-body quaternion norm error, `|q| - 1`.
    pub(crate) q_err: Vec<f64>,
    pub(crate) qdot: DVector<f64>,
    pub(crate) udot: DVector<f64>,
    pub(crate) qdotdot: DVector<f64>,

    pub(crate) position: PositionCache,
    pub(crate) velocity: VelocityCache,
    pub(crate) dynamics: DynamicsCache,
    pub(crate) acceleration: AccelerationCache,
}

impl TreeState {
    /// Allocate every array for a tree with the given counts.
    pub(crate) fn allocate(nb: usize, nq: usize, nu: usize, nusq: usize) -> Self {
        Self {
            stage: Stage::Topology,
            model: ModelVars::default(),
            instance: InstanceVars {
                mass_properties: vec![MassProperties::default(); nb],
            },
            time: TimeVars::default(),
            dynamics_vars: DynamicsVars {
                mobility_forces: DVector::zeros(nu),
                body_forces: vec![SpatialVec::zeros(); nb],
            },
            q: DVector::zeros(nq),
            u: DVector::zeros(nu),
            q_err: vec![0.0; nb],
            qdot: DVector::zeros(nq),
            udot: DVector::zeros(nu),
            qdotdot: DVector::zeros(nq),
            position: PositionCache::allocate(nb, nq, nu),
            velocity: VelocityCache::allocate(nb),
            dynamics: DynamicsCache::allocate(nb, nu, nusq),
            acceleration: AccelerationCache::allocate(nb, nu),
        }
    }

    /// Borrow the variables nodes read.
    #[must_use]
    pub fn view(&self) -> StateView<'_> {
        StateView {
            model: &self.model,
            instance: &self.instance,
            q: self.q.as_slice(),
            u: self.u.as_slice(),
        }
    }

    /// Highest stage realized.
    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Drop the realized stage to at most `stage`.
    pub fn invalidate(&mut self, stage: Stage) {
        self.stage = self.stage.min(stage);
    }

    // ==================== Variables ====================

    /// Model-stage variables.
    #[must_use]
    pub fn model(&self) -> &ModelVars {
        &self.model
    }

    /// Mutable model-stage variables; drops the state to Topology.
    pub fn model_mut(&mut self) -> &mut ModelVars {
        self.invalidate(Stage::Topology);
        &mut self.model
    }

    /// Instance-stage variables.
    #[must_use]
    pub fn instance(&self) -> &InstanceVars {
        &self.instance
    }

    /// Mutable instance-stage variables; drops the state to Model.
    pub fn instance_mut(&mut self) -> &mut InstanceVars {
        self.invalidate(Stage::Model);
        &mut self.instance
    }

    /// Current time.
    #[must_use]
    pub fn time(&self) -> f64 {
        self.time.time
    }

    /// Set the time; drops the state to Instance.
    pub fn set_time(&mut self, time: f64) {
        self.invalidate(Stage::Instance);
        self.time.time = time;
    }

    /// Generalized coordinates.
    #[must_use]
    pub fn q(&self) -> &DVector<f64> {
        &self.q
    }

    /// Mutable coordinates; drops the state to Time.
    pub fn q_mut(&mut self) -> &mut DVector<f64> {
        self.invalidate(Stage::Time);
        &mut self.q
    }

    /// Generalized speeds.
    #[must_use]
    pub fn u(&self) -> &DVector<f64> {
        &self.u
    }

    /// Mutable speeds; drops the state to Position.
    pub fn u_mut(&mut self) -> &mut DVector<f64> {
        self.invalidate(Stage::Position);
        &mut self.u
    }

    /// Applied forces.
    #[must_use]
    pub fn dynamics_vars(&self) -> &DynamicsVars {
        &self.dynamics_vars
    }

    /// Mutable applied forces; drops the state to Dynamics.
    pub fn dynamics_vars_mut(&mut self) -> &mut DynamicsVars {
        self.invalidate(Stage::Dynamics);
        &mut self.dynamics_vars
    }

    // ==================== Results ====================

    /// Quaternion norm errors, one per body (zero for other joints).
    #[must_use]
    pub fn q_err(&self) -> &[f64] {
        &self.q_err
    }

    /// `qdot`, valid from Velocity.
    #[must_use]
    pub fn qdot(&self) -> &DVector<f64> {
        &self.qdot
    }

    /// `udot`, valid from Acceleration.
    #[must_use]
    pub fn udot(&self) -> &DVector<f64> {
        &self.udot
    }

    /// `qdotdot`, valid from Acceleration.
    #[must_use]
    pub fn qdotdot(&self) -> &DVector<f64> {
        &self.qdotdot
    }

    /// Position-stage results.
    #[must_use]
    pub fn position_cache(&self) -> &PositionCache {
        &self.position
    }

    /// Velocity-stage results.
    #[must_use]
    pub fn velocity_cache(&self) -> &VelocityCache {
        &self.velocity
    }

    /// Dynamics-stage results.
    #[must_use]
    pub fn dynamics_cache(&self) -> &DynamicsCache {
        &self.dynamics
    }

    /// Acceleration-stage results.
    #[must_use]
    pub fn acceleration_cache(&self) -> &AccelerationCache {
        &self.acceleration
    }
}
