//! Recursive multibody kinematics and dynamics.
//!
//! A [`MultibodyTree`] is a tree of rigid bodies rooted at ground, each body
//! connected to its parent by a mobilizer (a joint with `N` generalized
//! speeds). Joint types implement [`Mobilizer<N>`]; the tree wraps each in a
//! [`RigidBodyNodeSpec<M, N>`] and drives them through the O(n) sweeps:
//!
//! - articulated-body forward dynamics (`udot` from applied forces)
//! - recursive Newton-Euler inverse dynamics
//! - `M⁻¹ f` and `M a` without ever forming the mass matrix
//! - products with the system Jacobian `J` and its transpose
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      MultibodyTree                          │
//! │  Static: parent links, frames, slot indices, mobilizers     │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │ realize(stage)
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       TreeState                             │
//! │  Variables: q, u, applied forces                            │
//! │  Caches: Position → Velocity → Dynamics → Acceleration      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Cache entries for a stage are valid only once the state has reached that
//! stage; changing a variable drops the state back to the stage before the
//! first one that reads it.
//!
//! # Layer 0 Crate
//!
//! This is a Layer 0 crate with **zero Bevy dependencies**.
//!
//! # Quick Start
//!
//! ```ignore
//! use mbs_core::{BodySpec, MultibodyTree, Stage};
//! use mbs_types::{DynamicsConfig, MassProperties};
//!
//! let mut tree = MultibodyTree::new(DynamicsConfig::default())?;
//! let link = BodySpec::new(MassProperties::sphere(1.0, 0.1));
//! let body = tree.add_body(0, link, MyPinJoint)?;
//!
//! let mut state = tree.make_state();
//! state.u_mut()[0] = 2.0;
//! tree.realize(&mut state, Stage::Acceleration)?;
//! println!("udot = {}", state.udot());
//! ```

#![doc(html_root_url = "https://docs.rs/mbs-core/0.7.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,       // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,           // mul_add style changes aren't always clearer
    clippy::too_many_lines,             // Physics functions naturally have many steps
    clippy::doc_markdown,               // Not all technical terms need backticks
    clippy::missing_errors_doc,         // Errors are the tree-boundary MultibodyError
    clippy::many_single_char_names,     // Spatial algebra reads best with textbook names
)]

// Per-stage cache storage
pub mod cache;

// Joint-type contract and its defaults
pub mod mobilizer;

// Per-body nodes and their recursive sweeps
pub mod node;

// Quaternion coordinate helpers
pub mod quaternion;

// Per-instance variables and caches
pub mod state;

mod tree;

pub use cache::{AccelerationCache, DynamicsCache, PositionCache, VelocityCache};
pub use mobilizer::{
    Mobilizer, MobilizerDigest, QDotHandling, QuaternionUse, as_defined_velocity,
    reverse_velocity_jacobian, reverse_velocity_jacobian_dot,
};
pub use node::{BodySpec, GroundNode, NodeBase, RigidBodyNode, RigidBodyNodeSpec, SlotCounter};
pub use state::{DynamicsVars, InstanceVars, ModelVars, StateView, TimeVars, TreeState};
pub use tree::MultibodyTree;

pub use mbs_types::{
    DynamicsConfig, HType, MassProperties, MultibodyError, PhiMatrix, Result, SpatialMat,
    SpatialVec, Stage,
};
