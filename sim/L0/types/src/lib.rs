//! Core types for the multibody kernel.
//!
//! - [`SpatialVec`], [`SpatialMat`], [`HType`] - 6D spatial algebra
//! - [`PhiMatrix`] - rigid shift between parent and child body origins
//! - [`MassProperties`] - mass, center of mass and inertia of a body
//! - [`Stage`] - how far a multibody state has been computed
//! - [`DynamicsConfig`] - gravity and modeling defaults
//! - [`MultibodyError`] - errors at the tree boundary
//!
//! # Conventions
//!
//! Spatial vectors are `[angular; linear]`. Mobilizer Jacobians are 6×N with
//! one column per generalized speed. Ground is body 0 and never moves.
//!
//! # Layer 0
//!
//! This is a Layer 0 crate with **zero Bevy dependencies**.

#![doc(html_root_url = "https://docs.rs/mbs-types/0.7.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,         // mul_add style changes aren't always clearer
    clippy::missing_errors_doc,       // Error docs added where non-obvious
)]

mod config;
mod error;
mod mass;
pub mod spatial;
mod stage;

pub use config::{DynamicsConfig, STANDARD_GRAVITY};
pub use error::MultibodyError;
pub use mass::MassProperties;
pub use spatial::{
    HType, PhiMatrix, SpatialMat, SpatialVec, angular, linear, rotate_spatial, spatial_inertia,
    spatial_vec,
};
pub use stage::Stage;

/// Result type for multibody operations.
pub type Result<T> = std::result::Result<T, MultibodyError>;
