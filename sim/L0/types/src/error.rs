//! Error types for multibody operations.

use thiserror::Error;

use crate::Stage;

/// Errors reported at the tree boundary.
///
/// Contract violations inside a single node (asking a non-quaternion joint
/// for quaternion data, say) are programming errors and panic instead.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MultibodyError {
    /// Parent index does not name an existing body.
    #[error("invalid parent {parent}: tree has {num_bodies} bodies")]
    InvalidParent {
        /// Requested parent.
        parent: usize,
        /// Bodies currently in the tree (ground included).
        num_bodies: usize,
    },

    /// Node index does not name a mobilized body.
    #[error("invalid node index: {0}")]
    InvalidNode(usize),

    /// Invalid mass properties.
    #[error("invalid mass properties: {reason}")]
    InvalidMassProperties {
        /// Description of what's wrong.
        reason: String,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// A stage was requested before its prerequisite was realized.
    #[error("{requested} needs the state at {required} or later, but it is at {current}")]
    StageOutOfOrder {
        /// Stage being realized, or read by an operator.
        requested: Stage,
        /// Stage that must already be realized.
        required: Stage,
        /// Stage the state is actually at.
        current: Stage,
    },

    /// A caller-supplied vector has the wrong length.
    #[error("{what} has length {actual}, expected {expected}")]
    DimensionMismatch {
        /// Which argument.
        what: &'static str,
        /// Required length.
        expected: usize,
        /// Supplied length.
        actual: usize,
    },

    /// The articulated inertia projected onto a mobilizer's subspace is singular.
    #[error("articulated inertia D of body {node} is singular")]
    SingularArticulatedInertia {
        /// Offending body.
        node: usize,
    },
}

impl MultibodyError {
    /// Create an invalid mass properties error.
    #[must_use]
    pub fn invalid_mass(reason: impl Into<String>) -> Self {
        Self::InvalidMassProperties {
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Check a caller-supplied length.
    pub fn check_len(what: &'static str, expected: usize, actual: usize) -> crate::Result<()> {
        if expected == actual {
            Ok(())
        } else {
            Err(Self::DimensionMismatch {
                what,
                expected,
                actual,
            })
        }
    }

    /// Check if this is a stage-ordering error.
    #[must_use]
    pub fn is_stage_error(&self) -> bool {
        matches!(self, Self::StageOutOfOrder { .. })
    }

    /// Check if this is a numerical singularity.
    #[must_use]
    pub fn is_singular(&self) -> bool {
        matches!(self, Self::SingularArticulatedInertia { .. })
    }
}
