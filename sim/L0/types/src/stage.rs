//! Computation stages of a multibody state.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How far a state has been realized.
///
/// Stages are totally ordered; realizing a stage requires the previous one.
/// Touching `q` drops a state back to [`Stage::Time`], touching `u` back to
/// [`Stage::Position`], touching applied forces back to
/// [`Stage::Dynamics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Stage {
    /// Nothing allocated.
    Empty,
    /// Tree built and caches allocated.
    Topology,
    /// Modeling choices (e.g. Euler angles vs quaternions) fixed.
    Model,
    /// Instance parameters (mass properties) fixed.
    Instance,
    /// Time set.
    Time,
    /// Transforms, Jacobians and spatial inertias computed.
    Position,
    /// Spatial velocities computed.
    Velocity,
    /// Bias terms and articulated-body inertias computed.
    Dynamics,
    /// Generalized and spatial accelerations computed.
    Acceleration,
    /// Everything computed.
    Report,
}

impl Stage {
    /// The stage that must be reached before this one can be realized.
    #[must_use]
    pub const fn prev(self) -> Self {
        match self {
            Self::Empty | Self::Topology => Self::Empty,
            Self::Model => Self::Topology,
            Self::Instance => Self::Model,
            Self::Time => Self::Instance,
            Self::Position => Self::Time,
            Self::Velocity => Self::Position,
            Self::Dynamics => Self::Velocity,
            Self::Acceleration => Self::Dynamics,
            Self::Report => Self::Acceleration,
        }
    }

    /// Stage names in order, for display.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Empty => "Empty",
            Self::Topology => "Topology",
            Self::Model => "Model",
            Self::Instance => "Instance",
            Self::Time => "Time",
            Self::Position => "Position",
            Self::Velocity => "Velocity",
            Self::Dynamics => "Dynamics",
            Self::Acceleration => "Acceleration",
            Self::Report => "Report",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
