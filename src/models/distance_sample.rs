use std::{fmt::Display, time::Instant};

use common::physical::Distance;

/// Why a ranging attempt did not produce a distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangingFault {
    /// Echo line never rose after the trigger pulse.
    EchoRiseTimeout,

    /// Echo line rose but never fell.
    EchoFallTimeout,
}

impl RangingFault {
    pub fn tag(&self) -> &'static str {
        match self {
            RangingFault::EchoRiseTimeout => "echo-rise-timeout",
            RangingFault::EchoFallTimeout => "echo-fall-timeout",
        }
    }
}

/// Outcome of one ranging attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    Valid(Distance),
    Invalid(RangingFault),
}

/// A single distance measurement. An invalid reading carries no distance at
/// all so it can't be mistaken for one downstream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceSample {
    pub reading: Reading,
    pub measured_at: Instant,
}

impl DistanceSample {
    pub fn valid(distance: Distance, measured_at: Instant) -> Self {
        Self {
            reading: Reading::Valid(distance),
            measured_at,
        }
    }

    pub fn invalid(fault: RangingFault, measured_at: Instant) -> Self {
        Self {
            reading: Reading::Invalid(fault),
            measured_at,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self.reading, Reading::Valid(_))
    }

    /// Distance in centimeters, `None` for an invalid reading.
    pub fn centimeters(&self) -> Option<f32> {
        match self.reading {
            Reading::Valid(distance) => Some(distance.centimeters()),
            Reading::Invalid(_) => None,
        }
    }
}

impl Display for DistanceSample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.reading {
            Reading::Valid(distance) => write!(f, "(DistanceSample: {})", distance),
            Reading::Invalid(fault) => write!(f, "(DistanceSample: invalid, {})", fault.tag()),
        }
    }
}
