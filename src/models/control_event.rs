use std::fmt::Display;

use common::frame::Completeness;

use super::{actuator_command::Decision, distance_sample::DistanceSample};

/// What happened to the capture step of a cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    /// Nobody present, no capture attempted.
    Skipped,

    /// Frame captured and handed to the sinks.
    Forwarded {
        bytes: usize,
        completeness: Completeness,
    },

    /// Partial frame dropped by policy.
    Discarded { bytes: usize },

    /// Acquisition aborted. Holds the failure tag.
    Failed(&'static str),
}

impl CaptureOutcome {
    pub fn was_attempted(&self) -> bool {
        !matches!(self, CaptureOutcome::Skipped)
    }
}

impl Display for CaptureOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureOutcome::Skipped => write!(f, "skipped"),
            CaptureOutcome::Forwarded {
                bytes,
                completeness,
            } => {
                if completeness.is_complete() {
                    write!(f, "forwarded {} bytes", bytes)
                } else {
                    write!(f, "forwarded {} bytes (partial)", bytes)
                }
            }
            CaptureOutcome::Discarded { bytes } => write!(f, "discarded {} partial bytes", bytes),
            CaptureOutcome::Failed(tag) => write!(f, "failed ({})", tag),
        }
    }
}

/// Summary of one control loop cycle. Broadcast to interested tasks.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlEvent {
    pub cycle: u64,
    pub sample: DistanceSample,
    pub decision: Decision,
    pub capture: CaptureOutcome,
}

impl Display for ControlEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<Control Event #{} | {}, {}, capture:{}>",
            self.cycle, self.sample, self.decision, self.capture
        )
    }
}
