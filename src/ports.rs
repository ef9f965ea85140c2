use std::time::{Duration, Instant};

use common::{
    frame::{FrameBuffer, FrameGeometry},
    line::{Direction, Level},
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{
    models::{actuator_command::ActuatorCommand, distance_sample::DistanceSample},
    sensing::{frame_acquirer::AcquisitionError, range_sensor::RangingError},
};

/// Errors raised by a physical line. None of these are expected during normal
/// operation and all of them are fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LineError {
    #[error("Failed to configure line {index} as {direction}. Reason: {reason}")]
    Configuration {
        index: u8,
        direction: Direction,
        reason: String,
    },

    #[error("Line {index} is configured as {actual} but was used as {expected}.")]
    WrongDirection {
        index: u8,
        expected: Direction,
        actual: Direction,
    },

    #[error("I/O failure on line {index}. Reason: {reason}")]
    Io { index: u8, reason: String },
}

/// A single physical input/output line. Every call reflects or sets the
/// instantaneous physical state; nothing is buffered.
pub trait DigitalLine: Send {
    /// Physical index of the line (BCM number on a Raspberry Pi).
    fn index(&self) -> u8;

    fn configure(&mut self, direction: Direction) -> Result<(), LineError>;

    fn read(&mut self) -> Result<Level, LineError>;

    fn write(&mut self, level: Level) -> Result<(), LineError>;
}

impl<T: DigitalLine + ?Sized> DigitalLine for Box<T> {
    fn index(&self) -> u8 {
        (**self).index()
    }

    fn configure(&mut self, direction: Direction) -> Result<(), LineError> {
        (**self).configure(direction)
    }

    fn read(&mut self) -> Result<Level, LineError> {
        (**self).read()
    }

    fn write(&mut self, level: Level) -> Result<(), LineError> {
        (**self).write(level)
    }
}

/// Monotonic time source used for every timed wait.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Snapshot of the three synchronisation lines of a parallel video bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncLines {
    pub vsync: Level,
    pub href: Level,
    pub pclk: Level,
}

/// Parallel video interface: vsync, href, pclk and an 8 bit data bus.
pub trait ParallelBus: Send {
    /// Read vsync, href and pclk.
    fn sample_sync(&mut self) -> Result<SyncLines, LineError>;

    /// Read all data lines at once. D0 is the least significant bit.
    fn sample_data(&mut self) -> Result<u8, LineError>;
}

/// Anything that can produce a distance sample.
pub trait RangingPort: Send {
    fn measure(
        &mut self,
        timeout: Duration,
        token: &CancellationToken,
    ) -> Result<DistanceSample, RangingError>;
}

/// Anything that can produce one raster frame.
pub trait FrameSource: Send {
    fn capture_frame(
        &mut self,
        geometry: FrameGeometry,
        timeout: Duration,
        token: &CancellationToken,
    ) -> Result<FrameBuffer, AcquisitionError>;
}

/// Drives the fan and light relays.
pub trait ActuatorPort: Send {
    fn apply(&mut self, command: ActuatorCommand) -> Result<(), LineError>;
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Failed to write frame to archive. Error: {0}")]
    Archive(#[from] std::io::Error),

    #[error("Failed to reach classification service. Error: {0}")]
    Transport(String),

    #[error("Classification service rejected the frame. Reason: {0}")]
    Rejected(String),
}

impl SinkError {
    /// Short tag used in log lines.
    pub fn tag(&self) -> &'static str {
        match self {
            SinkError::Archive(_) => "archive-write",
            SinkError::Transport(_) => "classification-transport",
            SinkError::Rejected(_) => "classification-rejected",
        }
    }
}

/// Consumer of captured frames (classification service, archive, ...).
pub trait FrameSink: Send {
    fn name(&self) -> &'static str;

    fn submit(&mut self, frame: &FrameBuffer) -> Result<(), SinkError>;
}
