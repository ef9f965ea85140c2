use std::time::Duration;

use common::frame::FrameGeometry;
use thiserror::Error;
use tokio::sync::broadcast::Sender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::{
    controls::decide,
    models::{
        actuator_command::ActuatorCommand,
        control_event::{CaptureOutcome, ControlEvent},
    },
    ports::{ActuatorPort, FrameSink, FrameSource, LineError, RangingPort},
    sensing::{frame_acquirer::AcquisitionError, range_sensor::RangingError},
};

/// Per cycle parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlSettings {
    pub threshold_cm: f32,
    pub echo_timeout: Duration,
    pub frame_timeout: Duration,
    pub geometry: FrameGeometry,
    pub forward_partial_frames: bool,
}

/// Failures that end the control loop. Everything else is handled inside the
/// cycle and only logged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CycleError {
    #[error("Control cycle was cancelled.")]
    Cancelled,

    #[error("Line failure during control cycle. Error: {0}")]
    Line(#[from] LineError),
}

impl From<RangingError> for CycleError {
    fn from(value: RangingError) -> Self {
        match value {
            RangingError::Cancelled => CycleError::Cancelled,
            RangingError::Line(e) => CycleError::Line(e),
        }
    }
}

/// Owns every port the cycle touches. Moved onto a blocking thread for each
/// cycle and handed back afterwards.
pub struct ControlLoop {
    ranging: Box<dyn RangingPort>,
    frames: Box<dyn FrameSource>,
    actuators: Box<dyn ActuatorPort>,
    sinks: Vec<Box<dyn FrameSink>>,
    settings: ControlSettings,
    cycle: u64,
}

impl ControlLoop {
    pub fn new(
        ranging: Box<dyn RangingPort>,
        frames: Box<dyn FrameSource>,
        actuators: Box<dyn ActuatorPort>,
        sinks: Vec<Box<dyn FrameSink>>,
        settings: ControlSettings,
    ) -> Self {
        Self {
            ranging,
            frames,
            actuators,
            sinks,
            settings,
            cycle: 0,
        }
    }

    /// One measure, decide, actuate and (on presence) capture cycle. Blocks
    /// for as long as the waits take.
    #[tracing::instrument(skip_all, fields(cycle = self.cycle + 1))]
    pub fn run_cycle(&mut self, token: &CancellationToken) -> Result<ControlEvent, CycleError> {
        self.cycle += 1;
        trace!("Executing cycle.");

        let sample = self.ranging.measure(self.settings.echo_timeout, token)?;
        let decision = decide(&sample, self.settings.threshold_cm);
        debug!("Got {} from {}.", decision, sample);

        self.actuators.apply(decision.command)?;

        let capture = if decision.presence {
            self.capture(token)?
        } else {
            CaptureOutcome::Skipped
        };

        Ok(ControlEvent {
            cycle: self.cycle,
            sample,
            decision,
            capture,
        })
    }

    fn capture(&mut self, token: &CancellationToken) -> Result<CaptureOutcome, CycleError> {
        let frame = match self.frames.capture_frame(
            self.settings.geometry,
            self.settings.frame_timeout,
            token,
        ) {
            Ok(frame) => frame,
            Err(AcquisitionError::Cancelled) => return Err(CycleError::Cancelled),
            Err(AcquisitionError::Line(e)) => return Err(e.into()),
            Err(e) => {
                warn!("Failed to capture frame. Reason: {} Error: {}", e.tag(), e);
                return Ok(CaptureOutcome::Failed(e.tag()));
            }
        };

        let bytes = frame.data().len();
        if !frame.is_complete() && !self.settings.forward_partial_frames {
            warn!("Discarding {}. Reason: partial-frame", frame);
            return Ok(CaptureOutcome::Discarded { bytes });
        }

        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.submit(&frame) {
                error!(
                    "Failed to hand frame to {}. Reason: {} Error: {}",
                    sink.name(),
                    e.tag(),
                    e
                );
            }
        }

        Ok(CaptureOutcome::Forwarded {
            bytes,
            completeness: frame.completeness(),
        })
    }

    /// Drive every relay off.
    pub fn switch_off(&mut self) -> Result<(), LineError> {
        self.actuators.apply(ActuatorCommand::OFF)
    }
}

/// Task: Run control cycles at a fixed interval and broadcast a control
/// event for each. A fatal cycle error cancels `token` so every other task
/// shuts down too. Relays are switched off on the way out.
/// Can be cancelled.
#[tracing::instrument(skip_all)]
pub async fn task_control_loop(
    token: CancellationToken,
    mut control: ControlLoop,
    interval: Duration,
    tx_control_event: Sender<ControlEvent>,
) -> anyhow::Result<()> {
    info!("Started.");

    let result = loop {
        let cycle_token = token.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let outcome = control.run_cycle(&cycle_token);
            (control, outcome)
        })
        .await;

        let outcome = match joined {
            Ok((returned, outcome)) => {
                control = returned;
                outcome
            }
            Err(e) => {
                error!("Control cycle panicked. Error: {}", e);
                token.cancel();
                return Err(e.into());
            }
        };

        match outcome {
            Ok(event) => {
                if let Err(e) = tx_control_event.send(event) {
                    error!("Failed to broadcast control event. Error: {}", e);
                } else {
                    trace!("Sent a control event.");
                }
            }
            Err(CycleError::Cancelled) => break Ok(()),
            Err(e) => {
                error!("Stopping control loop. Error: {}", e);
                token.cancel();
                break Err(e.into());
            }
        }

        tokio::select! {
            _ = token.cancelled() => break Ok(()),
            _ = tokio::time::sleep(interval) => {}
        };
    };

    match &result {
        Ok(()) => warn!("Cancelled."),
        Err(_) => error!("Stopped after a fatal error."),
    }
    if let Err(e) = control.switch_off() {
        error!("Failed to switch relays off. Error: {}", e);
    }
    result
}
