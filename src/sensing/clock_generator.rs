use std::{
    mem,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use common::line::{Direction, Level};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::ports::{DigitalLine, LineError};

use super::wait::spin_until;

/// Half period for a nominal 8 MHz master clock. Actual frequency is best
/// effort and depends on how fast the line can be written.
pub const HALF_PERIOD: Duration = Duration::from_nanos(62);

/// Toggles between checks of the stop flag and cancellation token.
const TOGGLES_PER_STOP_CHECK: u32 = 4096;

#[derive(Error, Debug)]
pub enum ClockGeneratorError {
    #[error("Clock generator is already running.")]
    AlreadyRunning,

    #[error("Clock generator no longer owns its line.")]
    Released,

    #[error("Clock generator thread panicked.")]
    Panicked,

    #[error("Failed to spawn clock generator thread. Error: {0}")]
    Spawn(#[from] std::io::Error),

    #[error(transparent)]
    Line(#[from] LineError),
}

type Worker<L> = JoinHandle<(L, Result<(), LineError>)>;

enum State<L> {
    Idle(L),
    Running {
        running: Arc<AtomicBool>,
        token: CancellationToken,
        handle: Worker<L>,
    },
    Released,
}

/// Drives a square wave on one output line from a dedicated OS thread.
/// The wave keeps running while the caller sleeps or does other work.
pub struct ClockGenerator<L> {
    state: State<L>,
    half_period: Duration,
}

impl<L: DigitalLine + 'static> ClockGenerator<L> {
    pub fn new(mut line: L, half_period: Duration) -> Result<Self, LineError> {
        line.configure(Direction::Output)?;
        line.write(Level::Low)?;
        Ok(Self {
            state: State::Idle(line),
            half_period,
        })
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, State::Running { .. })
    }

    /// Start toggling. The generator stops on its own once `parent` is
    /// cancelled.
    pub fn start(&mut self, parent: &CancellationToken) -> Result<(), ClockGeneratorError> {
        let mut line = match mem::replace(&mut self.state, State::Released) {
            State::Idle(line) => line,
            running @ State::Running { .. } => {
                self.state = running;
                return Err(ClockGeneratorError::AlreadyRunning);
            }
            State::Released => return Err(ClockGeneratorError::Released),
        };

        let running = Arc::new(AtomicBool::new(true));
        let token = parent.child_token();
        let half_period = self.half_period;
        let index = line.index();

        let handle = thread::Builder::new()
            .name(format!("clock-gen-{}", index))
            .spawn({
                let running = running.clone();
                let token = token.clone();
                move || {
                    let result = generate(&mut line, half_period, &running, &token);
                    let parked = line.write(Level::Low);
                    (line, result.and(parked))
                }
            })?;

        info!("Started on line {}.", index);
        self.state = State::Running {
            running,
            token,
            handle,
        };
        Ok(())
    }

    /// Stop toggling and wait for the worker thread. The line is left low.
    /// Stopping a generator that is not running is a no-op.
    pub fn stop(&mut self) -> Result<(), ClockGeneratorError> {
        let (running, token, handle) = match mem::replace(&mut self.state, State::Released) {
            State::Running {
                running,
                token,
                handle,
            } => (running, token, handle),
            other => {
                self.state = other;
                return Ok(());
            }
        };

        running.store(false, Ordering::SeqCst);
        token.cancel();
        let (line, result) = handle.join().map_err(|_| ClockGeneratorError::Panicked)?;
        info!("Stopped on line {}.", line.index());
        self.state = State::Idle(line);
        result.map_err(ClockGeneratorError::from)
    }

    /// Stop the generator and hand the line back.
    pub fn into_line(mut self) -> Result<L, ClockGeneratorError> {
        self.stop()?;
        match mem::replace(&mut self.state, State::Released) {
            State::Idle(line) => Ok(line),
            _ => Err(ClockGeneratorError::Released),
        }
    }
}

impl<L> Drop for ClockGenerator<L> {
    fn drop(&mut self) {
        if let State::Running {
            running,
            token,
            handle,
        } = mem::replace(&mut self.state, State::Released)
        {
            running.store(false, Ordering::SeqCst);
            token.cancel();
            if handle.join().is_err() {
                warn!("Clock generator thread panicked during shutdown.");
            }
        }
    }
}

fn generate<L: DigitalLine>(
    line: &mut L,
    half_period: Duration,
    running: &AtomicBool,
    token: &CancellationToken,
) -> Result<(), LineError> {
    let mut level = Level::Low;
    let mut toggles: u32 = 0;
    let mut deadline = Instant::now() + half_period;
    loop {
        if toggles % TOGGLES_PER_STOP_CHECK == 0
            && (!running.load(Ordering::Relaxed) || token.is_cancelled())
        {
            return Ok(());
        }
        level = level.inverted();
        line.write(level)?;
        toggles = toggles.wrapping_add(1);

        spin_until(deadline);
        deadline += half_period;
        // Fell behind, don't try to catch up with a burst of short periods.
        let now = Instant::now();
        if deadline < now {
            deadline = now;
        }
    }
}
