use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use common::{
    line::{Direction, Level},
    physical::ECHO_CM_PER_S,
};

use crate::ports::{Clock, DigitalLine, LineError};

/// Delay between the end of the trigger pulse and the echo line rising.
pub const ECHO_LATENCY: Duration = Duration::from_micros(250);

/// How the simulated room answers one trigger pulse.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Echo {
    /// An object at this many centimeters.
    Reflect(f32),

    /// Nothing comes back; the echo line never rises.
    Silent,

    /// The echo line rises and never falls.
    StuckHigh,
}

struct BenchState {
    script: Vec<Echo>,
    next: usize,
    trigger_level: Level,
    trigger_direction: Direction,
    /// Rise and optional fall of the current echo pulse.
    pulse: Option<(Instant, Option<Instant>)>,
}

/// Ultrasonic sensor stand-in. Every falling edge on the trigger line starts
/// the next scripted echo; the script wraps around when exhausted.
pub struct SimulatedRangeBench {
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<BenchState>>,
}

pub struct SimulatedTrigger {
    index: u8,
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<BenchState>>,
}

pub struct SimulatedEcho {
    index: u8,
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<BenchState>>,
}

fn lock(state: &Mutex<BenchState>) -> MutexGuard<'_, BenchState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

impl SimulatedRangeBench {
    pub fn new(clock: Arc<dyn Clock>, script: Vec<Echo>) -> Self {
        Self {
            clock,
            state: Arc::new(Mutex::new(BenchState {
                script,
                next: 0,
                trigger_level: Level::Low,
                trigger_direction: Direction::Input,
                pulse: None,
            })),
        }
    }

    /// Simulated echoes for a fixed list of distances in centimeters.
    pub fn from_distances(clock: Arc<dyn Clock>, distances: &[f32]) -> Self {
        Self::new(clock, distances.iter().map(|cm| Echo::Reflect(*cm)).collect())
    }

    /// Handles for the trigger and echo lines.
    pub fn lines(&self, trigger_index: u8, echo_index: u8) -> (SimulatedTrigger, SimulatedEcho) {
        (
            SimulatedTrigger {
                index: trigger_index,
                clock: self.clock.clone(),
                state: self.state.clone(),
            },
            SimulatedEcho {
                index: echo_index,
                clock: self.clock.clone(),
                state: self.state.clone(),
            },
        )
    }
}

impl BenchState {
    fn next_echo(&mut self) -> Echo {
        if self.script.is_empty() {
            return Echo::Silent;
        }
        let echo = self.script[self.next % self.script.len()];
        self.next = (self.next + 1) % self.script.len();
        echo
    }
}

impl DigitalLine for SimulatedTrigger {
    fn index(&self) -> u8 {
        self.index
    }

    fn configure(&mut self, direction: Direction) -> Result<(), LineError> {
        lock(&self.state).trigger_direction = direction;
        Ok(())
    }

    fn read(&mut self) -> Result<Level, LineError> {
        Ok(lock(&self.state).trigger_level)
    }

    fn write(&mut self, level: Level) -> Result<(), LineError> {
        let mut state = lock(&self.state);
        if state.trigger_direction != Direction::Output {
            return Err(LineError::WrongDirection {
                index: self.index,
                expected: Direction::Output,
                actual: state.trigger_direction,
            });
        }
        let falling = state.trigger_level.is_high() && level.is_low();
        state.trigger_level = level;
        if falling {
            let fired_at = self.clock.now();
            let rise = fired_at + ECHO_LATENCY;
            state.pulse = match state.next_echo() {
                Echo::Reflect(cm) => {
                    let width = Duration::from_secs_f32(cm.max(0f32) / ECHO_CM_PER_S);
                    Some((rise, Some(rise + width)))
                }
                Echo::Silent => None,
                Echo::StuckHigh => Some((rise, None)),
            };
        }
        Ok(())
    }
}

impl DigitalLine for SimulatedEcho {
    fn index(&self) -> u8 {
        self.index
    }

    fn configure(&mut self, direction: Direction) -> Result<(), LineError> {
        match direction {
            Direction::Input => Ok(()),
            Direction::Output => Err(LineError::Configuration {
                index: self.index,
                direction,
                reason: "echo line is driven by the sensor".into(),
            }),
        }
    }

    fn read(&mut self) -> Result<Level, LineError> {
        let now = self.clock.now();
        let state = lock(&self.state);
        let high = match state.pulse {
            Some((rise, fall)) => now >= rise && fall.map_or(true, |fall| now < fall),
            None => false,
        };
        Ok(Level::from(high))
    }

    fn write(&mut self, _level: Level) -> Result<(), LineError> {
        Err(LineError::WrongDirection {
            index: self.index,
            expected: Direction::Output,
            actual: Direction::Input,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::clock::testing::ManualClock;

    use super::*;

    #[test]
    fn test_echo_follows_trigger() {
        let clock = Arc::new(ManualClock::new(Duration::ZERO));
        let bench = SimulatedRangeBench::new(clock.clone(), vec![Echo::Reflect(171.5f32)]);
        let (mut trigger, mut echo) = bench.lines(17, 27);
        trigger
            .configure(Direction::Output)
            .expect("Failed to configure trigger.");

        assert_eq!(echo.read().expect("Failed to read."), Level::Low);

        trigger.write(Level::High).expect("Failed to write.");
        trigger.write(Level::Low).expect("Failed to write.");

        clock.advance(ECHO_LATENCY);
        assert_eq!(echo.read().expect("Failed to read."), Level::High);

        // 171.5 cm is a 10 ms round trip.
        clock.advance(Duration::from_micros(9_990));
        assert_eq!(echo.read().expect("Failed to read."), Level::High);
        clock.advance(Duration::from_micros(20));
        assert_eq!(echo.read().expect("Failed to read."), Level::Low);
    }

    #[test]
    fn test_script_wraps() {
        let clock = Arc::new(ManualClock::new(Duration::ZERO));
        let bench = SimulatedRangeBench::new(clock.clone(), vec![Echo::Silent, Echo::StuckHigh]);
        let (mut trigger, mut echo) = bench.lines(17, 27);
        trigger
            .configure(Direction::Output)
            .expect("Failed to configure trigger.");

        for expected in [Level::Low, Level::High, Level::Low] {
            trigger.write(Level::High).expect("Failed to write.");
            trigger.write(Level::Low).expect("Failed to write.");
            clock.advance(Duration::from_secs(5));
            assert_eq!(echo.read().expect("Failed to read."), expected);
        }
    }

    #[test]
    fn test_trigger_must_be_output() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Duration::ZERO));
        let bench = SimulatedRangeBench::new(clock, vec![]);
        let (mut trigger, mut echo) = bench.lines(17, 27);
        assert!(trigger.write(Level::High).is_err());
        assert!(echo.configure(Direction::Output).is_err());
    }
}
