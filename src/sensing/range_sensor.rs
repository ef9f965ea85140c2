use std::time::Duration;

use common::{
    line::{Direction, Level},
    physical::Distance,
};
use embedded_hal::blocking::delay::DelayUs;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

use crate::{
    models::distance_sample::{DistanceSample, RangingFault},
    ports::{Clock, DigitalLine, LineError, RangingPort},
};

use super::wait::{wait_for_level, WaitError};

/// Time the trigger is held low before the pulse.
pub const TRIGGER_SETTLE_US: u32 = 2;

/// Width of the trigger pulse.
pub const TRIGGER_PULSE_US: u32 = 10;

/// Default bound for each of the two echo waits.
pub const ECHO_TIMEOUT: Duration = Duration::from_secs(1);

/// Errors that abort a measurement. Echo timeouts are not errors; they yield
/// an invalid sample instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RangingError {
    #[error("Ranging was cancelled.")]
    Cancelled,

    #[error(transparent)]
    Line(#[from] LineError),
}

/// Ultrasonic echo pulse-width range sensor (HC-SR04 style).
pub struct RangeSensor<T, E, D, C> {
    trigger: T,
    echo: E,
    delay: D,
    clock: C,
}

impl<T, E, D, C> RangeSensor<T, E, D, C>
where
    T: DigitalLine,
    E: DigitalLine,
    D: DelayUs<u32> + Send,
    C: Clock,
{
    /// Take ownership of the trigger and echo lines and configure them.
    /// The trigger is left low.
    pub fn new(mut trigger: T, mut echo: E, delay: D, clock: C) -> Result<Self, LineError> {
        trigger.configure(Direction::Output)?;
        trigger.write(Level::Low)?;
        echo.configure(Direction::Input)?;
        Ok(Self {
            trigger,
            echo,
            delay,
            clock,
        })
    }

    fn fire_trigger(&mut self) -> Result<(), LineError> {
        self.trigger.write(Level::Low)?;
        self.delay.delay_us(TRIGGER_SETTLE_US);
        self.trigger.write(Level::High)?;
        self.delay.delay_us(TRIGGER_PULSE_US);
        self.trigger.write(Level::Low)
    }

    /// Fire one pulse and time the echo. Each echo wait is bounded by
    /// `timeout` on its own, so a stuck echo returns within twice the timeout.
    #[instrument(skip_all)]
    pub fn measure(
        &mut self,
        timeout: Duration,
        token: &CancellationToken,
    ) -> Result<DistanceSample, RangingError> {
        self.fire_trigger()?;
        trace!("Trigger fired.");

        let rose_at = match wait_for_level(&self.clock, &mut self.echo, Level::High, timeout, token)
        {
            Ok(at) => at,
            Err(WaitError::Timeout) => {
                let fault = RangingFault::EchoRiseTimeout;
                warn!("Timeout waiting for echo high. Reason: {}", fault.tag());
                return Ok(DistanceSample::invalid(fault, self.clock.now()));
            }
            Err(WaitError::Cancelled) => return Err(RangingError::Cancelled),
            Err(WaitError::Line(e)) => return Err(e.into()),
        };

        let fell_at = match wait_for_level(&self.clock, &mut self.echo, Level::Low, timeout, token)
        {
            Ok(at) => at,
            Err(WaitError::Timeout) => {
                let fault = RangingFault::EchoFallTimeout;
                warn!("Timeout waiting for echo low. Reason: {}", fault.tag());
                return Ok(DistanceSample::invalid(fault, self.clock.now()));
            }
            Err(WaitError::Cancelled) => return Err(RangingError::Cancelled),
            Err(WaitError::Line(e)) => return Err(e.into()),
        };

        let width = fell_at.duration_since(rose_at);
        let distance = Distance::from_echo(width);
        debug!("Echo width {:?} gives {}.", width, distance);
        Ok(DistanceSample::valid(distance, fell_at))
    }
}

impl<T, E, D, C> RangingPort for RangeSensor<T, E, D, C>
where
    T: DigitalLine,
    E: DigitalLine,
    D: DelayUs<u32> + Send,
    C: Clock,
{
    fn measure(
        &mut self,
        timeout: Duration,
        token: &CancellationToken,
    ) -> Result<DistanceSample, RangingError> {
        RangeSensor::measure(self, timeout, token)
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Instant};

    use crate::{
        clock::{testing::ManualClock, SystemClock},
        externals::{
            gpio::delay::SpinDelay,
            simulation::ranging::{Echo, SimulatedEcho, SimulatedRangeBench, SimulatedTrigger},
        },
        models::distance_sample::Reading,
        ports::Clock,
    };

    use super::*;

    fn bench_with(
        script: Vec<Echo>,
    ) -> (
        Arc<ManualClock>,
        RangeSensor<SimulatedTrigger, SimulatedEcho, SpinDelay, Arc<ManualClock>>,
    ) {
        let clock = Arc::new(ManualClock::new(Duration::from_micros(1)));
        let bench = SimulatedRangeBench::new(clock.clone() as Arc<dyn Clock>, script);
        let (trigger, echo) = bench.lines(17, 27);
        let sensor = RangeSensor::new(trigger, echo, SpinDelay, clock.clone())
            .expect("Failed to create range sensor.");
        (clock, sensor)
    }

    #[test]
    fn test_measures_reflected_echo() {
        let (_, mut sensor) = bench_with(vec![Echo::Reflect(150f32)]);
        let token = CancellationToken::new();
        let sample = sensor
            .measure(ECHO_TIMEOUT, &token)
            .expect("Failed to measure.");
        let cm = sample.centimeters().expect("Expected a valid sample.");
        assert!((cm - 150f32).abs() < 0.5, "measured {} cm", cm);
    }

    #[test]
    fn test_distance_is_monotonic_in_echo_width() {
        let distances = [5f32, 20f32, 75f32, 150f32, 199f32, 250f32, 400f32];
        let (_, mut sensor) = bench_with(distances.iter().map(|d| Echo::Reflect(*d)).collect());
        let token = CancellationToken::new();

        let mut last = 0f32;
        for expected in distances {
            let cm = sensor
                .measure(ECHO_TIMEOUT, &token)
                .expect("Failed to measure.")
                .centimeters()
                .expect("Expected a valid sample.");
            assert!(cm > last);
            assert!((cm - expected).abs() < 0.5);
            last = cm;
        }
    }

    #[test]
    fn test_silent_echo_is_invalid_and_bounded() {
        let (clock, mut sensor) = bench_with(vec![Echo::Silent]);
        let token = CancellationToken::new();
        let timeout = Duration::from_millis(50);

        let before = clock.elapsed();
        let sample = sensor.measure(timeout, &token).expect("Failed to measure.");
        let spent = clock.elapsed() - before;

        assert_eq!(sample.reading, Reading::Invalid(RangingFault::EchoRiseTimeout));
        assert!(spent <= timeout + Duration::from_micros(20), "spent {:?}", spent);
    }

    #[test]
    fn test_stuck_echo_is_invalid_and_bounded() {
        let (clock, mut sensor) = bench_with(vec![Echo::StuckHigh]);
        let token = CancellationToken::new();
        let timeout = Duration::from_millis(50);

        let before = clock.elapsed();
        let sample = sensor.measure(timeout, &token).expect("Failed to measure.");
        let spent = clock.elapsed() - before;

        assert_eq!(sample.reading, Reading::Invalid(RangingFault::EchoFallTimeout));
        assert!(spent > timeout);
        assert!(spent <= 2 * timeout + Duration::from_millis(1), "spent {:?}", spent);
    }

    #[test]
    fn test_silent_echo_on_wall_clock() {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let bench = SimulatedRangeBench::new(clock.clone(), vec![Echo::Silent]);
        let (trigger, echo) = bench.lines(17, 27);
        let mut sensor =
            RangeSensor::new(trigger, echo, SpinDelay, clock).expect("Failed to create sensor.");
        let token = CancellationToken::new();
        let timeout = Duration::from_millis(20);

        let started = Instant::now();
        let sample = sensor.measure(timeout, &token).expect("Failed to measure.");

        assert!(!sample.is_valid());
        assert!(started.elapsed() < timeout + Duration::from_millis(200));
    }

    #[test]
    fn test_cancelled_measure() {
        let (_, mut sensor) = bench_with(vec![Echo::Silent]);
        let token = CancellationToken::new();
        token.cancel();
        let result = sensor.measure(ECHO_TIMEOUT, &token);
        assert_eq!(result, Err(RangingError::Cancelled));
    }
}
