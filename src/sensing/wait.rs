use std::time::{Duration, Instant};

use common::line::Level;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::ports::{Clock, DigitalLine, LineError};

/// Polls between cancellation checks. Checking the token takes a lock, so
/// it is kept out of the tightest part of the loop.
const POLLS_PER_CANCEL_CHECK: u32 = 256;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WaitError {
    #[error("Timed out waiting for line condition.")]
    Timeout,

    #[error("Cancelled while waiting for line condition.")]
    Cancelled,

    #[error(transparent)]
    Line(#[from] LineError),
}

/// Poll `probe` until it yields a value, `timeout` expires or `token` is
/// cancelled. Returns the value and the instant it was observed.
pub fn wait_until<C, T, F>(
    clock: &C,
    timeout: Duration,
    token: &CancellationToken,
    mut probe: F,
) -> Result<(T, Instant), WaitError>
where
    C: Clock + ?Sized,
    F: FnMut() -> Result<Option<T>, LineError>,
{
    if token.is_cancelled() {
        return Err(WaitError::Cancelled);
    }
    let started = clock.now();
    let mut polls: u32 = 0;
    loop {
        if let Some(value) = probe()? {
            return Ok((value, clock.now()));
        }
        if clock.now().duration_since(started) > timeout {
            return Err(WaitError::Timeout);
        }
        polls = polls.wrapping_add(1);
        if polls % POLLS_PER_CANCEL_CHECK == 0 && token.is_cancelled() {
            return Err(WaitError::Cancelled);
        }
    }
}

/// Wait for `line` to read `level`. Returns the instant it was observed.
pub fn wait_for_level<C, L>(
    clock: &C,
    line: &mut L,
    level: Level,
    timeout: Duration,
    token: &CancellationToken,
) -> Result<Instant, WaitError>
where
    C: Clock + ?Sized,
    L: DigitalLine + ?Sized,
{
    wait_until(clock, timeout, token, || {
        Ok((line.read()? == level).then_some(()))
    })
    .map(|(_, at)| at)
}

/// Busy wait until `deadline`. Sleeping is far too coarse for microsecond
/// scale pulses.
pub fn spin_until(deadline: Instant) {
    while Instant::now() < deadline {
        std::hint::spin_loop();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::{clock::testing::ManualClock, externals::gpio::memory::MemoryLine};

    use super::*;

    #[test]
    fn test_returns_when_probe_succeeds() {
        let clock = ManualClock::new(Duration::from_micros(1));
        let token = CancellationToken::new();
        let mut calls = 0;
        let (value, _) = wait_until(&clock, Duration::from_millis(1), &token, || {
            calls += 1;
            Ok((calls == 5).then_some(calls))
        })
        .expect("Failed to wait.");
        assert_eq!(value, 5);
    }

    #[test]
    fn test_times_out() {
        let clock = ManualClock::new(Duration::from_micros(10));
        let token = CancellationToken::new();
        let result = wait_until(&clock, Duration::from_millis(1), &token, || {
            Ok(None::<()>)
        });
        assert_eq!(result, Err(WaitError::Timeout));
        // One clock read per poll, so the wait ends within a couple of steps
        // of the timeout.
        assert!(clock.elapsed() <= Duration::from_millis(1) + Duration::from_micros(30));
    }

    #[test]
    fn test_cancelled_before_start() {
        let clock = ManualClock::new(Duration::from_micros(1));
        let token = CancellationToken::new();
        token.cancel();
        let result = wait_until(&clock, Duration::from_secs(1), &token, || Ok(Some(())));
        assert_eq!(result, Err(WaitError::Cancelled));
    }

    #[test]
    fn test_cancelled_while_polling() {
        let clock = ManualClock::new(Duration::from_nanos(1));
        let token = CancellationToken::new();
        let mut calls = 0u32;
        let result = wait_until(&clock, Duration::from_secs(1), &token, || {
            calls += 1;
            if calls == 10 {
                token.cancel();
            }
            Ok(None::<()>)
        });
        assert_eq!(result, Err(WaitError::Cancelled));
        assert!(calls <= POLLS_PER_CANCEL_CHECK);
    }

    #[test]
    fn test_line_error_propagates() {
        let clock = ManualClock::new(Duration::from_micros(1));
        let token = CancellationToken::new();
        let result = wait_until(&clock, Duration::from_secs(1), &token, || {
            Err::<Option<()>, _>(LineError::Io {
                index: 3,
                reason: "gone".into(),
            })
        });
        assert!(matches!(result, Err(WaitError::Line(_))));
    }

    #[test]
    fn test_wait_for_level() {
        let clock = ManualClock::new(Duration::from_micros(1));
        let token = CancellationToken::new();
        let mut line = MemoryLine::new(7);
        line.set(Level::High);
        wait_for_level(&clock, &mut line, Level::High, Duration::from_millis(1), &token)
            .expect("Failed to see high level.");
        let result = wait_for_level(&clock, &mut line, Level::Low, Duration::from_millis(1), &token);
        assert_eq!(result, Err(WaitError::Timeout));
    }
}
