use std::time::{Duration, Instant};

use embedded_hal::blocking::delay::DelayUs;

use crate::sensing::wait::spin_until;

/// Microsecond delay that busy waits on the monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpinDelay;

impl DelayUs<u32> for SpinDelay {
    fn delay_us(&mut self, us: u32) {
        spin_until(Instant::now() + Duration::from_micros(us as u64));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_waits_at_least_requested_time() {
        let mut delay = SpinDelay;
        let started = Instant::now();
        delay.delay_us(500);
        assert!(started.elapsed() >= Duration::from_micros(500));
    }
}
