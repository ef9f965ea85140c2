use common::line::{Direction, Level};
use rppal::gpio::{self, Gpio, IoPin, Mode};

use crate::ports::{DigitalLine, LineError};

/// A Raspberry Pi GPIO line addressed by BCM number.
pub struct RppalLine {
    pin: IoPin,
    direction: Direction,
}

impl RppalLine {
    /// Claim `bcm` and configure it. Claiming fails if any other handle
    /// already owns the pin.
    pub fn claim(gpio: &Gpio, bcm: u8, direction: Direction) -> Result<Self, LineError> {
        let pin = gpio
            .get(bcm)
            .map_err(|e| LineError::Configuration {
                index: bcm,
                direction,
                reason: e.to_string(),
            })?
            .into_io(to_mode(direction));
        Ok(Self { pin, direction })
    }
}

fn to_mode(direction: Direction) -> Mode {
    match direction {
        Direction::Input => Mode::Input,
        Direction::Output => Mode::Output,
    }
}

impl DigitalLine for RppalLine {
    fn index(&self) -> u8 {
        self.pin.pin()
    }

    fn configure(&mut self, direction: Direction) -> Result<(), LineError> {
        self.pin.set_mode(to_mode(direction));
        self.direction = direction;
        Ok(())
    }

    fn read(&mut self) -> Result<Level, LineError> {
        Ok(match self.pin.read() {
            gpio::Level::High => Level::High,
            gpio::Level::Low => Level::Low,
        })
    }

    fn write(&mut self, level: Level) -> Result<(), LineError> {
        if self.direction != Direction::Output {
            return Err(LineError::WrongDirection {
                index: self.pin.pin(),
                expected: Direction::Output,
                actual: self.direction,
            });
        }
        self.pin.write(match level {
            Level::High => gpio::Level::High,
            Level::Low => gpio::Level::Low,
        });
        Ok(())
    }
}
