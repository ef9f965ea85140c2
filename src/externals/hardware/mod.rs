use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::{
    clock::SystemClock,
    config::{Backend, Cli, ConfigError},
    externals::{
        gpio::{delay::SpinDelay, memory::MemoryLine},
        relays::RelayBank,
        simulation::{camera::synthetic_camera, ranging::SimulatedRangeBench},
    },
    ports::{ActuatorPort, Clock, DigitalLine, FrameSource, LineError, RangingPort},
    sensing::{
        clock_generator::{ClockGenerator, HALF_PERIOD},
        frame_acquirer::FrameAcquirer,
        range_sensor::RangeSensor,
    },
};

#[derive(Error, Debug)]
pub enum HardwareError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Line(#[from] LineError),

    #[error("Failed to open GPIO. Error: {0}")]
    Gpio(String),

    #[error("Backend is not available in this build: {0}")]
    Unsupported(&'static str),
}

/// Every hardware facing port, built for the configured backend. Each line
/// ends up owned by exactly one of these.
pub struct HardwareModule {
    pub ranging: Box<dyn RangingPort>,
    pub frames: Box<dyn FrameSource>,
    pub actuators: Box<dyn ActuatorPort>,
    pub clock_generator: ClockGenerator<Box<dyn DigitalLine>>,
}

impl HardwareModule {
    /// Validate the pin assignment and claim every line. Any failure here is
    /// fatal.
    pub fn initialize(cli: &Cli) -> Result<Self, HardwareError> {
        cli.pins.validate()?;
        info!("Initializing {:?} backend.", cli.backend);
        match cli.backend {
            Backend::Simulated => Self::simulated(cli),
            Backend::Rpi => Self::raspberry(cli),
        }
    }

    fn simulated(cli: &Cli) -> Result<Self, HardwareError> {
        let pins = &cli.pins;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let bench = SimulatedRangeBench::from_distances(clock.clone(), &cli.sim_distances);
        let (trigger, echo) = bench.lines(pins.trigger_pin, pins.echo_pin);
        let ranging = RangeSensor::new(trigger, echo, SpinDelay, clock.clone())?;

        let frames = FrameAcquirer::new(synthetic_camera(cli.geometry), clock);

        let actuators = RelayBank::new(
            MemoryLine::new(pins.fan_pin),
            MemoryLine::new(pins.light_pin),
        )?;

        let xclk: Box<dyn DigitalLine> = Box::new(MemoryLine::new(pins.xclk_pin));
        let clock_generator = ClockGenerator::new(xclk, HALF_PERIOD)?;

        Ok(Self {
            ranging: Box::new(ranging),
            frames: Box::new(frames),
            actuators: Box::new(actuators),
            clock_generator,
        })
    }

    #[cfg(feature = "rpi")]
    fn raspberry(cli: &Cli) -> Result<Self, HardwareError> {
        use common::line::Direction;
        use rppal::gpio::Gpio;

        use crate::{externals::gpio::raspberry::RppalLine, sensing::line_bus::LineBus};

        let pins = &cli.pins;
        let gpio = Gpio::new().map_err(|e| HardwareError::Gpio(e.to_string()))?;
        let claim = |bcm: u8, direction: Direction| RppalLine::claim(&gpio, bcm, direction);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let ranging = RangeSensor::new(
            claim(pins.trigger_pin, Direction::Output)?,
            claim(pins.echo_pin, Direction::Input)?,
            SpinDelay,
            clock.clone(),
        )?;

        let data_pins = pins.data()?;
        let data: [RppalLine; 8] = data_pins
            .iter()
            .map(|bcm| claim(*bcm, Direction::Input))
            .collect::<Result<Vec<_>, _>>()?
            .try_into()
            .map_err(|lines: Vec<RppalLine>| ConfigError::DataPinCount(lines.len()))?;
        let bus = LineBus::new(
            claim(pins.vsync_pin, Direction::Input)?,
            claim(pins.href_pin, Direction::Input)?,
            claim(pins.pclk_pin, Direction::Input)?,
            data,
        )?;
        let frames = FrameAcquirer::new(bus, clock);

        let actuators = RelayBank::new(
            claim(pins.fan_pin, Direction::Output)?,
            claim(pins.light_pin, Direction::Output)?,
        )?;

        let xclk: Box<dyn DigitalLine> = Box::new(claim(pins.xclk_pin, Direction::Output)?);
        let clock_generator = ClockGenerator::new(xclk, HALF_PERIOD)?;

        Ok(Self {
            ranging: Box::new(ranging),
            frames: Box::new(frames),
            actuators: Box::new(actuators),
            clock_generator,
        })
    }

    #[cfg(not(feature = "rpi"))]
    fn raspberry(_cli: &Cli) -> Result<Self, HardwareError> {
        Err(HardwareError::Unsupported(
            "the rpi backend needs the `rpi` cargo feature",
        ))
    }
}
