use common::line::{Direction, Level};
use tracing::{debug, info};

use crate::{
    models::actuator_command::ActuatorCommand,
    ports::{ActuatorPort, DigitalLine, LineError},
};

/// Fan and light relays, each on its own output line. High energises the
/// relay.
pub struct RelayBank<L> {
    fan: L,
    light: L,
    current: ActuatorCommand,
}

impl<L: DigitalLine> RelayBank<L> {
    /// Claim both lines as outputs and switch everything off.
    pub fn new(mut fan: L, mut light: L) -> Result<Self, LineError> {
        fan.configure(Direction::Output)?;
        light.configure(Direction::Output)?;
        fan.write(Level::Low)?;
        light.write(Level::Low)?;
        Ok(Self {
            fan,
            light,
            current: ActuatorCommand::OFF,
        })
    }

    pub fn current(&self) -> ActuatorCommand {
        self.current
    }
}

impl<L: DigitalLine> ActuatorPort for RelayBank<L> {
    fn apply(&mut self, command: ActuatorCommand) -> Result<(), LineError> {
        self.fan.write(Level::from(command.fan))?;
        self.light.write(Level::from(command.light))?;

        if command != self.current {
            info!("Relays switched to {}.", command);
        } else {
            debug!("Relays held at {}.", command);
        }
        self.current = command;
        Ok(())
    }
}
