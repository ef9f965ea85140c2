use derive_more::Display;

/// Target state of the relays.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Default)]
#[display(fmt = "<ActuatorCommand | fan:{}, light:{}>", fan, light)]
pub struct ActuatorCommand {
    pub fan: bool,
    pub light: bool,
}

impl ActuatorCommand {
    pub const OFF: ActuatorCommand = ActuatorCommand {
        fan: false,
        light: false,
    };

    pub const ON: ActuatorCommand = ActuatorCommand {
        fan: true,
        light: true,
    };
}

/// Output of the actuation gate for one distance sample.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
#[display(fmt = "<Decision | presence:{}, command:{}>", presence, command)]
pub struct Decision {
    pub presence: bool,
    pub command: ActuatorCommand,
}
