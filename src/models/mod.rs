pub mod actuator_command;
pub mod control_event;
pub mod distance_sample;
