pub mod clock_generator;
pub mod frame_acquirer;
pub mod line_bus;
pub mod range_sensor;
pub mod wait;
