pub mod event_logging;
pub mod frame_sinks;
pub mod gpio;
pub mod hardware;
pub mod liveness;
pub mod relays;
pub mod simulation;
