pub mod delay;
pub mod memory;
#[cfg(feature = "rpi")]
pub mod raspberry;
