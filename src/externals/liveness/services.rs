use std::{io, time::Duration};

use systemstat::{Platform, System};
use thiserror::Error;

/// Separates reading host uptime from the liveness endpoint so the endpoint
/// can be tested without a real host.
pub trait HostUptimeService: Send {
    fn uptime(&self) -> Result<Duration, UptimeServiceError>;
}

pub struct HostUptimeServiceActual;

#[derive(Error, Debug)]
pub enum UptimeServiceError {
    /// This occurs if systemstat fails to report the uptime.
    #[error("Failed to read host uptime.")]
    FailedToRead(#[from] io::Error),
}

impl HostUptimeService for HostUptimeServiceActual {
    fn uptime(&self) -> Result<Duration, UptimeServiceError> {
        Ok(System::new().uptime()?)
    }
}
