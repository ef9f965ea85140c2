use common::frame::FrameBuffer;
use tracing::info;

use crate::ports::{FrameSink, SinkError};

/// Logs a one line summary of each frame.
pub struct LoggingFrameSink;

impl FrameSink for LoggingFrameSink {
    fn name(&self) -> &'static str {
        "logging"
    }

    fn submit(&mut self, frame: &FrameBuffer) -> Result<(), SinkError> {
        let checksum = frame
            .data()
            .iter()
            .fold(0u32, |acc, byte| acc.wrapping_add(*byte as u32));
        info!("Got frame: {} checksum {:08x}", frame, checksum);
        Ok(())
    }
}
