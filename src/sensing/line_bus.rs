use common::line::Direction;

use crate::ports::{DigitalLine, LineError, ParallelBus, SyncLines};

/// Number of data lines on the parallel video bus.
pub const DATA_LINES: usize = 8;

/// Parallel video bus built from individual digital lines.
pub struct LineBus<L> {
    vsync: L,
    href: L,
    pclk: L,
    /// `data[0]` is D0, the least significant bit.
    data: [L; DATA_LINES],
}

impl<L: DigitalLine> LineBus<L> {
    /// Take ownership of all bus lines and configure them as inputs.
    pub fn new(mut vsync: L, mut href: L, mut pclk: L, mut data: [L; DATA_LINES]) -> Result<Self, LineError> {
        vsync.configure(Direction::Input)?;
        href.configure(Direction::Input)?;
        pclk.configure(Direction::Input)?;
        for line in data.iter_mut() {
            line.configure(Direction::Input)?;
        }
        Ok(Self {
            vsync,
            href,
            pclk,
            data,
        })
    }
}

impl<L: DigitalLine> ParallelBus for LineBus<L> {
    fn sample_sync(&mut self) -> Result<SyncLines, LineError> {
        Ok(SyncLines {
            vsync: self.vsync.read()?,
            href: self.href.read()?,
            pclk: self.pclk.read()?,
        })
    }

    fn sample_data(&mut self) -> Result<u8, LineError> {
        let mut byte = 0u8;
        for (bit, line) in self.data.iter_mut().enumerate() {
            if line.read()?.is_high() {
                byte |= 1 << bit;
            }
        }
        Ok(byte)
    }
}
