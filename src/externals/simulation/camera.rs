use common::{frame::FrameGeometry, line::Level};

use crate::ports::{LineError, ParallelBus, SyncLines};

/// One step of a scripted bus timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusState {
    pub sync: SyncLines,
    pub data: u8,
}

const IDLE: BusState = BusState {
    sync: SyncLines {
        vsync: Level::Low,
        href: Level::Low,
        pclk: Level::Low,
    },
    data: 0,
};

/// Builder for a parallel video bus timeline. Each state is seen by exactly
/// one `sample_sync` call, which is how a polling reader would see the
/// lines if it sampled once per signal change.
#[derive(Debug, Clone, Default)]
pub struct FrameScript {
    states: Vec<BusState>,
}

impl FrameScript {
    pub fn new() -> Self {
        Self { states: Vec::new() }
    }

    fn push(mut self, vsync: Level, href: Level, pclk: Level, data: u8) -> Self {
        self.states.push(BusState {
            sync: SyncLines { vsync, href, pclk },
            data,
        });
        self
    }

    /// Vsync pulse marking the start of a frame.
    pub fn frame_start(self) -> Self {
        self.push(Level::High, Level::Low, Level::Low, 0)
            .push(Level::Low, Level::Low, Level::Low, 0)
    }

    /// Vsync rising again, ending the frame.
    pub fn frame_end(self) -> Self {
        self.push(Level::High, Level::Low, Level::Low, 0)
    }

    pub fn row_start(self) -> Self {
        self.push(Level::Low, Level::High, Level::Low, 0)
    }

    /// One pixel clock pulse carrying `byte`.
    pub fn byte(self, byte: u8) -> Self {
        self.push(Level::Low, Level::High, Level::High, byte)
            .push(Level::Low, Level::High, Level::Low, byte)
    }

    pub fn row_end(self) -> Self {
        self.push(Level::Low, Level::Low, Level::Low, 0)
    }

    /// A whole row. Fewer or more bytes than the geometry expects produce a
    /// short or overrun row.
    pub fn row(self, bytes: &[u8]) -> Self {
        bytes
            .iter()
            .fold(self.row_start(), |script, byte| script.byte(*byte))
            .row_end()
    }

    /// A complete frame of `pixels`, cut into rows of the geometry's width.
    pub fn frame(geometry: FrameGeometry, pixels: &[u8]) -> Self {
        pixels
            .chunks(geometry.row_bytes())
            .take(geometry.height() as usize)
            .fold(Self::new().frame_start(), |script, row| script.row(row))
            .frame_end()
    }

    pub fn into_bus(self) -> ScriptedBus {
        ScriptedBus::new(self.states, false)
    }

    /// A bus that replays the script forever.
    pub fn into_repeating_bus(self) -> ScriptedBus {
        ScriptedBus::new(self.states, true)
    }
}

/// Parallel bus replaying a scripted timeline. Once a non repeating script
/// is exhausted the last state holds forever, like lines that stopped moving.
pub struct ScriptedBus {
    states: Vec<BusState>,
    cursor: usize,
    current: BusState,
    repeat: bool,
}

impl ScriptedBus {
    fn new(states: Vec<BusState>, repeat: bool) -> Self {
        Self {
            states,
            cursor: 0,
            current: IDLE,
            repeat,
        }
    }
}

impl ParallelBus for ScriptedBus {
    fn sample_sync(&mut self) -> Result<SyncLines, LineError> {
        if let Some(state) = self.states.get(self.cursor) {
            self.current = *state;
            self.cursor += 1;
            if self.repeat && self.cursor == self.states.len() {
                self.cursor = 0;
            }
        }
        Ok(self.current.sync)
    }

    fn sample_data(&mut self) -> Result<u8, LineError> {
        Ok(self.current.data)
    }
}

/// Recognisable pattern for simulated frames: luma ramps along the row,
/// chroma bytes carry the row number.
pub fn test_pattern(geometry: FrameGeometry) -> Vec<u8> {
    let row_bytes = geometry.row_bytes();
    (0..geometry.frame_bytes())
        .map(|i| {
            let (row, column) = (i / row_bytes, i % row_bytes);
            if column % 2 == 1 {
                (column / 2) as u8
            } else {
                row as u8
            }
        })
        .collect()
}

/// Synthetic camera producing the test pattern over and over.
pub fn synthetic_camera(geometry: FrameGeometry) -> ScriptedBus {
    FrameScript::frame(geometry, &test_pattern(geometry)).into_repeating_bus()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_script_holds_last_state() {
        let mut bus = FrameScript::new().frame_start().into_bus();
        assert!(bus.sample_sync().expect("Failed to sample.").vsync.is_high());
        assert!(bus.sample_sync().expect("Failed to sample.").vsync.is_low());
        for _ in 0..10 {
            assert!(bus.sample_sync().expect("Failed to sample.").vsync.is_low());
        }
    }

    #[test]
    fn test_data_follows_last_sync_sample() {
        let mut bus = FrameScript::new().row_start().byte(0xA5).into_bus();
        bus.sample_sync().expect("Failed to sample.");
        let sync = bus.sample_sync().expect("Failed to sample.");
        assert!(sync.pclk.is_high());
        assert_eq!(bus.sample_data().expect("Failed to sample."), 0xA5);
    }

    #[test]
    fn test_repeating_bus_wraps() {
        let mut bus = FrameScript::new().frame_end().into_repeating_bus();
        for _ in 0..3 {
            assert!(bus.sample_sync().expect("Failed to sample.").vsync.is_high());
        }
    }

    #[test]
    fn test_pattern_has_frame_size() {
        let geometry = FrameGeometry::new(320, 240, 2).expect("Failed to get geometry.");
        let pattern = test_pattern(geometry);
        assert_eq!(pattern.len(), geometry.frame_bytes());
        assert_eq!(pattern[1], 0);
        assert_eq!(pattern[3], 1);
        assert_eq!(pattern[640], 1);
    }
}
