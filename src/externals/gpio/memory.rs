use std::sync::{Arc, Mutex};

use common::line::{Direction, Level};

use crate::ports::{DigitalLine, LineError};

#[derive(Debug)]
struct LineState {
    level: Level,
    direction: Direction,
    writes: u64,
}

/// In-memory line. Clones share state, so one handle can be given to a
/// component while another observes or drives it from outside.
#[derive(Debug, Clone)]
pub struct MemoryLine {
    index: u8,
    state: Arc<Mutex<LineState>>,
}

impl MemoryLine {
    pub fn new(index: u8) -> Self {
        Self {
            index,
            state: Arc::new(Mutex::new(LineState {
                level: Level::Low,
                direction: Direction::Input,
                writes: 0,
            })),
        }
    }

    /// Drive the line from outside, as the far end of the wire would.
    pub fn set(&self, level: Level) {
        self.lock().level = level;
    }

    pub fn level(&self) -> Level {
        self.lock().level
    }

    pub fn direction(&self) -> Direction {
        self.lock().direction
    }

    /// Number of writes made through `DigitalLine::write`.
    pub fn writes(&self) -> u64 {
        self.lock().writes
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LineState> {
        // A poisoned lock only means a writer panicked mid update of plain
        // values; the state itself is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl DigitalLine for MemoryLine {
    fn index(&self) -> u8 {
        self.index
    }

    fn configure(&mut self, direction: Direction) -> Result<(), LineError> {
        self.lock().direction = direction;
        Ok(())
    }

    fn read(&mut self) -> Result<Level, LineError> {
        Ok(self.lock().level)
    }

    fn write(&mut self, level: Level) -> Result<(), LineError> {
        let mut state = self.lock();
        if state.direction != Direction::Output {
            return Err(LineError::WrongDirection {
                index: self.index,
                expected: Direction::Output,
                actual: state.direction,
            });
        }
        state.level = level;
        state.writes += 1;
        Ok(())
    }
}
