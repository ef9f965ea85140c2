use std::{fs, path::PathBuf};

use chrono::{DateTime, Local};
use common::frame::FrameBuffer;
use tracing::{debug, instrument};

use crate::ports::{FrameSink, SinkError};

const FILE_NAME_FORMAT: &str = "capture-%Y%m%d-%H%M%S.raw";

/// Writes raw frame bytes to timestamped files.
pub struct FrameArchive {
    directory: PathBuf,
}

impl FrameArchive {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn file_name(at: &DateTime<Local>) -> String {
        at.format(FILE_NAME_FORMAT).to_string()
    }

    /// Write `frame` as captured at `at`. Creates the directory if needed.
    /// A second frame within the same second replaces the first.
    #[instrument(skip_all)]
    pub fn write(&self, frame: &FrameBuffer, at: &DateTime<Local>) -> std::io::Result<PathBuf> {
        fs::create_dir_all(&self.directory)?;
        let path = self.directory.join(Self::file_name(at));
        fs::write(&path, frame.data())?;
        debug!("Wrote {} to {}.", frame, path.display());
        Ok(path)
    }
}

impl FrameSink for FrameArchive {
    fn name(&self) -> &'static str {
        "archive"
    }

    fn submit(&mut self, frame: &FrameBuffer) -> Result<(), SinkError> {
        self.write(frame, &Local::now())?;
        Ok(())
    }
}
