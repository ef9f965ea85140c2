use alloc::{vec, vec::Vec};
use core::fmt::Display;
use thiserror_no_std::Error;

/// Dimensions of a raster frame in the sensor's native pixel order.
///
/// ```
/// use common::frame::FrameGeometry;
/// let geometry = FrameGeometry::new(320, 240, 2).expect("Failed to get FrameGeometry.");
/// assert_eq!(geometry.row_bytes(), 640);
/// assert_eq!(geometry.frame_bytes(), 153_600);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    width: u16,
    height: u16,
    bytes_per_pixel: u8,
}

#[derive(Debug, Error)]
pub enum FrameGeometryError {
    /// Width, height and bytes per pixel must all be non-zero.
    #[error("Frame geometry has a zero dimension.")]
    ZeroDimension,
}

impl FrameGeometry {
    pub fn new(width: u16, height: u16, bytes_per_pixel: u8) -> Result<Self, FrameGeometryError> {
        if width == 0 || height == 0 || bytes_per_pixel == 0 {
            return Err(FrameGeometryError::ZeroDimension);
        }
        Ok(Self {
            width,
            height,
            bytes_per_pixel,
        })
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn bytes_per_pixel(&self) -> u8 {
        self.bytes_per_pixel
    }

    /// Number of bytes clocked out for one row.
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.bytes_per_pixel as usize
    }

    /// Number of bytes in a full frame.
    pub fn frame_bytes(&self) -> usize {
        self.row_bytes() * self.height as usize
    }
}

impl Display for FrameGeometry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{}x{}x{}",
            self.width, self.height, self.bytes_per_pixel
        )
    }
}

/// Whether every byte of a frame was actually sampled from the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completeness {
    Complete,

    /// Some bytes are zero fill. Counts are in rows.
    Partial {
        /// Rows where href dropped before the row was full.
        short_rows: u16,

        /// Rows where more bytes arrived than the row can hold.
        overrun_rows: u16,

        /// Rows never started because the frame ended early.
        missing_rows: u16,
    },
}

impl Completeness {
    pub fn is_complete(&self) -> bool {
        matches!(self, Completeness::Complete)
    }
}

/// A raw frame. `data.len()` always equals `geometry.frame_bytes()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    geometry: FrameGeometry,
    data: Vec<u8>,
    completeness: Completeness,
}

#[derive(Debug, Error)]
pub enum FrameBufferError {
    /// The byte count does not match the geometry.
    #[error("Frame data length does not match geometry.")]
    LengthMismatch { expected: usize, actual: usize },
}

impl FrameBuffer {
    /// A complete frame built from already sampled data.
    pub fn new(geometry: FrameGeometry, data: Vec<u8>) -> Result<Self, FrameBufferError> {
        Self::with_completeness(geometry, data, Completeness::Complete)
    }

    pub fn with_completeness(
        geometry: FrameGeometry,
        data: Vec<u8>,
        completeness: Completeness,
    ) -> Result<Self, FrameBufferError> {
        if data.len() != geometry.frame_bytes() {
            return Err(FrameBufferError::LengthMismatch {
                expected: geometry.frame_bytes(),
                actual: data.len(),
            });
        }
        Ok(Self {
            geometry,
            data,
            completeness,
        })
    }

    /// An all zero frame of the given geometry.
    pub fn zeroed(geometry: FrameGeometry) -> Self {
        Self {
            geometry,
            data: vec![0u8; geometry.frame_bytes()],
            completeness: Completeness::Complete,
        }
    }

    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable view of the bytes. The length can't change through a slice.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn completeness(&self) -> Completeness {
        self.completeness
    }

    pub fn is_complete(&self) -> bool {
        self.completeness.is_complete()
    }

    /// One row of the frame.
    pub fn row(&self, row: u16) -> Option<&[u8]> {
        if row >= self.geometry.height {
            return None;
        }
        let start = row as usize * self.geometry.row_bytes();
        self.data.get(start..start + self.geometry.row_bytes())
    }

    /// The same frame carrying a different completeness tag.
    pub fn tagged(self, completeness: Completeness) -> Self {
        Self {
            completeness,
            ..self
        }
    }
}

impl Display for FrameBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let tag = if self.is_complete() {
            "complete"
        } else {
            "partial"
        };
        write!(f, "<Frame {} {} bytes {}>", self.geometry, self.data.len(), tag)
    }
}
