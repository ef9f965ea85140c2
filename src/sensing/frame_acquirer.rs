use std::time::Duration;

use common::frame::{Completeness, FrameBuffer, FrameGeometry};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

use crate::ports::{Clock, FrameSource, LineError, ParallelBus, SyncLines};

use super::wait::{wait_until, WaitError};

/// Default bound for each individual wait during a capture.
pub const FRAME_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionError {
    #[error("Timed out waiting for vertical sync.")]
    FrameSyncTimeout,

    #[error("Timed out waiting for horizontal sync on row {row}.")]
    RowSyncTimeout { row: u16 },

    #[error("Timed out waiting for pixel clock on row {row}, byte {byte}.")]
    PixelClockTimeout { row: u16, byte: usize },

    #[error("Acquisition was cancelled.")]
    Cancelled,

    #[error(transparent)]
    Line(#[from] LineError),
}

impl AcquisitionError {
    /// Short tag used in log lines.
    pub fn tag(&self) -> &'static str {
        match self {
            AcquisitionError::FrameSyncTimeout => "frame-sync-timeout",
            AcquisitionError::RowSyncTimeout { .. } => "row-sync-timeout",
            AcquisitionError::PixelClockTimeout { .. } => "pixel-clock-timeout",
            AcquisitionError::Cancelled => "cancelled",
            AcquisitionError::Line(_) => "line-failure",
        }
    }

    fn from_wait(err: WaitError, on_timeout: AcquisitionError) -> Self {
        match err {
            WaitError::Timeout => on_timeout,
            WaitError::Cancelled => AcquisitionError::Cancelled,
            WaitError::Line(e) => AcquisitionError::Line(e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaptureState {
    AwaitingFrameStart,
    AwaitingRowStart,
    SamplingByte,
    AwaitingRowEnd,
    Done,
}

/// Per frame bookkeeping. Lives for one `capture_frame` call.
struct CaptureSession {
    frame: FrameBuffer,
    row: u16,
    column: usize,
    row_overran: bool,
    short_rows: u16,
    overrun_rows: u16,
    missing_rows: u16,
}

impl CaptureSession {
    fn new(geometry: FrameGeometry) -> Self {
        Self {
            frame: FrameBuffer::zeroed(geometry),
            row: 0,
            column: 0,
            row_overran: false,
            short_rows: 0,
            overrun_rows: 0,
            missing_rows: 0,
        }
    }

    fn geometry(&self) -> FrameGeometry {
        self.frame.geometry()
    }

    fn row_full(&self) -> bool {
        self.column >= self.geometry().row_bytes()
    }

    fn rows_done(&self) -> bool {
        self.row >= self.geometry().height()
    }

    /// Store the next byte of the current row. Bytes past the end of the
    /// row are dropped and the row is flagged.
    fn push(&mut self, byte: u8) {
        if self.row_full() || self.rows_done() {
            self.row_overran = true;
            return;
        }
        let index = self.row as usize * self.geometry().row_bytes() + self.column;
        if let Some(slot) = self.frame.data_mut().get_mut(index) {
            *slot = byte;
            self.column += 1;
        } else {
            self.row_overran = true;
        }
    }

    fn end_row(&mut self) {
        if !self.row_full() {
            self.short_rows += 1;
        }
        if self.row_overran {
            self.overrun_rows += 1;
        }
        self.row += 1;
        self.column = 0;
        self.row_overran = false;
    }

    fn end_frame_early(&mut self) {
        let height = self.geometry().height();
        self.missing_rows = height.saturating_sub(self.row);
        self.row = height;
    }

    fn into_frame(self) -> FrameBuffer {
        if self.short_rows == 0 && self.overrun_rows == 0 && self.missing_rows == 0 {
            return self.frame.tagged(Completeness::Complete);
        }
        let completeness = Completeness::Partial {
            short_rows: self.short_rows,
            overrun_rows: self.overrun_rows,
            missing_rows: self.missing_rows,
        };
        self.frame.tagged(completeness)
    }
}

/// Reconstructs frames from a parallel video bus by polling its lines.
///
/// Capture is a state machine:
/// `AwaitingFrameStart -> AwaitingRowStart -> SamplingByte* -> AwaitingRowEnd`
/// then back to `AwaitingRowStart` or on to `Done`. Any timeout aborts the
/// capture. Only one capture can run at a time since it needs `&mut self`.
pub struct FrameAcquirer<B, C> {
    bus: B,
    clock: C,
}

impl<B: ParallelBus, C: Clock> FrameAcquirer<B, C> {
    pub fn new(bus: B, clock: C) -> Self {
        Self { bus, clock }
    }

    /// Poll the sync lines until `predicate` yields a value.
    fn wait_sync<T>(
        &mut self,
        timeout: Duration,
        token: &CancellationToken,
        mut predicate: impl FnMut(SyncLines) -> Option<T>,
    ) -> Result<T, WaitError> {
        let bus = &mut self.bus;
        wait_until(&self.clock, timeout, token, || Ok(predicate(bus.sample_sync()?)))
            .map(|(value, _)| value)
    }

    /// Vsync high then low marks the start of a new frame.
    fn await_frame_start(
        &mut self,
        timeout: Duration,
        token: &CancellationToken,
    ) -> Result<(), AcquisitionError> {
        let on_timeout = || AcquisitionError::FrameSyncTimeout;
        self.wait_sync(timeout, token, |s| s.vsync.is_high().then_some(()))
            .map_err(|e| AcquisitionError::from_wait(e, on_timeout()))?;
        self.wait_sync(timeout, token, |s| s.vsync.is_low().then_some(()))
            .map_err(|e| AcquisitionError::from_wait(e, on_timeout()))
    }

    /// Wait for href to rise. Returns false if vsync rose first, meaning the
    /// sensor moved on to the next frame.
    fn await_row_start(
        &mut self,
        row: u16,
        timeout: Duration,
        token: &CancellationToken,
    ) -> Result<bool, AcquisitionError> {
        self.wait_sync(timeout, token, |s| {
            if s.href.is_high() {
                Some(true)
            } else if s.vsync.is_high() {
                Some(false)
            } else {
                None
            }
        })
        .map_err(|e| AcquisitionError::from_wait(e, AcquisitionError::RowSyncTimeout { row }))
    }

    /// Sample one byte on the rising pixel clock. Returns false if href fell
    /// before another pixel clock arrived.
    fn sample_byte(
        &mut self,
        session: &mut CaptureSession,
        timeout: Duration,
        token: &CancellationToken,
    ) -> Result<bool, AcquisitionError> {
        let on_timeout = AcquisitionError::PixelClockTimeout {
            row: session.row,
            byte: session.column,
        };
        let clocked = self
            .wait_sync(timeout, token, |s| {
                if s.pclk.is_high() && s.href.is_high() {
                    Some(true)
                } else if s.href.is_low() {
                    Some(false)
                } else {
                    None
                }
            })
            .map_err(|e| AcquisitionError::from_wait(e, on_timeout.clone()))?;
        if !clocked {
            return Ok(false);
        }

        let byte = self.bus.sample_data()?;
        session.push(byte);

        self.wait_sync(timeout, token, |s| {
            (s.pclk.is_low() || s.href.is_low()).then_some(())
        })
        .map_err(|e| AcquisitionError::from_wait(e, on_timeout))?;
        Ok(true)
    }

    /// Wait for href to fall. Any pixel clock seen on the way means the
    /// sensor sent more bytes than the row holds.
    fn await_row_end(
        &mut self,
        session: &mut CaptureSession,
        timeout: Duration,
        token: &CancellationToken,
    ) -> Result<(), AcquisitionError> {
        let row = session.row;
        let mut extra_clock = false;
        self.wait_sync(timeout, token, |s| {
            if s.href.is_low() {
                Some(())
            } else {
                extra_clock |= s.pclk.is_high();
                None
            }
        })
        .map_err(|e| AcquisitionError::from_wait(e, AcquisitionError::RowSyncTimeout { row }))?;
        if extra_clock {
            session.row_overran = true;
        }
        Ok(())
    }

    /// Capture one frame. Every wait is bounded by `timeout` and checks
    /// `token`. A frame that could not be fully sampled comes back tagged
    /// partial, never as complete.
    #[instrument(skip_all, fields(geometry = %geometry))]
    pub fn capture_frame(
        &mut self,
        geometry: FrameGeometry,
        timeout: Duration,
        token: &CancellationToken,
    ) -> Result<FrameBuffer, AcquisitionError> {
        let mut session = CaptureSession::new(geometry);
        let mut state = CaptureState::AwaitingFrameStart;

        while state != CaptureState::Done {
            state = match state {
                CaptureState::AwaitingFrameStart => {
                    self.await_frame_start(timeout, token)?;
                    trace!("Frame start.");
                    CaptureState::AwaitingRowStart
                }
                CaptureState::AwaitingRowStart => {
                    if self.await_row_start(session.row, timeout, token)? {
                        CaptureState::SamplingByte
                    } else {
                        warn!(
                            "Frame ended after {} of {} rows.",
                            session.row,
                            geometry.height()
                        );
                        session.end_frame_early();
                        CaptureState::Done
                    }
                }
                CaptureState::SamplingByte => {
                    if !self.sample_byte(&mut session, timeout, token)? {
                        debug!(
                            "Row {} ended after {} of {} bytes.",
                            session.row,
                            session.column,
                            geometry.row_bytes()
                        );
                        session.end_row();
                        if session.rows_done() {
                            CaptureState::Done
                        } else {
                            CaptureState::AwaitingRowStart
                        }
                    } else if session.row_full() {
                        CaptureState::AwaitingRowEnd
                    } else {
                        CaptureState::SamplingByte
                    }
                }
                CaptureState::AwaitingRowEnd => {
                    self.await_row_end(&mut session, timeout, token)?;
                    session.end_row();
                    if session.rows_done() {
                        CaptureState::Done
                    } else {
                        CaptureState::AwaitingRowStart
                    }
                }
                CaptureState::Done => CaptureState::Done,
            };
        }

        let frame = session.into_frame();
        if frame.is_complete() {
            debug!("Captured {}.", frame);
        } else {
            warn!(
                "Captured {} with {:?}. Reason: partial-frame",
                frame,
                frame.completeness()
            );
        }
        Ok(frame)
    }
}

impl<B: ParallelBus, C: Clock> FrameSource for FrameAcquirer<B, C> {
    fn capture_frame(
        &mut self,
        geometry: FrameGeometry,
        timeout: Duration,
        token: &CancellationToken,
    ) -> Result<FrameBuffer, AcquisitionError> {
        FrameAcquirer::capture_frame(self, geometry, timeout, token)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::{
        clock::testing::ManualClock,
        externals::simulation::camera::{test_pattern, FrameScript},
    };

    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(5);

    fn geometry_4x2() -> FrameGeometry {
        FrameGeometry::new(4, 2, 2).expect("Failed to get geometry.")
    }

    fn capture(script: FrameScript, geometry: FrameGeometry) -> Result<FrameBuffer, AcquisitionError> {
        let clock = Arc::new(ManualClock::new(Duration::from_micros(1)));
        let mut acquirer = FrameAcquirer::new(script.into_bus(), clock);
        acquirer.capture_frame(geometry, TIMEOUT, &CancellationToken::new())
    }

    #[test]
    fn test_captures_known_pattern_in_row_major_order() {
        let geometry = geometry_4x2();
        let pattern: Vec<u8> = (0x10..0x20).collect();
        let frame = capture(FrameScript::frame(geometry, &pattern), geometry)
            .expect("Failed to capture.");

        assert!(frame.is_complete());
        assert_eq!(frame.data(), &pattern[..]);
        assert_eq!(frame.row(0), Some(&pattern[0..8]));
        assert_eq!(frame.row(1), Some(&pattern[8..16]));
    }

    #[test]
    fn test_capture_aligns_to_next_frame_start() {
        let geometry = geometry_4x2();
        let pattern: Vec<u8> = (0..16).collect();
        // Tail of a previous frame before the vsync pulse.
        let script = FrameScript::new()
            .row(&[0xEE; 8])
            .frame_start()
            .row(&pattern[0..8])
            .row(&pattern[8..16])
            .frame_end();
        let frame = capture(script, geometry).expect("Failed to capture.");
        assert!(frame.is_complete());
        assert_eq!(frame.data(), &pattern[..]);
    }

    #[test]
    fn test_row_cut_short_is_partial() {
        let geometry = geometry_4x2();
        let script = FrameScript::new()
            .frame_start()
            .row(&[1, 2, 3, 4, 5, 6, 7, 8])
            .row(&[9, 10, 11, 12, 13])
            .frame_end();
        let frame = capture(script, geometry).expect("Failed to capture.");

        assert_eq!(frame.data().len(), geometry.frame_bytes());
        assert_eq!(
            frame.completeness(),
            Completeness::Partial {
                short_rows: 1,
                overrun_rows: 0,
                missing_rows: 0
            }
        );
        assert_eq!(
            frame.data(),
            &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 0, 0, 0]
        );
    }

    #[test]
    fn test_extra_bytes_are_dropped_and_partial() {
        let geometry = geometry_4x2();
        let script = FrameScript::new()
            .frame_start()
            .row(&[1, 2, 3, 4, 5, 6, 7, 8, 99, 99, 99])
            .row(&[9, 10, 11, 12, 13, 14, 15, 16])
            .frame_end();
        let frame = capture(script, geometry).expect("Failed to capture.");

        assert_eq!(frame.data().len(), geometry.frame_bytes());
        assert_eq!(
            frame.completeness(),
            Completeness::Partial {
                short_rows: 0,
                overrun_rows: 1,
                missing_rows: 0
            }
        );
        assert_eq!(frame.data(), &(1..=16).collect::<Vec<u8>>()[..]);
    }

    #[test]
    fn test_frame_ending_early_is_partial() {
        let geometry = geometry_4x2();
        let script = FrameScript::new()
            .frame_start()
            .row(&[1, 2, 3, 4, 5, 6, 7, 8])
            .frame_end();
        let frame = capture(script, geometry).expect("Failed to capture.");

        assert_eq!(
            frame.completeness(),
            Completeness::Partial {
                short_rows: 0,
                overrun_rows: 0,
                missing_rows: 1
            }
        );
        assert_eq!(frame.row(1), Some(&[0u8; 8][..]));
    }

    #[test]
    fn test_no_vsync_times_out() {
        let result = capture(FrameScript::new(), geometry_4x2());
        assert_eq!(result, Err(AcquisitionError::FrameSyncTimeout));
    }

    #[test]
    fn test_no_href_times_out() {
        let result = capture(FrameScript::new().frame_start(), geometry_4x2());
        assert_eq!(result, Err(AcquisitionError::RowSyncTimeout { row: 0 }));
    }

    #[test]
    fn test_href_stuck_high_times_out_at_row_end() {
        let geometry = geometry_4x2();
        let script = FrameScript::new()
            .frame_start()
            .row_start()
            .byte(1)
            .byte(2)
            .byte(3)
            .byte(4)
            .byte(5)
            .byte(6)
            .byte(7)
            .byte(8);
        let result = capture(script, geometry);
        assert_eq!(result, Err(AcquisitionError::RowSyncTimeout { row: 0 }));
    }

    #[test]
    fn test_no_pixel_clock_times_out() {
        let script = FrameScript::new().frame_start().row_start().byte(1).byte(2);
        let result = capture(script, geometry_4x2());
        assert_eq!(
            result,
            Err(AcquisitionError::PixelClockTimeout { row: 0, byte: 2 })
        );
    }

    #[test]
    fn test_cancelled_capture() {
        let geometry = geometry_4x2();
        let clock = Arc::new(ManualClock::new(Duration::from_micros(1)));
        let mut acquirer = FrameAcquirer::new(
            FrameScript::frame(geometry, &[0u8; 16]).into_bus(),
            clock,
        );
        let token = CancellationToken::new();
        token.cancel();
        let result = acquirer.capture_frame(geometry, TIMEOUT, &token);
        assert_eq!(result, Err(AcquisitionError::Cancelled));
    }

    #[test]
    fn test_full_size_synthetic_frame() {
        let geometry = FrameGeometry::new(320, 240, 2).expect("Failed to get geometry.");
        let pattern = test_pattern(geometry);
        let frame = capture(FrameScript::frame(geometry, &pattern), geometry)
            .expect("Failed to capture.");
        assert!(frame.is_complete());
        assert_eq!(frame.data().len(), 153_600);
        assert_eq!(frame.data(), &pattern[..]);
    }
}
