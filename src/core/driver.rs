//! Capability traits composed by tracker implementations
//!
//! - [`ReportSource`]: anything that produces reports (serial device, synthetic, playback)
//! - [`FrameDriver`]: device-specific byte-pattern recognition for the framing engine
//! - [`TransformSource`] / [`TransformSink`]: read and write the transform/workspace state

use super::state::TrackerStatus;
use super::types::{Report, SensorIndex, Tracker2RoomReport, Unit2SensorReport, WorkspaceReport};
use crate::error::Result;

/// Produces report events, one increment of work per call
pub trait ReportSource {
    /// Next available report, `Ok(None)` when there is nothing yet. Never blocks.
    fn poll_report(&mut self, now_us: u64) -> Result<Option<Report>>;

    /// Current status of the source
    fn status(&self) -> TrackerStatus;

    /// Requested report rate from a client (ignored by sources with a fixed rate)
    fn set_update_rate(&mut self, hz: f64) {
        log::debug!("Update rate request ({} Hz) ignored by this source", hz);
    }

    /// Leave a terminal `Fail` state
    fn restart(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<S: ReportSource + ?Sized> ReportSource for Box<S> {
    fn poll_report(&mut self, now_us: u64) -> Result<Option<Report>> {
        (**self).poll_report(now_us)
    }

    fn status(&self) -> TrackerStatus {
        (**self).status()
    }

    fn set_update_rate(&mut self, hz: f64) {
        (**self).set_update_rate(hz)
    }

    fn restart(&mut self) -> Result<()> {
        (**self).restart()
    }
}

/// Result of one attempt to complete a recognised frame
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// Frame header is valid but the rest has not arrived
    NeedMoreBytes,
    /// A full frame: the decoded report and the number of bytes it occupied
    Complete(Report, usize),
    /// The recognised frame cannot be a valid frame
    Invalid(String),
}

/// Device-specific frame recognition hooks
///
/// The framing engine owns buffering, timing and the status machine; a driver
/// only answers "where does a frame start" and "is this frame complete".
/// Returning `Err` from any hook is a non-recoverable device condition and
/// moves the engine to `Fail`.
pub trait FrameDriver {
    /// Scan for a frame header, returning its offset in `buffer`
    fn try_sync(&mut self, buffer: &[u8]) -> Result<Option<usize>>;

    /// Try to complete the frame starting at `buffer[0]`
    fn try_parse(&mut self, buffer: &[u8]) -> Result<ParseOutcome>;

    /// Called when the engine enters `Resetting`. Bytes appended to `commands`
    /// are written back to the device.
    fn reset(&mut self, commands: &mut Vec<u8>) -> Result<()>;

    /// Bytes needed to recognise a header. After a failed sync the engine keeps
    /// the last `sync_window() - 1` bytes, which may hold a split header.
    fn sync_window(&self) -> usize {
        1
    }
}

/// Read access to transform and workspace state
pub trait TransformSource {
    fn tracker2room(&self) -> Tracker2RoomReport;
    fn unit2sensor(&self, sensor: SensorIndex) -> Unit2SensorReport;
    fn workspace(&self) -> WorkspaceReport;
}

/// Write access to transform and workspace state
pub trait TransformSink {
    fn store_tracker2room(&mut self, report: Tracker2RoomReport);
    fn store_unit2sensor(&mut self, report: Unit2SensorReport);
    fn store_workspace(&mut self, report: WorkspaceReport);
}
