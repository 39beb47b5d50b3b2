//! Playback of pre-recorded pose records
//!
//! Records come from a [`PlaybackSource`]; the on-disk format belongs to the
//! playback implementation. Records are replayed at the pace of their own
//! timestamps and the recording loops when it runs out.

use crate::core::{PoseReport, Report, ReportSource, TrackerStatus};
use crate::error::Result;

/// Supplier of recorded pose records, in recording order
pub trait PlaybackSource {
    /// Next record, `Ok(None)` at the end of the recording
    fn next_record(&mut self) -> Result<Option<PoseReport>>;

    /// Go back to the first record
    fn rewind(&mut self) -> Result<()>;
}

/// In-memory recording
#[derive(Debug, Clone, Default)]
pub struct VecPlayback {
    records: Vec<PoseReport>,
    position: usize,
}

impl VecPlayback {
    pub fn new(records: Vec<PoseReport>) -> Self {
        Self {
            records,
            position: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl PlaybackSource for VecPlayback {
    fn next_record(&mut self) -> Result<Option<PoseReport>> {
        let record = self.records.get(self.position).copied();
        if record.is_some() {
            self.position += 1;
        }
        Ok(record)
    }

    fn rewind(&mut self) -> Result<()> {
        self.position = 0;
        Ok(())
    }
}

/// Time base mapping recording time onto wall time
#[derive(Debug, Clone, Copy)]
struct Anchor {
    record_us: u64,
    wall_us: u64,
}

/// Replays recorded poses, restamped onto the live clock
pub struct CannedSource<P: PlaybackSource> {
    playback: P,
    next: Option<PoseReport>,
    anchor: Option<Anchor>,
    loops: u64,
}

impl<P: PlaybackSource> CannedSource<P> {
    pub fn new(playback: P) -> Self {
        Self {
            playback,
            next: None,
            anchor: None,
            loops: 0,
        }
    }

    /// Completed passes through the recording
    pub fn loops(&self) -> u64 {
        self.loops
    }

    fn fetch(&mut self) -> Result<Option<PoseReport>> {
        if let Some(record) = self.playback.next_record()? {
            return Ok(Some(record));
        }
        self.playback.rewind()?;
        let first = self.playback.next_record()?;
        if first.is_some() {
            self.loops += 1;
            self.anchor = None;
            log::debug!("Canned playback looped ({} passes)", self.loops);
        }
        Ok(first)
    }
}

impl<P: PlaybackSource> ReportSource for CannedSource<P> {
    fn poll_report(&mut self, now_us: u64) -> Result<Option<Report>> {
        if self.next.is_none() {
            self.next = self.fetch()?;
        }
        let Some(record) = self.next else {
            return Ok(None);
        };

        let anchor = *self.anchor.get_or_insert(Anchor {
            record_us: record.timestamp_us,
            wall_us: now_us,
        });
        let due_us = anchor
            .wall_us
            .saturating_add(record.timestamp_us.saturating_sub(anchor.record_us));
        if now_us < due_us {
            return Ok(None);
        }

        self.next = None;
        Ok(Some(Report::Pose(PoseReport {
            timestamp_us: due_us,
            ..record
        })))
    }

    fn status(&self) -> TrackerStatus {
        TrackerStatus::Syncing
    }
}
