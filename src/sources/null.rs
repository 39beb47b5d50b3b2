//! Synthetic tracker that reports identity poses at a fixed rate

use crate::core::{PoseReport, Report, ReportSource, SensorIndex, TrackerStatus};
use crate::error::Result;
use std::collections::VecDeque;

/// Emits an identity pose for every sensor once per update period
pub struct NullSource {
    sensors: usize,
    interval_us: Option<u64>,
    next_due_us: Option<u64>,
    queue: VecDeque<Report>,
}

impl NullSource {
    /// `update_rate_hz <= 0` produces no reports until a rate is set
    pub fn new(sensors: usize, update_rate_hz: f64) -> Self {
        Self {
            sensors: sensors.max(1),
            interval_us: interval_for(update_rate_hz),
            next_due_us: None,
            queue: VecDeque::new(),
        }
    }

    pub fn sensors(&self) -> usize {
        self.sensors
    }

    /// Update period in microseconds, `None` when disabled
    pub fn interval_us(&self) -> Option<u64> {
        self.interval_us
    }
}

fn interval_for(hz: f64) -> Option<u64> {
    if hz.is_finite() && hz > 0.0 {
        Some(((1_000_000.0 / hz) as u64).max(1))
    } else {
        None
    }
}

impl ReportSource for NullSource {
    fn poll_report(&mut self, now_us: u64) -> Result<Option<Report>> {
        if let Some(report) = self.queue.pop_front() {
            return Ok(Some(report));
        }
        let Some(interval) = self.interval_us else {
            return Ok(None);
        };

        if self.next_due_us.is_none_or(|due| now_us >= due) {
            for sensor in SensorIndex::first(self.sensors) {
                self.queue
                    .push_back(Report::Pose(PoseReport::identity(sensor, now_us)));
            }
            self.next_due_us = Some(now_us.saturating_add(interval));
        }
        Ok(self.queue.pop_front())
    }

    fn status(&self) -> TrackerStatus {
        if self.queue.is_empty() {
            TrackerStatus::Syncing
        } else {
            TrackerStatus::ReportReady
        }
    }

    fn set_update_rate(&mut self, hz: f64) {
        log::info!("Null tracker update rate set to {} Hz", hz);
        self.interval_us = interval_for(hz);
        self.next_due_us = None;
    }
}
