//! Serial framing engine
//!
//! Turns an unbounded byte stream into complete reports. The engine owns the
//! accumulation buffer, the partial-frame deadline and the status machine; a
//! [`FrameDriver`] supplies only header recognition and frame completion.
//!
//! ```text
//!            try_sync = Some          try_parse = Complete
//! Syncing ───────────────▶ Partial ───────────────────────▶ (report queued) ─▶ Syncing
//!    ▲                        │
//!    │    Invalid / deadline  │
//!    └──── Resetting ◀────────┘   (also on BufferOverrun)
//!
//! hook Err ──▶ Fail (terminal until restart)
//! ```
//!
//! While completed reports are waiting in the ready queue the engine reports
//! `ReportReady`; taking the last one falls back to the underlying phase.

use super::ring_buffer::RingBuffer;
use crate::core::{FrameDriver, ParseOutcome, Report, TrackerStatus};
use crate::error::{Error, Result};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Engine tuning, device-specific
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FramingConfig {
    /// Accumulation buffer capacity in bytes
    pub capacity: usize,
    /// Maximum time a recognised frame may stay incomplete
    pub partial_timeout: Duration,
    /// Completed reports kept before the oldest is dropped
    pub ready_capacity: usize,
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            partial_timeout: Duration::from_millis(250),
            ready_capacity: 32,
        }
    }
}

/// Counters for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FramingStats {
    pub frames: u64,
    pub resets: u64,
    pub overruns: u64,
    pub invalid: u64,
    pub timeouts: u64,
    pub dropped: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Syncing,
    Partial { since: Instant },
    Resetting,
    Fail,
}

pub struct FramingEngine<D: FrameDriver> {
    driver: D,
    config: FramingConfig,
    buffer: RingBuffer,
    phase: Phase,
    ready: VecDeque<Report>,
    outgoing: Vec<u8>,
    failure: Option<String>,
    stats: FramingStats,
}

impl<D: FrameDriver> FramingEngine<D> {
    pub fn new(driver: D, config: FramingConfig) -> Self {
        Self {
            driver,
            buffer: RingBuffer::new(config.capacity),
            ready: VecDeque::with_capacity(config.ready_capacity.max(1)),
            config,
            phase: Phase::Syncing,
            outgoing: Vec::new(),
            failure: None,
            stats: FramingStats::default(),
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn config(&self) -> &FramingConfig {
        &self.config
    }

    pub fn stats(&self) -> FramingStats {
        self.stats
    }

    /// Bytes currently held in the accumulation buffer
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn status(&self) -> TrackerStatus {
        match self.phase {
            Phase::Fail => TrackerStatus::Fail,
            Phase::Resetting => TrackerStatus::Resetting,
            _ if !self.ready.is_empty() => TrackerStatus::ReportReady,
            Phase::Partial { .. } => TrackerStatus::Partial,
            Phase::Syncing => TrackerStatus::Syncing,
        }
    }

    /// Feed newly received bytes, timestamped now
    pub fn feed(&mut self, bytes: &[u8]) -> Result<usize> {
        self.feed_at(bytes, Instant::now())
    }

    /// Feed newly received bytes that arrived at `now`
    ///
    /// Returns the number of reports completed by this call. `BufferOverrun`
    /// and `InvalidFrame` errors are already recovered from (the engine is
    /// `Resetting` and the rest of `bytes` was discarded along with the
    /// buffer); `HardwareFail` means the engine is in `Fail`.
    pub fn feed_at(&mut self, bytes: &[u8], now: Instant) -> Result<usize> {
        self.service(now)?;
        if self.phase == Phase::Resetting {
            self.finish_reset();
        }

        let frames_before = self.stats.frames;
        let mut rest = bytes;
        while !rest.is_empty() {
            let accepted = self.buffer.extend(rest);
            rest = &rest[accepted..];
            self.step(now)?;

            if self.phase == Phase::Resetting {
                break;
            }
            if !rest.is_empty() && self.buffer.remaining() == 0 {
                self.stats.overruns += 1;
                log::warn!(
                    "Framing buffer overrun ({} bytes), resetting",
                    self.buffer.capacity()
                );
                self.enter_reset()?;
                return Err(Error::BufferOverrun {
                    capacity: self.buffer.capacity(),
                });
            }
        }
        Ok((self.stats.frames - frames_before) as usize)
    }

    /// Advance time-driven transitions without new bytes
    ///
    /// An expired partial frame forces `Resetting`; a pending reset completes
    /// on the following call.
    pub fn service(&mut self, now: Instant) -> Result<()> {
        match self.phase {
            Phase::Fail => Err(self.hardware_fail()),
            Phase::Resetting => {
                self.finish_reset();
                Ok(())
            }
            Phase::Partial { since } if self.expired(since, now) => self.timeout(),
            _ => Ok(()),
        }
    }

    /// Take the oldest completed report
    pub fn take_report(&mut self) -> Option<Report> {
        self.ready.pop_front()
    }

    /// Bytes the driver asked to send to the device
    pub fn take_outgoing(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.outgoing)
    }

    /// Leave `Fail` (or any state) and start over from `Syncing`
    pub fn restart(&mut self) -> Result<()> {
        log::info!("Restarting framing engine (was {:?})", self.status());
        self.buffer.clear();
        self.ready.clear();
        self.failure = None;
        self.phase = Phase::Syncing;
        if let Err(e) = self.driver.reset(&mut self.outgoing) {
            return Err(self.fail(e));
        }
        Ok(())
    }

    // ========================================================================
    // State machine
    // ========================================================================

    fn step(&mut self, now: Instant) -> Result<()> {
        loop {
            match self.phase {
                Phase::Fail => return Err(self.hardware_fail()),
                Phase::Resetting => return Ok(()),
                Phase::Syncing => {
                    if self.buffer.is_empty() {
                        return Ok(());
                    }
                    let found = self.driver.try_sync(self.buffer.make_contiguous());
                    match found {
                        Err(e) => return Err(self.fail(e)),
                        Ok(Some(offset)) => {
                            self.buffer.advance(offset);
                            log::trace!("Frame header at offset {}", offset);
                            self.phase = Phase::Partial { since: now };
                        }
                        Ok(None) => {
                            // Keep bytes that may hold the start of a split header
                            self.buffer
                                .keep_last(self.driver.sync_window().saturating_sub(1));
                            return Ok(());
                        }
                    }
                }
                Phase::Partial { since } => {
                    if self.expired(since, now) {
                        return self.timeout();
                    }
                    let outcome = self.driver.try_parse(self.buffer.make_contiguous());
                    match outcome {
                        Err(e) => return Err(self.fail(e)),
                        Ok(ParseOutcome::NeedMoreBytes) => return Ok(()),
                        Ok(ParseOutcome::Complete(report, consumed))
                            if consumed > 0 && consumed <= self.buffer.len() =>
                        {
                            self.buffer.advance(consumed);
                            self.push_ready(report);
                            self.phase = Phase::Syncing;
                        }
                        Ok(ParseOutcome::Complete(_, consumed)) => {
                            return self.invalid(format!(
                                "driver consumed {} of {} buffered bytes",
                                consumed,
                                self.buffer.len()
                            ));
                        }
                        Ok(ParseOutcome::Invalid(reason)) => return self.invalid(reason),
                    }
                }
            }
        }
    }

    fn expired(&self, since: Instant, now: Instant) -> bool {
        now.saturating_duration_since(since) >= self.config.partial_timeout
    }

    fn push_ready(&mut self, report: Report) {
        if self.ready.len() >= self.config.ready_capacity.max(1) {
            self.stats.dropped += 1;
            if let Some(dropped) = self.ready.pop_front() {
                log::warn!("Ready queue full, dropping {} report", dropped.kind());
            }
        }
        log::trace!("Frame complete: {}", report.kind());
        self.stats.frames += 1;
        self.ready.push_back(report);
    }

    fn timeout(&mut self) -> Result<()> {
        self.stats.timeouts += 1;
        log::warn!(
            "Partial frame not completed within {:?}, resetting",
            self.config.partial_timeout
        );
        self.enter_reset()
    }

    fn invalid(&mut self, reason: String) -> Result<()> {
        self.stats.invalid += 1;
        log::warn!("Invalid frame ({}), resetting", reason);
        self.enter_reset()?;
        Err(Error::InvalidFrame(reason))
    }

    /// Discard buffered bytes and let the driver re-initialise the device
    fn enter_reset(&mut self) -> Result<()> {
        self.buffer.clear();
        self.stats.resets += 1;
        self.phase = Phase::Resetting;
        log::debug!("Framing engine -> Resetting");
        if let Err(e) = self.driver.reset(&mut self.outgoing) {
            return Err(self.fail(e));
        }
        Ok(())
    }

    fn finish_reset(&mut self) {
        self.buffer.clear();
        self.phase = Phase::Syncing;
        log::debug!("Framing engine -> Syncing");
    }

    fn fail(&mut self, cause: Error) -> Error {
        let message = cause.to_string();
        log::error!("Framing engine failed: {}", message);
        self.phase = Phase::Fail;
        self.failure = Some(message);
        self.hardware_fail()
    }

    fn hardware_fail(&self) -> Error {
        Error::HardwareFail(
            self.failure
                .clone()
                .unwrap_or_else(|| "device failed".to_string()),
        )
    }
}
