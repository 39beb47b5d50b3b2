//! Serial-attached tracker: byte transport + framing engine

use crate::core::{FrameDriver, Report, ReportSource, TrackerStatus};
use crate::error::{Error, Result};
use crate::framing::{FramingConfig, FramingEngine, FramingStats};
use crate::transport::ByteTransport;
use std::time::Instant;

/// Bytes read from the transport per poll
const READ_CHUNK: usize = 256;

/// Reads device bytes, frames them with `D`, and yields completed reports
pub struct SerialSource<D: FrameDriver, T: ByteTransport> {
    engine: FramingEngine<D>,
    transport: T,
    read_buf: [u8; READ_CHUNK],
    transport_error: Option<String>,
}

impl<D: FrameDriver, T: ByteTransport> SerialSource<D, T> {
    pub fn new(driver: D, transport: T, config: FramingConfig) -> Self {
        Self {
            engine: FramingEngine::new(driver, config),
            transport,
            read_buf: [0u8; READ_CHUNK],
            transport_error: None,
        }
    }

    pub fn engine(&self) -> &FramingEngine<D> {
        &self.engine
    }

    pub fn stats(&self) -> FramingStats {
        self.engine.stats()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Write any reset commands the driver queued
    fn send_outgoing(&mut self) -> Result<()> {
        let commands = self.engine.take_outgoing();
        if !commands.is_empty() {
            log::debug!("Sending {} reset bytes to device", commands.len());
            if let Err(e) = self.transport.write_all(&commands) {
                return Err(self.device_lost("write", e));
            }
        }
        Ok(())
    }

    fn clear_input(&mut self) -> Result<()> {
        match self.transport.clear_input() {
            Ok(()) => Ok(()),
            Err(e) => Err(self.device_lost("input flush", e)),
        }
    }

    /// Transport I/O failed: the source stays in `Fail` until restarted
    fn device_lost(&mut self, operation: &str, cause: Error) -> Error {
        log::error!("Serial {} failed: {}", operation, cause);
        let message = format!("serial {} failed: {}", operation, cause);
        self.transport_error = Some(message.clone());
        Error::HardwareFail(message)
    }

    fn read_and_feed(&mut self) -> Result<()> {
        let n = match self.transport.read(&mut self.read_buf) {
            Ok(n) => n,
            Err(e) => return Err(self.device_lost("read", e)),
        };

        if n == 0 {
            return self.engine.service(Instant::now());
        }

        match self.engine.feed(&self.read_buf[..n]) {
            Ok(_) => Ok(()),
            Err(e @ (Error::BufferOverrun { .. } | Error::InvalidFrame(_))) => {
                // Engine already reset; drop bytes sent before the device saw the reset
                log::debug!("Framing recovered from: {}", e);
                self.clear_input()
            }
            Err(e) => Err(e),
        }
    }
}

impl<D: FrameDriver, T: ByteTransport> ReportSource for SerialSource<D, T> {
    fn poll_report(&mut self, _now_us: u64) -> Result<Option<Report>> {
        if let Some(message) = &self.transport_error {
            return Err(Error::HardwareFail(message.clone()));
        }
        if let Some(report) = self.engine.take_report() {
            return Ok(Some(report));
        }

        let fed = self.read_and_feed();
        self.send_outgoing()?;
        fed?;
        Ok(self.engine.take_report())
    }

    fn status(&self) -> TrackerStatus {
        if self.transport_error.is_some() {
            TrackerStatus::Fail
        } else {
            self.engine.status()
        }
    }

    fn restart(&mut self) -> Result<()> {
        self.transport_error = None;
        self.clear_input()?;
        self.engine.restart()?;
        self.send_outgoing()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{PoseReport, SensorIndex};
    use crate::framing::{TaggedFrameDriver, encode_frame};
    use crate::transport::MockTransport;

    fn pose(sensor: usize, ts: u64) -> Report {
        Report::Pose(PoseReport {
            timestamp_us: ts,
            sensor: SensorIndex::new(sensor).unwrap(),
            position: [1.0, 2.0, 3.0],
            orientation: [0.0, 0.0, 0.0, 1.0],
        })
    }

    fn source(handle: &MockTransport) -> SerialSource<TaggedFrameDriver, MockTransport> {
        let driver = TaggedFrameDriver::new().with_reset_command(b"R");
        SerialSource::new(driver, handle.clone(), FramingConfig::default())
    }

    fn poll_all(source: &mut SerialSource<TaggedFrameDriver, MockTransport>) -> Vec<Report> {
        let mut reports = Vec::new();
        for _ in 0..100 {
            if let Some(report) = source.poll_report(0).unwrap() {
                reports.push(report);
            }
        }
        reports
    }

    #[test]
    fn test_reports_from_trickled_bytes() {
        let handle = MockTransport::new();
        let mut source = source(&handle);
        handle.set_max_read(7);
        handle.inject_read(&[0x00, 0x01]);
        handle.inject_read(&encode_frame(&pose(0, 1)));
        handle.inject_read(&encode_frame(&pose(1, 2)));

        assert_eq!(poll_all(&mut source), vec![pose(0, 1), pose(1, 2)]);
        assert_eq!(source.stats().frames, 2);
        assert!(handle.get_written().is_empty());
    }

    #[test]
    fn test_invalid_frame_sends_reset_command() {
        let handle = MockTransport::new();
        let mut source = source(&handle);
        let mut bad = encode_frame(&pose(0, 1));
        bad[8] ^= 0x40;
        handle.inject_read(&bad);

        assert!(source.poll_report(0).unwrap().is_none());
        assert_eq!(source.status(), TrackerStatus::Resetting);
        assert_eq!(handle.get_written(), b"R");

        handle.inject_read(&encode_frame(&pose(0, 2)));
        assert_eq!(poll_all(&mut source), vec![pose(0, 2)]);
    }

    #[test]
    fn test_read_failure_is_terminal_until_restart() {
        let handle = MockTransport::new();
        let mut source = source(&handle);
        handle.set_fail_reads(true);

        assert!(matches!(source.poll_report(0), Err(Error::HardwareFail(_))));
        assert_eq!(source.status(), TrackerStatus::Fail);
        handle.set_fail_reads(false);
        assert!(matches!(source.poll_report(0), Err(Error::HardwareFail(_))));

        source.restart().unwrap();
        assert_eq!(source.status(), TrackerStatus::Syncing);
        assert_eq!(handle.get_written(), b"R");
        handle.inject_read(&encode_frame(&pose(3, 9)));
        assert_eq!(poll_all(&mut source), vec![pose(3, 9)]);
    }

    #[test]
    fn test_write_failure_is_terminal_until_restart() {
        let handle = MockTransport::new();
        let mut source = source(&handle);
        handle.set_fail_writes(true);

        // A bad checksum makes the engine queue the reset command
        let mut bad = encode_frame(&pose(0, 1));
        bad[8] ^= 0x40;
        handle.inject_read(&bad);

        assert!(matches!(source.poll_report(0), Err(Error::HardwareFail(_))));
        assert_eq!(source.status(), TrackerStatus::Fail);
        assert!(matches!(source.poll_report(0), Err(Error::HardwareFail(_))));

        handle.set_fail_writes(false);
        source.restart().unwrap();
        assert_eq!(source.status(), TrackerStatus::Syncing);
        assert_eq!(handle.get_written(), b"R");
        handle.inject_read(&encode_frame(&pose(1, 3)));
        assert_eq!(poll_all(&mut source), vec![pose(1, 3)]);
    }
}
