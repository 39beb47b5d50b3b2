//! Server-side tracker
//!
//! Owns the authoritative [`DeviceState`], a [`ReportSource`] and the client
//! connection. Each [`TrackerServer::mainloop`] call answers client requests,
//! pulls new reports from the source and sends everything pending.

use crate::connection::{Connection, SenderId};
use crate::core::{
    DeviceState, Report, ReportSource, SensorIndex, Tracker2RoomReport, TrackerStatus,
    TransformSource, Unit2SensorReport, WorkspaceReport,
};
use crate::error::Result;
use crate::protocol::messages::decode_update_rate;
use crate::protocol::{MAX_ENCODED_LEN, MessageIds, Request, delivery_class, encode};

/// Upper bound on reports pulled from the source per mainloop pass
const MAX_REPORTS_PER_PASS: usize = 256;

pub struct TrackerServer<S: ReportSource, N: Connection> {
    name: String,
    source: S,
    connection: N,
    state: DeviceState,
    ids: MessageIds,
    sender: SenderId,
    encode_buf: [u8; MAX_ENCODED_LEN],
    reports_sent: u64,
}

impl<S: ReportSource, N: Connection> TrackerServer<S, N> {
    /// Register the tracker's message types and sender name on `connection`
    pub fn new(name: &str, num_sensors: usize, source: S, mut connection: N) -> Result<Self> {
        let ids = MessageIds::register(&mut connection)?;
        let sender = connection.register_sender(name)?;
        log::info!("Tracker server '{}' ready ({} sensors)", name, num_sensors);
        Ok(Self {
            name: name.to_string(),
            source,
            connection,
            state: DeviceState::new(num_sensors),
            ids,
            sender,
            encode_buf: [0u8; MAX_ENCODED_LEN],
            reports_sent: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    /// Device code updates state through the `set_*` methods here
    pub fn state_mut(&mut self) -> &mut DeviceState {
        &mut self.state
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn connection(&self) -> &N {
        &self.connection
    }

    pub fn status(&self) -> TrackerStatus {
        self.state.status()
    }

    pub fn reports_sent(&self) -> u64 {
        self.reports_sent
    }

    pub fn get_local_t2r(&self) -> Tracker2RoomReport {
        self.state.tracker2room()
    }

    pub fn get_local_u2s(&self, sensor: SensorIndex) -> Unit2SensorReport {
        self.state.unit2sensor(sensor)
    }

    /// One increment of work. Returns the number of reports sent.
    ///
    /// A source in `Fail` surfaces as `Err(HardwareFail)`; the host decides
    /// whether to call [`TrackerServer::restart`].
    pub fn mainloop(&mut self, now_us: u64) -> Result<usize> {
        self.service_requests(now_us)?;

        for _ in 0..MAX_REPORTS_PER_PASS {
            match self.source.poll_report(now_us) {
                Ok(Some(report)) => {
                    self.state.set_status(TrackerStatus::ReportReady);
                    self.state.push(report);
                }
                Ok(None) => break,
                Err(e) => {
                    self.state.set_status(TrackerStatus::Fail);
                    return Err(e);
                }
            }
        }

        let sent = self.flush()?;
        self.state.set_status(self.source.status());
        Ok(sent)
    }

    /// Send every pending report
    ///
    /// A report leaves the queue only once the connection accepted it, so a
    /// failed send keeps it and everything after it for the next flush.
    pub fn flush(&mut self) -> Result<usize> {
        let mut sent = 0;
        while let Some(report) = self.state.peek_pending() {
            if let Err(e) = self.send_report(&report) {
                log::warn!(
                    "Send failed, {} reports kept for retry: {}",
                    self.state.pending_len(),
                    e
                );
                return Err(e);
            }
            self.state.pop_pending();
            sent += 1;
        }
        self.state.mark_consumed();
        Ok(sent)
    }

    /// Leave `Fail` by restarting the source
    pub fn restart(&mut self) -> Result<()> {
        log::info!("Restarting tracker '{}'", self.name);
        self.source.restart()?;
        self.state.set_status(self.source.status());
        Ok(())
    }

    /// Swap in a new client connection, keeping state and source
    pub fn replace_connection(&mut self, mut connection: N) -> Result<N> {
        self.ids = MessageIds::register(&mut connection)?;
        self.sender = connection.register_sender(&self.name)?;
        Ok(std::mem::replace(&mut self.connection, connection))
    }

    // ========================================================================
    // Requests
    // ========================================================================

    fn service_requests(&mut self, now_us: u64) -> Result<()> {
        while let Some(envelope) = self.connection.receive()? {
            match self.ids.request_of(envelope.message) {
                Some(Request::Tracker2Room) => {
                    log::debug!("Tracker2Room requested");
                    self.send_tracker2room(now_us)?;
                }
                Some(Request::Unit2Sensor) => {
                    log::debug!("Unit2Sensor requested");
                    self.send_unit2sensors(now_us)?;
                }
                Some(Request::Workspace) => {
                    log::debug!("Workspace requested");
                    self.send_workspace(now_us)?;
                }
                Some(Request::UpdateRate) => match decode_update_rate(&envelope.payload) {
                    Ok(hz) => self.source.set_update_rate(hz),
                    Err(e) => log::warn!("Dropping update rate request: {}", e),
                },
                None => log::debug!("Ignoring message {:?}", envelope.message),
            }
        }
        Ok(())
    }

    fn send_tracker2room(&mut self, now_us: u64) -> Result<()> {
        let report = Tracker2RoomReport {
            timestamp_us: now_us,
            ..self.state.tracker2room()
        };
        self.send_report(&Report::Tracker2Room(report))
    }

    fn send_unit2sensors(&mut self, now_us: u64) -> Result<()> {
        for sensor in SensorIndex::first(self.state.num_sensors()) {
            let report = Unit2SensorReport {
                timestamp_us: now_us,
                ..self.state.unit2sensor(sensor)
            };
            self.send_report(&Report::Unit2Sensor(report))?;
        }
        Ok(())
    }

    fn send_workspace(&mut self, now_us: u64) -> Result<()> {
        let report = WorkspaceReport {
            timestamp_us: now_us,
            ..self.state.workspace()
        };
        self.send_report(&Report::Workspace(report))
    }

    fn send_report(&mut self, report: &Report) -> Result<()> {
        let len = encode(report, &mut self.encode_buf)?;
        let kind = report.kind();
        self.connection.send(
            self.ids.for_kind(kind),
            self.sender,
            report.timestamp_us(),
            &self.encode_buf[..len],
            delivery_class(kind),
        )?;
        self.reports_sent += 1;
        log::trace!("Sent {}", report);
        Ok(())
    }
}
