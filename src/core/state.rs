//! Authoritative tracker state: latest reports, transforms, workspace and status.
//!
//! The server side updates it through the `set_*` methods, which also queue the
//! report for transmission. The client side mirrors incoming reports through
//! [`TransformSink`] and [`DeviceState::record`] without queueing anything.

use super::driver::{TransformSink, TransformSource};
use super::types::{
    AccelerationReport, MAX_SENSORS, PoseReport, Quat, Report, SensorIndex, Tracker2RoomReport,
    Unit2SensorReport, Vec3, VelocityReport, WorkspaceReport,
};
use std::collections::VecDeque;
use std::collections::vec_deque::Drain;

/// Reports queued beyond this are dropped oldest-first
const MAX_PENDING_REPORTS: usize = 1024;

/// Tracker status state machine
///
/// ```text
/// Syncing ──▶ Partial ──▶ ReportReady ──(consumed)──▶ Syncing
///    ▲
///    └──── Resetting ◀── (any state on framing error)
///                        Fail (terminal until restart)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackerStatus {
    /// No frame header recognised yet
    #[default]
    Syncing,
    /// Header recognised, frame incomplete
    Partial,
    /// A complete report is waiting to be consumed
    ReportReady,
    /// Discarding buffered bytes before resynchronising
    Resetting,
    /// Non-recoverable device condition
    Fail,
}

/// Current-state snapshot owned by one tracker instance
#[derive(Debug, Clone)]
pub struct DeviceState {
    num_sensors: usize,
    pose: Option<PoseReport>,
    velocity: Option<VelocityReport>,
    acceleration: Option<AccelerationReport>,
    tracker2room: Tracker2RoomReport,
    unit2sensor: [Unit2SensorReport; MAX_SENSORS],
    workspace: WorkspaceReport,
    status: TrackerStatus,
    pending: VecDeque<Report>,
}

impl DeviceState {
    /// Create state for a tracker with `num_sensors` sensors (clamped to `1..=MAX_SENSORS`)
    pub fn new(num_sensors: usize) -> Self {
        let mut state = Self {
            num_sensors: num_sensors.clamp(1, MAX_SENSORS),
            pose: None,
            velocity: None,
            acceleration: None,
            tracker2room: Tracker2RoomReport::identity(0),
            unit2sensor: [Unit2SensorReport::identity(SensorIndex::FIRST, 0); MAX_SENSORS],
            workspace: WorkspaceReport::empty(0),
            status: TrackerStatus::Syncing,
            pending: VecDeque::new(),
        };
        state.reset_transforms();
        state
    }

    /// Identity tracker2room, identity unit2sensor for every sensor, empty workspace
    pub fn reset_transforms(&mut self) {
        self.tracker2room = Tracker2RoomReport::identity(0);
        for (slot, sensor) in self
            .unit2sensor
            .iter_mut()
            .zip(SensorIndex::first(MAX_SENSORS))
        {
            *slot = Unit2SensorReport::identity(sensor, 0);
        }
        self.workspace = WorkspaceReport::empty(0);
    }

    pub fn num_sensors(&self) -> usize {
        self.num_sensors
    }

    pub fn status(&self) -> TrackerStatus {
        self.status
    }

    pub fn set_status(&mut self, status: TrackerStatus) {
        if self.status != status {
            log::trace!("Tracker status {:?} -> {:?}", self.status, status);
            self.status = status;
        }
    }

    /// The ready report has been read: `ReportReady` falls back to `Syncing`
    pub fn mark_consumed(&mut self) {
        if self.status == TrackerStatus::ReportReady {
            self.set_status(TrackerStatus::Syncing);
        }
    }

    pub fn pose(&self) -> Option<&PoseReport> {
        self.pose.as_ref()
    }

    pub fn velocity(&self) -> Option<&VelocityReport> {
        self.velocity.as_ref()
    }

    pub fn acceleration(&self) -> Option<&AccelerationReport> {
        self.acceleration.as_ref()
    }

    // ========================================================================
    // Server-side setters (update + queue for transmission)
    // ========================================================================

    pub fn set_pose(
        &mut self,
        sensor: SensorIndex,
        timestamp_us: u64,
        position: Vec3,
        orientation: Quat,
    ) {
        self.push(Report::Pose(PoseReport {
            timestamp_us,
            sensor,
            position,
            orientation,
        }));
    }

    pub fn set_velocity(
        &mut self,
        sensor: SensorIndex,
        timestamp_us: u64,
        velocity: Vec3,
        velocity_quat: Quat,
        velocity_quat_dt: f64,
    ) {
        self.push(Report::Velocity(VelocityReport {
            timestamp_us,
            sensor,
            velocity,
            velocity_quat,
            velocity_quat_dt,
        }));
    }

    pub fn set_acceleration(
        &mut self,
        sensor: SensorIndex,
        timestamp_us: u64,
        acceleration: Vec3,
        acceleration_quat: Quat,
        acceleration_quat_dt: f64,
    ) {
        self.push(Report::Acceleration(AccelerationReport {
            timestamp_us,
            sensor,
            acceleration,
            acceleration_quat,
            acceleration_quat_dt,
        }));
    }

    pub fn set_tracker2room(&mut self, timestamp_us: u64, position: Vec3, orientation: Quat) {
        self.push(Report::Tracker2Room(Tracker2RoomReport {
            timestamp_us,
            position,
            orientation,
        }));
    }

    pub fn set_unit2sensor(
        &mut self,
        sensor: SensorIndex,
        timestamp_us: u64,
        position: Vec3,
        orientation: Quat,
    ) {
        self.push(Report::Unit2Sensor(Unit2SensorReport {
            timestamp_us,
            sensor,
            position,
            orientation,
        }));
    }

    pub fn set_workspace(&mut self, timestamp_us: u64, min: Vec3, max: Vec3) {
        self.push(Report::Workspace(WorkspaceReport {
            timestamp_us,
            min,
            max,
        }));
    }

    /// Record a report and queue it for transmission
    pub fn push(&mut self, report: Report) {
        self.record(&report);
        if self.pending.len() >= MAX_PENDING_REPORTS {
            if let Some(dropped) = self.pending.pop_front() {
                log::warn!("Pending queue full, dropping {} report", dropped.kind());
            }
        }
        self.pending.push_back(report);
    }

    /// Record a report as current state without queueing it
    pub fn record(&mut self, report: &Report) {
        match *report {
            Report::Pose(r) => self.pose = Some(r),
            Report::Velocity(r) => self.velocity = Some(r),
            Report::Acceleration(r) => self.acceleration = Some(r),
            Report::Tracker2Room(r) => self.store_tracker2room(r),
            Report::Unit2Sensor(r) => self.store_unit2sensor(r),
            Report::Workspace(r) => self.store_workspace(r),
        }
    }

    /// Reports waiting to be sent, oldest first
    pub fn drain_pending(&mut self) -> Drain<'_, Report> {
        self.pending.drain(..)
    }

    /// Oldest report waiting to be sent, left in the queue
    pub fn peek_pending(&self) -> Option<Report> {
        self.pending.front().copied()
    }

    /// Remove the oldest pending report once it has been sent
    pub fn pop_pending(&mut self) -> Option<Report> {
        self.pending.pop_front()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::new(1)
    }
}

impl TransformSource for DeviceState {
    fn tracker2room(&self) -> Tracker2RoomReport {
        self.tracker2room
    }

    fn unit2sensor(&self, sensor: SensorIndex) -> Unit2SensorReport {
        self.unit2sensor[sensor.get()]
    }

    fn workspace(&self) -> WorkspaceReport {
        self.workspace
    }
}

impl TransformSink for DeviceState {
    fn store_tracker2room(&mut self, report: Tracker2RoomReport) {
        self.tracker2room = report;
    }

    fn store_unit2sensor(&mut self, report: Unit2SensorReport) {
        self.unit2sensor[report.sensor.get()] = report;
    }

    fn store_workspace(&mut self, report: WorkspaceReport) {
        self.workspace = report;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{IDENTITY_QUAT, ReportKind, ZERO_VEC};

    fn sensor(n: usize) -> SensorIndex {
        SensorIndex::new(n).unwrap()
    }

    fn snapshot(
        state: &DeviceState,
    ) -> (Tracker2RoomReport, Vec<Unit2SensorReport>, WorkspaceReport) {
        (
            state.tracker2room(),
            SensorIndex::first(MAX_SENSORS)
                .map(|s| state.unit2sensor(s))
                .collect(),
            state.workspace(),
        )
    }

    #[test]
    fn test_new_state_has_identity_transforms() {
        let state = DeviceState::new(4);
        assert_eq!(state.num_sensors(), 4);
        assert_eq!(state.status(), TrackerStatus::Syncing);
        assert_eq!(state.tracker2room().orientation, IDENTITY_QUAT);
        assert_eq!(state.unit2sensor(sensor(19)).sensor, sensor(19));
        assert_eq!(state.unit2sensor(sensor(19)).orientation, IDENTITY_QUAT);
        assert_eq!(state.workspace().min, ZERO_VEC);
        assert_eq!(state.workspace().max, ZERO_VEC);
    }

    #[test]
    fn test_sensor_count_clamped() {
        assert_eq!(DeviceState::new(0).num_sensors(), 1);
        assert_eq!(DeviceState::new(64).num_sensors(), MAX_SENSORS);
    }

    #[test]
    fn test_reset_transforms_idempotent() {
        let mut state = DeviceState::new(2);
        state.set_tracker2room(5, [1.0, 2.0, 3.0], [0.0, 1.0, 0.0, 0.0]);
        state.set_unit2sensor(sensor(1), 5, [0.1, 0.2, 0.3], [1.0, 0.0, 0.0, 0.0]);
        state.set_workspace(5, [-1.0, -1.0, 0.0], [1.0, 1.0, 2.0]);

        state.reset_transforms();
        let once = snapshot(&state);
        state.reset_transforms();
        let twice = snapshot(&state);

        assert_eq!(once, twice);
        assert_eq!(once.0, Tracker2RoomReport::identity(0));
        assert_eq!(once.1[1], Unit2SensorReport::identity(sensor(1), 0));
        assert_eq!(once.2, WorkspaceReport::empty(0));
    }

    #[test]
    fn test_setters_queue_reports_in_order() {
        let mut state = DeviceState::new(2);
        state.set_pose(sensor(0), 1, [1.0, 0.0, 0.0], IDENTITY_QUAT);
        state.set_pose(sensor(1), 2, [2.0, 0.0, 0.0], IDENTITY_QUAT);
        state.set_velocity(sensor(0), 3, [0.5, 0.0, 0.0], IDENTITY_QUAT, 0.01);
        state.set_workspace(4, [-1.0; 3], [1.0; 3]);

        assert_eq!(state.pending_len(), 4);
        assert_eq!(state.pose().unwrap().sensor, sensor(1));
        assert_eq!(state.velocity().unwrap().velocity_quat_dt, 0.01);
        assert_eq!(state.workspace().max, [1.0; 3]);

        let kinds: Vec<ReportKind> = state.drain_pending().map(|r| r.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                ReportKind::Pose,
                ReportKind::Pose,
                ReportKind::Velocity,
                ReportKind::Workspace
            ]
        );
        assert_eq!(state.pending_len(), 0);
    }

    #[test]
    fn test_record_does_not_queue() {
        let mut state = DeviceState::new(1);
        state.record(&Report::Tracker2Room(Tracker2RoomReport {
            timestamp_us: 9,
            position: [4.0, 5.0, 6.0],
            orientation: IDENTITY_QUAT,
        }));
        assert_eq!(state.pending_len(), 0);
        assert_eq!(state.tracker2room().position, [4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_mark_consumed() {
        let mut state = DeviceState::new(1);
        state.set_status(TrackerStatus::ReportReady);
        state.mark_consumed();
        assert_eq!(state.status(), TrackerStatus::Syncing);

        state.set_status(TrackerStatus::Fail);
        state.mark_consumed();
        assert_eq!(state.status(), TrackerStatus::Fail);
    }
}
