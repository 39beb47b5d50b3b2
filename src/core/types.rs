//! Core report types shared by every tracker implementation.
//!
//! Key types:
//! - [`SensorIndex`]: a validated sensor number in `[0, MAX_SENSORS)`
//! - [`SensorSlot`]: a dispatch key, either one sensor or [`SensorSlot::All`]
//! - [`Report`]: tagged union over the six report kinds
//!
//! Quaternions are stored `(x, y, z, w)` and never normalised here.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of sensors a single tracker reports
pub const MAX_SENSORS: usize = 20;

/// 3-vector (x, y, z)
pub type Vec3 = [f64; 3];

/// Quaternion in (x, y, z, w) order
pub type Quat = [f64; 4];

/// Identity rotation
pub const IDENTITY_QUAT: Quat = [0.0, 0.0, 0.0, 1.0];

/// Origin / zero vector
pub const ZERO_VEC: Vec3 = [0.0, 0.0, 0.0];

/// Sensor identity in `[0, MAX_SENSORS)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct SensorIndex(u8);

impl SensorIndex {
    /// Sensor 0, present on every tracker
    pub const FIRST: SensorIndex = SensorIndex(0);

    /// Validate a sensor number
    pub fn new(index: usize) -> Result<Self> {
        if index < MAX_SENSORS {
            Ok(Self(index as u8))
        } else {
            Err(Error::InvalidSensorIndex(index as i64))
        }
    }

    /// Raw index, usable for array lookups
    #[inline]
    pub const fn get(self) -> usize {
        self.0 as usize
    }

    /// Iterate over the first `count` sensors (clamped to `MAX_SENSORS`)
    pub fn first(count: usize) -> impl Iterator<Item = SensorIndex> {
        (0..count.min(MAX_SENSORS)).map(|i| SensorIndex(i as u8))
    }
}

impl TryFrom<u8> for SensorIndex {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value as usize)
    }
}

impl From<SensorIndex> for u8 {
    fn from(index: SensorIndex) -> u8 {
        index.0
    }
}

impl fmt::Display for SensorIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Subscription key: one sensor, or every sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorSlot {
    /// Handlers for a single sensor
    Sensor(SensorIndex),
    /// Handlers called for every sensor
    All,
}

impl SensorSlot {
    /// Map a raw integer key: `[0, MAX_SENSORS)` is a sensor, `MAX_SENSORS` is `All`
    pub fn from_raw(raw: i64) -> Result<Self> {
        match raw {
            r if r >= 0 && (r as usize) < MAX_SENSORS => Ok(Self::Sensor(SensorIndex(r as u8))),
            r if r == MAX_SENSORS as i64 => Ok(Self::All),
            r => Err(Error::InvalidSensorIndex(r)),
        }
    }

    /// Position in a per-sensor list table (`All` is the last slot)
    #[inline]
    pub const fn slot(self) -> usize {
        match self {
            Self::Sensor(index) => index.get(),
            Self::All => MAX_SENSORS,
        }
    }
}

impl From<SensorIndex> for SensorSlot {
    fn from(index: SensorIndex) -> Self {
        Self::Sensor(index)
    }
}

/// The six report kinds, with their wire tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ReportKind {
    Pose = 0,
    Velocity = 1,
    Acceleration = 2,
    Tracker2Room = 3,
    Unit2Sensor = 4,
    Workspace = 5,
}

impl ReportKind {
    /// Every kind, in tag order
    pub const ALL: [ReportKind; 6] = [
        ReportKind::Pose,
        ReportKind::Velocity,
        ReportKind::Acceleration,
        ReportKind::Tracker2Room,
        ReportKind::Unit2Sensor,
        ReportKind::Workspace,
    ];

    /// Wire tag
    #[inline]
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Whether subscribers are keyed by sensor for this kind
    pub const fn is_per_sensor(self) -> bool {
        !matches!(self, ReportKind::Tracker2Room | ReportKind::Workspace)
    }

    /// Short lowercase name used in logs and message type names
    pub const fn name(self) -> &'static str {
        match self {
            ReportKind::Pose => "pose",
            ReportKind::Velocity => "velocity",
            ReportKind::Acceleration => "acceleration",
            ReportKind::Tracker2Room => "tracker2room",
            ReportKind::Unit2Sensor => "unit2sensor",
            ReportKind::Workspace => "workspace",
        }
    }
}

impl TryFrom<u8> for ReportKind {
    type Error = Error;

    fn try_from(tag: u8) -> Result<Self> {
        ReportKind::ALL
            .get(tag as usize)
            .copied()
            .ok_or(Error::UnknownKind(tag))
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Position and orientation of one sensor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseReport {
    pub timestamp_us: u64,
    pub sensor: SensorIndex,
    pub position: Vec3,
    pub orientation: Quat,
}

impl PoseReport {
    /// Origin with identity orientation
    pub fn identity(sensor: SensorIndex, timestamp_us: u64) -> Self {
        Self {
            timestamp_us,
            sensor,
            position: ZERO_VEC,
            orientation: IDENTITY_QUAT,
        }
    }
}

/// Linear velocity plus a delta-quaternion over `velocity_quat_dt` seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VelocityReport {
    pub timestamp_us: u64,
    pub sensor: SensorIndex,
    pub velocity: Vec3,
    pub velocity_quat: Quat,
    pub velocity_quat_dt: f64,
}

/// Linear acceleration plus a delta-quaternion over `acceleration_quat_dt` seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccelerationReport {
    pub timestamp_us: u64,
    pub sensor: SensorIndex,
    pub acceleration: Vec3,
    pub acceleration_quat: Quat,
    pub acceleration_quat_dt: f64,
}

/// Global tracker-to-room transform
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tracker2RoomReport {
    pub timestamp_us: u64,
    pub position: Vec3,
    pub orientation: Quat,
}

impl Tracker2RoomReport {
    pub fn identity(timestamp_us: u64) -> Self {
        Self {
            timestamp_us,
            position: ZERO_VEC,
            orientation: IDENTITY_QUAT,
        }
    }
}

/// Per-sensor unit-to-sensor transform
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Unit2SensorReport {
    pub timestamp_us: u64,
    pub sensor: SensorIndex,
    pub position: Vec3,
    pub orientation: Quat,
}

impl Unit2SensorReport {
    pub fn identity(sensor: SensorIndex, timestamp_us: u64) -> Self {
        Self {
            timestamp_us,
            sensor,
            position: ZERO_VEC,
            orientation: IDENTITY_QUAT,
        }
    }
}

/// Axis-aligned sensing volume in tracker coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceReport {
    pub timestamp_us: u64,
    pub min: Vec3,
    pub max: Vec3,
}

impl WorkspaceReport {
    /// Degenerate box collapsed on the origin
    pub fn empty(timestamp_us: u64) -> Self {
        Self {
            timestamp_us,
            min: ZERO_VEC,
            max: ZERO_VEC,
        }
    }
}

/// One timestamped tracker update
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Report {
    Pose(PoseReport),
    Velocity(VelocityReport),
    Acceleration(AccelerationReport),
    Tracker2Room(Tracker2RoomReport),
    Unit2Sensor(Unit2SensorReport),
    Workspace(WorkspaceReport),
}

impl Report {
    pub fn kind(&self) -> ReportKind {
        match self {
            Report::Pose(_) => ReportKind::Pose,
            Report::Velocity(_) => ReportKind::Velocity,
            Report::Acceleration(_) => ReportKind::Acceleration,
            Report::Tracker2Room(_) => ReportKind::Tracker2Room,
            Report::Unit2Sensor(_) => ReportKind::Unit2Sensor,
            Report::Workspace(_) => ReportKind::Workspace,
        }
    }

    pub fn timestamp_us(&self) -> u64 {
        match self {
            Report::Pose(r) => r.timestamp_us,
            Report::Velocity(r) => r.timestamp_us,
            Report::Acceleration(r) => r.timestamp_us,
            Report::Tracker2Room(r) => r.timestamp_us,
            Report::Unit2Sensor(r) => r.timestamp_us,
            Report::Workspace(r) => r.timestamp_us,
        }
    }

    /// Reporting sensor, `None` for the global kinds
    pub fn sensor(&self) -> Option<SensorIndex> {
        match self {
            Report::Pose(r) => Some(r.sensor),
            Report::Velocity(r) => Some(r.sensor),
            Report::Acceleration(r) => Some(r.sensor),
            Report::Unit2Sensor(r) => Some(r.sensor),
            Report::Tracker2Room(_) | Report::Workspace(_) => None,
        }
    }
}

fn fmt_vec(v: &[f64]) -> String {
    let parts: Vec<String> = v.iter().map(|x| format!("{:.4}", x)).collect();
    format!("({})", parts.join(", "))
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ts = self.timestamp_us();
        let (secs, micros) = (ts / 1_000_000, ts % 1_000_000);
        write!(f, "[{}.{:06}] {} ", secs, micros, self.kind())?;
        match self {
            Report::Pose(r) => write!(
                f,
                "sensor {} pos {} quat {}",
                r.sensor,
                fmt_vec(&r.position),
                fmt_vec(&r.orientation)
            ),
            Report::Velocity(r) => write!(
                f,
                "sensor {} vel {} dquat {} dt {:.4}",
                r.sensor,
                fmt_vec(&r.velocity),
                fmt_vec(&r.velocity_quat),
                r.velocity_quat_dt
            ),
            Report::Acceleration(r) => write!(
                f,
                "sensor {} acc {} dquat {} dt {:.4}",
                r.sensor,
                fmt_vec(&r.acceleration),
                fmt_vec(&r.acceleration_quat),
                r.acceleration_quat_dt
            ),
            Report::Tracker2Room(r) => write!(
                f,
                "offset {} quat {}",
                fmt_vec(&r.position),
                fmt_vec(&r.orientation)
            ),
            Report::Unit2Sensor(r) => write!(
                f,
                "sensor {} offset {} quat {}",
                r.sensor,
                fmt_vec(&r.position),
                fmt_vec(&r.orientation)
            ),
            Report::Workspace(r) => {
                write!(f, "min {} max {}", fmt_vec(&r.min), fmt_vec(&r.max))
            }
        }
    }
}

/// Microseconds since the Unix epoch
pub fn current_timestamp_us() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}
