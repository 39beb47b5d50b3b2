//! Core report model, tracker state and capability traits

pub mod driver;
pub mod state;
pub mod types;

pub use driver::{FrameDriver, ParseOutcome, ReportSource, TransformSink, TransformSource};
pub use state::{DeviceState, TrackerStatus};
pub use types::{
    AccelerationReport, IDENTITY_QUAT, MAX_SENSORS, PoseReport, Quat, Report, ReportKind,
    SensorIndex, SensorSlot, Tracker2RoomReport, Unit2SensorReport, Vec3, VelocityReport,
    WorkspaceReport, ZERO_VEC, current_timestamp_us,
};
