//! Fixed-layout report codec
//!
//! Every report kind has one fixed size. All fields are big-endian (network
//! order); floats are IEEE-754 doubles.
//!
//! ```text
//! Pose         (72)  [ts u64][sensor i32][pad i32][pos 3×f64][quat 4×f64]
//! Velocity     (80)  [ts u64][sensor i32][pad i32][vel 3×f64][dquat 4×f64][dt f64]
//! Acceleration (80)  [ts u64][sensor i32][pad i32][acc 3×f64][dquat 4×f64][dt f64]
//! Tracker2Room (64)  [ts u64][offset 3×f64][quat 4×f64]
//! Unit2Sensor  (72)  [ts u64][sensor i32][pad i32][offset 3×f64][quat 4×f64]
//! Workspace    (56)  [ts u64][min 3×f64][max 3×f64]
//! ```
//!
//! Quaternions are `(x, y, z, w)`. Decoding checks structure only: a
//! non-unit quaternion round-trips untouched.

use crate::core::types::{
    AccelerationReport, MAX_SENSORS, PoseReport, Quat, Report, ReportKind, SensorIndex,
    Tracker2RoomReport, Unit2SensorReport, Vec3, VelocityReport, WorkspaceReport,
};
use crate::error::{Error, Result};

/// Largest encoding of any kind
pub const MAX_ENCODED_LEN: usize = 80;

const TIMESTAMP_LEN: usize = 8;
const SENSOR_LEN: usize = 8; // i32 sensor + i32 alignment padding
const VEC3_LEN: usize = 3 * 8;
const QUAT_LEN: usize = 4 * 8;
const F64_LEN: usize = 8;

/// Encoded size of `kind`
pub const fn encoded_len(kind: ReportKind) -> usize {
    match kind {
        ReportKind::Pose | ReportKind::Unit2Sensor => {
            TIMESTAMP_LEN + SENSOR_LEN + VEC3_LEN + QUAT_LEN
        }
        ReportKind::Velocity | ReportKind::Acceleration => {
            TIMESTAMP_LEN + SENSOR_LEN + VEC3_LEN + QUAT_LEN + F64_LEN
        }
        ReportKind::Tracker2Room => TIMESTAMP_LEN + VEC3_LEN + QUAT_LEN,
        ReportKind::Workspace => TIMESTAMP_LEN + VEC3_LEN + VEC3_LEN,
    }
}

/// Serialize `report` into `buf`, returning the number of bytes written
pub fn encode(report: &Report, buf: &mut [u8]) -> Result<usize> {
    let needed = encoded_len(report.kind());
    if buf.len() < needed {
        return Err(Error::BufferTooSmall {
            needed,
            available: buf.len(),
        });
    }

    let mut w = Writer::new(&mut buf[..needed]);
    write_report(&mut w, report);
    Ok(w.pos)
}

/// Serialize `report` into a freshly sized vector
pub fn encode_to_vec(report: &Report) -> Vec<u8> {
    let mut buf = vec![0u8; encoded_len(report.kind())];
    write_report(&mut Writer::new(&mut buf), report);
    buf
}

fn write_report(w: &mut Writer<'_>, report: &Report) {
    match report {
        Report::Pose(r) => {
            w.u64(r.timestamp_us);
            w.sensor(r.sensor);
            w.vec3(&r.position);
            w.quat(&r.orientation);
        }
        Report::Velocity(r) => {
            w.u64(r.timestamp_us);
            w.sensor(r.sensor);
            w.vec3(&r.velocity);
            w.quat(&r.velocity_quat);
            w.f64(r.velocity_quat_dt);
        }
        Report::Acceleration(r) => {
            w.u64(r.timestamp_us);
            w.sensor(r.sensor);
            w.vec3(&r.acceleration);
            w.quat(&r.acceleration_quat);
            w.f64(r.acceleration_quat_dt);
        }
        Report::Tracker2Room(r) => {
            w.u64(r.timestamp_us);
            w.vec3(&r.position);
            w.quat(&r.orientation);
        }
        Report::Unit2Sensor(r) => {
            w.u64(r.timestamp_us);
            w.sensor(r.sensor);
            w.vec3(&r.position);
            w.quat(&r.orientation);
        }
        Report::Workspace(r) => {
            w.u64(r.timestamp_us);
            w.vec3(&r.min);
            w.vec3(&r.max);
        }
    }
}

/// Deserialize a report from its wire tag
pub fn decode(bytes: &[u8], tag: u8) -> Result<Report> {
    let kind = ReportKind::try_from(tag)?;
    decode_kind(bytes, kind)
}

/// Deserialize a report of a known kind
pub fn decode_kind(bytes: &[u8], kind: ReportKind) -> Result<Report> {
    let expected = encoded_len(kind);
    if bytes.len() != expected {
        return Err(Error::MalformedMessage(format!(
            "{} message is {} bytes, expected {}",
            kind,
            bytes.len(),
            expected
        )));
    }

    let mut r = Reader::new(bytes);
    let report = match kind {
        ReportKind::Pose => Report::Pose(PoseReport {
            timestamp_us: r.u64(),
            sensor: r.sensor()?,
            position: r.vec3(),
            orientation: r.quat(),
        }),
        ReportKind::Velocity => Report::Velocity(VelocityReport {
            timestamp_us: r.u64(),
            sensor: r.sensor()?,
            velocity: r.vec3(),
            velocity_quat: r.quat(),
            velocity_quat_dt: r.f64(),
        }),
        ReportKind::Acceleration => Report::Acceleration(AccelerationReport {
            timestamp_us: r.u64(),
            sensor: r.sensor()?,
            acceleration: r.vec3(),
            acceleration_quat: r.quat(),
            acceleration_quat_dt: r.f64(),
        }),
        ReportKind::Tracker2Room => Report::Tracker2Room(Tracker2RoomReport {
            timestamp_us: r.u64(),
            position: r.vec3(),
            orientation: r.quat(),
        }),
        ReportKind::Unit2Sensor => Report::Unit2Sensor(Unit2SensorReport {
            timestamp_us: r.u64(),
            sensor: r.sensor()?,
            position: r.vec3(),
            orientation: r.quat(),
        }),
        ReportKind::Workspace => Report::Workspace(WorkspaceReport {
            timestamp_us: r.u64(),
            min: r.vec3(),
            max: r.vec3(),
        }),
    };
    Ok(report)
}

/// Sequential big-endian writer over a pre-sized slice
struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    #[inline]
    fn put(&mut self, bytes: &[u8]) {
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    fn u64(&mut self, v: u64) {
        self.put(&v.to_be_bytes());
    }

    fn f64(&mut self, v: f64) {
        self.put(&v.to_be_bytes());
    }

    fn sensor(&mut self, sensor: SensorIndex) {
        self.put(&(sensor.get() as i32).to_be_bytes());
        self.put(&[0u8; 4]);
    }

    fn vec3(&mut self, v: &Vec3) {
        v.iter().for_each(|x| self.f64(*x));
    }

    fn quat(&mut self, q: &Quat) {
        q.iter().for_each(|x| self.f64(*x));
    }
}

/// Sequential big-endian reader; callers validate the total length first
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    #[inline]
    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    fn u64(&mut self) -> u64 {
        u64::from_be_bytes(self.take())
    }

    fn f64(&mut self) -> f64 {
        f64::from_be_bytes(self.take())
    }

    fn sensor(&mut self) -> Result<SensorIndex> {
        let raw = i32::from_be_bytes(self.take());
        let _padding: [u8; 4] = self.take();
        if raw < 0 || raw as usize >= MAX_SENSORS {
            return Err(Error::MalformedMessage(format!(
                "sensor index {} out of range",
                raw
            )));
        }
        SensorIndex::new(raw as usize)
    }

    fn vec3(&mut self) -> Vec3 {
        [self.f64(), self.f64(), self.f64()]
    }

    fn quat(&mut self) -> Quat {
        [self.f64(), self.f64(), self.f64(), self.f64()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::IDENTITY_QUAT;

    fn sensor(n: usize) -> SensorIndex {
        SensorIndex::new(n).unwrap()
    }

    fn sample_reports() -> Vec<Report> {
        vec![
            Report::Pose(PoseReport {
                timestamp_us: 1_700_000_000_123_456,
                sensor: sensor(3),
                position: [0.25, -1.5, 2.0],
                orientation: [0.0, 0.7071, 0.0, 0.7071],
            }),
            Report::Velocity(VelocityReport {
                timestamp_us: 17,
                sensor: sensor(19),
                velocity: [1.0, 2.0, 3.0],
                velocity_quat: [0.1, 0.2, 0.3, 0.9],
                velocity_quat_dt: 0.016,
            }),
            Report::Acceleration(AccelerationReport {
                timestamp_us: 18,
                sensor: sensor(0),
                acceleration: [-9.81, 0.0, 0.5],
                acceleration_quat: IDENTITY_QUAT,
                acceleration_quat_dt: 0.032,
            }),
            Report::Tracker2Room(Tracker2RoomReport {
                timestamp_us: 19,
                position: [0.0, 0.0, 1.2],
                orientation: [1.0, 0.0, 0.0, 0.0],
            }),
            Report::Unit2Sensor(Unit2SensorReport {
                timestamp_us: 20,
                sensor: sensor(7),
                position: [0.01, 0.02, 0.03],
                orientation: IDENTITY_QUAT,
            }),
            Report::Workspace(WorkspaceReport {
                timestamp_us: 21,
                min: [-2.0, -2.0, 0.0],
                max: [2.0, 2.0, 2.5],
            }),
        ]
    }

    #[test]
    fn test_encoded_sizes() {
        assert_eq!(encoded_len(ReportKind::Pose), 72);
        assert_eq!(encoded_len(ReportKind::Velocity), 80);
        assert_eq!(encoded_len(ReportKind::Acceleration), 80);
        assert_eq!(encoded_len(ReportKind::Tracker2Room), 64);
        assert_eq!(encoded_len(ReportKind::Unit2Sensor), 72);
        assert_eq!(encoded_len(ReportKind::Workspace), 56);
        assert!(
            ReportKind::ALL
                .iter()
                .all(|k| encoded_len(*k) <= MAX_ENCODED_LEN)
        );
    }

    #[test]
    fn test_decode_inverts_encode() {
        for report in sample_reports() {
            let bytes = encode_to_vec(&report);
            assert_eq!(bytes.len(), encoded_len(report.kind()));
            let decoded = decode(&bytes, report.kind().tag()).unwrap();
            assert_eq!(decoded, report);
        }
    }

    #[test]
    fn test_pose_layout_is_big_endian() {
        let report = Report::Pose(PoseReport {
            timestamp_us: 0x0102_0304_0506_0708,
            sensor: sensor(5),
            position: [1.0, 0.0, 0.0],
            orientation: IDENTITY_QUAT,
        });
        let mut buf = [0u8; MAX_ENCODED_LEN];
        let n = encode(&report, &mut buf).unwrap();

        assert_eq!(n, 72);
        assert_eq!(&buf[0..8], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(&buf[8..12], &[0, 0, 0, 5]);
        assert_eq!(&buf[12..16], &[0, 0, 0, 0]);
        assert_eq!(&buf[16..24], &1.0f64.to_be_bytes());
        // w component is the last quaternion field
        assert_eq!(&buf[64..72], &1.0f64.to_be_bytes());
    }

    #[test]
    fn test_encode_buffer_too_small() {
        let report = Report::Workspace(WorkspaceReport::empty(0));
        let mut buf = [0u8; 40];
        match encode(&report, &mut buf) {
            Err(Error::BufferTooSmall { needed, available }) => {
                assert_eq!(needed, 56);
                assert_eq!(available, 40);
            }
            other => panic!("expected BufferTooSmall, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_wrong_length_is_malformed() {
        for report in sample_reports() {
            let bytes = encode_to_vec(&report);
            let tag = report.kind().tag();

            let short = &bytes[..bytes.len() - 1];
            assert!(matches!(decode(short, tag), Err(Error::MalformedMessage(_))));

            let mut long = bytes.clone();
            long.push(0);
            assert!(matches!(decode(&long, tag), Err(Error::MalformedMessage(_))));

            assert!(matches!(decode(&[], tag), Err(Error::MalformedMessage(_))));
        }
    }

    #[test]
    fn test_decode_unknown_kind() {
        let bytes = [0u8; 72];
        assert!(matches!(decode(&bytes, 6), Err(Error::UnknownKind(6))));
        assert!(matches!(decode(&bytes, 0xFF), Err(Error::UnknownKind(0xFF))));
    }

    #[test]
    fn test_decode_rejects_out_of_range_sensor() {
        let mut bytes = encode_to_vec(&Report::Pose(PoseReport::identity(sensor(1), 0)));
        bytes[8..12].copy_from_slice(&(MAX_SENSORS as i32).to_be_bytes());
        assert!(matches!(
            decode_kind(&bytes, ReportKind::Pose),
            Err(Error::MalformedMessage(_))
        ));

        bytes[8..12].copy_from_slice(&(-1i32).to_be_bytes());
        assert!(matches!(
            decode_kind(&bytes, ReportKind::Pose),
            Err(Error::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_non_unit_quaternion_passes_through() {
        let report = Report::Unit2Sensor(Unit2SensorReport {
            timestamp_us: 1,
            sensor: sensor(2),
            position: [0.0; 3],
            orientation: [3.0, 4.0, 5.0, 6.0],
        });
        let decoded = decode_kind(&encode_to_vec(&report), ReportKind::Unit2Sensor).unwrap();
        assert_eq!(decoded, report);
    }
}
