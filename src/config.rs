//! Configuration for the tracker server
//!
//! Loads configuration from a TOML file: which report source to run, its
//! serial parameters, the initial transforms and workspace, and the network
//! endpoint clients connect to.

use crate::connection::WireFormat;
use crate::core::{
    IDENTITY_QUAT, MAX_SENSORS, Quat, SensorIndex, TransformSink, Tracker2RoomReport,
    Unit2SensorReport, Vec3, WorkspaceReport, ZERO_VEC,
};
use crate::error::{Error, Result};
use crate::framing::FramingConfig;
use crate::framing::tagged::MAX_FRAME_LEN;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Top-level application configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    pub device: DeviceConfig,
    #[serde(default)]
    pub transforms: TransformsConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which tracker to run
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DeviceConfig {
    /// Sender name clients see (e.g. "Tracker0")
    pub name: String,
    /// Source type: "null" or "serial"
    #[serde(rename = "type")]
    pub device_type: String,
    /// Number of sensors reported
    #[serde(default = "default_sensors")]
    pub sensors: usize,
    /// Report rate for synthetic sources (Hz)
    #[serde(default = "default_update_rate")]
    pub update_rate_hz: f64,
    /// Serial parameters, required when `type = "serial"`
    #[serde(default)]
    pub serial: Option<SerialConfig>,
}

fn default_sensors() -> usize {
    1
}

fn default_update_rate() -> f64 {
    60.0
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: "Tracker0".to_string(),
            device_type: "null".to_string(),
            sensors: default_sensors(),
            update_rate_hz: default_update_rate(),
            serial: None,
        }
    }
}

/// Serial port and framing parameters
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SerialConfig {
    /// Serial port path (e.g. "/dev/ttyUSB0")
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Accumulation buffer size in bytes
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    /// How long a recognised frame may stay incomplete
    #[serde(default = "default_partial_timeout_ms")]
    pub partial_timeout_ms: u64,
    /// Completed reports buffered before the oldest is dropped
    #[serde(default = "default_ready_capacity")]
    pub ready_capacity: usize,
}

fn default_baud_rate() -> u32 {
    38400
}

fn default_buffer_capacity() -> usize {
    100
}

fn default_partial_timeout_ms() -> u64 {
    250
}

fn default_ready_capacity() -> usize {
    32
}

impl SerialConfig {
    pub fn framing(&self) -> FramingConfig {
        FramingConfig {
            capacity: self.buffer_capacity,
            partial_timeout: Duration::from_millis(self.partial_timeout_ms),
            ready_capacity: self.ready_capacity,
        }
    }
}

/// Position and orientation pair
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct PoseConfig {
    pub position: Vec3,
    /// Quaternion (x, y, z, w)
    pub orientation: Quat,
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            position: ZERO_VEC,
            orientation: IDENTITY_QUAT,
        }
    }
}

/// Unit2Sensor transform for one sensor
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Unit2SensorConfig {
    pub sensor: usize,
    pub position: Vec3,
    pub orientation: Quat,
}

/// Axis-aligned workspace box
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct WorkspaceConfig {
    pub min: Vec3,
    pub max: Vec3,
}

/// Initial transform and workspace state
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct TransformsConfig {
    #[serde(default)]
    pub tracker2room: Option<PoseConfig>,
    #[serde(default)]
    pub unit2sensor: Vec<Unit2SensorConfig>,
    #[serde(default)]
    pub workspace: Option<WorkspaceConfig>,
}

impl TransformsConfig {
    /// Store the configured transforms; unspecified ones are left untouched
    pub fn apply_to<S: TransformSink + ?Sized>(&self, sink: &mut S) -> Result<()> {
        if let Some(t2r) = self.tracker2room {
            sink.store_tracker2room(Tracker2RoomReport {
                timestamp_us: 0,
                position: t2r.position,
                orientation: t2r.orientation,
            });
        }
        for u2s in &self.unit2sensor {
            sink.store_unit2sensor(Unit2SensorReport {
                timestamp_us: 0,
                sensor: SensorIndex::new(u2s.sensor)?,
                position: u2s.position,
                orientation: u2s.orientation,
            });
        }
        if let Some(ws) = self.workspace {
            sink.store_workspace(WorkspaceReport {
                timestamp_us: 0,
                min: ws.min,
                max: ws.max,
            });
        }
        Ok(())
    }
}

/// Network endpoint configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NetworkConfig {
    /// TCP bind address
    ///
    /// Examples:
    /// - `0.0.0.0:3883` - Bind to all interfaces on port 3883
    /// - `127.0.0.1:3883` - Localhost only
    pub bind_address: String,
    /// Envelope encoding: "json" or "postcard"
    #[serde(default)]
    pub wire_format: WireFormat,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3883".to_string(),
            wire_format: WireFormat::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    ///
    /// # Example
    /// ```no_run
    /// use tracker_io::config::Config;
    ///
    /// let config = Config::from_file("tracker.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Check value ranges that the type system cannot express
    pub fn validate(&self) -> Result<()> {
        let device = &self.device;
        if device.sensors == 0 || device.sensors > MAX_SENSORS {
            return Err(Error::Other(format!(
                "device.sensors must be within 1..={}, got {}",
                MAX_SENSORS, device.sensors
            )));
        }
        if device.update_rate_hz.is_nan() || device.update_rate_hz <= 0.0 {
            return Err(Error::Other(format!(
                "device.update_rate_hz must be positive, got {}",
                device.update_rate_hz
            )));
        }
        if let Some(serial) = &device.serial {
            if serial.buffer_capacity == 0 {
                return Err(Error::Other(
                    "device.serial.buffer_capacity must be non-zero".to_string(),
                ));
            }
            // The serial source frames with TaggedFrameDriver; every frame must fit
            if device.device_type == "serial" && serial.buffer_capacity < MAX_FRAME_LEN {
                return Err(Error::Other(format!(
                    "device.serial.buffer_capacity must hold a full frame ({} bytes), got {}",
                    MAX_FRAME_LEN, serial.buffer_capacity
                )));
            }
            if serial.ready_capacity == 0 {
                return Err(Error::Other(
                    "device.serial.ready_capacity must be non-zero".to_string(),
                ));
            }
        }
        if device.device_type == "serial" && device.serial.is_none() {
            return Err(Error::Other(
                "device.serial section is required for serial devices".to_string(),
            ));
        }
        for u2s in &self.transforms.unit2sensor {
            SensorIndex::new(u2s.sensor)?;
            if u2s.sensor >= device.sensors {
                return Err(Error::Other(format!(
                    "transforms.unit2sensor sensor {} exceeds device.sensors ({})",
                    u2s.sensor, device.sensors
                )));
            }
        }
        Ok(())
    }
}
