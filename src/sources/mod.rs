//! Report source implementations
//!
//! - [`NullSource`]: synthetic identity poses at a fixed rate
//! - [`CannedSource`]: replays recorded poses
//! - [`SerialSource`]: serial-attached hardware through the framing engine

pub mod canned;
pub mod null;
pub mod serial;

pub use canned::{CannedSource, PlaybackSource, VecPlayback};
pub use null::NullSource;
pub use serial::SerialSource;

use crate::config::Config;
use crate::core::ReportSource;
use crate::error::{Error, Result};

/// Create a report source based on configuration
pub fn create_source(config: &Config) -> Result<Box<dyn ReportSource>> {
    let device = &config.device;
    match device.device_type.as_str() {
        "null" => Ok(Box::new(NullSource::new(
            device.sensors,
            device.update_rate_hz,
        ))),
        #[cfg(feature = "serial")]
        "serial" => {
            let serial = device.serial.as_ref().ok_or_else(|| {
                Error::Other("device.serial section is required for serial devices".to_string())
            })?;
            let transport =
                crate::transport::SerialTransport::open(&serial.port, serial.baud_rate)?;
            Ok(Box::new(SerialSource::new(
                crate::framing::TaggedFrameDriver::new(),
                transport,
                serial.framing(),
            )))
        }
        _ => Err(Error::UnknownDevice(device.device_type.clone())),
    }
}
