//! Error types for tracker-io

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// tracker-io error types
///
/// Codec and registry errors are local and recoverable. Framing errors up to
/// `Resetting` are absorbed by the framing engine; `HardwareFail` is terminal
/// until the device is restarted.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Destination buffer cannot hold the encoded report
    #[error("Buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall {
        /// Bytes required by the encoding
        needed: usize,
        /// Bytes offered by the caller
        available: usize,
    },

    /// Incoming message does not have the fixed layout of its kind
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Report kind tag not recognised
    #[error("Unknown report kind: {0:#04x}")]
    UnknownKind(u8),

    /// Framing accumulation buffer exceeded its capacity
    #[error("Framing buffer overrun (capacity {capacity} bytes)")]
    BufferOverrun {
        /// Configured buffer capacity
        capacity: usize,
    },

    /// Frame rejected by the device driver
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Non-recoverable device condition
    #[error("Hardware failure: {0}")]
    HardwareFail(String),

    /// Sensor index outside `[0, MAX_SENSORS]`
    #[error("Invalid sensor index: {0}")]
    InvalidSensorIndex(i64),

    /// No matching (context, handler) pair registered
    #[error("Handler not found")]
    HandlerNotFound,

    /// Serial port error
    #[cfg(feature = "serial")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration could not be written
    #[error("Config write error: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    /// Envelope serialization failure
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Peer closed the connection
    #[error("Connection closed")]
    ConnectionClosed,

    /// Message type name never registered on this connection
    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),

    /// Device type not known to the daemon
    #[error("Unknown device type: {0}")]
    UnknownDevice(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
