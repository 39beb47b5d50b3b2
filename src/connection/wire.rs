//! Wire format serialization for connection envelopes
//!
//! # TCP framing
//!
//! ```text
//! ┌──────────────────┬──────────────────────────┐
//! │ Length (4 bytes) │ Payload (variable)       │
//! │ Big-endian u32   │ JSON or Postcard binary  │
//! └──────────────────┴──────────────────────────┘
//! ```
//!
//! The payload is one [`WireEnvelope`]. Its `payload` field holds the report
//! bytes produced by the fixed-layout codec, so only the envelope itself
//! depends on the configured format.
//!
//! - **JSON** (default): human-readable, easy to inspect with a packet capture
//! - **Postcard**: compact binary for high-rate pose streams

use super::DeliveryClass;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Maximum framed message size (1 MiB)
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Supported wire formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// Binary format using postcard - fast and compact
    Postcard,
    /// JSON format - human-readable for debugging
    #[default]
    Json,
}

impl std::str::FromStr for WireFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(WireFormat::Json),
            "postcard" => Ok(WireFormat::Postcard),
            other => Err(Error::Other(format!("Unknown wire format: {}", other))),
        }
    }
}

/// Message as it crosses the link: names instead of connection-local ids
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WireEnvelope {
    pub sender: String,
    pub message_type: String,
    pub timestamp_us: u64,
    pub class: DeliveryClass,
    pub payload: Vec<u8>,
}

/// Serializer that can handle both formats
#[derive(Debug, Clone, Copy)]
pub struct Serializer {
    format: WireFormat,
}

impl Serializer {
    /// Create a new serializer for the given format
    pub fn new(format: WireFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> WireFormat {
        self.format
    }

    /// Serialize an envelope to bytes
    pub fn serialize(&self, envelope: &WireEnvelope) -> Result<Vec<u8>> {
        match self.format {
            WireFormat::Postcard => {
                postcard::to_allocvec(envelope).map_err(|e| Error::Serialization(e.to_string()))
            }
            WireFormat::Json => {
                serde_json::to_vec(envelope).map_err(|e| Error::Serialization(e.to_string()))
            }
        }
    }

    /// Deserialize bytes to an envelope
    pub fn deserialize(&self, bytes: &[u8]) -> Result<WireEnvelope> {
        match self.format {
            WireFormat::Postcard => {
                postcard::from_bytes(bytes).map_err(|e| Error::Serialization(e.to_string()))
            }
            WireFormat::Json => {
                serde_json::from_slice(bytes).map_err(|e| Error::Serialization(e.to_string()))
            }
        }
    }

    /// Serialize and prepend the 4-byte big-endian length
    pub fn frame(&self, envelope: &WireEnvelope) -> Result<Vec<u8>> {
        let body = self.serialize(envelope)?;
        if body.len() > MAX_FRAME_LEN {
            return Err(Error::Serialization(format!(
                "Message too large: {} bytes",
                body.len()
            )));
        }
        let mut framed = Vec::with_capacity(4 + body.len());
        framed.extend_from_slice(&(body.len() as u32).to_be_bytes());
        framed.extend_from_slice(&body);
        Ok(framed)
    }
}
