//! Reference frame driver for devices that speak the crate's own serial framing
//!
//! Frame format: [0xA5 0x5A] [TAG] [LEN] [PAYLOAD] [CRC_H] [CRC_L]
//!
//! - TAG: report kind tag (see [`ReportKind::tag`])
//! - LEN: payload length, must equal the codec's fixed size for TAG
//! - PAYLOAD: the wire codec encoding of one report
//! - CRC: 16-bit checksum over TAG + LEN + PAYLOAD, big-endian

use crate::core::{FrameDriver, ParseOutcome, Report, ReportKind};
use crate::error::Result;
use crate::protocol::codec;

pub const SYNC_BYTE_1: u8 = 0xA5;
pub const SYNC_BYTE_2: u8 = 0x5A;

/// SYNC(2) + TAG(1) + LEN(1)
pub const HEADER_LEN: usize = 4;

/// SYNC(2) + TAG(1) + LEN(1) + CRC(2)
pub const FRAME_OVERHEAD: usize = HEADER_LEN + 2;

/// Largest frame the driver produces or accepts
pub const MAX_FRAME_LEN: usize = FRAME_OVERHEAD + codec::MAX_ENCODED_LEN;

/// Checksum: big-endian 16-bit word sum, an odd trailing byte is XORed in
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum: u16 = 0;
    let mut i = 0;
    while i + 1 < data.len() {
        let word = ((data[i] as u16) << 8) | (data[i + 1] as u16);
        sum = sum.wrapping_add(word);
        i += 2;
    }
    if i < data.len() {
        sum ^= data[i] as u16;
    }
    sum
}

/// Build the complete frame for one report
pub fn encode_frame(report: &Report) -> Vec<u8> {
    let payload = codec::encode_to_vec(report);
    let mut frame = Vec::with_capacity(FRAME_OVERHEAD + payload.len());
    frame.extend_from_slice(&[SYNC_BYTE_1, SYNC_BYTE_2, report.kind().tag()]);
    frame.push(payload.len() as u8);
    frame.extend_from_slice(&payload);
    let crc = checksum(&frame[2..]);
    frame.extend_from_slice(&crc.to_be_bytes());
    frame
}

/// Frame driver for `[0xA5 0x5A]`-synchronised report frames
#[derive(Debug, Clone, Default)]
pub struct TaggedFrameDriver {
    reset_command: Vec<u8>,
}

impl TaggedFrameDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes written to the device every time the engine resets
    pub fn with_reset_command(mut self, command: &[u8]) -> Self {
        self.reset_command = command.to_vec();
        self
    }
}

impl FrameDriver for TaggedFrameDriver {
    fn try_sync(&mut self, buffer: &[u8]) -> Result<Option<usize>> {
        Ok(buffer
            .windows(2)
            .position(|w| w[0] == SYNC_BYTE_1 && w[1] == SYNC_BYTE_2))
    }

    fn try_parse(&mut self, buffer: &[u8]) -> Result<ParseOutcome> {
        if buffer.len() < HEADER_LEN {
            return Ok(ParseOutcome::NeedMoreBytes);
        }

        let kind = match ReportKind::try_from(buffer[2]) {
            Ok(kind) => kind,
            Err(_) => {
                return Ok(ParseOutcome::Invalid(format!(
                    "unknown report tag 0x{:02X}",
                    buffer[2]
                )));
            }
        };

        let len = buffer[3] as usize;
        if len != codec::encoded_len(kind) {
            return Ok(ParseOutcome::Invalid(format!(
                "{} frame declares {} payload bytes, expected {}",
                kind,
                len,
                codec::encoded_len(kind)
            )));
        }

        let total_len = FRAME_OVERHEAD + len;
        if buffer.len() < total_len {
            return Ok(ParseOutcome::NeedMoreBytes);
        }

        let received = u16::from_be_bytes([buffer[total_len - 2], buffer[total_len - 1]]);
        let computed = checksum(&buffer[2..HEADER_LEN + len]);
        if received != computed {
            log::warn!(
                "Checksum mismatch for {} frame: expected 0x{:04X}, got 0x{:04X}",
                kind,
                computed,
                received
            );
            return Ok(ParseOutcome::Invalid("checksum mismatch".to_string()));
        }

        match codec::decode_kind(&buffer[HEADER_LEN..HEADER_LEN + len], kind) {
            Ok(report) => Ok(ParseOutcome::Complete(report, total_len)),
            Err(e) => Ok(ParseOutcome::Invalid(e.to_string())),
        }
    }

    fn reset(&mut self, commands: &mut Vec<u8>) -> Result<()> {
        commands.extend_from_slice(&self.reset_command);
        Ok(())
    }

    fn sync_window(&self) -> usize {
        2
    }
}
