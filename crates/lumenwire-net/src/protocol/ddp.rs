//! Distributed Display Protocol
//!
//! ```text
//! [0]    flags: version 1 (0x40) | push (0x01)
//! [1]    reserved
//! [2]    data type
//! [3]    destination id
//! [4..8] data offset in bytes (big-endian)
//! [8..10] data length (big-endian)
//! ```
//!
//! The offset is tracked in points and written as `points * bytes_per_point`.

use super::{ensure_max, Encoder, ProtocolKind};
use crate::{OutputError, Result};

/// DDP header length
pub const HEADER_LEN: usize = 10;
/// Version 1 bits of the flags byte
pub const FLAG_VERSION_1: u8 = 0x40;
/// Push flag: render once this packet arrives
pub const FLAG_PUSH: u8 = 0x01;
/// Default data type byte
pub const DEFAULT_DATA_TYPE: u8 = 0x01;
/// Default output device on the receiver
pub const DEFAULT_DESTINATION_ID: u8 = 0x01;

const MAX_DATA_LEN: usize = u16::MAX as usize;

/// DDP state
#[derive(Debug, Clone)]
pub struct Ddp {
    data_offset: u32,
    push: bool,
    data_type: u8,
    destination_id: u8,
    bytes_per_point: u32,
}

impl Default for Ddp {
    fn default() -> Self {
        Self::new(0, true)
    }
}

impl Ddp {
    /// Packet starting at point `data_offset`
    pub fn new(data_offset: u32, push: bool) -> Self {
        Self {
            data_offset,
            push,
            data_type: DEFAULT_DATA_TYPE,
            destination_id: DEFAULT_DESTINATION_ID,
            bytes_per_point: 3,
        }
    }

    pub fn with_data_type(mut self, data_type: u8) -> Self {
        self.data_type = data_type;
        self
    }

    pub fn with_destination_id(mut self, destination_id: u8) -> Self {
        self.destination_id = destination_id;
        self
    }

    /// Offset of the first point of this packet within the frame, in points
    pub fn data_offset(&self) -> u32 {
        self.data_offset
    }

    /// Offset as written on the wire, in bytes
    pub fn byte_offset(&self) -> u32 {
        self.data_offset.saturating_mul(self.bytes_per_point)
    }

    pub fn push(&self) -> bool {
        self.push
    }

    pub fn data_type(&self) -> u8 {
        self.data_type
    }

    pub fn destination_id(&self) -> u8 {
        self.destination_id
    }

    pub(crate) fn set_data_offset(&mut self, data_offset: u32) -> Result<()> {
        wire_offset(data_offset, self.bytes_per_point)?;
        self.data_offset = data_offset;
        Ok(())
    }

    pub(crate) fn set_push(&mut self, push: bool) {
        self.push = push;
    }
}

/// The byte offset must fit the 32-bit header field
fn wire_offset(data_offset: u32, bytes_per_point: u32) -> Result<u32> {
    data_offset.checked_mul(bytes_per_point).ok_or_else(|| {
        OutputError::InvalidParameter(format!(
            "DDP offset of {} points does not fit in 32 bits at {} bytes per point",
            data_offset, bytes_per_point
        ))
    })
}

impl Encoder for Ddp {
    fn header_len(&self) -> usize {
        HEADER_LEN
    }

    fn validate(&self, data_len: usize) -> Result<()> {
        ensure_max(ProtocolKind::Ddp, data_len, MAX_DATA_LEN)?;
        wire_offset(self.data_offset, self.bytes_per_point)?;
        Ok(())
    }

    fn bind_channels(&mut self, channels: usize) {
        self.bytes_per_point = channels as u32;
    }

    fn write_header(&self, header: &mut [u8], payload_len: usize) {
        header[0] = FLAG_VERSION_1 | if self.push { FLAG_PUSH } else { 0 };
        header[1] = 0x00;
        header[2] = self.data_type;
        header[3] = self.destination_id;
        header[4..8].copy_from_slice(&self.byte_offset().to_be_bytes());
        header[8..10].copy_from_slice(&(payload_len as u16).to_be_bytes());
    }
}
