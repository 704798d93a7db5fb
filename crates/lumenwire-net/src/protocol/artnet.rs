//! Art-Net protocol implementation (Art-Net 4)
//!
//! Art-Net is a UDP-based protocol for transmitting DMX512 over Ethernet.

use super::{ensure_max, Encoder, ProtocolKind, DMX_UNIVERSE_SIZE};
use crate::{error::OutputError, Result};

/// OpDmx header length
pub const HEADER_LEN: usize = 18;
/// ArtSync packet length
pub const SYNC_LEN: usize = 14;
/// Highest 15-bit Port-Address
pub const MAX_UNIVERSE: u16 = 0x7fff;

const ID: &[u8; 8] = b"Art-Net\0";
const OP_DMX: u16 = 0x5000;
const OP_SYNC: u16 = 0x5200;
const PROTOCOL_VERSION: u16 = 14;

/// Art-Net OpDmx state for one universe
#[derive(Debug, Clone)]
pub struct ArtNet {
    universe: u16,
    sequence_enabled: bool,
    sequence: u8,
}

impl ArtNet {
    /// OpDmx for a universe (Port-Address 0-32767)
    pub fn new(universe: u16) -> Result<Self> {
        validate_universe(universe)?;
        Ok(Self {
            universe,
            sequence_enabled: false,
            sequence: 1,
        })
    }

    /// Enable or disable the sequence counter
    pub fn with_sequence(mut self, enabled: bool) -> Self {
        self.sequence_enabled = enabled;
        self
    }

    /// Get the current universe
    pub fn universe(&self) -> u16 {
        self.universe
    }

    pub(crate) fn set_universe(&mut self, universe: u16) -> Result<()> {
        validate_universe(universe)?;
        self.universe = universe;
        Ok(())
    }

    /// Whether sequencing is on
    pub fn sequence_enabled(&self) -> bool {
        self.sequence_enabled
    }

    pub(crate) fn set_sequence_enabled(&mut self, enabled: bool) {
        self.sequence_enabled = enabled;
    }

    /// Sequence number the next frame will carry
    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    /// Step the counter, wrapping 255 -> 1 (0 means "sequencing disabled")
    pub fn advance_sequence(&mut self) {
        self.sequence = match self.sequence {
            u8::MAX => 1,
            n => n + 1,
        };
    }
}

fn validate_universe(universe: u16) -> Result<()> {
    if universe > MAX_UNIVERSE {
        return Err(OutputError::InvalidParameter(format!(
            "Invalid Art-Net universe: {} (must be 0-{})",
            universe, MAX_UNIVERSE
        )));
    }
    Ok(())
}

impl Encoder for ArtNet {
    fn header_len(&self) -> usize {
        HEADER_LEN
    }

    /// Art-Net requires an even data length
    fn payload_len(&self, data_len: usize) -> usize {
        data_len + (data_len & 1)
    }

    fn validate(&self, data_len: usize) -> Result<()> {
        ensure_max(ProtocolKind::ArtNet, data_len, DMX_UNIVERSE_SIZE)
    }

    fn write_header(&self, header: &mut [u8], payload_len: usize) {
        // Header: "Art-Net\0"
        header[0..8].copy_from_slice(ID);

        // OpCode: OpDmx (little-endian)
        header[8..10].copy_from_slice(&OP_DMX.to_le_bytes());

        // Protocol version (14)
        header[10..12].copy_from_slice(&PROTOCOL_VERSION.to_be_bytes());

        header[12] = if self.sequence_enabled {
            self.sequence
        } else {
            0
        };

        // Physical
        header[13] = 0;

        // Universe (Port-Address, little-endian)
        header[14..16].copy_from_slice(&self.universe.to_le_bytes());

        // Length (big-endian)
        header[16..18].copy_from_slice(&(payload_len as u16).to_be_bytes());
    }

    fn finish_frame(&mut self, header: &mut [u8], _payload: &mut [u8]) {
        if self.sequence_enabled {
            header[12] = self.sequence;
            self.advance_sequence();
        } else {
            header[12] = 0;
        }
    }
}

/// Build an ArtSync packet
pub fn sync_packet() -> [u8; SYNC_LEN] {
    let mut packet = [0u8; SYNC_LEN];
    packet[0..8].copy_from_slice(ID);
    packet[8..10].copy_from_slice(&OP_SYNC.to_le_bytes());
    packet[10..12].copy_from_slice(&PROTOCOL_VERSION.to_be_bytes());
    // Aux1, Aux2 stay zero
    packet
}
