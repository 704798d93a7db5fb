//! Open Pixel Control
//!
//! `[channel, command, length_hi, length_lo, data...]`. The same layout is
//! sent as a UDP datagram or written to a TCP stream.

use super::{ensure_max, Encoder, ProtocolKind};
use crate::Result;

/// OPC header length
pub const HEADER_LEN: usize = 4;
/// Set pixel colors command
pub const COMMAND_SET_PIXEL_COLORS: u8 = 0x00;
/// Channel 0 addresses every channel on the server
pub const CHANNEL_BROADCAST: u8 = 0;

const MAX_DATA_LEN: usize = u16::MAX as usize;

/// OPC state
#[derive(Debug, Clone, Default)]
pub struct Opc {
    channel: u8,
}

impl Opc {
    pub fn new(channel: u8) -> Self {
        Self { channel }
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub(crate) fn set_channel(&mut self, channel: u8) {
        self.channel = channel;
    }
}

impl Encoder for Opc {
    fn header_len(&self) -> usize {
        HEADER_LEN
    }

    fn validate(&self, data_len: usize) -> Result<()> {
        ensure_max(ProtocolKind::Opc, data_len, MAX_DATA_LEN)
    }

    fn write_header(&self, header: &mut [u8], payload_len: usize) {
        header[0] = self.channel;
        header[1] = COMMAND_SET_PIXEL_COLORS;
        header[2..4].copy_from_slice(&(payload_len as u16).to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opc_header() {
        let opc = Opc::new(3);
        let mut header = [0xffu8; HEADER_LEN];
        opc.write_header(&mut header, 300);
        assert_eq!(header, [3, 0x00, 0x01, 0x2c]);
    }

    #[test]
    fn test_opc_limits() {
        let opc = Opc::default();
        assert_eq!(opc.channel(), CHANNEL_BROADCAST);
        assert!(opc.validate(65535).is_ok());
        assert!(opc.validate(65536).is_err());
    }
}
