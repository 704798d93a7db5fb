//! Color Kinetics KiNET
//!
//! Two header flavours share the `04 01 dc 4a` magic and are always followed
//! by a full 512-byte payload; short point lists are zero-padded.
//!
//! PORTOUT (v2, 24 bytes): version, type `0x0108`, sequence, universe
//! `0xffffffff`, power-supply port, padding, flags, length `0x0200` (LE),
//! start code.
//!
//! DMXOUT (v1, 21 bytes): version, type `0x0101`, sequence, port, flags,
//! timer, universe placeholder `0xffffffff`, start code.

pub use lumenwire_core::KinetVariant;

use super::{ensure_max, Encoder, ProtocolKind, DMX_UNIVERSE_SIZE};
use crate::Result;

/// PORTOUT header length
pub const PORTOUT_HEADER_LEN: usize = 24;
/// DMXOUT header length
pub const DMXOUT_HEADER_LEN: usize = 21;
/// Byte offset of the port number in a PORTOUT header
pub const PORTOUT_PORT_OFFSET: usize = 16;

const MAGIC: [u8; 4] = [0x04, 0x01, 0xdc, 0x4a];

/// KiNET state
#[derive(Debug, Clone)]
pub struct Kinet {
    variant: KinetVariant,
    port: u8,
}

impl Kinet {
    /// PORTOUT to a power-supply output port
    pub fn port_out(port: u8) -> Self {
        Self {
            variant: KinetVariant::PortOut,
            port,
        }
    }

    /// DMXOUT; the power supply is addressed by IP alone
    pub fn dmx_out() -> Self {
        Self {
            variant: KinetVariant::DmxOut,
            port: 0,
        }
    }

    pub fn variant(&self) -> KinetVariant {
        self.variant
    }

    pub fn port(&self) -> u8 {
        self.port
    }

    pub(crate) fn set_port(&mut self, port: u8) {
        self.port = port;
    }
}

impl Encoder for Kinet {
    fn header_len(&self) -> usize {
        match self.variant {
            KinetVariant::PortOut => PORTOUT_HEADER_LEN,
            KinetVariant::DmxOut => DMXOUT_HEADER_LEN,
        }
    }

    fn payload_len(&self, _data_len: usize) -> usize {
        DMX_UNIVERSE_SIZE
    }

    fn validate(&self, data_len: usize) -> Result<()> {
        ensure_max(ProtocolKind::Kinet, data_len, DMX_UNIVERSE_SIZE)
    }

    fn write_header(&self, header: &mut [u8], payload_len: usize) {
        header[0..4].copy_from_slice(&MAGIC);
        match self.variant {
            KinetVariant::PortOut => {
                header[4..6].copy_from_slice(&[0x02, 0x00]); // version
                header[6..8].copy_from_slice(&[0x08, 0x01]); // type
                header[8..12].fill(0x00); // sequence
                header[12..16].fill(0xff); // universe
                header[PORTOUT_PORT_OFFSET] = self.port;
                header[17] = 0x00; // pad
                header[18..20].fill(0x00); // flags
                header[20..22].copy_from_slice(&(payload_len as u16).to_le_bytes());
                header[22..24].fill(0x00); // start code
            }
            KinetVariant::DmxOut => {
                header[4..6].copy_from_slice(&[0x01, 0x00]);
                header[6..8].copy_from_slice(&[0x01, 0x01]);
                header[8..12].fill(0x00); // sequence
                header[12] = 0x00; // port
                header[13] = 0x00; // flags
                header[14..16].fill(0x00); // timer
                header[16..20].fill(0xff); // universe
                header[20] = 0x00; // start code
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_portout_header() {
        let kinet = Kinet::port_out(7);
        let mut header = [0u8; PORTOUT_HEADER_LEN];
        kinet.write_header(&mut header, kinet.payload_len(30));
        assert_eq!(
            header,
            [
                0x04, 0x01, 0xdc, 0x4a, 0x02, 0x00, 0x08, 0x01, 0, 0, 0, 0, 0xff, 0xff, 0xff, 0xff,
                7, 0, 0, 0, 0x00, 0x02, 0, 0
            ]
        );
    }

    #[test]
    fn test_dmxout_header() {
        let kinet = Kinet::dmx_out();
        assert_eq!(kinet.header_len(), DMXOUT_HEADER_LEN);
        let mut header = [0u8; DMXOUT_HEADER_LEN];
        kinet.write_header(&mut header, 512);
        assert_eq!(&header[0..4], &MAGIC);
        assert_eq!(&header[4..8], &[0x01, 0x00, 0x01, 0x01]);
        assert_eq!(&header[16..20], &[0xff; 4]);
        assert_eq!(header[20], 0);
    }

    #[test]
    fn test_fixed_payload() {
        let kinet = Kinet::port_out(1);
        assert_eq!(kinet.payload_len(3), 512);
        assert!(kinet.validate(513).is_err());
    }
}
