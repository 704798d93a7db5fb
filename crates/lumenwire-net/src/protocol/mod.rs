//! Wire protocols
//!
//! Each protocol owns a fixed header layout in front of the point payload of
//! a [`crate::Packet`] buffer.
//!
//! ## Art-Net
//!
//! - 18-byte OpDmx header, payload padded to an even length
//! - Optional sequence counter that never emits 0
//!
//! ## OPC
//!
//! - 4-byte header: channel, command, big-endian length
//! - Also used by the TCP [`crate::StreamOutput`]
//!
//! ## DDP
//!
//! - 10-byte header with push flag and data offset for multi-packet frames
//!
//! ## KiNET
//!
//! - PORTOUT (24 bytes) or DMXOUT (21 bytes) header, always 512 payload bytes
//!
//! ## sACN (E1.31)
//!
//! - 126-byte root/framing/DMP header, up to 512 payload bytes
//! - Priority, sequence number and direct DMX channel writes

pub mod artnet;
pub mod ddp;
pub mod kinet;
pub mod opc;
pub mod sacn;

pub use artnet::ArtNet;
pub use ddp::Ddp;
pub use kinet::Kinet;
pub use opc::Opc;
pub use sacn::Sacn;

use std::fmt;

use crate::{error::OutputError, Result};

/// Largest payload a DMX-derived protocol can carry
pub const DMX_UNIVERSE_SIZE: usize = 512;

/// Header layout behaviour shared by every protocol
pub trait Encoder {
    /// Bytes in front of the payload
    fn header_len(&self) -> usize;

    /// Payload bytes for `data_len` bytes of point data
    fn payload_len(&self, data_len: usize) -> usize {
        data_len
    }

    /// Reject point data this protocol cannot carry
    fn validate(&self, data_len: usize) -> Result<()>;

    /// Told the bytes per point of the owning packet
    fn bind_channels(&mut self, _channels: usize) {}

    /// Write the complete header for a payload of `payload_len` bytes
    fn write_header(&self, header: &mut [u8], payload_len: usize);

    /// Per-frame updates once the payload has been stamped
    fn finish_frame(&mut self, _header: &mut [u8], _payload: &mut [u8]) {}
}

/// Protocol discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolKind {
    ArtNet,
    Opc,
    Ddp,
    Kinet,
    Sacn,
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ArtNet => write!(f, "Art-Net"),
            Self::Opc => write!(f, "OPC"),
            Self::Ddp => write!(f, "DDP"),
            Self::Kinet => write!(f, "KiNET"),
            Self::Sacn => write!(f, "sACN"),
        }
    }
}

/// A protocol and its per-packet state
#[derive(Debug, Clone)]
pub enum Protocol {
    ArtNet(ArtNet),
    Opc(Opc),
    Ddp(Ddp),
    Kinet(Kinet),
    Sacn(Sacn),
}

impl Protocol {
    /// Discriminant
    pub fn kind(&self) -> ProtocolKind {
        match self {
            Self::ArtNet(_) => ProtocolKind::ArtNet,
            Self::Opc(_) => ProtocolKind::Opc,
            Self::Ddp(_) => ProtocolKind::Ddp,
            Self::Kinet(_) => ProtocolKind::Kinet,
            Self::Sacn(_) => ProtocolKind::Sacn,
        }
    }

    fn encoder(&self) -> &dyn Encoder {
        match self {
            Self::ArtNet(p) => p,
            Self::Opc(p) => p,
            Self::Ddp(p) => p,
            Self::Kinet(p) => p,
            Self::Sacn(p) => p,
        }
    }

    fn encoder_mut(&mut self) -> &mut dyn Encoder {
        match self {
            Self::ArtNet(p) => p,
            Self::Opc(p) => p,
            Self::Ddp(p) => p,
            Self::Kinet(p) => p,
            Self::Sacn(p) => p,
        }
    }
}

impl Encoder for Protocol {
    fn header_len(&self) -> usize {
        self.encoder().header_len()
    }

    fn payload_len(&self, data_len: usize) -> usize {
        self.encoder().payload_len(data_len)
    }

    fn validate(&self, data_len: usize) -> Result<()> {
        self.encoder().validate(data_len)
    }

    fn bind_channels(&mut self, channels: usize) {
        self.encoder_mut().bind_channels(channels)
    }

    fn write_header(&self, header: &mut [u8], payload_len: usize) {
        self.encoder().write_header(header, payload_len)
    }

    fn finish_frame(&mut self, header: &mut [u8], payload: &mut [u8]) {
        self.encoder_mut().finish_frame(header, payload)
    }
}

pub(crate) fn ensure_max(kind: ProtocolKind, data_len: usize, max: usize) -> Result<()> {
    if data_len > max {
        return Err(OutputError::InvalidParameter(format!(
            "{} payload of {} bytes exceeds {} bytes",
            kind, data_len, max
        )));
    }
    Ok(())
}

impl From<ArtNet> for Protocol {
    fn from(p: ArtNet) -> Self {
        Self::ArtNet(p)
    }
}

impl From<Opc> for Protocol {
    fn from(p: Opc) -> Self {
        Self::Opc(p)
    }
}

impl From<Ddp> for Protocol {
    fn from(p: Ddp) -> Self {
        Self::Ddp(p)
    }
}

impl From<Kinet> for Protocol {
    fn from(p: Kinet) -> Self {
        Self::Kinet(p)
    }
}

impl From<Sacn> for Protocol {
    fn from(p: Sacn) -> Self {
        Self::Sacn(p)
    }
}
