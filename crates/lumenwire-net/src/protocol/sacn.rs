//! sACN (E1.31) protocol implementation
//!
//! sACN (Streaming ACN) transmits DMX512 over UDP, unicast or multicast.

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use uuid::Uuid;

use super::{ensure_max, Encoder, ProtocolKind, DMX_UNIVERSE_SIZE};
use crate::{error::OutputError, Result};

/// Root + framing + DMP layers, including the DMX start code
pub const HEADER_LEN: usize = 126;
/// Priority byte offset
pub const PRIORITY_OFFSET: usize = 108;
/// Sequence byte offset
pub const SEQUENCE_OFFSET: usize = 111;
/// Universe offset (big-endian)
pub const UNIVERSE_OFFSET: usize = 113;
/// Default priority
pub const DEFAULT_PRIORITY: u8 = 100;
/// Highest legal priority
pub const MAX_PRIORITY: u8 = 200;
/// Highest legal universe
pub const MAX_UNIVERSE: u16 = 63999;
/// Default source name
pub const DEFAULT_SOURCE_NAME: &str = "Lumenwire";

const SACN_PORT: u16 = 5568;
const ACN_PACKET_IDENTIFIER: [u8; 12] = [
    0x41, 0x53, 0x43, 0x2d, 0x45, 0x31, 0x2e, 0x31, 0x37, 0x00, 0x00, 0x00,
];
const VECTOR_ROOT_E131_DATA: u32 = 0x0000_0004;
const VECTOR_E131_DATA_PACKET: u32 = 0x0000_0002;
const VECTOR_DMP_SET_PROPERTY: u8 = 0x02;
const FLAGS: u16 = 0x7000;

/// sACN state for one universe
#[derive(Debug, Clone)]
pub struct Sacn {
    universe: u16,
    sequence: u8,
    priority: u8,
    source_name: String,
    cid: [u8; 16], // Component ID (UUID)
    min_channels: usize,
    fixed_channels: BTreeMap<u16, u8>,
}

impl Sacn {
    /// sACN for a universe (1-63999)
    pub fn new(universe: u16) -> Result<Self> {
        validate_universe(universe)?;

        Ok(Self {
            universe,
            sequence: 0,
            priority: DEFAULT_PRIORITY,
            source_name: DEFAULT_SOURCE_NAME.to_string(),
            cid: *Uuid::new_v4().as_bytes(),
            min_channels: 0,
            fixed_channels: BTreeMap::new(),
        })
    }

    /// Source name (truncated to 63 bytes on the wire)
    pub fn with_source_name(mut self, name: &str) -> Self {
        self.source_name = name.to_string();
        self
    }

    /// Fixed component id instead of a random one
    pub fn with_cid(mut self, cid: [u8; 16]) -> Self {
        self.cid = cid;
        self
    }

    /// Priority (0-200, default 100)
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.min(MAX_PRIORITY);
        self
    }

    /// Reserve at least `channels` DMX slots so direct channel writes beyond
    /// the point data have somewhere to land
    pub fn with_channel_count(mut self, channels: usize) -> Self {
        self.min_channels = channels;
        self
    }

    /// Get the current universe
    pub fn universe(&self) -> u16 {
        self.universe
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn cid(&self) -> &[u8; 16] {
        &self.cid
    }

    /// Directly addressed DMX channels, 1-based
    pub fn fixed_channels(&self) -> &BTreeMap<u16, u8> {
        &self.fixed_channels
    }

    pub(crate) fn set_universe(&mut self, universe: u16) -> Result<()> {
        validate_universe(universe)?;
        self.universe = universe;
        Ok(())
    }

    pub(crate) fn set_priority(&mut self, priority: u8) {
        self.priority = priority.min(MAX_PRIORITY);
    }

    pub(crate) fn set_fixed_channel(&mut self, channel: u16, value: u8, payload_len: usize) -> Result<()> {
        if channel == 0 || channel as usize > payload_len {
            return Err(OutputError::InvalidParameter(format!(
                "DMX channel {} outside 1-{}",
                channel, payload_len
            )));
        }
        self.fixed_channels.insert(channel, value);
        Ok(())
    }

    pub(crate) fn clear_fixed_channel(&mut self, channel: u16) -> Option<u8> {
        self.fixed_channels.remove(&channel)
    }

    /// Multicast group for a universe: 239.255.hi.lo:5568
    pub fn multicast_addr(universe: u16) -> SocketAddr {
        let [hi, lo] = universe.to_be_bytes();
        SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(239, 255, hi, lo), SACN_PORT))
    }
}

fn validate_universe(universe: u16) -> Result<()> {
    if universe == 0 || universe > MAX_UNIVERSE {
        return Err(OutputError::InvalidParameter(format!(
            "Invalid sACN universe: {} (must be 1-{})",
            universe, MAX_UNIVERSE
        )));
    }
    Ok(())
}

impl Encoder for Sacn {
    fn header_len(&self) -> usize {
        HEADER_LEN
    }

    fn payload_len(&self, data_len: usize) -> usize {
        data_len.max(self.min_channels).min(DMX_UNIVERSE_SIZE)
    }

    fn validate(&self, data_len: usize) -> Result<()> {
        ensure_max(ProtocolKind::Sacn, data_len, DMX_UNIVERSE_SIZE)
    }

    fn write_header(&self, header: &mut [u8], payload_len: usize) {
        let total = HEADER_LEN + payload_len;

        // Root Layer
        let mut offset = 0;

        // Preamble Size
        header[offset..offset + 2].copy_from_slice(&0x0010u16.to_be_bytes());
        offset += 2;

        // Post-amble Size
        header[offset..offset + 2].copy_from_slice(&0x0000u16.to_be_bytes());
        offset += 2;

        header[offset..offset + 12].copy_from_slice(&ACN_PACKET_IDENTIFIER);
        offset += 12;

        // Flags and Length: everything after the preamble
        header[offset..offset + 2].copy_from_slice(&(FLAGS | (total - 16) as u16).to_be_bytes());
        offset += 2;

        header[offset..offset + 4].copy_from_slice(&VECTOR_ROOT_E131_DATA.to_be_bytes());
        offset += 4;

        header[offset..offset + 16].copy_from_slice(&self.cid);
        offset += 16;

        // Framing Layer
        header[offset..offset + 2].copy_from_slice(&(FLAGS | (total - 38) as u16).to_be_bytes());
        offset += 2;

        header[offset..offset + 4].copy_from_slice(&VECTOR_E131_DATA_PACKET.to_be_bytes());
        offset += 4;

        // Source Name (64 bytes, null-terminated)
        let name_field = &mut header[offset..offset + 64];
        name_field.fill(0);
        let source_bytes = self.source_name.as_bytes();
        let copy_len = source_bytes.len().min(63);
        name_field[..copy_len].copy_from_slice(&source_bytes[..copy_len]);
        offset += 64;

        header[offset] = self.priority;
        offset += 1;

        // Synchronization Address - 0 for no sync
        header[offset..offset + 2].copy_from_slice(&0x0000u16.to_be_bytes());
        offset += 2;

        header[offset] = self.sequence;
        offset += 1;

        // Options
        header[offset] = 0;
        offset += 1;

        header[offset..offset + 2].copy_from_slice(&self.universe.to_be_bytes());
        offset += 2;

        // DMP Layer
        header[offset..offset + 2].copy_from_slice(&(FLAGS | (total - 115) as u16).to_be_bytes());
        offset += 2;

        header[offset] = VECTOR_DMP_SET_PROPERTY;
        offset += 1;

        // Address Type & Data Type
        header[offset] = 0xa1;
        offset += 1;

        // First Property Address
        header[offset..offset + 2].copy_from_slice(&0x0000u16.to_be_bytes());
        offset += 2;

        // Address Increment
        header[offset..offset + 2].copy_from_slice(&0x0001u16.to_be_bytes());
        offset += 2;

        // Property value count: start code + channels
        header[offset..offset + 2].copy_from_slice(&((payload_len + 1) as u16).to_be_bytes());
        offset += 2;

        // DMX Start Code
        header[offset] = 0x00;
    }

    fn finish_frame(&mut self, header: &mut [u8], payload: &mut [u8]) {
        for (&channel, &value) in &self.fixed_channels {
            if let Some(slot) = payload.get_mut(channel as usize - 1) {
                *slot = value;
            }
        }
        header[SEQUENCE_OFFSET] = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);
    }
}
