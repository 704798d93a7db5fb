//! Outbound packets
//!
//! A [`Packet`] owns one fixed-size datagram buffer (protocol header followed
//! by the point payload), the index map that fills the payload and the
//! destination it is sent to. The buffer is allocated once; each frame only
//! restamps the payload.

use lumenwire_core::{
    color::{self, Argb},
    ByteOrder, GammaTable, IndexMap, KinetVariant,
};
use std::net::{SocketAddr, ToSocketAddrs};

use crate::error::OutputError;
use crate::protocol::{ArtNet, Ddp, Encoder, Kinet, Opc, Protocol, ProtocolKind, Sacn};
use crate::registry::{DestinationRegistry, ErrorHandle, ErrorState};
use crate::Result;

/// Why a packet or stream was not sent this frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Turned off
    Disabled,
    /// No resolved destination
    Unresolved,
    /// Destination is waiting out a backoff window
    Backoff,
}

/// Result of one send attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    Skipped(SkipReason),
    Failed,
}

/// Where a packet goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    host: String,
    port: u16,
    addr: Option<SocketAddr>,
}

impl Destination {
    /// Host as configured
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Resolved address
    pub fn addr(&self) -> Option<SocketAddr> {
        self.addr
    }
}

/// Resolve `host:port` to the first address the resolver returns
pub fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let mut addrs = (host, port)
        .to_socket_addrs()
        .map_err(|e| OutputError::Resolve {
            host: host.to_string(),
            reason: e.to_string(),
        })?;
    addrs.next().ok_or_else(|| OutputError::Resolve {
        host: host.to_string(),
        reason: "no addresses".to_string(),
    })
}

/// One outbound datagram
#[derive(Debug, Clone)]
pub struct Packet {
    protocol: Protocol,
    buffer: Vec<u8>,
    indices: IndexMap,
    byte_order: ByteOrder,
    destination: Option<Destination>,
    enabled: bool,
    brightness: f32,
    error: bool,
    resolve_error: Option<String>,
    error_state: Option<ErrorHandle>,
    last_outcome: Option<SendOutcome>,
}

impl Packet {
    /// Allocate a packet for `indices` in `byte_order`.
    ///
    /// The payload size is fixed here; changing the wiring means building a
    /// new packet.
    pub fn new(protocol: impl Into<Protocol>, indices: IndexMap, byte_order: ByteOrder) -> Result<Self> {
        let mut protocol = protocol.into();
        let data_len = indices.len() * byte_order.num_channels();
        protocol.bind_channels(byte_order.num_channels());
        protocol.validate(data_len)?;

        let header_len = protocol.header_len();
        let payload_len = protocol.payload_len(data_len);
        let mut buffer = vec![0u8; header_len + payload_len];
        protocol.write_header(&mut buffer[..header_len], payload_len);

        Ok(Self {
            protocol,
            buffer,
            indices,
            byte_order,
            destination: None,
            enabled: true,
            brightness: 1.0,
            error: false,
            resolve_error: None,
            error_state: None,
            last_outcome: None,
        })
    }

    /// Art-Net OpDmx for `universe`
    pub fn artnet(universe: u16, indices: IndexMap, byte_order: ByteOrder) -> Result<Self> {
        Self::new(ArtNet::new(universe)?, indices, byte_order)
    }

    /// OPC on `channel`
    pub fn opc(channel: u8, indices: IndexMap, byte_order: ByteOrder) -> Result<Self> {
        Self::new(Opc::new(channel), indices, byte_order)
    }

    /// DDP starting at point `data_offset`
    pub fn ddp(data_offset: u32, push: bool, indices: IndexMap, byte_order: ByteOrder) -> Result<Self> {
        Self::new(Ddp::new(data_offset, push), indices, byte_order)
    }

    /// KiNET in the given flavour
    pub fn kinet(variant: KinetVariant, port: u8, indices: IndexMap, byte_order: ByteOrder) -> Result<Self> {
        let kinet = match variant {
            KinetVariant::PortOut => Kinet::port_out(port),
            KinetVariant::DmxOut => Kinet::dmx_out(),
        };
        Self::new(kinet, indices, byte_order)
    }

    /// sACN for `universe`
    pub fn sacn(universe: u16, indices: IndexMap, byte_order: ByteOrder) -> Result<Self> {
        Self::new(Sacn::new(universe)?, indices, byte_order)
    }

    /// Resolve and set the destination, consuming and returning the packet
    pub fn with_destination(mut self, host: &str, port: u16) -> Result<Self> {
        self.set_destination(host, port)?;
        Ok(self)
    }

    /// Resolve and set the destination.
    ///
    /// On failure the packet is disabled and keeps the error until a
    /// destination resolves, which enables it again. A packet disabled
    /// through [`Packet::set_enabled`] stays disabled.
    pub fn set_destination(&mut self, host: &str, port: u16) -> Result<()> {
        match resolve(host, port) {
            Ok(addr) => {
                self.destination = Some(Destination {
                    host: host.to_string(),
                    port,
                    addr: Some(addr),
                });
                self.clear_resolve_error();
                self.error_state = None;
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Disabling {} packet: {}", self.kind(), e);
                self.destination = Some(Destination {
                    host: host.to_string(),
                    port,
                    addr: None,
                });
                self.enabled = false;
                self.resolve_error = Some(e.to_string());
                self.error_state = None;
                Err(e)
            }
        }
    }

    /// Set an already-resolved destination
    pub fn set_addr(&mut self, addr: SocketAddr) {
        self.destination = Some(Destination {
            host: addr.ip().to_string(),
            port: addr.port(),
            addr: Some(addr),
        });
        self.clear_resolve_error();
        self.error_state = None;
    }

    fn clear_resolve_error(&mut self) {
        if self.resolve_error.take().is_some() {
            self.enabled = true;
        }
    }

    /// Change only the port, keeping the host
    pub fn set_port(&mut self, port: u16) -> Result<()> {
        let host = match &self.destination {
            Some(d) => d.host.clone(),
            None => {
                return Err(OutputError::InvalidParameter(
                    "Packet has no destination host".to_string(),
                ))
            }
        };
        self.set_destination(&host, port)
    }

    pub fn destination(&self) -> Option<&Destination> {
        self.destination.as_ref()
    }

    /// Resolved destination address
    pub fn addr(&self) -> Option<SocketAddr> {
        self.destination.as_ref().and_then(|d| d.addr)
    }

    /// Message of the last failed resolution, if it still applies
    pub fn resolve_error(&self) -> Option<&str> {
        self.resolve_error.as_deref()
    }

    pub fn kind(&self) -> ProtocolKind {
        self.protocol.kind()
    }

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    pub fn indices(&self) -> &IndexMap {
        &self.indices
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// Change the byte order; the channel count must match the buffer
    pub fn set_byte_order(&mut self, byte_order: ByteOrder) -> Result<()> {
        self.byte_order.ensure_compatible(byte_order)?;
        self.byte_order = byte_order;
        Ok(())
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn brightness(&self) -> f32 {
        self.brightness
    }

    /// Packet brightness (0.0-1.0), applied on top of the output's
    pub fn set_brightness(&mut self, brightness: f32) {
        self.brightness = brightness.clamp(0.0, 1.0);
    }

    /// Whether the destination is failing
    pub fn error(&self) -> bool {
        self.error
    }

    /// Consecutive failures of the destination (shared with other packets)
    pub fn consecutive_failures(&self) -> u32 {
        self.error_state
            .as_ref()
            .map_or(0, |h| h.lock().consecutive_failures())
    }

    /// Lifetime failures of the destination
    pub fn total_failures(&self) -> u64 {
        self.error_state
            .as_ref()
            .map_or(0, |h| h.lock().total_failures())
    }

    pub fn last_outcome(&self) -> Option<SendOutcome> {
        self.last_outcome
    }

    /// Whole datagram
    pub fn bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Header region
    pub fn header(&self) -> &[u8] {
        &self.buffer[..self.protocol.header_len()]
    }

    /// Payload region
    pub fn payload(&self) -> &[u8] {
        &self.buffer[self.protocol.header_len()..]
    }

    fn payload_len(&self) -> usize {
        self.buffer.len() - self.protocol.header_len()
    }

    fn rewrite_header(&mut self) {
        let header_len = self.protocol.header_len();
        let payload_len = self.payload_len();
        self.protocol
            .write_header(&mut self.buffer[..header_len], payload_len);
    }

    /// Stamp this frame's colors into the payload.
    ///
    /// Blank and out-of-range index entries are written as zero. Every
    /// channel goes through the gamma table row for this packet's brightness.
    pub fn stamp(&mut self, colors: &[Argb], gamma: &GammaTable) {
        let header_len = self.protocol.header_len();
        let channels = self.byte_order.num_channels();
        let lut = gamma.row(GammaTable::level_for(self.brightness));

        let (header, payload) = self.buffer.split_at_mut(header_len);
        for (slot, &entry) in payload
            .chunks_exact_mut(channels)
            .zip(self.indices.as_slice())
        {
            match IndexMap::resolve(entry).and_then(|i| colors.get(i)) {
                Some(&c) => {
                    self.byte_order
                        .write(slot, color::red(c), color::green(c), color::blue(c), lut)
                }
                None => slot.fill(0),
            }
        }

        self.protocol.finish_frame(header, payload);
    }

    // Protocol-specific setters, each rewriting the header in place

    /// Art-Net or sACN universe
    pub fn set_universe(&mut self, universe: u16) -> Result<()> {
        let kind = self.kind();
        match &mut self.protocol {
            Protocol::ArtNet(p) => p.set_universe(universe)?,
            Protocol::Sacn(p) => p.set_universe(universe)?,
            _ => return Err(unsupported(kind, "universe")),
        }
        self.rewrite_header();
        Ok(())
    }

    /// OPC channel
    pub fn set_channel(&mut self, channel: u8) -> Result<()> {
        let kind = self.kind();
        match &mut self.protocol {
            Protocol::Opc(p) => p.set_channel(channel),
            _ => return Err(unsupported(kind, "channel")),
        }
        self.rewrite_header();
        Ok(())
    }

    /// DDP data offset, in points
    pub fn set_data_offset(&mut self, data_offset: u32) -> Result<()> {
        let kind = self.kind();
        match &mut self.protocol {
            Protocol::Ddp(p) => p.set_data_offset(data_offset)?,
            _ => return Err(unsupported(kind, "data offset")),
        }
        self.rewrite_header();
        Ok(())
    }

    /// DDP push flag
    pub fn set_push(&mut self, push: bool) -> Result<()> {
        let kind = self.kind();
        match &mut self.protocol {
            Protocol::Ddp(p) => p.set_push(push),
            _ => return Err(unsupported(kind, "push flag")),
        }
        self.rewrite_header();
        Ok(())
    }

    /// KiNET PORTOUT port
    pub fn set_kinet_port(&mut self, port: u8) -> Result<()> {
        let kind = self.kind();
        match &mut self.protocol {
            Protocol::Kinet(p) if p.variant() == KinetVariant::PortOut => p.set_port(port),
            _ => return Err(unsupported(kind, "KiNET port")),
        }
        self.rewrite_header();
        Ok(())
    }

    /// sACN priority
    pub fn set_priority(&mut self, priority: u8) -> Result<()> {
        let kind = self.kind();
        match &mut self.protocol {
            Protocol::Sacn(p) => p.set_priority(priority),
            _ => return Err(unsupported(kind, "priority")),
        }
        self.rewrite_header();
        Ok(())
    }

    /// Art-Net sequence counter on/off
    pub fn set_sequence_enabled(&mut self, enabled: bool) -> Result<()> {
        let kind = self.kind();
        match &mut self.protocol {
            Protocol::ArtNet(p) => p.set_sequence_enabled(enabled),
            _ => return Err(unsupported(kind, "sequence")),
        }
        self.rewrite_header();
        Ok(())
    }

    /// Pin a 1-based sACN DMX channel to a value, overriding point data
    pub fn set_dmx_channel(&mut self, channel: u16, value: u8) -> Result<()> {
        let payload_len = self.payload_len();
        let kind = self.kind();
        match &mut self.protocol {
            Protocol::Sacn(p) => p.set_fixed_channel(channel, value, payload_len),
            _ => Err(unsupported(kind, "DMX channel")),
        }
    }

    /// Release a pinned sACN channel
    pub fn clear_dmx_channel(&mut self, channel: u16) -> Result<Option<u8>> {
        let kind = self.kind();
        match &mut self.protocol {
            Protocol::Sacn(p) => Ok(p.clear_fixed_channel(channel)),
            _ => Err(unsupported(kind, "DMX channel")),
        }
    }

    /// Registry state for the current destination, looked up once per address
    pub(crate) fn error_handle(&mut self, registry: &DestinationRegistry) -> Option<ErrorHandle> {
        let addr = self.addr()?;
        Some(
            self.error_state
                .get_or_insert_with(|| registry.handle(addr))
                .clone(),
        )
    }

    pub(crate) fn record(&mut self, outcome: SendOutcome, state: &ErrorState) {
        self.last_outcome = Some(outcome);
        self.error = state.is_error();
    }

    pub(crate) fn record_skip(&mut self, reason: SkipReason) {
        self.last_outcome = Some(SendOutcome::Skipped(reason));
    }
}

fn unsupported(kind: ProtocolKind, what: &str) -> OutputError {
    OutputError::InvalidParameter(format!("{} packets have no {}", kind, what))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumenwire_core::color::rgb;
    use lumenwire_core::gamma::LINEAR;

    #[test]
    fn test_artnet_universe_scenario() {
        let mut packet = Packet::artnet(3, IndexMap::range(0, 6), ByteOrder::Rgb).unwrap();
        let colors: Vec<Argb> = (0..6).map(|i| rgb(i, i + 10, i + 20)).collect();
        packet.stamp(&colors, &LINEAR);

        let bytes = packet.bytes();
        assert_eq!(bytes.len(), 18 + 18);
        assert_eq!(&bytes[14..16], &[3, 0]);
        assert_eq!(u16::from_be_bytes([bytes[16], bytes[17]]), 18);
        assert_eq!(&packet.payload()[..6], &[0, 10, 20, 1, 11, 21]);
    }

    #[test]
    fn test_blank_and_out_of_range_indices() {
        let mut packet = Packet::opc(0, IndexMap::new(vec![0, -1, 99]), ByteOrder::Rgb).unwrap();
        packet.stamp(&[rgb(1, 2, 3)], &LINEAR);
        assert_eq!(packet.payload(), &[1, 2, 3, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_grb_and_rgbw_payloads() {
        let colors = [0x1122_3344];
        let mut grb = Packet::opc(0, IndexMap::range(0, 1), ByteOrder::Grb).unwrap();
        grb.stamp(&colors, &LINEAR);
        assert_eq!(grb.payload(), &[0x33, 0x22, 0x44]);

        let mut rgbw = Packet::opc(0, IndexMap::range(0, 1), ByteOrder::Rgbw).unwrap();
        rgbw.stamp(&colors, &LINEAR);
        assert_eq!(rgbw.payload(), &[0x00, 0x11, 0x22, 0x22]);
        assert_eq!(&rgbw.header()[2..4], &[0, 4]);
    }

    #[test]
    fn test_packet_brightness_uses_gamma_row() {
        let mut packet = Packet::opc(0, IndexMap::range(0, 1), ByteOrder::Rgb).unwrap();
        packet.set_brightness(0.5);
        packet.stamp(&[rgb(255, 100, 0)], &LINEAR);
        assert_eq!(packet.payload(), &[128, 50, 0]);
    }

    #[test]
    fn test_byte_order_channel_count_enforced() {
        let mut packet = Packet::opc(0, IndexMap::range(0, 2), ByteOrder::Rgb).unwrap();
        assert!(packet.set_byte_order(ByteOrder::Bgr).is_ok());
        assert!(matches!(
            packet.set_byte_order(ByteOrder::Rgbw),
            Err(OutputError::Core(_))
        ));
        assert_eq!(packet.byte_order(), ByteOrder::Bgr);
    }

    #[test]
    fn test_setters_rewrite_header_in_place() {
        let mut artnet = Packet::artnet(0, IndexMap::range(0, 2), ByteOrder::Rgb).unwrap();
        artnet.set_universe(0x0201).unwrap();
        assert_eq!(&artnet.header()[14..16], &[0x01, 0x02]);
        assert!(artnet.set_channel(1).is_err());

        let mut opc = Packet::opc(0, IndexMap::range(0, 2), ByteOrder::Rgb).unwrap();
        opc.set_channel(9).unwrap();
        assert_eq!(opc.header()[0], 9);

        let mut kinet = Packet::kinet(KinetVariant::PortOut, 1, IndexMap::range(0, 2), ByteOrder::Rgb).unwrap();
        kinet.set_kinet_port(4).unwrap();
        assert_eq!(kinet.header()[16], 4);
        assert_eq!(kinet.payload().len(), 512);

        let mut dmx_out = Packet::kinet(KinetVariant::DmxOut, 0, IndexMap::range(0, 2), ByteOrder::Rgb).unwrap();
        assert!(dmx_out.set_kinet_port(4).is_err());

        let mut ddp = Packet::ddp(0, true, IndexMap::range(0, 2), ByteOrder::Rgb).unwrap();
        ddp.set_data_offset(10).unwrap();
        ddp.set_push(false).unwrap();
        assert_eq!(&ddp.header()[4..8], &30u32.to_be_bytes());
        assert_eq!(ddp.header()[0], 0x40);
    }

    #[test]
    fn test_sacn_dmx_channel_mix() {
        let sacn = Sacn::new(1).unwrap().with_channel_count(10);
        let mut packet = Packet::new(sacn, IndexMap::range(0, 2), ByteOrder::Rgb).unwrap();
        assert_eq!(packet.payload().len(), 10);
        packet.set_dmx_channel(10, 0xee).unwrap();
        assert!(packet.set_dmx_channel(11, 0).is_err());

        packet.stamp(&[rgb(1, 2, 3), rgb(4, 5, 6)], &LINEAR);
        assert_eq!(packet.payload(), &[1, 2, 3, 4, 5, 6, 0, 0, 0, 0xee]);
        assert_eq!(packet.bytes()[125], 0);
    }

    #[test]
    fn test_oversized_dmx_payload_rejected() {
        assert!(Packet::artnet(0, IndexMap::range(0, 171), ByteOrder::Rgb).is_err());
        assert!(Packet::artnet(0, IndexMap::range(0, 170), ByteOrder::Rgb).is_ok());
        assert!(Packet::sacn(1, IndexMap::range(0, 129), ByteOrder::Rgbw).is_err());
    }

    #[test]
    fn test_unresolvable_host_disables_packet() {
        let mut packet = Packet::opc(0, IndexMap::range(0, 1), ByteOrder::Rgb).unwrap();
        let result = packet.set_destination("no-such-host.invalid", 7890);
        assert!(matches!(result, Err(OutputError::Resolve { .. })));
        assert!(!packet.enabled());
        assert!(packet.resolve_error().is_some());
        assert_eq!(packet.addr(), None);

        packet.set_destination("127.0.0.1", 7890).unwrap();
        assert!(packet.enabled());
        assert!(packet.resolve_error().is_none());
    }

    #[test]
    fn test_user_disable_survives_new_destination() {
        let mut packet = Packet::opc(0, IndexMap::range(0, 1), ByteOrder::Rgb).unwrap();
        packet.set_enabled(false);
        packet.set_destination("127.0.0.1", 7890).unwrap();
        assert!(!packet.enabled());
    }

    #[test]
    fn test_ddp_offset_overflow_rejected() {
        let result = Packet::ddp(2_000_000_000, true, IndexMap::range(0, 1), ByteOrder::Rgb);
        assert!(matches!(result, Err(OutputError::InvalidParameter(_))));

        let mut packet = Packet::ddp(0, true, IndexMap::range(0, 1), ByteOrder::Rgbw).unwrap();
        assert!(packet.set_data_offset(1_500_000_000).is_err());
        assert_eq!(&packet.header()[4..8], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_resolves_literal_address() {
        let packet = Packet::opc(0, IndexMap::range(0, 1), ByteOrder::Rgb)
            .unwrap()
            .with_destination("127.0.0.1", 7890)
            .unwrap();
        assert_eq!(packet.addr(), Some("127.0.0.1:7890".parse().unwrap()));
        assert_eq!(packet.destination().unwrap().host(), "127.0.0.1");
    }
}
