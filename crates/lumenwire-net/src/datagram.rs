//! UDP datagram aggregator
//!
//! A [`DatagramOutput`] holds packets sharing one socket. Each frame every
//! enabled packet whose destination is not backing off is restamped and sent;
//! the outcome is folded into the destination's shared error state.

use lumenwire_core::{color::Argb, config::ARTNET_PORT, GammaTable};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use crate::error::OutputError;
use crate::node::{FrameStats, OutputSink};
use crate::packet::{resolve, Packet, SendOutcome, SkipReason};
use crate::protocol::{artnet, ProtocolKind};
use crate::registry::{self, DestinationRegistry, ErrorHandle};
use crate::transport::{self, DatagramSocket};
use crate::Result;

/// ArtSync destination
struct SyncTarget {
    addr: SocketAddr,
    state: ErrorHandle,
}

/// Packets sharing one UDP socket
pub struct DatagramOutput {
    socket: Arc<dyn DatagramSocket>,
    registry: Arc<DestinationRegistry>,
    packets: Vec<Packet>,
    kind: Option<ProtocolKind>,
    sync: Option<SyncTarget>,
    sync_outcome: Option<SendOutcome>,
}

impl DatagramOutput {
    /// Aggregator on the process-wide default socket
    pub fn new(registry: Arc<DestinationRegistry>) -> Result<Self> {
        let socket: Arc<dyn DatagramSocket> = transport::default_socket()?;
        Ok(Self::with_socket(socket, registry))
    }

    /// Aggregator on a caller-supplied socket
    pub fn with_socket(socket: Arc<dyn DatagramSocket>, registry: Arc<DestinationRegistry>) -> Self {
        Self {
            socket,
            registry,
            packets: Vec::new(),
            kind: None,
            sync: None,
            sync_outcome: None,
        }
    }

    /// Only accept packets of `kind`, as chunked outputs require
    pub fn restricted_to(mut self, kind: ProtocolKind) -> Result<Self> {
        if let Some(packet) = self.packets.iter().find(|p| p.kind() != kind) {
            return Err(OutputError::ProtocolMismatch {
                expected: kind,
                actual: packet.kind(),
            });
        }
        self.kind = Some(kind);
        Ok(self)
    }

    /// Protocol restriction, if any
    pub fn kind(&self) -> Option<ProtocolKind> {
        self.kind
    }

    /// Append a packet
    pub fn add_packet(&mut self, packet: Packet) -> Result<()> {
        if let Some(expected) = self.kind {
            if packet.kind() != expected {
                return Err(OutputError::ProtocolMismatch {
                    expected,
                    actual: packet.kind(),
                });
            }
        }
        self.packets.push(packet);
        Ok(())
    }

    pub fn add_packets(&mut self, packets: impl IntoIterator<Item = Packet>) -> Result<()> {
        for packet in packets {
            self.add_packet(packet)?;
        }
        Ok(())
    }

    pub fn packets(&self) -> &[Packet] {
        &self.packets
    }

    pub fn packets_mut(&mut self) -> &mut [Packet] {
        &mut self.packets
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn registry(&self) -> &Arc<DestinationRegistry> {
        &self.registry
    }

    /// Send an ArtSync to `host:port` after every frame that carried Art-Net data
    pub fn set_art_sync(&mut self, host: &str, port: u16) -> Result<()> {
        let addr = resolve(host, port)?;
        self.set_art_sync_addr(addr);
        Ok(())
    }

    pub fn set_art_sync_addr(&mut self, addr: SocketAddr) {
        self.sync = Some(SyncTarget {
            addr,
            state: self.registry.handle(addr),
        });
    }

    /// Parse `host[:port]`, defaulting to the Art-Net port
    pub fn set_art_sync_target(&mut self, target: &str) -> Result<()> {
        let (host, port) = match target.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse().map_err(|_| {
                    OutputError::InvalidParameter(format!("Invalid ArtSync target: {}", target))
                })?;
                (host, port)
            }
            None => (target, ARTNET_PORT),
        };
        self.set_art_sync(host, port)
    }

    pub fn clear_art_sync(&mut self) {
        self.sync = None;
        self.sync_outcome = None;
    }

    pub fn art_sync_addr(&self) -> Option<SocketAddr> {
        self.sync.as_ref().map(|s| s.addr)
    }

    /// Outcome of the last ArtSync, if one was due
    pub fn art_sync_outcome(&self) -> Option<SendOutcome> {
        self.sync_outcome
    }

    /// Stamp and send every packet now
    pub fn send_frame(&mut self, colors: &[Argb], gamma: &GammaTable) -> FrameStats {
        self.send_frame_at(colors, gamma, Instant::now())
    }

    /// Stamp and send every packet at `now`.
    ///
    /// Socket errors never escape; they land in the registry and the
    /// returned counters.
    pub fn send_frame_at(&mut self, colors: &[Argb], gamma: &GammaTable, now: Instant) -> FrameStats {
        let mut stats = FrameStats::default();
        let mut artnet_sent = false;

        for packet in &mut self.packets {
            let outcome = send_packet(packet, colors, gamma, now, &*self.socket, &self.registry);
            if outcome == SendOutcome::Sent && packet.kind() == ProtocolKind::ArtNet {
                artnet_sent = true;
            }
            stats.record(outcome);
        }

        if artnet_sent {
            if let Some(sync) = &self.sync {
                let socket = &self.socket;
                let outcome = registry::attempt(&sync.state, sync.addr, now, || {
                    socket.send_to(&artnet::sync_packet(), sync.addr).map(|_| ())
                });
                self.sync_outcome = Some(outcome);
                stats.record(outcome);
            }
        }

        tracing::trace!(
            "Frame: {} sent, {} skipped, {} failed",
            stats.sent,
            stats.skipped,
            stats.failed
        );
        stats
    }
}

fn send_packet(
    packet: &mut Packet,
    colors: &[Argb],
    gamma: &GammaTable,
    now: Instant,
    socket: &dyn DatagramSocket,
    destinations: &DestinationRegistry,
) -> SendOutcome {
    if !packet.enabled() {
        packet.record_skip(SkipReason::Disabled);
        return SendOutcome::Skipped(SkipReason::Disabled);
    }
    let (addr, state) = match (packet.addr(), packet.error_handle(destinations)) {
        (Some(addr), Some(state)) => (addr, state),
        _ => {
            packet.record_skip(SkipReason::Unresolved);
            return SendOutcome::Skipped(SkipReason::Unresolved);
        }
    };

    let outcome = registry::attempt(&state, addr, now, || {
        packet.stamp(colors, gamma);
        socket.send_to(packet.bytes(), addr).map(|_| ())
    });
    packet.record(outcome, &state.lock());
    outcome
}

impl OutputSink for DatagramOutput {
    fn send_frame_at(&mut self, colors: &[Argb], gamma: &GammaTable, now: Instant) -> FrameStats {
        DatagramOutput::send_frame_at(self, colors, gamma, now)
    }

    fn packets(&self) -> &[Packet] {
        &self.packets
    }
}

impl std::fmt::Debug for DatagramOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatagramOutput")
            .field("packets", &self.packets.len())
            .field("kind", &self.kind)
            .field("art_sync", &self.art_sync_addr())
            .finish()
    }
}
