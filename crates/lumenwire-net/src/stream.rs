//! Streaming OPC over TCP
//!
//! Same header and payload as the datagram OPC packet, written to a
//! persistent connection. Connects lazily, bounds both the connect and the
//! write with timeouts, and drops the connection on any error so the next
//! eligible frame reconnects. Failures go through the destination registry
//! like any datagram.

use lumenwire_core::{color::Argb, ByteOrder, GammaTable, IndexMap};
use std::io::{self, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::node::{FrameStats, OutputSink};
use crate::packet::{Packet, SendOutcome, SkipReason};
use crate::registry::{self, DestinationRegistry};
use crate::Result;

/// Default bound on establishing a connection
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(50);
/// Default bound on writing one frame
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(10);
/// Shortest timeout the socket accepts
pub const MIN_TIMEOUT: Duration = Duration::from_millis(1);

/// One TCP OPC connection
pub struct StreamOutput {
    packet: Packet,
    connection: Option<TcpStream>,
    registry: Arc<DestinationRegistry>,
    connect_timeout: Duration,
    write_timeout: Duration,
}

impl StreamOutput {
    /// Stream for `indices` on OPC `channel`; set a destination before sending
    pub fn new(
        channel: u8,
        indices: IndexMap,
        byte_order: ByteOrder,
        registry: Arc<DestinationRegistry>,
    ) -> Result<Self> {
        Ok(Self {
            packet: Packet::opc(channel, indices, byte_order)?,
            connection: None,
            registry,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        })
    }

    /// Bound connect and write; both are raised to at least [`MIN_TIMEOUT`]
    pub fn with_timeouts(mut self, connect: Duration, write: Duration) -> Self {
        self.connect_timeout = connect.max(MIN_TIMEOUT);
        self.write_timeout = write.max(MIN_TIMEOUT);
        self
    }

    /// Resolve and set the destination, closing any open connection.
    ///
    /// An unresolvable host disables the stream.
    pub fn set_destination(&mut self, host: &str, port: u16) -> Result<()> {
        self.disconnect();
        self.packet.set_destination(host, port)
    }

    pub fn set_addr(&mut self, addr: SocketAddr) {
        self.disconnect();
        self.packet.set_addr(addr);
    }

    pub fn set_channel(&mut self, channel: u8) -> Result<()> {
        self.packet.set_channel(channel)
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.packet.set_enabled(enabled);
        if !enabled {
            self.disconnect();
        }
    }

    pub fn set_brightness(&mut self, brightness: f32) {
        self.packet.set_brightness(brightness);
    }

    pub fn set_byte_order(&mut self, byte_order: ByteOrder) -> Result<()> {
        self.packet.set_byte_order(byte_order)
    }

    /// The OPC packet written each frame
    pub fn packet(&self) -> &Packet {
        &self.packet
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn disconnect(&mut self) {
        if self.connection.take().is_some() {
            tracing::debug!("Closed OPC stream to {:?}", self.packet.addr());
        }
    }

    /// Stamp and write one frame now
    pub fn send_frame(&mut self, colors: &[Argb], gamma: &GammaTable) -> SendOutcome {
        self.send_frame_at(colors, gamma, Instant::now())
    }

    /// Stamp and write one frame at `now`; errors are recorded, never returned
    pub fn send_frame_at(&mut self, colors: &[Argb], gamma: &GammaTable, now: Instant) -> SendOutcome {
        if !self.packet.enabled() {
            self.packet.record_skip(SkipReason::Disabled);
            return SendOutcome::Skipped(SkipReason::Disabled);
        }
        let (addr, state) = match (self.packet.addr(), self.packet.error_handle(&self.registry)) {
            (Some(addr), Some(state)) => (addr, state),
            _ => {
                self.packet.record_skip(SkipReason::Unresolved);
                return SendOutcome::Skipped(SkipReason::Unresolved);
            }
        };

        let packet = &mut self.packet;
        let connection = &mut self.connection;
        let (connect_timeout, write_timeout) = (self.connect_timeout, self.write_timeout);
        let outcome = registry::attempt(&state, addr, now, || {
            packet.stamp(colors, gamma);
            let mut stream = match connection.take() {
                Some(stream) => stream,
                None => connect(addr, connect_timeout, write_timeout)?,
            };
            stream.write_all(packet.bytes())?;
            *connection = Some(stream);
            Ok(())
        });

        self.packet.record(outcome, &state.lock());
        outcome
    }
}

fn connect(addr: SocketAddr, connect_timeout: Duration, write_timeout: Duration) -> io::Result<TcpStream> {
    let stream = TcpStream::connect_timeout(&addr, connect_timeout)?;
    stream.set_write_timeout(Some(write_timeout))?;
    stream.set_nodelay(true)?;
    tracing::info!("Connected OPC stream to {}", addr);
    Ok(stream)
}

impl OutputSink for StreamOutput {
    fn send_frame_at(&mut self, colors: &[Argb], gamma: &GammaTable, now: Instant) -> FrameStats {
        let mut stats = FrameStats::default();
        stats.record(StreamOutput::send_frame_at(self, colors, gamma, now));
        stats
    }

    fn packets(&self) -> &[Packet] {
        std::slice::from_ref(&self.packet)
    }
}

impl std::fmt::Debug for StreamOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamOutput")
            .field("addr", &self.packet.addr())
            .field("connected", &self.connection.is_some())
            .field("connect_timeout", &self.connect_timeout)
            .field("write_timeout", &self.write_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumenwire_core::{color::rgb, gamma::LINEAR};
    use std::io::Read;
    use std::net::TcpListener;

    fn stream() -> StreamOutput {
        StreamOutput::new(2, IndexMap::range(0, 2), ByteOrder::Rgb, DestinationRegistry::shared())
            .unwrap()
            .with_timeouts(Duration::from_millis(500), Duration::from_millis(500))
    }

    #[test]
    fn test_writes_opc_frame() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut output = stream();
        output.set_addr(listener.local_addr().unwrap());

        let outcome = output.send_frame(&[rgb(1, 2, 3), rgb(4, 5, 6)], &LINEAR);
        assert_eq!(outcome, SendOutcome::Sent);
        assert!(output.is_connected());

        let (mut peer, _) = listener.accept().unwrap();
        let mut buf = [0u8; 10];
        peer.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [2, 0, 0, 6, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_refused_connection_backs_off() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let mut output = stream();
        output.set_addr(addr);

        let t0 = Instant::now();
        for _ in 0..3 {
            assert_eq!(output.send_frame_at(&[0; 2], &LINEAR, t0), SendOutcome::Failed);
        }
        assert!(!output.is_connected());
        assert!(output.packet().error());
        assert_eq!(
            output.send_frame_at(&[0; 2], &LINEAR, t0 + Duration::from_millis(10)),
            SendOutcome::Skipped(SkipReason::Backoff)
        );
    }

    #[test]
    fn test_zero_timeouts_are_raised() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut output = stream().with_timeouts(Duration::ZERO, Duration::ZERO);
        output.set_addr(listener.local_addr().unwrap());

        for _ in 0..3 {
            assert_eq!(output.send_frame(&[0; 2], &LINEAR), SendOutcome::Sent);
        }
        assert!(!output.packet().error());
    }

    #[test]
    fn test_stalled_peer_bounds_write_and_reconnects() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut output =
            StreamOutput::new(0, IndexMap::range(0, 8000), ByteOrder::Rgb, DestinationRegistry::shared())
                .unwrap()
                .with_timeouts(Duration::from_millis(500), Duration::from_millis(10));
        output.set_addr(listener.local_addr().unwrap());
        let colors = vec![rgb(1, 2, 3); 8000];

        assert_eq!(output.send_frame(&colors, &LINEAR), SendOutcome::Sent);
        // Accepted but never read
        let (_stalled, _) = listener.accept().unwrap();

        let mut failed = false;
        for _ in 0..4000 {
            let started = Instant::now();
            let outcome = output.send_frame(&colors, &LINEAR);
            assert!(started.elapsed() < Duration::from_secs(1));
            if outcome == SendOutcome::Failed {
                failed = true;
                break;
            }
        }
        assert!(failed);
        assert!(!output.is_connected());
        assert!(output.packet().error());

        assert_eq!(output.send_frame(&colors, &LINEAR), SendOutcome::Sent);
        assert!(output.is_connected());
        assert!(!output.packet().error());

        let (mut fresh, _) = listener.accept().unwrap();
        let mut header = [0u8; 4];
        fresh.read_exact(&mut header).unwrap();
        assert_eq!(header, [0, 0, 0x5d, 0xc0]);
    }

    #[test]
    fn test_unresolved_and_disabled() {
        let mut output = stream();
        assert_eq!(
            output.send_frame(&[0; 2], &LINEAR),
            SendOutcome::Skipped(SkipReason::Unresolved)
        );
        output.set_enabled(false);
        assert_eq!(
            output.send_frame(&[0; 2], &LINEAR),
            SendOutcome::Skipped(SkipReason::Disabled)
        );
    }
}
