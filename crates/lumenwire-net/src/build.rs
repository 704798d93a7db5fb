//! Building an output tree from configuration
//!
//! The root node carries the configured node controls. Plain packets share
//! one datagram child, each chunked group gets its own protocol-restricted
//! datagram child, and each stream its own child. Hosts that fail to resolve
//! leave their packet or stream disabled; the rest of the tree is built.

use lumenwire_core::{
    ChunkConfig, ChunkProtocol, KinetVariant, LumenConfig, PacketConfig, ProtocolConfig,
    StreamConfig,
};
use std::sync::Arc;
use std::time::Duration;

use crate::chunk::{artnet_chunks, ddp_chunks, PushMode};
use crate::datagram::DatagramOutput;
use crate::node::OutputNode;
use crate::packet::Packet;
use crate::protocol::{ArtNet, Ddp, Kinet, Opc, Protocol, ProtocolKind, Sacn};
use crate::registry::DestinationRegistry;
use crate::stream::StreamOutput;
use crate::transport::{self, DatagramSocket};
use crate::Result;

/// Build an output tree on the default socket
pub fn build_output(config: &LumenConfig, registry: Arc<DestinationRegistry>) -> Result<OutputNode> {
    let socket: Arc<dyn DatagramSocket> = transport::default_socket()?;
    build_output_with_socket(config, registry, socket)
}

/// Build an output tree whose datagrams go through `socket`
pub fn build_output_with_socket(
    config: &LumenConfig,
    registry: Arc<DestinationRegistry>,
    socket: Arc<dyn DatagramSocket>,
) -> Result<OutputNode> {
    config.validate()?;
    let mut root = OutputNode::from_config("output", &config.output);

    if !config.packets.is_empty() || config.art_sync.is_some() {
        let mut datagrams = DatagramOutput::with_socket(socket.clone(), registry.clone());
        for packet in &config.packets {
            datagrams.add_packet(build_packet(packet)?)?;
        }
        if let Some(target) = &config.art_sync {
            if let Err(e) = datagrams.set_art_sync_target(target) {
                tracing::warn!("ArtSync disabled: {}", e);
            }
        }
        root.add_child(OutputNode::new("packets").with_sink(datagrams));
    }

    for (i, chunk) in config.chunked.iter().enumerate() {
        let output = build_chunked(chunk, socket.clone(), registry.clone())?;
        root.add_child(OutputNode::new(format!("chunked-{}", i)).with_sink(output));
    }

    for (i, stream) in config.streams.iter().enumerate() {
        let output = build_stream(stream, registry.clone())?;
        root.add_child(OutputNode::new(format!("stream-{}", i)).with_sink(output));
    }

    tracing::info!(
        "Built output: {} packets, {} chunked groups, {} streams",
        config.packets.len(),
        config.chunked.len(),
        config.streams.len()
    );
    Ok(root)
}

/// One packet from its configuration
pub fn build_packet(config: &PacketConfig) -> Result<Packet> {
    let protocol: Protocol = match &config.protocol {
        ProtocolConfig::Artnet {
            universe,
            sequence_enabled,
        } => ArtNet::new(*universe)?.with_sequence(*sequence_enabled).into(),
        ProtocolConfig::Opc { channel } => Opc::new(*channel).into(),
        ProtocolConfig::Ddp { data_offset, push } => Ddp::new(*data_offset, *push).into(),
        ProtocolConfig::Kinet {
            variant,
            kinet_port,
        } => match variant {
            KinetVariant::PortOut => Kinet::port_out(*kinet_port).into(),
            KinetVariant::DmxOut => Kinet::dmx_out().into(),
        },
        ProtocolConfig::Sacn {
            universe,
            priority,
            source_name,
        } => {
            let mut sacn = Sacn::new(*universe)?.with_priority(*priority);
            if let Some(name) = source_name {
                sacn = sacn.with_source_name(name);
            }
            sacn.into()
        }
    };

    let mut packet = Packet::new(protocol, config.points.index_map(), config.byte_order)?;
    packet.set_brightness(config.brightness);
    packet.set_enabled(config.enabled);
    // Resolution failure disables the packet and keeps the error on it
    let _ = packet.set_destination(&config.host, config.port());
    Ok(packet)
}

/// A protocol-restricted datagram output for one chunked group
pub fn build_chunked(
    config: &ChunkConfig,
    socket: Arc<dyn DatagramSocket>,
    registry: Arc<DestinationRegistry>,
) -> Result<DatagramOutput> {
    let indices = config.points.index_map();
    let (kind, mut packets) = match config.protocol {
        ChunkProtocol::Ddp => (
            ProtocolKind::Ddp,
            ddp_chunks(
                &indices,
                config.chunk_size,
                config.byte_order,
                PushMode::from_every_chunk(config.push_every_chunk),
            )?,
        ),
        ChunkProtocol::Artnet => (
            ProtocolKind::ArtNet,
            artnet_chunks(&indices, config.chunk_size, config.base_universe, config.byte_order)?,
        ),
    };

    for packet in &mut packets {
        let _ = packet.set_destination(&config.host, config.port());
    }

    let mut output = DatagramOutput::with_socket(socket, registry).restricted_to(kind)?;
    output.add_packets(packets)?;
    Ok(output)
}

/// A TCP OPC stream
pub fn build_stream(config: &StreamConfig, registry: Arc<DestinationRegistry>) -> Result<StreamOutput> {
    let mut stream = StreamOutput::new(
        config.channel,
        config.points.index_map(),
        config.byte_order,
        registry,
    )?
    .with_timeouts(
        Duration::from_millis(config.connect_timeout_ms),
        Duration::from_millis(config.write_timeout_ms),
    );
    let _ = stream.set_destination(&config.host, config.port());
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumenwire_core::{ByteOrder, OutputMode};
    use std::net::UdpSocket;

    const CONFIG: &str = r#"
[output]
mode = "raw"
fps = 30

[[packets]]
host = "127.0.0.1"
count = 4
protocol = { type = "sacn", universe = 9, priority = 150, source_name = "stage left" }

[[packets]]
host = "127.0.0.1"
port = 9000
byte_order = "RGBW"
indices = [3, -1, 0]
brightness = 0.5
protocol = { type = "kinet", variant = "dmxout" }

[[chunked]]
host = "127.0.0.1"
protocol = "ddp"
chunk_size = 100
count = 250

[[streams]]
host = "127.0.0.1"
port = 7891
count = 8
channel = 1
"#;

    fn socket() -> Arc<dyn DatagramSocket> {
        Arc::new(UdpSocket::bind("127.0.0.1:0").unwrap())
    }

    #[test]
    fn test_build_tree_shape() {
        let config = LumenConfig::from_toml_str(CONFIG).unwrap();
        let root = build_output_with_socket(&config, DestinationRegistry::shared(), socket()).unwrap();

        assert_eq!(root.mode(), OutputMode::Raw);
        assert_eq!(root.fps(), 30);
        let names: Vec<_> = root.children().iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, vec!["packets", "chunked-0", "stream-0"]);

        let packets = root.packets();
        assert_eq!(packets.len(), 2 + 3 + 1);
        assert_eq!(packets[0].kind(), ProtocolKind::Sacn);
        assert_eq!(packets[0].addr().unwrap().port(), 5568);
        assert_eq!(packets[1].byte_order(), ByteOrder::Rgbw);
        assert_eq!(packets[1].brightness(), 0.5);
        assert_eq!(packets[1].addr().unwrap().port(), 9000);
        assert!(packets[2..5].iter().all(|p| p.kind() == ProtocolKind::Ddp));
        assert_eq!(packets[5].addr().unwrap().port(), 7891);
    }

    #[test]
    fn test_sacn_settings_applied() {
        let config = LumenConfig::from_toml_str(CONFIG).unwrap();
        let packet = build_packet(&config.packets[0]).unwrap();
        match packet.protocol() {
            Protocol::Sacn(sacn) => {
                assert_eq!(sacn.universe(), 9);
                assert_eq!(sacn.priority(), 150);
                assert_eq!(sacn.source_name(), "stage left");
            }
            other => panic!("expected sACN, got {}", other.kind()),
        }
    }

    #[test]
    fn test_unresolvable_host_keeps_building() {
        let mut config = LumenConfig::from_toml_str(CONFIG).unwrap();
        config.packets[0].host = "no-such-host.invalid".to_string();
        let root = build_output_with_socket(&config, DestinationRegistry::shared(), socket()).unwrap();
        let packets = root.packets();
        assert!(!packets[0].enabled());
        assert!(packets[0].resolve_error().is_some());
        assert!(packets[1].enabled());
    }
}
