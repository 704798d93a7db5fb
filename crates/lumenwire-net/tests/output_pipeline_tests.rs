use lumenwire_core::{
    color::{rgb, Argb},
    ByteOrder, IndexMap, LumenConfig, OutputMode,
};
use lumenwire_net::{
    build_output_with_socket, DatagramOutput, DatagramSocket, DestinationRegistry, OutputNode,
    Packet, SendOutcome, SkipReason,
};
use parking_lot::Mutex;
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Records datagrams, or refuses them while `down` is set
#[derive(Default)]
struct FlakySocket {
    sent: Mutex<Vec<(SocketAddr, Vec<u8>)>>,
    down: Mutex<bool>,
}

impl DatagramSocket for FlakySocket {
    fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize> {
        if *self.down.lock() {
            return Err(io::Error::new(io::ErrorKind::Other, "network unreachable"));
        }
        self.sent.lock().push((addr, buf.to_vec()));
        Ok(buf.len())
    }
}

fn receiver() -> UdpSocket {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    socket
}

#[test]
fn test_config_to_wire_over_loopback() {
    let rx = receiver();
    let port = rx.local_addr().unwrap().port();
    let config = LumenConfig::from_toml_str(&format!(
        r#"
[[packets]]
host = "127.0.0.1"
port = {port}
byte_order = "GRB"
count = 2
protocol = {{ type = "artnet", universe = 3 }}
"#
    ))
    .unwrap();

    let socket: Arc<dyn DatagramSocket> = Arc::new(UdpSocket::bind("127.0.0.1:0").unwrap());
    let mut root = build_output_with_socket(&config, DestinationRegistry::shared(), socket).unwrap();

    let colors: Vec<Argb> = vec![rgb(0x10, 0x20, 0x30), rgb(0x40, 0x50, 0x60)];
    let stats = root.send(&colors).unwrap();
    assert_eq!(stats.sent, 1);

    let mut buf = [0u8; 64];
    let (n, _) = rx.recv_from(&mut buf).unwrap();
    assert_eq!(n, 18 + 6);
    assert_eq!(&buf[0..8], b"Art-Net\0");
    assert_eq!(&buf[14..16], &[3, 0]);
    assert_eq!(&buf[18..24], &[0x20, 0x10, 0x30, 0x50, 0x40, 0x60]);
}

#[test]
fn test_outputs_share_backoff_through_registry() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let socket = Arc::new(FlakySocket::default());
    let registry = DestinationRegistry::shared();
    let target: SocketAddr = "192.168.1.50:7890".parse().unwrap();

    let mut a = DatagramOutput::with_socket(socket.clone(), registry.clone());
    let mut b = DatagramOutput::with_socket(socket.clone(), registry.clone());
    for output in [&mut a, &mut b] {
        let mut packet = Packet::opc(0, IndexMap::range(0, 1), ByteOrder::Rgb).unwrap();
        packet.set_addr(target);
        output.add_packet(packet).unwrap();
    }

    *socket.down.lock() = true;
    let t0 = Instant::now();
    a.send_frame_at(&[0], &lumenwire_core::gamma::LINEAR, t0);
    b.send_frame_at(&[0], &lumenwire_core::gamma::LINEAR, t0);
    assert_eq!(a.packets()[0].consecutive_failures(), 2);
    assert_eq!(b.packets()[0].consecutive_failures(), 2);

    a.send_frame_at(&[0], &lumenwire_core::gamma::LINEAR, t0);
    let stats = b.send_frame_at(&[0], &lumenwire_core::gamma::LINEAR, t0);
    assert_eq!(stats.skipped, 1);
    assert_eq!(
        b.packets()[0].last_outcome(),
        Some(SendOutcome::Skipped(SkipReason::Backoff))
    );
    assert!(b.packets()[0].error());

    let state = registry.get(&target).unwrap();
    assert_eq!(state.retry_not_before(), Some(t0 + Duration::from_millis(50)));
    assert_eq!(registry.failing(), vec![target]);
}

#[test]
fn test_node_modes_reach_the_wire() {
    let socket = Arc::new(FlakySocket::default());
    let mut output = DatagramOutput::with_socket(socket.clone(), DestinationRegistry::shared());
    let mut packet = Packet::opc(0, IndexMap::new(vec![0, -1]), ByteOrder::Rgb).unwrap();
    packet.set_addr("10.0.0.9:7890".parse().unwrap());
    output.add_packet(packet).unwrap();

    let mut node = OutputNode::new("node").with_sink(output);
    let input = [rgb(200, 100, 50)];

    node.send(&input).unwrap();
    node.set_mode(OutputMode::Off);
    node.send(&input).unwrap();
    node.set_mode(OutputMode::White);
    node.set_brightness(0.5);
    node.send(&input).unwrap();

    let sent = socket.sent.lock();
    let payloads: Vec<&[u8]> = sent.iter().map(|(_, bytes)| &bytes[4..]).collect();
    assert_eq!(payloads[0], &[200, 100, 50, 0, 0, 0]);
    assert_eq!(payloads[1], &[0, 0, 0, 0, 0, 0]);
    assert_eq!(payloads[2], &[128, 128, 128, 0, 0, 0]);
}

#[test]
fn test_unresolved_packet_reports_skip() {
    let socket = Arc::new(FlakySocket::default());
    let mut output = DatagramOutput::with_socket(socket.clone(), DestinationRegistry::shared());
    let mut packet = Packet::ddp(0, true, IndexMap::range(0, 1), ByteOrder::Rgb).unwrap();
    assert!(packet.set_destination("unknown-controller.invalid", 4048).is_err());
    output.add_packet(packet).unwrap();

    let stats = output.send_frame(&[0], &lumenwire_core::gamma::LINEAR);
    assert_eq!(stats.skipped, 1);
    assert_eq!(
        output.packets()[0].last_outcome(),
        Some(SendOutcome::Skipped(SkipReason::Disabled))
    );
    assert!(socket.sent.lock().is_empty());
}
