//! UDP socket transport
//!
//! Datagram outputs send through a [`DatagramSocket`]: the process-wide
//! default socket unless the caller supplies one.

use once_cell::sync::OnceCell;
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;

/// Fire-and-forget datagram sender
pub trait DatagramSocket: Send + Sync {
    /// Send one datagram to `addr`, returning the bytes written
    fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize>;
}

impl DatagramSocket for UdpSocket {
    fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize> {
        UdpSocket::send_to(self, buf, addr)
    }
}

static DEFAULT_SOCKET: OnceCell<Arc<UdpSocket>> = OnceCell::new();

/// Bind a non-blocking IPv4 socket on an ephemeral port with broadcast enabled
pub fn bind_udp() -> io::Result<UdpSocket> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;
    Ok(socket)
}

/// The shared default socket, bound on first use
pub fn default_socket() -> io::Result<Arc<UdpSocket>> {
    DEFAULT_SOCKET
        .get_or_try_init(|| {
            let socket = bind_udp()?;
            tracing::info!("Default output socket bound on {}", socket.local_addr()?);
            Ok(Arc::new(socket))
        })
        .cloned()
}
