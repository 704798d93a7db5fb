//! Lumenwire Net - Protocol Encoders and Transports
//!
//! This crate puts color frames on the wire:
//! - Packets with Art-Net, OPC, DDP, KiNET and sACN headers
//! - A shared destination registry with exponential backoff
//! - UDP datagram aggregation with optional Art-Net sync
//! - Streaming OPC over TCP
//! - Chunking of large point sets across packets
//! - The output node tree and a config-driven builder

#![warn(missing_docs)]

pub mod build;
pub mod chunk;
/// UDP aggregation
#[allow(missing_docs)]
pub mod datagram;
pub mod error;
/// Output node tree
#[allow(missing_docs)]
pub mod node;
/// Packet buffers and destinations
#[allow(missing_docs)]
pub mod packet;
/// Wire protocol encoders
#[allow(missing_docs)]
pub mod protocol;
/// Destination error registry
#[allow(missing_docs)]
pub mod registry;
/// TCP OPC streaming
#[allow(missing_docs)]
pub mod stream;
pub mod transport;

pub use build::{build_output, build_output_with_socket};
pub use chunk::{artnet_chunks, ddp_chunks, PushMode};
pub use datagram::DatagramOutput;
pub use error::{OutputError, Result};
pub use node::{FrameStats, OutputNode, OutputSink};
pub use packet::{Destination, Packet, SendOutcome, SkipReason};
pub use protocol::{ArtNet, Ddp, Encoder, Kinet, Opc, Protocol, ProtocolKind, Sacn};
pub use registry::{DestinationRegistry, ErrorHandle, ErrorState, Health};
pub use stream::StreamOutput;
pub use transport::{default_socket, DatagramSocket};
