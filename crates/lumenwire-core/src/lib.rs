//! Lumenwire Core - Color Buffer Model for Lighting Output
//!
//! This crate contains the data model shared by every output protocol:
//! - Packed ARGB colors and HSB brightness scaling
//! - Channel byte orders (RGB and RGBW permutations)
//! - Point index maps with blank positions
//! - Gamma/brightness lookup tables
//! - Per-frame mode/gamma/brightness transform and fps throttle
//! - Serde configuration model and logging setup
//!
//! Networking lives in `lumenwire-net`.

#![warn(missing_docs)]

#[allow(missing_docs)]
pub mod byte_order;
pub mod color;
/// Configuration model
#[allow(missing_docs)]
pub mod config;
pub mod error;
pub mod gamma;
pub mod index_map;
pub mod logging;
/// Frame transform and throttle
#[allow(missing_docs)]
pub mod transform;

pub use byte_order::ByteOrder;
pub use color::Argb;
pub use config::{
    ChunkConfig, ChunkProtocol, KinetVariant, LumenConfig, OutputConfig, PacketConfig,
    PointsConfig, ProtocolConfig, StreamConfig,
};
pub use error::{CoreError, Result};
pub use gamma::GammaTable;
pub use index_map::IndexMap;
pub use logging::LogConfig;
pub use transform::{FrameThrottle, FrameTransform, OutputMode};
