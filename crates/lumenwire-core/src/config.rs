//! Output configuration
//!
//! Serde model of an output tree: node-level controls plus the packets,
//! chunked packet groups and streaming connections hanging off it. Loaded
//! from TOML or JSON.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::byte_order::ByteOrder;
use crate::error::{CoreError, Result};
use crate::index_map::IndexMap;
use crate::logging::LogConfig;
use crate::transform::{FrameTransform, OutputMode, MAX_FPS};

/// Art-Net UDP port
pub const ARTNET_PORT: u16 = 6454;
/// Open Pixel Control port
pub const OPC_PORT: u16 = 7890;
/// DDP UDP port
pub const DDP_PORT: u16 = 4048;
/// KiNET UDP port
pub const KINET_PORT: u16 = 6038;
/// sACN / E1.31 UDP port
pub const SACN_PORT: u16 = 5568;

fn default_true() -> bool {
    true
}

fn default_brightness() -> f32 {
    1.0
}

/// Node-level output controls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub mode: OutputMode,
    /// Frame cap, 0 = unthrottled
    #[serde(default)]
    pub fps: u32,
    /// Gamma tier (extra exponent applied to HSB brightness)
    #[serde(default)]
    pub gamma: u32,
    #[serde(default = "default_brightness")]
    pub brightness: f32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: OutputMode::Normal,
            fps: 0,
            gamma: 0,
            brightness: 1.0,
        }
    }
}

impl OutputConfig {
    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.fps > MAX_FPS {
            return Err(CoreError::Config(format!(
                "fps {} exceeds maximum of {}",
                self.fps, MAX_FPS
            )));
        }
        validate_brightness(self.brightness)
    }

    /// The color transform these controls describe
    pub fn transform(&self) -> FrameTransform {
        FrameTransform {
            mode: self.mode,
            gamma: self.gamma,
            brightness: self.brightness,
        }
    }
}

fn validate_brightness(brightness: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&brightness) {
        return Err(CoreError::Config(format!(
            "brightness {} outside 0.0-1.0",
            brightness
        )));
    }
    Ok(())
}

/// Which points a packet or stream carries
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PointsConfig {
    /// Explicit wire-position list; wins over `start`/`count`
    #[serde(default)]
    pub indices: Option<IndexMap>,
    #[serde(default)]
    pub start: usize,
    #[serde(default)]
    pub count: usize,
}

impl PointsConfig {
    /// Resolve to an index map
    pub fn index_map(&self) -> IndexMap {
        match &self.indices {
            Some(indices) => indices.clone(),
            None => IndexMap::range(self.start, self.count),
        }
    }

    fn validate(&self, host: &str) -> Result<()> {
        if self.indices.is_none() && !IndexMap::range_fits(self.start, self.count) {
            return Err(CoreError::Config(format!(
                "Points {}+{} for {} exceed the addressable buffer",
                self.start, self.count, host
            )));
        }
        Ok(())
    }
}

/// KiNET header flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KinetVariant {
    /// KiNET v2 port-addressed output
    #[default]
    PortOut,
    /// KiNET v1 DMX output
    DmxOut,
}

/// Protocol-specific packet settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProtocolConfig {
    Artnet {
        #[serde(default)]
        universe: u16,
        #[serde(default)]
        sequence_enabled: bool,
    },
    Opc {
        #[serde(default)]
        channel: u8,
    },
    Ddp {
        #[serde(default)]
        data_offset: u32,
        #[serde(default = "default_true")]
        push: bool,
    },
    Kinet {
        #[serde(default)]
        variant: KinetVariant,
        #[serde(default = "default_kinet_port")]
        kinet_port: u8,
    },
    Sacn {
        #[serde(default = "default_sacn_universe")]
        universe: u16,
        #[serde(default = "default_sacn_priority")]
        priority: u8,
        #[serde(default)]
        source_name: Option<String>,
    },
}

fn default_kinet_port() -> u8 {
    1
}

fn default_sacn_universe() -> u16 {
    1
}

fn default_sacn_priority() -> u8 {
    100
}

impl ProtocolConfig {
    /// Well-known port of the protocol
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Artnet { .. } => ARTNET_PORT,
            Self::Opc { .. } => OPC_PORT,
            Self::Ddp { .. } => DDP_PORT,
            Self::Kinet { .. } => KINET_PORT,
            Self::Sacn { .. } => SACN_PORT,
        }
    }
}

/// One datagram
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketConfig {
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub byte_order: ByteOrder,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_brightness")]
    pub brightness: f32,
    #[serde(flatten)]
    pub points: PointsConfig,
}

impl PacketConfig {
    /// Configured port or the protocol default
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.protocol.default_port())
    }
}

/// Protocol used for a chunked group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkProtocol {
    /// DDP packets with increasing data offsets
    Ddp,
    /// Art-Net packets on consecutive universes
    Artnet,
}

/// A large point set split across several same-protocol packets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkConfig {
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    pub protocol: ChunkProtocol,
    /// Points per packet
    pub chunk_size: usize,
    /// Set the DDP push flag on every chunk instead of only the last
    #[serde(default)]
    pub push_every_chunk: bool,
    /// First Art-Net universe
    #[serde(default)]
    pub base_universe: u16,
    #[serde(default)]
    pub byte_order: ByteOrder,
    #[serde(flatten)]
    pub points: PointsConfig,
}

impl ChunkConfig {
    /// Configured port or the protocol default
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(match self.protocol {
            ChunkProtocol::Ddp => DDP_PORT,
            ChunkProtocol::Artnet => ARTNET_PORT,
        })
    }
}

fn default_write_timeout_ms() -> u64 {
    10
}

fn default_connect_timeout_ms() -> u64 {
    50
}

/// A streaming (TCP) OPC connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub channel: u8,
    #[serde(default)]
    pub byte_order: ByteOrder,
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(flatten)]
    pub points: PointsConfig,
}

impl StreamConfig {
    /// Configured port or the OPC default
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(OPC_PORT)
    }
}

/// Complete configuration of one output tree
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LumenConfig {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub packets: Vec<PacketConfig>,
    #[serde(default)]
    pub chunked: Vec<ChunkConfig>,
    #[serde(default)]
    pub streams: Vec<StreamConfig>,
    /// Destination for Art-Net sync packets ("host:port")
    #[serde(default)]
    pub art_sync: Option<String>,
    #[serde(default)]
    pub log: LogConfig,
}

impl LumenConfig {
    /// Parse and validate TOML
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate JSON
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.toml` or `.json` file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&content),
            Some("toml") => Self::from_toml_str(&content),
            other => Err(CoreError::Config(format!(
                "Unsupported config extension: {:?}",
                other
            ))),
        }
    }

    /// Check every section
    pub fn validate(&self) -> Result<()> {
        self.output.validate()?;
        for packet in &self.packets {
            validate_brightness(packet.brightness)?;
            packet.points.validate(&packet.host)?;
            if let ProtocolConfig::Sacn { universe, .. } = packet.protocol {
                if universe == 0 || universe > 63999 {
                    return Err(CoreError::Config(format!(
                        "Invalid sACN universe: {} (must be 1-63999)",
                        universe
                    )));
                }
            }
        }
        for chunk in &self.chunked {
            chunk.points.validate(&chunk.host)?;
            if chunk.chunk_size == 0 {
                return Err(CoreError::Config(format!(
                    "Chunk size for {} must be positive",
                    chunk.host
                )));
            }
        }
        for stream in &self.streams {
            stream.points.validate(&stream.host)?;
            if stream.connect_timeout_ms == 0 || stream.write_timeout_ms == 0 {
                return Err(CoreError::Config(format!(
                    "Stream timeouts for {} must be at least 1ms",
                    stream.host
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
art_sync = "10.0.0.255:6454"

[output]
mode = "normal"
fps = 60
gamma = 1
brightness = 0.8

[[packets]]
host = "10.0.0.5"
byte_order = "GRB"
start = 0
count = 170
protocol = { type = "artnet", universe = 3, sequence_enabled = true }

[[packets]]
host = "10.0.0.6"
indices = [0, -1, 2]
protocol = { type = "sacn", universe = 7 }

[[chunked]]
host = "10.0.0.7"
protocol = "ddp"
chunk_size = 400
count = 1000

[[streams]]
host = "127.0.0.1"
channel = 2
count = 64
"#;

    #[test]
    fn test_parse_sample() {
        let config = LumenConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.output.fps, 60);
        assert_eq!(config.output.gamma, 1);
        assert_eq!(config.packets.len(), 2);

        let artnet = &config.packets[0];
        assert_eq!(artnet.port(), ARTNET_PORT);
        assert_eq!(artnet.byte_order, ByteOrder::Grb);
        assert_eq!(artnet.points.index_map().len(), 170);
        assert_eq!(
            artnet.protocol,
            ProtocolConfig::Artnet {
                universe: 3,
                sequence_enabled: true
            }
        );

        let sacn = &config.packets[1];
        assert_eq!(sacn.port(), SACN_PORT);
        assert_eq!(sacn.points.index_map().as_slice(), &[0, -1, 2]);
        assert!(matches!(
            sacn.protocol,
            ProtocolConfig::Sacn {
                universe: 7,
                priority: 100,
                ..
            }
        ));

        assert_eq!(config.chunked[0].port(), DDP_PORT);
        assert_eq!(config.streams[0].port(), OPC_PORT);
        assert_eq!(config.streams[0].write_timeout_ms, 10);
        assert_eq!(config.art_sync.as_deref(), Some("10.0.0.255:6454"));
    }

    #[test]
    fn test_rejects_out_of_range() {
        let mut config = LumenConfig::default();
        config.output.fps = 301;
        assert!(config.validate().is_err());

        let mut config = LumenConfig::default();
        config.output.brightness = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_sacn_universe() {
        let toml = r#"
[[packets]]
host = "10.0.0.6"
protocol = { type = "sacn", universe = 0 }
"#;
        assert!(matches!(
            LumenConfig::from_toml_str(toml),
            Err(CoreError::Config(_))
        ));
    }

    #[test]
    fn test_rejects_zero_stream_timeouts() {
        for field in ["write_timeout_ms", "connect_timeout_ms"] {
            let toml = format!(
                "[[streams]]\nhost = \"127.0.0.1\"\ncount = 4\n{} = 0\n",
                field
            );
            assert!(
                matches!(LumenConfig::from_toml_str(&toml), Err(CoreError::Config(_))),
                "{} = 0 accepted",
                field
            );
        }
        let ok = "[[streams]]\nhost = \"127.0.0.1\"\nwrite_timeout_ms = 1\nconnect_timeout_ms = 1\n";
        assert!(LumenConfig::from_toml_str(ok).is_ok());
    }

    #[test]
    fn test_rejects_unaddressable_points() {
        let toml = format!(
            "[[packets]]\nhost = \"10.0.0.5\"\nstart = {}\ncount = 2\nprotocol = {{ type = \"opc\" }}\n",
            i32::MAX
        );
        assert!(matches!(
            LumenConfig::from_toml_str(&toml),
            Err(CoreError::Config(_))
        ));
    }

    #[test]
    fn test_json_matches_toml() {
        let from_toml = LumenConfig::from_toml_str(SAMPLE).unwrap();
        let json = serde_json::to_string(&from_toml).unwrap();
        let from_json = LumenConfig::from_json_str(&json).unwrap();
        assert_eq!(from_toml, from_json);
    }
}
