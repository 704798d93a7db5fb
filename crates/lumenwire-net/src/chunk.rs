//! Splitting large point sets across packets
//!
//! DDP chunks carry their position as a data offset and use the push flag
//! to mark the end of a frame. Art-Net chunks take consecutive universes.

use lumenwire_core::{ByteOrder, IndexMap};

use crate::error::OutputError;
use crate::packet::Packet;
use crate::Result;

/// RGB points that fit one 512-channel universe
pub const ARTNET_POINTS_PER_UNIVERSE: usize = 170;

/// Which DDP chunks carry the push flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PushMode {
    /// Only the final chunk; the receiver renders the frame atomically
    #[default]
    LastChunk,
    /// Every chunk; lower latency, frames may tear
    EveryChunk,
}

impl PushMode {
    /// Map the `push_every_chunk` config flag
    pub fn from_every_chunk(every_chunk: bool) -> Self {
        if every_chunk {
            Self::EveryChunk
        } else {
            Self::LastChunk
        }
    }
}

fn split(indices: &IndexMap, chunk_size: usize) -> Result<Vec<(usize, IndexMap)>> {
    if chunk_size == 0 {
        return Err(OutputError::InvalidParameter(
            "Chunk size must be positive".to_string(),
        ));
    }
    Ok(indices.chunks(chunk_size))
}

/// DDP packets of at most `chunk_size` points with cumulative data offsets
pub fn ddp_chunks(
    indices: &IndexMap,
    chunk_size: usize,
    byte_order: ByteOrder,
    push: PushMode,
) -> Result<Vec<Packet>> {
    let chunks = split(indices, chunk_size)?;
    let last = chunks.len().saturating_sub(1);
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, (offset, map))| {
            let push = push == PushMode::EveryChunk || i == last;
            let offset = u32::try_from(offset).map_err(|_| {
                OutputError::InvalidParameter(format!("DDP offset {} out of range", offset))
            })?;
            Packet::ddp(offset, push, map, byte_order)
        })
        .collect()
}

/// Art-Net packets of at most `chunk_size` points on universes counting up
/// from `base_universe`
pub fn artnet_chunks(
    indices: &IndexMap,
    chunk_size: usize,
    base_universe: u16,
    byte_order: ByteOrder,
) -> Result<Vec<Packet>> {
    split(indices, chunk_size)?
        .into_iter()
        .enumerate()
        .map(|(i, (_, map))| {
            let universe = u16::try_from(i)
                .ok()
                .and_then(|i| base_universe.checked_add(i))
                .ok_or_else(|| {
                    OutputError::InvalidParameter(format!(
                        "Too many universes after {}",
                        base_universe
                    ))
                })?;
            Packet::artnet(universe, map, byte_order)
        })
        .collect()
}
