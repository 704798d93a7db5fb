//! Point index maps
//!
//! An [`IndexMap`] lists, for every wire position of a packet, which slot of
//! the color buffer feeds it. Negative entries are blank positions that are
//! always written as zero.

use serde::{Deserialize, Serialize};

/// Marker for a blank wire position
pub const BLANK: i32 = -1;

/// Ordered wire-position → buffer-index mapping
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexMap(Vec<i32>);

impl IndexMap {
    /// Wrap an explicit list of indices
    pub fn new(indices: Vec<i32>) -> Self {
        Self(indices)
    }

    /// Contiguous run `start, start + 1, ..` of `count` points.
    ///
    /// Buffer indices above `i32::MAX` cannot be addressed and come out blank.
    pub fn range(start: usize, count: usize) -> Self {
        Self(
            (0..count)
                .map(|k| {
                    start
                        .checked_add(k)
                        .and_then(|i| i32::try_from(i).ok())
                        .unwrap_or(BLANK)
                })
                .collect(),
        )
    }

    /// Whether every index of `range(start, count)` is addressable
    pub fn range_fits(start: usize, count: usize) -> bool {
        match count.checked_sub(1) {
            None => true,
            Some(last) => start
                .checked_add(last)
                .map_or(false, |i| i32::try_from(i).is_ok()),
        }
    }

    /// `count` blank positions
    pub fn blank(count: usize) -> Self {
        Self(vec![BLANK; count])
    }

    /// Number of wire positions
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no wire positions
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Raw entries
    pub fn as_slice(&self) -> &[i32] {
        &self.0
    }

    /// Buffer index for a wire position, `None` when blank
    #[inline]
    pub fn resolve(entry: i32) -> Option<usize> {
        usize::try_from(entry).ok()
    }

    /// Ordered, non-overlapping sub-maps of at most `chunk_size` positions.
    ///
    /// Returns `(offset, map)` pairs where `offset` is the number of wire
    /// positions in all preceding chunks.
    pub fn chunks(&self, chunk_size: usize) -> Vec<(usize, IndexMap)> {
        if chunk_size == 0 {
            return Vec::new();
        }
        self.0
            .chunks(chunk_size)
            .enumerate()
            .map(|(i, chunk)| (i * chunk_size, IndexMap(chunk.to_vec())))
            .collect()
    }
}

impl From<Vec<i32>> for IndexMap {
    fn from(indices: Vec<i32>) -> Self {
        Self(indices)
    }
}

impl FromIterator<i32> for IndexMap {
    fn from_iter<I: IntoIterator<Item = i32>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
