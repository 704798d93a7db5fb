//! Channel byte orders
//!
//! Fixtures disagree about the order their drivers expect color channels in.
//! A [`ByteOrder`] maps the logical R, G, B (and W) channels to wire offsets
//! within one point's slot.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Logical channel index of red in [`ByteOrder::offsets`]
pub const R: usize = 0;
/// Logical channel index of green
pub const G: usize = 1;
/// Logical channel index of blue
pub const B: usize = 2;
/// Logical channel index of white (4-channel orders only)
pub const W: usize = 3;

/// A permutation of RGB or RGBW channels on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ByteOrder {
    #[default]
    Rgb,
    Rbg,
    Grb,
    Gbr,
    Brg,
    Bgr,
    Rgbw,
    Rbgw,
    Grbw,
    Gbrw,
    Brgw,
    Bgrw,
    Wrgb,
    Wrbg,
    Wgrb,
    Wgbr,
    Wbrg,
    Wbgr,
}

impl ByteOrder {
    /// Every supported order
    pub const ALL: [ByteOrder; 18] = [
        Self::Rgb,
        Self::Rbg,
        Self::Grb,
        Self::Gbr,
        Self::Brg,
        Self::Bgr,
        Self::Rgbw,
        Self::Rbgw,
        Self::Grbw,
        Self::Gbrw,
        Self::Brgw,
        Self::Bgrw,
        Self::Wrgb,
        Self::Wrbg,
        Self::Wgrb,
        Self::Wgbr,
        Self::Wbrg,
        Self::Wbgr,
    ];

    /// Wire offsets of the logical channels, indexed by [`R`], [`G`], [`B`], [`W`].
    ///
    /// Only the first [`Self::num_channels`] entries are meaningful.
    pub const fn offsets(self) -> [usize; 4] {
        match self {
            Self::Rgb => [0, 1, 2, 0],
            Self::Rbg => [0, 2, 1, 0],
            Self::Grb => [1, 0, 2, 0],
            Self::Gbr => [2, 0, 1, 0],
            Self::Brg => [1, 2, 0, 0],
            Self::Bgr => [2, 1, 0, 0],
            Self::Rgbw => [0, 1, 2, 3],
            Self::Rbgw => [0, 2, 1, 3],
            Self::Grbw => [1, 0, 2, 3],
            Self::Gbrw => [2, 0, 1, 3],
            Self::Brgw => [1, 2, 0, 3],
            Self::Bgrw => [2, 1, 0, 3],
            Self::Wrgb => [1, 2, 3, 0],
            Self::Wrbg => [1, 3, 2, 0],
            Self::Wgrb => [2, 1, 3, 0],
            Self::Wgbr => [3, 1, 2, 0],
            Self::Wbrg => [2, 3, 1, 0],
            Self::Wbgr => [3, 2, 1, 0],
        }
    }

    /// Bytes per point
    pub const fn num_channels(self) -> usize {
        if self.has_white() {
            4
        } else {
            3
        }
    }

    /// Whether this order carries a dedicated white channel
    pub const fn has_white(self) -> bool {
        !matches!(
            self,
            Self::Rgb | Self::Rbg | Self::Grb | Self::Gbr | Self::Brg | Self::Bgr
        )
    }

    /// Fail if `other` does not fit a buffer laid out for `self`
    pub fn ensure_compatible(self, other: ByteOrder) -> Result<(), CoreError> {
        if self.num_channels() != other.num_channels() {
            return Err(CoreError::ChannelCountMismatch {
                expected: self.num_channels(),
                actual: other.num_channels(),
            });
        }
        Ok(())
    }

    /// Write one point into `slot` (which must hold [`Self::num_channels`] bytes).
    ///
    /// For white orders the white level is `min(r, g, b)` and is removed from
    /// the color channels before writing.
    #[inline]
    pub fn write(self, slot: &mut [u8], r: u8, g: u8, b: u8, lut: &[u8; 256]) {
        let offsets = self.offsets();
        if self.has_white() {
            let w = r.min(g).min(b);
            slot[offsets[R]] = lut[(r - w) as usize];
            slot[offsets[G]] = lut[(g - w) as usize];
            slot[offsets[B]] = lut[(b - w) as usize];
            slot[offsets[W]] = lut[w as usize];
        } else {
            slot[offsets[R]] = lut[r as usize];
            slot[offsets[G]] = lut[g as usize];
            slot[offsets[B]] = lut[b as usize];
        }
    }
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Rgb => "RGB",
            Self::Rbg => "RBG",
            Self::Grb => "GRB",
            Self::Gbr => "GBR",
            Self::Brg => "BRG",
            Self::Bgr => "BGR",
            Self::Rgbw => "RGBW",
            Self::Rbgw => "RBGW",
            Self::Grbw => "GRBW",
            Self::Gbrw => "GBRW",
            Self::Brgw => "BRGW",
            Self::Bgrw => "BGRW",
            Self::Wrgb => "WRGB",
            Self::Wrbg => "WRBG",
            Self::Wgrb => "WGRB",
            Self::Wgbr => "WGBR",
            Self::Wbrg => "WBRG",
            Self::Wbgr => "WBGR",
        };
        f.write_str(name)
    }
}

impl FromStr for ByteOrder {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|order| order.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| CoreError::InvalidParameter(format!("Unknown byte order: {}", s)))
    }
}
