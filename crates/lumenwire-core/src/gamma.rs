//! Gamma/brightness lookup tables
//!
//! Encoders run every channel of every point through a precomputed table
//! indexed by `[brightness level][channel value]`, so the hot path never
//! calls `powf`.

use once_cell::sync::Lazy;

/// Number of brightness levels and channel values
pub const LEVELS: usize = 256;

/// Shared linear (gamma 1.0) table
pub static LINEAR: Lazy<GammaTable> = Lazy::new(|| GammaTable::new(1.0));

/// 256×256 byte lookup table
#[derive(Clone)]
pub struct GammaTable {
    gamma: f32,
    rows: Box<[[u8; LEVELS]]>,
}

impl GammaTable {
    /// Build a table for the given gamma exponent.
    ///
    /// Entry `[level][value]` is `255 * (value / 255)^gamma * level / 255`, rounded.
    pub fn new(gamma: f32) -> Self {
        let gamma = if gamma.is_finite() && gamma > 0.0 {
            gamma
        } else {
            1.0
        };

        let mut curve = [0f32; LEVELS];
        for (value, out) in curve.iter_mut().enumerate() {
            *out = (value as f32 / 255.0).powf(gamma);
        }

        let mut rows = vec![[0u8; LEVELS]; LEVELS].into_boxed_slice();
        for (level, row) in rows.iter_mut().enumerate() {
            let scale = level as f32;
            for (value, out) in row.iter_mut().enumerate() {
                *out = (curve[value] * scale).round().clamp(0.0, 255.0) as u8;
            }
        }

        Self { gamma, rows }
    }

    /// Gamma exponent this table was built with
    pub fn gamma(&self) -> f32 {
        self.gamma
    }

    /// Row for a brightness level (255 = full)
    #[inline]
    pub fn row(&self, level: u8) -> &[u8; LEVELS] {
        &self.rows[level as usize]
    }

    /// Single lookup
    #[inline]
    pub fn get(&self, level: u8, value: u8) -> u8 {
        self.rows[level as usize][value as usize]
    }

    /// Map a brightness scalar (0.0-1.0) to a table level
    #[inline]
    pub fn level_for(brightness: f32) -> u8 {
        (brightness.clamp(0.0, 1.0) * 255.0).round() as u8
    }
}

impl Default for GammaTable {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl std::fmt::Debug for GammaTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GammaTable")
            .field("gamma", &self.gamma)
            .finish_non_exhaustive()
    }
}
