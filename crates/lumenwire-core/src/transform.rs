//! Per-frame color transform and frame-rate throttle
//!
//! Every output node runs the raw color buffer through a [`FrameTransform`]
//! once per frame before any packet is stamped, and gates frames through a
//! [`FrameThrottle`] when it has an fps cap.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

use crate::color::{self, Argb};

/// Highest accepted fps cap
pub const MAX_FPS: u32 = 300;

/// What an output node sends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Colors with gamma and brightness applied
    #[default]
    Normal,
    /// Every point white at the node's brightness
    White,
    /// Every point off
    Off,
    /// Colors exactly as rendered, bypassing gamma and brightness
    Raw,
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "Normal"),
            Self::White => write!(f, "White"),
            Self::Off => write!(f, "Off"),
            Self::Raw => write!(f, "Raw"),
        }
    }
}

/// Mode, gamma tier and brightness of one output node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTransform {
    pub mode: OutputMode,
    pub gamma: u32,
    pub brightness: f32,
}

impl Default for FrameTransform {
    fn default() -> Self {
        Self {
            mode: OutputMode::Normal,
            gamma: 0,
            brightness: 1.0,
        }
    }
}

impl FrameTransform {
    /// Whether `Normal` mode would leave the input untouched
    pub fn is_identity(&self) -> bool {
        match self.mode {
            OutputMode::Raw => true,
            OutputMode::Normal => self.gamma == 0 && self.brightness >= 1.0,
            OutputMode::White | OutputMode::Off => false,
        }
    }

    /// Compute the colors to send for this frame.
    ///
    /// Returns `input` itself when no transform is needed, otherwise fills
    /// `scratch` and returns it. `scratch` is reused across frames.
    pub fn apply<'a>(&self, input: &'a [Argb], scratch: &'a mut Vec<Argb>) -> &'a [Argb] {
        if self.is_identity() {
            return input;
        }

        scratch.clear();
        match self.mode {
            OutputMode::Off => scratch.resize(input.len(), color::CLEAR),
            OutputMode::White => scratch.resize(input.len(), color::gray(self.brightness)),
            OutputMode::Normal => {
                let brightness = self.brightness.clamp(0.0, 1.0);
                scratch.extend(
                    input
                        .iter()
                        .map(|&c| color::scale_brightness(c, self.gamma, brightness)),
                );
            }
            OutputMode::Raw => scratch.extend_from_slice(input),
        }
        scratch.as_slice()
    }
}

/// Drops frames that arrive faster than an fps cap allows
#[derive(Debug, Clone, Default)]
pub struct FrameThrottle {
    fps: u32,
    last_frame: Option<Instant>,
}

impl FrameThrottle {
    /// Throttle at `fps` frames per second (0 = unthrottled)
    pub fn new(fps: u32) -> Self {
        Self {
            fps: fps.min(MAX_FPS),
            last_frame: None,
        }
    }

    /// Current cap
    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Change the cap; takes effect on the next frame
    pub fn set_fps(&mut self, fps: u32) {
        self.fps = fps.min(MAX_FPS);
    }

    /// Minimum spacing between frames, `None` when unthrottled
    pub fn interval(&self) -> Option<Duration> {
        (self.fps > 0).then(|| Duration::from_secs_f64(1.0 / self.fps as f64))
    }

    /// Decide whether a frame at `now` goes out, recording it if so
    pub fn admit(&mut self, now: Instant) -> bool {
        if let (Some(interval), Some(last)) = (self.interval(), self.last_frame) {
            if now.saturating_duration_since(last) < interval {
                return false;
            }
        }
        self.last_frame = Some(now);
        true
    }

    /// Instant of the last admitted frame
    pub fn last_frame(&self) -> Option<Instant> {
        self.last_frame
    }
}
