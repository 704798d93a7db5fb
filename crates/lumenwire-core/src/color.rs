//! Packed ARGB color helpers
//!
//! Colors travel through the output stage as `u32` values laid out as
//! `0xAARRGGBB`, one per logical point. The helpers here unpack channels and
//! perform the HSB brightness scaling used by [`crate::transform`].

use palette::{FromColor, Hsv, Srgb};

/// A packed `0xAARRGGBB` color
pub type Argb = u32;

/// Fully transparent black, the value an `Off` frame is filled with
pub const CLEAR: Argb = 0x0000_0000;
/// Opaque black
pub const BLACK: Argb = 0xff00_0000;
/// Opaque white
pub const WHITE: Argb = 0xffff_ffff;

/// Alpha channel
#[inline]
pub fn alpha(color: Argb) -> u8 {
    (color >> 24) as u8
}

/// Red channel
#[inline]
pub fn red(color: Argb) -> u8 {
    (color >> 16) as u8
}

/// Green channel
#[inline]
pub fn green(color: Argb) -> u8 {
    (color >> 8) as u8
}

/// Blue channel
#[inline]
pub fn blue(color: Argb) -> u8 {
    color as u8
}

/// Pack an opaque color from its channels
#[inline]
pub fn rgb(r: u8, g: u8, b: u8) -> Argb {
    argb(0xff, r, g, b)
}

/// Pack a color from all four channels
#[inline]
pub fn argb(a: u8, r: u8, g: u8, b: u8) -> Argb {
    ((a as u32) << 24) | ((r as u32) << 16) | ((g as u32) << 8) | b as u32
}

/// Opaque gray at the given level (0.0 = black, 1.0 = white)
pub fn gray(level: f32) -> Argb {
    let v = (level.clamp(0.0, 1.0) * 255.0).round() as u8;
    rgb(v, v, v)
}

/// Rescale the HSB brightness of a color.
///
/// The brightness component `b` (0..1) becomes `b^(gamma + 1) * brightness`,
/// hue and saturation are preserved. Alpha passes through untouched.
pub fn scale_brightness(color: Argb, gamma: u32, brightness: f32) -> Argb {
    let source = Srgb::new(red(color), green(color), blue(color)).into_format::<f32>();
    let mut hsv = Hsv::from_color(source);

    let b = hsv.value;
    let mut scaled = b;
    for _ in 0..gamma {
        scaled *= b;
    }
    hsv.value = (scaled * brightness).clamp(0.0, 1.0);

    let out: Srgb<f32> = Srgb::from_color(hsv);
    let out: Srgb<u8> = out.into_format();
    argb(alpha(color), out.red, out.green, out.blue)
}
