//! Channel-aware color conversion codes.
//!
//! A conversion such as "to grayscale" has one code per source layout:
//! [`ConversionCode::RgbToGray`] reads 3-byte pixels, [`ConversionCode::RgbaToGray`]
//! reads 4-byte pixels. The two are not interchangeable. Feeding an RGBA
//! buffer through the 3-channel code walks the bytes with the wrong stride:
//! pixel `p` is read from bytes `3p..3p+3`, which straddle two RGBA pixels
//! and mix alpha into the color channels.
//!
//! Call sites name only the intent ([`ConversionTarget`]) and let
//! [`select_conversion`] pick the code from the channel count of the image
//! at hand, on every call:
//!
//! ```rust
//! use cvx_core::{select_conversion, ConversionCode, ConversionTarget};
//!
//! let code = select_conversion(ConversionTarget::RgbToGray, 4).unwrap();
//! assert_eq!(code, ConversionCode::RgbaToGray);
//!
//! let code = select_conversion(ConversionTarget::RgbToGray, 3).unwrap();
//! assert_eq!(code, ConversionCode::RgbToGray);
//!
//! assert!(select_conversion(ConversionTarget::RgbToGray, 1).is_err());
//! ```

use crate::{Error, Image, Result};

/// Rec.601 luma weights used by every gray conversion.
pub const LUMA_WEIGHTS: [f32; 3] = [0.299, 0.587, 0.114];

/// Weighted gray value, truncated to `u8`.
#[inline]
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    (LUMA_WEIGHTS[0] * r as f32 + LUMA_WEIGHTS[1] * g as f32 + LUMA_WEIGHTS[2] * b as f32) as u8
}

/// What a color conversion should produce, independent of the source layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConversionTarget {
    /// RGB(A) source, gray output.
    RgbToGray,
    /// BGR(A) source, gray output.
    BgrToGray,
    /// Swap red and blue, keeping alpha when present.
    BgrToRgb,
    /// Gray source, RGB output.
    GrayToRgb,
}

impl ConversionTarget {
    /// Source channel counts this target has a code for.
    pub fn source_channels(self) -> &'static [u8] {
        match self {
            Self::RgbToGray | Self::BgrToGray | Self::BgrToRgb => &[3, 4],
            Self::GrayToRgb => &[1],
        }
    }
}

/// Concrete conversion with a fixed source and destination layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ConversionCode {
    /// 3-channel RGB to gray.
    RgbToGray = 0,
    /// 4-channel RGBA to gray.
    RgbaToGray = 1,
    /// 3-channel BGR to gray.
    BgrToGray = 2,
    /// 4-channel BGRA to gray.
    BgraToGray = 3,
    /// 3-channel BGR to RGB.
    BgrToRgb = 4,
    /// 4-channel BGRA to RGBA.
    BgraToRgba = 5,
    /// Gray to 3-channel RGB.
    GrayToRgb = 6,
}

impl ConversionCode {
    /// All codes, in id order.
    pub const ALL: [ConversionCode; 7] = [
        Self::RgbToGray,
        Self::RgbaToGray,
        Self::BgrToGray,
        Self::BgraToGray,
        Self::BgrToRgb,
        Self::BgraToRgba,
        Self::GrayToRgb,
    ];

    /// Bytes per source pixel.
    pub const fn source_channels(self) -> u8 {
        match self {
            Self::RgbToGray | Self::BgrToGray | Self::BgrToRgb => 3,
            Self::RgbaToGray | Self::BgraToGray | Self::BgraToRgba => 4,
            Self::GrayToRgb => 1,
        }
    }

    /// Bytes per destination pixel.
    pub const fn dest_channels(self) -> u8 {
        match self {
            Self::RgbToGray | Self::RgbaToGray | Self::BgrToGray | Self::BgraToGray => 1,
            Self::BgrToRgb | Self::GrayToRgb => 3,
            Self::BgraToRgba => 4,
        }
    }

    /// The intent this code implements.
    pub const fn target(self) -> ConversionTarget {
        match self {
            Self::RgbToGray | Self::RgbaToGray => ConversionTarget::RgbToGray,
            Self::BgrToGray | Self::BgraToGray => ConversionTarget::BgrToGray,
            Self::BgrToRgb | Self::BgraToRgba => ConversionTarget::BgrToRgb,
            Self::GrayToRgb => ConversionTarget::GrayToRgb,
        }
    }

    /// Numeric id passed to compute kernels.
    pub const fn id(self) -> u32 {
        self as u32
    }

    /// Inverse of [`id`](Self::id).
    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    /// Snake-case name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::RgbToGray => "rgb_to_gray",
            Self::RgbaToGray => "rgba_to_gray",
            Self::BgrToGray => "bgr_to_gray",
            Self::BgraToGray => "bgra_to_gray",
            Self::BgrToRgb => "bgr_to_rgb",
            Self::BgraToRgba => "bgra_to_rgba",
            Self::GrayToRgb => "gray_to_rgb",
        }
    }

    /// Destination byte `index` of a conversion, reading source bytes
    /// through `read`.
    ///
    /// This is the per-byte form used by compute kernels: one output byte is
    /// a pure function of the source. The host path uses
    /// [`convert_pixel`](Self::convert_pixel); both agree exactly.
    #[inline]
    pub fn converted_byte(self, read: impl Fn(usize) -> u8, index: usize) -> u8 {
        let dst_c = self.dest_channels() as usize;
        let src_c = self.source_channels() as usize;
        let pixel = index / dst_c;
        let ch = index % dst_c;
        let base = pixel * src_c;
        match self {
            Self::RgbToGray | Self::RgbaToGray => luma(read(base), read(base + 1), read(base + 2)),
            Self::BgrToGray | Self::BgraToGray => luma(read(base + 2), read(base + 1), read(base)),
            Self::BgrToRgb | Self::BgraToRgba => match ch {
                0 => read(base + 2),
                2 => read(base),
                _ => read(base + ch),
            },
            Self::GrayToRgb => read(base),
        }
    }

    /// Converts one pixel. `src` and `dst` must hold exactly one pixel each.
    #[inline]
    pub fn convert_pixel(self, src: &[u8], dst: &mut [u8]) {
        match self {
            Self::RgbToGray | Self::RgbaToGray => dst[0] = luma(src[0], src[1], src[2]),
            Self::BgrToGray | Self::BgraToGray => dst[0] = luma(src[2], src[1], src[0]),
            Self::BgrToRgb => {
                dst[0] = src[2];
                dst[1] = src[1];
                dst[2] = src[0];
            }
            Self::BgraToRgba => {
                dst[0] = src[2];
                dst[1] = src[1];
                dst[2] = src[0];
                dst[3] = src[3];
            }
            Self::GrayToRgb => dst[..3].fill(src[0]),
        }
    }
}

impl std::fmt::Display for ConversionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Picks the conversion code for `target` given the source channel count.
///
/// Pure; must be called per image rather than cached per call site, since
/// the same call site can see 3- and 4-channel frames over its lifetime.
///
/// # Errors
///
/// [`Error::UnsupportedChannelCount`] when `target` has no variant for
/// `source_channels`.
pub fn select_conversion(target: ConversionTarget, source_channels: u8) -> Result<ConversionCode> {
    use ConversionCode as C;
    use ConversionTarget as T;

    match (target, source_channels) {
        (T::RgbToGray, 3) => Ok(C::RgbToGray),
        (T::RgbToGray, 4) => Ok(C::RgbaToGray),
        (T::BgrToGray, 3) => Ok(C::BgrToGray),
        (T::BgrToGray, 4) => Ok(C::BgraToGray),
        (T::BgrToRgb, 3) => Ok(C::BgrToRgb),
        (T::BgrToRgb, 4) => Ok(C::BgraToRgba),
        (T::GrayToRgb, 1) => Ok(C::GrayToRgb),
        (target, channels) => Err(Error::unsupported_channels(
            channels,
            format!("{target:?} conversion"),
        )),
    }
}

/// Applies `code` to `src` on the host.
///
/// # Errors
///
/// [`Error::ChannelMismatch`] when `src` does not have the channel count
/// `code` reads.
pub fn convert(src: &Image, code: ConversionCode) -> Result<Image> {
    if src.channels() != code.source_channels() {
        return Err(Error::ChannelMismatch {
            expected: code.source_channels(),
            got: src.channels(),
        });
    }
    let data = convert_samples(src.data(), src.pixel_count(), code);
    Image::from_vec(data, src.width(), src.height(), code.dest_channels())
}

/// Walks `pixels` source pixels with the stride `code` implies. No channel
/// check: the caller guarantees the layout.
fn convert_samples(data: &[u8], pixels: usize, code: ConversionCode) -> Vec<u8> {
    let src_c = code.source_channels() as usize;
    let dst_c = code.dest_channels() as usize;
    let mut out = vec![0u8; pixels * dst_c];
    for (src, dst) in data
        .chunks_exact(src_c)
        .take(pixels)
        .zip(out.chunks_exact_mut(dst_c))
    {
        code.convert_pixel(src, dst);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_never_crosses_channel_counts() {
        for target in [
            ConversionTarget::RgbToGray,
            ConversionTarget::BgrToGray,
            ConversionTarget::BgrToRgb,
            ConversionTarget::GrayToRgb,
        ] {
            for channels in 0..=5u8 {
                match select_conversion(target, channels) {
                    Ok(code) => {
                        assert_eq!(code.source_channels(), channels);
                        assert_eq!(code.target(), target);
                        assert!(target.source_channels().contains(&channels));
                    }
                    Err(e) => {
                        assert!(matches!(e, Error::UnsupportedChannelCount { .. }));
                        assert!(!target.source_channels().contains(&channels));
                    }
                }
            }
        }
    }

    #[test]
    fn test_ids_roundtrip() {
        for code in ConversionCode::ALL {
            assert_eq!(ConversionCode::from_id(code.id()), Some(code));
        }
        assert_eq!(ConversionCode::from_id(99), None);
    }

    #[test]
    fn test_luma_truncates() {
        assert_eq!(luma(255, 255, 255), 255);
        assert_eq!(luma(0, 0, 0), 0);
        assert_eq!(luma(255, 0, 0), 76);
        assert_eq!(luma(0, 255, 0), 149);
        assert_eq!(luma(0, 0, 255), 29);
    }

    #[test]
    fn test_convert_rejects_wrong_layout() {
        let rgba = Image::filled(2, 2, &[255, 0, 0, 255]).unwrap();
        let err = convert(&rgba, ConversionCode::RgbToGray).unwrap_err();
        assert_eq!(err, Error::ChannelMismatch { expected: 3, got: 4 });
    }

    #[test]
    fn test_bgra_swap_keeps_alpha() {
        let bgra = Image::filled(1, 1, &[1, 2, 3, 4]).unwrap();
        let rgba = convert(&bgra, ConversionCode::BgraToRgba).unwrap();
        assert_eq!(rgba.data(), &[3, 2, 1, 4]);
    }

    #[test]
    fn test_per_byte_form_matches_per_pixel_form() {
        let data: Vec<u8> = (0..4 * 4 * 4).map(|i| (i * 37 % 256) as u8).collect();
        for code in ConversionCode::ALL {
            let c = code.source_channels();
            let src = Image::from_vec(data[..16 * c as usize].to_vec(), 4, 4, c).unwrap();
            let host = convert(&src, code).unwrap();
            let per_byte: Vec<u8> = (0..host.byte_len())
                .map(|i| code.converted_byte(|j| src.data()[j], i))
                .collect();
            assert_eq!(host.data(), per_byte.as_slice(), "{code}");
        }
    }

    /// An RGBA buffer pushed through the 3-channel code reads alpha and the
    /// next pixel's red as if they were color: a pure red opaque image stops
    /// being uniformly gray.
    #[test]
    fn test_three_channel_code_on_rgba_is_wrong() {
        let rgba = Image::filled(4, 1, &[255, 0, 0, 255]).unwrap();
        let right = convert(&rgba, ConversionCode::RgbaToGray).unwrap();
        assert!(right.data().iter().all(|&g| g == 76));

        let wrong = convert_samples(rgba.data(), rgba.pixel_count(), ConversionCode::RgbToGray);
        // pixel 1 reads bytes 3..6 = (A0, R1, G1) = (255, 255, 0)
        assert_eq!(wrong[1], luma(255, 255, 0));
        assert_ne!(wrong, right.data());
    }
}
