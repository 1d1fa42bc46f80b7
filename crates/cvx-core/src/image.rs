//! 8-bit interleaved image buffer.
//!
//! # Memory Layout
//!
//! Pixels are stored row-major, top-to-bottom, channels interleaved:
//!
//! ```text
//! 1 channel:  [Y Y Y ...]
//! 3 channels: [R G B R G B ...]
//! 4 channels: [R G B A R G B A ...]
//! ```
//!
//! The channel count is fixed at construction. Every channel-aware decision
//! in the dispatcher reads it from here, so there is no setter.
//!
//! # Usage
//!
//! ```rust
//! use cvx_core::Image;
//!
//! let mut img = Image::new(4, 2, 4).unwrap();
//! img.pixel_mut(1, 1).copy_from_slice(&[255, 0, 0, 255]);
//! assert_eq!(img.pixel(1, 1), &[255, 0, 0, 255]);
//! assert_eq!(img.byte_len(), 4 * 2 * 4);
//! ```

use crate::{Error, Result};

/// Bytes per channel sample. Only 8-bit samples are supported.
pub const SAMPLE_BYTES: usize = 1;

/// Channel counts an [`Image`] may carry.
pub const SUPPORTED_CHANNELS: [u8; 3] = [1, 3, 4];

/// Owned 8-bit image.
///
/// Invariant: `data.len() == width * height * channels * SAMPLE_BYTES`.
#[derive(Clone, PartialEq, Eq)]
pub struct Image {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
}

impl Image {
    /// Creates a zero-filled image.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidDimensions`] if width or height is zero
    /// - [`Error::UnsupportedChannelCount`] if `channels` is not 1, 3 or 4
    pub fn new(width: u32, height: u32, channels: u8) -> Result<Self> {
        let len = Self::expected_len(width, height, channels)?;
        Ok(Self {
            data: vec![0; len],
            width,
            height,
            channels,
        })
    }

    /// Wraps existing sample data.
    ///
    /// # Errors
    ///
    /// Same as [`Image::new`], plus [`Error::BufferSizeMismatch`] when the
    /// length of `data` breaks the size invariant.
    pub fn from_vec(data: Vec<u8>, width: u32, height: u32, channels: u8) -> Result<Self> {
        let expected = Self::expected_len(width, height, channels)?;
        if data.len() != expected {
            return Err(Error::BufferSizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            channels,
        })
    }

    /// Creates an image with every pixel set to `pixel`.
    ///
    /// `pixel.len()` must equal `channels`.
    pub fn filled(width: u32, height: u32, pixel: &[u8]) -> Result<Self> {
        let channels = u8::try_from(pixel.len())
            .map_err(|_| Error::unsupported_channels(u8::MAX, "Image::filled"))?;
        let mut img = Self::new(width, height, channels)?;
        for px in img.data.chunks_exact_mut(pixel.len()) {
            px.copy_from_slice(pixel);
        }
        Ok(img)
    }

    fn expected_len(width: u32, height: u32, channels: u8) -> Result<usize> {
        if width == 0 || height == 0 {
            return Err(Error::invalid_dimensions(width, height, "zero-sized image"));
        }
        if !SUPPORTED_CHANNELS.contains(&channels) {
            return Err(Error::unsupported_channels(channels, "Image"));
        }
        (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(channels as usize))
            .and_then(|n| n.checked_mul(SAMPLE_BYTES))
            .ok_or_else(|| Error::invalid_dimensions(width, height, "byte length overflows"))
    }

    /// Width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Channel count (1, 3 or 4).
    #[inline]
    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// `(width, height, channels)`.
    #[inline]
    pub fn dimensions(&self) -> (u32, u32, u8) {
        (self.width, self.height, self.channels)
    }

    /// Number of pixels.
    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Total sample bytes.
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Raw interleaved samples.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable raw samples. The length cannot change through this slice.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Consumes the image and returns its samples.
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Byte offset of pixel `(x, y)`.
    #[inline]
    pub fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * self.channels as usize
    }

    /// Samples of pixel `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinate is outside the image.
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        assert!(x < self.width && y < self.height, "pixel ({x}, {y}) out of bounds");
        let o = self.offset(x, y);
        &self.data[o..o + self.channels as usize]
    }

    /// Mutable samples of pixel `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinate is outside the image.
    #[inline]
    pub fn pixel_mut(&mut self, x: u32, y: u32) -> &mut [u8] {
        assert!(x < self.width && y < self.height, "pixel ({x}, {y}) out of bounds");
        let o = self.offset(x, y);
        let c = self.channels as usize;
        &mut self.data[o..o + c]
    }

    /// Samples of pixel `(x, y)` with coordinates clamped to the image
    /// (replicate border).
    #[inline]
    pub fn pixel_clamped(&self, x: i64, y: i64) -> &[u8] {
        let x = x.clamp(0, self.width as i64 - 1) as u32;
        let y = y.clamp(0, self.height as i64 - 1) as u32;
        self.pixel(x, y)
    }

    /// True if both images share width, height and channel count.
    pub fn same_shape(&self, other: &Image) -> bool {
        self.dimensions() == other.dimensions()
    }

    /// Rows of samples, `width * channels` bytes each.
    pub fn rows(&self) -> std::slice::ChunksExact<'_, u8> {
        self.data
            .chunks_exact(self.width as usize * self.channels as usize)
    }
}

impl std::fmt::Debug for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Image")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("channels", &self.channels)
            .field("byte_len", &self.data.len())
            .finish()
    }
}
