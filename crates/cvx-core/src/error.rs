//! Error types for cvx-core operations.
//!
//! The [`Error`] enum covers failures of image construction, byte-level
//! buffer addressing and color conversion selection.
//!
//! # Usage
//!
//! ```rust
//! use cvx_core::{Error, Result};
//!
//! fn check_channels(channels: u8) -> Result<()> {
//!     if !matches!(channels, 1 | 3 | 4) {
//!         return Err(Error::unsupported_channels(channels, "image"));
//!     }
//!     Ok(())
//! }
//!
//! assert!(check_channels(2).is_err());
//! ```

use thiserror::Error;

/// Result type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by core image and buffer types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// Raw sample data length does not match `width * height * channels`.
    #[error("buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSizeMismatch {
        /// Expected byte length
        expected: usize,
        /// Actual byte length
        actual: usize,
    },

    /// Width or height is zero or the byte length overflows `usize`.
    #[error("invalid dimensions: {width}x{height} ({reason})")]
    InvalidDimensions {
        /// Requested width
        width: u32,
        /// Requested height
        height: u32,
        /// Why the dimensions were rejected
        reason: String,
    },

    /// Channel count outside what the caller supports.
    ///
    /// Raised by [`Image`](crate::Image) construction (only 1, 3 and 4 are
    /// valid) and by [`select_conversion`](crate::select_conversion) when a
    /// conversion has no variant for the source channel count.
    #[error("unsupported channel count {channels} for {context}")]
    UnsupportedChannelCount {
        /// Offending channel count
        channels: u8,
        /// Operation or type that rejected it
        context: String,
    },

    /// A conversion code was applied to an image with a different channel count.
    #[error("channel mismatch: expected {expected}, got {got}")]
    ChannelMismatch {
        /// Channel count the code expects
        expected: u8,
        /// Channel count of the image
        got: u8,
    },

    /// Byte index outside `[0, len)` of a word buffer, or outside the word
    /// owned by a [`WordSlot`](crate::WordSlot).
    #[error("byte index {index} out of range (len {len})")]
    ByteIndexOutOfRange {
        /// Requested byte index
        index: usize,
        /// Valid length
        len: usize,
    },
}

impl Error {
    /// Creates an [`UnsupportedChannelCount`](Error::UnsupportedChannelCount) error.
    pub fn unsupported_channels(channels: u8, context: impl Into<String>) -> Self {
        Self::UnsupportedChannelCount {
            channels,
            context: context.into(),
        }
    }

    /// Creates an [`InvalidDimensions`](Error::InvalidDimensions) error.
    pub fn invalid_dimensions(width: u32, height: u32, reason: impl Into<String>) -> Self {
        Self::InvalidDimensions {
            width,
            height,
            reason: reason.into(),
        }
    }

    /// Returns true for channel-count related errors.
    pub fn is_channel_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedChannelCount { .. } | Self::ChannelMismatch { .. }
        )
    }
}
