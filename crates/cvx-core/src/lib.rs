//! # cvx-core
//!
//! Core types shared by every cvx crate.
//!
//! - [`Image`] - 8-bit interleaved image with an immutable channel count
//! - [`WordBuffer`] / [`WordSlot`] - byte-addressable view over 32-bit words,
//!   the only way compute kernels touch pixel memory
//! - [`ConversionCode`], [`ConversionTarget`], [`select_conversion`] -
//!   channel-aware color conversion selection
//! - [`synth`] - deterministic synthetic patterns (solid, gradient,
//!   checkerboard, noise)
//! - [`digest()`] - SHA256 of an image's shape and samples
//!
//! ## Crate Structure
//!
//! ```text
//! cvx-core (this crate)
//!    ^
//!    |
//!    +-- cvx-compute (registry, backends, dispatcher)
//!    +-- cvx-cli
//!    +-- cvx-tests
//! ```
//!
//! ## Memory model
//!
//! Host code sees an image as a flat `[u8]` sample array. Compute kernels see
//! the same bytes packed little-endian into `u32` words:
//!
//! ```text
//! bytes:  R0 G0 B0 A0 | R1 G1 B1 A1 | ...
//! words:  w0          | w1          | ...
//! byte i  -> word i / 4, bits 8 * (i % 4) .. 8 * (i % 4) + 8
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod buffer;
pub mod color;
pub mod digest;
pub mod error;
pub mod image;
pub mod synth;

pub use buffer::{byte_in_word, word_with_byte, WordBuffer, WordSlot, WORD_BYTES};
pub use color::{luma, select_conversion, ConversionCode, ConversionTarget};
pub use digest::digest;
pub use error::{Error, Result};
pub use image::{Image, SAMPLE_BYTES, SUPPORTED_CHANNELS};
pub use synth::Pattern;

/// Prelude module for convenient imports.
///
/// ```
/// use cvx_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::buffer::{WordBuffer, WordSlot};
    pub use crate::color::{select_conversion, ConversionCode, ConversionTarget};
    pub use crate::error::{Error, Result};
    pub use crate::image::Image;
    pub use crate::synth::Pattern;
}
