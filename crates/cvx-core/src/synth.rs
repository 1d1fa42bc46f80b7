//! Deterministic synthetic images.
//!
//! Used by the parity sweep, the CLI and the integration tests. Every
//! pattern is a pure function of `(width, height, channels)` plus its own
//! parameters, so two runs always produce identical bytes.
//!
//! Patterns are defined as RGBA and truncated to the requested channel
//! count: 1 channel keeps R, 3 keeps RGB, 4 keeps RGBA.
//!
//! ```rust
//! use cvx_core::Pattern;
//!
//! let img = Pattern::Gradient.generate(512, 512, 4).unwrap();
//! assert_eq!(img.pixel(511, 0)[0], 255);
//! assert_eq!(img.pixel(0, 511)[1], 255);
//! ```

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::{Image, Result};

/// Alpha written by every pattern except [`Pattern::Solid`] and [`Pattern::Noise`].
pub const OPAQUE: u8 = 255;

/// A synthetic image recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    /// Every pixel set to the given RGBA value.
    Solid([u8; 4]),
    /// Red ramps along x, green along y, blue along the diagonal.
    ///
    /// ```text
    /// R = x * 255 / (w - 1)
    /// G = y * 255 / (h - 1)
    /// B = (x + y) * 255 / (w + h - 2)
    /// ```
    Gradient,
    /// Alternating black and white squares of `cell` pixels.
    Checkerboard {
        /// Square edge in pixels (0 is treated as 1)
        cell: u32,
    },
    /// Uniform noise on every sample, alpha included.
    ///
    /// Bytes come from a ChaCha8 stream seeded with `seed`, which is stable
    /// across `rand_chacha` releases.
    Noise {
        /// Generator seed
        seed: u64,
    },
}

impl Pattern {
    /// The corpus used for parity sweeps: two solids, a gradient, a
    /// checkerboard and noise.
    pub const CORPUS: [Pattern; 5] = [
        Pattern::Solid([0, 0, 0, 255]),
        Pattern::Solid([200, 100, 50, 128]),
        Pattern::Gradient,
        Pattern::Checkerboard { cell: 8 },
        Pattern::Noise { seed: 0x5eed },
    ];

    /// Short name for logs and reports.
    pub fn name(&self) -> &'static str {
        match self {
            Pattern::Solid(_) => "solid",
            Pattern::Gradient => "gradient",
            Pattern::Checkerboard { .. } => "checker",
            Pattern::Noise { .. } => "noise",
        }
    }

    /// Renders the pattern.
    ///
    /// # Errors
    ///
    /// Whatever [`Image::new`] rejects: zero dimensions or a channel count
    /// other than 1, 3 or 4.
    pub fn generate(&self, width: u32, height: u32, channels: u8) -> Result<Image> {
        let mut img = Image::new(width, height, channels)?;
        let c = channels as usize;

        if let Pattern::Noise { seed } = *self {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            rng.fill(img.data_mut());
            return Ok(img);
        }

        for (y, row) in img.data_mut().chunks_exact_mut(width as usize * c).enumerate() {
            for (x, px) in row.chunks_exact_mut(c).enumerate() {
                let rgba = self.rgba(x as u32, y as u32, width, height);
                px.copy_from_slice(&rgba[..c]);
            }
        }
        Ok(img)
    }

    /// RGBA value at `(x, y)`. Noise has no closed form and returns zero.
    pub fn rgba(&self, x: u32, y: u32, width: u32, height: u32) -> [u8; 4] {
        match *self {
            Pattern::Solid(px) => px,
            Pattern::Gradient => {
                let ramp = |v: u32, span: u32| (v as u64 * 255 / span.max(1) as u64) as u8;
                [
                    ramp(x, width - 1),
                    ramp(y, height - 1),
                    ramp(x + y, width + height - 2),
                    OPAQUE,
                ]
            }
            Pattern::Checkerboard { cell } => {
                let cell = cell.max(1);
                let v = if (x / cell + y / cell) % 2 == 0 { 255 } else { 0 };
                [v, v, v, OPAQUE]
            }
            Pattern::Noise { .. } => [0; 4],
        }
    }
}

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Pattern::Solid(px) => write!(f, "solid{px:?}"),
            Pattern::Checkerboard { cell } => write!(f, "checker({cell})"),
            Pattern::Noise { seed } => write!(f, "noise({seed:#x})"),
            Pattern::Gradient => f.write_str("gradient"),
        }
    }
}
