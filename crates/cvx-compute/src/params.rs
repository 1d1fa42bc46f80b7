//! Operation parameters.

use std::str::FromStr;

use crate::registry::OpKind;
use crate::{ComputeError, ComputeResult};

/// Largest accepted box filter size.
pub const MAX_KSIZE: u32 = 31;

/// Threshold rule applied per sample, with `t = thresh`, `m = max_value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum ThresholdType {
    /// `v > t ? m : 0`
    #[default]
    Binary = 0,
    /// `v > t ? 0 : m`
    BinaryInv = 1,
    /// `v > t ? t : v`
    Trunc = 2,
    /// `v > t ? v : 0`
    ToZero = 3,
    /// `v > t ? 0 : v`
    ToZeroInv = 4,
}

impl ThresholdType {
    pub const ALL: [ThresholdType; 5] = [
        Self::Binary,
        Self::BinaryInv,
        Self::Trunc,
        Self::ToZero,
        Self::ToZeroInv,
    ];

    /// Applies the rule to one sample.
    #[inline]
    pub fn apply(self, v: u8, thresh: u8, max_value: u8) -> u8 {
        let above = v > thresh;
        match self {
            Self::Binary => if above { max_value } else { 0 },
            Self::BinaryInv => if above { 0 } else { max_value },
            Self::Trunc => if above { thresh } else { v },
            Self::ToZero => if above { v } else { 0 },
            Self::ToZeroInv => if above { 0 } else { v },
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Binary => "binary",
            Self::BinaryInv => "binary_inv",
            Self::Trunc => "trunc",
            Self::ToZero => "tozero",
            Self::ToZeroInv => "tozero_inv",
        }
    }
}

impl FromStr for ThresholdType {
    type Err = ComputeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ComputeError::InvalidParameter(format!("unknown threshold type '{s}'")))
    }
}

/// Mirror axis for `flip`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum FlipMode {
    /// Mirror left-right.
    #[default]
    Horizontal = 0,
    /// Mirror top-bottom.
    Vertical = 1,
    /// Rotate by 180 degrees.
    Both = 2,
}

impl FlipMode {
    pub fn flips_x(self) -> bool {
        matches!(self, Self::Horizontal | Self::Both)
    }

    pub fn flips_y(self) -> bool {
        matches!(self, Self::Vertical | Self::Both)
    }
}

impl FromStr for FlipMode {
    type Err = ComputeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "h" | "horizontal" => Ok(Self::Horizontal),
            "v" | "vertical" => Ok(Self::Vertical),
            "both" | "hv" => Ok(Self::Both),
            _ => Err(ComputeError::InvalidParameter(format!("unknown flip mode '{s}'"))),
        }
    }
}

/// Parameters shared by every operation. Each operation reads the fields it
/// needs and ignores the rest.
///
/// ```
/// use cvx_compute::{OpParams, ThresholdType};
///
/// let p = OpParams::default()
///     .thresh(90)
///     .threshold_type(ThresholdType::ToZero);
/// assert_eq!(p.thresh, 90);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpParams {
    pub thresh: u8,
    pub max_value: u8,
    pub threshold_type: ThresholdType,
    /// Box filter size, odd.
    pub ksize: u32,
    /// Signed addend for `add_scalar`.
    pub scalar: i16,
    pub alpha: f32,
    pub beta: f32,
    pub flip: FlipMode,
}

impl Default for OpParams {
    fn default() -> Self {
        Self {
            thresh: 127,
            max_value: 255,
            threshold_type: ThresholdType::Binary,
            ksize: 3,
            scalar: 0,
            alpha: 1.0,
            beta: 0.0,
            flip: FlipMode::Horizontal,
        }
    }
}

impl OpParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn thresh(mut self, thresh: u8) -> Self {
        self.thresh = thresh;
        self
    }

    pub fn max_value(mut self, max_value: u8) -> Self {
        self.max_value = max_value;
        self
    }

    pub fn threshold_type(mut self, kind: ThresholdType) -> Self {
        self.threshold_type = kind;
        self
    }

    pub fn ksize(mut self, ksize: u32) -> Self {
        self.ksize = ksize;
        self
    }

    pub fn scalar(mut self, scalar: i16) -> Self {
        self.scalar = scalar;
        self
    }

    /// Sets `alpha` and `beta` for `convert_scale`.
    pub fn scale(mut self, alpha: f32, beta: f32) -> Self {
        self.alpha = alpha;
        self.beta = beta;
        self
    }

    pub fn flip(mut self, mode: FlipMode) -> Self {
        self.flip = mode;
        self
    }

    /// Checks the fields `kind` reads.
    pub fn validate(&self, kind: OpKind) -> ComputeResult<()> {
        match kind {
            OpKind::BoxBlur => {
                if self.ksize == 0 || self.ksize % 2 == 0 || self.ksize > MAX_KSIZE {
                    return Err(ComputeError::InvalidParameter(format!(
                        "ksize must be odd and in 1..={MAX_KSIZE}, got {}",
                        self.ksize
                    )));
                }
            }
            OpKind::AddScalar => {
                if !(-255..=255).contains(&self.scalar) {
                    return Err(ComputeError::InvalidParameter(format!(
                        "scalar must be in -255..=255, got {}",
                        self.scalar
                    )));
                }
            }
            OpKind::ConvertScale => {
                if !self.alpha.is_finite() || !self.beta.is_finite() {
                    return Err(ComputeError::InvalidParameter(format!(
                        "alpha and beta must be finite, got {} and {}",
                        self.alpha, self.beta
                    )));
                }
            }
            _ => {}
        }
        Ok(())
    }
}
