//! Host/GPU result comparison.
//!
//! Two results agree when their shapes match and no sample differs by more
//! than the operation class tolerance (see [`OpClass::tolerance`]).
//!
//! [`OpClass::tolerance`]: crate::OpClass::tolerance

use std::fmt;

use cvx_core::Image;

/// Per-sample difference statistics between two images.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    /// Width, height and channel count are equal.
    pub shape_match: bool,
    /// Largest absolute sample difference.
    pub max_diff: u8,
    /// Samples whose difference exceeds the tolerance.
    pub mismatched: usize,
    /// Mean absolute sample difference.
    pub mean_abs_diff: f64,
    /// `(x, y, channel)` of the first sample over tolerance.
    pub first_mismatch: Option<(u32, u32, u8)>,
    /// Tolerance the comparison was made with.
    pub tolerance: u8,
}

impl Comparison {
    /// True when shapes match and every sample is within tolerance.
    pub fn within_tolerance(&self) -> bool {
        self.shape_match && self.mismatched == 0
    }
}

/// Compare `a` against `b` sample by sample.
pub fn compare(a: &Image, b: &Image, tolerance: u8) -> Comparison {
    if !a.same_shape(b) {
        return Comparison {
            shape_match: false,
            max_diff: u8::MAX,
            mismatched: a.byte_len().max(b.byte_len()),
            mean_abs_diff: f64::from(u8::MAX),
            first_mismatch: None,
            tolerance,
        };
    }

    let channels = a.channels() as usize;
    let width = a.width() as usize;
    let mut max_diff = 0u8;
    let mut sum = 0u64;
    let mut mismatched = 0usize;
    let mut first_mismatch = None;

    for (i, (&va, &vb)) in a.data().iter().zip(b.data()).enumerate() {
        let d = va.abs_diff(vb);
        max_diff = max_diff.max(d);
        sum += d as u64;
        if d > tolerance {
            mismatched += 1;
            if first_mismatch.is_none() {
                let pixel = i / channels;
                first_mismatch = Some((
                    (pixel % width) as u32,
                    (pixel / width) as u32,
                    (i % channels) as u8,
                ));
            }
        }
    }

    let n = a.byte_len().max(1) as f64;
    Comparison {
        shape_match: true,
        max_diff,
        mismatched,
        mean_abs_diff: sum as f64 / n,
        first_mismatch,
        tolerance,
    }
}

/// Host and GPU results for one call disagreed beyond tolerance.
///
/// Reported alongside the host result; never an error.
#[derive(Debug, Clone, PartialEq)]
pub struct Divergence {
    pub op: String,
    pub comparison: Comparison,
}

impl Divergence {
    pub fn max_diff(&self) -> u8 {
        self.comparison.max_diff
    }

    pub fn mismatched(&self) -> usize {
        self.comparison.mismatched
    }
}

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.comparison;
        if !c.shape_match {
            return write!(f, "{}: backend outputs differ in shape", self.op);
        }
        write!(
            f,
            "{}: {} samples over tolerance {} (max diff {})",
            self.op, c.mismatched, c.tolerance, c.max_diff
        )?;
        if let Some((x, y, ch)) = c.first_mismatch {
            write!(f, ", first at ({x}, {y}) channel {ch}")?;
        }
        Ok(())
    }
}
