//! Reference oracle.
//!
//! A plain per-sample implementation of every operation, written without
//! the host backend's helpers. A backend result passes when it has the
//! reference shape and no sample is further than the operation tolerance
//! from the reference.

use cvx_compute::{
    ComputeError, ComputeResult, FlipMode, OpKind, OpParams, Registry, ThresholdType,
};
use cvx_core::Image;

const LUMA: [f64; 3] = [0.299, 0.587, 0.114];

/// Outcome of checking one result against the reference.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub op: String,
    pub pass: bool,
    pub max_diff: u8,
    pub tolerance: u8,
}

/// Reference output of `op` on `input`.
pub fn reference(op: &str, input: &Image, params: &OpParams) -> ComputeResult<Image> {
    let registry = Registry::builtin();
    let desc = registry.lookup(op)?;
    if !desc.host_channels.supports(input.channels()) {
        return Err(ComputeError::UnsupportedChannelCount {
            op: op.to_string(),
            channels: input.channels(),
        });
    }

    let (w, h, c) = input.dimensions();
    let out_c = match desc.kind {
        OpKind::RgbToGray | OpKind::BgrToGray => 1,
        OpKind::GrayToRgb => 3,
        _ => c,
    };
    let mut out = Image::new(w, h, out_c)?;

    let hist_lut = matches!(desc.kind, OpKind::EqualizeHist).then(|| equalize_lut(input));

    for y in 0..h {
        for x in 0..w {
            let px = input.pixel(x, y).to_vec();
            let at = |dx: i64, dy: i64, ch: usize| {
                input.pixel_clamped(x as i64 + dx, y as i64 + dy)[ch]
            };
            let dst = out.pixel_mut(x, y);

            match desc.kind {
                OpKind::RgbToGray => dst[0] = gray(px[0], px[1], px[2]),
                OpKind::BgrToGray => dst[0] = gray(px[2], px[1], px[0]),
                OpKind::BgrToRgb => {
                    dst.copy_from_slice(&px);
                    dst.swap(0, 2);
                }
                OpKind::GrayToRgb => dst.fill(px[0]),
                OpKind::Threshold => {
                    for (d, &v) in dst.iter_mut().zip(&px) {
                        *d = threshold(v, params);
                    }
                }
                OpKind::BitwiseNot => {
                    for (d, &v) in dst.iter_mut().zip(&px) {
                        *d = 255 - v;
                    }
                }
                OpKind::AddScalar => {
                    for (d, &v) in dst.iter_mut().zip(&px) {
                        *d = (v as i32 + params.scalar as i32).clamp(0, 255) as u8;
                    }
                }
                OpKind::ConvertScale => {
                    for (d, &v) in dst.iter_mut().zip(&px) {
                        let s = params.alpha as f64 * v as f64 + params.beta as f64;
                        *d = s.round().clamp(0.0, 255.0) as u8;
                    }
                }
                OpKind::BoxBlur => {
                    let r = (params.ksize / 2) as i64;
                    let n = ((2 * r + 1) * (2 * r + 1)) as f64;
                    for (ch, d) in dst.iter_mut().enumerate() {
                        let mut sum = 0.0;
                        for dy in -r..=r {
                            for dx in -r..=r {
                                sum += at(dx, dy, ch) as f64;
                            }
                        }
                        *d = (sum / n).round() as u8;
                    }
                }
                OpKind::Sobel => {
                    let s = |dx, dy| at(dx, dy, 0) as i32;
                    let gx = (s(1, -1) + 2 * s(1, 0) + s(1, 1))
                        - (s(-1, -1) + 2 * s(-1, 0) + s(-1, 1));
                    let gy = (s(-1, 1) + 2 * s(0, 1) + s(1, 1))
                        - (s(-1, -1) + 2 * s(0, -1) + s(1, -1));
                    dst[0] = (gx.abs() + gy.abs()).min(255) as u8;
                }
                OpKind::Erode | OpKind::Dilate | OpKind::MedianBlur => {
                    for (ch, d) in dst.iter_mut().enumerate() {
                        let mut window: Vec<u8> = (-1..=1)
                            .flat_map(|dy| (-1..=1).map(move |dx| (dx, dy)))
                            .map(|(dx, dy)| at(dx, dy, ch))
                            .collect();
                        window.sort();
                        *d = match desc.kind {
                            OpKind::Erode => window[0],
                            OpKind::Dilate => window[8],
                            _ => window[4],
                        };
                    }
                }
                OpKind::Flip => {
                    let mirror_x = matches!(params.flip, FlipMode::Horizontal | FlipMode::Both);
                    let mirror_y = matches!(params.flip, FlipMode::Vertical | FlipMode::Both);
                    let sx = if mirror_x { w - 1 - x } else { x };
                    let sy = if mirror_y { h - 1 - y } else { y };
                    dst.copy_from_slice(input.pixel(sx, sy));
                }
                OpKind::EqualizeHist => {
                    if let Some(lut) = &hist_lut {
                        dst[0] = lut[px[0] as usize];
                    }
                }
            }
        }
    }
    Ok(out)
}

/// Checks `result` of `op` on `input` against the reference.
pub fn check(op: &str, input: &Image, params: &OpParams, result: &Image) -> ComputeResult<Verdict> {
    let tolerance = Registry::builtin().lookup(op)?.tolerance();
    let expected = reference(op, input, params)?;

    let (pass, max_diff) = if expected.same_shape(result) {
        let max_diff = expected
            .data()
            .iter()
            .zip(result.data())
            .map(|(a, b)| a.abs_diff(*b))
            .max()
            .unwrap_or(0);
        (max_diff <= tolerance, max_diff)
    } else {
        (false, u8::MAX)
    };

    Ok(Verdict {
        op: op.to_string(),
        pass,
        max_diff,
        tolerance,
    })
}

fn gray(r: u8, g: u8, b: u8) -> u8 {
    (LUMA[0] * r as f64 + LUMA[1] * g as f64 + LUMA[2] * b as f64) as u8
}

fn threshold(v: u8, p: &OpParams) -> u8 {
    let above = v > p.thresh;
    match p.threshold_type {
        ThresholdType::Binary => if above { p.max_value } else { 0 },
        ThresholdType::BinaryInv => if above { 0 } else { p.max_value },
        ThresholdType::Trunc => if above { p.thresh } else { v },
        ThresholdType::ToZero => if above { v } else { 0 },
        ThresholdType::ToZeroInv => if above { 0 } else { v },
    }
}

/// `lut[v] = (cdf(v) - cdf_min) / (n - cdf_min) * 255`, all zero for a
/// single-valued image.
fn equalize_lut(input: &Image) -> [u8; 256] {
    let data = input.data();
    let n = data.len() as u64;
    let min = data.iter().copied().min().unwrap_or(0);
    let cdf_min = data.iter().filter(|&&v| v == min).count() as u64;

    let mut lut = [0u8; 256];
    if n > cdf_min {
        for (v, slot) in lut.iter_mut().enumerate() {
            let cdf = data.iter().filter(|&&s| s as usize <= v).count() as u64;
            *slot = (cdf.saturating_sub(cdf_min) as f64 / (n - cdf_min) as f64 * 255.0) as u8;
        }
    }
    lut
}

#[cfg(test)]
mod tests {
    use super::*;
    use cvx_core::Pattern;

    #[test]
    fn test_reference_gray() {
        let img = Image::filled(2, 2, &[255, 0, 0, 255]).unwrap();
        let out = reference("rgb_to_gray", &img, &OpParams::default()).unwrap();
        assert_eq!(out.data(), &[76, 76, 76, 76]);

        let out = reference("bgr_to_gray", &img, &OpParams::default()).unwrap();
        assert_eq!(out.data(), &[29, 29, 29, 29]);
    }

    #[test]
    fn test_check_rejects_wrong_shape_and_values() {
        let img = Pattern::Gradient.generate(8, 8, 3).unwrap();
        let p = OpParams::default();

        let good = reference("bitwise_not", &img, &p).unwrap();
        assert!(check("bitwise_not", &img, &p, &good).unwrap().pass);

        let verdict = check("bitwise_not", &img, &p, &img).unwrap();
        assert!(!verdict.pass);

        let gray = Image::new(8, 8, 1).unwrap();
        let verdict = check("bitwise_not", &img, &p, &gray).unwrap();
        assert_eq!(verdict.max_diff, u8::MAX);
    }

    #[test]
    fn test_reference_equalize_uniform() {
        let img = Image::filled(4, 4, &[42]).unwrap();
        let out = reference("equalize_hist", &img, &OpParams::default()).unwrap();
        assert!(out.data().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_reference_rejects_channels() {
        let img = Image::new(2, 2, 3).unwrap();
        assert!(matches!(
            reference("sobel", &img, &OpParams::default()),
            Err(ComputeError::UnsupportedChannelCount { channels: 3, .. })
        ));
    }
}
