//! Host backend using rayon for parallelization.
//!
//! One function per operation, each total over the channel counts its
//! descriptor lists. This path is the ground truth for fallback and parity.

use rayon::prelude::*;
use tracing::trace;

use cvx_core::{color, select_conversion, ConversionTarget, Image};

use crate::params::OpParams;
use crate::registry::{OpKind, OperationDescriptor};
use crate::{ComputeError, ComputeResult};

/// Runs `desc` on the host.
///
/// # Errors
///
/// - [`ComputeError::UnsupportedChannelCount`] when the descriptor does not
///   accept `src.channels()`
/// - [`ComputeError::InvalidParameter`] when `params` fail validation
pub fn execute(desc: &OperationDescriptor, src: &Image, params: &OpParams) -> ComputeResult<Image> {
    let (width, height, channels) = src.dimensions();
    trace!(op = desc.name, width, height, channels, "host::execute");

    if !desc.host_channels.supports(channels) {
        return Err(ComputeError::unsupported(desc.name, channels));
    }
    params.validate(desc.kind)?;

    match desc.kind {
        OpKind::RgbToGray => convert(desc.name, src, ConversionTarget::RgbToGray),
        OpKind::BgrToGray => convert(desc.name, src, ConversionTarget::BgrToGray),
        OpKind::BgrToRgb => convert(desc.name, src, ConversionTarget::BgrToRgb),
        OpKind::GrayToRgb => convert(desc.name, src, ConversionTarget::GrayToRgb),
        OpKind::Threshold => {
            let (t, m, kind) = (params.thresh, params.max_value, params.threshold_type);
            Ok(map_samples(src, |v| kind.apply(v, t, m)))
        }
        OpKind::BitwiseNot => Ok(map_samples(src, |v| !v)),
        OpKind::AddScalar => {
            let s = params.scalar as i32;
            Ok(map_samples(src, |v| (v as i32 + s).clamp(0, 255) as u8))
        }
        OpKind::ConvertScale => {
            let (alpha, beta) = (params.alpha, params.beta);
            Ok(map_samples(src, |v| scale_sample(v, alpha, beta)))
        }
        OpKind::BoxBlur => Ok(box_blur(src, params.ksize)),
        OpKind::Sobel => Ok(sobel(src)),
        OpKind::Erode => Ok(morph(src, u8::min)),
        OpKind::Dilate => Ok(morph(src, u8::max)),
        OpKind::Flip => Ok(flip(src, params)),
        OpKind::EqualizeHist => Ok(equalize_hist(src)),
        OpKind::MedianBlur => Ok(median3(src)),
    }
}

/// `saturate(round(alpha * v + beta))` in `f32`.
#[inline]
pub fn scale_sample(v: u8, alpha: f32, beta: f32) -> u8 {
    (alpha * v as f32 + beta).round().clamp(0.0, 255.0) as u8
}

fn convert(op: &str, src: &Image, target: ConversionTarget) -> ComputeResult<Image> {
    let code = select_conversion(target, src.channels())
        .map_err(|_| ComputeError::unsupported(op, src.channels()))?;
    Ok(color::convert(src, code)?)
}

fn map_samples(src: &Image, f: impl Fn(u8) -> u8 + Sync) -> Image {
    let mut dst = src.clone();
    dst.data_mut().par_iter_mut().for_each(|v| *v = f(*v));
    dst
}

/// Builds a same-shape image row by row; `f(x, y, ch)` yields one sample.
fn map_pixels(src: &Image, f: impl Fn(u32, u32, usize) -> u8 + Sync) -> Image {
    let mut dst = src.clone();
    let (w, _, c) = src.dimensions();
    let c = c as usize;
    dst.data_mut()
        .par_chunks_mut(w as usize * c)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, px) in row.chunks_exact_mut(c).enumerate() {
                for (ch, out) in px.iter_mut().enumerate() {
                    *out = f(x as u32, y as u32, ch);
                }
            }
        });
    dst
}

fn box_blur(src: &Image, ksize: u32) -> Image {
    let r = (ksize / 2) as i64;
    let area = ksize * ksize;
    map_pixels(src, |x, y, ch| {
        let mut sum = 0u32;
        for dy in -r..=r {
            for dx in -r..=r {
                sum += src.pixel_clamped(x as i64 + dx, y as i64 + dy)[ch] as u32;
            }
        }
        ((sum + area / 2) / area) as u8
    })
}

fn sobel(src: &Image) -> Image {
    map_pixels(src, |x, y, _| {
        let p = |dx: i64, dy: i64| src.pixel_clamped(x as i64 + dx, y as i64 + dy)[0] as i32;
        let gx = (p(1, -1) + 2 * p(1, 0) + p(1, 1)) - (p(-1, -1) + 2 * p(-1, 0) + p(-1, 1));
        let gy = (p(-1, 1) + 2 * p(0, 1) + p(1, 1)) - (p(-1, -1) + 2 * p(0, -1) + p(1, -1));
        (gx.abs() + gy.abs()).min(255) as u8
    })
}

fn morph(src: &Image, pick: fn(u8, u8) -> u8) -> Image {
    map_pixels(src, |x, y, ch| {
        let mut acc = src.pixel(x, y)[ch];
        for dy in -1..=1 {
            for dx in -1..=1 {
                acc = pick(acc, src.pixel_clamped(x as i64 + dx, y as i64 + dy)[ch]);
            }
        }
        acc
    })
}

fn median3(src: &Image) -> Image {
    map_pixels(src, |x, y, ch| {
        let mut window = [0u8; 9];
        let mut k = 0;
        for dy in -1..=1 {
            for dx in -1..=1 {
                window[k] = src.pixel_clamped(x as i64 + dx, y as i64 + dy)[ch];
                k += 1;
            }
        }
        window.sort_unstable();
        window[4]
    })
}

fn flip(src: &Image, params: &OpParams) -> Image {
    let (w, h, _) = src.dimensions();
    let mode = params.flip;
    map_pixels(src, |x, y, ch| {
        let fx = if mode.flips_x() { w - 1 - x } else { x };
        let fy = if mode.flips_y() { h - 1 - y } else { y };
        src.pixel(fx, fy)[ch]
    })
}

/// Histogram equalization with the classic CDF mapping; a uniform image
/// maps to zero.
fn equalize_hist(src: &Image) -> Image {
    let mut hist = [0u32; 256];
    for &v in src.data() {
        hist[v as usize] += 1;
    }

    let mut cdf = [0u32; 256];
    let mut acc = 0u32;
    for (c, h) in cdf.iter_mut().zip(hist) {
        acc += h;
        *c = acc;
    }

    let total = src.pixel_count() as u32;
    let cdf_min = cdf.iter().copied().find(|&c| c > 0).unwrap_or(0);
    let mut lut = [0u8; 256];
    if total > cdf_min {
        for (l, &c) in lut.iter_mut().zip(&cdf) {
            *l = (c.saturating_sub(cdf_min) as f64 / (total - cdf_min) as f64 * 255.0) as u8;
        }
    }

    map_samples(src, |v| lut[v as usize])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use cvx_core::Pattern;

    fn run(op: &str, img: &Image, params: &OpParams) -> ComputeResult<Image> {
        let reg = Registry::builtin();
        execute(reg.lookup(op).unwrap(), img, params)
    }

    #[test]
    fn test_gray_is_channel_aware() {
        let rgba = Image::filled(3, 3, &[255, 0, 0, 255]).unwrap();
        let gray = run("rgb_to_gray", &rgba, &OpParams::default()).unwrap();
        assert_eq!(gray.channels(), 1);
        assert!(gray.data().iter().all(|&v| v == 76));

        let bgra = Image::filled(3, 3, &[255, 0, 0, 255]).unwrap();
        let gray = run("bgr_to_gray", &bgra, &OpParams::default()).unwrap();
        assert!(gray.data().iter().all(|&v| v == 29));
    }

    #[test]
    fn test_unsupported_channels() {
        let gray = Image::new(4, 4, 1).unwrap();
        let err = run("rgb_to_gray", &gray, &OpParams::default()).unwrap_err();
        assert_eq!(err, ComputeError::unsupported("rgb_to_gray", 1));

        let rgb = Image::new(4, 4, 3).unwrap();
        assert!(run("sobel", &rgb, &OpParams::default()).is_err());
    }

    #[test]
    fn test_add_scalar_saturates() {
        let img = Image::from_vec(vec![0, 100, 250], 3, 1, 1).unwrap();
        let up = run("add_scalar", &img, &OpParams::default().scalar(10)).unwrap();
        assert_eq!(up.data(), &[10, 110, 255]);
        let down = run("add_scalar", &img, &OpParams::default().scalar(-120)).unwrap();
        assert_eq!(down.data(), &[0, 0, 130]);
    }

    #[test]
    fn test_convert_scale_rounds() {
        assert_eq!(scale_sample(3, 0.5, 0.0), 2);
        assert_eq!(scale_sample(200, 2.0, 0.0), 255);
        assert_eq!(scale_sample(10, 1.0, -20.0), 0);
    }

    #[test]
    fn test_box_blur_of_solid_is_identity() {
        let img = Pattern::Solid([40, 80, 120, 160]).generate(9, 7, 4).unwrap();
        let out = run("box_blur", &img, &OpParams::default().ksize(5)).unwrap();
        assert_eq!(out, img);
    }

    #[test]
    fn test_sobel_flat_is_zero_edge_is_strong() {
        let flat = Image::filled(5, 5, &[90]).unwrap();
        let out = run("sobel", &flat, &OpParams::default()).unwrap();
        assert!(out.data().iter().all(|&v| v == 0));

        let mut step = Image::new(6, 3, 1).unwrap();
        for y in 0..3 {
            for x in 3..6 {
                step.pixel_mut(x, y)[0] = 255;
            }
        }
        let out = run("sobel", &step, &OpParams::default()).unwrap();
        assert_eq!(out.pixel(2, 1), &[255]);
        assert_eq!(out.pixel(0, 1), &[0]);
    }

    #[test]
    fn test_morphology() {
        let mut img = Image::new(5, 5, 1).unwrap();
        img.pixel_mut(2, 2)[0] = 200;
        let dilated = run("dilate", &img, &OpParams::default()).unwrap();
        assert_eq!(dilated.pixel(1, 1), &[200]);
        assert_eq!(dilated.pixel(0, 0), &[0]);
        let eroded = run("erode", &dilated, &OpParams::default()).unwrap();
        assert_eq!(eroded.pixel(2, 2), &[200]);
        assert_eq!(eroded.pixel(1, 1), &[0]);
    }

    #[test]
    fn test_flip_both_twice_is_identity() {
        let img = Pattern::Gradient.generate(7, 5, 3).unwrap();
        let p = OpParams::default().flip(crate::params::FlipMode::Both);
        let once = run("flip", &img, &p).unwrap();
        assert_eq!(once.pixel(0, 0), img.pixel(6, 4));
        let twice = run("flip", &once, &p).unwrap();
        assert_eq!(twice, img);
    }

    #[test]
    fn test_equalize_hist() {
        let img = Image::from_vec(vec![10, 10, 20, 30], 2, 2, 1).unwrap();
        let out = run("equalize_hist", &img, &OpParams::default()).unwrap();
        assert_eq!(out.data(), &[0, 0, 127, 255]);

        let flat = Image::filled(3, 3, &[77]).unwrap();
        let out = run("equalize_hist", &flat, &OpParams::default()).unwrap();
        assert!(out.data().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_median_removes_speck() {
        let mut img = Image::filled(5, 5, &[50, 50, 50]).unwrap();
        img.pixel_mut(2, 2).copy_from_slice(&[255, 0, 255]);
        let out = run("median_blur", &img, &OpParams::default()).unwrap();
        assert_eq!(out.pixel(2, 2), &[50, 50, 50]);
    }
}
