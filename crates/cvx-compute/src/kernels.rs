//! Compute kernels.
//!
//! A [`Kernel`] is one compute entry point for one (operation, channel
//! variant) pair. It exists twice: as a Rust per-byte body run by
//! [`SoftwareDevice`](crate::SoftwareDevice), and as a WGSL body composed
//! into a full shader for the wgpu device. Both compute output byte `i` as a
//! pure function of the source, read through the word-buffer byte accessors.

use cvx_core::{select_conversion, ConversionCode, ConversionTarget, Image, WordBuffer};

use crate::backend::cpu_backend::scale_sample;
use crate::backend::KernelParams;
use crate::params::{FlipMode, OpParams, ThresholdType};
use crate::registry::{OpKind, OperationDescriptor};
use crate::{ComputeError, ComputeResult};

/// One GPU entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kernel {
    /// Color conversion with a fixed source layout.
    Convert(ConversionCode),
    Threshold,
    BitwiseNot,
    AddScalar,
    ConvertScale,
    BoxBlur,
    Sobel,
    Erode,
    Dilate,
    Flip,
}

impl Kernel {
    /// Kernel for `desc` at `channels`, or `None` when the operation has no
    /// GPU kernel for that channel count.
    ///
    /// Color conversions go through [`select_conversion`] on every call, so
    /// a 4-channel image can never reach a 3-channel kernel.
    pub fn for_operation(
        desc: &OperationDescriptor,
        channels: u8,
    ) -> ComputeResult<Option<Kernel>> {
        if !desc.capability().gpu_supports(channels) {
            return Ok(None);
        }
        let convert = |target| {
            select_conversion(target, channels)
                .map(|code| Some(Kernel::Convert(code)))
                .map_err(|_| ComputeError::unsupported(desc.name, channels))
        };
        match desc.kind {
            OpKind::RgbToGray => convert(ConversionTarget::RgbToGray),
            OpKind::BgrToGray => convert(ConversionTarget::BgrToGray),
            OpKind::BgrToRgb => convert(ConversionTarget::BgrToRgb),
            OpKind::GrayToRgb => convert(ConversionTarget::GrayToRgb),
            OpKind::Threshold => Ok(Some(Kernel::Threshold)),
            OpKind::BitwiseNot => Ok(Some(Kernel::BitwiseNot)),
            OpKind::AddScalar => Ok(Some(Kernel::AddScalar)),
            OpKind::ConvertScale => Ok(Some(Kernel::ConvertScale)),
            OpKind::BoxBlur => Ok(Some(Kernel::BoxBlur)),
            OpKind::Sobel => Ok(Some(Kernel::Sobel)),
            OpKind::Erode => Ok(Some(Kernel::Erode)),
            OpKind::Dilate => Ok(Some(Kernel::Dilate)),
            OpKind::Flip => Ok(Some(Kernel::Flip)),
            OpKind::EqualizeHist | OpKind::MedianBlur => Ok(None),
        }
    }

    /// Every kernel, conversion variants included.
    pub fn all() -> Vec<Kernel> {
        let mut kernels: Vec<Kernel> =
            ConversionCode::ALL.into_iter().map(Kernel::Convert).collect();
        kernels.extend([
            Kernel::Threshold,
            Kernel::BitwiseNot,
            Kernel::AddScalar,
            Kernel::ConvertScale,
            Kernel::BoxBlur,
            Kernel::Sobel,
            Kernel::Erode,
            Kernel::Dilate,
            Kernel::Flip,
        ]);
        kernels
    }

    pub fn label(&self) -> &'static str {
        match self {
            Kernel::Convert(code) => code.name(),
            Kernel::Threshold => "threshold",
            Kernel::BitwiseNot => "bitwise_not",
            Kernel::AddScalar => "add_scalar",
            Kernel::ConvertScale => "convert_scale",
            Kernel::BoxBlur => "box_blur",
            Kernel::Sobel => "sobel",
            Kernel::Erode => "erode",
            Kernel::Dilate => "dilate",
            Kernel::Flip => "flip",
        }
    }

    /// Output channel count for an input with `channels`.
    pub fn output_channels(&self, channels: u8) -> u8 {
        match self {
            Kernel::Convert(code) => code.dest_channels(),
            _ => channels,
        }
    }

    /// Uniform values for a launch over `src`.
    ///
    /// | kernel | params |
    /// |---|---|
    /// | threshold | `[thresh, max_value, type]` |
    /// | add_scalar | `[scalar]` |
    /// | convert_scale | `[alpha, beta]` |
    /// | box_blur | `[ksize]` |
    /// | flip | `[mode]` |
    pub fn params(&self, src: &Image, p: &OpParams) -> KernelParams {
        let (w, h, c) = src.dimensions();
        let base = KernelParams::new(w, h, c as u32, self.output_channels(c) as u32);
        match self {
            Kernel::Threshold => base
                .with(0, p.thresh as f32)
                .with(1, p.max_value as f32)
                .with(2, p.threshold_type as u32 as f32),
            Kernel::AddScalar => base.with(0, p.scalar as f32),
            Kernel::ConvertScale => base.with(0, p.alpha).with(1, p.beta),
            Kernel::BoxBlur => base.with(0, p.ksize as f32),
            Kernel::Flip => base.with(0, p.flip as u32 as f32),
            _ => base,
        }
    }

    /// Output byte `i`.
    ///
    /// Reads `src` only through [`WordBuffer::read_byte`].
    pub fn compute_byte(&self, src: &WordBuffer, i: usize, p: &KernelParams) -> u8 {
        let grid = Grid::new(p);
        match *self {
            Kernel::Convert(code) => code.converted_byte(|j| src.read_byte(j), i),
            Kernel::Threshold => {
                let kind = ThresholdType::ALL
                    .get(p.params[2] as usize)
                    .copied()
                    .unwrap_or_default();
                kind.apply(src.read_byte(i), p.params[0] as u8, p.params[1] as u8)
            }
            Kernel::BitwiseNot => 255 - src.read_byte(i),
            Kernel::AddScalar => (src.read_byte(i) as i32 + p.params[0] as i32).clamp(0, 255) as u8,
            Kernel::ConvertScale => scale_sample(src.read_byte(i), p.params[0], p.params[1]),
            Kernel::BoxBlur => {
                let (x, y, ch) = grid.coords(i);
                let r = (p.params[0] as i64) / 2;
                let area = ((2 * r + 1) * (2 * r + 1)) as u32;
                let mut sum = 0u32;
                for dy in -r..=r {
                    for dx in -r..=r {
                        sum += grid.sample(src, x + dx, y + dy, ch) as u32;
                    }
                }
                ((sum + area / 2) / area) as u8
            }
            Kernel::Sobel => {
                let (x, y, _) = grid.coords(i);
                let s = |dx: i64, dy: i64| grid.sample(src, x + dx, y + dy, 0) as i32;
                let gx = s(1, -1) + 2 * s(1, 0) + s(1, 1) - s(-1, -1) - 2 * s(-1, 0) - s(-1, 1);
                let gy = s(-1, 1) + 2 * s(0, 1) + s(1, 1) - s(-1, -1) - 2 * s(0, -1) - s(1, -1);
                (gx.abs() + gy.abs()).min(255) as u8
            }
            Kernel::Erode | Kernel::Dilate => {
                let (x, y, ch) = grid.coords(i);
                let dilate = *self == Kernel::Dilate;
                let mut acc = if dilate { 0u8 } else { 255u8 };
                for dy in -1..=1 {
                    for dx in -1..=1 {
                        let v = grid.sample(src, x + dx, y + dy, ch);
                        acc = if dilate { acc.max(v) } else { acc.min(v) };
                    }
                }
                acc
            }
            Kernel::Flip => {
                let (x, y, ch) = grid.coords(i);
                let mode = match p.params[0] as u32 {
                    1 => FlipMode::Vertical,
                    2 => FlipMode::Both,
                    _ => FlipMode::Horizontal,
                };
                let fx = if mode.flips_x() { grid.w - 1 - x } else { x };
                let fy = if mode.flips_y() { grid.h - 1 - y } else { y };
                grid.sample(src, fx, fy, ch)
            }
        }
    }
}

impl std::fmt::Display for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Pixel-grid addressing for neighbourhood kernels. Output and input share
/// the layout for every kernel that uses it.
struct Grid {
    w: i64,
    h: i64,
    c: usize,
}

impl Grid {
    fn new(p: &KernelParams) -> Self {
        Self {
            w: p.width() as i64,
            h: p.height() as i64,
            c: p.channels().max(1) as usize,
        }
    }

    /// `(x, y, channel)` of byte `i`.
    fn coords(&self, i: usize) -> (i64, i64, usize) {
        let pixel = (i / self.c) as i64;
        (pixel % self.w, pixel / self.w, i % self.c)
    }

    /// Source sample with coordinates clamped to the image.
    fn sample(&self, src: &WordBuffer, x: i64, y: i64, ch: usize) -> u8 {
        let x = x.clamp(0, self.w - 1);
        let y = y.clamp(0, self.h - 1);
        src.read_byte(((y * self.w + x) as usize) * self.c + ch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::cpu_backend;
    use crate::registry::Registry;
    use cvx_core::Pattern;

    fn run_kernel(kernel: Kernel, img: &Image, p: &OpParams) -> Vec<u8> {
        let kp = kernel.params(img, p);
        let src = WordBuffer::from_bytes(img.data());
        (0..kp.out_len()).map(|i| kernel.compute_byte(&src, i, &kp)).collect()
    }

    #[test]
    fn test_selection_is_per_call() {
        let reg = Registry::builtin();
        let gray = reg.lookup("rgb_to_gray").unwrap();
        assert_eq!(
            Kernel::for_operation(gray, 4).unwrap(),
            Some(Kernel::Convert(ConversionCode::RgbaToGray))
        );
        assert_eq!(
            Kernel::for_operation(gray, 3).unwrap(),
            Some(Kernel::Convert(ConversionCode::RgbToGray))
        );
        assert_eq!(Kernel::for_operation(gray, 1).unwrap(), None);
        assert_eq!(Kernel::for_operation(reg.lookup("median_blur").unwrap(), 3).unwrap(), None);
    }

    #[test]
    fn test_kernels_match_host_exactly() {
        let reg = Registry::builtin();
        let p = OpParams::default().thresh(90).scalar(-40).scale(1.5, 3.0).ksize(5);
        for desc in reg.iter() {
            for &c in &desc.host_channels.counts() {
                let Some(kernel) = Kernel::for_operation(desc, c).unwrap() else {
                    continue;
                };
                let img = Pattern::Noise { seed: c as u64 }.generate(13, 9, c).unwrap();
                let host = cpu_backend::execute(desc, &img, &p).unwrap();
                assert_eq!(run_kernel(kernel, &img, &p), host.data(), "{} @ {c}", desc.name);
            }
        }
    }

    #[test]
    fn test_output_channels() {
        assert_eq!(Kernel::Convert(ConversionCode::RgbaToGray).output_channels(4), 1);
        assert_eq!(Kernel::Convert(ConversionCode::GrayToRgb).output_channels(1), 3);
        assert_eq!(Kernel::Sobel.output_channels(1), 1);
        assert_eq!(Kernel::all().len(), ConversionCode::ALL.len() + 9);
    }
}
