//! Grayscale conversion of a 512x512 RGBA gradient.
//!
//! The channel-aware path must agree across backends and with the golden
//! digest. Reading the same RGBA bytes with the 3-channel code gives a
//! different, wrong image.

use std::sync::Arc;

use cvx_compute::{
    BackendKind, ComputeDevice, ExecOptions, Kernel, KernelParams, OpParams, Processor,
    SoftwareDevice,
};
use cvx_core::{select_conversion, ConversionCode, ConversionTarget, Image, Pattern, WordBuffer};
use cvx_tests::{check, digest, GoldenSet, GoldenStatus};

const SIZE: u32 = 512;

fn gradient() -> Image {
    Pattern::Gradient.generate(SIZE, SIZE, 4).unwrap()
}

fn assert_golden(name: &str, img: &Image) {
    let golden = GoldenSet::builtin().unwrap();
    let actual = digest(img);
    assert_eq!(golden.check(name, &actual), GoldenStatus::Match, "{name}: {actual}");
}

/// The 3-channel kernel launched over 4-channel data.
fn legacy_gray(img: &Image) -> Image {
    let dev = SoftwareDevice::new();
    let kernel = Kernel::Convert(ConversionCode::RgbToGray);
    let params = KernelParams::new(SIZE, SIZE, 4, 1);
    let src = WordBuffer::from_bytes(img.data());
    let mut dst = WordBuffer::zeroed(params.out_len());
    dev.launch(&kernel, &src, &mut dst, &params).unwrap();
    Image::from_vec(dst.to_bytes(), SIZE, SIZE, 1).unwrap()
}

#[test]
fn test_input_is_stable() {
    let img = gradient();
    assert_eq!(img.pixel(256, 100), &[127, 49, 88, 255]);
    assert_golden("gradient_512_rgba", &img);
}

#[test]
fn test_selector_picks_four_channel_code() {
    let code = select_conversion(ConversionTarget::RgbToGray, 4).unwrap();
    assert_eq!(code, ConversionCode::RgbaToGray);
    assert_ne!(code, ConversionCode::RgbToGray);
}

#[test]
fn test_gpu_equals_host() {
    let img = gradient();
    let proc = Processor::builder()
        .device(Arc::new(SoftwareDevice::new()) as Arc<dyn ComputeDevice>)
        .build()
        .unwrap();
    let p = OpParams::default();

    let gpu = proc.dispatch("rgb_to_gray", &img, &p, ExecOptions::gpu()).unwrap();
    let host = proc.execute_with("rgb_to_gray", &img, &p, ExecOptions::host()).unwrap();

    assert_eq!(gpu.backend, BackendKind::Gpu);
    assert!(gpu.fallback.is_none());
    assert_eq!(gpu.image, host);
    assert_eq!(host.pixel(256, 100), &[76]);
    assert!(check("rgb_to_gray", &img, &p, &host).unwrap().pass);
    assert_golden("rgb_to_gray_gradient_512_rgba", &host);
}

#[test]
fn test_three_channel_code_is_wrong_on_rgba() {
    let img = gradient();
    let right = Processor::host_only().to_gray(&img).unwrap();
    let wrong = legacy_gray(&img);

    // Pixel (256, 100) reads the bytes of pixel (192, 75) under stride 3.
    assert_eq!(img.pixel(192, 75), &[95, 37, 66, 255]);
    assert_eq!(wrong.pixel(256, 100), &[57]);
    assert_ne!(wrong.pixel(256, 100), right.pixel(256, 100));
    assert!(!check("rgb_to_gray", &img, &OpParams::default(), &wrong).unwrap().pass);
    assert_golden("legacy_rgb_to_gray_gradient_512_rgba", &wrong);
}

#[cfg(feature = "wgpu")]
#[test]
fn test_wgpu_equals_host() {
    let Ok(dev) = cvx_compute::WgpuDevice::shared() else {
        eprintln!("no wgpu adapter, skipping");
        return;
    };
    let img = gradient();
    let proc = Processor::builder().device(dev).build().unwrap();
    let p = OpParams::default();

    let gpu = proc.dispatch("rgb_to_gray", &img, &p, ExecOptions::gpu()).unwrap();
    let host = proc.execute_with("rgb_to_gray", &img, &p, ExecOptions::host()).unwrap();
    assert_eq!(gpu.backend, BackendKind::Gpu);
    assert!(cvx_compute::compare(&host, &gpu.image, 1).within_tolerance());
    assert_ne!(legacy_gray(&img).pixel(256, 100), gpu.image.pixel(256, 100));
}
