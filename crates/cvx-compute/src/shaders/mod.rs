//! WGSL shader sources for GPU compute pipelines.
//! These are used by the wgpu backend when the `wgpu` feature is enabled.
//!
//! Every pipeline is [`PROLOGUE`] + kernel constants + kernel body +
//! [`MAIN`]. The prologue owns the buffer bindings and the only code that
//! indexes them (`read_byte`, and `main` storing its one word). Kernel
//! bodies define `fn compute_byte(i: u32) -> u32` and never touch `src` or
//! `dst` directly.

#![allow(dead_code)] // Shaders used by wgpu backend

use crate::kernels::Kernel;
use cvx_core::ConversionCode;

/// Invocations per workgroup; matches `@workgroup_size` in [`MAIN`].
pub const WORKGROUP_SIZE: u32 = 256;

/// Bindings, byte accessors and grid helpers.
pub const PROLOGUE: &str = r#"
struct Params {
    dims: vec4<u32>,               // w, h, c, out_c
    values: array<vec4<f32>, 4>,
}

@group(0) @binding(0) var<storage, read> src: array<u32>;
@group(0) @binding(1) var<storage, read_write> dst: array<u32>;
@group(0) @binding(2) var<uniform> params: Params;

// Byte i: word i / 4, bits 8 * (i % 4), little-endian.
fn read_byte(i: u32) -> u32 {
    return (src[i / 4u] >> ((i % 4u) * 8u)) & 0xFFu;
}

fn write_byte(word: u32, offset: u32, value: u32) -> u32 {
    let shift = offset * 8u;
    return (word & ~(0xFFu << shift)) | ((value & 0xFFu) << shift);
}

fn param(k: u32) -> f32 {
    return params.values[k / 4u][k % 4u];
}

fn width() -> i32 { return i32(params.dims.x); }
fn height() -> i32 { return i32(params.dims.y); }
fn channels() -> u32 { return params.dims.z; }

// Replicate border.
fn sample_at(x: i32, y: i32, ch: u32) -> u32 {
    let cx = u32(clamp(x, 0, width() - 1));
    let cy = u32(clamp(y, 0, height() - 1));
    return read_byte((cy * params.dims.x + cx) * channels() + ch);
}

// (x, y, channel) of byte i in a same-layout output.
fn coords(i: u32) -> vec3<i32> {
    let c = channels();
    let p = i / c;
    return vec3<i32>(i32(p % params.dims.x), i32(p / params.dims.x), i32(i % c));
}
"#;

/// Entry point: one invocation per output word.
pub const MAIN: &str = r#"
@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) id: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {
    let word = id.x + id.y * groups.x * 256u;
    let out_len = params.dims.x * params.dims.y * params.dims.w;
    let first = word * 4u;
    if first >= out_len { return; }

    var packed = 0u;
    for (var k = 0u; k < 4u; k = k + 1u) {
        let i = first + k;
        if i < out_len {
            packed = write_byte(packed, k, compute_byte(i));
        }
    }
    dst[word] = packed;
}
"#;

/// Gray from RGB(A) or BGR(A); needs `SRC_C` and `SWAP_RB`.
pub const TO_GRAY: &str = r#"
fn compute_byte(i: u32) -> u32 {
    let base = i * SRC_C;
    var r = f32(read_byte(base));
    let g = f32(read_byte(base + 1u));
    var b = f32(read_byte(base + 2u));
    if SWAP_RB {
        let t = r;
        r = b;
        b = t;
    }
    return u32(0.299 * r + 0.587 * g + 0.114 * b);
}
"#;

/// Red/blue swap, alpha untouched; needs `SRC_C`.
pub const SWAP_RED_BLUE: &str = r#"
fn compute_byte(i: u32) -> u32 {
    let ch = i % SRC_C;
    let base = i - ch;
    if ch == 0u { return read_byte(base + 2u); }
    if ch == 2u { return read_byte(base); }
    return read_byte(i);
}
"#;

pub const GRAY_TO_RGB: &str = r#"
fn compute_byte(i: u32) -> u32 {
    return read_byte(i / 3u);
}
"#;

/// params: thresh, max_value, type.
pub const THRESHOLD: &str = r#"
fn compute_byte(i: u32) -> u32 {
    let v = read_byte(i);
    let t = u32(param(0u));
    let m = u32(param(1u));
    let above = v > t;
    var res = select(0u, m, above);
    switch u32(param(2u)) {
        case 1u: { res = select(m, 0u, above); }
        case 2u: { res = select(v, t, above); }
        case 3u: { res = select(0u, v, above); }
        case 4u: { res = select(v, 0u, above); }
        default: {}
    }
    return res;
}
"#;

pub const BITWISE_NOT: &str = r#"
fn compute_byte(i: u32) -> u32 {
    return 255u - read_byte(i);
}
"#;

/// params: scalar.
pub const ADD_SCALAR: &str = r#"
fn compute_byte(i: u32) -> u32 {
    return u32(clamp(i32(read_byte(i)) + i32(param(0u)), 0, 255));
}
"#;

/// params: alpha, beta.
pub const CONVERT_SCALE: &str = r#"
fn compute_byte(i: u32) -> u32 {
    return u32(clamp(round(param(0u) * f32(read_byte(i)) + param(1u)), 0.0, 255.0));
}
"#;

/// params: ksize.
pub const BOX_BLUR: &str = r#"
fn compute_byte(i: u32) -> u32 {
    let at = coords(i);
    let r = i32(param(0u)) / 2;
    var sum = 0u;
    for (var dy = -r; dy <= r; dy = dy + 1) {
        for (var dx = -r; dx <= r; dx = dx + 1) {
            sum = sum + sample_at(at.x + dx, at.y + dy, u32(at.z));
        }
    }
    let area = u32((2 * r + 1) * (2 * r + 1));
    return (sum + area / 2u) / area;
}
"#;

pub const SOBEL: &str = r#"
fn px(at: vec3<i32>, dx: i32, dy: i32) -> i32 {
    return i32(sample_at(at.x + dx, at.y + dy, 0u));
}

fn compute_byte(i: u32) -> u32 {
    let at = coords(i);
    let gx = px(at, 1, -1) + 2 * px(at, 1, 0) + px(at, 1, 1)
           - px(at, -1, -1) - 2 * px(at, -1, 0) - px(at, -1, 1);
    let gy = px(at, -1, 1) + 2 * px(at, 0, 1) + px(at, 1, 1)
           - px(at, -1, -1) - 2 * px(at, 0, -1) - px(at, 1, -1);
    return u32(min(abs(gx) + abs(gy), 255));
}
"#;

pub const ERODE: &str = r#"
fn compute_byte(i: u32) -> u32 {
    let at = coords(i);
    var acc = 255u;
    for (var dy = -1; dy <= 1; dy = dy + 1) {
        for (var dx = -1; dx <= 1; dx = dx + 1) {
            acc = min(acc, sample_at(at.x + dx, at.y + dy, u32(at.z)));
        }
    }
    return acc;
}
"#;

pub const DILATE: &str = r#"
fn compute_byte(i: u32) -> u32 {
    let at = coords(i);
    var acc = 0u;
    for (var dy = -1; dy <= 1; dy = dy + 1) {
        for (var dx = -1; dx <= 1; dx = dx + 1) {
            acc = max(acc, sample_at(at.x + dx, at.y + dy, u32(at.z)));
        }
    }
    return acc;
}
"#;

/// params: mode (0 horizontal, 1 vertical, 2 both).
pub const FLIP: &str = r#"
fn compute_byte(i: u32) -> u32 {
    let at = coords(i);
    let mode = u32(param(0u));
    var x = at.x;
    var y = at.y;
    if mode == 0u || mode == 2u { x = width() - 1 - at.x; }
    if mode == 1u || mode == 2u { y = height() - 1 - at.y; }
    return sample_at(x, y, u32(at.z));
}
"#;

/// Kernel body for `kernel`.
pub fn body(kernel: &Kernel) -> &'static str {
    match kernel {
        Kernel::Convert(code) => match code {
            ConversionCode::RgbToGray
            | ConversionCode::RgbaToGray
            | ConversionCode::BgrToGray
            | ConversionCode::BgraToGray => TO_GRAY,
            ConversionCode::BgrToRgb | ConversionCode::BgraToRgba => SWAP_RED_BLUE,
            ConversionCode::GrayToRgb => GRAY_TO_RGB,
        },
        Kernel::Threshold => THRESHOLD,
        Kernel::BitwiseNot => BITWISE_NOT,
        Kernel::AddScalar => ADD_SCALAR,
        Kernel::ConvertScale => CONVERT_SCALE,
        Kernel::BoxBlur => BOX_BLUR,
        Kernel::Sobel => SOBEL,
        Kernel::Erode => ERODE,
        Kernel::Dilate => DILATE,
        Kernel::Flip => FLIP,
    }
}

/// Module-scope constants a body depends on.
fn constants(kernel: &Kernel) -> String {
    match kernel {
        Kernel::Convert(code) => {
            let swap = matches!(code, ConversionCode::BgrToGray | ConversionCode::BgraToGray);
            format!(
                "\nconst SRC_C: u32 = {}u;\nconst SWAP_RB: bool = {};\n",
                code.source_channels(),
                swap
            )
        }
        _ => String::new(),
    }
}

/// Full WGSL module for `kernel`.
pub fn compose(kernel: &Kernel) -> String {
    let mut source = String::with_capacity(PROLOGUE.len() + MAIN.len() + 1024);
    source.push_str(PROLOGUE);
    source.push_str(&constants(kernel));
    source.push_str(body(kernel));
    source.push_str(MAIN);
    source
}
