//! Benchmarks for byte access through word-packed buffers.
//!
//! Run with: `cargo bench -p cvx-core`

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use cvx_core::{select_conversion, ConversionTarget, Pattern, WordBuffer};

/// Packing and unpacking whole images.
fn bench_pack(c: &mut Criterion) {
    let mut group = c.benchmark_group("pack");

    for size in [64u32, 256, 1024] {
        let img = Pattern::Noise { seed: 1 }.generate(size, size, 4).unwrap();
        group.throughput(Throughput::Bytes(img.byte_len() as u64));

        group.bench_with_input(BenchmarkId::new("from_bytes", size), img.data(), |b, data| {
            b.iter(|| WordBuffer::from_bytes(black_box(data)))
        });

        let buf = WordBuffer::from_bytes(img.data());
        group.bench_with_input(BenchmarkId::new("to_bytes", size), &buf, |b, buf| {
            b.iter(|| black_box(buf).to_bytes())
        });
    }

    group.finish();
}

/// Per-byte read-modify-write, sequential and over parallel slots.
fn bench_byte_access(c: &mut Criterion) {
    let mut group = c.benchmark_group("byte_access");
    let len = 512 * 512 * 4;
    group.throughput(Throughput::Bytes(len as u64));

    group.bench_function("write_byte", |b| {
        let mut buf = WordBuffer::zeroed(len);
        b.iter(|| {
            for i in 0..len {
                buf.write_byte(i, black_box(i as u8));
            }
        })
    });

    group.bench_function("par_slots", |b| {
        let mut buf = WordBuffer::zeroed(len);
        b.iter(|| {
            use rayon::prelude::*;
            buf.par_slots_mut().for_each(|mut slot| {
                for i in slot.byte_range() {
                    let _ = slot.write_byte(i, black_box(i as u8));
                }
            })
        })
    });

    group.finish();
}

/// Gray conversion through the per-byte kernel form.
fn bench_convert(c: &mut Criterion) {
    let img = Pattern::Gradient.generate(512, 512, 4).unwrap();
    let src = WordBuffer::from_bytes(img.data());
    let code = select_conversion(ConversionTarget::RgbToGray, 4).unwrap();

    c.bench_function("rgba_to_gray_per_byte", |b| {
        b.iter(|| {
            (0..img.pixel_count())
                .map(|i| code.converted_byte(|j| src.read_byte(j), i))
                .fold(0u32, |acc, v| acc.wrapping_add(v as u32))
        })
    });
}

criterion_group!(benches, bench_pack, bench_byte_access, bench_convert);
criterion_main!(benches);
