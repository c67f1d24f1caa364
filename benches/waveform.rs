//! Criterion benchmarks for waveform generation hot paths.
//!
//! A full double-pulse scan is 12288 pixels x 44 frames before chopping and
//! phase cycling; these benchmarks track mask generation, encoding and
//! quantization separately.
//!
//! Run with: cargo bench --bench waveform

use aom_shaper::masks::DoublePulseParams;
use aom_shaper::shaper::AomShaper;
use aom_shaper::waveform::{DacBuffer, Encoding};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

const REFERENCE: [f64; 3] = [23.334e-9, -1.943e-3, 67.4];

fn calibrated() -> AomShaper {
    let mut shaper = AomShaper::default();
    shaper.set_calib(REFERENCE).unwrap();
    shaper
}

fn double_pulse_masks(c: &mut Criterion) {
    let shaper = calibrated();
    let params = DoublePulseParams::new(1.0, 0.1, 1600.0);

    c.bench_function("double_pulse_44", |b| {
        b.iter(|| shaper.double_pulse(black_box(&params)).unwrap());
    });
}

fn generate_waveform(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate_waveform");

    for mode in [Encoding::Bragg, Encoding::Classic] {
        let mut shaper = calibrated();
        shaper.set_mode(mode);
        let masks = shaper
            .double_pulse(&DoublePulseParams::new(1.0, 0.1, 1600.0))
            .unwrap();
        shaper.set_masks(masks).unwrap();

        group.bench_with_input(BenchmarkId::new("encode", mode), &shaper, |b, shaper| {
            b.iter(|| shaper.generate_waveform().unwrap());
        });
    }
    group.finish();
}

fn quantize(c: &mut Criterion) {
    let mut shaper = calibrated();
    let masks = shaper
        .double_pulse(&DoublePulseParams::new(1.0, 0.1, 1600.0))
        .unwrap();
    shaper.set_masks(masks).unwrap();
    let waveform = shaper.generate_waveform().unwrap();

    c.bench_function("dac_buffer_176_frames", |b| {
        b.iter(|| DacBuffer::from_waveform(black_box(&waveform), 0.8));
    });
}

criterion_group!(benches, double_pulse_masks, generate_waveform, quantize);
criterion_main!(benches);
