use std::f64::consts::PI;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rotorguard_core::features::{FeatureConfig, FeatureExtractor};
use rotorguard_core::window::{RawSample, Window, WindowConfig, Windower};

fn rotor(len: usize) -> Vec<f64> {
    (0..len)
        .map(|i| {
            let t = i as f64 / 20_000.0;
            (2.0 * PI * 30.0 * t).sin() + 0.3 * (2.0 * PI * 90.0 * t).sin() + 0.05 * (2.0 * PI * 3_100.0 * t).sin()
        })
        .collect()
}

fn bench_extraction(c: &mut Criterion) {
    let extractor = FeatureExtractor::new(FeatureConfig::default()).unwrap();
    let mut group = c.benchmark_group("extract");
    for size in [256, 1024, 4096] {
        let window = Window::new(0, 0, size, rotor(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &window, |b, window| {
            b.iter(|| black_box(extractor.extract(black_box(window))))
        });
    }
    group.finish();
}

fn bench_windowing(c: &mut Criterion) {
    let samples: Vec<RawSample> = rotor(20_000)
        .into_iter()
        .enumerate()
        .map(|(i, a)| RawSample::new(i as u64 * 50, a))
        .collect();

    c.bench_function("window_one_second", |b| {
        b.iter(|| {
            let windower = Windower::new(black_box(&samples), WindowConfig::default()).unwrap();
            black_box(windower.iter().filter(|w| w.is_ok()).count())
        })
    });
}

criterion_group!(benches, bench_extraction, bench_windowing);
criterion_main!(benches);
