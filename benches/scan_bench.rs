use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use sigcarve::{shannon_entropy, HeaderMatcher, RegistryConfig, SignatureRegistry};

/// 4 MiB window with a JPEG header planted every 64 KiB.
fn synthetic_window() -> Vec<u8> {
    let mut window: Vec<u8> = (0..4 * 1024 * 1024).map(|i| (i % 255) as u8).collect();
    for offset in (0..window.len() - 8).step_by(64 * 1024) {
        window[offset..offset + 3].copy_from_slice(&[0xFF, 0xD8, 0xFF]);
    }
    window
}

fn bench_matcher(c: &mut Criterion) {
    let config = RegistryConfig::builtin();
    let (registry, _) = SignatureRegistry::from_config(&config, "balanced").unwrap();
    let matcher = HeaderMatcher::build(&registry).unwrap();
    let window = synthetic_window();

    let mut group = c.benchmark_group("matcher");
    group.throughput(Throughput::Bytes(window.len() as u64));
    group.bench_function("find_all_4mib", |b| {
        b.iter(|| black_box(matcher.find_all(black_box(&window))));
    });
    group.finish();
}

fn bench_entropy(c: &mut Criterion) {
    let window = synthetic_window();
    let sample = &window[..1024 * 1024];

    let mut group = c.benchmark_group("entropy");
    group.throughput(Throughput::Bytes(sample.len() as u64));
    group.bench_function("shannon_1mib", |b| {
        b.iter(|| black_box(shannon_entropy(black_box(sample))));
    });
    group.finish();
}

criterion_group!(benches, bench_matcher, bench_entropy);
criterion_main!(benches);
