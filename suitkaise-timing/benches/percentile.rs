use criterion::{black_box, criterion_group, criterion_main, Criterion};
use suitkaise_timing::{Recorder, Section};

fn bench_percentile(c: &mut Criterion) {
    let mut recorder = Recorder::new();
    for i in 0..10_000 {
        recorder.append(Section::Run, i as f64);
    }

    c.bench_function("percentile_p95_10k_samples", |b| {
        b.iter(|| black_box(recorder.percentile(Section::Run, 95.0)))
    });
}

criterion_group!(benches, bench_percentile);
criterion_main!(benches);
