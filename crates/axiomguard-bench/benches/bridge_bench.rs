//! Domain bridge benchmarks.

use axiomguard_core::{
    CombatantState, DamageInput, LabeledRect, Rect, rectangles_overlap, validate_combat_step,
    validate_non_overlap,
};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

fn grid(n: usize) -> Vec<LabeledRect> {
    let side = (n as f64).sqrt().ceil() as usize;
    (0..n)
        .map(|i| {
            let x = (i % side) as f64 * 4.0;
            let y = (i / side) as f64 * 4.0;
            LabeledRect::new(i.to_string(), Rect::from_origin_size(x, y, 4.0, 4.0))
        })
        .collect()
}

fn bench_pair(c: &mut Criterion) {
    let a = Rect::new(0.0, 0.0, 10.0, 10.0);
    let b = Rect::new(9.5, 9.5, 20.0, 20.0);
    c.bench_function("rectangles_overlap", |bench| {
        bench.iter(|| criterion::black_box(rectangles_overlap(&a, &b)));
    });
}

fn bench_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("validate_non_overlap");
    for &n in &[16_usize, 64, 256, 1024] {
        let rects = grid(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &rects, |b, rects| {
            b.iter(|| criterion::black_box(validate_non_overlap(rects)));
        });
    }
    group.finish();
}

fn bench_combat_step(c: &mut Criterion) {
    let prev = CombatantState::new(100.0, 100.0, 5.0);
    let input = DamageInput::new(30.0, 2.0);
    let next = CombatantState::new(73.0, 100.0, 5.0);
    c.bench_function("validate_combat_step", |b| {
        b.iter(|| criterion::black_box(validate_combat_step(&prev, &input, &next)));
    });
}

criterion_group!(benches, bench_pair, bench_scan, bench_combat_step);
criterion_main!(benches);
