use criterion::{black_box, criterion_group, criterion_main, Criterion};
use orderbook_recorder_lib::cache::{
    levels::{PriceLevel, SideLevels},
    redis::price_member,
};

fn updates(count: usize) -> Vec<PriceLevel> {
    (0..count)
        .map(|i| {
            let price = 5000.0 + (i % 200) as f64 * 0.05;
            // every fifth update removes its level
            let size = if i % 5 == 0 { 0.0 } else { (i % 17) as f64 + 0.5 };
            PriceLevel::new(price, size)
        })
        .collect()
}

pub fn apply_batch_benchmark(c: &mut Criterion) {
    let batch = updates(1_000);
    let mut group = c.benchmark_group("apply_batch_benchmark");
    group.significance_level(0.01).sample_size(1000);
    group.bench_function("btree_apply_batch", |b| {
        b.iter(|| {
            let mut levels = SideLevels::new();
            _ = levels.apply_batch(black_box(&batch));
            levels
        })
    });
    group.finish();
}

pub fn snapshot_benchmark(c: &mut Criterion) {
    let mut levels = SideLevels::new();
    levels.apply_batch(&updates(5_000)).unwrap();

    let mut group = c.benchmark_group("snapshot_benchmark");
    group.significance_level(0.01).sample_size(1000);
    group.bench_function("btree_snapshot", |b| {
        b.iter(|| black_box(&levels).levels())
    });
    group.finish();
}

pub fn price_member_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("price_member_benchmark");
    group.significance_level(0.01).sample_size(5000);
    group.bench_function("price_member", |b| {
        b.iter(|| price_member(black_box(60001.25)))
    });
    group.finish();
}

criterion_group!(
    benches,
    apply_batch_benchmark,
    snapshot_benchmark,
    price_member_benchmark
);
criterion_main!(benches);
