//! Part planning benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use kata_uploadr::upload::compute_parts;

const MIB: u64 = 1024 * 1024;

fn benchmark_compute_parts(c: &mut Criterion) {
    let mut group = c.benchmark_group("compute_parts");

    for size in [26 * MIB, 1024 * MIB, 50 * 1024 * MIB, 5 * 1024 * 1024 * MIB].iter() {
        group.bench_with_input(format!("{}_mib", size / MIB), size, |b, &size| {
            b.iter(|| compute_parts(black_box(size), black_box(false)));
        });
    }

    group.bench_function("constrained_26_mib", |b| {
        b.iter(|| compute_parts(black_box(26 * MIB), black_box(true)));
    });

    group.finish();
}

fn benchmark_part_ranges(c: &mut Criterion) {
    let size = 50 * 1024 * MIB;
    let plan = compute_parts(size, false);

    c.bench_function("part_len_all_parts", |b| {
        b.iter(|| {
            let mut total = 0u64;
            for n in 1..=plan.part_count {
                total += plan.part_len(black_box(size), n);
            }
            total
        });
    });
}

criterion_group!(benches, benchmark_compute_parts, benchmark_part_ranges);
criterion_main!(benches);
