use core::hint::black_box;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use snowmill::{
    FnResolver, SequenceResolver, SnowflakeGenerator, SystemClock, TimeSource, parse_id,
};
use std::{
    sync::{Arc, Barrier},
    thread::scope,
    time::Instant,
};

// Number of IDs generated per benchmark iteration (per-thread for
// multi-threaded).
const TOTAL_IDS: usize = 4096;

/// Benchmarks the full path against the system clock, including waits for the
/// next millisecond once a millisecond's sequence is exhausted.
fn bench_system_clock(c: &mut Criterion) {
    let mut group = c.benchmark_group("system_clock");
    group.throughput(Throughput::Elements(TOTAL_IDS as u64));

    group.bench_function(format!("elems/{TOTAL_IDS}"), |b| {
        b.iter_custom(|iters| {
            let start = Instant::now();
            for _ in 0..iters {
                let generator = SnowflakeGenerator::new();
                for _ in 0..TOTAL_IDS {
                    black_box(generator.next_id().unwrap());
                }
            }
            start.elapsed()
        });
    });

    group.finish();
}

/// Benchmarks the packing path alone: a resolver that never exhausts and a
/// fixed clock.
fn bench_hot_path(c: &mut Criterion) {
    struct FixedMockTime {
        millis: i64,
    }

    impl TimeSource for FixedMockTime {
        fn current_millis(&self) -> i64 {
            self.millis
        }
    }

    let mut group = c.benchmark_group("hot_path");
    group.throughput(Throughput::Elements(TOTAL_IDS as u64));

    let resolver = FnResolver::new(|ms| Ok((ms & 0x7ff) as u16));
    let generator = SnowflakeGenerator::with_parts(
        &resolver as &dyn SequenceResolver,
        FixedMockTime {
            millis: SystemClock.current_millis(),
        },
    );

    group.bench_function(format!("elems/{TOTAL_IDS}"), |b| {
        b.iter(|| {
            for _ in 0..TOTAL_IDS {
                black_box(generator.next_id().unwrap());
            }
        });
    });

    group.bench_function("parse", |b| {
        let id = generator.next_id().unwrap();
        b.iter(|| black_box(parse_id(black_box(id))));
    });

    group.finish();
}

/// Benchmarks a generator shared across threads.
fn bench_contended(c: &mut Criterion) {
    let threads = num_cpus::get().max(2);
    let mut group = c.benchmark_group(format!("contended/threads/{threads}"));
    group.throughput(Throughput::Elements((TOTAL_IDS * threads) as u64));

    group.bench_function(format!("elems/{TOTAL_IDS}"), |b| {
        b.iter_custom(|iters| {
            let generator = SnowflakeGenerator::new();
            let barrier = Arc::new(Barrier::new(threads + 1));
            let start = Instant::now();

            scope(|s| {
                for _ in 0..threads {
                    let barrier = Arc::clone(&barrier);
                    let generator = &generator;
                    s.spawn(move || {
                        barrier.wait();
                        for _ in 0..iters {
                            for _ in 0..TOTAL_IDS {
                                black_box(generator.next_id().unwrap());
                            }
                        }
                    });
                }
                barrier.wait();
            });

            start.elapsed()
        });
    });

    group.finish();
}

criterion_group!(benches, bench_system_clock, bench_hot_path, bench_contended);
criterion_main!(benches);
