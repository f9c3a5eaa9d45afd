//! Benchmarks for the reservation ledger and the timer queue.
//!
//! Benchmarks cover:
//! - Single-threaded reserve/release cost by request width
//! - Contended reservations across threads with overlapping key sets
//! - Timer queue insert/drain

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::sync::Arc;
use std::thread;

use orderflow::core::{ReservationRequest, ResourceLedger, TimerQueue};

// ============================================================================
// Helpers
// ============================================================================

fn ledger(keys: usize) -> ResourceLedger {
    ResourceLedger::with_resources((0..keys).map(|i| (format!("item_{i:03}"), u64::MAX / 2)))
}

fn request(width: usize, offset: usize, keys: usize) -> ReservationRequest {
    (0..width)
        .map(|i| (format!("item_{:03}", (offset + i) % keys), 1_u64))
        .collect()
}

// ============================================================================
// Ledger
// ============================================================================

fn bench_reserve_release(c: &mut Criterion) {
    let mut group = c.benchmark_group("ledger_reserve_release");

    for width in [1_usize, 4, 16] {
        let ledger = ledger(64);
        let request = request(width, 0, 64);
        group.throughput(Throughput::Elements(width as u64));
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, _| {
            b.iter(|| {
                ledger.check_and_reserve(black_box(&request)).unwrap();
                ledger.release(black_box(&request)).unwrap();
            });
        });
    }
    group.finish();
}

fn bench_rejected_reservation(c: &mut Criterion) {
    let ledger = ResourceLedger::with_resources([("item_000", 1), ("item_001", 0)]);
    let request = ReservationRequest::new().with("item_000", 1).with("item_001", 1);

    c.bench_function("ledger_rejected_reservation", |b| {
        b.iter(|| black_box(ledger.check_and_reserve(&request)).unwrap_err());
    });
}

fn bench_contended_reservations(c: &mut Criterion) {
    let mut group = c.benchmark_group("ledger_contended");
    group.sample_size(20);

    for threads in [2_usize, 8] {
        let per_thread = 1_000_u64;
        group.throughput(Throughput::Elements(threads as u64 * per_thread));
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            let ledger = Arc::new(ledger(8));
            b.iter(|| {
                let handles: Vec<_> = (0..threads)
                    .map(|t| {
                        let ledger = Arc::clone(&ledger);
                        thread::spawn(move || {
                            let request = request(3, t, 8);
                            for _ in 0..per_thread {
                                ledger.check_and_reserve(&request).unwrap();
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.join().unwrap();
                }
            });
        });
    }
    group.finish();
}

fn bench_get_quantity(c: &mut Criterion) {
    let ledger = ledger(64);
    c.bench_function("ledger_get_quantity", |b| {
        b.iter(|| black_box(ledger.get_quantity(black_box("item_042"))));
    });
}

// ============================================================================
// Timer queue
// ============================================================================

fn bench_timer_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("timer_queue_push_drain");

    for size in [100_u64, 1_000, 10_000] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let mut queue = TimerQueue::new();
                for i in 0..size {
                    // Scatter deadlines so the heap does real work.
                    queue.push((i * 7_919) % size, i);
                }
                while let Some(item) = queue.pop_due(size) {
                    black_box(item);
                }
            });
        });
    }
    group.finish();
}

criterion_group!(
    ledger_benches,
    bench_reserve_release,
    bench_rejected_reservation,
    bench_contended_reservations,
    bench_get_quantity
);

criterion_group!(timer_benches, bench_timer_queue);

criterion_main!(ledger_benches, timer_benches);
