use common::{Rid, TransactionManager};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use lock_manager::LockManager;
use std::sync::Arc;
use std::thread;

/// Many transactions taking and releasing shared locks on disjoint rows:
/// contention is on the lock table's single mutex, not on any one row.
fn uncontended_shared_locks(c: &mut Criterion) {
    let mut group = c.benchmark_group("uncontended_shared_locks");
    for threads in [1usize, 2, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            b.iter(|| {
                let lm = Arc::new(LockManager::new());
                let txn_mgr = Arc::new(TransactionManager::new());
                let handles: Vec<_> = (0..threads)
                    .map(|t| {
                        let lm = Arc::clone(&lm);
                        let txn_mgr = Arc::clone(&txn_mgr);
                        thread::spawn(move || {
                            for i in 0..200u16 {
                                let txn = txn_mgr.begin();
                                let row = Rid::new(1, t as u16 * 1000 + i);
                                lm.lock_shared(&txn, row);
                                lm.unlock(&txn, row);
                            }
                        })
                    })
                    .collect();
                for h in handles {
                    h.join().unwrap();
                }
            });
        });
    }
    group.finish();
}

/// Every thread repeatedly contends for an exclusive lock on the same row,
/// the worst case for wait-die: each grant wakes every other waiter so it
/// can re-check its queue position.
fn contended_single_row_exclusive(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_single_row_exclusive");
    for threads in [1usize, 2, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            b.iter(|| {
                let lm = Arc::new(LockManager::new());
                let txn_mgr = Arc::new(TransactionManager::new());
                let row = Rid::new(1, 0);
                let handles: Vec<_> = (0..threads)
                    .map(|_| {
                        let lm = Arc::clone(&lm);
                        let txn_mgr = Arc::clone(&txn_mgr);
                        thread::spawn(move || {
                            for _ in 0..20u32 {
                                let txn = txn_mgr.begin();
                                if lm.lock_exclusive(&txn, row) {
                                    lm.unlock(&txn, row);
                                }
                            }
                        })
                    })
                    .collect();
                for h in handles {
                    h.join().unwrap();
                }
            });
        });
    }
    group.finish();
}

criterion_group!(benches, uncontended_shared_locks, contended_single_row_exclusive);
criterion_main!(benches);
