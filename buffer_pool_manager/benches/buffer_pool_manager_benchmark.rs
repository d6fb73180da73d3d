use buffer_pool_manager::BufferPoolManagerImpl;
use common::api::BufferPoolManager;
use common::disk_manager::DiskManager;
use criterion::{criterion_group, criterion_main, Criterion};
use tempfile::NamedTempFile;

fn bench_new_page(c: &mut Criterion) {
    c.bench_function("new_page", |b| {
        b.iter_batched(
            || {
                let file = NamedTempFile::new().unwrap();
                let dm = DiskManager::new(file.path().to_str().unwrap()).unwrap();
                (BufferPoolManagerImpl::new(128, dm), file)
            },
            |(bpm, _file)| {
                for _ in 0..128 {
                    bpm.new_page().unwrap();
                }
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

fn bench_fetch_page(c: &mut Criterion) {
    let file = NamedTempFile::new().unwrap();
    let dm = DiskManager::new(file.path().to_str().unwrap()).unwrap();
    let bpm = BufferPoolManagerImpl::new(128, dm);
    let page_ids: Vec<_> = (0..128).map(|_| bpm.new_page().unwrap().page_id()).collect();
    bpm.flush_all_pages().unwrap();

    c.bench_function("fetch_page_resident", |b| {
        b.iter(|| {
            for &page_id in &page_ids {
                bpm.fetch_page(page_id).unwrap();
            }
        });
    });
}

criterion_group!(benches, bench_new_page, bench_fetch_page);
criterion_main!(benches);
