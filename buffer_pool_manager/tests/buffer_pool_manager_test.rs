use buffer_pool_manager::BufferPoolManagerImpl;
use common::api::BufferPoolManager;
use common::disk_manager::DiskManager;
use std::sync::Arc;
use std::thread;
use tempfile::NamedTempFile;

fn make_bpm(pool_size: usize) -> (Arc<BufferPoolManagerImpl>, NamedTempFile) {
    let file = NamedTempFile::new().unwrap();
    let dm = DiskManager::new(file.path().to_str().unwrap()).unwrap();
    (Arc::new(BufferPoolManagerImpl::new(pool_size, dm)), file)
}

#[test]
fn full_pool_rejects_further_allocation_until_something_unpins() {
    let (bpm, _file) = make_bpm(3);
    let mut pinned = Vec::new();
    for _ in 0..3 {
        pinned.push(bpm.new_page().unwrap());
    }
    assert!(bpm.new_page().is_err());

    pinned.pop();
    let fourth = bpm.new_page();
    assert!(fourth.is_ok());
}

#[test]
fn reopening_the_same_file_recovers_flushed_pages() {
    let file = NamedTempFile::new().unwrap();
    let path = file.path().to_str().unwrap().to_string();

    let first_page_id = {
        let dm = DiskManager::new(&path).unwrap();
        let bpm = BufferPoolManagerImpl::new(2, dm);
        let mut guard = bpm.new_page().unwrap();
        guard[10] = 7;
        guard.mark_dirty();
        let id = guard.page_id();
        drop(guard);
        bpm.flush_all_pages().unwrap();
        id
    };

    let dm = DiskManager::new(&path).unwrap();
    let bpm = BufferPoolManagerImpl::new(2, dm);
    let guard = bpm.fetch_page(first_page_id).unwrap();
    assert_eq!(guard[10], 7);
}

#[test]
fn many_threads_each_writing_their_own_page_see_no_cross_contamination() {
    let (bpm, _file) = make_bpm(10);
    let num_threads = 8;

    let handles: Vec<_> = (0..num_threads)
        .map(|i| {
            let bpm = Arc::clone(&bpm);
            thread::spawn(move || {
                let mut guard = bpm.new_page().unwrap();
                guard[0] = i as u8;
                guard.mark_dirty();
                guard.page_id()
            })
        })
        .collect();

    let page_ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    bpm.flush_all_pages().unwrap();

    for (i, page_id) in page_ids.iter().enumerate() {
        let guard = bpm.fetch_page(*page_id).unwrap();
        assert_eq!(guard[0], i as u8);
    }
}
