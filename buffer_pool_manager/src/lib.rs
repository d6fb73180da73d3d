//! A buffer pool manager backed by an [`ExtendibleHash`] page table and an
//! [`LruReplacer`] victim list, on top of [`DiskManager`] for persistence.
//!
//! Frame selection: a free frame is handed out first; once the free list is
//! exhausted, a victim is pulled from the LRU replacer. A page is only
//! eligible for the replacer once its pin count drops to zero, and it is
//! removed from the replacer the moment it gets pinned again, mirroring the
//! source's `unpin` / `fetch` bookkeeping.

use common::api::{BpmError, BufferPoolManager, PageGuard, PageId, INVALID_PAGE_ID, PAGE_SIZE};
use common::disk_manager::DiskManager;
use extendible_hash::ExtendibleHash;
use log::{debug, trace, warn};
use lru_replacer::LruReplacer;
use std::sync::{Arc, Mutex, RwLock};

type FrameId = usize;

struct Frame {
    page_id: PageId,
    data: Box<[u8; PAGE_SIZE]>,
    pin_count: usize,
    is_dirty: bool,
}

impl Frame {
    fn empty() -> Self {
        Self {
            page_id: INVALID_PAGE_ID,
            data: Box::new([0u8; PAGE_SIZE]),
            pin_count: 0,
            is_dirty: false,
        }
    }
}

/// A buffer pool manager. Owns a fixed number of in-memory frames, a page
/// table mapping resident page ids to frames, and an LRU-ordered list of
/// frames eligible for eviction.
pub struct BufferPoolManagerImpl {
    disk_manager: DiskManager,
    frames: Vec<RwLock<Frame>>,
    page_table: ExtendibleHash<PageId, FrameId>,
    replacer: LruReplacer<FrameId>,
    free_list: Mutex<Vec<FrameId>>,
}

impl BufferPoolManagerImpl {
    /// Creates a pool of `pool_size` frames on top of `disk_manager`.
    pub fn new(pool_size: usize, disk_manager: DiskManager) -> Self {
        assert!(pool_size > 0, "pool_size must be positive");
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = Vec::with_capacity(pool_size);
        for i in 0..pool_size {
            frames.push(RwLock::new(Frame::empty()));
            free_list.push(i);
        }
        Self {
            disk_manager,
            frames,
            page_table: ExtendibleHash::new(4),
            replacer: LruReplacer::new(),
            free_list: Mutex::new(free_list),
        }
    }

    /// Finds a frame to hold a page, evicting an unpinned victim if the
    /// free list is exhausted. Flushes the victim first if it is dirty.
    fn find_victim_frame(&self) -> Result<FrameId, BpmError> {
        if let Some(frame_id) = self.free_list.lock().unwrap().pop() {
            return Ok(frame_id);
        }

        let frame_id = self.replacer.victim().ok_or(BpmError::NoFreeFrames)?;

        let mut frame = self.frames[frame_id].write().unwrap();
        if frame.is_dirty {
            self.disk_manager.write_page(frame.page_id, frame.data.as_ref())?;
            frame.is_dirty = false;
        }
        self.page_table.remove(&frame.page_id);
        trace!("evicted page {} from frame {}", frame.page_id, frame_id);
        Ok(frame_id)
    }

    fn pin(&self, frame_id: FrameId) {
        let mut frame = self.frames[frame_id].write().unwrap();
        frame.pin_count += 1;
        if frame.pin_count == 1 {
            self.replacer.erase(&frame_id);
        }
    }
}

impl BufferPoolManager for BufferPoolManagerImpl {
    fn fetch_page(&self, page_id: PageId) -> Result<Box<dyn PageGuard + '_>, BpmError> {
        if let Some(frame_id) = self.page_table.find(&page_id) {
            self.pin(frame_id);
            return Ok(Box::new(BpmPageGuard {
                bpm: self,
                frame_id,
                page_id,
            }));
        }

        let frame_id = self.find_victim_frame()?;
        {
            let mut frame = self.frames[frame_id].write().unwrap();
            self.disk_manager.read_page(page_id, frame.data.as_mut())?;
            frame.page_id = page_id;
            frame.pin_count = 1;
            frame.is_dirty = false;
        }
        self.page_table.insert(page_id, frame_id);
        debug!("fetched page {} into frame {}", page_id, frame_id);

        Ok(Box::new(BpmPageGuard {
            bpm: self,
            frame_id,
            page_id,
        }))
    }

    fn new_page(&self) -> Result<Box<dyn PageGuard + '_>, BpmError> {
        let frame_id = self.find_victim_frame()?;
        let page_id = self.disk_manager.allocate_page();
        {
            let mut frame = self.frames[frame_id].write().unwrap();
            frame.data.fill(0);
            frame.page_id = page_id;
            frame.pin_count = 1;
            frame.is_dirty = false;
        }
        self.page_table.insert(page_id, frame_id);
        debug!("allocated page {} in frame {}", page_id, frame_id);

        Ok(Box::new(BpmPageGuard {
            bpm: self,
            frame_id,
            page_id,
        }))
    }

    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<(), BpmError> {
        let Some(frame_id) = self.page_table.find(&page_id) else {
            warn!("unpin_page called for page {page_id} not resident in the pool");
            return Ok(());
        };

        let mut frame = self.frames[frame_id].write().unwrap();
        if frame.pin_count == 0 {
            return Ok(());
        }
        frame.is_dirty |= is_dirty;
        frame.pin_count -= 1;
        if frame.pin_count == 0 {
            self.replacer.insert(frame_id);
        }
        Ok(())
    }

    fn delete_page(&self, page_id: PageId) -> Result<(), BpmError> {
        let Some(frame_id) = self.page_table.find(&page_id) else {
            return Ok(());
        };

        let mut frame = self.frames[frame_id].write().unwrap();
        if frame.pin_count > 0 {
            warn!("delete_page called for page {page_id} with outstanding pins");
            return Ok(());
        }

        self.page_table.remove(&page_id);
        self.replacer.erase(&frame_id);
        frame.page_id = INVALID_PAGE_ID;
        frame.is_dirty = false;
        drop(frame);
        self.free_list.lock().unwrap().push(frame_id);
        Ok(())
    }

    fn flush_page(&self, page_id: PageId) -> Result<(), BpmError> {
        let Some(frame_id) = self.page_table.find(&page_id) else {
            return Ok(());
        };
        let mut frame = self.frames[frame_id].write().unwrap();
        self.disk_manager.write_page(frame.page_id, frame.data.as_ref())?;
        frame.is_dirty = false;
        Ok(())
    }

    fn flush_all_pages(&self) -> Result<(), BpmError> {
        for frame in &self.frames {
            let mut frame = frame.write().unwrap();
            if frame.page_id != INVALID_PAGE_ID && frame.is_dirty {
                self.disk_manager.write_page(frame.page_id, frame.data.as_ref())?;
                frame.is_dirty = false;
            }
        }
        Ok(())
    }
}

/// A pinned page handle. Holding onto it keeps the page resident; its `Drop`
/// impl unpins it, passing along whatever dirty bit `mark_dirty` set.
///
/// `Deref`/`DerefMut` borrow the frame's bytes past the lifetime of the
/// internal `RwLockWriteGuard` they take out: safe here because the guard
/// we hand back never outlives `'_` on the originating `&BufferPoolManagerImpl`,
/// the frame slot is never reallocated while a pin is outstanding, and the
/// page table keeps us from handing out a second `BpmPageGuard` onto the
/// same frame while this one is alive.
pub struct BpmPageGuard<'a> {
    bpm: &'a BufferPoolManagerImpl,
    frame_id: FrameId,
    page_id: PageId,
}

impl<'a> BpmPageGuard<'a> {
    fn data(&self) -> &[u8] {
        let frame = self.bpm.frames[self.frame_id].read().unwrap();
        unsafe { std::slice::from_raw_parts(frame.data.as_ptr(), PAGE_SIZE) }
    }

    fn data_mut(&mut self) -> &mut [u8] {
        let mut frame = self.bpm.frames[self.frame_id].write().unwrap();
        unsafe { std::slice::from_raw_parts_mut(frame.data.as_mut_ptr(), PAGE_SIZE) }
    }
}

impl<'a> std::ops::Deref for BpmPageGuard<'a> {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        self.data()
    }
}

impl<'a> std::ops::DerefMut for BpmPageGuard<'a> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.data_mut()
    }
}

impl<'a> PageGuard for BpmPageGuard<'a> {
    fn page_id(&self) -> PageId {
        self.page_id
    }

    fn mark_dirty(&mut self) {
        self.bpm.frames[self.frame_id].write().unwrap().is_dirty = true;
    }
}

impl<'a> Drop for BpmPageGuard<'a> {
    fn drop(&mut self) {
        let _ = self.bpm.unpin_page(self.page_id, false);
    }
}

/// A handle around an `Arc<dyn BufferPoolManager>` that additionally knows
/// its own fixed frame count, useful for sizing tests and call sites that
/// need to reason about pool capacity without downcasting the trait object.
pub fn shared(pool_size: usize, disk_manager: DiskManager) -> Arc<BufferPoolManagerImpl> {
    Arc::new(BufferPoolManagerImpl::new(pool_size, disk_manager))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn make_bpm(pool_size: usize) -> (BufferPoolManagerImpl, NamedTempFile) {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap();
        let dm = DiskManager::new(path).unwrap();
        (BufferPoolManagerImpl::new(pool_size, dm), file)
    }

    #[test]
    fn new_page_then_fetch_round_trips_data() {
        let (bpm, _file) = make_bpm(3);
        let page_id = {
            let mut guard = bpm.new_page().unwrap();
            guard[0] = 42;
            guard.mark_dirty();
            guard.page_id()
        };

        bpm.flush_all_pages().unwrap();

        let fetched = bpm.fetch_page(page_id).unwrap();
        assert_eq!(fetched[0], 42);
    }

    #[test]
    fn pool_exhaustion_without_eviction_candidates_errors() {
        let (bpm, _file) = make_bpm(2);
        let _a = bpm.new_page().unwrap();
        let _b = bpm.new_page().unwrap();
        assert!(matches!(bpm.new_page(), Err(BpmError::NoFreeFrames)));
    }

    #[test]
    fn unpinning_a_page_frees_it_for_eviction() {
        let (bpm, _file) = make_bpm(1);
        let first_id = {
            let guard = bpm.new_page().unwrap();
            guard.page_id()
        };
        let second = bpm.new_page().unwrap();
        assert_ne!(second.page_id(), first_id);
    }

    #[test]
    fn dirty_page_is_flushed_to_disk_on_eviction() {
        let (bpm, _file) = make_bpm(1);
        let first_id = {
            let mut guard = bpm.new_page().unwrap();
            guard[0] = 99;
            guard.mark_dirty();
            guard.page_id()
        };
        let _second = bpm.new_page().unwrap();

        let refetched = bpm.fetch_page(first_id).unwrap();
        assert_eq!(refetched[0], 99);
    }

    #[test]
    fn delete_page_frees_its_frame() {
        let (bpm, _file) = make_bpm(1);
        let page_id = {
            let guard = bpm.new_page().unwrap();
            guard.page_id()
        };
        bpm.delete_page(page_id).unwrap();
        let new_id = bpm.new_page().unwrap().page_id();
        assert_ne!(new_id, page_id);
    }

    #[test]
    fn fetching_an_already_pinned_page_increments_pin_count_and_shares_the_frame() {
        let (bpm, _file) = make_bpm(2);
        let page_id = bpm.new_page().unwrap().page_id();
        let first = bpm.fetch_page(page_id).unwrap();
        let second = bpm.fetch_page(page_id).unwrap();
        drop(first);
        drop(second);

        bpm.unpin_page(page_id, false).unwrap();
    }

    #[test]
    fn concurrent_new_page_calls_allocate_disjoint_pages() {
        use std::sync::Arc;
        use std::thread;

        let file = NamedTempFile::new().unwrap();
        let dm = DiskManager::new(file.path().to_str().unwrap()).unwrap();
        let bpm = Arc::new(BufferPoolManagerImpl::new(16, dm));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let bpm = Arc::clone(&bpm);
                thread::spawn(move || bpm.new_page().unwrap().page_id())
            })
            .collect();

        let mut ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 8);
    }
}
