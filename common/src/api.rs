//! Defines the common API for all buffer pool manager implementations.
use std::ops::{Deref, DerefMut};

/// A unique identifier for a page in the database.
pub type PageId = usize;

/// A constant to represent an invalid page ID.
pub const INVALID_PAGE_ID: PageId = 0;

/// The page that stores the index header (index_name, root_page_id) records.
pub const HEADER_PAGE_ID: PageId = 1;

/// The size of a single page in bytes.
pub const PAGE_SIZE: usize = 4096;

/// A specialized error type for buffer pool manager operations.
#[derive(Debug, thiserror::Error)]
pub enum BpmError {
    /// Returned when the pool is full and no pages can be evicted.
    #[error("no free frames available to fetch or allocate a page")]
    NoFreeFrames,
    /// Represents an I/O error from the disk manager.
    #[error("disk manager I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized error type for index operations.
///
/// Wraps `BpmError` so call sites at the index layer speak in index-domain
/// terms instead of leaking buffer-pool internals, while still converting
/// cleanly with `?`.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// The buffer pool could not satisfy a `FetchPage`/`NewPage` request.
    #[error("index operation aborted: {0}")]
    Bpm(#[from] BpmError),
}

/// A smart pointer representing a pinned page.
///
/// This guard provides mutable access to the page's byte data. When the guard
/// is dropped, it automatically informs the buffer pool manager to unpin the page,
/// allowing it to be considered for eviction.
pub trait PageGuard: Deref<Target = [u8]> + DerefMut {
    /// Returns the ID of the page being held.
    fn page_id(&self) -> PageId;

    /// Marks the page dirty so it is written back on eviction or flush.
    fn mark_dirty(&mut self);
}

/// The main trait defining the behavior of a Buffer Pool Manager.
///
/// This trait is designed to be object-safe, so it can be used with
/// trait objects (`Box<dyn BufferPoolManager>`).
pub trait BufferPoolManager: Send + Sync {
    /// Fetches a page from the buffer pool, reading from disk if necessary.
    ///
    /// This method pins the page and returns a `PageGuard`. The page remains
    /// pinned until the `PageGuard` is dropped.
    fn fetch_page(&self, page_id: PageId) -> Result<Box<dyn PageGuard + '_>, BpmError>;

    /// Creates a new page in the buffer pool, allocating a fresh page id.
    fn new_page(&self) -> Result<Box<dyn PageGuard + '_>, BpmError>;

    /// Unpins a page from the buffer pool.
    ///
    /// Typically called by the `PageGuard`'s drop implementation rather than directly.
    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<(), BpmError>;

    /// Deletes a page. The caller must already hold no outstanding pins on it.
    fn delete_page(&self, page_id: PageId) -> Result<(), BpmError>;

    /// Flushes a specific page to disk if it is dirty.
    fn flush_page(&self, page_id: PageId) -> Result<(), BpmError>;

    /// Flushes all dirty pages in the buffer pool to disk.
    fn flush_all_pages(&self) -> Result<(), BpmError>;
}
