
//! A placeholder for a real disk manager.
use super::api::{PageId, HEADER_PAGE_ID, INVALID_PAGE_ID, PAGE_SIZE};
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt; // Using positioned I/O for better concurrency
use std::sync::Mutex;

/// Manages reading and writing pages to a file on disk.
/// This implementation uses positioned I/O (`read_at`, `write_at`) to allow
/// multiple concurrent reads and writes without a global lock on the file.
#[derive(Debug)]
pub struct DiskManager {
    db_file: File, // No Mutex needed for I/O, only for allocating new pages
    next_page_id: Mutex<PageId>,
}

impl DiskManager {
    /// Creates a new DiskManager for a given database file.
    pub fn new(db_file_path: &str) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(db_file_path)?;
        let metadata = file.metadata()?;
        let mut next_page_id = (metadata.len() / PAGE_SIZE as u64) as PageId;
        // Page ids up to and including HEADER_PAGE_ID are reserved (0 is
        // INVALID_PAGE_ID, 1 is the index header page); never hand them out.
        if next_page_id <= HEADER_PAGE_ID {
            next_page_id = HEADER_PAGE_ID + 1;
        }

        Ok(Self {
            db_file: file,
            next_page_id: Mutex::new(next_page_id),
        })
    }

    /// Reads a page from the database file into the provided buffer using positioned I/O.
    ///
    /// A page whose bytes lie partly or wholly past the current end of file is
    /// treated as implicitly zero rather than an error: a page id can be handed
    /// out by `allocate_page` and fetched before it has ever been flushed.
    pub fn read_page(&self, page_id: PageId, data: &mut [u8]) -> io::Result<()> {
        data.fill(0);
        let offset = (page_id * PAGE_SIZE) as u64;
        let file_len = self.db_file.metadata()?.len();
        if offset >= file_len {
            return Ok(());
        }
        let available = ((file_len - offset) as usize).min(data.len());
        self.db_file.read_exact_at(&mut data[..available], offset)
    }

    /// Writes a page from the buffer into the database file using positioned I/O.
    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> io::Result<()> {
        let offset = (page_id * PAGE_SIZE) as u64;
        self.db_file.write_all_at(data, offset)
    }

    /// Allocates a new page ID.
    pub fn allocate_page(&self) -> PageId {
        let mut next_page_id = self.next_page_id.lock().unwrap();
        let page_id = *next_page_id;
        *next_page_id += 1;
        page_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn allocate_page_skips_the_invalid_id_and_the_header_page() {
        let db_file = "test_disk_manager_allocate.db";
        let disk_manager = DiskManager::new(db_file).unwrap();
        let first = disk_manager.allocate_page();
        assert_ne!(first, INVALID_PAGE_ID);
        assert_ne!(first, HEADER_PAGE_ID);
        assert_eq!(first, HEADER_PAGE_ID + 1);
        assert_eq!(disk_manager.allocate_page(), HEADER_PAGE_ID + 2);
        fs::remove_file(db_file).unwrap();
    }

    #[test]
    fn read_after_write_round_trips() {
        let db_file = "test_disk_manager_read_write.db";
        let disk_manager = DiskManager::new(db_file).unwrap();
        let page_id = disk_manager.allocate_page();

        let mut data = [0u8; PAGE_SIZE];
        for (i, byte) in data.iter_mut().enumerate() {
            *byte = i as u8;
        }

        disk_manager.write_page(page_id, &data).unwrap();

        let mut read_data = [0u8; PAGE_SIZE];
        disk_manager.read_page(page_id, &mut read_data).unwrap();

        assert_eq!(data, read_data);
        fs::remove_file(db_file).unwrap();
    }
}
