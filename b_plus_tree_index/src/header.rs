//! The shared header page at [`common::HEADER_PAGE_ID`], recording each
//! named index's root page id so a tree can be reopened after a restart.
//!
//! Layout: a 2-byte record count, followed by fixed 40-byte records of a
//! 4-byte name length, up to 32 bytes of name, and an 8-byte root page id.

use common::{BufferPoolManager, BpmError, PageId};

const COUNT_OFFSET: usize = 0;
const RECORDS_OFFSET: usize = 2;
const NAME_CAPACITY: usize = 32;
const RECORD_SIZE: usize = 4 + NAME_CAPACITY + 8;

/// Reads `name`'s root page id from the header page, if an entry exists.
pub fn find_root_page_id(bpm: &dyn BufferPoolManager, name: &str) -> Result<Option<PageId>, BpmError> {
    let guard = bpm.fetch_page(common::HEADER_PAGE_ID)?;
    let count = u16::from_le_bytes(guard[COUNT_OFFSET..COUNT_OFFSET + 2].try_into().unwrap());
    for i in 0..count as usize {
        let off = RECORDS_OFFSET + i * RECORD_SIZE;
        let name_len = u32::from_le_bytes(guard[off..off + 4].try_into().unwrap()) as usize;
        let record_name = std::str::from_utf8(&guard[off + 4..off + 4 + name_len]).unwrap_or("");
        if record_name == name {
            let root_off = off + 4 + NAME_CAPACITY;
            let root = u64::from_le_bytes(guard[root_off..root_off + 8].try_into().unwrap()) as PageId;
            return Ok(Some(root));
        }
    }
    Ok(None)
}

/// Inserts or updates `name`'s root page id in the header page.
pub fn set_root_page_id(bpm: &dyn BufferPoolManager, name: &str, root_page_id: PageId) -> Result<(), BpmError> {
    assert!(name.len() <= NAME_CAPACITY, "index name too long for header record");
    let mut guard = bpm.fetch_page(common::HEADER_PAGE_ID)?;
    let count = u16::from_le_bytes(guard[COUNT_OFFSET..COUNT_OFFSET + 2].try_into().unwrap());

    for i in 0..count as usize {
        let off = RECORDS_OFFSET + i * RECORD_SIZE;
        let name_len = u32::from_le_bytes(guard[off..off + 4].try_into().unwrap()) as usize;
        let record_name = std::str::from_utf8(&guard[off + 4..off + 4 + name_len]).unwrap_or("");
        if record_name == name {
            let root_off = off + 4 + NAME_CAPACITY;
            guard[root_off..root_off + 8].copy_from_slice(&(root_page_id as u64).to_le_bytes());
            guard.mark_dirty();
            return Ok(());
        }
    }

    let off = RECORDS_OFFSET + count as usize * RECORD_SIZE;
    guard[off..off + 4].copy_from_slice(&(name.len() as u32).to_le_bytes());
    guard[off + 4..off + 4 + name.len()].copy_from_slice(name.as_bytes());
    let root_off = off + 4 + NAME_CAPACITY;
    guard[root_off..root_off + 8].copy_from_slice(&(root_page_id as u64).to_le_bytes());
    guard[COUNT_OFFSET..COUNT_OFFSET + 2].copy_from_slice(&(count + 1).to_le_bytes());
    guard.mark_dirty();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use buffer_pool_manager::BufferPoolManagerImpl;
    use common::DiskManager;
    use tempfile::NamedTempFile;

    fn make_bpm() -> (BufferPoolManagerImpl, NamedTempFile) {
        let file = NamedTempFile::new().unwrap();
        let dm = DiskManager::new(file.path().to_str().unwrap()).unwrap();
        (BufferPoolManagerImpl::new(8, dm), file)
    }

    #[test]
    fn missing_index_returns_none() {
        let (bpm, _file) = make_bpm();
        assert_eq!(find_root_page_id(&bpm, "no_such_index").unwrap(), None);
    }

    #[test]
    fn set_then_find_round_trips() {
        let (bpm, _file) = make_bpm();
        set_root_page_id(&bpm, "orders_pk", 7).unwrap();
        assert_eq!(find_root_page_id(&bpm, "orders_pk").unwrap(), Some(7));
    }

    #[test]
    fn updating_an_existing_name_overwrites_its_root() {
        let (bpm, _file) = make_bpm();
        set_root_page_id(&bpm, "orders_pk", 7).unwrap();
        set_root_page_id(&bpm, "orders_pk", 9).unwrap();
        assert_eq!(find_root_page_id(&bpm, "orders_pk").unwrap(), Some(9));
    }

    #[test]
    fn multiple_indexes_coexist() {
        let (bpm, _file) = make_bpm();
        set_root_page_id(&bpm, "orders_pk", 7).unwrap();
        set_root_page_id(&bpm, "customers_pk", 12).unwrap();
        assert_eq!(find_root_page_id(&bpm, "orders_pk").unwrap(), Some(7));
        assert_eq!(find_root_page_id(&bpm, "customers_pk").unwrap(), Some(12));
    }
}
