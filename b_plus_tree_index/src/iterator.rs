//! Forward iteration over a B+Tree's leaf chain.

use crate::key::GenericKey;
use crate::node::LeafView;
use common::{BufferPoolManager, IndexError, PageId, Rid, INVALID_PAGE_ID};

/// Iterates `(key, value)` pairs in ascending key order.
///
/// Holds at most one leaf page pinned at a time; advancing past the end of
/// a leaf unpins it and fetches the next one in the chain.
pub struct BPlusTreeIterator<'bpm, const N: usize> {
    bpm: &'bpm dyn BufferPoolManager,
    current_page_id: PageId,
    current_index: usize,
}

impl<'bpm, const N: usize> BPlusTreeIterator<'bpm, N> {
    pub(crate) fn new(bpm: &'bpm dyn BufferPoolManager, leaf_page_id: PageId, index: usize) -> Self {
        Self {
            bpm,
            current_page_id: leaf_page_id,
            current_index: index,
        }
    }

    /// An iterator over an empty tree, positioned immediately at the end.
    pub(crate) fn empty(bpm: &'bpm dyn BufferPoolManager) -> Self {
        Self {
            bpm,
            current_page_id: INVALID_PAGE_ID,
            current_index: 0,
        }
    }
}

impl<'bpm, const N: usize> Iterator for BPlusTreeIterator<'bpm, N> {
    type Item = Result<(GenericKey<N>, Rid), IndexError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current_page_id == INVALID_PAGE_ID {
                return None;
            }

            let mut guard = match self.bpm.fetch_page(self.current_page_id) {
                Ok(g) => g,
                Err(e) => return Some(Err(e.into())),
            };
            let leaf = LeafView::<N>::new(&mut guard);
            let leaf_size = leaf.size() as usize;

            if self.current_index >= leaf_size {
                // Exhausted this leaf without being genuinely at the end:
                // advance to the next leaf in the chain and retry there.
                let next_page_id = leaf.next_page_id();
                drop(guard);
                if next_page_id == INVALID_PAGE_ID {
                    self.current_page_id = INVALID_PAGE_ID;
                    return None;
                }
                self.current_page_id = next_page_id;
                self.current_index = 0;
                continue;
            }

            let key = GenericKey::from_bytes(leaf.key_at(self.current_index));
            let value = leaf.value_at(self.current_index);
            let next_index = self.current_index + 1;
            let next_page_id = leaf.next_page_id();

            if next_index >= leaf_size {
                self.current_page_id = next_page_id;
                self.current_index = 0;
            } else {
                self.current_index = next_index;
            }

            return Some(Ok((key, value)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::BPlusTree;
    use buffer_pool_manager::BufferPoolManagerImpl;
    use common::DiskManager;
    use tempfile::NamedTempFile;

    #[test]
    fn iterator_over_empty_tree_yields_nothing() {
        let file = NamedTempFile::new().unwrap();
        let dm = DiskManager::new(file.path().to_str().unwrap()).unwrap();
        let bpm = BufferPoolManagerImpl::new(8, dm);
        let tree = BPlusTree::<8>::new(&bpm, "empty_idx", 4, 4).unwrap();
        assert_eq!(tree.begin().unwrap().count(), 0);
    }

    #[test]
    fn begin_at_past_a_non_terminal_leafs_last_key_crosses_into_the_next_leaf() {
        use crate::key::GenericKey as Key;

        let file = NamedTempFile::new().unwrap();
        let dm = DiskManager::new(file.path().to_str().unwrap()).unwrap();
        let bpm = BufferPoolManagerImpl::new(16, dm);
        let tree = BPlusTree::<8>::new(&bpm, "idx", 4, 4).unwrap();

        // Small leaf capacity forces the split into {0,2} | {4,6,8,10}.
        for k in [0i64, 2, 4, 6, 8, 10] {
            tree.insert(Key::from_i64(k), common::Rid::new(k as usize + 1, 0), None).unwrap();
        }

        // Seeking to 3 lands at the end of the first leaf (index == size)
        // with a valid next_page_id: iteration must continue there.
        let collected: Vec<i64> = tree
            .begin_at(&Key::from_i64(3))
            .unwrap()
            .map(|r| r.unwrap().0.as_i64())
            .collect();
        assert_eq!(collected, vec![4, 6, 8, 10]);
    }
}
