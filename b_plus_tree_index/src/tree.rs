//! The public B+Tree index: ties the node byte layout, the header page,
//! and the iterator together into point query / range scan / insert /
//! delete over a buffer pool manager.
//!
//! A single coarse `Mutex` serializes structural changes (insert/delete);
//! point queries and iteration take no tree-level lock of their own and
//! rely entirely on the buffer pool manager's own page-level
//! synchronization, matching the "readers traverse under shared access"
//! concurrency model.
//!
//! Leaf and internal coalesce/redistribute are implemented as separate,
//! near-identical routines rather than one generic helper: a leaf's
//! entries are `(key, Rid)` and an internal's are `(key, PageId)`, and the
//! internal variant additionally has to pull separator keys through the
//! parent and re-parent migrated children, so sharing one code path would
//! cost more in indirection than the duplication it would save.

use crate::header;
use crate::iterator::BPlusTreeIterator;
use crate::key::GenericKey;
use crate::node::{self, InternalView, LeafView};
use common::{BufferPoolManager, IndexError, PageId, Rid, Transaction, INVALID_PAGE_ID};
use std::sync::{Mutex, RwLock};

fn min_size(max_size: u16) -> u16 {
    (max_size + 1) / 2
}

fn leaf_lookup<const N: usize>(leaf: &LeafView<'_, N>, key: &GenericKey<N>) -> Option<usize> {
    let size = leaf.size() as usize;
    if size == 0 {
        return None;
    }
    let target = *key.as_bytes();
    let mut lo = 0usize;
    let mut hi = size - 1;
    loop {
        let mid = lo + (hi - lo) / 2;
        let mid_key = leaf.key_at(mid);
        if mid_key == target {
            return Some(mid);
        }
        if mid_key < target {
            if mid == hi {
                return None;
            }
            lo = mid + 1;
        } else {
            if mid == lo {
                return None;
            }
            hi = mid - 1;
        }
    }
}

/// Smallest index `i` with `array[i] > key`; the iterator seek primitive.
fn leaf_key_index<const N: usize>(leaf: &LeafView<'_, N>, key: &GenericKey<N>) -> usize {
    let size = leaf.size() as usize;
    let target = *key.as_bytes();
    let mut lo = 0usize;
    let mut hi = size;
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if leaf.key_at(mid) > target {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }
    lo
}

/// Largest index `i` in `1..size` with `keys[i] <= key`, or `0` if none.
fn internal_lookup<const N: usize>(internal: &InternalView<'_, N>, key: &GenericKey<N>) -> PageId {
    let size = internal.size() as usize;
    let target = *key.as_bytes();
    let mut result = 0usize;
    let mut lo = 1usize;
    let mut hi = size;
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if internal.key_at(mid) <= target {
            result = mid;
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    internal.child_at(result)
}

/// An ordered index from a fixed-width key to a [`Rid`], backed by pages
/// fetched through a [`BufferPoolManager`]. `N` is one of the five
/// required key widths (4, 8, 16, 32, 64).
pub struct BPlusTree<'bpm, const N: usize> {
    bpm: &'bpm dyn BufferPoolManager,
    name: String,
    root_page_id: RwLock<PageId>,
    structure_lock: Mutex<()>,
    leaf_max_size: u16,
    internal_max_size: u16,
}

impl<'bpm, const N: usize> BPlusTree<'bpm, N> {
    /// Opens (or creates, if `name` has no header record yet) an index
    /// with the given per-page fanout.
    pub fn new(bpm: &'bpm dyn BufferPoolManager, name: &str, leaf_max_size: u16, internal_max_size: u16) -> Result<Self, IndexError> {
        assert!(leaf_max_size >= 2, "leaf_max_size must allow at least 2 entries");
        assert!(internal_max_size >= 2, "internal_max_size must allow at least 2 children");

        let root_page_id = match header::find_root_page_id(bpm, name)? {
            Some(id) => id,
            None => {
                header::set_root_page_id(bpm, name, INVALID_PAGE_ID)?;
                INVALID_PAGE_ID
            }
        };

        Ok(Self {
            bpm,
            name: name.to_string(),
            root_page_id: RwLock::new(root_page_id),
            structure_lock: Mutex::new(()),
            leaf_max_size,
            internal_max_size,
        })
    }

    /// Opens (or creates) an index sized from [`node::compute_fanout`]
    /// for key width `N` against the compile-time `PAGE_SIZE`.
    pub fn with_computed_fanout(bpm: &'bpm dyn BufferPoolManager, name: &str) -> Result<Self, IndexError> {
        let (leaf_max_size, internal_max_size) = node::compute_fanout::<N>();
        Self::new(bpm, name, leaf_max_size, internal_max_size)
    }

    pub fn is_empty(&self) -> bool {
        *self.root_page_id.read().unwrap() == INVALID_PAGE_ID
    }

    fn current_root(&self) -> PageId {
        *self.root_page_id.read().unwrap()
    }

    fn set_root(&self, new_root: PageId) -> Result<(), IndexError> {
        *self.root_page_id.write().unwrap() = new_root;
        header::set_root_page_id(self.bpm, &self.name, new_root)?;
        Ok(())
    }

    fn set_parent(&self, page_id: PageId, parent_id: PageId) -> Result<(), IndexError> {
        let mut guard = self.bpm.fetch_page(page_id)?;
        if node::is_leaf(&guard) {
            LeafView::<N>::new(&mut guard).set_parent(parent_id);
        } else {
            InternalView::<N>::new(&mut guard).set_parent(parent_id);
        }
        guard.mark_dirty();
        Ok(())
    }

    fn parent_of(&self, page_id: PageId) -> Result<PageId, IndexError> {
        let mut guard = self.bpm.fetch_page(page_id)?;
        let parent = if node::is_leaf(&guard) {
            LeafView::<N>::new(&mut guard).parent()
        } else {
            InternalView::<N>::new(&mut guard).parent()
        };
        Ok(parent)
    }

    /// Descends from the root to the leaf that would hold `key` (or, if
    /// `left_most`, the leftmost leaf in the tree), unpinning every
    /// intermediate internal page along the way. The caller owns the
    /// returned leaf's pin.
    fn find_leaf_page(&self, key: &GenericKey<N>, left_most: bool) -> Result<Box<dyn common::PageGuard + 'bpm>, IndexError> {
        let mut guard = self.bpm.fetch_page(self.current_root())?;
        loop {
            if node::is_leaf(&guard) {
                return Ok(guard);
            }
            let next_page_id = {
                let internal = InternalView::<N>::new(&mut guard);
                if left_most {
                    internal.child_at(0)
                } else {
                    internal_lookup(&internal, key)
                }
            };
            guard = self.bpm.fetch_page(next_page_id)?;
        }
    }

    /// Point query: appends the value associated with `key` to `results`
    /// and returns whether it was found. Transactions are threaded
    /// through for interface parity; this index never calls the lock
    /// manager itself.
    pub fn get_value(&self, key: &GenericKey<N>, results: &mut Vec<Rid>, _txn: Option<&Transaction>) -> Result<bool, IndexError> {
        if self.is_empty() {
            return Ok(false);
        }
        let mut guard = self.find_leaf_page(key, false)?;
        let leaf = LeafView::<N>::new(&mut guard);
        match leaf_lookup(&leaf, key) {
            Some(idx) => {
                results.push(leaf.value_at(idx));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Inserts `(key, value)`. Returns `false` without mutation if `key`
    /// is already present (unique-key index).
    pub fn insert(&self, key: GenericKey<N>, value: Rid, _txn: Option<&Transaction>) -> Result<bool, IndexError> {
        let _structural = self.structure_lock.lock().unwrap();
        if self.is_empty() {
            self.start_new_tree(key, value)?;
            return Ok(true);
        }
        self.insert_into_leaf(key, value)
    }

    fn start_new_tree(&self, key: GenericKey<N>, value: Rid) -> Result<(), IndexError> {
        let mut guard = self.bpm.new_page()?;
        let root_id = guard.page_id();
        {
            let mut leaf = LeafView::<N>::new(&mut guard);
            leaf.init(root_id, INVALID_PAGE_ID, self.leaf_max_size);
            leaf.insert(*key.as_bytes(), value, |a, b| a < b);
        }
        guard.mark_dirty();
        drop(guard);
        self.set_root(root_id)
    }

    fn insert_into_leaf(&self, key: GenericKey<N>, value: Rid) -> Result<bool, IndexError> {
        let mut guard = self.find_leaf_page(&key, false)?;
        let leaf_page_id = guard.page_id();

        {
            let leaf = LeafView::<N>::new(&mut guard);
            if leaf_lookup(&leaf, &key).is_some() {
                return Ok(false);
            }
        }

        let has_room = {
            let leaf = LeafView::<N>::new(&mut guard);
            leaf.size() < leaf.max_size()
        };
        if has_room {
            LeafView::<N>::new(&mut guard).insert(*key.as_bytes(), value, |a, b| a < b);
            guard.mark_dirty();
            return Ok(true);
        }

        drop(guard);
        self.split_leaf_and_insert(leaf_page_id, key, value)?;
        Ok(true)
    }

    /// Splits a full leaf, moving its upper half into a new sibling, then
    /// inserts `(key, value)` into whichever half it belongs in.
    fn split_leaf_and_insert(&self, leaf_page_id: PageId, key: GenericKey<N>, value: Rid) -> Result<(), IndexError> {
        let mut old_guard = self.bpm.fetch_page(leaf_page_id)?;
        let mut new_guard = self.bpm.new_page()?;
        let new_page_id = new_guard.page_id();

        let split_key_bytes;
        {
            let parent_id = LeafView::<N>::new(&mut old_guard).parent();
            let old_next = LeafView::<N>::new(&mut old_guard).next_page_id();
            let all = LeafView::<N>::new(&mut old_guard).read_all();
            let half = (all.len() + 1) / 2;
            let moved: Vec<_> = all[all.len() - half..].to_vec();
            LeafView::<N>::new(&mut old_guard).overwrite(&all[..all.len() - half]);

            let mut new_leaf = LeafView::<N>::new(&mut new_guard);
            new_leaf.init(new_page_id, parent_id, self.leaf_max_size);
            new_leaf.overwrite(&moved);
            new_leaf.set_next_page_id(old_next);
            drop(new_leaf);

            LeafView::<N>::new(&mut old_guard).set_next_page_id(new_page_id);

            split_key_bytes = moved[0].0;
            if *key.as_bytes() < split_key_bytes {
                LeafView::<N>::new(&mut old_guard).insert(*key.as_bytes(), value, |a, b| a < b);
            } else {
                LeafView::<N>::new(&mut new_guard).insert(*key.as_bytes(), value, |a, b| a < b);
            }
        }
        old_guard.mark_dirty();
        new_guard.mark_dirty();
        drop(old_guard);
        drop(new_guard);

        self.insert_into_parent(leaf_page_id, GenericKey::from_bytes(split_key_bytes), new_page_id)
    }

    /// Installs `(key, new_id)` as the separator following `old_id` in
    /// `old_id`'s parent, splitting that parent (recursively, up to a
    /// fresh root) if it has no room.
    fn insert_into_parent(&self, old_id: PageId, key: GenericKey<N>, new_id: PageId) -> Result<(), IndexError> {
        if old_id == self.current_root() {
            let mut root_guard = self.bpm.new_page()?;
            let new_root_id = root_guard.page_id();
            {
                let mut root = InternalView::<N>::new(&mut root_guard);
                root.init(new_root_id, INVALID_PAGE_ID, self.internal_max_size);
                root.populate_new_root(old_id, *key.as_bytes(), new_id);
            }
            root_guard.mark_dirty();
            drop(root_guard);

            self.set_parent(old_id, new_root_id)?;
            self.set_parent(new_id, new_root_id)?;
            return self.set_root(new_root_id);
        }

        let parent_id = self.parent_of(old_id)?;
        let mut parent_guard = self.bpm.fetch_page(parent_id)?;
        let has_room = {
            let parent = InternalView::<N>::new(&mut parent_guard);
            parent.size() < parent.max_size()
        };

        if has_room {
            let mut parent = InternalView::<N>::new(&mut parent_guard);
            let after_index = parent.index_of_child(old_id);
            parent.insert_after(after_index, *key.as_bytes(), new_id);
            drop(parent);
            parent_guard.mark_dirty();
            drop(parent_guard);
            return self.set_parent(new_id, parent_id);
        }

        drop(parent_guard);
        self.split_internal_and_insert(parent_id, old_id, key, new_id)
    }

    /// Builds a scratch image of `parent`'s entries plus the new one in
    /// sorted position, splits it across `parent` and a fresh sibling,
    /// re-parents the children that moved, and recurses up.
    fn split_internal_and_insert(&self, parent_id: PageId, old_child_id: PageId, key: GenericKey<N>, new_child_id: PageId) -> Result<(), IndexError> {
        let mut parent_guard = self.bpm.fetch_page(parent_id)?;
        let parent_parent_id;
        let mut all: Vec<([u8; N], PageId)>;
        {
            let parent = InternalView::<N>::new(&mut parent_guard);
            parent_parent_id = parent.parent();
            all = parent.read_all();
        }
        let after_index = all
            .iter()
            .position(|(_, c)| *c == old_child_id)
            .expect("old_child_id must be a child of its own parent");
        all.insert(after_index + 1, (*key.as_bytes(), new_child_id));

        let total = all.len();
        let lower_count = total / 2;
        let (lower, upper) = all.split_at(lower_count);

        let mut new_guard = self.bpm.new_page()?;
        let new_id = new_guard.page_id();

        InternalView::<N>::new(&mut parent_guard).overwrite(lower);
        {
            let mut new_internal = InternalView::<N>::new(&mut new_guard);
            new_internal.init(new_id, parent_parent_id, self.internal_max_size);
            new_internal.overwrite(upper);
        }
        parent_guard.mark_dirty();
        new_guard.mark_dirty();

        let split_key = GenericKey::<N>::from_bytes(upper[0].0);
        let moved_children: Vec<PageId> = upper.iter().map(|(_, c)| *c).collect();
        drop(parent_guard);
        drop(new_guard);

        for child in moved_children {
            self.set_parent(child, new_id)?;
        }

        self.insert_into_parent(parent_id, split_key, new_id)
    }

    /// Removes `key`, if present. A no-op (not an error) if absent.
    pub fn remove(&self, key: &GenericKey<N>, _txn: Option<&Transaction>) -> Result<(), IndexError> {
        let _structural = self.structure_lock.lock().unwrap();
        if self.is_empty() {
            return Ok(());
        }

        let leaf_id;
        {
            let mut guard = self.find_leaf_page(key, false)?;
            leaf_id = guard.page_id();
            let mut leaf = LeafView::<N>::new(&mut guard);
            match leaf_lookup(&leaf, key) {
                Some(idx) => leaf.remove_at(idx),
                None => return Ok(()),
            }
            drop(leaf);
            guard.mark_dirty();
        }

        self.coalesce_or_redistribute_leaf(leaf_id)
    }

    fn coalesce_or_redistribute_leaf(&self, leaf_id: PageId) -> Result<(), IndexError> {
        if leaf_id == self.current_root() {
            return self.adjust_root_leaf(leaf_id);
        }

        let (size, min) = {
            let mut guard = self.bpm.fetch_page(leaf_id)?;
            let leaf = LeafView::<N>::new(&mut guard);
            (leaf.size(), min_size(leaf.max_size()))
        };
        if size >= min {
            return Ok(());
        }

        let parent_id = self.parent_of(leaf_id)?;
        let (sibling_id, index) = {
            let mut parent_guard = self.bpm.fetch_page(parent_id)?;
            let parent = InternalView::<N>::new(&mut parent_guard);
            let node_index = parent.index_of_child(leaf_id);
            if node_index == 0 {
                (parent.child_at(1), 0usize)
            } else {
                (parent.child_at(node_index - 1), 1usize)
            }
        };

        let would_overflow = {
            let mut leaf_guard = self.bpm.fetch_page(leaf_id)?;
            let mut sibling_guard = self.bpm.fetch_page(sibling_id)?;
            let leaf_size = LeafView::<N>::new(&mut leaf_guard).size();
            let sibling_size = LeafView::<N>::new(&mut sibling_guard).size();
            let leaf_max = LeafView::<N>::new(&mut leaf_guard).max_size();
            leaf_size + sibling_size > leaf_max
        };

        if would_overflow {
            return self.redistribute_leaf(leaf_id, sibling_id, parent_id, index);
        }

        self.coalesce_leaf(leaf_id, sibling_id, parent_id, index)?;
        self.coalesce_or_redistribute_internal(parent_id)
    }

    fn redistribute_leaf(&self, node_id: PageId, sibling_id: PageId, parent_id: PageId, index: usize) -> Result<(), IndexError> {
        let mut node_guard = self.bpm.fetch_page(node_id)?;
        let mut sibling_guard = self.bpm.fetch_page(sibling_id)?;
        let mut parent_guard = self.bpm.fetch_page(parent_id)?;

        if index == 0 {
            let (key, value) = {
                let sibling = LeafView::<N>::new(&mut sibling_guard);
                (sibling.key_at(0), sibling.value_at(0))
            };
            LeafView::<N>::new(&mut sibling_guard).remove_at(0);
            LeafView::<N>::new(&mut node_guard).insert(key, value, |a, b| a < b);

            let new_sibling_first = LeafView::<N>::new(&mut sibling_guard).key_at(0);
            let sib_pos = InternalView::<N>::new(&mut parent_guard).index_of_child(sibling_id);
            InternalView::<N>::new(&mut parent_guard).set_key_at(sib_pos, new_sibling_first);
        } else {
            let sib_size = LeafView::<N>::new(&mut sibling_guard).size() as usize;
            let (key, value) = {
                let sibling = LeafView::<N>::new(&mut sibling_guard);
                (sibling.key_at(sib_size - 1), sibling.value_at(sib_size - 1))
            };
            LeafView::<N>::new(&mut sibling_guard).remove_at(sib_size - 1);
            LeafView::<N>::new(&mut node_guard).insert(key, value, |a, b| a < b);

            let node_pos = InternalView::<N>::new(&mut parent_guard).index_of_child(node_id);
            InternalView::<N>::new(&mut parent_guard).set_key_at(node_pos, key);
        }

        node_guard.mark_dirty();
        sibling_guard.mark_dirty();
        parent_guard.mark_dirty();
        Ok(())
    }

    /// `index == 0`: `node_id` is its parent's first child, so the sibling
    /// (holding larger keys) is merged into it and deleted. Otherwise
    /// `node_id`'s entries are merged into its (smaller-keyed) sibling and
    /// `node_id` is deleted.
    fn coalesce_leaf(&self, node_id: PageId, sibling_id: PageId, parent_id: PageId, index: usize) -> Result<(), IndexError> {
        let (recipient_id, source_id) = if index == 0 { (node_id, sibling_id) } else { (sibling_id, node_id) };

        let source_entries;
        let source_next;
        {
            let mut source_guard = self.bpm.fetch_page(source_id)?;
            let source = LeafView::<N>::new(&mut source_guard);
            source_entries = source.read_all();
            source_next = source.next_page_id();
        }
        {
            let mut recipient_guard = self.bpm.fetch_page(recipient_id)?;
            let mut recipient = LeafView::<N>::new(&mut recipient_guard);
            let mut all = recipient.read_all();
            all.extend(source_entries);
            recipient.overwrite(&all);
            recipient.set_next_page_id(source_next);
            recipient_guard.mark_dirty();
        }

        let separator_index = {
            let mut parent_guard = self.bpm.fetch_page(parent_id)?;
            InternalView::<N>::new(&mut parent_guard).index_of_child(source_id)
        };
        {
            let mut parent_guard = self.bpm.fetch_page(parent_id)?;
            InternalView::<N>::new(&mut parent_guard).remove_at(separator_index);
            parent_guard.mark_dirty();
        }

        self.bpm.delete_page(source_id)?;
        Ok(())
    }

    fn adjust_root_leaf(&self, leaf_id: PageId) -> Result<(), IndexError> {
        let size = {
            let mut guard = self.bpm.fetch_page(leaf_id)?;
            LeafView::<N>::new(&mut guard).size()
        };
        if size == 0 {
            self.set_root(INVALID_PAGE_ID)?;
            self.bpm.delete_page(leaf_id)?;
        }
        Ok(())
    }

    fn coalesce_or_redistribute_internal(&self, internal_id: PageId) -> Result<(), IndexError> {
        if internal_id == self.current_root() {
            return self.adjust_root_internal(internal_id);
        }

        let (size, min) = {
            let mut guard = self.bpm.fetch_page(internal_id)?;
            let internal = InternalView::<N>::new(&mut guard);
            (internal.size(), min_size(internal.max_size()))
        };
        if size >= min {
            return Ok(());
        }

        let parent_id = self.parent_of(internal_id)?;
        let (sibling_id, index) = {
            let mut parent_guard = self.bpm.fetch_page(parent_id)?;
            let parent = InternalView::<N>::new(&mut parent_guard);
            let node_index = parent.index_of_child(internal_id);
            if node_index == 0 {
                (parent.child_at(1), 0usize)
            } else {
                (parent.child_at(node_index - 1), 1usize)
            }
        };

        let would_overflow = {
            let mut node_guard = self.bpm.fetch_page(internal_id)?;
            let mut sibling_guard = self.bpm.fetch_page(sibling_id)?;
            let node_size = InternalView::<N>::new(&mut node_guard).size();
            let sibling_size = InternalView::<N>::new(&mut sibling_guard).size();
            let node_max = InternalView::<N>::new(&mut node_guard).max_size();
            node_size + sibling_size > node_max
        };

        if would_overflow {
            return self.redistribute_internal(internal_id, sibling_id, parent_id, index);
        }

        self.coalesce_internal(internal_id, sibling_id, parent_id, index)?;
        self.coalesce_or_redistribute_internal(parent_id)
    }

    fn redistribute_internal(&self, node_id: PageId, sibling_id: PageId, parent_id: PageId, index: usize) -> Result<(), IndexError> {
        let mut node_guard = self.bpm.fetch_page(node_id)?;
        let mut sibling_guard = self.bpm.fetch_page(sibling_id)?;
        let mut parent_guard = self.bpm.fetch_page(parent_id)?;

        let moved_child;
        if index == 0 {
            let sib_child0 = InternalView::<N>::new(&mut sibling_guard).child_at(0);
            let sib_pos = InternalView::<N>::new(&mut parent_guard).index_of_child(sibling_id);
            let separator_key = InternalView::<N>::new(&mut parent_guard).key_at(sib_pos);
            let new_separator_key = InternalView::<N>::new(&mut sibling_guard).key_at(1);

            let node_size = InternalView::<N>::new(&mut node_guard).size() as usize;
            InternalView::<N>::new(&mut node_guard).insert_after(node_size - 1, separator_key, sib_child0);
            InternalView::<N>::new(&mut sibling_guard).remove_at(0);
            InternalView::<N>::new(&mut parent_guard).set_key_at(sib_pos, new_separator_key);

            moved_child = sib_child0;
        } else {
            let sib_size = InternalView::<N>::new(&mut sibling_guard).size() as usize;
            let sib_last_child = InternalView::<N>::new(&mut sibling_guard).child_at(sib_size - 1);
            let node_pos = InternalView::<N>::new(&mut parent_guard).index_of_child(node_id);
            let separator_key = InternalView::<N>::new(&mut parent_guard).key_at(node_pos);
            let new_separator_key = InternalView::<N>::new(&mut sibling_guard).key_at(sib_size - 1);

            InternalView::<N>::new(&mut sibling_guard).remove_at(sib_size - 1);

            let mut all = InternalView::<N>::new(&mut node_guard).read_all();
            let old_child0 = all[0].1;
            all.insert(1, (separator_key, old_child0));
            all[0] = (all[0].0, sib_last_child);
            InternalView::<N>::new(&mut node_guard).overwrite(&all);

            InternalView::<N>::new(&mut parent_guard).set_key_at(node_pos, new_separator_key);

            moved_child = sib_last_child;
        }

        node_guard.mark_dirty();
        sibling_guard.mark_dirty();
        parent_guard.mark_dirty();
        drop(node_guard);
        drop(sibling_guard);
        drop(parent_guard);

        self.set_parent(moved_child, node_id)
    }

    fn coalesce_internal(&self, node_id: PageId, sibling_id: PageId, parent_id: PageId, index: usize) -> Result<(), IndexError> {
        let (recipient_id, source_id) = if index == 0 { (node_id, sibling_id) } else { (sibling_id, node_id) };

        let separator_position = {
            let mut parent_guard = self.bpm.fetch_page(parent_id)?;
            InternalView::<N>::new(&mut parent_guard).index_of_child(source_id)
        };
        let separator_key = {
            let mut parent_guard = self.bpm.fetch_page(parent_id)?;
            InternalView::<N>::new(&mut parent_guard).key_at(separator_position)
        };

        let source_entries = {
            let mut source_guard = self.bpm.fetch_page(source_id)?;
            InternalView::<N>::new(&mut source_guard).read_all()
        };
        let moved_children: Vec<PageId> = source_entries.iter().map(|(_, c)| *c).collect();

        {
            let mut recipient_guard = self.bpm.fetch_page(recipient_id)?;
            let mut recipient = InternalView::<N>::new(&mut recipient_guard);
            let mut all = recipient.read_all();
            all.push((separator_key, source_entries[0].1));
            all.extend(source_entries[1..].iter().copied());
            recipient.overwrite(&all);
            recipient_guard.mark_dirty();
        }
        {
            let mut parent_guard = self.bpm.fetch_page(parent_id)?;
            InternalView::<N>::new(&mut parent_guard).remove_at(separator_position);
            parent_guard.mark_dirty();
        }

        for child in moved_children {
            self.set_parent(child, recipient_id)?;
        }

        self.bpm.delete_page(source_id)?;
        Ok(())
    }

    fn adjust_root_internal(&self, internal_id: PageId) -> Result<(), IndexError> {
        let (size, only_child) = {
            let mut guard = self.bpm.fetch_page(internal_id)?;
            let internal = InternalView::<N>::new(&mut guard);
            (internal.size(), internal.child_at(0))
        };
        if size == 1 {
            self.set_parent(only_child, INVALID_PAGE_ID)?;
            self.set_root(only_child)?;
            self.bpm.delete_page(internal_id)?;
        }
        Ok(())
    }

    /// An iterator over every `(key, value)` pair in ascending key order.
    pub fn begin(&self) -> Result<BPlusTreeIterator<'bpm, N>, IndexError> {
        if self.is_empty() {
            return Ok(BPlusTreeIterator::empty(self.bpm));
        }
        let guard = self.find_leaf_page(&GenericKey::zeroed(), true)?;
        Ok(BPlusTreeIterator::new(self.bpm, guard.page_id(), 0))
    }

    /// An iterator starting at the first key `>= key`.
    pub fn begin_at(&self, key: &GenericKey<N>) -> Result<BPlusTreeIterator<'bpm, N>, IndexError> {
        if self.is_empty() {
            return Ok(BPlusTreeIterator::empty(self.bpm));
        }
        let mut guard = self.find_leaf_page(key, false)?;
        let leaf_id = guard.page_id();
        let index = leaf_key_index(&LeafView::<N>::new(&mut guard), key);
        Ok(BPlusTreeIterator::new(self.bpm, leaf_id, index))
    }
}
