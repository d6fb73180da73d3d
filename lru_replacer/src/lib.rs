//! A thread-safe LRU victim list for the buffer pool manager.
//!
//! The buffer pool manager calls `insert` whenever a frame becomes unpinned
//! and `erase` whenever a frame is pinned again; `victim` hands back the
//! frame that has gone the longest without being referenced. All bookkeeping
//! lives behind a single mutex: contention is acceptable at buffer-pool-page
//! scale, and it keeps the list and the lookup index from ever drifting out
//! of sync with each other.

use log::trace;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;

struct Node<T> {
    value: T,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Arena-backed doubly linked list: indices stand in for the raw `Node*`
/// back-pointers a C++ version would use, so there is no unsafe cyclic
/// structure to maintain.
struct Inner<T> {
    nodes: Vec<Option<Node<T>>>,
    free: Vec<usize>,
    index: HashMap<T, usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl<T: Eq + Hash + Clone> Inner<T> {
    fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            head: None,
            tail: None,
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = {
            let node = self.nodes[idx].as_ref().expect("unlink on freed node");
            (node.prev, node.next)
        };
        match prev {
            Some(p) => self.nodes[p].as_mut().unwrap().next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].as_mut().unwrap().prev = prev,
            None => self.tail = prev,
        }
    }

    fn push_back(&mut self, idx: usize) {
        let old_tail = self.tail;
        {
            let node = self.nodes[idx].as_mut().expect("push_back on freed node");
            node.prev = old_tail;
            node.next = None;
        }
        match old_tail {
            Some(t) => self.nodes[t].as_mut().unwrap().next = Some(idx),
            None => self.head = Some(idx),
        }
        self.tail = Some(idx);
    }

    fn free_node(&mut self, idx: usize) {
        self.nodes[idx] = None;
        self.free.push(idx);
    }

    fn insert(&mut self, value: T) {
        if let Some(&idx) = self.index.get(&value) {
            self.unlink(idx);
            self.push_back(idx);
            return;
        }

        let node = Node {
            value: value.clone(),
            prev: None,
            next: None,
        };
        let idx = match self.free.pop() {
            Some(i) => {
                self.nodes[i] = Some(node);
                i
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        };
        self.index.insert(value, idx);
        self.push_back(idx);
    }

    fn victim(&mut self) -> Option<T> {
        let idx = self.head?;
        let value = self.nodes[idx].as_ref().unwrap().value.clone();
        self.unlink(idx);
        self.free_node(idx);
        self.index.remove(&value);
        Some(value)
    }

    fn erase(&mut self, value: &T) -> bool {
        match self.index.remove(value) {
            Some(idx) => {
                self.unlink(idx);
                self.free_node(idx);
                true
            }
            None => false,
        }
    }

    fn size(&self) -> usize {
        self.index.len()
    }
}

/// A doubly-linked LRU list guarded by a single mutex.
///
/// `insert` is idempotent on membership: inserting a value already present
/// moves it to the most-recently-used end rather than duplicating it.
pub struct LruReplacer<T> {
    inner: Mutex<Inner<T>>,
}

impl<T: Eq + Hash + Clone> Default for LruReplacer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Eq + Hash + Clone> LruReplacer<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::new()),
        }
    }

    /// Marks `value` as the most-recently-used element.
    pub fn insert(&self, value: T) {
        self.inner.lock().unwrap().insert(value);
    }

    /// Removes and returns the least-recently-used element, if any.
    pub fn victim(&self) -> Option<T> {
        let victim = self.inner.lock().unwrap().victim();
        if victim.is_some() {
            trace!("lru victim selected");
        }
        victim
    }

    /// Removes `value` from the list regardless of its position.
    ///
    /// Returns whether the value was present.
    pub fn erase(&self, value: &T) -> bool {
        self.inner.lock().unwrap().erase(value)
    }

    /// The number of elements currently eligible for eviction.
    pub fn size(&self) -> usize {
        self.inner.lock().unwrap().size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn victim_order_matches_insertion_order() {
        let lru = LruReplacer::new();
        lru.insert(1);
        lru.insert(2);
        lru.insert(3);

        assert_eq!(lru.victim(), Some(1));

        lru.insert(1);

        assert_eq!(lru.victim(), Some(2));
        assert_eq!(lru.victim(), Some(3));
        assert_eq!(lru.victim(), Some(1));
        assert_eq!(lru.victim(), None);
    }

    #[test]
    fn erase_removes_regardless_of_position() {
        let lru = LruReplacer::new();
        lru.insert(1);
        lru.insert(2);
        lru.insert(3);

        assert!(lru.erase(&2));
        assert!(!lru.erase(&2));

        assert_eq!(lru.size(), 2);
        assert_eq!(lru.victim(), Some(1));
        assert_eq!(lru.victim(), Some(3));
    }

    #[test]
    fn erase_on_single_element_list_empties_it() {
        let lru = LruReplacer::new();
        lru.insert(42);
        assert!(lru.erase(&42));
        assert_eq!(lru.size(), 0);
        assert_eq!(lru.victim(), None);
    }

    #[test]
    fn reinserting_moves_to_most_recently_used_end() {
        let lru = LruReplacer::new();
        lru.insert("a");
        lru.insert("b");
        lru.insert("a");

        assert_eq!(lru.victim(), Some("b"));
        assert_eq!(lru.victim(), Some("a"));
    }

    #[test]
    fn freed_slots_are_reused_without_corrupting_the_list() {
        let lru = LruReplacer::new();
        for i in 0..10 {
            lru.insert(i);
        }
        for _ in 0..5 {
            lru.victim();
        }
        for i in 100..105 {
            lru.insert(i);
        }
        let mut drained = Vec::new();
        while let Some(v) = lru.victim() {
            drained.push(v);
        }
        assert_eq!(drained, vec![5, 6, 7, 8, 9, 100, 101, 102, 103, 104]);
    }

    #[test]
    fn concurrent_inserts_and_victims_stay_consistent() {
        let lru = Arc::new(LruReplacer::new());
        let mut handles = Vec::new();
        for t in 0..4 {
            let lru = Arc::clone(&lru);
            handles.push(thread::spawn(move || {
                for i in 0..50 {
                    lru.insert(t * 1000 + i);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(lru.size(), 200);

        let mut seen = std::collections::HashSet::new();
        while let Some(v) = lru.victim() {
            assert!(seen.insert(v), "victim returned {v} twice");
        }
        assert_eq!(seen.len(), 200);
    }
}
