//! An in-memory extendible hash table, used by the buffer pool manager as
//! its page table (mapping page ids to buffer frames).
//!
//! A single coarse mutex guards the whole directory and every bucket.
//! That is the right trade-off at buffer-pool-page-table scale: the table
//! holds at most one entry per frame, so contention on one lock is cheaper
//! than the bookkeeping a per-bucket latch scheme would need.

use log::{debug, warn};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

/// Depth at which we give up trying to separate a degenerate partition
/// (every key landing on the same side of the split bit) and leave the
/// bucket overflowing rather than spin forever on a pathological hash.
const MAX_DEPTH: u32 = 63;

struct Bucket<K, V> {
    id: usize,
    depth: u32,
    items: HashMap<K, V>,
}

impl<K, V> Bucket<K, V> {
    fn new(id: usize, depth: u32) -> Self {
        Self {
            id,
            depth,
            items: HashMap::new(),
        }
    }
}

struct Inner<K, V> {
    bucket_size: usize,
    global_depth: u32,
    /// `directory[slot]` is an index into `buckets`. Several slots may point
    /// at the same bucket; this is the in-memory analogue of the source's
    /// `Vec<shared_ptr<Bucket>>` with index-based sharing instead of
    /// reference-counted pointers.
    directory: Vec<usize>,
    buckets: Vec<Bucket<K, V>>,
}

impl<K: Eq + Hash, V> Inner<K, V> {
    fn new(bucket_size: usize) -> Self {
        Self {
            bucket_size,
            global_depth: 0,
            directory: vec![0],
            buckets: vec![Bucket::new(0, 0)],
        }
    }

    fn hash_key(key: &K) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    }

    fn slot_for(&self, key: &K) -> usize {
        let mask = if self.global_depth == 0 {
            0
        } else {
            (1usize << self.global_depth) - 1
        };
        (Self::hash_key(key) as usize) & mask
    }

    fn find(&self, key: &K) -> Option<&V> {
        let slot = self.slot_for(key);
        let bucket = &self.buckets[self.directory[slot]];
        bucket.items.get(key)
    }

    fn remove(&mut self, key: &K) -> bool {
        let slot = self.slot_for(key);
        let bucket_idx = self.directory[slot];
        self.buckets[bucket_idx].items.remove(key).is_some()
    }

    fn insert(&mut self, key: K, value: V) {
        let slot = self.slot_for(&key);
        let bucket_idx = self.directory[slot];

        if let Some(existing) = self.buckets[bucket_idx].items.get_mut(&key) {
            *existing = value;
            return;
        }

        self.buckets[bucket_idx].items.insert(key, value);
        if self.buckets[bucket_idx].items.len() > self.bucket_size {
            self.split(bucket_idx);
        }
    }

    fn double_directory(&mut self) {
        self.directory.extend_from_within(..);
        self.global_depth += 1;
        debug!(
            "extendible hash directory doubled to global depth {}",
            self.global_depth
        );
    }

    fn mask(depth: u32) -> usize {
        if depth == 0 {
            0
        } else {
            (1usize << depth) - 1
        }
    }

    fn rewire(&mut self, depth: u32, id: usize, bucket_storage_idx: usize) {
        let mask = Self::mask(depth);
        for (slot, target) in self.directory.iter_mut().enumerate() {
            if slot & mask == id {
                *target = bucket_storage_idx;
            }
        }
    }

    /// Splits an overflowing bucket, doubling the directory first if the
    /// bucket's local depth has already caught up to the global depth.
    ///
    /// A partition can be degenerate (every key lands on the same side of
    /// the new split bit, usually because they agreed on more low-order
    /// hash bits than the current depth distinguishes) in which case the
    /// depth is bumped again and the same set is re-partitioned, bounded by
    /// `MAX_DEPTH`.
    fn split(&mut self, bucket_idx: usize) {
        let mut items: HashMap<K, V> = std::mem::take(&mut self.buckets[bucket_idx].items);
        let mut depth = self.buckets[bucket_idx].depth;

        loop {
            if depth >= MAX_DEPTH {
                warn!("extendible hash split hit the depth limit; bucket left overflowing");
                self.buckets[bucket_idx].items = items;
                return;
            }

            if depth == self.global_depth {
                self.double_directory();
            }
            depth += 1;

            let mut zero_half = HashMap::new();
            let mut one_half = HashMap::new();
            for (k, v) in items {
                let bit = (Self::hash_key(&k) >> (depth - 1)) & 1;
                if bit == 1 {
                    one_half.insert(k, v);
                } else {
                    zero_half.insert(k, v);
                }
            }

            if zero_half.is_empty() || one_half.is_empty() {
                items = if zero_half.is_empty() {
                    one_half
                } else {
                    zero_half
                };
                continue;
            }

            let mask = Self::mask(depth);
            let zero_id = (Self::hash_key(zero_half.keys().next().unwrap()) as usize) & mask;
            let one_id = (Self::hash_key(one_half.keys().next().unwrap()) as usize) & mask;

            self.buckets[bucket_idx].depth = depth;
            self.buckets[bucket_idx].id = zero_id;
            self.buckets[bucket_idx].items = zero_half;

            self.buckets.push(Bucket {
                id: one_id,
                depth,
                items: one_half,
            });
            let new_bucket_idx = self.buckets.len() - 1;

            self.rewire(depth, zero_id, bucket_idx);
            self.rewire(depth, one_id, new_bucket_idx);

            debug!(
                "extendible hash split bucket {} at local depth {}, {} buckets total",
                bucket_idx,
                depth,
                self.buckets.len()
            );
            return;
        }
    }

    fn global_depth(&self) -> u32 {
        self.global_depth
    }

    fn local_depth(&self, bucket_id: usize) -> i32 {
        match self.directory.get(bucket_id) {
            Some(&bucket_idx) => self.buckets[bucket_idx].depth as i32,
            None => -1,
        }
    }

    fn num_buckets(&self) -> usize {
        self.buckets.len()
    }
}

/// An in-memory extendible hash table mapping keys to values.
pub struct ExtendibleHash<K, V> {
    inner: Mutex<Inner<K, V>>,
}

impl<K: Eq + Hash, V: Clone> ExtendibleHash<K, V> {
    /// Creates an empty table whose buckets hold at most `bucket_size`
    /// entries before splitting.
    pub fn new(bucket_size: usize) -> Self {
        assert!(bucket_size > 0, "bucket_size must be positive");
        Self {
            inner: Mutex::new(Inner::new(bucket_size)),
        }
    }

    /// Looks up `key`, returning a clone of its value if present.
    pub fn find(&self, key: &K) -> Option<V> {
        self.inner.lock().unwrap().find(key).cloned()
    }

    /// Inserts or overwrites the value associated with `key`.
    pub fn insert(&self, key: K, value: V) {
        self.inner.lock().unwrap().insert(key, value);
    }

    /// Removes `key`, returning whether it was present.
    pub fn remove(&self, key: &K) -> bool {
        self.inner.lock().unwrap().remove(key)
    }

    /// The number of bits currently used to index the directory.
    pub fn get_global_depth(&self) -> u32 {
        self.inner.lock().unwrap().global_depth()
    }

    /// The local depth of the bucket occupying directory slot `bucket_id`,
    /// or -1 if that slot does not exist.
    pub fn get_local_depth(&self, bucket_id: usize) -> i32 {
        self.inner.lock().unwrap().local_depth(bucket_id)
    }

    /// The number of distinct buckets currently allocated.
    pub fn get_num_buckets(&self) -> usize {
        self.inner.lock().unwrap().num_buckets()
    }
}
