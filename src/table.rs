use std::cmp::min;

use crate::utils::DetHash;

/// One cell of a bucket chain.
///
/// `next` points at the next cell of the same bucket, 0 meaning end of
/// chain (cell 0 is a permanently occupied sentry).
#[derive(Debug, Clone)]
struct Entry<K, V> {
    key: K,
    value: V,
    next: usize,
}

/// A bucket-chained hash table with an append-only backtracking discipline.
///
/// New entries are *prepended* to their bucket's chain, so undoing an
/// insertion is a single head-pointer restore. [`Table::truncate`] walks the
/// tail of the entry arena in reverse, unlinking each entry from its bucket,
/// which makes scope pop O(number of entries restored) rather than a deep
/// copy of the table.
///
/// Entries are 1-indexed; index 0 is reserved as the chain terminator.
pub struct Table<K, V> {
    entries: Vec<Option<Entry<K, V>>>,
    buckets: Vec<usize>,
    bitmask: u64,
}

impl<K, V> Table<K, V>
where
    K: DetHash + Eq,
{
    /// Create a new table with `2^bits` buckets.
    pub fn new(bits: usize) -> Self {
        assert!(bits <= 31, "Table bits should be in the range 0..=31");

        let buckets_bits = min(bits, 16);
        let buckets_size = 1 << buckets_bits;
        let buckets = vec![0; buckets_size];
        let bitmask = (buckets_size - 1) as u64;

        Self {
            entries: vec![None], // Sentry at index 0.
            buckets,
            bitmask,
        }
    }

    /// The number of entry cells, including the sentry.
    ///
    /// This is the mark captured by a context frame; see [`Table::truncate`].
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() == 1
    }

    fn bucket_index(&self, key: &K) -> usize {
        (key.det_hash() & self.bitmask) as usize
    }

    fn entry(&self, index: usize) -> &Entry<K, V> {
        assert_ne!(index, 0, "Index is 0");
        self.entries[index].as_ref().expect("entry is vacant")
    }

    /// Look up a key, returning the entry index and value if present.
    pub fn get(&self, key: &K) -> Option<(usize, &V)> {
        let mut index = self.buckets[self.bucket_index(key)];
        while index != 0 {
            let entry = self.entry(index);
            if entry.key == *key {
                return Some((index, &entry.value));
            }
            index = entry.next;
        }
        None
    }

    /// Get the mutable value for a key.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let mut index = self.buckets[self.bucket_index(key)];
        while index != 0 {
            let entry = self.entry(index);
            if entry.key == *key {
                return self.entries[index].as_mut().map(|e| &mut e.value);
            }
            index = entry.next;
        }
        None
    }

    /// Prepend a new entry to its bucket chain and return its index.
    ///
    /// The key is assumed absent; duplicates shadow older entries until
    /// the newer one is truncated away.
    pub fn insert(&mut self, key: K, value: V) -> usize {
        let bucket_index = self.bucket_index(&key);
        let index = self.entries.len();
        self.entries.push(Some(Entry {
            key,
            value,
            next: self.buckets[bucket_index],
        }));
        self.buckets[bucket_index] = index;
        index
    }

    /// Look up a key, inserting `value()` if absent. Returns the entry
    /// index and whether the entry was freshly created.
    pub fn intern(&mut self, key: K, value: impl FnOnce() -> V) -> (usize, bool) {
        if let Some((index, _)) = self.get(&key) {
            return (index, false);
        }
        (self.insert(key, value()), true)
    }

    /// The key stored at an entry index.
    pub fn key_at(&self, index: usize) -> &K {
        &self.entry(index).key
    }

    /// The value stored at an entry index.
    pub fn value_at(&self, index: usize) -> &V {
        &self.entry(index).value
    }

    /// Unlink and discard every entry with index >= `len`.
    ///
    /// Entries must be unlinked newest-first so that each bucket head is
    /// restored to the chain it had when the mark was taken.
    pub fn truncate(&mut self, len: usize) {
        assert!(len >= 1, "Cannot truncate the sentry");
        while self.entries.len() > len {
            let entry = self.entries.pop().unwrap().expect("entry is vacant");
            let bucket_index = self.bucket_index(&entry.key);
            assert_eq!(
                self.buckets[bucket_index],
                self.entries.len(),
                "Truncated entry is not its bucket head"
            );
            self.buckets[bucket_index] = entry.next;
        }
    }
}
