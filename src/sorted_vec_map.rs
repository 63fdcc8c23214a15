use smallvec::SmallVec;
use std::cmp::Ordering;

/// A map that maintains entries in ascending key order, backed by a small
/// inline-capacity vector. Used for the per-symbol chronological histories
/// `pipeline::adjust` and `pipeline::cumulative` build before walking them
/// date-ascending (forward) or date-descending (by collecting and reversing).
///
/// `SortedVecMap` intentionally exposes only `insert` and `iter`: those are
/// the only operations a chronological-history walk needs. A symbol rarely
/// trades on more than a handful of the partitions in any one enrichment
/// window, so the small inline capacity avoids a heap allocation for the
/// common case.
///
/// # Type Parameters
///
/// - `N`: Inline capacity (default: 8). Number of entries stored on the stack
///   before heap allocation.
///
/// # Examples
///
/// ```rust
/// # use krx_store::sorted_vec_map::SortedVecMap;
/// let mut history = SortedVecMap::new();
/// history.insert(3, "c");
/// history.insert(1, "a");
/// history.insert(2, "b");
///
/// let ordered: Vec<_> = history.iter().map(|(_, v)| *v).collect();
/// assert_eq!(ordered, vec!["a", "b", "c"]);
/// ```
#[derive(Clone, Debug, Default)]
pub struct SortedVecMap<K, V, const N: usize = 8> {
    inner: SmallVec<[(K, V); N]>,
}

impl<K: Ord, V> SortedVecMap<K, V> {
    /// Creates an empty `SortedVecMap`.
    #[inline]
    pub const fn new() -> Self {
        Self {
            inner: SmallVec::new_const(),
        }
    }

    /// Inserts a key-value pair into the map, maintaining sorted order.
    ///
    /// If the map did not have this key present, `None` is returned. If the
    /// map did have this key present, the value is updated and the old value
    /// is returned.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use krx_store::sorted_vec_map::SortedVecMap;
    /// let mut map = SortedVecMap::new();
    /// assert_eq!(map.insert(37, "a"), None);
    /// assert_eq!(map.insert(37, "b"), Some("a"));
    /// ```
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        for (i, (k, v)) in self.inner.iter_mut().enumerate() {
            match key.cmp(k) {
                Ordering::Less => {
                    self.inner.insert(i, (key, value));
                    return None;
                }
                Ordering::Equal => {
                    return Some(std::mem::replace(v, value));
                }
                Ordering::Greater => continue,
            }
        }
        // Key is greater than all existing keys.
        self.inner.push((key, value));
        None
    }

    /// Returns an iterator over the key-value pairs in key-ascending order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use krx_store::sorted_vec_map::SortedVecMap;
    /// let mut map = SortedVecMap::new();
    /// map.insert(2, "b");
    /// map.insert(1, "a");
    ///
    /// let keys: Vec<_> = map.iter().map(|(k, _)| *k).collect();
    /// assert_eq!(keys, vec![1, 2]);
    /// ```
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.inner.iter().map(|(k, v)| (k, v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_maintains_ascending_order_regardless_of_insertion_order() {
        let mut map = SortedVecMap::new();
        map.insert(5, "e");
        map.insert(1, "a");
        map.insert(3, "c");

        let keys: Vec<_> = map.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![1, 3, 5]);
    }

    #[test]
    fn inserting_an_existing_key_replaces_the_value_and_returns_the_old_one() {
        let mut map = SortedVecMap::new();
        assert_eq!(map.insert(1, "a"), None);
        assert_eq!(map.insert(1, "b"), Some("a"));

        let values: Vec<_> = map.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec!["b"]);
    }

    #[test]
    fn default_via_entry_or_default_starts_empty() {
        use std::collections::HashMap;
        let mut histories: HashMap<&str, SortedVecMap<i32, i32>> = HashMap::new();
        histories.entry("S1").or_default().insert(1, 100);
        assert_eq!(histories["S1"].iter().count(), 1);
    }
}
