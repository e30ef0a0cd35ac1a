//! Compact multimaps from bin-label keys to row payloads.
//!
//! Cross-matching large catalogs produces one bin per occupied cell, and the
//! overwhelming majority of bins hold exactly one row. A naive
//! `HashMap<K, Vec<T>>` pays a heap-allocated vector for every one of those
//! singleton bins; the binners here avoid that with tiered value
//! representations:
//!
//! - [`ObjectBinner`] stores arbitrary row payloads and keeps singleton bins
//!   as the bare item (no wrapper allocation).
//! - [`longs::CompactLongBinner`] stores raw row indices as `u32`s through a
//!   four-tier state machine, for tables whose row count fits in 32 bits.
//! - [`longs::LongsBinner`] is the untiered fallback for larger tables.
//!
//! All binners are plain synchronous containers: populated by a sequential
//! indexing pass, then read concurrently during the lookup pass. Bin and
//! item counts are tracked incrementally for diagnostics.

mod longs;

pub use longs::{long_binner_for_row_count, CompactLongBinner, LongBinner, LongsBinner};

use core::hash::Hash;
use hashbrown::HashMap;

/// Zero-or-more items stored under one key, with the singleton case held
/// inline. Absent map entry = empty bin; a bin with zero items is never
/// materialized.
#[derive(Debug, Clone)]
enum Listable<T> {
    /// Exactly one item, stored without a wrapper.
    One(T),
    /// Two or more items.
    Many(Vec<T>),
}

/// General-purpose compact multimap from an opaque key to row payloads.
///
/// This is the modifiable binner variant: keys can be removed (including
/// during a sweep, via [`ObjectBinner::retain`]) while counts stay
/// consistent. Insertion order within a bin is not significant and
/// duplicates are preserved.
#[derive(Debug, Default)]
pub struct ObjectBinner<K, T> {
    map: HashMap<K, Listable<T>>,
    item_count: u64,
}

impl<K: Eq + Hash, T> ObjectBinner<K, T> {
    /// New empty binner.
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
            item_count: 0,
        }
    }

    /// New empty binner pre-sized for roughly `bins` occupied cells.
    pub fn with_capacity(bins: usize) -> Self {
        Self {
            map: HashMap::with_capacity(bins),
            item_count: 0,
        }
    }

    /// Append `item` to the (possibly new) bin for `key`.
    pub fn add_item(&mut self, key: K, item: T) {
        match self.map.entry(key) {
            hashbrown::hash_map::Entry::Vacant(slot) => {
                slot.insert(Listable::One(item));
            }
            hashbrown::hash_map::Entry::Occupied(mut slot) => match slot.get_mut() {
                Listable::Many(list) => list.push(item),
                one => {
                    // Promote the singleton in place without cloning T.
                    let prev = std::mem::replace(one, Listable::Many(Vec::new()));
                    let Listable::One(first) = prev else {
                        unreachable!("occupied listable must be One here");
                    };
                    let Listable::Many(list) = one else {
                        unreachable!("listable was just replaced with Many");
                    };
                    list.reserve(2);
                    list.push(first);
                    list.push(item);
                }
            },
        }
        self.item_count += 1;
    }

    /// All items stored under `key`, as a borrowed slice. Singleton bins are
    /// viewed without allocation; unknown keys read as empty.
    pub fn items(&self, key: &K) -> &[T] {
        match self.map.get(key) {
            None => &[],
            Some(Listable::One(item)) => std::slice::from_ref(item),
            Some(Listable::Many(list)) => list,
        }
    }

    /// Lazy one-pass enumeration of all populated keys.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.map.keys()
    }

    /// Remove a bin outright, returning how many items it held.
    pub fn remove(&mut self, key: &K) -> usize {
        let removed = match self.map.remove(key) {
            None => 0,
            Some(Listable::One(_)) => 1,
            Some(Listable::Many(list)) => list.len(),
        };
        self.item_count -= removed as u64;
        removed
    }

    /// Keep only the bins for which `keep` returns true; the removal-during-
    /// iteration contract of the modifiable binner.
    pub fn retain(&mut self, mut keep: impl FnMut(&K, &[T]) -> bool) {
        let mut dropped: u64 = 0;
        self.map.retain(|key, listable| {
            let items: &[T] = match listable {
                Listable::One(item) => std::slice::from_ref(item),
                Listable::Many(list) => list,
            };
            if keep(key, items) {
                true
            } else {
                dropped += items.len() as u64;
                false
            }
        });
        self.item_count -= dropped;
    }

    /// Number of occupied bins. O(1).
    pub fn bin_count(&self) -> usize {
        self.map.len()
    }

    /// Total number of items across all bins. O(1).
    pub fn item_count(&self) -> u64 {
        self.item_count
    }

    /// Release hook for externalized storage variants; a no-op here.
    pub fn dispose(&mut self) {}
}
