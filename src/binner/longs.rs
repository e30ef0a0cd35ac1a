//! Row-index binners: multimaps whose payloads are raw row indices.
//!
//! [`CompactLongBinner`] is tuned for the typical crossmatch shape, where
//! nearly every occupied cell holds a single row: indices are stored as
//! `u32`s through a tiered representation that allocates nothing beyond the
//! map entry for singleton bins. [`LongsBinner`] is the plain fallback for
//! tables too large for 32-bit indices. [`long_binner_for_row_count`] picks
//! between them.

use core::hash::Hash;
use hashbrown::HashMap;
use log::debug;

/// Inserts beyond this length leave the exact-size small-array tier and move
/// to a growable list.
const SMALL_TIER_CAP: usize = 32;

/// Multimap from an opaque key to row indices.
///
/// `longs` materializes at most as much memory as the number of stored
/// items; unknown keys read as `None`. Populated single-threaded, then
/// read-only during the lookup pass.
pub trait LongBinner<K> {
    /// Append one row index to the (possibly new) bin for `key`.
    /// Duplicates are preserved.
    fn add_item(&mut self, key: K, index: u64);

    /// All row indices stored under `key`, or `None` for an unknown key.
    fn longs(&self, key: &K) -> Option<Vec<u64>>;

    /// Lazy one-pass enumeration of all populated keys.
    fn keys(&self) -> Box<dyn Iterator<Item = &K> + '_>;

    /// Number of occupied bins. O(1).
    fn bin_count(&self) -> usize;

    /// Total number of stored indices. O(1).
    fn item_count(&self) -> u64;

    /// Release hook for externalized storage variants; a no-op for the
    /// in-memory binners.
    fn dispose(&mut self) {}
}

/// Pick a [`LongBinner`] implementation for a table of `nrow` rows:
/// the compact 32-bit-index binner when indices fit, the plain list binner
/// otherwise.
pub fn long_binner_for_row_count<K>(nrow: u64) -> Box<dyn LongBinner<K>>
where
    K: Eq + Hash + 'static,
{
    if nrow <= u64::from(u32::MAX) {
        debug!("binner: compact u32-index binner for {nrow} rows");
        Box::new(CompactLongBinner::new())
    } else {
        debug!("binner: plain u64 list binner for {nrow} rows");
        Box::new(LongsBinner::new())
    }
}

/// Tiered representation of the indices under one key.
///
/// State machine, by stored count: 1 (`One`) → 2..=32 (`Small`, an
/// exact-size boxed slice reallocated on each append) → unbounded (`Grown`,
/// a vector with a ~1.25x capacity-growth policy, since bins this large are
/// rare and already big).
#[derive(Debug, Clone)]
enum LongListable {
    One(u32),
    Small(Box<[u32]>),
    Grown(Vec<u32>),
}

impl LongListable {
    fn push(&mut self, index: u32) {
        match self {
            LongListable::One(first) => {
                *self = LongListable::Small(Box::new([*first, index]));
            }
            LongListable::Small(arr) if arr.len() < SMALL_TIER_CAP => {
                let mut grown = Vec::with_capacity(arr.len() + 1);
                grown.extend_from_slice(arr);
                grown.push(index);
                *self = LongListable::Small(grown.into_boxed_slice());
            }
            LongListable::Small(arr) => {
                let mut list = Vec::with_capacity(arr.len() + arr.len() / 4);
                list.extend_from_slice(arr);
                list.push(index);
                *self = LongListable::Grown(list);
            }
            LongListable::Grown(list) => {
                if list.len() == list.capacity() {
                    // Doubling is wasteful for the few huge bins; grow by a
                    // quarter instead.
                    let extra = (list.len() / 4).max(1);
                    list.reserve_exact(extra);
                }
                list.push(index);
            }
        }
    }

    fn as_slice(&self) -> &[u32] {
        match self {
            LongListable::One(index) => std::slice::from_ref(index),
            LongListable::Small(arr) => arr,
            LongListable::Grown(list) => list,
        }
    }
}

/// Compact row-index binner for tables with fewer than 2^32 rows.
#[derive(Debug, Default)]
pub struct CompactLongBinner<K> {
    map: HashMap<K, LongListable>,
    item_count: u64,
}

impl<K: Eq + Hash> CompactLongBinner<K> {
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
}

impl<K: Eq + Hash> LongBinner<K> for CompactLongBinner<K> {
    fn add_item(&mut self, key: K, index: u64) {
        // Internal invariant, guarded by the factory: callers must not feed
        // indices from a table larger than the compact range.
        assert!(
            index <= u64::from(u32::MAX),
            "row index {index} exceeds compact binner range"
        );
        let index = index as u32;
        match self.map.entry(key) {
            hashbrown::hash_map::Entry::Vacant(slot) => {
                slot.insert(LongListable::One(index));
            }
            hashbrown::hash_map::Entry::Occupied(mut slot) => slot.get_mut().push(index),
        }
        self.item_count += 1;
    }

    fn longs(&self, key: &K) -> Option<Vec<u64>> {
        self.map
            .get(key)
            .map(|listable| listable.as_slice().iter().map(|&i| u64::from(i)).collect())
    }

    fn keys(&self) -> Box<dyn Iterator<Item = &K> + '_> {
        Box::new(self.map.keys())
    }

    fn bin_count(&self) -> usize {
        self.map.len()
    }

    fn item_count(&self) -> u64 {
        self.item_count
    }
}

/// Untiered row-index binner for tables beyond the 32-bit range.
#[derive(Debug, Default)]
pub struct LongsBinner<K> {
    map: HashMap<K, Vec<u64>>,
    item_count: u64,
}

impl<K: Eq + Hash> LongsBinner<K> {
    /// New empty binner.
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
            item_count: 0,
        }
    }
}

impl<K: Eq + Hash> LongBinner<K> for LongsBinner<K> {
    fn add_item(&mut self, key: K, index: u64) {
        self.map.entry(key).or_default().push(index);
        self.item_count += 1;
    }

    fn longs(&self, key: &K) -> Option<Vec<u64>> {
        self.map.get(key).cloned()
    }

    fn keys(&self) -> Box<dyn Iterator<Item = &K> + '_> {
        Box::new(self.map.keys())
    }

    fn bin_count(&self) -> usize {
        self.map.len()
    }

    fn item_count(&self) -> u64 {
        self.item_count
    }
}
