//! Weighted multiset with O(1)-expected draws and updates.
//!
//! Entities are grouped into bins by `floor(log2(weight))`. A draw picks a
//! bin in proportion to its total weight, then an entity uniformly within
//! the bin and accepts it with probability `weight / 2^(bin + 1)`, which is
//! at least one half. The number of bins is bounded by the dynamic range of
//! the weights, not by the number of entities.

use crate::error::{LupinError, Result};
use fnv::FnvHashMap;
use rand::{Rng, RngCore};
use std::collections::BTreeMap;
use std::hash::Hash;

/// Weights at or below this threshold evict the entity.
pub const REMOVAL_THRESHOLD: f64 = 1e-10;

#[derive(Debug, Clone, Copy)]
struct Entry {
    weight: f64,
    bin: i32,
    position: usize,
}

#[derive(Debug, Clone)]
struct Bin<T> {
    items: Vec<T>,
    total: f64,
}

/// Items with positive weights, drawn proportionally to them.
#[derive(Debug, Clone)]
pub struct WeightedSet<T: Copy + Eq + Hash> {
    entries: FnvHashMap<T, Entry>,
    bins: BTreeMap<i32, Bin<T>>,
    total_weight: f64,
}

impl<T: Copy + Eq + Hash> Default for WeightedSet<T> {
    fn default() -> Self {
        WeightedSet {
            entries: FnvHashMap::default(),
            bins: BTreeMap::new(),
            total_weight: 0.0,
        }
    }
}

#[inline]
fn bin_of(weight: f64) -> i32 {
    weight.log2().floor() as i32
}

impl<T: Copy + Eq + Hash> WeightedSet<T> {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set holds no item.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all weights.
    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    /// Whether `item` has positive weight.
    pub fn contains(&self, item: &T) -> bool {
        self.entries.contains_key(item)
    }

    /// Weight of `item`, zero if absent.
    pub fn weight(&self, item: &T) -> f64 {
        self.entries.get(item).map(|e| e.weight).unwrap_or(0.0)
    }

    /// Every item with its weight, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (T, f64)> + '_ {
        self.entries.iter().map(|(&t, e)| (t, e.weight))
    }

    /// Drop every item.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.bins.clear();
        self.total_weight = 0.0;
    }

    fn detach(&mut self, item: &T) -> Option<f64> {
        let entry = self.entries.remove(item)?;
        if let Some(bin) = self.bins.get_mut(&entry.bin) {
            bin.items.swap_remove(entry.position);
            if let Some(moved) = bin.items.get(entry.position) {
                if let Some(e) = self.entries.get_mut(moved) {
                    e.position = entry.position;
                }
            }
            bin.total -= entry.weight;
            if bin.items.is_empty() {
                self.bins.remove(&entry.bin);
            }
        }
        self.total_weight -= entry.weight;
        if self.entries.is_empty() {
            // wipe accumulated rounding
            self.total_weight = 0.0;
        }
        Some(entry.weight)
    }

    fn attach(&mut self, item: T, weight: f64) {
        let b = bin_of(weight);
        let bin = self.bins.entry(b).or_insert_with(|| Bin {
            items: vec![],
            total: 0.0,
        });
        bin.items.push(item);
        bin.total += weight;
        self.entries.insert(
            item,
            Entry {
                weight,
                bin: b,
                position: bin.items.len() - 1,
            },
        );
        self.total_weight += weight;
    }

    /// Set the weight of `item`, inserting or evicting as needed.
    pub fn set_weight(&mut self, item: T, weight: f64) {
        self.detach(&item);
        if weight > REMOVAL_THRESHOLD {
            self.attach(item, weight);
        }
    }

    /// Increase the weight of `item` (inserting it if absent).
    pub fn add_weight(&mut self, item: T, delta: f64) {
        let w = self.weight(&item);
        self.set_weight(item, w + delta);
    }

    /// Decrease the weight of `item`; evicts it when nothing is left.
    ///
    /// Fails without mutating if the item is absent or has less weight.
    pub fn remove_weight(&mut self, item: T, delta: f64) -> Result<()> {
        let w = self.weight(&item);
        if !self.contains(&item) || w + REMOVAL_THRESHOLD < delta {
            return Err(LupinError::consistency(
                "WeightedSet",
                format!("cannot remove weight {} from an entity of weight {}", delta, w),
            ));
        }
        self.set_weight(item, w - delta);
        Ok(())
    }

    /// Remove `item` entirely. Returns its former weight.
    pub fn erase(&mut self, item: &T) -> Option<f64> {
        self.detach(item)
    }

    /// Draw an entity with probability proportional to its weight.
    pub fn sample(&self, rng: &mut dyn RngCore) -> Option<T> {
        if self.entries.is_empty() {
            return None;
        }

        let bins_total: f64 = self.bins.values().map(|b| b.total).sum();
        let target = rng.random::<f64>() * bins_total;

        let mut cum = 0.0;
        let mut chosen = None;
        for (&b, bin) in self.bins.iter() {
            cum += bin.total;
            chosen = Some((b, bin));
            if target < cum {
                break;
            }
        }
        let (b, bin) = chosen?;
        let upper = 2f64.powi(b + 1);

        loop {
            let item = bin.items[rng.random_range(0..bin.items.len())];
            let w = self.weight(&item);
            if rng.random::<f64>() * upper < w {
                return Some(item);
            }
        }
    }

    /// Sum of the individual weights, computed from scratch.
    pub fn recomputed_total(&self) -> f64 {
        self.entries.values().map(|e| e.weight).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn test_total_weight_tracks_updates() {
        let mut set = WeightedSet::new();
        set.set_weight('a', 1.0);
        set.set_weight('b', 3.0);
        set.add_weight('c', 0.25);
        set.add_weight('a', 4.0);
        set.remove_weight('b', 1.0).unwrap();
        assert_abs_diff_eq!(set.total_weight(), 7.25, epsilon = 1e-12);
        assert_abs_diff_eq!(set.total_weight(), set.recomputed_total(), epsilon = 1e-12);

        set.remove_weight('c', 0.25).unwrap();
        assert!(!set.contains(&'c'));
        assert_eq!(set.len(), 2);

        assert!(set.remove_weight('a', 100.0).is_err());
        assert!(set.remove_weight('z', 1.0).is_err());
        assert_abs_diff_eq!(set.weight(&'a'), 5.0);

        assert_eq!(set.erase(&'a'), Some(5.0));
        assert_eq!(set.erase(&'b'), Some(2.0));
        assert!(set.is_empty());
        assert_eq!(set.total_weight(), 0.0);
    }

    #[test]
    fn test_sampling_frequencies() {
        let mut set = WeightedSet::new();
        let weights = [(0usize, 1.0), (1, 2.0), (2, 5.0), (3, 0.5), (4, 11.5)];
        for &(i, w) in weights.iter() {
            set.set_weight(i, w);
        }
        let total = set.total_weight();
        let mut rng = SmallRng::seed_from_u64(11);
        let mut counts = [0usize; 5];
        let n = 200_000;
        for _ in 0..n {
            counts[set.sample(&mut rng).unwrap()] += 1;
        }
        for &(i, w) in weights.iter() {
            assert_abs_diff_eq!(counts[i] as f64 / n as f64, w / total, epsilon = 0.01);
        }
    }

    #[test]
    fn test_evicted_items_are_never_sampled() {
        let mut set = WeightedSet::new();
        for i in 0..10usize {
            set.set_weight(i, 1.0 + i as f64);
        }
        for i in 0..10usize {
            if i % 2 == 0 {
                set.remove_weight(i, 1.0 + i as f64).unwrap();
            }
        }
        let mut rng = SmallRng::seed_from_u64(5);
        for _ in 0..5_000 {
            let i = set.sample(&mut rng).unwrap();
            assert!(i % 2 == 1);
            assert!(set.weight(&i) > 0.0);
        }
        assert_abs_diff_eq!(set.total_weight(), set.recomputed_total(), epsilon = 1e-9);
        assert!(WeightedSet::<usize>::new().sample(&mut rng).is_none());
    }
}
