//! Sort permutations of a slice vector.
//!
//! For `n` slices there are `n!` orderings. Each is given a dense code in
//! generation (lexicographic) order. Tables are built the first time a slice
//! count is requested and kept for the life of the cache. The cache is shared
//! behind a read-mostly lock, so one instance can serve many decoders.

use hashbrown::HashMap;
use std::sync::{Arc, RwLock};

/// Code/vector maps for one slice count.
#[derive(Debug, Default)]
pub struct PermutationTable {
    slices: usize,
    code_to_key: Vec<u32>,
    key_to_code: HashMap<u32, usize>,
}

impl PermutationTable {
    fn generate(slices: usize) -> Self {
        let mut table = Self {
            slices,
            ..Default::default()
        };
        let mut perm = vec![0usize; slices];
        let mut used = vec![false; slices];
        table.visit(0, &mut perm, &mut used);
        table
    }

    fn visit(&mut self, pos: usize, perm: &mut [usize], used: &mut [bool]) {
        for i in 0..self.slices {
            if used[i] {
                continue;
            }
            perm[pos] = i;
            if pos + 1 < self.slices {
                used[i] = true;
                self.visit(pos + 1, perm, used);
                used[i] = false;
            } else {
                let key = self.key(perm);
                self.key_to_code.insert(key, self.code_to_key.len());
                self.code_to_key.push(key);
            }
        }
    }

    /// Base-`n` number formed by the permutation entries.
    fn key(&self, perm: &[usize]) -> u32 {
        perm.iter()
            .fold(0u32, |acc, &p| acc * self.slices as u32 + p as u32)
    }

    pub fn len(&self) -> usize {
        self.code_to_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code_to_key.is_empty()
    }

    /// Code of `perm`, or `None` if it is not a permutation of `0..n`.
    pub fn code(&self, perm: &[usize]) -> Option<usize> {
        if perm.len() != self.slices || perm.iter().any(|&p| p >= self.slices) {
            return None;
        }
        self.key_to_code.get(&self.key(perm)).copied()
    }

    pub fn vector(&self, code: usize) -> Option<Vec<usize>> {
        let mut key = *self.code_to_key.get(code)?;
        let n = self.slices as u32;
        let mut perm = vec![0usize; self.slices];
        for slot in perm.iter_mut().rev() {
            *slot = (key % n) as usize;
            key /= n;
        }
        Some(perm)
    }
}

#[derive(Debug, Default)]
pub struct PermutationCache {
    tables: RwLock<HashMap<usize, Arc<PermutationTable>>>,
}

/// Largest slice count whose table is built on request (9! entries).
pub const MAX_SLICES: usize = 9;

impl PermutationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table for `slices`, generating it on first use.
    pub fn table(&self, slices: usize) -> Option<Arc<PermutationTable>> {
        if slices == 0 || slices > MAX_SLICES {
            return None;
        }
        if let Ok(tables) = self.tables.read() {
            if let Some(table) = tables.get(&slices) {
                return Some(Arc::clone(table));
            }
        }
        let mut tables = self.tables.write().ok()?;
        let table = tables
            .entry(slices)
            .or_insert_with(|| {
                log::debug!("generating sort permutations for {} slices", slices);
                Arc::new(PermutationTable::generate(slices))
            });
        Some(Arc::clone(table))
    }

    pub fn cached_slice_counts(&self) -> Vec<usize> {
        let mut counts: Vec<usize> = self
            .tables
            .read()
            .map(|t| t.keys().copied().collect())
            .unwrap_or_default();
        counts.sort_unstable();
        counts
    }

    /// Code of `perm`; zero for anything that is not a permutation.
    pub fn code(&self, perm: &[usize]) -> usize {
        self.table(perm.len())
            .and_then(|t| t.code(perm))
            .unwrap_or(0)
    }

    pub fn vector(&self, code: usize, slices: usize) -> Option<Vec<usize>> {
        self.table(slices)?.vector(code)
    }

    /// Code of the stable ascending sort order of `samples`.
    pub fn sort_code(&self, samples: &[u32]) -> usize {
        self.code(&sort_order(samples))
    }
}

/// `n!`
pub fn total(slices: usize) -> usize {
    (2..=slices).product()
}

/// Indices of `samples` in stable ascending order.
pub fn sort_order(samples: &[u32]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..samples.len()).collect();
    order.sort_by_key(|&i| samples[i]);
    order
}

/// `samples` reordered by `order`.
pub fn apply(samples: &[u32], order: &[usize]) -> Vec<u32> {
    order.iter().map(|&i| samples[i]).collect()
}

/// Inverse of [`apply`].
pub fn unapply(sorted: &[u32], order: &[usize]) -> Vec<u32> {
    let mut samples = vec![0; sorted.len()];
    for (&value, &i) in sorted.iter().zip(order) {
        samples[i] = value;
    }
    samples
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total() {
        assert_eq!(total(0), 1);
        assert_eq!(total(1), 1);
        assert_eq!(total(5), 120);
    }

    #[test]
    fn test_codes_are_lexicographic() {
        let cache = PermutationCache::new();
        assert_eq!(cache.vector(0, 3), Some(vec![0, 1, 2]));
        assert_eq!(cache.vector(1, 3), Some(vec![0, 2, 1]));
        assert_eq!(cache.vector(5, 3), Some(vec![2, 1, 0]));
        assert_eq!(cache.vector(6, 3), None);
    }

    #[test]
    fn test_code_vector_bijection() {
        let cache = PermutationCache::new();
        for slices in 1..=6 {
            let table = cache.table(slices).unwrap();
            assert_eq!(table.len(), total(slices));
            for code in 0..table.len() {
                let perm = table.vector(code).unwrap();
                assert_eq!(table.code(&perm), Some(code));
            }
        }
    }

    #[test]
    fn test_tables_are_built_once() {
        let cache = PermutationCache::new();
        let first = cache.table(5).unwrap();
        let second = cache.table(5).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        cache.table(3);
        assert_eq!(cache.cached_slice_counts(), vec![3, 5]);
    }

    #[test]
    fn test_invalid_permutations() {
        let cache = PermutationCache::new();
        assert_eq!(cache.code(&[0, 0, 1]), 0);
        assert_eq!(cache.code(&[]), 0);
        assert!(cache.table(MAX_SLICES + 1).is_none());
    }

    #[test]
    fn test_sort_round_trip() {
        let cache = PermutationCache::new();
        let samples = [34u32, 20, 58, 20, 41];
        let order = sort_order(&samples);
        assert_eq!(order, vec![1, 3, 0, 4, 2]);
        let sorted = apply(&samples, &order);
        assert_eq!(sorted, vec![20, 20, 34, 41, 58]);

        let code = cache.sort_code(&samples);
        let decoded = cache.vector(code, samples.len()).unwrap();
        assert_eq!(unapply(&sorted, &decoded), samples.to_vec());
    }

    #[test]
    fn test_shared_across_threads() {
        let cache = Arc::new(PermutationCache::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.code(&[4, 3, 2, 1, 0]))
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 119);
        }
    }
}
