/// Ephemeral identifier pool
///
/// Non-persistent objects draw their ids from a fixed window. Npcs and lairs
/// always take two adjacent ids (object + inventory); weapons take one.
/// Every allocation and release runs under the same lock, so a pair is
/// either fully reserved or not visible at all.

use std::collections::HashSet;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::ids;

struct PoolInner {
    in_use: HashSet<u64>,
    rng: StdRng,
}

pub struct IdPool {
    base: u64,
    range: u64,
    inner: Mutex<PoolInner>,
}

impl IdPool {
    pub fn new(base: u64, range: u64) -> Self {
        Self::with_rng(base, range, StdRng::from_os_rng())
    }

    /// Deterministic pool for tests and replays
    pub fn with_seed(base: u64, range: u64, seed: u64) -> Self {
        Self::with_rng(base, range, StdRng::seed_from_u64(seed))
    }

    fn with_rng(base: u64, range: u64, rng: StdRng) -> Self {
        Self {
            base,
            range: range.max(2),
            inner: Mutex::new(PoolInner {
                in_use: HashSet::new(),
                rng,
            }),
        }
    }

    /// Reserve one free id (weapons, regions' helper objects)
    pub fn allocate(&self) -> Option<u64> {
        let mut inner = self.inner.lock();
        for _ in 0..ids::SINGLE_ID_ATTEMPTS {
            let candidate = self.base + inner.rng.random_range(0..self.range);
            if inner.in_use.insert(candidate) {
                return Some(candidate);
            }
        }
        tracing::error!(in_use = inner.in_use.len(), "IdPool: no free id found");
        None
    }

    /// Reserve `id` and `id + 1` together; returns `id`
    pub fn allocate_pair(&self) -> Option<u64> {
        let mut inner = self.inner.lock();
        for _ in 0..ids::PAIR_ATTEMPTS {
            let candidate = self.base + inner.rng.random_range(0..self.range - 1);
            if inner.in_use.contains(&candidate) || inner.in_use.contains(&(candidate + 1)) {
                continue;
            }
            inner.in_use.insert(candidate);
            inner.in_use.insert(candidate + 1);
            return Some(candidate);
        }
        tracing::error!(in_use = inner.in_use.len(), "IdPool: no free id pair found");
        None
    }

    /// Return an id to the pool; false if it was not in use
    pub fn release(&self, id: u64) -> bool {
        let released = self.inner.lock().in_use.remove(&id);
        if !released {
            tracing::warn!(id, "IdPool: release of an id that is not in use");
        }
        released
    }

    /// Release `id` and `id + 1` under one lock
    pub fn release_pair(&self, id: u64) -> usize {
        let mut inner = self.inner.lock();
        let released = inner.in_use.remove(&id) as usize + inner.in_use.remove(&(id + 1)) as usize;
        if released != 2 {
            tracing::warn!(id, released, "IdPool: pair was only partly in use");
        }
        released
    }

    pub fn is_in_use(&self, id: u64) -> bool {
        self.inner.lock().in_use.contains(&id)
    }

    pub fn in_use(&self) -> usize {
        self.inner.lock().in_use.len()
    }
}

impl Default for IdPool {
    fn default() -> Self {
        Self::new(ids::NP_ID_BASE, ids::NP_ID_RANGE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_pairs_never_overlap() {
        let pool = IdPool::with_seed(1000, 64, 7);
        let mut taken = HashSet::new();
        while let Some(id) = pool.allocate_pair() {
            assert!(taken.insert(id), "id {id} handed out twice");
            assert!(taken.insert(id + 1), "id {} handed out twice", id + 1);
            assert!((1000..1064).contains(&id));
            assert!((1000..1064).contains(&(id + 1)));
        }
        assert_eq!(pool.in_use(), taken.len());
    }

    #[test]
    fn test_pair_halves_release_independently() {
        let pool = IdPool::with_seed(0, 100, 1);
        let id = pool.allocate_pair().unwrap();
        assert!(pool.release(id));
        assert!(pool.is_in_use(id + 1));
        assert!(pool.release(id + 1));
        assert!(!pool.release(id + 1));
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn test_full_window_reports_exhaustion() {
        let pool = IdPool::with_seed(10, 2, 3);
        assert_eq!(pool.allocate_pair(), Some(10));
        assert_eq!(pool.allocate_pair(), None);
        assert_eq!(pool.allocate(), None);
        assert_eq!(pool.release_pair(10), 2);
        assert_eq!(pool.allocate_pair(), Some(10));
    }

    #[test]
    fn test_concurrent_pairs_are_disjoint() {
        let pool = Arc::new(IdPool::with_seed(0, 10_000, 11));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || (0..200).filter_map(|_| pool.allocate_pair()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id));
                assert!(seen.insert(id + 1));
            }
        }
        assert_eq!(pool.in_use(), seen.len());
    }
}
