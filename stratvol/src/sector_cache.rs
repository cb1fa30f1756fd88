// SPDX-License-Identifier: MIT

use std::collections::{HashMap, VecDeque};

use crate::errors::*;

/// Number of sectors each partition keeps cached.
pub(crate) const SECTOR_CACHE_SIZE: usize = 16;
/// Cached sectors are always 512 bytes, independent of the volume
/// sector size.
pub(crate) const CACHE_ELEMENT_SIZE: usize = 512;

pub(crate) struct SectorData {
    pub data: Vec<u8>,
}

/// Fixed-capacity sector cache with first-in first-out eviction.
pub(crate) struct SectorCache {
    capacity: usize,
    map: HashMap<u64, SectorData>,
    order: VecDeque<u64>,
}

impl SectorCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            map: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    /// Returns the cached sector at `index`, calling `fetch` on a miss.
    /// A failed fetch leaves the cache unchanged.
    pub fn get_or_insert_with<F>(&mut self, index: u64, fetch: F) -> VolResult<&SectorData>
    where
        F: FnOnce() -> VolResult<SectorData>,
    {
        if !self.map.contains_key(&index) {
            let sector = fetch()?;
            if self.order.len() >= self.capacity
                && let Some(evicted) = self.order.pop_front()
            {
                self.map.remove(&evicted);
            }
            self.order.push_back(index);
            self.map.insert(index, sector);
        }
        self.map
            .get(&index)
            .ok_or(VolError::Invalid("cache: missing sector after insert"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sector(fill: u8) -> SectorData {
        SectorData {
            data: vec![fill; CACHE_ELEMENT_SIZE],
        }
    }

    #[test]
    fn hit_does_not_refetch() {
        let mut cache = SectorCache::new(4);
        cache.get_or_insert_with(7, || Ok(sector(0xAA))).unwrap();

        let hit = cache
            .get_or_insert_with(7, || panic!("unexpected fetch"))
            .unwrap();
        assert_eq!(hit.data[0], 0xAA);
    }

    #[test]
    fn evicts_oldest_first() {
        let mut cache = SectorCache::new(2);
        cache.get_or_insert_with(0, || Ok(sector(0))).unwrap();
        cache.get_or_insert_with(1, || Ok(sector(1))).unwrap();
        cache.get_or_insert_with(2, || Ok(sector(2))).unwrap();

        let mut fetched = false;
        cache
            .get_or_insert_with(0, || {
                fetched = true;
                Ok(sector(0))
            })
            .unwrap();
        assert!(fetched, "oldest entry should have been evicted");

        let hit = cache
            .get_or_insert_with(2, || panic!("unexpected fetch"))
            .unwrap();
        assert_eq!(hit.data[0], 2);
    }

    #[test]
    fn failed_fetch_leaves_cache_unchanged() {
        let mut cache = SectorCache::new(2);
        let err = cache.get_or_insert_with(3, || Err(VolError::NotFound));
        assert!(err.is_err());
        assert!(cache.map.is_empty());
        assert!(cache.order.is_empty());
    }
}
