//! Bounded random access over a `RowProvider`.
//!
//! Rows are fetched in fixed pages of `PAGE_SIZE` and at most
//! `MAX_PAGES_CACHED` pages stay resident. The least recently used page is
//! evicted when a new one is needed.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::error::{Error, Result};
use crate::provider::RowProvider;
use crate::row::Row;

pub const PAGE_SIZE: usize = 100;
pub const MAX_PAGES_CACHED: usize = 10;

#[derive(Debug)]
struct Page {
    rows: Vec<Row>,
    /// Last-touched clock value; also the key in `PagedCache::recency`.
    stamp: u64,
}

/// Hit and miss counters since the cache was built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

#[derive(Debug)]
pub struct PagedCache<P> {
    provider: P,
    pages: HashMap<usize, Page>,
    /// Clock value -> page index; the first entry is the least recently used.
    recency: BTreeMap<u64, usize>,
    clock: u64,
    stats: CacheStats,
}

impl<P: RowProvider> PagedCache<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            pages: HashMap::with_capacity(MAX_PAGES_CACHED),
            recency: BTreeMap::new(),
            clock: 0,
            stats: CacheStats::default(),
        }
    }

    pub fn len(&mut self) -> Result<usize> {
        self.provider.count()
    }

    pub fn is_empty(&mut self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn get(&mut self, index: usize) -> Result<&Row> {
        let count = self.provider.count()?;
        if index >= count {
            return Err(Error::RowOutOfRange { index, count });
        }

        let page_index = index / PAGE_SIZE;
        let offset = index % PAGE_SIZE;
        self.clock += 1;
        let stamp = self.clock;

        if let Some(page) = self.pages.get_mut(&page_index) {
            self.recency.remove(&page.stamp);
            page.stamp = stamp;
            self.recency.insert(stamp, page_index);
            self.stats.hits += 1;
        } else {
            // fetch before evicting so a failure leaves the cache as it was
            let rows = self.provider.fetch_range(page_index * PAGE_SIZE, PAGE_SIZE)?;
            self.stats.misses += 1;
            if self.pages.len() >= MAX_PAGES_CACHED {
                self.evict_oldest();
            }
            self.recency.insert(stamp, page_index);
            self.pages.insert(page_index, Page { rows, stamp });
        }

        self.pages
            .get(&page_index)
            .and_then(|page| page.rows.get(offset))
            .ok_or(Error::RowOutOfRange { index, count })
    }

    fn evict_oldest(&mut self) {
        if let Some((_, page_index)) = self.recency.pop_first() {
            self.pages.remove(&page_index);
            debug!(page = page_index, "evicted page");
        }
    }

    /// Position of `row` in the sequence this cache serves.
    pub fn index_of(&self, row: &Row) -> usize {
        row.ordinal()
    }

    /// Resident page indexes, most recently used first.
    pub fn resident_pages(&self) -> Vec<usize> {
        self.recency.values().rev().copied().collect()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn into_inner(self) -> P {
        self.provider
    }

    /// Every row in order. Runs of more than `MAX_PAGES_CACHED` pages churn
    /// the cache; bulk readers should use the provider directly.
    pub fn iter(&mut self) -> Iter<'_, P> {
        Iter {
            cache: self,
            next: 0,
        }
    }

    pub fn insert(&mut self, _index: usize, _row: Row) -> Result<()> {
        Err(Error::ReadOnly("insert"))
    }

    pub fn remove(&mut self, _index: usize) -> Result<Row> {
        Err(Error::ReadOnly("remove"))
    }

    pub fn set(&mut self, _index: usize, _row: Row) -> Result<()> {
        Err(Error::ReadOnly("set"))
    }

    pub fn clear(&mut self) -> Result<()> {
        Err(Error::ReadOnly("clear"))
    }
}

pub struct Iter<'a, P> {
    cache: &'a mut PagedCache<P>,
    next: usize,
}

impl<P: RowProvider> Iterator for Iter<'_, P> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let count = match self.cache.len() {
            Ok(count) => count,
            Err(e) => return Some(Err(e)),
        };
        if self.next >= count {
            return None;
        }
        let row = self.cache.get(self.next).cloned();
        self.next += 1;
        Some(row)
    }
}
