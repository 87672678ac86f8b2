//! Bounded cache of open sorted tables, keyed by file number. Reads and
//! compactions alike go through this cache rather than opening a table's
//! file directly, so a hot table's footer and index block are parsed once.

use crate::error::{Lookup, SsTableError, TableCacheError};
use crate::manifest;
use crate::table::SsTable;
use log::trace;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

pub struct TableCache {
    db_path: PathBuf,
    cache: Mutex<LruCache<u64, Arc<SsTable>>>,
}

impl TableCache {
    pub fn new(db_path: impl Into<PathBuf>, capacity: usize) -> Result<Self, TableCacheError> {
        let capacity = NonZeroUsize::new(capacity).ok_or(TableCacheError::InvalidCapacity)?;
        Ok(Self {
            db_path: db_path.into(),
            cache: Mutex::new(LruCache::new(capacity)),
        })
    }

    /// Returns the table for `file_number`, opening and caching it on a
    /// miss.
    pub fn get(&self, file_number: u64) -> Result<Arc<SsTable>, SsTableError> {
        if let Some(table) = self.cache.lock().get(&file_number) {
            return Ok(table.clone());
        }
        let path = manifest::sstable_path(&self.db_path, file_number);
        let table = Arc::new(SsTable::open(file_number, &path)?);
        self.cache.lock().put(file_number, table.clone());
        Ok(table)
    }

    pub fn get_lookup(&self, file_number: u64, lookup_key: &[u8]) -> Result<Lookup, SsTableError> {
        self.get(file_number)?.get(lookup_key)
    }

    /// Drops a table from the cache, e.g. after its file is deleted by
    /// compaction.
    pub fn evict(&self, file_number: u64) {
        if self.cache.lock().pop(&file_number).is_some() {
            trace!("evicted table {file_number} from cache");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{build_internal_key, Kind};
    use crate::table::builder::TableBuilder;

    fn write_table(dir: &std::path::Path, number: u64) {
        let path = manifest::sstable_path(dir, number);
        let mut builder = TableBuilder::create(&path).unwrap();
        let ik = build_internal_key(b"a", Kind::Set, 1);
        builder.add(&ik, b"value").unwrap();
        builder.finish().unwrap();
    }

    #[test]
    fn caches_across_repeated_lookups() {
        let dir = tempfile::tempdir().unwrap();
        write_table(dir.path(), 1);
        let cache = TableCache::new(dir.path(), 8).unwrap();
        let first = cache.get(1).unwrap();
        let second = cache.get(1).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(TableCache::new("/tmp", 0).is_err());
    }
}
