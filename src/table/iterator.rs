//! Iterates every entry of an [`super::SsTable`] in ascending internal-key
//! order by walking the index block and, for the block it currently points
//! at, a [`crate::block::iterator::BlockIterator`]. Owns its table via
//! `Arc` rather than borrowing so it can be boxed into a heap of mixed
//! iterator sources with no lifetime tied to the table's owner.
//!
//! `block_idx` uses the same `isize` sentinel convention as
//! [`crate::block::iterator::BlockIterator`]: `-1` means "before the first
//! block" (reached by retreating past the first entry), `num_blocks()`
//! means "past the last block" (reached by advancing past the last entry).
//! `next`/`prev` re-enter from the opposite end only when crossing from the
//! sentinel that the *other* direction produced, so an iterator that has
//! run off one end and is then driven the other way resumes correctly
//! instead of silently wrapping around on every call.

use crate::block::iterator::BlockIterator;
use crate::error::SsTableError;
use crate::key;
use crate::table::SsTable;
use std::cmp::Ordering;
use std::sync::Arc;

pub struct SsTableIterator {
    table: Arc<SsTable>,
    block_idx: isize,
    block_iter: Option<BlockIterator>,
}

impl SsTableIterator {
    fn new(table: Arc<SsTable>) -> Self {
        Self {
            table,
            block_idx: -1,
            block_iter: None,
        }
    }

    pub fn create_and_seek_to_first(table: Arc<SsTable>) -> Result<Self, SsTableError> {
        let mut it = Self::new(table);
        it.seek_to_first()?;
        Ok(it)
    }

    pub fn create_and_seek_to_key(table: Arc<SsTable>, key: &[u8]) -> Result<Self, SsTableError> {
        let mut it = Self::new(table);
        it.seek(key)?;
        Ok(it)
    }

    fn num_blocks(&self) -> isize {
        self.table.index_entries().len() as isize
    }

    fn load_block_from_start(&mut self, idx: isize) -> Result<(), SsTableError> {
        let block = self.table.read_block_at(idx as usize)?;
        self.block_iter = Some(BlockIterator::create_and_seek_to_first(block));
        Ok(())
    }

    fn load_block_from_end(&mut self, idx: isize) -> Result<(), SsTableError> {
        let block = self.table.read_block_at(idx as usize)?;
        let mut bi = BlockIterator::new(block);
        bi.seek_to_last();
        self.block_iter = Some(bi);
        Ok(())
    }

    /// Having just positioned `block_idx`/`block_iter` at (or past) an
    /// entry, skips forward over empty blocks until a valid entry is found
    /// or the table is exhausted, in which case `block_idx` is left at
    /// `num_blocks()`.
    fn advance_through_empty_blocks(&mut self) -> Result<(), SsTableError> {
        while !self.is_valid() && self.block_idx < self.num_blocks() - 1 {
            self.block_idx += 1;
            self.load_block_from_start(self.block_idx)?;
        }
        if !self.is_valid() {
            self.block_idx = self.num_blocks();
            self.block_iter = None;
        }
        Ok(())
    }

    /// Mirror of [`Self::advance_through_empty_blocks`] walking backward;
    /// leaves `block_idx` at `-1` once exhausted.
    fn retreat_through_empty_blocks(&mut self) -> Result<(), SsTableError> {
        while !self.is_valid() && self.block_idx > 0 {
            self.block_idx -= 1;
            self.load_block_from_end(self.block_idx)?;
        }
        if !self.is_valid() {
            self.block_idx = -1;
            self.block_iter = None;
        }
        Ok(())
    }

    pub fn seek_to_first(&mut self) -> Result<(), SsTableError> {
        if self.num_blocks() == 0 {
            self.block_idx = -1;
            self.block_iter = None;
            return Ok(());
        }
        self.block_idx = 0;
        self.load_block_from_start(0)?;
        self.advance_through_empty_blocks()
    }

    pub fn seek_to_last(&mut self) -> Result<(), SsTableError> {
        let n = self.num_blocks();
        if n == 0 {
            self.block_idx = -1;
            self.block_iter = None;
            return Ok(());
        }
        self.block_idx = n - 1;
        self.load_block_from_end(self.block_idx)?;
        self.retreat_through_empty_blocks()
    }

    /// Leftmost entry whose user key is `>= key`'s user key.
    pub fn seek(&mut self, key: &[u8]) -> Result<(), SsTableError> {
        let n = self.num_blocks();
        let idx = self
            .table
            .index_entries()
            .iter()
            .position(|(last_key, _)| key::compare_internal_key(last_key, key) != Ordering::Less)
            .map(|i| i as isize)
            .unwrap_or(n);
        if idx >= n {
            self.block_idx = n;
            self.block_iter = None;
            return Ok(());
        }
        self.block_idx = idx;
        let block = self.table.read_block_at(idx as usize)?;
        self.block_iter = Some(BlockIterator::create_and_seek_to_key(block, key::user_key(key)));
        self.advance_through_empty_blocks()
    }

    pub fn is_valid(&self) -> bool {
        self.block_iter.as_ref().is_some_and(BlockIterator::is_valid)
    }

    pub fn key(&self) -> &[u8] {
        self.block_iter
            .as_ref()
            .expect("valid() must be checked first")
            .key()
    }

    pub fn value(&self) -> &[u8] {
        self.block_iter
            .as_ref()
            .expect("valid() must be checked first")
            .value()
    }

    pub fn next(&mut self) -> Result<(), SsTableError> {
        if self.block_iter.is_none() {
            return if self.block_idx < 0 { self.seek_to_first() } else { Ok(()) };
        }
        self.block_iter.as_mut().expect("checked above").next();
        self.advance_through_empty_blocks()
    }

    pub fn prev(&mut self) -> Result<(), SsTableError> {
        if self.block_iter.is_none() {
            return if self.block_idx >= self.num_blocks() {
                self.seek_to_last()
            } else {
                Ok(())
            };
        }
        self.block_iter.as_mut().expect("checked above").prev();
        self.retreat_through_empty_blocks()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{build_internal_key, Kind};
    use crate::table::builder::TableBuilder;

    fn sample_table(dir: &std::path::Path, num_entries: u32) -> Arc<SsTable> {
        let path = dir.join("000001.ldb");
        let mut builder = TableBuilder::create(&path).unwrap();
        for i in 0..num_entries {
            let uk = format!("{i:05}");
            let ik = build_internal_key(uk.as_bytes(), Kind::Set, i as u64 + 1);
            builder.add(&ik, uk.as_bytes()).unwrap();
        }
        builder.finish().unwrap();
        Arc::new(SsTable::open(1, &path).unwrap())
    }

    #[test]
    fn forward_iteration_visits_every_entry_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let table = sample_table(dir.path(), 500);
        let mut it = SsTableIterator::create_and_seek_to_first(table).unwrap();
        let mut seen = Vec::new();
        while it.is_valid() {
            seen.push(key::user_key(it.key()).to_vec());
            it.next().unwrap();
        }
        assert_eq!(seen.len(), 500);
        assert_eq!(seen.first().unwrap(), b"00000");
        assert_eq!(seen.last().unwrap(), b"00499");
    }

    #[test]
    fn backward_iteration_visits_every_entry_in_reverse_order() {
        let dir = tempfile::tempdir().unwrap();
        let table = sample_table(dir.path(), 500);
        let mut it = SsTableIterator::create_and_seek_to_first(table).unwrap();
        it.seek_to_last().unwrap();
        let mut seen = Vec::new();
        while it.is_valid() {
            seen.push(key::user_key(it.key()).to_vec());
            it.prev().unwrap();
        }
        assert_eq!(seen.len(), 500);
        assert_eq!(seen.first().unwrap(), b"00499");
        assert_eq!(seen.last().unwrap(), b"00000");
    }

    #[test]
    fn reversing_direction_mid_scan_lands_on_the_right_neighbor() {
        let dir = tempfile::tempdir().unwrap();
        let table = sample_table(dir.path(), 50);
        let mut it = SsTableIterator::create_and_seek_to_first(table).unwrap();
        for _ in 0..10 {
            it.next().unwrap();
        }
        assert_eq!(key::user_key(it.key()), b"00010");
        it.prev().unwrap();
        assert_eq!(key::user_key(it.key()), b"00009");
        it.next().unwrap();
        assert_eq!(key::user_key(it.key()), b"00010");
    }

    #[test]
    fn prev_past_the_front_then_next_resumes_at_the_first_entry() {
        let dir = tempfile::tempdir().unwrap();
        let table = sample_table(dir.path(), 10);
        let mut it = SsTableIterator::create_and_seek_to_first(table).unwrap();
        it.prev().unwrap();
        assert!(!it.is_valid());
        it.next().unwrap();
        assert!(it.is_valid());
        assert_eq!(key::user_key(it.key()), b"00000");
    }

    #[test]
    fn next_past_the_back_then_prev_resumes_at_the_last_entry() {
        let dir = tempfile::tempdir().unwrap();
        let table = sample_table(dir.path(), 10);
        let mut it = SsTableIterator::create_and_seek_to_first(table).unwrap();
        it.seek_to_last().unwrap();
        it.next().unwrap();
        assert!(!it.is_valid());
        it.prev().unwrap();
        assert!(it.is_valid());
        assert_eq!(key::user_key(it.key()), b"00009");
    }

    #[test]
    fn seek_lands_on_the_first_key_not_less_than_target() {
        let dir = tempfile::tempdir().unwrap();
        let table = sample_table(dir.path(), 200);
        let mut it = SsTableIterator::create_and_seek_to_first(table).unwrap();
        let target = build_internal_key(b"00100", Kind::Set, u64::MAX);
        it.seek(&target).unwrap();
        assert!(it.is_valid());
        assert_eq!(key::user_key(it.key()), b"00100");
    }
}
