//! Iterates entries within a single [`super::Block`]. `seek`
//! binary-searches the user-key projection of each entry's internal key
//! and returns the leftmost entry whose user key is `>=` the target.

use super::Block;
use crate::key;
use std::sync::Arc;

pub struct BlockIterator {
    block: Arc<Block>,
    idx: isize,
}

impl BlockIterator {
    pub fn new(block: Arc<Block>) -> Self {
        Self { block, idx: -1 }
    }

    pub fn create_and_seek_to_first(block: Arc<Block>) -> Self {
        let mut it = Self::new(block);
        it.seek_to_first();
        it
    }

    pub fn create_and_seek_to_key(block: Arc<Block>, key: &[u8]) -> Self {
        let mut it = Self::new(block);
        it.seek(key);
        it
    }

    pub fn is_valid(&self) -> bool {
        self.idx >= 0 && (self.idx as usize) < self.block.num_entries()
    }

    pub fn key(&self) -> &[u8] {
        self.block.entry_at(self.idx as usize).0
    }

    pub fn value(&self) -> &[u8] {
        self.block.entry_at(self.idx as usize).1
    }

    pub fn seek_to_first(&mut self) {
        self.idx = if self.block.num_entries() > 0 { 0 } else { -1 };
    }

    pub fn seek_to_last(&mut self) {
        let n = self.block.num_entries();
        self.idx = if n > 0 { n as isize - 1 } else { -1 };
    }

    pub fn next(&mut self) {
        self.idx += 1;
    }

    pub fn prev(&mut self) {
        self.idx -= 1;
    }

    /// Leftmost entry whose user key is `>= target`; an invalid (past-end)
    /// index if every entry's user key is smaller.
    pub fn seek(&mut self, target: &[u8]) {
        let n = self.block.num_entries();
        let mut left = 0usize;
        let mut right = n;
        while left < right {
            let mid = (left + right) / 2;
            let mid_user_key = key::user_key(self.block.entry_at(mid).0);
            if key::compare_user_key(mid_user_key, target) == std::cmp::Ordering::Less {
                left = mid + 1;
            } else {
                right = mid;
            }
        }
        self.idx = left as isize;
    }
}

#[cfg(test)]
mod tests {
    use super::super::builder::BlockBuilder;
    use super::*;
    use crate::key::{build_internal_key, Kind};

    fn sample_block() -> Arc<Block> {
        let mut b = BlockBuilder::new();
        for i in 0..10u32 {
            let uk = format!("{:03}", i);
            let ik = build_internal_key(uk.as_bytes(), Kind::Set, i as u64);
            b.add(&ik, uk.as_bytes());
        }
        Arc::new(b.finish())
    }

    #[test]
    fn seek_finds_exact_and_gap_keys() {
        let block = sample_block();
        let mut it = BlockIterator::create_and_seek_to_key(block.clone(), b"005");
        assert!(it.is_valid());
        assert_eq!(key::user_key(it.key()), b"005");

        let mut it2 = BlockIterator::new(block);
        it2.seek(b"0051");
        assert!(it2.is_valid());
        assert_eq!(key::user_key(it2.key()), b"006");
    }

    #[test]
    fn seek_past_end_is_invalid() {
        let block = sample_block();
        let mut it = BlockIterator::new(block);
        it.seek(b"999");
        assert!(!it.is_valid());
    }
}
