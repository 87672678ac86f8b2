//! Merges multiple ascending `(internal_key, value)` sources into one
//! bidirectional stream, and layers duplicate-suppression and
//! tombstone-dropping on top so the embedding API sees only live user keys.
//! Backs `Db::iter()`, where the number of sources (one per memtable plus
//! one per live sorted table) is small enough that a direction-aware
//! linear scan, not a heap, is the right shape — the same shape LevelDB's
//! `MergingIterator` uses (see the pack's `FMhyxeee-my-leveldb` port for
//! the per-level version of this idea).

use crate::error::Error;
use crate::key::{self, Kind};
use crate::table::iterator::SsTableIterator;
use bytes::Bytes;
use std::cmp::Ordering;

/// A single bidirectional source of `(internal_key, value)` pairs.
pub trait StorageIterator {
    fn is_valid(&self) -> bool;
    fn key(&self) -> &[u8];
    fn value(&self) -> &[u8];
    fn next(&mut self) -> Result<(), Error>;
    fn prev(&mut self) -> Result<(), Error>;
    fn seek_to_first(&mut self) -> Result<(), Error>;
    fn seek_to_last(&mut self) -> Result<(), Error>;
    /// Positions at the first entry whose user key is `>= target`'s user
    /// key (matching [`crate::block::iterator::BlockIterator::seek`]'s
    /// user-key granularity; `target` is expected to be a full internal
    /// key, typically built with [`crate::key::lookup_key`]).
    fn seek(&mut self, target: &[u8]) -> Result<(), Error>;
}

/// Adapts an already-materialized, ascending `Vec` into a
/// [`StorageIterator`], used for memtable snapshots. Indexing mirrors
/// [`crate::block::iterator::BlockIterator`]: `-1` is before the first
/// entry, `len()` is past the last.
pub struct VecIterator {
    entries: Vec<(Bytes, Bytes)>,
    idx: isize,
}

impl VecIterator {
    pub fn new(entries: Vec<(Bytes, Bytes)>) -> Self {
        Self { entries, idx: -1 }
    }

    fn len(&self) -> isize {
        self.entries.len() as isize
    }
}

impl StorageIterator for VecIterator {
    fn is_valid(&self) -> bool {
        self.idx >= 0 && self.idx < self.len()
    }

    fn key(&self) -> &[u8] {
        &self.entries[self.idx as usize].0
    }

    fn value(&self) -> &[u8] {
        &self.entries[self.idx as usize].1
    }

    fn next(&mut self) -> Result<(), Error> {
        if self.idx < self.len() {
            self.idx += 1;
        }
        Ok(())
    }

    fn prev(&mut self) -> Result<(), Error> {
        if self.idx >= 0 {
            self.idx -= 1;
        }
        Ok(())
    }

    fn seek_to_first(&mut self) -> Result<(), Error> {
        self.idx = if self.entries.is_empty() { -1 } else { 0 };
        Ok(())
    }

    fn seek_to_last(&mut self) -> Result<(), Error> {
        self.idx = self.len() - 1;
        Ok(())
    }

    fn seek(&mut self, target: &[u8]) -> Result<(), Error> {
        let target_user_key = key::user_key(target);
        let mut left = 0usize;
        let mut right = self.entries.len();
        while left < right {
            let mid = (left + right) / 2;
            let mid_user_key = key::user_key(&self.entries[mid].0);
            if key::compare_user_key(mid_user_key, target_user_key) == Ordering::Less {
                left = mid + 1;
            } else {
                right = mid;
            }
        }
        self.idx = left as isize;
        Ok(())
    }
}

impl StorageIterator for SsTableIterator {
    fn is_valid(&self) -> bool {
        self.is_valid()
    }

    fn key(&self) -> &[u8] {
        self.key()
    }

    fn value(&self) -> &[u8] {
        self.value()
    }

    fn next(&mut self) -> Result<(), Error> {
        Ok(self.next()?)
    }

    fn prev(&mut self) -> Result<(), Error> {
        Ok(self.prev()?)
    }

    fn seek_to_first(&mut self) -> Result<(), Error> {
        Ok(self.seek_to_first()?)
    }

    fn seek_to_last(&mut self) -> Result<(), Error> {
        Ok(self.seek_to_last()?)
    }

    fn seek(&mut self, target: &[u8]) -> Result<(), Error> {
        Ok(self.seek(target)?)
    }
}

#[derive(PartialEq, Eq, Clone, Copy)]
enum Direction {
    Forward,
    Reverse,
}

/// Ascending/descending union of every source's internal keys, duplicates
/// and all (a key present in two sources shows up twice, once per source).
/// `next`/`prev` keep a `direction`: advancing all-but-the-current child
/// past (or onto, then past) the last-returned key only happens when the
/// scan direction actually flips, so straight-line forward or backward
/// iteration costs one child step per entry, not `N`.
pub struct MergingIterator {
    sources: Vec<Box<dyn StorageIterator>>,
    current: Option<usize>,
    direction: Direction,
}

impl MergingIterator {
    /// Wraps `sources` and positions at the smallest key across all of
    /// them, seeking each source to its first entry first (a source's
    /// pre-construction position, if any, is not preserved).
    pub fn new(mut sources: Vec<Box<dyn StorageIterator>>) -> Result<Self, Error> {
        for s in &mut sources {
            s.seek_to_first()?;
        }
        let mut it = Self {
            sources,
            current: None,
            direction: Direction::Forward,
        };
        it.find_smallest();
        Ok(it)
    }

    pub fn is_valid(&self) -> bool {
        self.current.is_some()
    }

    pub fn key(&self) -> &[u8] {
        self.sources[self.current.expect("valid() must be checked first")].key()
    }

    pub fn value(&self) -> &[u8] {
        self.sources[self.current.expect("valid() must be checked first")].value()
    }

    pub fn seek_to_first(&mut self) -> Result<(), Error> {
        for s in &mut self.sources {
            s.seek_to_first()?;
        }
        self.direction = Direction::Forward;
        self.find_smallest();
        Ok(())
    }

    pub fn seek_to_last(&mut self) -> Result<(), Error> {
        for s in &mut self.sources {
            s.seek_to_last()?;
        }
        self.direction = Direction::Reverse;
        self.find_largest();
        Ok(())
    }

    pub fn seek(&mut self, target: &[u8]) -> Result<(), Error> {
        for s in &mut self.sources {
            s.seek(target)?;
        }
        self.direction = Direction::Forward;
        self.find_smallest();
        Ok(())
    }

    pub fn next(&mut self) -> Result<(), Error> {
        let current = self.current.expect("valid() must be checked first");

        // Every other child trails `current` when scanning forward. Moving
        // backward leaves them positioned arbitrarily relative to it, so a
        // direction flip must first walk each one back onto (and then past)
        // the key we are leaving, or it would be revisited going forward.
        if self.direction != Direction::Forward {
            let current_key = Bytes::copy_from_slice(self.sources[current].key());
            for i in 0..self.sources.len() {
                if i == current {
                    continue;
                }
                self.sources[i].seek(&current_key)?;
                if self.sources[i].is_valid()
                    && key::compare_internal_key(self.sources[i].key(), &current_key) == Ordering::Equal
                {
                    self.sources[i].next()?;
                }
            }
            self.direction = Direction::Forward;
        }

        self.sources[current].next()?;
        self.find_smallest();
        Ok(())
    }

    pub fn prev(&mut self) -> Result<(), Error> {
        let current = self.current.expect("valid() must be checked first");

        if self.direction != Direction::Reverse {
            let current_key = Bytes::copy_from_slice(self.sources[current].key());
            for i in 0..self.sources.len() {
                if i == current {
                    continue;
                }
                self.sources[i].seek(&current_key)?;
                if self.sources[i].is_valid() {
                    self.sources[i].prev()?;
                } else {
                    self.sources[i].seek_to_last()?;
                }
            }
            self.direction = Direction::Reverse;
        }

        self.sources[current].prev()?;
        self.find_largest();
        Ok(())
    }

    fn find_smallest(&mut self) {
        self.current = self.extremum(|a, b| key::compare_internal_key(a, b) == Ordering::Less);
    }

    fn find_largest(&mut self) {
        self.current = self.extremum(|a, b| key::compare_internal_key(a, b) == Ordering::Greater);
    }

    fn extremum(&self, better: impl Fn(&[u8], &[u8]) -> bool) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, s) in self.sources.iter().enumerate() {
            if !s.is_valid() {
                continue;
            }
            best = match best {
                None => Some(i),
                Some(b) if better(s.key(), self.sources[b].key()) => Some(i),
                Some(b) => Some(b),
            };
        }
        best
    }
}

/// Wraps a [`MergingIterator`] with the dedup/tombstone rules the
/// embedding API's `iterate()` capability needs: only the newest surviving
/// version of each user key, never a `Kind::Delete` tombstone. This is the
/// `valid, seek, seek_to_first, seek_to_last, next, prev, user_key, value`
/// surface.
pub struct DbIterator {
    inner: MergingIterator,
    valid: bool,
}

impl DbIterator {
    pub fn new(sources: Vec<Box<dyn StorageIterator>>) -> Result<Self, Error> {
        let mut it = Self {
            inner: MergingIterator::new(sources)?,
            valid: false,
        };
        it.find_next_user_entry()?;
        Ok(it)
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn user_key(&self) -> &[u8] {
        key::user_key(self.inner.key())
    }

    pub fn value(&self) -> &[u8] {
        self.inner.value()
    }

    pub fn seek_to_first(&mut self) -> Result<(), Error> {
        self.inner.seek_to_first()?;
        self.find_next_user_entry()
    }

    pub fn seek_to_last(&mut self) -> Result<(), Error> {
        self.inner.seek_to_last()?;
        self.find_prev_user_entry()
    }

    pub fn seek(&mut self, user_key: &[u8]) -> Result<(), Error> {
        self.inner.seek(&key::lookup_key(user_key))?;
        self.find_next_user_entry()
    }

    /// Entries with the same user key are adjacent and newest-first
    /// (descending sequence), so advancing one step at a time and
    /// discarding everything that still shares the key we just returned is
    /// enough to skip every older duplicate of it.
    pub fn next(&mut self) -> Result<(), Error> {
        debug_assert!(self.valid);
        let emitted = Bytes::copy_from_slice(key::user_key(self.inner.key()));
        self.inner.next()?;
        self.skip_same_user_key_forward(&emitted)?;
        self.find_next_user_entry()
    }

    pub fn prev(&mut self) -> Result<(), Error> {
        debug_assert!(self.valid);
        let emitted = Bytes::copy_from_slice(key::user_key(self.inner.key()));
        self.skip_same_user_key_backward_past(&emitted)?;
        self.find_prev_user_entry()
    }

    /// Advances `inner` (assumed positioned at the start of a user-key run)
    /// until it lands on a live, newest entry, or becomes invalid.
    fn find_next_user_entry(&mut self) -> Result<(), Error> {
        while self.inner.is_valid() {
            if key::kind(self.inner.key()) == Kind::Delete {
                let deleted_user_key = Bytes::copy_from_slice(key::user_key(self.inner.key()));
                self.inner.next()?;
                self.skip_same_user_key_forward(&deleted_user_key)?;
                continue;
            }
            self.valid = true;
            return Ok(());
        }
        self.valid = false;
        Ok(())
    }

    /// Retreats `inner` until it lands on a live, newest entry, or becomes
    /// invalid. `inner` may start anywhere within a user-key run.
    fn find_prev_user_entry(&mut self) -> Result<(), Error> {
        while self.inner.is_valid() {
            let user_key = Bytes::copy_from_slice(key::user_key(self.inner.key()));
            self.rewind_to_run_start(&user_key)?;
            if !self.inner.is_valid() {
                break;
            }
            if key::kind(self.inner.key()) != Kind::Delete {
                self.valid = true;
                return Ok(());
            }
            self.skip_same_user_key_backward_past(&user_key)?;
        }
        self.valid = false;
        Ok(())
    }

    fn skip_same_user_key_forward(&mut self, user_key: &[u8]) -> Result<(), Error> {
        while self.inner.is_valid() && key::user_key(self.inner.key()) == user_key {
            self.inner.next()?;
        }
        Ok(())
    }

    /// Retreats past every remaining entry sharing `user_key`, leaving
    /// `inner` on the first entry of an older user key (or invalid).
    fn skip_same_user_key_backward_past(&mut self, user_key: &[u8]) -> Result<(), Error> {
        loop {
            self.inner.prev()?;
            if !self.inner.is_valid() || key::user_key(self.inner.key()) != user_key {
                return Ok(());
            }
        }
    }

    /// Given `inner` positioned anywhere within the contiguous run of
    /// entries sharing `user_key` (descending sequence, so the run's first
    /// entry is the newest), repositions it at that run's first entry.
    fn rewind_to_run_start(&mut self, user_key: &[u8]) -> Result<(), Error> {
        self.skip_same_user_key_backward_past(user_key)?;
        if self.inner.is_valid() {
            self.inner.next()
        } else {
            self.inner.seek_to_first()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::build_internal_key;

    fn vec_of(entries: &[(&str, u64, Kind, &str)]) -> Box<dyn StorageIterator> {
        let data = entries
            .iter()
            .map(|(k, seq, kind, v)| {
                (
                    build_internal_key(k.as_bytes(), *kind, *seq),
                    Bytes::copy_from_slice(v.as_bytes()),
                )
            })
            .collect();
        Box::new(VecIterator::new(data))
    }

    fn collect_forward(it: &mut DbIterator) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut seen = Vec::new();
        while it.is_valid() {
            seen.push((it.user_key().to_vec(), it.value().to_vec()));
            it.next().unwrap();
        }
        seen
    }

    fn collect_backward(it: &mut DbIterator) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut seen = Vec::new();
        while it.is_valid() {
            seen.push((it.user_key().to_vec(), it.value().to_vec()));
            it.prev().unwrap();
        }
        seen
    }

    #[test]
    fn merges_and_dedupes_across_sources() {
        let a = vec_of(&[("a", 1, Kind::Set, "a1"), ("c", 1, Kind::Set, "c1")]);
        let b = vec_of(&[("a", 2, Kind::Set, "a2"), ("b", 1, Kind::Set, "b1")]);

        let mut it = DbIterator::new(vec![a, b]).unwrap();
        assert_eq!(
            collect_forward(&mut it),
            vec![
                (b"a".to_vec(), b"a2".to_vec()),
                (b"b".to_vec(), b"b1".to_vec()),
                (b"c".to_vec(), b"c1".to_vec()),
            ]
        );
    }

    #[test]
    fn drops_tombstones() {
        let a = vec_of(&[("a", 2, Kind::Delete, ""), ("a", 1, Kind::Set, "old")]);
        let mut it = DbIterator::new(vec![a]).unwrap();
        assert!(!it.is_valid());
    }

    #[test]
    fn backward_iteration_mirrors_forward_iteration() {
        let a = vec_of(&[("a", 1, Kind::Set, "a1"), ("c", 1, Kind::Set, "c1")]);
        let b = vec_of(&[("a", 2, Kind::Set, "a2"), ("b", 1, Kind::Set, "b1")]);

        let mut it = DbIterator::new(vec![a, b]).unwrap();
        it.seek_to_last().unwrap();
        let mut seen = collect_backward(&mut it);
        seen.reverse();
        assert_eq!(
            seen,
            vec![
                (b"a".to_vec(), b"a2".to_vec()),
                (b"b".to_vec(), b"b1".to_vec()),
                (b"c".to_vec(), b"c1".to_vec()),
            ]
        );
    }

    #[test]
    fn backward_iteration_also_skips_tombstones() {
        let a = vec_of(&[
            ("a", 1, Kind::Set, "a1"),
            ("b", 2, Kind::Delete, ""),
            ("b", 1, Kind::Set, "old"),
            ("c", 1, Kind::Set, "c1"),
        ]);
        let mut it = DbIterator::new(vec![a]).unwrap();
        it.seek_to_last().unwrap();
        let mut seen = collect_backward(&mut it);
        seen.reverse();
        assert_eq!(seen, vec![(b"a".to_vec(), b"a1".to_vec()), (b"c".to_vec(), b"c1".to_vec())]);
    }

    #[test]
    fn seek_positions_at_the_first_live_key_not_less_than_target() {
        let a = vec_of(&[("a", 1, Kind::Set, "a1"), ("c", 1, Kind::Set, "c1")]);
        let mut it = DbIterator::new(vec![a]).unwrap();
        it.seek(b"b").unwrap();
        assert!(it.is_valid());
        assert_eq!(it.user_key(), b"c");
    }

    #[test]
    fn reversing_direction_mid_scan_does_not_revisit_or_skip_keys() {
        let a = vec_of(&[("a", 1, Kind::Set, "a1"), ("b", 1, Kind::Set, "b1"), ("c", 1, Kind::Set, "c1")]);
        let mut it = DbIterator::new(vec![a]).unwrap();
        assert_eq!(it.user_key(), b"a");
        it.next().unwrap();
        assert_eq!(it.user_key(), b"b");
        it.prev().unwrap();
        assert_eq!(it.user_key(), b"a");
        it.next().unwrap();
        assert_eq!(it.user_key(), b"b");
        it.next().unwrap();
        assert_eq!(it.user_key(), b"c");
    }
}
