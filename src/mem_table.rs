//! In-memory mutable table: an ordered map from internal key to value
//! backed by [`crate::skiplist::SkipList`], guarded by a reader-writer lock
//! so iterators can advance concurrently with inserts.

use crate::error::Lookup;
use crate::key::{self, Kind};
use crate::skiplist::SkipList;
use bytes::Bytes;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

pub struct MemTable {
    id: usize,
    list: RwLock<SkipList>,
    approximate_size: AtomicUsize,
}

impl MemTable {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            list: RwLock::new(SkipList::new()),
            approximate_size: AtomicUsize::new(0),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn approximate_size(&self) -> usize {
        self.approximate_size.load(AtomicOrdering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.list.read().is_empty()
    }

    pub fn set(&self, user_key: &[u8], kind: Kind, seq: u64, value: &[u8]) {
        let ikey = key::build_internal_key(user_key, kind, seq);
        let added = self.list.write().set(ikey, Bytes::copy_from_slice(value));
        if added > 0 {
            self.approximate_size
                .fetch_add(added, AtomicOrdering::Relaxed);
        }
    }

    /// Looks up the newest record for `user_key`.
    pub fn get(&self, user_key: &[u8]) -> Lookup {
        let lk = key::lookup_key(user_key);
        let list = self.list.read();
        match list.get(&lk) {
            Some((ikey, value)) if key::user_key(ikey) == user_key => match key::kind(ikey) {
                Kind::Set => Lookup::Found(Bytes::copy_from_slice(value)),
                Kind::Delete => Lookup::Deleted,
            },
            _ => Lookup::NotFound,
        }
    }

    /// A snapshot-style iterator over `(internal_key, value)` pairs in
    /// ascending internal-key order.
    pub fn iter(&self) -> MemTableIter<'_> {
        MemTableIter {
            guard: self.list.read(),
            entries: None,
            idx: 0,
        }
    }
}

/// Materializes the memtable's contents once under the read lock, then
/// iterates without holding it — by the time this iterator is needed the
/// memtable is a frozen `imm` snapshot or a minor-compaction source, so a
/// point-in-time copy keeps the iterator's lifetime simple.
pub struct MemTableIter<'a> {
    guard: parking_lot::RwLockReadGuard<'a, SkipList>,
    entries: Option<Vec<(Bytes, Bytes)>>,
    idx: usize,
}

impl<'a> MemTableIter<'a> {
    fn materialize(&mut self) {
        if self.entries.is_some() {
            return;
        }
        let mut it = self.guard.iter();
        it.seek_to_first();
        let mut out = Vec::new();
        while it.valid() {
            out.push((
                Bytes::copy_from_slice(it.key()),
                Bytes::copy_from_slice(it.value()),
            ));
            it.next();
        }
        self.entries = Some(out);
    }

    pub fn valid(&mut self) -> bool {
        self.materialize();
        self.idx < self.entries.as_ref().unwrap().len()
    }

    pub fn key(&mut self) -> Bytes {
        self.materialize();
        self.entries.as_ref().unwrap()[self.idx].0.clone()
    }

    pub fn value(&mut self) -> Bytes {
        self.materialize();
        self.entries.as_ref().unwrap()[self.idx].1.clone()
    }

    pub fn advance(&mut self) {
        self.materialize();
        self.idx += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_put_get_delete() {
        let mem = MemTable::new(0);
        mem.set(b"123", Kind::Set, 1, b"456");
        assert_eq!(mem.get(b"123"), Lookup::Found(Bytes::from_static(b"456")));
        mem.set(b"123", Kind::Delete, 2, b"");
        assert_eq!(mem.get(b"123"), Lookup::Deleted);
        mem.set(b"123", Kind::Set, 3, b"789");
        assert_eq!(mem.get(b"123"), Lookup::Found(Bytes::from_static(b"789")));
    }

    #[test]
    fn approximate_size_tracks_successful_inserts() {
        let mem = MemTable::new(0);
        mem.set(b"ab", Kind::Set, 1, b"cd");
        assert_eq!(mem.approximate_size(), 4);
    }

    #[test]
    fn empty_key_and_value_round_trip() {
        let mem = MemTable::new(0);
        mem.set(b"", Kind::Set, 1, b"");
        assert_eq!(mem.get(b""), Lookup::Found(Bytes::new()));
    }
}
