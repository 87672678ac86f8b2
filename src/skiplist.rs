//! Arena-backed probabilistic skiplist. Nodes live in a `Vec` and are
//! addressed by index so that "forward" and "backward" links are plain
//! indices rather than owned references, sidestepping the cyclic
//! pointer graph a node-owns-node skiplist would otherwise need.
//!
//! Keys are full internal keys; ordering is [`crate::key::compare_internal_key`].

use crate::config::SKIP_LIST_MAX_LEVEL;
use crate::key::compare_internal_key;
use bytes::Bytes;
use rand::Rng;
use std::cmp::Ordering;

const HEAD: usize = 0;

struct Node {
    key: Bytes,
    value: Bytes,
    forward: [Option<usize>; SKIP_LIST_MAX_LEVEL],
    backward: Option<usize>,
}

impl Node {
    fn sentinel() -> Self {
        Node {
            key: Bytes::new(),
            value: Bytes::new(),
            forward: [None; SKIP_LIST_MAX_LEVEL],
            backward: None,
        }
    }
}

/// A single-threaded, arena-based skiplist keyed by internal key.
pub struct SkipList {
    nodes: Vec<Node>,
    height: usize,
    len: usize,
}

impl SkipList {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::sentinel()],
            height: 1,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn random_level(&self) -> usize {
        let mut level = 1;
        let mut rng = rand::thread_rng();
        while level < SKIP_LIST_MAX_LEVEL && rng.gen_bool(0.5) {
            level += 1;
        }
        level
    }

    /// Returns the index of the first node whose key is `>= key`, along
    /// with the predecessor at each level (used for insertion).
    fn find_greater_or_equal(
        &self,
        key: &[u8],
    ) -> (Option<usize>, [usize; SKIP_LIST_MAX_LEVEL]) {
        let mut prevs = [HEAD; SKIP_LIST_MAX_LEVEL];
        let mut cur = HEAD;
        for level in (0..self.height).rev() {
            loop {
                match self.nodes[cur].forward[level] {
                    Some(next) if compare_internal_key(&self.nodes[next].key, key) == Ordering::Less => {
                        cur = next;
                    }
                    _ => break,
                }
            }
            prevs[level] = cur;
        }
        (self.nodes[cur].forward[0], prevs)
    }

    /// Inserts `(key, value)`, overwriting in place if an identical internal
    /// key already exists. Returns the number of bytes this insert added
    /// toward the memtable's approximate usage: `key.len() + value.len()`
    /// for a fresh insert, `0` for an overwrite of an identical key.
    pub fn set(&mut self, key: Bytes, value: Bytes) -> usize {
        let (found, prevs) = self.find_greater_or_equal(&key);
        if let Some(idx) = found {
            if compare_internal_key(&self.nodes[idx].key, &key) == Ordering::Equal {
                self.nodes[idx].value = value;
                return 0;
            }
        }

        let level = self.random_level();
        if level > self.height {
            self.height = level;
        }
        let added = key.len() + value.len();
        let new_idx = self.nodes.len();
        let mut forward = [None; SKIP_LIST_MAX_LEVEL];
        for l in 0..level {
            forward[l] = self.nodes[prevs[l]].forward[l];
        }
        self.nodes.push(Node {
            key,
            value,
            forward,
            backward: Some(prevs[0]),
        });
        for l in 0..level {
            self.nodes[prevs[l]].forward[l] = Some(new_idx);
        }
        if let Some(next0) = self.nodes[new_idx].forward[0] {
            self.nodes[next0].backward = Some(new_idx);
        }
        self.len += 1;
        added
    }

    fn first(&self) -> Option<usize> {
        self.nodes[HEAD].forward[0]
    }

    fn last(&self) -> usize {
        let mut cur = HEAD;
        for level in (0..self.height).rev() {
            while let Some(next) = self.nodes[cur].forward[level] {
                cur = next;
            }
        }
        cur
    }

    pub fn iter(&self) -> SkipListIter<'_> {
        SkipListIter {
            list: self,
            cur: None,
            started: false,
        }
    }

    /// Looks up the newest entry visible at or before `lookup_key`.
    pub fn get(&self, lookup_key: &[u8]) -> Option<(&[u8], &[u8])> {
        let (found, _) = self.find_greater_or_equal(lookup_key);
        found.map(|idx| (self.nodes[idx].key.as_ref(), self.nodes[idx].value.as_ref()))
    }

    pub fn seek(&self, key: &[u8]) -> Option<usize> {
        self.find_greater_or_equal(key).0
    }
}

impl Default for SkipList {
    fn default() -> Self {
        Self::new()
    }
}

/// Bidirectional iterator over `(internal_key, value)` pairs.
pub struct SkipListIter<'a> {
    list: &'a SkipList,
    cur: Option<usize>,
    started: bool,
}

impl<'a> SkipListIter<'a> {
    pub fn valid(&self) -> bool {
        self.cur.is_some()
    }

    pub fn key(&self) -> &'a [u8] {
        &self.list.nodes[self.cur.expect("valid() must be checked first")].key
    }

    pub fn value(&self) -> &'a [u8] {
        &self.list.nodes[self.cur.expect("valid() must be checked first")].value
    }

    pub fn seek_to_first(&mut self) {
        self.cur = self.list.first();
        self.started = true;
    }

    pub fn seek_to_last(&mut self) {
        let last = self.list.last();
        self.cur = if last == HEAD { None } else { Some(last) };
        self.started = true;
    }

    pub fn seek(&mut self, key: &[u8]) {
        self.cur = self.list.seek(key);
        self.started = true;
    }

    pub fn next(&mut self) {
        if let Some(idx) = self.cur {
            self.cur = self.list.nodes[idx].forward[0];
        } else if !self.started {
            self.seek_to_first();
        }
        self.started = true;
    }

    pub fn prev(&mut self) {
        if let Some(idx) = self.cur {
            let back = self.list.nodes[idx].backward;
            self.cur = back.filter(|&b| b != HEAD);
        }
        self.started = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{build_internal_key, Kind};

    #[test]
    fn insert_and_ascending_iteration() {
        let mut list = SkipList::new();
        for i in (0..10u8).rev() {
            let k = build_internal_key(&[b'0' + i], Kind::Set, i as u64);
            list.set(k, Bytes::from(vec![i]));
        }
        let mut it = list.iter();
        it.seek_to_first();
        let mut seen = Vec::new();
        while it.valid() {
            seen.push(it.key()[0]);
            it.next();
        }
        assert_eq!(seen, (b'0'..=b'9').collect::<Vec<_>>());
    }

    #[test]
    fn overwrite_identical_internal_key_does_not_grow_len() {
        let mut list = SkipList::new();
        let k = build_internal_key(b"a", Kind::Set, 1);
        list.set(k.clone(), Bytes::from_static(b"x"));
        list.set(k, Bytes::from_static(b"y"));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn seek_lands_on_newest_record_for_user_key() {
        let mut list = SkipList::new();
        for seq in 0..5u64 {
            let k = build_internal_key(b"6", Kind::Set, seq);
            list.set(k, Bytes::from(seq.to_string()));
        }
        let lk = crate::key::lookup_key(b"6");
        let (key, value) = list.get(&lk).unwrap();
        assert_eq!(crate::key::user_key(key), b"6");
        assert_eq!(value, b"4");
    }

    #[test]
    fn reverse_iteration() {
        let mut list = SkipList::new();
        for i in 0..5u8 {
            let k = build_internal_key(&[i], Kind::Set, i as u64);
            list.set(k, Bytes::new());
        }
        let mut it = list.iter();
        it.seek_to_last();
        let mut seen = Vec::new();
        while it.valid() {
            seen.push(it.key()[0]);
            it.prev();
        }
        assert_eq!(seen, vec![4, 3, 2, 1, 0]);
    }
}
