//! Internal key codec.
//!
//! An internal key is `user_key || kind(1 byte) || seqnum_le(7 bytes)`. The
//! 7-byte trailer holds a 56-bit sequence number; the kind occupies the byte
//! immediately before it. A key is valid iff its length is at least 8 and
//! its kind byte is 0 or 1 (`Kind::Delete` or `Kind::Set`).

use bytes::{BufMut, Bytes, BytesMut};
use std::cmp::Ordering;

pub const TRAILER_LEN: usize = 8;
pub const MAX_SEQUENCE_NUMBER: u64 = (1u64 << 56) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Kind {
    Delete = 0,
    Set = 1,
}

impl Kind {
    pub fn from_u8(b: u8) -> Option<Kind> {
        match b {
            0 => Some(Kind::Delete),
            1 => Some(Kind::Set),
            _ => None,
        }
    }
}

/// Builds an internal key from its parts. `seq` must fit in 56 bits.
pub fn build_internal_key(user_key: &[u8], kind: Kind, seq: u64) -> Bytes {
    debug_assert!(seq <= MAX_SEQUENCE_NUMBER);
    let mut buf = BytesMut::with_capacity(user_key.len() + TRAILER_LEN);
    buf.put_slice(user_key);
    buf.put_u8(kind as u8);
    let seq_bytes = seq.to_le_bytes();
    buf.put_slice(&seq_bytes[..7]);
    buf.freeze()
}

/// A lookup key for `user_key`: the smallest internal key that could ever
/// sort before a real record for `user_key`, since among entries sharing a
/// user key, larger sequence numbers sort first.
pub fn lookup_key(user_key: &[u8]) -> Bytes {
    build_internal_key(user_key, Kind::Set, MAX_SEQUENCE_NUMBER)
}

pub fn is_valid(key: &[u8]) -> bool {
    if key.len() < TRAILER_LEN {
        return false;
    }
    Kind::from_u8(key[key.len() - TRAILER_LEN]).is_some()
}

pub fn user_key(key: &[u8]) -> &[u8] {
    &key[..key.len() - TRAILER_LEN]
}

pub fn kind(key: &[u8]) -> Kind {
    Kind::from_u8(key[key.len() - TRAILER_LEN]).expect("caller must check is_valid")
}

pub fn sequence(key: &[u8]) -> u64 {
    let trailer = &key[key.len() - 7..];
    let mut buf = [0u8; 8];
    buf[..7].copy_from_slice(trailer);
    u64::from_le_bytes(buf)
}

/// Decomposes a valid internal key into `(user_key, kind, seq)`.
pub fn split(key: &[u8]) -> Option<(&[u8], Kind, u64)> {
    if !is_valid(key) {
        return None;
    }
    Some((user_key(key), kind(key), sequence(key)))
}

/// Lexicographic byte order — the default (and only) user-key comparator.
pub fn compare_user_key(a: &[u8], b: &[u8]) -> Ordering {
    a.cmp(b)
}

/// Orders internal keys: ascending user key, then descending sequence
/// (newer first), then descending kind as a final tie-break. Invalid keys
/// sort as plain byte strings and always precede any valid key; this makes
/// the empty key the minimum sentinel for free, since it is the
/// lexicographically smallest byte string.
pub fn compare_internal_key(a: &[u8], b: &[u8]) -> Ordering {
    match (is_valid(a), is_valid(b)) {
        (false, true) => Ordering::Less,
        (true, false) => Ordering::Greater,
        (false, false) => a.cmp(b),
        (true, true) => {
            let ua = user_key(a);
            let ub = user_key(b);
            match compare_user_key(ua, ub) {
                Ordering::Equal => {}
                other => return other,
            }
            let sa = sequence(a);
            let sb = sequence(b);
            match sa.cmp(&sb) {
                Ordering::Equal => {}
                // larger sequence sorts first
                Ordering::Less => return Ordering::Greater,
                Ordering::Greater => return Ordering::Less,
            }
            // larger kind sorts first
            (kind(b) as u8).cmp(&(kind(a) as u8))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let k = build_internal_key(b"hello", Kind::Set, 42);
        let (u, kind, seq) = split(&k).unwrap();
        assert_eq!(u, b"hello");
        assert_eq!(kind, Kind::Set);
        assert_eq!(seq, 42);
    }

    #[test]
    fn invalid_keys() {
        assert!(!is_valid(b""));
        assert!(!is_valid(b"short"));
        let mut bad_kind = build_internal_key(b"x", Kind::Set, 1).to_vec();
        let n = bad_kind.len();
        bad_kind[n - 8] = 2;
        assert!(!is_valid(&bad_kind));
    }

    #[test]
    fn empty_is_minimum_sentinel() {
        let valid = build_internal_key(b"a", Kind::Set, 1);
        assert_eq!(compare_internal_key(b"", &valid), Ordering::Less);
        assert_eq!(compare_internal_key(b"zz", &valid), Ordering::Less);
    }

    #[test]
    fn same_user_key_orders_by_descending_sequence_then_kind() {
        let newer = build_internal_key(b"k", Kind::Set, 5);
        let older = build_internal_key(b"k", Kind::Set, 1);
        assert_eq!(compare_internal_key(&newer, &older), Ordering::Less);

        let set5 = build_internal_key(b"k", Kind::Set, 5);
        let del5 = build_internal_key(b"k", Kind::Delete, 5);
        assert_eq!(compare_internal_key(&set5, &del5), Ordering::Less);
    }

    #[test]
    fn lookup_key_precedes_all_real_entries_for_user_key() {
        let lk = lookup_key(b"k");
        for seq in 1..100u64 {
            let real = build_internal_key(b"k", Kind::Set, seq);
            assert_eq!(compare_internal_key(&lk, &real), Ordering::Less);
        }
    }
}
