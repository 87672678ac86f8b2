//! Persistent metadata describing the set of sorted tables that make up
//! the database at a point in time: which files exist, which level each
//! one lives in, and where reads should look first.

use crate::config::NUM_LEVELS;
use crate::error::{CodecError, Lookup, VersionError};
use crate::key;
use crate::table_cache::TableCache;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::cmp::Ordering;
use std::sync::Arc;

/// Metadata describing one on-disk sorted table: its file number, size,
/// the smallest and largest internal keys it contains, and an
/// `allow_seeks` budget. `allow_seeks` tracks how many misdirected seeks a
/// file may absorb before becoming a compaction candidate on its own (the
/// seek-triggered-compaction heuristic); this port carries the field for
/// wire compatibility but never decrements it, since seek-triggered
/// compaction is out of scope here (compaction is driven purely by the
/// level-score trigger of §4.7).
#[derive(Debug, Clone)]
pub struct FileMeta {
    pub allow_seeks: u64,
    pub number: u64,
    pub file_size: u64,
    pub smallest: Bytes,
    pub largest: Bytes,
}

impl FileMeta {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64_le(self.allow_seeks);
        buf.put_u64_le(self.file_size);
        buf.put_u64_le(self.number);
        buf.put_u32_le(self.smallest.len() as u32);
        buf.put_slice(&self.smallest);
        buf.put_u32_le(self.largest.len() as u32);
        buf.put_slice(&self.largest);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, VersionError> {
        if buf.remaining() < 28 {
            return Err(VersionError::Codec(CodecError::FileMetaDecode));
        }
        let allow_seeks = buf.get_u64_le();
        let file_size = buf.get_u64_le();
        let number = buf.get_u64_le();
        let smallest_len = buf.get_u32_le() as usize;
        if buf.remaining() < smallest_len + 4 {
            return Err(VersionError::Codec(CodecError::FileMetaDecode));
        }
        let smallest = buf.copy_to_bytes(smallest_len);
        let largest_len = buf.get_u32_le() as usize;
        if buf.remaining() < largest_len {
            return Err(VersionError::Codec(CodecError::FileMetaDecode));
        }
        let largest = buf.copy_to_bytes(largest_len);
        Ok(Self {
            allow_seeks,
            number,
            file_size,
            smallest,
            largest,
        })
    }
}

/// A snapshot of the database's on-disk layout: one file list per level
/// plus bookkeeping the compaction picker and file namer need.
pub struct Version {
    table_cache: Arc<TableCache>,
    next_file_number: u64,
    pub last_sequence: u64,
    pub files: [Vec<Arc<FileMeta>>; NUM_LEVELS],
    pub compact_pointer: [Bytes; NUM_LEVELS],
}

impl Version {
    pub fn new(table_cache: Arc<TableCache>) -> Self {
        Self {
            table_cache,
            next_file_number: 1,
            last_sequence: 0,
            files: std::array::from_fn(|_| Vec::new()),
            compact_pointer: std::array::from_fn(|_| Bytes::new()),
        }
    }

    pub fn new_file_number(&mut self) -> u64 {
        let n = self.next_file_number;
        self.next_file_number += 1;
        n
    }

    /// A deep-enough copy for a background compaction to mutate without
    /// disturbing readers still holding the previous version: per-level
    /// file vectors are cloned, but the table cache (and thus every open
    /// file) is shared.
    pub fn copy(&self) -> Self {
        Self {
            table_cache: self.table_cache.clone(),
            next_file_number: self.next_file_number,
            last_sequence: self.last_sequence,
            files: std::array::from_fn(|i| self.files[i].clone()),
            compact_pointer: std::array::from_fn(|i| self.compact_pointer[i].clone()),
        }
    }

    /// Looks up the newest record visible at `lookup_key`. L0 files
    /// overlap and are searched newest-file-first; L1 and deeper are
    /// non-overlapping and sorted, so a single file can settle the
    /// question via binary search.
    pub fn get(&self, lookup_key: &[u8]) -> Result<Lookup, VersionError> {
        let user_key = key::user_key(lookup_key);

        let mut l0: Vec<&Arc<FileMeta>> = self.files[0].iter().collect();
        l0.sort_by(|a, b| b.number.cmp(&a.number));
        for file in l0 {
            if !file_may_contain(file, user_key) {
                continue;
            }
            let result = self.table_cache.get_lookup(file.number, lookup_key)?;
            if result.is_terminal() {
                return Ok(result);
            }
        }

        for level in 1..NUM_LEVELS {
            let files = &self.files[level];
            let idx = files.partition_point(|f| {
                key::compare_user_key(key::user_key(&f.largest), user_key) == Ordering::Less
            });
            if idx >= files.len() || !file_may_contain(&files[idx], user_key) {
                continue;
            }
            let result = self.table_cache.get_lookup(files[idx].number, lookup_key)?;
            if result.is_terminal() {
                return Ok(result);
            }
        }

        Ok(Lookup::NotFound)
    }

    /// Files in `level` whose user-key range intersects `[smallest,
    /// largest]`.
    pub fn overlap_in_level(&self, level: usize, smallest: &[u8], largest: &[u8]) -> Vec<Arc<FileMeta>> {
        self.files[level]
            .iter()
            .filter(|f| {
                key::compare_user_key(key::user_key(&f.largest), smallest) != Ordering::Less
                    && key::compare_user_key(key::user_key(&f.smallest), largest) != Ordering::Greater
            })
            .cloned()
            .collect()
    }

    /// Adds `file` to `level`, keeping levels above L0 sorted by internal
    /// key so they stay eligible for binary-search lookups.
    pub fn add_file(&mut self, level: usize, file: Arc<FileMeta>) {
        self.files[level].push(file);
        if level > 0 {
            self.files[level].sort_by(|a, b| key::compare_internal_key(&a.smallest, &b.smallest));
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_u64_le(self.next_file_number);
        buf.put_u64_le(self.last_sequence);
        for level in 0..NUM_LEVELS {
            buf.put_u32_le(self.compact_pointer[level].len() as u32);
            buf.put_slice(&self.compact_pointer[level]);
            buf.put_u32_le(self.files[level].len() as u32);
            for file in &self.files[level] {
                file.encode(&mut buf);
            }
        }
        buf.freeze()
    }

    pub fn decode(table_cache: Arc<TableCache>, data: &[u8]) -> Result<Self, VersionError> {
        let mut buf = data;
        if buf.remaining() < 16 {
            return Err(VersionError::Codec(CodecError::VersionDecode));
        }
        let next_file_number = buf.get_u64_le();
        let last_sequence = buf.get_u64_le();
        let mut files: [Vec<Arc<FileMeta>>; NUM_LEVELS] = std::array::from_fn(|_| Vec::new());
        let mut compact_pointer: [Bytes; NUM_LEVELS] = std::array::from_fn(|_| Bytes::new());
        for level in 0..NUM_LEVELS {
            if buf.remaining() < 4 {
                return Err(VersionError::Codec(CodecError::VersionDecode));
            }
            let ptr_len = buf.get_u32_le() as usize;
            if buf.remaining() < ptr_len + 4 {
                return Err(VersionError::Codec(CodecError::VersionDecode));
            }
            compact_pointer[level] = buf.copy_to_bytes(ptr_len);
            let count = buf.get_u32_le() as usize;
            for _ in 0..count {
                files[level].push(Arc::new(FileMeta::decode(&mut buf)?));
            }
        }
        Ok(Self {
            table_cache,
            next_file_number,
            last_sequence,
            files,
            compact_pointer,
        })
    }
}

fn file_may_contain(file: &FileMeta, user_key: &[u8]) -> bool {
    key::compare_user_key(user_key, key::user_key(&file.smallest)) != Ordering::Less
        && key::compare_user_key(user_key, key::user_key(&file.largest)) != Ordering::Greater
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{build_internal_key, Kind};

    fn meta(number: u64, smallest: &str, largest: &str) -> Arc<FileMeta> {
        Arc::new(FileMeta {
            allow_seeks: 0,
            number,
            file_size: 0,
            smallest: build_internal_key(smallest.as_bytes(), Kind::Set, number),
            largest: build_internal_key(largest.as_bytes(), Kind::Set, number),
        })
    }

    #[test]
    fn overlap_in_level_finds_intersecting_ranges() {
        let table_cache = Arc::new(TableCache::new("/tmp", 8).unwrap());
        let mut version = Version::new(table_cache);
        version.add_file(1, meta(1, "a", "c"));
        version.add_file(1, meta(2, "e", "g"));
        let hits = version.overlap_in_level(1, b"b", b"f");
        assert_eq!(hits.len(), 2);
        let hits = version.overlap_in_level(1, b"h", b"z");
        assert!(hits.is_empty());
    }

    #[test]
    fn encode_decode_round_trip() {
        let table_cache = Arc::new(TableCache::new("/tmp", 8).unwrap());
        let mut version = Version::new(table_cache.clone());
        version.last_sequence = 42;
        version.add_file(0, meta(1, "a", "b"));
        version.add_file(2, meta(2, "c", "d"));
        version.compact_pointer[2] = build_internal_key(b"c", Kind::Set, 2);

        let encoded = version.encode();
        let decoded = Version::decode(table_cache, &encoded).unwrap();
        assert_eq!(decoded.last_sequence, 42);
        assert_eq!(decoded.files[0].len(), 1);
        assert_eq!(decoded.files[2].len(), 1);
        assert_eq!(decoded.compact_pointer[2], version.compact_pointer[2]);
    }
}
