//! On-disk sorted table. Layout: `data_block_0 | data_block_1 | … |
//! index_block | footer`. The index block has one entry per data block:
//! key = last internal key of that block, value = an 8-byte `(offset,
//! size)` handle. The footer is `meta_index_handle(8, reserved) |
//! index_handle(8) | magic(8)`.

pub mod builder;
pub mod iterator;

use crate::block::Block;
use crate::config::TABLE_MAGIC_NUMBER;
use crate::error::{Lookup, SsTableError};
use crate::key::{self, Kind};
use bytes::{Buf, Bytes};
use std::fs::File;
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::Arc;

pub(crate) const HANDLE_LEN: usize = 8; // u32 offset + u32 size
pub(crate) const FOOTER_LEN: usize = HANDLE_LEN * 2 + 8; // + magic

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHandle {
    pub offset: u32,
    pub size: u32,
}

impl BlockHandle {
    pub fn encode(&self) -> [u8; HANDLE_LEN] {
        let mut buf = [0u8; HANDLE_LEN];
        buf[0..4].copy_from_slice(&self.offset.to_le_bytes());
        buf[4..8].copy_from_slice(&self.size.to_le_bytes());
        buf
    }

    pub fn decode(mut buf: &[u8]) -> Self {
        let offset = buf.get_u32_le();
        let size = buf.get_u32_le();
        Self { offset, size }
    }
}

struct FileReader {
    file: File,
}

impl FileReader {
    fn open(path: &Path) -> Result<Self, SsTableError> {
        Ok(Self {
            file: File::open(path)?,
        })
    }

    fn len(&self) -> Result<u64, SsTableError> {
        Ok(self.file.metadata()?.len())
    }

    fn read(&self, offset: u64, len: u64) -> Result<Vec<u8>, SsTableError> {
        let mut buf = vec![0u8; len as usize];
        self.file.read_exact_at(&mut buf, offset)?;
        Ok(buf)
    }
}

/// A read-only, already-built sorted table backed by an open file.
pub struct SsTable {
    reader: FileReader,
    /// `(last internal key of block, handle)`, ascending, one per data block.
    index: Vec<(Bytes, BlockHandle)>,
    id: u64,
    file_size: u64,
    smallest: Bytes,
    largest: Bytes,
}

impl SsTable {
    pub fn open(id: u64, path: &Path) -> Result<Self, SsTableError> {
        let reader = FileReader::open(path)?;
        let file_size = reader.len()?;
        if file_size < FOOTER_LEN as u64 {
            return Err(SsTableError::FileTooShort);
        }

        let footer = reader.read(file_size - FOOTER_LEN as u64, FOOTER_LEN as u64)?;
        let magic = (&footer[HANDLE_LEN * 2..]).get_u64_le();
        if magic != TABLE_MAGIC_NUMBER {
            return Err(SsTableError::BadMagicNumber);
        }
        let index_handle = BlockHandle::decode(&footer[HANDLE_LEN..HANDLE_LEN * 2]);

        let raw_index = reader.read(index_handle.offset as u64, index_handle.size as u64)?;
        let index_block = Block::decode(&raw_index);
        let mut index = Vec::with_capacity(index_block.num_entries());
        for i in 0..index_block.num_entries() {
            let (key, value) = index_block.entry_at(i);
            index.push((Bytes::copy_from_slice(key), BlockHandle::decode(value)));
        }

        let smallest = index.first().map(|(k, _)| k.clone()).unwrap_or_default();
        let largest = index.last().map(|(k, _)| k.clone()).unwrap_or_default();

        Ok(Self {
            reader,
            index,
            id,
            file_size,
            smallest,
            largest,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn smallest(&self) -> &[u8] {
        &self.smallest
    }

    pub fn largest(&self) -> &[u8] {
        &self.largest
    }

    fn read_block(&self, handle: BlockHandle) -> Result<Arc<Block>, SsTableError> {
        let raw = self.reader.read(handle.offset as u64, handle.size as u64)?;
        Ok(Arc::new(Block::decode(&raw)))
    }

    /// Index of the first block whose last internal key is `>= lookup_key`.
    fn block_containing(&self, lookup_key: &[u8]) -> Option<usize> {
        let mut left = 0usize;
        let mut right = self.index.len();
        while left < right {
            let mid = (left + right) / 2;
            if key::compare_internal_key(&self.index[mid].0, lookup_key) == std::cmp::Ordering::Less
            {
                left = mid + 1;
            } else {
                right = mid;
            }
        }
        if left == self.index.len() {
            None
        } else {
            Some(left)
        }
    }

    /// Looks up the newest record for `user_key` visible at `lookup_key`'s
    /// sequence number. Returns `NotFound` if nothing in this table settles
    /// the question, in which case the caller must consult an older table.
    pub fn get(&self, lookup_key: &[u8]) -> Result<Lookup, SsTableError> {
        let Some(block_idx) = self.block_containing(lookup_key) else {
            return Ok(Lookup::NotFound);
        };
        let block = self.read_block(self.index[block_idx].1)?;
        let mut it = crate::block::iterator::BlockIterator::create_and_seek_to_key(
            block,
            key::user_key(lookup_key),
        );
        if !it.is_valid() {
            return Ok(Lookup::NotFound);
        }
        let found_key = it.key();
        if key::user_key(found_key) != key::user_key(lookup_key) {
            return Ok(Lookup::NotFound);
        }
        match key::kind(found_key) {
            Kind::Set => Ok(Lookup::Found(Bytes::copy_from_slice(it.value()))),
            Kind::Delete => Ok(Lookup::Deleted),
        }
    }

    pub(crate) fn index_entries(&self) -> &[(Bytes, BlockHandle)] {
        &self.index
    }

    pub(crate) fn read_block_at(&self, idx: usize) -> Result<Arc<Block>, SsTableError> {
        self.read_block(self.index[idx].1)
    }
}
