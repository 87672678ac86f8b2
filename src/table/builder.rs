//! Builds a sorted table file one block at a time. Keys must be added in
//! strictly increasing internal-key order; a block is flushed to disk as
//! soon as it would exceed [`crate::config::MAX_BLOCK_SIZE`], deferring its
//! index entry (last key of that block) until the *next* key arrives so the
//! last entry written always matches the block's true last key.

use crate::block::builder::BlockBuilder;
use crate::config::{MAX_BLOCK_SIZE, TABLE_MAGIC_NUMBER};
use crate::error::SsTableError;
use crate::table::{BlockHandle, HANDLE_LEN};
use bytes::{BufMut, Bytes, BytesMut};
use std::fs::File;
use std::io::Write;
use std::path::Path;

pub struct TableBuilder {
    file: File,
    offset: u64,
    data_block: BlockBuilder,
    index_block: BlockBuilder,
    pending_handle: Option<BlockHandle>,
    last_key: Bytes,
    num_entries: usize,
}

impl TableBuilder {
    pub fn create(path: &Path) -> Result<Self, SsTableError> {
        Ok(Self {
            file: File::create(path)?,
            offset: 0,
            data_block: BlockBuilder::new(),
            index_block: BlockBuilder::new(),
            pending_handle: None,
            last_key: Bytes::new(),
            num_entries: 0,
        })
    }

    pub fn num_entries(&self) -> usize {
        self.num_entries
    }

    pub fn file_size(&self) -> u64 {
        self.offset
    }

    /// `key` must be strictly greater than every key previously added.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<(), SsTableError> {
        if let Some(handle) = self.pending_handle.take() {
            self.index_block.add(&self.last_key, &handle.encode());
        }
        self.data_block.add(key, value);
        self.last_key = Bytes::copy_from_slice(key);
        self.num_entries += 1;
        if self.data_block.current_size_estimate() >= MAX_BLOCK_SIZE {
            self.flush_data_block()?;
        }
        Ok(())
    }

    fn flush_data_block(&mut self) -> Result<(), SsTableError> {
        if self.data_block.is_empty() {
            return Ok(());
        }
        let finished = std::mem::take(&mut self.data_block).finish();
        let encoded = finished.encode();
        let handle = self.write_raw(&encoded)?;
        self.pending_handle = Some(handle);
        Ok(())
    }

    fn write_raw(&mut self, bytes: &[u8]) -> Result<BlockHandle, SsTableError> {
        let handle = BlockHandle {
            offset: self.offset as u32,
            size: bytes.len() as u32,
        };
        self.file.write_all(bytes)?;
        self.file.sync_data()?;
        self.offset += bytes.len() as u64;
        Ok(handle)
    }

    pub fn finish(mut self) -> Result<(), SsTableError> {
        self.flush_data_block()?;
        if let Some(handle) = self.pending_handle.take() {
            self.index_block.add(&self.last_key, &handle.encode());
        }

        let index_handle = if self.index_block.is_empty() {
            BlockHandle { offset: 0, size: 0 }
        } else {
            let finished = std::mem::take(&mut self.index_block).finish();
            self.write_raw(&finished.encode())?
        };

        let mut footer = BytesMut::with_capacity(HANDLE_LEN * 2 + 8);
        footer.put_slice(&BlockHandle { offset: 0, size: 0 }.encode());
        footer.put_slice(&index_handle.encode());
        footer.put_u64_le(TABLE_MAGIC_NUMBER);
        self.write_raw(&footer)?;

        self.file.sync_all()?;
        Ok(())
    }
}
