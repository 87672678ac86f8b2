//! Accumulates entries for one [`super::Block`]. No key prefix
//! compression: every entry stores its full internal key.

use bytes::BufMut;

use super::{Block, SIZEOF_COUNT};

pub struct BlockBuilder {
    data: Vec<u8>,
    entry_offsets: Vec<usize>,
}

impl BlockBuilder {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            entry_offsets: Vec::new(),
        }
    }

    /// Bytes the block would occupy if finished right now.
    pub fn current_size_estimate(&self) -> usize {
        self.data.len() + SIZEOF_COUNT
    }

    pub fn is_empty(&self) -> bool {
        self.entry_offsets.is_empty()
    }

    pub fn num_entries(&self) -> usize {
        self.entry_offsets.len()
    }

    /// Appends an entry. Keys must be added in strictly increasing
    /// internal-key order by the caller.
    pub fn add(&mut self, key: &[u8], value: &[u8]) {
        self.entry_offsets.push(self.data.len());
        self.data.put_i32_le(key.len() as i32);
        self.data.put_slice(key);
        self.data.put_i32_le(value.len() as i32);
        self.data.put_slice(value);
    }

    pub fn finish(self) -> Block {
        assert!(!self.is_empty(), "block should not be empty");
        let mut buf = self.data;
        buf.put_u32_le(self.entry_offsets.len() as u32);
        Block::decode(&buf)
    }
}

impl Default for BlockBuilder {
    fn default() -> Self {
        Self::new()
    }
}

