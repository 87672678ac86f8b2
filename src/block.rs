//! Sorted entry container.
//!
//! Wire format: a sequence of entries `key_len(i32 LE) | key | val_len(i32
//! LE) | val`, terminated by a 4-byte little-endian entry count. Entries
//! hold full internal keys and are stored in ascending internal-key order
//! by the builder.

pub mod builder;
pub mod iterator;

use bytes::{Buf, BufMut, Bytes, BytesMut};

pub(crate) const SIZEOF_I32: usize = std::mem::size_of::<i32>();
pub(crate) const SIZEOF_COUNT: usize = std::mem::size_of::<u32>();

/// A decoded block: the raw entry bytes plus an index of entry offsets
/// within those bytes, built once at decode time for O(log n) seeking.
pub struct Block {
    data: Bytes,
    /// Byte offset (within `data`) of each entry's `key_len` field.
    entry_offsets: Vec<usize>,
}

impl Block {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.data.len() + SIZEOF_COUNT);
        buf.put_slice(&self.data);
        buf.put_u32_le(self.entry_offsets.len() as u32);
        buf.freeze()
    }

    pub fn decode(data: &[u8]) -> Self {
        assert!(data.len() >= SIZEOF_COUNT, "block too short to hold a count");
        let count_offset = data.len() - SIZEOF_COUNT;
        let count = (&data[count_offset..]).get_u32_le() as usize;
        let body = &data[..count_offset];

        let mut entry_offsets = Vec::with_capacity(count);
        let mut pos = 0usize;
        for _ in 0..count {
            entry_offsets.push(pos);
            let key_len = (&body[pos..]).get_i32_le() as usize;
            pos += SIZEOF_I32 + key_len;
            let val_len = (&body[pos..]).get_i32_le() as usize;
            pos += SIZEOF_I32 + val_len;
        }
        assert_eq!(pos, body.len(), "block entries did not consume the whole body");

        Self {
            data: Bytes::copy_from_slice(body),
            entry_offsets,
        }
    }

    pub fn num_entries(&self) -> usize {
        self.entry_offsets.len()
    }

    pub(crate) fn entry_at(&self, idx: usize) -> (&[u8], &[u8]) {
        let mut buf = &self.data[self.entry_offsets[idx]..];
        let key_len = buf.get_i32_le() as usize;
        let key = &buf[..key_len];
        buf.advance(key_len);
        let val_len = buf.get_i32_le() as usize;
        let val = &buf[..val_len];
        (key, val)
    }
}
