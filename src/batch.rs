//! Write batch codec. A batch buffers a sequence of `(kind, user_key,
//! [value])` operations under a shared base sequence number. The operation
//! count saturates at the reserved `0xFFFFFFFF` sentinel instead of
//! wrapping, and an overflowed batch is rejected wholesale at apply time.

use crate::error::BatchError;
use crate::key::Kind;
use bytes::{Buf, BufMut, Bytes, BytesMut};

pub const INVALID_COUNT: u32 = 0xFFFF_FFFF;

#[derive(Debug, Clone)]
pub struct Op {
    pub kind: Kind,
    pub key: Bytes,
    pub value: Option<Bytes>,
}

/// A buffered group of writes sharing one base sequence number.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    base_seq: u64,
    count: u32,
    ops: Vec<Op>,
}

fn put_uvarint(buf: &mut BytesMut, mut value: u64) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte);
        if value == 0 {
            break;
        }
    }
}

fn get_uvarint(buf: &[u8]) -> Option<(u64, usize)> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    for (i, &byte) in buf.iter().enumerate() {
        if shift >= 64 {
            return None;
        }
        value |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
        shift += 7;
    }
    None
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn base_seq(&self) -> u64 {
        self.base_seq
    }

    pub fn set_base_seq(&mut self, seq: u64) {
        self.base_seq = seq;
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    /// Increments the operation count. Returns `false` once the count has
    /// saturated at `INVALID_COUNT`; the caller must not record an
    /// operation in that case.
    fn increment(&mut self) -> bool {
        if self.count == INVALID_COUNT {
            return false;
        }
        self.count += 1;
        true
    }

    pub fn set(&mut self, key: impl Into<Bytes>, value: impl Into<Bytes>) {
        if self.increment() {
            self.ops.push(Op {
                kind: Kind::Set,
                key: key.into(),
                value: Some(value.into()),
            });
        }
    }

    pub fn delete(&mut self, key: impl Into<Bytes>) {
        if self.increment() {
            self.ops.push(Op {
                kind: Kind::Delete,
                key: key.into(),
                value: None,
            });
        }
    }

    /// Rejects batches whose count has hit the reserved overflow sentinel.
    pub fn validate(&self) -> Result<(), BatchError> {
        if self.count == INVALID_COUNT {
            return Err(BatchError::Invalid);
        }
        Ok(())
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_u64_le(self.base_seq);
        buf.put_u32_le(self.count);
        for op in &self.ops {
            buf.put_u8(op.kind as u8);
            put_uvarint(&mut buf, op.key.len() as u64);
            buf.put_slice(&op.key);
            if op.kind == Kind::Set {
                let value = op.value.as_ref().expect("Set op always carries a value");
                put_uvarint(&mut buf, value.len() as u64);
                buf.put_slice(value);
            }
        }
        buf.freeze()
    }

    pub fn decode(mut data: &[u8]) -> Result<Self, BatchError> {
        if data.len() < 12 {
            return Err(BatchError::Invalid);
        }
        let base_seq = data.get_u64_le();
        let count = data.get_u32_le();
        let mut ops = Vec::new();
        if count != INVALID_COUNT {
            for _ in 0..count {
                if data.is_empty() {
                    return Err(BatchError::Invalid);
                }
                let kind = Kind::from_u8(data.get_u8()).ok_or(BatchError::Invalid)?;
                let (key_len, n) = get_uvarint(data).ok_or(BatchError::Invalid)?;
                data.advance(n);
                if (key_len as usize) > data.remaining() {
                    return Err(BatchError::Invalid);
                }
                let key = Bytes::copy_from_slice(&data[..key_len as usize]);
                data.advance(key_len as usize);
                let value = if kind == Kind::Set {
                    let (val_len, n) = get_uvarint(data).ok_or(BatchError::Invalid)?;
                    data.advance(n);
                    if (val_len as usize) > data.remaining() {
                        return Err(BatchError::Invalid);
                    }
                    let value = Bytes::copy_from_slice(&data[..val_len as usize]);
                    data.advance(val_len as usize);
                    Some(value)
                } else {
                    None
                };
                ops.push(Op { kind, key, value });
            }
        }
        Ok(Self {
            base_seq,
            count,
            ops,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let mut batch = WriteBatch::new();
        batch.set_base_seq(7);
        batch.set(Bytes::from_static(b"a"), Bytes::from_static(b"1"));
        batch.delete(Bytes::from_static(b"b"));
        batch.set(Bytes::from_static(b""), Bytes::from_static(b""));

        let encoded = batch.encode();
        let decoded = WriteBatch::decode(&encoded).unwrap();
        assert_eq!(decoded.base_seq(), 7);
        assert_eq!(decoded.count(), 3);
        assert_eq!(decoded.ops().len(), 3);
        assert_eq!(decoded.ops()[0].key, Bytes::from_static(b"a"));
        assert_eq!(decoded.ops()[0].value, Some(Bytes::from_static(b"1")));
        assert_eq!(decoded.ops()[1].kind, Kind::Delete);
        assert_eq!(decoded.ops()[1].value, None);
    }

    #[test]
    fn count_saturates_and_rejects_further_writes() {
        let mut batch = WriteBatch::new();
        batch.count = INVALID_COUNT - 1;
        assert!(batch.increment());
        assert_eq!(batch.count(), INVALID_COUNT);
        assert!(!batch.increment());
        assert_eq!(batch.count(), INVALID_COUNT);
        assert!(batch.validate().is_err());
    }
}
