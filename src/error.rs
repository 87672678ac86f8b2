//! Typed error hierarchy. Each subsystem owns its own error enum;
//! [`Error`] aggregates them for the public embedding API.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("entry encode error")]
    EntryEncode,
    #[error("entry decode error")]
    EntryDecode,
    #[error("file meta encode error")]
    FileMetaEncode,
    #[error("file meta decode error")]
    FileMetaDecode,
    #[error("version encode error")]
    VersionEncode,
    #[error("version decode error")]
    VersionDecode,
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("batch operation count overflowed (0xFFFFFFFF is reserved)")]
    Invalid,
}

#[derive(Debug, Error)]
pub enum SsTableError {
    #[error("sstable file is shorter than a footer")]
    FileTooShort,
    #[error("sstable footer magic number mismatch")]
    BadMagicNumber,
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum TableCacheError {
    #[error("LRU cache capacity must be positive")]
    InvalidCapacity,
    #[error(transparent)]
    SsTable(#[from] SsTableError),
}

#[derive(Debug, Error)]
pub enum VersionError {
    #[error("key not found in this version")]
    NotFound,
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    TableCache(#[from] TableCacheError),
    #[error(transparent)]
    SsTable(#[from] SsTableError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum CompactionError {
    #[error("minor compaction failed: {0}")]
    Minor(String),
    #[error("major compaction failed: {0}")]
    Major(String),
    #[error(transparent)]
    Version(#[from] VersionError),
    #[error(transparent)]
    SsTable(#[from] SsTableError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Top-level error returned by the embedding API.
#[derive(Debug, Error)]
pub enum Error {
    #[error("key not found")]
    NotFound,
    #[error("batch error: {0}")]
    Batch(#[from] BatchError),
    #[error("sstable error: {0}")]
    SsTable(#[from] SsTableError),
    #[error("version error: {0}")]
    Version(#[from] VersionError),
    #[error("table cache error: {0}")]
    TableCache(#[from] TableCacheError),
    #[error("compaction error: {0}")]
    Compaction(#[from] CompactionError),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Outcome of a point lookup inside a single layer (memtable, sstable, or
/// version). Distinct from `Result` because a tombstone is not exceptional:
/// it must short-circuit the caller's search the same way a hit does, while
/// `NotFound` must fall through to the next layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found(bytes::Bytes),
    Deleted,
    NotFound,
}

impl Lookup {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Lookup::NotFound)
    }
}
