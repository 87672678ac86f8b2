//! An embedded, single-process, ordered key-value store built as a
//! log-structured merge tree.
//!
//! Writes land in an in-memory skiplist, get flushed to immutable sorted
//! tables on disk once that skiplist grows past a threshold, and are
//! periodically merged into a small number of non-overlapping levels by
//! a background compaction thread. See [`Db`] for the embedding API.

pub mod batch;
pub mod block;
pub mod compact;
pub mod config;
pub mod db;
pub mod error;
pub mod iterators;
pub mod key;
pub mod manifest;
pub mod mem_table;
pub mod skiplist;
pub mod table;
pub mod table_cache;
pub mod version;

pub use batch::WriteBatch;
pub use db::Db;
pub use error::{Error, Result};
pub use iterators::DbIterator;
