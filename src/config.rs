//! Fixed configuration constants. Kept as `pub const` rather than a
//! builder: these are not tunable per instance, and several test
//! properties (compaction thresholds, byte layouts) are pinned to these
//! exact values.

use std::time::Duration;

/// Max number of levels a skiplist node may participate in.
pub const SKIP_LIST_MAX_LEVEL: usize = 12;

/// Number of on-disk levels (L0..L6).
pub const NUM_LEVELS: usize = 7;

pub const MAX_OPEN_FILES: usize = 1000;
pub const NUM_NON_TABLE_CACHE_FILES: usize = 10;

/// Open sorted tables the table cache may hold at once.
pub const TABLE_CACHE_CAPACITY: usize = MAX_OPEN_FILES - NUM_NON_TABLE_CACHE_FILES;

/// L0 file count at which writers throttle themselves.
pub const L0_SLOWDOWN_WRITES_TRIGGER: usize = 8;
pub const SLOWDOWN_SLEEP_TIME: Duration = Duration::from_millis(1);

/// L0 file count at which a compaction is considered overdue.
pub const L0_COMPACTION_TRIGGER: usize = 4;

/// Memtable byte budget before it is rotated to immutable.
pub const WRITE_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// Ceiling level a freshly flushed memtable may be hoisted past L0 into.
pub const MAX_MEM_COMPACT_LEVEL: usize = 2;

/// Byte budget for L1; each deeper level is 10x the previous.
pub const L1_FILE_MAX_BYTES: u64 = 10 * 1024 * 1024;

/// Target output file size during major compaction.
pub const MAX_FILE_SIZE: u64 = 2 * 1024 * 1024;

/// Data block is flushed once its builder exceeds this size.
pub const MAX_BLOCK_SIZE: usize = 4 * 1024;

/// SSTable footer magic number.
pub const TABLE_MAGIC_NUMBER: u64 = 0xDB4775248B80FB57;

/// Seek budget a freshly created file starts with, carried for wire
/// compatibility with the reference format; this port does not schedule
/// compactions off of it (see [`crate::version::FileMeta::allow_seeks`]).
pub const DEFAULT_ALLOW_SEEKS: u64 = 1 << 30;

pub fn max_bytes_for_level(level: usize) -> u64 {
    debug_assert!(level >= 1);
    let mut result = L1_FILE_MAX_BYTES;
    for _ in 1..level {
        result *= 10;
    }
    result
}
