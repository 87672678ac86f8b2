//! Picks and executes compactions. A minor compaction flushes an
//! immutable memtable to a new sorted table, hoisting it past shallow
//! levels it does not overlap. A major compaction merges one level's
//! files with the overlapping files of the level below into fresh,
//! non-overlapping output files.

use crate::config::{self, NUM_LEVELS};
use crate::error::CompactionError;
use crate::key;
use crate::manifest;
use crate::mem_table::MemTable;
use crate::table::builder::TableBuilder;
use crate::table::iterator::SsTableIterator;
use crate::table::SsTable;
use crate::table_cache::TableCache;
use crate::version::{FileMeta, Version};
use bytes::Bytes;
use log::info;
use std::cmp::Ordering;
use std::path::Path;
use std::sync::Arc;

/// A level picked for compaction, plus the files from it (`inputs[0]`)
/// and the overlapping files one level down (`inputs[1]`).
pub struct CompactionTask {
    pub level: usize,
    pub inputs: [Vec<Arc<FileMeta>>; 2],
}

impl CompactionTask {
    fn is_trivial_move(&self) -> bool {
        self.inputs[0].len() == 1 && self.inputs[1].is_empty()
    }
}

fn compaction_score(version: &Version, level: usize) -> f64 {
    if level == 0 {
        version.files[0].len() as f64 / config::L0_COMPACTION_TRIGGER as f64
    } else {
        let total: u64 = version.files[level].iter().map(|f| f.file_size).sum();
        total as f64 / config::max_bytes_for_level(level) as f64
    }
}

/// The most overdue level, if any level's score exceeds 1.0. The bottom
/// level is never picked: there is nothing below it to compact into.
pub fn pick_compaction_level(version: &Version) -> Option<usize> {
    (0..NUM_LEVELS - 1)
        .map(|level| (level, compaction_score(version, level)))
        .filter(|&(_, score)| score > 1.0)
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
        .map(|(level, _)| level)
}

/// Selects the input files for compacting `level`: every L0 file (since
/// they overlap each other and must all be considered together), or for
/// L1+ the first file past that level's round-robin compaction pointer.
fn pick_compaction(version: &Version, level: usize) -> CompactionTask {
    let files = &version.files[level];
    let chosen = if level == 0 {
        files.clone()
    } else {
        let pointer = &version.compact_pointer[level];
        let start = files
            .iter()
            .position(|f| key::compare_internal_key(&f.largest, pointer) == Ordering::Greater)
            .unwrap_or(0);
        vec![files[start].clone()]
    };

    let mut smallest = chosen[0].smallest.clone();
    let mut largest = chosen[0].largest.clone();
    for f in &chosen[1..] {
        if key::compare_internal_key(&f.smallest, &smallest) == Ordering::Less {
            smallest = f.smallest.clone();
        }
        if key::compare_internal_key(&f.largest, &largest) == Ordering::Greater {
            largest = f.largest.clone();
        }
    }

    let overlapping =
        version.overlap_in_level(level + 1, key::user_key(&smallest), key::user_key(&largest));

    CompactionTask {
        level,
        inputs: [chosen, overlapping],
    }
}

/// Flushes `mem` to a new sorted table and decides which level it lands
/// in: the deepest level up to [`config::MAX_MEM_COMPACT_LEVEL`] that the
/// new table does not overlap, and whose next level down it does not
/// overlap either, so the flush doesn't immediately demand a large major
/// compaction.
pub fn minor_compact(
    db_path: &Path,
    table_cache: &TableCache,
    version: &mut Version,
    mem: &MemTable,
) -> Result<(), CompactionError> {
    let mut it = mem.iter();
    if !it.valid() {
        return Ok(());
    }

    let number = version.new_file_number();
    let path = manifest::sstable_path(db_path, number);
    let mut builder = TableBuilder::create(&path)?;

    let mut smallest: Option<Bytes> = None;
    let mut largest = Bytes::new();
    while it.valid() {
        let key = it.key();
        let value = it.value();
        if smallest.is_none() {
            smallest = Some(key.clone());
        }
        largest = key.clone();
        builder.add(&key, &value)?;
        it.advance();
    }
    builder.finish()?;
    let file_size = std::fs::metadata(&path)?.len();

    let meta = Arc::new(FileMeta {
        allow_seeks: config::DEFAULT_ALLOW_SEEKS,
        number,
        file_size,
        smallest: smallest.expect("checked non-empty above"),
        largest,
    });

    let mut level = 0;
    while level < config::MAX_MEM_COMPACT_LEVEL {
        let here = version.overlap_in_level(level, key::user_key(&meta.smallest), key::user_key(&meta.largest));
        if !here.is_empty() {
            break;
        }
        if level + 1 < NUM_LEVELS {
            let below =
                version.overlap_in_level(level + 1, key::user_key(&meta.smallest), key::user_key(&meta.largest));
            if !below.is_empty() {
                break;
            }
        }
        level += 1;
    }

    table_cache.get(number)?;
    info!("minor compaction: flushed memtable to file {number} ({file_size} bytes) at level {level}");
    version.add_file(level, meta);
    Ok(())
}

/// Merges every input file with a linear scan: fan-in during a single
/// compaction is always small (at most one level's worth of overlap),
/// so a heap buys nothing a plain min-of-N scan doesn't already give.
/// Only the newest entry for each user key survives; an internal key out
/// of order relative to the last one written is a bug in the inputs, not
/// a recoverable condition.
fn major_compact(
    db_path: &Path,
    version: &mut Version,
    task: &CompactionTask,
) -> Result<Vec<Arc<FileMeta>>, CompactionError> {
    let mut sources = Vec::new();
    for file in task.inputs[0].iter().chain(task.inputs[1].iter()) {
        let table = Arc::new(SsTable::open(file.number, &manifest::sstable_path(db_path, file.number))?);
        sources.push(SsTableIterator::create_and_seek_to_first(table)?);
    }

    let mut outputs = Vec::new();
    let mut builder: Option<(u64, TableBuilder)> = None;
    let mut smallest: Option<Bytes> = None;
    let mut largest = Bytes::new();
    let mut last_user_key: Option<Bytes> = None;
    let mut last_key_written: Option<Bytes> = None;

    loop {
        let mut min_idx = None;
        for (i, it) in sources.iter().enumerate() {
            if !it.is_valid() {
                continue;
            }
            match min_idx {
                None => min_idx = Some(i),
                Some(j) if key::compare_internal_key(it.key(), sources[j].key()) == Ordering::Less => {
                    min_idx = Some(i);
                }
                _ => {}
            }
        }
        let Some(i) = min_idx else { break };

        let key = Bytes::copy_from_slice(sources[i].key());
        let value = Bytes::copy_from_slice(sources[i].value());
        let user_key = Bytes::copy_from_slice(key::user_key(&key));

        let is_superseded = last_user_key.as_ref() == Some(&user_key);
        last_user_key = Some(user_key);

        if !is_superseded {
            if let Some(last) = &last_key_written {
                if key::compare_internal_key(&key, last) != Ordering::Greater {
                    return Err(CompactionError::Major(
                        "merge produced a non-increasing internal key".to_string(),
                    ));
                }
            }

            if builder.is_none() {
                let number = version.new_file_number();
                let path = manifest::sstable_path(db_path, number);
                builder = Some((number, TableBuilder::create(&path)?));
            }
            let (_, b) = builder.as_mut().expect("just ensured Some");
            b.add(&key, &value)?;
            if smallest.is_none() {
                smallest = Some(key.clone());
            }
            largest = key.clone();
            last_key_written = Some(key);

            if builder.as_ref().expect("just written to").1.file_size() >= config::MAX_FILE_SIZE {
                let (number, b) = builder.take().expect("just checked Some");
                b.finish()?;
                let file_size = std::fs::metadata(manifest::sstable_path(db_path, number))?.len();
                outputs.push(Arc::new(FileMeta {
                    allow_seeks: config::DEFAULT_ALLOW_SEEKS,
                    number,
                    file_size,
                    smallest: smallest.take().expect("set when builder was created"),
                    largest: largest.clone(),
                }));
            }
        }

        sources[i].next()?;
    }

    if let Some((number, b)) = builder.take() {
        b.finish()?;
        let file_size = std::fs::metadata(manifest::sstable_path(db_path, number))?.len();
        outputs.push(Arc::new(FileMeta {
            allow_seeks: config::DEFAULT_ALLOW_SEEKS,
            number,
            file_size,
            smallest: smallest.take().expect("set when builder was created"),
            largest,
        }));
    }

    Ok(outputs)
}

/// Runs one compaction round if a level is overdue: a single-file trivial
/// move when the input level has exactly one file and nothing below it
/// overlaps, otherwise a full merge. Returns whether any work was done.
pub fn run(db_path: &Path, table_cache: &TableCache, version: &mut Version) -> Result<bool, CompactionError> {
    let Some(level) = pick_compaction_level(version) else {
        return Ok(false);
    };
    let task = pick_compaction(version, level);

    if task.is_trivial_move() {
        let file = task.inputs[0][0].clone();
        info!("trivial move: file {} from level {level} to level {}", file.number, level + 1);
        version.files[level].retain(|f| f.number != file.number);
        version.add_file(level + 1, file);
        return Ok(true);
    }

    let input_files = task.inputs[0].len() + task.inputs[1].len();
    let input_bytes: u64 = task.inputs[0].iter().chain(task.inputs[1].iter()).map(|f| f.file_size).sum();
    info!("major compaction starting: level {level}, {input_files} input files, {input_bytes} bytes");

    let outputs = major_compact(db_path, version, &task)?;

    for file in &task.inputs[0] {
        version.files[level].retain(|f| f.number != file.number);
    }
    for file in &task.inputs[1] {
        version.files[level + 1].retain(|f| f.number != file.number);
    }
    let output_bytes: u64 = outputs.iter().map(|f| f.file_size).sum();
    info!(
        "major compaction finished: level {level}, {} output files, {output_bytes} bytes",
        outputs.len()
    );
    for out in outputs {
        table_cache.get(out.number)?;
        version.add_file(level + 1, out);
    }
    if let Some(max_input) = task.inputs[0]
        .iter()
        .map(|f| f.largest.clone())
        .max_by(|a, b| key::compare_internal_key(a, b))
    {
        version.compact_pointer[level] = max_input;
    }
    Ok(true)
}
