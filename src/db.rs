//! The embedding API: a single-process, ordered key-value store. `Db`
//! coordinates a mutable memtable, an optional immutable memtable waiting
//! to be flushed, a `Version` describing the sorted tables on disk, and a
//! background thread that flushes and compacts.

use crate::batch::WriteBatch;
use crate::compact;
use crate::config;
use crate::error::{Error, Lookup};
use crate::iterators::{DbIterator, StorageIterator, VecIterator};
use crate::key::{self, Kind};
use crate::manifest::Manifest;
use crate::mem_table::MemTable;
use crate::table::iterator::SsTableIterator;
use crate::table_cache::TableCache;
use crate::version::Version;
use bytes::Bytes;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use log::{debug, info, warn};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

struct State {
    mem: Arc<MemTable>,
    imm: Option<Arc<MemTable>>,
    version: Arc<Version>,
    next_mem_id: usize,
    sequence: u64,
}

pub struct Db {
    path: PathBuf,
    table_cache: Arc<TableCache>,
    manifest: Manifest,
    state: Mutex<State>,
    background_work_done: Condvar,
    compaction_tx: Sender<()>,
    background_thread: Mutex<Option<JoinHandle<()>>>,
    shutdown: AtomicBool,
}

impl Db {
    /// Opens (or creates) a database directory at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Arc<Self>, Error> {
        let path = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&path)?;

        let table_cache = Arc::new(TableCache::new(&path, config::TABLE_CACHE_CAPACITY)?);
        let manifest = Manifest::new(&path);
        let version = manifest
            .load(table_cache.clone())?
            .unwrap_or_else(|| Version::new(table_cache.clone()));
        let sequence = version.last_sequence;

        let state = State {
            mem: Arc::new(MemTable::new(0)),
            imm: None,
            version: Arc::new(version),
            next_mem_id: 1,
            sequence,
        };

        let (tx, rx) = channel::unbounded();
        let db = Arc::new(Self {
            path,
            table_cache,
            manifest,
            state: Mutex::new(state),
            background_work_done: Condvar::new(),
            compaction_tx: tx,
            background_thread: Mutex::new(None),
            shutdown: AtomicBool::new(false),
        });

        // The thread holds only a `Weak` handle so an idle database with no
        // other references can still be dropped; it notices via a failed
        // upgrade and exits instead of pinning the `Db` alive forever.
        let worker = {
            let weak = Arc::downgrade(&db);
            std::thread::spawn(move || Db::background_compaction_loop(weak, rx))
        };
        *db.background_thread.lock() = Some(worker);

        info!("opened database at {}", db.path.display());
        Ok(db)
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>, Error> {
        let (mem, imm, version) = {
            let state = self.state.lock();
            (state.mem.clone(), state.imm.clone(), state.version.clone())
        };

        match mem.get(key) {
            Lookup::Found(v) => return Ok(Some(v)),
            Lookup::Deleted => return Ok(None),
            Lookup::NotFound => {}
        }
        if let Some(imm) = imm {
            match imm.get(key) {
                Lookup::Found(v) => return Ok(Some(v)),
                Lookup::Deleted => return Ok(None),
                Lookup::NotFound => {}
            }
        }

        let lookup_key = key::lookup_key(key);
        match version.get(&lookup_key)? {
            Lookup::Found(v) => Ok(Some(v)),
            Lookup::Deleted | Lookup::NotFound => Ok(None),
        }
    }

    pub fn set(&self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        let mut batch = WriteBatch::new();
        batch.set(Bytes::copy_from_slice(key), Bytes::copy_from_slice(value));
        self.write(batch)
    }

    pub fn delete(&self, key: &[u8]) -> Result<(), Error> {
        let mut batch = WriteBatch::new();
        batch.delete(Bytes::copy_from_slice(key));
        self.write(batch)
    }

    /// Applies every operation in `batch` atomically with respect to
    /// readers: they all become visible under one admission of the write
    /// lock, with consecutive sequence numbers starting at the batch's
    /// base.
    pub fn write(&self, batch: WriteBatch) -> Result<(), Error> {
        batch.validate()?;
        if batch.is_empty() {
            return Ok(());
        }

        let mut state = self.state.lock();
        self.make_room_for_write(&mut state)?;

        let base_seq = state.sequence + 1;
        for (i, op) in batch.ops().iter().enumerate() {
            let seq = base_seq + i as u64;
            match op.kind {
                Kind::Set => {
                    let value = op.value.as_deref().expect("Set op always carries a value");
                    state.mem.set(&op.key, Kind::Set, seq, value);
                }
                Kind::Delete => state.mem.set(&op.key, Kind::Delete, seq, &[]),
            }
        }
        state.sequence = base_seq + batch.ops().len() as u64 - 1;
        Ok(())
    }

    /// Admits a write once the active memtable has room, throttling or
    /// blocking the caller otherwise. The L0 file count is checked first on
    /// every iteration, unconditionally, so a writer already sleeping off
    /// the slowdown penalty re-checks it before looking at memtable size:
    /// a short sleep once L0 is getting full, then a wait for the
    /// background thread to finish flushing the immutable memtable if one
    /// is already pending.
    fn make_room_for_write(&self, state: &mut MutexGuard<'_, State>) -> Result<(), Error> {
        loop {
            if state.version.files[0].len() >= config::L0_SLOWDOWN_WRITES_TRIGGER {
                debug!("stalling write: L0 has {} files", state.version.files[0].len());
                MutexGuard::unlocked(state, || {
                    std::thread::sleep(config::SLOWDOWN_SLEEP_TIME);
                });
                continue;
            }
            if state.mem.approximate_size() < config::WRITE_BUFFER_SIZE {
                return Ok(());
            }
            if state.imm.is_some() {
                debug!("stalling write: immutable memtable still flushing");
                self.background_work_done.wait(state);
                continue;
            }

            let old_mem = state.mem.clone();
            state.imm = Some(old_mem);
            let id = state.next_mem_id;
            state.next_mem_id += 1;
            state.mem = Arc::new(MemTable::new(id));
            let _ = self.compaction_tx.send(());
            return Ok(());
        }
    }

    /// A bidirectional iterator over every live key in the database:
    /// `valid`/`user_key`/`value`/`next`/`prev`/`seek`/`seek_to_first`/
    /// `seek_to_last`, dedup'd and tombstone-free.
    pub fn iter(&self) -> Result<DbIterator, Error> {
        let (mem, imm, version) = {
            let state = self.state.lock();
            (state.mem.clone(), state.imm.clone(), state.version.clone())
        };

        let mut sources: Vec<Box<dyn StorageIterator>> = Vec::new();
        sources.push(Box::new(materialize(&mem)));
        if let Some(imm) = &imm {
            sources.push(Box::new(materialize(imm)));
        }
        for level in 0..config::NUM_LEVELS {
            for file in &version.files[level] {
                let table = self.table_cache.get(file.number)?;
                sources.push(Box::new(SsTableIterator::create_and_seek_to_first(table)?));
            }
        }
        DbIterator::new(sources)
    }

    fn background_compaction_loop(weak: std::sync::Weak<Self>, rx: Receiver<()>) {
        loop {
            match rx.recv_timeout(Duration::from_millis(500)) {
                Ok(()) | Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return,
            }
            let Some(db) = weak.upgrade() else { return };
            if db.shutdown.load(AtomicOrdering::Acquire) {
                return;
            }
            if let Err(err) = db.run_background_compaction() {
                warn!("background compaction failed, will retry: {err}");
            }
        }
    }

    fn run_background_compaction(&self) -> Result<(), Error> {
        loop {
            let mut state = self.state.lock();
            let mut version = state.version.copy();
            let mut did_work = false;

            if let Some(imm) = state.imm.clone() {
                compact::minor_compact(&self.path, &self.table_cache, &mut version, &imm)?;
                state.imm = None;
                did_work = true;
            } else if compact::pick_compaction_level(&version).is_some() {
                compact::run(&self.path, &self.table_cache, &mut version)?;
                did_work = true;
            }

            if !did_work {
                return Ok(());
            }

            version.last_sequence = state.sequence;
            let descriptor_number = version.new_file_number();
            self.manifest.save(&version, descriptor_number)?;
            state.version = Arc::new(version);
            self.background_work_done.notify_all();
        }
    }

    pub fn close(&self) {
        self.shutdown.store(true, AtomicOrdering::Release);
        let _ = self.compaction_tx.send(());
        if let Some(handle) = self.background_thread.lock().take() {
            let _ = handle.join();
        }
        info!("closed database at {}", self.path.display());
    }
}

impl Drop for Db {
    fn drop(&mut self) {
        self.close();
    }
}

fn materialize(mem: &MemTable) -> VecIterator {
    let mut it = mem.iter();
    let mut out = Vec::new();
    while it.valid() {
        out.push((it.key(), it.value()));
        it.advance();
    }
    VecIterator::new(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_set_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let db = Db::open(dir.path()).unwrap();
        db.set(b"a", b"1").unwrap();
        assert_eq!(db.get(b"a").unwrap(), Some(Bytes::from_static(b"1")));
        db.delete(b"a").unwrap();
        assert_eq!(db.get(b"a").unwrap(), None);
    }

    #[test]
    fn reopen_after_flush_preserves_data() {
        let dir = tempfile::tempdir().unwrap();
        {
            let db = Db::open(dir.path()).unwrap();
            for i in 0..2000u32 {
                db.set(format!("key{i:05}").as_bytes(), b"value").unwrap();
            }
            db.write(WriteBatch::new()).unwrap(); // no-op, just exercise the path
        }
        let db = Db::open(dir.path()).unwrap();
        assert_eq!(db.get(b"key00000").unwrap(), Some(Bytes::from_static(b"value")));
    }

    #[test]
    fn iterate_sees_every_live_key_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let db = Db::open(dir.path()).unwrap();
        db.set(b"b", b"2").unwrap();
        db.set(b"a", b"1").unwrap();
        db.set(b"c", b"3").unwrap();
        db.delete(b"b").unwrap();

        let mut it = db.iter().unwrap();
        let mut seen = Vec::new();
        while it.is_valid() {
            seen.push((it.user_key().to_vec(), it.value().to_vec()));
            it.next().unwrap();
        }
        assert_eq!(seen, vec![(b"a".to_vec(), b"1".to_vec()), (b"c".to_vec(), b"3".to_vec())]);
    }

    #[test]
    fn iteration_supports_seek_and_reverse_scan() {
        let dir = tempfile::tempdir().unwrap();
        let db = Db::open(dir.path()).unwrap();
        db.set(b"a", b"1").unwrap();
        db.set(b"b", b"2").unwrap();
        db.set(b"c", b"3").unwrap();

        let mut it = db.iter().unwrap();
        it.seek(b"b").unwrap();
        assert!(it.is_valid());
        assert_eq!(it.user_key(), b"b");

        it.seek_to_last().unwrap();
        let mut seen = Vec::new();
        while it.is_valid() {
            seen.push(it.user_key().to_vec());
            it.prev().unwrap();
        }
        assert_eq!(seen, vec![b"c".to_vec(), b"b".to_vec(), b"a".to_vec()]);
    }
}
