//! On-disk layout and persistence of the current [`crate::version::Version`].
//!
//! Each saved version is written whole to a fresh descriptor file
//! (`<number>.dsc`); `CURRENT` is then repointed at it by writing the name
//! to a temp file and renaming over the old one, so a crash mid-write
//! never leaves `CURRENT` referencing a half-written descriptor.

use crate::error::VersionError;
use crate::table_cache::TableCache;
use crate::version::Version;
use log::debug;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub fn sstable_path(db_path: &Path, number: u64) -> PathBuf {
    db_path.join(format!("{number:06}.ldb"))
}

pub fn descriptor_path(db_path: &Path, number: u64) -> PathBuf {
    db_path.join(format!("{number:06}.dsc"))
}

fn temp_path(db_path: &Path, number: u64) -> PathBuf {
    db_path.join(format!("{number:06}.tmp"))
}

fn current_path(db_path: &Path) -> PathBuf {
    db_path.join("CURRENT")
}

pub struct Manifest {
    db_path: PathBuf,
}

impl Manifest {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    /// Writes `version` as descriptor `descriptor_number` and atomically
    /// repoints `CURRENT` at it.
    pub fn save(&self, version: &Version, descriptor_number: u64) -> Result<(), VersionError> {
        let desc_path = descriptor_path(&self.db_path, descriptor_number);
        std::fs::write(&desc_path, version.encode())?;
        File::open(&desc_path)?.sync_all()?;

        let tmp_path = temp_path(&self.db_path, descriptor_number);
        let mut tmp = File::create(&tmp_path)?;
        write!(tmp, "{descriptor_number:06}.dsc")?;
        tmp.sync_all()?;
        drop(tmp);
        std::fs::rename(&tmp_path, current_path(&self.db_path))?;
        debug!("CURRENT now points at descriptor {descriptor_number:06}.dsc");
        Ok(())
    }

    /// Loads the version `CURRENT` points at, or `None` for a fresh
    /// database with no manifest yet.
    pub fn load(&self, table_cache: Arc<TableCache>) -> Result<Option<Version>, VersionError> {
        let current = current_path(&self.db_path);
        if !current.exists() {
            return Ok(None);
        }
        let name = std::fs::read_to_string(&current)?;
        let desc_path = self.db_path.join(name.trim());
        let data = std::fs::read(&desc_path)?;
        Ok(Some(Version::decode(table_cache, &data)?))
    }
}
