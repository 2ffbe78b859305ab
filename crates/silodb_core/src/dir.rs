//! Database directory layout and process-exclusive locking.
//!
//! A SiloDB database is a directory:
//!
//! ```text
//! <db>/
//! ├── LOCK            advisory lock held while a handle is open
//! ├── types/          one fixed-record file per registered type
//! │   └── <name>.silo
//! ├── raw.pool        shared variable-size payload pool
//! └── undo.log        pre-image log, present only mid-operation
//! ```

use crate::config::Config;
use crate::error::{DbError, DbResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const TYPES_DIR: &str = "types";
const POOL_FILE: &str = "raw.pool";
const LOG_FILE: &str = "undo.log";
const TYPE_EXT: &str = "silo";

/// An open database directory holding the advisory lock.
///
/// The lock is released when this value is dropped.
#[derive(Debug)]
pub struct DatabaseDir {
    root: PathBuf,
    lock: File,
}

impl DatabaseDir {
    /// Opens (and optionally creates) a database directory and takes its
    /// exclusive lock.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` when `error_if_exists` is set and the
    /// directory holds a database, `DatabaseLocked` when another process has
    /// the lock, and I/O errors from directory creation.
    pub fn open(root: impl AsRef<Path>, config: &Config) -> DbResult<Self> {
        let root = root.as_ref().to_path_buf();
        let exists = root.join(LOCK_FILE).exists() || root.join(TYPES_DIR).exists();

        if exists && config.error_if_exists {
            return Err(DbError::AlreadyExists(root.display().to_string()));
        }
        if !root.exists() {
            if !config.create_if_missing {
                return Err(DbError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("database directory '{}' does not exist", root.display()),
                )));
            }
            fs::create_dir_all(&root)?;
        }
        fs::create_dir_all(root.join(TYPES_DIR))?;

        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(root.join(LOCK_FILE))?;
        lock.try_lock_exclusive()
            .map_err(|_| DbError::DatabaseLocked(root.display().to_string()))?;

        Ok(Self { root, lock })
    }

    /// The database root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the fixed-record file for a type.
    #[must_use]
    pub fn type_file(&self, type_name: &str) -> PathBuf {
        self.root
            .join(TYPES_DIR)
            .join(format!("{}.{TYPE_EXT}", sanitize(type_name)))
    }

    /// Temporary path used while rewriting a type file during compaction or
    /// migration; renamed over [`Self::type_file`] on success.
    #[must_use]
    pub fn type_file_rewrite(&self, type_name: &str) -> PathBuf {
        self.root
            .join(TYPES_DIR)
            .join(format!("{}.{TYPE_EXT}.rewrite", sanitize(type_name)))
    }

    /// Path of the shared raw pool.
    #[must_use]
    pub fn pool_file(&self) -> PathBuf {
        self.root.join(POOL_FILE)
    }

    /// Temporary path used while rewriting the pool during compaction.
    #[must_use]
    pub fn pool_file_rewrite(&self) -> PathBuf {
        self.root.join(format!("{POOL_FILE}.rewrite"))
    }

    /// Path of the undo log.
    #[must_use]
    pub fn log_file(&self) -> PathBuf {
        self.root.join(LOG_FILE)
    }

    /// Lists the type files present in the directory.
    ///
    /// # Errors
    ///
    /// Returns I/O errors from reading the types directory.
    pub fn list_type_files(&self) -> DbResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(self.root.join(TYPES_DIR))? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(TYPE_EXT) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

impl Drop for DatabaseDir {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.lock);
    }
}

/// Maps a type name onto a filesystem-safe file stem.
fn sanitize(type_name: &str) -> String {
    type_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
