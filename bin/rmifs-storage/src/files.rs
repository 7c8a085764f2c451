//! Local file access
//!
//! All operations run under one mutex, so a read never observes half of a
//! concurrent write and a delete never races a create below it.

use bytes::Bytes;
use parking_lot::Mutex;
use rmifs_common::{FsError, Path, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Directory below the root holding partially copied files
const STAGING_DIR: &str = ".rmifs-staging";

/// Files under a local root directory, addressed by service path
#[derive(Debug)]
pub struct LocalFiles {
    root: PathBuf,
    guard: Mutex<()>,
    staged: AtomicU64,
}

impl LocalFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            guard: Mutex::new(()),
            staged: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    /// Fail with not-found unless the root is an existing directory
    pub fn check_root(&self) -> Result<()> {
        if self.root.is_dir() {
            Ok(())
        } else {
            Err(FsError::NotFound(format!(
                "{} is not a directory",
                self.root.display()
            )))
        }
    }

    /// Every file below the root, leaving out copies in progress
    pub fn list(&self) -> Result<Vec<Path>> {
        let staging = Path::root().child(STAGING_DIR)?;
        let _guard = self.guard.lock();
        Ok(Path::list(&self.root)?
            .into_iter()
            .filter(|file| !file.is_subpath(&staging))
            .collect())
    }

    pub fn size(&self, file: &Path) -> Result<u64> {
        let _guard = self.guard.lock();
        Ok(self.regular_file(file)?.len())
    }

    pub fn read(&self, file: &Path, offset: u64, length: u32) -> Result<Bytes> {
        let _guard = self.guard.lock();
        let size = self.regular_file(file)?.len();
        if offset.checked_add(u64::from(length)).is_none_or(|end| end > size) {
            return Err(FsError::IndexOutOfBounds(format!(
                "{offset}+{length} outside {file} of length {size}"
            )));
        }

        let mut handle = File::open(file.to_local(&self.root))?;
        handle.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; length as usize];
        handle.read_exact(&mut buf)?;
        Ok(Bytes::from(buf))
    }

    /// Write `data` at `offset`, extending the file as needed
    pub fn write(&self, file: &Path, offset: u64, data: &[u8]) -> Result<()> {
        let _guard = self.guard.lock();
        self.regular_file(file)?;

        let mut handle = OpenOptions::new()
            .write(true)
            .open(file.to_local(&self.root))?;
        handle.seek(SeekFrom::Start(offset))?;
        handle.write_all(data)?;
        Ok(())
    }

    /// Create an empty file and any missing parent directory
    ///
    /// Returns `false` for the root, an existing path, or a parent that
    /// cannot be made a directory.
    pub fn create(&self, file: &Path) -> bool {
        let _guard = self.guard.lock();
        match self.create_locked(file, false) {
            Ok(created) => created,
            Err(e) => {
                debug!("Could not create {}: {}", file, e);
                false
            }
        }
    }

    /// Create an empty staging file for a copy in progress
    ///
    /// Staging files live under a reserved directory below the root that
    /// [`LocalFiles::list`] never reports.
    pub fn stage(&self) -> Result<Path> {
        let name = format!("copy-{}", self.staged.fetch_add(1, Ordering::Relaxed));
        let staged = Path::root().child(STAGING_DIR)?.child(&name)?;
        let _guard = self.guard.lock();
        if self.create_locked(&staged, true)? {
            Ok(staged)
        } else {
            Err(FsError::illegal_state(format!("cannot stage {staged}")))
        }
    }

    /// Move a fully written staging file to `file`, replacing whatever is
    /// at its position
    pub fn commit(&self, staged: &Path, file: &Path) -> Result<()> {
        let Some(parent) = file.parent() else {
            return Err(FsError::illegal_argument("cannot replace the root directory"));
        };
        let _guard = self.guard.lock();
        self.remove_locked(file)?;
        fs::create_dir_all(parent.to_local(&self.root))?;
        fs::rename(staged.to_local(&self.root), file.to_local(&self.root))?;
        Ok(())
    }

    /// Delete a file or directory tree, then any directory left empty
    ///
    /// Returns `false` for the root or a missing path.
    pub fn delete(&self, path: &Path) -> bool {
        let _guard = self.guard.lock();
        if path.is_root() {
            return false;
        }
        let deleted = match self.remove_locked(path) {
            Ok(deleted) => deleted,
            Err(e) => {
                debug!("Could not delete {}: {}", path, e);
                false
            }
        };
        self.prune_locked();
        deleted
    }

    /// Remove every directory below the root that holds no file
    pub fn prune_empty_dirs(&self) {
        let _guard = self.guard.lock();
        self.prune_locked();
    }

    fn regular_file(&self, file: &Path) -> Result<fs::Metadata> {
        let metadata = fs::metadata(file.to_local(&self.root))
            .map_err(|_| FsError::not_found(file))?;
        if metadata.is_dir() {
            return Err(FsError::not_found(file));
        }
        Ok(metadata)
    }

    fn create_locked(&self, file: &Path, truncate: bool) -> io::Result<bool> {
        let Some(parent) = file.parent() else {
            return Ok(false);
        };
        fs::create_dir_all(parent.to_local(&self.root))?;

        let mut options = OpenOptions::new();
        options.write(true);
        if truncate {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }
        match options.open(file.to_local(&self.root)) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn remove_locked(&self, path: &Path) -> io::Result<bool> {
        let local = path.to_local(&self.root);
        match fs::symlink_metadata(&local) {
            Ok(metadata) if metadata.is_dir() => fs::remove_dir_all(&local)?,
            Ok(_) => fs::remove_file(&local)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e),
        }
        Ok(true)
    }

    fn prune_locked(&self) {
        if let Err(e) = remove_empty_dirs(&self.root, true) {
            debug!("Pruning empty directories under {} failed: {}", self.root.display(), e);
        }
    }
}

/// Returns whether `dir` was removed; the root itself is always kept
fn remove_empty_dirs(dir: &std::path::Path, keep: bool) -> io::Result<bool> {
    let mut empty = true;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            if !remove_empty_dirs(&entry.path(), false)? {
                empty = false;
            }
        } else {
            empty = false;
        }
    }
    if empty && !keep {
        fs::remove_dir(dir)?;
        return Ok(true);
    }
    Ok(false)
}
