//! Advisory store locking.
//!
//! Builds and resolutions hold a shared lock while they write entries; garbage
//! collection holds an exclusive one so it never deletes an entry mid-build.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ArtifactStore;

const LOCK_FILENAME: &str = ".lock";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
  Shared,
  Exclusive,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LockMetadata {
  pub version: u32,
  pub pid: u32,
  pub started_at_unix: u64,
  pub command: String,
  pub store: PathBuf,
}

#[derive(Debug, Error)]
pub enum StoreLockError {
  #[error(
    "Store is locked by another process: {command} (PID {pid}, started {started_at})\n\
             If you're sure no fanout process is running, remove the lock file:\n  {lock_path}"
  )]
  Contention {
    command: String,
    pid: u32,
    started_at: String,
    lock_path: PathBuf,
  },

  #[error(
    "Store is locked (could not read lock metadata)\n\
             If you're sure no fanout process is running, remove the lock file:\n  {lock_path}"
  )]
  ContentionUnknown { lock_path: PathBuf },

  #[error("Failed to create store directory: {0}")]
  CreateDir(#[source] io::Error),

  #[error("Failed to open lock file: {0}")]
  OpenFile(#[source] io::Error),

  #[error("Failed to write lock metadata: {0}")]
  WriteMetadata(#[source] io::Error),

  #[error("Failed to acquire lock: {0}")]
  LockFailed(#[source] io::Error),
}

/// A held store lock, released on drop.
pub struct StoreLock {
  file: File,
  lock_path: PathBuf,
}

impl StoreLock {
  /// Try to take the lock without blocking.
  pub fn acquire(store: &ArtifactStore, mode: LockMode, command: &str) -> Result<Self, StoreLockError> {
    let root = store.root();
    let lock_path = root.join(LOCK_FILENAME);

    if !root.exists() {
      std::fs::create_dir_all(root).map_err(StoreLockError::CreateDir)?;
    }

    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(&lock_path)
      .map_err(StoreLockError::OpenFile)?;

    if let Err(err) = try_lock(&file, mode) {
      if err.kind() == io::ErrorKind::WouldBlock {
        return Err(Self::read_contention_error(&lock_path));
      }
      return Err(StoreLockError::LockFailed(err));
    }

    if mode == LockMode::Exclusive {
      Self::write_metadata(&file, command, root)?;
    }

    Ok(StoreLock { file, lock_path })
  }

  /// Reads the lock metadata through the held file handle.
  pub fn read_metadata(&self) -> io::Result<LockMetadata> {
    use std::io::{Seek, SeekFrom};

    let mut file = &self.file;
    file.seek(SeekFrom::Start(0))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    serde_json::from_str(&contents).map_err(io::Error::other)
  }

  pub fn lock_path(&self) -> &Path {
    &self.lock_path
  }

  fn write_metadata(file: &File, command: &str, store: &Path) -> Result<(), StoreLockError> {
    let metadata = LockMetadata {
      version: 1,
      pid: std::process::id(),
      started_at_unix: SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs(),
      command: command.to_string(),
      store: store.to_path_buf(),
    };

    file.set_len(0).map_err(StoreLockError::WriteMetadata)?;
    let mut writer = io::BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &metadata)
      .map_err(|e| StoreLockError::WriteMetadata(io::Error::other(e)))?;
    writer.flush().map_err(StoreLockError::WriteMetadata)?;

    Ok(())
  }

  fn read_contention_error(lock_path: &Path) -> StoreLockError {
    if let Ok(mut file) = File::open(lock_path) {
      let mut contents = String::new();
      if file.read_to_string(&mut contents).is_ok()
        && let Ok(metadata) = serde_json::from_str::<LockMetadata>(&contents)
      {
        return StoreLockError::Contention {
          command: metadata.command,
          pid: metadata.pid,
          started_at: format!("Unix timestamp {}", metadata.started_at_unix),
          lock_path: lock_path.to_path_buf(),
        };
      }
    }

    StoreLockError::ContentionUnknown {
      lock_path: lock_path.to_path_buf(),
    }
  }
}

#[cfg(unix)]
fn try_lock(file: &File, mode: LockMode) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};
  use std::os::unix::io::AsFd;

  let operation = match mode {
    LockMode::Shared => FlockOperation::NonBlockingLockShared,
    LockMode::Exclusive => FlockOperation::NonBlockingLockExclusive,
  };

  flock(file.as_fd(), operation).map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

#[cfg(not(unix))]
fn try_lock(_file: &File, _mode: LockMode) -> io::Result<()> {
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn acquire_exclusive_lock_writes_metadata() {
    let temp = TempDir::new().unwrap();
    let store = ArtifactStore::new(temp.path().join("store"));

    let lock = StoreLock::acquire(&store, LockMode::Exclusive, "gc").unwrap();
    assert!(lock.lock_path().exists());

    let metadata = lock.read_metadata().unwrap();
    assert_eq!(metadata.version, 1);
    assert_eq!(metadata.command, "gc");
    assert_eq!(metadata.pid, std::process::id());
  }

  #[test]
  fn multiple_shared_locks() {
    let temp = TempDir::new().unwrap();
    let store = ArtifactStore::new(temp.path());

    let lock1 = StoreLock::acquire(&store, LockMode::Shared, "build").unwrap();
    let lock2 = StoreLock::acquire(&store, LockMode::Shared, "build").unwrap();
    assert_eq!(lock1.lock_path(), lock2.lock_path());
  }

  #[cfg(unix)]
  #[test]
  fn exclusive_lock_conflicts_with_shared() {
    let temp = TempDir::new().unwrap();
    let store = ArtifactStore::new(temp.path());

    let _shared = StoreLock::acquire(&store, LockMode::Shared, "build").unwrap();
    let result = StoreLock::acquire(&store, LockMode::Exclusive, "gc");
    assert!(matches!(
      result,
      Err(StoreLockError::Contention { .. } | StoreLockError::ContentionUnknown { .. })
    ));
  }

  #[test]
  fn lock_released_on_drop() {
    let temp = TempDir::new().unwrap();
    let store = ArtifactStore::new(temp.path());
    {
      let _lock = StoreLock::acquire(&store, LockMode::Exclusive, "first").unwrap();
    }
    let lock = StoreLock::acquire(&store, LockMode::Exclusive, "second").unwrap();
    assert_eq!(lock.read_metadata().unwrap().command, "second");
  }
}
