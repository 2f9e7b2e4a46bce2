//! Content-addressed store for toolchain bundles and build artifacts.
//!
//! # Layout
//!
//! ```text
//! store/
//! ├── build/<key>/            # Build artifacts (immutable, keyed by descriptor hash)
//! │   ├── bin/<binary>
//! │   └── .fanout-complete
//! ├── toolchain/<key>/        # Composed toolchain bundles (keyed by spec + platform)
//! ├── roots/<hash>            # GC roots: symlinks to `result` links
//! ├── tmp/                    # In-progress entries, renamed into place when complete
//! └── .lock
//! ```
//!
//! Entries are only ever published by renaming a fully written temp directory,
//! so readers observe an entry either complete or absent.

pub mod gc;
pub mod lock;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, warn};

use crate::consts::COMPLETE_MARKER;
use crate::platform::paths::store_dir;
use crate::util::hash::{DirHashError, ObjectHash, hash_bytes};

/// Errors from reading or writing the store.
///
/// A store error never means the source failed to compile.
#[derive(Debug, Error)]
pub enum StoreError {
  #[error("store I/O error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("invalid marker in {path}: {message}")]
  Marker { path: PathBuf, message: String },

  #[error("failed to hash store entry: {0}")]
  Hash(#[from] DirHashError),

  #[error("store entry {path} exists but is incomplete")]
  Conflict { path: PathBuf },
}

impl StoreError {
  pub(crate) fn io(path: &Path, source: io::Error) -> Self {
    StoreError::Io {
      path: path.to_path_buf(),
      source,
    }
  }
}

/// Kinds of entries kept in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
  Build,
  Toolchain,
}

impl EntryKind {
  pub fn dir_name(&self) -> &'static str {
    match self {
      EntryKind::Build => "build",
      EntryKind::Toolchain => "toolchain",
    }
  }
}

/// Outcome of publishing a temp directory into the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Published {
  /// This writer's directory was renamed into place.
  Installed,
  /// Another writer published a complete entry first; ours was discarded.
  AlreadyPresent,
}

/// Handle to a store rooted at a directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
  root: PathBuf,
}

impl ArtifactStore {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  /// Store at `FANOUT_STORE` or the default data directory.
  pub fn open_default() -> Self {
    Self::new(store_dir())
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn kind_dir(&self, kind: EntryKind) -> PathBuf {
    self.root.join(kind.dir_name())
  }

  pub fn entry_path(&self, kind: EntryKind, key: &ObjectHash) -> PathBuf {
    self.kind_dir(kind).join(&key.0)
  }

  pub fn tmp_dir(&self) -> PathBuf {
    self.root.join("tmp")
  }

  pub fn roots_dir(&self) -> PathBuf {
    self.root.join("roots")
  }

  /// Create a fresh temp directory inside the store for building an entry.
  ///
  /// It lives on the same filesystem as the final location so publishing is a
  /// rename. It is removed on drop unless published.
  pub fn temp_entry(&self, key: &ObjectHash) -> Result<TempDir, StoreError> {
    let tmp = self.tmp_dir();
    fs::create_dir_all(&tmp).map_err(|e| StoreError::io(&tmp, e))?;
    tempfile::Builder::new()
      .prefix(&format!("{}.", key.0))
      .tempdir_in(&tmp)
      .map_err(|e| StoreError::io(&tmp, e))
  }

  /// Atomically move a complete temp directory to its final location.
  ///
  /// If another writer already published the same key, the existing entry is
  /// kept when it carries a completion marker.
  pub fn publish(&self, tmp: TempDir, kind: EntryKind, key: &ObjectHash) -> Result<Published, StoreError> {
    let dest = self.entry_path(kind, key);
    let parent = self.kind_dir(kind);
    fs::create_dir_all(&parent).map_err(|e| StoreError::io(&parent, e))?;

    let staged = tmp.keep();
    match fs::rename(&staged, &dest) {
      Ok(()) => {
        debug!(path = ?dest, "published store entry");
        Ok(Published::Installed)
      }
      Err(e) if dest.exists() => {
        let _ = fs::remove_dir_all(&staged);
        if is_complete(&dest) {
          debug!(path = ?dest, "entry published concurrently, reusing it");
          Ok(Published::AlreadyPresent)
        } else {
          warn!(path = ?dest, error = %e, "destination exists without marker");
          Err(StoreError::Conflict { path: dest })
        }
      }
      Err(e) => {
        let _ = fs::remove_dir_all(&staged);
        Err(StoreError::io(&dest, e))
      }
    }
  }

  /// Remove an entry that is incomplete or failed verification.
  pub fn evict(&self, kind: EntryKind, key: &ObjectHash) -> Result<(), StoreError> {
    let path = self.entry_path(kind, key);
    match fs::remove_dir_all(&path) {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(StoreError::io(&path, e)),
    }
  }

  /// Register `link` (a `result` symlink pointing into the store) as a GC root.
  pub fn add_root(&self, link: &Path) -> Result<PathBuf, StoreError> {
    let roots = self.roots_dir();
    fs::create_dir_all(&roots).map_err(|e| StoreError::io(&roots, e))?;

    let link = dunce::canonicalize(link.parent().unwrap_or(Path::new(".")))
      .map(|dir| dir.join(link.file_name().unwrap_or_default()))
      .map_err(|e| StoreError::io(link, e))?;
    let name = hash_bytes(link.to_string_lossy().as_bytes()).0[..20].to_string();
    let root_path = roots.join(name);

    replace_symlink(&link, &root_path).map_err(|e| StoreError::io(&root_path, e))?;
    Ok(root_path)
  }
}

/// Whether a store entry directory carries a completion marker.
pub fn is_complete(entry: &Path) -> bool {
  entry.join(COMPLETE_MARKER).is_file()
}

/// Write a completion marker as JSON.
pub fn write_marker<T: Serialize>(entry: &Path, marker: &T) -> Result<(), StoreError> {
  let path = entry.join(COMPLETE_MARKER);
  let content = serde_json::to_string(marker).map_err(|e| StoreError::Marker {
    path: path.clone(),
    message: e.to_string(),
  })?;
  fs::write(&path, format!("{}\n", content)).map_err(|e| StoreError::io(&path, e))
}

/// Read a completion marker.
///
/// Returns `None` if the marker doesn't exist.
pub fn read_marker<T: DeserializeOwned>(entry: &Path) -> Result<Option<T>, StoreError> {
  let path = entry.join(COMPLETE_MARKER);
  let content = match fs::read_to_string(&path) {
    Ok(c) => c,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
    Err(e) => return Err(StoreError::io(&path, e)),
  };
  serde_json::from_str(&content).map(Some).map_err(|e| StoreError::Marker {
    path,
    message: e.to_string(),
  })
}

/// Point `link` at `target`, replacing whatever symlink was there.
pub fn replace_symlink(target: &Path, link: &Path) -> io::Result<()> {
  match fs::symlink_metadata(link) {
    Ok(meta) if meta.file_type().is_symlink() => fs::remove_file(link)?,
    Ok(_) => {
      return Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("{} exists and is not a symlink", link.display()),
      ));
    }
    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
    Err(e) => return Err(e),
  }
  symlink(target, link)
}

#[cfg(unix)]
pub(crate) fn symlink(target: &Path, link: &Path) -> io::Result<()> {
  std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
pub(crate) fn symlink(target: &Path, link: &Path) -> io::Result<()> {
  if target.is_dir() {
    std::os::windows::fs::symlink_dir(target, link)
  } else {
    std::os::windows::fs::symlink_file(target, link)
  }
}
