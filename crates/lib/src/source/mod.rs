//! Source fingerprinting.
//!
//! A [`SourceSnapshot`] is the set of build-relevant files under a project
//! root together with their content hashes. Its [`SourceFingerprint`] depends
//! only on relative paths and file contents, so two checkouts of the same
//! commit fingerprint identically wherever they live and whatever their mtimes.

mod filter;
mod manifest;

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, trace};
use walkdir::WalkDir;

use crate::util::hash::{ContentHash, DirHashError, hash_bytes, hash_file, portable_rel_path};

pub use filter::SourceFilter;
pub use manifest::binary_name;

#[derive(Debug, Error)]
pub enum FingerprintError {
  #[error("no Cargo.toml at {root}")]
  MissingManifest { root: PathBuf },

  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to walk {root}: {message}")]
  Walk { root: PathBuf, message: String },

  #[error(transparent)]
  Hash(#[from] DirHashError),

  #[error("invalid source pattern '{pattern}': {source}")]
  Pattern {
    pattern: String,
    #[source]
    source: globset::Error,
  },

  #[error("invalid manifest {path}: {message}")]
  Manifest { path: PathBuf, message: String },

  #[error("failed to stage {path}: {source}")]
  Stage {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("{path} changed since it was fingerprinted (expected {expected}, found {actual})")]
  Modified {
    path: String,
    expected: ContentHash,
    actual: ContentHash,
  },
}

/// SHA-256 over the relevant files of a source tree, 64 hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceFingerprint(pub String);

impl SourceFingerprint {
  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for SourceFingerprint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// A relevant file, relative to the snapshot root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFile {
  pub path: String,
  pub hash: ContentHash,
}

/// The relevant files of a source tree at one point in time.
#[derive(Debug, Clone, Serialize)]
pub struct SourceSnapshot {
  pub root: PathBuf,
  pub files: Vec<SourceFile>,
  pub fingerprint: SourceFingerprint,
}

impl SourceSnapshot {
  /// Walk `root` and hash every file `filter` deems relevant.
  #[instrument(skip(filter))]
  pub fn scan(root: &Path, filter: &SourceFilter) -> Result<Self, FingerprintError> {
    if !root.join("Cargo.toml").is_file() {
      return Err(FingerprintError::MissingManifest {
        root: root.to_path_buf(),
      });
    }
    let root = dunce::canonicalize(root).map_err(|source| FingerprintError::Read {
      path: root.to_path_buf(),
      source,
    })?;

    let walker = WalkDir::new(&root)
      .follow_links(false)
      .sort_by_file_name()
      .into_iter()
      .filter_entry(|e| e.depth() == 0 || !filter.is_excluded(&portable_rel_path(e.path(), &root)));

    let mut files = Vec::new();
    for entry in walker {
      let entry = entry.map_err(|e| FingerprintError::Walk {
        root: root.clone(),
        message: e.to_string(),
      })?;
      // symlinks and special files never contribute
      if !entry.file_type().is_file() {
        continue;
      }
      let rel = portable_rel_path(entry.path(), &root);
      if !filter.is_included(&rel) {
        trace!(path = %rel, "skipping irrelevant file");
        continue;
      }
      let hash = hash_file(entry.path())?;
      files.push(SourceFile { path: rel, hash });
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));

    let fingerprint = fingerprint_files(&files);
    debug!(files = files.len(), fingerprint = %fingerprint, "scanned source tree");

    Ok(Self {
      root,
      files,
      fingerprint,
    })
  }

  /// Copy exactly the relevant files into `dest`.
  ///
  /// Every file is hashed as it is copied and must still match the snapshot,
  /// so the staged tree is always the one the fingerprint describes.
  pub fn stage(&self, dest: &Path) -> Result<(), FingerprintError> {
    for file in &self.files {
      let from = self.root.join(&file.path);
      let to = dest.join(&file.path);
      let content = fs::read(&from).map_err(|source| FingerprintError::Stage {
        path: from.clone(),
        source,
      })?;
      let actual = hash_bytes(&content);
      if actual != file.hash {
        return Err(FingerprintError::Modified {
          path: file.path.clone(),
          expected: file.hash.clone(),
          actual,
        });
      }

      if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(|source| FingerprintError::Stage {
          path: parent.to_path_buf(),
          source,
        })?;
      }
      fs::write(&to, &content).map_err(|source| FingerprintError::Stage { path: to.clone(), source })?;
      copy_permissions(&from, &to)?;
    }
    debug!(dest = ?dest, files = self.files.len(), "staged source");
    Ok(())
  }
}

/// Keep the executable bit of build scripts and helpers.
fn copy_permissions(from: &Path, to: &Path) -> Result<(), FingerprintError> {
  let stage_err = |source| FingerprintError::Stage {
    path: to.to_path_buf(),
    source,
  };
  let permissions = fs::metadata(from).map_err(stage_err)?.permissions();
  fs::set_permissions(to, permissions).map_err(stage_err)
}

fn fingerprint_files(files: &[SourceFile]) -> SourceFingerprint {
  let mut input = String::new();
  for file in files {
    input.push_str(&format!("F:{}:{}\n", file.path, file.hash.0));
  }
  SourceFingerprint(hash_bytes(input.as_bytes()).0)
}

/// Fingerprint the project at `root`.
pub fn fingerprint(root: &Path, filter: &SourceFilter) -> Result<SourceFingerprint, FingerprintError> {
  SourceSnapshot::scan(root, filter).map(|s| s.fingerprint)
}
