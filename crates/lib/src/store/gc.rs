//! Garbage collection for the store.
//!
//! Live build entries are those reachable from a GC root: a symlink in
//! `<store>/roots/` pointing at a `result` link that itself points into
//! `<store>/build/<key>`. Toolchain bundles are kept unless incomplete. Temp
//! leftovers are always removed.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::{ArtifactStore, EntryKind, StoreError, is_complete};

#[derive(Debug, Default, Serialize)]
pub struct GcStats {
  pub builds_scanned: usize,
  pub builds_deleted: usize,
  pub toolchains_deleted: usize,
  pub temp_deleted: usize,
  pub roots_pruned: usize,
  pub bytes_freed: u64,
}

impl GcStats {
  pub fn total_deleted(&self) -> usize {
    self.builds_deleted + self.toolchains_deleted + self.temp_deleted
  }
}

#[derive(Debug, Serialize)]
pub struct GcResult {
  pub stats: GcStats,
  pub deleted_paths: Vec<PathBuf>,
}

fn dir_size(path: &Path) -> u64 {
  WalkDir::new(path)
    .into_iter()
    .filter_map(|e| e.ok())
    .filter(|e| e.file_type().is_file())
    .filter_map(|e| e.metadata().ok())
    .map(|m| m.len())
    .sum()
}

/// Resolve GC roots to the set of live build keys, pruning dangling roots.
fn collect_live_builds(store: &ArtifactStore, dry_run: bool, stats: &mut GcStats) -> Result<HashSet<String>, StoreError> {
  let mut live = HashSet::new();
  let roots = store.roots_dir();
  if !roots.exists() {
    return Ok(live);
  }

  let build_dir = store.kind_dir(EntryKind::Build);
  let entries = fs::read_dir(&roots).map_err(|e| StoreError::io(&roots, e))?;

  for entry in entries {
    let entry = entry.map_err(|e| StoreError::io(&roots, e))?;
    let root = entry.path();

    let key = fs::read_link(&root)
      .ok()
      .and_then(|result_link| fs::read_link(result_link).ok())
      .and_then(|target| build_key_of(&target, &build_dir));

    match key {
      Some(key) => {
        debug!(root = ?root, key = %key, "live root");
        live.insert(key);
      }
      None => {
        debug!(root = ?root, "pruning dangling root");
        stats.roots_pruned += 1;
        if !dry_run {
          fs::remove_file(&root).map_err(|e| StoreError::io(&root, e))?;
        }
      }
    }
  }

  Ok(live)
}

/// Extract `<key>` from a path of the form `<build_dir>/<key>/...`.
fn build_key_of(target: &Path, build_dir: &Path) -> Option<String> {
  let rel = target.strip_prefix(build_dir).ok()?;
  rel
    .components()
    .next()
    .map(|c| c.as_os_str().to_string_lossy().to_string())
}

fn remove_entry(path: &Path, dry_run: bool, deleted: &mut Vec<PathBuf>) -> Result<u64, StoreError> {
  let size = dir_size(path);
  if !dry_run {
    fs::remove_dir_all(path).map_err(|e| StoreError::io(path, e))?;
  }
  deleted.push(path.to_path_buf());
  Ok(size)
}

/// Collect garbage. The caller must hold an exclusive [`super::lock::StoreLock`].
pub fn collect_garbage(store: &ArtifactStore, dry_run: bool) -> Result<GcResult, StoreError> {
  let mut stats = GcStats::default();
  let mut deleted_paths = Vec::new();

  let live = collect_live_builds(store, dry_run, &mut stats)?;

  let build_dir = store.kind_dir(EntryKind::Build);
  if build_dir.exists() {
    for entry in fs::read_dir(&build_dir).map_err(|e| StoreError::io(&build_dir, e))? {
      let path = entry.map_err(|e| StoreError::io(&build_dir, e))?.path();
      stats.builds_scanned += 1;

      let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
      if live.contains(&name) && is_complete(&path) {
        continue;
      }
      stats.bytes_freed += remove_entry(&path, dry_run, &mut deleted_paths)?;
      stats.builds_deleted += 1;
    }
  }

  let toolchain_dir = store.kind_dir(EntryKind::Toolchain);
  if toolchain_dir.exists() {
    for entry in fs::read_dir(&toolchain_dir).map_err(|e| StoreError::io(&toolchain_dir, e))? {
      let path = entry.map_err(|e| StoreError::io(&toolchain_dir, e))?.path();
      if is_complete(&path) {
        continue;
      }
      warn!(path = ?path, "removing incomplete toolchain bundle");
      stats.bytes_freed += remove_entry(&path, dry_run, &mut deleted_paths)?;
      stats.toolchains_deleted += 1;
    }
  }

  let tmp_dir = store.tmp_dir();
  if tmp_dir.exists() {
    for entry in fs::read_dir(&tmp_dir).map_err(|e| StoreError::io(&tmp_dir, e))? {
      let path = entry.map_err(|e| StoreError::io(&tmp_dir, e))?.path();
      stats.bytes_freed += remove_entry(&path, dry_run, &mut deleted_paths)?;
      stats.temp_deleted += 1;
    }
  }

  info!(
    builds_deleted = stats.builds_deleted,
    toolchains_deleted = stats.toolchains_deleted,
    temp_deleted = stats.temp_deleted,
    bytes_freed = stats.bytes_freed,
    dry_run,
    "garbage collection complete"
  );

  Ok(GcResult { stats, deleted_paths })
}
