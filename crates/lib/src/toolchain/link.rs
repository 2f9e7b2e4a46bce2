//! Materializing component trees into one bundle.
//!
//! A bundle is a real directory tree. Files are hard-linked from their
//! component tree, or copied when the store lives on another filesystem.
//! rustc locates its sysroot from the canonical path of its own executable,
//! so `bin/rustc` and `lib/rustlib/<triple>` must resolve inside the bundle.
//! Symlinks inside a component are reproduced as they are. When two trees
//! provide the same file, the earlier tree wins.

use std::fs;
use std::io;
use std::path::Path;

use tracing::{trace, warn};

use super::source::ComponentTree;
use crate::store::symlink;
use crate::util::hash::portable_rel_path;

/// Paths no component of a bundle needs; rustup installs the docs here.
const SKIPPED: &[&str] = &["share/doc"];

pub(super) fn join_trees(trees: &[ComponentTree], dest: &Path) -> io::Result<()> {
  for tree in trees {
    let root = dunce::canonicalize(&tree.root)?;
    trace!(component = %tree.label, root = ?root, "joining tree");
    merge_dir(&root, &root, dest, &tree.label)?;
  }
  Ok(())
}

fn merge_dir(root: &Path, src: &Path, dest: &Path, label: &str) -> io::Result<()> {
  let mut entries = fs::read_dir(src)?.collect::<Result<Vec<_>, _>>()?;
  entries.sort_by_key(|e| e.file_name());

  for entry in entries {
    let from = entry.path();
    let rel = portable_rel_path(&from, root);
    if SKIPPED.contains(&rel.as_str()) {
      trace!(path = %rel, "skipping");
      continue;
    }
    let to = dest.join(entry.file_name());
    let file_type = entry.file_type()?;

    let existing = match fs::symlink_metadata(&to) {
      Ok(meta) => Some(meta),
      Err(e) if e.kind() == io::ErrorKind::NotFound => None,
      Err(e) => return Err(e),
    };

    match existing {
      None if file_type.is_dir() => {
        fs::create_dir(&to)?;
        merge_dir(root, &from, &to, label)?;
      }
      Some(meta) if file_type.is_dir() && meta.is_dir() => merge_dir(root, &from, &to, label)?,
      None if file_type.is_symlink() => symlink(&fs::read_link(&from)?, &to)?,
      None if file_type.is_file() => link_or_copy(&from, &to)?,
      None => {}
      Some(_) => warn!(
        path = %rel,
        component = %label,
        "conflicting entry in toolchain components, keeping the first"
      ),
    }
  }
  Ok(())
}

fn link_or_copy(from: &Path, to: &Path) -> io::Result<()> {
  if let Err(e) = fs::hard_link(from, to) {
    trace!(from = ?from, error = %e, "hard link failed, copying");
    fs::copy(from, to)?;
  }
  Ok(())
}
