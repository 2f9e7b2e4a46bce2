//! Which files of a source tree are relevant to a build.

use std::fs;
use std::io;
use std::path::Path;

use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};

use super::FingerprintError;
use crate::config::SourceSection;
use crate::consts::IGNORE_FILENAME;

const DEFAULT_INCLUDE: [&str; 4] = ["**/Cargo.toml", "Cargo.lock", "**/*.rs", ".cargo/config.toml"];

const DEFAULT_EXCLUDE: [&str; 4] = ["target", ".git", ".fanout", "result*"];

/// Include and exclude globs over `/`-separated paths relative to the root.
///
/// A path is relevant when it matches an include pattern and neither it nor
/// any of its parent directories matches an exclude pattern.
#[derive(Debug, Clone)]
pub struct SourceFilter {
  include: GlobSet,
  exclude: GlobSet,
}

impl SourceFilter {
  /// Default patterns plus `include` and `exclude`.
  pub fn new(include: &[String], exclude: &[String]) -> Result<Self, FingerprintError> {
    let mut inc = GlobSetBuilder::new();
    for pattern in DEFAULT_INCLUDE.iter().copied().chain(include.iter().map(String::as_str)) {
      inc.add(glob(pattern)?);
    }

    let mut exc = GlobSetBuilder::new();
    for pattern in DEFAULT_EXCLUDE.iter().copied().chain(exclude.iter().map(String::as_str)) {
      add_exclude(&mut exc, pattern)?;
    }

    Ok(Self {
      include: inc.build().map_err(|source| FingerprintError::Pattern {
        pattern: "<include>".to_string(),
        source,
      })?,
      exclude: exc.build().map_err(|source| FingerprintError::Pattern {
        pattern: "<exclude>".to_string(),
        source,
      })?,
    })
  }

  /// Filter for the project at `root`: defaults, `[source]` from
  /// `fanout.toml`, and the patterns in `.fanoutignore`.
  pub fn for_project(root: &Path, section: &SourceSection) -> Result<Self, FingerprintError> {
    let mut exclude = section.exclude.clone();
    exclude.extend(read_ignore_file(&root.join(IGNORE_FILENAME))?);
    Self::new(&section.include, &exclude)
  }

  /// Whether `rel` (and so everything beneath it) is excluded.
  pub fn is_excluded(&self, rel: &str) -> bool {
    self.exclude.is_match(rel)
  }

  /// Whether the file at `rel` contributes to the fingerprint.
  pub fn is_included(&self, rel: &str) -> bool {
    self.include.is_match(rel) && !self.is_excluded(rel)
  }
}

fn glob(pattern: &str) -> Result<Glob, FingerprintError> {
  GlobBuilder::new(pattern)
    .literal_separator(true)
    .build()
    .map_err(|source| FingerprintError::Pattern {
      pattern: pattern.to_string(),
      source,
    })
}

/// Exclude a pattern and everything below anything it matches.
fn add_exclude(builder: &mut GlobSetBuilder, pattern: &str) -> Result<(), FingerprintError> {
  let pattern = pattern.trim_start_matches('/').trim_end_matches('/');
  builder.add(glob(pattern)?);
  builder.add(glob(&format!("{}/**", pattern))?);
  Ok(())
}

fn read_ignore_file(path: &Path) -> Result<Vec<String>, FingerprintError> {
  let content = match fs::read_to_string(path) {
    Ok(content) => content,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
    Err(source) => {
      return Err(FingerprintError::Read {
        path: path.to_path_buf(),
        source,
      });
    }
  };
  Ok(
    content
      .lines()
      .map(str::trim)
      .filter(|line| !line.is_empty() && !line.starts_with('#'))
      .map(str::to_string)
      .collect(),
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn default_patterns() {
    let filter = SourceFilter::new(&[], &[]).unwrap();
    assert!(filter.is_included("Cargo.toml"));
    assert!(filter.is_included("crates/core/Cargo.toml"));
    assert!(filter.is_included("Cargo.lock"));
    assert!(filter.is_included("src/main.rs"));
    assert!(filter.is_included("build.rs"));
    assert!(filter.is_included(".cargo/config.toml"));

    assert!(!filter.is_included("README.md"));
    assert!(!filter.is_included("crates/core/Cargo.lock"));
    assert!(!filter.is_included("target/debug/build/foo/out/gen.rs"));
    assert!(filter.is_excluded("target"));
    assert!(filter.is_excluded(".git"));
    assert!(filter.is_excluded("result-static"));
    assert!(!filter.is_excluded("src/result.rs"));
  }

  #[test]
  fn exclusion_wins_over_inclusion() {
    let filter = SourceFilter::new(&["assets/**".to_string()], &["assets/big".to_string()]).unwrap();
    assert!(filter.is_included("assets/logo.svg"));
    assert!(!filter.is_included("assets/big/blob.bin"));
    assert!(filter.is_excluded("assets/big"));
  }

  #[test]
  fn ignore_file_patterns_apply() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join(IGNORE_FILENAME), "# generated\n\nsrc/gen/\nbenches\n").unwrap();

    let filter = SourceFilter::for_project(temp.path(), &SourceSection::default()).unwrap();
    assert!(!filter.is_included("src/gen/bindings.rs"));
    assert!(!filter.is_included("benches/throughput.rs"));
    assert!(filter.is_included("src/lib.rs"));
  }

  #[test]
  fn invalid_pattern_is_reported() {
    let err = SourceFilter::new(&["src/[".to_string()], &[]).unwrap_err();
    assert!(matches!(err, FingerprintError::Pattern { pattern, .. } if pattern == "src/["));
  }
}
