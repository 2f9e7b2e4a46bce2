//! Toolchain resolution.
//!
//! A [`ToolchainSpec`] names a channel, optional pinned version, a component
//! set and extra cross-compilation targets. The [`ToolchainResolver`] turns it
//! into a [`ResolvedToolchain`]: a single bundle directory in the store that
//! joins every requested component tree, identified by a content hash.
//!
//! Where the component trees come from is the job of a [`ToolchainSource`];
//! see [`source::RustupSource`] and [`source::DistSource`].

mod link;
pub mod resolve;
pub mod source;

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::platform::Platform;
use crate::store::StoreError;
use crate::util::hash::{ContentHash, HashError};

pub use resolve::ToolchainResolver;
pub use source::{ComponentTree, ConfiguredSource, DistSource, Located, RustupSource, ToolchainSource};

/// Pieces a toolchain bundle can be composed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Component {
  Rustc,
  Cargo,
  Rustfmt,
  Clippy,
  RustAnalyzer,
  RustSrc,
  RustStd,
}

impl Component {
  pub const ALL: [Component; 7] = [
    Component::Rustc,
    Component::Cargo,
    Component::Rustfmt,
    Component::Clippy,
    Component::RustAnalyzer,
    Component::RustSrc,
    Component::RustStd,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      Component::Rustc => "rustc",
      Component::Cargo => "cargo",
      Component::Rustfmt => "rustfmt",
      Component::Clippy => "clippy",
      Component::RustAnalyzer => "rust-analyzer",
      Component::RustSrc => "rust-src",
      Component::RustStd => "rust-std",
    }
  }
}

impl fmt::Display for Component {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Component {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    // rustup spells some components with a `-preview` suffix
    let name = s.strip_suffix("-preview").unwrap_or(s);
    Component::ALL
      .into_iter()
      .find(|c| c.as_str() == name)
      .ok_or_else(|| format!("unknown toolchain component: {}", s))
  }
}

/// A requested toolchain, not yet resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolchainSpec {
  pub channel: String,
  pub version: Option<String>,
  pub components: BTreeSet<Component>,
  pub extra_targets: BTreeSet<String>,
}

impl Default for ToolchainSpec {
  fn default() -> Self {
    Self::channel("stable")
  }
}

impl ToolchainSpec {
  /// A spec for `channel` with the full default component set.
  pub fn channel(channel: &str) -> Self {
    Self {
      channel: channel.to_string(),
      version: None,
      components: Component::ALL.into_iter().collect(),
      extra_targets: BTreeSet::new(),
    }
  }

  pub fn with_version(mut self, version: &str) -> Self {
    self.version = Some(version.to_string());
    self
  }

  pub fn with_extra_target(mut self, triple: &str) -> Self {
    self.extra_targets.insert(triple.to_string());
    self
  }

  /// This spec plus the musl standard library needed by `platform`'s static build.
  ///
  /// Resolved as its own bundle, so a missing musl target only affects the
  /// static output.
  pub fn for_platform(&self, platform: Platform) -> Self {
    self.clone().with_extra_target(&platform.musl_triple())
  }

  /// Human-readable name, e.g. `stable` or `stable 1.80.0`.
  pub fn display_name(&self) -> String {
    match &self.version {
      Some(v) => format!("{} {}", self.channel, v),
      None => self.channel.clone(),
    }
  }
}

/// A toolchain bundle composed in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedToolchain {
  pub spec: ToolchainSpec,
  pub platform: Platform,
  /// Concrete version the source resolved the spec to.
  pub version: String,
  pub content_hash: ContentHash,
  pub path: PathBuf,
}

impl ResolvedToolchain {
  pub fn bin_dir(&self) -> PathBuf {
    self.path.join("bin")
  }

  /// Path of an executable inside the bundle.
  pub fn tool(&self, name: &str) -> PathBuf {
    self.bin_dir().join(name)
  }

  /// Standard library sources, for editor tooling.
  pub fn rust_src_path(&self) -> PathBuf {
    self.path.join("lib").join("rustlib").join("src").join("rust").join("library")
  }

  /// Whether the bundle carries a standard library for `triple`.
  pub fn has_target(&self, triple: &str) -> bool {
    target_lib_dir(&self.path, triple).is_dir()
  }
}

pub(crate) fn target_lib_dir(root: &Path, triple: &str) -> PathBuf {
  root.join("lib").join("rustlib").join(triple).join("lib")
}

/// Errors from resolving a toolchain.
#[derive(Debug, Error)]
pub enum ResolveError {
  /// The requested channel, version, component or target is unavailable.
  #[error("toolchain not found: {what} for {platform}")]
  NotFound { what: String, platform: Platform },

  #[error(transparent)]
  Store(#[from] StoreError),

  #[error("failed to compute toolchain key: {0}")]
  Hash(#[from] HashError),

  #[error("toolchain composition task failed: {0}")]
  Task(#[from] tokio::task::JoinError),
}

impl ResolveError {
  pub fn not_found(what: impl Into<String>, platform: Platform) -> Self {
    ResolveError::NotFound {
      what: what.into(),
      platform,
    }
  }
}
