//! Host platforms and the fixed platform matrix.
//!
//! A [`Platform`] pairs an [`Arch`] with an [`Os`]. Exactly four platforms are
//! supported; [`matrix::supported_platforms`] lists them in a fixed order.

pub mod arch;
pub mod matrix;
pub mod os;
pub mod paths;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use arch::Arch;
pub use matrix::{for_each, supported_platforms};
pub use os::Os;

/// A platform identifier outside the supported matrix.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported platform: {0}")]
pub struct UnsupportedPlatform(pub String);

/// Platform identifier combining architecture and OS (e.g., "aarch64-darwin")
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Platform {
  pub arch: Arch,
  pub os: Os,
}

impl Platform {
  /// Create a new platform identifier
  pub fn new(arch: Arch, os: Os) -> Self {
    Self { arch, os }
  }

  /// Detect the current platform at runtime
  ///
  /// Returns `None` if the OS or architecture is not supported
  pub fn current() -> Option<Self> {
    Some(Self {
      arch: Arch::current()?,
      os: Os::current()?,
    })
  }

  /// Returns the platform triple string (e.g., "aarch64-darwin")
  pub fn triple(&self) -> String {
    format!("{}-{}", self.arch, self.os)
  }

  /// Native Rust target triple for this platform.
  pub fn rust_triple(&self) -> String {
    match self.os {
      Os::Linux => format!("{}-unknown-linux-gnu", self.arch),
      Os::MacOs => format!("{}-apple-darwin", self.arch),
    }
  }

  /// Target triple of the statically linked musl build.
  ///
  /// Darwin hosts cross-compile to Linux, so this is the same for both OSes.
  pub fn musl_triple(&self) -> String {
    format!("{}-unknown-linux-musl", self.arch)
  }
}

impl fmt::Display for Platform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.triple())
  }
}

impl FromStr for Platform {
  type Err = UnsupportedPlatform;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (arch, os) = s.split_once('-').ok_or_else(|| UnsupportedPlatform(s.to_string()))?;
    match (Arch::from_name(arch), Os::from_name(os)) {
      (Some(arch), Some(os)) => Ok(Self { arch, os }),
      _ => Err(UnsupportedPlatform(s.to_string())),
    }
  }
}

impl TryFrom<String> for Platform {
  type Error = UnsupportedPlatform;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<Platform> for String {
  fn from(platform: Platform) -> Self {
    platform.triple()
  }
}

/// Returns the platform triple for the current system (e.g., "aarch64-darwin")
///
/// Returns `None` if the current platform is not supported
pub fn platform_triple() -> Option<String> {
  Platform::current().map(|p| p.triple())
}
