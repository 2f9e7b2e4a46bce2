use std::fmt;

use serde::{Deserialize, Serialize};

/// Operating systems in the platform matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Os {
  #[serde(rename = "linux")]
  Linux,
  #[serde(rename = "darwin")]
  MacOs,
}

impl Os {
  /// Detect the current operating system at runtime
  pub fn current() -> Option<Self> {
    match std::env::consts::OS {
      "linux" => Some(Self::Linux),
      "macos" => Some(Self::MacOs),
      _ => None,
    }
  }

  /// Parse an OS name as it appears in platform identifiers
  pub fn from_name(name: &str) -> Option<Self> {
    match name {
      "linux" => Some(Self::Linux),
      "darwin" => Some(Self::MacOs),
      _ => None,
    }
  }

  /// Returns the lowercase string identifier for this OS
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Linux => "linux",
      Self::MacOs => "darwin",
    }
  }

  /// Environment variable the dynamic loader reads for extra library directories
  pub fn library_path_var(&self) -> &'static str {
    match self {
      Self::Linux => "LD_LIBRARY_PATH",
      Self::MacOs => "DYLD_LIBRARY_PATH",
    }
  }
}

impl fmt::Display for Os {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}
