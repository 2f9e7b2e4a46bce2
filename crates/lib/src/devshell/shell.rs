//! Shell detection and environment script generation

use std::env;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Supported shell types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shell {
  Bash,
  Zsh,
  Fish,
  Sh,
}

impl Shell {
  /// Detect the current shell from `$SHELL`, falling back to `sh`.
  pub fn detect() -> Self {
    env::var("SHELL")
      .ok()
      .and_then(|shell| {
        Path::new(&shell)
          .file_name()
          .and_then(|n| n.to_str())
          .map(|n| n.to_lowercase())
      })
      .map(|name| Self::from_name(&name))
      .unwrap_or(Shell::Sh)
  }

  /// Map a shell binary name to a shell; unknown names are treated as POSIX `sh`.
  pub fn from_name(name: &str) -> Self {
    if name.contains("zsh") {
      Shell::Zsh
    } else if name.contains("bash") {
      Shell::Bash
    } else if name.contains("fish") {
      Shell::Fish
    } else {
      Shell::Sh
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Shell::Bash => "bash",
      Shell::Zsh => "zsh",
      Shell::Fish => "fish",
      Shell::Sh => "sh",
    }
  }

  /// Generate an export statement for setting an environment variable
  pub fn export_var(&self, name: &str, value: &str) -> String {
    match self {
      Shell::Fish => format!("set -gx {} {}", name, quote(value)),
      Shell::Bash | Shell::Zsh | Shell::Sh => format!("export {}={}", name, quote(value)),
    }
  }

  pub fn comment(&self, text: &str) -> String {
    format!("# {}", text)
  }

  /// Generate the script header/shebang
  pub fn header(&self) -> &'static str {
    match self {
      Shell::Bash => "#!/usr/bin/env bash",
      Shell::Zsh => "#!/usr/bin/env zsh",
      Shell::Fish => "# Fish shell environment",
      Shell::Sh => "#!/bin/sh",
    }
  }
}

/// Single-quote `value`; both POSIX shells and fish take `'\''` as an escaped quote.
fn quote(value: &str) -> String {
  format!("'{}'", value.replace('\'', r"'\''"))
}

impl fmt::Display for Shell {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Shell {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "bash" => Ok(Shell::Bash),
      "zsh" => Ok(Shell::Zsh),
      "fish" => Ok(Shell::Fish),
      "sh" => Ok(Shell::Sh),
      other => Err(format!("unsupported shell: {}", other)),
    }
  }
}
