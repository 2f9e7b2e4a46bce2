//! The output surface: every (platform, output) pair and what became of it.

use std::collections::BTreeMap;
use std::fmt;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::build::BuildArtifact;
use crate::devshell::DevEnvironment;
use crate::platform::{Platform, UnsupportedPlatform};

/// Outputs every platform exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum OutputName {
  #[serde(rename = "default")]
  Default,
  #[serde(rename = "static")]
  Static,
  #[serde(rename = "devShell")]
  DevShell,
}

impl OutputName {
  pub const ALL: [OutputName; 3] = [OutputName::Default, OutputName::Static, OutputName::DevShell];

  pub fn as_str(&self) -> &'static str {
    match self {
      OutputName::Default => "default",
      OutputName::Static => "static",
      OutputName::DevShell => "devShell",
    }
  }

  /// Parse an output name, including its qualified aliases.
  pub fn parse(name: &str) -> Option<Self> {
    match name {
      "default" | "packages.default" => Some(OutputName::Default),
      "static" | "packages.static" => Some(OutputName::Static),
      "devShell" | "devshell" | "devShells.default" => Some(OutputName::DevShell),
      _ => None,
    }
  }

  /// Which group the output is listed under, and its name within the group.
  fn qualified(&self) -> (&'static str, &'static str) {
    match self {
      OutputName::Default => ("packages", "default"),
      OutputName::Static => ("packages", "static"),
      OutputName::DevShell => ("devShells", "default"),
    }
  }
}

impl fmt::Display for OutputName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A successfully evaluated output.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Output {
  Package(BuildArtifact),
  DevShell(DevEnvironment),
}

impl Output {
  pub fn as_package(&self) -> Option<&BuildArtifact> {
    match self {
      Output::Package(artifact) => Some(artifact),
      Output::DevShell(_) => None,
    }
  }

  pub fn as_dev_shell(&self) -> Option<&DevEnvironment> {
    match self {
      Output::DevShell(env) => Some(env),
      Output::Package(_) => None,
    }
  }
}

/// Why an output failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
  ToolchainNotFound,
  BuildFailed,
  Source,
  Store,
  Internal,
}

impl fmt::Display for FailureKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      FailureKind::ToolchainNotFound => "toolchain not found",
      FailureKind::BuildFailed => "build failed",
      FailureKind::Source => "source error",
      FailureKind::Store => "store error",
      FailureKind::Internal => "internal error",
    })
  }
}

/// A failure recorded against exactly one (platform, output) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{kind}: {message}")]
pub struct OutputFailure {
  pub kind: FailureKind,
  pub message: String,
}

impl OutputFailure {
  pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
    Self {
      kind,
      message: message.into(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
  #[error(transparent)]
  UnsupportedPlatform(#[from] UnsupportedPlatform),

  #[error("unknown output '{0}' (expected default, static or devShell)")]
  UnknownOutput(String),

  #[error("{output} was not evaluated for {platform}")]
  NotEvaluated { platform: Platform, output: OutputName },

  #[error("{output} for {platform} failed: {failure}")]
  Failed {
    platform: Platform,
    output: OutputName,
    failure: OutputFailure,
  },
}

pub type OutputResult = Result<Output, OutputFailure>;

/// Results of evaluating outputs, keyed by platform then output name.
#[derive(Debug, Default)]
pub struct OutputRegistry {
  entries: BTreeMap<Platform, BTreeMap<OutputName, OutputResult>>,
}

impl OutputRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, platform: Platform, output: OutputName, result: OutputResult) {
    self.entries.entry(platform).or_default().insert(output, result);
  }

  /// Look up an output by its string identifiers, e.g. `("x86_64-linux", "static")`.
  pub fn get(&self, platform: &str, output: &str) -> Result<&Output, LookupError> {
    let platform: Platform = platform.parse()?;
    let output = OutputName::parse(output).ok_or_else(|| LookupError::UnknownOutput(output.to_string()))?;
    self.lookup(platform, output)
  }

  pub fn lookup(&self, platform: Platform, output: OutputName) -> Result<&Output, LookupError> {
    match self.entries.get(&platform).and_then(|outputs| outputs.get(&output)) {
      Some(Ok(value)) => Ok(value),
      Some(Err(failure)) => Err(LookupError::Failed {
        platform,
        output,
        failure: failure.clone(),
      }),
      None => Err(LookupError::NotEvaluated { platform, output }),
    }
  }

  pub fn platforms(&self) -> impl Iterator<Item = Platform> + '_ {
    self.entries.keys().copied()
  }

  /// Every recorded entry in platform then output order.
  pub fn iter(&self) -> impl Iterator<Item = (Platform, OutputName, &OutputResult)> {
    self
      .entries
      .iter()
      .flat_map(|(platform, outputs)| outputs.iter().map(move |(name, result)| (*platform, *name, result)))
  }

  pub fn failures(&self) -> impl Iterator<Item = (Platform, OutputName, &OutputFailure)> {
    self.iter().filter_map(|(p, n, r)| r.as_ref().err().map(|f| (p, n, f)))
  }

  pub fn is_success(&self) -> bool {
    self.failures().next().is_none()
  }

  pub fn len(&self) -> usize {
    self.entries.values().map(BTreeMap::len).sum()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

#[derive(Serialize)]
#[serde(untagged)]
enum EntryView<'a> {
  Ok(&'a Output),
  Err { error: &'a OutputFailure },
}

impl<'a> From<&'a OutputResult> for EntryView<'a> {
  fn from(result: &'a OutputResult) -> Self {
    match result {
      Ok(output) => EntryView::Ok(output),
      Err(error) => EntryView::Err { error },
    }
  }
}

/// Serializes as `{ "<platform>": { "packages": {...}, "devShells": {...} } }`.
impl Serialize for OutputRegistry {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(self.entries.len()))?;
    for (platform, outputs) in &self.entries {
      let mut groups: BTreeMap<&str, BTreeMap<&str, EntryView<'_>>> = BTreeMap::new();
      for (name, result) in outputs {
        let (group, attr) = name.qualified();
        groups.entry(group).or_default().insert(attr, result.into());
      }
      map.serialize_entry(&platform.triple(), &groups)?;
    }
    map.end()
  }
}
