//! Project configuration.
//!
//! Two files at the source root are read:
//!
//! - `rust-toolchain.toml` (or a legacy plain `rust-toolchain`) selects the
//!   toolchain, the same file rustup honours.
//! - `fanout.toml`, optional, configures everything else.
//!
//! ```toml
//! [toolchain]
//! source = "dist"
//! dist = "/opt/rust-dist"
//!
//! [build]
//! bin = "server"
//! parallelism = 4
//!
//! [static]
//! cc = "x86_64-linux-musl-gcc"
//!
//! [source]
//! include = ["assets/**"]
//! exclude = ["benches/**"]
//!
//! [devshell]
//! tools = ["cargo-watch"]
//!
//! [[native]]
//! name = "openssl"
//! prefix = "/usr/local/opt/openssl"
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::consts::CONFIG_FILENAME;
use crate::platform::paths::{dist_dir, rustup_home};
use crate::toolchain::{Component, ConfiguredSource, DistSource, RustupSource, ToolchainSpec};

const TOOLCHAIN_TOML: &str = "rust-toolchain.toml";
const TOOLCHAIN_LEGACY: &str = "rust-toolchain";

const DEFAULT_DEV_TOOLS: [&str; 3] = ["cargo-audit", "cargo-edit", "cargo-watch"];

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },

  #[error("{path}: {message}")]
  Invalid { path: PathBuf, message: String },
}

/// Where toolchains are taken from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
  #[default]
  Rustup,
  Dist,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolchainSection {
  pub source: SourceKind,
  pub dist: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildSection {
  pub bin: Option<String>,
  pub parallelism: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StaticSection {
  pub cc: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceSection {
  pub include: Vec<String>,
  pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DevShellSection {
  pub tools: Vec<String>,
}

impl Default for DevShellSection {
  fn default() -> Self {
    Self {
      tools: DEFAULT_DEV_TOOLS.iter().map(|t| t.to_string()).collect(),
    }
  }
}

/// A native library made visible to the dev shell.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NativeLib {
  pub name: String,
  pub prefix: PathBuf,
}

impl NativeLib {
  pub fn lib_dir(&self) -> PathBuf {
    self.prefix.join("lib")
  }

  pub fn pkgconfig_dir(&self) -> PathBuf {
    self.lib_dir().join("pkgconfig")
  }
}

/// Contents of `fanout.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectConfig {
  pub toolchain: ToolchainSection,
  pub build: BuildSection,
  #[serde(rename = "static")]
  pub static_link: StaticSection,
  pub source: SourceSection,
  pub devshell: DevShellSection,
  pub native: Vec<NativeLib>,
}

impl ProjectConfig {
  /// Load `fanout.toml` from `root`, falling back to defaults if absent.
  ///
  /// `FANOUT_DIST` overrides the configured toolchain source.
  pub fn load(root: &Path) -> Result<Self, ConfigError> {
    let path = root.join(CONFIG_FILENAME);
    let config = match fs::read_to_string(&path) {
      Ok(content) => Self::parse(&content, &path)?,
      Err(e) if e.kind() == io::ErrorKind::NotFound => Self::default(),
      Err(source) => return Err(ConfigError::Read { path, source }),
    };
    Ok(config.with_env_overrides())
  }

  /// Apply `FANOUT_DIST`, if set.
  pub fn with_env_overrides(mut self) -> Self {
    if let Some(dist) = dist_dir() {
      debug!(dist = ?dist, "using toolchain dist from FANOUT_DIST");
      self.toolchain.source = SourceKind::Dist;
      self.toolchain.dist = Some(dist);
    }
    self
  }

  pub fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
    let config: Self = toml::from_str(content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })?;
    if config.build.parallelism == Some(0) {
      return Err(ConfigError::Invalid {
        path: path.to_path_buf(),
        message: "build.parallelism must be at least 1".to_string(),
      });
    }
    Ok(config)
  }

  /// Number of concurrent build tasks.
  pub fn parallelism(&self) -> usize {
    self
      .build
      .parallelism
      .or_else(|| std::thread::available_parallelism().ok().map(|n| n.get()))
      .unwrap_or(1)
  }

  /// The configured toolchain source.
  pub fn toolchain_source(&self) -> Result<ConfiguredSource, ConfigError> {
    match self.toolchain.source {
      SourceKind::Rustup => Ok(ConfiguredSource::Rustup(RustupSource::new(rustup_home()))),
      SourceKind::Dist => {
        let dist = self.toolchain.dist.clone().ok_or_else(|| ConfigError::Invalid {
          path: PathBuf::from(CONFIG_FILENAME),
          message: "toolchain.source = \"dist\" requires toolchain.dist or FANOUT_DIST".to_string(),
        })?;
        Ok(ConfiguredSource::Dist(DistSource::new(dist)))
      }
    }
  }
}

#[derive(Debug, Deserialize)]
struct ToolchainFile {
  toolchain: ToolchainTable,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ToolchainTable {
  channel: Option<String>,
  version: Option<String>,
  components: Vec<String>,
  targets: Vec<String>,
}

/// Read the toolchain spec for the project at `root`.
///
/// Listed components add to the default set. Without a toolchain file the
/// default spec (latest stable) is used.
pub fn load_toolchain_spec(root: &Path) -> Result<ToolchainSpec, ConfigError> {
  for name in [TOOLCHAIN_TOML, TOOLCHAIN_LEGACY] {
    let path = root.join(name);
    let content = match fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
      Err(source) => return Err(ConfigError::Read { path, source }),
    };
    return parse_toolchain_file(&content, &path);
  }
  Ok(ToolchainSpec::default())
}

fn parse_toolchain_file(content: &str, path: &Path) -> Result<ToolchainSpec, ConfigError> {
  let invalid = |message: String| ConfigError::Invalid {
    path: path.to_path_buf(),
    message,
  };

  let trimmed = content.trim();
  // legacy files hold nothing but the channel name
  if !trimmed.contains('\n') && !trimmed.contains('=') && !trimmed.starts_with('[') {
    return parse_channel(trimmed).map_err(invalid);
  }

  let file: ToolchainFile = toml::from_str(content).map_err(|source| ConfigError::Parse {
    path: path.to_path_buf(),
    source,
  })?;
  let table = file.toolchain;

  let mut spec = match table.channel.as_deref() {
    Some(channel) => parse_channel(channel).map_err(invalid)?,
    None => ToolchainSpec::default(),
  };
  if let Some(version) = table.version {
    spec.version = Some(version);
  }
  for name in &table.components {
    spec.components.insert(name.parse::<Component>().map_err(invalid)?);
  }
  spec.extra_targets.extend(table.targets);
  Ok(spec)
}

/// Interpret a rustup channel name: `stable`, `1.80.0`, `nightly-2024-05-01`.
fn parse_channel(channel: &str) -> Result<ToolchainSpec, String> {
  if channel.is_empty() {
    return Err("empty toolchain channel".to_string());
  }
  if channel.starts_with(|c: char| c.is_ascii_digit()) {
    return Ok(ToolchainSpec::channel("stable").with_version(channel));
  }
  for named in ["stable", "beta", "nightly"] {
    if channel == named {
      return Ok(ToolchainSpec::channel(named));
    }
    if let Some(date) = channel.strip_prefix(named).and_then(|rest| rest.strip_prefix('-')) {
      return Ok(ToolchainSpec::channel(named).with_version(date));
    }
  }
  Err(format!("unrecognised toolchain channel: {}", channel))
}

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;
  use tempfile::TempDir;

  #[test]
  #[serial]
  fn missing_config_uses_defaults() {
    temp_env::with_var_unset("FANOUT_DIST", || {
      let temp = TempDir::new().unwrap();
      let config = ProjectConfig::load(temp.path()).unwrap();
      assert_eq!(config.toolchain.source, SourceKind::Rustup);
      assert_eq!(config.devshell.tools, DEFAULT_DEV_TOOLS);
      assert!(config.native.is_empty());
      assert!(config.parallelism() >= 1);
    });
  }

  #[test]
  #[serial]
  fn full_config_parses() {
    temp_env::with_var_unset("FANOUT_DIST", || {
      let temp = TempDir::new().unwrap();
      fs::write(
        temp.path().join(CONFIG_FILENAME),
        r#"
[toolchain]
source = "dist"
dist = "/opt/dist"

[build]
bin = "server"
parallelism = 2

[static]
cc = "musl-gcc"

[source]
include = ["assets/**"]
exclude = ["benches/**"]

[devshell]
tools = ["cargo-watch"]

[[native]]
name = "openssl"
prefix = "/usr/local"
"#,
      )
      .unwrap();

      let config = ProjectConfig::load(temp.path()).unwrap();
      assert_eq!(config.toolchain.source, SourceKind::Dist);
      assert_eq!(config.build.bin.as_deref(), Some("server"));
      assert_eq!(config.parallelism(), 2);
      assert_eq!(config.static_link.cc.as_deref(), Some("musl-gcc"));
      assert_eq!(config.source.include, ["assets/**"]);
      assert_eq!(config.devshell.tools, ["cargo-watch"]);
      assert_eq!(config.native[0].pkgconfig_dir(), PathBuf::from("/usr/local/lib/pkgconfig"));
      assert!(matches!(config.toolchain_source().unwrap(), ConfiguredSource::Dist(_)));
    });
  }

  #[test]
  #[serial]
  fn fanout_dist_env_selects_dist_source() {
    temp_env::with_var("FANOUT_DIST", Some("/srv/dist"), || {
      let temp = TempDir::new().unwrap();
      let config = ProjectConfig::load(temp.path()).unwrap();
      assert_eq!(config.toolchain.source, SourceKind::Dist);
      assert_eq!(config.toolchain.dist, Some(PathBuf::from("/srv/dist")));
    });
  }

  #[test]
  fn dist_source_without_path_is_invalid() {
    let config = ProjectConfig::parse("[toolchain]\nsource = \"dist\"\n", Path::new("fanout.toml")).unwrap();
    assert!(matches!(config.toolchain_source(), Err(ConfigError::Invalid { .. })));
  }

  #[test]
  fn unknown_keys_and_zero_parallelism_rejected() {
    assert!(matches!(
      ProjectConfig::parse("[build]\nbinary = \"x\"\n", Path::new("fanout.toml")),
      Err(ConfigError::Parse { .. })
    ));
    assert!(matches!(
      ProjectConfig::parse("[build]\nparallelism = 0\n", Path::new("fanout.toml")),
      Err(ConfigError::Invalid { .. })
    ));
  }

  #[test]
  fn toolchain_file_defaults_to_stable() {
    let temp = TempDir::new().unwrap();
    assert_eq!(load_toolchain_spec(temp.path()).unwrap(), ToolchainSpec::default());
  }

  #[test]
  fn toolchain_toml_is_read() {
    let temp = TempDir::new().unwrap();
    fs::write(
      temp.path().join(TOOLCHAIN_TOML),
      r#"
[toolchain]
channel = "1.80.0"
components = ["rustfmt", "llvm-tools"]
targets = ["wasm32-unknown-unknown"]
"#,
    )
    .unwrap();
    assert!(matches!(load_toolchain_spec(temp.path()), Err(ConfigError::Invalid { .. })));

    fs::write(
      temp.path().join(TOOLCHAIN_TOML),
      "[toolchain]\nchannel = \"1.80.0\"\ncomponents = [\"rustfmt\"]\ntargets = [\"wasm32-unknown-unknown\"]\n",
    )
    .unwrap();
    let spec = load_toolchain_spec(temp.path()).unwrap();
    assert_eq!(spec.channel, "stable");
    assert_eq!(spec.version.as_deref(), Some("1.80.0"));
    assert!(spec.extra_targets.contains("wasm32-unknown-unknown"));
  }

  #[test]
  fn legacy_toolchain_file_is_read() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join(TOOLCHAIN_LEGACY), "nightly-2024-05-01\n").unwrap();
    let spec = load_toolchain_spec(temp.path()).unwrap();
    assert_eq!(spec.channel, "nightly");
    assert_eq!(spec.version.as_deref(), Some("2024-05-01"));
  }

  #[test]
  fn channel_names() {
    assert_eq!(parse_channel("beta").unwrap(), ToolchainSpec::channel("beta"));
    assert!(parse_channel("custom-toolchain").is_err());
    assert!(parse_channel("").is_err());
  }
}
