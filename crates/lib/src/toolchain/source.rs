//! Where toolchain component trees come from.

use std::fs;
use std::path::{Path, PathBuf};

use semver::Version;
use tracing::{debug, trace};

use super::{Component, ResolveError, ToolchainSpec, target_lib_dir};
use crate::platform::Platform;
use crate::util::hash::hash_file;

/// A directory tree contributing to a toolchain bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentTree {
  /// Name used in logs, e.g. `cargo` or `rust-std-x86_64-unknown-linux-musl`.
  pub label: String,
  pub root: PathBuf,
}

/// Trees located for a spec, in join order.
#[derive(Debug, Clone)]
pub struct Located {
  pub version: String,
  /// Identifies the exact release the trees come from. Part of the bundle
  /// key, so reinstalling a channel yields a new bundle.
  pub build_id: String,
  pub trees: Vec<ComponentTree>,
}

/// A provider of toolchain component trees.
///
/// Implementations only locate trees; composing them into a store bundle is
/// done by the resolver.
pub trait ToolchainSource: Send + Sync {
  /// Short identifier, part of the bundle key.
  fn name(&self) -> &'static str;

  /// Locate every tree `spec` needs on `platform`.
  ///
  /// Returns [`ResolveError::NotFound`] if any requested component or target
  /// is unavailable.
  fn locate(&self, spec: &ToolchainSpec, platform: Platform) -> Result<Located, ResolveError>;
}

/// Toolchains already installed by rustup.
///
/// Rustup installs full toolchains for the host only, so requests for any other
/// platform are reported as not found.
#[derive(Debug, Clone)]
pub struct RustupSource {
  home: PathBuf,
  host: Option<Platform>,
}

impl RustupSource {
  pub fn new(home: impl Into<PathBuf>) -> Self {
    Self {
      home: home.into(),
      host: Platform::current(),
    }
  }

  /// Treat `host` as the platform rustup's toolchains were installed for.
  pub fn with_host(mut self, host: Platform) -> Self {
    self.host = Some(host);
    self
  }

  pub fn toolchains_dir(&self) -> PathBuf {
    self.home.join("toolchains")
  }

  /// Rustup's directory name for a spec, e.g. `stable-x86_64-unknown-linux-gnu`,
  /// `1.80.0-aarch64-apple-darwin` or `nightly-2024-05-01-x86_64-unknown-linux-gnu`.
  pub fn toolchain_dir_name(spec: &ToolchainSpec, platform: Platform) -> String {
    let triple = platform.rust_triple();
    match (&spec.version, spec.channel.as_str()) {
      (None, channel) => format!("{}-{}", channel, triple),
      (Some(version), "stable") => format!("{}-{}", version, triple),
      (Some(version), channel) => format!("{}-{}-{}", channel, version, triple),
    }
  }

  /// rustc's full version line from the channel manifest, e.g.
  /// `1.80.1 (3f5fd8dd4 2024-08-06)`.
  fn installed_version_line(dir: &Path) -> Option<String> {
    let manifest = dir.join("lib").join("rustlib").join("multirust-channel-manifest.toml");
    let content = fs::read_to_string(manifest).ok()?;
    let value: toml::Table = toml::from_str(&content).ok()?;
    let version = value.get("pkg")?.get("rustc")?.get("version")?.as_str()?;
    Some(version.trim().to_string())
  }

  fn component_present(dir: &Path, component: Component, platform: Platform) -> bool {
    let exe = |name: &str| dir.join("bin").join(format!("{}{}", name, std::env::consts::EXE_SUFFIX));
    match component {
      Component::Rustc => exe("rustc").is_file(),
      Component::Cargo => exe("cargo").is_file(),
      Component::Rustfmt => exe("rustfmt").is_file(),
      Component::Clippy => exe("cargo-clippy").is_file(),
      Component::RustAnalyzer => exe("rust-analyzer").is_file(),
      Component::RustSrc => dir.join("lib").join("rustlib").join("src").is_dir(),
      Component::RustStd => target_lib_dir(dir, &platform.rust_triple()).is_dir(),
    }
  }
}

impl ToolchainSource for RustupSource {
  fn name(&self) -> &'static str {
    "rustup"
  }

  fn locate(&self, spec: &ToolchainSpec, platform: Platform) -> Result<Located, ResolveError> {
    if self.host != Some(platform) {
      return Err(ResolveError::not_found(
        format!("rustup toolchain '{}' (rustup only serves the host)", spec.display_name()),
        platform,
      ));
    }

    let name = Self::toolchain_dir_name(spec, platform);
    let dir = self.toolchains_dir().join(&name);
    if !dir.is_dir() {
      return Err(ResolveError::not_found(format!("rustup toolchain '{}'", name), platform));
    }
    debug!(toolchain = %name, "found rustup toolchain");

    for component in &spec.components {
      if !Self::component_present(&dir, *component, platform) {
        return Err(ResolveError::not_found(
          format!("component '{}' in rustup toolchain '{}'", component, name),
          platform,
        ));
      }
    }
    for target in &spec.extra_targets {
      if !target_lib_dir(&dir, target).is_dir() {
        return Err(ResolveError::not_found(
          format!("target '{}' in rustup toolchain '{}'", target, name),
          platform,
        ));
      }
    }

    let line = Self::installed_version_line(&dir);
    let version = line
      .as_deref()
      .and_then(|l| l.split_whitespace().next())
      .map(str::to_string)
      .or_else(|| spec.version.clone())
      .unwrap_or_else(|| spec.channel.clone());
    // without a manifest, the compiler binary itself tells installs apart
    let build_id = match line {
      Some(line) => line,
      None => {
        let rustc = dir.join("bin").join(format!("rustc{}", std::env::consts::EXE_SUFFIX));
        hash_file(&rustc).map(|h| h.0).unwrap_or_else(|_| version.clone())
      }
    };

    Ok(Located {
      version,
      build_id,
      trees: vec![ComponentTree { label: name, root: dir }],
    })
  }
}

/// Unpacked toolchain distributions laid out per component.
///
/// ```text
/// <root>/<channel>/<version>/<rust-triple>/<component>/...
/// <root>/<channel>/<version>/<rust-triple>/rust-std-<target>/...
/// ```
///
/// Each component directory is a tree in toolchain layout (`bin/`, `lib/`, ...).
#[derive(Debug, Clone)]
pub struct DistSource {
  root: PathBuf,
}

impl DistSource {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Newest version in `channel_dir` that has a tree for `triple`.
  fn latest_version(channel_dir: &Path, triple: &str) -> Option<String> {
    let entries = fs::read_dir(channel_dir).ok()?;
    let mut versions: Vec<String> = entries
      .filter_map(|e| e.ok())
      .filter(|e| e.path().join(triple).is_dir())
      .map(|e| e.file_name().to_string_lossy().to_string())
      .collect();
    // semver-parsable versions outrank dated or otherwise free-form ones
    versions.sort_by_key(|v| (Version::parse(v).ok(), v.clone()));
    versions.pop()
  }
}

impl ToolchainSource for DistSource {
  fn name(&self) -> &'static str {
    "dist"
  }

  fn locate(&self, spec: &ToolchainSpec, platform: Platform) -> Result<Located, ResolveError> {
    let triple = platform.rust_triple();
    let channel_dir = self.root.join(&spec.channel);
    if !channel_dir.is_dir() {
      return Err(ResolveError::not_found(format!("channel '{}'", spec.channel), platform));
    }

    let version = match &spec.version {
      Some(v) => v.clone(),
      None => Self::latest_version(&channel_dir, &triple).ok_or_else(|| {
        ResolveError::not_found(format!("any '{}' release for {}", spec.channel, triple), platform)
      })?,
    };

    let host_dir = channel_dir.join(&version).join(&triple);
    if !host_dir.is_dir() {
      return Err(ResolveError::not_found(
        format!("{} {} for {}", spec.channel, version, triple),
        platform,
      ));
    }

    let mut trees = Vec::new();
    for component in &spec.components {
      let root = host_dir.join(component.as_str());
      if !root.is_dir() {
        return Err(ResolveError::not_found(
          format!("component '{}' in {} {}", component, spec.channel, version),
          platform,
        ));
      }
      trees.push(ComponentTree {
        label: component.to_string(),
        root,
      });
    }
    for target in &spec.extra_targets {
      let label = format!("rust-std-{}", target);
      let root = host_dir.join(&label);
      if !root.is_dir() {
        return Err(ResolveError::not_found(
          format!("target '{}' in {} {}", target, spec.channel, version),
          platform,
        ));
      }
      trees.push(ComponentTree { label, root });
    }

    trace!(version = %version, trees = trees.len(), "located dist toolchain");
    Ok(Located {
      build_id: version.clone(),
      version,
      trees,
    })
  }
}

/// The source selected by project configuration.
#[derive(Debug, Clone)]
pub enum ConfiguredSource {
  Rustup(RustupSource),
  Dist(DistSource),
}

impl ToolchainSource for ConfiguredSource {
  fn name(&self) -> &'static str {
    match self {
      ConfiguredSource::Rustup(s) => s.name(),
      ConfiguredSource::Dist(s) => s.name(),
    }
  }

  fn locate(&self, spec: &ToolchainSpec, platform: Platform) -> Result<Located, ResolveError> {
    match self {
      ConfiguredSource::Rustup(s) => s.locate(spec, platform),
      ConfiguredSource::Dist(s) => s.locate(spec, platform),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::platform::{Arch, Os};
  use crate::util::testutil::fake_dist;
  use tempfile::TempDir;

  fn linux() -> Platform {
    Platform::new(Arch::X86_64, Os::Linux)
  }

  #[test]
  fn rustup_dir_names() {
    let p = linux();
    assert_eq!(
      RustupSource::toolchain_dir_name(&ToolchainSpec::default(), p),
      "stable-x86_64-unknown-linux-gnu"
    );
    assert_eq!(
      RustupSource::toolchain_dir_name(&ToolchainSpec::default().with_version("1.80.0"), p),
      "1.80.0-x86_64-unknown-linux-gnu"
    );
    assert_eq!(
      RustupSource::toolchain_dir_name(&ToolchainSpec::channel("nightly").with_version("2024-05-01"), p),
      "nightly-2024-05-01-x86_64-unknown-linux-gnu"
    );
  }

  #[test]
  fn rustup_rejects_foreign_platform() {
    let temp = TempDir::new().unwrap();
    let source = RustupSource::new(temp.path()).with_host(linux());
    let other = Platform::new(Arch::Aarch64, Os::MacOs);

    let err = source.locate(&ToolchainSpec::default(), other).unwrap_err();
    assert!(matches!(err, ResolveError::NotFound { platform, .. } if platform == other));
  }

  #[test]
  fn rustup_reports_missing_component() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("toolchains/stable-x86_64-unknown-linux-gnu");
    fs::create_dir_all(dir.join("bin")).unwrap();
    fs::write(dir.join("bin/rustc"), "").unwrap();
    let source = RustupSource::new(temp.path()).with_host(linux());

    let mut spec = ToolchainSpec::default();
    spec.components = [Component::Rustc].into_iter().collect();
    assert!(source.locate(&spec, linux()).is_ok());

    spec.components.insert(Component::Cargo);
    let err = source.locate(&spec, linux()).unwrap_err();
    assert!(err.to_string().contains("cargo"));
  }

  #[test]
  fn rustup_reads_version_from_channel_manifest() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("toolchains/stable-x86_64-unknown-linux-gnu");
    fs::create_dir_all(dir.join("lib/rustlib")).unwrap();
    fs::write(
      dir.join("lib/rustlib/multirust-channel-manifest.toml"),
      "[pkg.rustc]\nversion = \"1.80.1 (3f5fd8dd4 2024-08-06)\"\n",
    )
    .unwrap();
    let source = RustupSource::new(temp.path()).with_host(linux());

    let mut spec = ToolchainSpec::default();
    spec.components.clear();
    let located = source.locate(&spec, linux()).unwrap();
    assert_eq!(located.version, "1.80.1");
    assert_eq!(located.build_id, "1.80.1 (3f5fd8dd4 2024-08-06)");
  }

  #[test]
  fn rustup_without_manifest_identifies_by_compiler() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("toolchains/stable-x86_64-unknown-linux-gnu");
    fs::create_dir_all(dir.join("bin")).unwrap();
    fs::write(dir.join("bin/rustc"), "rustc one").unwrap();
    let source = RustupSource::new(temp.path()).with_host(linux());
    let mut spec = ToolchainSpec::default();
    spec.components = [Component::Rustc].into_iter().collect();

    let before = source.locate(&spec, linux()).unwrap();
    fs::write(dir.join("bin/rustc"), "rustc two").unwrap();
    let after = source.locate(&spec, linux()).unwrap();

    assert_eq!(before.version, "stable");
    assert_ne!(before.build_id, after.build_id);
  }

  #[test]
  fn dist_picks_latest_version() {
    let temp = TempDir::new().unwrap();
    fake_dist(temp.path(), "stable", "1.79.0", linux(), &[]);
    fake_dist(temp.path(), "stable", "1.80.0", linux(), &[]);
    fake_dist(temp.path(), "stable", "1.9.0", linux(), &[]);
    let source = DistSource::new(temp.path());

    let located = source.locate(&ToolchainSpec::default(), linux()).unwrap();
    assert_eq!(located.version, "1.80.0");
    assert_eq!(located.trees.len(), Component::ALL.len());
  }

  #[test]
  fn dist_includes_extra_targets_after_components() {
    let temp = TempDir::new().unwrap();
    fake_dist(temp.path(), "stable", "1.80.0", linux(), &["x86_64-unknown-linux-musl"]);
    let source = DistSource::new(temp.path());
    let spec = ToolchainSpec::default().for_platform(linux());

    let located = source.locate(&spec, linux()).unwrap();
    let last = located.trees.last().unwrap();
    assert_eq!(last.label, "rust-std-x86_64-unknown-linux-musl");
  }

  #[test]
  fn dist_missing_target_is_not_found() {
    let temp = TempDir::new().unwrap();
    fake_dist(temp.path(), "stable", "1.80.0", linux(), &[]);
    let source = DistSource::new(temp.path());
    let spec = ToolchainSpec::default().for_platform(linux());

    let err = source.locate(&spec, linux()).unwrap_err();
    assert!(err.to_string().contains("x86_64-unknown-linux-musl"));
  }

  #[test]
  fn dist_unknown_channel_or_version() {
    let temp = TempDir::new().unwrap();
    fake_dist(temp.path(), "stable", "1.80.0", linux(), &[]);
    let source = DistSource::new(temp.path());

    assert!(source.locate(&ToolchainSpec::channel("beta"), linux()).is_err());
    assert!(
      source
        .locate(&ToolchainSpec::default().with_version("1.70.0"), linux())
        .is_err()
    );
    assert!(
      source
        .locate(&ToolchainSpec::default(), Platform::new(Arch::Aarch64, Os::Linux))
        .is_err()
    );
  }
}
