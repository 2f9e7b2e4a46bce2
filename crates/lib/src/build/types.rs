use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::platform::Platform;
use crate::source::SourceFingerprint;
use crate::toolchain::{ResolvedToolchain, ToolchainSpec};
use crate::util::hash::{ContentHash, HashError, Hashable, ObjectHash};

/// Flags that make rustc link a fully static, non-PIE executable.
pub const STATIC_RUSTFLAGS: &str = "-C target-feature=+crt-static -C relocation-model=static";

/// Everything needed to build one binary.
///
/// Descriptors are plain data: the default and static builds differ only in
/// `target_triple` and `env_overrides`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildTargetDescriptor {
  /// Output name, e.g. `default`. Not part of the cache key.
  pub name: String,
  pub source_fingerprint: SourceFingerprint,
  pub toolchain: ResolvedToolchain,
  pub target_triple: String,
  pub binary: String,
  pub env_overrides: BTreeMap<String, String>,
}

/// The fields of a descriptor that determine its build output.
///
/// The toolchain enters by identity (spec, platform, version, content hash);
/// where its bundle happens to live on disk does not.
#[derive(Serialize)]
struct DescriptorKey<'a> {
  source_fingerprint: &'a SourceFingerprint,
  toolchain_spec: &'a ToolchainSpec,
  toolchain_platform: Platform,
  toolchain_version: &'a str,
  toolchain_hash: &'a ContentHash,
  target_triple: &'a str,
  binary: &'a str,
  env_overrides: &'a BTreeMap<String, String>,
}

impl Hashable for DescriptorKey<'_> {}

impl BuildTargetDescriptor {
  /// Cache key of this descriptor; two descriptors that would produce the same
  /// binary share it.
  pub fn descriptor_key(&self) -> Result<ObjectHash, HashError> {
    DescriptorKey {
      source_fingerprint: &self.source_fingerprint,
      toolchain_spec: &self.toolchain.spec,
      toolchain_platform: self.toolchain.platform,
      toolchain_version: &self.toolchain.version,
      toolchain_hash: &self.toolchain.content_hash,
      target_triple: &self.target_triple,
      binary: &self.binary,
      env_overrides: &self.env_overrides,
    }
    .compute_hash()
  }

  /// Whether the output must be statically linked.
  pub fn is_static(&self) -> bool {
    self.target_triple.ends_with("-musl")
  }

  /// `name@triple`, for logs and errors.
  pub fn label(&self) -> String {
    format!("{}@{}", self.name, self.target_triple)
  }
}

/// A built binary in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildArtifact {
  pub descriptor_key: ObjectHash,
  pub output_path: PathBuf,
  pub produced_at: SystemTime,
  /// Whether the artifact was already in the store.
  pub cached: bool,
}

/// Descriptor for the platform's native, dynamically linked build.
pub fn default_descriptor(
  fingerprint: &SourceFingerprint,
  toolchain: &ResolvedToolchain,
  binary: &str,
) -> BuildTargetDescriptor {
  BuildTargetDescriptor {
    name: "default".to_string(),
    source_fingerprint: fingerprint.clone(),
    toolchain: toolchain.clone(),
    target_triple: toolchain.platform.rust_triple(),
    binary: binary.to_string(),
    env_overrides: BTreeMap::new(),
  }
}

/// Descriptor for the fully static musl build.
///
/// `cc` is the C compiler wrapper used for the musl target; see
/// [`default_static_cc`].
pub fn static_descriptor(
  fingerprint: &SourceFingerprint,
  toolchain: &ResolvedToolchain,
  binary: &str,
  cc: Option<&str>,
) -> BuildTargetDescriptor {
  let triple = toolchain.platform.musl_triple();
  let cc = cc.map(str::to_string).unwrap_or_else(|| default_static_cc(toolchain.platform));
  let env_triple = triple.replace('-', "_");

  let env_overrides = BTreeMap::from([
    ("CARGO_BUILD_TARGET".to_string(), triple.clone()),
    ("CARGO_BUILD_RUSTFLAGS".to_string(), STATIC_RUSTFLAGS.to_string()),
    ("TARGET_CC".to_string(), cc.clone()),
    (format!("CC_{}", env_triple), cc.clone()),
    (format!("CARGO_TARGET_{}_LINKER", env_triple.to_uppercase()), cc),
  ]);

  BuildTargetDescriptor {
    name: "static".to_string(),
    source_fingerprint: fingerprint.clone(),
    toolchain: toolchain.clone(),
    target_triple: triple,
    binary: binary.to_string(),
    env_overrides,
  }
}

/// The musl cross compiler's `gcc` wrapper for `platform`'s architecture,
/// e.g. `aarch64-linux-musl-gcc`. The host's own `cc` is never used.
pub fn default_static_cc(platform: Platform) -> String {
  format!("{}-linux-musl-gcc", platform.arch)
}
