use std::fs;
use std::path::Path;

use super::FingerprintError;

/// Name of the binary `cargo build` produces for the package at `root`.
///
/// The first `[[bin]]` target wins, otherwise the package name. `overridden`
/// (from `[build] bin`) short-circuits the manifest entirely.
pub fn binary_name(root: &Path, overridden: Option<&str>) -> Result<String, FingerprintError> {
  if let Some(name) = overridden {
    return Ok(name.to_string());
  }

  let path = root.join("Cargo.toml");
  let content = fs::read_to_string(&path).map_err(|source| FingerprintError::Read {
    path: path.clone(),
    source,
  })?;
  let manifest: toml::Table = toml::from_str(&content).map_err(|e| FingerprintError::Manifest {
    path: path.clone(),
    message: e.to_string(),
  })?;

  let first_bin = manifest
    .get("bin")
    .and_then(|bins| bins.as_array())
    .and_then(|bins| bins.first())
    .and_then(|bin| bin.get("name"))
    .and_then(|name| name.as_str());
  let package = manifest
    .get("package")
    .and_then(|pkg| pkg.get("name"))
    .and_then(|name| name.as_str());

  first_bin
    .or(package)
    .map(str::to_string)
    .ok_or_else(|| FingerprintError::Manifest {
      path,
      message: "no [[bin]] target or package name".to_string(),
    })
}
