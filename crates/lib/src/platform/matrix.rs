//! The fixed platform matrix and per-platform fan-out.

use std::collections::BTreeMap;

use tracing::warn;

use super::{Arch, Os, Platform};

const SUPPORTED: [Platform; 4] = [
  Platform {
    arch: Arch::X86_64,
    os: Os::Linux,
  },
  Platform {
    arch: Arch::Aarch64,
    os: Os::Linux,
  },
  Platform {
    arch: Arch::X86_64,
    os: Os::MacOs,
  },
  Platform {
    arch: Arch::Aarch64,
    os: Os::MacOs,
  },
];

/// Every platform outputs are produced for, in a fixed order.
pub fn supported_platforms() -> &'static [Platform] {
  &SUPPORTED
}

/// Apply `f` to each platform independently.
///
/// Every platform gets an entry in the returned map, whether `f` succeeded or
/// failed for it. A failure never stops the remaining platforms.
pub fn for_each<T, E, F>(platforms: &[Platform], mut f: F) -> BTreeMap<Platform, Result<T, E>>
where
  F: FnMut(Platform) -> Result<T, E>,
  E: std::fmt::Display,
{
  let mut results = BTreeMap::new();
  for &platform in platforms {
    let result = f(platform);
    if let Err(e) = &result {
      warn!(platform = %platform, error = %e, "platform failed");
    }
    results.insert(platform, result);
  }
  results
}
