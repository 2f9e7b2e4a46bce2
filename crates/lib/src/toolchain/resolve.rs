//! Resolving specs into store bundles.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use super::link::join_trees;
use super::source::{Located, ToolchainSource};
use super::{ResolveError, ResolvedToolchain, ToolchainSpec};
use crate::consts::COMPLETE_MARKER;
use crate::platform::Platform;
use crate::store::{ArtifactStore, EntryKind, Published, StoreError, read_marker, write_marker};
use crate::util::hash::{ContentHash, Hashable, ObjectHash, hash_directory};

/// Completion marker of a toolchain bundle.
#[derive(Debug, Serialize, Deserialize)]
struct ToolchainMarker {
  version: u32,
  toolchain_version: String,
  build_id: String,
  content_hash: ContentHash,
}

/// What a caller asks for; concurrent identical requests coalesce on it.
#[derive(Serialize)]
struct ToolchainRequest<'a> {
  source: &'a str,
  spec: &'a ToolchainSpec,
  platform: Platform,
}

impl Hashable for ToolchainRequest<'_> {}

/// Everything that identifies a bundle: the request plus the exact release
/// the source located for it.
#[derive(Serialize)]
struct BundleKey<'a> {
  request: &'a ToolchainRequest<'a>,
  build_id: &'a str,
}

impl Hashable for BundleKey<'_> {}

/// Resolves toolchain specs into bundles in an [`ArtifactStore`].
///
/// The source is consulted on every resolution, but a bundle for the release
/// it reports is composed only once and reused afterwards. Concurrent requests
/// for the same spec and platform share a single acquisition.
pub struct ToolchainResolver<S> {
  source: S,
  store: ArtifactStore,
  inflight: Mutex<HashMap<ObjectHash, Arc<OnceCell<ResolvedToolchain>>>>,
}

impl<S: ToolchainSource> ToolchainResolver<S> {
  pub fn new(source: S, store: ArtifactStore) -> Self {
    Self {
      source,
      store,
      inflight: Mutex::new(HashMap::new()),
    }
  }

  pub fn source(&self) -> &S {
    &self.source
  }

  pub fn store(&self) -> &ArtifactStore {
    &self.store
  }

  /// Resolve `spec` for `platform`.
  #[instrument(skip(self, spec), fields(toolchain = %spec.display_name(), source = self.source.name()))]
  pub async fn resolve(&self, spec: &ToolchainSpec, platform: Platform) -> Result<ResolvedToolchain, ResolveError> {
    let request = ToolchainRequest {
      source: self.source.name(),
      spec,
      platform,
    };
    let request_key = request.compute_hash()?;

    let cell = {
      let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
      inflight.entry(request_key).or_default().clone()
    };

    cell
      .get_or_try_init(|| self.acquire(&request))
      .await
      .cloned()
  }

  async fn acquire(&self, request: &ToolchainRequest<'_>) -> Result<ResolvedToolchain, ResolveError> {
    let located = self.source.locate(request.spec, request.platform)?;
    let key = BundleKey {
      request,
      build_id: &located.build_id,
    }
    .compute_hash()?;
    let path = self.store.entry_path(EntryKind::Toolchain, &key);

    match read_marker::<ToolchainMarker>(&path) {
      Ok(Some(marker)) => {
        debug!(path = ?path, "toolchain bundle already in store");
        return Ok(resolved(request, marker, path));
      }
      Ok(None) if path.exists() => {
        warn!(path = ?path, "evicting incomplete toolchain bundle");
        self.store.evict(EntryKind::Toolchain, &key)?;
      }
      Ok(None) => {}
      Err(e) => {
        warn!(path = ?path, error = %e, "evicting toolchain bundle with unreadable marker");
        self.store.evict(EntryKind::Toolchain, &key)?;
      }
    }

    info!(version = %located.version, platform = %request.platform, "composing toolchain bundle");
    let store = self.store.clone();
    let marker = tokio::task::spawn_blocking(move || compose(&store, &key, located)).await??;
    Ok(resolved(request, marker, path))
  }
}

/// Materialize `located` into a temp entry, hash it and publish it as `key`.
fn compose(store: &ArtifactStore, key: &ObjectHash, located: Located) -> Result<ToolchainMarker, ResolveError> {
  let path = store.entry_path(EntryKind::Toolchain, key);
  let tmp = store.temp_entry(key)?;
  join_trees(&located.trees, tmp.path()).map_err(|e| StoreError::io(tmp.path(), e))?;
  let content_hash = hash_directory(tmp.path(), &[COMPLETE_MARKER]).map_err(StoreError::from)?;
  write_marker(
    tmp.path(),
    &ToolchainMarker {
      version: 1,
      toolchain_version: located.version,
      build_id: located.build_id,
      content_hash,
    },
  )?;

  if store.publish(tmp, EntryKind::Toolchain, key)? == Published::AlreadyPresent {
    debug!(path = ?path, "another resolver published this bundle first");
  }

  read_marker::<ToolchainMarker>(&path)?.ok_or_else(|| StoreError::Conflict { path: path.clone() }.into())
}

fn resolved(request: &ToolchainRequest<'_>, marker: ToolchainMarker, path: std::path::PathBuf) -> ResolvedToolchain {
  ResolvedToolchain {
    spec: request.spec.clone(),
    platform: request.platform,
    version: marker.toolchain_version,
    content_hash: marker.content_hash,
    path,
  }
}
