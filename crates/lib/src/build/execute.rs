//! Realizing build descriptors into store artifacts.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info, instrument, warn};

use super::BuildError;
use super::cargo::{CompileRequest, Compiler};
use super::inspect;
use super::types::{BuildArtifact, BuildTargetDescriptor};
use crate::consts::COMPLETE_MARKER;
use crate::source::SourceSnapshot;
use crate::store::{ArtifactStore, EntryKind, Published, StoreError, read_marker, write_marker};
use crate::util::hash::{ContentHash, ObjectHash, hash_directory};

/// Completion marker of a build entry.
#[derive(Debug, Serialize, Deserialize)]
pub struct BuildMarker {
  pub version: u32,
  pub descriptor_key: ObjectHash,
  pub binary: String,
  /// Hash of the entry's contents, excluding the marker itself.
  pub output_hash: ContentHash,
  pub built_at_unix: u64,
}

/// Verify a cached build's contents still match its marker.
fn verify_build_hash(entry: &Path, marker: &BuildMarker) -> bool {
  match hash_directory(entry, &[COMPLETE_MARKER]) {
    Ok(current) if current == marker.output_hash => true,
    Ok(current) => {
      warn!(
        path = ?entry,
        expected = %marker.output_hash,
        actual = %current,
        "build output corrupted, will rebuild"
      );
      false
    }
    Err(e) => {
      warn!(path = ?entry, error = %e, "failed to hash build output, will rebuild");
      false
    }
  }
}

fn output_path(entry: &Path, binary: &str) -> PathBuf {
  entry
    .join("bin")
    .join(format!("{}{}", binary, std::env::consts::EXE_SUFFIX))
}

/// Builds descriptors into the store, reusing cached entries.
pub struct PackageBuilder<C> {
  store: ArtifactStore,
  compiler: C,
  locks: Mutex<HashMap<ObjectHash, Arc<tokio::sync::Mutex<()>>>>,
}

impl<C: Compiler> PackageBuilder<C> {
  pub fn new(store: ArtifactStore, compiler: C) -> Self {
    Self {
      store,
      compiler,
      locks: Mutex::new(HashMap::new()),
    }
  }

  pub fn compiler(&self) -> &C {
    &self.compiler
  }

  pub fn store(&self) -> &ArtifactStore {
    &self.store
  }

  fn key_lock(&self, key: &ObjectHash) -> Arc<tokio::sync::Mutex<()>> {
    let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
    locks.entry(key.clone()).or_default().clone()
  }

  /// Build `descriptor` from `snapshot`, or return the cached artifact.
  ///
  /// Nothing is published unless the compiler succeeds and the binary passes
  /// verification.
  #[instrument(skip_all, fields(output = %descriptor.label()))]
  pub async fn build(
    &self,
    descriptor: &BuildTargetDescriptor,
    snapshot: &SourceSnapshot,
  ) -> Result<BuildArtifact, BuildError> {
    if descriptor.source_fingerprint != snapshot.fingerprint {
      return Err(BuildError::StaleSource {
        expected: descriptor.source_fingerprint.clone(),
        actual: snapshot.fingerprint.clone(),
      });
    }

    let key = descriptor.descriptor_key()?;
    let lock = self.key_lock(&key);
    let _guard = lock.lock().await;

    if let Some(artifact) = self.cached(descriptor, &key).await? {
      return Ok(artifact);
    }
    self.realize(descriptor, snapshot, &key).await
  }

  async fn cached(&self, descriptor: &BuildTargetDescriptor, key: &ObjectHash) -> Result<Option<BuildArtifact>, BuildError> {
    let entry = self.store.entry_path(EntryKind::Build, key);
    if !fs::try_exists(&entry).await.unwrap_or(false) {
      return Ok(None);
    }

    match read_marker::<BuildMarker>(&entry) {
      Ok(Some(marker)) => {
        let (entry, marker, intact) = tokio::task::spawn_blocking(move || {
          let intact = verify_build_hash(&entry, &marker);
          (entry, marker, intact)
        })
        .await?;
        if intact {
          debug!(path = ?entry, "build already exists in store (cache hit)");
          return Ok(Some(artifact(&entry, descriptor, &marker, true)));
        }
      }
      Ok(None) => warn!(path = ?entry, "incomplete build found, removing"),
      Err(e) => warn!(path = ?entry, error = %e, "invalid build marker, removing"),
    }
    self.store.evict(EntryKind::Build, key)?;
    Ok(None)
  }

  async fn realize(
    &self,
    descriptor: &BuildTargetDescriptor,
    snapshot: &SourceSnapshot,
    key: &ObjectHash,
  ) -> Result<BuildArtifact, BuildError> {
    info!(key = %key, "building");

    let work = self.store.temp_entry(key)?;
    let source_dir = work.path().join("src");
    {
      let snapshot = snapshot.clone();
      let source_dir = source_dir.clone();
      tokio::task::spawn_blocking(move || snapshot.stage(&source_dir)).await??;
    }

    let compiled = self
      .compiler
      .compile(CompileRequest {
        descriptor,
        source_dir: &source_dir,
        work_dir: work.path(),
      })
      .await
      .map_err(|e| failed(descriptor, key, e.output()))?;

    {
      let binary = compiled.binary.clone();
      let triple = descriptor.target_triple.clone();
      tokio::task::spawn_blocking(move || inspect::verify(&binary, &triple))
        .await?
        .map_err(|reason| failed(descriptor, key, reason))?;
    }

    let out = self.store.temp_entry(key)?;
    let binary = output_path(out.path(), &descriptor.binary);
    if let Some(bin_dir) = binary.parent() {
      fs::create_dir_all(bin_dir).await.map_err(|e| StoreError::io(bin_dir, e))?;
    }
    fs::copy(&compiled.binary, &binary).await.map_err(|e| StoreError::io(&binary, e))?;

    let out_path = out.path().to_path_buf();
    let output_hash = tokio::task::spawn_blocking(move || hash_directory(&out_path, &[COMPLETE_MARKER]))
      .await?
      .map_err(StoreError::from)?;

    let marker = BuildMarker {
      version: 1,
      descriptor_key: key.clone(),
      binary: descriptor.binary.clone(),
      output_hash,
      built_at_unix: SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs(),
    };
    write_marker(out.path(), &marker)?;

    let entry = self.store.entry_path(EntryKind::Build, key);
    if self.store.publish(out, EntryKind::Build, key)? == Published::AlreadyPresent {
      debug!(path = ?entry, "another builder published this key first, reusing it");
      let winner = read_marker::<BuildMarker>(&entry)?.ok_or_else(|| StoreError::Conflict { path: entry.clone() })?;
      return Ok(artifact(&entry, descriptor, &winner, true));
    }

    info!(path = ?entry, "build complete");
    Ok(artifact(&entry, descriptor, &marker, false))
  }
}

fn failed(descriptor: &BuildTargetDescriptor, key: &ObjectHash, output: String) -> BuildError {
  BuildError::Failed {
    descriptor: descriptor.label(),
    key: key.clone(),
    output,
  }
}

fn artifact(entry: &Path, descriptor: &BuildTargetDescriptor, marker: &BuildMarker, cached: bool) -> BuildArtifact {
  BuildArtifact {
    descriptor_key: marker.descriptor_key.clone(),
    output_path: output_path(entry, &descriptor.binary),
    produced_at: UNIX_EPOCH + Duration::from_secs(marker.built_at_unix),
    cached,
  }
}
