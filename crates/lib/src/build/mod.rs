//! Package builds.
//!
//! A [`BuildTargetDescriptor`] fully describes one binary: source fingerprint,
//! toolchain, target triple and environment. The [`PackageBuilder`] turns a
//! descriptor into a [`BuildArtifact`] in the store at
//! `<store>/build/<descriptor_key>/bin/<binary>`, compiling only on a cache miss.
//!
//! # Submodules
//!
//! - [`cargo`] - the [`Compiler`] seam and the cargo backend
//! - [`execute`] - cache lookup, compilation and publishing
//! - [`inspect`] - executable header checks

pub mod cargo;
pub mod execute;
pub mod inspect;
mod types;

use thiserror::Error;

use crate::source::{FingerprintError, SourceFingerprint};
use crate::store::StoreError;
use crate::util::hash::{HashError, ObjectHash};

pub use cargo::{CargoCompiler, CompileError, CompileOutput, CompileRequest, Compiler};
pub use execute::PackageBuilder;
pub use types::*;

#[derive(Debug, Error)]
pub enum BuildError {
  /// Compilation or output verification failed. Nothing was published.
  #[error("build of {descriptor} ({key}) failed:\n{output}")]
  Failed {
    /// `name@triple` of the descriptor.
    descriptor: String,
    /// The descriptor's cache key.
    key: ObjectHash,
    output: String,
  },

  #[error(transparent)]
  Store(#[from] StoreError),

  #[error("failed to stage sources: {0}")]
  Source(#[from] FingerprintError),

  #[error("source changed since it was fingerprinted (expected {expected}, found {actual})")]
  StaleSource {
    expected: SourceFingerprint,
    actual: SourceFingerprint,
  },

  #[error("failed to compute descriptor key: {0}")]
  Hash(#[from] HashError),

  #[error("build task failed: {0}")]
  Task(#[from] tokio::task::JoinError),
}
