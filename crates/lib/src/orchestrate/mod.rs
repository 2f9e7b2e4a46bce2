//! Evaluating outputs across the platform matrix.
//!
//! A [`Project`] is loaded once: configuration, toolchain spec and a single
//! source snapshot shared read-only by every task. The [`Orchestrator`] then
//! runs one task per (platform, output) pair, bounded by a semaphore, and
//! records each result in an [`OutputRegistry`]. A failure only ever affects
//! its own entry.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

use crate::build::{BuildError, BuildTargetDescriptor, Compiler, PackageBuilder, default_descriptor, static_descriptor};
use crate::config::{ConfigError, ProjectConfig, load_toolchain_spec};
use crate::devshell::DevShellProvisioner;
use crate::platform::Platform;
use crate::registry::{FailureKind, LookupError, Output, OutputName, OutputRegistry};
use crate::source::{FingerprintError, SourceFilter, SourceSnapshot, binary_name};
use crate::store::{ArtifactStore, EntryKind, is_complete};
use crate::toolchain::{ResolveError, ResolvedToolchain, ToolchainResolver, ToolchainSource, ToolchainSpec};
use crate::util::hash::ObjectHash;

pub use crate::registry::OutputFailure;

#[derive(Debug, Error)]
pub enum ProjectError {
  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  Source(#[from] FingerprintError),
}

/// A source tree ready for evaluation.
#[derive(Debug, Clone)]
pub struct Project {
  pub config: ProjectConfig,
  pub spec: ToolchainSpec,
  pub snapshot: SourceSnapshot,
  pub binary: String,
}

impl Project {
  /// Read configuration and fingerprint the tree at `root`.
  pub fn load(root: &Path) -> Result<Self, ProjectError> {
    let config = ProjectConfig::load(root)?;
    let spec = load_toolchain_spec(root)?;
    let filter = SourceFilter::for_project(root, &config.source)?;
    let snapshot = SourceSnapshot::scan(root, &filter)?;
    let binary = binary_name(&snapshot.root, config.build.bin.as_deref())?;

    info!(
      root = ?snapshot.root,
      binary = %binary,
      toolchain = %spec.display_name(),
      fingerprint = %snapshot.fingerprint,
      "loaded project"
    );
    Ok(Self {
      config,
      spec,
      snapshot,
      binary,
    })
  }

  pub fn root(&self) -> &Path {
    &self.snapshot.root
  }
}

impl From<ResolveError> for OutputFailure {
  fn from(e: ResolveError) -> Self {
    let kind = match e {
      ResolveError::NotFound { .. } => FailureKind::ToolchainNotFound,
      ResolveError::Store(_) => FailureKind::Store,
      ResolveError::Hash(_) | ResolveError::Task(_) => FailureKind::Internal,
    };
    OutputFailure::new(kind, e.to_string())
  }
}

impl From<BuildError> for OutputFailure {
  fn from(e: BuildError) -> Self {
    match e {
      BuildError::Failed { descriptor, key, output } => OutputFailure::new(
        FailureKind::BuildFailed,
        format!("{} ({})\n{}", descriptor, key, output.trim_end()),
      ),
      BuildError::Store(_) => OutputFailure::new(FailureKind::Store, e.to_string()),
      BuildError::Source(_) | BuildError::StaleSource { .. } => OutputFailure::new(FailureKind::Source, e.to_string()),
      BuildError::Hash(_) | BuildError::Task(_) => OutputFailure::new(FailureKind::Internal, e.to_string()),
    }
  }
}

/// What building an output would do, without building it.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedOutput {
  pub platform: Platform,
  pub output: OutputName,
  pub toolchain_version: String,
  /// `None` for dev shells, which are never cached.
  pub target_triple: Option<String>,
  pub descriptor_key: Option<ObjectHash>,
  /// Whether a complete store entry already exists for the key.
  pub cached: bool,
}

/// Shared handles moved into each task.
struct Handles<S, C> {
  project: Arc<Project>,
  resolver: Arc<ToolchainResolver<S>>,
  builder: Arc<PackageBuilder<C>>,
  provisioner: Arc<DevShellProvisioner<S>>,
}

impl<S, C> Clone for Handles<S, C> {
  fn clone(&self) -> Self {
    Self {
      project: Arc::clone(&self.project),
      resolver: Arc::clone(&self.resolver),
      builder: Arc::clone(&self.builder),
      provisioner: Arc::clone(&self.provisioner),
    }
  }
}

impl<S: ToolchainSource, C: Compiler> Handles<S, C> {
  /// The toolchain an output is built with. The static build needs the musl
  /// standard library on top of the project's spec.
  async fn toolchain(&self, platform: Platform, output: OutputName) -> Result<ResolvedToolchain, ResolveError> {
    let spec = match output {
      OutputName::Static => self.project.spec.for_platform(platform),
      OutputName::Default | OutputName::DevShell => self.project.spec.clone(),
    };
    self.resolver.resolve(&spec, platform).await
  }

  async fn descriptor(&self, platform: Platform, output: OutputName) -> Result<BuildTargetDescriptor, OutputFailure> {
    let toolchain = self.toolchain(platform, output).await?;
    let project = &self.project;
    let fingerprint = &project.snapshot.fingerprint;
    Ok(match output {
      OutputName::Static => static_descriptor(
        fingerprint,
        &toolchain,
        &project.binary,
        project.config.static_link.cc.as_deref(),
      ),
      OutputName::Default | OutputName::DevShell => default_descriptor(fingerprint, &toolchain, &project.binary),
    })
  }

  #[instrument(skip(self))]
  async fn run(&self, platform: Platform, output: OutputName) -> Result<Output, OutputFailure> {
    match output {
      OutputName::DevShell => Ok(Output::DevShell(self.provisioner.provision(platform).await?)),
      OutputName::Default | OutputName::Static => {
        let descriptor = self.descriptor(platform, output).await?;
        let artifact = self.builder.build(&descriptor, &self.project.snapshot).await?;
        Ok(Output::Package(artifact))
      }
    }
  }
}

/// Runs output tasks for a project.
pub struct Orchestrator<S, C> {
  handles: Handles<S, C>,
  parallelism: usize,
}

impl<S, C> Orchestrator<S, C>
where
  S: ToolchainSource + 'static,
  C: Compiler + 'static,
{
  pub fn new(project: Project, source: S, compiler: C, store: ArtifactStore) -> Self {
    let parallelism = project.config.parallelism();
    let resolver = Arc::new(ToolchainResolver::new(source, store.clone()));
    let builder = Arc::new(PackageBuilder::new(store, compiler));
    let provisioner = Arc::new(
      DevShellProvisioner::new(Arc::clone(&resolver), project.spec.clone())
        .with_tools(project.config.devshell.tools.clone())
        .with_native(project.config.native.clone()),
    );

    Self {
      handles: Handles {
        project: Arc::new(project),
        resolver,
        builder,
        provisioner,
      },
      parallelism,
    }
  }

  pub fn with_parallelism(mut self, parallelism: usize) -> Self {
    self.parallelism = parallelism.max(1);
    self
  }

  pub fn project(&self) -> &Project {
    &self.handles.project
  }

  pub fn resolver(&self) -> &ToolchainResolver<S> {
    &self.handles.resolver
  }

  pub fn builder(&self) -> &PackageBuilder<C> {
    &self.handles.builder
  }

  pub fn provisioner(&self) -> &DevShellProvisioner<S> {
    &self.handles.provisioner
  }

  /// Evaluate every pair of `platforms` and `outputs` concurrently.
  pub async fn evaluate(&self, platforms: &[Platform], outputs: &[OutputName]) -> OutputRegistry {
    let platforms: BTreeSet<Platform> = platforms.iter().copied().collect();
    let outputs: BTreeSet<OutputName> = outputs.iter().copied().collect();
    info!(
      platforms = platforms.len(),
      outputs = outputs.len(),
      parallelism = self.parallelism,
      "evaluating outputs"
    );

    let semaphore = Arc::new(Semaphore::new(self.parallelism));
    let mut join_set = JoinSet::new();

    for &platform in &platforms {
      for &output in &outputs {
        let handles = self.handles.clone();
        let semaphore = Arc::clone(&semaphore);
        join_set.spawn(async move {
          // the semaphore is never closed
          let _permit = semaphore.acquire_owned().await.ok();
          let result = handles.run(platform, output).await;
          (platform, output, result)
        });
      }
    }

    let mut registry = OutputRegistry::new();
    while let Some(joined) = join_set.join_next().await {
      match joined {
        Ok((platform, output, result)) => {
          match &result {
            Ok(_) => info!(%platform, %output, "output ready"),
            Err(failure) => warn!(%platform, %output, kind = %failure.kind, "output failed"),
          }
          registry.insert(platform, output, result);
        }
        Err(e) => error!(error = %e, "output task panicked"),
      }
    }

    // a panicked task still owns its entry
    for &platform in &platforms {
      for &output in &outputs {
        if matches!(registry.lookup(platform, output), Err(LookupError::NotEvaluated { .. })) {
          registry.insert(
            platform,
            output,
            Err(OutputFailure::new(FailureKind::Internal, "output task panicked")),
          );
        }
      }
    }

    registry
  }

  /// Resolve toolchains and compute descriptor keys without building.
  pub async fn plan(&self, platforms: &[Platform], outputs: &[OutputName]) -> Vec<(Platform, OutputName, Result<PlannedOutput, OutputFailure>)> {
    let mut planned = Vec::new();
    for &platform in platforms {
      for &output in outputs {
        planned.push((platform, output, self.plan_one(platform, output).await));
      }
    }
    planned
  }

  async fn plan_one(&self, platform: Platform, output: OutputName) -> Result<PlannedOutput, OutputFailure> {
    let handles = &self.handles;
    if output == OutputName::DevShell {
      let toolchain = handles.toolchain(platform, output).await?;
      return Ok(PlannedOutput {
        platform,
        output,
        toolchain_version: toolchain.version,
        target_triple: None,
        descriptor_key: None,
        cached: false,
      });
    }

    let descriptor = handles.descriptor(platform, output).await?;
    let key = descriptor
      .descriptor_key()
      .map_err(|e| OutputFailure::new(FailureKind::Internal, e.to_string()))?;
    let cached = is_complete(&handles.builder.store().entry_path(EntryKind::Build, &key));
    Ok(PlannedOutput {
      platform,
      output,
      toolchain_version: descriptor.toolchain.version.clone(),
      target_triple: Some(descriptor.target_triple),
      descriptor_key: Some(key),
      cached,
    })
  }
}

/// Where a `result` link for `output` goes, relative to the project root.
pub fn result_link_name(output: OutputName, platform: Platform, multi_platform: bool) -> Option<PathBuf> {
  let base = match output {
    OutputName::Default => "result",
    OutputName::Static => "result-static",
    OutputName::DevShell => return None,
  };
  Some(if multi_platform {
    PathBuf::from(format!("{}-{}", base, platform))
  } else {
    PathBuf::from(base)
  })
}
