mod build;
mod develop;
mod fingerprint;
mod gc;
mod info;
mod show;

use std::path::Path;

use anyhow::{Context, Result, bail};
use clap::Args;

use fanout_lib::build::CargoCompiler;
use fanout_lib::orchestrate::{Orchestrator, Project};
use fanout_lib::platform::{Platform, supported_platforms};
use fanout_lib::store::ArtifactStore;
use fanout_lib::toolchain::ConfiguredSource;

pub use build::{BuildOptions, BuildSelection, cmd_build};
pub use develop::{DevelopOptions, cmd_develop};
pub use fingerprint::cmd_fingerprint;
pub use gc::cmd_gc;
pub use info::cmd_info;
pub use show::cmd_show;

/// Platform selection shared by commands that fan out.
#[derive(Debug, Clone, Args)]
pub struct PlatformArgs {
  /// Platform to build for, e.g. aarch64-darwin (repeatable; default: host)
  #[arg(long = "platform", value_name = "PLATFORM")]
  pub platforms: Vec<String>,

  /// Build for every supported platform
  #[arg(long, conflicts_with = "platforms")]
  pub all_platforms: bool,
}

impl PlatformArgs {
  pub fn resolve(&self) -> Result<Vec<Platform>> {
    if self.all_platforms {
      return Ok(supported_platforms().to_vec());
    }
    if self.platforms.is_empty() {
      return Ok(vec![host_platform()?]);
    }
    self
      .platforms
      .iter()
      .map(|p| p.parse::<Platform>().map_err(anyhow::Error::from))
      .collect()
  }
}

pub fn host_platform() -> Result<Platform> {
  match Platform::current() {
    Some(platform) => Ok(platform),
    None => bail!(
      "host platform is not supported (supported: {})",
      supported_platforms()
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ")
    ),
  }
}

pub fn load_project(source: &Path) -> Result<Project> {
  Project::load(source).with_context(|| format!("Failed to load project at {}", source.display()))
}

pub type CliOrchestrator = Orchestrator<ConfiguredSource, CargoCompiler>;

pub fn orchestrator(project: Project, store: ArtifactStore) -> Result<CliOrchestrator> {
  let source = project
    .config
    .toolchain_source()
    .context("Failed to configure toolchain source")?;
  Ok(Orchestrator::new(project, source, CargoCompiler::new(), store))
}

pub fn runtime() -> Result<tokio::runtime::Runtime> {
  tokio::runtime::Runtime::new().context("Failed to create async runtime")
}
