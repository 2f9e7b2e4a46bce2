//! Implementation of the `fanout build` command.
//!
//! Evaluates the requested packages for each selected platform, links each
//! successful result next to the project and registers the link as a GC root.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::ValueEnum;
use tracing::debug;

use fanout_lib::orchestrate::result_link_name;
use fanout_lib::registry::{Output, OutputName, OutputRegistry};
use fanout_lib::store::ArtifactStore;
use fanout_lib::store::lock::{LockMode, StoreLock};
use fanout_lib::store::replace_symlink;

use super::{PlatformArgs, load_project, orchestrator, runtime};
use crate::output::{OutputFormat, format_duration, print_error, print_info, print_json, print_stat, print_success};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BuildSelection {
  Default,
  Static,
  All,
}

impl BuildSelection {
  fn outputs(self) -> Vec<OutputName> {
    match self {
      BuildSelection::Default => vec![OutputName::Default],
      BuildSelection::Static => vec![OutputName::Static],
      BuildSelection::All => vec![OutputName::Default, OutputName::Static],
    }
  }
}

pub struct BuildOptions {
  pub what: BuildSelection,
  pub platforms: PlatformArgs,
  pub source: PathBuf,
  pub link: bool,
}

pub fn cmd_build(options: BuildOptions, output: OutputFormat) -> Result<()> {
  let start = Instant::now();
  let platforms = options.platforms.resolve()?;
  let outputs = options.what.outputs();

  let project = load_project(&options.source)?;
  let root = project.root().to_path_buf();
  let store = ArtifactStore::open_default();
  let _lock = StoreLock::acquire(&store, LockMode::Shared, "build").context("Failed to acquire store lock")?;

  let orchestrator = orchestrator(project, store.clone())?;
  let registry = runtime()?.block_on(orchestrator.evaluate(&platforms, &outputs));

  let links = if options.link {
    link_results(&registry, &root, &store, platforms.len() > 1)?
  } else {
    Vec::new()
  };

  if output.is_json() {
    print_json(&registry)?;
  } else {
    print_summary(&registry, &links);
    print_stat("Duration", &format_duration(start.elapsed()));
  }

  let failed = registry.failures().count();
  if failed > 0 {
    bail!("{} of {} output(s) failed", failed, registry.len());
  }
  Ok(())
}

/// Point `result` links at each successful package's store entry.
fn link_results(registry: &OutputRegistry, root: &Path, store: &ArtifactStore, multi_platform: bool) -> Result<Vec<PathBuf>> {
  let mut links = Vec::new();
  for (platform, name, result) in registry.iter() {
    let Ok(Output::Package(artifact)) = result else {
      continue;
    };
    let Some(link_name) = result_link_name(name, platform, multi_platform) else {
      continue;
    };
    // <store>/build/<key>/bin/<binary>
    let Some(entry) = artifact.output_path.parent().and_then(Path::parent) else {
      continue;
    };

    let link = root.join(link_name);
    replace_symlink(entry, &link).with_context(|| format!("Failed to create {}", link.display()))?;
    store
      .add_root(&link)
      .with_context(|| format!("Failed to register {} as a GC root", link.display()))?;
    debug!(link = ?link, target = ?entry, "linked result");
    links.push(link);
  }
  Ok(links)
}

fn print_summary(registry: &OutputRegistry, links: &[PathBuf]) {
  println!();
  for (platform, name, result) in registry.iter() {
    match result {
      Ok(Output::Package(artifact)) => {
        let state = if artifact.cached { "cached" } else { "built" };
        print_success(&format!("{} {} ({})", platform, name, state));
        print_stat("Path", &artifact.output_path.display().to_string());
        print_stat(
          "Produced",
          &humantime::format_rfc3339_seconds(artifact.produced_at).to_string(),
        );
      }
      Ok(Output::DevShell(_)) => {}
      Err(failure) => {
        print_error(&format!("{} {}: {}", platform, name, failure.kind));
        for line in failure.message.lines() {
          eprintln!("    {}", line);
        }
      }
    }
  }
  for link in links {
    print_info(&format!("Linked {}", link.display()));
  }
}
