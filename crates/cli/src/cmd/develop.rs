//! Implementation of the `fanout develop` command.

use std::path::PathBuf;
use std::process::Command;

use anyhow::{Context, Result};
use tracing::info;

use fanout_lib::devshell::Shell;
use fanout_lib::platform::Platform;
use fanout_lib::store::ArtifactStore;
use fanout_lib::store::lock::{LockMode, StoreLock};

use super::{host_platform, load_project, orchestrator, runtime};
use crate::output::print_warning;

pub struct DevelopOptions {
  pub platform: Option<String>,
  pub print: bool,
  pub shell: Option<String>,
  pub command: Option<String>,
  pub source: PathBuf,
}

/// Provision the dev environment, then print it, run one command in it or
/// start an interactive shell in it.
///
/// Exits with the child's status when a command or shell was run.
pub fn cmd_develop(options: DevelopOptions) -> Result<()> {
  let platform = match &options.platform {
    Some(p) => p.parse::<Platform>()?,
    None => host_platform()?,
  };
  let shell = match &options.shell {
    Some(name) => name.parse::<Shell>().map_err(anyhow::Error::msg)?,
    None => Shell::detect(),
  };

  let project = load_project(&options.source)?;
  let root = project.root().to_path_buf();
  let store = ArtifactStore::open_default();
  let env = {
    let _lock = StoreLock::acquire(&store, LockMode::Shared, "develop").context("Failed to acquire store lock")?;
    let orchestrator = orchestrator(project, store)?;
    runtime()?
      .block_on(orchestrator.provisioner().provision(platform))
      .with_context(|| format!("Failed to provision dev shell for {}", platform))?
  };

  for tool in env.missing_tools() {
    print_warning(&format!("{} not found on PATH", tool.name));
  }

  if options.print {
    print!("{}", env.script(shell));
    return Ok(());
  }

  let mut child = match &options.command {
    Some(command) => {
      let mut c = Command::new("/bin/sh");
      c.arg("-c").arg(command);
      c
    }
    None => {
      info!(shell = %shell, "starting dev shell");
      Command::new(shell.as_str())
    }
  };
  env.apply(&mut child).current_dir(&root);

  let status = child
    .status()
    .with_context(|| format!("Failed to start {:?}", child.get_program()))?;
  std::process::exit(status.code().unwrap_or(1));
}
